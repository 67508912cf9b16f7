//! The "ZONE" Engine - polygon membership and occupancy events
//!
//! Maps confirmed tracks into user-defined polygon zones:
//! - Exclude zones first: a track inside any exclude zone is suppressed
//!   for the tick and contributes nowhere
//! - Include zones evaluated independently; overlapping zones may share
//!   a track
//! - Boundary convention: a point on an edge or vertex is inside
//!
//! Geometry is exact 32/64-bit integer arithmetic on the 16-bit
//! millimetre coordinates; no floating point, no allocation.
//!
//! Zone maps are replaced atomically: `load_zones` validates the whole
//! map and either installs it (resetting runtime state) or leaves the
//! active map untouched.

use crate::types::{
    EventQueue, TrackFrame, TrackReport, TrackStatus, Vertex, Zone, ZoneEvent, ZoneEventKind,
    ZoneFrame, ZoneKind, ZoneMap, ZoneState, MAX_TARGETS, MAX_VERTICES, MAX_ZONES, MIN_VERTICES,
    X_RANGE_MM, Y_RANGE_MM,
};
use arrayvec::ArrayVec;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// CONFIGURATION / ERRORS
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct ZoneEngineConfig {
    /// A member track moving faster than this marks the zone
    /// `has_moving`. Default 100 mm/s (10 cm/s).
    pub moving_threshold_mm_s: i32,
}

impl Default for ZoneEngineConfig {
    fn default() -> Self {
        Self {
            moving_threshold_mm_s: 100,
        }
    }
}

/// Why a zone map was rejected. The previous map stays active.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ZoneMapError {
    #[error("zone '{id}': vertex count {count} outside {MIN_VERTICES}..={MAX_VERTICES}")]
    BadVertexCount { id: String, count: usize },

    #[error("zone with empty id")]
    EmptyId,

    #[error("duplicate zone id '{0}'")]
    DuplicateId(String),

    #[error("zone '{0}': polygon is self-intersecting")]
    NotSimple(String),

    #[error("zone '{id}': sensitivity {value} outside 0..=100")]
    SensitivityOutOfRange { id: String, value: u8 },
}

/// Outcome of a successful `load_zones`.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ZoneLoadReport {
    pub zones: usize,
    pub version: u32,

    /// Vertices outside the radar's field of view. Permitted, but the
    /// host may want to tell the user.
    pub vertex_warnings: u32,
}

/// Zone engine counters.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ZoneStats {
    /// Raw occupancy flips across all zones.
    pub occupancy_changes: u32,

    /// Track-ticks suppressed by exclude zones.
    pub tracks_excluded: u32,

    pub enters: u32,
    pub exits: u32,

    pub maps_loaded: u32,
    pub maps_rejected: u32,
}

// ============================================================================
// ENGINE
// ============================================================================

/// Owns the active [`ZoneMap`] and the per-zone runtime state.
pub struct ZoneEngine {
    cfg: ZoneEngineConfig,
    map: ZoneMap,

    /// Runtime state, parallel to the include zones of `map` in map
    /// order.
    states: ArrayVec<ZoneState, MAX_ZONES>,

    stats: ZoneStats,
}

impl ZoneEngine {
    pub fn new(cfg: ZoneEngineConfig) -> Self {
        Self {
            cfg,
            map: ZoneMap::default(),
            states: ArrayVec::new(),
            stats: ZoneStats::default(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(ZoneEngineConfig::default())
    }

    // ------------------------------------------------------------------
    // Map management
    // ------------------------------------------------------------------

    /// Validates and atomically installs a new zone map.
    ///
    /// All-or-nothing: on any error the previous map remains active and
    /// untouched. On success all per-zone runtime state is reset.
    pub fn load_zones(&mut self, map: ZoneMap) -> Result<ZoneLoadReport, ZoneMapError> {
        let warnings = match validate_map(&map) {
            Ok(warnings) => warnings,
            Err(e) => {
                self.stats.maps_rejected += 1;
                return Err(e);
            }
        };

        self.states.clear();
        for zone in map.zones.iter().filter(|z| z.kind == ZoneKind::Include) {
            self.states.push(ZoneState {
                zone_id: zone.id,
                ..ZoneState::default()
            });
        }
        let report = ZoneLoadReport {
            zones: map.zones.len(),
            version: map.version,
            vertex_warnings: warnings,
        };
        self.map = map;
        self.stats.maps_loaded += 1;
        Ok(report)
    }

    pub fn active_map(&self) -> &ZoneMap {
        &self.map
    }

    pub fn stats(&self) -> ZoneStats {
        self.stats
    }

    /// Current raw per-zone state (include zones, map order).
    pub fn zone_states(&self) -> &[ZoneState] {
        &self.states
    }

    // ------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------

    /// Evaluates all zones against the tick's confirmed tracks.
    ///
    /// Event order is fixed: per zone in map order, occupancy flips
    /// first; then per zone in map order, exits then enters.
    pub fn tick(&mut self, tracks: &TrackFrame, events: &mut EventQueue) -> ZoneFrame {
        let now = tracks.timestamp_ms;

        // Exclude pass: suppressed tracks contribute to nothing this
        // tick. Only confirmed tracks are presence evidence; occluded
        // tracks are predictions and the smoother's hold bridges them.
        let mut survivors: ArrayVec<&TrackReport, MAX_TARGETS> = ArrayVec::new();
        for track in tracks.tracks.iter().filter(|t| t.status == TrackStatus::Confirmed) {
            let excluded = self
                .map
                .zones
                .iter()
                .filter(|z| z.kind == ZoneKind::Exclude)
                .any(|z| point_in_polygon(track.x_mm, track.y_mm, &z.vertices));
            if excluded {
                self.stats.tracks_excluded += 1;
            } else {
                survivors.push(track);
            }
        }

        // Include pass: fresh state per zone.
        let mut new_states: ArrayVec<ZoneState, MAX_ZONES> = ArrayVec::new();
        for (zi, zone) in self
            .map
            .zones
            .iter()
            .filter(|z| z.kind == ZoneKind::Include)
            .enumerate()
        {
            let prev = &self.states[zi];
            let mut state = ZoneState {
                zone_id: zone.id,
                last_change_ms: prev.last_change_ms,
                ..ZoneState::default()
            };

            let mut confidence_sum = 0u32;
            for track in &survivors {
                if point_in_polygon(track.x_mm, track.y_mm, &zone.vertices) {
                    if state.track_ids.try_push(track.track_id).is_ok() {
                        state.target_count += 1;
                        confidence_sum += track.confidence as u32;
                        if track.speed_mm_s() > self.cfg.moving_threshold_mm_s {
                            state.has_moving = true;
                        }
                    }
                }
            }
            state.occupied = state.target_count > 0;
            if state.target_count > 0 {
                state.confidence = (confidence_sum / state.target_count as u32) as u8;
            }
            if state.occupied != prev.occupied {
                state.last_change_ms = now;
            }
            new_states.push(state);
        }

        // Occupancy flips, zone order.
        for (zi, state) in new_states.iter().enumerate() {
            let prev = &self.states[zi];
            if state.occupied != prev.occupied {
                self.stats.occupancy_changes += 1;
                let kind = if state.occupied {
                    ZoneEventKind::Occupied
                } else {
                    ZoneEventKind::Vacant
                };
                push_event(events, ZoneEvent::new(kind, state.zone_id, 0, now));
            }
        }

        // Membership deltas, zone order: exits then enters.
        for (zi, state) in new_states.iter().enumerate() {
            let prev = &self.states[zi];
            for &id in &prev.track_ids {
                if !state.track_ids.contains(&id) {
                    self.stats.exits += 1;
                    push_event(
                        events,
                        ZoneEvent::new(ZoneEventKind::Exit, state.zone_id, id, now),
                    );
                }
            }
            for &id in &state.track_ids {
                if !prev.track_ids.contains(&id) {
                    self.stats.enters += 1;
                    push_event(
                        events,
                        ZoneEvent::new(ZoneEventKind::Enter, state.zone_id, id, now),
                    );
                }
            }
        }

        self.states = new_states;

        let mut frame = ZoneFrame {
            timestamp_ms: now,
            ..Default::default()
        };
        frame.zones.extend(self.states.iter().cloned());
        frame
    }

    /// Clears every zone to unoccupied, emitting Vacant events
    /// (radar-disconnect recovery). Exit events are not emitted; the
    /// member tracks were retired, which closes their Enter/Exit pairing.
    pub fn force_all_vacant(&mut self, now_ms: u32, events: &mut EventQueue) {
        for state in self.states.iter_mut() {
            if state.occupied {
                self.stats.occupancy_changes += 1;
                push_event(
                    events,
                    ZoneEvent::new(ZoneEventKind::Vacant, state.zone_id, 0, now_ms),
                );
                state.last_change_ms = now_ms;
            }
            state.occupied = false;
            state.target_count = 0;
            state.track_ids.clear();
            state.has_moving = false;
            state.confidence = 0;
        }
    }
}

fn push_event(events: &mut EventQueue, event: ZoneEvent) {
    // The queue is sized for the worst case (16 zones x 7 events); a
    // full queue would be a capacity-constant bug, not a runtime
    // condition, so overflow is silently impossible here.
    let _ = events.try_push(event);
}

// ============================================================================
// VALIDATION
// ============================================================================

/// Whole-map validation; returns the out-of-field vertex count.
fn validate_map(map: &ZoneMap) -> Result<u32, ZoneMapError> {
    let mut warnings = 0u32;
    for (i, zone) in map.zones.iter().enumerate() {
        validate_zone(zone)?;
        if map.zones[..i].iter().any(|other| other.id == zone.id) {
            return Err(ZoneMapError::DuplicateId(zone.id.to_string()));
        }
        warnings += zone
            .vertices
            .iter()
            .filter(|v| !vertex_in_field(v))
            .count() as u32;
    }
    Ok(warnings)
}

fn validate_zone(zone: &Zone) -> Result<(), ZoneMapError> {
    if zone.id.is_empty() {
        return Err(ZoneMapError::EmptyId);
    }
    let count = zone.vertices.len();
    if !(MIN_VERTICES..=MAX_VERTICES).contains(&count) {
        return Err(ZoneMapError::BadVertexCount {
            id: zone.id.to_string(),
            count,
        });
    }
    if zone.sensitivity > 100 {
        return Err(ZoneMapError::SensitivityOutOfRange {
            id: zone.id.to_string(),
            value: zone.sensitivity,
        });
    }
    if !polygon_is_simple(&zone.vertices) {
        return Err(ZoneMapError::NotSimple(zone.id.to_string()));
    }
    Ok(())
}

fn vertex_in_field(v: &Vertex) -> bool {
    (X_RANGE_MM.0..=X_RANGE_MM.1).contains(&(v.x_mm as i32))
        && (Y_RANGE_MM.0..=Y_RANGE_MM.1).contains(&(v.y_mm as i32))
}

/// No pair of non-adjacent edges may intersect; touching at a shared
/// endpoint is permitted, a vertex in the interior of another edge is
/// not. Degenerate (zero-length) edges fail.
fn polygon_is_simple(vertices: &[Vertex]) -> bool {
    let n = vertices.len();
    for i in 0..n {
        if vertices[i] == vertices[(i + 1) % n] {
            return false;
        }
    }
    for i in 0..n {
        for j in (i + 1)..n {
            let adjacent = j == i + 1 || (i == 0 && j == n - 1);
            if adjacent {
                continue;
            }
            let (a1, a2) = (vertices[i], vertices[(i + 1) % n]);
            let (b1, b2) = (vertices[j], vertices[(j + 1) % n]);
            if segments_conflict(a1, a2, b1, b2) {
                return false;
            }
        }
    }
    true
}

/// Cross product of (b - a) x (c - a), exact in i64.
fn orient(a: Vertex, b: Vertex, c: Vertex) -> i64 {
    let abx = (b.x_mm - a.x_mm) as i64;
    let aby = (b.y_mm - a.y_mm) as i64;
    let acx = (c.x_mm - a.x_mm) as i64;
    let acy = (c.y_mm - a.y_mm) as i64;
    abx * acy - aby * acx
}

fn within_bbox(a: Vertex, b: Vertex, p: Vertex) -> bool {
    p.x_mm >= a.x_mm.min(b.x_mm)
        && p.x_mm <= a.x_mm.max(b.x_mm)
        && p.y_mm >= a.y_mm.min(b.y_mm)
        && p.y_mm <= a.y_mm.max(b.y_mm)
}

/// True when segments a1-a2 and b1-b2 intersect anywhere other than a
/// shared endpoint.
fn segments_conflict(a1: Vertex, a2: Vertex, b1: Vertex, b2: Vertex) -> bool {
    let d1 = orient(b1, b2, a1);
    let d2 = orient(b1, b2, a2);
    let d3 = orient(a1, a2, b1);
    let d4 = orient(a1, a2, b2);

    // Proper crossing.
    if ((d1 > 0 && d2 < 0) || (d1 < 0 && d2 > 0)) && ((d3 > 0 && d4 < 0) || (d3 < 0 && d4 > 0)) {
        return true;
    }

    // Collinear / touching cases: an endpoint on the other segment is a
    // conflict unless the two segments share that exact endpoint.
    let shared = |p: Vertex| p == b1 || p == b2;
    if d1 == 0 && within_bbox(b1, b2, a1) && !shared(a1) {
        return true;
    }
    if d2 == 0 && within_bbox(b1, b2, a2) && !shared(a2) {
        return true;
    }
    let shared_b = |p: Vertex| p == a1 || p == a2;
    if d3 == 0 && within_bbox(a1, a2, b1) && !shared_b(b1) {
        return true;
    }
    if d4 == 0 && within_bbox(a1, a2, b2) && !shared_b(b2) {
        return true;
    }
    false
}

// ============================================================================
// POINT-IN-POLYGON
// ============================================================================

/// Ray-casting crossings test, exact integer arithmetic, closed
/// boundary: a point on an edge or vertex is inside.
fn point_in_polygon(px: i32, py: i32, vertices: &[Vertex]) -> bool {
    let n = vertices.len();
    if n < MIN_VERTICES {
        return false;
    }

    // Boundary first: the crossings parity is unreliable exactly on
    // edges, and the convention says boundary = inside.
    for i in 0..n {
        let a = vertices[i];
        let b = vertices[(i + 1) % n];
        if on_segment(px, py, a, b) {
            return true;
        }
    }

    let mut inside = false;
    for i in 0..n {
        let a = vertices[i];
        let b = vertices[(i + 1) % n];
        let (ay, by) = (a.y_mm as i32, b.y_mm as i32);
        if (ay > py) == (by > py) {
            continue;
        }
        // px < x-intersection of the edge with the horizontal through
        // py, evaluated exactly: compare cross-multiplied terms with
        // the sign of (by - ay).
        let lhs = (px - a.x_mm as i32) as i64 * (by - ay) as i64;
        let rhs = (py - ay) as i64 * (b.x_mm - a.x_mm) as i64;
        let crosses = if by > ay { lhs < rhs } else { lhs > rhs };
        if crosses {
            inside = !inside;
        }
    }
    inside
}

fn on_segment(px: i32, py: i32, a: Vertex, b: Vertex) -> bool {
    let cross = (b.x_mm as i64 - a.x_mm as i64) * (py as i64 - a.y_mm as i64)
        - (b.y_mm as i64 - a.y_mm as i64) * (px as i64 - a.x_mm as i64);
    if cross != 0 {
        return false;
    }
    px >= (a.x_mm as i32).min(b.x_mm as i32)
        && px <= (a.x_mm as i32).max(b.x_mm as i32)
        && py >= (a.y_mm as i32).min(b.y_mm as i32)
        && py <= (a.y_mm as i32).max(b.y_mm as i32)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::zone_id;
    use arrayvec::ArrayString;

    fn zone(id: &str, kind: ZoneKind, verts: &[(i16, i16)], sensitivity: u8) -> Zone {
        Zone {
            id: zone_id(id),
            name: ArrayString::from(id).unwrap(),
            kind,
            vertices: verts.iter().map(|&(x, y)| Vertex::new(x, y)).collect(),
            sensitivity,
        }
    }

    fn map(zones: Vec<Zone>, version: u32) -> ZoneMap {
        ZoneMap {
            zones: zones.into_iter().collect(),
            version,
        }
    }

    fn track(id: u8, x_mm: i32, y_mm: i32, vx: i32, vy: i32) -> TrackReport {
        TrackReport {
            track_id: id,
            x_mm,
            y_mm,
            vx_mm_s: vx,
            vy_mm_s: vy,
            confidence: 80,
            status: TrackStatus::Confirmed,
        }
    }

    fn track_frame(tracks: &[TrackReport], now: u32) -> TrackFrame {
        let mut f = TrackFrame {
            timestamp_ms: now,
            ..Default::default()
        };
        for t in tracks.iter().take(MAX_TARGETS) {
            f.tracks.push(*t);
        }
        f
    }

    fn square() -> Vec<(i16, i16)> {
        vec![(0, 0), (1000, 0), (1000, 1000), (0, 1000)]
    }

    // ---------------- geometry ----------------

    #[test]
    fn every_vertex_is_inside_its_polygon() {
        let verts: Vec<Vertex> = square()
            .into_iter()
            .map(|(x, y)| Vertex::new(x, y))
            .collect();
        for v in &verts {
            assert!(point_in_polygon(v.x_mm as i32, v.y_mm as i32, &verts));
        }
    }

    #[test]
    fn edge_point_is_inside() {
        let verts: Vec<Vertex> = square()
            .into_iter()
            .map(|(x, y)| Vertex::new(x, y))
            .collect();
        // Exactly on the right edge.
        assert!(point_in_polygon(1000, 500, &verts));
        // Exactly on the bottom edge.
        assert!(point_in_polygon(500, 0, &verts));
        // Just outside.
        assert!(!point_in_polygon(1001, 500, &verts));
    }

    #[test]
    fn concave_polygon_membership() {
        // L-shape: the notch at the top right is outside.
        let verts: Vec<Vertex> = [
            (0, 0),
            (2000, 0),
            (2000, 1000),
            (1000, 1000),
            (1000, 2000),
            (0, 2000),
        ]
        .iter()
        .map(|&(x, y)| Vertex::new(x, y))
        .collect();

        assert!(point_in_polygon(500, 1500, &verts));
        assert!(point_in_polygon(1500, 500, &verts));
        assert!(!point_in_polygon(1500, 1500, &verts));
    }

    #[test]
    fn bowtie_is_not_simple() {
        let verts: Vec<Vertex> = [(0, 0), (1000, 1000), (1000, 0), (0, 1000)]
            .iter()
            .map(|&(x, y)| Vertex::new(x, y))
            .collect();
        assert!(!polygon_is_simple(&verts));
    }

    #[test]
    fn convex_and_concave_shapes_are_simple() {
        let sq: Vec<Vertex> = square().into_iter().map(|(x, y)| Vertex::new(x, y)).collect();
        assert!(polygon_is_simple(&sq));

        let l_shape: Vec<Vertex> = [
            (0, 0),
            (2000, 0),
            (2000, 1000),
            (1000, 1000),
            (1000, 2000),
            (0, 2000),
        ]
        .iter()
        .map(|&(x, y)| Vertex::new(x, y))
        .collect();
        assert!(polygon_is_simple(&l_shape));
    }

    // ---------------- validation ----------------

    #[test]
    fn load_rejects_bad_maps_and_keeps_prior() {
        let mut engine = ZoneEngine::with_defaults();
        let good = map(vec![zone("a", ZoneKind::Include, &square(), 50)], 1);
        engine.load_zones(good.clone()).unwrap();

        let cases = vec![
            map(vec![zone("", ZoneKind::Include, &square(), 50)], 2),
            map(vec![zone("b", ZoneKind::Include, &[(0, 0), (10, 10)], 50)], 2),
            map(
                vec![
                    zone("dup", ZoneKind::Include, &square(), 50),
                    zone("dup", ZoneKind::Exclude, &square(), 50),
                ],
                2,
            ),
            map(
                vec![zone(
                    "bow",
                    ZoneKind::Include,
                    &[(0, 0), (1000, 1000), (1000, 0), (0, 1000)],
                    50,
                )],
                2,
            ),
            map(vec![zone("hot", ZoneKind::Include, &square(), 101)], 2),
        ];
        let rejected = cases.len() as u32;
        for bad in cases {
            assert!(engine.load_zones(bad).is_err());
            assert_eq!(engine.active_map(), &good, "prior map must survive");
        }
        assert_eq!(engine.stats().maps_loaded, 1);
        assert_eq!(engine.stats().maps_rejected, rejected);
    }

    #[test]
    fn out_of_field_vertices_warn_but_load() {
        let mut engine = ZoneEngine::with_defaults();
        let report = engine
            .load_zones(map(
                vec![zone(
                    "wide",
                    ZoneKind::Include,
                    &[(-7000, 0), (7000, 0), (0, 5000)],
                    50,
                )],
                1,
            ))
            .unwrap();
        assert_eq!(report.vertex_warnings, 2);
    }

    // ---------------- membership & events ----------------

    #[test]
    fn occupancy_and_events_on_enter_and_exit() {
        let mut engine = ZoneEngine::with_defaults();
        engine
            .load_zones(map(vec![zone("desk", ZoneKind::Include, &square(), 50)], 1))
            .unwrap();

        let mut events = EventQueue::new();
        let frame = engine.tick(&track_frame(&[track(7, 500, 500, 0, 0)], 1000), &mut events);
        assert!(frame.zones[0].occupied);
        assert_eq!(frame.zones[0].target_count, 1);
        assert_eq!(frame.zones[0].last_change_ms, 1000);
        let kinds: Vec<ZoneEventKind> = events.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![ZoneEventKind::Occupied, ZoneEventKind::Enter]);
        assert_eq!(events[1].track_id, 7);

        // Track leaves.
        events.clear();
        let frame = engine.tick(&track_frame(&[track(7, 5000, 5000, 0, 0)], 1030), &mut events);
        assert!(!frame.zones[0].occupied);
        let kinds: Vec<ZoneEventKind> = events.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![ZoneEventKind::Vacant, ZoneEventKind::Exit]);
        assert_eq!(engine.stats().occupancy_changes, 2);
    }

    #[test]
    fn exclude_zone_suppresses_track_everywhere() {
        let mut engine = ZoneEngine::with_defaults();
        engine
            .load_zones(map(
                vec![
                    zone(
                        "room",
                        ZoneKind::Include,
                        &[(-1000, 0), (1000, 0), (1000, 3000), (-1000, 3000)],
                        50,
                    ),
                    zone(
                        "fan",
                        ZoneKind::Exclude,
                        &[(-200, 1000), (200, 1000), (200, 1500), (-200, 1500)],
                        50,
                    ),
                ],
                1,
            ))
            .unwrap();

        let mut events = EventQueue::new();
        let frame = engine.tick(&track_frame(&[track(3, 0, 1200, 0, 0)], 500), &mut events);

        assert_eq!(engine.stats().tracks_excluded, 1);
        assert!(!frame.zones[0].occupied, "exclude wins over include");
        assert!(events.is_empty());
        // Only include zones are reported.
        assert_eq!(frame.zones.len(), 1);
    }

    #[test]
    fn overlapping_include_zones_share_a_track() {
        let mut engine = ZoneEngine::with_defaults();
        engine
            .load_zones(map(
                vec![
                    zone("a", ZoneKind::Include, &square(), 50),
                    zone(
                        "b",
                        ZoneKind::Include,
                        &[(500, 500), (1500, 500), (1500, 1500), (500, 1500)],
                        50,
                    ),
                ],
                1,
            ))
            .unwrap();

        let mut events = EventQueue::new();
        let frame = engine.tick(&track_frame(&[track(9, 700, 700, 0, 0)], 100), &mut events);
        assert!(frame.zones[0].occupied);
        assert!(frame.zones[1].occupied);
    }

    #[test]
    fn occluded_tracks_are_not_membership_evidence() {
        let mut engine = ZoneEngine::with_defaults();
        engine
            .load_zones(map(vec![zone("desk", ZoneKind::Include, &square(), 50)], 1))
            .unwrap();

        let mut occluded = track(4, 500, 500, 0, 0);
        occluded.status = TrackStatus::Occluded;
        let mut events = EventQueue::new();
        let frame = engine.tick(&track_frame(&[occluded], 100), &mut events);
        assert!(!frame.zones[0].occupied);
    }

    #[test]
    fn has_moving_uses_speed_threshold() {
        let mut engine = ZoneEngine::with_defaults();
        engine
            .load_zones(map(vec![zone("desk", ZoneKind::Include, &square(), 50)], 1))
            .unwrap();

        let mut events = EventQueue::new();
        let frame = engine.tick(&track_frame(&[track(1, 500, 500, 0, 90)], 100), &mut events);
        assert!(!frame.zones[0].has_moving, "90 mm/s is under the threshold");

        let frame = engine.tick(&track_frame(&[track(1, 500, 500, 0, 300)], 130), &mut events);
        assert!(frame.zones[0].has_moving);
    }

    #[test]
    fn force_all_vacant_emits_vacant_only() {
        let mut engine = ZoneEngine::with_defaults();
        engine
            .load_zones(map(vec![zone("desk", ZoneKind::Include, &square(), 50)], 1))
            .unwrap();

        let mut events = EventQueue::new();
        engine.tick(&track_frame(&[track(2, 500, 500, 0, 0)], 100), &mut events);
        events.clear();

        engine.force_all_vacant(4000, &mut events);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ZoneEventKind::Vacant);
        assert!(!engine.zone_states()[0].occupied);
        assert_eq!(engine.zone_states()[0].last_change_ms, 4000);
    }

    #[test]
    fn reload_resets_runtime_state() {
        let mut engine = ZoneEngine::with_defaults();
        engine
            .load_zones(map(vec![zone("desk", ZoneKind::Include, &square(), 50)], 1))
            .unwrap();
        let mut events = EventQueue::new();
        engine.tick(&track_frame(&[track(2, 500, 500, 0, 0)], 100), &mut events);
        assert!(engine.zone_states()[0].occupied);

        engine
            .load_zones(map(vec![zone("desk", ZoneKind::Include, &square(), 50)], 2))
            .unwrap();
        assert!(!engine.zone_states()[0].occupied);
        assert_eq!(engine.active_map().version, 2);
    }

    #[test]
    fn zone_confidence_is_mean_of_members() {
        let mut engine = ZoneEngine::with_defaults();
        engine
            .load_zones(map(vec![zone("desk", ZoneKind::Include, &square(), 50)], 1))
            .unwrap();

        let mut a = track(1, 200, 200, 0, 0);
        a.confidence = 90;
        let mut b = track(2, 800, 800, 0, 0);
        b.confidence = 60;
        let mut events = EventQueue::new();
        let frame = engine.tick(&track_frame(&[a, b], 100), &mut events);
        assert_eq!(frame.zones[0].confidence, 75);
    }
}
