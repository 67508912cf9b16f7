//! Shared data contracts for the radar-to-presence pipeline.
//!
//! Conventions used everywhere:
//! - Geometry is millimetres, sensor at the origin, +X right, +Y away.
//! - Velocities are signed millimetres per second; negative = approaching.
//! - Timestamps are monotonic milliseconds since boot (`u32`, wraps).
//! - Confidence and signal quality are 0-100.
//!
//! Every container is fixed-capacity; the tick path never allocates.

use arrayvec::{ArrayString, ArrayVec};
use serde::{Deserialize, Serialize};

/// Hardware ceiling on simultaneously reported targets.
pub const MAX_TARGETS: usize = 3;

/// Maximum zones in an active zone map.
pub const MAX_ZONES: usize = 16;

/// Minimum polygon vertex count.
pub const MIN_VERTICES: usize = 3;

/// Maximum polygon vertex count.
pub const MAX_VERTICES: usize = 8;

/// Upper bound on events a single tick can emit:
/// 16 zones x (3 exits + 3 enters + 1 occupancy flip).
pub const MAX_EVENTS_PER_TICK: usize = 112;

/// Radar field-of-view bounds in millimetres.
pub const X_RANGE_MM: (i32, i32) = (-6000, 6000);
pub const Y_RANGE_MM: (i32, i32) = (0, 6000);

/// Short ASCII zone identifier.
pub type ZoneId = ArrayString<16>;

/// Bounded per-tick event buffer.
pub type EventQueue = ArrayVec<ZoneEvent, MAX_EVENTS_PER_TICK>;

// ============================================================================
// DETECTIONS
// ============================================================================

/// A single target observation within one radar frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Lateral position, millimetres.
    pub x_mm: i16,

    /// Distance from the sensor plane, millimetres.
    pub y_mm: i16,

    /// Radial speed, millimetres per second. Negative = approaching.
    pub speed_mm_s: i16,

    /// Distance-resolution hint reported by the sensor, millimetres.
    pub resolution_mm: u16,

    /// Derived signal quality, 0-100.
    pub quality: u8,

    /// False for empty wire slots.
    pub valid: bool,
}

/// One parsed radar frame: up to [`MAX_TARGETS`] detections.
///
/// Ownership transfers to the tracker each tick; nothing retains a
/// reference past the tick that produced it.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetectionFrame {
    /// Fixed slots; `valid == false` marks empty ones.
    pub detections: [Detection; MAX_TARGETS],

    /// Number of valid slots (not the highest slot index).
    pub target_count: u8,

    /// Parser-assigned arrival timestamp.
    pub timestamp_ms: u32,

    /// Monotonic per-parser sequence number. Wraps at 2^32.
    pub seq: u32,
}

impl DetectionFrame {
    /// Iterates the valid detections only.
    pub fn valid_detections(&self) -> impl Iterator<Item = &Detection> {
        self.detections.iter().filter(|d| d.valid)
    }
}

// ============================================================================
// TRACKS
// ============================================================================

/// Externally visible track lifecycle phase.
///
/// Tentative and Retired tracks are internal to the tracker and never
/// reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackStatus {
    /// Seen this tick (or consistently recently).
    Confirmed,
    /// Predicted through a gap in detections.
    Occluded,
}

/// Snapshot of one persistent target, as reported outward.
///
/// Positions and velocities are integer millimetres at this boundary;
/// the filter's floating-point state is private to the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrackReport {
    /// Non-zero process-unique id (8-bit, wraps skipping zero).
    pub track_id: u8,

    pub x_mm: i32,
    pub y_mm: i32,
    pub vx_mm_s: i32,
    pub vy_mm_s: i32,

    /// Derived confidence, 0-100.
    pub confidence: u8,

    pub status: TrackStatus,
}

impl TrackReport {
    /// Speed magnitude in millimetres per second.
    pub fn speed_mm_s(&self) -> i32 {
        let vx = self.vx_mm_s as i64;
        let vy = self.vy_mm_s as i64;
        (((vx * vx + vy * vy) as f64).sqrt()) as i32
    }
}

/// All reportable tracks for one tick. Capacity [`MAX_TARGETS`].
#[derive(Debug, Clone, Default)]
pub struct TrackFrame {
    pub tracks: ArrayVec<TrackReport, MAX_TARGETS>,
    pub timestamp_ms: u32,
    pub seq: u32,
}

// ============================================================================
// ZONES
// ============================================================================

/// Whether a zone contributes occupancy or suppresses tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneKind {
    Include,
    Exclude,
}

/// One polygon vertex, signed millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vertex {
    pub x_mm: i16,
    pub y_mm: i16,
}

impl Vertex {
    pub fn new(x_mm: i16, y_mm: i16) -> Self {
        Self { x_mm, y_mm }
    }
}

/// A user-defined polygon zone.
///
/// Invariants (enforced by `ZoneEngine::load_zones`):
/// - 3..=8 vertices
/// - non-empty `id`, unique within its map
/// - simple polygon (non-adjacent edges never intersect)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub id: ZoneId,

    /// Display name; not interpreted.
    pub name: ArrayString<32>,

    #[serde(rename = "type")]
    pub kind: ZoneKind,

    pub vertices: ArrayVec<Vertex, MAX_VERTICES>,

    /// 0-100; higher = faster response, shorter hold.
    pub sensitivity: u8,
}

/// A versioned set of zones. Replaced atomically between ticks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ZoneMap {
    pub zones: ArrayVec<Zone, MAX_ZONES>,

    /// Monotonically increasing map version.
    pub version: u32,
}

impl ZoneMap {
    /// Parses a map from the integer-only JSON configuration contract.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Serializes the map for the host configuration store.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Per-zone raw occupancy for one tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ZoneState {
    pub zone_id: ZoneId,

    /// Raw (unsmoothed) occupancy.
    pub occupied: bool,

    /// Tracks currently inside.
    pub target_count: u8,

    /// Member track ids, at most [`MAX_TARGETS`].
    pub track_ids: ArrayVec<u8, MAX_TARGETS>,

    /// Any member exceeds the movement speed threshold.
    pub has_moving: bool,

    /// Mean member-track confidence; 0 when empty. Feeds the smoother's
    /// hold weighting, nothing else.
    pub confidence: u8,

    /// When `occupied` last flipped.
    pub last_change_ms: u32,
}

/// Snapshot of every include zone's raw state for one tick.
#[derive(Debug, Clone, Default)]
pub struct ZoneFrame {
    pub zones: ArrayVec<ZoneState, MAX_ZONES>,
    pub timestamp_ms: u32,
}

// ============================================================================
// SMOOTHED PRESENCE
// ============================================================================

/// Phase of the per-zone hysteresis machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresencePhase {
    Vacant,
    Entering,
    Occupied,
    Holding,
}

impl PresencePhase {
    /// The occupancy actually reported to consumers.
    pub fn reports_occupied(self) -> bool {
        matches!(self, PresencePhase::Occupied | PresencePhase::Holding)
    }
}

/// Smoothed per-zone presence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SmoothedZone {
    pub zone_id: ZoneId,

    /// Flicker-free occupancy (`phase.reports_occupied()`).
    pub occupied: bool,

    pub phase: PresencePhase,

    /// When the current phase started.
    pub phase_since_ms: u32,
}

/// The pipeline's final per-tick output.
#[derive(Debug, Clone, Default)]
pub struct SmoothedFrame {
    pub zones: ArrayVec<SmoothedZone, MAX_ZONES>,
    pub timestamp_ms: u32,
}

// ============================================================================
// EVENTS
// ============================================================================

/// Event kinds delivered to the publisher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneEventKind {
    /// A track crossed into a zone.
    Enter,
    /// A track left a zone.
    Exit,
    /// Raw zone occupancy became true.
    Occupied,
    /// Raw zone occupancy became false.
    Vacant,
}

/// A typed occurrence for the publisher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneEvent {
    pub kind: ZoneEventKind,
    pub zone_id: ZoneId,

    /// 0 when not applicable (Occupied/Vacant).
    pub track_id: u8,

    pub timestamp_ms: u32,
}

impl ZoneEvent {
    pub fn new(kind: ZoneEventKind, zone_id: ZoneId, track_id: u8, timestamp_ms: u32) -> Self {
        Self {
            kind,
            zone_id,
            track_id,
            timestamp_ms,
        }
    }
}

/// Builds a `ZoneId` from a str, truncating to capacity.
pub fn zone_id(s: &str) -> ZoneId {
    let mut id = ZoneId::new();
    for c in s.chars().take(16) {
        if id.try_push(c).is_err() {
            break;
        }
    }
    id
}
