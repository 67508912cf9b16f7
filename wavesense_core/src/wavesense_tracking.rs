//! The "TRACK" Engine - persistent multi-target estimation
//!
//! Maintains up to [`MAX_TARGETS`] tracks across frames using one
//! constant-velocity Kalman filter per track:
//! - Gated greedy nearest-neighbour association (deterministic ties)
//! - Lifecycle: Tentative -> Confirmed -> Occluded -> Retired
//! - Stable 8-bit ids (wrap-around, zero skipped)
//! - Reject-and-reset on filter divergence; anomalies are counters
//!
//! All matrices are precomputed at construction; the tick path never
//! allocates.

use crate::types::{
    Detection, DetectionFrame, TrackFrame, TrackReport, TrackStatus, MAX_TARGETS,
};
use arrayvec::ArrayVec;
use nalgebra::{Matrix2, Matrix2x4, Matrix4, Vector2, Vector4};
use serde::Serialize;
use thiserror::Error;

/// Covariance diagonal bounds; leaving them forces a filter reset.
pub const MIN_COV: f32 = 1e-6;
pub const MAX_COV: f32 = 1e12;

/// Post-reset covariance diagonal (high uncertainty).
const RESET_COV: f32 = 1e6;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Tunable parameters of the tracker.
#[derive(Debug, Clone, Copy)]
pub struct TrackerConfig {
    /// Radar cadence; the filter time step.
    pub dt_ms: u32,

    /// Association gate at zero predicted speed, millimetres.
    pub base_gate_mm: f32,

    /// Gate growth per mm/s of predicted speed (0.1 = 100 mm per m/s).
    pub gate_speed_gain: f32,

    /// Hard cap on the association gate, millimetres.
    pub max_gate_mm: f32,

    /// Consecutive hits to confirm a tentative track.
    pub confirm_threshold: u16,

    /// Consecutive misses that drop a tentative track.
    pub tentative_drop: u16,

    /// Consecutive misses that retire an occluded track (~1 s at 33 Hz).
    pub occlusion_timeout_frames: u16,

    /// Process noise, position variance (mm^2).
    pub process_noise_pos: f32,

    /// Process noise, velocity variance ((mm/s)^2).
    pub process_noise_vel: f32,

    /// Measurement noise variance (mm^2).
    pub measurement_noise: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            dt_ms: 30,
            base_gate_mm: 500.0,
            gate_speed_gain: 0.1,
            max_gate_mm: 1000.0,
            confirm_threshold: 3,
            tentative_drop: 3,
            occlusion_timeout_frames: 33,
            process_noise_pos: 50.0,
            process_noise_vel: 200.0,
            measurement_noise: 2500.0,
        }
    }
}

/// Rejected configuration updates.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("gate distance {0} mm outside 300..=1000")]
    GateOutOfRange(u32),

    #[error("occlusion timeout {0} frames outside 33..=99")]
    OcclusionOutOfRange(u16),
}

// ============================================================================
// TRACK STATE
// ============================================================================

/// Full lifecycle phase. Only Confirmed and Occluded are reported
/// outward; see [`TrackStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackState {
    Tentative,
    Confirmed,
    Occluded,
    Retired,
}

/// One tracked target. Filter state is `[x, y, vx, vy]` in f32
/// millimetres / mm-per-second.
#[derive(Debug, Clone)]
struct Track {
    id: u8,
    state: TrackState,
    x: Vector4<f32>,
    p: Matrix4<f32>,
    hits: u16,
    misses: u16,
    first_seen_ms: u32,
    last_seen_ms: u32,
    confidence: u8,
}

/// Read-only view of one slot for host diagnostics, tentative tracks
/// included.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TrackSnapshot {
    pub track_id: u8,
    pub state: TrackState,
    pub x_mm: f32,
    pub y_mm: f32,
    pub vx_mm_s: f32,
    pub vy_mm_s: f32,
    pub hits: u16,
    pub misses: u16,
    pub first_seen_ms: u32,
    pub last_seen_ms: u32,
    pub confidence: u8,
}

/// Tracker health counters.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct TrackerStats {
    /// Tentative tracks promoted to Confirmed.
    pub confirmations: u32,

    /// Tracks retired (drop, timeout, or flush).
    pub retirements: u32,

    /// New tracks born this process.
    pub spawns: u32,

    /// Probable identity swaps (a spawn inside the gate of a track
    /// retired on the same tick).
    pub id_switches: u32,

    /// Filter reinitialisations after divergence.
    pub filter_resets: u32,
}

// ============================================================================
// TRACKER
// ============================================================================

/// Bounded Kalman-filter bank with gated greedy association.
pub struct Tracker {
    cfg: TrackerConfig,

    // Precomputed at construction; reused every tick.
    f: Matrix4<f32>,
    h: Matrix2x4<f32>,
    q: Matrix4<f32>,
    r: Matrix2<f32>,
    p_init: Matrix4<f32>,

    slots: [Option<Track>; MAX_TARGETS],
    next_id: u8,
    last_tick_ms: Option<u32>,

    /// Positions of tracks retired during the current tick, for the
    /// id-switch heuristic.
    retired_this_tick: ArrayVec<(f32, f32), MAX_TARGETS>,

    stats: TrackerStats,
}

impl Tracker {
    pub fn new(cfg: TrackerConfig) -> Self {
        let dt = cfg.dt_ms as f32 / 1000.0;

        let mut f = Matrix4::identity();
        f[(0, 2)] = dt;
        f[(1, 3)] = dt;

        let mut h = Matrix2x4::zeros();
        h[(0, 0)] = 1.0;
        h[(1, 1)] = 1.0;

        let q = Matrix4::from_diagonal(&Vector4::new(
            cfg.process_noise_pos,
            cfg.process_noise_pos,
            cfg.process_noise_vel,
            cfg.process_noise_vel,
        ));
        let r = Matrix2::from_diagonal_element(cfg.measurement_noise);

        // New tracks: position known to measurement accuracy, velocity
        // wide open.
        let p_init = Matrix4::from_diagonal(&Vector4::new(
            cfg.measurement_noise,
            cfg.measurement_noise,
            RESET_COV,
            RESET_COV,
        ));

        Self {
            cfg,
            f,
            h,
            q,
            r,
            p_init,
            slots: [None, None, None],
            next_id: 1,
            last_tick_ms: None,
            retired_this_tick: ArrayVec::new(),
            stats: TrackerStats::default(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(TrackerConfig::default())
    }

    // ------------------------------------------------------------------
    // Configuration surface
    // ------------------------------------------------------------------

    /// Sets the base association gate. Range 300..=1000 mm.
    pub fn set_gate_distance(&mut self, mm: u32) -> Result<(), ConfigError> {
        if !(300..=1000).contains(&mm) {
            return Err(ConfigError::GateOutOfRange(mm));
        }
        self.cfg.base_gate_mm = mm as f32;
        Ok(())
    }

    /// Sets the occlusion timeout. Range 33..=99 frames.
    pub fn set_occlusion_timeout(&mut self, frames: u16) -> Result<(), ConfigError> {
        if !(33..=99).contains(&frames) {
            return Err(ConfigError::OcclusionOutOfRange(frames));
        }
        self.cfg.occlusion_timeout_frames = frames;
        Ok(())
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.cfg
    }

    // ------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------

    /// Runs one full tracker tick: predict, associate, update, lifecycle,
    /// spawn, confidence, report.
    pub fn tick(&mut self, frame: &DetectionFrame) -> TrackFrame {
        self.retired_this_tick.clear();

        // Time anomaly: a gap larger than 2 ticks is treated as misses
        // on each intervening tick, bounded by the occlusion timeout.
        if let Some(last) = self.last_tick_ms {
            let elapsed = frame.timestamp_ms.wrapping_sub(last);
            if elapsed > 2 * self.cfg.dt_ms {
                let skipped = (elapsed / self.cfg.dt_ms)
                    .saturating_sub(1)
                    .min(self.cfg.occlusion_timeout_frames as u32);
                for _ in 0..skipped {
                    self.predict_all();
                    for ti in 0..MAX_TARGETS {
                        if self.is_active(ti) {
                            self.register_miss(ti);
                        }
                    }
                }
            }
        }
        self.last_tick_ms = Some(frame.timestamp_ms);

        self.predict_all();

        let dets: ArrayVec<Detection, MAX_TARGETS> =
            frame.valid_detections().copied().collect();

        // Gated greedy nearest neighbour. Scanning in ascending track
        // then detection order makes ties deterministic.
        let mut det_assigned = [false; MAX_TARGETS];
        let mut trk_assigned = [false; MAX_TARGETS];
        loop {
            let mut best: Option<(usize, usize, f32)> = None;
            for ti in 0..MAX_TARGETS {
                if trk_assigned[ti] {
                    continue;
                }
                let Some(track) = &self.slots[ti] else { continue };
                if track.state == TrackState::Retired {
                    continue;
                }
                let gate = self.gate_radius(track);
                for (di, det) in dets.iter().enumerate() {
                    if det_assigned[di] {
                        continue;
                    }
                    let dx = track.x[0] - det.x_mm as f32;
                    let dy = track.x[1] - det.y_mm as f32;
                    let dist = (dx * dx + dy * dy).sqrt();
                    if dist > gate {
                        continue;
                    }
                    if best.map_or(true, |(_, _, c)| dist < c) {
                        best = Some((ti, di, dist));
                    }
                }
            }
            let Some((ti, di, _)) = best else { break };
            trk_assigned[ti] = true;
            det_assigned[di] = true;
            self.update_track(ti, &dets[di], frame.timestamp_ms);
        }

        // Unmatched tracks take a miss.
        for ti in 0..MAX_TARGETS {
            if !trk_assigned[ti] && self.is_active(ti) {
                self.register_miss(ti);
            }
        }

        // Unmatched detections spawn into free slots; with no free slot
        // the detection is simply ignored this tick.
        for (di, det) in dets.iter().enumerate() {
            if !det_assigned[di] {
                self.spawn(det, frame.timestamp_ms);
            }
        }

        self.refresh_confidence(frame.timestamp_ms);
        self.report(frame)
    }

    /// Retires every track (radar disconnect recovery).
    pub fn flush(&mut self) {
        for ti in 0..MAX_TARGETS {
            if self.is_active(ti) {
                self.stats.retirements += 1;
            }
            self.slots[ti] = None;
        }
        self.last_tick_ms = None;
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    pub fn stats(&self) -> TrackerStats {
        self.stats
    }

    /// Number of non-retired tracks.
    pub fn active_count(&self) -> usize {
        (0..MAX_TARGETS).filter(|&ti| self.is_active(ti)).count()
    }

    /// Snapshot of every live slot, tentative tracks included.
    pub fn snapshots(&self) -> ArrayVec<TrackSnapshot, MAX_TARGETS> {
        self.slots
            .iter()
            .flatten()
            .filter(|t| t.state != TrackState::Retired)
            .map(|t| TrackSnapshot {
                track_id: t.id,
                state: t.state,
                x_mm: t.x[0],
                y_mm: t.x[1],
                vx_mm_s: t.x[2],
                vy_mm_s: t.x[3],
                hits: t.hits,
                misses: t.misses,
                first_seen_ms: t.first_seen_ms,
                last_seen_ms: t.last_seen_ms,
                confidence: t.confidence,
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Prediction
    // ------------------------------------------------------------------

    fn predict_all(&mut self) {
        let (f, q, p_reset) = (self.f, self.q, self.p_init);
        let mut resets = 0u32;
        for track in self.slots.iter_mut().flatten() {
            if track.state == TrackState::Retired {
                continue;
            }
            track.x = f * track.x;
            track.p = f * track.p * f.transpose() + q;
            if !covariance_healthy(&track.p) || !state_finite(&track.x) {
                // Divergence during prediction: keep the (finite part of
                // the) state, reopen the covariance.
                if !state_finite(&track.x) {
                    track.x = Vector4::zeros();
                }
                track.p = p_reset;
                resets += 1;
            }
        }
        self.stats.filter_resets += resets;
    }

    fn gate_radius(&self, track: &Track) -> f32 {
        let speed = (track.x[2] * track.x[2] + track.x[3] * track.x[3]).sqrt();
        (self.cfg.base_gate_mm + speed * self.cfg.gate_speed_gain).min(self.cfg.max_gate_mm)
    }

    // ------------------------------------------------------------------
    // Update / lifecycle
    // ------------------------------------------------------------------

    fn update_track(&mut self, ti: usize, det: &Detection, now_ms: u32) {
        let z = Vector2::new(det.x_mm as f32, det.y_mm as f32);
        let (h, r) = (self.h, self.r);

        let diverged = {
            let Some(track) = self.slots[ti].as_mut() else { return };
            let innovation = z - h * track.x;
            let s = h * track.p * h.transpose() + r;
            match s.try_inverse() {
                Some(s_inv) => {
                    let k = track.p * h.transpose() * s_inv;
                    track.x += k * innovation;
                    // Joseph form keeps the covariance symmetric under
                    // rounding.
                    let i_kh = Matrix4::identity() - k * h;
                    track.p = i_kh * track.p * i_kh.transpose() + k * r * k.transpose();
                    !covariance_healthy(&track.p) || !state_finite(&track.x)
                }
                None => true,
            }
        };

        if diverged {
            self.reset_filter(ti, z);
            self.stats.filter_resets += 1;
        }
        self.register_hit(ti, now_ms);
    }

    /// Reinitialises a slot's filter from the measurement, keeping its
    /// identity and lifecycle.
    fn reset_filter(&mut self, ti: usize, z: Vector2<f32>) {
        if let Some(track) = self.slots[ti].as_mut() {
            track.x = Vector4::new(z[0], z[1], 0.0, 0.0);
            track.p = Matrix4::from_diagonal_element(RESET_COV);
        }
    }

    fn register_hit(&mut self, ti: usize, now_ms: u32) {
        let mut confirmed = false;
        if let Some(track) = self.slots[ti].as_mut() {
            track.hits = track.hits.saturating_add(1);
            track.misses = 0;
            track.last_seen_ms = now_ms;
            match track.state {
                TrackState::Tentative if track.hits >= self.cfg.confirm_threshold => {
                    track.state = TrackState::Confirmed;
                    confirmed = true;
                }
                TrackState::Occluded => track.state = TrackState::Confirmed,
                _ => {}
            }
        }
        if confirmed {
            self.stats.confirmations += 1;
        }
    }

    fn register_miss(&mut self, ti: usize) {
        let mut retire_at: Option<(f32, f32)> = None;
        if let Some(track) = self.slots[ti].as_mut() {
            track.misses = track.misses.saturating_add(1);
            track.hits = 0;
            match track.state {
                TrackState::Tentative if track.misses >= self.cfg.tentative_drop => {
                    retire_at = Some((track.x[0], track.x[1]));
                }
                TrackState::Confirmed => track.state = TrackState::Occluded,
                TrackState::Occluded
                    if track.misses >= self.cfg.occlusion_timeout_frames =>
                {
                    retire_at = Some((track.x[0], track.x[1]));
                }
                _ => {}
            }
        }
        if let Some(pos) = retire_at {
            let _ = self.retired_this_tick.try_push(pos);
            self.slots[ti] = None;
            self.stats.retirements += 1;
        }
    }

    // ------------------------------------------------------------------
    // Spawning
    // ------------------------------------------------------------------

    fn spawn(&mut self, det: &Detection, now_ms: u32) {
        let Some(ti) = self.slots.iter().position(|s| s.is_none()) else {
            // Hardware ceiling reached; the detection returns next tick
            // if it is real.
            return;
        };

        let id = self.alloc_id();
        self.slots[ti] = Some(Track {
            id,
            state: TrackState::Tentative,
            // Radial speed seeds the depth-velocity estimate; lateral
            // velocity starts unknown.
            x: Vector4::new(
                det.x_mm as f32,
                det.y_mm as f32,
                0.0,
                det.speed_mm_s as f32,
            ),
            p: self.p_init,
            hits: 1,
            misses: 0,
            first_seen_ms: now_ms,
            last_seen_ms: now_ms,
            confidence: 50,
        });
        self.stats.spawns += 1;

        // A spawn right where a track died this tick is most likely the
        // same target under a new id.
        let near_retirement = self.retired_this_tick.iter().any(|&(rx, ry)| {
            let dx = rx - det.x_mm as f32;
            let dy = ry - det.y_mm as f32;
            (dx * dx + dy * dy).sqrt() <= self.cfg.base_gate_mm
        });
        if near_retirement {
            self.stats.id_switches += 1;
        }
    }

    /// 8-bit id allocation, wrapping and skipping zero.
    fn alloc_id(&mut self) -> u8 {
        let id = self.next_id;
        self.next_id = match self.next_id.wrapping_add(1) {
            0 => 1,
            n => n,
        };
        id
    }

    // ------------------------------------------------------------------
    // Confidence & reporting
    // ------------------------------------------------------------------

    fn refresh_confidence(&mut self, now_ms: u32) {
        for track in self.slots.iter_mut().flatten() {
            if track.state == TrackState::Retired {
                continue;
            }
            let hit_bonus = (track.hits as i32 * 5).min(30);
            let miss_penalty = (track.misses as i32 * 8).min(40);
            let age_s = now_ms.wrapping_sub(track.first_seen_ms) / 1000;
            let age_bonus = (age_s as i32 * 2).min(20);
            track.confidence = (50 + hit_bonus - miss_penalty + age_bonus).clamp(0, 100) as u8;
        }
    }

    fn is_active(&self, ti: usize) -> bool {
        self.slots[ti]
            .as_ref()
            .is_some_and(|t| t.state != TrackState::Retired)
    }

    fn report(&self, frame: &DetectionFrame) -> TrackFrame {
        let mut out = TrackFrame {
            tracks: ArrayVec::new(),
            timestamp_ms: frame.timestamp_ms,
            seq: frame.seq,
        };
        for track in self.slots.iter().flatten() {
            let status = match track.state {
                TrackState::Confirmed => TrackStatus::Confirmed,
                TrackState::Occluded => TrackStatus::Occluded,
                _ => continue,
            };
            out.tracks.push(TrackReport {
                track_id: track.id,
                x_mm: track.x[0] as i32,
                y_mm: track.x[1] as i32,
                vx_mm_s: track.x[2] as i32,
                vy_mm_s: track.x[3] as i32,
                confidence: track.confidence,
                status,
            });
        }
        out
    }
}

fn covariance_healthy(p: &Matrix4<f32>) -> bool {
    for i in 0..4 {
        let d = p[(i, i)];
        if !d.is_finite() || !(MIN_COV..=MAX_COV).contains(&d) {
            return false;
        }
    }
    p.iter().all(|v| v.is_finite())
}

fn state_finite(x: &Vector4<f32>) -> bool {
    x.iter().all(|v| v.is_finite())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn det(x_mm: i16, y_mm: i16) -> Detection {
        Detection {
            x_mm,
            y_mm,
            speed_mm_s: 0,
            resolution_mm: 100,
            quality: 80,
            valid: true,
        }
    }

    fn frame(dets: &[Detection], timestamp_ms: u32, seq: u32) -> DetectionFrame {
        let mut f = DetectionFrame {
            timestamp_ms,
            seq,
            ..Default::default()
        };
        for (i, d) in dets.iter().take(MAX_TARGETS).enumerate() {
            f.detections[i] = *d;
            f.target_count += 1;
        }
        f
    }

    /// Runs `n` ticks with the same detections at 30 ms cadence.
    fn run(tracker: &mut Tracker, dets: &[Detection], n: u32, start_ms: u32) -> TrackFrame {
        let mut last = TrackFrame::default();
        for i in 0..n {
            last = tracker.tick(&frame(dets, start_ms + i * 30, i));
        }
        last
    }

    #[test]
    fn confirms_after_three_hits() {
        let mut tracker = Tracker::with_defaults();

        let out = run(&mut tracker, &[det(1000, 2000)], 2, 0);
        assert!(out.tracks.is_empty(), "tentative tracks are not reported");

        let out = tracker.tick(&frame(&[det(1000, 2000)], 60, 2));
        assert_eq!(out.tracks.len(), 1);
        assert_eq!(out.tracks[0].status, TrackStatus::Confirmed);
        assert_ne!(out.tracks[0].track_id, 0);
        assert_eq!(tracker.stats().confirmations, 1);
    }

    #[test]
    fn id_is_stable_while_target_stays_in_gate() {
        let mut tracker = Tracker::with_defaults();
        let out = run(&mut tracker, &[det(1000, 2000)], 5, 0);
        let id = out.tracks[0].track_id;

        // Drift 40 mm per tick, well inside the gate.
        for i in 0..20i16 {
            let out = tracker.tick(&frame(
                &[det(1000 + 40 * (i + 1), 2000)],
                150 + (i as u32) * 30,
                5 + i as u32,
            ));
            assert_eq!(out.tracks.len(), 1);
            assert_eq!(out.tracks[0].track_id, id);
        }
    }

    #[test]
    fn occlusion_bridges_and_recovers_same_id() {
        let mut tracker = Tracker::with_defaults();
        let out = run(&mut tracker, &[det(0, 2000)], 5, 0);
        let id = out.tracks[0].track_id;

        // 32 empty frames: one short of the timeout.
        let mut t = 150;
        for i in 0..32 {
            let out = tracker.tick(&frame(&[], t, 5 + i));
            assert_eq!(out.tracks.len(), 1);
            assert_eq!(out.tracks[0].status, TrackStatus::Occluded);
            t += 30;
        }

        let out = tracker.tick(&frame(&[det(0, 2050)], t, 40));
        assert_eq!(out.tracks.len(), 1);
        assert_eq!(out.tracks[0].track_id, id);
        assert_eq!(out.tracks[0].status, TrackStatus::Confirmed);
    }

    #[test]
    fn occlusion_timeout_retires_track() {
        let mut tracker = Tracker::with_defaults();
        run(&mut tracker, &[det(0, 2000)], 5, 0);

        let mut t = 150;
        for i in 0..33 {
            tracker.tick(&frame(&[], t, 5 + i));
            t += 30;
        }
        assert_eq!(tracker.active_count(), 0);
        assert_eq!(tracker.stats().retirements, 1);

        let out = tracker.tick(&frame(&[], t, 40));
        assert!(out.tracks.is_empty());
    }

    #[test]
    fn tentative_drop_after_three_misses() {
        let mut tracker = Tracker::with_defaults();
        tracker.tick(&frame(&[det(500, 500)], 0, 0));
        assert_eq!(tracker.active_count(), 1);

        for i in 1..=3 {
            tracker.tick(&frame(&[], i * 30, i));
        }
        assert_eq!(tracker.active_count(), 0);
    }

    #[test]
    fn capacity_never_exceeds_three() {
        let mut tracker = Tracker::with_defaults();
        let dets = [det(-4000, 1000), det(0, 1000), det(4000, 1000)];
        run(&mut tracker, &dets, 5, 0);
        assert_eq!(tracker.active_count(), MAX_TARGETS);

        // Third target vanishes and a brand-new one appears far away:
        // all slots are still held (the vanished track is merely
        // occluded), so the newcomer is ignored this tick.
        let shifted = [det(-4000, 1000), det(0, 1000), det(0, 5500)];
        tracker.tick(&frame(&shifted, 150, 5));
        assert_eq!(tracker.active_count(), MAX_TARGETS);
        assert_eq!(
            tracker
                .snapshots()
                .iter()
                .filter(|s| s.state == TrackState::Occluded)
                .count(),
            1
        );
    }

    #[test]
    fn greedy_association_prefers_closest_pair() {
        let mut tracker = Tracker::with_defaults();
        let out = run(&mut tracker, &[det(-1000, 2000), det(1000, 2000)], 5, 0);
        assert_eq!(out.tracks.len(), 2);
        let left_id = out
            .tracks
            .iter()
            .find(|t| t.x_mm < 0)
            .map(|t| t.track_id)
            .unwrap();

        // Both targets step right; each detection must stay with its
        // own track.
        let out = tracker.tick(&frame(&[det(-900, 2000), det(1100, 2000)], 150, 5));
        let left = out.tracks.iter().find(|t| t.x_mm < 0).unwrap();
        assert_eq!(left.track_id, left_id);
    }

    #[test]
    fn far_detection_spawns_instead_of_stealing() {
        let mut tracker = Tracker::with_defaults();
        run(&mut tracker, &[det(0, 2000)], 5, 0);

        // 3 m away: outside any reachable gate.
        let out = tracker.tick(&frame(&[det(3000, 2000)], 150, 5));
        // The confirmed track took a miss; the new one is tentative.
        assert_eq!(out.tracks.len(), 1);
        assert_eq!(out.tracks[0].status, TrackStatus::Occluded);
        assert_eq!(tracker.active_count(), 2);
    }

    #[test]
    fn id_allocation_skips_zero_on_wrap() {
        let mut tracker = Tracker::with_defaults();
        tracker.next_id = 255;
        assert_eq!(tracker.alloc_id(), 255);
        assert_eq!(tracker.alloc_id(), 1, "zero must be skipped");
        assert_eq!(tracker.alloc_id(), 2);
    }

    #[test]
    fn filter_reset_on_covariance_blowup() {
        let mut tracker = Tracker::with_defaults();
        run(&mut tracker, &[det(1000, 2000)], 5, 0);
        let id = tracker.snapshots()[0].track_id;

        // Sabotage the covariance past the ceiling; the next update
        // must reset rather than propagate garbage.
        if let Some(track) = tracker.slots[0].as_mut() {
            track.p = Matrix4::from_diagonal_element(MAX_COV * 10.0);
        }
        let before = tracker.stats().filter_resets;
        let out = tracker.tick(&frame(&[det(1000, 2000)], 150, 5));

        assert_eq!(tracker.stats().filter_resets, before + 1);
        assert_eq!(out.tracks.len(), 1);
        assert_eq!(out.tracks[0].track_id, id, "reset preserves identity");
        let snap = tracker.snapshots()[0];
        assert_relative_eq!(snap.x_mm, 1000.0, epsilon = 1.0);
        assert!(covariance_healthy(&tracker.slots[0].as_ref().unwrap().p));
    }

    #[test]
    fn time_jump_applies_intervening_misses() {
        let mut tracker = Tracker::with_defaults();
        run(&mut tracker, &[det(0, 2000)], 5, 0);

        // 10 ticks of silence compressed into one timestamp jump: the
        // track must come out occluded with the missed ticks accounted.
        let out = tracker.tick(&frame(&[], 150 + 9 * 30, 5));
        assert_eq!(out.tracks.len(), 1);
        assert_eq!(out.tracks[0].status, TrackStatus::Occluded);
        let snap = tracker.snapshots()[0];
        assert!(snap.misses >= 9);
    }

    #[test]
    fn confidence_grows_with_hits_and_age() {
        let mut tracker = Tracker::with_defaults();
        let out = run(&mut tracker, &[det(1000, 2000)], 3, 0);
        let early = out.tracks[0].confidence;

        let out = run(&mut tracker, &[det(1000, 2000)], 200, 90);
        let late = out.tracks[0].confidence;
        assert!(late > early);
        assert!(late <= 100);
    }

    #[test]
    fn flush_retires_everything() {
        let mut tracker = Tracker::with_defaults();
        run(&mut tracker, &[det(-1000, 2000), det(1000, 2000)], 5, 0);
        assert_eq!(tracker.active_count(), 2);

        tracker.flush();
        assert_eq!(tracker.active_count(), 0);
        assert_eq!(tracker.stats().retirements, 2);
    }

    #[test]
    fn config_setters_validate_ranges() {
        let mut tracker = Tracker::with_defaults();
        assert!(tracker.set_gate_distance(299).is_err());
        assert!(tracker.set_gate_distance(1001).is_err());
        assert!(tracker.set_gate_distance(800).is_ok());
        assert_relative_eq!(tracker.config().base_gate_mm, 800.0);

        assert!(tracker.set_occlusion_timeout(32).is_err());
        assert!(tracker.set_occlusion_timeout(100).is_err());
        assert!(tracker.set_occlusion_timeout(66).is_ok());
    }

    #[test]
    fn velocity_estimate_converges_for_moving_target() {
        let mut tracker = Tracker::with_defaults();
        // 50 mm per 30 ms tick along +x = 1666 mm/s.
        for i in 0..40i32 {
            tracker.tick(&frame(
                &[det((-3000 + 50 * i) as i16, 2000)],
                i as u32 * 30,
                i as u32,
            ));
        }
        let snap = tracker.snapshots()[0];
        assert_relative_eq!(snap.vx_mm_s, 1666.0, epsilon = 350.0);
        assert_relative_eq!(snap.vy_mm_s, 0.0, epsilon = 150.0);
    }
}
