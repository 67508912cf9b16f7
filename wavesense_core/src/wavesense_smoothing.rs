//! The "SMOOTH" Engine - per-zone presence hysteresis
//!
//! Turns raw per-zone occupancy into a flicker-free signal with a
//! 4-state machine per zone:
//!
//! | phase    | reported | entered when                    |
//! |----------|----------|---------------------------------|
//! | Vacant   | false    | initial; hold expired           |
//! | Entering | false    | raw went true from Vacant       |
//! | Occupied | true     | raw held true past enter delay  |
//! | Holding  | true     | raw went false from Occupied    |
//!
//! Sensitivity (0-100, per zone) maps to both timers:
//! `hold = (100 - s) * 50 ms` (clamped to global bounds, lower bound
//! wins) and `enter_delay = (100 - s) * 5 ms`.
//!
//! Configuration edits apply immediately and never reset the current
//! phase.

use crate::types::{
    PresencePhase, SmoothedFrame, SmoothedZone, ZoneFrame, ZoneId, ZoneKind, ZoneMap, MAX_ZONES,
};
use arrayvec::ArrayVec;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct SmootherConfig {
    /// Global floor on hold time; wins over the sensitivity mapping.
    pub min_hold_ms: u32,

    /// Global ceiling on hold time.
    pub max_hold_ms: u32,
}

impl Default for SmootherConfig {
    fn default() -> Self {
        Self {
            min_hold_ms: 100,
            max_hold_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SmootherError {
    #[error("unknown zone '{0}'")]
    UnknownZone(String),

    #[error("sensitivity {0} outside 0..=100")]
    SensitivityOutOfRange(u8),
}

/// Smoother counters.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SmootherStats {
    /// Phase transitions across all zones.
    pub state_changes: u32,

    /// Holds cancelled by the target reappearing.
    pub hold_extensions: u32,

    /// Raw pulses absorbed in Entering before ever reporting occupied.
    pub false_occupancy_prevented: u32,
}

// ============================================================================
// PER-ZONE STATE
// ============================================================================

#[derive(Debug, Clone)]
struct ZoneSmooth {
    zone_id: ZoneId,
    sensitivity: u8,
    phase: PresencePhase,
    phase_since_ms: u32,

    /// Effective hold for the current Holding phase; fixed (confidence
    /// multiplier included) at the moment Holding is entered.
    hold_ms: u32,

    /// Mean member confidence from the last tick the zone was raw
    /// occupied. The zone is already empty when Holding starts, so the
    /// hold weighting uses this remembered value.
    last_confidence: u8,
}

impl ZoneSmooth {
    fn new(zone_id: ZoneId, sensitivity: u8) -> Self {
        Self {
            zone_id,
            sensitivity,
            phase: PresencePhase::Vacant,
            phase_since_ms: 0,
            hold_ms: 0,
            last_confidence: 0,
        }
    }
}

// ============================================================================
// SMOOTHER
// ============================================================================

/// Per-zone hysteresis bank.
pub struct Smoother {
    cfg: SmootherConfig,
    zones: ArrayVec<ZoneSmooth, MAX_ZONES>,
    stats: SmootherStats,
}

impl Smoother {
    pub fn new(cfg: SmootherConfig) -> Self {
        Self {
            cfg,
            zones: ArrayVec::new(),
            stats: SmootherStats::default(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(SmootherConfig::default())
    }

    // ------------------------------------------------------------------
    // Configuration surface
    // ------------------------------------------------------------------

    /// Aligns the per-zone table with a (re)loaded map. Zones whose id
    /// survives keep their phase; sensitivity is taken from the map.
    pub fn sync_zones(&mut self, map: &ZoneMap) {
        let mut next: ArrayVec<ZoneSmooth, MAX_ZONES> = ArrayVec::new();
        for zone in map.zones.iter().filter(|z| z.kind == ZoneKind::Include) {
            match self.zones.iter().find(|s| s.zone_id == zone.id) {
                Some(prev) => {
                    let mut kept = prev.clone();
                    kept.sensitivity = zone.sensitivity;
                    next.push(kept);
                }
                None => next.push(ZoneSmooth::new(zone.id, zone.sensitivity)),
            }
        }
        self.zones = next;
    }

    /// Immediate sensitivity edit. The current phase is never reset.
    pub fn set_sensitivity(&mut self, zone_id: &str, value: u8) -> Result<(), SmootherError> {
        if value > 100 {
            return Err(SmootherError::SensitivityOutOfRange(value));
        }
        let zone = self
            .zones
            .iter_mut()
            .find(|z| z.zone_id.as_str() == zone_id)
            .ok_or_else(|| SmootherError::UnknownZone(zone_id.to_string()))?;
        zone.sensitivity = value;
        Ok(())
    }

    pub fn stats(&self) -> SmootherStats {
        self.stats
    }

    /// Current per-zone phases without advancing any timers.
    pub fn snapshot(&self) -> ArrayVec<SmoothedZone, MAX_ZONES> {
        self.zones
            .iter()
            .map(|z| SmoothedZone {
                zone_id: z.zone_id,
                occupied: z.phase.reports_occupied(),
                phase: z.phase,
                phase_since_ms: z.phase_since_ms,
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------

    /// Advances every zone's machine against the tick's raw occupancy.
    pub fn tick(&mut self, raw: &ZoneFrame) -> SmoothedFrame {
        let now = raw.timestamp_ms;
        let mut out = SmoothedFrame {
            timestamp_ms: now,
            ..Default::default()
        };

        for zi in 0..self.zones.len() {
            let (raw_occupied, confidence) = raw
                .zones
                .iter()
                .find(|s| s.zone_id == self.zones[zi].zone_id)
                .map(|s| (s.occupied, s.confidence))
                .unwrap_or((false, 0));
            self.step_zone(zi, raw_occupied, confidence, now);

            let zone = &self.zones[zi];
            out.zones.push(SmoothedZone {
                zone_id: zone.zone_id,
                occupied: zone.phase.reports_occupied(),
                phase: zone.phase,
                phase_since_ms: zone.phase_since_ms,
            });
        }
        out
    }

    /// Drops every zone to Vacant (radar-disconnect recovery).
    pub fn force_vacant(&mut self, now_ms: u32) {
        for zone in self.zones.iter_mut() {
            if zone.phase != PresencePhase::Vacant {
                zone.phase = PresencePhase::Vacant;
                zone.phase_since_ms = now_ms;
                self.stats.state_changes += 1;
            }
        }
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn step_zone(&mut self, zi: usize, raw: bool, confidence: u8, now: u32) {
        let enter_delay = enter_delay_ms(self.zones[zi].sensitivity);
        let zone = &mut self.zones[zi];
        if raw {
            zone.last_confidence = confidence;
        }
        let elapsed = now.wrapping_sub(zone.phase_since_ms);

        let next = match zone.phase {
            PresencePhase::Vacant if raw => {
                if enter_delay == 0 {
                    Some(PresencePhase::Occupied)
                } else {
                    Some(PresencePhase::Entering)
                }
            }
            PresencePhase::Entering => {
                if !raw {
                    self.stats.false_occupancy_prevented += 1;
                    Some(PresencePhase::Vacant)
                } else if elapsed >= enter_delay {
                    Some(PresencePhase::Occupied)
                } else {
                    None
                }
            }
            PresencePhase::Occupied if !raw => Some(PresencePhase::Holding),
            PresencePhase::Holding => {
                if raw {
                    self.stats.hold_extensions += 1;
                    Some(PresencePhase::Occupied)
                } else if elapsed >= zone.hold_ms {
                    Some(PresencePhase::Vacant)
                } else {
                    None
                }
            }
            _ => None,
        };

        if let Some(phase) = next {
            if phase == PresencePhase::Holding {
                // Multiplier applied once, at the moment of entering
                // Holding, using the confidence observed while the zone
                // was still occupied.
                zone.hold_ms = weighted_hold(
                    hold_time_ms(zone.sensitivity, &self.cfg),
                    zone.last_confidence,
                );
            }
            zone.phase = phase;
            zone.phase_since_ms = now;
            self.stats.state_changes += 1;
        }
    }
}

/// `(100 - sensitivity) * 50`, clamped to the global bounds. The lower
/// bound wins over the mapping.
fn hold_time_ms(sensitivity: u8, cfg: &SmootherConfig) -> u32 {
    let mapped = (100 - sensitivity.min(100) as u32) * 50;
    mapped.clamp(cfg.min_hold_ms, cfg.max_hold_ms)
}

/// `(100 - sensitivity) * 5`; range 0-500 ms, no clamps.
fn enter_delay_ms(sensitivity: u8) -> u32 {
    (100 - sensitivity.min(100) as u32) * 5
}

fn weighted_hold(base_ms: u32, confidence: u8) -> u32 {
    if confidence > 80 {
        base_ms.saturating_mul(3) / 2
    } else if confidence < 30 {
        base_ms / 2
    } else {
        base_ms
    }
}

// ============================================================================
// TESTS
// ============================================================================
