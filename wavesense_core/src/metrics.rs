//! Aggregate introspection snapshot across all pipeline components.
//!
//! Every counter in the core is a plain saturating/wrapping integer
//! owned by its component; this module only gathers them into one
//! serializable snapshot for the host's diagnostics surface.

use crate::wavesense_parser::ParserStats;
use crate::wavesense_smoothing::SmootherStats;
use crate::wavesense_tracking::TrackerStats;
use crate::wavesense_zones::ZoneStats;
use serde::Serialize;

/// Read-only snapshot of every per-component counter plus the
/// pipeline's own bookkeeping.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CoreStats {
    pub parser: ParserStats,
    pub tracker: TrackerStats,
    pub zones: ZoneStats,
    pub smoother: SmootherStats,

    /// Completed pipeline ticks.
    pub ticks: u32,

    /// Radar-silence episodes that flushed the pipeline.
    pub disconnects: u32,

    /// Sink deliveries that returned an error.
    pub publish_failures: u32,

    /// Duration of the most recent tick, microseconds.
    pub last_tick_us: u32,

    /// Worst tick observed since boot, microseconds.
    pub max_tick_us: u32,
}

impl CoreStats {
    /// Serializes the snapshot for the host's telemetry channel.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
