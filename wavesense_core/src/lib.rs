//! WaveSense Core - Radar-to-Presence Pipeline Library
//!
//! The real-time core of a mmWave presence sensor, as four engines on
//! one cooperative tick:
//! 1. **PARSE**: UART byte stream -> validated detection frames
//! 2. **TRACK**: bounded Kalman bank -> persistent targets with stable ids
//! 3. **ZONE**: polygon membership -> raw per-zone occupancy + events
//! 4. **SMOOTH**: per-zone hysteresis -> flicker-free presence
//!
//! Everything non-deterministic (clock, publisher) is injected through
//! `wavesense_env`; all storage is fixed-capacity and the tick path
//! never allocates. Anomalies never escape as errors: malformed frames,
//! filter divergence, and radar silence are recovered locally and
//! surfaced as counters.

pub mod metrics;
pub mod pipeline;
pub mod types;
pub mod wavesense_parser;
pub mod wavesense_smoothing;
pub mod wavesense_tracking;
pub mod wavesense_zones;

// Re-export key types for convenience
pub use metrics::CoreStats;
pub use pipeline::{PipelineConfig, PipelineSink, PresencePipeline};
pub use types::{
    Detection, DetectionFrame, EventQueue, PresencePhase, SmoothedFrame, SmoothedZone,
    TrackFrame, TrackReport, TrackStatus, Vertex, Zone, ZoneEvent, ZoneEventKind, ZoneFrame,
    ZoneId, ZoneKind, ZoneMap, ZoneState, MAX_TARGETS, MAX_VERTICES, MAX_ZONES,
};
pub use wavesense_parser::{Dialect, FrameParser, ParserStats, PresenceReading};
pub use wavesense_smoothing::{Smoother, SmootherConfig, SmootherError, SmootherStats};
pub use wavesense_tracking::{
    ConfigError, Tracker, TrackerConfig, TrackerStats, TrackSnapshot, TrackState,
};
pub use wavesense_zones::{
    ZoneEngine, ZoneEngineConfig, ZoneLoadReport, ZoneMapError, ZoneStats,
};
