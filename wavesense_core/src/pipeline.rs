//! Cooperative tick orchestration.
//!
//! One [`PresencePipeline`] owns the four components and enforces the
//! timing contract: every completed radar frame runs
//! Tracker -> ZoneEngine -> Smoother synchronously to completion and is
//! published before another byte is parsed. There is no suspension
//! inside a tick; the only boundaries are the byte feed and the
//! publisher sink.
//!
//! The pipeline also owns the radar-silence watchdog: after
//! `disconnect_timeout_ms` without a valid frame it retires every
//! track, forces every zone Vacant (with events), and counts a
//! disconnect, so no stale presence survives a silent radar.

use crate::metrics::CoreStats;
use crate::types::{DetectionFrame, EventQueue, SmoothedFrame, ZoneEvent, ZoneFrame, ZoneMap};
use crate::wavesense_parser::{Dialect, FrameParser};
use crate::wavesense_smoothing::{Smoother, SmootherConfig, SmootherError};
use crate::wavesense_tracking::{ConfigError, Tracker, TrackerConfig};
use crate::wavesense_zones::{ZoneEngine, ZoneEngineConfig, ZoneLoadReport, ZoneMapError};
use wavesense_env::{Clock, EventSink};

/// The sink type bound used throughout the pipeline.
pub trait PipelineSink: EventSink<SmoothedFrame, ZoneEvent> {}
impl<S: EventSink<SmoothedFrame, ZoneEvent>> PipelineSink for S {}

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    /// Which radar wire format to parse.
    pub dialect: Dialect,

    /// Silence window after which the radar is declared disconnected.
    pub disconnect_timeout_ms: u32,

    pub tracker: TrackerConfig,
    pub zones: ZoneEngineConfig,
    pub smoother: SmootherConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dialect: Dialect::Tracking,
            disconnect_timeout_ms: 3000,
            tracker: TrackerConfig::default(),
            zones: ZoneEngineConfig::default(),
            smoother: SmootherConfig::default(),
        }
    }
}

// ============================================================================
// PIPELINE
// ============================================================================

/// The complete radar-to-presence core. All storage is fixed at
/// construction; the tick path never allocates.
pub struct PresencePipeline {
    parser: FrameParser,
    tracker: Tracker,
    zones: ZoneEngine,
    smoother: Smoother,

    disconnect_timeout_ms: u32,
    last_valid_frame_ms: Option<u32>,
    connected: bool,

    ticks: u32,
    disconnects: u32,
    publish_failures: u32,
    last_tick_us: u32,
    max_tick_us: u32,

    /// Reused per-tick event buffer.
    events: EventQueue,
}

impl PresencePipeline {
    pub fn new(cfg: PipelineConfig) -> Self {
        Self {
            parser: FrameParser::new(cfg.dialect),
            tracker: Tracker::new(cfg.tracker),
            zones: ZoneEngine::new(cfg.zones),
            smoother: Smoother::new(cfg.smoother),
            disconnect_timeout_ms: cfg.disconnect_timeout_ms,
            last_valid_frame_ms: None,
            connected: false,
            ticks: 0,
            disconnects: 0,
            publish_failures: 0,
            last_tick_us: 0,
            max_tick_us: 0,
            events: EventQueue::new(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(PipelineConfig::default())
    }

    // ------------------------------------------------------------------
    // Data path
    // ------------------------------------------------------------------

    /// Feeds radar bytes. Each frame completed inside `bytes` runs a
    /// full tick (and publish) before the next byte is parsed, so frame
    /// N is always fully processed before frame N+1 begins.
    pub fn feed<C: Clock, S: PipelineSink>(&mut self, bytes: &[u8], clock: &C, sink: &mut S) {
        let mut rest = bytes;
        while !rest.is_empty() {
            let (consumed, frame) = self.parser.feed(rest, clock.now_ms());
            rest = &rest[consumed..];
            if let Some(frame) = frame {
                self.run_tick(&frame, clock, sink);
            }
        }
    }

    /// Idle-path watchdog; the host calls this periodically while no
    /// bytes arrive. Declares a disconnect after the silence timeout.
    pub fn poll<C: Clock, S: PipelineSink>(&mut self, clock: &C, sink: &mut S) {
        let now = clock.now_ms();
        if self.silence_expired(now) {
            self.handle_disconnect(now, sink);
        }
    }

    fn silence_expired(&self, now_ms: u32) -> bool {
        self.connected
            && self
                .last_valid_frame_ms
                .is_some_and(|last| now_ms.wrapping_sub(last) >= self.disconnect_timeout_ms)
    }

    fn run_tick<C: Clock, S: PipelineSink>(
        &mut self,
        frame: &DetectionFrame,
        clock: &C,
        sink: &mut S,
    ) {
        // A frame arriving after a silent interval must not inherit
        // stale tracks; flush first, then treat it as a fresh start.
        if self.silence_expired(frame.timestamp_ms) {
            self.handle_disconnect(frame.timestamp_ms, sink);
        }

        let start_us = clock.now_us();
        self.connected = true;
        self.last_valid_frame_ms = Some(frame.timestamp_ms);

        self.events.clear();
        let tracks = self.tracker.tick(frame);
        let zone_frame = self.zones.tick(&tracks, &mut self.events);
        let smoothed = self.smoother.tick(&zone_frame);

        self.ticks = self.ticks.wrapping_add(1);
        if sink.publish(&smoothed, &self.events).is_err() {
            self.publish_failures += 1;
        }

        let elapsed = clock.now_us().saturating_sub(start_us).min(u32::MAX as u64) as u32;
        self.last_tick_us = elapsed;
        self.max_tick_us = self.max_tick_us.max(elapsed);
    }

    /// Flushes all presence state after radar silence and publishes the
    /// all-vacant frame with its Vacant events.
    fn handle_disconnect<S: PipelineSink>(&mut self, now_ms: u32, sink: &mut S) {
        self.connected = false;
        self.disconnects += 1;

        self.tracker.flush();
        self.events.clear();
        self.zones.force_all_vacant(now_ms, &mut self.events);
        self.smoother.force_vacant(now_ms);

        // An empty raw frame reports the now-vacant zones outward.
        let empty = ZoneFrame {
            timestamp_ms: now_ms,
            ..Default::default()
        };
        let smoothed = self.smoother.tick(&empty);
        if sink.publish(&smoothed, &self.events).is_err() {
            self.publish_failures += 1;
        }
    }

    // ------------------------------------------------------------------
    // Configuration surface (between ticks only)
    // ------------------------------------------------------------------

    /// Atomically replaces the zone map; all-or-nothing validation.
    /// The smoother's per-zone table follows the new map, preserving
    /// phases of zones whose id survives.
    pub fn load_zones(&mut self, map: ZoneMap) -> Result<ZoneLoadReport, ZoneMapError> {
        let report = self.zones.load_zones(map)?;
        self.smoother.sync_zones(self.zones.active_map());
        Ok(report)
    }

    /// Tracker gate distance, 300..=1000 mm.
    pub fn set_gate_distance(&mut self, mm: u32) -> Result<(), ConfigError> {
        self.tracker.set_gate_distance(mm)
    }

    /// Tracker occlusion timeout, 33..=99 frames.
    pub fn set_occlusion_timeout(&mut self, frames: u16) -> Result<(), ConfigError> {
        self.tracker.set_occlusion_timeout(frames)
    }

    /// Per-zone smoother sensitivity, 0..=100, immediate.
    pub fn set_sensitivity(&mut self, zone_id: &str, value: u8) -> Result<(), SmootherError> {
        self.smoother.set_sensitivity(zone_id, value)
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// Snapshot of every counter in the core.
    pub fn stats(&self) -> CoreStats {
        CoreStats {
            parser: self.parser.stats(),
            tracker: self.tracker.stats(),
            zones: self.zones.stats(),
            smoother: self.smoother.stats(),
            ticks: self.ticks,
            disconnects: self.disconnects,
            publish_failures: self.publish_failures,
            last_tick_us: self.last_tick_us,
            max_tick_us: self.max_tick_us,
        }
    }

    /// True while valid frames are arriving inside the silence window.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn parser(&self) -> &FrameParser {
        &self.parser
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    pub fn zones(&self) -> &ZoneEngine {
        &self.zones
    }

    pub fn smoother(&self) -> &Smoother {
        &self.smoother
    }
}

// ============================================================================
// TESTS
// ============================================================================
