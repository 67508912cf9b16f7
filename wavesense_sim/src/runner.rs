//! Drives the pipeline through scenario scripts and checks oracles.

use crate::exporter::{SimExport, SimFrameRecord, TrackRecord, ZoneRecord};
use crate::scenarios::{map_of, rect_zone, ScenarioId};
use crate::world::{TargetScript, World};
use nalgebra::Vector2;
use tracing::debug;
use wavesense_core::wavesense_parser::encode_tracking_frame;
use wavesense_core::{
    CoreStats, Detection, PipelineConfig, PresencePipeline, SmoothedFrame, TrackState,
    TrackerConfig, ZoneEvent, ZoneEventKind, ZoneKind,
};
use wavesense_env::{ByteSource, Clock, ManualClock, RecordingSink, ReplaySource};

const DT_MS: u32 = 30;

/// UART deliveries are split into awkward chunk sizes on purpose, so
/// every run also exercises frame reassembly across read boundaries.
const UART_CHUNK: usize = 17;

// ============================================================================
// RESULT
// ============================================================================

#[derive(Debug)]
pub struct ScenarioResult {
    pub scenario: ScenarioId,
    pub seed: u64,
    pub ticks: u32,
    pub failures: Vec<String>,
    pub stats: CoreStats,
}

impl ScenarioResult {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

// ============================================================================
// CHECKS
// ============================================================================

#[derive(Default)]
struct Checks {
    failures: Vec<String>,
}

impl Checks {
    fn expect(&mut self, cond: bool, msg: impl Into<String>) {
        if !cond {
            self.failures.push(msg.into());
        }
    }
}

// ============================================================================
// HARNESS
// ============================================================================

/// One pipeline wired to a virtual clock, a scripted byte source, and a
/// recording sink.
struct Harness {
    pipeline: PresencePipeline,
    clock: ManualClock,
    sink: RecordingSink<SmoothedFrame, ZoneEvent>,
    source: ReplaySource,
    export: Option<SimExport>,
    ticks: u32,
}

impl Harness {
    fn new(scenario: ScenarioId, seed: u64, cfg: PipelineConfig, record: bool) -> Self {
        Self {
            pipeline: PresencePipeline::new(cfg),
            clock: ManualClock::new(),
            sink: RecordingSink::new(),
            source: ReplaySource::new(),
            export: record.then(|| SimExport::new(scenario.name(), seed, DT_MS)),
            ticks: 0,
        }
    }

    /// Encodes one radar frame, delivers it in UART-sized chunks, runs
    /// the tick, and advances virtual time.
    fn run_tick(&mut self, dets: &[Detection], truth: &[Vector2<f64>]) {
        let bytes = encode_tracking_frame(dets);
        self.source.push_chunked(&bytes, UART_CHUNK);
        self.drain();
        self.record(truth);
        self.clock.advance(DT_MS);
        self.ticks += 1;
    }

    /// One tick with no radar bytes at all (true silence).
    fn idle_tick(&mut self) {
        self.pipeline.poll(&self.clock, &mut self.sink);
        self.record(&[]);
        self.clock.advance(DT_MS);
        self.ticks += 1;
    }

    /// Delivers raw bytes (garbage injection) as one chunk.
    fn inject(&mut self, bytes: &[u8]) {
        self.source.push(bytes.to_vec());
        self.drain();
    }

    fn drain(&mut self) {
        let mut buf = [0u8; 48];
        loop {
            let n = self
                .source
                .read(&mut buf)
                .expect("replay source cannot fail");
            if n == 0 {
                break;
            }
            self.pipeline.feed(&buf[..n], &self.clock, &mut self.sink);
        }
    }

    fn record(&mut self, truth: &[Vector2<f64>]) {
        let Some(export) = &mut self.export else { return };
        let tracks = self
            .pipeline
            .tracker()
            .snapshots()
            .iter()
            .filter(|s| matches!(s.state, TrackState::Confirmed | TrackState::Occluded))
            .map(|s| TrackRecord {
                id: s.track_id,
                x_mm: s.x_mm as i32,
                y_mm: s.y_mm as i32,
                occluded: s.state == TrackState::Occluded,
            })
            .collect();
        let zones = self
            .sink
            .frames
            .last()
            .map(|frame| {
                frame
                    .zones
                    .iter()
                    .map(|z| ZoneRecord {
                        id: z.zone_id.to_string(),
                        occupied: z.occupied,
                        phase: format!("{:?}", z.phase).to_lowercase(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        export.add_frame(SimFrameRecord {
            tick: self.ticks,
            time_ms: self.clock.now_ms(),
            ground_truth: truth.iter().map(|p| [p.x, p.y]).collect(),
            tracks,
            zones,
        });
    }

    fn finish(
        self,
        scenario: ScenarioId,
        seed: u64,
        checks: Checks,
    ) -> (ScenarioResult, Option<SimExport>) {
        let result = ScenarioResult {
            scenario,
            seed,
            ticks: self.ticks,
            failures: checks.failures,
            stats: self.pipeline.stats(),
        };
        (result, self.export)
    }
}

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

/// Runs `ticks` world-driven ticks on the harness.
fn drive_world(h: &mut Harness, world: &mut World, ticks: u32) {
    for _ in 0..ticks {
        let truth = world.ground_truth();
        let dets = world.measure();
        h.run_tick(&dets, &truth);
    }
}

// ============================================================================
// RUNNER
// ============================================================================

pub struct ScenarioRunner {
    seed: u64,
}

impl ScenarioRunner {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Runs one scenario; `record` additionally captures a frame-by-
    /// frame export.
    pub fn run(&self, scenario: ScenarioId, record: bool) -> (ScenarioResult, Option<SimExport>) {
        debug!(scenario = scenario.name(), seed = self.seed, "starting");
        match scenario {
            ScenarioId::StationaryTarget => self.stationary_target(record),
            ScenarioId::BriefOcclusion => self.brief_occlusion(record),
            ScenarioId::ExcludePrecedence => self.exclude_precedence(record),
            ScenarioId::PolygonEdge => self.polygon_edge(record),
            ScenarioId::ParserGarbage => self.parser_garbage(record),
            ScenarioId::FilterDivergence => self.filter_divergence(record),
            ScenarioId::RadarSilence => self.radar_silence(record),
            ScenarioId::CrowdedRoom => self.crowded_room(record),
        }
    }

    fn harness(&self, scenario: ScenarioId, cfg: PipelineConfig, record: bool) -> Harness {
        Harness::new(scenario, self.seed, cfg, record)
    }

    // ------------------------------------------------------------------
    // SIM-001
    // ------------------------------------------------------------------

    fn stationary_target(&self, record: bool) -> (ScenarioResult, Option<SimExport>) {
        let scenario = ScenarioId::StationaryTarget;
        let mut h = self.harness(scenario, PipelineConfig::default(), record);
        h.pipeline
            .load_zones(map_of(vec![rect_zone(
                "desk",
                ZoneKind::Include,
                (500, 1500),
                (1500, 2500),
                50,
            )]))
            .expect("valid scenario map");

        let mut world = World::new(self.seed, 20.0, DT_MS);
        world.add_target(TargetScript::stationary(1000.0, 2000.0, 100));
        drive_world(&mut h, &mut world, 100);

        let mut checks = Checks::default();
        let stats = h.pipeline.stats();
        checks.expect(
            stats.tracker.confirmations == 1,
            format!("one confirmation expected, got {}", stats.tracker.confirmations),
        );

        let occupied_at = h
            .sink
            .events
            .iter()
            .find(|e| e.kind == ZoneEventKind::Occupied)
            .map(|e| e.timestamp_ms);
        checks.expect(
            occupied_at == Some(2 * DT_MS),
            format!("zone occupied at tick 3 (60 ms), got {occupied_at:?}"),
        );

        // sensitivity 50 -> 250 ms enter delay -> 9 ticks after tick 3.
        let first = h.sink.frames.iter().position(|f| f.zones[0].occupied);
        checks.expect(
            first == Some(11),
            format!("smoothed occupancy from tick 12, got index {first:?}"),
        );
        if let Some(first) = first {
            checks.expect(
                h.sink.frames[first..].iter().all(|f| f.zones[0].occupied),
                "occupancy must be stable once reported",
            );
        }
        h.finish(scenario, self.seed, checks)
    }

    // ------------------------------------------------------------------
    // SIM-002
    // ------------------------------------------------------------------

    fn brief_occlusion(&self, record: bool) -> (ScenarioResult, Option<SimExport>) {
        let scenario = ScenarioId::BriefOcclusion;
        let mut h = self.harness(scenario, PipelineConfig::default(), record);
        h.pipeline
            .load_zones(map_of(vec![rect_zone(
                "couch",
                ZoneKind::Include,
                (-500, 500),
                (1500, 2500),
                50,
            )]))
            .expect("valid scenario map");

        let mut world = World::new(self.seed, 15.0, DT_MS);
        world.add_target(TargetScript::stationary(0.0, 2000.0, 50));
        world.add_target(TargetScript {
            appears_at: 70,
            vanishes_at: 100,
            start_pos: Vector2::new(0.0, 2050.0),
            velocity: Vector2::zeros(),
            reported_speed: 0,
        });

        drive_world(&mut h, &mut world, 50);
        let mut checks = Checks::default();
        let snapshots = h.pipeline.tracker().snapshots();
        checks.expect(snapshots.len() == 1, "one track before the gap");
        let id = snapshots.first().map(|s| s.track_id).unwrap_or(0);

        drive_world(&mut h, &mut world, 50);

        let stats = h.pipeline.stats();
        checks.expect(
            stats.tracker.retirements == 0,
            format!("no retirement across a 20-frame gap, got {}", stats.tracker.retirements),
        );
        let snapshots = h.pipeline.tracker().snapshots();
        checks.expect(
            snapshots.len() == 1 && snapshots[0].track_id == id,
            "track id must survive the occlusion",
        );

        let first = h
            .sink
            .frames
            .iter()
            .position(|f| f.zones[0].occupied)
            .unwrap_or(usize::MAX);
        checks.expect(first < 50, "zone occupied before the gap");
        if first < 50 {
            checks.expect(
                h.sink.frames[first..].iter().all(|f| f.zones[0].occupied),
                "hold must bridge the 600 ms gap without dropping",
            );
        }
        h.finish(scenario, self.seed, checks)
    }

    // ------------------------------------------------------------------
    // SIM-003
    // ------------------------------------------------------------------

    fn exclude_precedence(&self, record: bool) -> (ScenarioResult, Option<SimExport>) {
        let scenario = ScenarioId::ExcludePrecedence;
        let mut h = self.harness(scenario, PipelineConfig::default(), record);
        h.pipeline
            .load_zones(map_of(vec![
                rect_zone("room", ZoneKind::Include, (-1000, 1000), (0, 3000), 50),
                rect_zone("fan", ZoneKind::Exclude, (-200, 200), (1000, 1500), 50),
            ]))
            .expect("valid scenario map");

        let mut world = World::new(self.seed, 10.0, DT_MS);
        world.add_target(TargetScript::stationary(0.0, 1200.0, 30));
        drive_world(&mut h, &mut world, 30);

        let mut checks = Checks::default();
        let stats = h.pipeline.stats();
        checks.expect(stats.zones.tracks_excluded > 0, "tracks_excluded must count");
        checks.expect(
            h.sink.frames.iter().all(|f| !f.zones[0].occupied),
            "include zone must stay vacant",
        );
        checks.expect(h.sink.events.is_empty(), "no events for a suppressed track");
        h.finish(scenario, self.seed, checks)
    }

    // ------------------------------------------------------------------
    // SIM-004
    // ------------------------------------------------------------------

    fn polygon_edge(&self, record: bool) -> (ScenarioResult, Option<SimExport>) {
        let scenario = ScenarioId::PolygonEdge;
        let mut h = self.harness(scenario, PipelineConfig::default(), record);
        h.pipeline
            .load_zones(map_of(vec![rect_zone(
                "pad",
                ZoneKind::Include,
                (0, 1000),
                (0, 1000),
                100,
            )]))
            .expect("valid scenario map");

        // Exact coordinates, no noise: the point sits on the right edge.
        for _ in 0..5 {
            h.run_tick(&[det(1000, 500)], &[Vector2::new(1000.0, 500.0)]);
        }

        let mut checks = Checks::default();
        checks.expect(
            h.sink.frames.last().is_some_and(|f| f.zones[0].occupied),
            "edge point must count as inside",
        );
        checks.expect(
            h.sink.events.iter().any(|e| e.kind == ZoneEventKind::Occupied),
            "occupied event expected",
        );
        h.finish(scenario, self.seed, checks)
    }

    // ------------------------------------------------------------------
    // SIM-005
    // ------------------------------------------------------------------

    fn parser_garbage(&self, record: bool) -> (ScenarioResult, Option<SimExport>) {
        let scenario = ScenarioId::ParserGarbage;
        let mut h = self.harness(scenario, PipelineConfig::default(), record);

        let mut bytes: Vec<u8> = (0u8..37).map(|b| b.wrapping_mul(3).wrapping_add(1)).collect();
        bytes.extend_from_slice(&encode_tracking_frame(&[det(1000, 2000)]));
        h.inject(&bytes);
        h.record(&[Vector2::new(1000.0, 2000.0)]);

        let mut checks = Checks::default();
        let stats = h.pipeline.stats();
        checks.expect(
            stats.parser.frames_parsed == 1,
            format!("one frame parsed, got {}", stats.parser.frames_parsed),
        );
        checks.expect(
            stats.parser.frames_invalid == 0,
            "garbage must never complete a frame",
        );
        checks.expect(stats.ticks == 1, "exactly one tick");
        h.finish(scenario, self.seed, checks)
    }

    // ------------------------------------------------------------------
    // SIM-006
    // ------------------------------------------------------------------

    fn filter_divergence(&self, record: bool) -> (ScenarioResult, Option<SimExport>) {
        let scenario = ScenarioId::FilterDivergence;
        // Absurd process noise: a few unobserved predictions push the
        // covariance past its ceiling.
        let cfg = PipelineConfig {
            tracker: TrackerConfig {
                process_noise_pos: 3e11,
                ..TrackerConfig::default()
            },
            ..PipelineConfig::default()
        };
        let mut h = self.harness(scenario, cfg, record);

        for _ in 0..5 {
            h.run_tick(&[det(0, 2000)], &[Vector2::new(0.0, 2000.0)]);
        }
        let mut checks = Checks::default();
        let id = h
            .pipeline
            .tracker()
            .snapshots()
            .first()
            .map(|s| s.track_id)
            .unwrap_or(0);
        checks.expect(id != 0, "track must exist before divergence");

        for _ in 0..6 {
            h.run_tick(&[], &[]);
        }
        let stats = h.pipeline.stats();
        checks.expect(
            stats.tracker.filter_resets >= 1,
            "covariance ceiling must force a reset",
        );
        let snapshots = h.pipeline.tracker().snapshots();
        checks.expect(
            snapshots.len() == 1 && snapshots[0].track_id == id,
            "reset must preserve the track identity",
        );
        h.finish(scenario, self.seed, checks)
    }

    // ------------------------------------------------------------------
    // SIM-007
    // ------------------------------------------------------------------

    fn radar_silence(&self, record: bool) -> (ScenarioResult, Option<SimExport>) {
        let scenario = ScenarioId::RadarSilence;
        let mut h = self.harness(scenario, PipelineConfig::default(), record);
        h.pipeline
            .load_zones(map_of(vec![rect_zone(
                "room",
                ZoneKind::Include,
                (-1000, 1000),
                (1000, 3000),
                100,
            )]))
            .expect("valid scenario map");

        let mut world = World::new(self.seed, 15.0, DT_MS);
        world.add_target(TargetScript::stationary(0.0, 2000.0, 10));
        drive_world(&mut h, &mut world, 10);

        let mut checks = Checks::default();
        checks.expect(
            h.sink.frames.last().is_some_and(|f| f.zones[0].occupied),
            "zone occupied before the silence",
        );

        // 110 silent ticks = 3.3 s, past the 3 s disconnect timeout.
        for _ in 0..110 {
            h.idle_tick();
        }

        let stats = h.pipeline.stats();
        checks.expect(stats.disconnects == 1, "silence must count one disconnect");
        checks.expect(
            h.pipeline.tracker().active_count() == 0,
            "tracks must be flushed",
        );
        checks.expect(
            h.sink.frames.last().is_some_and(|f| !f.zones[0].occupied),
            "zones must be vacant after the flush",
        );
        checks.expect(
            h.sink.events.iter().any(|e| e.kind == ZoneEventKind::Vacant),
            "vacant event expected",
        );
        h.finish(scenario, self.seed, checks)
    }

    // ------------------------------------------------------------------
    // SIM-008
    // ------------------------------------------------------------------

    fn crowded_room(&self, record: bool) -> (ScenarioResult, Option<SimExport>) {
        let scenario = ScenarioId::CrowdedRoom;
        let mut h = self.harness(scenario, PipelineConfig::default(), record);
        h.pipeline
            .load_zones(map_of(vec![rect_zone(
                "room",
                ZoneKind::Include,
                (-4500, 4500),
                (500, 4500),
                100,
            )]))
            .expect("valid scenario map");

        let mut world = World::new(self.seed, 20.0, DT_MS);
        world.add_target(TargetScript::stationary(-3000.0, 2000.0, 60));
        world.add_target(TargetScript::stationary(0.0, 2000.0, 60));
        world.add_target(TargetScript::stationary(3000.0, 2000.0, 60));
        drive_world(&mut h, &mut world, 60);

        let mut checks = Checks::default();
        checks.expect(
            h.pipeline.tracker().active_count() == 3,
            "all three targets tracked",
        );
        let states = h.pipeline.zones().zone_states();
        checks.expect(
            states[0].target_count == 3,
            format!("zone must hold 3 targets, got {}", states[0].target_count),
        );
        checks.expect(
            h.sink.frames.last().is_some_and(|f| f.zones[0].occupied),
            "room occupied",
        );
        h.finish(scenario, self.seed, checks)
    }
}
