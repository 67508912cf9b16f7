//! Scripted ground-truth world and noisy measurement generation.

use nalgebra::Vector2;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use wavesense_core::{Detection, MAX_TARGETS};

/// One scripted target: a straight-line trajectory active over a tick
/// range. Millimetres and mm/s, radar coordinate convention.
#[derive(Debug, Clone, Copy)]
pub struct TargetScript {
    /// First tick (inclusive) the radar reports this target.
    pub appears_at: u32,

    /// First tick the target is gone again (exclusive).
    pub vanishes_at: u32,

    pub start_pos: Vector2<f64>,
    pub velocity: Vector2<f64>,

    /// Radial speed reported by the radar, mm/s.
    pub reported_speed: i16,
}

impl TargetScript {
    /// A stationary target visible for `ticks` ticks from tick 0.
    pub fn stationary(x_mm: f64, y_mm: f64, ticks: u32) -> Self {
        Self {
            appears_at: 0,
            vanishes_at: ticks,
            start_pos: Vector2::new(x_mm, y_mm),
            velocity: Vector2::zeros(),
            reported_speed: 0,
        }
    }

    /// True position at a tick, ignoring visibility.
    pub fn position_at(&self, tick: u32, dt_ms: u32) -> Vector2<f64> {
        let t = tick as f64 * dt_ms as f64 / 1000.0;
        self.start_pos + self.velocity * t
    }

    fn visible_at(&self, tick: u32) -> bool {
        (self.appears_at..self.vanishes_at).contains(&tick)
    }
}

/// Ground truth plus a seeded measurement-noise stream.
pub struct World {
    rng: ChaCha8Rng,
    noise: Normal<f64>,
    targets: Vec<TargetScript>,
    dt_ms: u32,
    tick: u32,
}

impl World {
    pub fn new(seed: u64, noise_std_mm: f64, dt_ms: u32) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            noise: Normal::new(0.0, noise_std_mm.max(f64::MIN_POSITIVE)).expect("std is finite"),
            targets: Vec::new(),
            dt_ms,
            tick: 0,
        }
    }

    pub fn add_target(&mut self, script: TargetScript) {
        self.targets.push(script);
    }

    pub fn tick(&self) -> u32 {
        self.tick
    }

    /// True positions of currently visible targets (export/oracle use).
    pub fn ground_truth(&self) -> Vec<Vector2<f64>> {
        self.targets
            .iter()
            .filter(|t| t.visible_at(self.tick))
            .map(|t| t.position_at(self.tick, self.dt_ms))
            .collect()
    }

    /// Noisy radar measurements for the current tick, then advances.
    /// At most [`MAX_TARGETS`] targets are reported, like the hardware.
    pub fn measure(&mut self) -> Vec<Detection> {
        let tick = self.tick;
        self.tick += 1;

        let mut out = Vec::new();
        let scripts: Vec<TargetScript> = self
            .targets
            .iter()
            .filter(|t| t.visible_at(tick))
            .take(MAX_TARGETS)
            .copied()
            .collect();
        for script in scripts {
            let truth = script.position_at(tick, self.dt_ms);
            let x = truth.x + self.noise.sample(&mut self.rng);
            let y = truth.y + self.noise.sample(&mut self.rng);
            out.push(Detection {
                x_mm: x.clamp(-6000.0, 6000.0) as i16,
                y_mm: y.clamp(0.0, 6000.0) as i16,
                speed_mm_s: script.reported_speed,
                resolution_mm: 150,
                quality: 80,
                valid: true,
            });
        }
        out
    }
}
