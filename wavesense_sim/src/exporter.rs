//! Frame-by-frame JSON export for offline inspection.

use serde::Serialize;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

#[derive(Debug, Clone, Serialize)]
pub struct TrackRecord {
    pub id: u8,
    pub x_mm: i32,
    pub y_mm: i32,
    pub occluded: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ZoneRecord {
    pub id: String,
    pub occupied: bool,
    pub phase: String,
}

/// One tick of the simulation, ground truth next to pipeline output.
#[derive(Debug, Clone, Serialize)]
pub struct SimFrameRecord {
    pub tick: u32,
    pub time_ms: u32,
    pub ground_truth: Vec<[f64; 2]>,
    pub tracks: Vec<TrackRecord>,
    pub zones: Vec<ZoneRecord>,
}

/// Accumulated run export.
#[derive(Debug, Serialize)]
pub struct SimExport {
    pub scenario: String,
    pub seed: u64,
    pub dt_ms: u32,
    pub frames: Vec<SimFrameRecord>,
}

impl SimExport {
    pub fn new(scenario: &str, seed: u64, dt_ms: u32) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            dt_ms,
            frames: Vec::new(),
        }
    }

    pub fn add_frame(&mut self, frame: SimFrameRecord) {
        self.frames.push(frame);
    }

    /// Writes the run as pretty JSON.
    pub fn save(&self, path: &Path) -> io::Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_serializes() {
        let mut export = SimExport::new("stationary-target", 42, 30);
        export.add_frame(SimFrameRecord {
            tick: 0,
            time_ms: 0,
            ground_truth: vec![[1000.0, 2000.0]],
            tracks: vec![],
            zones: vec![ZoneRecord {
                id: "desk".into(),
                occupied: false,
                phase: "vacant".into(),
            }],
        });
        let json = serde_json::to_string(&export).unwrap();
        assert!(json.contains("stationary-target"));
        assert!(json.contains("ground_truth"));
    }
}
