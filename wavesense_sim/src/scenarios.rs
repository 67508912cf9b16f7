//! Scenario catalogue for the simulation harness.

use wavesense_core::{Vertex, Zone, ZoneKind, ZoneMap};

/// Scenario identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// SIM-001: one stationary target, confirm + occupy + smooth timing
    StationaryTarget,

    /// SIM-002: target disappears for 20 frames and returns
    BriefOcclusion,

    /// SIM-003: exclude zone suppresses a track inside an include zone
    ExcludePrecedence,

    /// SIM-004: detection exactly on a zone edge counts as inside
    PolygonEdge,

    /// SIM-005: garbage bytes before the first valid frame
    ParserGarbage,

    /// SIM-006: covariance blow-up forces a filter reset, id survives
    FilterDivergence,

    /// SIM-007: radar goes silent; presence must flush, not linger
    RadarSilence,

    /// SIM-008: three simultaneous targets at the hardware ceiling
    CrowdedRoom,
}

impl ScenarioId {
    /// Returns every scenario, in CLI order.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::StationaryTarget,
            ScenarioId::BriefOcclusion,
            ScenarioId::ExcludePrecedence,
            ScenarioId::PolygonEdge,
            ScenarioId::ParserGarbage,
            ScenarioId::FilterDivergence,
            ScenarioId::RadarSilence,
            ScenarioId::CrowdedRoom,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::StationaryTarget => "stationary-target",
            ScenarioId::BriefOcclusion => "brief-occlusion",
            ScenarioId::ExcludePrecedence => "exclude-precedence",
            ScenarioId::PolygonEdge => "polygon-edge",
            ScenarioId::ParserGarbage => "parser-garbage",
            ScenarioId::FilterDivergence => "filter-divergence",
            ScenarioId::RadarSilence => "radar-silence",
            ScenarioId::CrowdedRoom => "crowded-room",
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            ScenarioId::StationaryTarget => {
                "100 frames of one target at (1000, 2000); checks confirm/occupy/smooth timing"
            }
            ScenarioId::BriefOcclusion => {
                "50 frames present, 20 empty, 30 present; track id and occupancy must bridge"
            }
            ScenarioId::ExcludePrecedence => {
                "track inside an exclude zone contributes to no include zone"
            }
            ScenarioId::PolygonEdge => "a detection exactly on a zone edge is inside",
            ScenarioId::ParserGarbage => "37 garbage bytes then one valid frame; clean resync",
            ScenarioId::FilterDivergence => {
                "covariance driven past its ceiling; reset without losing the track"
            }
            ScenarioId::RadarSilence => "3 s of silence flushes tracks and forces zones vacant",
            ScenarioId::CrowdedRoom => "three targets saturate the tracker without overflow",
        }
    }

    pub fn from_name(name: &str) -> Option<ScenarioId> {
        ScenarioId::all().into_iter().find(|s| s.name() == name)
    }
}

/// Axis-aligned rectangle helper for scenario zone maps.
pub fn rect_zone(id: &str, kind: ZoneKind, x: (i16, i16), y: (i16, i16), sensitivity: u8) -> Zone {
    let mut zid = wavesense_core::ZoneId::new();
    zid.push_str(id);
    let mut name = arrayvec::ArrayString::<32>::new();
    name.push_str(id);
    Zone {
        id: zid,
        name,
        kind,
        vertices: [
            Vertex::new(x.0, y.0),
            Vertex::new(x.1, y.0),
            Vertex::new(x.1, y.1),
            Vertex::new(x.0, y.1),
        ]
        .into_iter()
        .collect(),
        sensitivity,
    }
}

pub fn map_of(zones: Vec<Zone>) -> ZoneMap {
    ZoneMap {
        zones: zones.into_iter().collect(),
        version: 1,
    }
}
