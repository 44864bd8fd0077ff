//! Typed input records for nodes, links, and trains.
//!
//! These mirror the external data model: external units (tons, kW, liters)
//! and user-assigned ids, with scale factors applied on ingest. File
//! parsing itself lives outside the core; records arrive here already
//! structured (or through [SerdeAPI]).

use crate::consist::{CarConfig, LocomotiveConfig};
use crate::imports::*;

fn one() -> f64 {
    1.0
}

fn default_friction_coef() -> f64 {
    0.2
}

fn default_desired_deceleration() -> f64 {
    0.2
}

fn default_reaction_time() -> f64 {
    1.0
}

fn default_max_jerk() -> f64 {
    2.0
}

/// One node of the network input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub user_id: i64,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub desc: String,
    #[serde(default)]
    pub is_terminal: bool,
    /// Dwell time at a terminal, seconds.
    #[serde(default)]
    pub terminal_dwell_time_s: f64,
    #[serde(default = "one")]
    pub x_scale: f64,
    #[serde(default = "one")]
    pub y_scale: f64,
}

impl NodeRecord {
    /// Scaled planar position.
    pub fn scaled_coord(&self) -> Coord {
        Coord::new(self.x * self.x_scale, self.y * self.y_scale)
    }
}

impl Init for NodeRecord {}
impl SerdeAPI for NodeRecord {}

/// One link of the network input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkRecord {
    pub user_id: i64,
    pub from_node: i64,
    pub to_node: i64,
    /// Unscaled length, meters.
    pub length_m: f64,
    /// Unscaled free-flow speed, m/s.
    pub free_flow_speed_mps: f64,
    /// Signal membership id; 0 = no signal, 10001 marks the to-node as a
    /// depot.
    #[serde(default)]
    pub signal_id: i64,
    /// Fractional grade in the from -> to direction.
    #[serde(default)]
    pub grade: f64,
    /// Unsigned fractional curvature.
    #[serde(default)]
    pub curvature: f64,
    /// 1 = one-way from -> to, 2 = bidirectional.
    pub directions: u8,
    #[serde(default)]
    pub speed_variation: f64,
    #[serde(default)]
    pub has_catenary: bool,
    /// User node ids at which signals apply; empty means both ends for
    /// two-way links and the to-node for one-way links.
    #[serde(default)]
    pub signals_at_nodes: Vec<i64>,
    #[serde(default)]
    pub region: String,
    #[serde(default = "one")]
    pub length_scale: f64,
    #[serde(default = "one")]
    pub speed_scale: f64,
    /// Optional polyline points between the end nodes.
    #[serde(default)]
    pub intermediate_points: Vec<(f64, f64)>,
}

impl Init for LinkRecord {}
impl SerdeAPI for LinkRecord {}

/// A block of identical locomotives within a train record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocomotiveSpec {
    pub count: usize,
    #[serde(flatten)]
    pub config: LocomotiveConfig,
}

/// A block of identical cars within a train record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarSpec {
    pub count: usize,
    #[serde(flatten)]
    pub config: CarConfig,
}

/// One train of the simulation input. The path may be sparse; gaps are
/// closed by shortest-path search at setup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainRecord {
    pub user_id: String,
    /// Ordered user node ids.
    pub path: Vec<i64>,
    pub start_time_s: f64,
    #[serde(default = "default_friction_coef")]
    pub friction_coef: f64,
    pub locomotives: Vec<LocomotiveSpec>,
    #[serde(default)]
    pub cars: Vec<CarSpec>,
    #[serde(default)]
    pub optimize: bool,
    /// Desired service deceleration, m/s^2.
    #[serde(default = "default_desired_deceleration")]
    pub desired_deceleration: f64,
    /// Operator perception-reaction time, s.
    #[serde(default = "default_reaction_time")]
    pub reaction_time_s: f64,
    /// Maximum comfortable jerk, m/s^3.
    #[serde(default = "default_max_jerk")]
    pub max_jerk: f64,
}

impl Init for TrainRecord {}
impl SerdeAPI for TrainRecord {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consist::locomotive::powertrain::PowerType;
    use crate::traits::SerdeAPI;

    #[test]
    fn node_record_applies_scales() {
        let record = NodeRecord {
            user_id: 3,
            x: 2.0,
            y: 5.0,
            desc: String::new(),
            is_terminal: true,
            terminal_dwell_time_s: 0.0,
            x_scale: 10.0,
            y_scale: 100.0,
        };
        let coord = record.scaled_coord();
        assert!(almost_eq(coord.x, 20.0, None));
        assert!(almost_eq(coord.y, 500.0, None));
    }

    #[cfg(feature = "yaml")]
    #[test]
    fn node_record_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.yaml");
        let record = NodeRecord {
            user_id: 7,
            x: 1.5,
            y: -2.5,
            desc: "yard throat".into(),
            is_terminal: false,
            terminal_dwell_time_s: 0.0,
            x_scale: 1.0,
            y_scale: 1.0,
        };
        record.to_file(&path).unwrap();
        let loaded = NodeRecord::from_file(&path).unwrap();
        assert_eq!(record, loaded);
    }

    #[cfg(feature = "json")]
    #[test]
    fn train_record_round_trips_with_defaults() {
        let json = r#"{
            "user_id": "freight-1",
            "path": [10, 42],
            "start_time_s": 30.0,
            "locomotives": [{
                "count": 2,
                "power_type": "Diesel",
                "max_power_kw": 3000.0,
                "gross_mass_tons": 180.0,
                "drag_coef": 0.0055,
                "frontal_area_sqm": 105.6
            }]
        }"#;
        let record = TrainRecord::from_str(json, "json").unwrap();
        assert_eq!(record.locomotives[0].count, 2);
        assert_eq!(record.locomotives[0].config.power_type, PowerType::Diesel);
        assert!(almost_eq(record.friction_coef, 0.2, None));
        assert!(almost_eq(record.desired_deceleration, 0.2, None));
        assert!(record.cars.is_empty());
        let out = record.to_str("json").unwrap();
        let again = TrainRecord::from_str(&out, "json").unwrap();
        assert_eq!(record, again);
    }
}
