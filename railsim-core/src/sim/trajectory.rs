//! Per-tick trajectory output, one csv row per active train.

use crate::imports::*;
use std::io::Write;

/// One trajectory sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryRow {
    pub train_id: String,
    pub time_s: f64,
    pub travelled_distance_m: f64,
    pub acceleration_mps2: f64,
    pub speed_mps: f64,
    pub link_max_speed_mps: f64,
    pub energy_consumption_kwh: f64,
    pub max_delay_time_s: f64,
    pub delay_time_s: f64,
    pub stops: f64,
    pub tractive_force_n: f64,
    pub resistance_n: f64,
    pub used_tractive_power_kw: f64,
    pub grade_at_tip: f64,
    pub curvature_at_tip: f64,
    pub first_loco_notch: u32,
    pub optimization_enabled: bool,
}

/// Streams [TrajectoryRow]s to any writer as csv with a header row.
pub struct TrajectoryWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> TrajectoryWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: csv::WriterBuilder::new().has_headers(true).from_writer(writer),
        }
    }

    pub fn write_row(&mut self, row: &TrajectoryRow) -> anyhow::Result<()> {
        self.writer.serialize(row)?;
        Ok(())
    }

    pub fn flush(&mut self) -> anyhow::Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

impl TrajectoryWriter<std::fs::File> {
    pub fn create<P: AsRef<Path>>(filepath: P) -> anyhow::Result<Self> {
        let file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(filepath)?;
        Ok(Self::new(file))
    }
}
