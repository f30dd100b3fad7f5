use crate::simulation::error::SimulationError;
use crate::simulation::events::{EventsSubscriber, FreewaySnapshot};
use serde::Serialize;
use std::any::Any;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

#[derive(Debug, Serialize)]
struct TrajectoryRow {
    timestep: u64,
    id: usize,
    lane: usize,
    lane_position: usize,
    velocity: u32,
}

/// Writes one row per car and published step, including the initial placement at step 0.
pub struct CsvTrajectoryWriter {
    writer: csv::Writer<Box<dyn Write + Send>>,
}

impl CsvTrajectoryWriter {
    pub fn new(path: &Path) -> Result<Self, SimulationError> {
        info!("Creating file: {path:?}");
        let file = File::create(path)?;
        Ok(Self::from_writer(Box::new(BufWriter::new(file))))
    }

    pub fn from_writer(writer: Box<dyn Write + Send>) -> Self {
        CsvTrajectoryWriter {
            writer: csv::Writer::from_writer(writer),
        }
    }
}

impl EventsSubscriber for CsvTrajectoryWriter {
    fn receive_step(&mut self, snapshot: &FreewaySnapshot) -> Result<(), SimulationError> {
        for vehicle in &snapshot.vehicles {
            self.writer.serialize(TrajectoryRow {
                timestep: snapshot.step,
                id: vehicle.id,
                lane: vehicle.lane,
                lane_position: vehicle.lane_position,
                velocity: vehicle.velocity,
            })?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), SimulationError> {
        self.writer.flush()?;
        Ok(())
    }

    fn as_any(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::vehicles::VehicleSnapshot;

    fn snapshot(step: u64) -> FreewaySnapshot {
        FreewaySnapshot {
            step,
            lanes: 2,
            length: 10,
            vehicles: vec![
                VehicleSnapshot {
                    id: 0,
                    lane: 1,
                    lane_position: 4,
                    velocity: 2,
                },
                VehicleSnapshot {
                    id: 1,
                    lane: 0,
                    lane_position: 9,
                    velocity: 0,
                },
            ],
        }
    }

    #[test]
    fn writes_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trajectories.csv");

        let mut writer = CsvTrajectoryWriter::new(&path).unwrap();
        writer.receive_step(&snapshot(0)).unwrap();
        writer.receive_step(&snapshot(1)).unwrap();
        writer.finish().unwrap();
        drop(writer);

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(
            vec![
                "timestep,id,lane,lane_position,velocity",
                "0,0,1,4,2",
                "0,1,0,9,0",
                "1,0,1,4,2",
                "1,1,0,9,0",
            ],
            lines
        );
    }
}
