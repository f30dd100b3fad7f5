use crate::simulation::error::SimulationError;
use crate::simulation::events::{EventsSubscriber, FreewaySnapshot};
use nohash_hasher::IntMap;
use serde::Serialize;
use std::any::Any;

/// Averages of a run over all published steps except the initial placement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowStatistics {
    pub steps: u64,
    pub density: f64,
    pub mean_velocity: f64,
    pub flow: f64,
    /// Mean velocity per lane, averaged over all cars that were in the lane in any step.
    pub mean_velocity_by_lane: Vec<f64>,
}

#[derive(Debug, Default, Clone, Copy)]
struct LaneTotals {
    velocity_sum: u64,
    observations: u64,
}

/// Measures the fundamental diagram point of a run: density against flow.
#[derive(Debug, Default)]
pub struct FlowCollector {
    published_steps: u64,
    density: f64,
    lanes: usize,
    mean_velocity_sum: f64,
    flow_sum: f64,
    lane_totals: IntMap<usize, LaneTotals>,
}

impl FlowCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published_steps(&self) -> u64 {
        self.published_steps
    }

    fn measured_steps(&self) -> u64 {
        self.published_steps.saturating_sub(1)
    }

    /// `None` until at least one step after the initial placement was published.
    pub fn statistics(&self) -> Option<FlowStatistics> {
        let steps = self.measured_steps();
        if steps == 0 {
            return None;
        }

        let mean_velocity_by_lane = (0..self.lanes)
            .map(|lane| match self.lane_totals.get(&lane) {
                Some(t) if t.observations > 0 => t.velocity_sum as f64 / t.observations as f64,
                _ => 0.,
            })
            .collect();

        Some(FlowStatistics {
            steps,
            density: self.density,
            mean_velocity: self.mean_velocity_sum / steps as f64,
            flow: self.flow_sum / steps as f64,
            mean_velocity_by_lane,
        })
    }
}

impl EventsSubscriber for FlowCollector {
    fn receive_step(&mut self, snapshot: &FreewaySnapshot) -> Result<(), SimulationError> {
        self.published_steps += 1;
        self.density = snapshot.density();
        self.lanes = snapshot.lanes;

        // the initial placement is not the result of any dynamics
        if snapshot.step == 0 {
            return Ok(());
        }

        self.mean_velocity_sum += snapshot.mean_velocity();
        self.flow_sum += snapshot.flow();
        for vehicle in &snapshot.vehicles {
            let totals = self.lane_totals.entry(vehicle.lane).or_default();
            totals.velocity_sum += vehicle.velocity as u64;
            totals.observations += 1;
        }
        Ok(())
    }

    fn as_any(&mut self) -> &mut dyn Any {
        self
    }
}
