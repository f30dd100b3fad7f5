use crate::simulation::error::SimulationError;
use crate::simulation::vehicles::VehicleSnapshot;
use std::any::Any;
use std::fmt::Debug;
use tracing::{instrument, trace};

/// Committed state of the whole freeway after a time step. Step 0 is the initial placement.
#[derive(Debug, Clone, PartialEq)]
pub struct FreewaySnapshot {
    pub step: u64,
    pub lanes: usize,
    pub length: usize,
    /// Ordered by vehicle id.
    pub vehicles: Vec<VehicleSnapshot>,
}

impl FreewaySnapshot {
    pub fn density(&self) -> f64 {
        self.vehicles.len() as f64 / (self.lanes * self.length) as f64
    }

    pub fn mean_velocity(&self) -> f64 {
        if self.vehicles.is_empty() {
            return 0.;
        }
        self.velocity_sum() as f64 / self.vehicles.len() as f64
    }

    /// Cars passing a cross-section per time step and lane, i.e. density times mean velocity.
    pub fn flow(&self) -> f64 {
        self.velocity_sum() as f64 / (self.lanes * self.length) as f64
    }

    fn velocity_sum(&self) -> u64 {
        self.vehicles.iter().map(|v| v.velocity as u64).sum()
    }
}

pub trait EventsSubscriber {
    fn receive_step(&mut self, snapshot: &FreewaySnapshot) -> Result<(), SimulationError>;

    fn finish(&mut self) -> Result<(), SimulationError> {
        Ok(())
    }

    fn as_any(&mut self) -> &mut dyn Any;
}

impl Debug for dyn EventsSubscriber + Send {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EventsSubscriber")
    }
}

pub struct SnapshotLogger {}

impl EventsSubscriber for SnapshotLogger {
    fn receive_step(&mut self, snapshot: &FreewaySnapshot) -> Result<(), SimulationError> {
        trace!(
            step = snapshot.step,
            mean_velocity = snapshot.mean_velocity(),
            flow = snapshot.flow()
        );
        Ok(())
    }

    fn as_any(&mut self) -> &mut dyn Any {
        self
    }
}

/// Owns the subscribers of a single run and hands every committed snapshot to each of them.
#[derive(Default, Debug)]
pub struct EventsPublisher {
    handlers: Vec<Box<dyn EventsSubscriber + Send>>,
}

impl EventsPublisher {
    pub fn new() -> Self {
        EventsPublisher {
            handlers: Vec::new(),
        }
    }

    pub fn add_subscriber(&mut self, handler: Box<dyn EventsSubscriber + Send>) {
        self.handlers.push(handler);
    }

    pub fn publish_step(&mut self, snapshot: &FreewaySnapshot) -> Result<(), SimulationError> {
        for handler in self.handlers.iter_mut() {
            handler.receive_step(snapshot)?;
        }
        Ok(())
    }

    #[instrument(skip_all, level = "trace")]
    pub fn finish(&mut self) -> Result<(), SimulationError> {
        for handler in self.handlers.iter_mut() {
            handler.finish()?;
        }
        Ok(())
    }

    pub fn get_subscriber<T: EventsSubscriber + 'static>(&mut self) -> Option<&mut T> {
        let mut result = None;
        for handler in self.handlers.iter_mut() {
            if let Some(collector) = handler.as_any().downcast_mut::<T>() {
                result = Some(collector)
            };
        }
        result
    }
}
