use serde::Serialize;

/// A car on the freeway. Position and lane are kept in sync with the
/// [`Freeway`](crate::simulation::network::Freeway) by the simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct Vehicle {
    id: usize,
    pub lane: usize,
    pub position: usize,
    pub velocity: u32,
    pub max_velocity: u32,
    pub braking_probability: f64,
    /// Staged during a time step. `None` means the car stays in its lane.
    pub next_lane: Option<usize>,
    /// Staged during a time step and applied when the car advances.
    pub next_velocity: u32,
}

impl Vehicle {
    pub fn new(
        id: usize,
        lane: usize,
        position: usize,
        velocity: u32,
        max_velocity: u32,
        braking_probability: f64,
    ) -> Self {
        Vehicle {
            id,
            lane,
            position,
            velocity,
            max_velocity,
            braking_probability,
            next_lane: None,
            next_velocity: velocity,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn cell(&self) -> (usize, usize) {
        (self.lane, self.position)
    }

    /// Whether the staged lane is an actual change of lanes.
    pub fn wants_lane_change(&self) -> Option<usize> {
        self.next_lane.filter(|lane| *lane != self.lane)
    }

    pub fn snapshot(&self) -> VehicleSnapshot {
        VehicleSnapshot {
            id: self.id,
            lane: self.lane,
            lane_position: self.position,
            velocity: self.velocity,
        }
    }
}

/// Committed state of a single car, as exposed to observers after each step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VehicleSnapshot {
    pub id: usize,
    pub lane: usize,
    pub lane_position: usize,
    pub velocity: u32,
}
