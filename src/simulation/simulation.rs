use crate::simulation::config::RunParameters;
use crate::simulation::engines::{lane_change_engine, velocity_engine};
use crate::simulation::error::SimulationError;
use crate::simulation::events::{EventsPublisher, FreewaySnapshot};
use crate::simulation::network::ring;
use crate::simulation::network::Freeway;
use crate::simulation::scenario::Scenario;
use crate::simulation::vehicles::Vehicle;
use rand::rngs::SmallRng;
use tracing::{debug, info, instrument};

/// A single run on one freeway. Owns the cars, the freeway and the random number generator, so
/// that runs with different configurations can execute side by side without sharing anything.
#[derive(Debug)]
pub struct Simulation {
    params: RunParameters,
    freeway: Freeway,
    vehicles: Vec<Vehicle>,
    rng: SmallRng,
    events: EventsPublisher,
    step: u64,
}

impl Simulation {
    pub fn new(scenario: Scenario, rng: SmallRng, events: EventsPublisher) -> Self {
        Simulation {
            params: scenario.params,
            freeway: scenario.freeway,
            vehicles: scenario.vehicles,
            rng,
            events,
            step: 0,
        }
    }

    /// Publishes the initial state and then the state after each of the configured steps.
    #[instrument(level = "info", skip_all, fields(n_cars = self.params.n_cars))]
    pub fn run(&mut self) -> Result<(), SimulationError> {
        info!(
            "Starting run with {} cars. Steps: {}, lanes: {}, length: {}",
            self.params.n_cars, self.params.steps, self.params.lanes, self.params.length
        );

        self.events.publish_step(&self.snapshot())?;
        while self.step < self.params.steps {
            self.do_sim_step()?;
            self.events.publish_step(&self.snapshot())?;

            if self.step % 600 == 0 {
                info!("Run with {} cars at step {}", self.params.n_cars, self.step);
            }
        }

        self.events.finish()
    }

    /// Advances all cars by one time step. Lane changes are decided on the freeway as it was
    /// at the start of the step and committed in order of ascending car id. Velocities are decided
    /// after all lane changes are committed, then every car advances.
    pub fn do_sim_step(&mut self) -> Result<(), SimulationError> {
        self.decide_lanes();
        self.commit_lane_changes()?;
        self.decide_velocities()?;
        self.advance_vehicles()?;
        self.step += 1;
        Ok(())
    }

    fn decide_lanes(&mut self) {
        let probability = self.params.consider_lane_change_probability;
        for vehicle in self.vehicles.iter_mut() {
            vehicle.next_lane =
                lane_change_engine::next_lane(vehicle, &self.freeway, probability, &mut self.rng);
        }
    }

    /// A car whose target cell was taken by a car committing earlier in this step keeps its lane.
    fn commit_lane_changes(&mut self) -> Result<(), SimulationError> {
        for vehicle in self.vehicles.iter_mut() {
            let Some(target) = vehicle.wants_lane_change() else {
                continue;
            };
            if self.freeway.occupied(target, vehicle.position) {
                debug!(
                    "Car {} stays in lane {}: lane {} got occupied at position {} in step {}",
                    vehicle.id(),
                    vehicle.lane,
                    target,
                    vehicle.position,
                    self.step
                );
                vehicle.next_lane = None;
                continue;
            }
            self.freeway
                .move_vehicle(vehicle.cell(), (target, vehicle.position))
                .map_err(|e| SimulationError::freeway(self.step, e))?;
            vehicle.lane = target;
        }
        Ok(())
    }

    fn decide_velocities(&mut self) -> Result<(), SimulationError> {
        for vehicle in self.vehicles.iter_mut() {
            let velocity = velocity_engine::next_velocity(vehicle, &self.freeway, &mut self.rng);
            if velocity > vehicle.max_velocity {
                return Err(SimulationError::VelocityOutOfBounds {
                    vehicle: vehicle.id(),
                    velocity,
                    max_velocity: vehicle.max_velocity,
                    step: self.step,
                });
            }
            vehicle.next_velocity = velocity;
        }
        Ok(())
    }

    fn advance_vehicles(&mut self) -> Result<(), SimulationError> {
        let length = self.freeway.length();
        for vehicle in self.vehicles.iter_mut() {
            let position = ring::advance(vehicle.position, vehicle.next_velocity as usize, length);
            self.freeway
                .move_vehicle(vehicle.cell(), (vehicle.lane, position))
                .map_err(|e| SimulationError::freeway(self.step, e))?;
            vehicle.velocity = vehicle.next_velocity;
            vehicle.position = position;
        }
        Ok(())
    }

    pub fn snapshot(&self) -> FreewaySnapshot {
        FreewaySnapshot {
            step: self.step,
            lanes: self.freeway.lanes(),
            length: self.freeway.length(),
            vehicles: self.vehicles.iter().map(Vehicle::snapshot).collect(),
        }
    }

    /// Whether every car is recorded in exactly its own cell and every occupied cell holds the
    /// car that believes to be there.
    pub fn is_consistent(&self) -> bool {
        let cars_in_their_cells = self
            .vehicles
            .iter()
            .all(|v| self.freeway.occupant(v.lane, v.position) == Some(v.id()));
        let cells_match_cars = self.freeway.occupied_cells().all(|cell| {
            self.vehicles
                .get(cell.vehicle)
                .is_some_and(|v| v.cell() == (cell.lane, cell.position))
        });
        cars_in_their_cells && cells_match_cars
    }

    pub fn params(&self) -> &RunParameters {
        &self.params
    }

    pub fn freeway(&self) -> &Freeway {
        &self.freeway
    }

    pub fn vehicles(&self) -> &[Vehicle] {
        &self.vehicles
    }

    pub fn step(&self) -> u64 {
        self.step
    }

    pub fn events_mut(&mut self) -> &mut EventsPublisher {
        &mut self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::config::Config;
    use crate::simulation::random::get_rnd;

    fn params(lanes: usize, length: usize, max_velocity: u32) -> RunParameters {
        let mut params = Config::default().run_parameters(0);
        params.lanes = lanes;
        params.length = length;
        params.initial_velocity = 0;
        params.max_velocity = max_velocity;
        params.braking_probability = 0.0;
        params.consider_lane_change_probability = 0.0;
        params.steps = 10;
        params
    }

    fn simulation(params: RunParameters, cells: &[(usize, usize)]) -> Simulation {
        let scenario = Scenario::with_placement(params, cells).unwrap();
        Simulation::new(scenario, get_rnd(3, 0), EventsPublisher::new())
    }

    #[test]
    fn single_car_accelerates_to_max_velocity() {
        let mut sim = simulation(params(1, 10, 3), &[(0, 0)]);
        let mut positions = vec![];
        for _ in 0..5 {
            sim.do_sim_step().unwrap();
            positions.push((sim.vehicles()[0].position, sim.vehicles()[0].velocity));
        }
        assert_eq!(vec![(1, 1), (3, 2), (6, 3), (9, 3), (2, 3)], positions);
        assert!(sim.is_consistent());
    }

    #[test]
    fn keeps_run_parameters_of_scenario() {
        let sim = simulation(params(2, 15, 4), &[(0, 0), (1, 7)]);
        assert_eq!(2, sim.params().n_cars);
        assert_eq!(2, sim.params().lanes);
        assert_eq!(15, sim.params().length);
        assert_eq!(4, sim.params().max_velocity);
        assert_eq!(10, sim.params().steps);
        assert_eq!(sim.freeway().length(), sim.params().length);
    }

    #[test]
    fn follower_keeps_distance() {
        let mut sim = simulation(params(1, 10, 3), &[(0, 0), (0, 3)]);
        sim.do_sim_step().unwrap();
        assert_eq!(1, sim.vehicles()[0].position);
        assert_eq!(4, sim.vehicles()[1].position);
        assert_eq!(1, sim.step());
    }

    #[test]
    fn lane_change_is_committed_before_velocities_are_decided() {
        let mut p = params(2, 20, 3);
        p.consider_lane_change_probability = 1.0;
        // car 0 is stuck behind car 1, lane 0 is empty
        let mut sim = simulation(p, &[(1, 5), (1, 6)]);
        sim.do_sim_step().unwrap();

        let car = &sim.vehicles()[0];
        assert_eq!(0, car.lane);
        // accelerates on the free lane instead of staying behind car 1
        assert_eq!(1, car.velocity);
        assert_eq!(6, car.position);
        assert!(sim.is_consistent());
    }

    #[test]
    fn conflicting_lane_change_is_voided() {
        let mut p = params(3, 30, 3);
        p.consider_lane_change_probability = 1.0;
        // cars 0 and 2 are both stuck and both want into the empty middle lane at position 10
        let mut sim = simulation(p, &[(0, 10), (0, 11), (2, 10), (2, 11)]);
        sim.decide_lanes();
        assert_eq!(Some(1), sim.vehicles()[0].next_lane);
        assert_eq!(Some(1), sim.vehicles()[2].next_lane);

        sim.commit_lane_changes().unwrap();
        assert_eq!(1, sim.vehicles()[0].lane);
        assert_eq!(2, sim.vehicles()[2].lane);
        assert_eq!(None, sim.vehicles()[2].next_lane);
        assert!(sim.is_consistent());
    }

    #[test]
    fn run_publishes_every_step() {
        use crate::simulation::analysis::flow_collector::FlowCollector;

        let mut events = EventsPublisher::new();
        events.add_subscriber(Box::new(FlowCollector::default()));
        let scenario = Scenario::with_placement(params(1, 10, 3), &[(0, 0)]).unwrap();
        let mut sim = Simulation::new(scenario, get_rnd(3, 0), events);
        sim.run().unwrap();

        assert_eq!(10, sim.step());
        let collector = sim.events_mut().get_subscriber::<FlowCollector>().unwrap();
        assert_eq!(11, collector.published_steps());
    }
}
