use crate::simulation::config::RunParameters;
use crate::simulation::error::{ConfigError, SimulationError};
use crate::simulation::network::Freeway;
use crate::simulation::vehicles::Vehicle;
use rand::Rng;
use tracing::{debug, info};

/// Initial state of a run: the freeway with all cars placed on it.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub params: RunParameters,
    pub freeway: Freeway,
    pub vehicles: Vec<Vehicle>,
}

impl Scenario {
    /// Places `n_cars` cars on random, distinct cells. Each car gets at most
    /// `max_placement_attempts` draws before the run is given up.
    pub fn build<R: Rng>(params: RunParameters, rng: &mut R) -> Result<Self, SimulationError> {
        params.validate()?;
        let mut freeway = Freeway::new(params.lanes, params.length)?;
        let mut vehicles = Vec::with_capacity(params.n_cars);

        for id in 0..params.n_cars {
            let (lane, position) = Self::draw_free_cell(&freeway, &params, id, rng)?;
            freeway
                .place(lane, position, id)
                .map_err(|e| SimulationError::freeway(0, e))?;
            vehicles.push(Self::create_vehicle(&params, id, lane, position));
        }

        info!(
            "Placed {} cars on {} lanes with {} cells each.",
            params.n_cars, params.lanes, params.length
        );
        Ok(Scenario {
            params,
            freeway,
            vehicles,
        })
    }

    /// Places cars on the given `(lane, position)` cells. Car ids follow the order of `cells`.
    pub fn with_placement(
        mut params: RunParameters,
        cells: &[(usize, usize)],
    ) -> Result<Self, SimulationError> {
        params.n_cars = cells.len();
        params.validate()?;
        let mut freeway = Freeway::new(params.lanes, params.length)?;
        let mut vehicles = Vec::with_capacity(cells.len());

        for (id, (lane, position)) in cells.iter().copied().enumerate() {
            freeway
                .place(lane, position, id)
                .map_err(|e| SimulationError::freeway(0, e))?;
            vehicles.push(Self::create_vehicle(&params, id, lane, position));
        }

        Ok(Scenario {
            params,
            freeway,
            vehicles,
        })
    }

    fn draw_free_cell<R: Rng>(
        freeway: &Freeway,
        params: &RunParameters,
        id: usize,
        rng: &mut R,
    ) -> Result<(usize, usize), ConfigError> {
        for attempt in 1..=params.max_placement_attempts {
            let lane = rng.random_range(0..params.lanes);
            let position = rng.random_range(0..params.length);
            if !freeway.occupied(lane, position) {
                if attempt > 1 {
                    debug!("Placed car #{id} after {attempt} attempts.");
                }
                return Ok((lane, position));
            }
        }
        Err(ConfigError::PlacementExhausted {
            car: id,
            attempts: params.max_placement_attempts,
            placed: id,
            n_cars: params.n_cars,
        })
    }

    fn create_vehicle(params: &RunParameters, id: usize, lane: usize, position: usize) -> Vehicle {
        Vehicle::new(
            id,
            lane,
            position,
            params.initial_velocity,
            params.max_velocity,
            params.braking_probability,
        )
    }
}
