use thiserror::Error;

/// Rejected run parameters. Fatal to the affected run only.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("a freeway needs at least one lane")]
    NoLanes,
    #[error("a freeway needs a length of at least one cell")]
    ZeroLength,
    #[error("{name} must be within [0, 1], but was {value}")]
    ProbabilityOutOfRange { name: &'static str, value: f64 },
    #[error("initial velocity {initial} exceeds max velocity {max}")]
    InitialVelocityTooHigh { initial: u32, max: u32 },
    #[error("cannot place {n_cars} cars on a freeway with {capacity} cells")]
    TooManyCars { n_cars: usize, capacity: usize },
    #[error("gave up placing car #{car} after {attempts} attempts ({placed} of {n_cars} placed)")]
    PlacementExhausted {
        car: usize,
        attempts: usize,
        placed: usize,
        n_cars: usize,
    },
}

/// Violations of the freeway occupancy invariant. These indicate a defect in the update rules.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FreewayError {
    #[error("cell (lane {lane}, position {position}) is outside of the {lanes}x{length} freeway")]
    OutOfBounds {
        lane: usize,
        position: usize,
        lanes: usize,
        length: usize,
    },
    #[error("cannot place car {vehicle} at (lane {lane}, position {position}): occupied by car {occupant}")]
    CellOccupied {
        lane: usize,
        position: usize,
        vehicle: usize,
        occupant: usize,
    },
    #[error("cannot remove a car from (lane {lane}, position {position}): cell is empty")]
    CellEmpty { lane: usize, position: usize },
}

#[derive(Error, Debug)]
pub enum SimulationError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("freeway invariant violated at step {step}: {source}")]
    Freeway {
        step: u64,
        #[source]
        source: FreewayError,
    },
    #[error("car {vehicle} has velocity {velocity} outside of [0, {max_velocity}] at step {step}")]
    VelocityOutOfBounds {
        vehicle: usize,
        velocity: u32,
        max_velocity: u32,
        step: u64,
    },
    #[error("failed to write output: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to write csv output: {0}")]
    Csv(#[from] csv::Error),
}

impl SimulationError {
    pub fn freeway(step: u64, source: FreewayError) -> Self {
        SimulationError::Freeway { step, source }
    }
}
