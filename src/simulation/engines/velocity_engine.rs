use crate::simulation::network::ring::forward_gap;
use crate::simulation::network::Freeway;
use crate::simulation::vehicles::Vehicle;
use rand::Rng;

/// Velocity for the next time step following the Nagel-Schreckenberg cascade: accelerate,
/// slow down to avoid the car ahead, then brake at random. Reads committed state only.
pub fn next_velocity<R: Rng>(vehicle: &Vehicle, freeway: &Freeway, rng: &mut R) -> u32 {
    let velocity = accelerate(vehicle);
    let velocity = slow_down(vehicle, freeway, velocity);
    random_brake(vehicle, velocity, rng)
}

fn accelerate(vehicle: &Vehicle) -> u32 {
    (vehicle.velocity + 1).min(vehicle.max_velocity)
}

/// Never move onto or past the next occupied cell in the lane.
fn slow_down(vehicle: &Vehicle, freeway: &Freeway, velocity: u32) -> u32 {
    match freeway.next_occupied(vehicle.lane, vehicle.position) {
        None => velocity,
        Some(next) => {
            let empty_cells = forward_gap(vehicle.position, next, freeway.length()) - 1;
            limit_to_empty_cells(velocity, empty_cells)
        }
    }
}

fn limit_to_empty_cells(velocity: u32, empty_cells: usize) -> u32 {
    velocity.min(u32::try_from(empty_cells).unwrap_or(u32::MAX))
}

fn random_brake<R: Rng>(vehicle: &Vehicle, velocity: u32, rng: &mut R) -> u32 {
    if velocity > 0 && rng.random_bool(vehicle.braking_probability) {
        velocity - 1
    } else {
        velocity
    }
}
