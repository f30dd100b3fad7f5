use crate::simulation::network::ring::{backward_gap, forward_gap};
use crate::simulation::network::Freeway;
use crate::simulation::vehicles::Vehicle;
use rand::Rng;

/// Decides whether a car changes lanes in this time step and returns the target lane.
///
/// Lane 0 is the left-most lane. A car only considers a change (with probability
/// `consider_probability`) if the car ahead prevents it from driving at max velocity. An adjacent
/// lane is a candidate if the cell next to the car is free. Lanes without any car behind are taken
/// right away. Otherwise a lane must leave the follower in that lane enough room to keep its speed
/// and must offer at least as much room ahead as the current lane. Left is preferred over right.
///
/// The decision reads the freeway as committed at the start of the time step.
pub fn next_lane<R: Rng>(
    vehicle: &Vehicle,
    freeway: &Freeway,
    consider_probability: f64,
    rng: &mut R,
) -> Option<usize> {
    if !rng.random_bool(consider_probability) {
        return None;
    }

    let next_in_lane = freeway.next_occupied(vehicle.lane, vehicle.position)?;
    let gap_ahead = forward_gap(vehicle.position, next_in_lane, freeway.length()) - 1;
    if vehicle.max_velocity as usize <= gap_ahead {
        return None;
    }

    let left = vehicle
        .lane
        .checked_sub(1)
        .and_then(|lane| AdjacentLane::survey(lane, vehicle, freeway));
    let right = (vehicle.lane + 1 < freeway.lanes())
        .then(|| AdjacentLane::survey(vehicle.lane + 1, vehicle, freeway))
        .flatten();

    match (&left, &right) {
        (None, None) => return None,
        (Some(l), Some(r)) if l.is_empty_behind() && r.is_empty_behind() => {
            return if rng.random_bool(0.5) {
                Some(l.lane)
            } else {
                Some(r.lane)
            };
        }
        _ => {}
    }

    if let Some(l) = left.as_ref().filter(|l| l.is_empty_behind()) {
        return Some(l.lane);
    }
    if let Some(r) = right.as_ref().filter(|r| r.is_empty_behind()) {
        return Some(r.lane);
    }

    [left, right]
        .into_iter()
        .flatten()
        .find(|adjacent| adjacent.is_viable(vehicle, gap_ahead, freeway.length()))
        .map(|adjacent| adjacent.lane)
}

/// Neighbourhood of a car in an adjacent lane whose alongside cell is free.
#[derive(Debug)]
struct AdjacentLane {
    lane: usize,
    prev: Option<usize>,
    next: Option<usize>,
}

impl AdjacentLane {
    /// `None` if the cell alongside the car is occupied.
    fn survey(lane: usize, vehicle: &Vehicle, freeway: &Freeway) -> Option<Self> {
        if freeway.occupied(lane, vehicle.position) {
            return None;
        }
        Some(AdjacentLane {
            lane,
            prev: freeway.prev_occupied(lane, vehicle.position),
            next: freeway.next_occupied(lane, vehicle.position),
        })
    }

    fn is_empty_behind(&self) -> bool {
        self.prev.is_none()
    }

    fn is_viable(&self, vehicle: &Vehicle, gap_ahead_current: usize, length: usize) -> bool {
        let Some(prev) = self.prev else {
            return true;
        };
        let gap_behind = backward_gap(vehicle.position, prev, length) - 1;
        let gap_ahead = self
            .next
            .map_or(usize::MAX, |next| forward_gap(vehicle.position, next, length) - 1);

        vehicle.max_velocity as usize + 1 <= gap_behind && gap_ahead >= gap_ahead_current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    const POSITION: usize = 10;

    /// Three lanes of 30 cells. The car under test sits in the middle lane at position 10 and is
    /// blocked by a car right in front of it.
    fn blocked_in_middle_lane(others: &[(usize, usize)]) -> (Vehicle, Freeway) {
        let mut freeway = Freeway::new(3, 30).unwrap();
        let vehicle = Vehicle::new(0, 1, POSITION, 1, 3, 0.0);
        freeway.place(1, POSITION, 0).unwrap();
        freeway.place(1, POSITION + 1, 1).unwrap();
        for (i, (lane, position)) in others.iter().enumerate() {
            freeway.place(*lane, *position, i + 2).unwrap();
        }
        (vehicle, freeway)
    }

    fn decide(vehicle: &Vehicle, freeway: &Freeway) -> Option<usize> {
        let mut rng = SmallRng::seed_from_u64(42);
        next_lane(vehicle, freeway, 1.0, &mut rng)
    }

    #[test]
    fn never_changes_without_considering() {
        let (vehicle, freeway) = blocked_in_middle_lane(&[]);
        let mut rng = SmallRng::seed_from_u64(42);
        for _ in 0..100 {
            assert_eq!(None, next_lane(&vehicle, &freeway, 0.0, &mut rng));
        }
    }

    #[test]
    fn stays_on_open_road() {
        let mut freeway = Freeway::new(3, 30).unwrap();
        let vehicle = Vehicle::new(0, 1, POSITION, 0, 3, 0.0);
        freeway.place(1, POSITION, 0).unwrap();
        assert_eq!(None, decide(&vehicle, &freeway));
    }

    #[test]
    fn stays_if_current_lane_allows_max_velocity() {
        let mut freeway = Freeway::new(3, 30).unwrap();
        let vehicle = Vehicle::new(0, 1, POSITION, 0, 3, 0.0);
        freeway.place(1, POSITION, 0).unwrap();
        // three empty cells in front
        freeway.place(1, POSITION + 4, 1).unwrap();
        assert_eq!(None, decide(&vehicle, &freeway));
    }

    #[test]
    fn stays_on_single_lane_freeway() {
        let mut freeway = Freeway::new(1, 30).unwrap();
        let vehicle = Vehicle::new(0, 0, POSITION, 0, 3, 0.0);
        freeway.place(0, POSITION, 0).unwrap();
        freeway.place(0, POSITION + 1, 1).unwrap();
        assert_eq!(None, decide(&vehicle, &freeway));
    }

    #[test]
    fn stays_if_both_alongside_cells_are_occupied() {
        let (vehicle, freeway) = blocked_in_middle_lane(&[(0, POSITION), (2, POSITION)]);
        assert_eq!(None, decide(&vehicle, &freeway));
    }

    #[test]
    fn picks_either_side_if_both_lanes_are_empty() {
        let (vehicle, freeway) = blocked_in_middle_lane(&[]);
        let mut rng = SmallRng::seed_from_u64(7);
        let mut seen = [false; 3];
        for _ in 0..200 {
            let lane = next_lane(&vehicle, &freeway, 1.0, &mut rng).unwrap();
            assert_ne!(1, lane);
            seen[lane] = true;
        }
        assert!(seen[0] && seen[2]);
    }

    #[test]
    fn takes_the_only_lane_without_car_behind() {
        // right lane has a car far behind, left lane is empty
        let (vehicle, freeway) = blocked_in_middle_lane(&[(2, POSITION - 8)]);
        assert_eq!(Some(0), decide(&vehicle, &freeway));

        // left lane has a car behind, right lane is empty
        let (vehicle, freeway) = blocked_in_middle_lane(&[(0, POSITION - 8)]);
        assert_eq!(Some(2), decide(&vehicle, &freeway));
    }

    #[test]
    fn edge_lane_only_looks_inwards() {
        let mut freeway = Freeway::new(3, 30).unwrap();
        let vehicle = Vehicle::new(0, 0, POSITION, 0, 3, 0.0);
        freeway.place(0, POSITION, 0).unwrap();
        freeway.place(0, POSITION + 1, 1).unwrap();
        assert_eq!(Some(1), decide(&vehicle, &freeway));
    }

    #[test]
    fn blind_spot_excludes_lane() {
        let (vehicle, freeway) = blocked_in_middle_lane(&[(0, POSITION), (2, POSITION - 8)]);
        // left is blocked alongside, right has enough room behind and nothing ahead but the follower
        assert_eq!(Some(2), decide(&vehicle, &freeway));
    }

    #[test]
    fn rejects_lane_with_close_follower() {
        // followers two cells behind in both lanes, max velocity 3 needs four empty cells
        let (vehicle, freeway) =
            blocked_in_middle_lane(&[(0, POSITION - 2), (2, POSITION - 2)]);
        assert_eq!(None, decide(&vehicle, &freeway));
    }

    #[test]
    fn accepts_follower_with_safe_margin() {
        // exactly max velocity + 1 = 4 empty cells behind on the right, too few on the left
        let (vehicle, freeway) =
            blocked_in_middle_lane(&[(0, POSITION - 2), (2, POSITION - 5)]);
        assert_eq!(Some(2), decide(&vehicle, &freeway));

        // one cell less on the right is not enough
        let (vehicle, freeway) =
            blocked_in_middle_lane(&[(0, POSITION - 2), (2, POSITION - 4)]);
        assert_eq!(None, decide(&vehicle, &freeway));
    }

    #[test]
    fn prefers_left_if_both_are_viable() {
        let (vehicle, freeway) =
            blocked_in_middle_lane(&[(0, POSITION - 8), (2, POSITION - 8)]);
        assert_eq!(Some(0), decide(&vehicle, &freeway));
    }

    #[test]
    fn falls_back_to_right_if_left_has_less_room_ahead() {
        let mut freeway = Freeway::new(3, 30).unwrap();
        let vehicle = Vehicle::new(0, 1, POSITION, 0, 3, 0.0);
        freeway.place(1, POSITION, 0).unwrap();
        // one empty cell ahead in the current lane
        freeway.place(1, POSITION + 2, 1).unwrap();
        // left: safe follower, but the next car is right alongside the front
        freeway.place(0, POSITION - 8, 2).unwrap();
        freeway.place(0, POSITION + 1, 3).unwrap();
        // right: safe follower and plenty of room
        freeway.place(2, POSITION - 8, 4).unwrap();
        freeway.place(2, POSITION + 6, 5).unwrap();
        assert_eq!(Some(2), decide(&vehicle, &freeway));
    }

    #[test]
    fn equal_room_ahead_is_enough() {
        let mut freeway = Freeway::new(2, 30).unwrap();
        let vehicle = Vehicle::new(0, 1, POSITION, 0, 3, 0.0);
        freeway.place(1, POSITION, 0).unwrap();
        freeway.place(1, POSITION + 2, 1).unwrap();
        freeway.place(0, POSITION - 8, 2).unwrap();
        freeway.place(0, POSITION + 2, 3).unwrap();
        assert_eq!(Some(0), decide(&vehicle, &freeway));
    }

    #[test]
    fn stays_if_no_lane_offers_as_much_room_ahead() {
        let mut freeway = Freeway::new(2, 30).unwrap();
        let vehicle = Vehicle::new(0, 1, POSITION, 0, 3, 0.0);
        freeway.place(1, POSITION, 0).unwrap();
        freeway.place(1, POSITION + 2, 1).unwrap();
        freeway.place(0, POSITION - 8, 2).unwrap();
        freeway.place(0, POSITION + 1, 3).unwrap();
        assert_eq!(None, decide(&vehicle, &freeway));
    }
}
