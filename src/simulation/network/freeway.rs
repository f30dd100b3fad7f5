use crate::simulation::error::{ConfigError, FreewayError};
use crate::simulation::network::ring;
use serde::Serialize;

/// Occupancy grid of a circular multi-lane freeway.
///
/// The freeway does not own vehicles. Each cell only stores the id of the vehicle occupying it.
/// Cells are stored lane by lane, so that scanning along a lane touches contiguous memory.
#[derive(Debug, Clone)]
pub struct Freeway {
    lanes: usize,
    length: usize,
    cells: Vec<Option<usize>>,
}

/// A single occupied cell. Used to render the freeway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OccupiedCell {
    pub lane: usize,
    pub position: usize,
    pub vehicle: usize,
}

impl Freeway {
    pub fn new(lanes: usize, length: usize) -> Result<Self, ConfigError> {
        if lanes == 0 {
            return Err(ConfigError::NoLanes);
        }
        if length == 0 {
            return Err(ConfigError::ZeroLength);
        }
        Ok(Freeway {
            lanes,
            length,
            cells: vec![None; lanes * length],
        })
    }

    pub fn lanes(&self) -> usize {
        self.lanes
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn occupied(&self, lane: usize, position: usize) -> bool {
        self.occupant(lane, position).is_some()
    }

    /// Id of the vehicle in the cell, if any.
    pub fn occupant(&self, lane: usize, position: usize) -> Option<usize> {
        self.cells[self.index(lane, position)]
    }

    pub fn place(&mut self, lane: usize, position: usize, vehicle: usize) -> Result<(), FreewayError> {
        let index = self.checked_index(lane, position)?;
        if let Some(occupant) = self.cells[index] {
            return Err(FreewayError::CellOccupied {
                lane,
                position,
                vehicle,
                occupant,
            });
        }
        self.cells[index] = Some(vehicle);
        Ok(())
    }

    /// Clears the cell and returns the id of the vehicle which occupied it.
    pub fn remove(&mut self, lane: usize, position: usize) -> Result<usize, FreewayError> {
        let index = self.checked_index(lane, position)?;
        self.cells[index]
            .take()
            .ok_or(FreewayError::CellEmpty { lane, position })
    }

    /// Moves the occupant of `from` into `to`. Either both cells are updated or none of them.
    pub fn move_vehicle(
        &mut self,
        from: (usize, usize),
        to: (usize, usize),
    ) -> Result<usize, FreewayError> {
        let vehicle = self.remove(from.0, from.1)?;
        if let Err(e) = self.place(to.0, to.1, vehicle) {
            let index = self.index(from.0, from.1);
            self.cells[index] = Some(vehicle);
            return Err(e);
        }
        Ok(vehicle)
    }

    /// Position of the nearest occupied cell ahead of `position` in `lane`. The scan starts at the
    /// next cell and wraps around the ring. Returns `None` if it arrives back at `position` without
    /// finding another vehicle.
    pub fn next_occupied(&self, lane: usize, position: usize) -> Option<usize> {
        let row = self.row(lane);
        (1..self.length)
            .map(|offset| ring::advance(position, offset, self.length))
            .find(|p| row[*p].is_some())
    }

    /// Position of the nearest occupied cell behind `position` in `lane`.
    pub fn prev_occupied(&self, lane: usize, position: usize) -> Option<usize> {
        let row = self.row(lane);
        (1..self.length)
            .map(|offset| (position + self.length - offset) % self.length)
            .find(|p| row[*p].is_some())
    }

    pub fn occupied_cells(&self) -> impl Iterator<Item = OccupiedCell> + '_ {
        self.cells.iter().enumerate().filter_map(|(i, cell)| {
            cell.map(|vehicle| OccupiedCell {
                lane: i / self.length,
                position: i % self.length,
                vehicle,
            })
        })
    }

    pub fn vehicle_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }

    fn row(&self, lane: usize) -> &[Option<usize>] {
        let start = lane * self.length;
        &self.cells[start..start + self.length]
    }

    fn index(&self, lane: usize, position: usize) -> usize {
        debug_assert!(lane < self.lanes && position < self.length);
        lane * self.length + position
    }

    fn checked_index(&self, lane: usize, position: usize) -> Result<usize, FreewayError> {
        if lane >= self.lanes || position >= self.length {
            return Err(FreewayError::OutOfBounds {
                lane,
                position,
                lanes: self.lanes,
                length: self.length,
            });
        }
        Ok(self.index(lane, position))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_dimensions() {
        assert_eq!(ConfigError::NoLanes, Freeway::new(0, 10).unwrap_err());
        assert_eq!(ConfigError::ZeroLength, Freeway::new(2, 0).unwrap_err());
    }

    #[test]
    fn place_and_remove() {
        let mut freeway = Freeway::new(2, 10).unwrap();
        assert!(!freeway.occupied(1, 4));

        freeway.place(1, 4, 7).unwrap();
        assert!(freeway.occupied(1, 4));
        assert!(!freeway.occupied(0, 4));
        assert_eq!(Some(7), freeway.occupant(1, 4));

        assert_eq!(7, freeway.remove(1, 4).unwrap());
        assert!(!freeway.occupied(1, 4));
    }

    #[test]
    fn place_into_occupied_cell_fails() {
        let mut freeway = Freeway::new(1, 10).unwrap();
        freeway.place(0, 3, 1).unwrap();
        let err = freeway.place(0, 3, 2).unwrap_err();
        assert_eq!(
            FreewayError::CellOccupied {
                lane: 0,
                position: 3,
                vehicle: 2,
                occupant: 1
            },
            err
        );
        assert_eq!(Some(1), freeway.occupant(0, 3));
    }

    #[test]
    fn remove_from_empty_cell_fails() {
        let mut freeway = Freeway::new(1, 10).unwrap();
        assert_eq!(
            FreewayError::CellEmpty {
                lane: 0,
                position: 5
            },
            freeway.remove(0, 5).unwrap_err()
        );
    }

    #[test]
    fn out_of_bounds_is_reported() {
        let mut freeway = Freeway::new(2, 10).unwrap();
        assert!(matches!(
            freeway.place(2, 0, 0),
            Err(FreewayError::OutOfBounds { lane: 2, .. })
        ));
        assert!(matches!(
            freeway.remove(0, 10),
            Err(FreewayError::OutOfBounds { position: 10, .. })
        ));
    }

    #[test]
    fn failed_move_keeps_vehicle_in_place() {
        let mut freeway = Freeway::new(2, 10).unwrap();
        freeway.place(0, 2, 1).unwrap();
        freeway.place(1, 2, 2).unwrap();

        assert!(freeway.move_vehicle((0, 2), (1, 2)).is_err());
        assert_eq!(Some(1), freeway.occupant(0, 2));
        assert_eq!(Some(2), freeway.occupant(1, 2));

        assert_eq!(1, freeway.move_vehicle((0, 2), (0, 5)).unwrap());
        assert!(!freeway.occupied(0, 2));
        assert_eq!(Some(1), freeway.occupant(0, 5));
    }

    #[test]
    fn failed_move_out_of_bounds_restores_origin() {
        let mut freeway = Freeway::new(2, 10).unwrap();
        freeway.place(1, 7, 3).unwrap();

        assert!(matches!(
            freeway.move_vehicle((1, 7), (2, 7)),
            Err(FreewayError::OutOfBounds { lane: 2, .. })
        ));
        assert_eq!(Some(3), freeway.occupant(1, 7));
        assert_eq!(1, freeway.vehicle_count());
    }

    #[test]
    fn next_occupied_wraps_around() {
        let mut freeway = Freeway::new(1, 10).unwrap();
        freeway.place(0, 8, 0).unwrap();
        freeway.place(0, 2, 1).unwrap();

        assert_eq!(Some(2), freeway.next_occupied(0, 8));
        assert_eq!(Some(8), freeway.next_occupied(0, 2));
        assert_eq!(Some(8), freeway.next_occupied(0, 5));
    }

    #[test]
    fn prev_occupied_wraps_around() {
        let mut freeway = Freeway::new(1, 10).unwrap();
        freeway.place(0, 8, 0).unwrap();
        freeway.place(0, 2, 1).unwrap();

        assert_eq!(Some(8), freeway.prev_occupied(0, 2));
        assert_eq!(Some(2), freeway.prev_occupied(0, 8));
        assert_eq!(Some(2), freeway.prev_occupied(0, 5));
    }

    #[test]
    fn scans_ignore_own_cell() {
        let mut freeway = Freeway::new(2, 10).unwrap();
        freeway.place(0, 4, 0).unwrap();

        assert_eq!(None, freeway.next_occupied(0, 4));
        assert_eq!(None, freeway.prev_occupied(0, 4));
        assert_eq!(None, freeway.next_occupied(1, 4));
        assert_eq!(None, freeway.prev_occupied(1, 4));
    }

    #[test]
    fn scans_on_single_cell_ring() {
        let mut freeway = Freeway::new(1, 1).unwrap();
        freeway.place(0, 0, 0).unwrap();
        assert_eq!(None, freeway.next_occupied(0, 0));
        assert_eq!(None, freeway.prev_occupied(0, 0));
    }

    #[test]
    fn lists_occupied_cells() {
        let mut freeway = Freeway::new(2, 5).unwrap();
        freeway.place(1, 3, 9).unwrap();
        freeway.place(0, 1, 4).unwrap();

        let cells: Vec<_> = freeway.occupied_cells().collect();
        assert_eq!(
            vec![
                OccupiedCell {
                    lane: 0,
                    position: 1,
                    vehicle: 4
                },
                OccupiedCell {
                    lane: 1,
                    position: 3,
                    vehicle: 9
                }
            ],
            cells
        );
        assert_eq!(2, freeway.vehicle_count());
    }
}
