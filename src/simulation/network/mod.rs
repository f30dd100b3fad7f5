pub mod freeway;
pub mod ring;

pub use freeway::{Freeway, OccupiedCell};
