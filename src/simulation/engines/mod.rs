pub mod lane_change_engine;
pub mod velocity_engine;
