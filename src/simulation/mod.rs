pub mod analysis;
pub mod config;
pub mod controller;
pub mod engines;
pub mod error;
pub mod events;
pub mod io;
pub mod logging;
pub mod network;
pub mod random;
pub mod scenario;
#[allow(clippy::module_inception)]
pub mod simulation;
pub mod vehicles;
