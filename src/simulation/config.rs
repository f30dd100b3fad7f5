use crate::simulation::error::ConfigError;
use ahash::HashMap;
use clap::Parser;
use dyn_clone::DynClone;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt::{Debug, Display};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;
use tracing::{info, warn};

/// Macro to register an override handler for a specific config key
#[macro_export]
macro_rules! register_override {
    ($key:literal, $func:expr) => {
        inventory::submit! {
            $crate::simulation::config::OverrideHandler {
                key: $key,
                apply: $func,
            }
        }
    };
}

pub struct OverrideHandler {
    pub key: &'static str,
    pub apply: fn(config: &mut Config, value: &str),
}

// Collect all OverrideHandler submitted from anywhere in the crate
inventory::collect!(OverrideHandler);

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct CommandLineArgs {
    /// Path to a yaml config. The reference configuration is used if omitted.
    #[arg(long, short)]
    pub config: Option<String>,
    #[arg(long = "set", value_parser = parse_key_val)]
    pub overrides: Vec<(String, String)>,
}

impl CommandLineArgs {
    pub fn new_with_path(path: impl ToString) -> Self {
        CommandLineArgs {
            config: Some(path.to_string()),
            overrides: Vec::new(),
        }
    }
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let pos = s.find('=');
    match pos {
        Some(pos) => Ok((s[..pos].to_string(), s[pos + 1..].to_string())),
        None => Err(format!("invalid KEY=VALUE: no `=` found in `{}`", s)),
    }
}

fn parse_override<T>(key: &str, value: &str) -> T
where
    T: FromStr,
    T::Err: Display,
{
    value
        .trim()
        .parse()
        .unwrap_or_else(|e| panic!("Invalid value '{value}' for '{key}': {e}"))
}

#[derive(Serialize, Deserialize, Debug)]
pub struct Config {
    //this is deliberately a Mutex to allow for thread-safe sharing of the config
    modules: Mutex<HashMap<String, Box<dyn ConfigModule>>>,
    #[serde(skip)]
    context: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            modules: Mutex::new(HashMap::default()),
            context: None,
        }
    }
}

impl From<CommandLineArgs> for Config {
    fn from(args: CommandLineArgs) -> Self {
        let mut config = match args.config {
            Some(path) => Config::from(PathBuf::from(path)),
            None => Config::default(),
        };
        config.apply_overrides(&args.overrides);
        config
    }
}

impl From<PathBuf> for Config {
    fn from(config_path: PathBuf) -> Self {
        let reader = Self::local_file_reader(&config_path);
        let mut config: Config = serde_yaml::from_reader(reader).unwrap_or_else(|e| {
            panic!(
                "Failed to parse config at {:?}. Original error was: {}",
                config_path, e
            )
        });
        config.set_context(Some(config_path.clone()));
        config
    }
}

impl Config {
    pub fn set_context(&mut self, context: Option<PathBuf>) {
        self.context = context;
    }

    /// Apply generic key-value overrides to the config, e.g. simulation.steps=100
    pub fn apply_overrides(&mut self, overrides: &[(String, String)]) {
        if overrides.is_empty() {
            return;
        }
        info!("Applying overrides: {:?}", overrides);

        for (key, value) in overrides {
            let key_str = key.as_str();

            if let Some(handler) = inventory::iter::<OverrideHandler>().find(|h| h.key == key_str) {
                (handler.apply)(self, value);
            } else {
                warn!("No override handler found for key: {}", key);
            }
        }
    }

    pub fn freeway(&self) -> Freeway {
        self.module_or_default("freeway")
    }

    pub fn set_freeway(&mut self, freeway: Freeway) {
        self.set_module("freeway", freeway);
    }

    pub fn vehicles(&self) -> Vehicles {
        self.module_or_default("vehicles")
    }

    pub fn set_vehicles(&mut self, vehicles: Vehicles) {
        self.set_module("vehicles", vehicles);
    }

    pub fn simulation(&self) -> Simulation {
        self.module_or_default("simulation")
    }

    pub fn set_simulation(&mut self, simulation: Simulation) {
        self.set_module("simulation", simulation);
    }

    pub fn output(&self) -> Output {
        self.module_or_default("output")
    }

    pub fn set_output(&mut self, output: Output) {
        self.set_module("output", output);
    }

    /// Explicit parameters of the run with `n_cars` cars. Validation happens when the run starts,
    /// so that an invalid car count only fails its own run.
    pub fn run_parameters(&self, n_cars: usize) -> RunParameters {
        let freeway = self.freeway();
        let vehicles = self.vehicles();
        let simulation = self.simulation();
        RunParameters {
            lanes: freeway.lanes,
            length: freeway.length,
            n_cars,
            initial_velocity: vehicles.initial_velocity,
            max_velocity: vehicles.max_velocity,
            braking_probability: vehicles.braking_probability,
            consider_lane_change_probability: vehicles.consider_lane_change_probability,
            steps: simulation.steps,
            seed: simulation.seed,
            max_placement_attempts: simulation.max_placement_attempts,
        }
    }

    pub fn context(&self) -> &Option<PathBuf> {
        &self.context
    }

    fn module_or_default<T: ConfigModule + Clone + Default + 'static>(&self, key: &str) -> T {
        if let Some(module) = self.module::<T>(key) {
            module
        } else {
            let default = T::default();
            self.modules
                .lock()
                .unwrap()
                .insert(key.to_string(), Box::new(default.clone()));
            default
        }
    }

    fn set_module<T: ConfigModule + 'static>(&mut self, key: &str, module: T) {
        self.modules
            .lock()
            .unwrap()
            .insert(key.to_string(), Box::new(module));
    }

    fn module<T: Clone + 'static>(&self, key: &str) -> Option<T> {
        self.modules.lock().unwrap().get(key).map(|boxed| {
            boxed
                .as_ref()
                .as_any()
                .downcast_ref::<T>()
                .unwrap_or_else(|| panic!("Config module '{key}' has an unexpected type"))
                .clone()
        })
    }

    fn local_file_reader(config_path: &PathBuf) -> Box<dyn BufRead> {
        let file = File::open(config_path).unwrap_or_else(|e| {
            panic!(
                "Failed to open config file at {:?}. Original error was {}",
                config_path, e
            );
        });
        Box::new(BufReader::new(file))
    }
}

impl Clone for Config {
    fn clone(&self) -> Self {
        Config {
            modules: Mutex::new(self.modules.lock().unwrap().clone()),
            context: self.context.clone(),
        }
    }
}

pub fn write_config(config: &Config, output_path: &Path) -> std::io::Result<()> {
    let output_config = output_path.join("output_config.yml");
    let file = File::create(&output_config)?;
    let writer = BufWriter::new(file);
    serde_yaml::to_writer(writer, config).map_err(std::io::Error::other)
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Freeway {
    pub lanes: usize,
    pub length: usize,
}

impl Default for Freeway {
    fn default() -> Self {
        Freeway {
            lanes: 5,
            length: 666,
        }
    }
}

register_override!("freeway.lanes", |config, value| {
    let mut freeway = config.freeway();
    freeway.lanes = parse_override("freeway.lanes", value);
    config.set_freeway(freeway);
});

register_override!("freeway.length", |config, value| {
    let mut freeway = config.freeway();
    freeway.length = parse_override("freeway.length", value);
    config.set_freeway(freeway);
});

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Vehicles {
    #[serde(default)]
    pub initial_velocity: u32,
    pub max_velocity: u32,
    pub braking_probability: f64,
    pub consider_lane_change_probability: f64,
}

impl Default for Vehicles {
    fn default() -> Self {
        Vehicles {
            initial_velocity: 0,
            max_velocity: 6,
            braking_probability: 0.2,
            consider_lane_change_probability: 0.5,
        }
    }
}

register_override!("vehicles.initial_velocity", |config, value| {
    let mut vehicles = config.vehicles();
    vehicles.initial_velocity = parse_override("vehicles.initial_velocity", value);
    config.set_vehicles(vehicles);
});

register_override!("vehicles.max_velocity", |config, value| {
    let mut vehicles = config.vehicles();
    vehicles.max_velocity = parse_override("vehicles.max_velocity", value);
    config.set_vehicles(vehicles);
});

register_override!("vehicles.braking_probability", |config, value| {
    let mut vehicles = config.vehicles();
    vehicles.braking_probability = parse_override("vehicles.braking_probability", value);
    config.set_vehicles(vehicles);
});

register_override!("vehicles.consider_lane_change_probability", |config, value| {
    let mut vehicles = config.vehicles();
    vehicles.consider_lane_change_probability =
        parse_override("vehicles.consider_lane_change_probability", value);
    config.set_vehicles(vehicles);
});

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Simulation {
    pub steps: u64,
    /// One run is started per entry.
    pub car_counts: Vec<usize>,
    /// Runs are seeded from OS entropy if no seed is given.
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default = "default_placement_attempts")]
    pub max_placement_attempts: usize,
}

fn default_placement_attempts() -> usize {
    100_000
}

impl Default for Simulation {
    fn default() -> Self {
        Simulation {
            steps: 3600,
            car_counts: vec![50, 100, 150, 200],
            seed: None,
            max_placement_attempts: default_placement_attempts(),
        }
    }
}

register_override!("simulation.steps", |config, value| {
    let mut simulation = config.simulation();
    simulation.steps = parse_override("simulation.steps", value);
    config.set_simulation(simulation);
});

register_override!("simulation.car_counts", |config, value| {
    let mut simulation = config.simulation();
    simulation.car_counts = value
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|s| parse_override("simulation.car_counts", s))
        .collect();
    config.set_simulation(simulation);
});

register_override!("simulation.seed", |config, value| {
    let mut simulation = config.simulation();
    simulation.seed = Some(parse_override("simulation.seed", value));
    config.set_simulation(simulation);
});

register_override!("simulation.max_placement_attempts", |config, value| {
    let mut simulation = config.simulation();
    simulation.max_placement_attempts = parse_override("simulation.max_placement_attempts", value);
    config.set_simulation(simulation);
});

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Output {
    pub output_dir: PathBuf,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub write_trajectories: WriteTrajectories,
    /// Gzip the xyz trajectories.
    #[serde(default)]
    pub compress: bool,
}

impl Default for Output {
    fn default() -> Self {
        Output {
            output_dir: "./data".into(),
            logging: Logging::None,
            write_trajectories: WriteTrajectories::All,
            compress: false,
        }
    }
}

register_override!("output.output_dir", |config, value| {
    let mut output = config.output();
    output.output_dir = PathBuf::from(value);
    config.set_output(output);
});

register_override!("output.write_trajectories", |config, value| {
    let mut output = config.output();
    output.write_trajectories = match value.to_lowercase().as_str() {
        "none" => WriteTrajectories::None,
        "csv" => WriteTrajectories::Csv,
        "xyz" => WriteTrajectories::Xyz,
        "all" => WriteTrajectories::All,
        _ => panic!("Invalid trajectory output: {}", value),
    };
    config.set_output(output);
});

register_override!("output.logging", |config, value| {
    let mut output = config.output();
    output.logging = match value.to_lowercase().as_str() {
        "none" => Logging::None,
        "info" => Logging::Info,
        _ => panic!("Invalid logging level: {}", value),
    };
    config.set_output(output);
});

register_override!("output.compress", |config, value| {
    let mut output = config.output();
    output.compress = parse_override("output.compress", value);
    config.set_output(output);
});

/// Have this extra layer of log level enum, as tracing subscriber has no
/// off/none option by default. At least it can't be parsed
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize, Default)]
pub enum Logging {
    #[default]
    None,
    Info,
}

#[derive(PartialEq, Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub enum WriteTrajectories {
    None,
    Csv,
    Xyz,
    #[default]
    All,
}

impl WriteTrajectories {
    pub fn csv(&self) -> bool {
        matches!(self, WriteTrajectories::Csv | WriteTrajectories::All)
    }

    pub fn xyz(&self) -> bool {
        matches!(self, WriteTrajectories::Xyz | WriteTrajectories::All)
    }
}

#[typetag::serde(tag = "type")]
pub trait ConfigModule: Debug + Send + DynClone {
    fn as_any(&self) -> &dyn Any;
}

#[typetag::serde]
impl ConfigModule for Freeway {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[typetag::serde]
impl ConfigModule for Vehicles {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[typetag::serde]
impl ConfigModule for Simulation {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[typetag::serde]
impl ConfigModule for Output {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

// This is needed to allow cloning of the trait object and thus cloning of the Config.
dyn_clone::clone_trait_object!(ConfigModule);

/// Everything a single run needs. Handed to the run by value, so that runs share no state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunParameters {
    pub lanes: usize,
    pub length: usize,
    pub n_cars: usize,
    pub initial_velocity: u32,
    pub max_velocity: u32,
    pub braking_probability: f64,
    pub consider_lane_change_probability: f64,
    pub steps: u64,
    pub seed: Option<u64>,
    pub max_placement_attempts: usize,
}

impl RunParameters {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lanes == 0 {
            return Err(ConfigError::NoLanes);
        }
        if self.length == 0 {
            return Err(ConfigError::ZeroLength);
        }
        Self::check_probability("braking_probability", self.braking_probability)?;
        Self::check_probability(
            "consider_lane_change_probability",
            self.consider_lane_change_probability,
        )?;
        if self.initial_velocity > self.max_velocity {
            return Err(ConfigError::InitialVelocityTooHigh {
                initial: self.initial_velocity,
                max: self.max_velocity,
            });
        }
        if self.n_cars > self.capacity() {
            return Err(ConfigError::TooManyCars {
                n_cars: self.n_cars,
                capacity: self.capacity(),
            });
        }
        Ok(())
    }

    pub fn capacity(&self) -> usize {
        self.lanes * self.length
    }

    /// Name shared by all output files of this run.
    pub fn file_stem(&self) -> String {
        format!(
            "cars_{}_maxvel_{}_brakeprob_{}_lanechangeprob_{}_simulation",
            self.n_cars,
            self.max_velocity,
            self.braking_probability,
            self.consider_lane_change_probability
        )
    }

    fn check_probability(name: &'static str, value: f64) -> Result<(), ConfigError> {
        if (0.0..=1.0).contains(&value) {
            Ok(())
        } else {
            Err(ConfigError::ProbabilityOutOfRange { name, value })
        }
    }
}
