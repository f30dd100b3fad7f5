pub mod local_controller;

use crate::simulation::analysis::flow_collector::{FlowCollector, FlowStatistics};
use crate::simulation::config::{Output, RunParameters};
use crate::simulation::error::SimulationError;
use crate::simulation::events::{EventsPublisher, EventsSubscriber, SnapshotLogger};
use crate::simulation::io::{CsvTrajectoryWriter, XyzTrajectoryWriter};
use crate::simulation::scenario::Scenario;
use crate::simulation::simulation::Simulation;
use crate::simulation::{logging, random};
use derive_builder::Builder;
use derive_more::Debug;
use nohash_hasher::IntMap;
use std::any::Any;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{sleep, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{error, info};

/// Creates an additional subscriber on the thread executing a run.
pub type SubscriberFactory =
    dyn Fn(&RunParameters) -> Box<dyn EventsSubscriber + Send> + Send + Sync;

/// Everything a run thread needs. Moved into the thread, so that runs share nothing but the
/// subscriber factories.
#[derive(Debug, Builder)]
#[builder(pattern = "owned")]
pub struct RunArguments {
    params: RunParameters,
    output: Output,
    output_path: PathBuf,
    #[builder(default)]
    #[debug(skip)]
    additional_subscribers: Vec<Arc<SubscriberFactory>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub n_cars: usize,
    pub steps: u64,
    pub elapsed: Duration,
    pub statistics: Option<FlowStatistics>,
}

#[derive(Debug, Error)]
pub enum RunFailure {
    #[error(transparent)]
    Simulation(#[from] SimulationError),
    #[error("run thread {thread} panicked: {message}")]
    Panicked { thread: String, message: String },
}

/// Result of the run for a single car count.
#[derive(Debug)]
pub struct RunOutcome {
    pub n_cars: usize,
    pub result: Result<RunSummary, RunFailure>,
}

/// Outcomes of all runs of a batch, in the order of the configured car counts.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<RunOutcome>,
}

impl BatchReport {
    pub fn successes(&self) -> impl Iterator<Item = &RunSummary> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = (usize, &RunFailure)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.n_cars, e)))
    }

    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }

    pub fn log_summary(&self) {
        for outcome in &self.outcomes {
            match &outcome.result {
                Ok(summary) => match &summary.statistics {
                    Some(stats) => info!(
                        "nCars: {} succeeded. Density: {:.4}, mean velocity: {:.4}, flow: {:.4}, elapsed: {} ms",
                        outcome.n_cars,
                        stats.density,
                        stats.mean_velocity,
                        stats.flow,
                        summary.elapsed.as_millis()
                    ),
                    None => info!(
                        "nCars: {} succeeded after {} ms",
                        outcome.n_cars,
                        summary.elapsed.as_millis()
                    ),
                },
                Err(e) => error!("nCars: {} failed: {}", outcome.n_cars, e),
            }
        }
        info!(
            "{} of {} runs succeeded.",
            self.successes().count(),
            self.outcomes.len()
        );
    }
}

/// Body of a run thread. Sets up thread local logging, places the cars, runs all steps and
/// returns the measured statistics.
fn execute_run(args: RunArguments) -> Result<RunSummary, SimulationError> {
    let n_cars = args.params.n_cars;
    let _guards = logging::init_logging(&args.output.logging, &args.output_path, n_cars);

    let result = simulate(args);
    if let Err(e) = &result {
        error!("Run with {n_cars} cars failed: {e}");
    }

    // Drop guards here to make sure that the logging is flushed before the thread exits.
    drop(_guards);
    result
}

fn simulate(args: RunArguments) -> Result<RunSummary, SimulationError> {
    let n_cars = args.params.n_cars;
    let steps = args.params.steps;

    let mut rng = random::run_rnd(args.params.seed, n_cars);
    let scenario = Scenario::build(args.params.clone(), &mut rng)?;
    let events = create_events(&args)?;
    let mut simulation = Simulation::new(scenario, rng, events);

    let now = Instant::now();
    simulation.run()?;
    let elapsed = now.elapsed();
    info!("nCars: {}   ElapsedTime: {}", n_cars, elapsed.as_millis());

    let statistics = simulation
        .events_mut()
        .get_subscriber::<FlowCollector>()
        .and_then(|c| c.statistics());

    Ok(RunSummary {
        n_cars,
        steps,
        elapsed,
        statistics,
    })
}

fn create_events(args: &RunArguments) -> Result<EventsPublisher, SimulationError> {
    let mut events = EventsPublisher::new();
    events.add_subscriber(Box::new(SnapshotLogger {}));
    events.add_subscriber(Box::new(FlowCollector::new()));

    let stem = args.params.file_stem();
    let trajectories = args.output.write_trajectories;
    if trajectories.csv() {
        let path = args.output_path.join(format!("{stem}.csv"));
        events.add_subscriber(Box::new(CsvTrajectoryWriter::new(&path)?));
    }
    if trajectories.xyz() {
        let file_name = if args.output.compress {
            format!("{stem}.xyz.gz")
        } else {
            format!("{stem}.xyz")
        };
        let path = args.output_path.join(file_name);
        events.add_subscriber(Box::new(XyzTrajectoryWriter::new(&path)?));
    }

    for factory in &args.additional_subscribers {
        events.add_subscriber(factory(&args.params));
    }
    Ok(events)
}

/// Joins all run threads. A thread that panicked yields a failed outcome instead of taking the
/// whole batch down.
pub fn try_join(
    mut handles: IntMap<usize, (usize, JoinHandle<Result<RunSummary, SimulationError>>)>,
    poll_interval: Duration,
) -> BatchReport {
    let mut outcomes: Vec<(usize, RunOutcome)> = Vec::with_capacity(handles.len());

    while !handles.is_empty() {
        sleep(poll_interval);
        let finished: Vec<usize> = handles
            .iter()
            .filter(|(_, (_, handle))| handle.is_finished())
            .map(|(i, _)| *i)
            .collect();

        for i in finished {
            let Some((n_cars, handle)) = handles.remove(&i) else {
                continue;
            };
            let thread = handle
                .thread()
                .name()
                .unwrap_or("unnamed_thread")
                .to_string();
            let result = match handle.join() {
                Ok(result) => result.map_err(RunFailure::from),
                Err(panic) => Err(RunFailure::Panicked {
                    thread,
                    message: panic_message(panic.as_ref()),
                }),
            };
            outcomes.push((i, RunOutcome { n_cars, result }));
        }
    }

    outcomes.sort_by_key(|(i, _)| *i);
    BatchReport {
        outcomes: outcomes.into_iter().map(|(_, o)| o).collect(),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
