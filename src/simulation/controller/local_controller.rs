use crate::simulation::config::{write_config, Config};
use crate::simulation::controller::{
    self, BatchReport, RunArgumentsBuilder, RunSummary, SubscriberFactory,
};
use crate::simulation::error::SimulationError;
use crate::simulation::io;
use derive_builder::Builder;
use derive_more::Debug;
use itertools::Itertools;
use nohash_hasher::IntMap;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use std::{fs, thread};
use tracing::info;

type RunHandle = JoinHandle<Result<RunSummary, SimulationError>>;

/// Runs one simulation per configured car count, each on its own thread.
#[derive(Debug, Builder)]
#[builder(pattern = "owned")]
pub struct LocalController {
    config: Config,
    #[builder(default)]
    #[debug(skip)]
    additional_subscribers: Vec<Arc<SubscriberFactory>>,
    #[builder(default = "Duration::from_millis(100)")]
    poll_interval: Duration,
}

impl LocalControllerBuilder {
    pub fn add_subscriber(mut self, factory: Arc<SubscriberFactory>) -> Self {
        self.additional_subscribers
            .get_or_insert_with(Vec::new)
            .push(factory);
        self
    }
}

impl LocalController {
    /// Runs all configurations and joins all threads before returning. Failing runs are part of
    /// the report; only errors of the batch itself, like an unwritable output directory, abort.
    pub fn run(self) -> Result<BatchReport, SimulationError> {
        let output = self.config.output();
        let output_path = io::resolve_path(self.config.context(), &output.output_dir);
        fs::create_dir_all(&output_path)?;

        let car_counts = self.config.simulation().car_counts;
        info!(
            "Starting {} runs in parallel with car counts {}.",
            car_counts.len(),
            car_counts.iter().join(", ")
        );

        let mut handles: IntMap<usize, (usize, RunHandle)> = IntMap::default();
        for (i, n_cars) in car_counts.iter().copied().enumerate() {
            let args = RunArgumentsBuilder::default()
                .params(self.config.run_parameters(n_cars))
                .output(output.clone())
                .output_path(output_path.clone())
                .additional_subscribers(self.additional_subscribers.clone())
                .build()
                .map_err(std::io::Error::other)?;
            let handle = thread::Builder::new()
                .name(format!("nasch-{n_cars}"))
                .spawn(move || controller::execute_run(args))?;
            handles.insert(i, (n_cars, handle));
        }

        let report = controller::try_join(handles, self.poll_interval);
        report.log_summary();

        info!("Writing output files:");
        info!("    ... Config ...");
        write_config(&self.config, &output_path)?;

        Ok(report)
    }
}
