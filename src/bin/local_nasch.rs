use clap::Parser;
use rust_nasch::simulation::config::{CommandLineArgs, Config};
use rust_nasch::simulation::controller::local_controller::LocalControllerBuilder;
use rust_nasch::simulation::logging::init_std_out_logging_thread_local;
use std::process::ExitCode;
use tracing::{error, info};

fn main() -> ExitCode {
    let _guard = init_std_out_logging_thread_local();

    let args = CommandLineArgs::parse();
    info!("Started with args: {:?}", args);

    // Load and adapt config
    let config = Config::from(args);

    let controller = LocalControllerBuilder::default()
        .config(config)
        .build()
        .unwrap();

    match controller.run() {
        Ok(report) if report.is_success() => ExitCode::SUCCESS,
        Ok(report) => {
            error!("{} runs failed.", report.failures().count());
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("Batch aborted: {e}");
            ExitCode::FAILURE
        }
    }
}
