//! otad - OTA update orchestrator with post-update valve calibration watchdog

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ota_common::{Config, ConfigSource, IeeeAddr};
use otad::simulate::{run_simulation, SimulationPlan};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "otad")]
#[command(about = "OTA update orchestrator with post-update valve calibration", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (defaults to /etc/otad/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an update and the calibration it triggers against a scripted device
    Simulate {
        /// Model identifier of the simulated device
        #[arg(long, default_value = "BTH-RA")]
        model: String,

        /// IEEE address of the simulated device
        #[arg(long, default_value = "0x00182f0000123456")]
        ieee: IeeeAddr,

        /// Adaptation status codes returned by successive polls (e.g. "0,0,1,2,4")
        #[arg(long, value_delimiter = ',', default_value = "0,0,1,2,4")]
        statuses: Vec<u16>,

        /// Fail this many status reads before the script starts
        #[arg(long, default_value_t = 0)]
        read_faults: usize,

        /// Reject the calibrate command
        #[arg(long)]
        fail_command: bool,

        /// Fail the firmware transfer
        #[arg(long)]
        fail_update: bool,

        /// Simulate a device without thermostat endpoint
        #[arg(long)]
        no_endpoint: bool,

        /// Run timers in virtual time instead of waiting for real
        #[arg(long)]
        virtual_time: bool,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the effective configuration
    Config {
        /// Write the default configuration to this path instead
        #[arg(long)]
        write_default: Option<PathBuf>,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<(Config, ConfigSource)> {
    match path {
        Some(path) => {
            let config = Config::load_from_path(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?;
            Ok((config, ConfigSource::File(path.clone())))
        }
        None => Ok(Config::load()),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config, source) = load_config(cli.config.as_ref())?;

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.filter))
        .context("Invalid logging filter")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("otad v{} starting", env!("CARGO_PKG_VERSION"));
    source.log();

    match cli.command {
        Commands::Simulate {
            model,
            ieee,
            statuses,
            read_faults,
            fail_command,
            fail_update,
            no_endpoint,
            virtual_time,
            json,
        } => {
            if virtual_time {
                tokio::time::pause();
            }

            let plan = SimulationPlan {
                ieee_addr: ieee,
                model,
                statuses,
                read_faults,
                fail_command,
                fail_update,
                thermostat_endpoint: !no_endpoint,
            };
            let result = run_simulation(&plan, &config.calibration).await;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
                return Ok(());
            }

            match (&result.firmware_version, &result.update_error) {
                (Some(version), _) => {
                    println!("Firmware:    {} updated to {}", result.device, version)
                }
                (None, Some(err)) => println!("Firmware:    update failed: {}", err),
                (None, None) => println!("Firmware:    no result"),
            }
            match (&result.calibration, &result.calibration_error) {
                (Some(report), _) => {
                    println!(
                        "Calibration: {:?} after {}s",
                        report.state,
                        report.elapsed_ms / 1000
                    );
                    println!(
                        "             {} polls ({} faults), {} commands ({} faults)",
                        report.polls,
                        report.read_faults,
                        report.commands_issued,
                        report.command_faults
                    );
                    if let Some(err) = &report.error {
                        println!("             {}", err);
                    }
                }
                (None, Some(err)) => println!("Calibration: not started: {}", err),
                (None, None) => println!("Calibration: not required"),
            }
        }

        Commands::Config { write_default } => match write_default {
            Some(path) => {
                Config::save_default(&path)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                println!("Wrote default config to {}", path.display());
            }
            None => print!("{}", config.to_toml()?),
        },
    }

    Ok(())
}
