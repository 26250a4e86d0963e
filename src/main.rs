use clap::{Parser, Subcommand};
use qpix_mesh_sim::config::SimConfig;
use qpix_mesh_sim::core::asic::Command as AsicCommand;
use qpix_mesh_sim::core::mesh::Mesh;
use qpix_mesh_sim::driver::Driver;
use qpix_mesh_sim::log::Logger;
use qpix_mesh_sim::scenario::ScenarioName;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "qpix-mesh-sim", version, about = "Discrete-event simulator for a Q-Pix ASIC mesh")]
struct Cli {
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a mesh built from a YAML config file (or defaults) and interrogate it once.
    Run {
        #[arg(long)]
        config: Option<PathBuf>,
        /// Absolute simulation time, in seconds, to run until.
        #[arg(long, default_value_t = 1e-2)]
        until: f64,
        /// Interrogate, HardInterrogate, or Calibrate (broadcast from the DAQ node).
        #[arg(long, default_value = "interrogate")]
        command: String,
    },
    /// Run one of the canned S1-S6 scenarios and print its DAQ record summary.
    Scenario {
        /// s1 .. s6
        name: String,
    },
}

fn parse_command(name: &str) -> Option<AsicCommand> {
    match name.to_lowercase().as_str() {
        "interrogate" => Some(AsicCommand::Interrogate),
        "hardinterrogate" => Some(AsicCommand::HardInterrogate),
        "calibrate" => Some(AsicCommand::Calibrate),
        _ => None,
    }
}

fn main() {
    let cli = Cli::parse();
    let logger = Logger::new(&cli.log_level);

    match cli.command {
        Commands::Run { config, until, command } => {
            let sim_config = match config {
                Some(path) => SimConfig::load(&path).unwrap_or_else(|e| {
                    tracing::warn!(error = %e, "failed to load config, falling back to defaults");
                    SimConfig::default()
                }),
                None => SimConfig::default(),
            };
            let Some(asic_command) = parse_command(&command) else {
                eprintln!("unknown command: {command} (expected interrogate, hardinterrogate, or calibrate)");
                std::process::exit(1);
            };

            info!(rows = sim_config.rows, cols = sim_config.cols, "building mesh");
            let asic_defaults = sim_config.asic_defaults.clone().into_asic_config();
            let mesh = Mesh::new(sim_config.rows, sim_config.cols, asic_defaults, sim_config.seed);
            let mut driver = Driver::new(mesh);

            if let Err(e) = driver.schedule(asic_command, None, None, 0.0) {
                tracing::error!(error = %e, "run aborted");
                std::process::exit(1);
            }
            if let Err(e) = driver.run_until(until) {
                tracing::error!(error = %e, "run aborted");
                std::process::exit(1);
            }

            let records = driver.drain_daq();
            info!(count = records.len(), "daq records collected");
            for record in &records {
                println!("{:?}", record);
            }
        }
        Commands::Scenario { name } => {
            let Some(scenario) = ScenarioName::parse(&name.to_lowercase()) else {
                eprintln!("unknown scenario: {name} (expected one of s1..s6)");
                std::process::exit(1);
            };
            match scenario.run() {
                Ok(records) => {
                    info!(scenario = %name, count = records.len(), "scenario complete");
                    for record in &records {
                        println!("{:?}", record);
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "scenario failed");
                    std::process::exit(1);
                }
            }
        }
    }

    let _ = logger;
}
