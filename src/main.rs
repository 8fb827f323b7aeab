//! snowline CLI entrypoint.
//!
//! Thin wrapper over `snowline::api`: load a JSON configuration, run the AAR
//! estimation and write the outputs.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use snowline::api::run_with_config;
use snowline::core::CompositeMode;
use snowline::AarConfig;

#[derive(Parser)]
#[command(name = "snowline", version, about = "Glacier snow cover and AAR estimation")]
struct CliArgs {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the estimation described by a configuration file
    Run {
        /// JSON configuration file
        config: PathBuf,

        /// Override the output directory
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Skip writing snow mask GeoTIFFs
        #[arg(long, default_value_t = false)]
        no_masks: bool,
    },
    /// Validate a configuration file and list its composite windows
    Check {
        /// JSON configuration file
        config: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    let level = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match args.command {
        Command::Run {
            config,
            output_dir,
            no_masks,
        } => {
            let mut config = AarConfig::from_file(&config)?;
            if let Some(dir) = output_dir {
                config.output_dir = dir;
            }
            if no_masks {
                config.write_masks = false;
            }

            let (report, written) = run_with_config(&config)?;
            for result in &report.windows {
                match (result.threshold(), result.aar()) {
                    (Some(t), Some(aar)) => println!(
                        "{}  threshold {:.4}  snow {:>8}  AAR {:.3}",
                        result.window,
                        t,
                        result.snow_pixels().unwrap_or(0),
                        aar
                    ),
                    _ => println!("{}  skipped", result.window),
                }
            }
            log::info!("{} files written to {}", written.len(), config.output_dir.display());
        }
        Command::Check { config } => {
            let config = AarConfig::from_file(&config)?;
            if config.composite_mode == CompositeMode::PerScene {
                println!("Configuration OK: every scene mapped on its own");
                return Ok(());
            }
            let windows = config.windows().windows()?;
            println!("Configuration OK: {} windows", windows.len());
            for window in windows {
                println!("  {}", window);
            }
        }
    }

    Ok(())
}
