//! scrapedeck - run the extraction worker without the desktop shell
//!
//! This is the binary entry point. All logic lives in the library crates.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, Result};

use scrapedeck::{build_surface, check_update, parse_setting_value, run_job};
use scrapedeck_app::{default_config_path, load_config, SettingsStore, TomlSettingsStore};
use scrapedeck_core::logging;
use scrapedeck_core::UpdateStatus;
use scrapedeck_worker::JobRequest;

/// scrapedeck - supervise the product extraction worker
#[derive(Parser, Debug)]
#[command(name = "scrapedeck")]
#[command(about = "Run and supervise the product extraction worker", long_about = None)]
struct Args {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Run one extraction job and stream NDJSON events to stdout
    Run {
        /// Target manufacturer (the worker ships lodes and vibia)
        #[arg(short, long)]
        manufacturer: String,

        /// Item identifiers to extract
        #[arg(short, long, num_args = 1.., conflicts_with = "skus_file")]
        skus: Vec<String>,

        /// File with one item identifier per line
        #[arg(long, value_name = "FILE")]
        skus_file: Option<PathBuf>,

        /// Output directory
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,

        /// Skip image downloads
        #[arg(long)]
        no_images: bool,

        /// Generate AI product descriptions
        #[arg(long)]
        ai_descriptions: bool,

        /// Skip translation
        #[arg(long)]
        no_translate: bool,

        /// Verbose worker logging
        #[arg(short, long)]
        verbose: bool,
    },

    /// Check the update feed and download a newer release if there is one
    CheckUpdate {
        /// Launch the installer once the download completes
        #[arg(long)]
        install: bool,
    },

    /// Read or write UI settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand, Debug)]
enum SettingsAction {
    /// Print a value as JSON
    Get { key: String },
    /// Store a value (JSON, or a plain string); `null` removes the key
    Set { key: String, value: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    if let Err(e) = logging::init() {
        eprintln!("Logging disabled: {}", e);
    }

    let config_path = args.config.unwrap_or_else(default_config_path);
    let config = load_config(&config_path);

    match args.command {
        Cmd::Run {
            manufacturer,
            skus,
            skus_file,
            output,
            no_images,
            ai_descriptions,
            no_translate,
            verbose,
        } => {
            let request = JobRequest {
                manufacturer,
                items: (!skus.is_empty()).then_some(skus),
                items_file: skus_file,
                output_dir: output,
                skip_images: no_images,
                ai_descriptions,
                skip_translation: no_translate,
                verbose,
            };

            let outcome = run_job(&config, request).await?;
            std::process::exit(outcome.exit_code());
        }
        Cmd::CheckUpdate { install } => {
            if config.updates.feed_dir.is_none() {
                return Err(eyre!(
                    "no update feed configured; set [updates] feed_dir in {}",
                    config_path.display()
                ));
            }
            let settings = Arc::new(TomlSettingsStore::open(TomlSettingsStore::default_path()));
            let surface = build_surface(&config, settings);
            let status = check_update(&surface, install).await?;
            if let UpdateStatus::Error { message } = status {
                return Err(eyre!("update check failed: {}", message));
            }
        }
        Cmd::Settings { action } => {
            let store = TomlSettingsStore::open(TomlSettingsStore::default_path());
            match action {
                SettingsAction::Get { key } => match store.get(&key) {
                    Some(value) => println!("{}", value),
                    None => std::process::exit(1),
                },
                SettingsAction::Set { key, value } => {
                    store.set(&key, parse_setting_value(&value))?;
                }
            }
        }
    }

    Ok(())
}
