//! Sends GPS tracks stored as GeoJSON points through the Geoapify Map Matching API, and saves the
//! matched features next to the input.

#[macro_use]
extern crate log;

mod dry_run;
mod frontend;
mod shell;

use std::path::{Path, PathBuf};

use anyhow::Result;
use structopt::StructOpt;

use mapmatch::{Config, HttpTransport, Settings};

use frontend::LogView;

#[derive(StructOpt)]
#[structopt(name = "mapmatch", about = "GeoJSON tracks to the Geoapify Map Matching API")]
enum Command {
    /// Match one GeoJSON file and save `<name>_response.geojson`
    Run {
        /// The path to a GeoJSON FeatureCollection of points
        #[structopt()]
        input: PathBuf,
        /// The path to config.ini. Defaults to the one next to this executable.
        #[structopt(long)]
        config: Option<PathBuf>,
        /// Write the result here, instead of the configured output directory
        #[structopt(long)]
        output_dir: Option<PathBuf>,
    },
    /// Pick files and send them interactively. Type `help` once it's running.
    Shell {
        /// The path to config.ini. Defaults to the one next to this executable.
        #[structopt(long)]
        config: Option<PathBuf>,
    },
    /// Print the request bodies a run would send, without contacting the API
    Waypoints {
        /// The path to a GeoJSON FeatureCollection of points
        #[structopt()]
        input: PathBuf,
        /// Write the bodies to this JSON file instead of STDOUT
        #[structopt(long)]
        output: Option<PathBuf>,
    },
    /// Write a config.ini template to fill in
    InitConfig {
        /// Where to write it. Defaults to next to this executable.
        #[structopt(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    mapmatch::logger::setup();

    match Command::from_args() {
        Command::Run {
            input,
            config,
            output_dir,
        } => {
            let mut settings = load_settings(config)?;
            if output_dir.is_some() {
                settings.output_dir = output_dir;
            }
            let mut view = LogView::stdout();
            let summary = frontend::run_once(input, settings, HttpTransport::new()?, &mut view)?;
            if summary.is_none() {
                std::process::exit(1);
            }
        }
        Command::Shell { config } => shell::run(load_settings(config)?)?,
        Command::Waypoints { input, output } => dry_run::run(&input, output.as_deref())?,
        Command::InitConfig { config } => {
            let path = config.unwrap_or_else(Config::default_path);
            Config::write_template(&path)?;
            println!("Wrote {}. Fill in api_key before running.", path.display());
        }
    }
    Ok(())
}

/// A broken config is fatal before anything starts.
fn load_settings(path: Option<PathBuf>) -> Result<Settings> {
    let path = path.unwrap_or_else(Config::default_path);
    match Config::load(&path) {
        Ok(config) => Ok(Settings::from_config(&config)),
        Err(err) => config_error(&path, err),
    }
}

fn config_error(path: &Path, err: mapmatch::Error) -> ! {
    eprintln!("Configuration: {}", err);
    if !path.exists() {
        eprintln!("Run `mapmatch init-config` to create a template.");
    }
    std::process::exit(1);
}
