use clap::Parser;
use exn::ResultExt;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use tamp_config::Config;
use tamp_config::error::{ErrorKind, Result};
use tamp_inplace::Preset;

const LOG_TARGETS: [&str; 4] = ["tamp", "tamp_config", "tamp_engine", "tamp_inplace"];

/// Recompress every matching file under a directory in place, safely.
///
/// Files are replaced only once the external program has produced a complete
/// result. If a run is killed part-way through, the next run over the same
/// directory finishes or rolls back whatever was in flight.
#[derive(Clone, Debug, Parser)]
#[command(name = "tamp", version, about, long_about = None)]
pub struct Args {
    /// Directory to process
    #[arg(value_name = "DIRECTORY")]
    pub directory: PathBuf,

    /// Configuration file (.toml, .yaml or .json)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Program preset (imagemagick, tiffcp); replaces any configured command
    #[arg(short, long, value_name = "NAME")]
    pub preset: Option<String>,

    /// Number of worker threads [default: one per CPU]
    #[arg(short, long, value_name = "NUM")]
    pub workers: Option<NonZeroUsize>,

    /// Kill the program after this many seconds and retry the file
    #[arg(short, long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Only process files directly inside DIRECTORY
    #[arg(long)]
    pub no_recursive: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    /// Applies command-line flags on top of the loaded configuration.
    pub fn apply(&self, config: &mut Config) -> Result<()> {
        if let Some(name) = &self.preset {
            let preset = name.parse::<Preset>().or_raise(|| ErrorKind::Invalid(format!("unknown preset: {name}")))?;
            config.transform.preset = Some(preset);
            config.transform.command = None;
            config.transform.extensions = None;
        }
        if let Some(workers) = self.workers {
            config.engine.workers = Some(workers);
        }
        if let Some(timeout) = self.timeout {
            config.transform.timeout_secs = Some(timeout);
        }
        if self.no_recursive {
            config.engine.recursive = false;
        }
        config.validate()
    }

    /// `EnvFilter` directives for our own crates; everything else stays at `warn`.
    pub fn log_filter(&self) -> String {
        let level = match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        let mut directives: Vec<String> = LOG_TARGETS.iter().map(|target| format!("{target}={level}")).collect();
        directives.push("warn".to_string());
        directives.join(",")
    }
}
