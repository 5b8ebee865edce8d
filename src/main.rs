//! tamp - crash-safe, concurrent, in-place bulk file transforms
//!
//! Entry point for the CLI application.

mod cli;

use crate::cli::Args;
use clap::Parser;
use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use tamp_config::Config;
use tamp_engine::Scheduler;
use tracing_subscriber::EnvFilter;

/// Every file processed successfully.
const EXIT_OK: u8 = 0;
/// The run finished, but some files failed.
const EXIT_FAILURES: u8 = 1;
/// Nothing was processed.
const EXIT_ABORTED: u8 = 2;

fn main() -> ExitCode {
    let args = Args::parse();
    setup_logging(&args);
    ExitCode::from(run(&args, &mut io::stdout().lock()))
}

/// Runs one pass over `args.directory`, writing one `path: cause` line per
/// failed file to `report`, and returns the process exit code.
fn run(args: &Args, report: &mut impl Write) -> u8 {
    let mut config = match Config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => return abort("Could not load configuration", &e),
    };
    if let Err(e) = args.apply(&mut config) {
        return abort("Invalid configuration", &e);
    }
    let transform = match config.transform.build() {
        Ok(transform) => transform,
        Err(e) => return abort("Invalid transform", &e),
    };

    let scheduler = Scheduler::new(transform)
        .workers(config.engine.workers)
        .recursive(config.engine.recursive);
    let cancelled = scheduler.cancellation();
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!("\nInterrupt received, finishing files in progress...");
        cancelled.store(true, Ordering::SeqCst);
    }) {
        tracing::warn!(error = %e, "Could not install interrupt handler");
    }

    let failures = match scheduler.run(&args.directory) {
        Ok(failures) => failures,
        Err(e) => return abort("Run aborted", &e),
    };
    if failures.is_empty() {
        return EXIT_OK;
    }
    for failure in &failures {
        _ = writeln!(report, "{failure}");
    }
    tracing::warn!(failed = failures.len(), "Some files could not be transformed");
    EXIT_FAILURES
}

fn abort<K: std::error::Error + Send + Sync + 'static>(context: &str, err: &exn::Exn<K>) -> u8 {
    tracing::error!(error = ?err, "{context}");
    eprintln!("Error: {context}: {}", &**err);
    EXIT_ABORTED
}

fn setup_logging(args: &Args) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(args.log_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    #[fixture]
    fn dir() -> TempDir {
        tempfile::tempdir().unwrap()
    }

    /// Writes a TOML configuration running `command` on `.tif` files.
    fn config(dir: &Path, command: &[&str]) -> String {
        let path = dir.join("tamp.toml");
        let argv: Vec<String> = command.iter().map(|arg| format!("{arg:?}")).collect();
        let contents = format!(
            "[transform]\ncommand = [{}]\nextensions = [\"tif\"]\n\n[engine]\nworkers = 2\n",
            argv.join(", ")
        );
        fs::write(&path, contents).unwrap();
        path.to_string_lossy().into_owned()
    }

    fn tamp(args: &[&str]) -> (u8, String) {
        let args = Args::try_parse_from(std::iter::once("tamp").chain(args.iter().copied())).unwrap();
        let mut report = Vec::new();
        let code = run(&args, &mut report);
        (code, String::from_utf8(report).unwrap())
    }

    #[rstest]
    fn test_all_files_transformed(dir: TempDir) {
        let scans = dir.path().join("scans");
        fs::create_dir(&scans).unwrap();
        fs::write(scans.join("a.tif"), "alpha").unwrap();
        fs::write(scans.join("b.tif"), "bravo").unwrap();
        let config = config(dir.path(), &["sh", "-c", "tr a-z A-Z < \"$0\" > \"$1\"", "{{ input }}", "{{ output }}"]);

        let (code, report) = tamp(&["--config", &config, scans.to_str().unwrap()]);
        assert_eq!(code, EXIT_OK);
        assert!(report.is_empty());
        assert_eq!(fs::read_to_string(scans.join("a.tif")).unwrap(), "ALPHA");
        assert_eq!(fs::read_to_string(scans.join("b.tif")).unwrap(), "BRAVO");
    }

    #[rstest]
    fn test_failures_are_reported(dir: TempDir) {
        let scans = dir.path().join("scans");
        fs::create_dir(&scans).unwrap();
        let file = scans.join("a.tif");
        fs::write(&file, "alpha").unwrap();
        let config = config(dir.path(), &["sh", "-c", "exit 3", "{{ output }}"]);

        let (code, report) = tamp(&["--config", &config, scans.to_str().unwrap()]);
        assert_eq!(code, EXIT_FAILURES);
        assert!(report.starts_with(&format!("{}: FATAL_ERROR", file.display())), "{report}");
        assert_eq!(report.lines().count(), 1);
        assert_eq!(fs::read_to_string(&file).unwrap(), "alpha");
    }

    #[rstest]
    fn test_missing_directory_aborts(dir: TempDir) {
        let config = config(dir.path(), &["cp", "{{ input }}", "{{ output }}"]);
        let missing = dir.path().join("missing");
        let (code, report) = tamp(&["--config", &config, missing.to_str().unwrap()]);
        assert_eq!(code, EXIT_ABORTED);
        assert!(report.is_empty());
    }

    #[rstest]
    #[case::missing_file("absent.toml", None)]
    #[case::no_command("empty.toml", Some("[engine]\nworkers = 2\n"))]
    #[case::bad_template("bad.toml", Some("[transform]\ncommand = [\"cp\", \"{{ input }}\"]\nextensions = [\"tif\"]\n"))]
    fn test_bad_configuration_aborts(dir: TempDir, #[case] name: &str, #[case] contents: Option<&str>) {
        let path = dir.path().join(name);
        if let Some(contents) = contents {
            fs::write(&path, contents).unwrap();
        }
        fs::write(dir.path().join("a.tif"), "alpha").unwrap();
        let (code, _) = tamp(&["--config", path.to_str().unwrap(), dir.path().to_str().unwrap()]);
        assert_eq!(code, EXIT_ABORTED);
        assert_eq!(fs::read_to_string(dir.path().join("a.tif")).unwrap(), "alpha");
    }
}
