//! Running the external program with captured output and an optional timeout.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use wait_timeout::ChildExt;

/// Everything the program wrote to stdout and stderr.
#[derive(Debug, Default)]
pub struct Captured {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl Captured {
    /// Both streams as lossy UTF-8, trimmed, for logging.
    pub fn lossy(&self) -> (String, String) {
        (
            String::from_utf8_lossy(&self.stdout).trim().to_string(),
            String::from_utf8_lossy(&self.stderr).trim().to_string(),
        )
    }
}

#[derive(Debug)]
pub enum Outcome {
    /// The program ran to completion (successfully or not).
    Exited { status: ExitStatus, output: Captured },
    /// The program exceeded its time limit and was killed.
    TimedOut { output: Captured },
}

impl Outcome {
    pub fn success(&self) -> bool {
        matches!(self, Self::Exited { status, .. } if status.success())
    }

    pub fn output(&self) -> &Captured {
        match self {
            Self::Exited { output, .. } | Self::TimedOut { output } => output,
        }
    }
}

/// Runs `command` to completion, capturing its output.
///
/// Stdin is closed. Both output pipes are drained on helper threads while
/// waiting, so a chatty program cannot deadlock on a full pipe. With a
/// `timeout`, a program still running when it expires is killed and reaped.
///
/// # Errors
/// [`ErrorKind::Spawn`] if the program could not be started, [`ErrorKind::Io`]
/// if waiting for it failed.
pub fn run(mut command: Command, timeout: Option<Duration>) -> Result<Outcome> {
    let program = command.get_program().to_string_lossy().into_owned();
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        // Own process group: a terminal interrupt aimed at us does not reach
        // the program, and a timeout can take down everything it started.
        command.process_group(0);
    }
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .or_raise(|| ErrorKind::Spawn(program.clone()))?;
    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let waited = wait(&mut child, timeout);
    if !matches!(waited, Ok(Some(_))) {
        // Timed out, or we lost track of it: make sure it is gone before
        // joining the readers, which only finish once the pipes close.
        kill(&mut child);
    }
    let output = Captured { stdout: collect(stdout), stderr: collect(stderr) };
    match waited.or_raise(|| ErrorKind::Io)? {
        Some(status) => Ok(Outcome::Exited { status, output }),
        None => {
            tracing::debug!(%program, ?timeout, "Program timed out and was killed");
            Ok(Outcome::TimedOut { output })
        },
    }
}

/// Kills the child together with any process it started, then reaps it.
#[cfg(unix)]
fn kill(child: &mut Child) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    // The child leads its own group, and it is not reaped yet, so the group id
    // cannot have been reused.
    #[allow(clippy::cast_possible_wrap)]
    let group = Pid::from_raw(child.id() as i32);
    if let Err(e) = killpg(group, Signal::SIGKILL) {
        tracing::debug!(error = %e, "Could not kill process group; killing the program only");
        _ = child.kill();
    }
    _ = child.wait();
}

#[cfg(not(unix))]
fn kill(child: &mut Child) {
    _ = child.kill();
    _ = child.wait();
}

fn wait(child: &mut Child, timeout: Option<Duration>) -> std::io::Result<Option<ExitStatus>> {
    match timeout {
        Some(limit) => child.wait_timeout(limit),
        None => child.wait().map(Some),
    }
}

fn drain(mut pipe: impl Read + Send + 'static) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        // A read error just truncates what we log.
        _ = pipe.read_to_end(&mut buffer);
        buffer
    })
}

fn collect(reader: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    reader.and_then(|r| r.join().ok()).unwrap_or_default()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Instant;

    fn sh(script: &str) -> Command {
        let mut command = Command::new("sh");
        command.args(["-c", script]);
        command
    }

    #[test]
    fn test_success_captures_output() {
        let outcome = run(sh("echo out; echo err >&2"), None).unwrap();
        assert!(outcome.success());
        let (stdout, stderr) = outcome.output().lossy();
        assert_eq!(stdout, "out");
        assert_eq!(stderr, "err");
    }

    #[test]
    fn test_failure_exit_code() {
        let outcome = run(sh("echo broken >&2; exit 3"), None).unwrap();
        assert!(!outcome.success());
        let Outcome::Exited { status, output } = outcome else { panic!("expected exit") };
        assert_eq!(status.code(), Some(3));
        assert_eq!(String::from_utf8_lossy(&output.stderr).trim(), "broken");
    }

    #[test]
    fn test_spawn_failure() {
        let err = run(Command::new("/definitely/not/a/program"), None).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Spawn(p) if p == "/definitely/not/a/program"));
    }

    #[test]
    fn test_timeout_kills() {
        let started = Instant::now();
        let mut command = Command::new("sleep");
        command.arg("30");
        let outcome = run(command, Some(Duration::from_millis(200))).unwrap();
        assert!(matches!(outcome, Outcome::TimedOut { .. }));
        assert!(!outcome.success());
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_timeout_kills_started_processes() {
        let started = Instant::now();
        // The shell forks `sleep`, which holds on to both output pipes.
        let outcome = run(sh("echo started; sleep 30; true"), Some(Duration::from_millis(200))).unwrap();
        assert!(matches!(outcome, Outcome::TimedOut { .. }));
        assert_eq!(outcome.output().lossy().0, "started");
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_program_leads_its_own_process_group() {
        let outcome = run(sh("cat /proc/$$/stat"), None).unwrap();
        let (stat, _) = outcome.output().lossy();
        let pid = stat.split_whitespace().next().unwrap().to_string();
        // After "pid (comm)": state, ppid, pgrp.
        let pgrp = stat.rsplit(')').next().unwrap().split_whitespace().nth(2).unwrap().to_string();
        assert_eq!(pgrp, pid);
        assert_ne!(pgrp, nix::unistd::getpgrp().to_string());
    }

    #[test]
    fn test_timeout_not_reached() {
        let outcome = run(sh("exit 0"), Some(Duration::from_secs(30))).unwrap();
        assert!(outcome.success());
    }
}
