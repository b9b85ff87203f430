//! Local process runner for the `adb` client.
//!
//! - Per-call timeout with SIGTERM → SIGKILL escalation
//! - Output size cap so a runaway `dumpsys` cannot exhaust memory
//! - Non-blocking pipe reads, so a grandchild holding a pipe open
//!   cannot wedge the caller

use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, trace, warn};

/// Default maximum output size in bytes (4 MiB).
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 4 * 1024 * 1024;

/// Grace period between SIGTERM and SIGKILL in milliseconds.
const SIGTERM_GRACE_MS: u64 = 300;

const CHUNK_SIZE: usize = 8192;

/// Errors that prevent a process from producing a result.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("program not found: {0}")]
    NotFound(String),

    #[error("failed to spawn {program}: {message}")]
    Spawn { program: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Captured result of one process.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: Option<i32>,
    pub truncated: bool,
    pub timed_out: bool,
    pub duration: Duration,
}

impl ProcessOutput {
    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    pub fn success(&self) -> bool {
        self.exit_code == Some(0) && !self.timed_out
    }
}

/// Runs one program with a fixed cap on captured output.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    program: PathBuf,
    max_output_bytes: usize,
}

impl ProcessRunner {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }

    pub fn with_max_output(mut self, max_bytes: usize) -> Self {
        self.max_output_bytes = max_bytes;
        self
    }

    pub fn program(&self) -> &std::path::Path {
        &self.program
    }

    pub fn max_output_bytes(&self) -> usize {
        self.max_output_bytes
    }

    /// Run the program with `args`. `None` waits until the process exits.
    pub fn run(&self, args: &[String], timeout: Option<Duration>) -> Result<ProcessOutput, RunError> {
        let program = self.program.display().to_string();
        debug!(program = %program, ?args, ?timeout, "spawning process");

        let start = Instant::now();
        let mut child = Command::new(&self.program)
            .args(args)
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    RunError::NotFound(program.clone())
                } else {
                    error!(program = %program, error = %e, "failed to spawn");
                    RunError::Spawn {
                        program: program.clone(),
                        message: e.to_string(),
                    }
                }
            })?;

        let mut output = self.capture(&mut child, timeout)?;
        output.duration = start.elapsed();
        trace!(
            exit_code = ?output.exit_code,
            duration_ms = output.duration.as_millis() as u64,
            stdout_bytes = output.stdout.len(),
            truncated = output.truncated,
            timed_out = output.timed_out,
            "process finished"
        );
        Ok(output)
    }

    fn capture(&self, child: &mut Child, timeout: Option<Duration>) -> Result<ProcessOutput, RunError> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let max = self.max_output_bytes;
        let mut out = ProcessOutput {
            stdout: Vec::with_capacity(max.min(65536)),
            stderr: Vec::with_capacity(max.min(4096)),
            ..ProcessOutput::default()
        };

        let mut stdout = child.stdout.take();
        let mut stderr = child.stderr.take();
        let mut chunk = vec![0u8; CHUNK_SIZE];

        loop {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                out.timed_out = true;
                warn!("process timed out, sending SIGTERM");
                kill_with_grace(child);
                break;
            }

            let mut did_read = false;
            if let Some(ref mut pipe) = stdout {
                if let Ok(n) = try_read_nonblocking(pipe, &mut chunk) {
                    did_read |= n > 0;
                    append_capped(&mut out.stdout, &chunk[..n], max, &mut out.truncated);
                }
            }
            if let Some(ref mut pipe) = stderr {
                if let Ok(n) = try_read_nonblocking(pipe, &mut chunk) {
                    did_read |= n > 0;
                    append_capped(&mut out.stderr, &chunk[..n], max, &mut out.truncated);
                }
            }

            match child.try_wait() {
                Ok(Some(status)) => {
                    if let Some(ref mut pipe) = stdout {
                        drain(pipe, &mut out.stdout, max, &mut out.truncated)?;
                    }
                    if let Some(ref mut pipe) = stderr {
                        drain(pipe, &mut out.stderr, max, &mut out.truncated)?;
                    }
                    out.exit_code = status.code();
                    return Ok(out);
                }
                Ok(None) => {
                    if !did_read {
                        thread::sleep(Duration::from_millis(5));
                    }
                }
                Err(e) => {
                    error!(error = %e, "failed to wait for child");
                    return Err(RunError::Io(e));
                }
            }
        }

        out.exit_code = child.wait().ok().and_then(|s| s.code());
        Ok(out)
    }
}

fn append_capped(buf: &mut Vec<u8>, data: &[u8], max: usize, truncated: &mut bool) {
    let space = max.saturating_sub(buf.len());
    if data.len() > space {
        *truncated = true;
    }
    buf.extend_from_slice(&data[..data.len().min(space)]);
}

/// Drain what is immediately available once the child has exited.
fn drain<R: Read + PipeFd>(
    stream: &mut R,
    buf: &mut Vec<u8>,
    max: usize,
    truncated: &mut bool,
) -> std::io::Result<()> {
    let mut chunk = vec![0u8; CHUNK_SIZE];
    while !*truncated {
        match try_read_nonblocking(stream, &mut chunk) {
            Ok(0) => return Ok(()),
            Ok(n) => append_capped(buf, &chunk[..n], max, truncated),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return Ok(()),
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(unix)]
use std::os::unix::io::AsRawFd as PipeFd;

#[cfg(not(unix))]
trait PipeFd {}
#[cfg(not(unix))]
impl<T> PipeFd for T {}

/// Kill a process with SIGTERM, then SIGKILL after the grace period.
#[cfg(unix)]
fn kill_with_grace(child: &mut Child) {
    let pid = child.id() as libc::pid_t;
    // SAFETY: pid belongs to a child we spawned and have not reaped yet.
    unsafe {
        libc::kill(pid, libc::SIGTERM);
    }
    debug!(pid, "sent SIGTERM");

    let grace_end = Instant::now() + Duration::from_millis(SIGTERM_GRACE_MS);
    while Instant::now() < grace_end {
        if let Ok(Some(_)) = child.try_wait() {
            trace!(pid, "process exited after SIGTERM");
            return;
        }
        thread::sleep(Duration::from_millis(10));
    }

    warn!(pid, "process did not exit after SIGTERM, sending SIGKILL");
    // SAFETY: as above.
    unsafe {
        libc::kill(pid, libc::SIGKILL);
    }
    let _ = child.wait();
}

#[cfg(not(unix))]
fn kill_with_grace(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Read without blocking; `Ok(0)` when nothing is available.
#[cfg(unix)]
fn try_read_nonblocking<R: Read + PipeFd>(stream: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let fd = stream.as_raw_fd();

    // SAFETY: fd is a live pipe owned by `stream`.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(std::io::Error::last_os_error());
    }
    let was_nonblocking = (flags & libc::O_NONBLOCK) != 0;
    if !was_nonblocking {
        // SAFETY: as above.
        let result = unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
        if result < 0 {
            return Err(std::io::Error::last_os_error());
        }
    }

    let result = stream.read(buf);

    if !was_nonblocking {
        // SAFETY: as above.
        unsafe {
            libc::fcntl(fd, libc::F_SETFL, flags);
        }
    }

    match result {
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(0),
        other => other,
    }
}

#[cfg(not(unix))]
fn try_read_nonblocking<R: Read>(stream: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    stream.read(buf)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    #[test]
    fn test_captures_stdout_and_exit() {
        let out = ProcessRunner::new("sh")
            .run(&sh("echo hello; exit 0"), Some(Duration::from_secs(5)))
            .unwrap();
        assert!(out.success());
        assert_eq!(String::from_utf8_lossy(&out.stdout), "hello\n");
    }

    #[test]
    fn test_nonzero_exit_and_stderr() {
        let out = ProcessRunner::new("sh")
            .run(&sh("echo boom >&2; exit 3"), None)
            .unwrap();
        assert_eq!(out.exit_code, Some(3));
        assert!(!out.success());
        assert!(out.stderr_str().contains("boom"));
    }

    #[test]
    fn test_timeout_kills_process() {
        let out = ProcessRunner::new("sleep")
            .run(&["10".to_string()], Some(Duration::from_millis(100)))
            .unwrap();
        assert!(out.timed_out);
        assert!(!out.success());
        assert!(out.duration < Duration::from_secs(3));
    }

    #[test]
    fn test_output_cap() {
        let out = ProcessRunner::new("sh")
            .with_max_output(100)
            .run(&sh("yes | head -n 1000"), Some(Duration::from_secs(5)))
            .unwrap();
        assert!(out.truncated);
        assert_eq!(out.stdout.len(), 100);
    }

    #[test]
    fn test_missing_program() {
        let err = ProcessRunner::new("/nonexistent/adb-binary")
            .run(&[], None)
            .unwrap_err();
        assert!(matches!(err, RunError::NotFound(_)));
    }
}
