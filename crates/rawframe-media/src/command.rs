//! Subprocess plumbing: FFmpeg command builder and a bounded output runner.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// Longest stderr excerpt kept on a process failure.
const STDERR_EXCERPT_LEN: usize = 2048;

/// Builder for FFmpeg commands that stream their output to stdout.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Input file path
    input: PathBuf,
    /// Input arguments (before -i)
    input_args: Vec<String>,
    /// Output arguments (after -i)
    output_args: Vec<String>,
}

impl FfmpegCommand {
    /// Create a command reading `input` and writing to `pipe:1`.
    pub fn to_stdout(input: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            input_args: Vec::new(),
            output_args: Vec::new(),
        }
    }

    /// Add input arguments (before -i).
    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    /// Add output arguments (after -i).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set seek position (before input).
    pub fn seek(self, seconds: f64) -> Self {
        self.input_arg("-ss").input_arg(format!("{:.6}", seconds))
    }

    /// Extract single frame.
    pub fn single_frame(self) -> Self {
        self.output_arg("-frames:v").output_arg("1")
    }

    /// Emit the frame as a binary PPM image.
    pub fn ppm_image(self) -> Self {
        self.output_args(["-f", "image2pipe", "-c:v", "ppm", "-pix_fmt", "rgb24"])
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec![
            "-nostdin".to_string(),
            "-y".to_string(),
            "-v".to_string(),
            "error".to_string(),
        ];

        args.extend(self.input_args.clone());

        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());

        args.extend(self.output_args.clone());

        args.push("pipe:1".to_string());

        args
    }
}

/// Captured output of a finished subprocess.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub stdout: Vec<u8>,
}

/// Run `program` to completion and capture its output.
///
/// The child is killed if `timeout` elapses. A non-zero exit becomes
/// [`MediaError::ProcessFailed`] carrying a stderr excerpt.
pub async fn capture_output<I, S>(
    program: &Path,
    args: I,
    timeout: Duration,
) -> MediaResult<ProcessOutput>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    capture_output_with_env(program, args, &[], timeout).await
}

/// [`capture_output`] with extra environment variables for the child.
pub async fn capture_output_with_env<I, S>(
    program: &Path,
    args: I,
    envs: &[(&str, OsString)],
    timeout: Duration,
) -> MediaResult<ProcessOutput>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let name = program_name(program);
    let mut cmd = Command::new(program);
    cmd.args(args)
        .envs(envs.iter().map(|(k, v)| (k, v)))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!(program = %name, "Spawning decoder process");

    let child = cmd.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            MediaError::BinaryNotFound(name.clone())
        } else {
            MediaError::from(e)
        }
    })?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result?,
        Err(_) => {
            // Dropping the future drops the child, which kills it
            warn!(program = %name, timeout_secs = timeout.as_secs(), "Process timed out, killed");
            return Err(MediaError::Timeout(timeout.as_secs()));
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(MediaError::process_failed(
            name,
            "exited with non-zero status",
            Some(excerpt(&stderr)),
            output.status.code(),
        ));
    }

    Ok(ProcessOutput {
        stdout: output.stdout,
    })
}

/// Resolve a decoder binary by name or path.
pub fn check_binary(program: impl AsRef<OsStr>) -> MediaResult<PathBuf> {
    let program = program.as_ref();
    which::which(program)
        .map_err(|_| MediaError::BinaryNotFound(program.to_string_lossy().to_string()))
}

fn program_name(program: &Path) -> String {
    program
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| program.to_string_lossy().to_string())
}

fn excerpt(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.len() <= STDERR_EXCERPT_LEN {
        return trimmed.to_string();
    }
    let mut start = trimmed.len() - STDERR_EXCERPT_LEN;
    while !trimmed.is_char_boundary(start) {
        start += 1;
    }
    trimmed[start..].to_string()
}
