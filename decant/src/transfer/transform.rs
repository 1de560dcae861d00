//! External transform process handling.
//!
//! Transforms run as a separate `ffmpeg` process wired entirely through
//! pipes: inputs arrive on descriptors 3 and up, the produced payload leaves
//! on stdout, and diagnostics leave on stderr. Nothing touches the
//! filesystem.

use std::path::PathBuf;
use std::process::Stdio;

use command_fds::{CommandFdExt, FdMapping};
use tokio::net::unix::pipe;
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::error::{Error, Result};

/// First child descriptor used for transform inputs; 0 through 2 stay stdio.
const FIRST_INPUT_FD: i32 = 3;

/// Location of the transform binary.
#[derive(Debug, Clone)]
pub struct TransformConfig {
    pub binary: PathBuf,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("ffmpeg"),
        }
    }
}

impl TransformConfig {
    /// Load transform config from environment variables, falling back to
    /// `ffmpeg` on PATH.
    ///
    /// Supported env vars:
    /// - `FFMPEG_PATH` (e.g. "/usr/local/bin/ffmpeg")
    pub fn from_env_or_default() -> Self {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("FFMPEG_PATH")
            && !path.trim().is_empty()
        {
            config.binary = PathBuf::from(path);
        }

        config
    }
}

/// Arguments for muxing a video input (descriptor 3) with an audio input
/// (descriptor 4) into MP4 on stdout. The video stream is copied; audio is
/// re-encoded to AAC. `frag_keyframe+empty_moov` keeps the output writable
/// to an unseekable pipe.
pub fn mux_args() -> Vec<String> {
    [
        "-loglevel",
        "info",
        "-hide_banner",
        "-thread_queue_size",
        "4096",
        "-i",
        "pipe:3",
        "-thread_queue_size",
        "4096",
        "-i",
        "pipe:4",
        "-map",
        "0:v",
        "-map",
        "1:a",
        "-c:v",
        "copy",
        "-c:a",
        "aac",
        "-movflags",
        "frag_keyframe+empty_moov",
        "-f",
        "mp4",
        "pipe:1",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

/// Arguments for stripping video from the input on descriptor 3 and
/// re-encoding its audio to MP3 on stdout.
pub fn audio_transcode_args() -> Vec<String> {
    [
        "-loglevel",
        "info",
        "-hide_banner",
        "-thread_queue_size",
        "512",
        "-i",
        "pipe:3",
        "-vn",
        "-acodec",
        "libmp3lame",
        "-f",
        "mp3",
        "pipe:1",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

/// A spawned transform with its input pipe writers still attached.
pub struct TransformProcess {
    pub child: Child,
    /// Write ends of the input pipes, in descriptor order starting at 3.
    /// Dropping one closes the matching input.
    pub inputs: Vec<pipe::Sender>,
    pub stdout: ChildStdout,
    pub stderr: ChildStderr,
}

impl TransformProcess {
    /// Spawn the transform with `input_count` extra input pipes mapped to
    /// child descriptors 3, 4, and so on.
    ///
    /// # Errors
    /// `Error::TransformSpawn` when pipe allocation, descriptor mapping, or
    /// the spawn itself fails. No partial process is left behind.
    pub fn spawn(
        config: &TransformConfig,
        args: &[String],
        input_count: usize,
    ) -> Result<TransformProcess> {
        let mut command = Command::new(&config.binary);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut inputs = Vec::with_capacity(input_count);
        let mut mappings = Vec::with_capacity(input_count);
        for slot in 0..input_count {
            let (writer, reader) = pipe::pipe()
                .map_err(|e| Error::transform_spawn(format!("pipe allocation failed: {e}")))?;
            // The child inherits a plain blocking descriptor; the write end
            // stays async on our side.
            let reader_fd = reader
                .into_blocking_fd()
                .map_err(|e| Error::transform_spawn(format!("pipe descriptor setup failed: {e}")))?;
            mappings.push(FdMapping {
                parent_fd: reader_fd,
                child_fd: FIRST_INPUT_FD + slot as i32,
            });
            inputs.push(writer);
        }
        command
            .fd_mappings(mappings)
            .map_err(|e| Error::transform_spawn(format!("descriptor mapping failed: {e}")))?;

        let mut child = command.spawn().map_err(|e| {
            Error::transform_spawn(format!("failed to spawn {}: {e}", config.binary.display()))
        })?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::transform_spawn("transform stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::transform_spawn("transform stderr not captured"))?;

        Ok(TransformProcess {
            child,
            inputs,
            stdout,
            stderr,
        })
    }
}

/// Spawn a task that waits for the transform to exit and sends the result
/// through a oneshot channel.
///
/// If the cancellation token fires first, the process is killed and `None`
/// is sent. A normal exit sends `Some(code)`; an exit by signal sends `None`
/// as well.
pub fn spawn_transform_waiter(
    mut child: Child,
    cancellation_token: CancellationToken,
) -> oneshot::Receiver<Option<i32>> {
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let exit_code = tokio::select! {
            _ = cancellation_token.cancelled() => {
                let _ = child.kill().await;
                None
            }
            status = child.wait() => {
                match status {
                    Ok(exit_status) => {
                        let code = exit_status.code();
                        if let Some(c) = code
                            && c != 0
                        {
                            warn!("Transform exited with code: {}", c);
                        }
                        code
                    }
                    Err(e) => {
                        error!("Error waiting for transform: {}", e);
                        Some(-1)
                    }
                }
            }
        };
        let _ = tx.send(exit_code);
    });

    rx
}
