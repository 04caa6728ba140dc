//! FFmpeg streaming backend
//!
//! Runs `ffmpeg -i <source> <live HLS args> <manifest>` as a child process.
//! Stopping first asks ffmpeg to quit through stdin so it can finalize the
//! playlist, then kills it if it is still running after a grace period.

use crate::encoding::HlsOutputArgs;
use crate::provider::{CallControl, LiveCall};
use crate::{Error, Result};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

/// Spawns one ffmpeg process per call
#[derive(Debug, Clone)]
pub struct FfmpegBackend {
    program: PathBuf,
    input_args: Vec<String>,
    stop_grace: Duration,
}

impl FfmpegBackend {
    /// Backend with explicit input arguments (everything before the output args)
    pub fn new(input_args: Vec<String>) -> Self {
        Self {
            program: PathBuf::from("ffmpeg"),
            input_args,
            stop_grace: Duration::from_secs(5),
        }
    }

    /// Backend reading from `source` (rtsp, http or file URL)
    pub fn for_source(source: &Url) -> Self {
        let mut input_args = vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "warning".to_string(),
        ];

        if source.scheme() == "rtsp" {
            input_args.push("-rtsp_transport".to_string());
            input_args.push("tcp".to_string());
        }

        let input = match source.to_file_path() {
            Ok(path) if source.scheme() == "file" => path.to_string_lossy().into_owned(),
            _ => source.to_string(),
        };
        input_args.push("-i".to_string());
        input_args.push(input);

        Self::new(input_args)
    }

    /// Use a different executable
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// How long a stop waits for a clean exit before killing
    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    /// Full argument list for `output`
    pub fn args(&self, output: &HlsOutputArgs) -> Vec<String> {
        let mut args = self.input_args.clone();
        args.extend(output.to_args());
        args
    }

    /// Spawn the process and return its call handle
    pub async fn start(&self, output: &HlsOutputArgs) -> Result<LiveCall> {
        let program = self.program.to_string_lossy().into_owned();

        let mut child = Command::new(&self.program)
            .args(self.args(output))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| Error::Spawn {
                program: program.clone(),
                source,
            })?;

        info!(program = %program, pid = ?child.id(), output = %output.output().display(), "Streaming backend started");

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "porchlight::ffmpeg", "{}", line);
                }
            });
        }

        let stop = CancellationToken::new();
        let (ended_tx, ended_rx) = oneshot::channel();
        let grace = self.stop_grace;
        let token = stop.clone();

        tokio::spawn(async move {
            let mut stdin = child.stdin.take();

            let exited = tokio::select! {
                status = child.wait() => Some(status),
                _ = token.cancelled() => None,
            };

            let status = match exited {
                Some(status) => status,
                None => {
                    if let Some(mut pipe) = stdin.take() {
                        let _ = pipe.write_all(b"q").await;
                        let _ = pipe.flush().await;
                    }
                    match tokio::time::timeout(grace, child.wait()).await {
                        Ok(status) => status,
                        Err(_) => {
                            warn!(program = %program, "Backend ignored quit request, killing");
                            if let Err(e) = child.kill().await {
                                warn!(error = %e, "Failed to kill backend");
                            }
                            child.wait().await
                        }
                    }
                }
            };

            match status {
                Ok(status) => info!(program = %program, %status, "Streaming backend exited"),
                Err(e) => warn!(program = %program, error = %e, "Lost track of streaming backend"),
            }
            let _ = ended_tx.send(());
        });

        Ok(LiveCall::new(Arc::new(FfmpegStop { token: stop }), ended_rx))
    }
}

struct FfmpegStop {
    token: CancellationToken,
}

impl CallControl for FfmpegStop {
    fn stop(&self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rtsp_source_args() {
        let url = Url::parse("rtsp://192.168.1.20:554/live").unwrap();
        let backend = FfmpegBackend::for_source(&url);
        let args = backend.args(&HlsOutputArgs::live("/tmp/public/stream.m3u8"));

        let input = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[input + 1], "rtsp://192.168.1.20:554/live");
        assert!(args.contains(&"tcp".to_string()));
        assert_eq!(args.last().unwrap(), "/tmp/public/stream.m3u8");
    }

    #[test]
    fn test_file_source_uses_path() {
        let url = Url::parse("file:///var/video/porch.mp4").unwrap();
        let args = FfmpegBackend::for_source(&url).args(&HlsOutputArgs::live("out.m3u8"));
        assert!(args.contains(&"/var/video/porch.mp4".to_string()));
        assert!(!args.contains(&"-rtsp_transport".to_string()));
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let backend = FfmpegBackend::new(vec![]).with_program("/nonexistent/ffmpeg-porchlight");
        let err = backend.start(&HlsOutputArgs::live("out.m3u8")).await.unwrap_err();
        assert_eq!(err.error_code(), "SPAWN");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stop_ends_call() {
        let backend = FfmpegBackend::new(vec!["-c".into(), "sleep 30".into()])
            .with_program("sh")
            .with_stop_grace(Duration::from_millis(100));

        let call = backend.start(&HlsOutputArgs::live("out.m3u8")).await.unwrap();
        call.stop();
        call.stop();

        let (_, ended) = call.into_parts();
        let result = tokio::time::timeout(Duration::from_secs(5), ended).await;
        assert!(result.is_ok());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_natural_exit_ends_call() {
        let backend = FfmpegBackend::new(vec!["-c".into(), "exit 0".into()]).with_program("sh");

        let call = backend.start(&HlsOutputArgs::live("out.m3u8")).await.unwrap();
        let (_, ended) = call.into_parts();
        let result = tokio::time::timeout(Duration::from_secs(5), ended).await;
        assert!(result.is_ok());
    }
}
