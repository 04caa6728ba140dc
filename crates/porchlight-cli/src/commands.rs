//! CLI command implementations

use crate::local::{CliConfig, LocalEvent, LocalProvider};
use crate::output::{format_output, JsonLinesSink};
use anyhow::Context;
use porchlight_core::{config::credential_path, CredentialStore, Monitor, SessionSettings};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

/// Flags that override the config file
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub motion: Option<bool>,
    pub minutes: Option<f64>,
}

/// Read, override and validate the config file
pub fn load_config(path: &Path, overrides: &Overrides) -> anyhow::Result<CliConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let mut config = CliConfig::from_json(&text)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;

    if let Some(motion) = overrides.motion {
        config.monitor.ring_stream_motion = motion;
    }
    if let Some(minutes) = overrides.minutes {
        config.monitor.ring_minutes_to_stream_video = minutes;
    }

    config.monitor.validate()?;
    Ok(config)
}

/// Monitor the configured cameras until `quit` or Ctrl-C
pub async fn run(config_path: &Path, base_dir: PathBuf, overrides: &Overrides) -> anyhow::Result<()> {
    let config = load_config(config_path, overrides)?;
    porchlight_core::init();
    info!("Starting module: porchlight");

    let credentials = CredentialStore::spawn(credential_path(&base_dir));
    // Local cameras sign in to nothing; the file is kept for account providers
    let _credential = credentials
        .bootstrap(config.monitor.credential().unwrap_or_default())
        .await
        .with_context(|| format!("Failed to prepare credential file {}", credentials.path().display()))?;

    let settings = SessionSettings::from_config(&base_dir, &config.monitor);
    info!(
        output_dir = %settings.output_dir.display(),
        max_duration_s = settings.max_duration.as_secs_f64(),
        motion = config.monitor.ring_stream_motion,
        "Session settings"
    );

    let provider = Arc::new(LocalProvider::new(&config));
    let mut monitor = Monitor::begin(
        &config.monitor,
        settings,
        credentials,
        provider.clone(),
        Arc::new(JsonLinesSink::stdout()),
    )
    .await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);

    loop {
        tokio::select! {
            _ = &mut interrupt => {
                info!("Interrupted");
                break;
            }
            line = lines.next_line(), if stdin_open => {
                let Some(line) = line.context("Failed to read commands from stdin")? else {
                    // Keep monitoring without a command stream
                    stdin_open = false;
                    continue;
                };

                match LocalEvent::parse(&line) {
                    Ok(Some(LocalEvent::Quit)) => break,
                    Ok(Some(event)) => {
                        if !provider.dispatch(&event) {
                            warn!(?event, "Unknown camera");
                        }
                    }
                    Ok(None) => {}
                    Err(e) => warn!(line = %line, "Ignoring command: {}", e),
                }
            }
        }
    }

    info!("Stopping module: porchlight");
    monitor.shutdown().await;
    Ok(())
}

/// Validate the config and print the effective settings
pub fn check(config_path: &Path, base_dir: &Path, overrides: &Overrides) -> anyhow::Result<()> {
    let config = load_config(config_path, overrides)?;
    let settings = SessionSettings::from_config(base_dir, &config.monitor);

    let cameras: Vec<_> = config
        .cameras
        .iter()
        .map(|camera| {
            serde_json::json!({
                "id": camera.id,
                "name": camera.name,
                "deviceType": camera.device_type,
                "source": camera.source.as_str(),
            })
        })
        .collect();

    let summary = serde_json::json!({
        "location": config.location_name,
        "cameras": cameras,
        "streamMotion": config.monitor.ring_stream_motion,
        "videoWidth": config.monitor.ring_video_width,
        "maxDurationSeconds": settings.max_duration.as_secs_f64(),
        "outputDir": settings.output_dir.display().to_string(),
        "manifest": settings.manifest_path().display().to_string(),
        "credentialFile": credential_path(base_dir).display().to_string(),
    });

    println!("{}", format_output(&summary)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("config.json");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_overrides_apply_before_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), r#"{"ring2faRefreshToken": "abc", "ringMinutesToStreamVideo": 9}"#);

        assert!(load_config(&path, &Overrides::default()).is_err());

        let overrides = Overrides {
            motion: Some(true),
            minutes: Some(2.0),
        };
        let config = load_config(&path, &overrides).unwrap();
        assert!(config.monitor.ring_stream_motion);
        assert_eq!(config.monitor.ring_minutes_to_stream_video, 2.0);
    }

    #[test]
    fn test_legacy_login_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), r#"{"ringEmail": "me@example.com", "ringPwd": "hunter2"}"#);

        let err = load_config(&path, &Overrides::default()).unwrap_err();
        assert!(err.to_string().contains("ring2faRefreshToken"));
    }

    #[test]
    fn test_missing_file_has_context() {
        let err = load_config(Path::new("/nonexistent/porchlight.json"), &Overrides::default()).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
