//! Local camera provider
//!
//! Cameras are declared in the config file and stream through ffmpeg. There
//! is no cloud account: doorbell and motion events come from whoever calls
//! [`LocalProvider::dispatch`], and credential rotations never happen.

use async_trait::async_trait;
use porchlight_core::{
    Camera, CameraInfo, CameraProvider, DeviceInfo, DoorbellPress, Error, FfmpegBackend,
    HlsOutputArgs, LiveCall, Location, MonitorConfig, MotionEvent, Result, TokenRotation,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use url::Url;

/// One camera entry in the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraSource {
    pub id: String,
    pub name: String,
    /// rtsp, http or file URL fed to ffmpeg
    pub source: Url,
    #[serde(default = "default_device_type")]
    pub device_type: String,
}

fn default_device_type() -> String {
    "doorbell".to_string()
}

fn default_location_name() -> String {
    "Home".to_string()
}

/// Whole config file: monitor settings plus local cameras
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CliConfig {
    #[serde(flatten)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub cameras: Vec<CameraSource>,
    #[serde(default = "default_location_name")]
    pub location_name: String,
    /// ffmpeg executable, `ffmpeg` on PATH when unset
    #[serde(default)]
    pub ffmpeg: Option<String>,
}

impl CliConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::InvalidConfig(e.to_string()))
    }
}

/// Event read from the command stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalEvent {
    Ring(String),
    Motion { camera: String, is_new: bool },
    Quit,
}

impl LocalEvent {
    /// Parse `ring <id>`, `motion <id> [new|old]` or `quit`
    pub fn parse(line: &str) -> std::result::Result<Option<Self>, String> {
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            return Ok(None);
        };

        let event = match command {
            "ring" => LocalEvent::Ring(camera_arg(words.next())?),
            "motion" => {
                let camera = camera_arg(words.next())?;
                let is_new = match words.next() {
                    None | Some("new") => true,
                    Some("old") => false,
                    Some(other) => return Err(format!("expected new or old, got '{}'", other)),
                };
                LocalEvent::Motion { camera, is_new }
            }
            "quit" | "exit" => LocalEvent::Quit,
            other => return Err(format!("unknown command '{}'", other)),
        };

        Ok(Some(event))
    }
}

fn camera_arg(word: Option<&str>) -> std::result::Result<String, String> {
    word.map(str::to_string).ok_or_else(|| "missing camera id".to_string())
}

pub struct LocalCamera {
    info: CameraInfo,
    backend: FfmpegBackend,
    presses: broadcast::Sender<DoorbellPress>,
    motions: broadcast::Sender<MotionEvent>,
}

impl LocalCamera {
    pub fn new(source: &CameraSource, ffmpeg: Option<&str>) -> Self {
        let mut backend = FfmpegBackend::for_source(&source.source);
        if let Some(program) = ffmpeg {
            backend = backend.with_program(program);
        }

        let (presses, _) = broadcast::channel(16);
        let (motions, _) = broadcast::channel(16);

        Self {
            info: CameraInfo::new(&source.id, &source.name, &source.device_type),
            backend,
            presses,
            motions,
        }
    }

    pub fn ring(&self) -> bool {
        self.presses.send(DoorbellPress::now()).is_ok()
    }

    pub fn motion(&self, is_new: bool) -> bool {
        self.motions.send(MotionEvent::new(is_new)).is_ok()
    }
}

#[async_trait]
impl Camera for LocalCamera {
    fn info(&self) -> &CameraInfo {
        &self.info
    }

    fn doorbell_presses(&self) -> broadcast::Receiver<DoorbellPress> {
        self.presses.subscribe()
    }

    fn motion_events(&self) -> broadcast::Receiver<MotionEvent> {
        self.motions.subscribe()
    }

    async fn stream_video(&self, output: HlsOutputArgs) -> Result<LiveCall> {
        self.backend.start(&output).await
    }
}

struct LocalLocation {
    name: String,
    cameras: Vec<Arc<LocalCamera>>,
    connected: watch::Sender<bool>,
}

#[async_trait]
impl Location for LocalLocation {
    fn id(&self) -> &str {
        "local"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn cameras(&self) -> Vec<Arc<dyn Camera>> {
        self.cameras
            .iter()
            .map(|camera| Arc::clone(camera) as Arc<dyn Camera>)
            .collect()
    }

    async fn devices(&self) -> Result<Vec<DeviceInfo>> {
        Ok(Vec::new())
    }

    fn connection_status(&self) -> watch::Receiver<bool> {
        self.connected.subscribe()
    }
}

/// Provider over the cameras listed in [`CliConfig`]
pub struct LocalProvider {
    location: Arc<LocalLocation>,
    rotations: broadcast::Sender<TokenRotation>,
}

impl LocalProvider {
    pub fn new(config: &CliConfig) -> Self {
        let cameras = config
            .cameras
            .iter()
            .map(|source| Arc::new(LocalCamera::new(source, config.ffmpeg.as_deref())))
            .collect();
        let (connected, _) = watch::channel(true);
        let (rotations, _) = broadcast::channel(4);

        Self {
            location: Arc::new(LocalLocation {
                name: config.location_name.clone(),
                cameras,
                connected,
            }),
            rotations,
        }
    }

    fn camera(&self, id: &str) -> Option<&Arc<LocalCamera>> {
        self.location.cameras.iter().find(|camera| camera.info.id == id)
    }

    /// Feed one event to its camera. Returns false for unknown cameras.
    pub fn dispatch(&self, event: &LocalEvent) -> bool {
        match event {
            LocalEvent::Ring(id) => self.camera(id).map(|camera| camera.ring()).is_some(),
            LocalEvent::Motion { camera, is_new } => self
                .camera(camera)
                .map(|camera| camera.motion(*is_new))
                .is_some(),
            LocalEvent::Quit => true,
        }
    }
}

#[async_trait]
impl CameraProvider for LocalProvider {
    async fn locations(&self) -> Result<Vec<Arc<dyn Location>>> {
        Ok(vec![Arc::clone(&self.location) as Arc<dyn Location>])
    }

    async fn cameras(&self) -> Result<Vec<Arc<dyn Camera>>> {
        Ok(self.location.cameras())
    }

    fn token_rotations(&self) -> broadcast::Receiver<TokenRotation> {
        self.rotations.subscribe()
    }
}
