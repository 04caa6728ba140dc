//! Live playlist inspection

use crate::{Error, Result};
use serde::Serialize;
use std::path::Path;

/// What the backend has written so far
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaylistSummary {
    pub target_duration: f64,
    pub media_sequence: u64,
    pub segments: usize,
    /// Seconds of media currently listed
    pub window_seconds: f64,
    pub ended: bool,
}

/// Parse a media playlist from bytes
pub fn summarize(bytes: &[u8]) -> Result<PlaylistSummary> {
    let playlist = m3u8_rs::parse_media_playlist_res(bytes)
        .map_err(|e| Error::PlaylistParse(format!("{:?}", e)))?;

    Ok(PlaylistSummary {
        target_duration: playlist.target_duration as f64,
        media_sequence: playlist.media_sequence,
        segments: playlist.segments.len(),
        window_seconds: playlist.segments.iter().map(|s| s.duration as f64).sum(),
        ended: playlist.end_list,
    })
}

/// Read and parse the playlist at `path`
pub async fn inspect(path: &Path) -> Result<PlaylistSummary> {
    let bytes = tokio::fs::read(path).await?;
    summarize(&bytes)
}
