//! Encoding arguments for the live HLS output
//!
//! The backend always encodes with the same low-latency profile; only the
//! output path changes between sessions.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// FFmpeg output arguments for a rolling live HLS window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HlsOutputArgs {
    /// x264 speed preset
    pub preset: String,
    /// Group-of-pictures length in frames
    pub gop_frames: u32,
    /// Scene-change threshold (0 disables extra keyframes)
    pub scene_change_threshold: u32,
    /// Target segment length in seconds
    pub segment_seconds: u32,
    /// Segments kept in the playlist
    pub list_size: u32,
    /// Remove segments that fall out of the playlist
    pub delete_segments: bool,
    /// Manifest path
    pub output: PathBuf,
}

impl HlsOutputArgs {
    /// Low-latency live profile writing to `output`
    pub fn live(output: impl Into<PathBuf>) -> Self {
        Self {
            preset: "veryfast".to_string(),
            gop_frames: 25,
            scene_change_threshold: 0,
            segment_seconds: 2,
            list_size: 6,
            delete_segments: true,
            output: output.into(),
        }
    }

    /// Manifest path
    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Render as an ffmpeg argument list, output path last
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "-preset".to_string(),
            self.preset.clone(),
            "-g".to_string(),
            self.gop_frames.to_string(),
            "-sc_threshold".to_string(),
            self.scene_change_threshold.to_string(),
            "-f".to_string(),
            "hls".to_string(),
            "-hls_time".to_string(),
            self.segment_seconds.to_string(),
            "-hls_list_size".to_string(),
            self.list_size.to_string(),
        ];

        if self.delete_segments {
            args.push("-hls_flags".to_string());
            args.push("delete_segments".to_string());
        }

        args.push(self.output.to_string_lossy().into_owned());
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_live_profile_args() {
        let args = HlsOutputArgs::live("/srv/public/stream.m3u8").to_args();
        assert_eq!(
            args,
            vec![
                "-preset", "veryfast", "-g", "25", "-sc_threshold", "0", "-f", "hls",
                "-hls_time", "2", "-hls_list_size", "6", "-hls_flags", "delete_segments",
                "/srv/public/stream.m3u8",
            ]
        );
    }

    #[test]
    fn test_keep_segments() {
        let mut output = HlsOutputArgs::live("out.m3u8");
        output.delete_segments = false;
        let args = output.to_args();
        assert!(!args.iter().any(|a| a == "delete_segments"));
        assert_eq!(args.last().map(String::as_str), Some("out.m3u8"));
    }
}
