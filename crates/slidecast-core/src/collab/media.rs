//! Muxing, concatenation and probing via `ffmpeg-sidecar`.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use ffmpeg_sidecar::{command::FfmpegCommand, event::FfmpegEvent};
use tokio::task;
use tracing::{error, info};

use crate::collab::Muxer;
use crate::error::CollabError;

pub struct FfmpegMuxer;

impl FfmpegMuxer {
    pub fn new() -> Self {
        Self {}
    }

    /// Run a prepared ffmpeg command to completion, failing on the first
    /// error event the process reports.
    fn run_to_completion(mut command: FfmpegCommand, label: &str) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();
        command
            .spawn()?
            .iter()?
            .for_each(|event| match event {
                FfmpegEvent::Log(level, msg) => info!("[FFmpeg {:?}] {}", level, msg),
                FfmpegEvent::Error(e) => {
                    error!("FFmpeg error during {label}: {e}");
                    errors.push(e);
                }
                FfmpegEvent::Done => info!("FFmpeg finished {label}"),
                _ => {}
            });

        if let Some(first) = errors.into_iter().next() {
            return Err(anyhow!("ffmpeg {label} failed: {first}"));
        }
        Ok(())
    }

    fn path_str(path: &Path) -> Result<String> {
        path.to_str()
            .map(str::to_owned)
            .ok_or_else(|| anyhow!("non-UTF-8 media path: {}", path.display()))
    }
}

impl Default for FfmpegMuxer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Muxer for FfmpegMuxer {
    async fn mux(&self, video: &Path, audio: &Path, out: &Path) -> Result<(), CollabError> {
        let video = Self::path_str(video).map_err(CollabError::service)?;
        let audio = Self::path_str(audio).map_err(CollabError::service)?;
        let out = Self::path_str(out).map_err(CollabError::service)?;

        task::spawn_blocking(move || -> Result<()> {
            let mut command = FfmpegCommand::new();
            command
                .hide_banner()
                .overwrite()
                .input(&video)
                .input(&audio)
                // Keep the video stream byte-identical; only the narration
                // track is encoded.
                .args(["-c:v", "copy", "-c:a", "aac", "-shortest"])
                .output(&out);
            Self::run_to_completion(command, "mux")
        })
        .await
        .map_err(CollabError::service)?
        .map_err(CollabError::service)
    }

    async fn concat(&self, clips: &[PathBuf], out: &Path) -> Result<(), CollabError> {
        if clips.is_empty() {
            return Err(CollabError::Malformed("no clips to concatenate".to_owned()));
        }

        // The concat demuxer reads a list file of absolute clip paths.
        let list_path = out.with_extension("list.txt");
        let mut list = String::new();
        for clip in clips {
            let clip = Self::path_str(clip).map_err(CollabError::service)?;
            list.push_str(&format!("file '{}'\n", clip.replace('\'', "'\\''")));
        }
        tokio::fs::write(&list_path, list)
            .await
            .map_err(CollabError::service)?;

        let list_str = Self::path_str(&list_path).map_err(CollabError::service)?;
        let out_str = Self::path_str(out).map_err(CollabError::service)?;

        let result = task::spawn_blocking(move || -> Result<()> {
            let mut command = FfmpegCommand::new();
            command
                .hide_banner()
                .overwrite()
                .args(["-f", "concat", "-safe", "0"])
                .input(&list_str)
                .args(["-c", "copy"])
                .output(&out_str);
            Self::run_to_completion(command, "concat")
        })
        .await
        .map_err(CollabError::service)?;

        // The list file is scratch state either way.
        let _ = tokio::fs::remove_file(&list_path).await;

        result.map_err(CollabError::service)
    }

    async fn probe_duration(&self, path: &Path) -> Result<f64, CollabError> {
        let input = Self::path_str(path).map_err(CollabError::service)?;
        let display = input.clone();

        task::spawn_blocking(move || -> Result<f64> {
            let mut duration: Option<f64> = None;
            FfmpegCommand::new()
                .hide_banner()
                .input(&input)
                .args(["-f", "null", "-"])
                .spawn()?
                .iter()?
                .for_each(|event| {
                    if let FfmpegEvent::ParsedDuration(d) = event {
                        duration.get_or_insert(d.duration);
                    }
                });
            duration.ok_or_else(|| anyhow!("could not determine duration of {display}"))
        })
        .await
        .map_err(CollabError::service)?
        .map_err(CollabError::service)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_utf8_free_paths_convert() {
        let s = FfmpegMuxer::path_str(Path::new("/tmp/a.mp4")).expect("utf-8 path");
        assert_eq!(s, "/tmp/a.mp4");
    }
}
