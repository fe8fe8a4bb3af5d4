//! Animation rendering by spawning the `manim` CLI.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::collab::{SceneProgram, SceneRenderer, TimedSegment};
use crate::config::QualityPreset;
use crate::error::CollabError;

/// Renders scene programs with a `manim` subprocess at a fixed quality
/// preset.  The generated program may read `cues.json` next to itself to
/// pace animations to the narration.
pub struct ManimRenderer {
    binary: String,
}

impl ManimRenderer {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Path where manim places the rendered clip for the given scene.
    fn clip_path(work_dir: &Path, scene_class: &str, preset: QualityPreset) -> PathBuf {
        work_dir
            .join("media")
            .join("videos")
            .join("scene")
            .join(preset.dir_tag())
            .join(format!("{scene_class}.mp4"))
    }
}

#[async_trait]
impl SceneRenderer for ManimRenderer {
    async fn render(
        &self,
        program: &SceneProgram,
        cues: &[TimedSegment],
        preset: QualityPreset,
        work_dir: &Path,
        timeout: Duration,
    ) -> Result<PathBuf, CollabError> {
        tokio::fs::create_dir_all(work_dir)
            .await
            .map_err(CollabError::service)?;

        let script_path = work_dir.join("scene.py");
        tokio::fs::write(&script_path, &program.source)
            .await
            .map_err(CollabError::service)?;

        let cues_json = serde_json::to_vec_pretty(cues).map_err(CollabError::service)?;
        tokio::fs::write(work_dir.join("cues.json"), cues_json)
            .await
            .map_err(CollabError::service)?;

        let mut command = Command::new(&self.binary);
        command
            .arg("-ql")
            .arg("--fps")
            .arg(preset.frame_rate.to_string())
            .arg("-r")
            .arg(format!("{},{}", preset.width, preset.height))
            .arg("--media_dir")
            .arg(work_dir.join("media"))
            .arg(&script_path)
            .arg(&program.scene_class)
            .current_dir(work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(
            scene = %program.scene_class,
            dir = %work_dir.display(),
            "spawning renderer"
        );

        let child = command.spawn().map_err(|e| {
            CollabError::Service(anyhow!("failed to spawn renderer '{}': {e}", self.binary))
        })?;

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(CollabError::service)?,
            Err(_) => {
                // The child is killed on drop; do not leave the render running.
                warn!(scene = %program.scene_class, ?timeout, "render timed out, killing");
                return Err(CollabError::Malformed(format!(
                    "render exceeded {}s timeout",
                    timeout.as_secs()
                )));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: String = stderr
                .lines()
                .rev()
                .take(12)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect::<Vec<_>>()
                .join("\n");
            return Err(CollabError::Malformed(format!(
                "renderer exited with {}: {tail}",
                output.status
            )));
        }

        let clip = Self::clip_path(work_dir, &program.scene_class, preset);
        match tokio::fs::metadata(&clip).await {
            Ok(meta) if meta.len() > 0 => Ok(clip),
            Ok(_) => Err(CollabError::Malformed(format!(
                "renderer produced an empty clip: {}",
                clip.display()
            ))),
            Err(e) => Err(CollabError::Service(anyhow!(
                "renderer reported success but clip is missing at {}: {e}",
                clip.display()
            ))),
        }
    }
}
