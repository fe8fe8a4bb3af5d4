use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::collab::{Muxer, SceneProgram, SceneRenderer, SpeechSynthesizer, Transcriber};
use crate::config::PipelineConfig;
use crate::error::PipelineError;

/// Executes one full render attempt for a validated candidate program:
/// synthesize narration, extract timing cues, render the silent clip, mux
/// the narration in.  Any step failing fails the whole attempt; no partial
/// output is returned.
pub struct AttemptRunner {
    speech: Arc<dyn SpeechSynthesizer>,
    transcriber: Arc<dyn Transcriber>,
    renderer: Arc<dyn SceneRenderer>,
    muxer: Arc<dyn Muxer>,
    config: Arc<PipelineConfig>,
}

impl AttemptRunner {
    pub fn new(
        speech: Arc<dyn SpeechSynthesizer>,
        transcriber: Arc<dyn Transcriber>,
        renderer: Arc<dyn SceneRenderer>,
        muxer: Arc<dyn Muxer>,
        config: Arc<PipelineConfig>,
    ) -> Self {
        Self {
            speech,
            transcriber,
            renderer,
            muxer,
            config,
        }
    }

    /// Run the attempt inside `attempt_dir` (exclusive to this attempt) and
    /// return the narrated clip path.
    pub async fn run(
        &self,
        program: &SceneProgram,
        narration: &str,
        attempt_dir: &Path,
    ) -> Result<PathBuf, PipelineError> {
        let slide = program.slide_index;

        tokio::fs::create_dir_all(attempt_dir)
            .await
            .map_err(|e| PipelineError::Execution {
                slide,
                message: format!("workspace setup failed: {e}"),
            })?;

        // 1. Narration audio.
        let audio_path = attempt_dir.join("narration.mp3");
        tokio::time::timeout(
            self.config.synthesis_timeout,
            self.speech.synthesize(narration, &audio_path),
        )
        .await
        .map_err(|_| PipelineError::Synthesis {
            slide,
            message: format!(
                "speech synthesis timed out after {}s",
                self.config.synthesis_timeout.as_secs()
            ),
        })?
        .map_err(|e| PipelineError::Synthesis {
            slide,
            message: e.to_string(),
        })?;

        // 2. Timing cues from the narration.
        let cues = tokio::time::timeout(
            self.config.transcription_timeout,
            self.transcriber.align(&audio_path),
        )
        .await
        .map_err(|_| PipelineError::Transcription {
            slide,
            message: format!(
                "transcription timed out after {}s",
                self.config.transcription_timeout.as_secs()
            ),
        })?
        .map_err(|e| PipelineError::Transcription {
            slide,
            message: e.to_string(),
        })?;

        debug!(slide, cues = cues.len(), "narration aligned");

        // 3. Silent clip.  The renderer owns its own timeout so that an
        // overrunning process is killed, not abandoned.
        let silent_clip = self
            .renderer
            .render(
                program,
                &cues,
                self.config.quality,
                attempt_dir,
                self.config.render_timeout,
            )
            .await
            .map_err(|e| PipelineError::Execution {
                slide,
                message: e.to_string(),
            })?;

        // 4. Mux narration into the clip.
        let narrated_clip = attempt_dir.join("clip.mp4");
        self.muxer
            .mux(&silent_clip, &audio_path, &narrated_clip)
            .await
            .map_err(|e| PipelineError::Execution {
                slide,
                message: format!("mux failed: {e}"),
            })?;

        Ok(narrated_clip)
    }
}
