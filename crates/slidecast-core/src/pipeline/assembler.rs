use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use crate::collab::Muxer;
use crate::error::PipelineError;

/// Concatenates the ordered set of successful slide clips into the final
/// artifact with a copy-level join.
///
/// Every clip was rendered at the same quality preset, so the concat never
/// re-encodes; running it twice on the same clip set produces an equivalent
/// artifact.
pub struct Assembler {
    muxer: Arc<dyn Muxer>,
}

impl Assembler {
    pub fn new(muxer: Arc<dyn Muxer>) -> Self {
        Self { muxer }
    }

    /// `clips` must hold every slide exactly once, indices contiguous from
    /// 0, in any order; the artifact is always written in index order.
    pub async fn assemble(
        &self,
        clips: &[(usize, PathBuf)],
        out: &Path,
    ) -> Result<PathBuf, PipelineError> {
        let ordered = validate_clip_set(clips)?;

        for clip in &ordered {
            if tokio::fs::metadata(clip).await.map(|m| m.len()).unwrap_or(0) == 0 {
                return Err(PipelineError::Assembly {
                    message: format!("clip missing or empty: {}", clip.display()),
                });
            }
        }

        if let [only] = ordered.as_slice() {
            // Single-slide request: the clip already is the artifact.
            tokio::fs::copy(only, out)
                .await
                .map_err(|e| PipelineError::Assembly {
                    message: format!("failed to copy single clip: {e}"),
                })?;
        } else {
            self.muxer
                .concat(&ordered, out)
                .await
                .map_err(|e| PipelineError::Assembly {
                    message: e.to_string(),
                })?;
        }

        let duration =
            self.muxer
                .probe_duration(out)
                .await
                .map_err(|e| PipelineError::Assembly {
                    message: format!("artifact unreadable: {e}"),
                })?;
        if duration <= 0.0 {
            return Err(PipelineError::Assembly {
                message: "concatenation produced a zero-duration artifact".to_owned(),
            });
        }

        info!(clips = ordered.len(), duration, artifact = %out.display(), "artifact assembled");
        Ok(out.to_path_buf())
    }
}

/// Check completeness (no gaps, no duplicates, contiguous from 0) and
/// return the clip paths sorted by slide index.
fn validate_clip_set(clips: &[(usize, PathBuf)]) -> Result<Vec<PathBuf>, PipelineError> {
    if clips.is_empty() {
        return Err(PipelineError::Assembly {
            message: "no clips to assemble".to_owned(),
        });
    }

    let mut sorted: Vec<&(usize, PathBuf)> = clips.iter().collect();
    sorted.sort_by_key(|(index, _)| *index);

    for (expected, (index, _)) in sorted.iter().enumerate() {
        if *index != expected {
            return Err(PipelineError::Assembly {
                message: format!(
                    "clip set is not contiguous: expected slide {expected}, found {index}"
                ),
            });
        }
    }

    Ok(sorted.into_iter().map(|(_, path)| path.clone()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip(index: usize) -> (usize, PathBuf) {
        (index, PathBuf::from(format!("clip_{index}.mp4")))
    }

    #[test]
    fn out_of_order_clips_are_sorted_by_index() {
        let ordered =
            validate_clip_set(&[clip(2), clip(0), clip(1)]).expect("valid clip set");
        assert_eq!(
            ordered,
            vec![
                PathBuf::from("clip_0.mp4"),
                PathBuf::from("clip_1.mp4"),
                PathBuf::from("clip_2.mp4"),
            ]
        );
    }

    #[test]
    fn gap_in_indices_is_rejected() {
        let err = validate_clip_set(&[clip(0), clip(2)]).unwrap_err();
        assert!(matches!(err, PipelineError::Assembly { .. }));
    }

    #[test]
    fn duplicate_index_is_rejected() {
        let err = validate_clip_set(&[clip(0), clip(1), clip(1)]).unwrap_err();
        assert!(matches!(err, PipelineError::Assembly { .. }));
    }

    #[test]
    fn empty_clip_set_is_rejected() {
        let err = validate_clip_set(&[]).unwrap_err();
        assert!(matches!(err, PipelineError::Assembly { .. }));
    }

    #[test]
    fn index_not_starting_at_zero_is_rejected() {
        let err = validate_clip_set(&[clip(1), clip(2)]).unwrap_err();
        assert!(matches!(err, PipelineError::Assembly { .. }));
    }
}
