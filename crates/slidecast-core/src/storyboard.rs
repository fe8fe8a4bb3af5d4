use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// One storyboard entry as returned by the storyboard collaborator,
/// before index assignment and bound validation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SlideDraft {
    /// Narration text spoken over the slide.
    pub narration: String,
    /// One-line description of what the slide shows.
    #[serde(rename = "visual_spec")]
    pub description: String,
}

/// A single validated slide of a storyboard.
///
/// `index` is authoritative for output ordering; the final artifact always
/// plays slides in index order regardless of render completion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlideSpec {
    pub index: usize,
    pub narration: String,
    pub description: String,
}

impl SlideSpec {
    /// Scene class name the generated program must define, e.g. `Slide2`.
    pub fn scene_class(&self) -> String {
        format!("Slide{}", self.index)
    }
}

/// An ordered, validated storyboard.  Immutable once constructed.
#[derive(Debug, Clone)]
pub struct Storyboard {
    slides: Vec<SlideSpec>,
}

impl Storyboard {
    /// Validate collaborator drafts and assign contiguous indices from 0.
    ///
    /// Rejects an empty storyboard, a storyboard longer than `max_slides`,
    /// and any slide with blank narration or description.
    pub fn from_drafts(
        drafts: Vec<SlideDraft>,
        max_slides: usize,
    ) -> Result<Self, PipelineError> {
        if drafts.is_empty() {
            return Err(PipelineError::Storyboard {
                message: "storyboard contains no slides".to_owned(),
            });
        }
        if drafts.len() > max_slides {
            return Err(PipelineError::Storyboard {
                message: format!(
                    "storyboard has {} slides (maximum {max_slides})",
                    drafts.len()
                ),
            });
        }

        let mut slides = Vec::with_capacity(drafts.len());
        for (index, draft) in drafts.into_iter().enumerate() {
            if draft.narration.trim().is_empty() {
                return Err(PipelineError::Storyboard {
                    message: format!("slide {index} has empty narration"),
                });
            }
            if draft.description.trim().is_empty() {
                return Err(PipelineError::Storyboard {
                    message: format!("slide {index} has empty visual description"),
                });
            }
            slides.push(SlideSpec {
                index,
                narration: draft.narration,
                description: draft.description,
            });
        }

        Ok(Self { slides })
    }

    pub fn slides(&self) -> &[SlideSpec] {
        &self.slides
    }

    pub fn len(&self) -> usize {
        self.slides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slides.is_empty()
    }
}
