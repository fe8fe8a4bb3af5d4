pub mod collab;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod service;
pub mod store;
pub mod storyboard;

pub use config::{PipelineConfig, QualityPreset};
pub use error::{CollabError, PipelineError};
pub use pipeline::orchestrator::Collaborators;
pub use service::{ArtifactError, VideoService};
pub use store::{JobState, JobStatusView, JobStore, RequestId, SlideFailure, SlideStatus};
pub use storyboard::{SlideDraft, SlideSpec, Storyboard};
