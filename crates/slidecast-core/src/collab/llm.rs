//! LLM-backed storyboard and scene-code generation via the `genai` client.

use async_trait::async_trait;
use genai::chat::{ChatMessage, ChatRequest};
use genai::Client;
use tracing::debug;

use crate::collab::{SceneCodeGenerator, StoryboardGenerator};
use crate::error::CollabError;
use crate::storyboard::{SlideDraft, SlideSpec};

/// Extract the contents of the first fenced code block, if any.
///
/// Model output frequently wraps payloads in ``` fences (optionally tagged
/// with a language).  Returns the inner text, or the whole input trimmed
/// when no fence is present.
pub(crate) fn strip_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(open) = trimmed.find("```") else {
        return trimmed;
    };
    let after_open = &trimmed[open + 3..];
    // Skip the optional language tag on the opening fence line.
    let body_start = after_open.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after_open[body_start..];
    match body.find("```") {
        Some(close) => body[..close].trim(),
        None => body.trim(),
    }
}

/// Wire shape of the storyboard collaborator's JSON reply.
#[derive(serde::Deserialize)]
struct StoryboardReply {
    slides: Vec<SlideDraft>,
}

const STORYBOARD_SYSTEM: &str = "\
You are a lesson planner. Split the user's text into slides and return \
strict JSON only, no commentary.";

fn storyboard_prompt(text: &str, requested_slides: usize) -> String {
    format!(
        "Split the user text into at most {requested_slides} slides.\n\
         Return JSON of the form:\n\
         {{\"slides\": [{{\"narration\": \"...\", \"visual_spec\": \"...\"}}]}}\n\
         - narration: at most 40 words, no backticks or backquotes.\n\
         - visual_spec: a one-line description of a simple 2D animation.\n\n\
         User text: {text}"
    )
}

/// Storyboard generation through a chat-completion model.
pub struct LlmStoryboarder {
    client: Client,
    model: String,
}

impl LlmStoryboarder {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            client: Client::default(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl StoryboardGenerator for LlmStoryboarder {
    async fn storyboard(
        &self,
        text: &str,
        requested_slides: usize,
    ) -> Result<Vec<SlideDraft>, CollabError> {
        let request = ChatRequest::new(vec![
            ChatMessage::system(STORYBOARD_SYSTEM),
            ChatMessage::user(storyboard_prompt(text, requested_slides)),
        ]);

        let response = self
            .client
            .exec_chat(&self.model, request, None)
            .await
            .map_err(CollabError::service)?;

        let raw = response
            .content_text_as_str()
            .ok_or(CollabError::EmptyOutput)?;
        let body = strip_fences(raw);
        if body.is_empty() {
            return Err(CollabError::EmptyOutput);
        }

        debug!(model = %self.model, bytes = body.len(), "storyboard reply received");

        let reply: StoryboardReply = serde_json::from_str(body)
            .map_err(|e| CollabError::Malformed(format!("storyboard JSON: {e}")))?;
        Ok(reply.slides)
    }
}

const SCENE_SYSTEM: &str = "\
You write Manim scenes. Return only valid Python for the requested class, \
with no comments or surrounding text.";

fn scene_prompt(spec: &SlideSpec, scene_class: &str, seed: u64) -> String {
    format!(
        "Create one Manim scene class named {scene_class}.\n\
         Visual: {description}\n\
         Narration (the scene must pace its animations to this text): \
         {narration}\n\
         Rules:\n\
         - import from manim, define config.random_seed = {seed} at module \
           level, and read timing cues from the cues.json file next to the \
           script if present.\n\
         - only 2D mobjects; no LaTeX (use Text), no tables, plots or 3D.\n\
         - every self.play call must carry an explicit run_time.\n\
         - fades are FadeIn(obj) / FadeOut(obj).\n\
         Return only the Python source.",
        description = spec.description,
        narration = spec.narration,
    )
}

/// Scene-code generation through a chat-completion model.
///
/// Regeneration on retry is driven purely by the seed argument; no state
/// from prior attempts is carried into the prompt.
pub struct LlmSceneCoder {
    client: Client,
    model: String,
}

impl LlmSceneCoder {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            client: Client::default(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl SceneCodeGenerator for LlmSceneCoder {
    async fn scene_code(
        &self,
        spec: &SlideSpec,
        scene_class: &str,
        seed: u64,
    ) -> Result<String, CollabError> {
        let request = ChatRequest::new(vec![
            ChatMessage::system(SCENE_SYSTEM),
            ChatMessage::user(scene_prompt(spec, scene_class, seed)),
        ]);

        let response = self
            .client
            .exec_chat(&self.model, request, None)
            .await
            .map_err(CollabError::service)?;

        let raw = response
            .content_text_as_str()
            .ok_or(CollabError::EmptyOutput)?;
        let source = strip_fences(raw);
        if source.is_empty() {
            return Err(CollabError::EmptyOutput);
        }

        debug!(
            model = %self.model,
            slide = spec.index,
            seed,
            bytes = source.len(),
            "scene source received"
        );

        Ok(source.to_owned())
    }
}
