use std::sync::Arc;

use tracing::debug;

use crate::collab::{SceneCodeGenerator, SceneProgram};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::storyboard::SlideSpec;

/// Turns one storyboard entry into a validated candidate animation program.
///
/// Calls the code-generation collaborator with a seed derived from the
/// attempt number, then checks the result is a structurally complete scene
/// definition.  Never executes the program.
pub struct SlideCompiler {
    coder: Arc<dyn SceneCodeGenerator>,
    config: Arc<PipelineConfig>,
}

impl SlideCompiler {
    pub fn new(coder: Arc<dyn SceneCodeGenerator>, config: Arc<PipelineConfig>) -> Self {
        Self { coder, config }
    }

    /// Compile a candidate program for `spec` at the given attempt (1-based).
    pub async fn compile(
        &self,
        spec: &SlideSpec,
        attempt: u32,
    ) -> Result<SceneProgram, PipelineError> {
        let seed = self.config.attempt_seed(attempt);
        let scene_class = spec.scene_class();

        let generation = self.coder.scene_code(spec, &scene_class, seed);
        let source = tokio::time::timeout(self.config.generation_timeout, generation)
            .await
            .map_err(|_| PipelineError::Generation {
                slide: spec.index,
                message: format!(
                    "code generation timed out after {}s",
                    self.config.generation_timeout.as_secs()
                ),
            })?
            .map_err(|e| PipelineError::Generation {
                slide: spec.index,
                message: e.to_string(),
            })?;

        validate_scene_source(&source, &scene_class).map_err(|message| {
            PipelineError::Generation {
                slide: spec.index,
                message,
            }
        })?;

        debug!(slide = spec.index, attempt, seed, "candidate program compiled");

        Ok(SceneProgram {
            slide_index: spec.index,
            scene_class,
            source,
            seed,
        })
    }
}

/// Structural validity check for a generated scene program.
///
/// The program is accepted if it is non-empty, defines the expected scene
/// class with a `construct` method, and shows no obvious signs of
/// truncation (unbalanced brackets or an unterminated triple-quoted
/// string).  Anything deeper is the renderer's job.
pub fn validate_scene_source(source: &str, scene_class: &str) -> Result<(), String> {
    let trimmed = source.trim();
    if trimmed.is_empty() {
        return Err("generated program is empty".to_owned());
    }

    let class_decl = format!("class {scene_class}");
    if !trimmed.contains(&class_decl) {
        return Err(format!("program does not define `{class_decl}`"));
    }
    if !trimmed.contains("def construct") {
        return Err("scene class has no construct method".to_owned());
    }

    if trimmed.matches("\"\"\"").count() % 2 != 0 {
        return Err("unterminated triple-quoted string (truncated output?)".to_owned());
    }

    let mut round = 0i64;
    let mut square = 0i64;
    let mut curly = 0i64;
    for ch in trimmed.chars() {
        match ch {
            '(' => round += 1,
            ')' => round -= 1,
            '[' => square += 1,
            ']' => square -= 1,
            '{' => curly += 1,
            '}' => curly -= 1,
            _ => {}
        }
    }
    if round != 0 || square != 0 || curly != 0 {
        return Err("unbalanced brackets (truncated output?)".to_owned());
    }

    if trimmed.ends_with('\\') || trimmed.ends_with(',') {
        return Err("program ends mid-statement (truncated output?)".to_owned());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = "\
from manim import *

config.random_seed = 42

class Slide0(Scene):
    def construct(self):
        circle = Circle()
        self.play(Create(circle), run_time=2.0)
";

    #[test]
    fn valid_program_is_accepted() {
        assert!(validate_scene_source(VALID, "Slide0").is_ok());
    }

    #[test]
    fn empty_program_is_rejected() {
        let err = validate_scene_source("   \n", "Slide0").unwrap_err();
        assert!(err.contains("empty"));
    }

    #[test]
    fn wrong_class_name_is_rejected() {
        let err = validate_scene_source(VALID, "Slide3").unwrap_err();
        assert!(err.contains("Slide3"));
    }

    #[test]
    fn missing_construct_is_rejected() {
        let source = "class Slide0(Scene):\n    pass\n";
        let err = validate_scene_source(source, "Slide0").unwrap_err();
        assert!(err.contains("construct"));
    }

    #[test]
    fn unbalanced_brackets_are_rejected() {
        let source = "\
class Slide0(Scene):
    def construct(self):
        self.play(Create(Circle()
";
        let err = validate_scene_source(source, "Slide0").unwrap_err();
        assert!(err.contains("unbalanced"));
    }

    #[test]
    fn unterminated_docstring_is_rejected() {
        let source = "\
class Slide0(Scene):
    def construct(self):
        text = \"\"\"cut off here
";
        let err = validate_scene_source(source, "Slide0").unwrap_err();
        assert!(err.contains("triple-quoted"));
    }

    #[test]
    fn trailing_continuation_is_rejected() {
        let source = "\
class Slide0(Scene):
    def construct(self):
        x = 1 + \\";
        let err = validate_scene_source(source, "Slide0").unwrap_err();
        assert!(err.contains("mid-statement"));
    }
}
