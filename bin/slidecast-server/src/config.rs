//! Server configuration, loaded from environment variables at startup.

use std::path::PathBuf;
use std::time::Duration;

use slidecast_core::{PipelineConfig, QualityPreset};

/// Runtime configuration for slidecast-server.
///
/// Every field has a sensible default so the server works out-of-the-box
/// without any environment variables set (the LLM provider key, e.g.
/// `GEMINI_API_KEY`, is read by the client library itself).
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP address to bind (default: `"0.0.0.0:3000"`).
    pub bind_address: String,

    /// `tracing` filter string, e.g. `"info"` or `"debug,tower_http=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,

    /// Root directory for per-request workspaces and artifacts.
    pub work_dir: PathBuf,

    /// Chat model used for storyboarding and scene code.
    pub llm_model: String,

    /// Base URL of the speech-synthesis service.
    pub speech_endpoint: String,
    pub speech_model: String,
    pub speech_voice: String,

    /// Base URL of the transcription service and the (fast) model variant.
    pub transcribe_endpoint: String,
    pub transcribe_model: String,

    /// Renderer executable name or path.
    pub renderer_bin: String,

    /// Maximum slides rendered concurrently within one request.
    pub slide_concurrency: usize,

    /// Per-render wall-clock budget in seconds.
    pub render_timeout_secs: u64,
}

impl Config {
    /// Build [`Config`] from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            bind_address: env_or("SLIDECAST_BIND", "0.0.0.0:3000"),
            log_level: env_or("SLIDECAST_LOG", "info"),
            log_json: std::env::var("SLIDECAST_LOG_JSON")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            work_dir: PathBuf::from(env_or("SLIDECAST_WORK_DIR", "slidecast-work")),
            llm_model: env_or("SLIDECAST_LLM_MODEL", "gemini-2.5-flash"),
            speech_endpoint: env_or("SLIDECAST_SPEECH_URL", "http://127.0.0.1:8880"),
            speech_model: env_or("SLIDECAST_SPEECH_MODEL", "tts-1"),
            speech_voice: env_or("SLIDECAST_SPEECH_VOICE", "alloy"),
            transcribe_endpoint: env_or("SLIDECAST_TRANSCRIBE_URL", "http://127.0.0.1:8881"),
            transcribe_model: env_or("SLIDECAST_TRANSCRIBE_MODEL", "tiny"),
            renderer_bin: env_or("SLIDECAST_RENDERER_BIN", "manim"),
            slide_concurrency: parse_env("SLIDECAST_SLIDE_CONCURRENCY", 2),
            render_timeout_secs: parse_env("SLIDECAST_RENDER_TIMEOUT", 300),
        }
    }

    /// Derive the immutable pipeline configuration handed to the core.
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            slide_concurrency: self.slide_concurrency,
            quality: QualityPreset::LOW_LATENCY,
            render_timeout: Duration::from_secs(self.render_timeout_secs),
            work_root: self.work_dir.clone(),
            ..PipelineConfig::default()
        }
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
