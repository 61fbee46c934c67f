use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use biome_core::{ChunkSet, chunk_blocks, parse_blocks};
use biome_script::{ExecLimits, run_script};

pub mod groq;
pub mod prompt;

pub use groq::GroqClient;
pub use prompt::{build_prompt, strip_code_fences};

/// Seam for the remote code-generation model.
///
/// All failure modes of one call (network, HTTP status, missing content)
/// collapse into a single error string; the retry loop treats them all
/// identically.
#[async_trait]
pub trait CodeModel: Send + Sync {
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, String>;
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub max_attempts: usize,
    pub retry_delay: Duration,
    pub max_tokens: u32,
    pub chunk_chars: usize,
    pub exec_limits: ExecLimits,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_secs(1),
            max_tokens: 4000,
            chunk_chars: 10_000,
            exec_limits: ExecLimits::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// The theme was empty after trimming. Never retried.
    InvalidInput,
    /// Captured script output was not a JSON array of records. Terminal:
    /// re-running the same reply cannot help.
    Decode(String),
    /// Every attempt failed; carries the last underlying error.
    RetryExhausted { attempts: usize, last_error: String },
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::InvalidInput => f.write_str("missing or empty theme"),
            PipelineError::Decode(message) => {
                write!(f, "model output could not be decoded: {message}")
            }
            PipelineError::RetryExhausted {
                attempts,
                last_error,
            } => write!(
                f,
                "generation failed after {attempts} attempt(s): {last_error}"
            ),
        }
    }
}

impl std::error::Error for PipelineError {}

/// Runs the full theme-to-chunks pipeline: prompt, model call with bounded
/// retries, sandboxed execution, parsing, chunk packing.
pub struct BiomePipeline<C: CodeModel> {
    client: C,
    config: PipelineConfig,
}

impl<C: CodeModel> BiomePipeline<C> {
    pub fn new(client: C, config: PipelineConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn into_client(self) -> C {
        self.client
    }

    /// One pipeline run for one theme.
    ///
    /// Model-call failures and script-execution failures share a single
    /// attempt budget: a failed execution consumes an attempt and triggers a
    /// fresh model call, never a re-run of the same source. The fixed
    /// inter-attempt delay paces against rate limits.
    pub async fn run(&self, theme: &str) -> Result<ChunkSet, PipelineError> {
        let theme = theme.trim();
        if theme.is_empty() {
            return Err(PipelineError::InvalidInput);
        }

        let prompt = build_prompt(theme);
        let max_attempts = self.config.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                tokio::time::sleep(self.config.retry_delay).await;
            }

            let reply = match self.client.complete(&prompt, self.config.max_tokens).await {
                Ok(reply) => reply,
                Err(err) => {
                    warn!(attempt, error = %err, "model call failed");
                    last_error = err;
                    continue;
                }
            };

            let source = strip_code_fences(&reply);
            if source.is_empty() {
                warn!(attempt, "model reply contained no code");
                last_error = "model reply contained no code".to_string();
                continue;
            }

            debug!(attempt, source_len = source.len(), "executing generated script");
            let limits = self.config.exec_limits;
            let captured =
                match tokio::task::spawn_blocking(move || run_script(&source, &limits)).await {
                    Ok(Ok(text)) => text,
                    Ok(Err(err)) => {
                        warn!(attempt, error = %err, "script execution failed");
                        last_error = err.to_string();
                        continue;
                    }
                    Err(join_err) => {
                        warn!(attempt, error = %join_err, "script task aborted");
                        last_error = format!("script task aborted: {join_err}");
                        continue;
                    }
                };

            let blocks = parse_blocks(&captured)
                .map_err(|err| PipelineError::Decode(err.to_string()))?;
            info!(attempt, blocks = blocks.len(), "generation succeeded");
            return Ok(chunk_blocks(&blocks, self.config.chunk_chars));
        }

        Err(PipelineError::RetryExhausted {
            attempts: max_attempts,
            last_error,
        })
    }
}
