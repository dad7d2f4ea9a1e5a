//! Cliente para o Gemini CLI.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tokio::process::Command;

use super::client::{RecommendationClient, RecommendationRequest};
use crate::types::config::AiConfig;
use crate::types::recommendation::Recommendation;
use crate::{FeedloopError, FeedloopResult};

/// Envelope de `gemini -o json`: a resposta do modelo vem como string.
#[derive(Debug, Deserialize)]
struct CliEnvelope {
    response: String,
}

/// Cliente do Gemini CLI (Google).
pub struct GeminiCli {
    command_name: String,
    args: Vec<String>,
    timeout: Duration,
}

impl GeminiCli {
    /// Cria um novo cliente Gemini com valores padrão.
    pub fn new() -> Self {
        Self::from_config(&AiConfig::default())
    }

    /// Cria o cliente a partir da configuração do TOML.
    pub fn from_config(config: &AiConfig) -> Self {
        Self {
            command_name: config.command.clone(),
            args: config.args.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// Define o timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Interpreta a saída, com ou sem o envelope JSON da CLI.
    pub fn parse_output(output: &str) -> FeedloopResult<Recommendation> {
        if let Ok(envelope) = serde_json::from_str::<CliEnvelope>(output.trim()) {
            return Recommendation::parse_from_output(&envelope.response);
        }
        Recommendation::parse_from_output(output)
    }
}

impl Default for GeminiCli {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecommendationClient for GeminiCli {
    fn name(&self) -> &str {
        "Gemini"
    }

    fn command(&self) -> &str {
        &self.command_name
    }

    async fn recommend(&self, request: &RecommendationRequest) -> FeedloopResult<Recommendation> {
        let prompt = self.build_prompt(request);

        // Argumentos do config; o prompt é posicional
        let mut cmd = Command::new(&self.command_name);
        cmd.args(&self.args).arg(&prompt).kill_on_drop(true);

        tracing::debug!(command = %self.command_name, "Chamando serviço de IA");

        match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => {
                if output.status.success() {
                    let stdout = String::from_utf8_lossy(&output.stdout);
                    Self::parse_output(&stdout)
                } else {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    Err(FeedloopError::AiService(
                        self.name().to_string(),
                        stderr.trim().to_string(),
                    ))
                }
            }
            Ok(Err(e)) => Err(FeedloopError::AiService(
                self.name().to_string(),
                e.to_string(),
            )),
            Err(_) => Err(FeedloopError::AiTimeout(self.name().to_string())),
        }
    }
}
