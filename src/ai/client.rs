//! Trait base para clientes do serviço de IA generativa.

use async_trait::async_trait;

use crate::types::feedback::AnonymizedPatient;
use crate::types::recommendation::{response_schema, Recommendation};
use crate::FeedloopResult;

/// Pedido enviado ao modelo: instrução de sistema e prompt do caso.
#[derive(Debug, Clone)]
pub struct RecommendationRequest {
    pub system_instruction: String,
    pub user_prompt: String,
}

impl RecommendationRequest {
    /// Monta o pedido a partir da instrução enriquecida e do paciente anonimizado.
    pub fn new(system_instruction: impl Into<String>, patient: &AnonymizedPatient) -> Self {
        Self {
            system_instruction: system_instruction.into(),
            user_prompt: patient.render_prompt(),
        }
    }
}

/// Cliente de um serviço que devolve recomendações no schema JSON fixo.
///
/// Falhas do serviço nunca são engolidas: saem como `AiService`,
/// `AiTimeout` ou `InvalidRecommendation`.
#[async_trait]
pub trait RecommendationClient: Send + Sync {
    /// Retorna o nome do cliente.
    fn name(&self) -> &str;

    /// Retorna o comando CLI.
    fn command(&self) -> &str;

    /// Verifica se a CLI está disponível no sistema.
    async fn is_available(&self) -> bool {
        tokio::process::Command::new(self.command())
            .arg("--version")
            .output()
            .await
            .map(|output| output.status.success())
            .unwrap_or(false)
    }

    /// Pede uma recomendação validada.
    async fn recommend(&self, request: &RecommendationRequest) -> FeedloopResult<Recommendation>;

    /// Constrói o prompt completo, com o schema exigido.
    fn build_prompt(&self, request: &RecommendationRequest) -> String {
        let schema = serde_json::to_string_pretty(&response_schema()).unwrap_or_default();

        let mut prompt = String::new();
        prompt.push_str(&request.system_instruction);
        prompt.push_str("\n\n");
        prompt.push_str(&request.user_prompt);
        prompt.push_str("\n\nRespond with a single JSON object matching this schema:\n");
        prompt.push_str(&schema);
        prompt.push('\n');
        prompt
    }
}
