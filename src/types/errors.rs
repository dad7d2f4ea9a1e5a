//! Tipos de erro do feedloop.

use thiserror::Error;

/// Tipo de resultado padrão do feedloop.
pub type FeedloopResult<T> = Result<T, FeedloopError>;

/// Erros possíveis no feedloop.
#[derive(Error, Debug)]
pub enum FeedloopError {
    #[error("Erro de configuração: {0}")]
    Config(String),

    #[error("Erro de IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("Erro ao parsear TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Erro ao serializar TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Erro de JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Erro no banco de dados: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Banco ocupado após {0} tentativas")]
    StoreBusy(u32),

    #[error("Registro malformado ({0}): {1}")]
    MalformedRecord(String, String),

    #[error("Recomendação fora do schema: {0}")]
    InvalidRecommendation(String),

    #[error("Serviço de IA '{0}' falhou: {1}")]
    AiService(String, String),

    #[error("Timeout ao chamar o serviço de IA '{0}'")]
    AiTimeout(String),

    #[error("Não encontrado: {0}")]
    NotFound(String),

    #[cfg(feature = "cli")]
    #[error("Erro no prompt interativo: {0}")]
    Prompt(#[from] dialoguer::Error),

    #[error("{0}")]
    Other(String),
}

impl FeedloopError {
    /// Cria um erro genérico.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        Self::Other(msg.into())
    }

    /// Cria um erro de configuração.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Cria um erro de registro malformado.
    pub fn malformed<R: Into<String>, S: Into<String>>(record: R, msg: S) -> Self {
        Self::MalformedRecord(record.into(), msg.into())
    }

    /// Indica contenção no SQLite (SQLITE_BUSY / SQLITE_LOCKED).
    pub fn is_busy(&self) -> bool {
        match self {
            Self::Database(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            Self::StoreBusy(_) => true,
            _ => false,
        }
    }
}
