//! Interface de linha de comando do feedloop.

pub mod commands;
pub mod interactive;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::knowledge::PatternType;
use crate::types::config::{ExportFormat, ExportPeriod};

/// feedloop - aprendizado por feedback médico e enriquecimento de prompts.
#[derive(Parser, Debug)]
#[command(name = "feedloop")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Arquivo de configuração.
    #[arg(short, long, default_value = "feedloop.toml")]
    pub config: PathBuf,

    /// Modo verbose.
    #[arg(short, long)]
    pub verbose: bool,

    /// Modo silencioso.
    #[arg(short, long)]
    pub quiet: bool,

    /// Comando a executar.
    #[command(subcommand)]
    pub command: Commands,
}

/// Comandos disponíveis.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Inicializa configuração no diretório atual.
    Init {
        /// Diretório de destino (padrão: diretório atual).
        #[arg(short, long)]
        path: Option<PathBuf>,
    },

    /// Importa eventos de feedback (array JSON ou JSON Lines).
    Ingest {
        /// Arquivo de entrada.
        file: PathBuf,
    },

    /// Minera patterns da janela móvel de feedback.
    Mine {
        /// Tamanho da janela em dias (padrão: miner.window_days).
        #[arg(short, long)]
        days: Option<i64>,
    },

    /// Recalcula a confiança e desativa patterns antigos.
    Refresh,

    /// Métricas diárias de desempenho.
    Metrics {
        #[command(subcommand)]
        action: MetricsAction,
    },

    /// Job diário: mine, metrics, refresh e resumo.
    Daily,

    /// Mostra a instrução enriquecida.
    Enhance {
        /// Idade do paciente.
        #[arg(long)]
        age: Option<u32>,

        /// Sintomas em texto livre.
        #[arg(long)]
        symptoms: Option<String>,
    },

    /// Pede uma recomendação ao serviço de IA para um caso.
    Recommend {
        /// Arquivo JSON com o caso clínico.
        #[arg(short, long)]
        patient: PathBuf,
    },

    /// Exporta amostras de aprendizado para fine-tuning.
    Export {
        /// Formato de saída.
        #[arg(short, long, value_enum)]
        format: Option<ExportFormat>,

        /// Período de criação das amostras.
        #[arg(short, long, value_enum)]
        period: Option<ExportPeriod>,

        /// Score mínimo de pertinência (diagnóstico e prescrição).
        #[arg(short, long)]
        min_score: Option<u8>,

        /// Arquivo de saída.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Inclui amostras já exportadas em lotes anteriores.
        #[arg(long)]
        include_consumed: bool,
    },

    /// Administração de patterns.
    Patterns {
        #[command(subcommand)]
        action: PatternsAction,
    },

    /// Mostra o estado da base e do serviço de IA.
    Status,

    /// Configura opções interativamente.
    Config,

    /// Mostra versão.
    Version,
}

/// Subcomandos de métricas.
#[derive(Subcommand, Debug)]
pub enum MetricsAction {
    /// Calcula as métricas cumulativas de uma data.
    Compute {
        /// Data (AAAA-MM-DD). Padrão: hoje.
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },

    /// Lista as métricas mais recentes.
    Show {
        /// Quantidade de dias.
        #[arg(short, long, default_value = "7")]
        days: usize,
    },
}

/// Subcomandos de patterns.
#[derive(Subcommand, Debug)]
pub enum PatternsAction {
    /// Lista patterns.
    List {
        /// Inclui inativos.
        #[arg(short, long)]
        all: bool,

        /// Filtra por tipo.
        #[arg(short = 't', long = "type", value_enum)]
        pattern_type: Option<PatternType>,
    },

    /// Reativa um pattern.
    Enable { id: i64 },

    /// Desativa um pattern.
    Disable { id: i64 },

    /// Revisão interativa dos patterns ativos.
    Review,
}
