//! Implementação dos comandos CLI do feedloop.

use std::path::{Path, PathBuf};

use chrono::{NaiveDate, Utc};
use indicatif::{ProgressBar, ProgressStyle};

use crate::ai::{GeminiCli, RecommendationClient, RecommendationRequest};
use crate::knowledge::{
    read_feedback_file, KnowledgeStore, Pattern, PatternFilter, PatternType, TypeSummary,
};
use crate::metrics::{DailyMetrics, MetricsAggregator};
use crate::mining::PatternMiner;
use crate::pipeline::run_daily;
use crate::prompt::PromptEnhancer;
use crate::training::{ExportRequest, TrainingExporter};
use crate::types::config::{Config, ExportFormat, ExportPeriod};
use crate::types::feedback::{PatientCase, PatientContext};
use crate::{FeedloopError, FeedloopResult};

/// Abre a base configurada.
pub fn open_store(config: &Config) -> FeedloopResult<KnowledgeStore> {
    KnowledgeStore::open(&config.store.db_path, &config.store)
}

/// Initializes configuration in the specified directory.
pub async fn init(path: Option<PathBuf>) -> FeedloopResult<()> {
    let target_dir = path.unwrap_or_else(|| PathBuf::from("."));

    if !target_dir.exists() {
        std::fs::create_dir_all(&target_dir)?;
        tracing::info!("Directory created: {}", target_dir.display());
    }

    let config_path = target_dir.join("feedloop.toml");

    if config_path.exists() {
        println!("Configuration already exists at: {}", config_path.display());
        println!("Use 'feedloop config' to modify.");
        return Ok(());
    }

    // .feedloop/ guarda o banco SQLite
    let data_dir = target_dir.join(".feedloop");
    if !data_dir.exists() {
        std::fs::create_dir_all(&data_dir)?;
        tracing::info!(".feedloop/ directory created");
    }

    update_gitignore(&target_dir)?;

    let config = Config::default_config();
    config.save(&config_path)?;

    println!("feedloop initialized successfully!");
    println!("Configuration created at: {}", config_path.display());
    println!("Data directory: .feedloop/");
    println!();
    println!("Next steps:");
    println!("  1. Import feedback: feedloop ingest feedback.jsonl");
    println!("  2. Run the daily job: feedloop daily");
    println!("  3. Inspect the enhanced instruction: feedloop enhance");

    Ok(())
}

/// Updates or creates .gitignore to include .feedloop/
fn update_gitignore(target_dir: &Path) -> FeedloopResult<()> {
    let gitignore_path = target_dir.join(".gitignore");
    let entry = ".feedloop/";
    let comment = "# feedloop - local knowledge base";

    if gitignore_path.exists() {
        let content = std::fs::read_to_string(&gitignore_path)?;

        if content
            .lines()
            .any(|line| line.trim() == entry || line.trim() == ".feedloop")
        {
            tracing::debug!(".gitignore already contains .feedloop/");
            return Ok(());
        }

        let mut new_content = content.trim_end().to_string();
        if !new_content.is_empty() {
            new_content.push_str("\n\n");
        }
        new_content.push_str(comment);
        new_content.push('\n');
        new_content.push_str(entry);
        new_content.push('\n');

        std::fs::write(&gitignore_path, new_content)?;
        println!(".gitignore updated with .feedloop/");
    } else {
        let content = format!("{}\n{}\n", comment, entry);
        std::fs::write(&gitignore_path, content)?;
        println!(".gitignore created with .feedloop/");
    }

    Ok(())
}

/// Importa eventos de feedback.
pub async fn ingest(file: &Path, config: &Config) -> FeedloopResult<()> {
    if !file.exists() {
        return Err(FeedloopError::NotFound(file.display().to_string()));
    }

    let (events, unreadable) = read_feedback_file(file)?;
    let mut store = open_store(config)?;

    let progress = ProgressBar::new(events.len() as u64);
    progress.set_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} eventos")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let mut inserted = 0;
    let mut updated = 0;
    let mut rejected = 0;
    for chunk in events.chunks(100) {
        let report = store.ingest_feedback(chunk)?;
        inserted += report.inserted;
        updated += report.updated;
        rejected += report.skipped;
        progress.inc(chunk.len() as u64);
    }
    progress.finish_and_clear();

    println!("Importação concluída:");
    println!("  Eventos novos: {}", inserted);
    println!("  Eventos atualizados: {}", updated);
    println!("  Registros ignorados: {}", rejected + unreadable);

    Ok(())
}

/// Minera patterns da janela móvel.
pub async fn mine(days: Option<i64>, config: &Config) -> FeedloopResult<()> {
    let mut miner_config = config.miner.clone();
    if let Some(days) = days {
        miner_config.window_days = days;
    }

    let mut store = open_store(config)?;
    let miner = PatternMiner::new(&miner_config)?;

    println!(
        "Analisando o feedback dos últimos {} dias...",
        miner_config.window_days
    );
    let report = miner.run_window(&mut store, Utc::now())?;

    if report.events_analyzed == 0 {
        println!("Nenhum feedback encontrado na janela.");
        return Ok(());
    }

    println!("  Eventos analisados: {}", report.events_analyzed);
    println!("  Patterns criados: {}", report.created);
    println!("  Patterns atualizados: {}", report.updated);
    if report.skipped > 0 {
        println!("  Eventos ignorados: {}", report.skipped);
    }
    if report.failed > 0 {
        println!("  Falhas de escrita: {}", report.failed);
        return Err(FeedloopError::other(format!(
            "{} patterns não foram gravados",
            report.failed
        )));
    }

    Ok(())
}

/// Recalcula a confiança dos patterns.
pub async fn refresh(config: &Config) -> FeedloopResult<()> {
    let mut store = open_store(config)?;
    let summary = store.refresh_confidence(&config.refresher, Utc::now())?;

    println!("Patterns ativos: {}", summary.active_count);
    println!("Patterns desativados: {}", summary.deactivated_count);

    Ok(())
}

/// Calcula as métricas de uma data.
pub async fn metrics_compute(date: Option<NaiveDate>, config: &Config) -> FeedloopResult<()> {
    let now = Utc::now();
    let date = date.unwrap_or_else(|| now.date_naive());

    let mut store = open_store(config)?;
    let report = MetricsAggregator::run(&mut store, date, now)?;

    let action = if report.replaced { "atualizadas" } else { "criadas" };
    println!("Métricas {} para {}:", action, date);
    print_metrics(&report.metrics);

    if report.samples.created > 0 || report.samples.failed > 0 {
        println!(
            "  Amostras de aprendizado: {} criadas, {} falharam",
            report.samples.created, report.samples.failed
        );
    }

    Ok(())
}

/// Lista as métricas mais recentes.
pub async fn metrics_show(days: usize, config: &Config) -> FeedloopResult<()> {
    let store = open_store(config)?;
    let history = store.metrics_history(days)?;

    if history.is_empty() {
        println!("Nenhuma métrica calculada ainda.");
        return Ok(());
    }

    for metrics in &history {
        println!("{}:", metrics.metric_date);
        print_metrics(metrics);
    }

    Ok(())
}

fn print_metrics(metrics: &DailyMetrics) {
    let score = |v: Option<f64>| {
        v.map(|s| format!("{:.1}/10", s))
            .unwrap_or_else(|| "-".to_string())
    };

    println!("  Total de feedbacks: {}", metrics.total_feedback);
    println!("  Validação direta: {:.1}%", metrics.validation_rate);
    println!("  Modificação: {:.1}%", metrics.modification_rate);
    println!("  Rejeição: {:.1}%", metrics.rejection_rate);
    println!("  Score médio diagnóstico: {}", score(metrics.avg_diagnostic_score));
    println!("  Score médio prescrição: {}", score(metrics.avg_prescription_score));
    println!("  Eficácia elevada: {:.1}%", metrics.high_efficacy_rate);
    if let Some(days) = metrics.avg_healing_days {
        println!("  Duração média de cura: {:.1} dias", days);
    }
}

/// Job diário completo.
pub async fn daily(config: &Config) -> FeedloopResult<()> {
    let mut store = open_store(config)?;

    println!("Iniciando o job diário...");
    let report = run_daily(&mut store, config, Utc::now());

    if let Some(mining) = &report.mining {
        println!(
            "  Mineração: {} eventos, {} patterns gravados",
            mining.events_analyzed,
            mining.patterns_written()
        );
    }
    if let Some(aggregation) = &report.aggregation {
        println!(
            "  Métricas: {} feedbacks, {:.1}% validação direta, {} amostras novas",
            aggregation.metrics.total_feedback,
            aggregation.metrics.validation_rate,
            aggregation.samples.created
        );
    }
    if let Some(refresh) = &report.refresh {
        println!("  Patterns ativos: {}", refresh.active_count);
        println!("  Patterns desativados: {}", refresh.deactivated_count);
    }

    print_summary(&report.summary);

    if report.is_success() {
        println!("\nJob diário concluído.");
        Ok(())
    } else {
        for failure in &report.failures {
            eprintln!("  ✗ {}: {}", failure.stage, failure.error);
        }
        Err(FeedloopError::other(format!(
            "{} etapa(s) do job diário falharam",
            report.failures.len()
        )))
    }
}

fn print_summary(summary: &[TypeSummary]) {
    if summary.is_empty() {
        return;
    }
    println!("\nEnriquecimentos disponíveis:");
    for entry in summary {
        print!("  - {}: {} patterns", entry.pattern_type, entry.active_count);
        if let Some(latest) = &entry.latest {
            print!(" (mais recente: {})", latest.description);
        }
        println!();
    }
}

/// Mostra a instrução enriquecida.
pub async fn enhance(
    age: Option<u32>,
    symptoms: Option<String>,
    config: &Config,
) -> FeedloopResult<()> {
    let store = open_store(config)?;
    let snapshot = store.enhancement_snapshot(Utc::now(), config.enhancer.stats_window_days)?;
    let enhancer = PromptEnhancer::new(&config.enhancer);

    let context = (age.is_some() || symptoms.is_some()).then_some(PatientContext { age, symptoms });
    let instruction = enhancer.enhance(enhancer.base_instruction(), &snapshot, context.as_ref());

    println!("{}", instruction);
    Ok(())
}

/// Pede uma recomendação para um caso clínico.
pub async fn recommend(patient: &Path, config: &Config) -> FeedloopResult<()> {
    if !config.ai.enabled {
        return Err(FeedloopError::config("serviço de IA desabilitado em [ai]"));
    }

    let content = std::fs::read_to_string(patient)?;
    let case: PatientCase = serde_json::from_str(&content)?;

    let now = Utc::now();
    let store = open_store(config)?;
    let snapshot = store.enhancement_snapshot(now, config.enhancer.stats_window_days)?;
    let enhancer = PromptEnhancer::new(&config.enhancer);

    let context = case.context(now.date_naive());
    let instruction = enhancer.enhance(enhancer.base_instruction(), &snapshot, Some(&context));
    let request = RecommendationRequest::new(instruction, &case.anonymize(now.date_naive()));

    let client = GeminiCli::from_config(&config.ai);
    let recommendation = client.recommend(&request).await?;

    println!("{}", serde_json::to_string_pretty(&recommendation)?);
    Ok(())
}

/// Exporta amostras de aprendizado.
pub async fn export(
    format: Option<ExportFormat>,
    period: Option<ExportPeriod>,
    min_score: Option<u8>,
    output: Option<PathBuf>,
    include_consumed: bool,
    config: &Config,
) -> FeedloopResult<()> {
    let request = ExportRequest {
        min_score: min_score.unwrap_or(config.export.min_relevance_score),
        period: period.unwrap_or(config.export.period),
        format: format.unwrap_or(config.export.format),
        output: output.unwrap_or_else(|| config.export.output.clone()),
        system_persona: config.export.system_persona.clone(),
        include_consumed,
    };

    let mut store = open_store(config)?;
    let report = TrainingExporter::export(&mut store, &request, Utc::now())?;

    match report.output {
        Some(path) => println!(
            "Exportação concluída: {} amostras em {} (lote {})",
            report.count,
            path.display(),
            report.batch_tag
        ),
        None => println!("Nenhuma amostra elegível para exportação."),
    }

    Ok(())
}

/// Lista patterns.
pub async fn patterns_list(
    all: bool,
    pattern_type: Option<PatternType>,
    config: &Config,
) -> FeedloopResult<()> {
    let store = open_store(config)?;
    let patterns = store.list_patterns(&PatternFilter {
        active_only: !all,
        pattern_type,
    })?;

    if patterns.is_empty() {
        println!("Nenhum pattern encontrado.");
        return Ok(());
    }

    let now = Utc::now();
    for pattern in &patterns {
        println!("{}", format_pattern(pattern, now));
    }

    print_summary(&store.enhancement_summary()?);
    Ok(())
}

pub(crate) fn format_pattern(pattern: &Pattern, now: chrono::DateTime<Utc>) -> String {
    format!(
        "#{:<4} {} [{}] {} (freq {}, confiança {:.2}, visto há {} dias)",
        pattern.id,
        if pattern.is_active { "●" } else { "○" },
        pattern.pattern_type,
        pattern.description,
        pattern.frequency,
        pattern.confidence,
        pattern.days_since_seen(now)
    )
}

/// Ativa ou desativa um pattern.
pub async fn patterns_toggle(id: i64, active: bool, config: &Config) -> FeedloopResult<()> {
    let mut store = open_store(config)?;
    let pattern = store.set_active(id, active)?;

    println!(
        "Pattern #{} {}: {}",
        pattern.id,
        if active { "ativado" } else { "desativado" },
        pattern.description
    );
    Ok(())
}

/// Revisão interativa.
pub async fn patterns_review(config: &Config) -> FeedloopResult<()> {
    let mut store = open_store(config)?;
    super::interactive::review_patterns(&mut store)
}

/// Mostra o estado da base e do serviço de IA.
pub async fn status(config: &Config) -> FeedloopResult<()> {
    println!("Verificando o estado do feedloop...\n");

    let db_path = &config.store.db_path;
    if db_path.exists() {
        let store = open_store(config)?;
        println!("✓ Base de conhecimento: {}", db_path.display());
        println!("  Feedbacks: {}", store.count_feedback()?);
        println!(
            "  Patterns: {} ativos de {}",
            store.count_patterns(true)?,
            store.count_patterns(false)?
        );
        println!(
            "  Amostras de aprendizado: {} pendentes, {} exportadas",
            store.count_learning_samples(Some(false))?,
            store.count_learning_samples(Some(true))?
        );
        if let Some(latest) = store.metrics_history(1)?.first() {
            println!("  Últimas métricas: {}", latest.metric_date);
        }
    } else {
        println!("○ Base de conhecimento ainda não criada ({})", db_path.display());
    }

    let client = GeminiCli::from_config(&config.ai);
    if !config.ai.enabled {
        println!("○ Serviço de IA desabilitado");
    } else if client.is_available().await {
        println!("✓ Serviço de IA disponível (comando: {})", client.command());
    } else {
        println!("✗ Serviço de IA não encontrado (comando: {})", client.command());
    }

    Ok(())
}

/// Configura opções interativamente.
pub async fn config_cmd(config_path: &Path) -> FeedloopResult<()> {
    use super::interactive::{run_interactive_config, show_config_summary};

    if config_path.exists() {
        let config = Config::load(config_path)?;
        show_config_summary(&config);
    }

    run_interactive_config(config_path)
}

/// Mostra versão.
pub fn version() {
    println!("feedloop {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Aprendizado por feedback médico e enriquecimento de prompts");
}
