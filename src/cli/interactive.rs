//! Configuração interativa do feedloop.
//!
//! Este módulo implementa a configuração e a revisão de patterns usando dialoguer.

use std::path::Path;

use chrono::Utc;
use dialoguer::{theme::ColorfulTheme, Confirm, Input, MultiSelect, Select};

use super::commands::format_pattern;
use crate::knowledge::KnowledgeStore;
use crate::types::config::{Config, ExportFormat, ExportPeriod, FrequencyPolicy};
use crate::FeedloopResult;

/// Executa a configuração interativa.
pub fn run_interactive_config(config_path: &Path) -> FeedloopResult<()> {
    let theme = ColorfulTheme::default();

    println!("\n🔧 Configuração Interativa do feedloop\n");

    let mut config = if config_path.exists() {
        Config::load(config_path)?
    } else {
        println!("Criando nova configuração...\n");
        Config::default_config()
    };

    loop {
        let options = vec![
            "Configurações Gerais",
            "Mineração de patterns",
            "Refresh de confiança",
            "Enriquecimento de prompts",
            "Exportação de treino",
            "Serviço de IA",
            "Salvar e Sair",
            "Sair sem Salvar",
        ];

        let selection = Select::with_theme(&theme)
            .with_prompt("O que deseja configurar?")
            .items(&options)
            .default(0)
            .interact()?;

        match selection {
            0 => configure_general(&theme, &mut config)?,
            1 => configure_miner(&theme, &mut config)?,
            2 => configure_refresher(&theme, &mut config)?,
            3 => configure_enhancer(&theme, &mut config)?,
            4 => configure_export(&theme, &mut config)?,
            5 => configure_ai(&theme, &mut config)?,
            6 => {
                config.save(config_path)?;
                println!("\n✓ Configuração salva em: {}\n", config_path.display());
                break;
            }
            7 => {
                if Confirm::with_theme(&theme)
                    .with_prompt("Deseja realmente sair sem salvar?")
                    .default(false)
                    .interact()?
                {
                    println!("\nSaindo sem salvar.\n");
                    break;
                }
            }
            _ => {}
        }
    }

    Ok(())
}

fn configure_general(theme: &ColorfulTheme, config: &mut Config) -> FeedloopResult<()> {
    println!("\n📋 Configurações Gerais\n");

    let log_levels = vec!["error", "warn", "info", "debug", "trace"];
    let current_idx = log_levels
        .iter()
        .position(|&l| l == config.general.log_level)
        .unwrap_or(2);

    let log_level_idx = Select::with_theme(theme)
        .with_prompt("Nível de log")
        .items(&log_levels)
        .default(current_idx)
        .interact()?;
    config.general.log_level = log_levels[log_level_idx].to_string();

    let log_formats = vec!["text", "json"];
    let current_format_idx = log_formats
        .iter()
        .position(|&f| f == config.general.log_format)
        .unwrap_or(0);

    let log_format_idx = Select::with_theme(theme)
        .with_prompt("Formato de log")
        .items(&log_formats)
        .default(current_format_idx)
        .interact()?;
    config.general.log_format = log_formats[log_format_idx].to_string();

    let db_path: String = Input::with_theme(theme)
        .with_prompt("Caminho do banco SQLite")
        .default(config.store.db_path.display().to_string())
        .interact_text()?;
    config.store.db_path = db_path.into();

    println!("\n✓ Configurações gerais atualizadas.\n");
    Ok(())
}

fn configure_miner(theme: &ColorfulTheme, config: &mut Config) -> FeedloopResult<()> {
    println!("\n⛏  Mineração de patterns\n");

    config.miner.window_days = Input::with_theme(theme)
        .with_prompt("Janela de análise (dias)")
        .default(config.miner.window_days)
        .interact_text()?;

    config.miner.min_support = Input::with_theme(theme)
        .with_prompt("Ocorrências mínimas por palavra-chave")
        .default(config.miner.min_support)
        .interact_text()?;

    config.miner.good_practice_min_score = Input::with_theme(theme)
        .with_prompt("Score mínimo para boa prática (0-10)")
        .default(config.miner.good_practice_min_score)
        .validate_with(|v: &u8| {
            if *v <= 10 {
                Ok(())
            } else {
                Err("O score deve estar entre 0 e 10")
            }
        })
        .interact_text()?;

    let policies = vec!["Substituir pela contagem do lote", "Acumular contagens"];
    let current = match config.miner.frequency_policy {
        FrequencyPolicy::Replace => 0,
        FrequencyPolicy::Accumulate => 1,
    };
    let idx = Select::with_theme(theme)
        .with_prompt("Frequência de um pattern já conhecido")
        .items(&policies)
        .default(current)
        .interact()?;
    config.miner.frequency_policy = if idx == 0 {
        FrequencyPolicy::Replace
    } else {
        FrequencyPolicy::Accumulate
    };

    println!("\n✓ Mineração configurada.\n");
    Ok(())
}

fn configure_refresher(theme: &ColorfulTheme, config: &mut Config) -> FeedloopResult<()> {
    println!("\n♻  Refresh de confiança\n");

    config.refresher.staleness_days = Input::with_theme(theme)
        .with_prompt("Desativar patterns não vistos há (dias)")
        .default(config.refresher.staleness_days)
        .interact_text()?;

    config.refresher.decay_days = Input::with_theme(theme)
        .with_prompt("Horizonte de decaimento (dias)")
        .default(config.refresher.decay_days)
        .interact_text()?;

    config.refresher.frequency_saturation = Input::with_theme(theme)
        .with_prompt("Frequência de saturação")
        .default(config.refresher.frequency_saturation)
        .interact_text()?;

    println!("\n✓ Refresh configurado.\n");
    Ok(())
}

fn configure_enhancer(theme: &ColorfulTheme, config: &mut Config) -> FeedloopResult<()> {
    println!("\n✨ Enriquecimento de prompts\n");

    config.enhancer.min_frequency = Input::with_theme(theme)
        .with_prompt("Frequência mínima")
        .default(config.enhancer.min_frequency)
        .interact_text()?;

    config.enhancer.min_confidence = Input::with_theme(theme)
        .with_prompt("Confiança mínima (0.0-1.0)")
        .default(config.enhancer.min_confidence)
        .validate_with(|v: &f64| {
            if (0.0..=1.0).contains(v) {
                Ok(())
            } else {
                Err("A confiança deve estar entre 0.0 e 1.0")
            }
        })
        .interact_text()?;

    config.enhancer.max_errors = Input::with_theme(theme)
        .with_prompt("Máximo de erros listados")
        .default(config.enhancer.max_errors)
        .interact_text()?;

    config.enhancer.stats_window_days = Input::with_theme(theme)
        .with_prompt("Janela das estatísticas recentes (dias)")
        .default(config.enhancer.stats_window_days)
        .interact_text()?;

    println!("\n✓ Enriquecimento configurado.\n");
    Ok(())
}

fn configure_export(theme: &ColorfulTheme, config: &mut Config) -> FeedloopResult<()> {
    println!("\n📦 Exportação de treino\n");

    config.export.min_relevance_score = Input::with_theme(theme)
        .with_prompt("Score mínimo de pertinência (0-10)")
        .default(config.export.min_relevance_score)
        .interact_text()?;

    let formats = [ExportFormat::Chat, ExportFormat::ChatSystem, ExportFormat::Flat];
    let labels: Vec<String> = formats.iter().map(|f| f.to_string()).collect();
    let current = formats
        .iter()
        .position(|f| *f == config.export.format)
        .unwrap_or(0);
    let idx = Select::with_theme(theme)
        .with_prompt("Formato")
        .items(&labels)
        .default(current)
        .interact()?;
    config.export.format = formats[idx];

    let periods = [ExportPeriod::Weekly, ExportPeriod::Monthly, ExportPeriod::All];
    let labels = vec!["Última semana", "Último mês", "Tudo"];
    let current = periods
        .iter()
        .position(|p| *p == config.export.period)
        .unwrap_or(1);
    let idx = Select::with_theme(theme)
        .with_prompt("Período")
        .items(&labels)
        .default(current)
        .interact()?;
    config.export.period = periods[idx];

    let output: String = Input::with_theme(theme)
        .with_prompt("Arquivo de saída")
        .default(config.export.output.display().to_string())
        .interact_text()?;
    config.export.output = output.into();

    println!("\n✓ Exportação configurada.\n");
    Ok(())
}

fn configure_ai(theme: &ColorfulTheme, config: &mut Config) -> FeedloopResult<()> {
    println!("\n🤖 Serviço de IA\n");

    config.ai.enabled = Confirm::with_theme(theme)
        .with_prompt("Habilitar o serviço de IA?")
        .default(config.ai.enabled)
        .interact()?;

    if !config.ai.enabled {
        println!("Serviço de IA desabilitado.\n");
        return Ok(());
    }

    config.ai.command = Input::with_theme(theme)
        .with_prompt("Comando")
        .default(config.ai.command.clone())
        .interact_text()?;

    let args: String = Input::with_theme(theme)
        .with_prompt("Argumentos (separados por espaço)")
        .default(config.ai.args.join(" "))
        .allow_empty(true)
        .interact_text()?;
    config.ai.args = args.split_whitespace().map(String::from).collect();

    config.ai.timeout_secs = Input::with_theme(theme)
        .with_prompt("Timeout (segundos)")
        .default(config.ai.timeout_secs)
        .interact_text()?;

    println!("\n✓ Serviço de IA configurado.\n");
    Ok(())
}

/// Revisão dos patterns ativos: os selecionados são desativados.
pub fn review_patterns(store: &mut KnowledgeStore) -> FeedloopResult<()> {
    let theme = ColorfulTheme::default();
    let patterns = store.active_patterns()?;

    if patterns.is_empty() {
        println!("Nenhum pattern ativo para revisar.");
        return Ok(());
    }

    let now = Utc::now();
    let items: Vec<String> = patterns.iter().map(|p| format_pattern(p, now)).collect();

    let selected = MultiSelect::with_theme(&theme)
        .with_prompt("Selecione os patterns a desativar (espaço marca, enter confirma)")
        .items(&items)
        .interact()?;

    if selected.is_empty() {
        println!("Nenhuma alteração.");
        return Ok(());
    }

    if !Confirm::with_theme(&theme)
        .with_prompt(format!("Desativar {} pattern(s)?", selected.len()))
        .default(true)
        .interact()?
    {
        println!("Revisão cancelada.");
        return Ok(());
    }

    for idx in selected {
        let pattern = store.set_active(patterns[idx].id, false)?;
        println!("  ○ #{} {}", pattern.id, pattern.description);
    }

    Ok(())
}

/// Mostra resumo da configuração.
pub fn show_config_summary(config: &Config) {
    println!("\n📊 Resumo da Configuração\n");
    println!("┌─────────────────────────────────────────┐");
    println!("│ Geral                                   │");
    println!("├─────────────────────────────────────────┤");
    println!("│ Log level: {:<28} │", config.general.log_level);
    println!("│ Banco: {:<32} │", config.store.db_path.display());
    println!("├─────────────────────────────────────────┤");
    println!("│ Mineração                               │");
    println!("├─────────────────────────────────────────┤");
    println!("│ Janela: {:<26} dias │", config.miner.window_days);
    println!("│ Suporte mínimo: {:<23} │", config.miner.min_support);
    println!(
        "│ Frequência: {:<27} │",
        format!("{:?}", config.miner.frequency_policy)
    );
    println!("├─────────────────────────────────────────┤");
    println!("│ Refresh                                 │");
    println!("├─────────────────────────────────────────┤");
    println!("│ Desativação após: {:<16} dias │", config.refresher.staleness_days);
    println!("├─────────────────────────────────────────┤");
    println!("│ Enriquecimento                          │");
    println!("├─────────────────────────────────────────┤");
    println!("│ Frequência mínima: {:<20} │", config.enhancer.min_frequency);
    println!("│ Confiança mínima: {:<21} │", config.enhancer.min_confidence);
    println!("├─────────────────────────────────────────┤");
    println!("│ Exportação                              │");
    println!("├─────────────────────────────────────────┤");
    println!("│ Formato: {:<30} │", config.export.format);
    println!("│ Score mínimo: {:<25} │", config.export.min_relevance_score);
    println!("├─────────────────────────────────────────┤");
    println!("│ Serviço de IA                           │");
    println!("├─────────────────────────────────────────┤");
    println!(
        "│ {} {:<37} │",
        if config.ai.enabled { "✓" } else { "✗" },
        config.ai.command
    );
    println!("└─────────────────────────────────────────┘");
    println!();
}
