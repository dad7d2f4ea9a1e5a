use clap::Parser;
use feedloop::cli::commands;
use feedloop::cli::{Cli, Commands, MetricsAction, PatternsAction};
use feedloop::types::config::Config;
use feedloop::FeedloopResult;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> FeedloopResult<()> {
    let cli = Cli::parse();

    // Load configuration first (no logging yet)
    let config = if cli.config.exists() {
        Config::load(&cli.config)?
    } else {
        Config::default_config()
    };

    // CLI flags take precedence over config
    let log_level = if cli.quiet {
        "error".to_string()
    } else if cli.verbose {
        "debug".to_string()
    } else {
        config.general.log_level.clone()
    };

    let filter = EnvFilter::from_default_env().add_directive(
        format!("feedloop={}", log_level)
            .parse()
            .unwrap_or_else(|_| "feedloop=info".parse().expect("fallback directive is valid")),
    );

    if config.general.log_format == "json" {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .init();
    }

    tracing::debug!("Configuration loaded from: {}", cli.config.display());

    match cli.command {
        Commands::Init { path } => commands::init(path).await?,
        Commands::Ingest { file } => commands::ingest(&file, &config).await?,
        Commands::Mine { days } => commands::mine(days, &config).await?,
        Commands::Refresh => commands::refresh(&config).await?,
        Commands::Metrics { action } => match action {
            MetricsAction::Compute { date } => commands::metrics_compute(date, &config).await?,
            MetricsAction::Show { days } => commands::metrics_show(days, &config).await?,
        },
        Commands::Daily => commands::daily(&config).await?,
        Commands::Enhance { age, symptoms } => commands::enhance(age, symptoms, &config).await?,
        Commands::Recommend { patient } => commands::recommend(&patient, &config).await?,
        Commands::Export {
            format,
            period,
            min_score,
            output,
            include_consumed,
        } => {
            commands::export(format, period, min_score, output, include_consumed, &config).await?
        }
        Commands::Patterns { action } => match action {
            PatternsAction::List { all, pattern_type } => {
                commands::patterns_list(all, pattern_type, &config).await?
            }
            PatternsAction::Enable { id } => commands::patterns_toggle(id, true, &config).await?,
            PatternsAction::Disable { id } => commands::patterns_toggle(id, false, &config).await?,
            PatternsAction::Review => commands::patterns_review(&config).await?,
        },
        Commands::Status => commands::status(&config).await?,
        Commands::Config => commands::config_cmd(&cli.config).await?,
        Commands::Version => commands::version(),
    }

    Ok(())
}
