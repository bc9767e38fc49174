use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use botlens_analytics::{evaluate_utterance, StubAnalyzer, TextAnalyticsClient, TextAnalyzer};
use botlens_core::*;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod replay;

#[derive(Parser)]
#[command(name = "botlens", version, about = "Conversational bot telemetry toolkit")]
struct Cli {
    #[arg(long, global = true, help = "Also write daily rolling logs to this directory")]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Validate a telemetry config file")]
    Validate {
        #[arg(long, short = 'c', help = "Path to the YAML config")]
        config: PathBuf,
    },
    #[command(about = "Replay recorded turns through the telemetry middleware")]
    Replay {
        #[arg(long, short = 'c', help = "Path to the YAML config")]
        config: PathBuf,
        #[arg(long, help = "JSON lines file, one turn per line")]
        turns: PathBuf,
        #[arg(long, value_enum, default_value_t = SinkKind::Tracing, help = "Where telemetry goes")]
        sink: SinkKind,
        #[arg(long, help = "Use the offline analyzer instead of Text Analytics")]
        stub_analyzer: bool,
    },
    #[command(about = "Run text analysis on one utterance and print the result")]
    Analyze {
        #[arg(long, short = 'c', help = "Path to the YAML config")]
        config: PathBuf,
        #[arg(long, help = "Use the offline analyzer instead of Text Analytics")]
        stub_analyzer: bool,
        text: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SinkKind {
    Tracing,
    Ingestion,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (file_layer, _guard) = match &cli.log_dir {
        Some(log_dir) => {
            std::fs::create_dir_all(log_dir)?;
            let file_appender = tracing_appender::rolling::daily(log_dir, "botlens.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(non_blocking);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    match command {
        Commands::Validate { config } => {
            let config = load_config(&config)?;
            println!(
                "Config valid. original messages: {}, user names: {}, text analysis: {} (threshold {} words).",
                on_off(config.log_original_messages),
                on_off(config.log_user_name),
                on_off(config.analysis_enabled()),
                config.sentiment_word_threshold,
            );
        }
        Commands::Replay {
            config,
            turns,
            sink,
            stub_analyzer,
        } => {
            let config = load_config(&config)?;
            let turns = replay::load_turns(&turns)?;
            let sink: Arc<dyn TelemetrySink> = match sink {
                SinkKind::Tracing => Arc::new(TracingSink),
                SinkKind::Ingestion => Arc::new(IngestionSink::new(
                    config.app_insights_key.clone(),
                    config.ingestion_endpoint.clone(),
                )),
            };
            let analyzer = build_analyzer(&config, stub_analyzer);
            let telemetry = Arc::new(TurnTelemetry::with_analyzer(config, sink, analyzer)?);

            let mut pipeline = MiddlewareSet::new();
            pipeline.use_middleware(Arc::new(ConversationalTelemetryMiddleware::new(telemetry)));

            tracing::info!(turns = turns.len(), "replaying turns");
            let replayed = replay::replay(&pipeline, turns).await?;
            println!("Replayed {replayed} turn(s).");
        }
        Commands::Analyze {
            config,
            stub_analyzer,
            text,
        } => {
            let config = load_config(&config)?;
            let analyzer = build_analyzer(&config, stub_analyzer);
            let result = evaluate_utterance(analyzer.as_ref(), &text).await;
            if let Some(failure) = &result.failure {
                tracing::warn!(stage = %failure.stage, "analysis stopped early: {}", failure.message);
            }
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }

    Ok(())
}

fn build_analyzer(config: &TelemetryConfig, stub: bool) -> Arc<dyn TextAnalyzer> {
    if stub {
        tracing::info!("using offline stub analyzer");
        return Arc::new(StubAnalyzer);
    }
    Arc::new(TextAnalyticsClient::new(
        config.text_analytics_key.clone(),
        config.text_analytics_endpoint.clone(),
    ))
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}
