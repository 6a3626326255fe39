use brand_sentiment::{Config, Credentials, Pipeline, PipelineError, Stage};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const DISCLAIMER: &str = "This tool queries the YouTube Data API and a generative-AI service. \
Respect YouTube's Terms of Service and creators' rights: downloaded media is for research only \
and is deleted after the report is generated.";

#[derive(Parser)]
#[command(name = "brand-sentiment")]
#[command(version, author = "TigreRoll")]
#[command(about = "YouTube brand-sentiment research pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to brand-sentiment.toml or config/brand-sentiment.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one pipeline stage, or `all` of them in order
    Run {
        #[arg(value_enum)]
        stage: Stage,
    },
    /// Keep only discovered videos whose video file was downloaded
    Prune,
    /// Inspect or create configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Write a configuration file with default values
    Init {
        /// Where to write the file
        path: PathBuf,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref());
    let directive = config
        .as_ref()
        .map(|c| c.output.log_directive())
        .unwrap_or_else(|_| "brand_sentiment=info,warn".to_string());
    init_logging(&directive, cli.verbose);

    match execute(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("❌ {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config, PipelineError> {
    let mut config = match path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    config.apply_env_overrides(|key| std::env::var(key).ok());
    Ok(config)
}

fn init_logging(directive: &str, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("brand_sentiment=debug,info")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(directive))
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn execute(command: Commands, config: Result<Config, PipelineError>) -> Result<(), PipelineError> {
    match command {
        Commands::Config {
            action: ConfigAction::Init { path },
        } => {
            if path.exists() {
                return Err(PipelineError::Configuration(format!(
                    "{} already exists",
                    path.display()
                )));
            }
            Config::default().save(&path)
        }

        Commands::Config {
            action: ConfigAction::Show,
        } => {
            let config = config?;
            info!("{}", config.summary());
            Ok(())
        }

        Commands::Run { stage } => {
            let pipeline = build_pipeline(config?)?;
            let started = std::time::Instant::now();
            pipeline.run(stage).await?;
            info!("🎉 `{}` completed in {:.1}s", stage, started.elapsed().as_secs_f64());
            Ok(())
        }

        Commands::Prune => {
            let pipeline = build_pipeline(config?)?;
            pipeline.run(Stage::Prune).await?;
            Ok(())
        }
    }
}

fn build_pipeline(config: Config) -> Result<Pipeline, PipelineError> {
    warn!("⚠️  {}", DISCLAIMER);
    let credentials = Credentials::from_env(&config.llm);
    Pipeline::new(config, credentials)
}
