use anyhow::Result;
use clap::{Parser, Subcommand};
use quicktrans_common::{available_whisper_models, logger, AppConfig, ModelManager};
use std::path::PathBuf;

/// Find project root by looking for .git directory
fn find_project_root() -> Option<PathBuf> {
    let mut current_dir = std::env::current_dir().ok()?;

    loop {
        if current_dir.join(".git").exists() {
            return Some(current_dir);
        }

        if !current_dir.pop() {
            break;
        }
    }

    None
}

/// Load .env file from project root
fn load_dotenv_from_project_root() {
    if let Some(root) = find_project_root() {
        let env_path = root.join(".env");
        if env_path.exists() {
            dotenv::from_path(&env_path).ok();
        }
    } else {
        dotenv::dotenv().ok();
    }
}

#[derive(Parser)]
#[command(name = "quicktrans")]
#[command(about = "QuickTrans - local transcription and translation service", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(long)]
        port: Option<u16>,

        /// Directory for downloaded models
        #[arg(long)]
        models_dir: Option<PathBuf>,
    },

    /// List known and installed whisper models
    Models {
        /// Directory for downloaded models
        #[arg(long)]
        models_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Loaded before any CLI override is written into the environment
    load_dotenv_from_project_root();

    match cli.command {
        Some(Commands::Serve {
            host,
            port,
            models_dir,
        }) => {
            if let Some(host) = &host {
                std::env::set_var("SERVER_HOST", host);
            }
            if let Some(port) = port {
                std::env::set_var("SERVER_PORT", port.to_string());
            }
            if let Some(dir) = &models_dir {
                std::env::set_var("QUICKTRANS_MODELS_DIR", dir);
            }

            serve(AppConfig::from_env()?).await?;
        }
        Some(Commands::Models { models_dir }) => {
            if let Some(dir) = &models_dir {
                std::env::set_var("QUICKTRANS_MODELS_DIR", dir);
            }
            let config = AppConfig::from_env()?;
            logger::setup_console_logging(&config.log_level)?;

            let installed = ModelManager::new(config.models_dir.clone())?
                .list_installed_models()
                .await?;

            println!("Whisper models in {}:", config.models_dir.display());
            for model in available_whisper_models() {
                let marker = if installed.contains(&model.name) { "*" } else { " " };
                println!(" {} {:<10} {:>7.0} MB", marker, model.name, model.size_mb());
            }
        }
        None => {
            serve(AppConfig::from_env()?).await?;
        }
    }

    Ok(())
}

async fn serve(config: AppConfig) -> Result<()> {
    logger::setup_logging(&config.log_dir, &config.log_level)?;

    tracing::info!("QuickTrans starting...");
    tracing::info!("Configuration loaded:");
    tracing::info!("  Address: {}", config.server_bind_address());
    tracing::info!("  Models: {}", config.models_dir.display());
    tracing::info!("  Whisper model: {}", config.whisper_model);
    tracing::info!("  Translation backend: {}", config.translation_backend.as_str());

    // The desktop app waits for this line on stdout
    println!("Server listening on http://{}", config.server_bind_address());

    quicktrans_server::start_server(config).await?;

    Ok(())
}
