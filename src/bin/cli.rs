//! coderunner CLI
//!
//! Serve the HTTP API, run a single file, or inspect the configuration.

use clap::{Parser, Subcommand};
use console::style;
use coderunner::config::{config_path, save_config, validate_config};
use coderunner::{server, Config, Engine, Error, VERSION};
use std::io::Read;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "coderunner",
    version = VERSION,
    about = "Run untrusted code snippets in throwaway containers",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Address to bind (overrides config)
        #[arg(long)]
        bind: Option<String>,
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Execute a source file (or `-` for stdin)
    Run {
        /// Language identifier, e.g. python3
        language: String,
        /// Path to the source file
        file: PathBuf,
    },

    /// List configured languages
    Languages,

    /// Validate the configuration
    CheckConfig,

    /// Write the default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long, short)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "coderunner=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { bind, port } => serve(bind, port).await,
        Commands::Run { language, file } => run_file(&language, &file).await,
        Commands::Languages => list_languages(),
        Commands::CheckConfig => check_config(),
        Commands::InitConfig { force } => init_config(force),
    }
}

async fn serve(bind: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let mut config = Config::from_env()?;
    if let Some(bind) = bind {
        config.server.bind = bind;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let engine = Arc::new(Engine::from_config(&config).await?);
    let app = server::build_router(engine);

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn run_file(language: &str, file: &Path) -> anyhow::Result<()> {
    let code = if file == Path::new("-") {
        let mut code = String::new();
        std::io::stdin().read_to_string(&mut code)?;
        code
    } else {
        std::fs::read_to_string(file)?
    };

    let config = Config::from_env()?;
    let engine = Engine::from_config(&config).await?;

    match engine.execute(&code, language).await {
        Ok(lines) => {
            for line in lines {
                println!("{}", line);
            }
            Ok(())
        }
        Err(e) => {
            for line in e.output_lines() {
                println!("{}", line);
            }
            eprintln!("{} {}", style("error:").red().bold(), e);
            std::process::exit(exit_code(&e));
        }
    }
}

fn exit_code(error: &Error) -> i32 {
    match error {
        Error::UnknownLanguage(_) => 2,
        Error::Timeout { .. } => 124,
        _ => 1,
    }
}

fn list_languages() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    for (id, language) in &config.languages {
        let mut line = format!(
            "{:<10} .{:<6} {:<16} {:>5}s  {}",
            id,
            language.extension,
            language.image,
            language.max_duration.as_secs(),
            language.command.join(" ")
        );
        if let Some(next) = &language.next_stage {
            line.push_str(&format!("  -> {}", next));
        }
        println!("{}", line);
    }
    Ok(())
}

fn check_config() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let result = validate_config(&config);

    for issue in &result.errors {
        println!("{} {}", style("error").red().bold(), issue);
    }
    for issue in &result.warnings {
        println!("{} {}", style("warning").yellow(), issue);
    }

    if result.valid {
        println!("{}", style("Configuration OK").green());
        Ok(())
    } else {
        anyhow::bail!("{} configuration error(s)", result.errors.len())
    }
}

fn init_config(force: bool) -> anyhow::Result<()> {
    let path = config_path();
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists. Use --force to overwrite.",
            path.display()
        );
    }

    save_config(&Config::default(), &path)?;
    println!("{} Wrote {}", style("✓").green(), path.display());
    Ok(())
}
