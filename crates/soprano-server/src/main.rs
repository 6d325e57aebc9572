use clap::Parser;
use std::path::PathBuf;

use soprano_server::logging::init_logging;
use soprano_server::{run_server, ServerConfig};

#[derive(Parser, Debug, Clone)]
#[command(name = "soprano-server")]
#[command(about = "Tony Soprano persona LLM server")]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(long, env = "DEBUG", default_value = "false")]
    debug: bool,

    /// Config file (defaults to ~/.soprano/config.toml)
    #[arg(long, env = "SOPRANO_CONFIG")]
    config: Option<PathBuf>,

    /// Bind address
    #[arg(long)]
    host: Option<String>,

    /// Server port
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// llama.cpp server base URL
    #[arg(long, env = "LLM_BASE_URL")]
    backend_url: Option<String>,

    /// Model name reported in logs and /health
    #[arg(long, env = "LLM_MODEL")]
    model: Option<String>,

    /// Log level (overrides debug flag)
    #[arg(long, env = "RUST_LOG")]
    log_level: Option<String>,
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.log_level.is_some() {
        env_logger::init();
    } else {
        init_logging(cli.debug);
    }

    let mut config = ServerConfig::load(cli.config.as_deref())?;
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(url) = cli.backend_url {
        config.backend_url = url;
    }
    if let Some(model) = cli.model {
        config.model_name = model;
    }

    if cli.debug {
        log::debug!("Server configuration: {:?}", config);
    }

    run_server(config).await?;
    Ok(())
}
