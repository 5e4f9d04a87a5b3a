mod account_commands;
mod index_commands;
mod runtime;

use std::path::{Path, PathBuf};

use {
    clap::{Parser, Subcommand},
    mailsage_config::MailsageConfig,
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "mailsage", about = "Mailsage: per-account email search index")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file to load instead of discovering one.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Account registration.
    Accounts {
        #[command(subcommand)]
        action: account_commands::AccountAction,
    },
    /// Index management and search.
    Index {
        #[command(subcommand)]
        action: index_commands::IndexAction,
    },
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as TOML, with secrets redacted.
    Show,
    /// Write a default config file to `--config` or the standard location.
    Init,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr)
                    .with_ansi(true),
            )
            .init();
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<MailsageConfig> {
    match path {
        Some(path) => mailsage_config::load_config(path),
        None => Ok(mailsage_config::discover_and_load()),
    }
}

/// Write defaults without loading, so `${VAR}` placeholders are never
/// expanded onto disk.
fn init_config(path: Option<&Path>) -> anyhow::Result<()> {
    let path = path.map_or_else(mailsage_config::find_or_default_config_path, Path::to_path_buf);
    if mailsage_config::init_config_file(&path)? {
        println!("Wrote {}", path.display());
    } else {
        println!("{} already exists, left unchanged", path.display());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "mailsage starting");
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Accounts { action } => {
            account_commands::handle_accounts(action, &load_config(config_path)?).await
        },
        Commands::Index { action } => {
            index_commands::handle_index(action, &load_config(config_path)?).await
        },
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let config = load_config(config_path)?;
                print!("{}", toml::to_string_pretty(&config.redacted())?);
                Ok(())
            },
            ConfigAction::Init => init_config(config_path),
        },
    }
}
