//! Command line frontend for browsing container image registries.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use registry_frontend::{ClientOptions, Registry, RegistryStore, cancellable};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Parser)]
#[command(name = "registry-frontend", version, about = "Browse container image registries")]
struct Cli {
    /// TOML file listing registries and client options
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Name of a registry to add to the configured ones
    #[arg(long, env = "REGISTRY_NAME", global = true)]
    registry_name: Option<String>,

    /// Base URL of that registry
    #[arg(long, env = "REGISTRY_URL", global = true)]
    registry_url: Option<String>,

    /// Basic authentication user for that registry
    #[arg(long, env = "REGISTRY_AUTH_BASIC_USER", global = true)]
    registry_user: Option<String>,

    /// Basic authentication password for that registry
    #[arg(
        long,
        env = "REGISTRY_AUTH_BASIC_PASSWORD",
        hide_env_values = true,
        global = true
    )]
    registry_password: Option<String>,

    /// Deadline for each registry request, in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Log as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show every registry and whether it is reachable
    Registries {
        /// Registries checked at once
        #[arg(long, default_value_t = 4)]
        concurrency: usize,
    },

    /// List the repositories of a registry
    Repos {
        /// Registry name
        registry: String,
    },

    /// List the tags of a repository
    Tags {
        /// Registry name
        registry: String,
        /// Repository name, optionally percent-encoded
        repository: String,
        /// Page size; lists everything when neither this nor --last is given
        #[arg(short = 'n', long, default_value_t = 0)]
        n: usize,
        /// Continue after this tag
        #[arg(long, default_value = "")]
        last: String,
    },

    /// Show the metadata of one tag
    Tag {
        /// Registry name
        registry: String,
        /// Repository name, optionally percent-encoded
        repository: String,
        /// Tag name
        tag: String,
    },

    /// Show the metadata of every tag of a repository
    Overview {
        /// Registry name
        registry: String,
        /// Repository name, optionally percent-encoded
        repository: String,
        /// Tags resolved at once
        #[arg(long, default_value_t = 4)]
        concurrency: usize,
    },

    /// Check that a registry answers on its API root
    Check {
        /// Registry name
        registry: String,
    },
}

/// The `--config` file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    #[serde(rename = "registry")]
    registries: Vec<Registry>,
    client: ClientOptions,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: toml_edit::de::Error,
    },

    #[error(transparent)]
    Registry(#[from] registry_frontend::Error),

    #[error("writing output: {0}")]
    Output(#[from] serde_json::Error),
}

#[derive(Debug, Serialize)]
struct TagPage {
    tags: Vec<String>,
    next: Option<String>,
}

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

fn load_config(path: &PathBuf) -> Result<ConfigFile, CliError> {
    let text = std::fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.clone(),
        source,
    })?;
    toml_edit::de::from_str(&text).map_err(|source| CliError::Config {
        path: path.clone(),
        source,
    })
}

fn build_store(cli: &Cli) -> Result<RegistryStore, CliError> {
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ConfigFile::default(),
    };

    let mut options = config.client;
    if let Some(timeout) = cli.timeout {
        options.timeout = Some(Duration::from_secs(timeout));
    }

    let store = RegistryStore::new(options);
    for registry in config.registries {
        store.add(registry)?;
    }

    if let Some(url) = &cli.registry_url {
        let name = cli.registry_name.as_deref().unwrap_or("default");
        let mut registry = Registry::new(name, url.as_str());
        if cli.registry_user.is_some() || cli.registry_password.is_some() {
            registry = registry.with_basic_auth(
                cli.registry_user.clone().unwrap_or_default(),
                cli.registry_password.clone(),
            );
        }
        store.add(registry)?;
    }

    tracing::debug!(registries = store.len(), "configured registries");
    Ok(store)
}

fn print<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(cli: Cli, token: CancellationToken) -> Result<(), CliError> {
    let store = build_store(&cli)?;

    match cli.command {
        Command::Registries { concurrency } => {
            let overview = tokio::select! {
                biased;
                _ = token.cancelled() => return Err(registry_frontend::Error::Cancelled.into()),
                overview = store.overview(concurrency) => overview,
            };
            print(&overview)
        }
        Command::Repos { registry } => {
            let client = store.client(&registry)?;
            print(&cancellable(&token, client.repositories()).await?)
        }
        Command::Tags {
            registry,
            repository,
            n,
            last,
        } => {
            let client = store.client(&registry)?;
            if n == 0 && last.is_empty() {
                print(&cancellable(&token, client.tags(&repository)).await?)
            } else {
                let page =
                    cancellable(&token, client.tag_list_page(&repository, n, &last)).await?;
                print(&TagPage {
                    next: page.state.cursor().map(str::to_owned),
                    tags: page.items,
                })
            }
        }
        Command::Tag {
            registry,
            repository,
            tag,
        } => {
            let client = store.client(&registry)?;
            print(&cancellable(&token, client.tag(&repository, &tag)).await?)
        }
        Command::Overview {
            registry,
            repository,
            concurrency,
        } => {
            let client = store.client(&registry)?;
            print(&cancellable(&token, client.tag_overview(&repository, concurrency)).await?)
        }
        Command::Check { registry } => {
            let client = store.client(&registry)?;
            cancellable(&token, client.check()).await?;
            print(&serde_json::json!({ "registry": client.name(), "online": true }))
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    let token = CancellationToken::new();
    let interrupt = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted, cancelling");
            interrupt.cancel();
        }
    });

    match run(cli, token).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(%error, "command failed");
            ExitCode::FAILURE
        }
    }
}
