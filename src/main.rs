//! Command line interface for operating the relay read path. Supports schema
//! initialization, ingesting events, serving the HTTP query endpoint, and
//! explaining how a filter translates to SQL.

mod config;
mod event;
mod filter;
mod query;
mod server;
mod store;

use std::{fs, net::SocketAddr, path::Path, sync::Arc};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};

use config::Settings;
use filter::Filter;
use query::{plan, rebind, Limits, Param, Plan};
use store::PgStore;

/// Command line interface entry point.
#[derive(Parser)]
#[command(name = "sievr", author, version, about = "Postgres-backed Nostr relay read path")]
struct Cli {
    /// Path to the `.env` configuration file.
    #[arg(long, default_value = ".env")]
    env: String,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Create the event table and indexes in the configured database.
    Init,
    /// Ingest one or more event files.
    Ingest {
        /// Paths to JSON event files to ingest.
        #[arg(required = true)]
        files: Vec<String>,
    },
    /// Serve the HTTP query endpoint.
    Serve,
    /// Print the SQL a filter translates to, without touching the store.
    Explain {
        /// Nostr filter as a JSON object, e.g. '{"kinds":[1]}'.
        filter: String,
    },
}

/// Execute the selected CLI subcommand.
async fn run(cli: Cli) -> anyhow::Result<()> {
    ensure_env_file(&cli.env)?;
    let cfg = Settings::from_env(&cli.env)?;
    match cli.command {
        Commands::Explain { filter } => explain(&filter, &cfg.limits)?,
        Commands::Init => {
            let store = PgStore::connect(&cfg.database_url).await?;
            store.init().await?;
        }
        Commands::Ingest { files } => {
            let store = PgStore::connect(&cfg.database_url).await?;
            for f in files {
                let data = fs::read_to_string(&f).with_context(|| format!("reading {f}"))?;
                let ev: event::Event = serde_json::from_str(&data)?;
                if cfg.verify_sig {
                    event::verify(&ev).with_context(|| format!("verifying {f}"))?;
                }
                store.save(&ev).await?;
            }
        }
        Commands::Serve => {
            let store = PgStore::connect(&cfg.database_url).await?;
            store.init().await?;
            let addr: SocketAddr = cfg.bind_http.parse()?;
            server::serve_http(addr, Arc::new(store), cfg.limits, std::future::pending()).await?;
        }
    }
    Ok(())
}

/// Translate a filter and print the query as Postgres would receive it.
fn explain(input: &str, limits: &Limits) -> anyhow::Result<()> {
    let val: serde_json::Value = serde_json::from_str(input).context("parsing filter JSON")?;
    if val.is_null() {
        bail!("filter cannot be null");
    }
    let filter = Filter::from_value(&val);
    match plan(&filter, limits) {
        Plan::Unsatisfiable => println!("matches nothing; the store would not be queried"),
        Plan::Query { sql, params } => {
            println!("{}", rebind(&sql));
            for (i, p) in params.iter().enumerate() {
                match p {
                    Param::Text(s) => println!("${} = {s}", i + 1),
                    Param::Int(n) => println!("${} = {n}", i + 1),
                }
            }
        }
    }
    Ok(())
}

/// Create a default `.env` file if one is not already present at `path`.
fn ensure_env_file(path: &str) -> anyhow::Result<()> {
    let env_path = Path::new(path);
    if env_path.exists() {
        return Ok(());
    }
    if let Some(parent) = env_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut content = String::new();
    content.push_str("DATABASE_URL=postgres://localhost/sievr\n");
    content.push_str("BIND_HTTP=127.0.0.1:7777\n");
    content.push_str("VERIFY_SIG=0\n");
    fs::write(env_path, content)?;
    Ok(())
}

#[cfg(not(test))]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let cli = Cli::parse();
    run(cli).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    fn write_env(dir: &TempDir) -> String {
        let env_path = dir.path().join(".env");
        fs::write(
            &env_path,
            "DATABASE_URL=postgres://localhost/sievr\nBIND_HTTP=127.0.0.1:0\nVERIFY_SIG=0\n",
        )
        .unwrap();
        env_path.to_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn explain_runs_without_a_database() {
        let _g = ENV_MUTEX.lock().unwrap();
        let dir = TempDir::new().unwrap();
        let cli = Cli {
            env: write_env(&dir),
            command: Commands::Explain {
                filter: r#"{"kinds":[1]}"#.into(),
            },
        };
        run(cli).await.unwrap();
    }

    #[tokio::test]
    async fn explain_rejects_null_filter() {
        let _g = ENV_MUTEX.lock().unwrap();
        let dir = TempDir::new().unwrap();
        let cli = Cli {
            env: write_env(&dir),
            command: Commands::Explain {
                filter: "null".into(),
            },
        };
        let err = run(cli).await.unwrap_err();
        assert!(err.to_string().contains("filter cannot be null"));
    }

    #[tokio::test]
    async fn missing_env_file_is_seeded() {
        let _g = ENV_MUTEX.lock().unwrap();
        let dir = TempDir::new().unwrap();
        let env_path = dir.path().join("fresh/.env");
        let cli = Cli {
            env: env_path.to_str().unwrap().to_string(),
            command: Commands::Explain {
                filter: "{}".into(),
            },
        };
        run(cli).await.unwrap();
        let content = fs::read_to_string(&env_path).unwrap();
        assert!(content.contains("DATABASE_URL="));
        assert!(content.contains("BIND_HTTP="));
    }
}
