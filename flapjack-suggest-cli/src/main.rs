#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use clap::{Parser, Subcommand};
use flapjack_suggest::{
    EnvConfigProvider, FileConfigProvider, JsonLinesDataProvider, ManagerSettings, SuggestConfig,
    SuggestManager,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "flapjack-suggest", about = "Autocomplete over JSON-lines data files")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory holding `<tenant>.jsonl` record files
    #[arg(long, env = "FLAPJACK_SUGGEST_DATA_DIR", default_value = "./data")]
    data_dir: PathBuf,
    /// Directory holding `<tenant>.json` suggest configs
    #[arg(long, env = "FLAPJACK_SUGGEST_CONFIG_DIR")]
    config_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Print the suggestions for one query as JSON
    Query {
        #[arg(long, short)]
        tenant: String,
        query: String,
        #[arg(long, short, default_value_t = 10)]
        limit: usize,
        /// Tag filter `key=tag1,tag2`, repeatable
        #[arg(long = "filter", value_parser = parse_filter)]
        filters: Vec<(String, String)>,
    },
    /// Answer `tenant<TAB>query` lines from stdin with one JSON line each,
    /// refreshing loaded tenants in the background
    Serve {
        #[arg(long, short, default_value_t = 10)]
        limit: usize,
    },
    /// Load a tenant and print its stats
    Stats {
        #[arg(long, short)]
        tenant: String,
    },
}

fn parse_filter(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, tags)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), tags.trim().to_string()))
        }
        _ => Err(format!("expected key=tag1,tag2, got {:?}", raw)),
    }
}

fn build_manager(cli: &Cli) -> flapjack_suggest::Result<Arc<SuggestManager>> {
    let default_config = SuggestConfig::default();
    let mut builder = SuggestManager::builder()
        .settings(ManagerSettings::from_env())
        .data_provider(Arc::new(JsonLinesDataProvider::new(&cli.data_dir)))
        .config_provider(Arc::new(EnvConfigProvider::from_env(&default_config)));
    if let Some(dir) = &cli.config_dir {
        builder = builder.config_provider(Arc::new(FileConfigProvider::new(dir)));
    }
    builder.default_config(default_config).build()
}

async fn serve_lines(manager: &Arc<SuggestManager>, limit: usize) -> std::io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let no_filters = HashMap::new();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let reply = match line.split_once('\t') {
            Some((tenant, query)) => {
                // first query for a tenant builds its index
                let result = tokio::task::block_in_place(|| {
                    manager.suggest(tenant, query, &no_filters, limit)
                });
                match result {
                    Ok(hits) => serde_json::json!({
                        "tenant": tenant,
                        "query": query,
                        "suggestions": hits,
                    }),
                    Err(e) => serde_json::json!({
                        "tenant": tenant,
                        "query": query,
                        "error": e.to_string(),
                    }),
                }
            }
            None => serde_json::json!({ "error": "expected tenant<TAB>query" }),
        };
        stdout.write_all(format!("{}\n", reply).as_bytes()).await?;
        stdout.flush().await?;
    }
    Ok(())
}

/// Repeated `--filter` flags for one key add to its tag list.
fn merge_filters(filters: Vec<(String, String)>) -> HashMap<String, String> {
    let mut merged: HashMap<String, String> = HashMap::new();
    for (key, value) in filters {
        merged
            .entry(key)
            .and_modify(|tags| {
                tags.push(',');
                tags.push_str(&value);
            })
            .or_insert(value);
    }
    merged
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let manager = build_manager(&cli)?;
    match cli.command {
        Command::Query {
            tenant,
            query,
            limit,
            filters,
        } => {
            let filters = merge_filters(filters);
            let hits = manager.suggest(&tenant, &query, &filters, limit)?;
            println!("{}", serde_json::to_string_pretty(&hits)?);
        }
        Command::Stats { tenant } => {
            manager.suggester(&tenant)?;
            println!("{}", serde_json::to_string_pretty(&manager.stats(&tenant))?);
        }
        Command::Serve { limit } => {
            manager.start();
            tracing::info!("[SERVE] reading queries from stdin");
            serve_lines(&manager, limit).await?;
            manager.shutdown();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
