// crates/jobcli/src/main.rs

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use jobcore::{DedupSnapshot, ExecutionEvent, NodeEvent};
use jobnodes::model::DocumentHandle;
use jobnodes::{
    build_graph, Adapters, ApifyConfig, JobSearchPipeline, LlmConfig, PipelineConfig,
    PipelineRequest, SqliteStore,
};
use jobruntime::RuntimeConfig;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "jobmatch")]
#[command(about = "Search job listings and score them against a resume", long_about = None)]
struct Cli {
    /// Debug-level logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline once and print the results as JSON
    Run {
        /// Free-text job query
        #[arg(short, long)]
        query: String,

        /// Resume as a PDF, or a UTF-8 text file with pages separated by form feeds
        #[arg(short, long)]
        resume: PathBuf,

        /// Dedup snapshot from an earlier run; listings in it are skipped
        #[arg(long)]
        seen: Option<PathBuf>,

        /// Write this run's dedup snapshot here
        #[arg(long)]
        save_seen: Option<PathBuf>,

        /// SQLite database for storing results
        #[arg(long)]
        store: Option<PathBuf>,

        /// Upper bound on nodes running at once
        #[arg(long, default_value_t = 16)]
        max_parallel: usize,

        #[command(flatten)]
        services: ServiceArgs,
    },

    /// Print the validated pipeline topology
    Graph,
}

#[derive(Args)]
struct ServiceArgs {
    #[arg(long, env = "LLM_BASE_URL", default_value = jobnodes::config::DEFAULT_LLM_BASE_URL)]
    llm_base_url: String,

    #[arg(long, env = "LLM_MODEL", default_value = jobnodes::config::DEFAULT_LLM_MODEL)]
    llm_model: String,

    #[arg(long, env = "LLM_API_KEY", hide_env_values = true)]
    llm_api_key: Option<String>,

    #[arg(long, env = "APIFY_TOKEN", hide_env_values = true)]
    apify_token: Option<String>,

    #[arg(long, env = "APIFY_ACTOR_NAME")]
    apify_actor: Option<String>,

    /// Seconds to wait for the listing scrape before reading what it has
    #[arg(long, default_value_t = 60)]
    wait_secs: u64,

    /// Seconds between scrape status polls
    #[arg(long, default_value_t = 5)]
    poll_secs: u64,
}

impl ServiceArgs {
    fn into_config(self, store_path: Option<PathBuf>) -> PipelineConfig {
        PipelineConfig {
            llm: LlmConfig {
                base_url: self.llm_base_url,
                model: self.llm_model,
                api_key: self.llm_api_key,
            },
            apify: ApifyConfig {
                token: self.apify_token,
                actor: self.apify_actor,
                wait_budget: Duration::from_secs(self.wait_secs),
                poll_interval: Duration::from_secs(self.poll_secs),
                ..ApifyConfig::default()
            },
            store_path,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            query,
            resume,
            seen,
            save_seen,
            store,
            max_parallel,
            services,
        } => {
            let config = services.into_config(store);
            let runtime = RuntimeConfig {
                max_parallel_nodes: max_parallel,
                ..RuntimeConfig::default()
            };
            run_pipeline(config, runtime, query, resume, seen, save_seen).await?;
        }

        Commands::Graph => {
            print_graph()?;
        }
    }

    Ok(())
}

async fn run_pipeline(
    config: PipelineConfig,
    runtime: RuntimeConfig,
    query: String,
    resume: PathBuf,
    seen: Option<PathBuf>,
    save_seen: Option<PathBuf>,
) -> Result<()> {
    let prior = match &seen {
        Some(path) => load_snapshot(path)?,
        None => DedupSnapshot::new(),
    };

    let mut pipeline = JobSearchPipeline::new(Adapters::from_config(&config), runtime)?;
    if let Some(path) = &config.store_path {
        let store = SqliteStore::open(path)
            .with_context(|| format!("opening result store {}", path.display()))?;
        pipeline = pipeline.with_persistence(Arc::new(store));
    }

    let mut events = pipeline.runtime().subscribe_events();
    let event_task = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            print_event(event);
        }
    });

    let request = PipelineRequest::new(query, DocumentHandle::new(resume)).with_seen(prior);
    let outcome = pipeline.run(request).await;

    // let the listener drain what is already queued
    tokio::time::sleep(Duration::from_millis(100)).await;
    event_task.abort();

    match outcome {
        Ok(output) => {
            if let Some(path) = &save_seen {
                save_snapshot(path, &output.dedup)?;
            }
            if let Some(warning) = &output.storage_warning {
                eprintln!("⚠️  results were not stored: {warning}");
            }
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Err(failure) => {
            if let Some(path) = &save_seen {
                save_snapshot(path, &failure.dedup)?;
            }
            let report = json!({
                "status": "failed",
                "node": &failure.node,
                "error": failure.error.to_string(),
                "state": failure.state.to_json(),
                "dedup": &failure.dedup,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
            eprintln!("💥 {failure}");
            std::process::exit(1);
        }
    }
}

fn print_event(event: ExecutionEvent) {
    match event {
        ExecutionEvent::RunStarted { run_id, nodes, .. } => {
            eprintln!("▶️  Run {run_id} started ({nodes} nodes)");
        }
        ExecutionEvent::NodeStarted { node, .. } => {
            eprintln!("  ⚡ {node}");
        }
        ExecutionEvent::NodeCompleted {
            node,
            fields,
            duration_ms,
            ..
        } => {
            eprintln!("  ✅ {node} wrote [{}] in {duration_ms}ms", fields.join(", "));
        }
        ExecutionEvent::NodeFailed { node, error, .. } => {
            eprintln!("  ❌ {node} failed: {error}");
        }
        ExecutionEvent::NodeEvent { node, event, .. } => match event {
            NodeEvent::Info { message } => eprintln!("     ℹ️  [{node}] {message}"),
            NodeEvent::Warning { message } => eprintln!("     ⚠️  [{node}] {message}"),
            NodeEvent::Progress { done, total } => eprintln!("     📊 [{node}] {done}/{total}"),
        },
        ExecutionEvent::RunFinished {
            success,
            duration_ms,
            ..
        } => {
            if success {
                eprintln!("✨ Run completed in {duration_ms}ms");
            } else {
                eprintln!("💥 Run failed after {duration_ms}ms");
            }
        }
    }
}

fn print_graph() -> Result<()> {
    let graph = build_graph(&Adapters::from_config(&PipelineConfig::default()))?;

    println!("📋 Pipeline: {} nodes", graph.len());
    for name in graph.topological_order() {
        let after = graph.predecessors(name);
        if after.is_empty() {
            println!("  • {name}");
        } else {
            println!("  • {name} ← {}", after.join(", "));
        }
    }
    let joins = graph.join_points();
    if !joins.is_empty() {
        println!();
        println!("🔀 Join points: {}", joins.join(", "));
    }
    Ok(())
}

fn load_snapshot(path: &Path) -> Result<DedupSnapshot> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading dedup snapshot {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing dedup snapshot {}", path.display()))
}

fn save_snapshot(path: &Path, snapshot: &DedupSnapshot) -> Result<()> {
    std::fs::write(path, serde_json::to_string_pretty(snapshot)?)
        .with_context(|| format!("writing dedup snapshot {}", path.display()))
}
