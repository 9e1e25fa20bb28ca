//! Swarm CLI - learned task distribution over a broker mesh.

mod workload;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use swarm_broker::{Coordinator, RunSummary, SelectorKind};
use swarm_core::{SwarmConfig, TracingSink};
use swarm_executor::ExecutorPool;
use swarm_graph::ConnectivityGraph;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::workload::WorkloadSize;

const EXECUTOR_SEED_SALT: u64 = 7;
const COMPARISON_CAPACITIES: [usize; 4] = [8, 10, 12, 9];

#[derive(Parser)]
#[command(name = "swarm")]
#[command(about = "Learned, decentralized task distribution", long_about = None)]
struct Cli {
    /// Configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process a synthetic workload
    Run {
        /// Number of tasks
        #[arg(long, default_value = "20")]
        tasks: usize,
        /// Seed for every random component
        #[arg(long)]
        seed: Option<u64>,
        /// Selection strategy
        #[arg(long, value_enum, default_value = "spsa")]
        strategy: Strategy,
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Compare SPSA brokers against round-robin brokers
    Compare {
        /// Workload size
        #[arg(long, value_enum, default_value = "medium")]
        workload: WorkloadSize,
        /// Seed for every random component
        #[arg(long)]
        seed: Option<u64>,
        /// Print both summaries as JSON
        #[arg(long)]
        json: bool,
    },
    /// Build a connectivity graph and tick it
    Graph {
        /// Number of brokers (defaults to the configured count)
        #[arg(long)]
        brokers: Option<usize>,
        /// Maintenance ticks to run
        #[arg(long, default_value = "10")]
        ticks: usize,
        /// Seed
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Show the effective configuration
    Config {
        /// Write it to this file
        #[arg(long)]
        write: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Strategy {
    Spsa,
    RoundRobin,
}

impl From<Strategy> for SelectorKind {
    fn from(strategy: Strategy) -> Self {
        match strategy {
            Strategy::Spsa => SelectorKind::Spsa,
            Strategy::RoundRobin => SelectorKind::RoundRobin,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    let mut config = match &cli.config {
        Some(path) => SwarmConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => SwarmConfig::default(),
    };

    match cli.command {
        Commands::Run {
            tasks,
            seed,
            strategy,
            json,
        } => {
            if seed.is_some() {
                config.system.seed = seed;
            }
            let pool = ExecutorPool::uniform(
                "executor",
                config.system.num_executors,
                config.system.executor_capacity,
                config.component_seed(EXECUTOR_SEED_SALT),
            );
            let summary = run_workload(&config, &pool, strategy.into(), workload::generate(tasks)).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("{summary}");
                for (id, stats) in pool.stats().await {
                    println!(
                        "  {}: {} tasks, {:.1}% success, {:.2}s avg, {:.0} units avg",
                        id,
                        stats.total_tasks,
                        stats.success_rate() * 100.0,
                        stats.average_time(),
                        stats.average_units()
                    );
                }
            }
        }
        Commands::Compare { workload, seed, json } => {
            if seed.is_some() {
                config.system.seed = seed;
            }
            let tasks = workload::generate(workload.task_count());
            let mut summaries = Vec::new();
            for kind in [SelectorKind::Spsa, SelectorKind::RoundRobin] {
                let pool = ExecutorPool::with_capacities(
                    "executor",
                    &COMPARISON_CAPACITIES,
                    config.component_seed(EXECUTOR_SEED_SALT),
                );
                info!("running {} test over {} tasks", kind, tasks.len());
                summaries.push((kind, run_workload(&config, &pool, kind, tasks.clone()).await?));
            }

            if json {
                let rendered: Vec<&RunSummary> = summaries.iter().map(|(_, s)| s).collect();
                println!("{}", serde_json::to_string_pretty(&rendered)?);
            } else {
                print_comparison(&summaries);
            }
        }
        Commands::Graph { brokers, ticks, seed } => {
            let n = brokers.unwrap_or(config.system.num_brokers);
            let mut graph = ConnectivityGraph::new(n, config.graph.clone(), seed.or(config.system.seed))?;
            if !graph.under_connected().is_empty() {
                warn!("under-connected brokers: {:?}", graph.under_connected());
            }
            println!("{graph}");
            println!();

            for t in 1..=ticks {
                let report = graph.tick()?;
                let mutation = report
                    .mutation
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| "no mutation".to_string());
                println!(
                    "tick {t:>3}: {mutation:<32} edges {} avg degree {:.2} density {:.2} components {}",
                    report.stats.edges, report.stats.average_degree, report.stats.density, report.stats.components
                );
            }
            if ticks > 0 {
                println!();
                println!("{graph}");
            }
        }
        Commands::Config { write } => {
            config.validate()?;
            println!("{}", config.to_json_pretty()?);
            if let Some(path) = write {
                config.save(&path)?;
                info!("configuration written to {}", path.display());
            }
        }
    }

    Ok(())
}

async fn run_workload(
    config: &SwarmConfig,
    pool: &ExecutorPool,
    kind: SelectorKind,
    tasks: Vec<swarm_core::Task>,
) -> Result<RunSummary> {
    let mut coordinator =
        Coordinator::from_config(config, pool.handles(), kind)?.with_telemetry(Arc::new(TracingSink));
    let summary = coordinator.run(tasks).await?;
    Ok(summary)
}

fn print_comparison(summaries: &[(SelectorKind, RunSummary)]) {
    println!("{:<24}{:>14}{:>18}{:>16}", "Algorithm", "Success rate", "Avg exec time", "Load variance");
    for (kind, summary) in summaries {
        println!(
            "{:<24}{:>13.1}%{:>17.3}s{:>16.3}",
            kind.to_string(),
            summary.success_rate * 100.0,
            summary.mean_execution_time,
            summary.executor_load_variance
        );
    }

    if let [(_, spsa), (_, rr)] = summaries {
        println!();
        println!(
            "Success rate:  {:+.1} points",
            (spsa.success_rate - rr.success_rate) * 100.0
        );
        if rr.mean_execution_time > 0.0 {
            println!(
                "Exec time:     {:+.1}%",
                (rr.mean_execution_time - spsa.mean_execution_time) / rr.mean_execution_time * 100.0
            );
        }
        println!(
            "Load variance: {:+.3}",
            rr.executor_load_variance - spsa.executor_load_variance
        );
    }
}
