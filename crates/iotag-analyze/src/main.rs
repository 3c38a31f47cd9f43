//! CLI entry point for the iotag attack-graph analyzer.
//!
//! Loads the vertex and arc tables, runs the requested analysis and writes a
//! JSON result to stdout. Logs go to stderr.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{fmt, EnvFilter};

use iotag_analyze::AnalysisEngine;
use iotag_core::config::load_analysis_config;
use iotag_core::NodeId;

#[derive(Parser)]
#[command(name = "iotag-analyze")]
#[command(about = "Shortest-trace and blast-radius analysis of IoT attack graphs")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Config file prefix (default: iotag).
    #[arg(short, long, default_value = "iotag", global = true)]
    config: String,

    /// Indent JSON output.
    #[arg(long, global = true)]
    pretty: bool,
}

#[derive(Args)]
struct GraphArgs {
    /// Vertex table (id, description, kind, probability).
    #[arg(long)]
    vertices: PathBuf,
    /// Arc table (destination, source, metadata).
    #[arg(long)]
    arcs: PathBuf,
}

#[derive(Subcommand)]
enum Command {
    /// Shortest trace to a node (default: every goal node).
    Trace {
        #[command(flatten)]
        graph: GraphArgs,
        /// Node id to trace.
        #[arg(long)]
        node: Option<u64>,
        /// Print indented trace trees instead of JSON.
        #[arg(long)]
        render: bool,
    },
    /// Exclusive blast radius of every vulnerability.
    BlastRadius {
        #[command(flatten)]
        graph: GraphArgs,
    },
    /// Summary statistics of the graph.
    Stats {
        #[command(flatten)]
        graph: GraphArgs,
    },
    /// Every analysis at once.
    Report {
        #[command(flatten)]
        graph: GraphArgs,
    },
}

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let config = load_analysis_config(&cli.config)?;

    match cli.command {
        Command::Trace {
            ref graph,
            node,
            render,
        } => {
            let engine = load_engine(graph, config)?;
            let traces = match node {
                Some(id) => vec![engine.shortest_trace(NodeId(id))?],
                None => engine.goal_traces()?,
            };
            if render {
                for t in &traces {
                    println!("# {} (depth {})", t.node_id, t.depth);
                    print!("{}", t.trace.render(engine.graph()));
                }
            } else {
                emit(&traces, cli.pretty)?;
            }
        }
        Command::BlastRadius { ref graph } => {
            let engine = load_engine(graph, config)?;
            emit(&engine.blast_radius()?, cli.pretty)?;
        }
        Command::Stats { ref graph } => {
            let engine = load_engine(graph, config)?;
            emit(&engine.stats(), cli.pretty)?;
        }
        Command::Report { ref graph } => {
            let engine = load_engine(graph, config)?;
            emit(&engine.report()?, cli.pretty)?;
        }
    }

    Ok(())
}

fn load_engine(args: &GraphArgs, config: iotag_core::AnalysisConfig) -> anyhow::Result<AnalysisEngine> {
    let engine = AnalysisEngine::load(&args.vertices, &args.arcs)?.with_config(config);
    Ok(engine)
}

fn emit<T: Serialize>(value: &T, pretty: bool) -> anyhow::Result<()> {
    let out = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{out}");
    Ok(())
}
