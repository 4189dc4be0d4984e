//! CLI entry point for graphqa.

use clap::{Parser, Subcommand};
use tokio::io::BufReader;
use tracing_subscriber::{fmt, EnvFilter};

use graphqa_core::AppConfig;
use graphqa_graph::{GraphConfig, GraphConnection, Neo4jGraph};

use graphqa_answer::inspect::{inspect, DEFAULT_KEYWORDS};
use graphqa_answer::{AnswerPipeline, OllamaClient};

#[derive(Parser)]
#[command(name = "graphqa")]
#[command(about = "Answer questions grounded in a Neo4j knowledge graph")]
struct Cli {
    /// Config file prefix (default: graphqa).
    #[arg(short, long, default_value = "graphqa")]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive question loop (default).
    Ask,

    /// Report labels, sample nodes, keyword hits, and relationship types.
    Inspect {
        /// Keywords searched in entity names (comma-separated).
        #[arg(short, long, value_delimiter = ',')]
        keywords: Vec<String>,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Containment search over one label and property.
    Search {
        #[arg(short, long)]
        label: String,

        #[arg(short, long, default_value = "name")]
        property: String,

        #[arg(short, long)]
        keyword: String,

        #[arg(short = 'n', long, default_value_t = 10)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(&cli.config)?;

    // A graph that cannot be reached is fatal to the whole run.
    let graph_config = GraphConfig::from(config.neo4j.clone());
    let mut graph = GraphConnection::new(Neo4jGraph::connect(&graph_config).await?);

    match cli.command.unwrap_or(Command::Ask) {
        Command::Ask => {
            let inference = match OllamaClient::from_settings(&config.llm) {
                Ok(client) => client,
                Err(e) => {
                    graph.close().await;
                    return Err(e.into());
                }
            };
            tracing::info!(url = inference.url(), model = inference.model(), "Inference client ready");

            println!("Welcome to the graph-grounded Q&A console.");
            let mut pipeline = AnswerPipeline::new(graph, inference, config.retrieval);
            pipeline
                .run(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
                .await?;
        }
        Command::Inspect { keywords, json } => {
            let result = if keywords.is_empty() {
                inspect(
                    &graph,
                    DEFAULT_KEYWORDS,
                    config.retrieval.sample_limit,
                    config.retrieval.keyword_limit,
                )
                .await
            } else {
                inspect(
                    &graph,
                    &keywords,
                    config.retrieval.sample_limit,
                    config.retrieval.keyword_limit,
                )
                .await
            };
            graph.close().await;

            let report = result?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report.render());
            }
        }
        Command::Search {
            label,
            property,
            keyword,
            limit,
        } => {
            let result = graph
                .search_contains(&label, &property, &keyword, &[property.as_str()], limit)
                .await;
            graph.close().await;

            let facts = result?;
            if facts.is_empty() {
                println!("No {label} nodes with {property} containing '{keyword}'");
            }
            for fact in &facts {
                println!("{}", fact.get(&property).map(ToString::to_string).unwrap_or_default());
            }
        }
    }

    Ok(())
}
