use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::Write;
use tracing_subscriber::EnvFilter;

use coderag::assistant::{unique_sources, Assistant};
use coderag::config::Config;
use coderag::ingest;
use coderag::llm::{embedder_from_config, generator_from_config, reranker_from_config};
use coderag::search::Retriever;
use coderag::workspace::WorkspaceStore;

#[derive(Parser)]
#[command(name = "coderag", about = "Chat with your codebase", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Clone/load and index one or more repositories
    Index {
        /// Git URLs or local directories
        sources: Vec<String>,
        /// Save the session under this workspace name
        #[arg(long)]
        workspace: Option<String>,
    },
    /// Run one hybrid search query against the index
    Search {
        query: String,
        /// Maximum results to print
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Interactive chat grounded in the indexed code
    Ask,
    /// List saved workspaces
    Workspaces,
    /// Delete a saved workspace
    DeleteWorkspace { name: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    let cli = Cli::parse();

    let client = reqwest::Client::builder()
        .connect_timeout(std::time::Duration::from_secs(10))
        .timeout(std::time::Duration::from_secs(120))
        .build()?;

    match cli.command {
        Command::Index { sources, workspace } => {
            if sources.is_empty() {
                anyhow::bail!("Provide at least one git URL or local directory");
            }
            let embedder = embedder_from_config(&client, &config.llm)?;
            let index_set = ingest::ingest(&sources, &config, embedder).await?;
            println!(
                "Indexed {} chunks ({} lexical, vector store at {})",
                index_set.vector.len(),
                index_set.lexical.as_ref().map_or(0, |l| l.len()),
                config.vector_store_path().display()
            );

            if let Some(name) = workspace {
                let store = WorkspaceStore::open(&config.workspace_db_path())?;
                store.save(&name, &sources)?;
                println!("Saved workspace '{name}'");
            }
        }

        Command::Search { query, limit } => {
            let retriever = build_retriever(&client, &config)?;
            let results = retriever.retrieve(&query).await?;
            let limit = limit.unwrap_or(results.len());

            if results.is_empty() {
                println!("No results.");
            }
            for result in results.iter().take(limit) {
                println!(
                    "{:>2}. {:.4}  {} (chunk {}/{}) [{}]",
                    result.final_rank,
                    result.final_score,
                    result.chunk.source_path,
                    result.chunk.chunk_index + 1,
                    result.chunk.total_chunks,
                    result.chunk.language,
                );
            }
        }

        Command::Ask => {
            let retriever = build_retriever(&client, &config)?;
            let generator = generator_from_config(&client, &config.llm)?;
            let mut assistant = Assistant::new(retriever, generator);

            println!("Ask about your code. Empty line or Ctrl-D to exit.");
            let stdin = std::io::stdin();
            loop {
                print!("> ");
                std::io::stdout().flush()?;

                let mut question = String::new();
                if stdin.read_line(&mut question)? == 0 {
                    break;
                }
                let question = question.trim();
                if question.is_empty() {
                    break;
                }

                match assistant.ask(question).await {
                    Ok((answer, sources)) => {
                        println!("\n{answer}\n");
                        let paths = unique_sources(&sources);
                        if !paths.is_empty() {
                            println!("Sources: {}\n", paths.join(" | "));
                        }
                    }
                    Err(e) => eprintln!("Error: {e:#}"),
                }
            }
        }

        Command::Workspaces => {
            let store = WorkspaceStore::open(&config.workspace_db_path())?;
            let workspaces = store.list()?;
            if workspaces.is_empty() {
                println!("No saved workspaces.");
            }
            for ws in workspaces {
                println!(
                    "{}  ({} repos, created {})",
                    ws.name,
                    ws.repos.len(),
                    ws.created_at.format("%Y-%m-%d %H:%M")
                );
            }
        }

        Command::DeleteWorkspace { name } => {
            let store = WorkspaceStore::open(&config.workspace_db_path())?;
            if store.delete(&name)? {
                println!("Deleted workspace '{name}'");
            } else {
                println!("No workspace named '{name}'");
            }
        }
    }

    Ok(())
}

/// Load the persisted index generation and wire up the retriever.
fn build_retriever(client: &reqwest::Client, config: &Config) -> Result<Retriever> {
    let embedder = embedder_from_config(client, &config.llm)?;
    let index_set = ingest::load_index_set(config, embedder).map_err(|e| {
        anyhow::anyhow!("{e}. Index a repository first: coderag index <url-or-path>")
    })?;
    let reranker = reranker_from_config(client, &config.reranker);

    Ok(Retriever::new(
        index_set.lexical,
        index_set.vector,
        reranker,
        config.retrieval.clone(),
    ))
}
