//! Siphon CLI - queue administration and assignment requests

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tabled::{Table, Tabled};

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:9643";

#[derive(Parser)]
#[command(name = "siphon")]
#[command(about = "Siphon queue-draining cluster CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// RPC server URL
    #[arg(long, env = "SIPHON_RPC_URL", default_value = DEFAULT_RPC_URL)]
    rpc_url: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a queue
    Create {
        /// Queue name
        name: String,

        /// Drain concurrency limit (1-5)
        #[arg(short, long)]
        concurrency: Option<i32>,
    },

    /// Delete a queue
    Delete {
        /// Queue name
        name: String,
    },

    /// List known queues
    List,

    /// Send test messages to a queue, then request assignment
    Send {
        /// Queue name
        name: String,

        /// Number of messages
        #[arg(default_value = "1")]
        count: u32,

        /// Skip the assignment request after sending
        #[arg(long)]
        no_assign: bool,
    },

    /// Show a queue's approximate message count
    Size {
        /// Queue name
        name: String,
    },

    /// Update a queue's drain concurrency limit (1-5)
    SetConcurrency {
        /// Queue name
        name: String,

        /// New limit
        limit: i32,
    },

    /// Ask the master to assign a queue to a worker
    Assign {
        /// Queue name
        name: String,
    },

    /// Show cluster status
    Status,
}

#[derive(Serialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    method: String,
    params: serde_json::Value,
    id: u64,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    #[allow(dead_code)]
    jsonrpc: String,
    #[allow(dead_code)]
    id: u64,
    result: Option<serde_json::Value>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

#[derive(Deserialize, Tabled)]
struct QueueRow {
    name: String,
    queue_ref: String,
    concurrency_limit: i32,
}

async fn call_rpc(url: &str, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
    let request = JsonRpcRequest {
        jsonrpc: "2.0".to_string(),
        method: method.to_string(),
        params,
        id: 1,
    };

    let client = reqwest::Client::new();
    let response: JsonRpcResponse = client
        .post(url)
        .json(&request)
        .send()
        .await
        .context("Failed to connect to daemon")?
        .json()
        .await
        .context("Failed to parse response")?;

    if let Some(error) = response.error {
        anyhow::bail!("RPC error ({}): {}", error.code, error.message);
    }

    response
        .result
        .ok_or_else(|| anyhow::anyhow!("No result in response"))
}

async fn request_assignment(rpc_url: &str, name: &str) -> Result<()> {
    let result = call_rpc(rpc_url, "cluster.assign.v1", json!({ "name": name })).await?;

    let worker = result["worker"].as_str().unwrap_or("?");
    if result["already_assigned"].as_bool().unwrap_or(false) {
        println!(
            "{}",
            format!("○ Queue '{}' already assigned to worker {}", name, worker).yellow()
        );
    } else {
        println!(
            "{}",
            format!("✓ Queue '{}' assigned to worker {}", name, worker)
                .green()
                .bold()
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Create { name, concurrency } => {
            let mut params = json!({ "name": name });
            if let Some(limit) = concurrency {
                params["concurrency_limit"] = json!(limit);
            }

            let result = call_rpc(&cli.rpc_url, "queue.create.v1", params).await?;

            println!(
                "{}",
                format!(
                    "✓ Created queue '{}': {}",
                    name,
                    result["queue_ref"].as_str().unwrap_or("?")
                )
                .green()
                .bold()
            );
        }

        Commands::Delete { name } => {
            call_rpc(&cli.rpc_url, "queue.delete.v1", json!({ "name": name })).await?;
            println!("{}", format!("✓ Deleted queue '{}'", name).green().bold());
        }

        Commands::List => {
            let result = call_rpc(&cli.rpc_url, "queue.list.v1", json!({})).await?;
            let queues: Vec<QueueRow> = serde_json::from_value(result["queues"].clone())?;

            if queues.is_empty() {
                println!("{}", "No queues found.".yellow());
            } else {
                println!("{}", Table::new(queues));
            }
        }

        Commands::Send {
            name,
            count,
            no_assign,
        } => {
            let params = json!({ "name": name, "count": count });
            let result = call_rpc(&cli.rpc_url, "queue.send.v1", params).await?;

            println!(
                "{}",
                format!(
                    "✓ Sent {} message(s) to '{}'",
                    result["sent"].as_u64().unwrap_or(0),
                    name
                )
                .green()
                .bold()
            );

            if !no_assign {
                if let Err(e) = request_assignment(&cli.rpc_url, &name).await {
                    println!(
                        "{}",
                        format!("⚠ Assignment request for '{}' failed: {}", name, e).yellow()
                    );
                }
            }
        }

        Commands::Size { name } => {
            let result = call_rpc(&cli.rpc_url, "queue.size.v1", json!({ "name": name })).await?;
            println!(
                "Queue '{}' contains ~{} message(s)",
                name,
                result["approximate_size"].as_u64().unwrap_or(0)
            );
        }

        Commands::SetConcurrency { name, limit } => {
            let params = json!({ "name": name, "limit": limit });
            call_rpc(&cli.rpc_url, "queue.setConcurrency.v1", params).await?;
            println!(
                "{}",
                format!("✓ Queue '{}' concurrency set to {}", name, limit)
                    .green()
                    .bold()
            );
        }

        Commands::Assign { name } => {
            request_assignment(&cli.rpc_url, &name).await?;
        }

        Commands::Status => {
            println!("{}", "Cluster Status".cyan().bold());
            println!();

            match call_rpc(&cli.rpc_url, "admin.stats.v1", json!({})).await {
                Ok(stats) => {
                    println!("  {} {}", "RPC URL:".bold(), cli.rpc_url);
                    println!("  {} {}", "Status:".bold(), "ONLINE".green());
                    println!();
                    println!("  {} {}", "Workers:".bold(), stats["workers"]);
                    println!("  {} {}", "Assignments:".bold(), stats["assignments"]);
                    println!("  {} {}", "Queues:".bold(), stats["queues"]);
                    println!();
                    println!("  {} {} seconds", "Uptime:".bold(), stats["uptime_seconds"]);
                }
                Err(e) => {
                    println!("  {} {}", "Status:".bold(), "ERROR".red());
                    println!("  {} {}", "Error:".bold(), e);
                }
            }
        }
    }

    Ok(())
}
