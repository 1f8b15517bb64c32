// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Agentledger CLI
//!
//! Operator commands for the fallback queue and the classifier.

use agentledger_core::{ActivityFilters, ActivityRecord, Classifier, RuleSet, Signals};
use agentledger_storage::{
    inspect, resolve_queue_dir, ActivityStore, QueueReplayer, QueueWriter, SqliteActivityStore,
};
use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};

#[derive(Parser)]
#[command(name = "agentledger")]
#[command(about = "Agentledger - agent activity ledger tools", long_about = None)]
struct Cli {
    /// SQLite database path
    #[arg(short, long, env = "AGENTLEDGER_DB_PATH", default_value = "./agentledger.db")]
    db_path: PathBuf,

    /// Fallback queue directory (default: $AGENTLEDGER_QUEUE_DIR or ~/.agentledger/queue)
    #[arg(short, long)]
    queue_dir: Option<PathBuf>,

    /// Verbose mode
    #[arg(short, long)]
    verbose: bool,

    /// Output as JSON (machine-readable)
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay buffered activities into the database
    Flush,

    /// Buffer an activity record (JSON) for later replay
    Enqueue {
        /// File containing the record; reads stdin when omitted
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Show pending entries per queue file
    Status,

    /// Classify a turn without storing anything
    Classify {
        /// Prompt text
        #[arg(long, default_value = "")]
        prompt: String,

        /// Assistant response text
        #[arg(long, default_value = "")]
        assistant: String,

        /// Tool used during the turn (repeatable, in order)
        #[arg(long = "tool")]
        tools: Vec<String>,

        /// Category rule file (JSON or TOML)
        #[arg(long, env = "AGENTLEDGER_RULES_PATH")]
        rules: Option<PathBuf>,
    },

    /// Aggregate stored activities
    Summary {
        /// Filter by project tag
        #[arg(long)]
        project: Option<String>,

        /// Filter by model
        #[arg(long)]
        model: Option<String>,

        /// Filter by day (YYYY-MM-DD, UTC)
        #[arg(long)]
        date: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let queue_dir = resolve_queue_dir(cli.queue_dir.as_deref());

    match cli.command {
        Commands::Flush => flush(&cli.db_path, &queue_dir, cli.json).await?,

        Commands::Enqueue { file } => {
            let payload = match file {
                Some(path) => std::fs::read_to_string(&path)
                    .with_context(|| format!("reading {}", path.display()))?,
                None => {
                    let mut buf = String::new();
                    std::io::stdin().read_to_string(&mut buf)?;
                    buf
                }
            };
            let record = parse_record(&payload)?;
            let path = QueueWriter::new(&queue_dir).enqueue(&record, Utc::now())?;

            if cli.json {
                println!("{}", serde_json::json!({ "queued": true, "queue_file": path }));
            } else {
                println!("✓ Queued activity in {}", path.display());
            }
        }

        Commands::Status => {
            let files = inspect(&queue_dir)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&files)?);
            } else if files.is_empty() {
                println!("Queue is empty ({})", queue_dir.display());
            } else {
                println!("Queue: {}", queue_dir.display());
                for file in &files {
                    println!(
                        "  {}  {} pending ({} malformed)",
                        file.path.file_name().unwrap_or_default().to_string_lossy(),
                        file.entries,
                        file.malformed
                    );
                }
                let total: usize = files.iter().map(|f| f.entries).sum();
                println!("Total: {} pending", total);
            }
        }

        Commands::Classify {
            prompt,
            assistant,
            tools,
            rules,
        } => {
            let classifier = match rules {
                Some(path) => Classifier::new(Arc::new(
                    RuleSet::from_path(&path)
                        .with_context(|| format!("loading rules from {}", path.display()))?,
                )),
                None => Classifier::builtin(),
            };
            let classification = classifier.classify(
                &Signals::new()
                    .prompt(prompt)
                    .assistant(assistant)
                    .tools(tools),
            );

            if cli.json {
                println!(
                    "{}",
                    serde_json::json!({
                        "category": classification.category,
                        "reason": classification.reason.to_string(),
                    })
                );
            } else {
                println!("{}", classification);
            }
        }

        Commands::Summary {
            project,
            model,
            date,
        } => {
            let store = SqliteActivityStore::open(&cli.db_path).context("Failed to open database")?;
            let summary = store.summarize(&ActivityFilters {
                project_tag: project,
                model,
                date,
            })?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("Activities:   {}", summary.count);
                println!("Tokens in:    {}", summary.tokens_in_total);
                println!("Tokens out:   {}", summary.tokens_out_total);
                println!("Cost (USD):   {:.4}", summary.cost_total);
                println!("Duration:     {} ms", summary.duration_ms_total);
                for (status, count) in &summary.by_status {
                    println!("  {:<10} {}", status, count);
                }
            }
        }
    }

    Ok(())
}

/// One replay pass; ctrl-c stops it at the next file boundary.
async fn flush(db_path: &Path, queue_dir: &Path, json: bool) -> Result<()> {
    let store = SqliteActivityStore::open(db_path).context("Failed to open database")?;
    let replayer = QueueReplayer::new(queue_dir);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current queue file");
            on_signal.cancel();
        }
    });

    let report = tokio::task::spawn_blocking(move || replayer.flush_with_cancel(&store, &cancel))
        .await
        .context("flush task failed")??;

    info!(flushed = report.flushed, retained = report.retained, "Queue flush complete");
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "✓ Flushed {} entries ({} retained, {} malformed)",
            report.flushed, report.retained, report.malformed
        );
        if report.cancelled {
            println!("  Stopped early; run flush again to continue");
        }
    }
    Ok(())
}

fn parse_record(payload: &str) -> Result<ActivityRecord> {
    let payload = payload.trim();
    if payload.is_empty() {
        anyhow::bail!("empty activity payload");
    }
    ActivityRecord::from_json_str(payload).context("activity payload is not a valid record")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_classify_args() {
        let cli = Cli::try_parse_from([
            "agentledger",
            "classify",
            "--prompt",
            "please research",
            "--tool",
            "web_search",
            "--tool",
            "bash",
        ])
        .unwrap();

        match cli.command {
            Commands::Classify { prompt, tools, .. } => {
                assert_eq!(prompt, "please research");
                assert_eq!(tools, ["web_search", "bash"]);
            }
            _ => panic!("expected classify"),
        }
    }

    #[test]
    fn test_parse_record() {
        let record = parse_record("  {\"session_key\":\"cli\"}\n").unwrap();
        assert_eq!(record.session_key, "cli");
        assert!(parse_record("   ").is_err());
        assert!(parse_record("not-json").is_err());
        assert!(parse_record("[\"x\"]").is_err());
    }

    #[tokio::test]
    async fn test_flush_command_drains_queue() {
        let tmp = tempfile::tempdir().unwrap();
        let queue = tmp.path().join("queue");
        let record = parse_record(r#"{"session_key":"cli-1","model":"gpt-5"}"#).unwrap();
        QueueWriter::new(&queue).enqueue(&record, Utc::now()).unwrap();

        let db = tmp.path().join("ledger.db");
        flush(&db, &queue, true).await.unwrap();

        let store = SqliteActivityStore::open(&db).unwrap();
        let listed = store.list(&ActivityFilters::new()).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].session_key, "cli-1");
        assert!(inspect(&queue).unwrap().is_empty());
    }
}
