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

use agentledger_server::{config::ServerConfig, init_tracing, run_server};
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// HTTP listen address (overrides config file)
    #[arg(long)]
    http_addr: Option<String>,

    /// SQLite database path (overrides config file)
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Fallback queue directory (overrides config file)
    #[arg(long)]
    queue_dir: Option<PathBuf>,

    /// Seconds between scheduled queue replays, 0 to disable
    #[arg(long)]
    flush_interval: Option<u64>,

    /// Skip the queue replay at startup
    #[arg(long)]
    no_startup_flush: bool,

    /// Category rule file (JSON or TOML)
    #[arg(long)]
    rules: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, env = "AGENTLEDGER_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    // Load configuration
    let mut config = ServerConfig::load(args.config)?;

    // Apply CLI overrides
    if let Some(addr) = args.http_addr {
        config.server.listen_addr = addr;
    }
    if let Some(db_path) = args.db_path {
        config.storage.db_path = db_path;
    }
    if let Some(dir) = args.queue_dir {
        config.queue.dir = Some(dir);
    }
    if let Some(secs) = args.flush_interval {
        config.queue.flush_interval_secs = secs;
    }
    if args.no_startup_flush {
        config.queue.flush_on_startup = false;
    }
    if let Some(rules) = args.rules {
        config.classifier.rules_path = Some(rules);
    }

    // Run server
    run_server(config).await
}
