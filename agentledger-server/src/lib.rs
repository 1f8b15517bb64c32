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

//! Agentledger Server
//!
//! HTTP ingestion and query API over the activity store, plus the startup
//! and scheduled replay of the fallback queue.

pub mod api;
pub mod config;
pub mod flusher;

use agentledger_core::{Classifier, RuleSet};
use agentledger_storage::{ActivityStore, SqliteActivityStore};
use anyhow::{Context, Result};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api::AppState;
use crate::config::ServerConfig;
use crate::flusher::QueueFlusher;

pub const DEFAULT_LOG_FILTER: &str = "agentledger_server=info,agentledger_storage=info,tower_http=info";

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// filter; `json` switches to one JSON object per line.
pub fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let registry = tracing_subscriber::registry().with(filter);

    let result = if json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    if result.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

/// Load the category rules named in the config, or the built-in set.
pub fn load_classifier(config: &ServerConfig) -> Result<Classifier> {
    match &config.classifier.rules_path {
        Some(path) => {
            let rules = RuleSet::from_path(path)
                .with_context(|| format!("loading category rules from {}", path.display()))?;
            tracing::info!(
                "Loaded {} categories from {:?}",
                rules.category_names().count(),
                path
            );
            Ok(Classifier::new(Arc::new(rules)))
        }
        None => Ok(Classifier::builtin()),
    }
}

/// Router with transport layers applied.
pub fn build_app(state: AppState, enable_cors: bool) -> Router {
    let cors = if enable_cors {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        CorsLayer::new()
    };

    api::router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

pub async fn run_server(config: ServerConfig) -> Result<()> {
    tracing::info!("Starting Agentledger Server");
    tracing::debug!("Configuration: {:#?}", config);

    config.validate()?;
    let addr = config.socket_addr()?;

    let store: Arc<dyn ActivityStore> = Arc::new(
        SqliteActivityStore::open(&config.storage.db_path).with_context(|| {
            format!("opening activity database {}", config.storage.db_path.display())
        })?,
    );
    let classifier = load_classifier(&config)?;

    let queue_dir = config.queue_dir();
    tracing::info!("Fallback queue directory: {:?}", queue_dir);
    let flusher = Arc::new(QueueFlusher::new(queue_dir, store.clone()));
    let shutdown = CancellationToken::new();

    if config.queue.flush_on_startup {
        match flusher.flush(&shutdown).await {
            Ok(report) if report.flushed > 0 => {
                tracing::info!("Queue startup flush imported {} entries", report.flushed)
            }
            Ok(report) => tracing::debug!(?report, "Queue startup flush complete"),
            Err(e) => tracing::warn!("Queue startup flush failed: {}", e),
        }
    }

    let periodic = (config.queue.flush_interval_secs > 0).then(|| {
        flusher.spawn_periodic(
            Duration::from_secs(config.queue.flush_interval_secs),
            shutdown.clone(),
        )
    });

    let state = AppState::new(store, classifier, flusher, shutdown.clone());
    let app = build_app(state, config.server.enable_cors);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!("HTTP API listening on http://{}", addr);

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => tracing::info!("Shutdown signal received"),
                _ = signal.cancelled() => {}
            }
        })
        .await?;

    shutdown.cancel();
    if let Some(handle) = periodic {
        let _ = handle.await;
    }
    tracing::info!("Agentledger Server stopped");
    Ok(())
}
