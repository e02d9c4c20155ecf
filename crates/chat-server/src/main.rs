//! Chat server - entry point.

use chat_server::{
    api::{create_router, AppState},
    Config,
};
use credit_ledger::{CreditLedger, LedgerConfig, PricingCalculator};
use generation_runner::{BufferConfig, ChunkBuffer, GenerationRunner, RunnerConfig};
use message_store::MessageStore;
use model_gateway::HttpGateway;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() {
    // Load configuration
    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log.level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting chat server");

    // Upstream gateway client
    let gateway = match HttpGateway::new(
        config.gateway.api_key.clone(),
        config.gateway.base_url.clone(),
        config.gateway.model.clone(),
        config.gateway.timeout,
    ) {
        Ok(g) => g,
        Err(e) => {
            error!("Failed to create gateway client: {}", e);
            std::process::exit(1);
        }
    };

    // Stores and ledger
    let messages = MessageStore::new(config.store.max_messages, config.store.ttl);
    let ledger = Arc::new(CreditLedger::new(LedgerConfig {
        balance_floor_microcents: config.ledger.balance_floor_microcents,
    }));
    let buffer = ChunkBuffer::new(BufferConfig {
        max_runs: config.buffer.max_runs,
        terminal_ttl: config.buffer.terminal_ttl,
    });

    // Run executor
    let runner = GenerationRunner::new(
        Arc::new(gateway),
        messages.clone(),
        ledger.clone(),
        PricingCalculator::new(config.ledger.markup_rate),
        buffer,
        config.runner.journal_dir.clone(),
        RunnerConfig {
            max_tool_steps: config.runner.max_tool_steps,
            usage_persist_attempts: config.runner.usage_persist_attempts,
            ..RunnerConfig::default()
        },
    );

    let state = AppState::new(runner, messages, ledger);
    let app = create_router(state);

    let addr = match config.server.socket_addr() {
        Ok(addr) => addr,
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(1);
        }
    };

    info!("Listening on {}", addr);

    let listener = match TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
}
