//! BankSync worker - partner-bank notification consumer
//!
//! Reads one JSON notification envelope per line from stdin and drives it
//! through the pipeline:
//!
//! ```text
//! ┌──────────┐    ┌────────────┐    ┌──────────┐    ┌─────────────┐
//! │ Envelope │───▶│ Dispatcher │───▶│ Ledger   │───▶│ Side        │
//! │ (stdin)  │    │ (route)    │    │ (recon)  │    │ effects     │
//! └──────────┘    └────────────┘    └──────────┘    └─────────────┘
//! ```
//!
//! The stdin loop stands in for the queue consumer: in deployment the same
//! `Dispatcher::dispatch` runs per delivered message, and a returned error
//! means "redeliver".

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use banksync::coordinator::{ActivityEntry, ActivitySink, PushMessage, PushSender};
use banksync::reconcile::{LedgerStore, MemLedgerStore, PgLedgerStore};
use banksync::resolve::testutil::{FakeAccountDirectory, FakeTransferDirectory};
use banksync::{
    AppConfig, CorrelationResolver, DispatchOutcome, Dispatcher, Reconciler,
    SideEffectCoordinator,
};

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

/// Activity sink that logs entries; the real sink is the activity service
struct LogActivitySink;

#[async_trait]
impl ActivitySink for LogActivitySink {
    async fn append(&self, entry: &ActivityEntry) -> anyhow::Result<()> {
        info!(
            business_id = %entry.business_id,
            activity = %entry.activity_type,
            amount = %entry.amount,
            "activity: {}",
            entry.description
        );
        Ok(())
    }
}

/// Push sender that logs messages; the real sender is the push gateway
struct LogPushSender;

#[async_trait]
impl PushSender for LogPushSender {
    async fn send(&self, push: &PushMessage) -> anyhow::Result<()> {
        info!(business_id = %push.business_id, "push: {}", push.body);
        Ok(())
    }
}

async fn build_store(config: &AppConfig) -> anyhow::Result<Arc<dyn LedgerStore>> {
    match config.ledger.store.as_str() {
        "postgres" => {
            let url = config
                .ledger
                .postgres_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("ledger.store=postgres requires postgres_url"))?;
            let pool = PgPoolOptions::new().max_connections(8).connect(url).await?;
            let store = PgLedgerStore::new(pool);
            store.ensure_schema().await?;
            info!("Ledger store: postgres");
            Ok(Arc::new(store))
        }
        _ => {
            info!("Ledger store: memory");
            Ok(Arc::new(MemLedgerStore::new()))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let config = AppConfig::load(&env);
    let _guard = banksync::logging::init_logging(&config);
    info!(env = %env, build = env!("GIT_HASH"), "BankSync worker starting");

    let store = build_store(&config).await?;
    let resolver = CorrelationResolver::new(
        Arc::new(FakeAccountDirectory::default()),
        Arc::new(FakeTransferDirectory::default()),
    );
    let coordinator = Arc::new(SideEffectCoordinator::new(
        Arc::new(LogActivitySink),
        Arc::new(LogPushSender),
    ));
    let dispatcher = Dispatcher::new(resolver, Reconciler::new(store), coordinator);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut processed: u64 = 0;
    let mut failed: u64 = 0;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match dispatcher.dispatch(line.as_bytes()).await {
            Ok(DispatchOutcome::Ignored) => {}
            Ok(outcome) => {
                processed += 1;
                info!(?outcome, "Notification handled");
            }
            Err(e) => {
                failed += 1;
                // In deployment this error path nacks for redelivery
                error!(code = e.code(), error = %e, "Notification failed");
            }
        }
    }

    if failed > 0 {
        warn!(processed, failed, "Worker finished with failures");
    } else {
        info!(processed, "Worker finished");
    }
    Ok(())
}
