//! ROLLCALL entry point.
//!
//! Loads the requested admin tabs through a sync session and prints a JSON
//! summary of what was loaded.

use rollcall_client::config::{tabs_from_args, SyncConfig};
use rollcall_client::error::ClientError;
use rollcall_client::logging;
use rollcall_client::notifications::Notification;
use rollcall_client::{RestClient, SyncSession, Tab, TabLoadState};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Serialize)]
struct Summary {
    tabs: BTreeMap<Tab, TabLoadState>,
    collections: BTreeMap<String, usize>,
    schema_cache: CacheSummary,
    notifications: Vec<Notification>,
}

#[derive(Debug, Serialize)]
struct CacheSummary {
    hits: u64,
    misses: u64,
    fetches: u64,
    entries: u64,
}

#[tokio::main]
async fn main() -> Result<(), ClientError> {
    let config = SyncConfig::load()?;
    logging::init(&config.log)?;
    let tabs = tabs_from_args(std::env::args().skip(1))?;

    let backend = Arc::new(RestClient::new(&config)?);
    let session = SyncSession::from_config(backend, &config);
    let credential = config.credential();

    tracing::info!(tabs = ?tabs, base_url = %config.api_base_url, "Loading admin tabs");
    for tab in &tabs {
        if let Err(err) = session.load_tab_data(*tab, credential.as_ref()).await {
            tracing::warn!(tab = %tab, error = %err, "Tab did not load");
        }
    }

    let stats = session.cache_stats();
    let summary = Summary {
        tabs: session
            .tab_states()
            .into_iter()
            .filter(|(tab, _)| tabs.contains(tab))
            .collect(),
        collections: session.store().sizes(),
        schema_cache: CacheSummary {
            hits: stats.hits,
            misses: stats.misses,
            fetches: stats.fetches,
            entries: stats.entry_count,
        },
        notifications: session.drain_notifications(),
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);

    session.close().await;
    Ok(())
}
