use serde_json::{json, Value};
use stockviz_core::UtcDateTime;
use stockviz_store::SeriesStore;

use crate::cli::{CacheArgs, CacheCommand};
use crate::error::CliError;

pub fn run(args: &CacheArgs) -> Result<Value, CliError> {
    let store = SeriesStore::open_default()?;

    match args.command {
        CacheCommand::Stats => stats(&store),
        CacheCommand::Purge => Ok(json!({ "purged": store.purge_expired()? })),
        CacheCommand::Clear => Ok(json!({ "cleared": store.clear()? })),
    }
}

fn stats(store: &SeriesStore) -> Result<Value, CliError> {
    let now = UtcDateTime::now();
    let entries = store.entries()?;
    let live = entries.iter().filter(|entry| entry.is_live_at(now)).count();
    let policy = store.policy();

    Ok(json!({
        "db_path": store.db_path().display().to_string(),
        "entries": entries.len(),
        "live": live,
        "expired": entries.len() - live,
        "max_entries": policy.max_entries,
        "ttl_secs": policy.ttl.whole_seconds(),
        "items": entries
            .iter()
            .map(|entry| json!({
                "key": entry.key,
                "points": entry.points,
                "stored_at": entry.stored_at,
                "expires_at": entry.expires_at,
                "live": entry.is_live_at(now),
            }))
            .collect::<Vec<_>>(),
    }))
}
