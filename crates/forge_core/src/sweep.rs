//! Expiry sweep for abandoned exchanges.

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::error::CoreResult;
use crate::exchange::ExchangeId;
use crate::store::{ExchangeQuery, ExchangeStore};

/// Error message recorded on exchanges failed by the sweep.
pub const ABANDONED_MESSAGE: &str = "abandoned: heartbeat expired";

/// Fail every running exchange whose heartbeat is older than `timeout`.
///
/// Returns the ids of the exchanges that were failed.
pub async fn expire_stale(
    store: &dyn ExchangeStore,
    timeout: Duration,
    now: DateTime<Utc>,
) -> CoreResult<Vec<ExchangeId>> {
    let running = store
        .search_exchanges(&ExchangeQuery::new().running())
        .await?;

    let mut expired = Vec::new();
    for mut exchange in running {
        if !exchange.is_stale(now, timeout) {
            continue;
        }
        warn!(
            "Exchange {} missed its heartbeat (last at {}), marking failed",
            exchange.id, exchange.heartbeat_at
        );
        exchange.fail(ABANDONED_MESSAGE)?;
        store.save_exchange(&exchange).await?;
        expired.push(exchange.id);
    }

    if !expired.is_empty() {
        info!("Expired {} stale exchange(s)", expired.len());
    }
    Ok(expired)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{Exchange, ExchangeStatus};
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_expire_stale_fails_only_old_running() {
        let store = MemoryStore::new();
        let stale = Exchange::new("app", "u", "old", true);
        let fresh = Exchange::new("app", "u", "new", true);
        store.save_exchange(&stale).await.unwrap();
        store.save_exchange(&fresh).await.unwrap();

        let now = fresh.heartbeat_at + Duration::seconds(5);
        store
            .touch_exchange(&fresh.id, now - Duration::seconds(1))
            .await
            .unwrap();

        let expired = expire_stale(&store, Duration::seconds(3), now).await.unwrap();
        // `stale` was created just before `fresh`, so only the untouched one expires.
        assert_eq!(expired, vec![stale.id.clone()]);

        let failed = store.get_exchange(&stale.id).await.unwrap();
        assert_eq!(failed.status, ExchangeStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some(ABANDONED_MESSAGE));
        assert!(store.get_exchange(&fresh.id).await.unwrap().is_running());
    }
}
