//! Visit counting and presence.
//!
//! One [`VisitTracker`] per process. The session identifier is minted once and
//! lives for the process lifetime; presence is kept fresh by upserting the
//! same row on every heartbeat. The global visit counters are incremented at
//! most once per local calendar day, guarded by a durable marker that is set
//! only after the increment RPC confirms.

use chrono::{Duration as ChronoDuration, Local, Utc};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::cache::{keys, KvStore};
use crate::remote::{Remote, RemoteError, SelectQuery};

use super::types::server_shaped_id;

const VISITOR_LOGS_TABLE: &str = "visitor_logs";
const COUNTERS_TABLE: &str = "site_counters";
const INCREMENT_RPC: &str = "increment_visit_counters";

/// Sessions active within this trailing window count as online.
const ONLINE_WINDOW_MINUTES: i64 = 5;

/// How often the background heartbeat refreshes presence.
pub const HEARTBEAT_PERIOD: Duration = Duration::from_secs(60);

/// Aggregate visitor counters plus the live presence count.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisitorStats {
  pub total_visits: i64,
  pub today_visits: i64,
  pub month_visits: i64,
  pub online: u64,
}

impl VisitorStats {
  /// Neutral stats shown when the counters are unreachable. The viewer
  /// themselves is online, so the floor is 1.
  fn unavailable() -> Self {
    Self {
      online: 1,
      ..Self::default()
    }
  }
}

pub struct VisitTracker<S, R> {
  cache: Arc<S>,
  remote: Arc<R>,
  session_id: String,
}

impl<S, R> Clone for VisitTracker<S, R> {
  fn clone(&self) -> Self {
    Self {
      cache: Arc::clone(&self.cache),
      remote: Arc::clone(&self.remote),
      session_id: self.session_id.clone(),
    }
  }
}

impl<S: KvStore, R: Remote> VisitTracker<S, R> {
  pub fn new(cache: Arc<S>, remote: Arc<R>) -> Self {
    Self {
      cache,
      remote,
      session_id: mint_session_id(),
    }
  }

  pub fn session_id(&self) -> &str {
    &self.session_id
  }

  /// Refresh this session's presence row and, once per local calendar day,
  /// bump the global visit counters.
  ///
  /// Presence failures are logged and ignored; counters matter more, but even
  /// they never surface an error to the caller. The daily guard is written
  /// only after the increment RPC succeeds, so a failed increment is retried
  /// on the next invocation.
  pub async fn track_visit(&self) {
    let row = json!({
      "session_id": self.session_id,
      "last_active": Utc::now().to_rfc3339(),
    });
    if let Err(err) = self
      .remote
      .upsert(VISITOR_LOGS_TABLE, row, "session_id")
      .await
    {
      debug!(%err, "presence upsert failed");
    }

    let guard = daily_guard_key();
    if self.cache.contains(&guard) {
      return;
    }
    match self.remote.rpc(INCREMENT_RPC).await {
      Ok(()) => self.cache.put(&guard, &true),
      Err(err) => warn!(%err, "visit counter increment failed"),
    }
  }

  /// Counter totals plus sessions seen in the last few minutes.
  ///
  /// Never fails: an unreachable backend yields zeroed counters with the
  /// online count floored at 1.
  pub async fn visitor_stats(&self) -> VisitorStats {
    match self.fetch_stats().await {
      Ok(stats) => stats,
      Err(err) => {
        warn!(%err, "visitor stats unavailable");
        VisitorStats::unavailable()
      }
    }
  }

  async fn fetch_stats(&self) -> Result<VisitorStats, RemoteError> {
    let counters = self
      .remote
      .select(COUNTERS_TABLE, SelectQuery::new())
      .await?;

    let cutoff = (Utc::now() - ChronoDuration::minutes(ONLINE_WINDOW_MINUTES)).to_rfc3339();
    let online = self
      .remote
      .count(
        VISITOR_LOGS_TABLE,
        SelectQuery::new().gt("last_active", &cutoff),
      )
      .await?;

    let mut stats = VisitorStats {
      online: online.max(1),
      ..VisitorStats::default()
    };
    for row in &counters {
      let value = row.get("value").and_then(Value::as_i64).unwrap_or(0);
      match row.get("key").and_then(Value::as_str) {
        Some("total_visits") => stats.total_visits = value,
        Some("today_visits") => stats.today_visits = value,
        Some("month_visits") => stats.month_visits = value,
        _ => {}
      }
    }
    Ok(stats)
  }

  /// Spawn the presence heartbeat. Runs until the handle is aborted or the
  /// runtime shuts down.
  pub fn spawn_heartbeat(&self, period: Duration) -> tokio::task::JoinHandle<()> {
    let tracker = self.clone();
    tokio::spawn(async move {
      let mut interval = tokio::time::interval(period);
      loop {
        interval.tick().await;
        tracker.track_visit().await;
      }
    })
  }
}

/// Today's guard key, `site_visit_<YYYY-MM-DD>` in local time.
fn daily_guard_key() -> String {
  format!("{}{}", keys::VISIT_GUARD_PREFIX, Local::now().format("%Y-%m-%d"))
}

/// 36-character session identifier, unique per process.
fn mint_session_id() -> String {
  let mut hasher = Sha256::new();
  hasher.update(
    Utc::now()
      .timestamp_nanos_opt()
      .unwrap_or_default()
      .to_le_bytes(),
  );
  hasher.update(std::process::id().to_le_bytes());
  server_shaped_id(&hex::encode(hasher.finalize()))
}
