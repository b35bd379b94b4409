//! In-memory table service used by tests.
//!
//! Mimics the subset of remote semantics the data layer relies on: row
//! storage per table, eq/gt filters, ordering, limits, server-assigned
//! 36-character identifiers and the visit-counter RPC. Failures can be
//! injected per table to exercise degraded paths.

use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

use super::{Remote, RemoteError, SelectQuery};
use crate::data::types::server_shaped_id;

#[derive(Default)]
pub struct MemoryRemote {
  tables: Mutex<HashMap<String, Vec<Value>>>,
  failures: Mutex<HashMap<String, RemoteError>>,
  fail_rpc: AtomicBool,
  rpc_calls: AtomicU32,
  select_calls: AtomicU32,
  id_seq: AtomicU64,
}

impl MemoryRemote {
  pub fn new() -> Self {
    Self::default()
  }

  /// Replace a table's rows wholesale.
  pub fn seed(&self, table: &str, rows: Vec<Value>) {
    if let Ok(mut tables) = self.tables.lock() {
      tables.insert(table.to_string(), rows);
    }
  }

  /// Current rows of a table, for assertions.
  pub fn rows(&self, table: &str) -> Vec<Value> {
    self
      .tables
      .lock()
      .ok()
      .and_then(|t| t.get(table).cloned())
      .unwrap_or_default()
  }

  /// Make every operation on `table` fail with `err` until cleared.
  pub fn fail_table(&self, table: &str, err: RemoteError) {
    if let Ok(mut failures) = self.failures.lock() {
      failures.insert(table.to_string(), err);
    }
  }

  pub fn clear_failure(&self, table: &str) {
    if let Ok(mut failures) = self.failures.lock() {
      failures.remove(table);
    }
  }

  pub fn set_fail_rpc(&self, fail: bool) {
    self.fail_rpc.store(fail, Ordering::SeqCst);
  }

  /// How many RPC invocations reached the service (successful or not).
  pub fn rpc_calls(&self) -> u32 {
    self.rpc_calls.load(Ordering::SeqCst)
  }

  /// How many selects reached the service, for retry assertions.
  pub fn select_calls(&self) -> u32 {
    self.select_calls.load(Ordering::SeqCst)
  }

  fn check(&self, table: &str) -> Result<(), RemoteError> {
    if let Ok(failures) = self.failures.lock() {
      if let Some(err) = failures.get(table) {
        return Err(err.clone());
      }
    }
    Ok(())
  }

  /// 36-character delimiter-free-except-hyphens identifier, like the real
  /// store issues on insert.
  fn next_server_id(&self) -> String {
    let seq = self.id_seq.fetch_add(1, Ordering::SeqCst);
    let mut hasher = Sha256::new();
    hasher.update(seq.to_le_bytes());
    server_shaped_id(&hex::encode(hasher.finalize()))
  }
}

fn field_str(row: &Value, column: &str) -> String {
  match row.get(column) {
    Some(Value::String(s)) => s.clone(),
    Some(other) => other.to_string(),
    None => String::new(),
  }
}

fn compare_fields(a: &Value, b: &Value, column: &str) -> std::cmp::Ordering {
  let (av, bv) = (a.get(column), b.get(column));
  match (av.and_then(Value::as_f64), bv.and_then(Value::as_f64)) {
    (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal),
    _ => field_str(a, column).cmp(&field_str(b, column)),
  }
}

impl Remote for MemoryRemote {
  async fn select(&self, table: &str, query: SelectQuery) -> Result<Vec<Value>, RemoteError> {
    self.select_calls.fetch_add(1, Ordering::SeqCst);
    self.check(table)?;
    let mut rows = self.rows(table);

    for (column, value) in &query.eq {
      rows.retain(|row| &field_str(row, column) == value);
    }
    for (column, value) in &query.gt {
      rows.retain(|row| field_str(row, column).as_str() > value.as_str());
    }
    if let Some((column, ascending)) = &query.order {
      rows.sort_by(|a, b| {
        let ord = compare_fields(a, b, column);
        if *ascending {
          ord
        } else {
          ord.reverse()
        }
      });
    }
    if let Some(limit) = query.limit {
      rows.truncate(limit as usize);
    }
    // Column projection is skipped; callers tolerate extra fields.
    Ok(rows)
  }

  async fn count(&self, table: &str, query: SelectQuery) -> Result<u64, RemoteError> {
    Ok(self.select(table, query).await?.len() as u64)
  }

  async fn insert(&self, table: &str, mut row: Value) -> Result<Value, RemoteError> {
    self.check(table)?;
    if let Some(map) = row.as_object_mut() {
      map.insert("id".to_string(), json!(self.next_server_id()));
    }
    if let Ok(mut tables) = self.tables.lock() {
      tables.entry(table.to_string()).or_default().push(row.clone());
    }
    Ok(row)
  }

  async fn update(&self, table: &str, id: &str, row: Value) -> Result<(), RemoteError> {
    self.check(table)?;
    let Ok(mut tables) = self.tables.lock() else {
      return Ok(());
    };
    if let Some(rows) = tables.get_mut(table) {
      for existing in rows.iter_mut() {
        if field_str(existing, "id") == id {
          if let (Some(target), Some(patch)) = (existing.as_object_mut(), row.as_object()) {
            for (key, value) in patch {
              target.insert(key.clone(), value.clone());
            }
          }
        }
      }
    }
    Ok(())
  }

  async fn upsert(&self, table: &str, row: Value, on_conflict: &str) -> Result<(), RemoteError> {
    self.check(table)?;
    let conflict_value = field_str(&row, on_conflict);
    let Ok(mut tables) = self.tables.lock() else {
      return Ok(());
    };
    let rows = tables.entry(table.to_string()).or_default();

    for existing in rows.iter_mut() {
      if field_str(existing, on_conflict) == conflict_value {
        if let (Some(target), Some(patch)) = (existing.as_object_mut(), row.as_object()) {
          for (key, value) in patch {
            target.insert(key.clone(), value.clone());
          }
        }
        return Ok(());
      }
    }
    rows.push(row);
    Ok(())
  }

  async fn delete(&self, table: &str, id: &str) -> Result<(), RemoteError> {
    self.check(table)?;
    if let Ok(mut tables) = self.tables.lock() {
      if let Some(rows) = tables.get_mut(table) {
        rows.retain(|row| field_str(row, "id") != id);
      }
    }
    Ok(())
  }

  async fn rpc(&self, name: &str) -> Result<(), RemoteError> {
    self.rpc_calls.fetch_add(1, Ordering::SeqCst);
    if self.fail_rpc.load(Ordering::SeqCst) {
      return Err(RemoteError::Timeout);
    }
    if name == "increment_visit_counters" {
      let Ok(mut tables) = self.tables.lock() else {
        return Ok(());
      };
      let rows = tables.entry("site_counters".to_string()).or_default();
      for key in ["total_visits", "today_visits", "month_visits"] {
        if let Some(row) = rows.iter_mut().find(|r| field_str(r, "key") == key) {
          let current = row.get("value").and_then(Value::as_i64).unwrap_or(0);
          if let Some(map) = row.as_object_mut() {
            map.insert("value".to_string(), json!(current + 1));
          }
        } else {
          rows.push(json!({ "key": key, "value": 1 }));
        }
      }
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_insert_assigns_server_id() {
    let remote = MemoryRemote::new();
    let row = remote
      .insert("posts", json!({ "title": "hello" }))
      .await
      .unwrap();

    let id = row.get("id").and_then(Value::as_str).unwrap();
    assert_eq!(id.len(), 36);
    assert!(!id.contains('_'));
  }

  #[tokio::test]
  async fn test_select_filters_orders_and_limits() {
    let remote = MemoryRemote::new();
    remote.seed(
      "posts",
      vec![
        json!({ "id": "1", "status": "draft", "views": 5 }),
        json!({ "id": "2", "status": "published", "views": 9 }),
        json!({ "id": "3", "status": "published", "views": 2 }),
      ],
    );

    let rows = remote
      .select(
        "posts",
        SelectQuery::new()
          .eq("status", "published")
          .order("views", true)
          .limit(1),
      )
      .await
      .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["id"], "3");
  }

  #[tokio::test]
  async fn test_upsert_replaces_on_conflict_key() {
    let remote = MemoryRemote::new();
    remote
      .upsert(
        "visitor_logs",
        json!({ "session_id": "s1", "last_active": "t1" }),
        "session_id",
      )
      .await
      .unwrap();
    remote
      .upsert(
        "visitor_logs",
        json!({ "session_id": "s1", "last_active": "t2" }),
        "session_id",
      )
      .await
      .unwrap();

    let rows = remote.rows("visitor_logs");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["last_active"], "t2");
  }
}
