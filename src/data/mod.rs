//! Entity records and the polymorphic resource accessor.
//!
//! Every entity kind implements [`Entity`] once; reads, writes, deletes and
//! ordered-batch saves all flow through the one generic
//! [`accessor::Accessor`] instead of a family of near-duplicate services.

pub mod accessor;
pub mod tracker;
pub mod types;

use serde::{de::DeserializeOwned, Serialize};

use crate::remote::SelectQuery;
use types::EntityId;

/// Concurrency mode for list reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
  /// Serve a cached list immediately and refresh the cache in the background.
  CacheFirst,
  /// Await the remote call; fall back to the cached list (else empty) on
  /// failure after retries.
  RemoteFirst,
}

/// A record stored in the remote table service.
///
/// Field names mirror the remote columns (serde renames where they differ);
/// optional columns carry serde defaults so partial rows normalize cleanly.
pub trait Entity: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
  /// Remote table name.
  const TABLE: &'static str;

  /// Prefix for client-temporary identifiers (`<kind>_<millis>`).
  const KIND: &'static str;

  /// Versioned list-level cache key, if this kind is cached at all.
  const CACHE_KEY: Option<&'static str> = None;

  const READ_MODE: ReadMode = ReadMode::RemoteFirst;

  /// Critical kinds propagate write failures so the caller can surface a
  /// failed-save state; the rest degrade with a warning.
  const CRITICAL: bool = false;

  /// Column updated by ordered-batch saves.
  const ORDER_COLUMN: Option<&'static str> = None;

  /// Columns owned by the remote store, stripped from outgoing rows.
  const SERVER_FIELDS: &'static [&'static str] = &["id", "created_at"];

  fn id(&self) -> Option<&EntityId>;

  /// Filter/order/limit for the list read.
  fn list_query() -> SelectQuery {
    SelectQuery::new()
  }

  /// Display order, for kinds that carry one.
  fn order_index(&self) -> Option<i64> {
    None
  }
}
