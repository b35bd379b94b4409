//! Remote table service interface.
//!
//! The hosted store is a request/response table service with filter, order and
//! limit semantics plus a remote-procedure call for atomic counter increments.
//! [`Remote`] is the seam: [`HttpRemote`] talks to the real service,
//! [`MemoryRemote`] backs tests.

mod http;
mod memory;

pub use http::HttpRemote;
pub use memory::MemoryRemote;

use serde_json::Value;
use std::future::Future;

/// Structured transport/service error.
///
/// Retry classification prefers these variants over message matching; see
/// [`crate::retry::classify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
  /// Request exceeded the transport's own deadline.
  Timeout,
  /// Connection could not be established; the environment looks offline.
  Offline,
  /// The "no rows" sentinel (PostgREST code PGRST116).
  NoRows,
  /// Authorization or row-level policy rejection.
  Denied(String),
  /// Any other service-reported error.
  Api {
    code: Option<String>,
    message: String,
  },
  /// Transport-level failure other than timeout/connect.
  Transport(String),
  /// Response body did not decode into the expected shape.
  Decode(String),
}

impl RemoteError {
  /// Whether a retry is expected to help.
  pub fn is_transient(&self) -> bool {
    matches!(self, Self::Timeout | Self::Offline | Self::NoRows)
  }
}

impl std::fmt::Display for RemoteError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::Timeout => write!(f, "request timed out"),
      Self::Offline => write!(f, "network unreachable"),
      Self::NoRows => write!(f, "no rows returned (PGRST116)"),
      Self::Denied(msg) => write!(f, "permission denied: {}", msg),
      Self::Api { code, message } => match code {
        Some(code) => write!(f, "service error {}: {}", code, message),
        None => write!(f, "service error: {}", message),
      },
      Self::Transport(msg) => write!(f, "transport error: {}", msg),
      Self::Decode(msg) => write!(f, "malformed response: {}", msg),
    }
  }
}

impl std::error::Error for RemoteError {}

/// Filter/order/limit parameters for a list read.
#[derive(Debug, Clone, Default)]
pub struct SelectQuery {
  pub columns: Option<&'static str>,
  pub eq: Vec<(String, String)>,
  pub gt: Vec<(String, String)>,
  /// (column, ascending)
  pub order: Option<(String, bool)>,
  pub limit: Option<u32>,
}

impl SelectQuery {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn columns(mut self, columns: &'static str) -> Self {
    self.columns = Some(columns);
    self
  }

  pub fn eq(mut self, column: &str, value: &str) -> Self {
    self.eq.push((column.to_string(), value.to_string()));
    self
  }

  pub fn gt(mut self, column: &str, value: &str) -> Self {
    self.gt.push((column.to_string(), value.to_string()));
    self
  }

  pub fn order(mut self, column: &str, ascending: bool) -> Self {
    self.order = Some((column.to_string(), ascending));
    self
  }

  pub fn limit(mut self, limit: u32) -> Self {
    self.limit = Some(limit);
    self
  }
}

/// Request/response table service.
///
/// Methods return explicitly `Send` futures so generic callers can hand the
/// work to a background task.
pub trait Remote: Send + Sync + 'static {
  /// List rows matching the query.
  fn select(
    &self,
    table: &str,
    query: SelectQuery,
  ) -> impl Future<Output = Result<Vec<Value>, RemoteError>> + Send;

  /// Count rows matching the query.
  fn count(
    &self,
    table: &str,
    query: SelectQuery,
  ) -> impl Future<Output = Result<u64, RemoteError>> + Send;

  /// Insert a row; the store assigns the identifier. Returns the stored row.
  fn insert(
    &self,
    table: &str,
    row: Value,
  ) -> impl Future<Output = Result<Value, RemoteError>> + Send;

  /// Update the row with the given identifier.
  fn update(
    &self,
    table: &str,
    id: &str,
    row: Value,
  ) -> impl Future<Output = Result<(), RemoteError>> + Send;

  /// Insert-or-update keyed on `on_conflict`.
  fn upsert(
    &self,
    table: &str,
    row: Value,
    on_conflict: &str,
  ) -> impl Future<Output = Result<(), RemoteError>> + Send;

  /// Delete by identifier. Deleting a nonexistent identifier is not an error.
  fn delete(&self, table: &str, id: &str)
    -> impl Future<Output = Result<(), RemoteError>> + Send;

  /// Invoke a named remote procedure (atomic counter increment).
  fn rpc(&self, name: &str) -> impl Future<Output = Result<(), RemoteError>> + Send;
}
