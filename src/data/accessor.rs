//! Polymorphic resource accessor.
//!
//! One `Accessor<T>` per entity kind, all sharing the same protocol: reads
//! follow stale-while-revalidate against the durable cache and the retry
//! orchestrator, writes classify identifier provenance to pick update vs
//! insert and then invalidate the list-level cache key.

use color_eyre::{eyre::eyre, Report, Result};
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cache::{keys, KvStore};
use crate::remote::{Remote, RemoteError, SelectQuery};
use crate::retry::{with_retry, RetryPolicy};

use super::types::{EntityId, SiteConfig};
use super::{Entity, ReadMode};

pub struct Accessor<T, S, R> {
  cache: Arc<S>,
  remote: Arc<R>,
  retry: RetryPolicy,
  _kind: PhantomData<fn() -> T>,
}

async fn fetch_list<T: Entity, R: Remote>(remote: &R, retry: RetryPolicy) -> Result<Vec<T>> {
  let rows = with_retry(retry, || async {
    remote
      .select(T::TABLE, T::list_query())
      .await
      .map_err(Report::from)
  })
  .await?;
  rows.into_iter().map(decode_row::<T>).collect()
}

fn decode_row<T: Entity>(row: Value) -> Result<T> {
  serde_json::from_value(row).map_err(|e| eyre!("Failed to decode {} row: {}", T::TABLE, e))
}

/// Serialize an entity as an outgoing row, minus the store-owned columns.
fn to_row<T: Entity>(entity: &T) -> Result<Value> {
  let mut row = serde_json::to_value(entity)
    .map_err(|e| eyre!("Failed to serialize {} row: {}", T::TABLE, e))?;
  if let Some(map) = row.as_object_mut() {
    for field in T::SERVER_FIELDS {
      map.remove(*field);
    }
  }
  Ok(row)
}

fn store_list<T: Entity, S: KvStore>(cache: &S, items: &[T]) {
  if let Some(key) = T::CACHE_KEY {
    cache.put_list(key, items);
  }
}

impl<T: Entity, S: KvStore, R: Remote> Accessor<T, S, R> {
  pub fn new(cache: Arc<S>, remote: Arc<R>, retry: RetryPolicy) -> Self {
    Self {
      cache,
      remote,
      retry,
      _kind: PhantomData,
    }
  }

  /// List the entity's collection.
  ///
  /// Cache-first kinds return the cached list immediately and refresh it in
  /// the background; remote-first kinds await the fetch and degrade to the
  /// cached list (else empty) once retries are exhausted.
  pub async fn get_all(&self) -> Result<Vec<T>> {
    match T::READ_MODE {
      ReadMode::CacheFirst => {
        if let Some(stale) = self.cached() {
          debug!(table = T::TABLE, "serving cached list, refreshing in background");
          self.spawn_refresh();
          return Ok(stale);
        }
        let fresh = fetch_list::<T, R>(self.remote.as_ref(), self.retry).await?;
        store_list(self.cache.as_ref(), &fresh);
        Ok(fresh)
      }
      ReadMode::RemoteFirst => {
        match fetch_list::<T, R>(self.remote.as_ref(), self.retry).await {
          Ok(fresh) => {
            store_list(self.cache.as_ref(), &fresh);
            Ok(fresh)
          }
          Err(err) => {
            warn!(table = T::TABLE, %err, "remote read degraded, serving stale");
            Ok(self.cached().unwrap_or_default())
          }
        }
      }
    }
  }

  /// Fetch a single record by identifier. `None` when the store has no row.
  pub async fn get_by_id(&self, id: &EntityId) -> Result<Option<T>> {
    let rows = with_retry(self.retry, || async {
      self
        .remote
        .select(
          T::TABLE,
          SelectQuery::new().eq("id", id.as_str()).limit(1),
        )
        .await
        .map_err(Report::from)
    })
    .await?;

    match rows.into_iter().next() {
      Some(row) => Ok(Some(decode_row(row)?)),
      None => Ok(None),
    }
  }

  /// Persist an entity. Server-issued identifier: update in place.
  /// Client-temporary or absent: insert and let the store assign the real
  /// identifier. Either way the list cache key is invalidated so the next
  /// read refetches.
  pub async fn save(&self, entity: &T) -> Result<()> {
    let row = to_row(entity)?;
    let result = match entity.id() {
      Some(id) if id.is_server_issued() => {
        self.remote.update(T::TABLE, id.as_str(), row).await
      }
      _ => self.remote.insert(T::TABLE, row).await.map(|_| ()),
    };

    self.invalidate();
    self.finish_write(result, "save")
  }

  /// Delete by identifier. Idempotent: a missing row is not an error.
  pub async fn delete(&self, id: &EntityId) -> Result<()> {
    self.invalidate();
    let result = self.remote.delete(T::TABLE, id.as_str()).await;
    self.finish_write(result, "delete")
  }

  /// Persist each element's order column, one sequential update per row.
  pub async fn save_order(&self, items: &[T]) -> Result<()> {
    let Some(column) = T::ORDER_COLUMN else {
      return Ok(());
    };

    for item in items {
      let (Some(id), Some(order)) = (item.id(), item.order_index()) else {
        continue;
      };
      let mut row = serde_json::Map::new();
      row.insert(column.to_string(), Value::from(order));
      self
        .remote
        .update(T::TABLE, id.as_str(), Value::Object(row))
        .await
        .map_err(Report::from)?;
    }

    self.invalidate();
    Ok(())
  }

  fn cached(&self) -> Option<Vec<T>> {
    T::CACHE_KEY.and_then(|key| self.cache.get::<Vec<T>>(key))
  }

  fn invalidate(&self) {
    if let Some(key) = T::CACHE_KEY {
      self.cache.remove(key);
    }
  }

  fn finish_write(&self, result: Result<(), RemoteError>, op: &str) -> Result<()> {
    match result {
      Ok(()) => Ok(()),
      Err(err) if !T::CRITICAL => {
        warn!(table = T::TABLE, op, %err, "write degraded");
        Ok(())
      }
      Err(err) => Err(Report::from(err).wrap_err(format!("Failed to {} {}", op, T::TABLE))),
    }
  }

  fn spawn_refresh(&self) {
    let remote = Arc::clone(&self.remote);
    let cache = Arc::clone(&self.cache);
    let retry = self.retry;

    tokio::spawn(async move {
      match fetch_list::<T, R>(remote.as_ref(), retry).await {
        Ok(fresh) => store_list(cache.as_ref(), &fresh),
        Err(err) => debug!(table = T::TABLE, %err, "background refresh failed"),
      }
    });
  }
}

impl<T, S, R> Clone for Accessor<T, S, R> {
  fn clone(&self) -> Self {
    Self {
      cache: Arc::clone(&self.cache),
      remote: Arc::clone(&self.remote),
      retry: self.retry,
      _kind: PhantomData,
    }
  }
}

/// Accessor for the singleton site configuration row.
pub struct ConfigAccessor<S, R> {
  cache: Arc<S>,
  remote: Arc<R>,
  retry: RetryPolicy,
}

const CONFIG_TABLE: &str = "school_config";

impl<S: KvStore, R: Remote> ConfigAccessor<S, R> {
  pub fn new(cache: Arc<S>, remote: Arc<R>, retry: RetryPolicy) -> Self {
    Self {
      cache,
      remote,
      retry,
    }
  }

  /// Cache-first read. A miss propagates the fetch error so the caller can
  /// fall back to the hardcoded default and flag the refresh as degraded.
  pub async fn get(&self) -> Result<SiteConfig> {
    if let Some(stale) = self.cache.get::<SiteConfig>(keys::CONFIG) {
      self.spawn_refresh();
      return Ok(stale);
    }

    let fresh = Self::fetch(self.remote.as_ref(), self.retry).await?;
    self.cache.put(keys::CONFIG, &fresh);
    Ok(fresh)
  }

  /// Update the existing row if one exists, insert otherwise. Failures
  /// propagate; a silent config save loss is not acceptable.
  pub async fn save(&self, config: &SiteConfig) -> Result<()> {
    let row = serde_json::to_value(config)
      .map_err(|e| eyre!("Failed to serialize site configuration: {}", e))?;

    let existing = self
      .remote
      .select(CONFIG_TABLE, SelectQuery::new().columns("id").limit(1))
      .await
      .map_err(Report::from)?;

    let result = match existing.first().and_then(|r| r.get("id")).and_then(Value::as_str) {
      Some(id) => self.remote.update(CONFIG_TABLE, id, row).await,
      None => self.remote.insert(CONFIG_TABLE, row).await.map(|_| ()),
    };
    result.map_err(|err| Report::from(err).wrap_err("Failed to save site configuration"))?;

    self.cache.put(keys::CONFIG, config);
    Ok(())
  }

  async fn fetch(remote: &R, retry: RetryPolicy) -> Result<SiteConfig> {
    // An empty table raises the no-rows sentinel inside the retried closure,
    // so it classifies as transient like any other PGRST116.
    let row = with_retry(retry, || async {
      let rows = remote
        .select(CONFIG_TABLE, SelectQuery::new().limit(1))
        .await
        .map_err(Report::from)?;
      rows
        .into_iter()
        .next()
        .ok_or_else(|| Report::from(RemoteError::NoRows))
    })
    .await?;

    serde_json::from_value(row).map_err(|e| eyre!("Failed to decode site configuration: {}", e))
  }

  fn spawn_refresh(&self) {
    let remote = Arc::clone(&self.remote);
    let cache = Arc::clone(&self.cache);
    let retry = self.retry;

    tokio::spawn(async move {
      match Self::fetch(remote.as_ref(), retry).await {
        Ok(fresh) => cache.put(keys::CONFIG, &fresh),
        Err(err) => debug!(%err, "background config refresh failed"),
      }
    });
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStore;
  use crate::remote::MemoryRemote;
  use crate::data::types::{DocumentCategory, MenuItem, Post, SchoolDocument};
  use serde_json::json;

  fn fast_retry() -> RetryPolicy {
    RetryPolicy {
      max_attempts: 2,
      base_delay: std::time::Duration::from_millis(1),
    }
  }

  fn accessor<T: Entity>(
    cache: &Arc<MemoryStore>,
    remote: &Arc<MemoryRemote>,
  ) -> Accessor<T, MemoryStore, MemoryRemote> {
    Accessor::new(Arc::clone(cache), Arc::clone(remote), fast_retry())
  }

  #[tokio::test]
  async fn test_save_then_get_roundtrips() {
    let cache = Arc::new(MemoryStore::new());
    let remote = Arc::new(MemoryRemote::new());
    let docs = accessor::<SchoolDocument>(&cache, &remote);

    let draft = SchoolDocument {
      id: Some(EntityId::temporary("doc")),
      number: "123/QD".to_string(),
      title: "Quyết định khai giảng".to_string(),
      date: "2024-09-05".to_string(),
      category_id: None,
      download_url: "https://example.com/doc.pdf".to_string(),
    };
    docs.save(&draft).await.unwrap();

    let fetched = docs.get_all().await.unwrap();
    assert_eq!(fetched.len(), 1);
    let saved = &fetched[0];
    assert!(saved.id.as_ref().unwrap().is_server_issued());
    assert_eq!(saved.number, draft.number);
    assert_eq!(saved.title, draft.title);
    assert_eq!(saved.date, draft.date);
    assert_eq!(saved.download_url, draft.download_url);
  }

  #[tokio::test]
  async fn test_temporary_id_inserts_new_row() {
    let cache = Arc::new(MemoryStore::new());
    let remote = Arc::new(MemoryRemote::new());
    let menu = accessor::<MenuItem>(&cache, &remote);

    let item = MenuItem {
      id: Some(EntityId::temporary("menu")),
      label: "Trang chủ".to_string(),
      path: "home".to_string(),
      order_index: 1,
    };
    menu.save(&item).await.unwrap();

    let rows = remote.rows("menu_items");
    assert_eq!(rows.len(), 1);
    let id = rows[0]["id"].as_str().unwrap();
    assert_eq!(id.len(), 36);
    assert!(!id.contains('_'));
  }

  #[tokio::test]
  async fn test_server_id_updates_in_place() {
    let cache = Arc::new(MemoryStore::new());
    let remote = Arc::new(MemoryRemote::new());
    let menu = accessor::<MenuItem>(&cache, &remote);

    let item = MenuItem {
      id: Some(EntityId::temporary("menu")),
      label: "Tin tức".to_string(),
      path: "news".to_string(),
      order_index: 2,
    };
    menu.save(&item).await.unwrap();
    let id = remote.rows("menu_items")[0]["id"].as_str().unwrap().to_string();

    let renamed = MenuItem {
      id: Some(EntityId::new(&id)),
      label: "Tin tức nhà trường".to_string(),
      path: "news".to_string(),
      order_index: 2,
    };
    menu.save(&renamed).await.unwrap();

    let rows = remote.rows("menu_items");
    assert_eq!(rows.len(), 1, "update must not create a duplicate row");
    assert_eq!(rows[0]["label"], "Tin tức nhà trường");
  }

  #[tokio::test]
  async fn test_save_invalidates_list_cache() {
    let cache = Arc::new(MemoryStore::new());
    let remote = Arc::new(MemoryRemote::new());
    let menu = accessor::<MenuItem>(&cache, &remote);

    cache.put_list(
      keys::MENU,
      &[MenuItem {
        id: None,
        label: "old".to_string(),
        path: "home".to_string(),
        order_index: 0,
      }],
    );

    let item = MenuItem {
      id: None,
      label: "new".to_string(),
      path: "home".to_string(),
      order_index: 0,
    };
    menu.save(&item).await.unwrap();

    assert!(!cache.contains(keys::MENU));
  }

  #[tokio::test]
  async fn test_cache_first_serves_stale_when_remote_down() {
    let cache = Arc::new(MemoryStore::new());
    let remote = Arc::new(MemoryRemote::new());
    let menu = accessor::<MenuItem>(&cache, &remote);

    let stale = vec![MenuItem {
      id: Some(EntityId::new("a81bc81b-dead-4e5d-abff-90865d1e13b1")),
      label: "Trang chủ".to_string(),
      path: "home".to_string(),
      order_index: 1,
    }];
    cache.put_list(keys::MENU, &stale);
    remote.fail_table("menu_items", RemoteError::Offline);

    let items = menu.get_all().await.unwrap();
    assert_eq!(items, stale);
  }

  #[tokio::test]
  async fn test_remote_first_falls_back_to_stale_then_empty() {
    let cache = Arc::new(MemoryStore::new());
    let remote = Arc::new(MemoryRemote::new());

    // Prime the doc-category cache through a successful read.
    remote.seed(
      "document_categories",
      vec![json!({ "id": "a81bc81b-dead-4e5d-abff-90865d1e13b1", "name": "Công văn", "order_index": 1 })],
    );
    let cats = accessor::<DocumentCategory>(&cache, &remote);
    let fresh = cats.get_all().await.unwrap();
    assert_eq!(fresh.len(), 1);

    remote.fail_table("document_categories", RemoteError::Timeout);
    let stale = cats.get_all().await.unwrap();
    assert_eq!(stale, fresh);

    // A kind with no cache key degrades to empty.
    remote.fail_table("documents", RemoteError::Timeout);
    let docs = accessor::<SchoolDocument>(&cache, &remote);
    assert!(docs.get_all().await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_critical_save_propagates_failure() {
    let cache = Arc::new(MemoryStore::new());
    let remote = Arc::new(MemoryRemote::new());
    remote.fail_table("posts", RemoteError::Denied("policy".to_string()));

    let posts = accessor::<Post>(&cache, &remote);
    let post = Post {
      title: "Thông báo".to_string(),
      status: "published".to_string(),
      ..Post::default()
    };
    assert!(posts.save(&post).await.is_err());

    // Non-critical kinds swallow the failure.
    remote.fail_table("documents", RemoteError::Denied("policy".to_string()));
    let docs = accessor::<SchoolDocument>(&cache, &remote);
    let doc = SchoolDocument {
      title: "x".to_string(),
      ..SchoolDocument::default()
    };
    assert!(docs.save(&doc).await.is_ok());
  }

  #[tokio::test]
  async fn test_delete_is_idempotent() {
    let cache = Arc::new(MemoryStore::new());
    let remote = Arc::new(MemoryRemote::new());
    let menu = accessor::<MenuItem>(&cache, &remote);

    let id = EntityId::new("a81bc81b-dead-4e5d-abff-90865d1e13b1");
    menu.delete(&id).await.unwrap();
    menu.delete(&id).await.unwrap();
  }

  #[tokio::test]
  async fn test_save_order_updates_each_row() {
    let cache = Arc::new(MemoryStore::new());
    let remote = Arc::new(MemoryRemote::new());
    remote.seed(
      "document_categories",
      vec![
        json!({ "id": "a81bc81b-dead-4e5d-abff-90865d1e13b1", "name": "A", "order_index": 1 }),
        json!({ "id": "b92cd92c-beef-4f6e-bcff-90865d1e13b2", "name": "B", "order_index": 2 }),
      ],
    );

    let cats = accessor::<DocumentCategory>(&cache, &remote);
    let mut items = cats.get_all().await.unwrap();
    items[0].order_index = 2;
    items[1].order_index = 1;
    cats.save_order(&items).await.unwrap();

    let rows = remote.rows("document_categories");
    let find = |name: &str| {
      rows
        .iter()
        .find(|r| r["name"] == name)
        .and_then(|r| r["order_index"].as_i64())
    };
    assert_eq!(find("A"), Some(2));
    assert_eq!(find("B"), Some(1));
  }

  #[tokio::test]
  async fn test_views_never_written_back() {
    let cache = Arc::new(MemoryStore::new());
    let remote = Arc::new(MemoryRemote::new());
    let posts = accessor::<Post>(&cache, &remote);

    let post = Post {
      title: "Bài viết".to_string(),
      status: "published".to_string(),
      views: 999,
      ..Post::default()
    };
    posts.save(&post).await.unwrap();

    let rows = remote.rows("posts");
    assert!(rows[0].get("views").is_none());
  }

  #[tokio::test]
  async fn test_config_empty_table_retries_as_no_rows() {
    let cache = Arc::new(MemoryStore::new());
    let remote = Arc::new(MemoryRemote::new());
    let config = ConfigAccessor::new(Arc::clone(&cache), Arc::clone(&remote), fast_retry());

    let err = config.get().await.unwrap_err();
    assert_eq!(err.downcast_ref::<RemoteError>(), Some(&RemoteError::NoRows));
    // The no-rows sentinel is transient, so the empty read burns the whole
    // attempt budget before surfacing.
    assert_eq!(remote.select_calls(), 2);
  }

  #[tokio::test]
  async fn test_config_roundtrip_and_default_on_miss() {
    let cache = Arc::new(MemoryStore::new());
    let remote = Arc::new(MemoryRemote::new());
    let config = ConfigAccessor::new(Arc::clone(&cache), Arc::clone(&remote), fast_retry());

    // Nothing remote, nothing cached: the error surfaces to the caller.
    assert!(config.get().await.is_err());

    let mut site = SiteConfig::default();
    site.phone = "0215 000 000".to_string();
    config.save(&site).await.unwrap();

    // The save cached the config; a cleared cache still reads it remotely.
    cache.remove(keys::CONFIG);
    let fetched = config.get().await.unwrap();
    assert_eq!(fetched, site);

    // Saving again updates the singleton row instead of inserting another.
    config.save(&site).await.unwrap();
    assert_eq!(remote.rows("school_config").len(), 1);
  }
}
