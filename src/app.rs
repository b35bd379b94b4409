//! Application state and the bootstrap fan-out.
//!
//! On startup every entity read is fired concurrently and merged into
//! [`AppState`]. Reads are individually fault-isolated: a failed staff or
//! gallery fetch degrades to an empty collection, while the two kinds the site
//! cannot render without, posts and the site configuration, surface a
//! degraded-data flag the caller can retry from. The blocking loader is shown
//! only on a genuinely first-ever visit, when neither is cached.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::cache::{keys, KvStore};
use crate::data::accessor::{Accessor, ConfigAccessor};
use crate::data::types::{
  DisplayBlock, DocumentCategory, EntityId, GalleryAlbum, GalleryImage, IntroArticle, MenuItem,
  Post, PostCategory, SchoolDocument, SiteConfig, StaffMember, UserProfile, Video,
};
use crate::data::Entity;
use crate::remote::Remote;
use crate::retry::RetryPolicy;
use crate::router::{HistorySink, Route, Router};
use crate::session::SessionHandle;

/// Everything the pages render from.
#[derive(Debug, Clone, Default)]
pub struct AppState {
  pub config: SiteConfig,
  pub posts: Vec<Post>,
  pub post_categories: Vec<PostCategory>,
  pub menu: Vec<MenuItem>,
  pub blocks: Vec<DisplayBlock>,
  pub staff: Vec<StaffMember>,
  pub documents: Vec<SchoolDocument>,
  pub doc_categories: Vec<DocumentCategory>,
  pub albums: Vec<GalleryAlbum>,
  pub images: Vec<GalleryImage>,
  pub videos: Vec<Video>,
  pub introductions: Vec<IntroArticle>,
  pub profiles: Vec<UserProfile>,

  /// Blocking loader, shown only while a cold-start refresh runs.
  pub loading: bool,
  /// Set when posts or the configuration could not be refreshed.
  pub data_error: Option<String>,
  /// The post currently open in the detail view.
  pub detail: Option<Post>,
}

pub struct App<S, R, H> {
  cache: Arc<S>,
  remote: Arc<R>,
  retry: RetryPolicy,
  pub session: SessionHandle,
  pub router: Router<H>,
  pub state: AppState,
}

fn sort_ordered<T: Entity>(items: &mut [T]) {
  items.sort_by_key(|item| item.order_index().unwrap_or(0));
}

impl<S: KvStore, R: Remote, H: HistorySink> App<S, R, H> {
  pub fn new(cache: Arc<S>, remote: Arc<R>, retry: RetryPolicy, history: H) -> Self {
    let session = SessionHandle::new();
    let router = Router::new(history, session.clone());
    Self {
      cache,
      remote,
      retry,
      session,
      router,
      state: AppState::default(),
    }
  }

  /// Accessor for one entity kind, sharing the app's cache and retry policy.
  pub fn accessor<T: Entity>(&self) -> Accessor<T, S, R> {
    Accessor::new(Arc::clone(&self.cache), Arc::clone(&self.remote), self.retry)
  }

  pub fn config_accessor(&self) -> ConfigAccessor<S, R> {
    ConfigAccessor::new(Arc::clone(&self.cache), Arc::clone(&self.remote), self.retry)
  }

  /// The blocking loader is justified only when there is neither a cached
  /// post list nor a cached configuration, a genuinely first-ever visit.
  /// Anything cached renders immediately and refreshes behind the scenes.
  pub fn should_show_loader(&self) -> bool {
    !self.cache.contains(keys::POSTS_HOME) && !self.cache.contains(keys::CONFIG)
  }

  pub async fn bootstrap(&mut self) {
    self.state.loading = self.should_show_loader();
    self.refresh().await;
    self.state.loading = false;
  }

  /// Clear the degraded-data flag and refetch everything.
  pub async fn retry_refresh(&mut self) {
    self.state.data_error = None;
    self.refresh().await;
  }

  /// Concurrent fan-out of all entity reads, merged into state.
  ///
  /// Non-critical collections degrade to empty on failure. A posts failure,
  /// or a successful-but-empty posts refetch, keeps whatever posts were
  /// already held rather than blanking the page.
  pub async fn refresh(&mut self) {
    let config_accessor = self.config_accessor();
    let posts_accessor = self.accessor::<Post>();

    let (
      config,
      posts,
      mut post_categories,
      mut menu,
      mut blocks,
      mut staff,
      documents,
      mut doc_categories,
      albums,
      images,
      mut videos,
      mut introductions,
      profiles,
    ) = tokio::join!(
      config_accessor.get(),
      posts_accessor.get_all(),
      self.isolated::<PostCategory>(),
      self.isolated::<MenuItem>(),
      self.isolated::<DisplayBlock>(),
      self.isolated::<StaffMember>(),
      self.isolated::<SchoolDocument>(),
      self.isolated::<DocumentCategory>(),
      self.isolated::<GalleryAlbum>(),
      self.isolated::<GalleryImage>(),
      self.isolated::<Video>(),
      self.isolated::<IntroArticle>(),
      self.isolated::<UserProfile>(),
    );

    match config {
      Ok(config) => self.state.config = config,
      Err(err) => {
        warn!(%err, "configuration refresh failed, using fallback");
        self.state.data_error = Some(err.to_string());
      }
    }

    match posts {
      Ok(posts) if posts.is_empty() && !self.state.posts.is_empty() => {
        debug!("empty posts refetch, keeping previously held posts");
      }
      Ok(posts) => self.state.posts = posts,
      Err(err) => {
        warn!(%err, "posts refresh failed, keeping previously held posts");
        self.state.data_error = Some(err.to_string());
      }
    }

    sort_ordered(&mut post_categories);
    sort_ordered(&mut menu);
    blocks.retain(|b| b.is_visible);
    sort_ordered(&mut blocks);
    sort_ordered(&mut staff);
    sort_ordered(&mut doc_categories);
    sort_ordered(&mut videos);
    introductions.retain(|i| i.is_visible);
    sort_ordered(&mut introductions);

    self.state.post_categories = post_categories;
    self.state.menu = menu;
    self.state.blocks = blocks;
    self.state.staff = staff;
    self.state.documents = documents;
    self.state.doc_categories = doc_categories;
    self.state.albums = albums;
    self.state.images = images;
    self.state.videos = videos;
    self.state.introductions = introductions;
    self.state.profiles = profiles;
  }

  async fn isolated<T: Entity>(&self) -> Vec<T> {
    match self.accessor::<T>().get_all().await {
      Ok(items) => items,
      Err(err) => {
        warn!(table = T::TABLE, %err, "read degraded to empty collection");
        Vec::new()
      }
    }
  }

  /// Fetch the post named by the current route's detail identifier.
  ///
  /// The in-flight fetch is not cancellable; instead the response is
  /// discarded if the route moved on while it was in flight.
  pub async fn load_post_detail(&mut self) -> color_eyre::Result<()> {
    let Some(requested) = self.router.current().detail_id.clone() else {
      self.state.detail = None;
      return Ok(());
    };

    let fetched = self
      .accessor::<Post>()
      .get_by_id(&EntityId::new(requested.clone()))
      .await?;

    if self.router.current().detail_id.as_deref() == Some(requested.as_str()) {
      self.state.detail = fetched;
    } else {
      debug!(requested, "discarding stale detail response");
    }
    Ok(())
  }

  /// Navigate and, when the target is a detail page, load its post.
  pub async fn navigate(&mut self, route: Route) -> color_eyre::Result<()> {
    self.router.navigate(route);
    self.load_post_detail().await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStore;
  use crate::remote::{MemoryRemote, RemoteError};
  use crate::router::NoopHistory;
  use serde_json::json;

  fn app() -> (
    Arc<MemoryStore>,
    Arc<MemoryRemote>,
    App<MemoryStore, MemoryRemote, NoopHistory>,
  ) {
    let cache = Arc::new(MemoryStore::new());
    let remote = Arc::new(MemoryRemote::new());
    let retry = RetryPolicy {
      max_attempts: 2,
      base_delay: std::time::Duration::from_millis(1),
    };
    let app = App::new(Arc::clone(&cache), Arc::clone(&remote), retry, NoopHistory);
    (cache, remote, app)
  }

  fn seed_minimum(remote: &MemoryRemote) {
    remote.seed(
      "school_config",
      vec![json!({ "id": "cfg", "name": "Trường Suối Lư", "home_news_count": 4 })],
    );
    remote.seed(
      "posts",
      vec![json!({
        "id": "a81bc81b-dead-4e5d-abff-90865d1e13b1",
        "title": "Khai giảng",
        "status": "published",
        "created_at": "2024-09-05T00:00:00Z"
      })],
    );
  }

  #[tokio::test]
  async fn test_loader_only_on_cold_start() {
    let (cache, remote, app) = app();
    seed_minimum(&remote);
    assert!(app.should_show_loader());

    cache.put_list(keys::POSTS_HOME, &[Post::default()]);
    assert!(!app.should_show_loader());
  }

  #[tokio::test]
  async fn test_bootstrap_merges_sorts_and_filters() {
    let (_, remote, mut app) = app();
    seed_minimum(&remote);
    remote.seed(
      "menu_items",
      vec![
        json!({ "id": "m2", "label": "Tin tức", "order_index": 2 }),
        json!({ "id": "m1", "label": "Trang chủ", "order_index": 1 }),
      ],
    );
    remote.seed(
      "display_blocks",
      vec![
        json!({ "id": "b1", "name": "Ẩn", "is_visible": false, "order_index": 1 }),
        json!({ "id": "b2", "name": "Tin nổi bật", "is_visible": true, "order_index": 2 }),
      ],
    );

    app.bootstrap().await;

    assert!(!app.state.loading);
    assert!(app.state.data_error.is_none());
    assert_eq!(app.state.config.name, "Trường Suối Lư");
    assert_eq!(app.state.posts.len(), 1);
    assert_eq!(app.state.menu[0].label, "Trang chủ");
    assert_eq!(app.state.blocks.len(), 1);
    assert_eq!(app.state.blocks[0].name, "Tin nổi bật");
  }

  #[tokio::test]
  async fn test_config_falls_back_to_default_on_failure() {
    let (_, remote, mut app) = app();
    seed_minimum(&remote);
    remote.fail_table("school_config", RemoteError::Offline);

    app.bootstrap().await;

    assert_eq!(app.state.config, SiteConfig::default());
    assert!(app.state.data_error.is_some());
  }

  #[tokio::test]
  async fn test_posts_failure_keeps_previous() {
    let (cache, remote, mut app) = app();
    seed_minimum(&remote);
    app.bootstrap().await;
    assert_eq!(app.state.posts.len(), 1);

    cache.remove(keys::POSTS_HOME);
    remote.fail_table("posts", RemoteError::Offline);
    app.retry_refresh().await;

    assert_eq!(app.state.posts.len(), 1);
    assert!(app.state.data_error.is_some());
  }

  #[tokio::test]
  async fn test_empty_posts_refetch_keeps_previous() {
    let (cache, remote, mut app) = app();
    seed_minimum(&remote);
    app.bootstrap().await;
    assert_eq!(app.state.posts.len(), 1);

    cache.remove(keys::POSTS_HOME);
    remote.seed("posts", Vec::new());
    app.retry_refresh().await;

    assert_eq!(app.state.posts.len(), 1);
    assert!(app.state.data_error.is_none());
  }

  #[tokio::test]
  async fn test_degraded_collections_are_isolated() {
    let (_, remote, mut app) = app();
    seed_minimum(&remote);
    remote.seed("videos", vec![json!({ "id": "v1", "title": "Lễ khai giảng" })]);
    remote.fail_table("staff_members", RemoteError::Timeout);

    app.bootstrap().await;

    assert!(app.state.staff.is_empty());
    assert_eq!(app.state.videos.len(), 1);
    assert!(app.state.data_error.is_none());
  }

  #[tokio::test]
  async fn test_detail_loads_for_current_route() {
    let (_, remote, mut app) = app();
    seed_minimum(&remote);

    app
      .navigate(Route::detail(
        "news-detail",
        "a81bc81b-dead-4e5d-abff-90865d1e13b1",
      ))
      .await
      .unwrap();
    assert_eq!(
      app.state.detail.as_ref().map(|p| p.title.as_str()),
      Some("Khai giảng")
    );

    app.navigate(Route::home()).await.unwrap();
    assert!(app.state.detail.is_none());
  }
}
