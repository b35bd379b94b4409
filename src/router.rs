//! Query-string routing.
//!
//! The whole wire format is `?page=<pageId>[&id=<entityId>]`. Parsing is
//! forgiving: a missing or mangled query resolves to the home page. Navigation
//! to an administrative page without an authenticated session is redirected to
//! the login page, and a successful login lands on the dashboard.

use tracing::{debug, warn};
use url::Url;

use crate::session::SessionHandle;

pub const HOME: &str = "home";
pub const LOGIN: &str = "login";
pub const ADMIN_DASHBOARD: &str = "admin-dashboard";

/// Page identifiers behind the navigation guard all carry this prefix.
const ADMIN_PREFIX: &str = "admin";

/// Base used to resolve relative location strings.
const PARSE_BASE: &str = "http://localhost/";

/// The resolved location: which page, and which entity if the page shows one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
  pub page: String,
  pub detail_id: Option<String>,
}

impl Route {
  pub fn home() -> Self {
    Self::page(HOME)
  }

  pub fn page(page: &str) -> Self {
    Self {
      page: page.to_string(),
      detail_id: None,
    }
  }

  pub fn detail(page: &str, id: &str) -> Self {
    Self {
      page: page.to_string(),
      detail_id: Some(id.to_string()),
    }
  }

  pub fn is_admin(&self) -> bool {
    self.page.starts_with(ADMIN_PREFIX)
  }

  /// Parse a location (path plus query). Anything unparsable is home.
  pub fn parse_location(location: &str) -> Self {
    let Ok(base) = Url::parse(PARSE_BASE) else {
      return Self::home();
    };
    let Ok(url) = base.join(location) else {
      debug!(location, "unparsable location, resolving to home");
      return Self::home();
    };

    let mut page = None;
    let mut detail_id = None;
    for (key, value) in url.query_pairs() {
      match key.as_ref() {
        "page" => page = Some(value.into_owned()),
        "id" => detail_id = Some(value.into_owned()),
        _ => {}
      }
    }

    match page {
      Some(page) if !page.is_empty() => Self { page, detail_id },
      _ => Self::home(),
    }
  }

  /// Serialize back to a location string.
  ///
  /// Home is the bare root and the login page hides behind `/admin`, so the
  /// common addresses stay clean; everything else uses the query form.
  pub fn to_location(&self) -> String {
    if self.page == HOME {
      return "/".to_string();
    }
    if self.page == LOGIN {
      return "/admin".to_string();
    }
    match &self.detail_id {
      Some(id) => format!("/?page={}&id={}", self.page, id),
      None => format!("/?page={}", self.page),
    }
  }
}

/// Where committed routes are pushed so back/forward style navigation works.
///
/// Pushing is fail-soft: a sink error is logged and the in-memory route still
/// changes.
pub trait HistorySink: Send + Sync {
  fn push(&self, location: &str) -> color_eyre::Result<()>;
}

/// Sink for contexts with no history stack (tests, headless runs).
pub struct NoopHistory;

impl HistorySink for NoopHistory {
  fn push(&self, _location: &str) -> color_eyre::Result<()> {
    Ok(())
  }
}

pub struct Router<H> {
  history: H,
  session: SessionHandle,
  current: Route,
}

impl<H: HistorySink> Router<H> {
  pub fn new(history: H, session: SessionHandle) -> Self {
    Self {
      history,
      session,
      current: Route::home(),
    }
  }

  pub fn current(&self) -> &Route {
    &self.current
  }

  /// Navigate to a route, applying the admin guard.
  ///
  /// An administrative target without an authenticated session lands on the
  /// login page instead. Returns the route actually committed.
  pub fn navigate(&mut self, route: Route) -> &Route {
    let resolved = if route.is_admin() && !self.session.is_authenticated() {
      debug!(page = %route.page, "unauthenticated admin navigation, redirecting to login");
      Route::page(LOGIN)
    } else {
      route
    };
    self.commit(resolved)
  }

  /// Reconcile with an externally observed location change.
  pub fn handle_location(&mut self, location: &str) -> &Route {
    self.navigate(Route::parse_location(location))
  }

  /// After a successful sign-in the login page's back target is the
  /// dashboard.
  pub fn login_succeeded(&mut self) -> &Route {
    self.commit(Route::page(ADMIN_DASHBOARD))
  }

  pub fn logged_out(&mut self) -> &Route {
    self.commit(Route::page(LOGIN))
  }

  fn commit(&mut self, route: Route) -> &Route {
    if let Err(err) = self.history.push(&route.to_location()) {
      warn!(%err, "history push failed");
    }
    self.current = route;
    &self.current
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::session::SessionUser;
  use std::sync::Mutex;

  struct RecordingHistory {
    pushed: Mutex<Vec<String>>,
  }

  impl RecordingHistory {
    fn new() -> Self {
      Self {
        pushed: Mutex::new(Vec::new()),
      }
    }
  }

  impl HistorySink for &RecordingHistory {
    fn push(&self, location: &str) -> color_eyre::Result<()> {
      self.pushed.lock().unwrap().push(location.to_string());
      Ok(())
    }
  }

  struct FailingHistory;

  impl HistorySink for FailingHistory {
    fn push(&self, _location: &str) -> color_eyre::Result<()> {
      Err(color_eyre::eyre::eyre!("history unavailable"))
    }
  }

  #[test]
  fn test_parse_page_and_detail() {
    let route = Route::parse_location("/?page=news-detail&id=42");
    assert_eq!(route, Route::detail("news-detail", "42"));
  }

  #[test]
  fn test_parse_defaults_to_home() {
    assert_eq!(Route::parse_location("/"), Route::home());
    assert_eq!(Route::parse_location("/?id=42"), Route::home());
    assert_eq!(Route::parse_location("http://[broken"), Route::home());
  }

  #[test]
  fn test_location_round_trip() {
    assert_eq!(Route::home().to_location(), "/");
    assert_eq!(Route::page(LOGIN).to_location(), "/admin");
    assert_eq!(Route::page("news").to_location(), "/?page=news");
    assert_eq!(
      Route::detail("news-detail", "42").to_location(),
      "/?page=news-detail&id=42"
    );
  }

  #[test]
  fn test_admin_guard_redirects_to_login() {
    let history = RecordingHistory::new();
    let session = SessionHandle::new();
    let mut router = Router::new(&history, session);

    router.navigate(Route::page(ADMIN_DASHBOARD));
    assert_eq!(router.current().page, LOGIN);
    assert_eq!(
      history.pushed.lock().unwrap().as_slice(),
      &["/admin".to_string()]
    );
  }

  #[test]
  fn test_authenticated_admin_navigation_passes() {
    let session = SessionHandle::new();
    session.apply(Some(SessionUser::from_email(
      "u1".to_string(),
      "admin@school.edu.vn".to_string(),
    )));
    let mut router = Router::new(NoopHistory, session);

    router.navigate(Route::page(ADMIN_DASHBOARD));
    assert_eq!(router.current().page, ADMIN_DASHBOARD);
  }

  #[test]
  fn test_login_lands_on_dashboard() {
    let mut router = Router::new(NoopHistory, SessionHandle::new());
    router.navigate(Route::page("admin-posts"));
    assert_eq!(router.current().page, LOGIN);

    router.login_succeeded();
    assert_eq!(router.current().page, ADMIN_DASHBOARD);

    router.logged_out();
    assert_eq!(router.current().page, LOGIN);
  }

  #[test]
  fn test_history_failure_still_commits() {
    let mut router = Router::new(FailingHistory, SessionHandle::new());
    router.navigate(Route::page("news"));
    assert_eq!(router.current().page, "news");
  }
}
