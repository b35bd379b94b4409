//! Authenticated-session state.
//!
//! One process-wide handle with a `uninitialized -> authenticated | anonymous`
//! lifecycle. All mutation goes through [`SessionHandle::apply`], the single
//! subscription entry point; navigation guards and accessors only read.

use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use tokio::sync::watch;
use url::Url;

use crate::config::Config;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUser {
  pub id: String,
  pub email: String,
  pub username: String,
}

impl SessionUser {
  pub fn from_email(id: String, email: String) -> Self {
    let username = email.split('@').next().unwrap_or("admin").to_string();
    Self {
      id,
      email,
      username,
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionState {
  /// Before the first auth callback has fired.
  #[default]
  Uninitialized,
  Authenticated(SessionUser),
  Anonymous,
}

impl SessionState {
  pub fn is_authenticated(&self) -> bool {
    matches!(self, Self::Authenticated(_))
  }

  pub fn user(&self) -> Option<&SessionUser> {
    match self {
      Self::Authenticated(user) => Some(user),
      _ => None,
    }
  }
}

/// Shared handle over the session watch channel.
#[derive(Clone)]
pub struct SessionHandle {
  tx: watch::Sender<SessionState>,
}

impl SessionHandle {
  pub fn new() -> Self {
    let (tx, _rx) = watch::channel(SessionState::Uninitialized);
    Self { tx }
  }

  pub fn current(&self) -> SessionState {
    self.tx.borrow().clone()
  }

  pub fn is_authenticated(&self) -> bool {
    self.tx.borrow().is_authenticated()
  }

  /// Observe session changes (auth callback, logout).
  pub fn subscribe(&self) -> watch::Receiver<SessionState> {
    self.tx.subscribe()
  }

  /// Apply an auth-state change. `None` means signed out.
  pub fn apply(&self, user: Option<SessionUser>) {
    let next = match user {
      Some(user) => SessionState::Authenticated(user),
      None => SessionState::Anonymous,
    };
    self.tx.send_replace(next);
  }
}

impl Default for SessionHandle {
  fn default() -> Self {
    Self::new()
  }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
  access_token: String,
  user: TokenUser,
}

#[derive(Debug, Deserialize)]
struct TokenUser {
  id: String,
  email: Option<String>,
}

/// Thin client for the hosted auth endpoints.
pub struct AuthClient {
  http: reqwest::Client,
  base: Url,
  api_key: String,
  access_token: std::sync::Mutex<Option<String>>,
}

impl AuthClient {
  pub fn new(config: &Config) -> Result<Self> {
    let base = Url::parse(&config.remote.url)
      .map_err(|e| eyre!("Invalid remote url {}: {}", config.remote.url, e))?;
    Ok(Self {
      http: reqwest::Client::new(),
      base,
      api_key: Config::get_api_key()?,
      access_token: std::sync::Mutex::new(None),
    })
  }

  fn auth_url(&self, path: &str) -> Url {
    let mut url = self.base.clone();
    url.set_path(&format!("/auth/v1/{}", path));
    url
  }

  /// Password sign-in. On success the session handle flips to authenticated.
  pub async fn sign_in(
    &self,
    session: &SessionHandle,
    email: &str,
    password: &str,
  ) -> Result<SessionUser> {
    let mut url = self.auth_url("token");
    url.query_pairs_mut().append_pair("grant_type", "password");

    let response = self
      .http
      .post(url)
      .header("apikey", &self.api_key)
      .json(&serde_json::json!({ "email": email, "password": password }))
      .send()
      .await?
      .error_for_status()
      .map_err(|e| eyre!("Sign-in failed: {}", e))?;

    let token: TokenResponse = response.json().await?;
    if let Ok(mut guard) = self.access_token.lock() {
      *guard = Some(token.access_token);
    }

    let user = SessionUser::from_email(
      token.user.id,
      token.user.email.unwrap_or_default(),
    );
    session.apply(Some(user.clone()));
    Ok(user)
  }

  /// Sign out and flip the session handle to anonymous. Best effort on the
  /// remote side; local state is cleared regardless.
  pub async fn sign_out(&self, session: &SessionHandle) {
    let token = self
      .access_token
      .lock()
      .ok()
      .and_then(|mut guard| guard.take());

    if let Some(token) = token {
      let result = self
        .http
        .post(self.auth_url("logout"))
        .header("apikey", &self.api_key)
        .bearer_auth(token)
        .send()
        .await;
      if let Err(err) = result {
        tracing::debug!(%err, "remote sign-out failed");
      }
    }
    session.apply(None);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_lifecycle_transitions() {
    let handle = SessionHandle::new();
    assert_eq!(handle.current(), SessionState::Uninitialized);
    assert!(!handle.is_authenticated());

    handle.apply(Some(SessionUser::from_email(
      "u1".to_string(),
      "principal@school.edu.vn".to_string(),
    )));
    assert!(handle.is_authenticated());
    let state = handle.current();
    assert_eq!(state.user().map(|u| u.username.as_str()), Some("principal"));

    handle.apply(None);
    assert_eq!(handle.current(), SessionState::Anonymous);
    assert!(!handle.is_authenticated());
  }

  #[test]
  fn test_subscription_sees_changes() {
    let handle = SessionHandle::new();
    let rx = handle.subscribe();

    handle.apply(None);
    assert_eq!(*rx.borrow(), SessionState::Anonymous);
  }
}
