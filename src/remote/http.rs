//! REST client for the hosted table service (PostgREST-style endpoints).

use color_eyre::{eyre::eyre, Result};
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::config::Config;

use super::{Remote, RemoteError, SelectQuery};

/// Error body shape reported by the service.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
  code: Option<String>,
  message: Option<String>,
}

#[derive(Clone)]
pub struct HttpRemote {
  http: reqwest::Client,
  base: Url,
  api_key: String,
}

impl HttpRemote {
  pub fn new(config: &Config) -> Result<Self> {
    let api_key = Config::get_api_key()?;
    let base = Url::parse(&config.remote.url)
      .map_err(|e| eyre!("Invalid remote url {}: {}", config.remote.url, e))?;

    Ok(Self {
      http: reqwest::Client::new(),
      base,
      api_key,
    })
  }

  fn table_url(&self, table: &str) -> Url {
    let mut url = self.base.clone();
    url.set_path(&format!("/rest/v1/{}", table));
    url
  }

  fn rpc_url(&self, name: &str) -> Url {
    let mut url = self.base.clone();
    url.set_path(&format!("/rest/v1/rpc/{}", name));
    url
  }

  fn apply_query(url: &mut Url, query: &SelectQuery) {
    let mut pairs = url.query_pairs_mut();
    if let Some(columns) = query.columns {
      pairs.append_pair("select", columns);
    }
    for (column, value) in &query.eq {
      pairs.append_pair(column, &format!("eq.{}", value));
    }
    for (column, value) in &query.gt {
      pairs.append_pair(column, &format!("gt.{}", value));
    }
    if let Some((column, ascending)) = &query.order {
      let direction = if *ascending { "asc" } else { "desc" };
      pairs.append_pair("order", &format!("{}.{}", column, direction));
    }
    if let Some(limit) = query.limit {
      pairs.append_pair("limit", &limit.to_string());
    }
  }

  async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, RemoteError> {
    let response = request
      .header("apikey", &self.api_key)
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .send()
      .await
      .map_err(map_transport)?;

    if response.status().is_success() {
      Ok(response)
    } else {
      Err(map_status(response).await)
    }
  }
}

fn map_transport(err: reqwest::Error) -> RemoteError {
  if err.is_timeout() {
    RemoteError::Timeout
  } else if err.is_connect() {
    RemoteError::Offline
  } else {
    RemoteError::Transport(err.to_string())
  }
}

async fn map_status(response: reqwest::Response) -> RemoteError {
  let status = response.status();
  let body = response.text().await.unwrap_or_default();
  let parsed: Option<ApiErrorBody> = serde_json::from_str(&body).ok();
  let (code, message) = match parsed {
    Some(err) => (err.code, err.message.unwrap_or_default()),
    None => (None, body),
  };

  if code.as_deref() == Some("PGRST116") {
    return RemoteError::NoRows;
  }
  if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
    return RemoteError::Denied(message);
  }
  RemoteError::Api { code, message }
}

impl Remote for HttpRemote {
  async fn select(&self, table: &str, query: SelectQuery) -> Result<Vec<Value>, RemoteError> {
    let mut url = self.table_url(table);
    Self::apply_query(&mut url, &query);

    let response = self.send(self.http.get(url)).await?;
    response
      .json::<Vec<Value>>()
      .await
      .map_err(|e| RemoteError::Decode(e.to_string()))
  }

  async fn count(&self, table: &str, query: SelectQuery) -> Result<u64, RemoteError> {
    // Identifier-only select; row counts here are small (active sessions).
    let rows = self.select(table, query.columns("id")).await?;
    Ok(rows.len() as u64)
  }

  async fn insert(&self, table: &str, row: Value) -> Result<Value, RemoteError> {
    let response = self
      .send(
        self
          .http
          .post(self.table_url(table))
          .header("Prefer", "return=representation")
          .json(&row),
      )
      .await?;

    let mut rows: Vec<Value> = response
      .json()
      .await
      .map_err(|e| RemoteError::Decode(e.to_string()))?;
    if rows.is_empty() {
      return Err(RemoteError::Decode("empty insert response".to_string()));
    }
    Ok(rows.remove(0))
  }

  async fn update(&self, table: &str, id: &str, row: Value) -> Result<(), RemoteError> {
    let mut url = self.table_url(table);
    url
      .query_pairs_mut()
      .append_pair("id", &format!("eq.{}", id));

    self.send(self.http.patch(url).json(&row)).await?;
    Ok(())
  }

  async fn upsert(&self, table: &str, row: Value, on_conflict: &str) -> Result<(), RemoteError> {
    let mut url = self.table_url(table);
    url.query_pairs_mut().append_pair("on_conflict", on_conflict);

    self
      .send(
        self
          .http
          .post(url)
          .header("Prefer", "resolution=merge-duplicates")
          .json(&row),
      )
      .await?;
    Ok(())
  }

  async fn delete(&self, table: &str, id: &str) -> Result<(), RemoteError> {
    let mut url = self.table_url(table);
    url
      .query_pairs_mut()
      .append_pair("id", &format!("eq.{}", id));

    self.send(self.http.delete(url)).await?;
    Ok(())
  }

  async fn rpc(&self, name: &str) -> Result<(), RemoteError> {
    self
      .send(self.http.post(self.rpc_url(name)).json(&serde_json::json!({})))
      .await?;
    Ok(())
  }
}
