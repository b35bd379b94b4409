use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub remote: RemoteConfig,
  #[serde(default)]
  pub retry: RetryConfig,
  #[serde(default)]
  pub ai: AiConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
  /// Base URL of the hosted table service.
  pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RetryConfig {
  /// Attempt budget; defaults to 3.
  pub max_attempts: Option<u32>,
  /// First backoff delay in milliseconds; defaults to 1500.
  pub base_delay_ms: Option<u64>,
}

impl RetryConfig {
  pub fn policy(&self) -> RetryPolicy {
    let defaults = RetryPolicy::default();
    RetryPolicy {
      max_attempts: self.max_attempts.unwrap_or(defaults.max_attempts),
      base_delay: self
        .base_delay_ms
        .map(Duration::from_millis)
        .unwrap_or(defaults.base_delay),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AiConfig {
  /// Model identifier for text generation.
  #[serde(default = "default_ai_model")]
  pub model: String,
}

impl Default for AiConfig {
  fn default() -> Self {
    Self {
      model: default_ai_model(),
    }
  }
}

fn default_ai_model() -> String {
  "gemini-3-pro-preview".to_string()
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./school-portal.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/school-portal/config.yaml
  /// 4. ~/.config/school-portal/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/school-portal/config.yaml\n\
                 See config.example.yaml for the format."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("school-portal.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("school-portal").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  /// Get the table-service API key from environment variables.
  ///
  /// Checks SCHOOL_PORTAL_API_KEY first, then SUPABASE_ANON_KEY as fallback.
  pub fn get_api_key() -> Result<String> {
    std::env::var("SCHOOL_PORTAL_API_KEY")
      .or_else(|_| std::env::var("SUPABASE_ANON_KEY"))
      .map_err(|_| {
        eyre!(
          "API key not found. Set SCHOOL_PORTAL_API_KEY or SUPABASE_ANON_KEY environment variable."
        )
      })
  }

  /// Get the generative-AI API key from environment variables.
  ///
  /// Checks SCHOOL_PORTAL_AI_KEY first, then GEMINI_API_KEY as fallback.
  pub fn get_ai_key() -> Result<String> {
    std::env::var("SCHOOL_PORTAL_AI_KEY")
      .or_else(|_| std::env::var("GEMINI_API_KEY"))
      .map_err(|_| {
        eyre!("AI key not found. Set SCHOOL_PORTAL_AI_KEY or GEMINI_API_KEY environment variable.")
      })
  }
}
