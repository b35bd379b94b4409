//! Hosted generative-AI passthrough.
//!
//! Two thin calls to the model endpoint: lesson-plan drafting for teachers and
//! the classroom chat companion. No streaming, no local inference, just a
//! request body and the first candidate's text.

use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use url::Url;

use crate::config::{AiConfig, Config};

const GENERATE_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models/";

const CHAT_SYSTEM_INSTRUCTION: &str = "Bạn là Robot Đồng Hành của giáo viên trong lớp học. \
   Bạn vui vẻ, thông thái và trả lời ngắn gọn, dễ hiểu cho học sinh.";

/// One prior exchange in the chat companion's history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
  pub role: ChatRole,
  pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
  User,
  Model,
}

impl ChatRole {
  fn as_str(self) -> &'static str {
    match self {
      Self::User => "user",
      Self::Model => "model",
    }
  }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
  #[serde(default)]
  candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
  content: Content,
}

#[derive(Debug, Deserialize)]
struct Content {
  #[serde(default)]
  parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
  #[serde(default)]
  text: String,
}

pub struct AiClient {
  http: reqwest::Client,
  model: String,
  api_key: String,
}

impl AiClient {
  pub fn new(config: &AiConfig) -> Result<Self> {
    Ok(Self {
      http: reqwest::Client::new(),
      model: config.model.clone(),
      api_key: Config::get_ai_key()?,
    })
  }

  fn generate_url(&self) -> Result<Url> {
    let mut url = Url::parse(GENERATE_BASE)
      .and_then(|base| base.join(&format!("{}:generateContent", self.model)))
      .map_err(|e| eyre!("Invalid model endpoint: {}", e))?;
    url.query_pairs_mut().append_pair("key", &self.api_key);
    Ok(url)
  }

  async fn generate(&self, body: Value) -> Result<String> {
    let response = self
      .http
      .post(self.generate_url()?)
      .json(&body)
      .send()
      .await?
      .error_for_status()
      .map_err(|e| eyre!("Model request failed: {}", e))?;

    let parsed: GenerateResponse = response.json().await?;
    parsed
      .candidates
      .into_iter()
      .next()
      .and_then(|c| c.content.parts.into_iter().next())
      .map(|p| p.text)
      .ok_or_else(|| eyre!("Model returned no candidates"))
  }

  /// Draft a structured lesson plan for a topic and grade level.
  pub async fn generate_lesson_plan(&self, topic: &str, grade: &str) -> Result<String> {
    let prompt = format!(
      "Bạn là một trợ lý giáo dục chuyên nghiệp. Hãy soạn một giáo án chi tiết \
       cho chủ đề: \"{}\" cho lớp {}. Cấu trúc giáo án gồm: Mục tiêu, Chuẩn bị, \
       Hoạt động khởi động, Hoạt động hình thành kiến thức, Hoạt động luyện tập, Vận dụng.",
      topic, grade
    );
    self
      .generate(json!({
        "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
        "generationConfig": { "temperature": 0.7, "topP": 0.95 },
      }))
      .await
  }

  /// One chat-companion exchange. History is sent as prior turns.
  pub async fn chat(&self, history: &[ChatTurn], message: &str) -> Result<String> {
    let mut contents: Vec<Value> = history
      .iter()
      .map(|turn| {
        json!({
          "role": turn.role.as_str(),
          "parts": [{ "text": turn.text }],
        })
      })
      .collect();
    contents.push(json!({ "role": "user", "parts": [{ "text": message }] }));

    self
      .generate(json!({
        "contents": contents,
        "systemInstruction": { "parts": [{ "text": CHAT_SYSTEM_INSTRUCTION }] },
      }))
      .await
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_response_text_extraction() {
    let parsed: GenerateResponse = serde_json::from_value(json!({
      "candidates": [
        { "content": { "parts": [{ "text": "Giáo án mẫu" }] } }
      ]
    }))
    .unwrap();

    let text = parsed
      .candidates
      .into_iter()
      .next()
      .and_then(|c| c.content.parts.into_iter().next())
      .map(|p| p.text);
    assert_eq!(text.as_deref(), Some("Giáo án mẫu"));
  }

  #[test]
  fn test_empty_candidates_deserialize() {
    let parsed: GenerateResponse = serde_json::from_value(json!({})).unwrap();
    assert!(parsed.candidates.is_empty());
  }
}
