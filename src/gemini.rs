use std::sync::OnceLock;

use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::oracle::{Generate, PERSONA};

pub const DEFAULT_MODEL: &str = "gemini-3-flash-preview";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    top_p: f64,
    top_k: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    system_instruction: SystemInstruction,
    generation_config: GenerationConfig,
}

#[derive(Deserialize)]
struct ReplyPart {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct ReplyContent {
    #[serde(default)]
    parts: Vec<ReplyPart>,
}

#[derive(Deserialize)]
struct Candidate {
    content: ReplyContent,
}

#[derive(Deserialize)]
struct GenerateReply {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

impl GenerateReply {
    /// First candidate's first part. An absent or empty part yields an empty
    /// string, which the oracle session turns into its silence fallback.
    fn into_text(self) -> String {
        self.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .unwrap_or_default()
    }
}

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: &str, model: &str, api_base: &str) -> Self {
        Self {
            client: Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }

    /// Build a client from the environment and the config file, env var
    /// first. `model` overrides both when given.
    pub fn from_env(model: Option<&str>) -> Result<Self> {
        let config = Config::load().unwrap_or_else(|_| Config::new());
        let api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .or(config.api_key)
            .ok_or_else(|| anyhow!("GEMINI_API_KEY not set and no key in config"))?;
        let model = model
            .map(str::to_string)
            .or(config.model)
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let api_base = config
            .api_base
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        Ok(Self::new(&api_key, &model, &api_base))
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// One `generateContent` call: the question as the sole user content,
    /// the persona as system instruction, the fixed sampling parameters.
    pub async fn query(&self, question: &str) -> Result<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.api_base, self.model, self.api_key
        );

        let request = GenerateRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![Part {
                    text: question.to_string(),
                }],
            }],
            system_instruction: SystemInstruction {
                parts: vec![Part {
                    text: PERSONA.to_string(),
                }],
            },
            generation_config: GenerationConfig {
                temperature: 1.2,
                top_p: 0.95,
                top_k: 40,
            },
        };

        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Gemini API error {}: {}", status, text));
        }

        let reply: GenerateReply = response.json().await?;
        Ok(reply.into_text())
    }
}

impl Generate for GeminiClient {
    async fn generate(&self, question: &str) -> Result<String> {
        self.query(question).await
    }
}

/// Process-wide client handle, constructed on first use. Stateless and safe
/// to share; there is no teardown. A missing credential surfaces as an error
/// on every consultation, not at startup.
static CLIENT: OnceLock<Option<GeminiClient>> = OnceLock::new();

pub fn shared() -> Result<&'static GeminiClient> {
    CLIENT
        .get_or_init(|| match GeminiClient::from_env(None) {
            Ok(client) => Some(client),
            Err(err) => {
                log::warn!("oracle client unavailable: {err:#}");
                None
            }
        })
        .as_ref()
        .ok_or_else(|| anyhow!("GEMINI_API_KEY not set and no key in config"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_text_is_first_candidate_first_part() {
        let reply: GenerateReply = serde_json::from_str(
            r#"{"candidates": [
                {"content": {"parts": [{"text": "prima"}, {"text": "seconda"}]}},
                {"content": {"parts": [{"text": "altra"}]}}
            ]}"#,
        )
        .unwrap();
        assert_eq!(reply.into_text(), "prima");
    }

    #[test]
    fn test_reply_without_candidates_is_empty() {
        let reply: GenerateReply = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(reply.into_text(), "");

        let reply: GenerateReply =
            serde_json::from_str(r#"{"candidates": [{"content": {}}]}"#).unwrap();
        assert_eq!(reply.into_text(), "");
    }

    #[test]
    fn test_request_wire_format() {
        let request = GenerateRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![Part {
                    text: "chi sei?".to_string(),
                }],
            }],
            system_instruction: SystemInstruction {
                parts: vec![Part {
                    text: PERSONA.to_string(),
                }],
            },
            generation_config: GenerationConfig {
                temperature: 1.2,
                top_p: 0.95,
                top_k: 40,
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["contents"][0]["parts"][0]["text"], "chi sei?");
        assert_eq!(json["generationConfig"]["topP"], 0.95);
        assert_eq!(json["generationConfig"]["topK"], 40);
        assert!(json["systemInstruction"]["parts"][0]["text"]
            .as_str()
            .unwrap()
            .contains("Ombra di Gabriele D'Annunzio"));
    }

    #[test]
    fn test_api_base_trailing_slash_is_trimmed() {
        let client = GeminiClient::new("k", DEFAULT_MODEL, "http://localhost:8080/");
        assert_eq!(client.api_base, "http://localhost:8080");
    }
}
