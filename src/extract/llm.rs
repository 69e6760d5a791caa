// src/extract/llm.rs

use super::{Document, PriceExtractor, pdf};
use crate::config::{LlmBackend, LlmSection};
use crate::error::{Error, Result};
use crate::manual::parse_price;
use crate::model::PriceEntry;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

const SYSTEM_PROMPT: &str = r#"You are a price list extraction assistant.
Given a supplier price list (PDF text or an image of it), list every product
with its net purchase price and return ONLY valid JSON.

The JSON must be an array of objects matching this schema exactly:
[
  { "product": "string, the product name as printed", "price": number }
]

Notes:
- Use the base net purchase price per unit as printed. Ignore taxes, deposits and discounts.
- Use a dot as decimal separator.
- Skip headers, page numbers, sums and totals.
- The text may be garbled due to PDF column extraction issues. Do your best to reconstruct the rows.
- Return ONLY the JSON array, no markdown fences, no commentary."#;

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: MessageContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    content: Option<String>,
}

/// Models sometimes quote prices or use a decimal comma.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ReplyPrice {
    Number(f64),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct ReplyEntry {
    product: String,
    price: ReplyPrice,
}

/// Resolved endpoint configuration ready to make API calls.
#[derive(Debug, Clone)]
struct ResolvedEndpoint {
    base_url: String,
    model: String,
    api_key: String,
}

fn resolve_endpoint(llm: &LlmSection) -> Result<ResolvedEndpoint> {
    match llm.backend {
        LlmBackend::Ollama => {
            info!(url = %llm.ollama.base_url, model = %llm.ollama.model, "Using Ollama (local) backend");
            Ok(ResolvedEndpoint {
                base_url: llm.ollama.base_url.clone(),
                model: llm.ollama.model.clone(),
                api_key: "ollama".to_string(), // required by API but ignored
            })
        }
        LlmBackend::Cliproxy => {
            info!(url = %llm.cliproxy.base_url, model = %llm.cliproxy.model, "Using CLIProxyAPI backend");
            Ok(ResolvedEndpoint {
                base_url: llm.cliproxy.base_url.clone(),
                model: llm.cliproxy.model.clone(),
                api_key: "cliproxy".to_string(), // the proxy holds the credentials
            })
        }
        LlmBackend::Remote => {
            let api_key = std::env::var("LLM_API_KEY").map_err(|_| {
                Error::Config("LLM_API_KEY env var required for remote backend".to_string())
            })?;
            info!(url = %llm.remote.base_url, model = %llm.remote.model, "Using remote API backend");
            Ok(ResolvedEndpoint {
                base_url: llm.remote.base_url.clone(),
                model: llm.remote.model.clone(),
                api_key,
            })
        }
        LlmBackend::Heuristics => Err(Error::Config(
            "heuristics backend selected, no LLM endpoint to resolve".to_string(),
        )),
    }
}

/// Check if the Ollama server is reachable.
async fn check_ollama_health(client: &Client, base_url: &str) -> bool {
    // Ollama's health endpoint is at the root (not under /v1)
    let health_url = base_url.trim_end_matches('/').trim_end_matches("/v1");

    match client
        .get(health_url)
        .timeout(std::time::Duration::from_secs(3))
        .send()
        .await
    {
        Ok(resp) if resp.status().is_success() => {
            info!("Ollama server is reachable");
            true
        }
        Ok(resp) => {
            warn!(status = %resp.status(), "Ollama server returned non-OK status");
            false
        }
        Err(e) => {
            warn!(error = %e, "Ollama server not reachable");
            false
        }
    }
}

/// Price list extraction through an OpenAI-compatible chat completions API.
#[derive(Debug, Clone)]
pub struct LlmExtractor {
    client: Client,
    backend: LlmBackend,
    endpoint: ResolvedEndpoint,
    max_chars: usize,
}

impl LlmExtractor {
    pub fn from_config(llm: &LlmSection) -> Result<Self> {
        Ok(Self {
            client: Client::new(),
            backend: llm.backend,
            endpoint: resolve_endpoint(llm)?,
            max_chars: llm.max_chars,
        })
    }

    fn user_content(&self, document: &Document) -> Result<MessageContent> {
        if document.is_pdf() {
            let text = pdf::pdf_text(&document.bytes)?;
            let text = truncate_chars(&text, self.max_chars);
            return Ok(MessageContent::Text(format!(
                "Extract the price list from the following PDF text:\n\n{text}"
            )));
        }
        let url = format!(
            "data:{};base64,{}",
            document.mime_type,
            STANDARD.encode(&document.bytes)
        );
        Ok(MessageContent::Parts(vec![
            ContentPart::Text {
                text: "Extract the price list from this image.".to_string(),
            },
            ContentPart::ImageUrl {
                image_url: ImageUrl { url },
            },
        ]))
    }

    async fn complete(&self, content: MessageContent) -> Result<String> {
        let request = ChatRequest {
            model: self.endpoint.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: MessageContent::Text(SYSTEM_PROMPT.to_string()),
                },
                ChatMessage {
                    role: "user",
                    content,
                },
            ],
            temperature: 0.0,
        };

        let url = format!("{}/chat/completions", self.endpoint.base_url);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.endpoint.api_key))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::extraction(format!("LLM API error {status}: {body}")));
        }

        let chat_response: ChatResponse = response.json().await?;
        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::extraction("empty response from LLM"))
    }
}

#[async_trait]
impl PriceExtractor for LlmExtractor {
    async fn extract(&self, document: &Document) -> Result<Vec<PriceEntry>> {
        if self.backend == LlmBackend::Ollama
            && !check_ollama_health(&self.client, &self.endpoint.base_url).await
        {
            return Err(Error::extraction(format!(
                "Ollama is not running at {}. Start it with: ollama serve",
                self.endpoint.base_url
            )));
        }

        let content = self.user_content(document)?;
        info!(model = %self.endpoint.model, "Sending price list to LLM");
        let reply = self.complete(content).await?;
        parse_reply(&reply)
    }

    fn name(&self) -> &'static str {
        "llm"
    }
}

/// Cut `text` after `max_chars` characters.
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    text.char_indices()
        .nth(max_chars)
        .map_or(text, |(idx, _)| &text[..idx])
}

fn parse_reply(content: &str) -> Result<Vec<PriceEntry>> {
    // Strip markdown fences if the model added them despite instructions
    let json_str = content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    let json_str = extract_json_array(json_str)?;

    let entries: Vec<ReplyEntry> = serde_json::from_str(json_str).map_err(|e| {
        Error::extraction(format!("LLM reply is not a price list: {e}\nRaw: {json_str}"))
    })?;

    Ok(entries
        .into_iter()
        .map(|entry| {
            let price = match entry.price {
                ReplyPrice::Number(p) => p,
                // unparseable prices are dropped later by sanitize_entries
                ReplyPrice::Text(raw) => parse_price(&raw).unwrap_or(f64::NAN),
            };
            PriceEntry::new(entry.product, price)
        })
        .collect())
}

/// Outermost JSON array in a reply that may carry reasoning text around it.
fn extract_json_array(s: &str) -> Result<&str> {
    let start = s
        .find('[')
        .ok_or_else(|| Error::extraction("no '[' found in LLM response"))?;
    let end = s
        .rfind(']')
        .ok_or_else(|| Error::extraction("no ']' found in LLM response"))?;
    if end <= start {
        return Err(Error::extraction("malformed JSON in LLM response"));
    }
    Ok(&s[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reply_with_fences_and_thinking() {
        let reply = "<think>two rows</think>\n```json\n[{\"product\": \"Tomaten 5kg\", \"price\": 12.5},\n {\"product\": \"Gurke\", \"price\": \"0,79\"}]\n```";
        let entries = parse_reply(reply).unwrap();
        assert_eq!(
            entries,
            vec![PriceEntry::new("Tomaten 5kg", 12.5), PriceEntry::new("Gurke", 0.79)]
        );
    }

    #[test]
    fn test_text_price_with_thousands_separator() {
        let entries = parse_reply(r#"[{"product": "Olivenöl 20L", "price": "1.234,50"}]"#).unwrap();
        assert_eq!(entries, vec![PriceEntry::new("Olivenöl 20L", 1234.5)]);
    }

    #[test]
    fn test_unparseable_text_price_becomes_nan() {
        let entries = parse_reply(r#"[{"product": "Mehl", "price": "auf Anfrage"}]"#).unwrap();
        assert!(entries[0].price.is_nan());
    }

    #[test]
    fn test_parse_reply_errors() {
        assert!(matches!(parse_reply("no idea"), Err(Error::Extraction(_))));
        assert!(matches!(parse_reply("] oops ["), Err(Error::Extraction(_))));
        assert!(matches!(parse_reply(r#"[{"name": "x"}]"#), Err(Error::Extraction(_))));
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("Öl Äpfel", 4), "Öl Ä");
        assert_eq!(truncate_chars("kurz", 100), "kurz");
    }

    #[test]
    fn test_resolve_local_endpoints() {
        let mut llm = LlmSection {
            backend: LlmBackend::Ollama,
            ..LlmSection::default()
        };
        let endpoint = resolve_endpoint(&llm).unwrap();
        assert_eq!(endpoint.model, "qwen2.5vl:7b");

        llm.backend = LlmBackend::Cliproxy;
        assert_eq!(resolve_endpoint(&llm).unwrap().base_url, "http://localhost:8317/v1");

        llm.backend = LlmBackend::Heuristics;
        assert!(matches!(resolve_endpoint(&llm), Err(Error::Config(_))));
    }

    #[test]
    fn test_image_request_uses_data_url() {
        let llm = LlmSection {
            backend: LlmBackend::Ollama,
            ..LlmSection::default()
        };
        let extractor = LlmExtractor::from_config(&llm).unwrap();
        let doc = Document::new(b"abc".to_vec(), "image/png");
        let content = extractor.user_content(&doc).unwrap();

        let json = serde_json::to_value(&content).unwrap();
        assert_eq!(json[0]["type"], "text");
        assert_eq!(json[1]["type"], "image_url");
        assert_eq!(json[1]["image_url"]["url"], "data:image/png;base64,YWJj");
    }
}
