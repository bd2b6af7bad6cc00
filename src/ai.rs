//! Note rewriting through the Gemini `generateContent` endpoint.
//!
//! [`AiService::process`] never fails: any problem is logged and turned
//! into one of the themed fallback strings below, which are then merged
//! into the note like any other result.

use crate::config::AiConfig;
use clap::ValueEnum;
use log::{debug, error};
use serde::{Deserialize, Serialize};

pub const NO_DATA_FALLBACK: &str = "Error: No data received from the neural net.";
pub const LINK_FAILURE_FALLBACK: &str =
    "Critical Failure: Neural link disrupted. Check API Configuration or Network Connection.";

pub const SUMMARY_SEPARATOR: &str = "\n\n--- AI SUMMARY ---\n";

const SYSTEM_INSTRUCTION: &str = "You are a high-tech AI assistant integrated into a futuristic \"CyberDeck\" interface. \
Your responses should be concise, efficient, and helpful. \
When asked to rewrite in \"Cyberpunk Style\", use slang like \"chummer\", \"nova\", \"preem\", and technological metaphors, but keep the core meaning clear.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum AiAction {
    Summarize,
    Expand,
    FixGrammar,
    CyberpunkStyle,
}

/// How a result is folded back into the note it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    Replace,
    Append,
}

impl AiAction {
    pub const ALL: [AiAction; 4] = [
        AiAction::FixGrammar,
        AiAction::Expand,
        AiAction::Summarize,
        AiAction::CyberpunkStyle,
    ];

    pub fn instruction(&self) -> &'static str {
        match self {
            AiAction::Summarize => "Summarize the following note content concisely:",
            AiAction::Expand => {
                "Expand upon the ideas in this note, adding relevant details and potential action items:"
            }
            AiAction::FixGrammar => {
                "Fix any grammar or spelling errors in this note, maintaining the original tone:"
            }
            AiAction::CyberpunkStyle => {
                "Rewrite the following note content in a gritty, futuristic Cyberpunk 2077-style slang:"
            }
        }
    }

    pub fn merge_policy(&self) -> MergePolicy {
        match self {
            AiAction::Summarize => MergePolicy::Append,
            AiAction::Expand | AiAction::FixGrammar | AiAction::CyberpunkStyle => {
                MergePolicy::Replace
            }
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AiAction::Summarize => "COMPRESS (SUMMARIZE)",
            AiAction::Expand => "EXPAND DATA",
            AiAction::FixGrammar => "DEBUG GRAMMAR",
            AiAction::CyberpunkStyle => "CYBERPUNK MODE",
        }
    }

    pub fn build_prompt(&self, content: &str) -> String {
        format!("{}\n\n\"{}\"", self.instruction(), content)
    }
}

impl MergePolicy {
    pub fn apply(&self, existing: &str, result: &str) -> String {
        match self {
            MergePolicy::Replace => result.to_string(),
            MergePolicy::Append => format!("{}{}{}", existing, SUMMARY_SEPARATOR, result),
        }
    }
}

#[derive(thiserror::Error, Debug)]
enum AiError {
    #[error("environment variable {0} is not set")]
    MissingKey(String),
    #[error("HTTP client unavailable")]
    NoClient,
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("endpoint returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
}

// ── Gemini wire types ───────────────────────────────

#[derive(Debug, Serialize, Deserialize, Clone)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    system_instruction: Content,
    contents: Vec<Content>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

impl GenerateResponse {
    /// Text of the first candidate, parts concatenated.
    fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

#[derive(Debug, Clone)]
pub struct AiService {
    config: AiConfig,
    /// `None` when the client could not be built; every request then falls back.
    client: Option<reqwest::Client>,
}

impl AiService {
    pub fn new(config: AiConfig) -> Self {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|err| error!("building HTTP client failed: {}", err))
            .ok();
        AiService { config, client }
    }

    /// Single-shot rewrite of `content`. Callers skip blank content.
    pub async fn process(&self, content: &str, action: AiAction) -> String {
        let prompt = action.build_prompt(content);
        match self.generate(&prompt).await {
            Ok(Some(text)) => text,
            Ok(None) => {
                error!("AI response for {:?} carried no text", action);
                NO_DATA_FALLBACK.to_string()
            }
            Err(err) => {
                error!("AI request for {:?} failed: {}", action, err);
                LINK_FAILURE_FALLBACK.to_string()
            }
        }
    }

    async fn generate(&self, prompt: &str) -> Result<Option<String>, AiError> {
        let client = self.client.as_ref().ok_or(AiError::NoClient)?;
        let key = std::env::var(&self.config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| AiError::MissingKey(self.config.api_key_env.clone()))?;

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        );
        let body = GenerateRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part {
                    text: Some(SYSTEM_INSTRUCTION.to_string()),
                }],
            },
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: Some(prompt.to_string()),
                }],
            }],
        };

        debug!("posting {} prompt chars to {}", prompt.len(), url);
        let resp = client
            .post(&url)
            .header("x-goog-api-key", key)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(AiError::Status { status, body });
        }

        let parsed: GenerateResponse = resp.json().await?;
        Ok(parsed.text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn config(base_url: &str, key_env: &str) -> AiConfig {
        AiConfig {
            model: "test-model".into(),
            base_url: base_url.into(),
            api_key_env: key_env.into(),
        }
    }

    /// Answers exactly one HTTP request with `status` and `body`.
    async fn serve_once(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                if request_complete(&buf) {
                    break;
                }
            }
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        });
        format!("http://{}", addr)
    }

    fn request_complete(buf: &[u8]) -> bool {
        let text = String::from_utf8_lossy(buf);
        let Some(header_end) = text.find("\r\n\r\n") else {
            return false;
        };
        let length = text[..header_end]
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                if name.eq_ignore_ascii_case("content-length") {
                    value.trim().parse::<usize>().ok()
                } else {
                    None
                }
            })
            .unwrap_or(0);
        buf.len() >= header_end + 4 + length
    }

    #[test]
    fn summarize_appends_everything_else_replaces() {
        assert_eq!(AiAction::Summarize.merge_policy(), MergePolicy::Append);
        for action in [AiAction::Expand, AiAction::FixGrammar, AiAction::CyberpunkStyle] {
            assert_eq!(action.merge_policy(), MergePolicy::Replace);
        }
        assert_eq!(
            MergePolicy::Append.apply("notes", "short"),
            "notes\n\n--- AI SUMMARY ---\nshort"
        );
        assert_eq!(MergePolicy::Replace.apply("notes", "better"), "better");
    }

    #[test]
    fn prompt_quotes_content_after_instruction() {
        let prompt = AiAction::FixGrammar.build_prompt("teh text");
        assert_eq!(
            prompt,
            "Fix any grammar or spelling errors in this note, maintaining the original tone:\n\n\"teh text\""
        );
    }

    #[test]
    fn response_text_joins_first_candidate_parts() {
        let parsed: GenerateResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"Hello "},{"text":"choom"}]}},{"content":{"parts":[{"text":"ignored"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(parsed.text().as_deref(), Some("Hello choom"));
    }

    #[test]
    fn response_without_text_yields_none() {
        for raw in [r#"{}"#, r#"{"candidates":[]}"#, r#"{"candidates":[{"content":{"parts":[]}}]}"#] {
            let parsed: GenerateResponse = serde_json::from_str(raw).unwrap();
            assert!(parsed.text().is_none(), "{}", raw);
        }
    }

    #[tokio::test]
    async fn missing_key_falls_back() {
        let service = AiService::new(config("http://127.0.0.1:1", "CYBERNOTES_TEST_KEY_NEVER_SET"));
        let out = service.process("some text", AiAction::Expand).await;
        assert_eq!(out, LINK_FAILURE_FALLBACK);
    }

    #[tokio::test]
    async fn missing_client_falls_back() {
        std::env::set_var("CYBERNOTES_TEST_KEY_NOCLIENT", "k");
        let service = AiService {
            config: config("http://127.0.0.1:1", "CYBERNOTES_TEST_KEY_NOCLIENT"),
            client: None,
        };
        assert_eq!(service.process("note", AiAction::Summarize).await, LINK_FAILURE_FALLBACK);
    }

    #[tokio::test]
    async fn network_failure_falls_back() {
        std::env::set_var("CYBERNOTES_TEST_KEY_NET", "k");
        let service = AiService::new(config("http://127.0.0.1:1", "CYBERNOTES_TEST_KEY_NET"));
        for action in AiAction::ALL {
            assert_eq!(service.process("payload", action).await, LINK_FAILURE_FALLBACK);
        }
    }

    #[tokio::test]
    async fn successful_response_is_returned() {
        std::env::set_var("CYBERNOTES_TEST_KEY_OK", "k");
        let base = serve_once(
            "200 OK",
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Preem summary"}]}}]}"#,
        )
        .await;
        let service = AiService::new(config(&base, "CYBERNOTES_TEST_KEY_OK"));
        assert_eq!(service.process("long note", AiAction::Summarize).await, "Preem summary");
    }

    #[tokio::test]
    async fn empty_response_uses_no_data_fallback() {
        std::env::set_var("CYBERNOTES_TEST_KEY_EMPTY", "k");
        let base = serve_once("200 OK", r#"{"candidates":[]}"#).await;
        let service = AiService::new(config(&base, "CYBERNOTES_TEST_KEY_EMPTY"));
        assert_eq!(service.process("note", AiAction::Expand).await, NO_DATA_FALLBACK);
    }

    #[tokio::test]
    async fn error_status_falls_back() {
        std::env::set_var("CYBERNOTES_TEST_KEY_403", "k");
        let base = serve_once("403 Forbidden", r#"{"error":{"message":"bad key"}}"#).await;
        let service = AiService::new(config(&base, "CYBERNOTES_TEST_KEY_403"));
        assert_eq!(service.process("note", AiAction::FixGrammar).await, LINK_FAILURE_FALLBACK);
    }
}
