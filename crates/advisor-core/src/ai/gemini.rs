use futures_util::future::{BoxFuture, FutureExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ApiError, GenerativeApi, Payload, PendingRequest};
use crate::config::Config;

pub const TEXT_INSTRUCTION: &str = "You are a cybersecurity expert advisor who explains complex security \
concepts in simple terms that anyone can understand.

Use friendly, conversational language while staying informative and educational.

Keep the formatting clean and readable:
1. Write clear paragraphs instead of markdown formatting
2. Do not use ** for bold text or # for headers
3. Prefer plain language and avoid jargon unless it is necessary
4. Use simple bullet points or numbers when listing points
5. Separate long answers with blank lines

Please respond to the following question about cybersecurity: ";

pub const IMAGE_INSTRUCTION: &str = "As a cybersecurity expert, analyze this screenshot for potential \
security threats, suspicious elements, or phishing attempts.

Look for things like:
- Suspicious URLs
- Fake login forms
- Misleading buttons
- Strange emails
- Security warnings
- Anything else that could be a security risk

Explain your findings in simple terms a non-technical person would understand. If you find anything \
suspicious, explain why it is concerning and what the user should do. If it looks safe, just say so briefly.";

pub const IMAGE_MIME_TYPE: &str = "image/png";

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<RequestContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct RequestContent {
    parts: Vec<RequestPart>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum RequestPart {
    Text { text: String },
    InlineData { inline_data: InlineData },
}

#[derive(Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    top_k: u32,
    top_p: f64,
    max_output_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            top_k: 40,
            top_p: 0.95,
            max_output_tokens: 1024,
        }
    }
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

/// JSON body for one `generateContent` call
pub fn build_request_body(payload: &Payload) -> serde_json::Value {
    let parts = match payload {
        Payload::Prompt(prompt) => vec![RequestPart::Text {
            text: format!("{}{}", TEXT_INSTRUCTION, prompt),
        }],
        Payload::Image(data) => vec![
            RequestPart::Text {
                text: IMAGE_INSTRUCTION.to_string(),
            },
            RequestPart::InlineData {
                inline_data: InlineData {
                    mime_type: IMAGE_MIME_TYPE.to_string(),
                    data: data.clone(),
                },
            },
        ],
    };

    let request = GenerateRequest {
        contents: vec![RequestContent { parts }],
        generation_config: GenerationConfig::default(),
    };

    // Plain structs of strings and numbers always serialize
    serde_json::to_value(request).unwrap_or_default()
}

/// Pull `candidates[0].content.parts[0].text` out of a response
pub fn parse_response(status: u16, body: &str) -> Result<String, ApiError> {
    if status != 200 {
        return Err(ApiError::status(status, body));
    }

    let response: GenerateResponse =
        serde_json::from_str(body).map_err(|e| ApiError::Parse(e.to_string()))?;

    response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .and_then(|content| content.parts.into_iter().next())
        .and_then(|part| part.text)
        .map(|text| text.trim().to_string())
        .ok_or_else(|| ApiError::Parse("missing candidates[0].content.parts[0].text".to_string()))
}

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_base: String,
    model: String,
}

impl GeminiClient {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(config.request_timeout).build()?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }

    pub fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.api_base, self.model
        )
    }

    pub async fn query(&self, request: &PendingRequest) -> Result<String, ApiError> {
        let body = build_request_body(&request.payload);
        debug!(model = %self.model, kind = ?request.kind(), "sending generateContent request");

        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", request.credential.expose())])
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status().as_u16();
        let text = response.text().await?;
        parse_response(status, &text)
    }
}

impl GenerativeApi for GeminiClient {
    fn generate(&self, request: PendingRequest) -> BoxFuture<'static, Result<String, ApiError>> {
        let client = self.clone();
        async move { client.query(&request).await }.boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_body_shape() {
        let body = build_request_body(&Payload::Prompt("What is phishing?".into()));

        let parts = body["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 1);
        let text = parts[0]["text"].as_str().unwrap();
        assert!(text.starts_with(TEXT_INSTRUCTION));
        assert!(text.ends_with("What is phishing?"));

        assert_eq!(
            body["generationConfig"],
            json!({"temperature": 0.2, "topK": 40, "topP": 0.95, "maxOutputTokens": 1024})
        );
    }

    #[test]
    fn test_image_body_shape() {
        let body = build_request_body(&Payload::Image("iVBORw0KGgo=".into()));

        let parts = body["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0]["text"], IMAGE_INSTRUCTION);
        assert_eq!(
            parts[1],
            json!({"inline_data": {"mime_type": "image/png", "data": "iVBORw0KGgo="}})
        );
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 1024);
    }

    #[test]
    fn test_parse_success_trims_text() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"  Use a password manager.\n"}]}}]}"#;
        assert_eq!(parse_response(200, body).unwrap(), "Use a password manager.");
    }

    #[test]
    fn test_parse_non_200_is_status_error() {
        let err = parse_response(500, "internal").unwrap_err();
        assert!(matches!(err, ApiError::Status { status: 500, .. }));
        assert!(err.to_string().contains("500"));
    }

    #[test]
    fn test_parse_missing_path_is_parse_error() {
        let err = parse_response(200, r#"{"candidates":[]}"#).unwrap_err();
        assert!(matches!(err, ApiError::Parse(_)));

        let err = parse_response(200, r#"{"candidates":[{"finishReason":"SAFETY"}]}"#).unwrap_err();
        assert!(matches!(err, ApiError::Parse(_)));
    }

    #[test]
    fn test_parse_malformed_json_is_parse_error() {
        let err = parse_response(200, "<html>").unwrap_err();
        assert!(matches!(err, ApiError::Parse(_)));
        assert!(err.to_string().starts_with("Failed to parse API response"));
    }

    #[test]
    fn test_endpoint_uses_model() {
        let mut config = Config::new();
        config.api_base = "https://example.test/".into();
        config.model = "gemini-test".into();

        let client = GeminiClient::new(&config).unwrap();
        assert_eq!(
            client.endpoint(),
            "https://example.test/v1beta/models/gemini-test:generateContent"
        );
    }
}
