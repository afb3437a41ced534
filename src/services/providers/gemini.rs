/// Google Gemini provider
///
/// API Flow:
/// 1. Single-shot: POST /v1beta/models/{model}:generateContent
/// 2. Streaming: POST /v1beta/models/{model}:streamGenerateContent?alt=sse,
///    one `data:` event per partial response
///
/// Error bodies are passed through as `HTTP {status}: {body}` so the
/// governor's classifier sees the provider's own wording.
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine};
use futures::{Stream, StreamExt};
use reqwest::Client as HttpClient;

use crate::{
    error::ProviderFailure,
    models::{
        GeminiContent, GeminiInlineData, GeminiPart, GeminiRequest, GeminiResponse,
        GeminiSafetySetting,
    },
    services::providers::{GenerationRequest, GenerativeProvider, TextChunk, TextStream},
};

const API_KEY_HEADER: &str = "x-goog-api-key";

const SAFETY_CATEGORIES: &[&str] = &[
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

#[derive(Clone)]
pub struct GeminiProvider {
    http_client: HttpClient,
    api_key: String,
    api_url: String,
    model: String,
    stream: bool,
}

impl GeminiProvider {
    pub fn new(
        api_key: String,
        api_url: String,
        model: String,
        stream: bool,
        timeout: Duration,
    ) -> Result<Self, ProviderFailure> {
        let http_client = HttpClient::builder().timeout(timeout).build()?;

        Ok(Self {
            http_client,
            api_key,
            api_url: api_url.trim_end_matches('/').to_string(),
            model,
            stream,
        })
    }

    fn endpoint(&self) -> String {
        if self.stream {
            format!(
                "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
                self.api_url, self.model
            )
        } else {
            format!("{}/v1beta/models/{}:generateContent", self.api_url, self.model)
        }
    }

    fn build_request(request: GenerationRequest) -> GeminiRequest {
        let mut parts = vec![GeminiPart {
            text: Some(request.prompt),
            inline_data: None,
        }];

        if let Some(image) = request.image {
            parts.push(GeminiPart {
                text: None,
                inline_data: Some(GeminiInlineData {
                    mime_type: image.mime_type,
                    data: STANDARD.encode(&image.bytes),
                }),
            });
        }

        GeminiRequest {
            contents: vec![GeminiContent {
                parts,
                role: Some("user".to_string()),
            }],
            safety_settings: SAFETY_CATEGORIES
                .iter()
                .map(|category| GeminiSafetySetting {
                    category: *category,
                    threshold: "BLOCK_ONLY_HIGH",
                })
                .collect(),
        }
    }
}

/// Text of one response, or a failure if the provider withheld it
fn response_text(response: &GeminiResponse) -> Result<String, ProviderFailure> {
    if let Some(reason) = response.block_reason() {
        return Err(ProviderFailure::api(format!("response blocked: {}", reason)));
    }
    Ok(response.text())
}

/// Extracts complete `data:` payloads from the byte buffer, leaving any
/// partial line in place. Lines are decoded only once complete, so a UTF-8
/// sequence split across network chunks survives intact.
fn drain_sse_events(buffer: &mut Vec<u8>) -> Vec<String> {
    let mut events = Vec::new();
    while let Some(newline) = buffer.iter().position(|&b| b == b'\n') {
        let raw: Vec<u8> = buffer.drain(..=newline).collect();
        let line = String::from_utf8_lossy(&raw);
        if let Some(data) = line.trim_end().strip_prefix("data:") {
            let data = data.trim_start();
            if !data.is_empty() {
                events.push(data.to_string());
            }
        }
    }
    events
}

fn parse_event(data: &str) -> Result<Option<TextChunk>, ProviderFailure> {
    let response: GeminiResponse = serde_json::from_str(data)
        .map_err(|e| ProviderFailure::api(format!("malformed stream event: {}", e)))?;
    let text = response_text(&response)?;
    Ok((!text.is_empty()).then_some(TextChunk { text }))
}

/// Turns an SSE byte stream into text chunks, one per non-empty event
fn sse_text_stream<S, B, E>(bytes: S) -> TextStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<ProviderFailure> + Send + 'static,
{
    let mut bytes = Box::pin(bytes);
    let chunks = async_stream::try_stream! {
        let mut buffer: Vec<u8> = Vec::new();
        while let Some(next) = bytes.next().await {
            let next = next.map_err(Into::<ProviderFailure>::into)?;
            buffer.extend_from_slice(next.as_ref());
            for event in drain_sse_events(&mut buffer) {
                if let Some(chunk) = parse_event(&event)? {
                    yield chunk;
                }
            }
        }
        buffer.push(b'\n');
        for event in drain_sse_events(&mut buffer) {
            if let Some(chunk) = parse_event(&event)? {
                yield chunk;
            }
        }
    };

    TextStream::from_stream(chunks)
}

#[async_trait::async_trait]
impl GenerativeProvider for GeminiProvider {
    #[tracing::instrument(skip(self, request), fields(model = %self.model, stream = self.stream, has_image = request.image.is_some()))]
    async fn generate(&self, request: GenerationRequest) -> Result<TextStream, ProviderFailure> {
        let body = Self::build_request(request);

        let response = self
            .http_client
            .post(self.endpoint())
            .header(API_KEY_HEADER, &self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(
                status = %status,
                body = %body,
                "Gemini request failed"
            );
            return Err(ProviderFailure::api(format!(
                "HTTP {}: {}",
                status.as_u16(),
                body
            )));
        }

        if !self.stream {
            let parsed: GeminiResponse = response.json().await?;
            let text = response_text(&parsed)?;
            tracing::debug!(chars = text.len(), "Gemini response received");
            return Ok(if text.is_empty() {
                TextStream::empty()
            } else {
                TextStream::once(text)
            });
        }

        Ok(sse_text_stream(response.bytes_stream()))
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}
