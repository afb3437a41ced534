use serde::{Deserialize, Serialize};

mod character;
mod recommendation;

pub use character::{CharacterProfile, CharacterProfileRequest, IdentifyResponse};
pub use recommendation::{ContentType, Recommendation, RecommendationProfile, MAX_AGE, MIN_AGE};

// ============================================================================
// Gemini API Types
// ============================================================================

/// Finish reasons that mean the provider withheld the output
const BLOCKING_FINISH_REASONS: &[&str] = &[
    "SAFETY",
    "PROHIBITED_CONTENT",
    "BLOCKLIST",
    "SPII",
    "IMAGE_SAFETY",
];

/// Request body for `generateContent` / `streamGenerateContent`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiRequest {
    pub contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub safety_settings: Vec<GeminiSafetySetting>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GeminiContent {
    #[serde(default)]
    pub parts: Vec<GeminiPart>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<GeminiInlineData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiInlineData {
    pub mime_type: String,
    /// Base64-encoded bytes
    pub data: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GeminiSafetySetting {
    pub category: &'static str,
    pub threshold: &'static str,
}

/// Response body, also the payload of each SSE event when streaming
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GeminiResponse {
    #[serde(default)]
    pub candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    pub prompt_feedback: Option<GeminiPromptFeedback>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiCandidate {
    #[serde(default)]
    pub content: Option<GeminiContent>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiPromptFeedback {
    #[serde(default)]
    pub block_reason: Option<String>,
}

impl GeminiResponse {
    /// Concatenated text parts of the first candidate
    pub fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }

    /// Why the provider refused to generate, if it did
    pub fn block_reason(&self) -> Option<String> {
        if let Some(reason) = self
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.clone())
        {
            return Some(reason);
        }

        if !self.text().is_empty() {
            return None;
        }

        self.candidates
            .first()
            .and_then(|c| c.finish_reason.as_deref())
            .filter(|reason| BLOCKING_FINISH_REASONS.contains(reason))
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_text_joins_parts() {
        let response: GeminiResponse = serde_json::from_str(
            r#"{"candidates": [{"content": {"parts": [{"text": "Hello, "}, {"text": "world"}], "role": "model"}, "finishReason": "STOP"}]}"#,
        )
        .unwrap();
        assert_eq!(response.text(), "Hello, world");
        assert_eq!(response.block_reason(), None);
    }

    #[test]
    fn test_prompt_feedback_block_reason() {
        let response: GeminiResponse = serde_json::from_str(
            r#"{"promptFeedback": {"blockReason": "PROHIBITED_CONTENT"}}"#,
        )
        .unwrap();
        assert_eq!(response.text(), "");
        assert_eq!(response.block_reason().as_deref(), Some("PROHIBITED_CONTENT"));
    }

    #[test]
    fn test_safety_finish_reason_without_text_is_blocked() {
        let response: GeminiResponse = serde_json::from_str(
            r#"{"candidates": [{"finishReason": "SAFETY"}]}"#,
        )
        .unwrap();
        assert_eq!(response.block_reason().as_deref(), Some("SAFETY"));
    }

    #[test]
    fn test_empty_response_is_not_blocked() {
        let response: GeminiResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(response.text(), "");
        assert_eq!(response.block_reason(), None);
    }

    #[test]
    fn test_request_serializes_camel_case() {
        let request = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart {
                    text: None,
                    inline_data: Some(GeminiInlineData {
                        mime_type: "image/png".to_string(),
                        data: "AAAA".to_string(),
                    }),
                }],
                role: None,
            }],
            safety_settings: vec![GeminiSafetySetting {
                category: "HARM_CATEGORY_HARASSMENT",
                threshold: "BLOCK_ONLY_HIGH",
            }],
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value["contents"][0]["parts"][0]["inlineData"]["mimeType"],
            "image/png"
        );
        assert_eq!(value["safetySettings"][0]["threshold"], "BLOCK_ONLY_HIGH");
        assert!(value["contents"][0]["parts"][0].get("text").is_none());
    }
}
