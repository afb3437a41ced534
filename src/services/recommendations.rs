use crate::{
    error::ProviderFailure,
    models::{Recommendation, RecommendationProfile},
};

/// Number of titles the model is asked for
pub const RECOMMENDATION_COUNT: usize = 5;

/// Builds the recommendation prompt for a user profile
pub fn build_prompt(profile: &RecommendationProfile) -> String {
    format!(
        r#"As an entertainment recommendation expert, suggest {count} appropriate {kind} titles for:

User Profile:
- Age: {age}
- Current Mood: {mood}
- Interests: {interests}
- Preferred Style: {style}

Provide recommendations in this JSON format (no markdown):
[
  {{
    "title": "Title name",
    "reason": "Why it matches (2 sentences)",
    "genre": "Main genre",
    "search_keyword": "Search term"
  }}
]"#,
        count = RECOMMENDATION_COUNT,
        kind = profile.content_type,
        age = profile.age,
        mood = profile.mood.trim(),
        interests = profile.interests.trim(),
        style = profile.style.trim(),
    )
}

/// Removes a surrounding markdown code fence, if the model added one
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Parses the model's JSON answer.
///
/// An empty answer is an empty payload; text that is not the expected JSON
/// array is a provider failure that will not improve on retry.
pub fn parse_recommendations(text: String) -> Result<Vec<Recommendation>, ProviderFailure> {
    let body = strip_code_fence(&text);
    if body.is_empty() {
        return Err(ProviderFailure::EmptyPayload);
    }

    serde_json::from_str(body)
        .map_err(|e| ProviderFailure::api(format!("malformed recommendation payload: {}", e)))
}
