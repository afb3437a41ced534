use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Youngest and oldest age the recommendation form accepts
pub const MIN_AGE: u8 = 10;
pub const MAX_AGE: u8 = 80;

/// Kind of media to recommend
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    #[serde(alias = "Anime")]
    Anime,
    #[serde(alias = "Manga")]
    Manga,
}

impl Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContentType::Anime => write!(f, "anime"),
            ContentType::Manga => write!(f, "manga"),
        }
    }
}

/// User inputs for a recommendation request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecommendationProfile {
    pub age: u8,
    /// Free-text hobbies and interests
    pub interests: String,
    pub mood: String,
    pub style: String,
    pub content_type: ContentType,
}

impl RecommendationProfile {
    pub fn validate(&self) -> AppResult<()> {
        if !(MIN_AGE..=MAX_AGE).contains(&self.age) {
            return Err(AppError::InvalidInput(format!(
                "age must be between {} and {}",
                MIN_AGE, MAX_AGE
            )));
        }
        if self.interests.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "interests must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// One AI-suggested title
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recommendation {
    pub title: String,
    pub genre: String,
    /// Why it matches the profile
    pub reason: String,
    /// Term the front-end can hand to the catalog search
    #[serde(default)]
    pub search_keyword: Option<String>,
}
