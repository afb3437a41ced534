use serde::{Deserialize, Serialize};

/// Body of `POST /api/v1/characters/{id}/profile`
#[derive(Debug, Clone, Deserialize)]
pub struct CharacterProfileRequest {
    pub name: String,
    /// Catalog "about" text, if the catalog has one
    #[serde(default)]
    pub biography: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CharacterProfile {
    pub mal_id: u64,
    pub name: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IdentifyResponse {
    /// Character name, or "Unknown"
    pub name: String,
    pub recognized: bool,
}
