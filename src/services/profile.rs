use crate::error::ProviderFailure;

/// Biography text beyond this many characters is left out of the prompt
pub const MAX_BIOGRAPHY_CHARS: usize = 2000;

/// Builds the character write-up prompt
pub fn build_prompt(name: &str, biography: Option<&str>) -> String {
    let background = biography
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .map(|b| b.chars().take(MAX_BIOGRAPHY_CHARS).collect::<String>())
        .unwrap_or_else(|| "No catalog biography is available.".to_string());

    format!(
        "Write an engaging character analysis of {name} for an anime and manga fan site.\n\
         Cover their personality, role in the story and what makes them memorable, \
         in three short paragraphs of plain text. Avoid major spoilers.\n\n\
         Catalog background:\n{background}"
    )
}

/// Trims the generated write-up; an empty one is an empty payload
pub fn parse_profile_text(text: String) -> Result<String, ProviderFailure> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ProviderFailure::EmptyPayload);
    }
    Ok(trimmed.to_string())
}
