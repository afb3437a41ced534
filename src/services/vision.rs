/// Name returned when the model cannot identify the character
pub const UNKNOWN_CHARACTER: &str = "Unknown";

pub const IDENTIFY_PROMPT: &str = "Identify the anime or manga character in this image. \
Reply with ONLY the character's full name, nothing else. \
If you cannot identify the character, reply with exactly: Unknown";

/// Normalizes the model's answer to a bare name.
///
/// Never fails: an empty answer means the model did not recognize anyone.
pub fn parse_identified_name(text: String) -> String {
    let name = text
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '*' || c == '`')
        .trim_end_matches('.')
        .trim();

    if name.is_empty() || name.eq_ignore_ascii_case(UNKNOWN_CHARACTER) {
        UNKNOWN_CHARACTER.to_string()
    } else {
        name.to_string()
    }
}
