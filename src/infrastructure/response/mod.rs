use once_cell::sync::Lazy;
use regex::Regex;

static THINK_TAG_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<think>[\s\S]*?</think>|<think\s*/>").unwrap());

static REASONING_TAG_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<reasoning>[\s\S]*?</reasoning>").unwrap());

static CODE_FENCE_OPEN_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^```[A-Za-z0-9_-]*\s*").unwrap());

static CODE_FENCE_CLOSE_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*```$").unwrap());

/// Cleans a vision model reply down to the JSON document it should contain.
pub fn clean_json_reply(response: &str) -> String {
    let mut cleaned = response.to_string();

    // Remove <think>...</think> and <think/> tags
    cleaned = THINK_TAG_PATTERN.replace_all(&cleaned, "").to_string();

    // Remove <reasoning>...</reasoning> tags (some models use this)
    cleaned = REASONING_TAG_PATTERN.replace_all(&cleaned, "").to_string();

    cleaned = cleaned.trim().to_string();

    // Strip a surrounding ```json ... ``` fence
    cleaned = CODE_FENCE_OPEN_PATTERN.replace(&cleaned, "").to_string();
    cleaned = CODE_FENCE_CLOSE_PATTERN.replace(&cleaned, "").to_string();
    cleaned = cleaned.trim().to_string();

    // Prose around the object: keep the outermost braces
    if !cleaned.starts_with('{') {
        if let (Some(start), Some(end)) = (cleaned.find('{'), cleaned.rfind('}')) {
            if start < end {
                cleaned = cleaned[start..=end].to_string();
            }
        }
    }

    cleaned
}
