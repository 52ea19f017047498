//! Helpers for reading oracle completions.

/// Extract JSON from a completion string, handling markdown code blocks.
///
/// Attempts extraction in this order:
/// 1. Raw JSON (fast path)
/// 2. ```json ... ``` code blocks
/// 3. ``` ... ``` code blocks
pub(crate) fn extract_json_from_completion(completion: &str) -> Result<&str, String> {
    let trimmed = completion.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return Ok(trimmed);
    }

    if completion.contains("```json") {
        return completion
            .split("```json")
            .nth(1)
            .and_then(|s| s.split("```").next())
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "Found ```json block but content was empty or malformed".to_string());
    }

    if completion.contains("```") {
        return completion
            .split("```")
            .nth(1)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "Found ``` block but content was empty or malformed".to_string());
    }

    Err(format!(
        "No JSON found in response. First 100 chars: '{}'",
        completion.chars().take(100).collect::<String>()
    ))
}

/// Parse a completion as a JSON value, if it contains one.
pub(crate) fn parse_json_completion(completion: &str) -> Option<serde_json::Value> {
    extract_json_from_completion(completion)
        .ok()
        .and_then(|json| serde_json::from_str(json).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_raw_json() {
        assert_eq!(
            extract_json_from_completion("  {\"a\": 1} ").unwrap(),
            "{\"a\": 1}"
        );
    }

    #[test]
    fn test_extract_fenced_json() {
        let completion = "Here you go:\n```json\n{\"actions\": []}\n```\nDone.";
        assert_eq!(
            extract_json_from_completion(completion).unwrap(),
            "{\"actions\": []}"
        );
    }

    #[test]
    fn test_extract_plain_fence() {
        let completion = "```\n[1, 2]\n```";
        assert_eq!(extract_json_from_completion(completion).unwrap(), "[1, 2]");
    }

    #[test]
    fn test_extract_no_json() {
        assert!(extract_json_from_completion("just prose").is_err());
        assert!(parse_json_completion("just prose").is_none());
    }

    #[test]
    fn test_parse_json_completion_invalid_json() {
        assert!(parse_json_completion("{not json").is_none());
    }
}
