//! HTTP Status Code Matching Utilities
//!
//! Matches response status codes against configured patterns, supporting
//! class wildcards like "2xx" alongside exact codes like "206".

use reqwest::StatusCode;

/// Check if a status code matches any of the acceptable status code patterns
pub fn is_status_acceptable(status: &StatusCode, acceptable_codes: &[String]) -> bool {
    let status_code = status.as_u16();
    acceptable_codes
        .iter()
        .any(|pattern| matches_pattern(status_code, pattern))
}

/// Whether a pattern can ever match a status code
pub fn is_valid_pattern(pattern: &str) -> bool {
    let pattern = pattern.trim();
    if let Some(prefix) = pattern.strip_suffix("xx") {
        return prefix.len() == 1 && matches!(prefix.parse::<u16>(), Ok(1..=5));
    }
    matches!(pattern.parse::<u16>(), Ok(100..=599))
}

/// Check if a status code matches a specific pattern
fn matches_pattern(status_code: u16, pattern: &str) -> bool {
    let pattern = pattern.trim();
    if let Some(prefix) = pattern.strip_suffix("xx") {
        // class wildcard, e.g. "2xx"
        if prefix.len() == 1
            && let Ok(prefix_digit) = prefix.parse::<u16>()
        {
            return status_code / 100 == prefix_digit;
        }
        return false;
    }

    pattern
        .parse::<u16>()
        .map(|exact| exact == status_code)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_status_codes() {
        let acceptable = vec!["206".to_string(), "200".to_string()];

        assert!(is_status_acceptable(&StatusCode::PARTIAL_CONTENT, &acceptable));
        assert!(is_status_acceptable(&StatusCode::OK, &acceptable));
        assert!(!is_status_acceptable(&StatusCode::NO_CONTENT, &acceptable));
    }

    #[test]
    fn test_wildcard_status_codes() {
        let acceptable = vec!["2xx".to_string()];

        assert!(is_status_acceptable(&StatusCode::OK, &acceptable));
        assert!(is_status_acceptable(&StatusCode::PARTIAL_CONTENT, &acceptable));
        assert!(!is_status_acceptable(&StatusCode::NOT_FOUND, &acceptable));
        assert!(!is_status_acceptable(&StatusCode::FOUND, &acceptable));
    }

    #[test]
    fn test_empty_acceptable_codes() {
        let acceptable: Vec<String> = vec![];
        assert!(!is_status_acceptable(&StatusCode::OK, &acceptable));
    }

    #[test]
    fn test_pattern_validity() {
        assert!(is_valid_pattern("2xx"));
        assert!(is_valid_pattern(" 3xx "));
        assert!(is_valid_pattern("206"));
        assert!(!is_valid_pattern("9xx"));
        assert!(!is_valid_pattern("20x"));
        assert!(!is_valid_pattern("abc"));
        assert!(!is_valid_pattern("700"));
        assert!(!is_valid_pattern(""));
    }
}
