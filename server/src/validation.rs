use crate::error::ApiError;

/// Maximum text length for synthesis requests
const MAX_TEXT_LENGTH: usize = 5000;
/// Maximum length of a voice identifier
const MAX_VOICE_ID_LENGTH: usize = 64;

/// Validate the text of a synthesis or chunking request
pub fn validate_text(text: &str) -> Result<(), ApiError> {
    if text.is_empty() {
        return Err(ApiError::InvalidInput("Text cannot be empty".to_string()));
    }
    if text.len() > MAX_TEXT_LENGTH {
        return Err(ApiError::InvalidInput(format!(
            "Text too long (max {} characters)",
            MAX_TEXT_LENGTH
        )));
    }
    Ok(())
}

/// Validate a streaming synthesis request
pub fn validate_stream_request(
    text: &str,
    language: Option<&str>,
    voice: Option<&str>,
) -> Result<(), ApiError> {
    validate_text(text)?;

    if let Some(lang) = language {
        if !is_valid_language_code(lang) {
            return Err(ApiError::InvalidInput(format!(
                "Invalid language code format: {}. Expected format: ll_CC (e.g., en_US, de_DE)",
                lang
            )));
        }
    }

    if let Some(voice) = voice {
        if !is_valid_voice_id(voice) {
            return Err(ApiError::InvalidInput(format!(
                "Invalid voice id: {}. Use letters, digits, '-' or '_' (max {} characters)",
                voice, MAX_VOICE_ID_LENGTH
            )));
        }
    }

    Ok(())
}

/// Validate language code format (e.g., en_US, de_DE)
fn is_valid_language_code(code: &str) -> bool {
    // ll or ll_CC
    let parts: Vec<&str> = code.split('_').collect();
    match parts.len() {
        1 => parts[0].len() == 2 && parts[0].chars().all(|c| c.is_ascii_lowercase()),
        2 => {
            parts[0].len() == 2
                && parts[0].chars().all(|c| c.is_ascii_lowercase())
                && parts[1].len() == 2
                && parts[1].chars().all(|c| c.is_ascii_uppercase())
        }
        _ => false,
    }
}

fn is_valid_voice_id(voice: &str) -> bool {
    !voice.is_empty()
        && voice.len() <= MAX_VOICE_ID_LENGTH
        && voice
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_stream_request_valid() {
        assert!(validate_stream_request("Hello", Some("de_DE"), None).is_ok());
        assert!(validate_stream_request("Test", None, Some("lessac")).is_ok());
    }

    #[test]
    fn test_validate_stream_request_empty_text() {
        let result = validate_stream_request("", Some("de_DE"), None);
        assert!(result.is_err());
        if let Err(ApiError::InvalidInput(msg)) = result {
            assert!(msg.contains("empty"));
        }
    }

    #[test]
    fn test_validate_stream_request_too_long() {
        let long_text = "a".repeat(6000);
        let result = validate_stream_request(&long_text, Some("de_DE"), None);
        assert!(result.is_err());
        if let Err(ApiError::InvalidInput(msg)) = result {
            assert!(msg.contains("too long"));
        }
    }

    #[test]
    fn test_validate_stream_request_invalid_language_code() {
        assert!(validate_stream_request("Hello", Some("invalid"), None).is_err());
        assert!(validate_stream_request("Hello", Some("INVALID"), None).is_err());
        assert!(validate_stream_request("Hello", Some("en"), None).is_ok());
        assert!(validate_stream_request("Hello", Some("en_US"), None).is_ok());
    }

    #[test]
    fn test_validate_stream_request_invalid_voice() {
        assert!(validate_stream_request("Hello", None, Some("../etc/passwd")).is_err());
        assert!(validate_stream_request("Hello", None, Some("")).is_err());
        assert!(validate_stream_request("Hello", None, Some(&"v".repeat(65))).is_err());
        assert!(validate_stream_request("Hello", None, Some("thorsten-high_2")).is_ok());
    }
}
