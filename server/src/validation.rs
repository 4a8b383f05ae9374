use crate::error::ApiError;

/// Maximum text length for synthesis requests, in characters
const MAX_TEXT_LENGTH: usize = 5000;
/// Maximum chat message length, in characters
const MAX_MESSAGE_LENGTH: usize = 5000;
/// Maximum conversation id length
const MAX_CONVERSATION_ID_LENGTH: usize = 128;

/// Validate text sent to VOICEVOX
pub fn validate_tts_request(text: &str) -> Result<(), ApiError> {
    if text.trim().is_empty() {
        return Err(ApiError::InvalidInput("Text cannot be empty".to_string()));
    }
    if text.chars().count() > MAX_TEXT_LENGTH {
        return Err(ApiError::InvalidInput(format!(
            "Text too long (max {} characters)",
            MAX_TEXT_LENGTH
        )));
    }
    Ok(())
}

/// Validate a chat message
pub fn validate_chat_request(message: &str) -> Result<(), ApiError> {
    if message.trim().is_empty() {
        return Err(ApiError::InvalidInput("Message cannot be empty".to_string()));
    }
    if message.chars().count() > MAX_MESSAGE_LENGTH {
        return Err(ApiError::InvalidInput(format!(
            "Message too long (max {} characters)",
            MAX_MESSAGE_LENGTH
        )));
    }
    Ok(())
}

/// Conversation ids are opaque, but must be non-empty, bounded and printable
pub fn validate_conversation_id(id: &str) -> Result<(), ApiError> {
    if id.is_empty() || id.len() > MAX_CONVERSATION_ID_LENGTH {
        return Err(ApiError::InvalidInput(format!(
            "Conversation id must be 1 to {} bytes",
            MAX_CONVERSATION_ID_LENGTH
        )));
    }
    if id.chars().any(char::is_control) {
        return Err(ApiError::InvalidInput(
            "Conversation id contains control characters".to_string(),
        ));
    }
    Ok(())
}
