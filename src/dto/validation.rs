//! Validation helpers for inbound payloads.

use validator::ValidationError;

const MAX_ROOM_CODE_LEN: usize = 16;
const MAX_PLAYER_NAME_LEN: usize = 32;
const MAX_ANSWER_LEN: usize = 500;

/// Validates that a room code is 1 to 16 ASCII alphanumeric characters once trimmed.
///
/// # Examples
///
/// ```ignore
/// validate_room_code("abcd")   // Ok, normalised to "ABCD" later
/// validate_room_code("AB CD")  // Err - inner space
/// validate_room_code("")       // Err - empty
/// ```
pub fn validate_room_code(code: &str) -> Result<(), ValidationError> {
    let code = code.trim();
    if code.is_empty() || code.len() > MAX_ROOM_CODE_LEN {
        let mut err = ValidationError::new("room_code_length");
        err.message = Some(
            format!("Room code must be 1 to {MAX_ROOM_CODE_LEN} characters (got {})", code.len())
                .into(),
        );
        return Err(err);
    }

    if !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        let mut err = ValidationError::new("room_code_format");
        err.message = Some("Room code must contain only letters and digits".into());
        return Err(err);
    }

    Ok(())
}

/// Validates a free-text player name: 1 to 32 characters once trimmed, no control characters.
pub fn validate_player_name(name: &str) -> Result<(), ValidationError> {
    let name = name.trim();
    let length = name.chars().count();
    if length == 0 || length > MAX_PLAYER_NAME_LEN {
        let mut err = ValidationError::new("player_name_length");
        err.message = Some(
            format!("Player name must be 1 to {MAX_PLAYER_NAME_LEN} characters (got {length})")
                .into(),
        );
        return Err(err);
    }

    if name.chars().any(char::is_control) {
        let mut err = ValidationError::new("player_name_format");
        err.message = Some("Player name must not contain control characters".into());
        return Err(err);
    }

    Ok(())
}

/// Validates an answer: 1 to 500 characters once trimmed.
pub fn validate_answer(answer: &str) -> Result<(), ValidationError> {
    let length = answer.trim().chars().count();
    if length == 0 || length > MAX_ANSWER_LEN {
        let mut err = ValidationError::new("answer_length");
        err.message =
            Some(format!("Answer must be 1 to {MAX_ANSWER_LEN} characters (got {length})").into());
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_room_code_valid() {
        assert!(validate_room_code("ABCD").is_ok());
        assert!(validate_room_code(" abcd ").is_ok());
        assert!(validate_room_code("R2D2").is_ok());
    }

    #[test]
    fn test_validate_room_code_invalid() {
        assert!(validate_room_code("").is_err());
        assert!(validate_room_code("   ").is_err());
        assert!(validate_room_code("AB CD").is_err()); // inner space
        assert!(validate_room_code("ABCD-1").is_err()); // punctuation
        assert!(validate_room_code("ABCDEFGHIJKLMNOPQ").is_err()); // too long
    }

    #[test]
    fn test_validate_player_name() {
        assert!(validate_player_name("Alice").is_ok());
        assert!(validate_player_name("Zoë the Great").is_ok());
        assert!(validate_player_name("  ").is_err());
        assert!(validate_player_name("tab\tname").is_err());
        assert!(validate_player_name(&"x".repeat(33)).is_err());
    }

    #[test]
    fn test_validate_answer() {
        assert!(validate_answer("foo").is_ok());
        assert!(validate_answer(" \n ").is_err());
        assert!(validate_answer(&"y".repeat(501)).is_err());
    }
}
