//! Validation utilities for channel addresses and provider settings

use regex::Regex;
use thiserror::Error;

use crate::types::ChannelFlag;

/// Lowest (most preferred) provider priority
pub const MIN_PRIORITY: i32 = 1;
/// Highest (least preferred) provider priority
pub const MAX_PRIORITY: i32 = 5;

/// Validation errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Field {field} exceeds maximum length of {max_length}")]
    TooLong { field: String, max_length: usize },

    #[error("Invalid email address: {0}")]
    InvalidEmail(String),

    #[error("Invalid phone number: {0}")]
    InvalidPhoneNumber(String),

    #[error("Invalid chat id: {0}")]
    InvalidChatId(String),

    #[error("Priority {0} is outside the allowed range 1-5")]
    PriorityOutOfRange(i32),
}

/// Validation result type
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validate email address format
pub fn validate_email(email: &str) -> ValidationResult<()> {
    let email_regex = Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
        .map_err(|_| ValidationError::InvalidEmail("Regex compilation failed".to_string()))?;

    if !email_regex.is_match(email) {
        return Err(ValidationError::InvalidEmail(email.to_string()));
    }

    if email.len() > 254 {
        return Err(ValidationError::TooLong {
            field: "email".to_string(),
            max_length: 254,
        });
    }

    Ok(())
}

/// Validate phone number format (basic validation)
pub fn validate_phone_number(phone: &str) -> ValidationResult<()> {
    // Remove common formatting characters
    let cleaned = phone
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect::<String>();

    if cleaned.is_empty() {
        return Err(ValidationError::InvalidPhoneNumber(
            "Phone number cannot be empty".to_string(),
        ));
    }

    // '+' is only allowed as the leading character
    if cleaned[1..].contains('+') {
        return Err(ValidationError::InvalidPhoneNumber(format!(
            "Misplaced '+' in {}",
            phone
        )));
    }

    let digits = cleaned.trim_start_matches('+').len();
    if !(7..=15).contains(&digits) {
        return Err(ValidationError::InvalidPhoneNumber(format!(
            "Phone number length must be between 7 and 15 digits, got {}",
            digits
        )));
    }

    Ok(())
}

/// Validate a Telegram chat id (signed 64-bit integer)
pub fn validate_chat_id(chat_id: &str) -> ValidationResult<()> {
    chat_id
        .trim()
        .parse::<i64>()
        .map(|_| ())
        .map_err(|_| ValidationError::InvalidChatId(chat_id.to_string()))
}

/// Validate an address for the medium identified by `flag`
pub fn validate_address(flag: ChannelFlag, address: &str) -> ValidationResult<()> {
    if address.trim().is_empty() {
        return Err(ValidationError::MissingField {
            field: flag.contact_field().to_string(),
        });
    }
    match flag {
        ChannelFlag::Sms => validate_phone_number(address),
        ChannelFlag::Mail => validate_email(address),
        ChannelFlag::Telegram => validate_chat_id(address),
        ChannelFlag::Mattermost => Ok(()),
    }
}

/// Provider priorities are restricted to a small closed range
pub fn validate_priority(priority: i32) -> ValidationResult<()> {
    if (MIN_PRIORITY..=MAX_PRIORITY).contains(&priority) {
        Ok(())
    } else {
        Err(ValidationError::PriorityOutOfRange(priority))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_validation() {
        assert!(validate_email("user@example.com").is_ok());
        assert!(validate_email("first.last+tag@sub.example.org").is_ok());
        assert!(validate_email("invalid-email").is_err());
        assert!(validate_email("@example.com").is_err());
    }

    #[test]
    fn test_phone_validation() {
        assert!(validate_phone_number("+1234567890").is_ok());
        assert!(validate_phone_number("09121234567").is_ok());
        assert!(validate_phone_number("(555) 123-4567").is_ok());
        assert!(validate_phone_number("123").is_err());
        assert!(validate_phone_number("12+34567890").is_err());
        assert!(validate_phone_number("").is_err());
    }

    #[test]
    fn test_chat_id_validation() {
        assert!(validate_chat_id("123456789").is_ok());
        assert!(validate_chat_id("-1001234567890").is_ok());
        assert!(validate_chat_id("@channel").is_err());
    }

    #[test]
    fn test_address_dispatches_on_flag() {
        assert!(validate_address(ChannelFlag::Sms, "09121234567").is_ok());
        assert!(validate_address(ChannelFlag::Telegram, "09121234567").is_ok());
        assert!(validate_address(ChannelFlag::Mail, "09121234567").is_err());
        assert_eq!(
            validate_address(ChannelFlag::Mattermost, "  "),
            Err(ValidationError::MissingField {
                field: "mattermost_id".to_string()
            })
        );
    }

    #[test]
    fn test_priority_range() {
        assert!(validate_priority(1).is_ok());
        assert!(validate_priority(5).is_ok());
        assert_eq!(
            validate_priority(0),
            Err(ValidationError::PriorityOutOfRange(0))
        );
        assert!(validate_priority(6).is_err());
    }
}
