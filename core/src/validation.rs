//! Client-side validation run before any request is sent.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::ApiError;

pub const INVALID_EMAIL: &str = "Please enter a valid email address";
pub const WEAK_PASSWORD: &str = "Password does not meet the requirements";
pub const PASSWORD_MISMATCH: &str = "Passwords do not match";
pub const USERNAME_REQUIRED: &str = "Username is required";
pub const INVALID_RATING: &str = "Rating must be between 1 and 5";

pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Symbols accepted by the "special character" password rule.
pub const SPECIAL_CHARACTERS: &str = "!@#$%^&*(),.?\":{}|<>_-+=~";

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles")
});

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_PATTERN.is_match(email)
}

pub fn validate_email(email: &str) -> Result<(), ApiError> {
    if is_valid_email(email.trim()) {
        Ok(())
    } else {
        Err(ApiError::validation(INVALID_EMAIL))
    }
}

/// Which password requirements a candidate meets, each tracked on its own
/// so a form can tick them off as the user types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PasswordCheck {
    pub min_length: bool,
    pub uppercase: bool,
    pub lowercase: bool,
    pub digit: bool,
    pub special: bool,
}

impl PasswordCheck {
    pub fn evaluate(password: &str) -> Self {
        Self {
            min_length: password.chars().count() >= MIN_PASSWORD_LENGTH,
            uppercase: password.chars().any(|c| c.is_uppercase()),
            lowercase: password.chars().any(|c| c.is_lowercase()),
            digit: password.chars().any(|c| c.is_ascii_digit()),
            special: password.chars().any(|c| SPECIAL_CHARACTERS.contains(c)),
        }
    }

    pub fn is_satisfied(&self) -> bool {
        self.min_length && self.uppercase && self.lowercase && self.digit && self.special
    }
}

pub fn validate_password(password: &str, confirmation: &str) -> Result<(), ApiError> {
    if !PasswordCheck::evaluate(password).is_satisfied() {
        return Err(ApiError::validation(WEAK_PASSWORD));
    }
    if password != confirmation {
        return Err(ApiError::validation(PASSWORD_MISMATCH));
    }
    Ok(())
}

pub fn validate_registration(
    username: &str,
    email: &str,
    password: &str,
    confirmation: &str,
) -> Result<(), ApiError> {
    if username.trim().is_empty() {
        return Err(ApiError::validation(USERNAME_REQUIRED));
    }
    validate_email(email)?;
    validate_password(password, confirmation)
}

pub fn validate_rating(rate: u8) -> Result<(), ApiError> {
    if (1..=5).contains(&rate) {
        Ok(())
    } else {
        Err(ApiError::validation(INVALID_RATING))
    }
}

/// Require a non-blank text field, naming it in the message.
pub fn require(field: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        Err(ApiError::validation(format!("{field} is required")))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_pattern() {
        assert!(is_valid_email("driver@example.com"));
        assert!(is_valid_email("a.b+c@sub.example.org"));
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("missing@tld"));
        assert!(!is_valid_email("two words@example.com"));
        assert!(!is_valid_email("@example.com"));
    }

    #[test]
    fn invalid_email_message_is_literal() {
        let err = validate_email("not-an-email").unwrap_err();
        assert_eq!(err.to_string(), "Please enter a valid email address");
    }

    #[test]
    fn each_password_requirement_flips_independently() {
        let mut password = String::new();
        let check = PasswordCheck::evaluate(&password);
        assert_eq!(check, PasswordCheck::default());

        password.push('a');
        let check = PasswordCheck::evaluate(&password);
        assert!(check.lowercase);
        assert!(!check.uppercase && !check.digit && !check.special && !check.min_length);

        password.push('B');
        let check = PasswordCheck::evaluate(&password);
        assert!(check.uppercase);
        assert!(!check.digit && !check.special);

        password.push('3');
        let check = PasswordCheck::evaluate(&password);
        assert!(check.digit);
        assert!(!check.special);

        password.push('!');
        let check = PasswordCheck::evaluate(&password);
        assert!(check.special);
        assert!(!check.min_length);
        assert!(!check.is_satisfied());

        password.push_str("xyzw");
        let check = PasswordCheck::evaluate(&password);
        assert!(check.min_length);
        assert!(check.is_satisfied());

        // Removing the only digit clears just that requirement.
        let without_digit = password.replace('3', "c");
        let check = PasswordCheck::evaluate(&without_digit);
        assert!(!check.digit);
        assert!(check.min_length && check.uppercase && check.lowercase && check.special);
    }

    #[test]
    fn symbols_outside_the_set_do_not_count() {
        let check = PasswordCheck::evaluate("Abcdefg1`");
        assert!(!check.special);
    }

    #[test]
    fn password_confirmation_must_match() {
        assert!(validate_password("Secret12!", "Secret12!").is_ok());
        let err = validate_password("Secret12!", "Secret12?").unwrap_err();
        assert_eq!(err.to_string(), PASSWORD_MISMATCH);
        let err = validate_password("short", "short").unwrap_err();
        assert_eq!(err.to_string(), WEAK_PASSWORD);
    }

    #[test]
    fn registration_checks_in_order() {
        let err = validate_registration(" ", "bad", "x", "y").unwrap_err();
        assert_eq!(err.to_string(), USERNAME_REQUIRED);
        let err = validate_registration("ana", "bad", "x", "y").unwrap_err();
        assert_eq!(err.to_string(), INVALID_EMAIL);
        assert!(validate_registration("ana", "ana@example.com", "Secret12!", "Secret12!").is_ok());
    }

    #[test]
    fn rating_bounds() {
        assert!(validate_rating(0).is_err());
        assert!(validate_rating(1).is_ok());
        assert!(validate_rating(5).is_ok());
        assert!(validate_rating(6).is_err());
    }

    #[test]
    fn require_names_the_field() {
        assert_eq!(require("Subject", "  ").unwrap_err().to_string(), "Subject is required");
        assert!(require("Subject", "Hi").is_ok());
    }
}
