//! Field validation rules shared by the forms.

use super::FieldError;
use once_cell::sync::Lazy;
use regex::Regex;

/// Exactly eleven ASCII digits
static MOBILE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]{11}$").unwrap());

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\S+@\S+$").unwrap());

pub const MIN_PASSWORD_LEN: usize = 6;

pub fn is_mobile_number(value: &str) -> bool {
    MOBILE_RE.is_match(value)
}

pub fn is_email(value: &str) -> bool {
    EMAIL_RE.is_match(value)
}

/// Record `message` and return false when `value` is blank
pub fn required(
    errors: &mut Vec<FieldError>,
    field: &'static str,
    value: &str,
    message: &str,
) -> bool {
    if value.trim().is_empty() {
        errors.push(FieldError::new(field, message));
        false
    } else {
        true
    }
}

pub fn email(errors: &mut Vec<FieldError>, field: &'static str, value: &str) {
    if required(errors, field, value, "Email is required") && !is_email(value.trim()) {
        errors.push(FieldError::new(field, "Enter a valid email address"));
    }
}

pub fn mobile_number(errors: &mut Vec<FieldError>, field: &'static str, value: &str) {
    if required(errors, field, value, "Mobile number is required")
        && !is_mobile_number(value.trim())
    {
        errors.push(FieldError::new(field, "Mobile number must be 11 digits"));
    }
}

pub fn password(errors: &mut Vec<FieldError>, field: &'static str, value: &str) {
    if required(errors, field, value, "Password is required")
        && value.chars().count() < MIN_PASSWORD_LEN
    {
        errors.push(FieldError::new(
            field,
            format!(
                "Password must be at least {} characters long",
                MIN_PASSWORD_LEN
            ),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mobile_number_exactly_eleven_digits() {
        assert!(is_mobile_number("01712345678"));
        assert!(!is_mobile_number("12345"));
        assert!(!is_mobile_number("123456789012"));
        assert!(!is_mobile_number("0171234567a"));
        assert!(!is_mobile_number("+8801712345"));
        // Bengali digits are not accepted
        assert!(!is_mobile_number("০১৭১২৩৪৫৬৭৮"));
    }

    #[test]
    fn test_email_pattern() {
        assert!(is_email("rina@example.com"));
        assert!(is_email("a@b"));
        assert!(!is_email("rina.example.com"));
        assert!(!is_email("rina @example.com"));
    }

    #[test]
    fn test_required_blank() {
        let mut errors = Vec::new();
        assert!(!required(&mut errors, "name", "   ", "Name is required"));
        assert_eq!(errors, vec![FieldError::new("name", "Name is required")]);
    }

    #[test]
    fn test_mobile_number_messages() {
        let mut errors = Vec::new();
        mobile_number(&mut errors, "mobileNumber", "");
        mobile_number(&mut errors, "mobileNumber", "12345");
        mobile_number(&mut errors, "mobileNumber", "01712345678");
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].message, "Mobile number is required");
        assert_eq!(errors[1].message, "Mobile number must be 11 digits");
    }

    #[test]
    fn test_password_length() {
        let mut errors = Vec::new();
        password(&mut errors, "password", "12345");
        password(&mut errors, "password", "123456");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("at least 6"));
    }
}
