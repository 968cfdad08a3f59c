//! Field rules shared by the registration and password endpoints.
//!
//! These mirror the checks the web client performs before submitting a form,
//! so a request that bypasses the client is held to the same rules.

use crate::error::AppError;

pub const TELEPHONE_DIGITS: usize = 10;
pub const AADHAR_DIGITS: usize = 12;
pub const PASSWORD_MIN_LENGTH: usize = 8;
pub const PASSWORD_SPECIAL_CHARS: &str = "#?!@$%^&*-";
/// Width of the `VARCHAR(255)` text columns.
pub const MAX_TEXT_CHARS: usize = 255;

pub fn validate_full_name(value: &str) -> Result<(), AppError> {
    ensure_within_limit("fullName", value)?;
    if is_full_name(value) {
        Ok(())
    } else {
        Err(AppError::bad_request(
            "Invalid full name. Please use only alphabets and spaces.",
        ))
    }
}

pub fn validate_email(value: &str) -> Result<(), AppError> {
    ensure_within_limit("Email", value)?;
    if is_email(value) {
        Ok(())
    } else {
        Err(AppError::bad_request("Invalid email address."))
    }
}

pub fn validate_telephone(value: &str) -> Result<(), AppError> {
    if is_digits(value, TELEPHONE_DIGITS) {
        Ok(())
    } else {
        Err(AppError::bad_request("Invalid Telephone number."))
    }
}

pub fn validate_aadhar(value: &str) -> Result<(), AppError> {
    if is_digits(value, AADHAR_DIGITS) {
        Ok(())
    } else {
        Err(AppError::bad_request("Invalid Aadhar number."))
    }
}

pub fn validate_password(value: &str) -> Result<(), AppError> {
    if is_strong_password(value) {
        Ok(())
    } else {
        Err(AppError::bad_request(
            "Password must be at least 8 characters with lowercase, uppercase, digits, and special characters.",
        ))
    }
}

fn is_full_name(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|ch| ch.is_ascii_alphabetic() || ch == ' ')
}

/// Accepts any whitespace-free `local@host.tld` run inside the value.
fn is_email(value: &str) -> bool {
    value.split_whitespace().any(|word| match word.rsplit_once('@') {
        Some((local, domain)) if !local.is_empty() => domain
            .char_indices()
            .any(|(idx, ch)| ch == '.' && idx > 0 && idx + 1 < domain.len()),
        _ => false,
    })
}

fn is_digits(value: &str, len: usize) -> bool {
    value.len() == len && value.bytes().all(|byte| byte.is_ascii_digit())
}

fn is_strong_password(value: &str) -> bool {
    value.chars().count() >= PASSWORD_MIN_LENGTH
        && value.chars().any(|ch| ch.is_ascii_uppercase())
        && value.chars().any(|ch| ch.is_ascii_lowercase())
        && value.chars().any(|ch| ch.is_ascii_digit())
        && value.chars().any(|ch| PASSWORD_SPECIAL_CHARS.contains(ch))
}

/// Rejects blank or over-long strings for free-text fields the store requires.
pub fn require_text(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::bad_request(format!("{field} must not be empty")));
    }
    ensure_within_limit(field, value)
}

/// Counts characters, not bytes, as Postgres does for `VARCHAR(n)`.
pub fn ensure_within_limit(field: &str, value: &str) -> Result<(), AppError> {
    if value.chars().count() > MAX_TEXT_CHARS {
        Err(AppError::bad_request(format!(
            "{field} must be at most {MAX_TEXT_CHARS} characters"
        )))
    } else {
        Ok(())
    }
}
