//! Input rules enforced before anything reaches the tables.

use crate::error::{StoreError, StoreResult};

pub const MAX_CHANNEL_NAME_LEN: usize = 80;
pub const MAX_CONTENT_LEN: usize = 4000;
pub const MAX_EMOJI_LEN: usize = 64;
pub const MAX_NAME_LEN: usize = 64;
pub const MAX_BIO_LEN: usize = 500;
pub const MAX_URL_LEN: usize = 2048;
pub const MIN_PASSWORD_LEN: usize = 8;

/// 50 MB limit for attachments
pub const MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// Channel names double as path segments in clients, so anything that could
/// traverse or escape a path is refused.
pub fn channel_name(raw: &str) -> StoreResult<String> {
    let name = raw.trim();
    if name.is_empty() || name.chars().count() > MAX_CHANNEL_NAME_LEN {
        return Err(StoreError::invalid(format!(
            "channel name must be 1-{} characters",
            MAX_CHANNEL_NAME_LEN
        )));
    }
    if name.contains('/') || name.contains('\\') || name.contains("..") || name.starts_with('.') {
        return Err(StoreError::invalid("channel name contains a path separator"));
    }
    if name.chars().any(char::is_control) {
        return Err(StoreError::invalid("channel name contains control characters"));
    }
    Ok(name.to_string())
}

pub fn content(raw: &str) -> StoreResult<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(StoreError::invalid("content must not be empty"));
    }
    if trimmed.chars().count() > MAX_CONTENT_LEN {
        return Err(StoreError::invalid(format!(
            "content exceeds {} characters",
            MAX_CONTENT_LEN
        )));
    }
    Ok(trimmed.to_string())
}

pub fn emoji(raw: &str) -> StoreResult<String> {
    let emoji = raw.trim();
    if emoji.is_empty() || emoji.chars().count() > MAX_EMOJI_LEN || emoji.chars().any(char::is_whitespace) {
        return Err(StoreError::invalid("invalid emoji"));
    }
    Ok(emoji.to_string())
}

pub fn email(raw: &str) -> StoreResult<String> {
    let email = raw.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if !valid || email.len() > 254 {
        return Err(StoreError::invalid("invalid email address"));
    }
    Ok(email)
}

pub fn password(raw: &str) -> StoreResult<()> {
    if raw.len() < MIN_PASSWORD_LEN {
        return Err(StoreError::invalid(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

pub fn display_name(raw: &str) -> StoreResult<String> {
    let name = raw.trim();
    if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
        return Err(StoreError::invalid(format!(
            "name must be 1-{} characters",
            MAX_NAME_LEN
        )));
    }
    Ok(name.to_string())
}

pub fn bio(raw: &str) -> StoreResult<String> {
    if raw.chars().count() > MAX_BIO_LEN {
        return Err(StoreError::invalid(format!("bio exceeds {} characters", MAX_BIO_LEN)));
    }
    Ok(raw.trim().to_string())
}

pub fn url(raw: &str) -> StoreResult<String> {
    let url = raw.trim();
    if url.is_empty() || url.len() > MAX_URL_LEN {
        return Err(StoreError::invalid("invalid url"));
    }
    Ok(url.to_string())
}

pub fn file_size(size: u64) -> StoreResult<i64> {
    if size > MAX_FILE_SIZE {
        return Err(StoreError::invalid(format!(
            "file exceeds {} bytes",
            MAX_FILE_SIZE
        )));
    }
    Ok(size as i64)
}
