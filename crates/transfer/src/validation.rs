use crate::TransferError;

/// Longest key most object stores accept, in bytes.
pub const MAX_KEY_LEN: usize = 1024;

/// Validates an object key: `/`-separated segments naming a single object.
///
/// Rejects empty or over-long keys, a leading `/`, a trailing `/` (a
/// folder, not an object), empty, `.` or `..` segments, backslashes and
/// control characters.
pub fn validate_object_key(key: &str) -> Result<(), TransferError> {
    let invalid = |reason: &str| -> Result<(), TransferError> {
        Err(TransferError::InvalidKey(format!("{reason}: {key:?}")))
    };

    if key.is_empty() {
        return invalid("empty key");
    }
    if key.len() > MAX_KEY_LEN {
        return invalid("key longer than 1024 bytes");
    }
    if key.starts_with('/') {
        return invalid("absolute key not allowed");
    }
    if key.ends_with('/') {
        return invalid("key names a folder");
    }
    if key.chars().any(|c| c == '\\' || c.is_control()) {
        return invalid("backslash or control character in key");
    }

    for segment in key.split('/') {
        match segment {
            "" => return invalid("empty segment in key"),
            "." | ".." => return invalid("relative segment in key"),
            _ => {}
        }
    }

    Ok(())
}

/// Normalizes a destination prefix: no leading `/`, always a trailing `/`.
///
/// A blank prefix becomes the empty string (bucket root).
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_start_matches('/');
    if trimmed.is_empty() {
        return String::new();
    }
    if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    }
}
