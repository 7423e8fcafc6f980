use std::time::{SystemTime, UNIX_EPOCH};

/// Reduces a client supplied file name to `[A-Za-z0-9._-]`.
///
/// Path separators and whitespace become `_`, any other character is
/// dropped and leading or trailing `.`/`_` are trimmed, so the result can
/// never address anything outside a flat directory. May return an empty
/// string.
pub fn secure_filename(name: &str) -> String {
    let spaced: String = name
        .chars()
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();

    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");

    let filtered: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();

    filtered.trim_matches(|c| c == '.' || c == '_').to_string()
}

/// A name that passes through `secure_filename` untouched.
pub fn is_safe_file_name(name: &str) -> bool {
    !name.is_empty() && secure_filename(name) == name
}

/// The lower-cased extension of a file name, if any.
pub fn extension_of(name: &str) -> Option<String> {
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }

    Some(ext.to_ascii_lowercase())
}

/// Checks the extension of `name` against an allow list, ignoring case.
pub fn has_allowed_extension(name: &str, allowed: &[String]) -> bool {
    match extension_of(name) {
        Some(ext) => allowed.iter().any(|allowed| allowed.eq_ignore_ascii_case(&ext)),
        None => false,
    }
}

pub fn now_epoch_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Wall clock time at nanosecond resolution, formatted as `secs.nanos`.
pub fn high_resolution_timestamp() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}.{:09}", now.as_secs(), now.subsec_nanos())
}
