//! Filename sanitization for segment name prefixes.

/// Characters that are invalid in filenames on at least one platform.
const INVALID_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Windows reserved device names (case-insensitive).
const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Make `input` safe to embed in a filename.
///
/// Control characters are removed, path separators and other invalid
/// characters become `_` (runs collapsed), leading/trailing dots and spaces
/// are trimmed and reserved names get a trailing `_`. An empty result
/// becomes `"unnamed"`.
pub fn sanitize_filename(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if c.is_control() {
            continue;
        }
        let c = if INVALID_CHARS.contains(&c) { '_' } else { c };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }

    let trimmed = out.trim_matches(|c: char| c == '.' || c == ' ');
    if trimmed.is_empty() {
        return "unnamed".to_string();
    }

    let stem = trimmed.split('.').next().unwrap_or(trimmed);
    if RESERVED_NAMES.iter().any(|r| r.eq_ignore_ascii_case(stem)) {
        return format!("{trimmed}_");
    }

    trimmed.to_string()
}
