//! LTM path glob matching: `*` matches one path segment, `**` matches any
//! number of segments (including zero). Patterns MUST begin with `/`; a
//! caller-supplied pattern missing the leading `/` has one prepended.

/// Normalize a caller-supplied pattern: prepend `/` if missing.
pub fn normalize_pattern(pattern: &str) -> String {
    if pattern.starts_with('/') {
        pattern.to_string()
    } else {
        format!("/{pattern}")
    }
}

fn segments(path: &str) -> Vec<&str> {
    path.trim_start_matches('/').split('/').filter(|s| !s.is_empty()).collect()
}

/// Does `path` match `pattern`, per the segment-wise `*`/`**` rules?
pub fn matches(pattern: &str, path: &str) -> bool {
    let pattern = normalize_pattern(pattern);
    match_segments(&segments(&pattern), &segments(path))
}

fn match_segments(pattern: &[&str], path: &[&str]) -> bool {
    match pattern.first() {
        None => path.is_empty(),
        Some(&"**") => {
            if pattern.len() == 1 {
                return true;
            }
            (0..=path.len()).any(|split| match_segments(&pattern[1..], &path[split..]))
        }
        Some(&"*") => {
            !path.is_empty() && match_segments(&pattern[1..], &path[1..])
        }
        Some(seg) => path.first() == Some(seg) && match_segments(&pattern[1..], &path[1..]),
    }
}
