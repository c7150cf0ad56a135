//! Slug validation: 1–64 chars, lowercase ASCII alphanumerics and `-`, no
//! leading, trailing, or consecutive hyphens.

pub fn is_valid(slug: &str) -> bool {
    if slug.is_empty() || slug.len() > 64 {
        return false;
    }
    if slug.starts_with('-') || slug.ends_with('-') {
        return false;
    }
    if slug.contains("--") {
        return false;
    }
    slug.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ordinary_slugs() {
        assert!(is_valid("project-notes"));
        assert!(is_valid("a"));
        assert!(is_valid(&"a".repeat(64)));
    }

    #[test]
    fn rejects_bad_shapes() {
        assert!(!is_valid(""));
        assert!(!is_valid(&"a".repeat(65)));
        assert!(!is_valid("-leading"));
        assert!(!is_valid("trailing-"));
        assert!(!is_valid("double--hyphen"));
        assert!(!is_valid("Has-Upper"));
        assert!(!is_valid("has_underscore"));
    }
}
