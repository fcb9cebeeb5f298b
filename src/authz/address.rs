/// Alias address validation and normalization
use crate::error::{Error, Result};
use std::sync::LazyLock;

/// Accepted local-part alphabet, bounded to 64 characters
static LOCAL_PART_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^[a-z0-9._%+-]{1,64}$").unwrap());

/// Validate a local part against the service's acceptance set.
///
/// Violations keep their own named kinds so API clients can tell a length
/// failure from a dot-placement failure.
pub fn validate_local_part(local_part: &str) -> Result<()> {
    if local_part.is_empty() {
        return Err(Error::validation("local_part", "empty"));
    }
    if local_part.len() > 64 {
        return Err(Error::validation("local_part", "too_long"));
    }
    if local_part.starts_with('.') {
        return Err(Error::validation("local_part", "leading_dot"));
    }
    if local_part.ends_with('.') {
        return Err(Error::validation("local_part", "trailing_dot"));
    }
    if local_part.contains("..") {
        return Err(Error::validation("local_part", "consecutive_dots"));
    }
    if !LOCAL_PART_RE.is_match(local_part) {
        return Err(Error::validation("local_part", "invalid_characters"));
    }
    Ok(())
}

/// Compose the canonical full address: `lower(local)@lower(domain)`.
///
/// This string is the global uniqueness key for aliases. The caller
/// validates the lower-cased local part before storage.
pub fn full_address(local_part: &str, domain_name: &str) -> String {
    format!(
        "{}@{}",
        local_part.to_lowercase(),
        domain_name.to_lowercase()
    )
}

/// Check that a string is a plausible DNS hostname for certificate requests
pub fn is_valid_hostname(name: &str) -> bool {
    if name.is_empty() || name.len() > 253 {
        return false;
    }
    name.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_valid_local_parts() {
        for s in ["alice", "a", "a.b", "user+tag", "u_x%1-2", &"a".repeat(64)] {
            assert!(validate_local_part(s).is_ok(), "{} should be accepted", s);
        }
    }

    #[test]
    fn test_rejects_with_named_kinds() {
        let cases = [
            ("", "empty"),
            (".alice", "leading_dot"),
            ("alice.", "trailing_dot"),
            ("ali..ce", "consecutive_dots"),
            ("Alice", "invalid_characters"),
            ("al ice", "invalid_characters"),
            ("al@ice", "invalid_characters"),
        ];
        for (input, expected) in cases {
            match validate_local_part(input) {
                Err(Error::Validation { kind, .. }) => assert_eq!(kind, expected, "for {:?}", input),
                other => panic!("expected validation error for {:?}, got {:?}", input, other),
            }
        }
        // 65 chars trips the length check before the regex
        match validate_local_part(&"a".repeat(65)) {
            Err(Error::Validation { kind, .. }) => assert_eq!(kind, "too_long"),
            other => panic!("expected too_long, got {:?}", other),
        }
    }

    #[test]
    fn test_full_address_is_lowercased() {
        assert_eq!(full_address("Alice", "Example.COM"), "alice@example.com");
        assert_eq!(full_address("bob", "example.com"), "bob@example.com");
    }

    #[test]
    fn test_hostname_check() {
        assert!(is_valid_hostname("example.com"));
        assert!(is_valid_hostname("mail.example.com"));
        assert!(!is_valid_hostname(""));
        assert!(!is_valid_hostname("-bad.com"));
        assert!(!is_valid_hostname("bad-.com"));
        assert!(!is_valid_hostname("exa mple.com"));
    }
}
