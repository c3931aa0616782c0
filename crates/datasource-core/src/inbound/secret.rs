//! Shared-secret verification for provider callbacks

use subtle::ConstantTimeEq;

/// Compare a callback-supplied secret with the configured one
///
/// Returns `false` when no secret is configured, when the configured secret
/// is blank, or when the candidate differs. The comparison does not
/// short-circuit on the first differing byte.
pub fn verify_shared_secret(configured: Option<&str>, candidate: &str) -> bool {
    let Some(configured) = configured.filter(|secret| !secret.is_empty()) else {
        return false;
    };

    let expected = configured.as_bytes();
    let provided = candidate.as_bytes();
    expected.len() == provided.len() && bool::from(expected.ct_eq(provided))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matching_secret() {
        assert!(verify_shared_secret(Some("abc"), "abc"));
    }

    #[test]
    fn test_mismatched_secret() {
        assert!(!verify_shared_secret(Some("abc"), "xyz"));
        assert!(!verify_shared_secret(Some("abc"), "abcd"));
        assert!(!verify_shared_secret(Some("abc"), ""));
    }

    #[test]
    fn test_unconfigured_secret_never_matches() {
        assert!(!verify_shared_secret(None, ""));
        assert!(!verify_shared_secret(None, "abc"));
        assert!(!verify_shared_secret(Some(""), ""));
    }
}
