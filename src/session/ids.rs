use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::{rngs::SmallRng, RngCore, SeedableRng};

/// Generates an opaque UI session id: 32 random bytes, URL-safe base64.
///
/// `insecure` selects a fast non-cryptographic PRNG instead of the OS CSPRNG, matching
/// the original's (never-finished) `insecure` testing flag. It must never be set in
/// production: ids minted this way are guessable.
pub fn generate_ui_id(insecure: bool) -> String {
    let mut bytes = [0u8; 32];
    if insecure {
        SmallRng::from_entropy().fill_bytes(&mut bytes);
    } else {
        rand::rngs::OsRng.fill_bytes(&mut bytes);
    }
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_url_safe() {
        let a = generate_ui_id(false);
        let b = generate_ui_id(false);
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn insecure_path_also_produces_distinct_ids() {
        let a = generate_ui_id(true);
        let b = generate_ui_id(true);
        assert_ne!(a, b);
    }
}
