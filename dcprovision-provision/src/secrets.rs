//! Fresh secrets and identifiers, all drawn from the operating system's random source.
use base64::{engine::general_purpose::STANDARD, Engine};
use rand::{rngs::OsRng, Rng, RngCore};
use uuid::Uuid;

/// The length of every generated password
pub const PASSWORD_LENGTH: usize = 16;

/// Printable characters that need no quoting in configuration or LDIF text
const PASSWORD_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789!#%+-.=@^_~";

/// Generates a random password of [`PASSWORD_LENGTH`] characters
pub fn random_password() -> String {
    (0..PASSWORD_LENGTH)
        .map(|_| PASSWORD_ALPHABET[OsRng.gen_range(0..PASSWORD_ALPHABET.len())] as char)
        .collect()
}

/// Generates a random GUID in its textual form
pub fn random_guid() -> String {
    Uuid::new_v4().to_string()
}

/// Generates a domain security identifier with three random sub-authorities
pub fn random_domain_sid() -> String {
    format!(
        "S-1-5-21-{}-{}-{}",
        OsRng.next_u32(),
        OsRng.next_u32(),
        OsRng.next_u32()
    )
}

/// Encodes a secret for attributes that carry it base64 encoded
pub fn encode_secret(secret: &str) -> String {
    STANDARD.encode(secret)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn passwords_are_fresh_and_printable() {
        let passwords: HashSet<String> = (0..8).map(|_| random_password()).collect();
        assert_eq!(passwords.len(), 8);
        for password in &passwords {
            assert_eq!(password.len(), PASSWORD_LENGTH);
            assert!(password.bytes().all(|b| PASSWORD_ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn guids_are_version_4() {
        let guid = random_guid();
        assert_eq!(guid.len(), 36);
        assert_eq!(guid.as_bytes()[14], b'4');
        assert_ne!(guid, random_guid());
    }

    #[test]
    fn domain_sid_shape() {
        let sid = random_domain_sid();
        let parts: Vec<&str> = sid.split('-').collect();
        assert_eq!(&parts[..4], &["S", "1", "5", "21"]);
        assert_eq!(parts.len(), 7);
        assert!(parts[4..].iter().all(|p| p.parse::<u32>().is_ok()));
    }

    #[test]
    fn base64_of_secret() {
        assert_eq!(encode_secret("secret"), "c2VjcmV0");
    }
}
