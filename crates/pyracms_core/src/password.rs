//! PBKDF2-SHA512 password hashes.
//!
//! Stored form: `$pbkdf2-sha512$<rounds>$<salt hex>$<digest hex>`.

use anyhow::{Context, Result, bail};
use rand::RngCore;
use sha2::Sha512;

const SCHEME: &str = "pbkdf2-sha512";
const SALT_LEN: usize = 16;
const DIGEST_LEN: usize = 64;

pub fn hash_password(plain: &str, rounds: u32) -> Result<String> {
    if plain.is_empty() {
        bail!("password cannot be empty");
    }
    if rounds == 0 {
        bail!("password rounds must be positive");
    }
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    let digest = derive(plain, &salt, rounds);
    Ok(format!(
        "${SCHEME}${rounds}${}${}",
        hex::encode(salt),
        hex::encode(digest)
    ))
}

pub fn verify_password(plain: &str, stored: &str) -> Result<bool> {
    let parsed = parse_stored(stored)?;
    let actual = derive(plain, &parsed.salt, parsed.rounds);
    let difference = actual
        .iter()
        .zip(parsed.digest.iter())
        .fold(0u8, |acc, (left, right)| acc | (left ^ right));
    Ok(difference == 0)
}

/// True only for a complete stored hash; a bare scheme prefix is plaintext.
pub fn is_password_hash(value: &str) -> bool {
    parse_stored(value).is_ok()
}

struct StoredHash {
    rounds: u32,
    salt: Vec<u8>,
    digest: Vec<u8>,
}

fn parse_stored(stored: &str) -> Result<StoredHash> {
    let parts: Vec<&str> = stored.split('$').collect();
    let [empty, scheme, rounds, salt, digest] = parts.as_slice() else {
        bail!("stored password is not in ${SCHEME}$ form");
    };
    if !empty.is_empty() || *scheme != SCHEME {
        bail!("unsupported password scheme `{scheme}`");
    }
    let rounds = rounds
        .parse::<u32>()
        .context("stored password has an invalid round count")?;
    if rounds == 0 {
        bail!("stored password has zero rounds");
    }
    let salt = hex::decode(salt).context("stored password salt is not hex")?;
    if salt.is_empty() {
        bail!("stored password has an empty salt");
    }
    let digest = hex::decode(digest).context("stored password digest is not hex")?;
    if digest.len() != DIGEST_LEN {
        bail!("stored password digest has the wrong length");
    }
    Ok(StoredHash {
        rounds,
        salt,
        digest,
    })
}

fn derive(plain: &str, salt: &[u8], rounds: u32) -> [u8; DIGEST_LEN] {
    let mut digest = [0u8; DIGEST_LEN];
    pbkdf2::pbkdf2_hmac::<Sha512>(plain.as_bytes(), salt, rounds, &mut digest);
    digest
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let stored = hash_password("password1", 10).expect("hash");
        assert!(is_password_hash(&stored));
        assert!(stored.starts_with("$pbkdf2-sha512$10$"));
        assert!(verify_password("password1", &stored).expect("verify"));
        assert!(!verify_password("password2", &stored).expect("verify"));
    }

    #[test]
    fn hashes_are_salted() {
        let first = hash_password("same", 10).expect("hash");
        let second = hash_password("same", 10).expect("hash");
        assert_ne!(first, second);
    }

    #[test]
    fn rejects_empty_and_malformed_input() {
        assert!(hash_password("", 10).is_err());
        assert!(hash_password("secret", 0).is_err());
        assert!(verify_password("secret", "plaintext").is_err());
        assert!(verify_password("secret", "$md5$1$00$00").is_err());
    }

    #[test]
    fn scheme_prefix_alone_is_not_a_hash() {
        assert!(!is_password_hash("$pbkdf2-sha512$hunter2"));
        assert!(!is_password_hash("$pbkdf2-sha512$10$zz$00"));
        let short_digest = format!("$pbkdf2-sha512$10$00ff${}", "ab".repeat(8));
        assert!(!is_password_hash(&short_digest));
        let zero_rounds = format!("$pbkdf2-sha512$0$00ff${}", "ab".repeat(DIGEST_LEN));
        assert!(!is_password_hash(&zero_rounds));

        let stored = hash_password("hunter2", 10).expect("hash");
        assert!(is_password_hash(&stored));
    }
}
