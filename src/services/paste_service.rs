use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;

/// Alphabet for share codes: uppercase letters and digits
const CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Length of paste-less share codes (rooms, clipboards)
pub const SHARE_CODE_LEN: usize = 6;

/// Generate a random 6-character uppercase share code
pub fn generate_share_code() -> String {
    let mut rng = rand::rng();
    (0..SHARE_CODE_LEN)
        .map(|_| CODE_CHARSET[rng.random_range(0..CODE_CHARSET.len())] as char)
        .collect()
}

/// Parse a relative expiry such as "10m", "1h", "7d" or "1M".
///
/// Units: minutes, hours, days, and 30-day months.
pub fn parse_expiry(spec: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, String> {
    let spec = spec.trim();
    if spec.len() < 2 {
        return Err(format!(
            "Invalid expiration format '{}'. Use e.g., 10m, 1h, 7d, 1M",
            spec
        ));
    }

    let unit_len = spec.chars().last().map(|c| c.len_utf8()).unwrap_or(1);
    let (value_part, unit) = spec.split_at(spec.len() - unit_len);
    let value: i64 = value_part
        .parse()
        .map_err(|_| format!("Invalid expiration format '{}'. Use e.g., 10m, 1h, 7d, 1M", spec))?;
    if value <= 0 {
        return Err(format!("Expiration must be positive, got '{}'", spec));
    }

    let duration = match unit {
        "m" => Duration::minutes(value),
        "h" => Duration::hours(value),
        "d" => Duration::days(value),
        "M" => Duration::days(value * 30),
        other => {
            return Err(format!(
                "Unknown expiration unit '{}'. Use m, h, d or M",
                other
            ))
        }
    };

    Ok(now + duration)
}

/// Custom URLs may only contain letters, numbers, hyphens and underscores
pub fn validate_custom_url(custom_url: &str) -> bool {
    !custom_url.is_empty()
        && custom_url
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Hash a paste or room password with argon2
pub fn hash_password(password: &str) -> Result<String, String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| format!("Failed to hash password: {}", e))
}

/// Verify a password against a stored argon2 hash
pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn share_code_shape() {
        for _ in 0..50 {
            let code = generate_share_code();
            assert_eq!(code.len(), SHARE_CODE_LEN);
            assert!(code
                .bytes()
                .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit()));
        }
    }

    #[test]
    fn expiry_units() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(parse_expiry("10m", now).unwrap(), now + Duration::minutes(10));
        assert_eq!(parse_expiry("1h", now).unwrap(), now + Duration::hours(1));
        assert_eq!(parse_expiry("7d", now).unwrap(), now + Duration::days(7));
        assert_eq!(parse_expiry("1M", now).unwrap(), now + Duration::days(30));
    }

    #[test]
    fn expiry_rejects_garbage() {
        let now = Utc::now();
        assert!(parse_expiry("", now).is_err());
        assert!(parse_expiry("m", now).is_err());
        assert!(parse_expiry("10w", now).is_err());
        assert!(parse_expiry("-5d", now).is_err());
        assert!(parse_expiry("0h", now).is_err());
    }

    #[test]
    fn custom_url_charset() {
        assert!(validate_custom_url("my-snippet_01"));
        assert!(!validate_custom_url(""));
        assert!(!validate_custom_url("has space"));
        assert!(!validate_custom_url("emoji🚀"));
    }

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("s3cret").unwrap();
        assert!(verify_password("s3cret", &hash));
        assert!(!verify_password("wrong", &hash));
        assert!(!verify_password("s3cret", "not-a-hash"));
    }
}
