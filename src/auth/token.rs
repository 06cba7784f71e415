use rand::Rng;
use time::{Duration, OffsetDateTime};

pub const CODE_MIN: u32 = 100_000;
pub const CODE_MAX: u32 = 999_999;

/// Generate a 6-digit verification code, uniform over 100000..=999999.
/// The lower bound keeps the code at six digits; no leading zeros to lose.
pub fn generate_code() -> String {
    rand::thread_rng().gen_range(CODE_MIN..=CODE_MAX).to_string()
}

/// Absolute expiry instant for a code issued at `now`.
pub fn expiry_after(now: OffsetDateTime, ttl_minutes: i64) -> OffsetDateTime {
    now + Duration::minutes(ttl_minutes)
}
