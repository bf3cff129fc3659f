//! OTP evaluation: RFC 4226 (HOTP) and RFC 6238 (TOTP) over batch entries.
//!
//! [`hotp_value`] is pure. [`OtpEngine`] adds the time base: an explicit
//! `DateTime<Utc>` plus a configurable forward bias, so a code shown to a
//! user is still valid by the time it is typed.

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use md5::Md5;
use sha1::Sha1;
use sha2::{Sha256, Sha512};

use crate::migration::types::*;

/// Default forward bias applied to the clock, in seconds.
pub const DEFAULT_BIAS_SECS: i64 = 5;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Raw HMAC-OTP (RFC 4226 §5.3)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Compute the numeric HOTP value for raw key bytes and a counter.
///
/// `Algorithm::Unspecified` hashes with SHA-1 and `DigitCount::Unspecified`
/// yields six digits.
pub fn hotp_value(
    secret: &[u8],
    counter: u64,
    algorithm: Algorithm,
    digits: DigitCount,
) -> Result<u32, MigrationError> {
    let digest = compute_hmac(secret, &counter.to_be_bytes(), algorithm)?;
    let binary = truncate(&digest)?;
    Ok(binary % 10u32.pow(digits.count()))
}

/// HMAC(key, data) with the resolved hash.
fn compute_hmac(key: &[u8], data: &[u8], algorithm: Algorithm) -> Result<Vec<u8>, MigrationError> {
    let key_err = |e: hmac::digest::InvalidLength| {
        MigrationError::validation("HMAC rejected the key").with_detail(e.to_string())
    };
    let digest = match algorithm.resolved() {
        Algorithm::Sha1 | Algorithm::Unspecified => {
            let mut mac = Hmac::<Sha1>::new_from_slice(key).map_err(key_err)?;
            mac.update(data);
            mac.finalize().into_bytes().to_vec()
        }
        Algorithm::Sha256 => {
            let mut mac = Hmac::<Sha256>::new_from_slice(key).map_err(key_err)?;
            mac.update(data);
            mac.finalize().into_bytes().to_vec()
        }
        Algorithm::Sha512 => {
            let mut mac = Hmac::<Sha512>::new_from_slice(key).map_err(key_err)?;
            mac.update(data);
            mac.finalize().into_bytes().to_vec()
        }
        Algorithm::Md5 => {
            let mut mac = Hmac::<Md5>::new_from_slice(key).map_err(key_err)?;
            mac.update(data);
            mac.finalize().into_bytes().to_vec()
        }
    };
    Ok(digest)
}

/// Dynamic truncation per RFC 4226 §5.3, before the modulus.
///
/// The offset can reach 15, which overruns a 16-byte MD5 digest; such
/// counters have no defined value and are reported as errors.
fn truncate(digest: &[u8]) -> Result<u32, MigrationError> {
    let last = digest
        .last()
        .ok_or_else(|| MigrationError::validation("empty HMAC digest"))?;
    let offset = (last & 0x0f) as usize;
    let window = digest.get(offset..offset + 4).ok_or_else(|| {
        MigrationError::validation("truncation offset past end of digest")
            .with_detail(format!("offset {} in {}-byte digest", offset, digest.len()))
    })?;
    let binary = ((window[0] as u32 & 0x7f) << 24)
        | ((window[1] as u32) << 16)
        | ((window[2] as u32) << 8)
        | (window[3] as u32);
    Ok(binary)
}

/// Left-pad a code with zeros to exactly the entry's digit count.
pub fn format_code(value: u32, digits: DigitCount) -> String {
    format!("{:0>width$}", value, width = digits.count() as usize)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Engine
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Evaluates entries against an explicit timestamp shifted by `bias`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OtpEngine {
    pub bias: Duration,
}

impl Default for OtpEngine {
    fn default() -> Self {
        Self::with_bias_secs(DEFAULT_BIAS_SECS)
    }
}

impl OtpEngine {
    pub fn with_bias_secs(secs: i64) -> Self {
        Self {
            bias: Duration::seconds(secs),
        }
    }

    /// No bias: codes for exactly `now`.
    pub fn unbiased() -> Self {
        Self::with_bias_secs(0)
    }

    fn biased(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + self.bias
    }

    /// TOTP time-step counter for `now`.
    pub fn time_step(&self, now: DateTime<Utc>) -> u64 {
        self.biased(now).timestamp().div_euclid(PERIOD_SECS) as u64
    }

    /// Seconds elapsed in the current 30-second window, with sub-second precision.
    pub fn seconds_in_period(&self, now: DateTime<Utc>) -> f64 {
        let t = self.biased(now);
        let whole = t.timestamp().rem_euclid(PERIOD_SECS) as f64;
        whole + f64::from(t.timestamp_subsec_nanos()) / 1e9
    }

    /// Compute the entry's current code.
    ///
    /// HOTP entries advance their counter first and use the new value, so
    /// two calls never return the code for the same counter.
    pub fn evaluate(&self, entry: &mut OtpEntry, now: DateTime<Utc>) -> Result<u32, MigrationError> {
        if entry.secret.is_empty() {
            return Err(MigrationError::validation("secret is empty").with_detail(entry.name.clone()));
        }
        let counter = if entry.otp_type.is_hotp() {
            entry.advance_counter()?
        } else {
            self.time_step(now)
        };
        hotp_value(&entry.secret, counter, entry.algorithm, entry.digits)
    }

    /// [`evaluate`](Self::evaluate), zero-padded to the entry's digit count.
    pub fn evaluate_string(&self, entry: &mut OtpEntry, now: DateTime<Utc>) -> Result<String, MigrationError> {
        let digits = entry.digits;
        self.evaluate(entry, now).map(|v| format_code(v, digits))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
