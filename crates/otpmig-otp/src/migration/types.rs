//! Core types for the migration batch and its credential entries.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Scheme of the batch export link.
pub const MIGRATION_SCHEME: &str = "otpauth-migration";
/// Fixed authority of the batch export link.
pub const MIGRATION_HOST: &str = "offline";
/// Scheme of a single credential URI.
pub const CREDENTIAL_SCHEME: &str = "otpauth";
/// Line prefix that marks a credential URI in free text.
pub const CREDENTIAL_PREFIX: &str = "otpauth://";
/// TOTP period in seconds. Not configurable.
pub const PERIOD_SECS: i64 = 30;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Algorithm
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Hash algorithm used for HMAC-based OTP, as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Algorithm {
    #[default]
    Unspecified,
    Sha1,
    Sha256,
    Sha512,
    Md5,
}

impl Algorithm {
    pub fn from_wire(v: u64) -> Option<Self> {
        match v {
            0 => Some(Self::Unspecified),
            1 => Some(Self::Sha1),
            2 => Some(Self::Sha256),
            3 => Some(Self::Sha512),
            4 => Some(Self::Md5),
            _ => None,
        }
    }

    pub fn to_wire(self) -> u64 {
        match self {
            Self::Unspecified => 0,
            Self::Sha1 => 1,
            Self::Sha256 => 2,
            Self::Sha512 => 3,
            Self::Md5 => 4,
        }
    }

    /// The hash actually used: `Unspecified` means SHA-1.
    pub fn resolved(self) -> Self {
        match self {
            Self::Unspecified => Self::Sha1,
            other => other,
        }
    }

    /// URI-safe name for `otpauth://` parameters.
    pub fn uri_name(self) -> &'static str {
        match self.resolved() {
            Self::Sha256 => "SHA256",
            Self::Sha512 => "SHA512",
            Self::Md5 => "MD5",
            Self::Sha1 | Self::Unspecified => "SHA1",
        }
    }

    /// Parse an `algorithm=` query value. Empty and unknown values map to SHA-1.
    pub fn from_uri_param(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "SHA256" => Self::Sha256,
            "SHA512" => Self::Sha512,
            "MD5" => Self::Md5,
            _ => Self::Sha1,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.uri_name())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Digit count
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Length of the generated code, as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DigitCount {
    #[default]
    Unspecified,
    Six,
    Eight,
}

impl DigitCount {
    pub fn from_wire(v: u64) -> Option<Self> {
        match v {
            0 => Some(Self::Unspecified),
            1 => Some(Self::Six),
            2 => Some(Self::Eight),
            _ => None,
        }
    }

    pub fn to_wire(self) -> u64 {
        match self {
            Self::Unspecified => 0,
            Self::Six => 1,
            Self::Eight => 2,
        }
    }

    /// Number of digits: always 6 or 8.
    pub fn count(self) -> u32 {
        match self {
            Self::Eight => 8,
            Self::Six | Self::Unspecified => 6,
        }
    }

    /// Parse a `digits=` query value. Anything but `8` means six digits.
    pub fn from_uri_param(s: &str) -> Self {
        if s.trim() == "8" {
            Self::Eight
        } else {
            Self::Six
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  OTP type
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Whether an entry is counter-based or time-based, as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OtpType {
    #[default]
    Unspecified,
    Hotp,
    Totp,
}

impl OtpType {
    pub fn from_wire(v: u64) -> Option<Self> {
        match v {
            0 => Some(Self::Unspecified),
            1 => Some(Self::Hotp),
            2 => Some(Self::Totp),
            _ => None,
        }
    }

    pub fn to_wire(self) -> u64 {
        match self {
            Self::Unspecified => 0,
            Self::Hotp => 1,
            Self::Totp => 2,
        }
    }

    pub fn is_hotp(self) -> bool {
        self == Self::Hotp
    }

    /// Authority used in `otpauth://` URIs.
    pub fn uri_name(self) -> &'static str {
        match self {
            Self::Hotp => "hotp",
            Self::Totp | Self::Unspecified => "totp",
        }
    }
}

impl fmt::Display for OtpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.uri_name())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Entry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One credential inside a migration batch.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OtpEntry {
    /// Raw key bytes.
    pub secret: Vec<u8>,
    /// Account label; may carry an `issuer:` prefix.
    pub name: String,
    /// Issuer display string, empty when absent.
    pub issuer: String,
    pub algorithm: Algorithm,
    pub digits: DigitCount,
    pub otp_type: OtpType,
    /// Moving factor for HOTP. Ignored for TOTP.
    pub counter: u64,
}

impl OtpEntry {
    /// Create a TOTP entry with every enum left unspecified.
    pub fn new(name: impl Into<String>, secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    /// Builder: set issuer.
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }

    /// Builder: set algorithm.
    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Builder: set digit count.
    pub fn with_digits(mut self, digits: DigitCount) -> Self {
        self.digits = digits;
        self
    }

    /// Builder: set type explicitly.
    pub fn with_type(mut self, otp_type: OtpType) -> Self {
        self.otp_type = otp_type;
        self
    }

    /// Builder: mark as HOTP.
    pub fn as_hotp(mut self, counter: u64) -> Self {
        self.otp_type = OtpType::Hotp;
        self.counter = counter;
        self
    }

    /// Stable identifier derived from the secret bytes (UUID v5, URL namespace).
    pub fn id(&self) -> Uuid {
        Uuid::new_v5(&Uuid::NAMESPACE_URL, &self.secret)
    }

    /// Advance the HOTP moving factor and return the new value.
    ///
    /// This is the only mutation an entry ever sees; whoever calls it must be
    /// the entry's single owner. A counter at `u64::MAX` is exhausted and
    /// stays put.
    pub fn advance_counter(&mut self) -> Result<u64, MigrationError> {
        self.counter = self.counter.checked_add(1).ok_or_else(|| {
            MigrationError::validation("HOTP counter exhausted").with_detail(self.name.clone())
        })?;
        Ok(self.counter)
    }

    /// `name_issuer` with path-hostile characters replaced by `_`.
    pub fn file_name(&self) -> String {
        format!("{}_{}", self.name, self.issuer)
            .chars()
            .map(|c| match c {
                '/' | '\\' | ':' | '.' => '_',
                c => c,
            })
            .collect()
    }

    /// Secret-free view of this entry.
    pub fn summary(&self) -> EntrySummary {
        EntrySummary {
            id: self.id(),
            name: self.name.clone(),
            issuer: self.issuer.clone(),
            kind: self.otp_type.uri_name().to_string(),
            digits: self.digits.count(),
        }
    }
}

/// Listing view of an entry, safe to hand to viewers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntrySummary {
    pub id: Uuid,
    pub name: String,
    pub issuer: String,
    pub kind: String,
    pub digits: u32,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Batch
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Decoded migration payload. Multi-QR exports split one logical export into
/// `batch_size` batches sharing a `batch_id`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MigrationBatch {
    pub version: i32,
    pub batch_size: i32,
    pub batch_index: i32,
    pub batch_id: i64,
    pub entries: Vec<OtpEntry>,
}

impl MigrationBatch {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Error type
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Error kind for this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MigrationErrorKind {
    /// Wrong scheme or authority, or not a URI at all.
    InvalidFormat,
    /// Malformed base64 or binary schema.
    DecodeFailed,
    /// Entry or input rejected by validation rules.
    ValidationFailed,
    /// A single credential URI was skipped while building a batch.
    EntrySkipped,
    QrEncodeFailed,
    Io,
}

/// Crate-level error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationError {
    pub kind: MigrationErrorKind,
    pub message: String,
    pub detail: Option<String>,
}

impl fmt::Display for MigrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.kind, self.message)?;
        if let Some(d) = &self.detail {
            write!(f, " ({})", d)?;
        }
        Ok(())
    }
}

impl std::error::Error for MigrationError {}

impl MigrationError {
    pub fn new(kind: MigrationErrorKind, msg: impl Into<String>) -> Self {
        Self {
            kind,
            message: msg.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn format(msg: impl Into<String>) -> Self {
        Self::new(MigrationErrorKind::InvalidFormat, msg)
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::new(MigrationErrorKind::DecodeFailed, msg)
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::new(MigrationErrorKind::ValidationFailed, msg)
    }

    pub fn skipped(msg: impl Into<String>, url: &str) -> Self {
        Self::new(MigrationErrorKind::EntrySkipped, msg).with_detail(url)
    }
}

impl From<std::io::Error> for MigrationError {
    fn from(e: std::io::Error) -> Self {
        Self::new(MigrationErrorKind::Io, e.to_string())
    }
}

impl From<MigrationError> for String {
    fn from(e: MigrationError) -> String {
        e.to_string()
    }
}
