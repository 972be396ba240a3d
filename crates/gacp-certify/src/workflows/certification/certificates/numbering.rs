use rand::RngCore;

use super::super::domain::RegionCode;

/// Components of `PREFIX-YEAR-REGION-SEQ`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateNumber {
    pub prefix: String,
    pub year: i32,
    pub region: RegionCode,
    pub sequence: u32,
}

impl CertificateNumber {
    pub fn new(prefix: &str, year: i32, region: RegionCode, sequence: u32) -> Self {
        Self {
            prefix: prefix.to_string(),
            year,
            region,
            sequence,
        }
    }

    /// Fields are read from the right so a hyphenated prefix survives the round trip.
    pub fn parse(value: &str) -> Option<Self> {
        let mut parts = value.trim().rsplitn(4, '-');
        let sequence = parts.next()?.parse::<u32>().ok()?;
        let region = parts.next()?;
        let year = parts.next()?.parse::<i32>().ok()?;
        let prefix = parts.next()?;
        if !is_valid_prefix(prefix) || !RegionCode::is_registry_code(region) {
            return None;
        }
        Some(Self::new(prefix, year, RegionCode(region.to_string()), sequence))
    }
}

/// ASCII letters, digits and inner hyphens only.
pub fn is_valid_prefix(prefix: &str) -> bool {
    !prefix.is_empty()
        && !prefix.starts_with('-')
        && !prefix.ends_with('-')
        && prefix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
}

impl std::fmt::Display for CertificateNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}-{}-{}-{:04}",
            self.prefix, self.year, self.region, self.sequence
        )
    }
}

/// Random opaque code printed on the certificate and required for public verification.
pub fn generate_verification_code() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode_upper(bytes)
}
