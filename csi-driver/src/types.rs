//! Type-safe wrappers for CSI identifiers.
//!
//! These types provide compile-time safety for identifiers that are parsed
//! from CSI requests at API boundaries. Each type implements `FromStr` for
//! parsing and `Display` for the wire encoding.

use std::fmt::{self, Display};
use std::str::FromStr;

/// Maximum length of a Linode volume label.
pub const MAX_VOLUME_LABEL_LEN: usize = 32;

// ============================================================================
// VolumeKey
// ============================================================================

/// Identity of a block-storage volume as exposed to the orchestrator.
///
/// The wire form is `"{id}-{label}"` where `id` is the numeric cloud volume
/// id and `label` is the volume label used for on-host device discovery.
/// Parsing splits on the first `-` so labels may themselves contain dashes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VolumeKey {
    /// Numeric id of the volume in the cloud API.
    pub volume_id: u64,
    /// Volume label, the stable `/dev/disk/by-id` discovery key.
    pub label: String,
}

impl VolumeKey {
    /// Create a key from a cloud volume id and label.
    pub fn new(volume_id: u64, label: impl Into<String>) -> Self {
        Self {
            volume_id,
            label: label.into(),
        }
    }
}

impl Display for VolumeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.volume_id, self.label)
    }
}

impl FromStr for VolumeKey {
    type Err = VolumeKeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (id, label) = s
            .split_once('-')
            .ok_or_else(|| VolumeKeyParseError(s.to_string()))?;

        if id.is_empty() || label.is_empty() {
            return Err(VolumeKeyParseError(s.to_string()));
        }

        let volume_id: u64 = id
            .parse()
            .map_err(|_| VolumeKeyParseError(s.to_string()))?;
        if volume_id == 0 {
            return Err(VolumeKeyParseError(s.to_string()));
        }

        Ok(Self {
            volume_id,
            label: label.to_string(),
        })
    }
}

/// Error returned when parsing an invalid volume key.
#[derive(Debug, Clone)]
pub struct VolumeKeyParseError(String);

impl Display for VolumeKeyParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid volume id '{}': expected '<id>-<label>' with a positive numeric id",
            self.0
        )
    }
}

impl std::error::Error for VolumeKeyParseError {}

// ============================================================================
// Label normalization
// ============================================================================

/// Normalize an orchestrator-chosen volume name into a legal Linode label.
///
/// Linode labels accept ASCII alphanumerics, `-` and `_`, up to 32
/// characters. Everything else is mapped to `-`.
pub fn normalize_label(name: &str) -> String {
    let mut label: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect();
    label.truncate(MAX_VOLUME_LABEL_LEN);
    label
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_key_parse() {
        let key: VolumeKey = "123-pvc-abc".parse().unwrap();
        assert_eq!(key.volume_id, 123);
        assert_eq!(key.label, "pvc-abc");
    }

    #[test]
    fn test_volume_key_parse_label_with_dashes() {
        // Only the first dash separates id from label
        let key: VolumeKey = "7-a-b-c".parse().unwrap();
        assert_eq!(key.volume_id, 7);
        assert_eq!(key.label, "a-b-c");
    }

    #[test]
    fn test_volume_key_parse_invalid() {
        assert!("".parse::<VolumeKey>().is_err());
        assert!("123".parse::<VolumeKey>().is_err());
        assert!("-label".parse::<VolumeKey>().is_err());
        assert!("123-".parse::<VolumeKey>().is_err());
        assert!("0-label".parse::<VolumeKey>().is_err());
        assert!("abc-label".parse::<VolumeKey>().is_err());
        assert!("-12-label".parse::<VolumeKey>().is_err());
    }

    #[test]
    fn test_volume_key_round_trip() {
        for (id, label) in [
            (1u64, "vol"),
            (42, "pvc-1234-5678"),
            (9999999, "x"),
            (3, "with_underscore"),
        ] {
            let key = VolumeKey::new(id, label);
            let parsed: VolumeKey = key.to_string().parse().unwrap();
            assert_eq!(parsed, key);
        }
    }

    #[test]
    fn test_normalize_label() {
        assert_eq!(normalize_label("pvc-123"), "pvc-123");
        assert_eq!(normalize_label("csi.example/vol"), "csi-example-vol");
        assert_eq!(normalize_label("UPPER_case-ok"), "UPPER_case-ok");
    }

    #[test]
    fn test_normalize_label_truncates() {
        let long = "a".repeat(64);
        assert_eq!(normalize_label(&long).len(), MAX_VOLUME_LABEL_LEN);
    }
}
