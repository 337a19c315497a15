//! Artifact manifests and object keys

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Object key of the manifest-of-manifests
pub const LATEST_MANIFEST_KEY: &str = "latest-manifest.json";

/// Points at the current artifact and its manifest
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LatestManifest {
    #[serde(deserialize_with = "version_string")]
    pub latest_version: String,
    pub artifact_file: String,
    pub manifest_file: String,
}

/// Version-specific artifact descriptor
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ArtifactManifest {
    #[serde(default)]
    pub sha256_plaintext: Option<String>,
}

impl ArtifactManifest {
    /// Expected digest of the decrypted archive; `None` skips verification
    pub fn expected_digest(&self) -> Option<&str> {
        self.sha256_plaintext
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Where a given artifact version lives in the bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLocation {
    pub version: String,
    pub artifact_key: String,
    pub manifest_key: String,
}

impl ArtifactLocation {
    /// Keys derived from an explicit version
    pub fn for_version(version: &str) -> Self {
        Self {
            version: version.to_string(),
            artifact_key: format!("rag-index-v{}.tar.gz.enc", version),
            manifest_key: format!("rag-index-v{}-manifest.json", version),
        }
    }

    pub fn from_latest(latest: LatestManifest) -> Self {
        Self {
            version: latest.latest_version,
            artifact_key: latest.artifact_file,
            manifest_key: latest.manifest_file,
        }
    }

    /// Scratch file name for the downloaded ciphertext
    pub fn encrypted_file_name(&self) -> String {
        base_name(&self.artifact_key).to_string()
    }

    /// Scratch file name for the decrypted archive
    pub fn decrypted_file_name(&self) -> String {
        let name = base_name(&self.artifact_key);
        match name.strip_suffix(".enc") {
            Some(stripped) if !stripped.is_empty() => stripped.to_string(),
            _ => format!("{}.dec", name),
        }
    }
}

fn base_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// Versions are published as strings but older manifests used numbers
fn version_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "latest_version must be a string or number, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_for_explicit_version() {
        let location = ArtifactLocation::for_version("20240601.1");
        assert_eq!(location.artifact_key, "rag-index-v20240601.1.tar.gz.enc");
        assert_eq!(location.manifest_key, "rag-index-v20240601.1-manifest.json");
        assert_eq!(location.decrypted_file_name(), "rag-index-v20240601.1.tar.gz");
    }

    #[test]
    fn test_latest_manifest_parses_numeric_version() {
        let latest: LatestManifest = serde_json::from_str(
            r#"{"latest_version": 42, "artifact_file": "v42/index.tar.gz.enc", "manifest_file": "v42/manifest.json"}"#,
        )
        .unwrap();
        let location = ArtifactLocation::from_latest(latest);

        assert_eq!(location.version, "42");
        assert_eq!(location.encrypted_file_name(), "index.tar.gz.enc");
        assert_eq!(location.decrypted_file_name(), "index.tar.gz");
    }

    #[test]
    fn test_blank_digest_skips_verification() {
        let blank: ArtifactManifest =
            serde_json::from_str(r#"{"sha256_plaintext": "  "}"#).unwrap();
        assert_eq!(blank.expected_digest(), None);

        let absent: ArtifactManifest = serde_json::from_str(r#"{"version": "1"}"#).unwrap();
        assert_eq!(absent.expected_digest(), None);

        let present: ArtifactManifest =
            serde_json::from_str(r#"{"sha256_plaintext": "abc123"}"#).unwrap();
        assert_eq!(present.expected_digest(), Some("abc123"));
    }

    #[test]
    fn test_unencrypted_key_gets_distinct_name() {
        let location = ArtifactLocation {
            version: "1".to_string(),
            artifact_key: "index.tar.gz".to_string(),
            manifest_key: "m.json".to_string(),
        };
        assert_ne!(location.decrypted_file_name(), location.encrypted_file_name());
    }
}
