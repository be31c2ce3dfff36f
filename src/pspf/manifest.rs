//! Manifest and config descriptors carried inside the metadata archive

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use super::constants::DEFAULT_ENTRY_POINT;
use super::crypto::sha256_hex;
use crate::exceptions::Result;

/// File name of the metadata archive as recorded in manifest entries
pub const METADATA_ARCHIVE_NAME: &str = "metadata.tgz";

/// Entry-point declaration file inside the metadata archive
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Manifest file inside the metadata archive
pub const MANIFESTS_FILE_NAME: &str = "manifests.json";

/// One metadata-archive entry with its digest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestFileEntry {
    pub path_in_archive: String,
    pub sha256: String,
    pub archive_container: String,
}

/// Contents of `manifests.json`. The resolver digest is the one entry the
/// launcher-side checks require.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifests {
    #[serde(rename = "uv_binary_sha256")]
    pub resolver_sha256: String,
    pub files: Vec<ManifestFileEntry>,
}

/// Contents of `config.json`: the payload entry point as
/// `<module>:<function>`. The function is an async coroutine driven to
/// completion by the interpreter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryPointConfig {
    pub entry_point: String,
}

impl Default for EntryPointConfig {
    fn default() -> Self {
        EntryPointConfig {
            entry_point: DEFAULT_ENTRY_POINT.to_string(),
        }
    }
}

/// config.json bytes used when the build supplies none
pub fn default_config_json() -> Vec<u8> {
    format!("{{\"entry_point\": \"{DEFAULT_ENTRY_POINT}\"}}\n").into_bytes()
}

/// Populate a metadata assembly directory with `config.json` and
/// `manifests.json`; the caller archives the directory afterwards.
pub fn prepare_metadata_dir(dir: &Path, config_json: &[u8], resolver_sha256: &str) -> Result<()> {
    let mut files = Vec::new();

    if !config_json.is_empty() {
        fs::write(dir.join(CONFIG_FILE_NAME), config_json)?;
        files.push(ManifestFileEntry {
            path_in_archive: CONFIG_FILE_NAME.to_string(),
            sha256: sha256_hex(config_json),
            archive_container: METADATA_ARCHIVE_NAME.to_string(),
        });
    }

    let manifests = Manifests {
        resolver_sha256: resolver_sha256.to_string(),
        files,
    };
    let manifest_json = serde_json::to_string_pretty(&manifests)?;
    fs::write(dir.join(MANIFESTS_FILE_NAME), manifest_json)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pspf::crypto::sha256_hex;
    use tempfile::TempDir;

    #[test]
    fn metadata_dir_holds_config_and_manifest() {
        let dir = TempDir::new().unwrap();
        let config = br#"{"entry_point": "acme.core:run"}"#;
        let resolver_digest = sha256_hex(b"resolver bytes");

        prepare_metadata_dir(dir.path(), config, &resolver_digest).unwrap();

        let config_read = std::fs::read(dir.path().join(CONFIG_FILE_NAME)).unwrap();
        assert_eq!(config_read, config);

        let manifest_raw = std::fs::read_to_string(dir.path().join(MANIFESTS_FILE_NAME)).unwrap();
        let manifests: Manifests = serde_json::from_str(&manifest_raw).unwrap();
        assert_eq!(manifests.resolver_sha256, resolver_digest);
        assert_eq!(manifests.files.len(), 1);
        assert_eq!(manifests.files[0].path_in_archive, "config.json");
        assert_eq!(manifests.files[0].sha256, sha256_hex(config));
        assert_eq!(manifests.files[0].archive_container, "metadata.tgz");

        // The wire field name is fixed by the format.
        assert!(manifest_raw.contains("\"uv_binary_sha256\""));
    }

    #[test]
    fn default_config_names_the_provider_entry_point() {
        let parsed: EntryPointConfig = serde_json::from_slice(&default_config_json()).unwrap();
        assert_eq!(parsed.entry_point, "pyvider.provider_core:setup_provider");
        assert_eq!(parsed.entry_point, EntryPointConfig::default().entry_point);
    }
}
