//! Full package verification
//!
//! Runs the launcher's footer and signature checks without dispatching,
//! then cross-checks the embedded resolver binary against the digest
//! recorded in `manifests.json`.

use std::path::Path;

use super::archive::extract_archive;
use super::crypto;
use super::manifest::{Manifests, MANIFESTS_FILE_NAME};
use super::reader::Reader;
use crate::exceptions::{PspfError, Result};
use crate::logger::Logbowl;

/// Verify a bundle against a caller-supplied public key.
pub fn verify(package_path: &Path, public_key_pem: &[u8], log: &Logbowl) -> Result<()> {
    log.info(
        "verify",
        "start",
        "progress",
        "Verifying PSPF package",
        &[("path", package_path.display().to_string())],
    );

    let mut reader = Reader::new(package_path)?;
    let footer = reader.read_footer()?;
    log.info(
        "verify",
        "validate",
        "success",
        "Footer parsed and validated",
        &[("version", format!("{:#06x}", footer.version))],
    );

    let public_key = crypto::load_public_key(public_key_pem)?;
    let signed_content = reader.read_signed_content()?;
    let signature = reader.read_signature()?;
    crypto::verify(&signed_content, &signature, &public_key)?;
    log.info(
        "verify",
        "validate",
        "success",
        "Package PSS signature is valid",
        &[],
    );

    verify_manifest(&mut reader, log)?;

    log.info(
        "verify",
        "finish",
        "success",
        "PSPF package verification successful",
        &[],
    );
    Ok(())
}

/// Extract the metadata archive to a scratch directory and compare the
/// recorded resolver digest with the embedded resolver section.
fn verify_manifest(reader: &mut Reader, log: &Logbowl) -> Result<()> {
    let footer = reader.read_footer()?;
    let metadata_bytes = reader.read_section(footer.metadata_offset, footer.metadata_size)?;
    let resolver_bytes = reader.read_section(footer.resolver_offset, footer.resolver_size)?;

    let scratch = tempfile::TempDir::new()?;
    extract_archive(&metadata_bytes, scratch.path())?;

    let manifest_path = scratch.path().join(MANIFESTS_FILE_NAME);
    let manifest_raw = std::fs::read_to_string(&manifest_path).map_err(|e| {
        PspfError::Generic(format!(
            "failed to read {MANIFESTS_FILE_NAME} from metadata archive: {e}"
        ))
    })?;
    let manifests: Manifests = serde_json::from_str(&manifest_raw)?;

    let actual = crypto::sha256_hex(&resolver_bytes);
    if manifests.resolver_sha256 != actual {
        log.error(
            "verify",
            "validate",
            "failure",
            "Embedded resolver binary checksum mismatch against manifest",
            &[
                ("expected", manifests.resolver_sha256.clone()),
                ("actual", actual.clone()),
            ],
        );
        return Err(PspfError::Generic(format!(
            "resolver binary checksum mismatch: manifest {}, actual {}",
            manifests.resolver_sha256, actual
        )));
    }

    log.info(
        "verify",
        "validate",
        "success",
        "Embedded resolver binary checksum matches manifest",
        &[],
    );
    Ok(())
}
