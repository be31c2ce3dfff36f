//! High-level API for pspf-tools operations

use std::path::{Path, PathBuf};

use crate::exceptions::Result;
use crate::logger::Logbowl;
use crate::pspf;

/// Inputs for building a package
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Pre-compiled bootstrap launcher binary
    pub launcher_bin: PathBuf,
    /// Resolver helper binary to embed
    pub resolver_bin: PathBuf,
    /// Pre-built tarball of the interpreter distribution
    pub runtime_archive: PathBuf,
    /// Directory of installable artifacts and ancillary files
    pub payload_dir: Option<PathBuf>,
    /// Custom config.json; a default entry point is used when absent
    pub config_file: Option<PathBuf>,
    /// Private signing key (PKCS#8 or PKCS#1 PEM)
    pub private_key: PathBuf,
    /// Public key to embed (PKIX PEM)
    pub public_key: PathBuf,
    /// Output path for the final bundle
    pub output: PathBuf,
    /// Glob patterns excluded from archives
    pub exclude: Vec<String>,
}

/// Build a PSPF bundle from the given inputs
pub fn build_package(options: &BuildOptions, log: &Logbowl) -> Result<()> {
    pspf::builder::build(options, log)
}

/// Verify a bundle against a public key file
pub fn verify_package(package_path: &Path, public_key_path: &Path, log: &Logbowl) -> Result<()> {
    let public_key_pem = std::fs::read(public_key_path)?;
    pspf::verifier::verify(package_path, &public_key_pem, log)
}

/// Run the launcher flow for a bundle (normally the current executable).
/// Returns the payload's exit code.
pub fn launch_package(package_path: &Path, log: &Logbowl) -> Result<i32> {
    pspf::launcher::launch(package_path, log)
}
