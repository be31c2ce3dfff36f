//! PSPF package builder
//!
//! Assembles input blobs into a signed single-file bundle: sections are
//! written in canonical order with offsets taken from the output cursor,
//! the signature covers the first five sections, and the sealed footer
//! plus trailing marker close the file.

use std::fs;
use std::io::Write;
use std::path::Path;

use super::archive::create_archive;
use super::constants::MAGIC_EOF;
use super::crypto;
use super::footer::Footer;
use super::manifest::{default_config_json, prepare_metadata_dir};
use crate::api::BuildOptions;
use crate::exceptions::{PspfError, Result};
use crate::logger::Logbowl;

/// Build a PSPF bundle from the given inputs.
pub fn build(options: &BuildOptions, log: &Logbowl) -> Result<()> {
    log.info(
        "builder",
        "start",
        "progress",
        "Building PSPF package",
        &[("output", options.output.display().to_string())],
    );

    validate_inputs(options)?;

    // Phase 1: read raw inputs
    let launcher_bytes = read_input(&options.launcher_bin, "launcher binary")?;
    let resolver_bytes = read_input(&options.resolver_bin, "resolver binary")?;
    let runtime_bytes = read_input(&options.runtime_archive, "runtime archive")?;
    log.debug(
        "builder",
        "read",
        "ok",
        "Loaded raw inputs",
        &[
            ("launcher_bytes", launcher_bytes.len().to_string()),
            ("resolver_bytes", resolver_bytes.len().to_string()),
            ("runtime_bytes", runtime_bytes.len().to_string()),
        ],
    );

    // Phase 2: archive the payload directory
    let payload_bytes = match &options.payload_dir {
        Some(dir) => create_archive(dir, &options.exclude)?,
        None => {
            let empty = tempfile::TempDir::new()?;
            create_archive(empty.path(), &options.exclude)?
        }
    };
    log.debug(
        "builder",
        "pack",
        "ok",
        "Archived payload",
        &[("payload_bytes", payload_bytes.len().to_string())],
    );

    // Phase 3: assemble and archive the metadata directory
    let config_bytes = match &options.config_file {
        Some(path) => read_input(path, "config file")?,
        None => default_config_json(),
    };
    let metadata_dir = tempfile::TempDir::new()?;
    prepare_metadata_dir(
        metadata_dir.path(),
        &config_bytes,
        &crypto::sha256_hex(&resolver_bytes),
    )?;
    let metadata_bytes = create_archive(metadata_dir.path(), &options.exclude)?;
    log.debug(
        "builder",
        "pack",
        "ok",
        "Archived metadata",
        &[("metadata_bytes", metadata_bytes.len().to_string())],
    );

    // Phase 4: sign the canonical concatenation
    let private_pem = fs::read_to_string(&options.private_key)?;
    let private_key = crypto::load_private_key(&private_pem)?;

    let mut content_to_sign = Vec::new();
    content_to_sign.extend_from_slice(&launcher_bytes);
    content_to_sign.extend_from_slice(&resolver_bytes);
    content_to_sign.extend_from_slice(&runtime_bytes);
    content_to_sign.extend_from_slice(&metadata_bytes);
    content_to_sign.extend_from_slice(&payload_bytes);
    let signature = crypto::sign(&content_to_sign, &private_key)?;
    log.info(
        "signing",
        "generate",
        "success",
        "Signed package content",
        &[("signature_bytes", signature.len().to_string())],
    );

    // The public key is embedded verbatim; parse it first so a swapped or
    // corrupt file fails the build instead of producing a dead bundle.
    let public_key_pem = fs::read(&options.public_key)?;
    crypto::load_public_key(&public_key_pem)?;

    // Phase 5: write sections, footer, and trailing marker
    assemble(
        &options.output,
        &launcher_bytes,
        &resolver_bytes,
        &runtime_bytes,
        &metadata_bytes,
        &payload_bytes,
        &signature,
        &public_key_pem,
    )?;

    log.info(
        "builder",
        "finish",
        "success",
        "Provider package built successfully",
        &[("output", options.output.display().to_string())],
    );
    Ok(())
}

/// Write a bundle from raw section bytes.
///
/// Sections land in canonical order, byte-contiguous, with offsets taken
/// from the running cursor. Returns the sealed footer.
#[allow(clippy::too_many_arguments)]
pub fn assemble(
    out_path: &Path,
    launcher: &[u8],
    resolver: &[u8],
    runtime: &[u8],
    metadata: &[u8],
    payload: &[u8],
    signature: &[u8],
    public_key: &[u8],
) -> Result<Footer> {
    if launcher.is_empty() {
        return Err(PspfError::InvalidArgs(
            "launcher section must not be empty".to_string(),
        ));
    }

    let mut out = open_output(out_path)?;
    let mut footer = Footer::new();
    let mut cursor: u64 = 0;

    out.write_all(launcher)?;
    cursor += launcher.len() as u64;

    footer.resolver_offset = cursor;
    footer.resolver_size = resolver.len() as u64;
    out.write_all(resolver)?;
    cursor += resolver.len() as u64;

    footer.runtime_offset = cursor;
    footer.runtime_size = runtime.len() as u64;
    out.write_all(runtime)?;
    cursor += runtime.len() as u64;

    footer.metadata_offset = cursor;
    footer.metadata_size = metadata.len() as u64;
    out.write_all(metadata)?;
    cursor += metadata.len() as u64;

    footer.payload_offset = cursor;
    footer.payload_size = payload.len() as u64;
    out.write_all(payload)?;
    cursor += payload.len() as u64;

    footer.signature_offset = cursor;
    footer.signature_size = signature.len() as u64;
    out.write_all(signature)?;
    cursor += signature.len() as u64;

    footer.public_key_offset = cursor;
    footer.public_key_size = public_key.len() as u64;
    out.write_all(public_key)?;

    footer.seal();
    out.write_all(&footer.encode())?;
    out.write_all(MAGIC_EOF)?;

    Ok(footer)
}

fn validate_inputs(options: &BuildOptions) -> Result<()> {
    let required: [(&Path, &str); 5] = [
        (options.launcher_bin.as_path(), "launcher binary"),
        (options.resolver_bin.as_path(), "resolver binary"),
        (options.runtime_archive.as_path(), "runtime archive"),
        (options.private_key.as_path(), "private key"),
        (options.public_key.as_path(), "public key"),
    ];
    for (path, what) in required {
        if !path.exists() {
            return Err(PspfError::InvalidArgs(format!(
                "{what} not found: {}",
                path.display()
            )));
        }
    }
    if let Some(dir) = &options.payload_dir {
        if !dir.is_dir() {
            return Err(PspfError::InvalidArgs(format!(
                "payload dir not found: {}",
                dir.display()
            )));
        }
    }
    if let Some(config) = &options.config_file {
        if !config.exists() {
            return Err(PspfError::InvalidArgs(format!(
                "config file not found: {}",
                config.display()
            )));
        }
    }
    Ok(())
}

fn read_input(path: &Path, what: &str) -> Result<Vec<u8>> {
    fs::read(path)
        .map_err(|e| PspfError::InvalidArgs(format!("failed to read {what} '{}': {e}", path.display())))
}

/// Open the output for a single-pass write, world-executable on creation
fn open_output(path: &Path) -> Result<fs::File> {
    let mut opts = fs::OpenOptions::new();
    opts.create(true).write(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(0o755);
    }
    Ok(opts.open(path)?)
}
