//! Cache staging
//!
//! Materializes the bundle's sections into the per-executable cache:
//! verify the signature with the embedded key, clear the cache, extract
//! the three archives, write the resolver binary, provision the isolated
//! interpreter environment, and install the payload wheels.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use super::{LOCK_FILE, METADATA_DIR, PAYLOAD_DIR, RUNTIME_DIR, VENV_DIR};
use crate::exceptions::{PspfError, Result};
use crate::logger::Logbowl;
use crate::pspf::archive::extract_archive;
use crate::pspf::crypto;
use crate::pspf::reader::Reader;
use crate::utils::exe_suffix;

/// Stage the working environment for `exe_path` into `work_dir`.
pub(crate) fn setup_environment(exe_path: &Path, work_dir: &Path, log: &Logbowl) -> Result<()> {
    let mut reader = Reader::new(exe_path)?;
    let footer = reader.read_footer()?;
    log.debug(
        "launcher",
        "read",
        "ok",
        "Footer read",
        &[
            ("version", format!("{:#06x}", footer.version)),
            ("launcher_size", footer.launcher_size().to_string()),
        ],
    );

    let launcher_bytes = reader.read_section(0, footer.launcher_size())?;
    let resolver_bytes = reader.read_section(footer.resolver_offset, footer.resolver_size)?;
    let runtime_bytes = reader.read_section(footer.runtime_offset, footer.runtime_size)?;
    let metadata_bytes = reader.read_section(footer.metadata_offset, footer.metadata_size)?;
    let payload_bytes = reader.read_section(footer.payload_offset, footer.payload_size)?;
    let signature = reader.read_signature()?;
    let public_key_pem = reader.read_public_key()?;

    // Verify before anything touches the filesystem. Format and crypto
    // failures here are fatal and non-retryable.
    let public_key = crypto::load_public_key(&public_key_pem)?;
    let mut content = Vec::with_capacity(
        launcher_bytes.len()
            + resolver_bytes.len()
            + runtime_bytes.len()
            + metadata_bytes.len()
            + payload_bytes.len(),
    );
    content.extend_from_slice(&launcher_bytes);
    content.extend_from_slice(&resolver_bytes);
    content.extend_from_slice(&runtime_bytes);
    content.extend_from_slice(&metadata_bytes);
    content.extend_from_slice(&payload_bytes);
    crypto::verify(&content, &signature, &public_key)?;
    drop(content);
    log.info(
        "launcher",
        "validate",
        "success",
        "Package signature verified",
        &[],
    );

    clear_work_dir(work_dir)?;

    extract_archive(&metadata_bytes, &work_dir.join(METADATA_DIR))?;
    let payload_extract_dir = work_dir.join(PAYLOAD_DIR);
    let payload_files = extract_archive(&payload_bytes, &payload_extract_dir)?;
    let runtime_dir = work_dir.join(RUNTIME_DIR);
    extract_archive(&runtime_bytes, &runtime_dir)?;
    log.debug(
        "launcher",
        "extract",
        "ok",
        "Archives extracted",
        &[("payload_files", payload_files.len().to_string())],
    );

    let resolver_path = work_dir.join(format!("resolver{}", exe_suffix()));
    fs::write(&resolver_path, &resolver_bytes)?;
    make_executable(&resolver_path)?;

    let python_path = find_executable(&runtime_dir, &["python3", "python"])?;
    log.debug(
        "launcher",
        "read",
        "ok",
        "Found embedded interpreter",
        &[("python", python_path.display().to_string())],
    );

    let venv_dir = work_dir.join(VENV_DIR);
    run_resolver(
        &resolver_path,
        &[
            OsString::from("venv"),
            venv_dir.clone().into_os_string(),
            OsString::from("--python"),
            python_path.into_os_string(),
        ],
        None,
        log,
    )?;

    // Some interpreter distributions leave a lib64 symlink in the venv
    // that duplicates search paths.
    let lib64_path = venv_dir.join("lib64");
    if let Ok(meta) = fs::symlink_metadata(&lib64_path) {
        if meta.file_type().is_symlink() {
            fs::remove_file(&lib64_path)?;
        }
    }

    let wheels: Vec<PathBuf> = payload_files
        .iter()
        .filter(|name| name.ends_with(".whl"))
        .map(|name| payload_extract_dir.join(name))
        .collect();
    if wheels.is_empty() {
        log.info("launcher", "install", "skip", "No wheels to install", &[]);
    } else {
        log.info(
            "launcher",
            "install",
            "progress",
            "Installing payload wheels",
            &[("count", wheels.len().to_string())],
        );
        let mut args = vec![OsString::from("pip"), OsString::from("install")];
        args.extend(wheels.into_iter().map(PathBuf::into_os_string));
        run_resolver(&resolver_path, &args, Some(("VIRTUAL_ENV", &venv_dir)), log)?;
    }

    Ok(())
}

/// Clear the cache directory before extraction, keeping the advisory lock
/// file alive so waiting launchers stay blocked.
fn clear_work_dir(work_dir: &Path) -> Result<()> {
    for entry in fs::read_dir(work_dir)? {
        let entry = entry?;
        if entry.file_name() == LOCK_FILE {
            continue;
        }
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

/// Recursive search for the first file named `names` with any execute bit
/// set.
fn find_executable(root: &Path, names: &[&str]) -> Result<PathBuf> {
    fn walk(dir: &Path, names: &[&str]) -> Result<Option<PathBuf>> {
        let mut entries: Vec<fs::DirEntry> =
            fs::read_dir(dir)?.collect::<std::io::Result<Vec<_>>>()?;
        entries.sort_by_key(fs::DirEntry::file_name);

        for entry in &entries {
            let path = entry.path();
            if path.is_file() {
                let matches_name = entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| names.contains(&name));
                if matches_name && has_execute_bit(&path) {
                    return Ok(Some(path));
                }
            }
        }
        for entry in &entries {
            let path = entry.path();
            if path.is_dir() && !path.is_symlink() {
                if let Some(found) = walk(&path, names)? {
                    return Ok(Some(found));
                }
            }
        }
        Ok(None)
    }

    walk(root, names)?.ok_or_else(|| {
        PspfError::ExecutableNotFound(format!(
            "'{}' not found in {}",
            names.join("' or '"),
            root.display()
        ))
    })
}

#[cfg(unix)]
fn has_execute_bit(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|meta| meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn has_execute_bit(_path: &Path) -> bool {
    true
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}

/// Run the embedded resolver and surface its combined output on failure.
fn run_resolver(
    resolver: &Path,
    args: &[OsString],
    env: Option<(&str, &Path)>,
    log: &Logbowl,
) -> Result<()> {
    let mut cmd = Command::new(resolver);
    cmd.args(args);
    if let Some((key, value)) = env {
        cmd.env(key, value);
    }

    log.debug(
        "launcher",
        "execute",
        "progress",
        "Running resolver",
        &[("args", format!("{args:?}"))],
    );

    let output = cmd.output()?;
    if !output.status.success() {
        return Err(PspfError::Generic(format!(
            "resolver invocation failed (status {}):\n{}{}",
            output.status,
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        )));
    }
    Ok(())
}
