//! Payload dispatcher
//!
//! Reads the staged entry-point declaration and hands execution to the
//! venv interpreter with a one-line bootstrap that drives the entry-point
//! coroutine to completion. Stdout and stderr are inherited; the child's
//! exit code propagates.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use super::{METADATA_DIR, PAYLOAD_DIR, VENV_DIR};
use crate::exceptions::{PspfError, Result};
use crate::logger::Logbowl;
use crate::pspf::manifest::{EntryPointConfig, CONFIG_FILE_NAME};

/// Execute the staged payload; returns the child's exit code.
pub(crate) fn execute_payload(work_dir: &Path, log: &Logbowl) -> Result<i32> {
    let config_path = work_dir.join(METADATA_DIR).join(CONFIG_FILE_NAME);
    let config_bytes = fs::read(&config_path)
        .map_err(|_| PspfError::ConfigMissing(config_path.display().to_string()))?;
    let config: EntryPointConfig = serde_json::from_slice(&config_bytes)
        .map_err(|e| PspfError::ConfigMalformed(e.to_string()))?;
    if !config.entry_point.contains(':') {
        return Err(PspfError::ConfigMalformed(format!(
            "entry_point '{}' is not '<module>:<function>'",
            config.entry_point
        )));
    }

    let python = venv_python(work_dir);
    if !python.exists() {
        return Err(PspfError::ExecutableNotFound(format!(
            "venv interpreter missing at {}",
            python.display()
        )));
    }

    let payload_dir = work_dir.join(PAYLOAD_DIR);
    let python_path = prepend_python_path(&payload_dir);

    log.info(
        "launcher",
        "execute",
        "progress",
        "Dispatching payload entry point",
        &[("entry_point", config.entry_point.clone())],
    );

    let status = Command::new(&python)
        .arg("-c")
        .arg(bootstrap_command(&config.entry_point))
        .env("PYTHONPATH", python_path)
        .status()?;

    // A child killed by a signal has no exit code; report failure.
    Ok(status.code().unwrap_or(1))
}

/// The interpreter bootstrap passed via `-c`: import the module, resolve
/// the function, and drive the coroutine to completion.
pub(crate) fn bootstrap_command(entry_point: &str) -> String {
    format!(
        "import sys; import asyncio; import importlib; \
         mod_name, func_name = '{entry_point}'.split(':', 1); \
         mod = importlib.import_module(mod_name); \
         sys.exit(asyncio.run(getattr(mod, func_name)()))"
    )
}

fn venv_python(work_dir: &Path) -> PathBuf {
    if cfg!(windows) {
        work_dir.join(VENV_DIR).join("Scripts").join("python.exe")
    } else {
        work_dir.join(VENV_DIR).join("bin").join("python")
    }
}

/// `PYTHONPATH` with the payload directory prepended to any caller value
fn prepend_python_path(payload_dir: &Path) -> String {
    let separator = if cfg!(windows) { ';' } else { ':' };
    match env::var("PYTHONPATH") {
        Ok(existing) if !existing.is_empty() => {
            format!("{}{}{}", payload_dir.display(), separator, existing)
        }
        _ => payload_dir.display().to_string(),
    }
}
