//! PSPF packager binary
//!
//! CLI for building and managing Progressive Secure Package Format files.

use clap::{Parser, Subcommand};
use pspf_tools::exit_codes::{EXIT_FAILURE, EXIT_PANIC, EXIT_SUCCESS};
use pspf_tools::logger::Logbowl;
use pspf_tools::pspf::{cli, crypto};
use pspf_tools::{api, version, BuildOptions};
use std::path::{Path, PathBuf};
use std::{fs, panic, process};

#[derive(Parser, Debug)]
#[command(
    name = "pspf-packager",
    version = version::VERSION,
    about = "Build and manage Progressive Secure Package Format (PSPF) files"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a new PSS RSA key pair for package integrity signing
    Keygen {
        /// Directory to save the key pair
        #[arg(short = 'd', long, default_value = ".")]
        out_dir: PathBuf,

        /// Filename for the private key
        #[arg(long, default_value = "provider-private.key")]
        private_key_file: String,

        /// Filename for the public key
        #[arg(long, default_value = "provider-public.key")]
        public_key_file: String,
    },

    /// Build a self-contained PSPF package
    Build {
        /// Path to the pre-compiled launcher binary
        #[arg(long)]
        launcher_bin: PathBuf,

        /// Path to the resolver binary to embed
        #[arg(long)]
        resolver_bin: PathBuf,

        /// Path to the pre-built interpreter runtime tarball
        #[arg(long)]
        runtime_archive: PathBuf,

        /// Directory containing wheels and other payload assets
        #[arg(long)]
        payload_dir: Option<PathBuf>,

        /// Path to a custom config.json file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Path to the private key for signing
        #[arg(long)]
        package_key: PathBuf,

        /// Path to the public key to embed in the package
        #[arg(long)]
        public_key: PathBuf,

        /// Path for the final output PSPF provider binary
        #[arg(short, long)]
        out: PathBuf,

        /// Glob patterns to exclude from archives
        #[arg(long)]
        exclude: Vec<String>,
    },

    /// Verify a package: footer, PSS signature, and manifest checksums
    Verify {
        /// Package file to verify
        file: PathBuf,

        /// Path to the public key file for signature verification
        #[arg(long)]
        public_key: PathBuf,
    },

    /// Display information about a package
    Info {
        /// Package file to inspect
        file: PathBuf,
    },

    /// Print the version number of pspf-packager
    Version,
}

fn main() {
    panic::set_hook(Box::new(|panic_info| {
        eprintln!("PANIC: {panic_info}");
        process::exit(EXIT_PANIC);
    }));

    match panic::catch_unwind(run) {
        Ok(exit_code) => process::exit(exit_code),
        Err(_) => {
            eprintln!("Fatal: Unhandled panic in packager");
            process::exit(EXIT_PANIC);
        }
    }
}

fn run() -> i32 {
    let cli = Cli::parse();
    let log = Logbowl::create("pspf-packager");

    match cli.command {
        Command::Keygen {
            out_dir,
            private_key_file,
            public_key_file,
        } => keygen(&log, &out_dir, &private_key_file, &public_key_file),
        Command::Build {
            launcher_bin,
            resolver_bin,
            runtime_archive,
            payload_dir,
            config,
            package_key,
            public_key,
            out,
            exclude,
        } => {
            let options = BuildOptions {
                launcher_bin,
                resolver_bin,
                runtime_archive,
                payload_dir,
                config_file: config,
                private_key: package_key,
                public_key,
                output: out,
                exclude,
            };
            match api::build_package(&options, &log) {
                Ok(()) => EXIT_SUCCESS,
                Err(e) => {
                    log.error(
                        "builder",
                        "build",
                        "error",
                        "Failed to build package",
                        &[("error", e.to_string())],
                    );
                    EXIT_FAILURE
                }
            }
        }
        Command::Verify { file, public_key } => {
            match api::verify_package(&file, &public_key, &log) {
                Ok(()) => EXIT_SUCCESS,
                Err(e) => {
                    log.error(
                        "verify",
                        "validate",
                        "error",
                        "Package verification failed",
                        &[("error", e.to_string())],
                    );
                    EXIT_FAILURE
                }
            }
        }
        Command::Info { file } => match cli::package_info(&file) {
            Ok(()) => EXIT_SUCCESS,
            Err(e) => {
                log.error(
                    "verify",
                    "read",
                    "error",
                    "Footer parsing/validation failed",
                    &[("error", e.to_string())],
                );
                EXIT_FAILURE
            }
        },
        Command::Version => {
            log.info(
                "system",
                "version",
                "info",
                "pspf-packager version information",
                &[("version", version::full_version())],
            );
            println!("pspf-packager version {}", version::full_version());
            EXIT_SUCCESS
        }
    }
}

fn keygen(log: &Logbowl, out_dir: &Path, private_name: &str, public_name: &str) -> i32 {
    let private_path = out_dir.join(private_name);
    let public_path = out_dir.join(public_name);

    if private_path.exists() {
        log.warn(
            "keymgmt",
            "generate",
            "skip",
            "Private key already exists, skipping generation",
            &[("path", private_path.display().to_string())],
        );
        return EXIT_FAILURE;
    }
    if public_path.exists() {
        log.warn(
            "keymgmt",
            "generate",
            "skip",
            "Public key already exists, skipping generation",
            &[("path", public_path.display().to_string())],
        );
        return EXIT_FAILURE;
    }

    log.info(
        "keymgmt",
        "generate",
        "progress",
        "Generating new 4096-bit RSA key pair",
        &[],
    );
    let (private_pem, public_pem) = match crypto::generate_keypair_pem() {
        Ok(pair) => pair,
        Err(e) => {
            log.error(
                "keymgmt",
                "generate",
                "error",
                "Failed to generate RSA key pair",
                &[("error", e.to_string())],
            );
            return EXIT_FAILURE;
        }
    };

    if let Err(e) = write_key(&private_path, private_pem.as_bytes(), 0o600) {
        log.error(
            "keymgmt",
            "write",
            "error",
            "Failed to write private key",
            &[
                ("path", private_path.display().to_string()),
                ("error", e.to_string()),
            ],
        );
        return EXIT_FAILURE;
    }
    log.info(
        "keymgmt",
        "write",
        "success",
        "Private key saved",
        &[("path", private_path.display().to_string())],
    );

    if let Err(e) = write_key(&public_path, public_pem.as_bytes(), 0o644) {
        log.error(
            "keymgmt",
            "write",
            "error",
            "Failed to write public key",
            &[
                ("path", public_path.display().to_string()),
                ("error", e.to_string()),
            ],
        );
        return EXIT_FAILURE;
    }
    log.info(
        "keymgmt",
        "write",
        "success",
        "Public key saved",
        &[("path", public_path.display().to_string())],
    );

    EXIT_SUCCESS
}

fn write_key(path: &Path, pem: &[u8], mode: u32) -> std::io::Result<()> {
    fs::write(path, pem)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    }
    #[cfg(not(unix))]
    let _ = mode;
    Ok(())
}
