//! PSPF launcher binary
//!
//! With no arguments the launcher runs the full dispatch flow against its
//! own executable. Setting `PSPF_INTERACTIVE=true` (or `1`) exposes the
//! inspection sub-commands instead.

use pspf_tools::exit_codes::{EXIT_FAILURE, EXIT_PANIC, EXIT_SUCCESS};
use pspf_tools::logger::Logbowl;
use pspf_tools::pspf::cli;
use pspf_tools::{launch_package, utils};
use std::path::Path;
use std::{env, panic, process};

fn main() {
    panic::set_hook(Box::new(|panic_info| {
        eprintln!("PANIC: {panic_info}");
        process::exit(EXIT_PANIC);
    }));

    match panic::catch_unwind(run) {
        Ok(exit_code) => process::exit(exit_code),
        Err(_) => {
            eprintln!("Fatal: Unhandled panic in launcher");
            process::exit(EXIT_PANIC);
        }
    }
}

fn run() -> i32 {
    let log = Logbowl::create("pspf-launcher");

    let exe_path = match env::current_exe() {
        Ok(path) => path,
        Err(e) => {
            log.error(
                "launcher",
                "init",
                "error",
                "Could not get executable path",
                &[("error", e.to_string())],
            );
            return EXIT_FAILURE;
        }
    };

    if utils::is_env_true("PSPF_INTERACTIVE") {
        let args: Vec<String> = env::args().collect();
        return match args.get(1).map(String::as_str) {
            Some("info") => cli::show_info(&exe_path),
            Some("run") => run_provider(&exe_path, &log),
            Some("help") | Some("--help") | None => {
                print_usage();
                EXIT_SUCCESS
            }
            Some(other) => {
                eprintln!("Error: Unknown command '{other}'");
                eprintln!("Available commands: info, run, help");
                EXIT_FAILURE
            }
        };
    }

    run_provider(&exe_path, &log)
}

fn run_provider(exe_path: &Path, log: &Logbowl) -> i32 {
    match launch_package(exe_path, log) {
        Ok(exit_code) => exit_code,
        Err(e) => {
            log.error(
                "launcher",
                "init",
                "error",
                "Launch failed",
                &[("error", e.to_string())],
            );
            EXIT_FAILURE
        }
    }
}

fn print_usage() {
    println!("Pyvider Interactive Launcher");
    println!();
    println!("Available commands:");
    println!("  info    Display information about the PSPF package");
    println!("  run     Run the provider (default behavior)");
    println!("  help    Show this help message");
    println!();
    println!("Usage:");
    println!("  PSPF_INTERACTIVE=true ./provider <command>");
}
