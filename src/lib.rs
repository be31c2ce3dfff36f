//! pspf-tools - Progressive Secure Package Format (PSPF) implementation
//!
//! This crate provides functionality for building, launching, and verifying
//! PSPF packages: self-contained, signed, single-file application bundles
//! that are simultaneously native executables and structured archives.

// Enforce strict code quality and reliability
#![deny(
    // Safety
    unsafe_code,
)]
#![warn(
    // Correctness
    missing_debug_implementations,
    unreachable_pub,

    // Rust 2018 idioms
    rust_2018_idioms,

    // Error handling best practices
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,

    // Code clarity and maintainability
    clippy::cognitive_complexity,
    clippy::type_complexity,

    // Best practices
    clippy::clone_on_ref_ptr,
    clippy::wildcard_imports,
    clippy::enum_glob_use,
    clippy::if_not_else,
    clippy::needless_continue,
    clippy::explicit_iter_loop
)]

pub mod api;
pub mod exceptions;
pub mod exit_codes;
pub mod logger;
pub mod pspf;
pub mod utils;
pub mod version;

// Re-export main API functions
pub use api::{BuildOptions, build_package, launch_package, verify_package};
pub use exceptions::{PspfError, Result};
pub use logger::Logbowl;

// Re-export format types for advanced usage
pub use pspf::footer::Footer;
pub use pspf::reader::Reader;
