use std::env;

fn main() {
    // Version comes from the environment when the release pipeline sets it,
    // otherwise from the crate manifest.
    let version = env::var("PSPF_TOOLS_VERSION")
        .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string());

    println!("cargo:rustc-env=PSPF_TOOLS_VERSION={}", version);
    println!("cargo:rerun-if-env-changed=PSPF_TOOLS_VERSION");
}
