//! CLI presentation for package inspection

use std::path::Path;

use super::footer::Footer;
use super::reader::Reader;
use crate::exceptions::Result;

/// Print footer fields for the interactive launcher `info` command.
///
/// Reports problems on stdout and still exits cleanly; inspection of a
/// broken file is not itself a failure here.
pub fn show_info(exe_path: &Path) -> i32 {
    println!("PSPF Package Information for: {}", exe_path.display());

    let mut reader = match Reader::new(exe_path) {
        Ok(reader) => reader,
        Err(e) => {
            println!("Error opening file: {e}");
            return 0;
        }
    };
    match reader.read_footer() {
        Ok(footer) => print_footer(&footer),
        Err(e) => println!("Error reading footer: {e}"),
    }
    0
}

/// Print footer fields for the packager `info` subcommand, propagating
/// errors to the caller.
pub fn package_info(path: &Path) -> Result<()> {
    let mut reader = Reader::new(path)?;
    let footer = reader.read_footer()?;

    println!("PSPF Package Information for: {}", path.display());
    print_footer(&footer);
    Ok(())
}

fn print_footer(footer: &Footer) {
    println!("  PSPF Version: {:#06x}", footer.version);
    println!("  Resolver Binary Size: {} bytes", footer.resolver_size);
    println!("  Runtime Archive Size: {} bytes", footer.runtime_size);
    println!("  Metadata Size: {} bytes", footer.metadata_size);
    println!("  Payload Size: {} bytes", footer.payload_size);
}
