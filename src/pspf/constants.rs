// Core format constants that never change.

/// Current PSPF format version
pub const PSPF_VERSION: u16 = 0x0003;

/// Serialized footer size in bytes
pub const FOOTER_SIZE: usize = 108;

/// ASCII marker written after the footer, at the very end of the file.
/// Informational for external inspection; the footer anchor is
/// `file_size - MAGIC_EOF.len() - FOOTER_SIZE`.
pub const MAGIC_EOF: &[u8; 8] = b"!PSPF\x00\x00\x00";

/// Footer magic constant, "0PSP" little-endian
pub const INTERNAL_FOOTER_MAGIC: u32 = 0x3050_5350;

/// Footer plus trailing marker
pub const TRAILER_SIZE: u64 = (FOOTER_SIZE + MAGIC_EOF.len()) as u64;

/// Per-section sanity limit guarding allocations against an adversarial
/// footer (2 GiB)
pub const MAX_SECTION_SIZE: u64 = 2 * 1024 * 1024 * 1024;

/// Entry point used when the build supplies no config.json
pub const DEFAULT_ENTRY_POINT: &str = "pyvider.provider_core:setup_provider";

/// Product directory under the user cache dir
pub const CACHE_PRODUCT_DIR: &str = "pyvider";
