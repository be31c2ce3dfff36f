//! Bundle reader
//!
//! Locates the footer relative to the end of the file and serves bounded
//! positional section reads. Used by the launcher (reading its own
//! executable), the verifier, and the info commands.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use super::constants::{FOOTER_SIZE, MAX_SECTION_SIZE, PSPF_VERSION, TRAILER_SIZE};
use super::footer::Footer;
use crate::exceptions::{PspfError, Result};

/// Reader over a PSPF bundle file
#[derive(Debug)]
pub struct Reader {
    file: File,
    file_size: u64,
    path: PathBuf,
    footer: Option<Footer>,
}

impl Reader {
    /// Open a bundle read-only
    pub fn new(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();

        Ok(Reader {
            file,
            file_size,
            path: path.to_path_buf(),
            footer: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Read and validate the footer: anchor at `size - 8 - 108`, decode,
    /// check magic then CRC, reject versions newer than this build.
    pub fn read_footer(&mut self) -> Result<Footer> {
        if let Some(footer) = self.footer {
            return Ok(footer);
        }

        if self.file_size < TRAILER_SIZE {
            return Err(PspfError::FileTooSmall {
                size: self.file_size,
                need: TRAILER_SIZE,
            });
        }

        let mut buf = [0u8; FOOTER_SIZE];
        self.file
            .seek(SeekFrom::Start(self.file_size - TRAILER_SIZE))?;
        self.file.read_exact(&mut buf)?;

        let footer = Footer::decode(&buf)?;
        footer.verify()?;
        if footer.version > PSPF_VERSION {
            return Err(PspfError::UnsupportedVersion(footer.version));
        }

        self.footer = Some(footer);
        Ok(footer)
    }

    /// Read one section into a fresh buffer, bounded by the 2 GiB sanity
    /// limit. Zero-size sections read as empty.
    pub fn read_section(&mut self, offset: u64, size: u64) -> Result<Vec<u8>> {
        if size > MAX_SECTION_SIZE {
            return Err(PspfError::SectionTooLarge {
                size,
                limit: MAX_SECTION_SIZE,
            });
        }
        if size == 0 {
            return Ok(Vec::new());
        }

        let mut data = vec![0u8; size as usize];
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut data).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                PspfError::ReadShort { offset, want: size }
            } else {
                PspfError::IoError(e)
            }
        })?;
        Ok(data)
    }

    /// The signed region in canonical order:
    /// launcher, resolver, runtime, metadata, payload.
    pub fn read_signed_content(&mut self) -> Result<Vec<u8>> {
        let footer = self.read_footer()?;
        let mut content = Vec::new();
        for (offset, size) in footer.signed_sections() {
            content.extend_from_slice(&self.read_section(offset, size)?);
        }
        Ok(content)
    }

    pub fn read_signature(&mut self) -> Result<Vec<u8>> {
        let footer = self.read_footer()?;
        self.read_section(footer.signature_offset, footer.signature_size)
    }

    pub fn read_public_key(&mut self) -> Result<Vec<u8>> {
        let footer = self.read_footer()?;
        self.read_section(footer.public_key_offset, footer.public_key_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pspf::constants::MAGIC_EOF;
    use std::io::Write;
    use tempfile::TempDir;

    /// Assemble a minimal bundle from literal section bytes, mirroring the
    /// canonical write order.
    fn write_bundle(path: &Path, sections: [&[u8]; 7]) {
        let [launcher, resolver, runtime, metadata, payload, signature, public_key] = sections;

        let mut footer = Footer::new();
        let mut cursor = launcher.len() as u64;
        footer.resolver_offset = cursor;
        footer.resolver_size = resolver.len() as u64;
        cursor += resolver.len() as u64;
        footer.runtime_offset = cursor;
        footer.runtime_size = runtime.len() as u64;
        cursor += runtime.len() as u64;
        footer.metadata_offset = cursor;
        footer.metadata_size = metadata.len() as u64;
        cursor += metadata.len() as u64;
        footer.payload_offset = cursor;
        footer.payload_size = payload.len() as u64;
        cursor += payload.len() as u64;
        footer.signature_offset = cursor;
        footer.signature_size = signature.len() as u64;
        cursor += signature.len() as u64;
        footer.public_key_offset = cursor;
        footer.public_key_size = public_key.len() as u64;
        footer.seal();

        let mut file = std::fs::File::create(path).unwrap();
        for section in [launcher, resolver, runtime, metadata, payload, signature, public_key] {
            file.write_all(section).unwrap();
        }
        file.write_all(&footer.encode()).unwrap();
        file.write_all(MAGIC_EOF).unwrap();
    }

    #[test]
    fn footer_and_sections_read_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bundle");
        write_bundle(&path, [b"LAUNCH", b"UV", b"PY", b"M", b"P", b"SIG", b"KEY"]);

        let mut reader = Reader::new(&path).unwrap();
        let footer = reader.read_footer().unwrap();

        assert_eq!(footer.launcher_size(), 6);
        assert_eq!(footer.resolver_size, 2);
        assert_eq!(footer.runtime_size, 2);
        assert_eq!(footer.metadata_size, 1);
        assert_eq!(footer.payload_size, 1);

        assert_eq!(
            reader
                .read_section(footer.runtime_offset, footer.runtime_size)
                .unwrap(),
            b"PY"
        );
        assert_eq!(reader.read_signature().unwrap(), b"SIG");
        assert_eq!(reader.read_public_key().unwrap(), b"KEY");
        assert_eq!(reader.read_signed_content().unwrap(), b"LAUNCHUVPYMP");
    }

    #[test]
    fn sections_are_contiguous() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bundle");
        write_bundle(&path, [b"LAUNCH", b"UV", b"PY", b"M", b"P", b"SIG", b"KEY"]);

        let mut reader = Reader::new(&path).unwrap();
        let footer = reader.read_footer().unwrap();

        let pairs = [
            (footer.resolver_offset, footer.resolver_size, footer.runtime_offset),
            (footer.runtime_offset, footer.runtime_size, footer.metadata_offset),
            (footer.metadata_offset, footer.metadata_size, footer.payload_offset),
            (footer.payload_offset, footer.payload_size, footer.signature_offset),
            (footer.signature_offset, footer.signature_size, footer.public_key_offset),
        ];
        for (offset, size, next_offset) in pairs {
            assert_eq!(offset + size, next_offset);
        }
    }

    #[test]
    fn truncated_file_reports_too_small() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tiny");
        std::fs::write(&path, b"short").unwrap();

        let mut reader = Reader::new(&path).unwrap();
        assert!(matches!(
            reader.read_footer(),
            Err(PspfError::FileTooSmall { .. })
        ));
    }

    #[test]
    fn ordinary_file_reports_bad_magic() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("not-pspf");
        std::fs::write(&path, vec![0x42u8; 400]).unwrap();

        let mut reader = Reader::new(&path).unwrap();
        assert!(matches!(reader.read_footer(), Err(PspfError::BadMagic(_))));
    }

    #[test]
    fn flipped_footer_byte_reports_bad_crc() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bundle");
        write_bundle(&path, [b"LAUNCH", b"UV", b"PY", b"M", b"P", b"SIG", b"KEY"]);

        // Flip one byte inside runtime_size (footer bytes 24..32).
        let mut raw = std::fs::read(&path).unwrap();
        let footer_start = raw.len() - MAGIC_EOF.len() - FOOTER_SIZE;
        raw[footer_start + 24] ^= 0x01;
        std::fs::write(&path, raw).unwrap();

        let mut reader = Reader::new(&path).unwrap();
        assert!(matches!(
            reader.read_footer(),
            Err(PspfError::BadCrc { .. })
        ));
    }

    #[test]
    fn future_version_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bundle");
        write_bundle(&path, [b"LAUNCH", b"UV", b"PY", b"M", b"P", b"SIG", b"KEY"]);

        let mut raw = std::fs::read(&path).unwrap();
        let footer_start = raw.len() - MAGIC_EOF.len() - FOOTER_SIZE;
        let mut footer = Footer::decode(&raw[footer_start..footer_start + FOOTER_SIZE]).unwrap();
        footer.version = PSPF_VERSION + 1;
        footer.seal();
        raw[footer_start..footer_start + FOOTER_SIZE].copy_from_slice(&footer.encode());
        std::fs::write(&path, raw).unwrap();

        let mut reader = Reader::new(&path).unwrap();
        assert!(matches!(
            reader.read_footer(),
            Err(PspfError::UnsupportedVersion(_))
        ));
    }

    #[test]
    fn oversized_section_rejected_before_allocation() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bundle");
        write_bundle(&path, [b"LAUNCH", b"UV", b"PY", b"M", b"P", b"SIG", b"KEY"]);

        let mut reader = Reader::new(&path).unwrap();
        let err = reader.read_section(0, MAX_SECTION_SIZE + 1).unwrap_err();
        assert!(matches!(err, PspfError::SectionTooLarge { .. }));
    }

    #[test]
    fn section_past_eof_reports_short_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bundle");
        write_bundle(&path, [b"LAUNCH", b"UV", b"PY", b"M", b"P", b"SIG", b"KEY"]);

        let mut reader = Reader::new(&path).unwrap();
        let size = reader.file_size();
        let err = reader.read_section(size - 4, 64).unwrap_err();
        assert!(matches!(err, PspfError::ReadShort { .. }));
    }
}
