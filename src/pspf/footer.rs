//! PSPF footer codec
//!
//! The footer is the single structural index of a bundle: a fixed 108-byte
//! little-endian record holding the offset/size pair of every section, the
//! format version, a CRC-32/IEEE over the record itself, and the internal
//! magic. It sits immediately before the 8-byte trailing marker.

use super::constants::{FOOTER_SIZE, INTERNAL_FOOTER_MAGIC, PSPF_VERSION};
use crate::exceptions::{PspfError, Result};

/// The canonical 108-byte PSPF footer.
///
/// Sections are stored byte-contiguous in declaration order; the region
/// `[0, resolver_offset)` is the launcher itself, so `resolver_offset`
/// doubles as the launcher size.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Footer {
    pub resolver_offset: u64,
    pub resolver_size: u64,
    pub runtime_offset: u64,
    pub runtime_size: u64,
    pub metadata_offset: u64,
    pub metadata_size: u64,
    pub payload_offset: u64,
    pub payload_size: u64,
    pub signature_offset: u64,
    pub signature_size: u64,
    pub public_key_offset: u64,
    pub public_key_size: u64,
    pub version: u16,
    pub reserved: u16,
    pub footer_crc: u32,
    pub internal_magic: u32,
}

impl Footer {
    /// Create an empty footer carrying the current version and magic
    pub fn new() -> Self {
        Footer {
            version: PSPF_VERSION,
            internal_magic: INTERNAL_FOOTER_MAGIC,
            ..Footer::default()
        }
    }

    /// Serialize to the fixed 108-byte little-endian layout
    pub fn encode(&self) -> [u8; FOOTER_SIZE] {
        let mut bytes = [0u8; FOOTER_SIZE];
        let words = [
            self.resolver_offset,
            self.resolver_size,
            self.runtime_offset,
            self.runtime_size,
            self.metadata_offset,
            self.metadata_size,
            self.payload_offset,
            self.payload_size,
            self.signature_offset,
            self.signature_size,
            self.public_key_offset,
            self.public_key_size,
        ];
        for (i, word) in words.iter().enumerate() {
            bytes[i * 8..i * 8 + 8].copy_from_slice(&word.to_le_bytes());
        }
        bytes[96..98].copy_from_slice(&self.version.to_le_bytes());
        bytes[98..100].copy_from_slice(&self.reserved.to_le_bytes());
        bytes[100..104].copy_from_slice(&self.footer_crc.to_le_bytes());
        bytes[104..108].copy_from_slice(&self.internal_magic.to_le_bytes());
        bytes
    }

    /// Decode from exactly 108 bytes. Performs no magic or CRC checks;
    /// use [`Footer::verify`] for that.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() != FOOTER_SIZE {
            return Err(PspfError::Generic(format!(
                "invalid footer size: {} != {}",
                data.len(),
                FOOTER_SIZE
            )));
        }

        let word = |i: usize| -> u64 {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&data[i * 8..i * 8 + 8]);
            u64::from_le_bytes(buf)
        };

        let mut u16buf = [0u8; 2];
        let mut u32buf = [0u8; 4];

        u16buf.copy_from_slice(&data[96..98]);
        let version = u16::from_le_bytes(u16buf);
        u16buf.copy_from_slice(&data[98..100]);
        let reserved = u16::from_le_bytes(u16buf);
        u32buf.copy_from_slice(&data[100..104]);
        let footer_crc = u32::from_le_bytes(u32buf);
        u32buf.copy_from_slice(&data[104..108]);
        let internal_magic = u32::from_le_bytes(u32buf);

        Ok(Footer {
            resolver_offset: word(0),
            resolver_size: word(1),
            runtime_offset: word(2),
            runtime_size: word(3),
            metadata_offset: word(4),
            metadata_size: word(5),
            payload_offset: word(6),
            payload_size: word(7),
            signature_offset: word(8),
            signature_size: word(9),
            public_key_offset: word(10),
            public_key_size: word(11),
            version,
            reserved,
            footer_crc,
            internal_magic,
        })
    }

    /// Compute the CRC-32/IEEE over the footer with `footer_crc` zeroed
    fn calculate_crc(&self) -> u32 {
        let mut temp = *self;
        temp.footer_crc = 0;
        crc32fast::hash(&temp.encode())
    }

    /// Recompute and store the CRC
    pub fn seal(&mut self) {
        self.footer_crc = self.calculate_crc();
    }

    /// Check magic then CRC, reporting distinct error kinds for each
    pub fn verify(&self) -> Result<()> {
        if self.internal_magic != INTERNAL_FOOTER_MAGIC {
            return Err(PspfError::BadMagic(self.internal_magic));
        }
        let calculated = self.calculate_crc();
        if calculated != self.footer_crc {
            return Err(PspfError::BadCrc {
                stored: self.footer_crc,
                calculated,
            });
        }
        Ok(())
    }

    /// The launcher occupies `[0, resolver_offset)`
    pub fn launcher_size(&self) -> u64 {
        self.resolver_offset
    }

    /// The five signed sections in canonical order: launcher, resolver,
    /// runtime, metadata, payload
    pub fn signed_sections(&self) -> [(u64, u64); 5] {
        [
            (0, self.resolver_offset),
            (self.resolver_offset, self.resolver_size),
            (self.runtime_offset, self.runtime_size),
            (self.metadata_offset, self.metadata_size),
            (self.payload_offset, self.payload_size),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pspf::constants::MAGIC_EOF;

    fn sample_footer() -> Footer {
        let mut footer = Footer::new();
        footer.resolver_offset = 6;
        footer.resolver_size = 2;
        footer.runtime_offset = 8;
        footer.runtime_size = 2;
        footer.metadata_offset = 10;
        footer.metadata_size = 1;
        footer.payload_offset = 11;
        footer.payload_size = 1;
        footer.signature_offset = 12;
        footer.signature_size = 512;
        footer.public_key_offset = 524;
        footer.public_key_size = 800;
        footer.seal();
        footer
    }

    #[test]
    fn encode_decode_roundtrip() {
        let footer = sample_footer();
        let bytes = footer.encode();
        assert_eq!(bytes.len(), FOOTER_SIZE);

        let decoded = Footer::decode(&bytes).unwrap();
        assert_eq!(decoded, footer);
        decoded.verify().unwrap();
    }

    #[test]
    fn magic_sits_in_last_four_bytes() {
        let bytes = sample_footer().encode();
        assert_eq!(
            u32::from_le_bytes(bytes[104..108].try_into().unwrap()),
            INTERNAL_FOOTER_MAGIC
        );
    }

    #[test]
    fn seal_reproduces_stored_crc() {
        let footer = sample_footer();
        let mut resealed = footer;
        resealed.footer_crc = 0;
        resealed.seal();
        assert_eq!(resealed.footer_crc, footer.footer_crc);
    }

    #[test]
    fn bad_magic_detected_before_crc() {
        let mut footer = sample_footer();
        footer.internal_magic = 0xDEAD_BEEF;
        footer.seal();
        assert!(matches!(footer.verify(), Err(PspfError::BadMagic(_))));
    }

    #[test]
    fn flipped_field_fails_crc() {
        let mut footer = sample_footer();
        footer.runtime_size ^= 1;
        assert!(matches!(footer.verify(), Err(PspfError::BadCrc { .. })));
    }

    #[test]
    fn wrong_length_rejected() {
        assert!(Footer::decode(&[0u8; 64]).is_err());
    }

    #[test]
    fn trailing_marker_is_eight_bytes() {
        assert_eq!(MAGIC_EOF.len(), 8);
        assert_eq!(&MAGIC_EOF[..5], b"!PSPF");
    }
}
