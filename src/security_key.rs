//! Security descriptor (sk) cell parsing.
//!
//! Security key cells hold a raw NT `SECURITY_DESCRIPTOR` blob shared by one
//! or more key nodes. Like class names, the descriptor bytes are opaque
//! here; interpreting owner/group SIDs and ACLs is left to callers.

use crate::error::{RegistryError, Result};
use crate::utils::read_u32_le;

/// Minimum size of a security key cell header.
const SECURITY_KEY_MIN_SIZE: usize = 0x14;

/// Security key (sk) structure.
#[derive(Debug, Clone)]
pub struct SecurityKey {
    /// Offset to the previous security key cell (unused by this parser).
    pub previous_offset: u32,

    /// Offset to the next security key cell (unused by this parser).
    pub next_offset: u32,

    /// Reference count from key nodes sharing this descriptor.
    pub reference_count: u32,

    /// Raw NT security descriptor bytes.
    pub security_descriptor: Vec<u8>,
}

impl SecurityKey {
    /// Parses a security key from cell data.
    ///
    /// # Arguments
    ///
    /// * `data` - Cell data (excluding size field, starting with "sk" signature).
    /// * `offset` - Offset of this cell for error reporting.
    ///
    /// # Errors
    ///
    /// Returns an error if the data is malformed or truncated.
    pub fn parse(data: &[u8], offset: u32) -> Result<Self> {
        if data.len() < SECURITY_KEY_MIN_SIZE {
            return Err(RegistryError::TruncatedData {
                offset,
                expected: SECURITY_KEY_MIN_SIZE,
                actual: data.len(),
            });
        }

        if &data[0..2] != b"sk" {
            return Err(RegistryError::InvalidFormat(format!(
                "Expected 'sk' signature at offset {:#x}",
                offset
            )));
        }

        let previous_offset = read_u32_le(data, 0x04)?;
        let next_offset = read_u32_le(data, 0x08)?;
        let reference_count = read_u32_le(data, 0x0C)?;
        let descriptor_size = read_u32_le(data, 0x10)? as usize;

        let descriptor_end = SECURITY_KEY_MIN_SIZE
            .checked_add(descriptor_size)
            .ok_or_else(|| RegistryError::TruncatedData {
                offset,
                expected: descriptor_size,
                actual: data.len(),
            })?;

        if descriptor_end > data.len() {
            return Err(RegistryError::TruncatedData {
                offset,
                expected: descriptor_end,
                actual: data.len(),
            });
        }

        let security_descriptor = data[SECURITY_KEY_MIN_SIZE..descriptor_end].to_vec();

        Ok(SecurityKey {
            previous_offset,
            next_offset,
            reference_count,
            security_descriptor,
        })
    }
}
