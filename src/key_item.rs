//! Key item: the decoded aggregate of a named key, its class name, security
//! descriptor, and values list.
//!
//! A `KeyItem` is built once per key offset and cached by the owning
//! `Hive`. Loading never aborts on a bad child pointer — it records
//! [`KeyItemFlags::CORRUPTED`] and keeps going, so one damaged branch of a
//! hive does not make the rest unreachable.

use crate::error::{RegistryError, Result};
use crate::hive::Hive;
use crate::key::KeyNode;
use crate::security_key::SecurityKey;
use crate::subkeys_index::{self, WalkOutcome};
use crate::value_list::ValueList;
use std::cell::{Cell, RefCell};
use tracing::warn;

/// Bitset of soft-failure conditions recorded against a loaded key item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyItemFlags(u8);

impl KeyItemFlags {
    /// Some child offset referenced by this key failed to resolve.
    pub const CORRUPTED: u8 = 0x01;

    fn none() -> Self {
        KeyItemFlags(0)
    }

    fn has(self, flag: u8) -> bool {
        (self.0 & flag) != 0
    }

    fn with(self, flag: u8) -> Self {
        KeyItemFlags(self.0 | flag)
    }
}

/// Decoded named key plus its optional class name, security descriptor, and
/// values, along with lazily-populated sub-key identities.
pub struct KeyItem {
    named_key: KeyNode,
    class_name: Option<Vec<u8>>,
    security_descriptor: Option<Vec<u8>>,
    values: ValueList,
    flags: Cell<KeyItemFlags>,
    sub_nodes_offset: Option<u32>,
    children: RefCell<Option<Vec<(u32, u32)>>>,
}

impl KeyItem {
    /// Loads and decodes the key item at `offset`.
    ///
    /// `name_hash` is the hint carried by the parent's sub-keys index entry
    /// (the first four characters of an `lf` entry, or a hash for `lh`); it
    /// is accepted to mirror the on-disk traversal contract but is not
    /// verified against the decoded name, since `lf` hints are not a real
    /// hash of anything and no registry parser in practice enforces this.
    ///
    /// # Errors
    ///
    /// Returns an error if `offset` is a sentinel, the key cell fails to
    /// decode, or a non-sentinel security offset fails to resolve.
    pub fn load(hive: &Hive, offset: u32, _name_hash: u32) -> Result<Self> {
        if offset == 0 || offset == 0xFFFFFFFF {
            return Err(RegistryError::InvalidArgument(format!(
                "key offset {:#x} is a sentinel, not a loadable key",
                offset
            )));
        }

        let cell = hive.fetch_cell(offset)?;
        let named_key = KeyNode::parse(cell, offset)?;

        let class_name =
            load_class_name(hive, named_key.class_name_offset, named_key.class_name_length)?;

        let security_descriptor = if named_key.security_offset != 0xFFFFFFFF {
            let sk_cell = hive.fetch_cell(named_key.security_offset)?;
            let security_key = SecurityKey::parse(sk_cell, named_key.security_offset)?;
            Some(security_key.security_descriptor)
        } else {
            None
        };

        let mut flags = KeyItemFlags::none();

        let sub_nodes_offset = if named_key.subkey_count > 0 {
            if hive.probe_offset(named_key.subkey_list_offset)? {
                Some(named_key.subkey_list_offset)
            } else {
                warn!(
                    offset = %format!("{:#x}", offset),
                    subkey_list_offset = %format!("{:#x}", named_key.subkey_list_offset),
                    "sub-keys list offset does not resolve to a known bin"
                );
                flags = flags.with(KeyItemFlags::CORRUPTED);
                None
            }
        } else {
            None
        };

        let values = if named_key.value_count > 0 {
            if hive.probe_offset(named_key.value_list_offset)? {
                let (values, values_corrupted) =
                    ValueList::load(hive, named_key.value_list_offset, named_key.value_count)?;
                if values_corrupted {
                    flags = flags.with(KeyItemFlags::CORRUPTED);
                }
                values
            } else {
                warn!(
                    offset = %format!("{:#x}", offset),
                    value_list_offset = %format!("{:#x}", named_key.value_list_offset),
                    "values list offset does not resolve to a known bin"
                );
                flags = flags.with(KeyItemFlags::CORRUPTED);
                ValueList::empty()
            }
        } else {
            ValueList::empty()
        };

        Ok(KeyItem {
            named_key,
            class_name,
            security_descriptor,
            values,
            flags: Cell::new(flags),
            sub_nodes_offset,
            children: RefCell::new(None),
        })
    }

    /// The decoded named-key record.
    pub fn named_key(&self) -> &KeyNode {
        &self.named_key
    }

    /// Raw class-name bytes (UTF-16LE, undecoded), if any.
    pub fn class_name(&self) -> Option<&[u8]> {
        self.class_name.as_deref()
    }

    /// Raw NT security descriptor bytes, if any.
    pub fn security_descriptor(&self) -> Option<&[u8]> {
        self.security_descriptor.as_deref()
    }

    /// The values list.
    pub fn values(&self) -> &ValueList {
        &self.values
    }

    /// Whether any child of this key failed to resolve during loading or
    /// traversal.
    pub fn is_corrupted(&self) -> bool {
        self.flags.get().has(KeyItemFlags::CORRUPTED)
    }

    /// Returns this key's sub-keys as `(offset, name_hint)` pairs, walking
    /// the sub-keys index on first access and caching the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the index walk hits a structural failure
    /// (unknown signature, truncated cell, runaway recursion). An
    /// unresolvable individual element is not an error here — it sets
    /// [`Self::is_corrupted`] instead.
    pub fn subkeys(&self, hive: &Hive) -> Result<Vec<(u32, u32)>> {
        if let Some(children) = self.children.borrow().as_ref() {
            return Ok(children.clone());
        }

        let mut sink = Vec::new();
        let outcome = match self.sub_nodes_offset {
            Some(offset) => subkeys_index::walk(&mut sink, hive, offset, 0)?,
            None => WalkOutcome::Clean,
        };

        if outcome == WalkOutcome::Partial {
            warn!(
                sub_nodes_offset = %format!("{:#x}", self.sub_nodes_offset.unwrap_or(0)),
                "sub-keys index walk skipped one or more unresolvable elements"
            );
            self.flags.set(self.flags.get().with(KeyItemFlags::CORRUPTED));
        }

        *self.children.borrow_mut() = Some(sink.clone());
        Ok(sink)
    }
}

/// Reads a class-name cell and copies `size` bytes into an owned buffer.
///
/// # Errors
///
/// Returns an error if `offset == 0` with `size > 0` (an unsupported
/// combination), if `size == 0` at a non-sentinel offset, or if the class
/// name cell does not hold at least `size` bytes.
fn load_class_name(hive: &Hive, offset: u32, size: u16) -> Result<Option<Vec<u8>>> {
    if offset == 0xFFFFFFFF {
        return Ok(None);
    }

    if offset == 0 {
        if size == 0 {
            return Ok(None);
        }
        return Err(RegistryError::UnsupportedOffset {
            context: "class name",
        });
    }

    let size = size as usize;
    if size == 0 {
        return Err(RegistryError::InvalidArgument(format!(
            "class name size is 0 at offset {:#x}",
            offset
        )));
    }

    let cell = hive.fetch_cell(offset)?;
    if size > cell.len() {
        return Err(RegistryError::TruncatedData {
            offset,
            expected: size,
            actual: cell.len(),
        });
    }

    Ok(Some(cell[..size].to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Cell offsets are relative to the start of the first hbin (see
    // `utils::cell_offset_to_absolute`), not to the start of the file, so
    // the root cell built right after one 0x20-byte hbin header sits at
    // cell offset 0x20 - not at 0x1000 + 0x20.
    const ROOT_CELL_OFFSET: u32 = 0x20;

    fn push_cell(buf: &mut Vec<u8>, payload: &[u8]) {
        let cell_size = -(4 + payload.len() as i32);
        buf.extend_from_slice(&cell_size.to_le_bytes());
        buf.extend_from_slice(payload);
    }

    fn nk_payload(
        flags: u16,
        class_name_offset: u32,
        class_name_length: u16,
        security_offset: u32,
        subkey_count: u32,
        subkey_list_offset: u32,
        value_count: u32,
        value_list_offset: u32,
        name: &str,
    ) -> Vec<u8> {
        // Names below are written as raw ASCII bytes, so COMP_NAME must be
        // set or KeyNode::parse will decode them as UTF-16LE instead.
        let flags = flags | crate::cell::KeyNodeFlags::COMP_NAME;
        let mut p = vec![0u8; 0x4C];
        p[0..2].copy_from_slice(b"nk");
        p[2..4].copy_from_slice(&flags.to_le_bytes());
        p[0x10..0x14].copy_from_slice(&0u32.to_le_bytes());
        p[0x14..0x18].copy_from_slice(&subkey_count.to_le_bytes());
        p[0x18..0x1C].copy_from_slice(&0u32.to_le_bytes());
        p[0x1C..0x20].copy_from_slice(&subkey_list_offset.to_le_bytes());
        p[0x20..0x24].copy_from_slice(&0xFFFFFFFFu32.to_le_bytes());
        p[0x24..0x28].copy_from_slice(&value_count.to_le_bytes());
        p[0x28..0x2C].copy_from_slice(&value_list_offset.to_le_bytes());
        p[0x2C..0x30].copy_from_slice(&security_offset.to_le_bytes());
        p[0x30..0x34].copy_from_slice(&class_name_offset.to_le_bytes());
        p[0x48..0x4A].copy_from_slice(&(name.len() as u16).to_le_bytes());
        p[0x4A..0x4C].copy_from_slice(&class_name_length.to_le_bytes());
        p.extend_from_slice(name.as_bytes());
        p
    }

    /// Builds a minimal single-hbin hive containing only a root key cell at
    /// `ROOT_CELL_OFFSET`.
    fn build_single_cell_hive(root_payload: &[u8]) -> Hive {
        let mut hbin_body = Vec::new();
        push_cell(&mut hbin_body, root_payload);
        while hbin_body.len() % 8 != 0 {
            hbin_body.push(0);
        }

        let hbin_size = 0x20 + hbin_body.len();

        let mut data = vec![0u8; crate::header::BASE_BLOCK_SIZE];
        data[0..4].copy_from_slice(b"regf");
        data[0x14..0x18].copy_from_slice(&1u32.to_le_bytes()); // major_version
        data[0x18..0x1C].copy_from_slice(&3u32.to_le_bytes()); // minor_version
        data[0x24..0x28].copy_from_slice(&0u32.to_le_bytes()); // root_cell_offset
        data[0x28..0x2C].copy_from_slice(&(hbin_size as u32).to_le_bytes()); // hive_length

        let mut hbin = vec![0u8; hbin_size];
        hbin[0..4].copy_from_slice(b"hbin");
        hbin[4..8].copy_from_slice(&0u32.to_le_bytes());
        hbin[8..12].copy_from_slice(&(hbin_size as u32).to_le_bytes());
        hbin[0x20..].copy_from_slice(&hbin_body);

        data.extend_from_slice(&hbin);
        let checksum = crate::utils::calculate_checksum(&data);
        data[0x1FC..0x200].copy_from_slice(&checksum.to_le_bytes());

        Hive::from_vec(data).expect("synthetic hive should parse")
    }

    /// Builds a hive whose root key has no class name, security, subkeys,
    /// or values, for exercising the sentinel/absence paths of
    /// `KeyItem::load`.
    fn minimal_hive_with_root() -> Hive {
        let root_payload = nk_payload(
            crate::cell::KeyNodeFlags::ROOT_KEY,
            0xFFFFFFFF,
            0,
            0xFFFFFFFF,
            0,
            0xFFFFFFFF,
            0,
            0xFFFFFFFF,
            "root",
        );
        build_single_cell_hive(&root_payload)
    }

    #[test]
    fn root_with_no_children_loads_clean() {
        let hive = minimal_hive_with_root();
        let item = KeyItem::load(&hive, ROOT_CELL_OFFSET, 0).unwrap();

        assert_eq!(item.named_key().name, "root");
        assert!(!item.is_corrupted());
        assert_eq!(item.class_name(), None);
        assert_eq!(item.security_descriptor(), None);
        assert_eq!(item.values().count(), 0);
        assert_eq!(item.subkeys(&hive).unwrap(), Vec::new());
    }

    #[test]
    fn sentinel_offset_is_rejected() {
        let hive = minimal_hive_with_root();
        assert!(KeyItem::load(&hive, 0, 0).is_err());
        assert!(KeyItem::load(&hive, 0xFFFFFFFF, 0).is_err());
    }

    #[test]
    fn class_name_offset_zero_with_size_zero_is_absent() {
        let hive = minimal_hive_with_root();
        let result = load_class_name(&hive, 0, 0).unwrap();
        assert_eq!(result, None);
    }

    #[test]
    fn class_name_offset_zero_with_nonzero_size_is_unsupported() {
        let hive = minimal_hive_with_root();
        let result = load_class_name(&hive, 0, 4);
        assert!(matches!(
            result,
            Err(RegistryError::UnsupportedOffset { .. })
        ));
    }

    #[test]
    fn invalid_subkey_list_offset_marks_corrupted_with_no_children() {
        let root_payload = nk_payload(
            crate::cell::KeyNodeFlags::ROOT_KEY,
            0xFFFFFFFF,
            0,
            0xFFFFFFFF,
            1,
            0xDEADBEEF,
            0,
            0xFFFFFFFF,
            "root",
        );
        let hive = build_single_cell_hive(&root_payload);
        let item = KeyItem::load(&hive, ROOT_CELL_OFFSET, 0).unwrap();

        assert!(item.is_corrupted());
        assert_eq!(item.subkeys(&hive).unwrap(), Vec::new());
    }

    #[test]
    fn zero_value_count_ignores_nonzero_value_list_offset() {
        // §8 property 12: value_count == 0 leaves the list empty regardless
        // of whatever garbage sits in value_list_offset.
        let root_payload = nk_payload(
            crate::cell::KeyNodeFlags::ROOT_KEY,
            0xFFFFFFFF,
            0,
            0xFFFFFFFF,
            0,
            0xFFFFFFFF,
            0,
            0xDEADBEEF,
            "root",
        );
        let hive = build_single_cell_hive(&root_payload);
        let item = KeyItem::load(&hive, ROOT_CELL_OFFSET, 0).unwrap();

        assert!(!item.is_corrupted());
        assert_eq!(item.values().count(), 0);
    }
}
