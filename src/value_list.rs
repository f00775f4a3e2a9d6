//! Values-list materialization with a bounded, lazily-populated value cache.

use crate::cell::ValueType;
use crate::error::{RegistryError, Result};
use crate::hive::Hive;
use crate::lru::LruCache;
use crate::utils::read_u32_le;
use crate::value::{ValueData, ValueKey};
use std::cell::RefCell;
use std::rc::Rc;

/// Maximum number of decoded values cached per key, mirroring `libregf`'s
/// `LIBREGF_MAXIMUM_CACHE_ENTRIES_VALUES`.
pub const MAX_VALUE_CACHE_ENTRIES: usize = 16;

/// A fully decoded registry value: name, type, and parsed data.
#[derive(Debug, Clone)]
pub struct DecodedValue {
    /// Value name ("(default)" for the unnamed value).
    pub name: String,
    /// Declared value type.
    pub data_type: ValueType,
    /// Parsed value data.
    pub data: ValueData,
    /// Undecoded bytes the parsed `data` was built from.
    pub raw_data: Vec<u8>,
}

/// Ordered list of value-cell offsets with an LRU cache of decoded values.
pub struct ValueList {
    offsets: Vec<u32>,
    cache: RefCell<LruCache<usize, Rc<DecodedValue>>>,
}

impl ValueList {
    /// Creates an empty value list.
    pub fn empty() -> Self {
        ValueList {
            offsets: Vec::new(),
            cache: RefCell::new(LruCache::new(MAX_VALUE_CACHE_ENTRIES)),
        }
    }

    /// Populates a value list from the values-list cell at `list_offset`.
    ///
    /// Returns the list alongside whether any element was dropped because
    /// its offset did not resolve to a known bin range (the caller folds
    /// this into the owning key item's corruption flag).
    ///
    /// # Errors
    ///
    /// Returns an error if `list_offset` is a sentinel, or if the list
    /// cell is too small to hold `count` offsets.
    pub fn load(hive: &Hive, list_offset: u32, count: u32) -> Result<(Self, bool)> {
        if count == 0 {
            return Ok((Self::empty(), false));
        }

        if list_offset == 0 || list_offset == 0xFFFFFFFF {
            return Err(RegistryError::InvalidArgument(format!(
                "values list offset {:#x} is a sentinel but count is {}",
                list_offset, count
            )));
        }

        let cell = hive.fetch_cell(list_offset)?;
        let needed = count as usize * 4;
        if cell.len() < needed {
            return Err(RegistryError::TruncatedData {
                offset: list_offset,
                expected: needed,
                actual: cell.len(),
            });
        }

        let mut offsets = Vec::with_capacity(count as usize);
        let mut corrupted = false;
        for i in 0..count as usize {
            let element_offset = read_u32_le(cell, i * 4)?;
            if hive.probe_offset(element_offset)? {
                offsets.push(element_offset);
            } else {
                corrupted = true;
            }
        }

        Ok((
            ValueList {
                offsets,
                cache: RefCell::new(LruCache::new(MAX_VALUE_CACHE_ENTRIES)),
            },
            corrupted,
        ))
    }

    /// Number of resolvable elements retained in this list.
    pub fn count(&self) -> usize {
        self.offsets.len()
    }

    /// Returns the cell offset of the element at `index`, if any.
    pub fn offset_at(&self, index: usize) -> Option<u32> {
        self.offsets.get(index).copied()
    }

    /// Decodes (or returns the cached decode of) the value at `index`.
    ///
    /// # Errors
    ///
    /// Returns an error if `index` is out of range or the value cell fails
    /// to decode.
    pub fn get(&self, hive: &Hive, index: usize) -> Result<Rc<DecodedValue>> {
        if let Some(cached) = self.cache.borrow_mut().get(&index) {
            return Ok(cached);
        }

        let offset = self
            .offset_at(index)
            .ok_or_else(|| RegistryError::NotFound(format!("value element {}", index)))?;

        let cell = hive.fetch_cell(offset)?;
        let value_key = ValueKey::parse(cell, offset)?;
        let raw_data = hive.resolve_value_data(&value_key)?;
        let data = ValueData::parse(&raw_data, value_key.data_type, offset)?;

        let decoded = Rc::new(DecodedValue {
            name: value_key.name,
            data_type: value_key.data_type,
            data,
            raw_data,
        });

        self.cache.borrow_mut().put(index, decoded.clone());
        Ok(decoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_list_has_zero_count() {
        let list = ValueList::empty();
        assert_eq!(list.count(), 0);
        assert_eq!(list.offset_at(0), None);
    }
}
