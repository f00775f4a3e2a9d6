//! Main registry hive parser with memory-mapped file support.

use crate::bigdata::BigDataBlock;
use crate::cell::ValueType;
use crate::error::{RegistryError, Result};
use crate::hbin::HbinHeader;
use crate::header::{BaseBlock, BASE_BLOCK_SIZE};
use crate::key_item::KeyItem;
use crate::subkeys_index::CellSource;
use crate::utils::cell_offset_to_absolute;
use crate::value::ValueKey;
use crate::value_list::{DecodedValue, ValueList};
use memmap2::Mmap;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs::File;
use std::ops::Range;
use std::path::Path;
use std::rc::Rc;
use tracing::{debug, info, instrument};

/// Main registry hive parser.
///
/// This structure provides access to a Windows registry hive file using
/// memory-mapped I/O for efficient, zero-copy parsing.
///
/// # Caching
///
/// The hive maintains an internal cache of decoded key items, keyed by cell
/// offset, to avoid re-decoding the same key during traversal. The cache
/// uses `RefCell` rather than a lock: a `Hive` is not `Sync`, and callers
/// sharing one across threads must serialize access themselves (see the
/// crate's concurrency notes).
pub struct Hive {
    /// Hive data - either memory-mapped or owned.
    data: HiveData,

    /// Parsed base block header.
    base_block: BaseBlock,

    /// Byte ranges (relative to the first hbin) covered by each hive bin,
    /// in on-disk order. Used to validate a cell offset without fetching
    /// the cell itself.
    bin_ranges: Vec<Range<u32>>,

    /// Cache of decoded key items (offset -> KeyItem).
    node_cache: RefCell<HashMap<u32, Rc<KeyItem>>>,
}

/// Represents hive data storage.
enum HiveData {
    /// Memory-mapped file data.
    Mapped(Mmap),
    /// Owned data, for callers that already have hive bytes in memory.
    Owned(Vec<u8>),
}

impl HiveData {
    /// Returns a slice of the hive data.
    fn as_slice(&self) -> &[u8] {
        match self {
            HiveData::Mapped(mmap) => mmap,
            HiveData::Owned(data) => data,
        }
    }
}

impl Hive {
    /// Opens a registry hive file.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the registry hive file.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - File cannot be opened
    /// - File is not a valid registry hive
    /// - Header is corrupted
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use reg_parser::Hive;
    ///
    /// let hive = Hive::open("SYSTEM").unwrap();
    /// ```
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        info!("Opening registry hive");
        let file = File::open(&path)?;
        debug!("File opened successfully");

        // Validate file size BEFORE creating memory map
        let metadata = file.metadata()?;
        let file_size = metadata.len() as usize;

        if file_size < BASE_BLOCK_SIZE {
            return Err(RegistryError::HiveTooSmall {
                size: file_size,
                minimum: BASE_BLOCK_SIZE,
            });
        }

        debug!(size = file_size, "File size validated");

        // SAFETY: This is safe because:
        // 1. The file is opened in read-only mode (no write access)
        // 2. The file size has been validated to be at least BASE_BLOCK_SIZE
        // 3. The mmap lifetime is tied to the Hive lifetime
        // 4. All access to the mmap is bounds-checked via fetch_cell() and other methods
        // 5. The file descriptor remains valid for the lifetime of the mmap
        // 6. No other code has mutable access to the underlying file
        let mmap = unsafe { Mmap::map(&file)? };
        debug!(size = mmap.len(), "Memory mapped hive file");

        Self::from_data(HiveData::Mapped(mmap))
    }

    /// Creates a hive parser from a memory-mapped region.
    ///
    /// # Arguments
    ///
    /// * `mmap` - Memory-mapped hive data.
    pub fn from_mmap(mmap: Mmap) -> Result<Self> {
        Self::from_data(HiveData::Mapped(mmap))
    }

    /// Creates a hive parser from owned data.
    ///
    /// # Arguments
    ///
    /// * `data` - Owned hive data.
    pub fn from_vec(data: Vec<u8>) -> Result<Self> {
        Self::from_data(HiveData::Owned(data))
    }

    /// Creates a hive parser from hive data.
    fn from_data(data: HiveData) -> Result<Self> {
        let base_block = BaseBlock::parse(data.as_slice())?;
        let bin_ranges = Self::collect_bin_ranges(data.as_slice())?;

        debug!(bins = bin_ranges.len(), "Indexed hive bins");

        Ok(Self {
            data,
            base_block,
            bin_ranges,
            node_cache: RefCell::new(HashMap::new()),
        })
    }

    /// Walks the hive-bin headers once at open time, recording each bin's
    /// byte range so later cell offsets can be validated cheaply.
    fn collect_bin_ranges(data: &[u8]) -> Result<Vec<Range<u32>>> {
        let hbin_area = if data.len() > BASE_BLOCK_SIZE {
            &data[BASE_BLOCK_SIZE..]
        } else {
            &[]
        };

        let mut ranges = Vec::new();
        let iter = HbinIterator {
            data: hbin_area,
            offset: 0,
        };

        for result in iter {
            let header = result?;
            ranges.push(header.offset..header.offset.saturating_add(header.size));
        }

        Ok(ranges)
    }

    /// Returns a reference to the base block header.
    pub fn base_block(&self) -> &BaseBlock {
        &self.base_block
    }

    /// Returns the root key of the hive.
    #[instrument(skip(self))]
    pub fn root_key(&self) -> Result<RegistryKey> {
        let offset = self.base_block.root_cell_offset;
        debug!(offset = %format!("{:#x}", offset), "Accessing root key");
        self.key_at(offset, 0)
    }

    /// Returns a lazy handle to the key at `offset`.
    ///
    /// The key's payload is not decoded until one of `RegistryKey`'s
    /// accessor methods is called. `name_hash` is the hint carried by the
    /// parent's sub-keys index entry, if any (`0` for the root key).
    pub fn key_at(&self, offset: u32, name_hash: u32) -> Result<RegistryKey> {
        Ok(RegistryKey {
            hive: self,
            offset,
            name_hash,
        })
    }

    /// Returns the cached or freshly-decoded key item at `offset`.
    fn item_at(&self, offset: u32, name_hash: u32) -> Result<Rc<KeyItem>> {
        if let Some(item) = self.node_cache.borrow().get(&offset) {
            debug!(offset = %format!("{:#x}", offset), "Cache hit for key item");
            return Ok(item.clone());
        }

        debug!(offset = %format!("{:#x}", offset), "Cache miss, decoding key item");
        let item = Rc::new(KeyItem::load(self, offset, name_hash)?);
        self.node_cache.borrow_mut().insert(offset, item.clone());
        Ok(item)
    }

    /// Returns the payload bytes of the cell at `offset` (excluding the
    /// leading size field).
    ///
    /// # Errors
    ///
    /// Returns an error if `offset` does not resolve within the hive, or
    /// the cell's declared size runs past the end of the data.
    pub fn fetch_cell(&self, offset: u32) -> Result<&[u8]> {
        let abs_offset = cell_offset_to_absolute(offset)? as usize;
        let data = self.data.as_slice();

        if abs_offset >= data.len() {
            return Err(RegistryError::invalid_offset(offset, data.len()));
        }

        if abs_offset + 4 > data.len() {
            return Err(RegistryError::TruncatedData {
                offset,
                expected: 4,
                actual: data.len() - abs_offset,
            });
        }

        let size_bytes = &data[abs_offset..abs_offset + 4];
        let size =
            i32::from_le_bytes([size_bytes[0], size_bytes[1], size_bytes[2], size_bytes[3]]);

        let abs_size = size.unsigned_abs() as usize;

        if abs_size < 4 {
            return Err(RegistryError::invalid_cell_size(size, offset));
        }

        let data_start = abs_offset + 4;
        let data_end = abs_offset + abs_size;

        if data_end > data.len() {
            return Err(RegistryError::TruncatedData {
                offset,
                expected: abs_size,
                actual: data.len() - abs_offset,
            });
        }

        Ok(&data[data_start..data_end])
    }

    /// Returns whether `offset` falls within a known hive bin.
    ///
    /// The sentinels `0` and `0xFFFFFFFF` always probe as absent rather
    /// than erroring, since callers use this to decide whether a stored
    /// offset is safe to dereference.
    pub fn probe_offset(&self, offset: u32) -> Result<bool> {
        if offset == 0 || offset == 0xFFFFFFFF {
            return Ok(false);
        }

        let idx = self.bin_ranges.partition_point(|range| range.end <= offset);
        Ok(self
            .bin_ranges
            .get(idx)
            .is_some_and(|range| range.contains(&offset)))
    }

    /// Resolves a value's raw data, following big-data segments when the
    /// declared length exceeds direct cell storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the data cell or any big-data segment fails to
    /// resolve.
    pub fn resolve_value_data(&self, value_key: &ValueKey) -> Result<Vec<u8>> {
        if value_key.is_inline_data() {
            Ok(value_key.inline_data())
        } else if value_key.data_offset == 0xFFFFFFFF || value_key.data_offset == 0 {
            Ok(Vec::new())
        } else {
            self.read_value_data(value_key.data_offset, value_key.data_length)
        }
    }

    /// Reads value data at the given offset.
    ///
    /// This method handles both regular values and big data blocks (values > 16KB).
    /// Big data blocks are stored in a "db" structure with multiple segments.
    fn read_value_data(&self, offset: u32, length: u32) -> Result<Vec<u8>> {
        if length == 0 {
            return Ok(Vec::new());
        }

        // Maximum size for direct cell storage (before big data blocks are used)
        const MAX_DIRECT_DATA_SIZE: u32 = 16344;

        if length > MAX_DIRECT_DATA_SIZE {
            return self.read_big_data(offset, length);
        }

        Ok(self.fetch_cell(offset)?.to_vec())
    }

    /// Reads big data block (values > 16KB).
    ///
    /// Big data blocks consist of a header cell ("db" signature) followed by
    /// a list of segment offsets. Each segment contains a portion of the data.
    fn read_big_data(&self, offset: u32, expected_length: u32) -> Result<Vec<u8>> {
        debug!(
            offset = %format!("{:#x}", offset),
            expected_length,
            "Reading big data block"
        );

        let header_cell = self.fetch_cell(offset)?;
        let db_header = BigDataBlock::parse(header_cell, offset)?;

        debug!(segments = db_header.segment_count, "Big data block segments");

        let segment_list_cell = self.fetch_cell(db_header.segment_list_offset)?;

        let expected_list_size = db_header.segment_count as usize * 4;
        if segment_list_cell.len() < expected_list_size {
            return Err(RegistryError::TruncatedData {
                offset: db_header.segment_list_offset,
                expected: expected_list_size,
                actual: segment_list_cell.len(),
            });
        }

        let mut segment_offsets = Vec::with_capacity(db_header.segment_count as usize);
        for i in 0..db_header.segment_count {
            let offset_pos = (i as usize) * 4;
            let segment_offset = u32::from_le_bytes([
                segment_list_cell[offset_pos],
                segment_list_cell[offset_pos + 1],
                segment_list_cell[offset_pos + 2],
                segment_list_cell[offset_pos + 3],
            ]);

            // High bit indicates the segment is part of the big data.
            let actual_offset = segment_offset & 0x7FFFFFFF;
            segment_offsets.push(actual_offset);
        }

        let mut data = Vec::with_capacity(expected_length as usize);
        for (i, segment_offset) in segment_offsets.iter().enumerate() {
            debug!(segment = i, offset = %format!("{:#x}", segment_offset), "Reading segment");

            let segment_data = self.fetch_cell(*segment_offset)?;
            data.extend_from_slice(segment_data);

            if data.len() >= expected_length as usize {
                break;
            }
        }

        data.truncate(expected_length as usize);

        debug!(bytes = data.len(), "Finished reading big data block");

        Ok(data)
    }

    /// Iterates over all hbins in the hive.
    pub fn hbins(&self) -> HbinIterator {
        let data = self.data.as_slice();
        let hbin_area = if data.len() > BASE_BLOCK_SIZE {
            &data[BASE_BLOCK_SIZE..]
        } else {
            &[]
        };
        HbinIterator {
            data: hbin_area,
            offset: 0,
        }
    }
}

impl CellSource for Hive {
    fn fetch_cell(&self, offset: u32) -> Result<&[u8]> {
        Hive::fetch_cell(self, offset)
    }

    fn probe_offset(&self, offset: u32) -> Result<bool> {
        Hive::probe_offset(self, offset)
    }
}

/// Iterator over hbins in a hive.
pub struct HbinIterator<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Iterator for HbinIterator<'a> {
    type Item = Result<HbinHeader>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.data.len() {
            return None;
        }

        let hbin_data = &self.data[self.offset..];
        let result = HbinHeader::parse(hbin_data, self.offset as u32);

        match result {
            Ok(ref header) => {
                self.offset += header.size as usize;
                Some(Ok(header.clone()))
            }
            Err(RegistryError::InvalidSignature { .. }) => {
                // Stop iteration when we hit invalid signatures (padding/EOF)
                None
            }
            Err(e) => Some(Err(e)),
        }
    }
}

/// A lazily-loading handle to a registry key.
///
/// Accessing `name()`, `values()`, `subkeys()`, or any other decoded field
/// triggers (and caches) decoding of the underlying key item; constructing
/// a `RegistryKey` itself never touches the hive.
pub struct RegistryKey<'a> {
    hive: &'a Hive,
    /// Cell offset of this key (relative to first hbin).
    pub offset: u32,
    /// Name hint carried by the parent's sub-keys index entry (unverified).
    pub name_hash: u32,
}

impl<'a> RegistryKey<'a> {
    fn item(&self) -> Result<Rc<KeyItem>> {
        self.hive.item_at(self.offset, self.name_hash)
    }

    /// Returns the key name.
    pub fn name(&self) -> Result<String> {
        Ok(self.item()?.named_key().name.clone())
    }

    /// Returns whether this key (or any child it could not resolve while
    /// loading or enumerating) was marked corrupted.
    pub fn is_corrupted(&self) -> Result<bool> {
        Ok(self.item()?.is_corrupted())
    }

    /// Returns the raw (undecoded) class-name bytes, if any.
    pub fn class_name(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.item()?.class_name().map(|bytes| bytes.to_vec()))
    }

    /// Returns the class name decoded as a UTF-16LE string, if any.
    pub fn class_name_string(&self) -> Result<Option<String>> {
        match self.item()?.class_name() {
            Some(bytes) => Ok(Some(crate::utils::read_utf16_string(bytes, self.offset)?)),
            None => Ok(None),
        }
    }

    /// Returns the raw NT security descriptor bytes, if any.
    pub fn security_descriptor(&self) -> Result<Option<Vec<u8>>> {
        Ok(self
            .item()?
            .security_descriptor()
            .map(|bytes| bytes.to_vec()))
    }

    /// Returns the number of subkeys.
    pub fn subkey_count(&self) -> Result<u32> {
        Ok(self.item()?.named_key().subkey_count)
    }

    /// Returns the number of values.
    pub fn value_count(&self) -> Result<u32> {
        Ok(self.item()?.named_key().value_count)
    }

    /// Returns handles to this key's subkeys, in on-disk order.
    ///
    /// Each returned handle is itself lazy: its own payload is not decoded
    /// until accessed.
    pub fn subkeys(&self) -> Result<Vec<RegistryKey<'a>>> {
        let item = self.item()?;
        let children = item.subkeys(self.hive)?;
        Ok(children
            .into_iter()
            .map(|(offset, name_hash)| RegistryKey {
                hive: self.hive,
                offset,
                name_hash,
            })
            .collect())
    }

    /// Returns all of this key's values, decoded.
    pub fn values(&self) -> Result<Vec<RegistryValue>> {
        let item = self.item()?;
        let count = item.values().count();
        let mut values = Vec::with_capacity(count);
        for index in 0..count {
            values.push(RegistryValue {
                decoded: item.values().get(self.hive, index)?,
            });
        }
        Ok(values)
    }

    /// Returns the value at `index` in on-disk order.
    pub fn value_at(&self, index: usize) -> Result<RegistryValue> {
        let item = self.item()?;
        Ok(RegistryValue {
            decoded: item.values().get(self.hive, index)?,
        })
    }

    /// Looks up a value by name (case-insensitive, matching Windows
    /// registry semantics).
    pub fn value(&self, name: &str) -> Result<RegistryValue> {
        let item = self.item()?;
        let count = item.values().count();
        for index in 0..count {
            let decoded = item.values().get(self.hive, index)?;
            if decoded.name.eq_ignore_ascii_case(name) {
                return Ok(RegistryValue { decoded });
            }
        }
        Err(RegistryError::not_found("value", name))
    }
}

/// A decoded registry value.
pub struct RegistryValue {
    decoded: Rc<DecodedValue>,
}

impl RegistryValue {
    /// Returns the value name.
    pub fn name(&self) -> &str {
        &self.decoded.name
    }

    /// Returns the value data type.
    pub fn data_type(&self) -> ValueType {
        self.decoded.data_type
    }

    /// Returns the parsed value data.
    pub fn data(&self) -> crate::value::ValueData {
        self.decoded.data.clone()
    }

    /// Returns the undecoded bytes the parsed data was built from.
    pub fn raw_data(&self) -> Result<Vec<u8>> {
        Ok(self.decoded.raw_data.clone())
    }
}
