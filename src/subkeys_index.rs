//! Recursive walk over sub-keys index cells (`lf`/`lh`/`li`/`ri`).
//!
//! The index is a small B-tree: `ri` cells are interior nodes pointing at
//! further index cells, while `lf`/`lh`/`li` cells are leaves pointing at
//! named-key cells. A walk must tolerate unresolvable element offsets
//! without aborting the rest of the tree, and must copy an index cell's
//! payload before making any further fetch, since a fetch may invalidate
//! the borrow backing that payload.

use crate::error::Result;
use crate::subkey_list::SubkeyList;

/// Maximum recursion depth for a sub-keys index walk.
///
/// The on-disk format is acyclic in well-formed hives, but nothing forbids
/// an adversarial index cell pointing back at an ancestor. This cap is a
/// safety net, not part of the externally observable contract.
pub const MAX_RECURSION_DEPTH: usize = 512;

/// Outcome of a non-fatal sub-keys index walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkOutcome {
    /// Every element resolved to a known cell.
    Clean,
    /// At least one element's offset did not resolve; the walk continued
    /// past it.
    Partial,
}

/// A source of cell payloads and offset validity, generalized so the
/// copy-before-recurse discipline below can be exercised against a store
/// that deliberately invalidates previously returned slices between calls.
pub trait CellSource {
    /// Returns the payload bytes of the cell at `offset`.
    ///
    /// The returned slice is only guaranteed valid until the next call to
    /// any `CellSource` method on this store.
    fn fetch_cell(&self, offset: u32) -> Result<&[u8]>;

    /// Returns whether `offset` resolves to a cell within a known bin.
    fn probe_offset(&self, offset: u32) -> Result<bool>;
}

/// Destination for leaf elements discovered during a walk.
///
/// `offset` is the child named-key cell's offset; `hash` is the name hint
/// carried by `lf`/`lh` entries (`0` for `li`/`ri`-sourced leaves, which
/// carry no hint).
pub trait SubNodeSink {
    /// Records one leaf element.
    fn append_sub_node(&mut self, offset: u32, hash: u32);
}

impl SubNodeSink for Vec<(u32, u32)> {
    fn append_sub_node(&mut self, offset: u32, hash: u32) {
        self.push((offset, hash));
    }
}

/// Walks the sub-keys index rooted at `list_offset`, appending every
/// resolvable leaf element to `sink`.
///
/// Returns `WalkOutcome::Partial` if any element's offset failed to
/// resolve (the caller is expected to mark its owning key item corrupted);
/// structural failures (bad signature, undersized payload, recursion limit)
/// are returned as `Err` and are fatal to the whole walk.
pub fn walk<S, T>(sink: &mut T, store: &S, list_offset: u32, depth: usize) -> Result<WalkOutcome>
where
    S: CellSource,
    T: SubNodeSink,
{
    if depth >= MAX_RECURSION_DEPTH {
        return Err(crate::error::RegistryError::RecursionLimitExceeded {
            offset: list_offset,
            max_depth: MAX_RECURSION_DEPTH,
        });
    }

    // Copy before any further fetch: a recursive call below will fetch
    // other cells through the same store, which may invalidate this
    // borrow.
    let owned_payload = store.fetch_cell(list_offset)?.to_vec();
    let list = SubkeyList::parse(&owned_payload, list_offset)?;

    let mut partial = false;

    match &list {
        SubkeyList::IndexRoot(offsets) => {
            for &offset in offsets {
                if !store.probe_offset(offset)? {
                    partial = true;
                    continue;
                }
                match walk(sink, store, offset, depth + 1)? {
                    WalkOutcome::Partial => partial = true,
                    WalkOutcome::Clean => {}
                }
            }
        }
        SubkeyList::IndexLeaf(offsets) => {
            for &offset in offsets {
                if store.probe_offset(offset)? {
                    sink.append_sub_node(offset, 0);
                } else {
                    partial = true;
                }
            }
        }
        SubkeyList::LeafWithHints(entries) => {
            for entry in entries {
                if store.probe_offset(entry.key_offset)? {
                    sink.append_sub_node(entry.key_offset, entry.name_hint);
                } else {
                    partial = true;
                }
            }
        }
    }

    Ok(if partial {
        WalkOutcome::Partial
    } else {
        WalkOutcome::Clean
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RegistryError;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// An in-memory store keyed by cell offset, used to assemble synthetic
    /// index trees without a real hive.
    struct MockStore {
        cells: HashMap<u32, Vec<u8>>,
    }

    impl MockStore {
        fn new() -> Self {
            MockStore {
                cells: HashMap::new(),
            }
        }

        fn insert(&mut self, offset: u32, data: Vec<u8>) {
            self.cells.insert(offset, data);
        }
    }

    impl CellSource for MockStore {
        fn fetch_cell(&self, offset: u32) -> Result<&[u8]> {
            self.cells
                .get(&offset)
                .map(|v| v.as_slice())
                .ok_or_else(|| RegistryError::NotFound(format!("cell {:#x}", offset)))
        }

        fn probe_offset(&self, offset: u32) -> Result<bool> {
            Ok(self.cells.contains_key(&offset))
        }
    }

    /// A store that refuses to be fetched twice for the same offset.
    /// `walk` must copy an index cell's payload before recursing into its
    /// children rather than re-reading it, so this store never observes a
    /// repeat fetch for a well-behaved walk.
    struct SingleFetchStore {
        cells: HashMap<u32, Vec<u8>>,
        fetched: RefCell<Vec<u32>>,
    }

    impl SingleFetchStore {
        fn new(cells: HashMap<u32, Vec<u8>>) -> Self {
            SingleFetchStore {
                cells,
                fetched: RefCell::new(Vec::new()),
            }
        }
    }

    impl CellSource for SingleFetchStore {
        fn fetch_cell(&self, offset: u32) -> Result<&[u8]> {
            let mut fetched = self.fetched.borrow_mut();
            if fetched.contains(&offset) {
                panic!("cell {:#x} fetched more than once", offset);
            }
            fetched.push(offset);
            self.cells
                .get(&offset)
                .map(|v| v.as_slice())
                .ok_or_else(|| RegistryError::NotFound(format!("cell {:#x}", offset)))
        }

        fn probe_offset(&self, offset: u32) -> Result<bool> {
            Ok(self.cells.contains_key(&offset))
        }
    }

    fn li_cell(offsets: &[u32]) -> Vec<u8> {
        let mut data = vec![b'l', b'i'];
        data.extend_from_slice(&(offsets.len() as u16).to_le_bytes());
        for &o in offsets {
            data.extend_from_slice(&o.to_le_bytes());
        }
        data
    }

    fn ri_cell(offsets: &[u32]) -> Vec<u8> {
        let mut data = vec![b'r', b'i'];
        data.extend_from_slice(&(offsets.len() as u16).to_le_bytes());
        for &o in offsets {
            data.extend_from_slice(&o.to_le_bytes());
        }
        data
    }

    fn lh_cell(entries: &[(u32, u32)]) -> Vec<u8> {
        let mut data = vec![b'l', b'h'];
        data.extend_from_slice(&(entries.len() as u16).to_le_bytes());
        for &(offset, hash) in entries {
            data.extend_from_slice(&offset.to_le_bytes());
            data.extend_from_slice(&hash.to_le_bytes());
        }
        data
    }

    fn nk_stub() -> Vec<u8> {
        vec![b'n', b'k']
    }

    #[test]
    fn flat_leaf_list_appends_in_order() {
        let mut store = MockStore::new();
        store.insert(0x20, li_cell(&[0x100, 0x200]));
        store.insert(0x100, nk_stub());
        store.insert(0x200, nk_stub());

        let mut sink: Vec<(u32, u32)> = Vec::new();
        let outcome = walk(&mut sink, &store, 0x20, 0).unwrap();

        assert_eq!(outcome, WalkOutcome::Clean);
        assert_eq!(sink, vec![(0x100, 0), (0x200, 0)]);
    }

    #[test]
    fn interior_ri_recurses_into_lh_leaves_preserving_hash() {
        let mut store = MockStore::new();
        store.insert(0x400, ri_cell(&[0x700, 0x800]));
        store.insert(0x700, lh_cell(&[(0x500, 0xAAAA)]));
        store.insert(0x800, lh_cell(&[(0x600, 0xBBBB)]));
        store.insert(0x500, nk_stub());
        store.insert(0x600, nk_stub());

        let mut sink: Vec<(u32, u32)> = Vec::new();
        let outcome = walk(&mut sink, &store, 0x400, 0).unwrap();

        assert_eq!(outcome, WalkOutcome::Clean);
        assert_eq!(sink, vec![(0x500, 0xAAAA), (0x600, 0xBBBB)]);
    }

    #[test]
    fn unresolvable_leaf_offset_marks_partial_but_keeps_others() {
        let mut store = MockStore::new();
        store.insert(0x20, li_cell(&[0x100, 0xDEADBEEF]));
        store.insert(0x100, nk_stub());

        let mut sink: Vec<(u32, u32)> = Vec::new();
        let outcome = walk(&mut sink, &store, 0x20, 0).unwrap();

        assert_eq!(outcome, WalkOutcome::Partial);
        assert_eq!(sink, vec![(0x100, 0)]);
    }

    #[test]
    fn unknown_signature_is_fatal() {
        let mut store = MockStore::new();
        let mut bad = vec![b'x', b'x'];
        bad.extend_from_slice(&0u16.to_le_bytes());
        store.insert(0x400, bad);

        let mut sink: Vec<(u32, u32)> = Vec::new();
        let result = walk(&mut sink, &store, 0x400, 0);

        assert!(result.is_err());
        assert!(sink.is_empty());
    }

    #[test]
    fn copy_before_recurse_fetches_each_index_cell_exactly_once() {
        let mut cells = HashMap::new();
        cells.insert(0x400, ri_cell(&[0x700, 0x800]));
        cells.insert(0x700, lh_cell(&[(0x500, 0xAAAA)]));
        cells.insert(0x800, lh_cell(&[(0x600, 0xBBBB)]));
        cells.insert(0x500, nk_stub());
        cells.insert(0x600, nk_stub());

        let store = SingleFetchStore::new(cells);
        let mut sink: Vec<(u32, u32)> = Vec::new();
        let outcome = walk(&mut sink, &store, 0x400, 0).unwrap();

        assert_eq!(outcome, WalkOutcome::Clean);
        assert_eq!(sink, vec![(0x500, 0xAAAA), (0x600, 0xBBBB)]);
    }
}
