//! End-to-end tests against synthetic, hand-built hive buffers.
//!
//! Real SYSTEM/SOFTWARE/NTUSER.DAT hive files are not available in this
//! environment, so these tests assemble minimal hives byte-by-byte (base
//! block + one hbin + a handful of cells) and drive the public API the way
//! a caller inspecting a real hive would.

use reg_parser::hbin::HBIN_HEADER_SIZE;
use reg_parser::header::BASE_BLOCK_SIZE;
use reg_parser::utils::calculate_checksum;
use reg_parser::{Hive, KeyNodeFlags, RegistryKey, ValueData};

/// Accumulates cells into a single hive bin, returning each cell's offset
/// (relative to the first hbin) as it is appended. Children must be pushed
/// before the parent cell that references them.
struct HiveBuilder {
    body: Vec<u8>,
}

impl HiveBuilder {
    fn new() -> Self {
        HiveBuilder { body: Vec::new() }
    }

    fn push(&mut self, payload: &[u8]) -> u32 {
        let offset = HBIN_HEADER_SIZE as u32 + self.body.len() as u32;
        let cell_size = -(4 + payload.len() as i32);
        self.body.extend_from_slice(&cell_size.to_le_bytes());
        self.body.extend_from_slice(payload);
        offset
    }

    fn finish(mut self, root_cell_offset: u32) -> Hive {
        while self.body.len() % 8 != 0 {
            self.body.push(0);
        }

        let hbin_size = HBIN_HEADER_SIZE + self.body.len();

        let mut data = vec![0u8; BASE_BLOCK_SIZE];
        data[0..4].copy_from_slice(b"regf");
        data[0x04..0x08].copy_from_slice(&1u32.to_le_bytes()); // primary_sequence
        data[0x08..0x0C].copy_from_slice(&1u32.to_le_bytes()); // secondary_sequence
        data[0x14..0x18].copy_from_slice(&1u32.to_le_bytes()); // major_version
        data[0x18..0x1C].copy_from_slice(&5u32.to_le_bytes()); // minor_version
        data[0x24..0x28].copy_from_slice(&root_cell_offset.to_le_bytes());
        data[0x28..0x2C].copy_from_slice(&(hbin_size as u32).to_le_bytes());
        data[0x2C..0x30].copy_from_slice(&1u32.to_le_bytes()); // clustering_factor

        let mut hbin = vec![0u8; hbin_size];
        hbin[0..4].copy_from_slice(b"hbin");
        hbin[4..8].copy_from_slice(&0u32.to_le_bytes());
        hbin[8..12].copy_from_slice(&(hbin_size as u32).to_le_bytes());
        hbin[HBIN_HEADER_SIZE..].copy_from_slice(&self.body);

        data.extend_from_slice(&hbin);
        let checksum = calculate_checksum(&data);
        data[0x1FC..0x200].copy_from_slice(&checksum.to_le_bytes());

        Hive::from_vec(data).expect("synthetic hive should parse")
    }
}

fn nk_cell(
    flags: u16,
    subkey_count: u32,
    subkey_list_offset: u32,
    value_count: u32,
    value_list_offset: u32,
    security_offset: u32,
    name: &str,
) -> Vec<u8> {
    let mut p = vec![0u8; 0x4C];
    p[0..2].copy_from_slice(b"nk");
    p[2..4].copy_from_slice(&(flags | KeyNodeFlags::COMP_NAME).to_le_bytes());
    p[0x14..0x18].copy_from_slice(&subkey_count.to_le_bytes());
    p[0x1C..0x20].copy_from_slice(&subkey_list_offset.to_le_bytes());
    p[0x20..0x24].copy_from_slice(&0xFFFFFFFFu32.to_le_bytes());
    p[0x24..0x28].copy_from_slice(&value_count.to_le_bytes());
    p[0x28..0x2C].copy_from_slice(&value_list_offset.to_le_bytes());
    p[0x2C..0x30].copy_from_slice(&security_offset.to_le_bytes());
    p[0x30..0x34].copy_from_slice(&0xFFFFFFFFu32.to_le_bytes()); // class_name_offset
    p[0x48..0x4A].copy_from_slice(&(name.len() as u16).to_le_bytes());
    p.extend_from_slice(name.as_bytes());
    p
}

fn vk_inline_cell(name: &str, data_type: u32, data_length: u32, data_offset: u32) -> Vec<u8> {
    let mut p = vec![0u8; 0x14];
    p[0..2].copy_from_slice(b"vk");
    p[0x02..0x04].copy_from_slice(&(name.len() as u16).to_le_bytes());
    p[0x04..0x08].copy_from_slice(&data_length.to_le_bytes());
    p[0x08..0x0C].copy_from_slice(&data_offset.to_le_bytes());
    p[0x0C..0x10].copy_from_slice(&data_type.to_le_bytes());
    p[0x10..0x12].copy_from_slice(&1u16.to_le_bytes()); // ascii name
    p.extend_from_slice(name.as_bytes());
    p
}

fn li_cell(offsets: &[u32]) -> Vec<u8> {
    let mut p = vec![b'l', b'i'];
    p.extend_from_slice(&(offsets.len() as u16).to_le_bytes());
    for &o in offsets {
        p.extend_from_slice(&o.to_le_bytes());
    }
    p
}

fn value_list_cell(offsets: &[u32]) -> Vec<u8> {
    let mut p = Vec::new();
    for &o in offsets {
        p.extend_from_slice(&o.to_le_bytes());
    }
    p
}

/// Inline-encodes a two-character ASCII string as REG_SZ data, returning
/// `(data_length, data_offset)` suitable for `vk_inline_cell`.
fn inline_utf16_pair(a: char, b: char) -> (u32, u32) {
    let mut bytes = [0u8; 4];
    bytes[0..2].copy_from_slice(&(a as u16).to_le_bytes());
    bytes[2..4].copy_from_slice(&(b as u16).to_le_bytes());
    (4, u32::from_le_bytes(bytes))
}

const REG_SZ: u32 = 1;
const REG_DWORD: u32 = 4;

/// Builds a small tree:
///
/// ```text
/// ROOT (value: Greeting = "hi")
///   +-- Alpha (value: Count = 42)
///   +-- Beta
///         +-- Gamma
/// ```
fn build_sample_hive() -> Hive {
    let mut b = HiveBuilder::new();

    let gamma = b.push(&nk_cell(0, 0, 0xFFFFFFFF, 0, 0xFFFFFFFF, 0xFFFFFFFF, "Gamma"));

    let beta_subkeys = b.push(&li_cell(&[gamma]));
    let beta = b.push(&nk_cell(
        0,
        1,
        beta_subkeys,
        0,
        0xFFFFFFFF,
        0xFFFFFFFF,
        "Beta",
    ));

    let (count_len, count_offset) = (4u32, 42u32);
    let value_count = b.push(&vk_inline_cell("Count", REG_DWORD, count_len, count_offset));
    let alpha_values = b.push(&value_list_cell(&[value_count]));
    let alpha = b.push(&nk_cell(
        0,
        0,
        0xFFFFFFFF,
        1,
        alpha_values,
        0xFFFFFFFF,
        "Alpha",
    ));

    let root_subkeys = b.push(&li_cell(&[alpha, beta]));

    let (greeting_len, greeting_offset) = inline_utf16_pair('h', 'i');
    let value_greeting = b.push(&vk_inline_cell(
        "Greeting",
        REG_SZ,
        greeting_len,
        greeting_offset,
    ));
    let root_values = b.push(&value_list_cell(&[value_greeting]));

    let root = b.push(&nk_cell(
        KeyNodeFlags::ROOT_KEY,
        2,
        root_subkeys,
        1,
        root_values,
        0xFFFFFFFF,
        "ROOT",
    ));

    b.finish(root)
}

/// Builds a hive whose root has one subkey whose list offset points nowhere.
fn build_corrupted_hive() -> Hive {
    let mut b = HiveBuilder::new();
    let root = b.push(&nk_cell(
        KeyNodeFlags::ROOT_KEY,
        1,
        0xDEADBEEF,
        0,
        0xFFFFFFFF,
        0xFFFFFFFF,
        "ROOT",
    ));
    b.finish(root)
}

#[test]
fn root_key_reports_name_and_counts() {
    let hive = build_sample_hive();
    let root = hive.root_key().unwrap();

    assert_eq!(root.name().unwrap(), "ROOT");
    assert_eq!(root.subkey_count().unwrap(), 2);
    assert_eq!(root.value_count().unwrap(), 1);
    assert!(!root.is_corrupted().unwrap());
}

#[test]
fn subkeys_enumerate_in_on_disk_order() {
    let hive = build_sample_hive();
    let root = hive.root_key().unwrap();

    let names: Vec<String> = root
        .subkeys()
        .unwrap()
        .iter()
        .map(|k| k.name().unwrap())
        .collect();

    assert_eq!(names, vec!["Alpha".to_string(), "Beta".to_string()]);
}

#[test]
fn root_value_decodes_inline_string() {
    let hive = build_sample_hive();
    let root = hive.root_key().unwrap();

    let value = root.value("Greeting").unwrap();
    match value.data() {
        ValueData::String(s) => assert_eq!(s, "hi"),
        other => panic!("expected REG_SZ, got {:?}", other),
    }
}

#[test]
fn nested_value_decodes_inline_dword() {
    let hive = build_sample_hive();
    let root = hive.root_key().unwrap();

    let alpha = root
        .subkeys()
        .unwrap()
        .into_iter()
        .find(|k| k.name().unwrap() == "Alpha")
        .expect("Alpha should be a subkey of ROOT");

    let value = alpha.value("Count").unwrap();
    match value.data() {
        ValueData::Dword(d) => assert_eq!(d, 42),
        other => panic!("expected REG_DWORD, got {:?}", other),
    }
}

#[test]
fn missing_value_name_is_not_found() {
    let hive = build_sample_hive();
    let root = hive.root_key().unwrap();

    assert!(root.value("DoesNotExist").is_err());
}

#[test]
fn deep_traversal_counts_every_key_and_value() {
    let hive = build_sample_hive();
    let root = hive.root_key().unwrap();

    fn count_recursive(key: &RegistryKey, key_count: &mut usize, value_count: &mut usize) {
        *key_count += 1;
        *value_count += key.values().unwrap().len();
        for subkey in key.subkeys().unwrap() {
            count_recursive(&subkey, key_count, value_count);
        }
    }

    let mut key_count = 0;
    let mut value_count = 0;
    count_recursive(&root, &mut key_count, &mut value_count);

    // ROOT, Alpha, Beta, Gamma
    assert_eq!(key_count, 4);
    // Greeting on ROOT, Count on Alpha
    assert_eq!(value_count, 2);
}

#[test]
fn hbin_iteration_reports_single_bin() {
    let hive = build_sample_hive();

    let bins: Vec<_> = hive.hbins().collect::<Result<Vec<_>, _>>().unwrap();
    assert_eq!(bins.len(), 1);
    assert_eq!(bins[0].offset, 0);
    assert_eq!(&bins[0].signature, b"hbin");
}

#[test]
fn unresolvable_subkey_list_marks_root_corrupted() {
    let hive = build_corrupted_hive();
    let root = hive.root_key().unwrap();

    assert!(root.is_corrupted().unwrap());
    assert!(root.subkeys().unwrap().is_empty());
}
