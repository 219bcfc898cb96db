//! One-time-signature key index tracking.
//!
//! Every address owns a sparse set of 1024-bit pages. Bit `i` of page `p` stands for key
//! index `p * 1024 + i`. Bits are never cleared: setting a bit twice is how key reuse shows up.

use num_bigint::BigUint;
use num_traits::ToPrimitive;
use std::collections::{BTreeMap, HashMap};
use zond_mirror_types::Address;

/// Number of key indices covered by one page.
pub const PAGE_BITS: u32 = 1024;

/// Size of one page in bytes.
pub const PAGE_BYTES: usize = (PAGE_BITS / 8) as usize;

/// Minimum width of an encoded page key.
const PAGE_KEY_WIDTH: usize = 32;

/// Result of [`OtsBitfield::set`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitStatus {
    /// The bit was clear before this call.
    NewlySet,
    /// The bit was already set: the key index has been used before.
    AlreadySet,
}

impl BitStatus {
    /// Returns `true` if the index had been used before.
    pub const fn is_reuse(self) -> bool {
        matches!(self, Self::AlreadySet)
    }
}

/// Big-endian byte encoding of a page number.
///
/// Keys are left-padded to 32 bytes. Longer page numbers keep their minimal encoding, so
/// ordering by length first and bytes second is numeric ordering.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageKey(Vec<u8>);

impl PageKey {
    /// Encodes a page number.
    pub fn new(page: &BigUint) -> Self {
        let bytes = page.to_bytes_be();
        if bytes.len() >= PAGE_KEY_WIDTH {
            return Self(bytes);
        }
        let mut key = vec![0u8; PAGE_KEY_WIDTH - bytes.len()];
        key.extend_from_slice(&bytes);
        Self(key)
    }

    /// Decodes a key read back from the store.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self::new(&BigUint::from_bytes_be(bytes))
    }

    /// The encoded key.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The page number.
    pub fn page(&self) -> BigUint {
        BigUint::from_bytes_be(&self.0)
    }
}

impl Ord for PageKey {
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        self.0.len().cmp(&other.0.len()).then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for PageKey {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// A single 1024-bit page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtsPage([u8; PAGE_BYTES]);

impl Default for OtsPage {
    fn default() -> Self {
        Self([0u8; PAGE_BYTES])
    }
}

impl OtsPage {
    /// Restores a page from its stored bytes. Returns `None` if the length is wrong.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        <[u8; PAGE_BYTES]>::try_from(bytes).ok().map(Self)
    }

    /// The raw page bytes.
    pub const fn as_bytes(&self) -> &[u8; PAGE_BYTES] {
        &self.0
    }

    /// Returns `true` if bit `offset` is set.
    pub const fn is_set(&self, offset: u32) -> bool {
        self.0[(offset >> 3) as usize] & (1 << (offset & 7)) != 0
    }

    /// Sets bit `offset`, returning whether it was already set.
    pub const fn set(&mut self, offset: u32) -> BitStatus {
        if self.is_set(offset) {
            return BitStatus::AlreadySet;
        }
        self.0[(offset >> 3) as usize] |= 1 << (offset & 7);
        BitStatus::NewlySet
    }

    /// Number of set bits.
    pub fn count(&self) -> u32 {
        self.0.iter().map(|byte| byte.count_ones()).sum()
    }
}

/// Splits a key index into its page key and in-page offset.
pub fn locate(index: &BigUint) -> (PageKey, u32) {
    let page = index / PAGE_BITS;
    let offset = (index % PAGE_BITS).to_u32().unwrap_or_default();
    (PageKey::new(&page), offset)
}

/// Extracts the key index from a transaction signature.
///
/// The index is the big-endian integer stored in the leading four bytes. Returns `None` for
/// signatures too short to carry one.
pub fn ots_key_index(signature: &[u8]) -> Option<BigUint> {
    signature.get(..4).map(BigUint::from_bytes_be)
}

/// Per-address set of used key indices.
#[derive(Debug, Default)]
pub struct OtsBitfield {
    pages: HashMap<Address, BTreeMap<PageKey, OtsPage>>,
}

impl OtsBitfield {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `index` as used by `address`, creating the page if needed.
    pub fn set(&mut self, address: Address, index: &BigUint) -> BitStatus {
        let (key, offset) = locate(index);
        self.pages.entry(address).or_default().entry(key).or_default().set(offset)
    }

    /// Returns `true` if `address` has used `index`.
    pub fn is_set(&self, address: &Address, index: &BigUint) -> bool {
        let (key, offset) = locate(index);
        self.pages
            .get(address)
            .and_then(|pages| pages.get(&key))
            .is_some_and(|page| page.is_set(offset))
    }

    /// Returns the page of `address` at `key`, if loaded.
    pub fn page(&self, address: &Address, key: &PageKey) -> Option<&OtsPage> {
        self.pages.get(address)?.get(key)
    }

    /// Returns `true` if the page of `address` at `key` is loaded.
    pub fn has_page(&self, address: &Address, key: &PageKey) -> bool {
        self.page(address, key).is_some()
    }

    /// Loads a page restored from the store.
    ///
    /// Bits already set in memory are kept, so loading never clears a bit.
    pub fn load_page(&mut self, address: Address, key: PageKey, page: OtsPage) {
        let entry = self.pages.entry(address).or_default().entry(key).or_default();
        for (current, stored) in entry.0.iter_mut().zip(page.0) {
            *current |= stored;
        }
    }

    /// Number of addresses with at least one page.
    pub fn address_count(&self) -> usize {
        self.pages.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn address(byte: u8) -> Address {
        Address::new([byte; 20])
    }

    #[rstest]
    #[case::first_bit(BigUint::from(0u32))]
    #[case::last_bit_of_first_page(BigUint::from(1023u32))]
    #[case::first_bit_of_second_page(BigUint::from(1024u32))]
    #[case::third_page(BigUint::from(2048u32))]
    #[case::above_u64(BigUint::from(u64::MAX) + BigUint::from(5u32))]
    fn test_set_then_is_set(#[case] index: BigUint) {
        let mut bitfield = OtsBitfield::new();
        let owner = address(1);

        assert!(!bitfield.is_set(&owner, &index));
        assert_eq!(bitfield.set(owner, &index), BitStatus::NewlySet);
        assert!(bitfield.is_set(&owner, &index));

        let neighbour = &index + 1u32;
        assert!(!bitfield.is_set(&owner, &neighbour));
        assert!(!bitfield.is_set(&address(2), &index));
    }

    #[test]
    fn test_set_reports_reuse() {
        let mut bitfield = OtsBitfield::new();
        let owner = address(7);
        let index = BigUint::from(42u32);

        assert_eq!(bitfield.set(owner, &index), BitStatus::NewlySet);
        assert_eq!(bitfield.set(owner, &index), BitStatus::AlreadySet);
        assert!(bitfield.set(owner, &index).is_reuse());
    }

    #[test]
    fn test_page_boundaries() {
        let (key, offset) = locate(&BigUint::from(1023u32));
        assert_eq!(key.page(), BigUint::from(0u32));
        assert_eq!(offset, 1023);

        let (key, offset) = locate(&BigUint::from(1024u32));
        assert_eq!(key.page(), BigUint::from(1u32));
        assert_eq!(offset, 0);

        let (key, offset) = locate(&BigUint::from(2048u32));
        assert_eq!(key.page(), BigUint::from(2u32));
        assert_eq!(offset, 0);
        assert_eq!(key.as_bytes().len(), PAGE_KEY_WIDTH);
    }

    #[test]
    fn test_page_key_order_is_numeric() {
        let small = PageKey::new(&BigUint::from(2u32));
        let large = PageKey::new(&BigUint::from(256u32));
        let huge = PageKey::new(&(BigUint::from(1u32) << 300));
        assert!(small < large);
        assert!(large < huge);
        assert_eq!(PageKey::from_bytes(&[1, 0]), large);
    }

    #[test]
    fn test_load_page_never_clears_bits() {
        let mut bitfield = OtsBitfield::new();
        let owner = address(3);
        bitfield.set(owner, &BigUint::from(5u32));

        let mut stored = OtsPage::default();
        stored.set(9);
        let (key, _) = locate(&BigUint::from(0u32));
        bitfield.load_page(owner, key.clone(), stored);

        assert!(bitfield.is_set(&owner, &BigUint::from(5u32)));
        assert!(bitfield.is_set(&owner, &BigUint::from(9u32)));
        assert_eq!(bitfield.page(&owner, &key).map(OtsPage::count), Some(2));
    }

    #[test]
    fn test_page_bytes_layout() {
        let mut page = OtsPage::default();
        page.set(0);
        page.set(9);
        assert_eq!(page.as_bytes()[0], 0b0000_0001);
        assert_eq!(page.as_bytes()[1], 0b0000_0010);
        assert_eq!(OtsPage::from_bytes(page.as_bytes()), Some(page));
        assert_eq!(OtsPage::from_bytes(&[0u8; 3]), None);
    }

    #[test]
    fn test_key_index_from_signature() {
        assert_eq!(ots_key_index(&[0, 0, 4, 1, 0xff]), Some(BigUint::from(1025u32)));
        assert_eq!(ots_key_index(&[1, 2]), None);
    }
}
