//! Common helpers for end-to-end tests.

use std::cmp::Ordering;
use std::path::PathBuf;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tempfile::TempDir;

use crate::codec::{FixedWidth, padded, unpadded};
use crate::{BTree, StoreConfig};

/// Temporary directory that is removed on drop.
pub struct TestDir {
    dir: TempDir,
}

impl TestDir {
    #[must_use]
    pub fn new() -> Self {
        #[allow(clippy::expect_used)]
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        Self { dir }
    }

    /// Path of file `name` inside the directory.
    #[must_use]
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

/// 256 byte pages (14 `u64` keys each) so that small inputs build deep trees.
#[must_use]
pub fn small_pages() -> StoreConfig {
    StoreConfig::default()
        .with_page_size(256)
        .with_reserve_size(64 * 1024)
        .with_pages_max_count(8)
}

/// `0..count` in a reproducible random order.
#[must_use]
pub fn shuffled(count: u64, seed: u64) -> Vec<u64> {
    let mut keys: Vec<u64> = (0..count).collect();
    keys.shuffle(&mut StdRng::seed_from_u64(seed));
    keys
}

/// Every entry of `tree` in cursor order.
#[allow(clippy::expect_used)]
pub fn scan<K: FixedWidth + Ord>(tree: &mut BTree<K>) -> Vec<(K, u64)> {
    tree.cursor()
        .expect("Failed to open cursor")
        .collect::<Result<Vec<_>, _>>()
        .expect("Failed to scan tree")
}

/// English spelling of `number`, e.g. `"one hundred twenty-three"`.
#[must_use]
pub fn number_to_words(number: u32) -> String {
    const UNITS: [&str; 10] = [
        "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine",
    ];
    const TEENS: [&str; 10] = [
        "ten",
        "eleven",
        "twelve",
        "thirteen",
        "fourteen",
        "fifteen",
        "sixteen",
        "seventeen",
        "eighteen",
        "nineteen",
    ];
    const TENS: [&str; 10] = [
        "", "", "twenty", "thirty", "forty", "fifty", "sixty", "seventy", "eighty", "ninety",
    ];
    const SCALES: [(u32, &str); 4] = [
        (1_000_000_000, " billion"),
        (1_000_000, " million"),
        (1_000, " thousand"),
        (1, ""),
    ];

    let mut words: Vec<String> = Vec::new();
    for (scale, name) in SCALES {
        let group = (number / scale) % 1000;
        if group == 0 {
            continue;
        }

        let (hundreds, tens, units) = (group / 100, (group / 10) % 10, group % 10);
        let mut parts: Vec<String> = Vec::new();
        if hundreds > 0 {
            parts.push(format!("{} hundred", UNITS[hundreds as usize]));
        }
        match (tens, units) {
            (0, 0) => {}
            (0, u) => parts.push(UNITS[u as usize].to_string()),
            (1, u) => parts.push(TEENS[u as usize].to_string()),
            (t, 0) => parts.push(TENS[t as usize].to_string()),
            (t, u) => parts.push(format!("{}-{}", TENS[t as usize], UNITS[u as usize])),
        }
        words.push(format!("{}{name}", parts.join(" ")));
    }

    if words.is_empty() {
        UNITS[0].to_string()
    } else {
        words.join(" ")
    }
}

/// Width of the text field of a [`SpelledNumber`].
pub const SPELLED_TEXT_WIDTH: usize = 252;

/// A 256 byte key holding a number and its spelling, ordered by the number.
///
/// The spelling is stored first, so the raw bytes sort alphabetically
/// ("eighty" before "fifty") while the tree must sort numerically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpelledNumber {
    pub value: u32,
    pub text: [u8; SPELLED_TEXT_WIDTH],
}

impl SpelledNumber {
    #[must_use]
    pub fn new(value: u32) -> Self {
        Self {
            value,
            text: padded(number_to_words(value).as_bytes()),
        }
    }

    #[must_use]
    pub fn text(&self) -> &str {
        std::str::from_utf8(unpadded(&self.text)).unwrap_or("<invalid>")
    }
}

impl Ord for SpelledNumber {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value
            .cmp(&other.value)
            .then_with(|| self.text.cmp(&other.text))
    }
}

impl PartialOrd for SpelledNumber {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FixedWidth for SpelledNumber {
    const WIDTH: usize = SPELLED_TEXT_WIDTH + 4;

    fn encode(&self, out: &mut [u8]) {
        out[..SPELLED_TEXT_WIDTH].copy_from_slice(&self.text);
        out[SPELLED_TEXT_WIDTH..Self::WIDTH].copy_from_slice(&self.value.to_le_bytes());
    }

    fn decode(bytes: &[u8]) -> Self {
        let mut text = [0u8; SPELLED_TEXT_WIDTH];
        text.copy_from_slice(&bytes[..SPELLED_TEXT_WIDTH]);
        let mut value = [0u8; 4];
        value.copy_from_slice(&bytes[SPELLED_TEXT_WIDTH..Self::WIDTH]);
        Self {
            value: u32::from_le_bytes(value),
            text,
        }
    }
}

#[test]
fn test_number_to_words() {
    assert_eq!(number_to_words(0), "zero");
    assert_eq!(number_to_words(7), "seven");
    assert_eq!(number_to_words(14), "fourteen");
    assert_eq!(number_to_words(40), "forty");
    assert_eq!(number_to_words(110), "one hundred ten");
    assert_eq!(number_to_words(123), "one hundred twenty-three");
    assert_eq!(number_to_words(200), "two hundred");
    assert_eq!(number_to_words(1_005), "one thousand five");
    assert_eq!(
        number_to_words(2_000_310),
        "two million three hundred ten"
    );
}
