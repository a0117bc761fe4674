//! Test wide keys whose ordering differs from their byte order: multiples of
//! ten spelled out in English, ordered by numeric value.

use crate::e2e_tests::helpers::*;
use crate::{BTree, StoreConfig};

fn assert_numeric_order(tree: &mut BTree<SpelledNumber>, expected_len: usize) {
    let entries = scan(tree);
    assert_eq!(entries.len(), expected_len);
    for pair in entries.windows(2) {
        assert!(
            pair[0].0.value < pair[1].0.value,
            "'{}' sorted before '{}'",
            pair[0].0.text(),
            pair[1].0.text()
        );
    }
    for (key, value) in &entries {
        assert_eq!(u64::from(key.value), *value);
        assert_eq!(key.text(), number_to_words(key.value));
    }
}

#[test]
fn test_multiples_of_ten() {
    let dir = TestDir::new();
    let mut tree: BTree<SpelledNumber> =
        BTree::open(&dir.path("numbers.idx"), StoreConfig::default()).expect("open");
    assert_eq!(tree.max_keys_count(), 15);

    for (inserted, number) in (10..=200).step_by(10).enumerate() {
        let key = SpelledNumber::new(number);
        tree.insert(&key, u64::from(number)).expect("insert");

        assert!(tree.check().expect("check"), "after inserting '{}'", key.text());
        assert_numeric_order(&mut tree, inserted + 1);
    }

    assert!(tree.page_count() > 1, "twenty keys do not fit in one page");
    let first = scan(&mut tree).first().map(|(key, _)| key.text().to_string());
    assert_eq!(first.as_deref(), Some("ten"));
    assert_eq!(
        tree.get(&SpelledNumber::new(150)).expect("get"),
        Some(150)
    );
    assert_eq!(tree.get(&SpelledNumber::new(155)).expect("get"), None);
}

#[test]
fn test_spelled_numbers_in_shuffled_order() {
    let dir = TestDir::new();
    let mut tree: BTree<SpelledNumber> =
        BTree::open(&dir.path("numbers.idx"), StoreConfig::default()).expect("open");

    let order = shuffled(400, 5);
    for &n in &order {
        let number = u32::try_from(n * 10).expect("fits in u32");
        tree.insert(&SpelledNumber::new(number), u64::from(number))
            .expect("insert");
    }

    assert!(tree.check().expect("check"));
    assert_numeric_order(&mut tree, order.len());
}
