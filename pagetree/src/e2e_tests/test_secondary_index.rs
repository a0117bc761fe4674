//! Test a record counter with several indices over it, each keyed by a
//! different combination of record fields and holding record ids.

use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};

use crate::codec::{FixedWidth, padded, unpadded};
use crate::e2e_tests::helpers::*;
use crate::{BTree, Counter};

const NAME_WIDTH: usize = 16;
const NOTE_WIDTH: usize = 64;

/// A fixed-width record: one category byte, a name and a free-form note.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Entity {
    category: u8,
    name: [u8; NAME_WIDTH],
    note: [u8; NOTE_WIDTH],
}

impl FixedWidth for Entity {
    const WIDTH: usize = 1 + NAME_WIDTH + NOTE_WIDTH;

    fn encode(&self, out: &mut [u8]) {
        out[0] = self.category;
        out[1..=NAME_WIDTH].copy_from_slice(&self.name);
        out[1 + NAME_WIDTH..Self::WIDTH].copy_from_slice(&self.note);
    }

    fn decode(bytes: &[u8]) -> Self {
        Self {
            category: bytes[0],
            name: <[u8; NAME_WIDTH]>::decode(&bytes[1..=NAME_WIDTH]),
            note: <[u8; NOTE_WIDTH]>::decode(&bytes[1 + NAME_WIDTH..Self::WIDTH]),
        }
    }
}

type ByCategory = ([u8; 1], [u8; NAME_WIDTH]);
type ByName = ([u8; NAME_WIDTH], [u8; 1]);

fn random_entities(count: usize, seed: u64) -> Vec<Entity> {
    const SYLLABLES: [&str; 8] = ["ka", "lo", "mi", "ru", "sen", "ta", "vo", "zi"];
    let mut rng = StdRng::seed_from_u64(seed);

    (0..count)
        .map(|n| {
            let length = rng.random_range(2..=5);
            let name: String = (0..length)
                .filter_map(|_| SYLLABLES.choose(&mut rng).copied())
                .collect();
            let note = format!("entity {n} named {name}");
            Entity {
                category: rng.random_range(b'a'..=b'e'),
                name: padded(name.as_bytes()),
                note: padded(note.as_bytes()),
            }
        })
        .collect()
}

#[test]
fn test_indices_over_counter() {
    let dir = TestDir::new();
    let config = small_pages().with_page_size(1024);

    let mut entities: Counter<Entity> =
        Counter::open(&dir.path("entities.cnt"), config).expect("open counter");
    let mut by_category: BTree<ByCategory> =
        BTree::open(&dir.path("by_category.idx"), config).expect("open index");
    let mut by_name: BTree<ByName> =
        BTree::open(&dir.path("by_name.idx"), config).expect("open index");
    let mut by_note: BTree<[u8; NOTE_WIDTH]> =
        BTree::open(&dir.path("by_note.idx"), config).expect("open index");

    let generated = random_entities(1200, 2024);
    entities.reserve(generated.len() as u64).expect("reserve");
    for entity in &generated {
        let id = entities.append(entity).expect("append");
        by_category
            .insert(&([entity.category], entity.name), id)
            .expect("insert");
        by_name
            .insert(&(entity.name, [entity.category]), id)
            .expect("insert");
        by_note.insert(&entity.note, id).expect("insert");
    }
    assert_eq!(entities.len(), generated.len() as u64);

    assert!(by_category.check().expect("check"));
    assert!(by_name.check().expect("check"));
    assert!(by_note.check().expect("check"));

    // Every index lists every record once, in key order, pointing at the
    // record it was built from.
    let category_rows = scan(&mut by_category);
    assert_eq!(category_rows.len(), generated.len());
    assert!(category_rows.windows(2).all(|pair| pair[0].0 <= pair[1].0));
    for ((category, name), id) in &category_rows {
        let entity = entities.get(*id).expect("get").expect("record exists");
        assert_eq!((entity.category, entity.name), (category[0], *name));
    }

    let name_rows = scan(&mut by_name);
    assert_eq!(name_rows.len(), generated.len());
    assert!(name_rows.windows(2).all(|pair| pair[0].0 <= pair[1].0));
    for ((name, category), id) in &name_rows {
        let entity = entities.get(*id).expect("get").expect("record exists");
        assert_eq!((entity.name, entity.category), (*name, category[0]));
    }

    // Notes are unique, so the note index is a plain lookup table.
    for (n, entity) in generated.iter().enumerate() {
        let id = by_note.get(&entity.note).expect("get").expect("indexed");
        assert_eq!(id, n as u64 + 1);
    }
    let mut note_ids: Vec<u64> = scan(&mut by_note).into_iter().map(|(_, id)| id).collect();
    note_ids.sort_unstable();
    assert_eq!(note_ids, (1..=generated.len() as u64).collect::<Vec<_>>());
}

#[test]
fn test_browse_one_category() {
    let dir = TestDir::new();
    let config = small_pages().with_page_size(1024);
    let mut entities: Counter<Entity> =
        Counter::open(&dir.path("entities.cnt"), config).expect("open counter");
    let mut by_category: BTree<ByCategory> =
        BTree::open(&dir.path("by_category.idx"), config).expect("open index");

    let generated = random_entities(600, 9);
    for entity in &generated {
        let id = entities.append(entity).expect("append");
        by_category
            .insert(&([entity.category], entity.name), id)
            .expect("insert");
    }

    let mut expected: Vec<String> = generated
        .iter()
        .filter(|entity| entity.category == b'c')
        .map(|entity| String::from_utf8_lossy(unpadded(&entity.name)).into_owned())
        .collect();
    expected.sort();

    let browsed: Vec<String> = scan(&mut by_category)
        .into_iter()
        .filter(|((category, _), _)| category[0] == b'c')
        .map(|((_, name), _)| String::from_utf8_lossy(unpadded(&name)).into_owned())
        .collect();

    assert!(!browsed.is_empty());
    assert_eq!(browsed, expected);
}
