// Command line access to tree files with `u64` keys.
//
//   pagetree fill <path> <count> [seed]   insert <count> random keys
//   pagetree scan <path>                  print every entry in key order
//   pagetree check <path>                 verify the tree structure
//
// Storage settings come from the PAGETREE_* environment variables.

use std::path::Path;

use pagetree::{BTree, BTreeError, StoreConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "usage: pagetree <fill <path> <count> [seed] | scan <path> | check <path>>";

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pagetree=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match StoreConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    tracing::debug!(
        page_size = config.page_size,
        reserve_size = config.reserve_size,
        pages_max_count = config.pages_max_count,
        eviction = ?config.eviction,
        backing = ?config.backing,
        "loaded configuration"
    );

    let args: Vec<String> = std::env::args().skip(1).collect();
    let args: Vec<&str> = args.iter().map(String::as_str).collect();

    let result = match args.as_slice() {
        ["fill", path, count] => parse_u64(count).map(|count| fill(path, config, count, 0)),
        ["fill", path, count, seed] => parse_u64(count)
            .and_then(|count| parse_u64(seed).map(|seed| (count, seed)))
            .map(|(count, seed)| fill(path, config, count, seed)),
        ["scan", path] => Ok(scan(path, config)),
        ["check", path] => Ok(check(path, config)),
        _ => Err(USAGE.to_string()),
    };

    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::error!("{e}");
            std::process::exit(1);
        }
        Err(message) => {
            tracing::error!("{message}");
            std::process::exit(2);
        }
    }
}

fn parse_u64(text: &str) -> Result<u64, String> {
    text.parse()
        .map_err(|e| format!("'{text}' is not a number: {e}"))
}

fn fill(path: &str, config: StoreConfig, count: u64, seed: u64) -> Result<(), BTreeError> {
    let mut tree: BTree<u64> = BTree::open(Path::new(path), config)?;
    let mut rng = StdRng::seed_from_u64(seed);

    let start = tree.page_count();
    for value in 0..count {
        let key: u64 = rng.random_range(0..u64::MAX);
        tree.insert(&key, value)?;
    }
    tree.flush()?;

    tracing::info!(
        path,
        inserted = count,
        pages_added = tree.page_count() - start,
        "filled tree"
    );
    Ok(())
}

fn scan(path: &str, config: StoreConfig) -> Result<(), BTreeError> {
    let mut tree: BTree<u64> = BTree::open(Path::new(path), config)?;

    let mut entries = 0_u64;
    for entry in tree.cursor()? {
        let (key, value) = entry?;
        println!("{key}\t{value}");
        entries += 1;
    }

    tracing::info!(path, entries, "scanned tree");
    Ok(())
}

fn check(path: &str, config: StoreConfig) -> Result<(), BTreeError> {
    let mut tree: BTree<u64> = BTree::open(Path::new(path), config)?;

    if tree.check()? {
        tracing::info!(path, pages = tree.page_count(), "tree is consistent");
        Ok(())
    } else {
        Err(BTreeError::Corrupt {
            page: pagetree::btree::ROOT,
            reason: "structure check failed, see warnings above".to_string(),
        })
    }
}
