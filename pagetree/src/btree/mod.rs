//! File-backed B+Tree.
//!
//! # Structure
//!
//! The tree consists of:
//! - Internal pages: `n` keys and `n + 1` child page numbers
//! - Leaf pages: keys and their `u64` payloads
//!
//! Leaves are not linked; cursors walk the tree with an explicit path from
//! the root.
//!
//! # Usage
//!
//! ```no_run
//! use pagetree::{BTree, StoreConfig};
//!
//! # fn main() -> Result<(), pagetree::BTreeError> {
//! let mut tree: BTree<u64> = BTree::open("ids.idx".as_ref(), StoreConfig::default())?;
//! tree.insert(&42, 7)?;
//! assert_eq!(tree.get(&42)?, Some(7));
//!
//! for entry in tree.cursor()? {
//!     let (key, value) = entry?;
//!     println!("{key} -> {value}");
//! }
//! # Ok(())
//! # }
//! ```

mod node;
mod tree;

pub use node::{BTreePage, NodeError, NodeLayout};
pub use tree::{BTree, BTreeError, Cursor, ROOT};
