//! # basalt-trie
//!
//! An immutable, structurally shared trie with copy-on-write mutation,
//! plus a snapshot-based concurrent store.
//!
//! [`Trie`] never mutates in place: `put` and `remove` return a new root
//! that shares every untouched subtree with the old one, so an existing
//! handle is a stable snapshot forever. [`TrieStore`] layers the
//! single-writer / many-reader discipline on top: readers grab a snapshot
//! under a short root lock and then search without blocking anyone, while
//! writers serialize among themselves on a separate write lock.
//!
//! ## Example
//!
//! ```rust
//! use basalt_trie::Trie;
//!
//! let empty: Trie<u32> = Trie::new();
//! let one = empty.put("answer", 42);
//! assert_eq!(one.get("answer"), Some(&42));
//! // The original snapshot is untouched.
//! assert_eq!(empty.get("answer"), None);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod store;
mod trie;

pub use store::{TrieStore, ValueGuard};
pub use trie::Trie;
