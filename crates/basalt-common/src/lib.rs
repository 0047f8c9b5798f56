//! # basalt-common
//!
//! Common types and constants for BasaltDB.
//!
//! This crate provides the foundational pieces shared by the storage
//! engine components:
//!
//! - **Types**: core identifiers (`PageId`)
//! - **Constants**: page geometry and buffer pool defaults
//!
//! ## Example
//!
//! ```rust
//! use basalt_common::types::PageId;
//! use basalt_common::constants::PAGE_SIZE;
//!
//! let page = PageId::new(42);
//! assert!(page.is_valid());
//! assert_eq!(PAGE_SIZE, 4096);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod constants;
pub mod types;

// Re-export commonly used items at the crate root
pub use constants::*;
pub use types::PageId;
