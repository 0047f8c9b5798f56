//! Core types for BasaltDB.

mod ids;

pub use ids::PageId;
