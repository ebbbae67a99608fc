//! # Tessera Testkit
//!
//! Test utilities for Tessera.
//!
//! This crate provides:
//! - Test fixtures: a sample `users` store and databases over temporary
//!   engines
//! - Property-based test generators using proptest
//! - A model-checking harness that mirrors store writes in memory
//!
//! ## Usage
//!
//! ```rust
//! use tessera_testkit::prelude::*;
//!
//! with_temp_db(|db| {
//!     let users = db.store("users").unwrap();
//!     users.insert(&user("1", "a@b.com")).unwrap();
//!     assert_eq!(users.count().unwrap(), 1);
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod integration;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
}

pub use fixtures::*;
pub use generators::*;
pub use integration::*;
