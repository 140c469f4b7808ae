//! Database module: row models and SQL repositories for tag groups.
//!
//! - `model`: row structs exactly as stored, converted into domain types.
//! - `repo`: SQL-only functions; every write is a single atomic statement or
//!   transaction so concurrent handlers for the same chat cannot interleave.
//!
//! Callers import from `tg_tagbot::db`; the repository API is re-exported.

pub mod model;
pub mod repo;

pub use repo::*;
