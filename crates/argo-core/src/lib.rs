//! # Argo Core
//!
//! Shared, I/O-free logic for Argo Harness: the archive abstraction,
//! scalar/array extraction, profile assembly, the oceanographic feature
//! engine, the index document composer and the index store trait.
//!
//! This crate contains no tokio, sqlx, NetCDF bindings or filesystem I/O.
//! The application crate plugs a NetCDF reader in behind [`archive::Archive`]
//! and a SQLite backend in behind [`store::IndexStore`].

pub mod archive;
pub mod assemble;
pub mod compose;
pub mod embedding;
pub mod extract;
pub mod features;
pub mod store;
