//! # Argo Harness
//!
//! Ingests Argo float NetCDF archives into SQLite, derives per-profile
//! oceanographic features and publishes one searchable document per
//! profile into an index store.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────┐
//! │ NetCDF floats│──▶│  Assembler   │──▶│  SQLite   │
//! │ meta + prof  │   │ (argo-core)  │   │ floats/…  │
//! └──────────────┘   └──────────────┘   └────┬─────┘
//!                                            │
//!                     ┌──────────────────────┘
//!                     ▼
//!              ┌──────────────┐   ┌──────────────┐
//!              │ Features +   │──▶│ Index store  │
//!              │ Composer     │   │ (+ vectors)  │
//!              └──────────────┘   └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! argo init                       # create database
//! argo ingest ./data/argo         # one sub-directory per float
//! argo index                      # compose (and embed) profile documents
//! argo search "winter thermocline arabian sea"
//! argo stats
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |
//! | [`netcdf_archive`] | NetCDF reader behind the core `Archive` trait |
//! | [`writer`] | Transactional per-float writes |
//! | [`ingest`] | Float discovery and the ingest pipeline |
//! | [`index`] | Feature extraction and document publishing |
//! | [`sqlite_store`] | SQLite index store |
//! | [`embedding`] | OpenAI / Ollama embedding providers |
//! | [`geocode`] | Reverse geocoding with a run-scoped cache |
//! | [`search`] | Vector or keyword search over index documents |
//! | [`stats`] | Row counts |

pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod geocode;
pub mod index;
pub mod ingest;
pub mod migrate;
pub mod netcdf_archive;
pub mod progress;
pub mod search;
pub mod sqlite_store;
pub mod stats;
pub mod writer;
