// src/lib.rs

//! ChameleonDB
//!
//! A schema-governed migration platform for PostgreSQL. Schema changes are
//! merged from an ordered set of source files, hashed, and registered into a
//! content-addressed Schema Vault before any DDL touches the database, so
//! every applied migration traces back to an immutable, tamper-evident
//! snapshot.
//!
//! # Architecture
//!
//! - Vault-first: every registered schema version is an immutable,
//!   content-addressed snapshot; the manifest only ever appends.
//! - Separation of concerns: the Schema Vault records *what was approved*,
//!   the State Tracker records *what was actually applied to the database*.
//!   A crash between the two never corrupts either.
//! - Paranoid Mode: a ranked authorization state machine gates write access
//!   independently of filesystem or database permissions.
//! - External collaborators: schema parsing/type-checking and DDL generation
//!   are consumed through traits (`schema_source`), not implemented here.

pub mod attribution;
pub mod config;
mod error;
pub mod executor;
pub mod hash;
pub mod journal;
pub mod lock;
pub mod merger;
pub mod mode;
pub mod orchestrator;
pub mod schema_source;
pub mod state;
pub mod vault;

pub use error::{Error, ModeDeniedReason, Result};
