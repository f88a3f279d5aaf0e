//! The Postgres-backed half of the bot-config registry (spec §6).
//!
//! A deployment runs against either this crate's `DbRepository` or
//! `configuration::bots_file`'s flat-file registry, selected by whether
//! `storage.database_url` is set — `supervisor` treats the two as
//! interchangeable sources of truth for `BotConfig` rows.
//!
//! - **Layer 3 adapter:** encapsulates all database-specific logic behind
//!   a small, typed API; no SQL leaks past this crate.
//! - **Runtime-checked queries:** uses `sqlx::query`/`sqlx::query_as`
//!   rather than the `query!`/`query_as!` macros, since those require a
//!   live database reachable at compile time.
//! - **Asynchronous & pooled:** every operation runs against a shared
//!   `PgPool`.

pub mod connection;
pub mod error;
pub mod repository;

pub use connection::{connect, run_migrations};
pub use error::DbError;
pub use repository::DbRepository;
