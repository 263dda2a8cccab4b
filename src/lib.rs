//! # crawlq
//!
//! Bounded job queue for URL analysis.
//!
//! URLs are admitted into a fixed-capacity in-memory buffer (rejected
//! immediately when it is full), processed by a fixed pool of workers, and
//! every status transition and final result is written through a
//! [`storage::ResultStore`], backed by Postgres ([`db::Db`]) in production.

pub mod analyzer;
pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod queue;
pub mod storage;
pub mod telemetry;

pub use error::{Error, Result};
