//! # Patreonizer API Library
//!
//! This library provides the core functionality for the Patreonizer
//! service: the Patreon API client, the sync orchestrator, webhook
//! ingestion, persistence repositories, and the HTTP server.

pub mod auth;
pub mod config;
pub mod crypto;
pub mod cursor;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod patreon;
pub mod repositories;
pub mod server;
pub mod sync;
pub mod telemetry;
pub mod webhook_verification;
pub use migration;
