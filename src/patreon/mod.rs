//! Patreon remote API integration: JSON:API document types, the HTTP
//! client, and the unified resource-to-row mapping.

pub mod client;
pub mod mapping;
pub mod resource;

pub use client::{Identity, PatreonApi, PatreonClient, PatreonError, TokenResponse};
