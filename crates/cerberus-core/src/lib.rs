//! # Cerberus Core
//!
//! The challenge/approval state machine behind the Cerberus gate: per-client
//! challenge derivation, single-use answer signing, approval issuance, and
//! the sharded TTL caches that keep the whole thing bounded in memory.
//!
//! ## Modules
//! - `ipblock` - 64-bit IP prefix aggregation keys
//! - `expiremap` - sharded TTL-bound map used by all caches
//! - `randpool` - batched cryptographic nonce source
//! - `challenge` - fingerprint hashing and answer signatures
//! - `state` / `instance` / `registry` - long-lived per-instance state
//! - `token` - EdDSA approval cookies

pub mod challenge;
pub mod config;
pub mod constants;
pub mod error;
pub mod expiremap;
pub mod instance;
pub mod ipblock;
pub mod keys;
pub mod randpool;
pub mod registry;
pub mod state;
pub mod token;

pub use config::Config;
pub use error::CerberusError;
pub use instance::Instance;
pub use ipblock::{IpBlock, PrefixConfig};
pub use registry::Registry;
pub use state::InstanceState;
