//! Key-value cache clients for externally persisted session state.
//!
//! This crate provides the storage seam the session layer is built on:
//! - [`CacheClient`], an async get / set-with-expiry / delete interface
//! - [`MemcachedClient`], a memcached text-protocol client over one TCP connection
//! - [`MemoryCache`], an in-process implementation for tests and single-node runs
//!
//! # Example
//!
//! ```rust,ignore
//! use sessmesh_cache::{CacheClient, Expiry, MemcachedClient};
//!
//! let cache = MemcachedClient::connect("127.0.0.1:11211", Duration::from_secs(2)).await?;
//! cache.set("greeting", Expiry::Never, b"hello").await?;
//! assert_eq!(cache.get("greeting").await?, Some(b"hello".to_vec()));
//! ```

mod client;
mod error;
mod memcached;
mod memory;

pub use client::{CacheClient, Expiry, MAX_KEY_LEN, validate_key};
pub use error::{CacheError, Result};
pub use memcached::MemcachedClient;
pub use memory::MemoryCache;
