//! Key authority client and the relying-side validater cache

mod cache;
mod client;

pub use cache::{
    CacheConfig, DEFAULT_MAX_SIZE, DEFAULT_TTL, ValidatorCache, ValidatorCacheBuilder, extract_kid,
};
pub use client::{
    CONTENT_TYPE_JSON, CONTENT_TYPE_PEM, ClientConfig, DEFAULT_ADDRESS, DEFAULT_SCHEME,
    DEFAULT_TIMEOUT, KeyListResponse, KeySetClient, PATH_BASE, PATH_KEY, PATH_SET,
};
