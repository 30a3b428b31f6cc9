pub mod memory;
pub mod store;

pub use memory::{InMemoryCacheStore, InMemoryCacheStoreRepo};
pub use store::{CacheStore, CacheStoreRepo};
