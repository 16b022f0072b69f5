//! Record model and storage abstraction over the shared session store.

/// In-memory store implementation with feed publication.
pub mod memory;
/// Shared row shapes and partial-update payloads.
pub mod models;
/// Backend-agnostic storage errors.
pub mod storage;
/// The `RecordStore` trait consumed by every service.
pub mod store;
