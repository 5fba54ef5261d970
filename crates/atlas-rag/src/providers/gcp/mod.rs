//! Google Cloud Storage backend

pub mod gcs_store;

pub use gcs_store::GcsBlobStore;
