pub mod handlers;
pub mod models;
mod service;

pub use service::{UploadService, VECTOR_STORE_PREFIX};
