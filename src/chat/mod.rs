pub mod handlers;
pub mod models;
mod service;

pub use service::ChatService;
