pub mod handlers;
mod scheduler;
mod service;

pub use scheduler::PurgeScheduler;
pub use service::{PurgeReport, PurgeService};
