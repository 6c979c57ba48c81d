//! Multi-connection management

mod manager;

pub use manager::{ConnectionManager, ManagerMetrics};
