pub mod client;
pub mod config;
pub mod manager;
pub mod messages;
pub mod notifications;
pub mod watcher;

pub use client::*;
pub use config::*;
pub use manager::*;
pub use messages::*;
pub use notifications::*;
