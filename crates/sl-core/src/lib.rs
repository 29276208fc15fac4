pub mod admission;
pub mod cache;
pub mod config;
pub mod conflict;
pub mod deps;
pub mod error;
pub mod events;
pub mod scheduler;
pub mod store;
pub mod types;
pub mod workers;
