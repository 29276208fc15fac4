pub mod client;
pub mod issues;

pub use client::GitHubBacklog;
