pub mod auth;
pub mod client;
mod mapper;

pub use auth::TokenProvider;
pub use client::GitHubClient;
