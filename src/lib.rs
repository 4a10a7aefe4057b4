pub mod config;
pub mod error;
pub mod inference;
pub mod pipeline;
pub mod platform;
pub mod queue;
pub mod server;
pub mod shutdown;
pub mod store;
pub mod webhook;
pub mod workspace;

#[cfg(test)]
mod testing;
