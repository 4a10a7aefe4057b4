pub mod git;
pub mod manager;

pub use manager::{ScratchFile, Workspace};
