pub mod artifacts;
pub mod close;
pub mod context;
pub mod eligibility;
pub mod evidence;
pub mod feedback;
pub mod patch;
pub mod prompt;
pub mod repair;
pub mod reply;
