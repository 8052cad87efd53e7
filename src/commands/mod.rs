pub mod process;
pub mod providers;

// Re-export command functions for convenience
pub use process::{process, ProcessArgs};
pub use providers::providers;
