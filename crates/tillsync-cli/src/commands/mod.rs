pub mod common;
pub mod completions;
pub mod reset;
pub mod status;
pub mod sync;
pub mod watch;
