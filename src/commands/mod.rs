// ABOUTME: Command implementations for the connector CLI
// ABOUTME: Exports run, validate and checkpoint commands

pub mod checkpoint;
pub mod run;
pub mod validate;

pub use checkpoint::command as checkpoint;
pub use run::run;
pub use validate::validate;
