// Library interface for newsping modules
// This allows tests and other binaries to import modules

pub mod compose;
pub mod dispatch;
pub mod selection;
