pub mod config;
pub mod error;
pub mod format;
pub mod listener;
pub mod source;
pub mod state;
