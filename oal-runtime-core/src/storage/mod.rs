pub mod buffer;
pub mod settings;
pub mod streaming;
