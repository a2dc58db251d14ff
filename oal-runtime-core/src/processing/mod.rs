pub mod convert;
pub mod mixer;
pub mod ring_buffer;
pub mod spatializer;
