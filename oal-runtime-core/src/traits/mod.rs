pub mod hardware_input;
pub mod hardware_output;
pub mod sample_converter;
