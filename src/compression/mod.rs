pub mod vbyte;
pub mod delta;
