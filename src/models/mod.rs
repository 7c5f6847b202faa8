pub mod bar;
pub mod phase;
pub mod signal;
