pub mod pending;
pub mod registry;
pub mod replay;
pub mod state;
pub mod step;
