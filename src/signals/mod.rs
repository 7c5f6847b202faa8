pub mod accumulation;
pub mod breakout;
pub mod features;
pub mod silent;
pub mod trap;
