pub mod wire;
pub mod types;
pub mod tags;

pub mod client;
pub use client::{MpdClient, IDLE_SUBSYSTEMS};
