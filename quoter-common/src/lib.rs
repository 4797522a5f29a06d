//! Shared models, wire types and helpers of the quoter workspace.
pub mod display;
pub mod dto;
pub mod models;
pub mod serde_primitives;

pub use alloy_primitives::{Address, U256};
