//! Token secrets and the coordinator-owned token state.

pub mod secret;
pub mod state;
