//! Bearer token ownership: token models, the refresh contract, and the single-flight
//! [`TokenCoordinator`].

pub mod coordinator;
pub mod refresh;
pub mod token;

mod metrics;

pub use coordinator::*;
pub use metrics::*;
pub use refresh::*;
pub use token::{secret::*, state::*};
