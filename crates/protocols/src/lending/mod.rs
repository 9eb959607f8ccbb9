//! Lending backend with a rebasing receipt token.

/// Reference lending pool.
pub mod pool;

pub use pool::{LendingPool, ray};
