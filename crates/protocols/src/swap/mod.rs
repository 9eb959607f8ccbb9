//! Exact-input swaps.

/// Swap adapter.
pub mod adapter;
/// Reference router.
pub mod router;

pub use adapter::SwapAdapter;
pub use router::{SwapRouter, rate_one};
