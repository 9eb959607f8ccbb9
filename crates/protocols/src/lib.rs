//! Ledger environment, reference backends and protocol adapters.
//!
//! This crate provides:
//! - An in-memory chain with a token ledger and a clock
//! - Reference backends for each supported family
//! - The [`ProtocolAdapter`] contract
//! - One adapter per backend family:
//!   - fungible receipts (lending, exchange-rate, vault)
//!   - range positions
//!   - swaps

/// Uniform adapter contract.
pub mod adapter;
/// Ledger, backends registry and clock.
pub mod chain;
/// Backend errors.
pub mod error;
/// Exchange-rate money market.
pub mod exchange_rate;
/// Fungible-receipt adapter.
pub mod fungible;
/// Rebasing lending pool.
pub mod lending;
/// Range-position manager and adapter.
pub mod range;
/// Swap router and adapter.
pub mod swap;
/// Share vault.
pub mod vault;

pub use adapter::ProtocolAdapter;
pub use chain::{Backend, Chain, TokenLedger};
pub use error::{BackendError, BackendResult};
pub use exchange_rate::ExchangeRateMarket;
pub use fungible::{FungibleAdapter, ReceiptMarket};
pub use lending::LendingPool;
pub use range::{PositionManager, RangeAdapter, RangeAdapterConfig};
pub use swap::{SwapAdapter, SwapRouter};
pub use vault::ShareVault;
