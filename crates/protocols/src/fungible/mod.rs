//! Adapters over backends that issue a fungible receipt asset.
//!
//! Lending pools (rebasing receipt), exchange-rate markets and share vaults all implement
//! [`ReceiptMarket`]; a single [`FungibleAdapter`] drives any of them.

/// Generic fungible-receipt adapter.
pub mod adapter;
/// Backend seam.
pub mod market;

pub use adapter::FungibleAdapter;
pub use market::ReceiptMarket;
