//! Adapter registry, dispatcher and fee engine.
//!
//! This crate provides:
//! - The [`Aggregator`]: adapter registry, operation dispatcher and owner controls
//! - Basis-point fee accounting per token
//! - A lifecycle event log
//! - An async service handle for sharing one aggregator between tasks

/// Prelude module for convenient imports.
pub mod prelude;

/// Registry, dispatcher and owner controls.
pub mod aggregator;
/// Aggregator configuration.
pub mod config;
/// Fee rate and collected-fee ledger.
pub mod fees;
/// Reentrancy protection.
pub mod guard;
/// Lifecycle events.
pub mod lifecycle;
/// Shared async handle.
pub mod service;

pub use aggregator::{Aggregator, VERSION};
pub use config::{AggregatorConfig, DEFAULT_FEE_RATE_BPS};
pub use fees::FeeEngine;
pub use guard::ReentrancyGuard;
pub use service::AggregatorService;
