//! In-memory execution environment: token ledger, deployed backends and a clock.
//!
//! Every request against the aggregator runs against one `Chain`. The value is cheap to
//! snapshot, which is how the dispatcher gets all-or-nothing request semantics.

/// Token balances and allowances.
pub mod ledger;

pub use ledger::TokenLedger;

use crate::error::{BackendError, BackendResult};
use crate::exchange_rate::ExchangeRateMarket;
use crate::fungible::ReceiptMarket;
use crate::lending::LendingPool;
use crate::range::PositionManager;
use crate::swap::SwapRouter;
use crate::vault::ShareVault;
use defi_agg_domain::Address;
use std::collections::HashMap;
use tracing::info;

/// A deployed reference backend.
#[derive(Debug, Clone)]
pub enum Backend {
    Lending(LendingPool),
    ExchangeRate(ExchangeRateMarket),
    Vault(ShareVault),
    PositionManager(PositionManager),
    Router(SwapRouter),
}

impl Backend {
    #[must_use]
    pub fn address(&self) -> &Address {
        match self {
            Self::Lending(pool) => ReceiptMarket::address(pool),
            Self::ExchangeRate(market) => ReceiptMarket::address(market),
            Self::Vault(vault) => ReceiptMarket::address(vault),
            Self::PositionManager(manager) => manager.address(),
            Self::Router(router) => router.address(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Lending(_) => "lending pool",
            Self::ExchangeRate(_) => "exchange-rate market",
            Self::Vault(_) => "share vault",
            Self::PositionManager(_) => "position manager",
            Self::Router(_) => "swap router",
        }
    }
}

impl From<LendingPool> for Backend {
    fn from(pool: LendingPool) -> Self {
        Self::Lending(pool)
    }
}

impl From<ExchangeRateMarket> for Backend {
    fn from(market: ExchangeRateMarket) -> Self {
        Self::ExchangeRate(market)
    }
}

impl From<ShareVault> for Backend {
    fn from(vault: ShareVault) -> Self {
        Self::Vault(vault)
    }
}

impl From<PositionManager> for Backend {
    fn from(manager: PositionManager) -> Self {
        Self::PositionManager(manager)
    }
}

impl From<SwapRouter> for Backend {
    fn from(router: SwapRouter) -> Self {
        Self::Router(router)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Chain {
    ledger: TokenLedger,
    backends: HashMap<Address, Backend>,
    /// Current block timestamp in seconds.
    timestamp: u64,
}

/// Typed accessors for one backend variant, returning the ledger alongside the mutable form
/// so callers can move tokens while the backend is borrowed.
macro_rules! backend_accessors {
    ($variant:ident, $ty:ty, $label:literal, $get:ident, $get_mut:ident) => {
        pub fn $get(&self, address: &Address) -> BackendResult<&$ty> {
            match self.backend(address)? {
                Backend::$variant(inner) => Ok(inner),
                _ => Err(BackendError::WrongBackend {
                    address: address.clone(),
                    expected: $label,
                }),
            }
        }

        pub fn $get_mut(&mut self, address: &Address) -> BackendResult<(&mut $ty, &mut TokenLedger)> {
            let backend = self
                .backends
                .get_mut(address)
                .ok_or_else(|| BackendError::NotDeployed(address.clone()))?;
            match backend {
                Backend::$variant(inner) => Ok((inner, &mut self.ledger)),
                _ => Err(BackendError::WrongBackend {
                    address: address.clone(),
                    expected: $label,
                }),
            }
        }
    };
}

impl Chain {
    /// Creates an empty chain at `timestamp`.
    #[must_use]
    pub fn new(timestamp: u64) -> Self {
        Self {
            timestamp,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn now(&self) -> u64 {
        self.timestamp
    }

    pub fn set_timestamp(&mut self, timestamp: u64) {
        self.timestamp = timestamp;
    }

    /// Moves the clock forward by `seconds`.
    pub fn advance(&mut self, seconds: u64) {
        self.timestamp = self.timestamp.saturating_add(seconds);
    }

    #[must_use]
    pub fn ledger(&self) -> &TokenLedger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut TokenLedger {
        &mut self.ledger
    }

    /// Deploys a backend at its own address.
    pub fn deploy(&mut self, backend: impl Into<Backend>) -> BackendResult<Address> {
        let backend = backend.into();
        let address = backend.address().clone();
        if self.backends.contains_key(&address) {
            return Err(BackendError::AlreadyDeployed(address));
        }
        info!(address = %address, kind = backend.kind(), "Backend deployed");
        self.backends.insert(address.clone(), backend);
        Ok(address)
    }

    pub fn backend(&self, address: &Address) -> BackendResult<&Backend> {
        self.backends
            .get(address)
            .ok_or_else(|| BackendError::NotDeployed(address.clone()))
    }

    /// A backend issuing a fungible receipt asset.
    pub fn receipt_market(&self, address: &Address) -> BackendResult<&dyn ReceiptMarket> {
        let market: &dyn ReceiptMarket = match self.backend(address)? {
            Backend::Lending(pool) => pool,
            Backend::ExchangeRate(market) => market,
            Backend::Vault(vault) => vault,
            _ => {
                return Err(BackendError::WrongBackend {
                    address: address.clone(),
                    expected: "receipt market",
                });
            }
        };
        Ok(market)
    }

    pub fn receipt_market_mut(
        &mut self,
        address: &Address,
    ) -> BackendResult<(&mut dyn ReceiptMarket, &mut TokenLedger)> {
        let backend = self
            .backends
            .get_mut(address)
            .ok_or_else(|| BackendError::NotDeployed(address.clone()))?;
        let market: &mut dyn ReceiptMarket = match backend {
            Backend::Lending(pool) => pool,
            Backend::ExchangeRate(market) => market,
            Backend::Vault(vault) => vault,
            _ => {
                return Err(BackendError::WrongBackend {
                    address: address.clone(),
                    expected: "receipt market",
                });
            }
        };
        Ok((market, &mut self.ledger))
    }

    backend_accessors!(Lending, LendingPool, "lending pool", lending_pool, lending_pool_mut);
    backend_accessors!(
        ExchangeRate,
        ExchangeRateMarket,
        "exchange-rate market",
        exchange_rate_market,
        exchange_rate_market_mut
    );
    backend_accessors!(Vault, ShareVault, "share vault", share_vault, share_vault_mut);
    backend_accessors!(
        PositionManager,
        PositionManager,
        "position manager",
        position_manager,
        position_manager_mut
    );
    backend_accessors!(Router, SwapRouter, "swap router", swap_router, swap_router_mut);
}
