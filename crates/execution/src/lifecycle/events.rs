//! Lifecycle events emitted by the aggregator.

use chrono::{DateTime, Utc};
use defi_agg_domain::{Address, PositionId, TokenAmount};
use serde::{Deserialize, Serialize};

/// Type of lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleEventType {
    /// Net amount supplied to a fungible backend.
    Deposited,
    /// Proceeds of a fungible withdrawal forwarded to the recipient.
    Withdrawn,
    /// Fee withheld on an operation.
    FeeCollected,
    /// Fee rate changed by the owner.
    FeeRateChanged,
    /// Adapter bound to a name.
    AdapterRegistered,
    /// Adapter binding cleared.
    AdapterRemoved,
    /// Range position minted.
    PositionOpened,
    /// Range position fully removed.
    PositionClosed,
    /// Trading yield harvested from a range position.
    YieldCollected,
    /// Swap executed.
    Swapped,
    /// Collected fees paid out to the owner.
    FeesWithdrawn,
    /// Ownership handed to a new identity.
    OwnershipTransferred,
}

/// A lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    /// Event ID.
    pub id: String,
    /// Event type.
    pub event_type: LifecycleEventType,
    /// Identity the event is attributed to.
    pub user: Address,
    /// Adapter involved, if any.
    pub adapter: Option<String>,
    /// Ledger time of the request that emitted the event.
    pub timestamp: DateTime<Utc>,
    /// Event-specific data.
    pub data: EventData,
}

impl LifecycleEvent {
    /// Creates a new lifecycle event at ledger time `now` (seconds).
    pub fn new(user: Address, now: u64, data: EventData) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            event_type: data.event_type(),
            user,
            adapter: None,
            timestamp: ledger_time(now),
            data,
        }
    }

    /// Attributes the event to an adapter.
    #[must_use]
    pub fn with_adapter(mut self, adapter: impl Into<String>) -> Self {
        self.adapter = Some(adapter.into());
        self
    }
}

/// Converts a ledger timestamp to UTC, falling back to the epoch when out of range.
fn ledger_time(now: u64) -> DateTime<Utc> {
    i64::try_from(now)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .unwrap_or_default()
}

/// Event-specific data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventData {
    Deposited(DepositedData),
    Withdrawn(WithdrawnData),
    FeeCollected(FeeCollectedData),
    FeeRateChanged(FeeRateChangedData),
    AdapterRegistered(AdapterRegisteredData),
    AdapterRemoved(AdapterRemovedData),
    PositionOpened(PositionOpenedData),
    PositionClosed(PositionClosedData),
    YieldCollected(YieldCollectedData),
    Swapped(SwappedData),
    FeesWithdrawn(FeesWithdrawnData),
    OwnershipTransferred(OwnershipTransferredData),
}

impl EventData {
    pub fn event_type(&self) -> LifecycleEventType {
        match self {
            Self::Deposited(_) => LifecycleEventType::Deposited,
            Self::Withdrawn(_) => LifecycleEventType::Withdrawn,
            Self::FeeCollected(_) => LifecycleEventType::FeeCollected,
            Self::FeeRateChanged(_) => LifecycleEventType::FeeRateChanged,
            Self::AdapterRegistered(_) => LifecycleEventType::AdapterRegistered,
            Self::AdapterRemoved(_) => LifecycleEventType::AdapterRemoved,
            Self::PositionOpened(_) => LifecycleEventType::PositionOpened,
            Self::PositionClosed(_) => LifecycleEventType::PositionClosed,
            Self::YieldCollected(_) => LifecycleEventType::YieldCollected,
            Self::Swapped(_) => LifecycleEventType::Swapped,
            Self::FeesWithdrawn(_) => LifecycleEventType::FeesWithdrawn,
            Self::OwnershipTransferred(_) => LifecycleEventType::OwnershipTransferred,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositedData {
    pub token: Address,
    /// Amount supplied to the backend after the fee.
    pub net_amount: TokenAmount,
    pub fee: TokenAmount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawnData {
    pub token: Address,
    /// Amount the backend redeemed.
    pub gross_amount: TokenAmount,
    /// Amount delivered to the recipient.
    pub net_amount: TokenAmount,
    pub fee: TokenAmount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeCollectedData {
    pub token: Address,
    pub fee: TokenAmount,
    /// Operation label, e.g. `deposit`.
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeRateChangedData {
    pub old_bps: u32,
    pub new_bps: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterRegisteredData {
    pub name: String,
    pub address: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterRemovedData {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionOpenedData {
    pub position_id: PositionId,
    pub tokens: Vec<Address>,
    /// Net amounts supplied to the position.
    pub amounts: Vec<TokenAmount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionClosedData {
    pub position_id: PositionId,
    /// Amounts paid to the recipient.
    pub amounts: Vec<TokenAmount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YieldCollectedData {
    pub position_id: PositionId,
    pub amounts: Vec<TokenAmount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwappedData {
    pub token_in: Address,
    pub token_out: Address,
    pub amount_in: TokenAmount,
    pub amount_out: TokenAmount,
    pub fee: TokenAmount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeesWithdrawnData {
    pub to: Address,
    pub amounts: Vec<(Address, TokenAmount)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipTransferredData {
    pub previous_owner: Address,
    pub new_owner: Address,
}
