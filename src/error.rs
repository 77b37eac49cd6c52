//! Error taxonomy for the venue core.
//!
//! Expected business failures (bad order shape, insufficient inventory or
//! funds, timeouts, lost cancellation races) are plain values returned to the
//! caller; infrastructure trouble surfaces as `Unavailable`.

use crate::types::{AccountId, InstrumentId, OrderId, OrderStatus};
use rust_decimal::Decimal;
use thiserror::Error;

/// Malformed order shape, rejected before any side effect.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    #[error("quantity must be strictly positive")]
    NonPositiveQuantity,
    #[error("buy orders must be market orders")]
    BuyNotMarket,
    #[error("buy orders must not carry a price")]
    BuyWithPrice,
    #[error("sell orders must be limit orders")]
    SellNotLimit,
    #[error("sell orders require a limit price")]
    SellWithoutPrice,
    #[error("limit price must be strictly positive")]
    NonPositivePrice,
}

/// Failure of a ledger mutation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("insufficient funds: account {account:?} has {available}, needs {required}")]
    InsufficientFunds {
        account: AccountId,
        required: Decimal,
        available: Decimal,
    },
    #[error("insufficient inventory: account {account:?} holds {held} of {instrument:?}, {requested} requested")]
    InsufficientInventory {
        account: AccountId,
        instrument: InstrumentId,
        held: u64,
        requested: u64,
    },
    #[error("deposit amount must be strictly positive")]
    NonPositiveDeposit,
}

/// Failure of the durable order log collaborator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LogError {
    #[error("order {0:?} already recorded")]
    Duplicate(OrderId),
    #[error("order {0:?} not found")]
    NotFound(OrderId),
    #[error("order log storage failure: {0}")]
    Storage(String),
}

/// Failure publishing to the match broker.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BrokerError {
    #[error("no queue registered for instrument {0:?}")]
    UnknownInstrument(InstrumentId),
}

/// Failure of `place`. Business rejections carry no side effects.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlaceError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("insufficient inventory: account {account:?} holds {held} of {instrument:?}, {requested} requested")]
    InsufficientInventory {
        account: AccountId,
        instrument: InstrumentId,
        held: u64,
        requested: u64,
    },
    #[error("unknown instrument {0:?}")]
    UnknownInstrument(InstrumentId),
    #[error("venue unavailable: {0}")]
    Unavailable(String),
}

/// Failure of `cancel`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CancelError {
    #[error("order {0:?} not found")]
    NotFound(OrderId),
    #[error("order {0:?} does not belong to the calling account")]
    WrongAccount(OrderId),
    #[error("order {order_id:?} already matched (status {status:?})")]
    AlreadyMatched {
        order_id: OrderId,
        status: OrderStatus,
    },
    #[error("order {0:?} already cancelled")]
    AlreadyCancelled(OrderId),
    #[error("buy order {0:?} is in flight; its outcome is owned by the matching pipeline")]
    InFlight(OrderId),
    #[error("venue unavailable: {0}")]
    Unavailable(String),
}
