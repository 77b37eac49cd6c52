//! Core types and IDs for the venue (orders, match messages).
//!
//! All identifiers are newtype wrappers. [`Order`], [`Side`], [`OrderKind`], and
//! [`OrderStatus`] define the order message and lifecycle. The venue supports
//! exactly two order shapes: market buys and limit sells.

use crate::error::ValidationError;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Unique order identifier (internal).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct OrderId(pub u64);

/// Account identifier, supplied by the identity collaborator and trusted as-is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct AccountId(pub u64);

/// Instrument identifier. Each instrument has its own independent book.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct InstrumentId(pub u64);

/// Settled trade identifier, returned to callers as the settlement reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct TradeId(pub u64);

/// Order side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

/// Order kind: market (take best available) or limit (with price).
///
/// Buys are always `Market`, sells are always `Limit`; see [`Order::validate_shape`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum OrderKind {
    Market,
    Limit,
}

/// Order lifecycle status. Terminal states are `Completed` and `Cancelled`.
///
/// `PartiallyFilled` keeps the unfilled remainder in `quantity` and stays
/// matchable; the filled slice lives on as a `Completed` child order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum OrderStatus {
    InProgress,
    PartiallyFilled,
    Completed,
    Cancelled,
}

impl OrderStatus {
    /// Whether the status admits no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }
}

/// Order message.
///
/// For limit sells, `price` must be `Some(...)` and strictly positive. For
/// market buys, `price` is `None` until completion, when it records the
/// executed price.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub account: AccountId,
    pub instrument: InstrumentId,
    pub side: Side,
    pub kind: OrderKind,
    pub quantity: u64,
    pub price: Option<Decimal>,
    pub status: OrderStatus,
    pub created_at: u64,
    /// Set on fill-slice child orders; points at the resting order they split from.
    pub parent: Option<OrderId>,
    /// Settlement reference, set when the order participates in a settled trade.
    pub trade: Option<TradeId>,
}

impl Order {
    /// Builds an `InProgress` market buy.
    pub fn market_buy(
        id: OrderId,
        account: AccountId,
        instrument: InstrumentId,
        quantity: u64,
        created_at: u64,
    ) -> Self {
        Self {
            id,
            account,
            instrument,
            side: Side::Buy,
            kind: OrderKind::Market,
            quantity,
            price: None,
            status: OrderStatus::InProgress,
            created_at,
            parent: None,
            trade: None,
        }
    }

    /// Builds an `InProgress` limit sell.
    pub fn limit_sell(
        id: OrderId,
        account: AccountId,
        instrument: InstrumentId,
        quantity: u64,
        price: Decimal,
        created_at: u64,
    ) -> Self {
        Self {
            id,
            account,
            instrument,
            side: Side::Sell,
            kind: OrderKind::Limit,
            quantity,
            price: Some(price),
            status: OrderStatus::InProgress,
            created_at,
            parent: None,
            trade: None,
        }
    }

    pub fn is_buy(&self) -> bool {
        matches!(self.side, Side::Buy)
    }

    pub fn is_sell(&self) -> bool {
        matches!(self.side, Side::Sell)
    }

    /// Checks the venue's order-shape invariant: quantity strictly positive,
    /// BUY ⇒ market with no price, SELL ⇒ limit with a strictly positive price.
    pub fn validate_shape(&self) -> Result<(), ValidationError> {
        if self.quantity == 0 {
            return Err(ValidationError::NonPositiveQuantity);
        }
        match self.side {
            Side::Buy => {
                if self.kind != OrderKind::Market {
                    return Err(ValidationError::BuyNotMarket);
                }
                if self.price.is_some() {
                    return Err(ValidationError::BuyWithPrice);
                }
            }
            Side::Sell => {
                if self.kind != OrderKind::Limit {
                    return Err(ValidationError::SellNotLimit);
                }
                match self.price {
                    None => return Err(ValidationError::SellWithoutPrice),
                    Some(p) if p <= Decimal::ZERO => {
                        return Err(ValidationError::NonPositivePrice)
                    }
                    Some(_) => {}
                }
            }
        }
        Ok(())
    }
}

/// Match request: carries the full buy order to a per-instrument queue.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct MatchRequest {
    pub order: Order,
}

/// Why a buy failed to match. The order is cancelled in all three cases.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum UnmatchedReason {
    /// The instrument's book held no resting sells.
    NoLiquidity,
    /// The best resting sell could not cover the buy quantity on its own
    /// (the venue never sweeps price levels).
    InsufficientDepth,
    /// A match was found but the buyer could not fund it; the book was left intact.
    InsufficientFunds,
    /// Redelivered request for an order that was already resolved as unmatched.
    AlreadyCancelled,
}

/// Outcome of one match attempt.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum MatchOutcome {
    Matched {
        price: Decimal,
        quantity: u64,
        trade: TradeId,
    },
    Unmatched {
        reason: UnmatchedReason,
    },
}

/// Match result, correlated back to the waiting caller by the buy order's id.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MatchResult {
    pub order_id: OrderId,
    pub outcome: MatchOutcome,
}

/// Process-wide order id source. Constructed once and shared by intake and the
/// matching workers (child orders), never a module-level global.
#[derive(Debug)]
pub struct OrderIdSource(AtomicU64);

impl OrderIdSource {
    pub fn starting_at(next: u64) -> Self {
        Self(AtomicU64::new(next))
    }

    pub fn next(&self) -> OrderId {
        OrderId(self.0.fetch_add(1, Ordering::Relaxed))
    }

    /// The next id that would be handed out (for snapshots).
    pub fn peek(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    /// Raises the counter so fresh ids never collide with restored ones.
    pub fn advance_to(&self, floor: u64) {
        self.0.fetch_max(floor, Ordering::Relaxed);
    }
}

impl Default for OrderIdSource {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

/// Milliseconds since the Unix epoch, used for order/trade timestamps.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
