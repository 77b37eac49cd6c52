//! Settlement ledger: wallet balances, positions, and settled trades.
//!
//! Every wallet mutation is a signed delta applied under the account's own
//! lock, never a blind overwrite; unrelated accounts never contend. [`Ledger::settle`]
//! realizes one trade atomically and appends the immutable record that serves
//! as the settlement reference.

use crate::error::LedgerError;
use crate::types::{AccountId, InstrumentId, TradeId};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

/// Wallet balance plus positions for one account.
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct AccountState {
    pub balance: Decimal,
    /// Instrument -> quantity held. Entries are removed at zero, never kept
    /// at zero or negative.
    pub positions: HashMap<InstrumentId, u64>,
}

/// Immutable record of a settled trade, capturing both sides.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TradeRecord {
    pub trade: TradeId,
    pub instrument: InstrumentId,
    pub buyer: AccountId,
    pub seller: AccountId,
    pub quantity: u64,
    pub price: Decimal,
    pub notional: Decimal,
    pub executed_at: u64,
}

/// Serializable ledger state for persistence.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct LedgerSnapshot {
    pub accounts: HashMap<AccountId, AccountState>,
    pub trades: Vec<TradeRecord>,
    pub next_trade_id: u64,
}

#[derive(Debug)]
pub struct Ledger {
    accounts: RwLock<HashMap<AccountId, Arc<Mutex<AccountState>>>>,
    trades: Mutex<Vec<TradeRecord>>,
    next_trade_id: AtomicU64,
}

impl Ledger {
    pub fn new() -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            trades: Mutex::new(Vec::new()),
            next_trade_id: AtomicU64::new(1),
        }
    }

    /// The account's lockable state, created empty on first touch.
    fn account(&self, id: AccountId) -> Arc<Mutex<AccountState>> {
        if let Some(state) = self.accounts.read().expect("lock").get(&id) {
            return Arc::clone(state);
        }
        let mut accounts = self.accounts.write().expect("lock");
        Arc::clone(accounts.entry(id).or_default())
    }

    /// Adds money to a wallet. Returns the new balance.
    pub fn deposit(&self, id: AccountId, amount: Decimal) -> Result<Decimal, LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::NonPositiveDeposit);
        }
        let account = self.account(id);
        let mut state = account.lock().expect("lock");
        state.balance += amount;
        Ok(state.balance)
    }

    pub fn balance(&self, id: AccountId) -> Decimal {
        let account = self.account(id);
        let state = account.lock().expect("lock");
        state.balance
    }

    /// Grants shares to an account (admin/seed path) or returns reserved
    /// inventory after a cancellation.
    pub fn credit_position(&self, id: AccountId, instrument: InstrumentId, quantity: u64) {
        if quantity == 0 {
            return;
        }
        let account = self.account(id);
        let mut state = account.lock().expect("lock");
        *state.positions.entry(instrument).or_insert(0) += quantity;
    }

    /// Reserves inventory for a sell placement: decrements the seller's
    /// position up front so resting orders can never oversell.
    pub fn reserve_position(
        &self,
        id: AccountId,
        instrument: InstrumentId,
        quantity: u64,
    ) -> Result<(), LedgerError> {
        let account = self.account(id);
        let mut state = account.lock().expect("lock");
        let held = state.positions.get(&instrument).copied().unwrap_or(0);
        if held < quantity {
            return Err(LedgerError::InsufficientInventory {
                account: id,
                instrument,
                held,
                requested: quantity,
            });
        }
        if held == quantity {
            state.positions.remove(&instrument);
        } else {
            state.positions.insert(instrument, held - quantity);
        }
        Ok(())
    }

    pub fn position(&self, id: AccountId, instrument: InstrumentId) -> u64 {
        let account = self.account(id);
        let state = account.lock().expect("lock");
        state.positions.get(&instrument).copied().unwrap_or(0)
    }

    pub fn positions(&self, id: AccountId) -> HashMap<InstrumentId, u64> {
        let account = self.account(id);
        let state = account.lock().expect("lock");
        state.positions.clone()
    }

    /// Settles one trade: debit buyer `quantity × price`, credit seller the
    /// same, credit buyer position, append the trade record. Fails with
    /// `InsufficientFunds` before any mutation if the buyer cannot cover the
    /// cost. Seller inventory is not touched here; it was reserved at
    /// placement.
    ///
    /// Account locks are taken in id order so concurrent settlements touching
    /// the same pair cannot deadlock.
    pub fn settle(
        &self,
        buyer: AccountId,
        seller: AccountId,
        instrument: InstrumentId,
        quantity: u64,
        price: Decimal,
        executed_at: u64,
    ) -> Result<TradeId, LedgerError> {
        let cost = price * Decimal::from(quantity);
        if buyer == seller {
            // Self-trade: wallet deltas cancel out, only the position moves.
            let account = self.account(buyer);
            let mut state = account.lock().expect("lock");
            if state.balance < cost {
                return Err(LedgerError::InsufficientFunds {
                    account: buyer,
                    required: cost,
                    available: state.balance,
                });
            }
            *state.positions.entry(instrument).or_insert(0) += quantity;
        } else {
            let buyer_arc = self.account(buyer);
            let seller_arc = self.account(seller);
            let (first, second) = if buyer < seller {
                (&buyer_arc, &seller_arc)
            } else {
                (&seller_arc, &buyer_arc)
            };
            let mut first_state = first.lock().expect("lock");
            let mut second_state = second.lock().expect("lock");
            let (buyer_state, seller_state) = if buyer < seller {
                (&mut *first_state, &mut *second_state)
            } else {
                (&mut *second_state, &mut *first_state)
            };
            if buyer_state.balance < cost {
                return Err(LedgerError::InsufficientFunds {
                    account: buyer,
                    required: cost,
                    available: buyer_state.balance,
                });
            }
            buyer_state.balance -= cost;
            seller_state.balance += cost;
            *buyer_state.positions.entry(instrument).or_insert(0) += quantity;
        }

        let trade = TradeId(self.next_trade_id.fetch_add(1, Ordering::Relaxed));
        let record = TradeRecord {
            trade,
            instrument,
            buyer,
            seller,
            quantity,
            price,
            notional: cost,
            executed_at,
        };
        self.trades.lock().expect("lock").push(record);
        Ok(trade)
    }

    pub fn trade(&self, id: TradeId) -> Option<TradeRecord> {
        self.trades
            .lock()
            .expect("lock")
            .iter()
            .find(|t| t.trade == id)
            .cloned()
    }

    pub fn trades(&self) -> Vec<TradeRecord> {
        self.trades.lock().expect("lock").clone()
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        let accounts = self
            .accounts
            .read()
            .expect("lock")
            .iter()
            .map(|(id, state)| (*id, state.lock().expect("lock").clone()))
            .collect();
        LedgerSnapshot {
            accounts,
            trades: self.trades.lock().expect("lock").clone(),
            next_trade_id: self.next_trade_id.load(Ordering::Relaxed),
        }
    }

    /// Replaces all ledger state with the snapshot's (restart recovery).
    pub fn restore(&self, snapshot: LedgerSnapshot) {
        let mut accounts = self.accounts.write().expect("lock");
        accounts.clear();
        for (id, state) in snapshot.accounts {
            accounts.insert(id, Arc::new(Mutex::new(state)));
        }
        *self.trades.lock().expect("lock") = snapshot.trades;
        self.next_trade_id
            .store(snapshot.next_trade_id, Ordering::Relaxed);
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}
