//! # ethpool-ledger
//!
//! Share and reward accounting for the ethpool core.
//!
//! This crate provides:
//! - Duplicate proof-of-work rejection over a bounded height window
//! - Round ledger and hashrate stream writes per accepted share
//! - Block candidate promotion with atomic round closure
//! - The candidate → immature → matured/orphaned block lifecycle
//! - The payout ledger (balance → pending → paid with rollback)
//!
//! All mutations are single atomic batches or watched transactions against
//! the [`ethpool_storage::Store`]; no state lives in this crate.

mod error;
mod lifecycle;
mod payouts;
mod pow;
mod shares;
mod types;

pub use error::{LedgerError, LedgerResult};
pub use lifecycle::BlockLifecycle;
pub use payouts::PayoutLedger;
pub use pow::{DuplicateFilter, DUPLICATE_WINDOW};
pub use shares::ShareRecorder;
pub use types::{BlockData, MinerAccount, Payment, PendingPayment, Solution, SHANNON};
