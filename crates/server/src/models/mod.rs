//! Persisted aggregates and their insert inputs.
//!
//! Orders and return requests are owned by other parts of the marketplace;
//! this service reads and updates them inside the same unit of work as the
//! shipment and wallet changes they are coupled to.

pub mod order;
pub mod return_request;
pub mod revenue;
pub mod shipment;
pub mod wallet;
pub mod withdrawal;

pub use order::{NewOrder, Order};
pub use return_request::{NewReturnRequest, ReturnRequest};
pub use revenue::{AdminRevenue, NewAdminRevenue};
pub use shipment::{Actor, HistoryEntry, NewHistoryEntry, NewShipment, Shipment};
pub use wallet::{NewTransaction, Transaction, Wallet};
pub use withdrawal::{BankDetails, NewWithdrawalRequest, WithdrawalRequest};
