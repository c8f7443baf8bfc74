//! Parcel Ledger Core - domain types and pure state machines.
//!
//! This crate holds everything about fulfillment and settlement that can be
//! decided without touching a database:
//! - `server` - HTTP service, persistence, and the scheduled driver
//! - `cli` - Command-line tools for migrations, jobs, and ledger checks
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no
//! database access, no HTTP clients. Services load aggregates, ask this crate
//! what the next state or posting is, and persist the answer.
//!
//! # Modules
//!
//! - [`types`] - Typed IDs, status enums, addresses, and the fee policy
//! - [`shipment`] - Shipment transition table and order status sync
//! - [`ledger`] - Wallet postings, balance arithmetic, and replay
//! - [`withdrawal`] - Withdrawal request transition rules
//! - [`settlement`] - Return dispute resolutions and their money directives

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod ledger;
pub mod settlement;
pub mod shipment;
pub mod types;
pub mod withdrawal;

pub use types::*;
