//! Parcel Ledger server library.
//!
//! Fulfillment and settlement for a multi-vendor marketplace: shipment
//! lifecycles, store and buyer wallets, withdrawals, platform revenue, and
//! return disputes. Exposed as a library so the CLI and the integration tests
//! can drive the same services the HTTP surface does.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
