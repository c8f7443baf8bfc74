//! Core types for Parcel Ledger.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod address;
pub mod id;
pub mod money;
pub mod status;

pub use address::Address;
pub use id::*;
pub use money::{FeePolicy, FeePolicyError};
pub use status::*;
