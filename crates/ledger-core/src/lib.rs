//! Ledger Core Library
//!
//! Shared types, ledger RPC gateway, envelope signing, and database models
//! for the Stakeline settlement backend.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod signing;
pub mod types;

pub use error::{Error, Result};
