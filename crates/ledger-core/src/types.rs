//! Core domain types for the Stakeline settlement backend.

pub mod balance;
pub mod dead_letter;
pub mod market;
pub mod pool;
pub mod position;
pub mod trade;

pub use balance::*;
pub use dead_letter::*;
pub use market::*;
pub use pool::*;
pub use position::*;
pub use trade::*;
