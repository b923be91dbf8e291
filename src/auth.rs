//! Identity identifiers and the credential record model.

pub mod account;
pub mod id;

pub use account::*;
pub use id::*;
