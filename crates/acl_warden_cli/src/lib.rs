//! ACL Warden CLI library.
//!
//! The binary is a thin wrapper around these modules; they are exposed for
//! integration testing.

pub mod args;
pub mod errors;
pub mod run;
