//! Access control for folderkeep.
//!
//! This module provides folder password hashing and verification, password
//! strength estimation, and capability token issuance and checks.

pub mod password;
pub mod strength;
mod token;

pub use password::{generate_salt, hash_password, set_password, test_password};
pub use strength::{HeuristicEstimator, StrengthEstimator};
pub use token::{authorize, issue_token, CapabilityToken, Grant};
