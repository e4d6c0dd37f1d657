//! Custom Resource Definitions for the challenge operator

mod challenge;
pub mod types;

pub use challenge::{Challenge, ChallengeSpec, ChallengeStatus};
pub use types::*;
