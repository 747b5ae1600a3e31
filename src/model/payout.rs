use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Payout model as a tagged variant, not a trait hierarchy: a small closed
/// set of behaviors modeled as data rather than via dynamic dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PayoutModel {
    WinnerTakeAll,
    Top3Ladder,
    Proportional,
}
