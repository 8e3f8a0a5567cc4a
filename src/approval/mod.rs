pub mod handler;
pub mod signature;
pub mod token;

use serde::{Deserialize, Serialize};

/// A reviewer's choice as carried by an approval button.
///
/// `chosen_variant` is kept raw so that malformed decisions reach the token
/// registry and burn the token instead of being dropped at the edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalDecision {
    pub token_id: String,
    #[serde(default, alias = "memeVariant")]
    pub chosen_variant: Option<i64>,
}
