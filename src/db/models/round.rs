use serde::{Deserialize, Serialize};

/// One detected round. Immutable once stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Round {
    pub session_id: String,
    pub round_number: u32,
    pub image_url: String,
    pub full_image_url: Option<String>,
    pub timestamp: Option<f64>,
}

/// Round payload before the registry assigns its number.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRound {
    pub image_url: String,
    pub full_image_url: Option<String>,
    pub timestamp: Option<f64>,
}
