use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// Outcome of classifying one pearl millet image.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Display)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    #[strum(serialize = "Healthy")]
    Healthy,
    #[strum(serialize = "Diseased: Ergot")]
    Diseased,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ClassificationResult {
    pub label: Label,
    /// Confidence in `label`, in percent, rounded to two decimals.
    pub confidence_percent: f64,
    pub filename: String,
}

/// UI languages with a message catalog.
#[derive(
    Serialize,
    Deserialize,
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Language {
    #[default]
    En,
    Hi,
}
