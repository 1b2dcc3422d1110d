use serde::Deserialize;

use super::{CardCategory, CardDifficulty, CardType};

/// Body of a card creation, after validation.
#[derive(Debug, Clone, Deserialize)]
pub struct NewCard {
    pub title: String,
    pub difficulty: CardDifficulty,
    pub date: String,
    pub time: String,
    pub r#type: CardType,
    pub category: CardCategory,
}

/// Partial card update; absent fields are left as they are.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CardEdit {
    pub title: Option<String>,
    pub difficulty: Option<CardDifficulty>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub r#type: Option<CardType>,
    pub category: Option<CardCategory>,
}
