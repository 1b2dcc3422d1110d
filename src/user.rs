use serde::{Deserialize, Serialize};

use crate::card::Card;
use crate::id::{CardId, UserId};

/// A user document; cards are embedded and owned by it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    #[serde(rename = "passwordHash")]
    pub pwhash: String,
    #[serde(default)]
    pub cards: Vec<Card>,
}

impl User {
    pub fn new(email: String, pwhash: String) -> Self {
        Self {
            id: UserId::new(),
            email,
            pwhash,
            cards: vec![],
        }
    }

    pub fn add_card(&mut self, card: Card) -> &Card {
        self.cards.push(card);
        &self.cards[self.cards.len() - 1]
    }

    pub fn card_mut(&mut self, id: &CardId) -> Option<&mut Card> {
        self.cards.iter_mut().find(|card| &card.id == id)
    }

    pub fn remove_card(&mut self, id: &CardId) -> Option<Card> {
        let index = self.cards.iter().position(|card| &card.id == id)?;
        Some(self.cards.remove(index))
    }
}
