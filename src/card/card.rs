use serde::{Deserialize, Serialize};

use super::{CardEdit, NewCard};
use crate::id::CardId;

macro_rules! card_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const VARIANTS: &'static [&'static str] = &[$(stringify!($variant)),+];
        }
    };
}

card_enum!(CardDifficulty { Easy, Normal, Hard });

card_enum!(CardType { Task, Challenge });

card_enum!(CardCategory {
    Stuff,
    Family,
    Health,
    Learning,
    Leisure,
    Work,
});

card_enum!(
    /// Only ever moves from `Incomplete` to `Complete`.
    CardStatus { Incomplete, Complete }
);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    #[serde(rename = "_id")]
    pub id: CardId,
    pub title: String,
    pub difficulty: CardDifficulty,
    pub date: String,
    pub time: String,
    pub r#type: CardType,
    pub category: CardCategory,
    pub status: CardStatus,
}

#[derive(Debug, PartialEq, Eq)]
pub struct AlreadyCompleted;

impl Card {
    pub fn new(new: NewCard) -> Self {
        let NewCard {
            title,
            difficulty,
            date,
            time,
            r#type,
            category,
        } = new;

        Self {
            id: CardId::new(),
            title,
            difficulty,
            date,
            time,
            r#type,
            category,
            status: CardStatus::Incomplete,
        }
    }

    /// Overwrites every field present in `edit`. Identity and status are
    /// never touched.
    pub fn apply(&mut self, edit: CardEdit) {
        let CardEdit {
            title,
            difficulty,
            date,
            time,
            r#type,
            category,
        } = edit;

        if let Some(title) = title {
            self.title = title;
        }
        if let Some(difficulty) = difficulty {
            self.difficulty = difficulty;
        }
        if let Some(date) = date {
            self.date = date;
        }
        if let Some(time) = time {
            self.time = time;
        }
        if let Some(r#type) = r#type {
            self.r#type = r#type;
        }
        if let Some(category) = category {
            self.category = category;
        }
    }

    pub fn complete(&mut self) -> Result<(), AlreadyCompleted> {
        match self.status {
            CardStatus::Incomplete => {
                self.status = CardStatus::Complete;
                Ok(())
            }
            CardStatus::Complete => Err(AlreadyCompleted),
        }
    }
}
