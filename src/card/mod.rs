mod card;
pub use card::{AlreadyCompleted, Card, CardCategory, CardDifficulty, CardStatus, CardType};

mod changes;
pub use changes::{CardEdit, NewCard};

#[cfg(test)]
pub(crate) use card::test::new_card;
