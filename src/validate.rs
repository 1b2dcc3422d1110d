//! Request body and path checks.
//!
//! Fields are checked in schema order and the first failure is reported,
//! with unknown keys checked last. Messages name the offending field the
//! same way for every endpoint, e.g. `"title" is required`.

use log::error;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use time::{macros::format_description, Date};

use crate::card::{CardCategory, CardDifficulty, CardType};
use crate::cardtrack::{Error, Result};
use crate::id::CardId;
use crate::session::SessionId;

pub enum Rule {
    Text { min: usize, max: usize },
    OneOf(&'static [&'static str]),
    Format {
        check: fn(&str) -> bool,
        message: &'static str,
    },
}

pub struct Field {
    pub name: &'static str,
    pub required: bool,
    pub rule: Rule,
}

pub struct Schema(&'static [Field]);

const DATE_MESSAGE: &str = "Invalid 'date'. Please, use YYYY-MM-DD string format";
const TIME_MESSAGE: &str = "Invalid 'time'. Please, use HH:MM string format";

macro_rules! card_fields {
    ($required: expr) => {
        &[
            Field {
                name: "title",
                required: $required,
                rule: Rule::Text { min: 2, max: 100 },
            },
            Field {
                name: "date",
                required: $required,
                rule: Rule::Format {
                    check: is_date,
                    message: DATE_MESSAGE,
                },
            },
            Field {
                name: "time",
                required: $required,
                rule: Rule::Format {
                    check: is_time,
                    message: TIME_MESSAGE,
                },
            },
            Field {
                name: "type",
                required: $required,
                rule: Rule::OneOf(CardType::VARIANTS),
            },
            Field {
                name: "category",
                required: $required,
                rule: Rule::OneOf(CardCategory::VARIANTS),
            },
            Field {
                name: "difficulty",
                required: $required,
                rule: Rule::OneOf(CardDifficulty::VARIANTS),
            },
        ]
    };
}

pub const CREATE_CARD: Schema = Schema(card_fields!(true));

pub const EDIT_CARD: Schema = Schema(card_fields!(false));

pub const CREDENTIALS: Schema = Schema(&[
    Field {
        name: "email",
        required: true,
        rule: Rule::Format {
            check: is_email,
            message: "\"email\" must be a valid email",
        },
    },
    Field {
        name: "password",
        required: true,
        rule: Rule::Text { min: 8, max: 100 },
    },
]);

pub const REFRESH: Schema = Schema(&[Field {
    name: "sid",
    required: true,
    rule: Rule::Format {
        check: is_session_id,
        message: "Invalid 'sid'. Must be a session id",
    },
}]);

impl Schema {
    /// Check `body` and, if it passes, deserialise it into `T`.
    pub fn validate<T: DeserializeOwned>(&self, body: Value) -> Result<T> {
        let Value::Object(map) = body else {
            return Err(bad("\"value\" must be of type object"));
        };

        self.check(&map)?;

        serde_json::from_value(Value::Object(map)).map_err(|e| {
            error!("validated body didn't deserialise: {e}");
            Error::Internal
        })
    }

    fn check(&self, map: &Map<String, Value>) -> Result<()> {
        for field in self.0 {
            match map.get(field.name) {
                None if field.required => {
                    return Err(bad(format!("\"{}\" is required", field.name)));
                }
                None => {}
                Some(value) => field.check(value)?,
            }
        }

        let unknown = map
            .keys()
            .find(|key| !self.0.iter().any(|field| field.name == key.as_str()));

        match unknown {
            Some(key) => Err(bad(format!("\"{key}\" is not allowed"))),
            None => Ok(()),
        }
    }
}

impl Field {
    fn check(&self, value: &Value) -> Result<()> {
        let name = self.name;

        let Value::String(s) = value else {
            return Err(bad(format!("\"{name}\" must be a string")));
        };
        if s.is_empty() {
            return Err(bad(format!("\"{name}\" is not allowed to be empty")));
        }

        match self.rule {
            Rule::Text { min, max } => {
                let len = s.encode_utf16().count();
                if len < min {
                    Err(bad(format!(
                        "\"{name}\" length must be at least {min} characters long"
                    )))
                } else if len > max {
                    Err(bad(format!(
                        "\"{name}\" length must be less than or equal to {max} characters long"
                    )))
                } else {
                    Ok(())
                }
            }
            Rule::OneOf(valid) => {
                if valid.contains(&s.as_str()) {
                    Ok(())
                } else {
                    Err(bad(format!(
                        "\"{name}\" must be one of [{}]",
                        valid.join(", ")
                    )))
                }
            }
            Rule::Format { check, message } => {
                if check(s) {
                    Ok(())
                } else {
                    Err(bad(message))
                }
            }
        }
    }
}

pub fn card_id(s: &str) -> Result<CardId> {
    s.parse()
        .map_err(|_| bad("Invalid 'cardId'. Must be an ObjectId"))
}

fn bad(message: impl Into<String>) -> Error {
    Error::BadRequest(message.into())
}

fn is_date(s: &str) -> bool {
    // `Date::parse` tolerates a sign on the year
    s.len() == 10
        && s.starts_with(|c: char| c.is_ascii_digit())
        && Date::parse(s, format_description!("[year]-[month]-[day]")).is_ok()
}

fn is_time(s: &str) -> bool {
    let Some((hour, minute)) = s.split_once(':') else {
        return false;
    };
    let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());

    if !digits(hour) || hour.len() > 2 || !digits(minute) || minute.len() != 2 {
        return false;
    }

    matches!(
        (hour.parse::<u8>(), minute.parse::<u8>()),
        (Ok(0..=23), Ok(0..=59))
    )
}

fn is_session_id(s: &str) -> bool {
    s.parse::<SessionId>().is_ok()
}

fn is_email(s: &str) -> bool {
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };

    !local.is_empty()
        && !domain.contains('@')
        && !s.chars().any(char::is_whitespace)
        && domain.contains('.')
        && domain.split('.').all(|label| !label.is_empty())
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;
    use crate::card::{CardEdit, NewCard};

    fn message<T: std::fmt::Debug>(r: Result<T>) -> String {
        match r {
            Err(Error::BadRequest(msg)) => msg,
            other => panic!("expected bad request, got {other:?}"),
        }
    }

    fn valid_card() -> Value {
        json!({
            "title": "Test",
            "difficulty": "Easy",
            "type": "Task",
            "category": "Stuff",
            "date": "2020-12-31",
            "time": "09:15",
        })
    }

    #[test]
    fn create_accepts_valid_card() {
        let card: NewCard = CREATE_CARD.validate(valid_card()).unwrap();
        assert_eq!(card.title, "Test");
        assert_eq!(card.r#type, CardType::Task);
        assert_eq!(card.time, "09:15");
    }

    #[test]
    fn create_rejects_bad_enum() {
        let mut body = valid_card();
        body["type"] = json!("Taskk");

        assert_eq!(
            message(CREATE_CARD.validate::<NewCard>(body)),
            "\"type\" must be one of [Task, Challenge]"
        );
    }

    #[test]
    fn create_requires_every_field() {
        let mut body = valid_card();
        body.as_object_mut().unwrap().remove("time");

        assert_eq!(
            message(CREATE_CARD.validate::<NewCard>(body)),
            "\"time\" is required"
        );
    }

    #[test]
    fn title_length_bounds() {
        let mut body = valid_card();
        body["title"] = json!("T");
        assert_eq!(
            message(CREATE_CARD.validate::<NewCard>(body.clone())),
            "\"title\" length must be at least 2 characters long"
        );

        body["title"] = json!("x".repeat(101));
        assert_eq!(
            message(CREATE_CARD.validate::<NewCard>(body.clone())),
            "\"title\" length must be less than or equal to 100 characters long"
        );

        body["title"] = json!("");
        assert_eq!(
            message(CREATE_CARD.validate::<NewCard>(body)),
            "\"title\" is not allowed to be empty"
        );
    }

    #[test]
    fn title_length_counts_utf16_units() {
        let mut body = valid_card();

        // one astral character is two units
        body["title"] = json!("\u{1F600}");
        assert!(CREATE_CARD.validate::<NewCard>(body.clone()).is_ok());

        body["title"] = json!(format!("{}\u{1F600}", "x".repeat(99)));
        assert_eq!(
            message(CREATE_CARD.validate::<NewCard>(body)),
            "\"title\" length must be less than or equal to 100 characters long"
        );
    }

    #[test]
    fn non_string_values() {
        let mut body = valid_card();
        body["difficulty"] = json!(3);

        assert_eq!(
            message(CREATE_CARD.validate::<NewCard>(body)),
            "\"difficulty\" must be a string"
        );
    }

    #[test]
    fn body_must_be_object() {
        assert_eq!(
            message(EDIT_CARD.validate::<CardEdit>(json!([1, 2]))),
            "\"value\" must be of type object"
        );
    }

    #[test]
    fn dates() {
        assert!(is_date("2020-12-31"));
        assert!(is_date("2024-02-29"));
        assert!(!is_date("2023-02-29"));
        assert!(!is_date("2020-13-01"));
        assert!(!is_date("2020-1-01"));
        assert!(!is_date("31-12-2020"));
        assert!(!is_date("+020-12-31"));
        assert!(!is_date("2020-12-31T00:00"));

        let mut body = valid_card();
        body["date"] = json!("2020/12/31");
        assert_eq!(message(CREATE_CARD.validate::<NewCard>(body)), DATE_MESSAGE);
    }

    #[test]
    fn times() {
        assert!(is_time("00:00"));
        assert!(is_time("9:05"));
        assert!(is_time("23:59"));
        assert!(!is_time("24:00"));
        assert!(!is_time("12:60"));
        assert!(!is_time("12:5"));
        assert!(!is_time("123:45"));
        assert!(!is_time("12-30"));
        assert!(!is_time("+1:30"));

        let mut body = valid_card();
        body["time"] = json!("noon");
        assert_eq!(message(CREATE_CARD.validate::<NewCard>(body)), TIME_MESSAGE);
    }

    #[test]
    fn edit_is_partial() {
        let edit: CardEdit = EDIT_CARD.validate(json!({ "difficulty": "Hard" })).unwrap();
        assert_eq!(edit.difficulty, Some(CardDifficulty::Hard));
        assert!(edit.title.is_none());

        let edit: CardEdit = EDIT_CARD.validate(json!({})).unwrap();
        assert!(edit.difficulty.is_none());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert_eq!(
            message(EDIT_CARD.validate::<CardEdit>(json!({ "difficultyy": "Hard" }))),
            "\"difficultyy\" is not allowed"
        );
        assert_eq!(
            message(EDIT_CARD.validate::<CardEdit>(json!({ "status": "Complete" }))),
            "\"status\" is not allowed"
        );
    }

    #[test]
    fn known_fields_are_checked_before_unknown_keys() {
        let body = json!({ "extra": 1, "difficulty": "Impossible" });
        assert_eq!(
            message(EDIT_CARD.validate::<CardEdit>(body)),
            "\"difficulty\" must be one of [Easy, Normal, Hard]"
        );
    }

    #[test]
    fn emails() {
        assert!(is_email("test@email.com"));
        assert!(!is_email("test.email.com"));
        assert!(!is_email("@email.com"));
        assert!(!is_email("test@email"));
        assert!(!is_email("test@@email.com"));
        assert!(!is_email("te st@email.com"));
        assert!(!is_email("test@email..com"));
    }

    #[test]
    fn card_ids() {
        assert!(card_id("5fed1a80aabbccddeeff0011").is_ok());
        assert_eq!(
            message(card_id("qwerty123")),
            "Invalid 'cardId'. Must be an ObjectId"
        );
    }
}
