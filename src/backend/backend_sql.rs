use std::path::{Path, PathBuf};

use sqlx::{migrate::MigrateDatabase, query, query_as, Pool, Sqlite, SqlitePool};

use log::{error, info};

use crate::backend::{CreateError, FindError};
use crate::card::Card;
use crate::id::UserId;
use crate::session::{Session, SessionId};
use crate::user::User;

type Result<T> = std::result::Result<T, ()>;

const SQLITE_CONSTRAINT_UNIQUE: &str = "2067";

pub struct Backend(pub Pool<Sqlite>);

#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    email: String,
    pwhash: String,
    cards: String,
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    uid: String,
}

fn into_sql(path: &Path) -> PathBuf {
    path.join("cards.sql")
}

impl Backend {
    pub async fn new(data_dir: &Path) -> Result<Self> {
        let db_path = into_sql(data_dir);
        let db_path = db_path.to_str().ok_or_else(|| {
            error!("non utf-8 data dir {data_dir:?}");
        })?;
        let url = format!("sqlite://{db_path}");

        if !Sqlite::database_exists(&url).await.unwrap_or(false) {
            Sqlite::create_database(&url).await.map_err(|e| {
                error!("error creating database: {e}");
            })?;
        }
        info!("Using {url}");

        let pool = SqlitePool::connect(&url).await.map_err(|e| {
            error!("db connection: {e}");
        })?;

        Self::migrated(pool).await
    }

    async fn migrated(pool: Pool<Sqlite>) -> Result<Self> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| {
                error!("migration: {e}");
            })?;

        Ok(Self(pool))
    }
}

impl TryFrom<UserRow> for User {
    type Error = FindError;

    fn try_from(row: UserRow) -> std::result::Result<Self, FindError> {
        let UserRow {
            id,
            email,
            pwhash,
            cards,
        } = row;

        let id = id.parse::<UserId>().map_err(|e| {
            error!("invalid stored user id {id:?}: {e}");
            FindError::Internal
        })?;
        let cards: Vec<Card> = serde_json::from_str(&cards).map_err(|e| {
            error!("invalid stored cards for {id}: {e}");
            FindError::Internal
        })?;

        Ok(User {
            id,
            email,
            pwhash,
            cards,
        })
    }
}

fn cards_json(user: &User) -> Result<String> {
    serde_json::to_string(&user.cards).map_err(|e| {
        error!("couldn't convert cards for {} to json: {e:?}", user.id);
    })
}

fn find_err(e: sqlx::Error) -> FindError {
    if matches!(e, sqlx::Error::RowNotFound) {
        FindError::NotFound
    } else {
        error!("query: {e}");
        FindError::Internal
    }
}

impl Backend {
    pub async fn find_user(&self, id: &UserId) -> std::result::Result<User, FindError> {
        query_as::<_, UserRow>(
            "
            SELECT id, email, pwhash, cards
            FROM users
            WHERE id = ?
            ",
        )
        .bind(id.to_string())
        .fetch_one(&self.0)
        .await
        .map_err(find_err)?
        .try_into()
    }

    pub async fn find_user_by_email(&self, email: &str) -> std::result::Result<User, FindError> {
        query_as::<_, UserRow>(
            "
            SELECT id, email, pwhash, cards
            FROM users
            WHERE email = ?
            ",
        )
        .bind(email)
        .fetch_one(&self.0)
        .await
        .map_err(find_err)?
        .try_into()
    }

    pub async fn create_user(&self, user: &User) -> std::result::Result<(), CreateError> {
        let cards = cards_json(user).map_err(|()| CreateError::Internal)?;

        query(
            "
            INSERT INTO users
            (id, email, pwhash, cards)
            VALUES
            (?, ?, ?, ?)
            ",
        )
        .bind(user.id.to_string())
        .bind(&user.email)
        .bind(&user.pwhash)
        .bind(cards)
        .execute(&self.0)
        .await
        .map(|_| ())
        .map_err(|e| match e {
            sqlx::Error::Database(e) if e.code().as_deref() == Some(SQLITE_CONSTRAINT_UNIQUE) => {
                info!("email for user {} already taken", user.id);
                CreateError::EmailTaken
            }
            e => {
                error!("error inserting user: {e:?}");
                CreateError::Internal
            }
        })
    }

    /// Persists the whole document, cards included.
    pub async fn save_user(&self, user: &User) -> Result<()> {
        let cards = cards_json(user)?;

        query(
            "
            UPDATE users
            SET email = ?, pwhash = ?, cards = ?
            WHERE id = ?
            ",
        )
        .bind(&user.email)
        .bind(&user.pwhash)
        .bind(cards)
        .bind(user.id.to_string())
        .execute(&self.0)
        .await
        .map_err(|e| {
            error!("update user: {e}");
        })
        .and_then(|done| {
            if done.rows_affected() == 1 {
                Ok(())
            } else {
                error!("update user {}: no such row", user.id);
                Err(())
            }
        })
    }
}

impl Backend {
    pub async fn create_session(&self, session: &Session) -> Result<()> {
        query("INSERT INTO sessions (id, uid) VALUES (?, ?)")
            .bind(session.id.to_string())
            .bind(session.uid.to_string())
            .execute(&self.0)
            .await
            .map(|_| ())
            .map_err(|e| {
                error!("error inserting session: {e:?}");
            })
    }

    pub async fn find_session(&self, id: &SessionId) -> std::result::Result<Session, FindError> {
        let SessionRow { uid } = query_as::<_, SessionRow>("SELECT uid FROM sessions WHERE id = ?")
            .bind(id.to_string())
            .fetch_one(&self.0)
            .await
            .map_err(find_err)?;

        let uid = uid.parse::<UserId>().map_err(|e| {
            error!("invalid stored uid {uid:?} for session {id}: {e}");
            FindError::Internal
        })?;

        Ok(Session { id: *id, uid })
    }

    pub async fn delete_session(&self, id: &SessionId) -> Result<()> {
        query("DELETE FROM sessions WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.0)
            .await
            .map(|_| ())
            .map_err(|e| {
                error!("couldn't query for session {id}: {e:?}");
            })
    }
}
