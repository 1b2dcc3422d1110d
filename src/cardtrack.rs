use std::{result, sync::Arc};

use log::{debug, error, info, trace};
use serde::Serialize;
use warp::http;

use crate::auth::{Bearer, Credentials};
use crate::backend::{Backend, CreateError, FindError};
use crate::card::{Card, CardEdit, NewCard};
use crate::id::{CardId, UserId};
use crate::session::{Session, SessionId};
use crate::token::{TokenKeys, TokenKind, TokenPair};
use crate::user::User;

pub struct CardTrack {
    backend: Backend,
    keys: TokenKeys,
}

/// A request whose access token checked out: the session it names still
/// exists and belongs to `user`.
pub struct CardTrackAuthed {
    sync: Arc<CardTrack>,
    session: Session,
    user: User,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    Internal,
    Unauthorized,
    BadRequest(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
}

pub type Result<T> = result::Result<T, Error>;

impl Error {
    pub fn status(&self) -> http::StatusCode {
        match self {
            Self::Internal => http::StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unauthorized => http::StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => http::StatusCode::BAD_REQUEST,
            Self::Forbidden(_) => http::StatusCode::FORBIDDEN,
            Self::NotFound(_) => http::StatusCode::NOT_FOUND,
            Self::Conflict(_) => http::StatusCode::CONFLICT,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Internal => "Internal server error",
            Self::Unauthorized => "Unauthorized",
            Self::BadRequest(msg)
            | Self::Forbidden(msg)
            | Self::NotFound(msg)
            | Self::Conflict(msg) => msg,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Registered {
    pub email: String,
    pub id: UserId,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggedIn {
    pub access_token: String,
    pub refresh_token: String,
    pub sid: SessionId,
    pub user_data: UserData,
}

#[derive(Debug, Serialize)]
pub struct UserData {
    pub email: String,
    pub id: UserId,
    pub cards: Vec<Card>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Refreshed {
    pub new_access_token: String,
    pub new_refresh_token: String,
    pub new_sid: SessionId,
}

fn bearer(header: Option<&str>) -> Result<Bearer> {
    let header = header.ok_or_else(|| Error::BadRequest("No token provided".into()))?;

    header.parse().map_err(|e| {
        debug!("bad authorization header: {e}");
        Error::Unauthorized
    })
}

fn invalid_cardid() -> Error {
    Error::BadRequest("Invalid 'cardId'".into())
}

fn lookup<T>(found: result::Result<T, FindError>, what: &str) -> Result<T> {
    found.map_err(|e| match e {
        FindError::NotFound => Error::NotFound(format!("Invalid {what}")),
        FindError::Internal => Error::Internal,
    })
}

impl CardTrack {
    pub fn new(backend: Backend, keys: TokenKeys) -> Self {
        Self { backend, keys }
    }

    pub async fn register(&self, creds: Credentials) -> Result<Registered> {
        let email = &creds.email;
        let taken = || {
            info!("rejecting duplicate registration for {email}");
            Error::Conflict(format!("User with {email} email already exists"))
        };

        match self.backend.find_user_by_email(email).await {
            Ok(_) => return Err(taken()),
            Err(FindError::NotFound) => {}
            Err(FindError::Internal) => return Err(Error::Internal),
        }

        // a concurrent registration may have claimed the email since
        let user = User::new(creds.email.clone(), creds.calc_pwhash());
        self.backend.create_user(&user).await.map_err(|e| match e {
            CreateError::EmailTaken => taken(),
            CreateError::Internal => Error::Internal,
        })?;

        info!("{email} registered as {}", user.id);
        Ok(Registered {
            email: user.email,
            id: user.id,
        })
    }

    pub async fn login(&self, creds: Credentials) -> Result<LoggedIn> {
        let email = &creds.email;

        let user = self.backend.find_user_by_email(email).await.map_err(|e| {
            if matches!(e, FindError::NotFound) {
                error!("rejecting non-existant user {email}");
                Error::Forbidden(format!("User with {email} email doesn't exist"))
            } else {
                error!("couldn't authenticate user {email}: {e:?}");
                Error::Internal
            }
        })?;

        if !creds.matches(&user.pwhash) {
            error!("wrong password for user {email}");
            return Err(Error::Forbidden("Password is wrong".into()));
        }

        let (session, tokens) = self.open_session(user.id).await?;
        info!("{email} login: new session {}", session.id);

        Ok(LoggedIn {
            access_token: tokens.access,
            refresh_token: tokens.refresh,
            sid: session.id,
            user_data: UserData {
                email: user.email,
                id: user.id,
                cards: user.cards,
            },
        })
    }

    /// Swaps the session `sid` for a new one, given a refresh token minted
    /// for it. A refresh token that fails to verify ends the session.
    pub async fn refresh(&self, header: Option<&str>, sid: SessionId) -> Result<Refreshed> {
        let bearer = bearer(header)?;
        let session = lookup(self.backend.find_session(&sid).await, "session")?;

        let claims = match self.keys.verify(TokenKind::Refresh, bearer.token()) {
            Ok(claims) => claims,
            Err(()) => {
                info!("bad refresh token for session {sid}, ending it");
                self.backend
                    .delete_session(&sid)
                    .await
                    .map_err(|()| Error::Internal)?;
                return Err(Error::Unauthorized);
            }
        };

        if claims.sid != session.id || claims.uid != session.uid {
            error!(
                "refresh token for {{ uid: {}, sid: {} }} presented for session {sid}",
                claims.uid, claims.sid,
            );
            return Err(Error::Unauthorized);
        }

        let user = lookup(self.backend.find_user(&claims.uid).await, "user")?;

        self.backend
            .delete_session(&sid)
            .await
            .map_err(|()| Error::Internal)?;
        let (session, tokens) = self.open_session(user.id).await?;

        info!("{} refreshed session {sid} -> {}", user.email, session.id);
        Ok(Refreshed {
            new_access_token: tokens.access,
            new_refresh_token: tokens.refresh,
            new_sid: session.id,
        })
    }

    pub async fn authenticate(self: &Arc<Self>, header: Option<&str>) -> Result<CardTrackAuthed> {
        let bearer = bearer(header)?;

        let claims = self
            .keys
            .verify(TokenKind::Access, bearer.token())
            .map_err(|()| Error::Unauthorized)?;

        let session = lookup(self.backend.find_session(&claims.sid).await, "session")?;
        if session.uid != claims.uid {
            error!(
                "session {} belongs to {}, token claims {}",
                session.id, session.uid, claims.uid
            );
            return Err(Error::Unauthorized);
        }

        let user = lookup(self.backend.find_user(&claims.uid).await, "user")?;

        debug!("found user by session");
        Ok(CardTrackAuthed {
            sync: Arc::clone(self),
            session,
            user,
        })
    }

    async fn open_session(&self, uid: UserId) -> Result<(Session, TokenPair)> {
        let session = Session::new(uid);

        self.backend
            .create_session(&session)
            .await
            .map_err(|()| Error::Internal)?;

        let tokens = self
            .keys
            .mint_pair(uid, session.id)
            .map_err(|()| Error::Internal)?;

        Ok((session, tokens))
    }
}

impl CardTrackAuthed {
    pub fn email(&self) -> &str {
        &self.user.email
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session.id
    }

    pub async fn logout(self) -> Result<()> {
        let email = self.email();
        let sid = self.session_id();
        info!("{email} logout, ending session {sid}");

        self.sync
            .backend
            .delete_session(sid)
            .await
            .map_err(|()| Error::Internal)
    }

    pub fn cards(&self) -> &[Card] {
        trace!("{} listing {} cards", self.email(), self.user.cards.len());
        &self.user.cards
    }

    pub async fn create_card(&mut self, new: NewCard) -> Result<Card> {
        let card = self.user.add_card(Card::new(new)).clone();
        self.save().await?;

        info!("{} created card {}", self.email(), card.id);
        Ok(card)
    }

    pub async fn edit_card(&mut self, id: &CardId, edit: CardEdit) -> Result<Card> {
        let card = self.user.card_mut(id).ok_or_else(invalid_cardid)?;
        card.apply(edit);
        let card = card.clone();

        self.save().await?;

        info!("{} edited card {id}", self.email());
        Ok(card)
    }

    pub async fn complete_card(&mut self, id: &CardId) -> Result<Card> {
        let card = self.user.card_mut(id).ok_or_else(invalid_cardid)?;
        card.complete().map_err(|_| {
            debug!("card {id} already completed");
            Error::Forbidden("This card is already completed".into())
        })?;
        let card = card.clone();

        self.save().await?;

        info!("{} completed card {id}", self.email());
        Ok(card)
    }

    pub async fn delete_card(&mut self, id: &CardId) -> Result<()> {
        self.user.remove_card(id).ok_or_else(invalid_cardid)?;
        self.save().await?;

        info!("{} deleted card {id}", self.email());
        Ok(())
    }

    async fn save(&self) -> Result<()> {
        self.sync
            .backend
            .save_user(&self.user)
            .await
            .map_err(|()| Error::Internal)
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::*;
    use crate::backend::test::{create_backend, TestGuard};
    use crate::card::{new_card, CardDifficulty, CardStatus};

    async fn create_cardtrack() -> (TestGuard, Arc<CardTrack>) {
        let (guard, backend) = create_backend().await;
        let keys = TokenKeys::new(
            b"test-secret",
            Duration::from_secs(3600),
            Duration::from_secs(7200),
        );
        (guard, Arc::new(CardTrack::new(backend, keys)))
    }

    fn creds() -> Credentials {
        Credentials {
            email: "test@email.com".into(),
            password: "qwerty123".into(),
        }
    }

    async fn logged_in(sync: &Arc<CardTrack>) -> (LoggedIn, CardTrackAuthed) {
        sync.register(creds()).await.unwrap();
        let login = sync.login(creds()).await.unwrap();
        let header = format!("Bearer {}", login.access_token);
        let authed = sync.authenticate(Some(&header)).await.unwrap();
        (login, authed)
    }

    #[tokio::test]
    async fn register_twice() {
        let (_guard, sync) = create_cardtrack().await;

        let registered = sync.register(creds()).await.unwrap();
        assert_eq!(registered.email, "test@email.com");

        assert_eq!(
            sync.register(creds()).await.unwrap_err(),
            Error::Conflict("User with test@email.com email already exists".into())
        );
    }

    #[tokio::test]
    async fn login_failures() {
        let (_guard, sync) = create_cardtrack().await;

        assert_eq!(
            sync.login(creds()).await.unwrap_err(),
            Error::Forbidden("User with test@email.com email doesn't exist".into())
        );

        sync.register(creds()).await.unwrap();
        let wrong = Credentials {
            password: "qwerty124".into(),
            ..creds()
        };
        assert_eq!(
            sync.login(wrong).await.unwrap_err(),
            Error::Forbidden("Password is wrong".into())
        );
    }

    #[tokio::test]
    async fn authenticate_rejections() {
        let (_guard, sync) = create_cardtrack().await;
        let (login, _) = logged_in(&sync).await;

        let err = |r: Result<CardTrackAuthed>| r.err().unwrap();

        assert_eq!(
            err(sync.authenticate(None).await),
            Error::BadRequest("No token provided".into())
        );
        assert_eq!(
            err(sync.authenticate(Some("Bearer qwerty123")).await),
            Error::Unauthorized
        );
        assert_eq!(
            err(sync.authenticate(Some(&login.access_token)).await),
            Error::Unauthorized
        );

        let refresh = format!("Bearer {}", login.refresh_token);
        assert_eq!(
            err(sync.authenticate(Some(&refresh)).await),
            Error::Unauthorized
        );
    }

    #[tokio::test]
    async fn session_must_belong_to_token_user() {
        let (_guard, sync) = create_cardtrack().await;
        let (login, _) = logged_in(&sync).await;

        let token = sync
            .keys
            .mint(TokenKind::Access, UserId::new(), login.sid)
            .unwrap();
        let header = format!("Bearer {token}");

        assert_eq!(
            sync.authenticate(Some(&header)).await.err().unwrap(),
            Error::Unauthorized
        );
    }

    #[tokio::test]
    async fn session_for_missing_user() {
        let (_guard, sync) = create_cardtrack().await;

        let session = Session::new(UserId::new());
        sync.backend.create_session(&session).await.unwrap();

        let token = sync
            .keys
            .mint(TokenKind::Access, session.uid, session.id)
            .unwrap();
        let header = format!("Bearer {token}");

        assert_eq!(
            sync.authenticate(Some(&header)).await.err().unwrap(),
            Error::NotFound("Invalid user".into())
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_registrations() {
        let (_guard, sync) = create_cardtrack().await;

        let registrations: Vec<_> = (0..8)
            .map(|_| {
                let sync = Arc::clone(&sync);
                tokio::spawn(async move { sync.register(creds()).await })
            })
            .collect();

        let mut registered = 0;
        for registration in registrations {
            match registration.await.unwrap() {
                Ok(_) => registered += 1,
                Err(e) => assert_eq!(
                    e,
                    Error::Conflict("User with test@email.com email already exists".into())
                ),
            }
        }
        assert_eq!(registered, 1);

        sync.login(creds()).await.unwrap();
    }

    #[tokio::test]
    async fn logout_revokes_tokens() {
        let (_guard, sync) = create_cardtrack().await;
        let (login, authed) = logged_in(&sync).await;

        assert_eq!(authed.session_id(), &login.sid);
        authed.logout().await.unwrap();

        let header = format!("Bearer {}", login.access_token);
        assert_eq!(
            sync.authenticate(Some(&header)).await.err().unwrap(),
            Error::NotFound("Invalid session".into())
        );
    }

    #[tokio::test]
    async fn refresh_rotates_session() {
        let (_guard, sync) = create_cardtrack().await;
        let (login, _) = logged_in(&sync).await;
        let header = format!("Bearer {}", login.refresh_token);

        let refreshed = sync.refresh(Some(&header), login.sid).await.unwrap();
        assert_ne!(refreshed.new_sid, login.sid);

        // old session is gone, along with its tokens
        let old = format!("Bearer {}", login.access_token);
        assert!(sync.authenticate(Some(&old)).await.is_err());
        assert_eq!(
            sync.refresh(Some(&header), login.sid).await.unwrap_err(),
            Error::NotFound("Invalid session".into())
        );

        let new = format!("Bearer {}", refreshed.new_access_token);
        let authed = sync.authenticate(Some(&new)).await.unwrap();
        assert_eq!(authed.session_id(), &refreshed.new_sid);
    }

    #[tokio::test]
    async fn bad_refresh_token_ends_session() {
        let (_guard, sync) = create_cardtrack().await;
        let (login, _) = logged_in(&sync).await;

        // an access token is not a refresh token
        let header = format!("Bearer {}", login.access_token);
        assert_eq!(
            sync.refresh(Some(&header), login.sid).await.unwrap_err(),
            Error::Unauthorized
        );

        let header = format!("Bearer {}", login.refresh_token);
        assert_eq!(
            sync.refresh(Some(&header), login.sid).await.unwrap_err(),
            Error::NotFound("Invalid session".into())
        );
    }

    #[tokio::test]
    async fn refresh_token_for_other_session() {
        let (_guard, sync) = create_cardtrack().await;
        let (first, _) = logged_in(&sync).await;
        let second = sync.login(creds()).await.unwrap();
        assert_ne!(first.sid, second.sid);

        let header = format!("Bearer {}", first.refresh_token);
        assert_eq!(
            sync.refresh(Some(&header), second.sid).await.unwrap_err(),
            Error::Unauthorized
        );

        // neither session was ended by the mismatch
        let header = format!("Bearer {}", second.refresh_token);
        sync.refresh(Some(&header), second.sid).await.unwrap();
        let header = format!("Bearer {}", first.refresh_token);
        sync.refresh(Some(&header), first.sid).await.unwrap();
    }

    #[tokio::test]
    async fn card_lifecycle() {
        let (_guard, sync) = create_cardtrack().await;
        let (login, mut authed) = logged_in(&sync).await;

        let card = authed.create_card(new_card("Test")).await.unwrap();
        assert_eq!(card.status, CardStatus::Incomplete);
        assert_eq!(authed.cards().len(), 1);

        let edited = authed
            .edit_card(
                &card.id,
                CardEdit {
                    difficulty: Some(CardDifficulty::Hard),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(edited.difficulty, CardDifficulty::Hard);
        assert_eq!(edited.title, "Test");

        let completed = authed.complete_card(&card.id).await.unwrap();
        assert_eq!(completed.status, CardStatus::Complete);
        assert_eq!(
            authed.complete_card(&card.id).await.unwrap_err(),
            Error::Forbidden("This card is already completed".into())
        );

        // changes were persisted, not just held in memory
        let header = format!("Bearer {}", login.access_token);
        let mut fresh = sync.authenticate(Some(&header)).await.unwrap();
        assert_eq!(fresh.cards(), &[completed]);

        fresh.delete_card(&card.id).await.unwrap();
        assert!(fresh.cards().is_empty());
        assert_eq!(
            fresh.delete_card(&card.id).await.unwrap_err(),
            Error::BadRequest("Invalid 'cardId'".into())
        );
    }

    #[tokio::test]
    async fn unknown_card() {
        let (_guard, sync) = create_cardtrack().await;
        let (_, mut authed) = logged_in(&sync).await;

        assert_eq!(
            authed
                .edit_card(&CardId::new(), CardEdit::default())
                .await
                .unwrap_err(),
            Error::BadRequest("Invalid 'cardId'".into())
        );
        assert_eq!(
            authed.complete_card(&CardId::new()).await.unwrap_err(),
            Error::BadRequest("Invalid 'cardId'".into())
        );
    }
}
