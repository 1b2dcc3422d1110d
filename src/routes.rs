use std::convert::Infallible;
use std::sync::Arc;

use log::{debug, error};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use warp::http::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use warp::http::StatusCode;
use warp::hyper::body::Bytes;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

use crate::auth::Credentials;
use crate::card::{Card, CardEdit, NewCard};
use crate::cardtrack::{CardTrack, Error, Result};
use crate::session::SessionId;
use crate::validate;

#[derive(Serialize)]
struct ErrorMessage<'a> {
    message: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
enum CardReply<'a> {
    CreatedCard(&'a Card),
    EditedCard(&'a Card),
    CompletedCard(&'a Card),
    Cards(&'a [Card]),
}

#[derive(Deserialize)]
struct RefreshBody {
    sid: SessionId,
}

pub fn routes(
    sync: Arc<CardTrack>,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    auth_routes(Arc::clone(&sync))
        .or(card_routes(sync))
        .recover(handle_rejection)
        .with(warp::log("cardtrack"))
}

fn auth_routes(
    sync: Arc<CardTrack>,
) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    let register = warp::path!("auth" / "register")
        .and(warp::post())
        .and(with_sync(&sync))
        .and(warp::body::bytes())
        .then(register)
        .map(respond);

    let login = warp::path!("auth" / "login")
        .and(warp::post())
        .and(with_sync(&sync))
        .and(warp::body::bytes())
        .then(login)
        .map(respond);

    let logout = warp::path!("auth" / "logout")
        .and(warp::post())
        .and(with_sync(&sync))
        .and(authorization())
        .then(logout)
        .map(respond);

    let refresh = warp::path!("auth" / "refresh")
        .and(warp::post())
        .and(with_sync(&sync))
        .and(authorization())
        .and(warp::body::bytes())
        .then(refresh)
        .map(respond);

    register.or(login).unify().or(logout).unify().or(refresh).unify()
}

fn card_routes(
    sync: Arc<CardTrack>,
) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    let create = warp::path!("card")
        .and(warp::post())
        .and(with_sync(&sync))
        .and(authorization())
        .and(warp::body::bytes())
        .then(create_card)
        .map(respond);

    let list = warp::path!("card")
        .and(warp::get())
        .and(with_sync(&sync))
        .and(authorization())
        .then(list_cards)
        .map(respond);

    let complete = warp::path!("card" / "complete" / String)
        .and(warp::patch())
        .and(with_sync(&sync))
        .and(authorization())
        .then(complete_card)
        .map(respond);

    let edit = warp::path!("card" / String)
        .and(warp::patch())
        .and(with_sync(&sync))
        .and(authorization())
        .and(warp::body::bytes())
        .then(edit_card)
        .map(respond);

    let delete = warp::path!("card" / String)
        .and(warp::delete())
        .and(with_sync(&sync))
        .and(authorization())
        .then(delete_card)
        .map(respond);

    create
        .or(list)
        .unify()
        .or(complete)
        .unify()
        .or(edit)
        .unify()
        .or(delete)
        .unify()
}

fn with_sync(
    sync: &Arc<CardTrack>,
) -> impl Filter<Extract = (Arc<CardTrack>,), Error = Infallible> + Clone {
    let sync = Arc::clone(sync);
    warp::any().map(move || Arc::clone(&sync))
}

/// The raw header, so a value that isn't UTF-8 reaches the handler instead of
/// being rejected during routing.
fn authorization() -> impl Filter<Extract = (Option<HeaderValue>,), Error = Infallible> + Clone {
    warp::header::headers_cloned().map(|headers: HeaderMap| headers.get(AUTHORIZATION).cloned())
}

fn header_str(auth: &Option<HeaderValue>) -> Result<Option<&str>> {
    auth.as_ref()
        .map(|value| {
            value.to_str().map_err(|e| {
                debug!("non-text authorization header: {e}");
                Error::Unauthorized
            })
        })
        .transpose()
}

/// An absent body reads as `{}`.
fn json(body: &Bytes) -> Result<Value> {
    if body.is_empty() {
        return Ok(Value::Object(Default::default()));
    }

    serde_json::from_slice(body).map_err(|e| {
        debug!("malformed json body: {e}");
        Error::BadRequest(format!("Invalid JSON body: {e}"))
    })
}

fn json_reply<T: Serialize>(status: StatusCode, body: &T) -> Response {
    warp::reply::with_status(warp::reply::json(body), status).into_response()
}

fn no_content() -> Response {
    warp::reply::with_status(warp::reply(), StatusCode::NO_CONTENT).into_response()
}

fn respond(result: Result<Response>) -> Response {
    match result {
        Ok(response) => response,
        Err(e) => {
            debug!("request failed: {} {}", e.status(), e.message());
            json_reply(e.status(), &ErrorMessage { message: e.message() })
        }
    }
}

async fn register(sync: Arc<CardTrack>, body: Bytes) -> Result<Response> {
    let creds: Credentials = validate::CREDENTIALS.validate(json(&body)?)?;
    let registered = sync.register(creds).await?;
    Ok(json_reply(StatusCode::CREATED, &registered))
}

async fn login(sync: Arc<CardTrack>, body: Bytes) -> Result<Response> {
    let creds: Credentials = validate::CREDENTIALS.validate(json(&body)?)?;
    let logged_in = sync.login(creds).await?;
    Ok(json_reply(StatusCode::OK, &logged_in))
}

async fn logout(sync: Arc<CardTrack>, auth: Option<HeaderValue>) -> Result<Response> {
    let authed = sync.authenticate(header_str(&auth)?).await?;
    authed.logout().await?;
    Ok(no_content())
}

async fn refresh(sync: Arc<CardTrack>, auth: Option<HeaderValue>, body: Bytes) -> Result<Response> {
    let RefreshBody { sid } = validate::REFRESH.validate(json(&body)?)?;
    let refreshed = sync.refresh(header_str(&auth)?, sid).await?;
    Ok(json_reply(StatusCode::OK, &refreshed))
}

async fn create_card(sync: Arc<CardTrack>, auth: Option<HeaderValue>, body: Bytes) -> Result<Response> {
    let mut authed = sync.authenticate(header_str(&auth)?).await?;
    let new: NewCard = validate::CREATE_CARD.validate(json(&body)?)?;

    let card = authed.create_card(new).await?;
    Ok(json_reply(StatusCode::CREATED, &CardReply::CreatedCard(&card)))
}

async fn list_cards(sync: Arc<CardTrack>, auth: Option<HeaderValue>) -> Result<Response> {
    let authed = sync.authenticate(header_str(&auth)?).await?;
    Ok(json_reply(StatusCode::OK, &CardReply::Cards(authed.cards())))
}

async fn edit_card(
    card_id: String,
    sync: Arc<CardTrack>,
    auth: Option<HeaderValue>,
    body: Bytes,
) -> Result<Response> {
    let mut authed = sync.authenticate(header_str(&auth)?).await?;
    let card_id = validate::card_id(&card_id)?;
    let edit: CardEdit = validate::EDIT_CARD.validate(json(&body)?)?;

    let card = authed.edit_card(&card_id, edit).await?;
    Ok(json_reply(StatusCode::OK, &CardReply::EditedCard(&card)))
}

async fn complete_card(
    card_id: String,
    sync: Arc<CardTrack>,
    auth: Option<HeaderValue>,
) -> Result<Response> {
    let mut authed = sync.authenticate(header_str(&auth)?).await?;
    let card_id = validate::card_id(&card_id)?;

    let card = authed.complete_card(&card_id).await?;
    Ok(json_reply(StatusCode::OK, &CardReply::CompletedCard(&card)))
}

async fn delete_card(
    card_id: String,
    sync: Arc<CardTrack>,
    auth: Option<HeaderValue>,
) -> Result<Response> {
    let mut authed = sync.authenticate(header_str(&auth)?).await?;
    let card_id = validate::card_id(&card_id)?;

    authed.delete_card(&card_id).await?;
    Ok(no_content())
}

async fn handle_rejection(err: Rejection) -> std::result::Result<Response, Infallible> {
    let (status, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found")
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
    } else {
        error!("unhandled rejection: {err:?}");
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    };

    Ok(json_reply(status, &ErrorMessage { message }))
}
