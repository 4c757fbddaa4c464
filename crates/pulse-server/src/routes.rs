//! HTTP surface under `/api`
//!
//! Thin warp filters over [`PulseService`]. Errors travel as a custom
//! rejection and are rendered as `{"error": "..."}` with the status from
//! [`ServerError::status`].

use crate::error::ServerError;
use crate::service::{CandidateQuery, PulseService};
use pulse_model::{CandidateId, LocationUpdate, PreferenceDraft, SessionId, SESSION_COOKIE};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use warp::http::{header, HeaderValue, StatusCode};
use warp::{Filter, Rejection, Reply};

/// Session cookie lifetime (one year)
pub const SESSION_MAX_AGE_SECS: u64 = 60 * 60 * 24 * 365;

const MAX_BODY_BYTES: u64 = 16 * 1024;

#[derive(Debug)]
struct ApiRejection(ServerError);

impl warp::reject::Reject for ApiRejection {}

fn reject(err: ServerError) -> Rejection {
    warp::reject::custom(ApiRejection(err))
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Deserialize)]
struct PulseQuery {
    #[serde(default)]
    state: Option<String>,
}

/// `Set-Cookie` value for a newly issued session
#[must_use]
pub fn session_cookie(session: &SessionId) -> String {
    format!(
        "{SESSION_COOKIE}={session}; Path=/; HttpOnly; SameSite=Strict; Max-Age={SESSION_MAX_AGE_SECS}"
    )
}

fn json_body<T>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone
where
    T: DeserializeOwned + Send,
{
    warp::body::content_length_limit(MAX_BODY_BYTES).and(warp::body::json())
}

/// All API routes with error recovery
pub fn routes(
    service: Arc<PulseService>,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone + Send + Sync + 'static {
    let with_service = warp::any().map(move || service.clone());
    let session = warp::cookie::optional::<String>(SESSION_COOKIE)
        .map(|cookie: Option<String>| cookie.map(SessionId::new));

    let session_init = warp::path!("session" / "init")
        .and(warp::post())
        .and(with_service.clone())
        .and(session.clone())
        .and_then(session_init);

    let standards = warp::path!("user" / "standards")
        .and(warp::post())
        .and(with_service.clone())
        .and(session.clone())
        .and_then(accept_standards);

    let location = warp::path!("user" / "location")
        .and(warp::post())
        .and(with_service.clone())
        .and(session.clone())
        .and(json_body::<LocationUpdate>())
        .and_then(update_location);

    let offices = warp::path!("offices")
        .and(warp::get())
        .and(with_service.clone())
        .and_then(offices);

    let candidates = warp::path!("candidates")
        .and(warp::get())
        .and(with_service.clone())
        .and(warp::query::<CandidateQuery>())
        .and_then(candidates);

    let candidate = warp::path!("candidates" / String)
        .and(warp::get())
        .and(with_service.clone())
        .and_then(candidate);

    let preferences = warp::path!("preferences")
        .and(warp::post())
        .and(with_service.clone())
        .and(session)
        .and(json_body::<PreferenceDraft>())
        .and_then(save_preference);

    let pulse = warp::path!("pulse")
        .and(warp::get())
        .and(with_service)
        .and(warp::query::<PulseQuery>())
        .and_then(pulse);

    warp::path("api")
        .and(
            session_init
                .or(standards)
                .or(location)
                .or(offices)
                .or(candidates)
                .or(candidate)
                .or(preferences)
                .or(pulse),
        )
        .recover(handle_rejection)
        .with(warp::trace::request())
}

/// Bind and return the bound address plus the server future
///
/// # Errors
/// `Config` when the address cannot be bound
pub fn bind(
    service: Arc<PulseService>,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(SocketAddr, impl Future<Output = ()>), ServerError> {
    warp::serve(routes(service))
        .try_bind_with_graceful_shutdown(addr, shutdown)
        .map_err(|e| ServerError::Config(format!("bind {addr}: {e}")))
}

async fn session_init(
    service: Arc<PulseService>,
    session: Option<SessionId>,
) -> Result<warp::reply::Response, Rejection> {
    let grant = service.init_session(session).await.map_err(reject)?;
    let mut response = warp::reply::json(&grant.init).into_response();
    if grant.created {
        let cookie = HeaderValue::from_str(&session_cookie(&grant.init.session_id))
            .map_err(|e| reject(ServerError::Internal(e.to_string())))?;
        response.headers_mut().insert(header::SET_COOKIE, cookie);
    }
    Ok(response)
}

async fn accept_standards(
    service: Arc<PulseService>,
    session: Option<SessionId>,
) -> Result<impl Reply, Rejection> {
    let user = service
        .accept_standards(session.as_ref())
        .await
        .map_err(reject)?;
    Ok(warp::reply::json(&user))
}

async fn update_location(
    service: Arc<PulseService>,
    session: Option<SessionId>,
    update: LocationUpdate,
) -> Result<impl Reply, Rejection> {
    let user = service
        .update_location(session.as_ref(), &update)
        .await
        .map_err(reject)?;
    Ok(warp::reply::json(&user))
}

async fn offices(service: Arc<PulseService>) -> Result<impl Reply, Rejection> {
    let offices = service.offices().await.map_err(reject)?;
    Ok(warp::reply::json(&offices))
}

async fn candidates(
    service: Arc<PulseService>,
    query: CandidateQuery,
) -> Result<impl Reply, Rejection> {
    let list = service.candidates(&query).await.map_err(reject)?;
    Ok(warp::reply::json(&list))
}

async fn candidate(id: String, service: Arc<PulseService>) -> Result<impl Reply, Rejection> {
    let found = service
        .candidate(&CandidateId::new(id))
        .await
        .map_err(reject)?;
    Ok(warp::reply::json(&found))
}

async fn save_preference(
    service: Arc<PulseService>,
    session: Option<SessionId>,
    draft: PreferenceDraft,
) -> Result<impl Reply, Rejection> {
    let saved = service
        .save_preference(session.as_ref(), draft)
        .await
        .map_err(reject)?;
    Ok(warp::reply::json(&saved))
}

async fn pulse(service: Arc<PulseService>, query: PulseQuery) -> Result<impl Reply, Rejection> {
    let pulse = service
        .pulse(query.state.as_deref())
        .await
        .map_err(reject)?;
    Ok(warp::reply::json(&pulse))
}

async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, message) = if let Some(ApiRejection(e)) = err.find::<ApiRejection>() {
        let status =
            StatusCode::from_u16(e.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::warn!(error = %e, "request failed");
        }
        (status, e.to_string())
    } else if err.is_not_found() {
        (StatusCode::NOT_FOUND, "route not found".to_string())
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if let Some(e) = err.find::<warp::reject::InvalidQuery>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "payload too large".to_string())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "method not allowed".to_string())
    } else {
        tracing::warn!(?err, "unhandled rejection");
        (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
    };

    Ok(warp::reply::with_status(
        warp::reply::json(&ErrorBody { error: message }),
        status,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryRepository;
    use crate::seed::seed_catalog;
    use pretty_assertions::assert_eq;
    use pulse_model::{Candidate, Office, SessionInit, DISCLOSURE_THRESHOLD};

    async fn service() -> Arc<PulseService> {
        let repo = Arc::new(MemoryRepository::new());
        seed_catalog(&*repo).await.unwrap();
        Arc::new(PulseService::new(repo, DISCLOSURE_THRESHOLD))
    }

    fn cookie_of(response: &warp::http::Response<warp::hyper::body::Bytes>) -> Option<String> {
        response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    #[tokio::test]
    async fn session_init_sets_cookie_once() {
        let api = routes(service().await);

        let first = warp::test::request()
            .method("POST")
            .path("/api/session/init")
            .reply(&api)
            .await;
        assert_eq!(first.status(), 200);
        let cookie = cookie_of(&first).unwrap();
        assert!(cookie.starts_with("vb_session="));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Strict"));
        assert!(cookie.contains("Max-Age=31536000"));

        let init: SessionInit = serde_json::from_slice(first.body()).unwrap();
        let again = warp::test::request()
            .method("POST")
            .path("/api/session/init")
            .header("cookie", format!("vb_session={}", init.session_id))
            .reply(&api)
            .await;
        assert_eq!(again.status(), 200);
        assert!(cookie_of(&again).is_none());
        let recovered: SessionInit = serde_json::from_slice(again.body()).unwrap();
        assert_eq!(recovered.user.id, init.user.id);
    }

    #[tokio::test]
    async fn preferences_without_cookie_is_401() {
        let api = routes(service().await);
        let res = warp::test::request()
            .method("POST")
            .path("/api/preferences")
            .json(&PreferenceDraft::new("pres", "p1"))
            .reply(&api)
            .await;
        assert_eq!(res.status(), 401);
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert!(body["error"].as_str().unwrap().contains("session"));
    }

    #[tokio::test]
    async fn malformed_body_is_400() {
        let api = routes(service().await);
        let res = warp::test::request()
            .method("POST")
            .path("/api/preferences")
            .header("cookie", "vb_session=anything")
            .header("content-type", "application/json")
            .body("{\"officeId\": 3}")
            .reply(&api)
            .await;
        assert_eq!(res.status(), 400);
    }

    #[tokio::test]
    async fn catalog_reads() {
        let api = routes(service().await);

        let res = warp::test::request().path("/api/offices").reply(&api).await;
        assert_eq!(res.status(), 200);
        let offices: Vec<Office> = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(offices.len(), 7);

        let res = warp::test::request()
            .path("/api/candidates?officeId=gov&state=Lagos&lga=Ikeja")
            .reply(&api)
            .await;
        let list: Vec<Candidate> = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(list.len(), 2);

        let res = warp::test::request().path("/api/candidates/p2").reply(&api).await;
        let one: Candidate = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(one.name, "Candidate B");

        let res = warp::test::request().path("/api/candidates/zzz").reply(&api).await;
        assert_eq!(res.status(), 404);

        let res = warp::test::request().path("/api/candidates").reply(&api).await;
        assert_eq!(res.status(), 400);
    }

    #[tokio::test]
    async fn pulse_without_state_is_400() {
        let api = routes(service().await);
        let res = warp::test::request().path("/api/pulse").reply(&api).await;
        assert_eq!(res.status(), 400);

        let res = warp::test::request().path("/api/pulse?state=Lagos").reply(&api).await;
        assert_eq!(res.status(), 200);
    }

    #[tokio::test]
    async fn wrong_method_and_unknown_route() {
        let api = routes(service().await);
        let res = warp::test::request().method("GET").path("/api/preferences").reply(&api).await;
        assert_eq!(res.status(), 405);

        let res = warp::test::request().path("/api/nothing").reply(&api).await;
        assert_eq!(res.status(), 404);
    }
}
