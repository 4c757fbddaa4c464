//! Typed calls over reqwest against the warp service

use pulse_model::{CandidateId, LocationUpdate, OfficeId, PreferenceDraft, SESSION_COOKIE};
use pulse_remote::{
    paths, HttpTransport, RemoteApi, Request, Transport, TransportAdapter, TransportError,
};
use pulse_server::{build_service, routes, ServerConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

async fn serve() -> (SocketAddr, oneshot::Sender<()>) {
    let service = build_service(&ServerConfig::new()).await.unwrap();
    let (stop, stopped) = oneshot::channel::<()>();
    let (addr, server) = routes::bind(service, "127.0.0.1:0".parse().unwrap(), async {
        let _ = stopped.await;
    })
    .unwrap();
    tokio::spawn(server);
    (addr, stop)
}

fn api(addr: SocketAddr) -> RemoteApi {
    let transport = HttpTransport::new(format!("http://{addr}")).unwrap();
    RemoteApi::new(TransportAdapter::new(Arc::new(transport)), Duration::from_secs(5))
}

#[tokio::test]
async fn session_cookie_is_set_once() {
    let (addr, _stop) = serve().await;
    let transport = HttpTransport::new(format!("http://{addr}")).unwrap();

    let first = transport.send(Request::post(paths::SESSION_INIT)).await.unwrap();
    assert_eq!(first.status, 200);
    let init: pulse_model::SessionInit = first.decode().unwrap();

    let again = transport
        .send(
            Request::post(paths::SESSION_INIT)
                .header("Cookie", format!("{SESSION_COOKIE}={}", init.session_id)),
        )
        .await
        .unwrap();
    let recovered: pulse_model::SessionInit = again.decode().unwrap();
    assert_eq!(recovered.user.id, init.user.id);
}

#[tokio::test]
async fn profile_and_preference_flow() {
    let (addr, _stop) = serve().await;
    let api = api(addr);

    let init = api.init_session(Duration::from_secs(2)).await.unwrap();
    assert_eq!(api.session(), Some(init.session_id.clone()));

    let user = api.accept_standards().await.unwrap();
    assert!(user.standards_accepted);
    let user = api
        .update_location(&LocationUpdate::new("Lagos", "Ikeja"))
        .await
        .unwrap();
    assert!(user.onboarded());

    let candidates = api
        .candidates(&OfficeId::new("lga_chair"), "Lagos", "Ikeja", None)
        .await
        .unwrap();
    assert_eq!(candidates.len(), 2);

    let saved = api
        .save_preference(&PreferenceDraft::new("gov", "g1").with_reasons(["Economy"]))
        .await
        .unwrap();
    assert_eq!(saved.user_id, user.id);
    assert!(!saved.provisional);

    let pulse = api.pulse("Lagos").await.unwrap();
    assert_eq!(pulse[&OfficeId::new("gov")].total_votes(), 1);
}

#[tokio::test]
async fn errors_carry_status() {
    let (addr, _stop) = serve().await;
    let api = api(addr);

    assert!(api.candidate(&CandidateId::new("nobody")).await.unwrap().is_none());

    let err = api
        .save_preference(&PreferenceDraft::new("pres", "p1"))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(401));

    let err = api.pulse(" ").await.unwrap_err();
    assert!(matches!(err, TransportError::Http { status: 400, .. }));
}

#[tokio::test]
async fn closed_port_is_unreachable() {
    let (addr, stop) = serve().await;
    drop(stop);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = api(addr).offices().await.unwrap_err();
    assert!(err.is_unreachable());
}
