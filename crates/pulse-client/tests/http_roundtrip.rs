//! Client against the real HTTP service on a loopback socket

use pulse_client::{ClientConfig, MemoryStore, PulseClient};
use pulse_model::{OfficeId, PreferenceDraft};
use pulse_remote::HttpTransport;
use pulse_server::{build_service, routes, ServerConfig};
use pulse_test_utils::lagos;
use std::sync::Arc;
use tokio::sync::oneshot;

#[tokio::test]
async fn save_and_read_over_http() {
    let service = build_service(&ServerConfig::new()).await.unwrap();
    let (stop, stopped) = oneshot::channel::<()>();
    let (addr, server) = routes::bind(service.clone(), "127.0.0.1:0".parse().unwrap(), async {
        let _ = stopped.await;
    })
    .unwrap();
    let server = tokio::spawn(server);

    let transport = Arc::new(HttpTransport::new(format!("http://{addr}")).unwrap());
    let client = PulseClient::new(ClientConfig::new(), transport, Arc::new(MemoryStore::new()));

    let user = client.start().await;
    assert!(!user.id.is_offline());
    let located = client.update_location(lagos()).await.unwrap();
    assert_eq!(located.state, "Lagos");
    assert!(located.onboarded());

    assert_eq!(client.offices().await.len(), 7);
    let gov = OfficeId::new("gov");
    assert_eq!(client.candidates(&gov).await.len(), 2);

    let receipt = client.save(PreferenceDraft::new("gov", "g2")).await.unwrap();
    let outcome = receipt.confirmation.await.unwrap().unwrap();
    let confirmed = outcome.confirmed().unwrap();
    assert_eq!(confirmed.user_id, user.id);
    assert!(!client.preference(&gov).unwrap().provisional);

    let pulse = client.pulse().await;
    assert_eq!(pulse[&gov].total_votes(), 1);
    assert!(!pulse[&gov].allowed());

    // Same session on the next resolution
    assert_eq!(client.refresh_user().await.id, user.id);

    let _ = stop.send(());
    server.await.unwrap();
}
