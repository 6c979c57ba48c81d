//! Integration tests for the connection manager

mod common;

use common::{init_tracing, settle, wait_for_state, ScriptedTransport};
use durasock::{
    ConnectOptions, ConnectionManager, ConnectionState, DuraSockError, Envelope, LinkCommand,
    SendOutcome, Transport,
};
use parking_lot::Mutex;
use std::sync::Arc;

/// Macro for verbose test output
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

fn manager_over(transport: &Arc<ScriptedTransport>) -> ConnectionManager {
    ConnectionManager::new(Arc::clone(transport) as Arc<dyn Transport>)
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_identity_is_rejected() {
    init_tracing();
    let transport = ScriptedTransport::new();
    let manager = manager_over(&transport);

    manager
        .create_connection("alpha", "scripted://a", ConnectOptions::new())
        .unwrap();
    let result = manager.create_connection("alpha", "scripted://b", ConnectOptions::new());
    assert!(matches!(
        result,
        Err(DuraSockError::DuplicateIdentity(identity)) if identity == "alpha"
    ));

    // The original registration survives intact
    assert_eq!(manager.connection_count(), 1);
    assert_eq!(manager.get_connection("alpha").unwrap().target(), "scripted://a");
}

#[tokio::test(start_paused = true)]
async fn test_dispatch_tags_messages_with_origin() {
    verbose_println!("Testing origin tagging through the shared router...");

    let transport = ScriptedTransport::new();
    let manager = manager_over(&transport);

    let origins: Arc<Mutex<Vec<Option<String>>>> = Arc::new(Mutex::new(Vec::new()));
    let origins_seen = Arc::clone(&origins);
    manager.router().add_route("quote", move |message| {
        origins_seen.lock().push(message.origin.clone());
        Ok(())
    });

    let alpha = manager
        .create_connection("alpha", "scripted://a", ConnectOptions::new())
        .unwrap();
    alpha.connect().unwrap();
    wait_for_state(&alpha, ConnectionState::Open).await;

    transport
        .last_link()
        .emit_envelope(&Envelope::new("quote").with_field("price", 9));
    settle().await;

    assert_eq!(*origins.lock(), [Some("alpha".to_string())]);
}

#[tokio::test(start_paused = true)]
async fn test_send_to_by_identity() {
    let transport = ScriptedTransport::new();
    let manager = manager_over(&transport);

    let result = manager.send_to("ghost", Envelope::new("ping")).await;
    assert!(matches!(
        result,
        Err(DuraSockError::UnknownIdentity(identity)) if identity == "ghost"
    ));

    let alpha = manager
        .create_connection("alpha", "scripted://a", ConnectOptions::new())
        .unwrap();

    // Not connected yet: the normal queueing semantics apply
    let outcome = manager.send_to("alpha", Envelope::new("ping")).await.unwrap();
    assert_eq!(outcome, SendOutcome::Queued);

    alpha.connect().unwrap();
    wait_for_state(&alpha, ConnectionState::Open).await;
    let outcome = manager.send_to("alpha", Envelope::new("ping")).await.unwrap();
    assert_eq!(outcome, SendOutcome::Sent);
}

#[tokio::test(start_paused = true)]
async fn test_broadcast_skips_excluded_and_unsendable() {
    verbose_println!("Testing broadcast delivery counting...");

    let transport = ScriptedTransport::new();
    let manager = manager_over(&transport);

    let alpha = manager
        .create_connection("alpha", "scripted://a", ConnectOptions::new())
        .unwrap();
    let beta = manager
        .create_connection("beta", "scripted://b", ConnectOptions::new())
        .unwrap();
    let gamma = manager
        .create_connection("gamma", "scripted://c", ConnectOptions::new())
        .unwrap();

    alpha.connect().unwrap();
    wait_for_state(&alpha, ConnectionState::Open).await;
    beta.connect().unwrap();
    wait_for_state(&beta, ConnectionState::Open).await;
    // gamma stays disconnected

    let delivered = manager.broadcast(Envelope::new("notice"), &["beta"]).await;
    assert_eq!(delivered, 1, "only alpha is sendable and not excluded");

    // Broadcast never queues: gamma's pending queue stays empty
    let metrics = gamma.metrics().await.unwrap();
    assert_eq!(metrics.pending_size, 0);

    let kinds: Vec<String> = transport
        .link(0)
        .drain_envelopes()
        .await
        .into_iter()
        .map(|envelope| envelope.kind)
        .collect();
    assert_eq!(kinds, ["notice"]);
    assert!(transport.link(1).try_next_command().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_remove_connection_closes_it() {
    let transport = ScriptedTransport::new();
    let manager = manager_over(&transport);

    let alpha = manager
        .create_connection("alpha", "scripted://a", ConnectOptions::new())
        .unwrap();
    alpha.connect().unwrap();
    wait_for_state(&alpha, ConnectionState::Open).await;

    manager.remove_connection("alpha");
    assert!(!manager.has_connection("alpha"));
    settle().await;

    let probe = transport.last_link();
    assert!(matches!(
        probe.next_command().await,
        Some(LinkCommand::Close { code: Some(1000), .. })
    ));
    probe.emit_closed(Some(1000), "bye");
    wait_for_state(&alpha, ConnectionState::Closed).await;

    // Removing an unknown identity is a no-op
    manager.remove_connection("alpha");
    manager.remove_connection("ghost");
    assert_eq!(manager.connection_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_manager_metrics_are_sorted_by_identity() {
    let transport = ScriptedTransport::new();
    let manager = manager_over(&transport);

    for identity in ["zulu", "alpha", "mike"] {
        manager
            .create_connection(identity, "scripted://endpoint", ConnectOptions::new())
            .unwrap();
    }

    let metrics = manager.metrics().await;
    assert_eq!(metrics.total_connections, 3);
    let identities: Vec<&str> = metrics
        .per_connection
        .iter()
        .map(|snapshot| snapshot.identity.as_str())
        .collect();
    assert_eq!(identities, ["alpha", "mike", "zulu"]);

    let mut listed = manager.identities();
    listed.sort();
    assert_eq!(listed, ["alpha", "mike", "zulu"]);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_closes_every_connection() {
    verbose_println!("Testing manager shutdown...");

    let transport = ScriptedTransport::new();
    let manager = manager_over(&transport);

    let alpha = manager
        .create_connection("alpha", "scripted://a", ConnectOptions::new())
        .unwrap();
    let beta = manager
        .create_connection("beta", "scripted://b", ConnectOptions::new())
        .unwrap();
    alpha.connect().unwrap();
    wait_for_state(&alpha, ConnectionState::Open).await;
    beta.connect().unwrap();
    wait_for_state(&beta, ConnectionState::Open).await;

    manager.shutdown();
    settle().await;

    for index in 0..2 {
        let probe = transport.link(index);
        assert!(matches!(
            probe.next_command().await,
            Some(LinkCommand::Close { .. })
        ));
        probe.emit_closed(Some(1000), "shutdown");
    }
    wait_for_state(&alpha, ConnectionState::Closed).await;
    wait_for_state(&beta, ConnectionState::Closed).await;
}
