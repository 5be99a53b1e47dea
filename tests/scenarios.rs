//! End-to-end scenarios against a local mock WebSocket server, mirroring §8's literal
//! scenarios S1-S6.

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use xrpl_ws_client::{Client, ClientConfig, Event};

async fn mock_server() -> (String, TcpListener) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (format!("ws://{addr}"), listener)
}

async fn accept_one(listener: &TcpListener) -> WebSocketStream<TcpStream> {
    let (stream, _) = listener.accept().await.unwrap();
    tokio_tungstenite::accept_async(stream).await.unwrap()
}

/// Answer the two startup probes (internal ledger subscription + server_info) with a
/// minimal valid response each, mirroring whatever id the client sent.
async fn answer_startup_probes(ws: &mut WebSocketStream<TcpStream>) {
    for _ in 0..2 {
        let msg = ws.next().await.unwrap().unwrap();
        let text = msg.into_text().unwrap();
        let req: Value = serde_json::from_str(&text).unwrap();
        let id = req["id"].clone();
        let command = req["command"].as_str().unwrap().to_string();
        let reply = if command == "server_info" {
            json!({
                "id": id,
                "result": {
                    "info": {
                        "pubkey_node": "n9Mock",
                        "build_version": "2.2.0",
                        "complete_ledgers": "1-100",
                        "uptime": 10,
                        "load_factor": 256,
                        "validated_ledger": { "base_fee_xrp": 0.00001 }
                    }
                }
            })
        } else {
            json!({ "id": id, "result": {"status": "success"} })
        };
        ws.send(Message::Text(reply.to_string())).await.unwrap();
    }
}

#[tokio::test]
async fn s1_empty_endpoint_list_is_rejected() {
    let err = Client::connect(Vec::<String>::new(), ClientConfig::new())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "No valid WebSocket endpoint(s) specified");
}

#[tokio::test]
async fn s2_non_ws_scheme_is_rejected() {
    let err = Client::connect("http://x", ClientConfig::new())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "No valid WebSocket endpoint(s) specified");
}

#[tokio::test]
async fn s3_send_before_connect_resolves_after_online() {
    let (url, listener) = mock_server().await;
    let client = Client::connect(url, ClientConfig::new()).await.unwrap();

    let send_fut = client.send(json!({"command": "ledger_current"}));

    let mut ws = accept_one(&listener).await;
    answer_startup_probes(&mut ws).await;

    // The ledger_current call, queued before connect, flushes once we answer the probes
    // and the server_info resolution pushes the client Online.
    let msg = ws.next().await.unwrap().unwrap();
    let req: Value = serde_json::from_str(&msg.into_text().unwrap()).unwrap();
    assert_eq!(req["command"], "ledger_current");
    let id = req["id"].clone();

    ws.send(Message::Text(
        json!({"id": id, "result": {"ledger_current_index": 72}}).to_string(),
    ))
    .await
    .unwrap();

    let result = send_fut.await.unwrap();
    assert_eq!(result, json!({"ledger_current_index": 72}));

    let state = client.get_state().await.unwrap();
    assert!(state.online);

    client.close(None).await.unwrap();
}

#[tokio::test]
async fn s4_ledger_only_unsubscribe_is_rejected_synchronously() {
    let (url, listener) = mock_server().await;
    let client = Client::connect(url, ClientConfig::new()).await.unwrap();

    tokio::spawn(async move {
        let mut ws = accept_one(&listener).await;
        answer_startup_probes(&mut ws).await;
        // Keep the connection open for the duration of the test.
        loop {
            if ws.next().await.is_none() {
                break;
            }
        }
    });

    let err = client
        .send(json!({"command": "unsubscribe", "streams": ["ledger"]}))
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Unsubscribing from (just) the ledger stream is not allowed"
    );

    client.close(None).await.unwrap();
}

#[tokio::test]
async fn s3_ledger_event_transitions_online_and_emits() {
    let (url, listener) = mock_server().await;
    let client = Client::connect(url, ClientConfig::new()).await.unwrap();
    let mut events = client.events();

    let mut ws = accept_one(&listener).await;
    answer_startup_probes(&mut ws).await;

    ws.send(Message::Text(
        json!({
            "type": "ledgerClosed",
            "validated_ledgers": "1-101",
            "reserve_base": 20_000_000,
            "reserve_inc": 5_000_000
        })
        .to_string(),
    ))
    .await
    .unwrap();

    let mut saw_online = false;
    let mut saw_ledger = false;
    for _ in 0..10 {
        match tokio::time::timeout(std::time::Duration::from_secs(2), events.recv())
            .await
            .unwrap()
            .unwrap()
        {
            Event::Online => saw_online = true,
            Event::Ledger(_) => saw_ledger = true,
            _ => {}
        }
        if saw_online && saw_ledger {
            break;
        }
    }
    assert!(saw_online && saw_ledger);

    client.close(None).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn s5_endpoint_rotation_on_exhaustion() {
    // Endpoint A is a closed port (nothing listening) so every connect attempt fails
    // fast; endpoint B is a real mock server.
    let refused_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let refused_addr = refused_listener.local_addr().unwrap();
    drop(refused_listener); // now nothing is listening on this port

    let (url_b, listener_b) = mock_server().await;
    let url_a = format!("ws://{refused_addr}");

    let client = Client::connect(
        vec![url_a, url_b],
        ClientConfig::new().with_connect_attempt_timeout_seconds(1),
    )
    .await
    .unwrap();
    let mut events = client.events();

    let mut saw_node_switch = false;
    for _ in 0..20 {
        tokio::time::advance(std::time::Duration::from_millis(600)).await;
        match events.try_recv() {
            Ok(Event::NodeSwitch { endpoint }) => {
                assert!(endpoint.contains(&listener_b.local_addr().unwrap().port().to_string()));
                saw_node_switch = true;
                break;
            }
            _ => continue,
        }
    }
    assert!(saw_node_switch, "expected a NodeSwitch event after exhausting endpoint A");

    client.close(None).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn s6_watchdog_forces_reconnect_and_replays_subscriptions() {
    let (url, listener) = mock_server().await;
    let client = Client::connect(
        url,
        ClientConfig::new().with_assume_offline_after_seconds(2),
    )
    .await
    .unwrap();
    let mut events = client.events();

    let mut ws = accept_one(&listener).await;
    answer_startup_probes(&mut ws).await;
    loop {
        if matches!(events.recv().await.unwrap(), Event::Online) {
            break;
        }
    }

    // A real subscription, acked over the first connection; it must persist across the
    // watchdog-forced reconnect below and be replayed on the second connection.
    let send_fut = client.send(json!({"command": "subscribe", "streams": ["transactions"]}));
    let sub_req: Value =
        serde_json::from_str(&ws.next().await.unwrap().unwrap().into_text().unwrap()).unwrap();
    assert_eq!(sub_req["command"], "subscribe");
    let sub_id = sub_req["id"].clone();
    ws.send(Message::Text(
        json!({"id": sub_id, "result": {"status": "success"}}).to_string(),
    ))
    .await
    .unwrap();
    send_fut.await.unwrap();

    // Withhold every `ledgerClosed` frame past `assumeOfflineAfterSeconds=2`; the
    // liveness watchdog must force-close the transport.
    let mut saw_offline = false;
    let mut saw_retry = false;
    for _ in 0..40 {
        tokio::time::advance(std::time::Duration::from_millis(100)).await;
        match events.try_recv() {
            Ok(Event::Offline) => saw_offline = true,
            Ok(Event::Retry { .. }) if saw_offline => {
                saw_retry = true;
                break;
            }
            _ => continue,
        }
    }
    assert!(saw_offline, "expected Offline after the watchdog forced a close");
    assert!(saw_retry, "expected Retry scheduled after Offline");

    // Give the scheduled reconnect delay room to elapse, then accept the new transport.
    for _ in 0..10 {
        tokio::time::advance(std::time::Duration::from_millis(200)).await;
    }
    let mut ws2 = accept_one(&listener).await;
    answer_startup_probes(&mut ws2).await;

    let replayed: Value =
        serde_json::from_str(&ws2.next().await.unwrap().unwrap().into_text().unwrap()).unwrap();
    assert_eq!(replayed["command"], "subscribe");
    assert_eq!(replayed["streams"], json!(["transactions"]));

    client.close(None).await.unwrap();
}
