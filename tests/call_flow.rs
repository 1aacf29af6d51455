//! End-to-end call flows: carrier and observer WebSockets against the real
//! router, with a local WebSocket server standing in for the speech endpoint.

mod common;

use serde_json::json;

use callbridge::ConnectionRole;
use common::{
    MockSpeechServer, connect_client, expect_closed, next_json, next_json_skipping, send_json,
    spawn_bridge, test_config,
};

fn start_event(stream_sid: &str) -> serde_json::Value {
    json!({
        "event": "start",
        "start": {"streamSid": stream_sid, "callSid": "CA1"}
    })
}

fn media_event(timestamp: i64, payload: &str) -> serde_json::Value {
    json!({
        "event": "media",
        "media": {"timestamp": timestamp.to_string(), "payload": payload}
    })
}

#[tokio::test]
async fn test_call_audio_and_barge_in() {
    let mut speech_server = MockSpeechServer::start().await;
    let (addr, _state) = spawn_bridge(test_config(&speech_server.url)).await;

    let mut observer = connect_client(addr, "/ws/logs").await;
    let mut call = connect_client(addr, "/ws/call").await;

    send_json(&mut call, start_event("MZ1")).await;
    let mut speech = speech_server.accept().await;

    // Session configuration goes out first
    let update = speech.recv().await;
    assert_eq!(update["type"], "session.update");
    assert_eq!(update["session"]["input_audio_format"], "g711_ulaw");
    assert_eq!(update["session"]["voice"], "ash");

    let notice = next_json(&mut observer).await;
    assert_eq!(
        notice,
        json!({
            "type": "connection_status",
            "status": "openai_connected",
            "message": "OpenAI connection established"
        })
    );

    // Caller audio is forwarded verbatim
    send_json(&mut call, media_event(1000, "dWxhdw==")).await;
    let append = speech.recv().await;
    assert_eq!(
        append,
        json!({"type": "input_audio_buffer.append", "audio": "dWxhdw=="})
    );

    // Assistant audio is played back with a mark
    let delta = json!({"type": "response.audio.delta", "item_id": "a1", "delta": "QUJD"});
    speech.send(delta.clone());
    assert_eq!(next_json(&mut observer).await, delta);
    assert_eq!(
        next_json(&mut call).await,
        json!({"event": "media", "streamSid": "MZ1", "media": {"payload": "QUJD"}})
    );
    assert_eq!(
        next_json(&mut call).await,
        json!({"event": "mark", "streamSid": "MZ1"})
    );

    // Playback started at 1000; the caller speaks at 1640
    send_json(&mut call, media_event(1640, "dWxhdw==")).await;
    speech.recv_type("input_audio_buffer.append").await;

    speech.send(json!({"type": "input_audio_buffer.speech_started"}));
    let truncate = speech.recv_type("conversation.item.truncate").await;
    assert_eq!(truncate["item_id"], "a1");
    assert_eq!(truncate["content_index"], 0);
    assert_eq!(truncate["audio_end_ms"], 640);
    assert_eq!(
        next_json(&mut call).await,
        json!({"event": "clear", "streamSid": "MZ1"})
    );

    // A second speech_started has nothing left to truncate
    speech.send(json!({"type": "input_audio_buffer.speech_started"}));
    speech.send(json!({"type": "response.done"}));
    assert_eq!(
        next_json(&mut observer).await["type"],
        "input_audio_buffer.speech_started"
    );
    assert_eq!(
        next_json_skipping(&mut observer, &["input_audio_buffer.speech_started"]).await["type"],
        "response.done"
    );
}

#[tokio::test]
async fn test_observer_session_update_and_function_call() {
    let mut speech_server = MockSpeechServer::start().await;
    let (addr, _state) = spawn_bridge(test_config(&speech_server.url)).await;

    let mut observer = connect_client(addr, "/ws/logs").await;
    let mut call = connect_client(addr, "/ws/call").await;
    send_json(&mut call, start_event("MZ2")).await;

    let mut speech = speech_server.accept().await;
    speech.recv_type("session.update").await;
    next_json(&mut observer).await;

    // Observer messages are forwarded unchanged
    let update = json!({
        "type": "session.update",
        "session": {"instructions": "Be brief", "voice": "alloy"}
    });
    send_json(&mut observer, update.clone()).await;
    assert_eq!(speech.recv().await, update);

    // Tool call for an unregistered function still completes the round-trip
    speech.send(json!({
        "type": "response.output_item.done",
        "item": {
            "type": "function_call",
            "name": "lookup_order",
            "arguments": "{}",
            "call_id": "call_1"
        }
    }));
    let item = speech.recv_type("conversation.item.create").await;
    assert_eq!(item["item"]["type"], "function_call_output");
    assert_eq!(item["item"]["call_id"], "call_1");
    let output: serde_json::Value =
        serde_json::from_str(item["item"]["output"].as_str().unwrap()).unwrap();
    assert_eq!(
        output,
        json!({"error": "No handler found for function: lookup_order"})
    );
    assert_eq!(speech.recv().await, json!({"type": "response.create"}));
}

#[tokio::test]
async fn test_speech_reconnect_replays_saved_session() {
    let mut speech_server = MockSpeechServer::start().await;
    let (addr, state) = spawn_bridge(test_config(&speech_server.url)).await;

    let mut observer = connect_client(addr, "/ws/logs").await;
    let mut call = connect_client(addr, "/ws/call").await;
    send_json(&mut call, start_event("MZ3")).await;

    let mut speech = speech_server.accept().await;
    speech.recv_type("session.update").await;
    assert_eq!(next_json(&mut observer).await["status"], "openai_connected");

    send_json(
        &mut observer,
        json!({"type": "session.update", "session": {"instructions": "Speak French"}}),
    )
    .await;
    speech.recv_type("session.update").await;

    speech.drop_connection();
    assert_eq!(
        next_json(&mut observer).await["status"],
        "openai_disconnected"
    );

    let mut reconnected = speech_server.accept().await;
    let replay = reconnected.recv_type("session.update").await;
    assert_eq!(replay["session"]["instructions"], "Speak French");
    assert_eq!(replay["session"]["input_audio_format"], "g711_ulaw");
    assert_eq!(next_json(&mut observer).await["status"], "openai_connected");
    assert!(state.bridge.speech_connected());

    // Audio flows over the new connection
    send_json(&mut call, media_event(20, "QUFB")).await;
    assert_eq!(
        reconnected.recv_type("input_audio_buffer.append").await["audio"],
        "QUFB"
    );
}

#[tokio::test]
async fn test_media_close_tears_down_call() {
    let mut speech_server = MockSpeechServer::start().await;
    let (addr, state) = spawn_bridge(test_config(&speech_server.url)).await;

    let mut observer = connect_client(addr, "/ws/logs").await;
    let mut call = connect_client(addr, "/ws/call").await;
    send_json(&mut call, start_event("MZ4")).await;

    let mut speech = speech_server.accept().await;
    speech.recv_type("session.update").await;
    next_json(&mut observer).await;

    send_json(&mut call, json!({"event": "stop"})).await;

    speech.expect_closed().await;
    expect_closed(&mut observer).await;
    expect_closed(&mut call).await;

    // Session reset completes after the sockets close
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert!(state.bridge.speech().is_none());
    assert_eq!(state.bridge.session_state().stream_id, None);
}

#[tokio::test]
async fn test_new_media_leg_evicts_previous() {
    let mut speech_server = MockSpeechServer::start().await;
    let (addr, state) = spawn_bridge(test_config(&speech_server.url)).await;

    let mut first = connect_client(addr, "/ws/call").await;
    // Make sure the first leg is registered before the second arrives
    send_json(&mut first, json!({"event": "connected"})).await;
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let mut second = connect_client(addr, "/ws/call").await;
    expect_closed(&mut first).await;
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(state.registry.count(ConnectionRole::Media), 1);

    // The evicted leg closing did not tear down the new one
    send_json(&mut second, start_event("MZ5")).await;
    let mut speech = speech_server.accept().await;
    speech.recv_type("session.update").await;

    send_json(&mut second, media_event(0, "QUFB")).await;
    assert_eq!(
        speech.recv_type("input_audio_buffer.append").await["audio"],
        "QUFB"
    );
}

#[tokio::test]
async fn test_malformed_media_frame_is_ignored() {
    let mut speech_server = MockSpeechServer::start().await;
    let (addr, _state) = spawn_bridge(test_config(&speech_server.url)).await;

    let mut call = connect_client(addr, "/ws/call").await;
    call_send_raw(&mut call, "not json").await;
    send_json(&mut call, start_event("MZ6")).await;

    let mut speech = speech_server.accept().await;
    assert_eq!(speech.recv().await["type"], "session.update");
}

async fn call_send_raw(socket: &mut common::ClientSocket, text: &str) {
    use futures_util::SinkExt;
    socket
        .send(tokio_tungstenite::tungstenite::Message::Text(text.to_string().into()))
        .await
        .unwrap();
}
