#![allow(clippy::unwrap_used)]
// Session and registration behavior over a scripted transport.

mod common;

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;

use common::{
    BASE_URL, Recorder, Reply, ScriptedTransport, TestDevice, TestPanel, eventually, quiet_config,
    settle,
};
use ctrlink_core::{
    ConnectOutcome, ConnectionState, ControlCommand, Controller, ControllerConfig, CoreError,
    ReconnectConfig, ResponseCode, SensorId, SubscriberKey,
};

// ── Helpers ─────────────────────────────────────────────────────────

async fn connected() -> (Arc<ScriptedTransport>, Controller) {
    let transport = ScriptedTransport::new();
    let controller = Controller::with_transport(quiet_config(), transport.clone());
    controller.connect(None).await.unwrap();
    (transport, controller)
}

fn value(id: i32, v: &str) -> (SensorId, String) {
    (SensorId(id), v.to_owned())
}

const SNAPSHOT_1_ON: &str = r#"{"status":[{"id":1,"value":"on"}]}"#;

// ── Connection ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_connect_is_idempotent() {
    let (transport, controller) = connected().await;
    assert!(controller.is_connected());

    let again = controller.connect(None).await.unwrap();
    assert_eq!(again, ConnectOutcome::AlreadyConnected);
    assert_eq!(transport.count("GET rest/servers"), 1);
}

#[tokio::test]
async fn test_connect_invalid_url() {
    let transport = ScriptedTransport::new();
    let controller = Controller::with_transport(
        ControllerConfig {
            heartbeat_interval: None,
            ..ControllerConfig::new("")
        },
        transport.clone(),
    );
    let recorder = Recorder::new();

    let err = controller.connect(Some(recorder.clone())).await.unwrap_err();
    assert_eq!(err.response_code(), ResponseCode::InvalidUrl);
    assert_eq!(recorder.events(), vec!["failure:InvalidUrl"]);
    assert_eq!(controller.connector().state(), ConnectionState::Disconnected);
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn test_connect_without_answer_is_no_response() {
    let transport = ScriptedTransport::new();
    transport.route("rest/servers", Reply::Timeout);
    let controller = Controller::with_transport(quiet_config(), transport.clone());
    let recorder = Recorder::new();

    let err = controller.connect(Some(recorder.clone())).await.unwrap_err();
    assert_eq!(err.response_code(), ResponseCode::NoResponse);
    assert_eq!(recorder.events(), vec!["failure:NoResponse"]);
    assert!(!controller.is_connected());
}

#[tokio::test]
async fn test_disconnect_notifies_stored_callback() {
    let transport = ScriptedTransport::new();
    let controller = Controller::with_transport(quiet_config(), transport.clone());
    let recorder = Recorder::new();
    let mut state = controller.connection_state();

    controller.connect(Some(recorder.clone())).await.unwrap();
    assert_eq!(*state.borrow_and_update(), ConnectionState::Connected);

    controller.disconnect().await;
    controller.disconnect().await;
    assert_eq!(*state.borrow_and_update(), ConnectionState::Disconnected);
    assert_eq!(recorder.events(), vec!["success", "failure:Disconnected"]);
}

#[tokio::test]
async fn test_requests_need_a_connection() {
    let transport = ScriptedTransport::new();
    let controller = Controller::with_transport(quiet_config(), transport.clone());

    let err = controller.list_panels().await.unwrap_err();
    assert!(matches!(err, CoreError::Disconnected));
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn test_set_url_reconnects_with_stored_callback() {
    let transport = ScriptedTransport::new();
    let controller = Controller::with_transport(quiet_config(), transport.clone());
    let recorder = Recorder::new();
    controller.connect(Some(recorder.clone())).await.unwrap();

    controller
        .set_url("http://other.test/controller")
        .await
        .unwrap();

    assert!(controller.is_connected());
    assert_eq!(controller.info().url, "http://other.test/controller");
    assert_eq!(
        recorder.events(),
        vec!["success", "failure:Disconnected", "success"]
    );
    assert_eq!(transport.count("GET rest/servers"), 2);
}

#[tokio::test]
async fn test_set_url_while_disconnected_does_not_connect() {
    let transport = ScriptedTransport::new();
    let controller = Controller::with_transport(quiet_config(), transport.clone());

    controller.set_url("http://other.test/controller").await.unwrap();
    assert!(!controller.is_connected());
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn test_abandoned_connect_releases_the_session() {
    let transport = ScriptedTransport::new();
    transport.route("rest/servers", Reply::Stall);
    let controller = Controller::with_transport(quiet_config(), transport.clone());

    let abandoned =
        tokio::time::timeout(Duration::from_millis(50), controller.connect(None)).await;
    assert!(abandoned.is_err());
    assert_eq!(controller.connector().state(), ConnectionState::Disconnected);

    transport.route("rest/servers", Reply::ok(""));
    let outcome = controller.connect(None).await.unwrap();
    assert_eq!(outcome, ConnectOutcome::Connected);
    assert!(controller.is_connected());
}

#[tokio::test]
async fn test_connect_uses_call_timeout() {
    let transport = ScriptedTransport::new();
    transport.route("rest/servers", Reply::Stall);
    let controller = Controller::with_transport(quiet_config(), transport.clone());
    let recorder = Recorder::new();

    let started = tokio::time::Instant::now();
    let err = controller
        .with_timeout(Duration::from_millis(100))
        .connect(Some(recorder.clone()))
        .await
        .unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(err.response_code(), ResponseCode::NoResponse);
    assert_eq!(recorder.events(), vec!["failure:NoResponse"]);
    assert_eq!(
        transport.last_deadline("GET rest/servers"),
        Some(Duration::from_millis(100))
    );
    assert_eq!(controller.connector().state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_request_timeout_is_per_call() {
    let (transport, controller) = connected().await;
    transport.route("rest/panel/Attic", Reply::Stall);
    transport.route("rest/panels/", Reply::ok(r#"{"panel":[]}"#));

    let quick = controller.with_timeout(Duration::from_millis(100));
    let started = tokio::time::Instant::now();
    let err = quick.get_panel("Attic").await.unwrap_err();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(err.response_code(), ResponseCode::Timeout);
    assert_eq!(
        transport.last_deadline("GET rest/panel/Attic"),
        Some(Duration::from_millis(100))
    );

    quick.list_panels().await.unwrap();
    assert_eq!(
        transport.last_deadline("GET rest/panels/"),
        Some(Duration::from_millis(100))
    );

    controller.list_panels().await.unwrap();
    assert_eq!(
        transport.last_deadline("GET rest/panels/"),
        Some(controller.config().timeout)
    );
    assert!(quick.is_connected());
}

// ── Registration ────────────────────────────────────────────────────

#[tokio::test]
async fn test_snapshot_then_polls_in_order() {
    let (transport, controller) = connected().await;
    transport.route("rest/status/1,2", Reply::ok(SNAPSHOT_1_ON));

    let panel = TestPanel::new("Lounge", &[&[1], &[2]]);
    let recorder = Recorder::new();
    let handle = controller
        .register_panel(panel.clone(), recorder.clone())
        .await
        .unwrap();
    let token = handle.token().to_string();

    eventually("first poll", || transport.polls() == 1).await;
    assert_eq!(panel.values(), vec![value(1, "on")]);
    assert_eq!(recorder.events(), vec!["success"]);

    transport.push_poll(&token, Reply::ok(r#"{"status":[{"id":2,"value":"50"}]}"#));
    eventually("second poll", || transport.polls() == 2).await;
    assert_eq!(panel.values(), vec![value(1, "on"), value(2, "50")]);

    transport.push_poll(&token, Reply::status(504, ""));
    eventually("third poll", || transport.polls() == 3).await;
    assert_eq!(panel.values(), vec![value(1, "on"), value(2, "50")]);
    assert_eq!(recorder.events(), vec!["success"]);
    assert!(
        transport
            .requests()
            .contains(&format!("GET rest/polling/{token}/1,2"))
    );
}

#[tokio::test]
async fn test_every_poll_timeout_form_continues_the_loop() {
    let (transport, controller) = connected().await;
    transport.route("rest/status/7", Reply::ok(r#"{"status":[]}"#));

    let device = TestDevice::new("Heater", &[7]);
    let handle = controller
        .register_device(device.clone(), Recorder::new())
        .await
        .unwrap();
    let token = handle.token().to_string();

    transport.push_poll(&token, Reply::status(504, ""));
    transport.push_poll(
        &token,
        Reply::ok(r#"{"error":{"code":504,"message":"Time out"}}"#),
    );
    transport.push_poll(&token, Reply::Timeout);
    transport.push_poll(&token, Reply::ok(""));

    eventually("fifth poll", || transport.polls() == 5).await;
    assert!(device.values().is_empty());
    assert!(handle.is_active());
}

#[tokio::test]
async fn test_device_ignores_values_for_other_sensors() {
    let (transport, controller) = connected().await;
    transport.route(
        "rest/status/7",
        Reply::ok(r#"{"status":[{"id":7,"value":"20"},{"id":8,"value":"x"}]}"#),
    );

    let device = TestDevice::new("Heater", &[7]);
    let handle = controller
        .register_device(device.clone(), Recorder::new())
        .await
        .unwrap();
    let token = handle.token().to_string();

    transport.push_poll(
        &token,
        Reply::ok(r#"{"status":[{"id":8,"value":"y"},{"id":7,"value":"21"}]}"#),
    );
    eventually("second poll", || transport.polls() == 2).await;
    assert_eq!(device.values(), vec![value(7, "20"), value(7, "21")]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unregister_racing_replay_leaves_handle_inactive() {
    for _ in 0..50 {
        let transport = ScriptedTransport::new();
        transport.route("rest/status/1", Reply::ok(SNAPSHOT_1_ON));
        let controller = Controller::with_transport(quiet_config(), transport.clone());
        let panel = TestPanel::new("Lounge", &[&[1]]);
        let handle = controller
            .register_panel(panel.clone(), Recorder::new())
            .await
            .unwrap();

        let connecting = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.connect(None).await })
        };
        let unregistering = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.unregister_panel("Lounge").await })
        };
        connecting.await.unwrap().unwrap();
        unregistering.await.unwrap().unwrap();

        assert!(!handle.is_registered());
        assert!(!handle.is_active());
        assert!(panel.link().is_none());
        assert!(controller.registrations().is_empty());
    }
}

#[tokio::test]
async fn test_at_most_one_poll_in_flight() {
    let (transport, controller) = connected().await;
    transport.route("rest/status/1,2", Reply::ok(SNAPSHOT_1_ON));

    let panel = TestPanel::new("Lounge", &[&[1, 2]]);
    let handle = controller
        .register_panel(panel.clone(), Recorder::new())
        .await
        .unwrap();
    let token = handle.token().to_string();

    for i in 0..20 {
        transport.push_poll(&token, Reply::ok(&format!(r#"{{"status":[{{"id":2,"value":"{i}"}}]}}"#)));
    }
    eventually("all polls answered", || transport.polls() == 21).await;
    assert_eq!(transport.max_polls_in_flight(), 1);
    assert_eq!(panel.values().last(), Some(&value(2, "19")));
}

#[tokio::test]
async fn test_unregister_during_inflight_poll_stops_loop() {
    let (transport, controller) = connected().await;
    transport.route("rest/status/3", Reply::ok(r#"{"status":[]}"#));

    let device = TestDevice::new("Heater", &[3]);
    let recorder = Recorder::new();
    let handle = controller
        .register_device(device.clone(), recorder.clone())
        .await
        .unwrap();
    let token = handle.token().to_string();
    eventually("first poll", || transport.polls() == 1).await;
    assert!(device.link().is_some());

    controller.unregister_device("Heater").await.unwrap();
    transport.push_poll(&token, Reply::ok(r#"{"status":[{"id":3,"value":"hot"}]}"#));
    settle().await;

    assert_eq!(transport.polls(), 1);
    assert!(device.values().is_empty());
    assert!(!handle.is_active());
    assert!(device.link().is_none());
    assert_eq!(recorder.events(), vec!["success", "failure:Unregistered"]);
    assert!(controller.registration(&SubscriberKey::Device("Heater".into())).is_none());

    let err = controller.unregister_device("Heater").await.unwrap_err();
    assert!(matches!(err, CoreError::Unregistered));
}

#[tokio::test]
async fn test_duplicate_registration_reports_already_registered() {
    let (transport, controller) = connected().await;
    transport.route("rest/status/1", Reply::ok(SNAPSHOT_1_ON));

    let first = Recorder::new();
    let second = Recorder::new();
    let a = controller
        .register_panel(TestPanel::new("Lounge", &[&[1]]), first.clone())
        .await
        .unwrap();
    let b = controller
        .register_panel(TestPanel::new("Lounge", &[&[1]]), second.clone())
        .await
        .unwrap();

    assert_eq!(a.token(), b.token());
    assert_eq!(controller.registrations().len(), 1);
    assert_eq!(second.events(), vec!["failure:AlreadyRegistered"]);
    eventually("success", || first.events() == vec!["success"]).await;
}

#[tokio::test]
async fn test_same_name_panel_and_device_are_distinct() {
    let (transport, controller) = connected().await;
    transport.route("rest/status/1", Reply::ok(SNAPSHOT_1_ON));

    controller
        .register_panel(TestPanel::new("Kitchen", &[&[1]]), Recorder::new())
        .await
        .unwrap();
    controller
        .register_device(TestDevice::new("Kitchen", &[1]), Recorder::new())
        .await
        .unwrap();
    assert_eq!(controller.registrations().len(), 2);
}

#[tokio::test]
async fn test_null_target() {
    let (_transport, controller) = connected().await;
    let recorder = Recorder::new();

    let err = controller
        .register_panel(TestPanel::new("", &[&[1]]), recorder.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NullTarget));
    assert_eq!(recorder.events(), vec!["failure:NullTarget"]);
    assert!(controller.registrations().is_empty());
}

#[tokio::test]
async fn test_snapshot_failure_reports_and_never_polls() {
    let (transport, controller) = connected().await;
    transport.route(
        "rest/status/9",
        Reply::status(500, r#"{"error":{"code":417,"message":"sensor gone"}}"#),
    );

    let recorder = Recorder::new();
    let handle = controller
        .register_device(TestDevice::new("Pump", &[9]), recorder.clone())
        .await
        .unwrap();

    eventually("failure", || !recorder.events().is_empty()).await;
    settle().await;
    assert_eq!(recorder.events(), vec!["failure:Controller(417)"]);
    assert_eq!(transport.polls(), 0);
    assert!(handle.is_active());
}

#[tokio::test]
async fn test_poll_hard_error_reported_once_then_idle() {
    let (transport, controller) = connected().await;
    transport.route("rest/status/4", Reply::ok(r#"{"status":[]}"#));

    let recorder = Recorder::new();
    let handle = controller
        .register_device(TestDevice::new("Blind", &[4]), recorder.clone())
        .await
        .unwrap();
    let token = handle.token().to_string();
    eventually("first poll", || transport.polls() == 1).await;

    transport.push_poll(
        &token,
        Reply::status(500, r#"{"error":{"code":418,"message":"broken"}}"#),
    );
    eventually("failure", || recorder.events().len() == 2).await;
    settle().await;

    assert_eq!(recorder.events(), vec!["success", "failure:Controller(418)"]);
    assert_eq!(transport.polls(), 1);
    assert!(handle.is_active());
}

#[tokio::test]
async fn test_device_without_sensors_succeeds_without_polling() {
    let (transport, controller) = connected().await;
    let recorder = Recorder::new();

    controller
        .register_device(TestDevice::new("Doorbell", &[]), recorder.clone())
        .await
        .unwrap();

    eventually("success", || recorder.events() == vec!["success"]).await;
    settle().await;
    assert_eq!(transport.count("GET rest/status"), 0);
    assert_eq!(transport.polls(), 0);
}

// ── Reconnect replay ────────────────────────────────────────────────

#[tokio::test]
async fn test_register_while_disconnected_starts_on_connect() {
    let transport = ScriptedTransport::new();
    transport.route("rest/status/1", Reply::ok(SNAPSHOT_1_ON));
    let controller = Controller::with_transport(quiet_config(), transport.clone());

    let panel = TestPanel::new("Lounge", &[&[1]]);
    let recorder = Recorder::new();
    let handle = controller
        .register_panel(panel.clone(), recorder.clone())
        .await
        .unwrap();
    assert!(!handle.is_active());
    assert!(recorder.events().is_empty());

    controller.connect(None).await.unwrap();
    eventually("first poll", || transport.polls() == 1).await;
    assert_eq!(panel.values(), vec![value(1, "on")]);
    assert_eq!(recorder.events(), vec!["success"]);
}

#[tokio::test]
async fn test_reconnect_resumes_without_second_success() {
    let (transport, controller) = connected().await;
    transport.route("rest/status/1", Reply::ok(SNAPSHOT_1_ON));

    let panel = TestPanel::new("Lounge", &[&[1]]);
    let recorder = Recorder::new();
    let handle = controller
        .register_panel(panel.clone(), recorder.clone())
        .await
        .unwrap();
    eventually("first poll", || transport.polls() == 1).await;

    controller.disconnect().await;
    assert!(!handle.is_active());
    assert!(handle.is_registered());
    let err = panel
        .link()
        .unwrap()
        .send_control_command(&ControlCommand {
            sender_id: 5,
            data: "on".into(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Disconnected));

    controller.connect(None).await.unwrap();
    eventually("resumed poll", || transport.polls() == 2).await;
    assert!(handle.is_active());
    assert_eq!(transport.count("GET rest/status/1"), 2);
    assert_eq!(panel.values(), vec![value(1, "on"), value(1, "on")]);
    assert_eq!(recorder.events(), vec!["success"]);
}

#[tokio::test]
async fn test_heartbeat_failure_drops_and_reconnects() {
    let transport = ScriptedTransport::new();
    transport.route("rest/status/1", Reply::ok(SNAPSHOT_1_ON));
    let controller = Controller::with_transport(
        ControllerConfig {
            heartbeat_interval: Some(Duration::from_millis(30)),
            reconnect: ReconnectConfig {
                initial_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(40),
            },
            ..ControllerConfig::new(BASE_URL)
        },
        transport.clone(),
    );
    let session = Recorder::new();
    let registration = Recorder::new();
    controller.connect(Some(session.clone())).await.unwrap();
    let handle = controller
        .register_panel(TestPanel::new("Lounge", &[&[1]]), registration.clone())
        .await
        .unwrap();
    eventually("first poll", || transport.polls() == 1).await;

    transport.route("rest/servers", Reply::Timeout);
    eventually("drop", || session.events().len() == 2).await;
    assert_eq!(session.events(), vec!["success", "failure:NoResponse"]);
    assert!(!handle.is_active());

    transport.route("rest/servers", Reply::ok(""));
    eventually("re-connect", || session.events().len() == 3).await;
    eventually("resumed poll", || transport.polls() == 2).await;
    assert_eq!(
        session.events(),
        vec!["success", "failure:NoResponse", "success"]
    );
    assert_eq!(registration.events(), vec!["success"]);

    controller.disconnect().await;
    assert_eq!(session.events().last().map(String::as_str), Some("failure:Disconnected"));
}

// ── Commands through the link ───────────────────────────────────────

#[tokio::test]
async fn test_controller_link_follows_registration() {
    let (transport, controller) = connected().await;
    transport.route("rest/status/1", Reply::ok(SNAPSHOT_1_ON));
    transport.route("rest/control/5/on", Reply::ok(""));

    let panel = TestPanel::new("Lounge", &[&[1]]);
    controller
        .register_panel(panel.clone(), Recorder::new())
        .await
        .unwrap();
    let link = panel.link().unwrap();

    let resp = link
        .send_control_command(&ControlCommand {
            sender_id: 5,
            data: "on".into(),
        })
        .await
        .unwrap();
    assert_eq!(resp.sender_id, 5);
    assert_eq!(transport.count("POST rest/control/5/on"), 1);

    controller.unregister_panel("Lounge").await.unwrap();
    assert!(panel.link().is_none());
    let err = link
        .send_control_command(&ControlCommand {
            sender_id: 5,
            data: "on".into(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Unregistered));
}

#[tokio::test]
async fn test_logout_clears_credentials() {
    let transport = ScriptedTransport::new();
    transport.route("", Reply::status(401, ""));
    let controller = Controller::with_transport(
        ControllerConfig {
            heartbeat_interval: None,
            credentials: Some(ctrlink_core::Credentials::new(
                "installer",
                "s3cret".to_string().into(),
            )),
            ..ControllerConfig::new(BASE_URL)
        },
        transport.clone(),
    );
    controller.connect(None).await.unwrap();
    assert!(controller.connector().has_credentials());

    controller.logout().await.unwrap();
    assert!(!controller.connector().has_credentials());
    assert_eq!(transport.count("POST "), 1);
}
