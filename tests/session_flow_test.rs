//! Login, task check, countdown and recorder launch end to end.

mod common;

use common::{Reply, StubServer};
use serde_json::json;
use srot::controller::{ControlEvent, FailureKind, Notice, SessionController};
use srot::countdown::CountdownGate;
use srot::launcher::{LaunchError, LaunchReceipt, RecorderLauncher};
use srot::remote::{RemoteAuthority, TRANSPORT_FAILURE_MESSAGE};
use srot::store::{FileSessionStore, SessionStore};
use srot::{LaunchRequest, Session, SessionState};
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;

const TICK: Duration = Duration::from_millis(10);

#[derive(Default)]
struct Recorded(Mutex<Vec<LaunchRequest>>);

impl RecorderLauncher for Recorded {
    fn launch(&self, request: LaunchRequest) -> Result<LaunchReceipt, LaunchError> {
        self.0.lock().unwrap().push(request.clone());
        Ok(LaunchReceipt {
            request,
            pid: None,
            started_at: chrono::Utc::now(),
        })
    }
}

async fn authority_server() -> StubServer {
    StubServer::start(vec![
        (
            "/api-user-validity/?username=alice",
            Reply::Json(200, json!({"status": "success", "fullname": "Alice A"})),
        ),
        (
            "/api-user-validity/",
            Reply::Json(200, json!({"status": "error", "message": "No such user"})),
        ),
        (
            "/check_task_assignment/?username=alice&T_ID=AB12CD34EF",
            Reply::Json(
                200,
                json!({"status": "success", "error": false, "is_assigned": true}),
            ),
        ),
        (
            "/check_task_assignment/",
            Reply::Json(
                200,
                json!({"status": "success", "error": false, "is_assigned": false}),
            ),
        ),
    ])
    .await
}

fn authority(server: &StubServer) -> RemoteAuthority {
    RemoteAuthority::new(
        server.url("/api-user-validity/"),
        server.url("/check_task_assignment/"),
        Duration::from_secs(5),
    )
    .unwrap()
}

fn drain(notices: &mut UnboundedReceiver<Notice>) -> Vec<Notice> {
    let mut out = Vec::new();
    while let Ok(n) = notices.try_recv() {
        out.push(n);
    }
    out
}

#[tokio::test]
async fn login_check_and_launch() {
    let server = authority_server().await;
    let authority = authority(&server);
    let dir = TempDir::new().unwrap();
    let store = FileSessionStore::at(dir.path().join("session.json"));
    let launched = Recorded::default();

    let (controller, mut handle) = SessionController::new(&authority, &authority, &store, &launched, 3);
    let mut controller = controller.with_gate(CountdownGate::with_tick(TICK));

    controller.handle(ControlEvent::SubmitIdentity("alice".into())).await;
    assert_eq!(
        controller.state(),
        &SessionState::Authenticated(Session::new("alice", "Alice A"))
    );
    let saved: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
    assert_eq!(saved["username"], "alice");
    assert_eq!(saved["fullname"], "Alice A");

    controller.handle(ControlEvent::SubmitTask("ab12cd34ef".into())).await;
    assert!(matches!(controller.state(), SessionState::CountingDown(..)));

    while !matches!(controller.state(), SessionState::Authenticated(_)) {
        controller.step().await.unwrap();
    }

    let requests = launched.0.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].args(), ["AB12CD34EF", "alice"]);

    let notices = drain(&mut handle.notices);
    let counted: Vec<u32> = notices
        .iter()
        .filter_map(|n| match n {
            Notice::Countdown(s) if !s.is_done() => Some(s.remaining_seconds),
            _ => None,
        })
        .collect();
    assert_eq!(counted, vec![3, 2, 1, 0]);
    assert!(notices.iter().any(|n| matches!(n, Notice::Launched(_))));
}

#[tokio::test]
async fn unknown_user_is_rejected_and_nothing_saved() {
    let server = authority_server().await;
    let authority = authority(&server);
    let dir = TempDir::new().unwrap();
    let store = FileSessionStore::at(dir.path().join("session.json"));
    let launched = Recorded::default();

    let (mut controller, mut handle) =
        SessionController::new(&authority, &authority, &store, &launched, 3);
    controller.handle(ControlEvent::SubmitIdentity("mallory".into())).await;

    assert_eq!(controller.state(), &SessionState::Unauthenticated);
    assert!(store.load().is_none());
    assert!(drain(&mut handle.notices).contains(&Notice::Rejected {
        kind: FailureKind::Rejected,
        message: "No such user".into(),
    }));
}

#[tokio::test]
async fn unassigned_task_keeps_session() {
    let server = authority_server().await;
    let authority = authority(&server);
    let dir = TempDir::new().unwrap();
    let store = FileSessionStore::at(dir.path().join("session.json"));
    store.save(&Session::new("alice", "Alice A")).unwrap();
    let launched = Recorded::default();

    let (mut controller, mut handle) =
        SessionController::new(&authority, &authority, &store, &launched, 3);
    controller.handle(ControlEvent::SubmitTask("zz99zz99zz".into())).await;

    assert!(matches!(controller.state(), SessionState::Authenticated(_)));
    assert!(launched.0.lock().unwrap().is_empty());
    assert!(drain(&mut handle.notices).contains(&Notice::Rejected {
        kind: FailureKind::Rejected,
        message: "Task is not assigned to the user.".into(),
    }));
}

#[tokio::test]
async fn unreachable_authority_keeps_user_logged_out() {
    let url = common::refused_url().await;
    let authority = RemoteAuthority::new(url.clone(), url, Duration::from_secs(2)).unwrap();
    let dir = TempDir::new().unwrap();
    let store = FileSessionStore::at(dir.path().join("session.json"));
    let launched = Recorded::default();

    let (mut controller, mut handle) =
        SessionController::new(&authority, &authority, &store, &launched, 3);
    controller.handle(ControlEvent::SubmitIdentity("alice".into())).await;

    assert_eq!(controller.state(), &SessionState::Unauthenticated);
    assert!(store.load().is_none());
    assert!(drain(&mut handle.notices).contains(&Notice::Rejected {
        kind: FailureKind::Transport,
        message: TRANSPORT_FAILURE_MESSAGE.into(),
    }));
}

#[tokio::test]
async fn restored_session_survives_restart_until_logout() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("session.json");
    FileSessionStore::at(&path)
        .save(&Session::new("alice", "Alice A"))
        .unwrap();

    let server = authority_server().await;
    let authority = authority(&server);
    let store = FileSessionStore::at(&path);
    let launched = Recorded::default();
    let (mut controller, _handle) =
        SessionController::new(&authority, &authority, &store, &launched, 3);
    assert_eq!(
        controller.state(),
        &SessionState::Authenticated(Session::new("alice", "Alice A"))
    );

    controller.handle(ControlEvent::Logout).await;
    assert_eq!(controller.state(), &SessionState::Unauthenticated);
    assert!(!path.exists());
    assert!(server.requests().is_empty());
}
