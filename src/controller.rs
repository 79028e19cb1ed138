//! Session controller - the login / task / countdown / launch state machine
//!
//! All input arrives as [`ControlEvent`]s on one channel and is handled one at a
//! time, including the countdown's own ticks. Everything the actor needs to see
//! goes out as [`Notice`]s.

use crate::countdown::{CountdownGate, CountdownState};
use crate::launcher::{LaunchReceipt, RecorderLauncher};
use crate::remote::{AssignmentValidator, IdentityValidator};
use crate::store::SessionStore;
use crate::{
    EMPTY_USER_ID_MESSAGE, LaunchRequest, Session, SessionState, TaskId, ValidationOutcome,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Shown when the durable session disappeared underneath an authenticated controller
pub const SESSION_MISSING_MESSAGE: &str = "User ID not found. Please login again.";
const SAVE_FAILED_MESSAGE: &str = "Unable to save your session. Please try again.";
const CLEAR_FAILED_MESSAGE: &str = "Unable to clear your saved session.";
const COUNTDOWN_FAILED_MESSAGE: &str = "Failed to start recording.";

/// Input to the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlEvent {
    SubmitIdentity(String),
    SubmitTask(String),
    /// Countdown progress; a `Done` phase is the completion notification
    Countdown(CountdownState),
    Logout,
    Quit,
}

/// What input the controller is waiting for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prompt {
    UserId,
    TaskId,
}

/// Category of a user-visible failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Rejected locally before any remote call
    InputInvalid,
    /// The remote authority said no
    Rejected,
    /// The remote authority could not be reached
    Transport,
    /// The saved session vanished
    SessionMissing,
    /// The session record could not be written
    Storage,
    /// The recorder could not be started
    Launch,
}

/// Output to the actor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Prompt(Prompt),
    Welcome(Session),
    Rejected { kind: FailureKind, message: String },
    Countdown(CountdownState),
    Launched(LaunchReceipt),
    LoggedOut,
    /// Input arrived while the countdown was running and was ignored
    Busy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// The actor's side of the controller
#[derive(Debug)]
pub struct ControllerHandle {
    pub events: mpsc::UnboundedSender<ControlEvent>,
    pub notices: mpsc::UnboundedReceiver<Notice>,
}

pub struct SessionController<I, A, S, L> {
    identity: I,
    assignment: A,
    store: S,
    launcher: L,
    gate: CountdownGate,
    countdown_secs: u32,
    state: SessionState,
    countdown: Option<CountdownState>,
    /// Logout requested while counting down, applied once the launch is done
    pending_logout: bool,
    events_rx: mpsc::UnboundedReceiver<ControlEvent>,
    /// Weak so the run loop ends once every handle is gone
    events_tx: mpsc::WeakUnboundedSender<ControlEvent>,
    notices: mpsc::UnboundedSender<Notice>,
}

impl<I, A, S, L> SessionController<I, A, S, L>
where
    I: IdentityValidator,
    A: AssignmentValidator,
    S: SessionStore,
    L: RecorderLauncher,
{
    /// Build a controller whose initial state comes from the saved session.
    pub fn new(
        identity: I,
        assignment: A,
        store: S,
        launcher: L,
        countdown_secs: u32,
    ) -> (Self, ControllerHandle) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (notices_tx, notices_rx) = mpsc::unbounded_channel();

        let state = match store.load() {
            Some(session) => {
                info!(user_id = %session.user_id, "restored saved session");
                SessionState::Authenticated(session)
            }
            None => SessionState::Unauthenticated,
        };

        let controller = Self {
            identity,
            assignment,
            store,
            launcher,
            gate: CountdownGate::new(),
            countdown_secs: countdown_secs.max(1),
            state,
            countdown: None,
            pending_logout: false,
            events_rx,
            events_tx: events_tx.downgrade(),
            notices: notices_tx,
        };
        let handle = ControllerHandle {
            events: events_tx,
            notices: notices_rx,
        };
        (controller, handle)
    }

    /// Replace the countdown driver (e.g. a shorter tick).
    pub fn with_gate(mut self, gate: CountdownGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Last countdown state seen, while counting down
    pub fn countdown(&self) -> Option<CountdownState> {
        self.countdown
    }

    /// Announce the initial state.
    pub fn start(&mut self) {
        if let SessionState::Authenticated(session) = &self.state {
            let session = session.clone();
            self.notify(Notice::Welcome(session));
        }
        self.prompt();
    }

    /// Process events until `Quit` or until every handle is dropped.
    pub async fn run(mut self) {
        self.start();
        while let Some(flow) = self.step().await {
            if flow == Flow::Quit {
                break;
            }
        }
        debug!("controller stopped");
    }

    /// Receive and handle one event. `None` once the channel is closed.
    pub async fn step(&mut self) -> Option<Flow> {
        let event = self.events_rx.recv().await?;
        Some(self.handle(event).await)
    }

    pub async fn handle(&mut self, event: ControlEvent) -> Flow {
        debug!(state = self.state.name(), ?event, "event");
        match event {
            ControlEvent::Quit => {
                info!("quit");
                return Flow::Quit;
            }
            ControlEvent::Countdown(state) => self.on_countdown(state),
            ControlEvent::Logout if matches!(self.state, SessionState::CountingDown(..)) => {
                debug!("logout deferred until after launch");
                self.pending_logout = true;
                self.notify(Notice::Busy);
            }
            _ if matches!(self.state, SessionState::CountingDown(..)) => {
                debug!("ignoring input during countdown");
                self.notify(Notice::Busy);
            }
            ControlEvent::SubmitIdentity(raw) => {
                self.submit_identity(&raw).await;
                self.prompt();
            }
            ControlEvent::SubmitTask(raw) => {
                self.submit_task(&raw).await;
                self.prompt();
            }
            ControlEvent::Logout => {
                self.logout();
                self.prompt();
            }
        }
        Flow::Continue
    }

    async fn submit_identity(&mut self, raw: &str) {
        if !matches!(self.state, SessionState::Unauthenticated) {
            debug!("already logged in");
            return;
        }

        let user_id = raw.trim();
        if user_id.is_empty() {
            self.reject(FailureKind::InputInvalid, EMPTY_USER_ID_MESSAGE);
            return;
        }

        match self.identity.validate_identity(user_id).await {
            ValidationOutcome::Valid(display_name) => {
                let session = Session::new(user_id, display_name);
                if let Err(e) = self.store.save(&session) {
                    warn!(%user_id, "failed to save session: {}", e);
                    self.reject(FailureKind::Storage, SAVE_FAILED_MESSAGE);
                    return;
                }
                info!(%user_id, display_name = %session.display_name, "logged in");
                self.state = SessionState::Authenticated(session.clone());
                self.notify(Notice::Welcome(session));
            }
            ValidationOutcome::Invalid(reason) => {
                info!(%user_id, %reason, "identity rejected");
                self.reject(FailureKind::Rejected, reason);
            }
            ValidationOutcome::TransportFailure(reason) => {
                warn!(%user_id, %reason, "identity check unreachable");
                self.reject(FailureKind::Transport, reason);
            }
        }
    }

    async fn submit_task(&mut self, raw: &str) {
        let SessionState::Authenticated(session) = &self.state else {
            debug!("task submitted without a session");
            return;
        };
        let session = session.clone();

        let task_id = match TaskId::parse(raw) {
            Ok(id) => id,
            Err(e) => {
                debug!(normalized = %e.normalized, "task id rejected locally");
                self.reject(FailureKind::InputInvalid, e.to_string());
                return;
            }
        };

        if self.store.load().is_none() {
            warn!(user_id = %session.user_id, "saved session disappeared");
            self.state = SessionState::Unauthenticated;
            self.reject(FailureKind::SessionMissing, SESSION_MISSING_MESSAGE);
            return;
        }

        self.state = SessionState::TaskPending(session.clone(), task_id.clone());
        let outcome = self
            .assignment
            .validate_assignment(&session.user_id, &task_id)
            .await;

        match outcome {
            ValidationOutcome::Valid(detail) => {
                info!(%task_id, %detail, "assignment confirmed");
                self.begin_countdown(session, task_id);
            }
            ValidationOutcome::Invalid(reason) => {
                info!(%task_id, %reason, "assignment rejected");
                self.state = SessionState::Authenticated(session);
                self.reject(FailureKind::Rejected, reason);
            }
            ValidationOutcome::TransportFailure(reason) => {
                warn!(%task_id, %reason, "assignment check unreachable");
                self.state = SessionState::Authenticated(session);
                self.reject(FailureKind::Transport, reason);
            }
        }
    }

    fn begin_countdown(&mut self, session: Session, task_id: TaskId) {
        let Some(events) = self.events_tx.upgrade() else {
            warn!(%task_id, "event channel closed, countdown not started");
            self.state = SessionState::Authenticated(session);
            return;
        };

        let started = self.gate.start(self.countdown_secs, move |state| {
            events.send(ControlEvent::Countdown(state)).is_ok()
        });
        match started {
            Ok(()) => self.state = SessionState::CountingDown(session, task_id),
            Err(e) => {
                warn!(%task_id, "countdown failed to start: {}", e);
                self.state = SessionState::Authenticated(session);
                self.reject(FailureKind::Launch, COUNTDOWN_FAILED_MESSAGE);
            }
        }
    }

    fn on_countdown(&mut self, countdown: CountdownState) {
        let SessionState::CountingDown(session, task_id) = &self.state else {
            debug!(?countdown, "stale countdown event");
            return;
        };

        if !countdown.is_done() {
            self.countdown = Some(countdown);
            self.notify(Notice::Countdown(countdown));
            return;
        }

        let request = LaunchRequest::new(task_id.clone(), session.user_id.clone());
        let session = session.clone();
        self.gate.reset();
        self.countdown = None;
        self.notify(Notice::Countdown(countdown));
        self.launch(session, request);
        if std::mem::take(&mut self.pending_logout) {
            self.logout();
        }
        self.prompt();
    }

    fn launch(&mut self, session: Session, request: LaunchRequest) {
        self.state = SessionState::Launched(session.clone(), request.clone());
        match self.launcher.launch(request) {
            Ok(receipt) => self.notify(Notice::Launched(receipt)),
            Err(e) => {
                warn!(error = ?e, "launch failed");
                self.reject(FailureKind::Launch, e.to_string());
            }
        }
        self.state = SessionState::Authenticated(session);
    }

    fn logout(&mut self) {
        if let Err(e) = self.store.clear() {
            warn!("failed to clear session: {}", e);
            self.reject(FailureKind::Storage, CLEAR_FAILED_MESSAGE);
        }
        if let Some(session) = self.state.session() {
            info!(user_id = %session.user_id, "logged out");
        }
        self.state = SessionState::Unauthenticated;
        self.notify(Notice::LoggedOut);
    }

    fn prompt(&self) {
        match self.state {
            SessionState::Unauthenticated => self.notify(Notice::Prompt(Prompt::UserId)),
            SessionState::Authenticated(_) => self.notify(Notice::Prompt(Prompt::TaskId)),
            _ => {}
        }
    }

    fn reject(&self, kind: FailureKind, message: impl Into<String>) {
        self.notify(Notice::Rejected {
            kind,
            message: message.into(),
        });
    }

    fn notify(&self, notice: Notice) {
        if self.notices.send(notice).is_err() {
            debug!("no one is listening for notices");
        }
    }
}
