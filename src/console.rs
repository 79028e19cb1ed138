//! Line-oriented terminal front-end.
//!
//! Renders controller notices as text and turns typed lines into events. Input
//! is read while a prompt is on screen, so a line is interpreted against that
//! prompt. During the countdown only `/quit`, `/logout` and end of input are
//! acted on; other lines are dropped.
//!
//! Commands: `/logout` and `/quit`. End of input quits.

use crate::controller::{ControlEvent, ControllerHandle, FailureKind, Notice, Prompt};
use crate::countdown::CountdownPhase;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

const QUIT: &str = "/quit";
const LOGOUT: &str = "/logout";

/// Drive the controller from `input` until quit, writing everything to `output`.
pub async fn run<R, W>(input: R, mut output: W, handle: ControllerHandle) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let ControllerHandle {
        events,
        mut notices,
    } = handle;
    let mut lines = input.lines();
    let mut prompt: Option<Prompt> = None;
    let mut counting = false;
    let mut quitting = false;

    loop {
        tokio::select! {
            notice = notices.recv() => {
                let Some(notice) = notice else {
                    break;
                };
                match &notice {
                    Notice::Prompt(p) => {
                        prompt = (!quitting).then_some(*p);
                        counting = false;
                    }
                    Notice::Countdown(state) => counting = !quitting && !state.is_done(),
                    _ => {}
                }
                if let Some(text) = render(&notice) {
                    output.write_all(text.as_bytes()).await?;
                    output.write_all(b"\n").await?;
                    output.flush().await?;
                }
            }
            line = lines.next_line(), if prompt.is_some() || counting => {
                let event = match (line?, prompt.take()) {
                    (None, _) => {
                        debug!("input closed");
                        ControlEvent::Quit
                    }
                    (Some(line), Some(current)) => to_event(current, line),
                    (Some(line), None) => match line.trim() {
                        QUIT => ControlEvent::Quit,
                        LOGOUT => ControlEvent::Logout,
                        _ => {
                            debug!("ignoring input during countdown");
                            continue;
                        }
                    },
                };
                if event == ControlEvent::Quit {
                    quitting = true;
                    counting = false;
                }
                if events.send(event).is_err() {
                    break;
                }
            }
        }
    }
    Ok(())
}

fn to_event(prompt: Prompt, line: String) -> ControlEvent {
    match (line.trim(), prompt) {
        (QUIT, _) => ControlEvent::Quit,
        (LOGOUT, _) => ControlEvent::Logout,
        (_, Prompt::UserId) => ControlEvent::SubmitIdentity(line),
        (_, Prompt::TaskId) => ControlEvent::SubmitTask(line),
    }
}

fn label(kind: FailureKind) -> &'static str {
    match kind {
        FailureKind::InputInvalid => "Invalid input",
        FailureKind::Rejected => "Invalid",
        FailureKind::Transport => "Connection error",
        FailureKind::SessionMissing | FailureKind::Storage | FailureKind::Launch => "Error",
    }
}

/// Text for one notice, or `None` when there is nothing to show.
pub fn render(notice: &Notice) -> Option<String> {
    let text = match notice {
        Notice::Prompt(Prompt::UserId) => format!("Enter your User ID ({QUIT} to exit):"),
        Notice::Prompt(Prompt::TaskId) => {
            format!("Enter Task ID (10 chars) ({LOGOUT}, {QUIT}):")
        }
        Notice::Welcome(session) => {
            format!("Welcome, {} ({})", session.display_name, session.user_id)
        }
        Notice::Rejected { kind, message } => format!("[{}] {}", label(*kind), message),
        Notice::Countdown(state) => match state.phase {
            CountdownPhase::Counting => {
                format!("Recording starts in: {} seconds", state.remaining_seconds)
            }
            CountdownPhase::Completing => "Go!".to_string(),
            CountdownPhase::Done => return None,
        },
        Notice::Launched(receipt) => format!(
            "Recording started for Task ID: {} by User ID: {}",
            receipt.request.task_id, receipt.request.user_id
        ),
        Notice::LoggedOut => "Logged out.".to_string(),
        Notice::Busy => "Recording is about to start, please wait.".to_string(),
    };
    Some(text)
}
