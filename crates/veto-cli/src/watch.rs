// Interactive `watch` front-end.
//
// Consumes UiUpdate messages from the view loop and prints them, and turns
// input lines into UserCommand messages. Returns once the user quits, the
// match completes or the view gives up on the match.
//
// Input arrives as a channel of lines so stdin can be read on a plain
// thread that never holds up runtime shutdown.

use std::io::Write;

use tokio::sync::mpsc;
use tracing::{debug, info};

use veto_app::protocol::{ConnectionStatus, UiUpdate, UserCommand};
use veto_core::model::MatchState;

use crate::input::{self, Input, HELP};
use crate::render;

/// Why the watch loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Quit,
    Completed(String),
    NavigatedHome,
    ViewClosed,
}

pub async fn run<W: Write>(
    mut lines: mpsc::Receiver<String>,
    mut out: W,
    mut ui_rx: mpsc::Receiver<UiUpdate>,
    cmd_tx: mpsc::Sender<UserCommand>,
) -> anyhow::Result<Outcome> {
    let mut input_open = true;
    let mut last_state: Option<MatchState> = None;

    loop {
        tokio::select! {
            biased;

            update = ui_rx.recv() => {
                let Some(update) = update else {
                    return Ok(Outcome::ViewClosed);
                };
                match update {
                    UiUpdate::Snapshot(snapshot) => {
                        writeln!(out, "\n{}", render::render_snapshot(&snapshot))?;
                        last_state = Some(snapshot.state);
                    }
                    UiUpdate::Error(message) => writeln!(out, "! {message}")?,
                    UiUpdate::RedirectToSpectator { match_id } => {
                        writeln!(out, "no captain credential for this team, watching {match_id} as spectator")?;
                    }
                    UiUpdate::ConnectionStatus(status) => {
                        let text = match status {
                            ConnectionStatus::Connected => "live updates connected",
                            ConnectionStatus::Disconnected => "live updates lost, polling",
                        };
                        writeln!(out, "-- {text}")?;
                    }
                    UiUpdate::NavigateHome => return Ok(Outcome::NavigatedHome),
                    UiUpdate::MatchCompleted { match_id } => {
                        if let Some(state) = &last_state {
                            writeln!(out, "\n{}", render::render_summary(state))?;
                        }
                        info!("Watch finished: match {match_id} completed");
                        return Ok(Outcome::Completed(match_id));
                    }
                }
                out.flush()?;
            }

            line = lines.recv(), if input_open => {
                let Some(line) = line else {
                    debug!("Input closed");
                    input_open = false;
                    continue;
                };
                match input::parse_line(&line, last_state.as_ref()) {
                    Ok(Input::Command(UserCommand::Quit)) => {
                        let _ = cmd_tx.send(UserCommand::Quit).await;
                        return Ok(Outcome::Quit);
                    }
                    Ok(Input::Command(cmd)) => {
                        if cmd_tx.send(cmd).await.is_err() {
                            return Ok(Outcome::ViewClosed);
                        }
                    }
                    Ok(Input::Help) => writeln!(out, "{HELP}")?,
                    Ok(Input::Empty) => {}
                    Err(e) => writeln!(out, "! {e}")?,
                }
                out.flush()?;
            }
        }
    }
}
