// Match view orchestrator.
//
// One cooperative event loop owns everything for the match being shown:
// the resolved identity, the canonical state (through the reconciler), the
// action gate, the transition sequencer and the sync channel. Requests to the
// authority run as spawned tasks and report back through a channel, tagged
// with the match id and navigation generation they were issued under.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use veto_core::credentials::{CredentialStore, KeyValueStore};
use veto_core::gate::{ActionGate, ActionTarget, GateDecision, OutgoingAction};
use veto_core::identity::{self, Identity};
use veto_core::model::{MatchState, Phase, StatePayload};
use veto_core::reconcile::StateReconciler;
use veto_core::sync::{SyncChannel, SyncEvent};
use veto_core::timeline;
use veto_core::transition::{TransitionSequencer, TransitionState};

use crate::authority::{AuthorityError, MatchAuthority};
use crate::config::Config;
use crate::protocol::{ConnectionStatus, HeadlineStage, UiUpdate, UserCommand, ViewSnapshot};

pub const LOAD_FAILED: &str = "Failed to load match. Redirecting...";
pub const ACTION_REJECTED: &str = "Action rejected by server";
pub const NO_MATCH: &str = "Create or join a match first";
pub const REFRESH_FAILED: &str = "Failed to refresh match";

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ViewConfig {
    pub ws_url: String,
    /// Fallback polling period while the sync channel is down.
    pub poll_interval: Duration,
    pub dwell: Duration,
    pub fade: Duration,
}

impl ViewConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            ws_url: config.sync.ws_url.clone(),
            poll_interval: config.sync.poll_interval(),
            dwell: config.transition.dwell(),
            fade: config.transition.fade(),
        }
    }
}

// ---------------------------------------------------------------------------
// Request bookkeeping
// ---------------------------------------------------------------------------

/// Identifies the view a request was issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RequestTag {
    match_id: String,
    generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestKind {
    InitialLoad,
    Refresh,
    Poll,
    Action,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RequestKind::InitialLoad => "initial load",
            RequestKind::Refresh => "refresh",
            RequestKind::Poll => "poll",
            RequestKind::Action => "action",
        })
    }
}

struct Completion {
    tag: RequestTag,
    kind: RequestKind,
    result: Result<MatchState, AuthorityError>,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Everything tied to the match currently on screen. Dropped on navigation.
struct Session {
    match_id: String,
    identity: Identity,
    reconciler: StateReconciler,
    gate: ActionGate,
    sequencer: TransitionSequencer,
    connection: ConnectionStatus,
    synced_at: Option<DateTime<Utc>>,
    poll_in_flight: bool,
    completed: bool,
}

impl Session {
    fn new(match_id: String, identity: Identity, config: &ViewConfig) -> Self {
        Self {
            match_id,
            identity,
            reconciler: StateReconciler::new(),
            gate: ActionGate::new(),
            sequencer: TransitionSequencer::new(config.dwell, config.fade),
            connection: ConnectionStatus::Disconnected,
            synced_at: None,
            poll_in_flight: false,
            completed: false,
        }
    }

    fn snapshot(&self) -> Option<ViewSnapshot> {
        let state = self.reconciler.state()?;
        let headline = match self.sequencer.state() {
            TransitionState::Idle => None,
            TransitionState::Showing { headline, .. } => {
                Some((headline.clone(), HeadlineStage::Showing))
            }
            TransitionState::FadingOut { headline, .. } => {
                Some((headline.clone(), HeadlineStage::FadingOut))
            }
        };
        Some(ViewSnapshot {
            state: state.clone(),
            identity: self.identity.clone(),
            timeline: timeline::build(state),
            headline,
            can_act: self.gate.is_open(state, &self.identity),
            busy: self.gate.is_busy(),
            connection: self.connection,
            synced_at: self.synced_at.unwrap_or_else(Utc::now),
        })
    }
}

// ---------------------------------------------------------------------------
// MatchView
// ---------------------------------------------------------------------------

struct MatchView<S> {
    authority: Arc<dyn MatchAuthority>,
    credentials: CredentialStore<S>,
    config: ViewConfig,
    channel: SyncChannel,
    done_tx: mpsc::Sender<Completion>,
    ui_tx: mpsc::Sender<UiUpdate>,
    /// Bumped on every navigation so late completions can be recognised.
    generation: u64,
    session: Option<Session>,
}

impl<S: KeyValueStore> MatchView<S> {
    async fn send(&self, update: UiUpdate) {
        let _ = self.ui_tx.send(update).await;
    }

    async fn emit_snapshot(&self) {
        if let Some(snapshot) = self.session.as_ref().and_then(Session::snapshot) {
            self.send(UiUpdate::Snapshot(Box::new(snapshot))).await;
        }
    }

    fn tag(&self, match_id: &str) -> RequestTag {
        RequestTag {
            match_id: match_id.to_string(),
            generation: self.generation,
        }
    }

    fn current_tag(&self) -> Option<RequestTag> {
        self.session.as_ref().map(|s| self.tag(&s.match_id))
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.session
            .as_ref()
            .and_then(|s| s.sequencer.next_deadline())
    }

    // -- Requests --

    fn spawn_get_state(&self, kind: RequestKind) {
        let Some(tag) = self.current_tag() else {
            return;
        };
        let authority = Arc::clone(&self.authority);
        let done_tx = self.done_tx.clone();
        tokio::spawn(async move {
            let result = authority.get_state(&tag.match_id).await;
            let _ = done_tx.send(Completion { tag, kind, result }).await;
        });
    }

    fn spawn_action(&self, action: OutgoingAction) {
        let Some(tag) = self.current_tag() else {
            return;
        };
        let authority = Arc::clone(&self.authority);
        let done_tx = self.done_tx.clone();
        tokio::spawn(async move {
            let result = authority.apply_action(&action).await;
            let _ = done_tx
                .send(Completion {
                    tag,
                    kind: RequestKind::Action,
                    result,
                })
                .await;
        });
    }

    // -- Navigation --

    async fn navigate(&mut self, match_id: String, team: Option<String>) {
        let match_id = match_id.trim().to_string();
        if match_id.is_empty() {
            self.leave();
            self.send(UiUpdate::Error(NO_MATCH.to_string())).await;
            self.send(UiUpdate::NavigateHome).await;
            return;
        }

        self.leave();
        let resolution = identity::resolve(&self.credentials, &match_id, team.as_deref());
        if resolution.redirect_to_spectator {
            self.send(UiUpdate::RedirectToSpectator {
                match_id: match_id.clone(),
            })
            .await;
        }

        info!(
            "Entering match {match_id} as {:?} (team {:?})",
            resolution.identity.role, resolution.identity.team
        );
        self.session = Some(Session::new(match_id, resolution.identity, &self.config));
        self.spawn_get_state(RequestKind::InitialLoad);
    }

    /// Close the channel and drop the session. In-flight requests become
    /// inert because the generation moves on.
    fn leave(&mut self) {
        self.channel.close();
        self.generation += 1;
        if let Some(session) = self.session.take() {
            info!("Left match {}", session.match_id);
        }
    }

    // -- State updates --

    /// Feed a payload to the reconciler and refresh everything derived from it.
    /// Returns whether the payload was accepted and a snapshot went out.
    async fn accept(&mut self, payload: StatePayload) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        let Ok(state) = session.reconciler.apply(payload) else {
            return false;
        };

        session.sequencer.observe(state, Instant::now());
        let finished = state.phase == Phase::Completed && !session.completed;
        session.synced_at = Some(Utc::now());
        if finished {
            session.completed = true;
        }
        let match_id = session.match_id.clone();

        self.emit_snapshot().await;
        if finished {
            info!("Match {match_id} completed");
            self.send(UiUpdate::MatchCompleted { match_id }).await;
        }
        true
    }

    async fn handle_completion(&mut self, done: Completion) {
        if self.current_tag().as_ref() != Some(&done.tag) {
            debug!(
                "Discarding stale {} result for match {} (generation {})",
                done.kind, done.tag.match_id, done.tag.generation
            );
            return;
        }

        match (done.kind, done.result) {
            (RequestKind::InitialLoad, Ok(state)) => {
                self.accept(StatePayload::Full(state)).await;
                if self
                    .session
                    .as_ref()
                    .is_some_and(|s| s.reconciler.state().is_some())
                {
                    self.channel.open(&done.tag.match_id);
                } else {
                    self.load_failed().await;
                }
            }
            (RequestKind::InitialLoad, Err(e)) => {
                warn!("Initial load of match {} failed: {e}", done.tag.match_id);
                self.load_failed().await;
            }
            (RequestKind::Refresh, Ok(state)) => {
                self.accept(StatePayload::Full(state)).await;
            }
            (RequestKind::Refresh, Err(e)) => {
                warn!("Refresh of match {} failed: {e}", done.tag.match_id);
                self.send(UiUpdate::Error(REFRESH_FAILED.to_string())).await;
            }
            (RequestKind::Poll, result) => {
                if let Some(session) = self.session.as_mut() {
                    session.poll_in_flight = false;
                }
                match result {
                    Ok(state) => {
                        self.accept(StatePayload::Full(state)).await;
                    }
                    Err(e) => warn!("Fallback poll of match {} failed: {e}", done.tag.match_id),
                }
            }
            (RequestKind::Action, result) => {
                if let Some(session) = self.session.as_mut() {
                    session.gate.settle();
                }
                match result {
                    Ok(state) => {
                        // A reply older than a push we already have is
                        // rejected, but the settled gate still needs redrawing.
                        if !self.accept(StatePayload::Full(state)).await {
                            self.emit_snapshot().await;
                        }
                    }
                    Err(e) => {
                        warn!("Authority rejected action: {e}");
                        self.send(UiUpdate::Error(ACTION_REJECTED.to_string())).await;
                        self.emit_snapshot().await;
                    }
                }
            }
        }
    }

    async fn load_failed(&mut self) {
        self.leave();
        self.send(UiUpdate::Error(LOAD_FAILED.to_string())).await;
        self.send(UiUpdate::NavigateHome).await;
    }

    async fn handle_sync_event(&mut self, event: SyncEvent) {
        if !self.channel.is_current(&event) {
            debug!(
                "Ignoring event from old sync channel {} for match {}",
                event.serial(),
                event.match_id()
            );
            return;
        }
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if event.match_id() != session.match_id {
            debug!("Ignoring sync event for match {}", event.match_id());
            return;
        }

        match event {
            SyncEvent::Connected { .. } => {
                session.connection = ConnectionStatus::Connected;
                self.send(UiUpdate::ConnectionStatus(ConnectionStatus::Connected))
                    .await;
            }
            SyncEvent::Disconnected { .. } => {
                session.connection = ConnectionStatus::Disconnected;
                self.channel.handle_disconnect(&event);
                info!(
                    "Sync channel for match {} down, falling back to polling",
                    event.match_id()
                );
                self.send(UiUpdate::ConnectionStatus(ConnectionStatus::Disconnected))
                    .await;
            }
            SyncEvent::Payload { payload, .. } => {
                self.accept(payload).await;
            }
        }
    }

    // -- User input --

    async fn handle_command(&mut self, cmd: UserCommand) {
        match cmd {
            UserCommand::Navigate { match_id, team } => self.navigate(match_id, team).await,
            UserCommand::Leave => self.leave(),
            UserCommand::ClickOption(id) => self.click(ActionTarget::Option(id)).await,
            UserCommand::ClickSide(side) => self.click(ActionTarget::Side(side)).await,
            UserCommand::Refresh => self.refresh(),
            // The loop handles Quit before dispatching here.
            UserCommand::Quit => {}
        }
    }

    async fn click(&mut self, target: ActionTarget) {
        let decision = match self.session.as_mut() {
            Some(session) => match session.reconciler.state() {
                Some(state) => Some(session.gate.dispatch(state, &session.identity, target)),
                None => None,
            },
            None => None,
        };

        match decision {
            None => self.send(UiUpdate::Error(NO_MATCH.to_string())).await,
            Some(Err(rejection)) => {
                debug!("Action gate rejected {target:?}: {rejection}");
                self.send(UiUpdate::Error(rejection.to_string())).await;
            }
            Some(Ok(GateDecision::Ignored)) => {}
            Some(Ok(GateDecision::Dispatch(action))) => {
                info!(
                    "Sending {} {} for team {} in match {}",
                    action.kind, action.target, action.team, action.match_id
                );
                self.spawn_action(action);
                self.emit_snapshot().await;
            }
        }
    }

    /// Manual retry: reload the state and resubscribe if the channel is down.
    fn refresh(&mut self) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let match_id = session.match_id.clone();
        let loaded = session.reconciler.state().is_some();

        self.spawn_get_state(if loaded {
            RequestKind::Refresh
        } else {
            RequestKind::InitialLoad
        });
        if loaded && !self.channel.is_open() {
            self.channel.open(&match_id);
        }
    }

    // -- Timers --

    async fn handle_transition_deadline(&mut self) {
        let changed = self
            .session
            .as_mut()
            .is_some_and(|s| s.sequencer.tick(Instant::now()));
        if changed {
            self.emit_snapshot().await;
        }
    }

    fn poll_if_disconnected(&mut self) {
        let channel_open = self.channel.is_open();
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if channel_open
            || session.poll_in_flight
            || session.completed
            || session.reconciler.state().is_none()
        {
            return;
        }
        debug!("Polling match {} while sync channel is down", session.match_id);
        session.poll_in_flight = true;
        self.spawn_get_state(RequestKind::Poll);
    }
}

// ---------------------------------------------------------------------------
// Main event loop
// ---------------------------------------------------------------------------

/// Run the match view event loop until `Quit` or the command channel closes.
///
/// Listens with `tokio::select!` on:
/// 1. User commands (navigation, clicks, refresh)
/// 2. Sync channel events
/// 3. Completed authority requests
/// 4. The transition sequencer's next deadline
/// 5. The fallback poll tick
///
/// Pushes UI updates through `ui_tx`.
pub async fn run<S: KeyValueStore>(
    authority: Arc<dyn MatchAuthority>,
    credentials: CredentialStore<S>,
    config: ViewConfig,
    mut cmd_rx: mpsc::Receiver<UserCommand>,
    ui_tx: mpsc::Sender<UiUpdate>,
) -> anyhow::Result<()> {
    info!("Match view event loop started");

    let (sync_tx, mut sync_rx) = mpsc::channel(64);
    let (done_tx, mut done_rx) = mpsc::channel(16);

    let mut poll_interval = tokio::time::interval(config.poll_interval);
    poll_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; consume it so the first poll
    // happens after one full interval.
    poll_interval.tick().await;

    let mut view = MatchView {
        authority,
        credentials,
        channel: SyncChannel::new(config.ws_url.clone(), sync_tx),
        config,
        done_tx,
        ui_tx,
        generation: 0,
        session: None,
    };

    loop {
        let deadline = view.next_deadline();

        tokio::select! {
            // --- User commands ---
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(UserCommand::Quit) => {
                        info!("Quit command received, shutting down");
                        break;
                    }
                    Some(cmd) => view.handle_command(cmd).await,
                    None => {
                        info!("Command channel closed, shutting down");
                        break;
                    }
                }
            }

            // --- Sync channel ---
            Some(event) = sync_rx.recv() => {
                view.handle_sync_event(event).await;
            }

            // --- Authority responses ---
            Some(done) = done_rx.recv() => {
                view.handle_completion(done).await;
            }

            // --- Transition timing ---
            _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                view.handle_transition_deadline().await;
            }

            // --- Fallback polling ---
            _ = poll_interval.tick() => {
                view.poll_if_disconnected();
            }
        }
    }

    view.leave();
    info!("Match view event loop exiting");
    Ok(())
}
