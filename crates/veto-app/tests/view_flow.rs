// Integration tests for the match view event loop: identity, gating,
// request completions, fallback polling and live pushes.
//
// Tests that only talk to the in-memory authority run on paused time and
// step the loop's timers with `tokio::time::advance`. The live push test
// uses a real socket and the real clock.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use common::FakeAuthority;
use veto_app::authority::{JoinTeam, MatchAuthority};
use veto_app::join::join_match;
use veto_app::protocol::{ConnectionStatus, HeadlineStage, UiUpdate, UserCommand, ViewSnapshot};
use veto_app::view::{self, ViewConfig, LOAD_FAILED};
use veto_core::credentials::{CredentialStore, MemoryStore};
use veto_core::model::{ActionKind, Phase, Role, SeriesType, Side};

// ===========================================================================
// Test helpers
// ===========================================================================

struct Harness {
    authority: Arc<FakeAuthority>,
    backend: Arc<MemoryStore>,
    cmd_tx: mpsc::Sender<UserCommand>,
    ui_rx: mpsc::Receiver<UiUpdate>,
    match_id: String,
}

/// A ws URL that fails before any socket is opened, so the sync channel
/// reports `Disconnected` without real I/O under paused time.
const DEAD_WS_URL: &str = "ws://no such host/ws";

const POLL: Duration = Duration::from_secs(1);
const DWELL: Duration = Duration::from_secs(2);
const FADE: Duration = Duration::from_millis(500);

fn view_config(ws_url: String) -> ViewConfig {
    ViewConfig {
        ws_url,
        poll_interval: POLL,
        dwell: DWELL,
        fade: FADE,
    }
}

fn dead_ws_url() -> String {
    DEAD_WS_URL.to_string()
}

/// Create a Bo1 match, seat the given captains and start the view loop.
async fn start(captains: &[u8], ws_url: String) -> Harness {
    let authority = Arc::new(FakeAuthority::new());
    let backend = Arc::new(MemoryStore::new());
    let credentials = CredentialStore::new(Arc::clone(&backend));

    let match_id = authority
        .create("Alpha", "Beta", SeriesType::Bo1)
        .await
        .unwrap()
        .match_id;
    for &team in captains {
        join_match(
            authority.as_ref(),
            &credentials,
            &match_id,
            JoinTeam::Team(team),
        )
        .await
        .unwrap();
    }

    let (cmd_tx, cmd_rx) = mpsc::channel(16);
    let (ui_tx, ui_rx) = mpsc::channel(256);
    let dyn_authority: Arc<dyn MatchAuthority> = authority.clone();
    tokio::spawn(view::run(
        dyn_authority,
        credentials,
        view_config(ws_url),
        cmd_rx,
        ui_tx,
    ));

    Harness {
        authority,
        backend,
        cmd_tx,
        ui_rx,
        match_id,
    }
}

impl Harness {
    async fn navigate(&self, team: Option<&str>) {
        self.cmd_tx
            .send(UserCommand::Navigate {
                match_id: self.match_id.clone(),
                team: team.map(str::to_string),
            })
            .await
            .unwrap();
    }

    async fn send(&self, cmd: UserCommand) {
        self.cmd_tx.send(cmd).await.unwrap();
    }

    /// Wait for the first update matching `pred`, skipping others.
    async fn wait_for<F>(&mut self, pred: F) -> UiUpdate
    where
        F: Fn(&UiUpdate) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(60), async {
            loop {
                let update = self.ui_rx.recv().await.expect("ui channel closed");
                if pred(&update) {
                    return update;
                }
            }
        })
        .await
        .expect("timed out waiting for ui update")
    }

    async fn wait_for_snapshot<F>(&mut self, pred: F) -> ViewSnapshot
    where
        F: Fn(&ViewSnapshot) -> bool,
    {
        match self
            .wait_for(|u| matches!(u, UiUpdate::Snapshot(s) if pred(s)))
            .await
        {
            UiUpdate::Snapshot(snapshot) => *snapshot,
            _ => unreachable!(),
        }
    }

    async fn wait_for_error(&mut self) -> String {
        match self.wait_for(|u| matches!(u, UiUpdate::Error(_))).await {
            UiUpdate::Error(message) => message,
            _ => unreachable!(),
        }
    }

    async fn wait_for_disconnected(&mut self) {
        self.wait_for(|u| {
            matches!(
                u,
                UiUpdate::ConnectionStatus(ConnectionStatus::Disconnected)
            )
        })
        .await;
    }

    /// Every snapshot emitted within `window`.
    async fn snapshots_within(&mut self, window: Duration) -> Vec<ViewSnapshot> {
        let deadline = tokio::time::Instant::now() + window;
        let mut snapshots = Vec::new();
        while let Ok(Some(update)) = tokio::time::timeout_at(deadline, self.ui_rx.recv()).await {
            if let UiUpdate::Snapshot(snapshot) = update {
                snapshots.push(*snapshot);
            }
        }
        snapshots
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[tokio::test(start_paused = true)]
async fn captain_bans_and_sees_transition() {
    let mut h = start(&[0, 1], dead_ws_url()).await;
    h.navigate(Some("0")).await;

    let first = h.wait_for_snapshot(|_| true).await;
    assert_eq!(first.identity.role, Role::Captain);
    assert_eq!(first.identity.team, Some(0));
    assert!(first.can_act);
    assert_eq!(first.timeline.len(), 7);
    assert!(first.timeline[0].is_current);

    h.send(UserCommand::ClickOption(1)).await;
    let after = h
        .wait_for_snapshot(|s| s.state.current_step_index == 1)
        .await;
    assert!(after.timeline[0].is_done);
    assert_eq!(after.timeline[0].option.as_ref().unwrap().name, "Ascent");
    assert!(!after.can_act, "turn passed to Beta");

    let (headline, stage) = after.headline.expect("transition should be showing");
    assert_eq!(headline.text(), "Alpha banned Ascent");
    assert_eq!(stage, HeadlineStage::Showing);

    tokio::time::advance(DWELL).await;
    let fading = h
        .wait_for_snapshot(|s| {
            matches!(&s.headline, Some((_, HeadlineStage::FadingOut)))
        })
        .await;
    assert_eq!(fading.state.current_step_index, 1);

    tokio::time::advance(FADE).await;
    h.wait_for_snapshot(|s| s.headline.is_none()).await;
}

#[tokio::test(start_paused = true)]
async fn accepted_action_reply_emits_one_snapshot() {
    let mut h = start(&[0, 1], dead_ws_url()).await;
    h.navigate(Some("0")).await;
    h.wait_for_snapshot(|_| true).await;
    h.wait_for_disconnected().await;

    h.send(UserCommand::ClickOption(1)).await;
    let pending = h.wait_for_snapshot(|s| s.busy).await;
    assert_eq!(pending.state.current_step_index, 0);
    let settled = h.wait_for_snapshot(|s| !s.busy).await;
    assert_eq!(settled.state.current_step_index, 1);

    // Nothing else is due before the first poll tick.
    let extra = h.snapshots_within(POLL / 2).await;
    assert!(extra.is_empty(), "duplicate snapshots: {}", extra.len());
}

#[tokio::test(start_paused = true)]
async fn spectator_click_never_reaches_authority() {
    let mut h = start(&[], dead_ws_url()).await;
    h.navigate(None).await;
    let snapshot = h.wait_for_snapshot(|_| true).await;
    assert_eq!(snapshot.identity.role, Role::Spectator);
    assert!(!snapshot.can_act);

    h.send(UserCommand::ClickOption(2)).await;
    let message = h.wait_for_error().await;
    assert_eq!(
        message,
        "Only team captains can make picks, bans and side choices"
    );
    assert_eq!(h.authority.action_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn side_choice_during_ban_phase_is_rejected_locally() {
    let mut h = start(&[0], dead_ws_url()).await;
    h.navigate(Some("0")).await;
    h.wait_for_snapshot(|_| true).await;

    h.send(UserCommand::ClickSide(Side::Attack)).await;
    let message = h.wait_for_error().await;
    assert!(message.contains("side selection"), "got {message}");
    assert_eq!(h.authority.action_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn off_turn_captain_is_told_whose_turn_it_is() {
    let mut h = start(&[0, 1], dead_ws_url()).await;
    h.navigate(Some("1")).await;
    h.wait_for_snapshot(|_| true).await;

    h.send(UserCommand::ClickOption(3)).await;
    assert_eq!(h.wait_for_error().await, "It is currently Alpha's turn");
    assert_eq!(h.authority.action_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn team_route_without_credential_redirects_to_spectator() {
    let mut h = start(&[], dead_ws_url()).await;
    h.navigate(Some("1")).await;

    let update = h
        .wait_for(|u| matches!(u, UiUpdate::RedirectToSpectator { .. }))
        .await;
    match update {
        UiUpdate::RedirectToSpectator { match_id } => assert_eq!(match_id, h.match_id),
        _ => unreachable!(),
    }
    let snapshot = h.wait_for_snapshot(|_| true).await;
    assert_eq!(snapshot.identity.role, Role::Spectator);
}

#[tokio::test(start_paused = true)]
async fn failed_initial_load_navigates_home() {
    let mut h = start(&[], dead_ws_url()).await;
    h.authority.set_fail_get_state(true);
    h.navigate(None).await;

    assert_eq!(h.wait_for_error().await, LOAD_FAILED);
    h.wait_for(|u| matches!(u, UiUpdate::NavigateHome)).await;
}

#[tokio::test(start_paused = true)]
async fn rejected_action_surfaces_error_and_keeps_state() {
    let mut h = start(&[0], dead_ws_url()).await;
    h.navigate(Some("0")).await;
    h.wait_for_snapshot(|_| true).await;

    // Corrupt the stored token so the authority refuses the action.
    let key = veto_core::credentials::captain_key(&h.match_id, "0");
    veto_core::credentials::KeyValueStore::put(
        h.backend.as_ref(),
        &key,
        r#"{"role":"captain","team":0,"token":"forged"}"#,
    )
    .unwrap();
    h.navigate(Some("0")).await;
    h.wait_for_snapshot(|s| s.identity.token.as_deref() == Some("forged"))
        .await;

    h.send(UserCommand::ClickOption(1)).await;
    assert_eq!(h.wait_for_error().await, "Action rejected by server");
    let after = h.wait_for_snapshot(|s| !s.busy).await;
    assert_eq!(after.state.current_step_index, 0);
    assert!(after.can_act);
}

#[tokio::test(start_paused = true)]
async fn polling_picks_up_remote_changes_while_disconnected() {
    let mut h = start(&[], dead_ws_url()).await;
    h.navigate(None).await;
    h.wait_for_snapshot(|_| true).await;
    h.wait_for_disconnected().await;

    h.authority.force_action(&h.match_id, ActionKind::Ban, 4);
    // No poll goes out before the interval has passed.
    assert!(h.snapshots_within(POLL / 2).await.is_empty());

    tokio::time::advance(POLL).await;
    let snapshot = h
        .wait_for_snapshot(|s| s.state.current_step_index == 1)
        .await;
    assert_eq!(snapshot.state.teams[0].banned_map_ids, vec![4]);
    assert_eq!(snapshot.connection, ConnectionStatus::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn completing_the_veto_emits_match_completed() {
    let mut h = start(&[1], dead_ws_url()).await;
    for map in 1..=6 {
        h.authority.force_action(&h.match_id, ActionKind::Ban, map);
    }
    h.navigate(Some("1")).await;
    let snapshot = h.wait_for_snapshot(|_| true).await;
    assert_eq!(snapshot.state.phase, Phase::Side);
    assert!(snapshot.can_act);

    // Clicking a map during side selection does nothing.
    h.send(UserCommand::ClickOption(7)).await;
    h.send(UserCommand::ClickSide(Side::Defense)).await;

    let update = h
        .wait_for(|u| matches!(u, UiUpdate::MatchCompleted { .. }))
        .await;
    assert!(matches!(update, UiUpdate::MatchCompleted { match_id } if match_id == h.match_id));
    assert_eq!(h.authority.action_calls.load(Ordering::SeqCst), 1);

    let done = h.authority.state(&h.match_id).unwrap();
    assert_eq!(done.decider_option_id, 7);
    assert_eq!(done.decider_side, 1);
}

#[tokio::test(start_paused = true)]
async fn switching_matches_discards_late_results() {
    let mut h = start(&[], dead_ws_url()).await;
    let other = h
        .authority
        .create("Gamma", "Delta", SeriesType::Bo1)
        .await
        .unwrap()
        .match_id;

    h.navigate(None).await;
    h.send(UserCommand::Navigate {
        match_id: other.clone(),
        team: None,
    })
    .await;

    let snapshot = h.wait_for_snapshot(|s| s.state.id == other).await;
    assert_eq!(snapshot.state.teams[0].name, "Gamma");

    // Give any late completion for the first match time to arrive.
    for s in h.snapshots_within(POLL * 3).await {
        assert_eq!(s.state.id, other);
    }
}

#[tokio::test]
async fn live_pushes_are_reconciled_in_order() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (subscribed_tx, mut subscribed_rx) = mpsc::unbounded_channel();
    let (push_tx, mut push_rx) = mpsc::unbounded_channel::<String>();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        if let Some(Ok(Message::Text(first))) = ws.next().await {
            let _ = subscribed_tx.send(first.to_string());
        }
        while let Some(frame) = push_rx.recv().await {
            ws.send(Message::Text(frame.into())).await.unwrap();
        }
    });

    let mut h = start(&[], format!("ws://{addr}/ws")).await;
    h.navigate(None).await;
    h.wait_for_snapshot(|_| true).await;
    assert_eq!(subscribed_rx.recv().await.unwrap(), h.match_id);
    h.wait_for(|u| matches!(u, UiUpdate::ConnectionStatus(ConnectionStatus::Connected)))
        .await;

    let partial = |index: usize, ids: [u32; 7]| {
        serde_json::json!({
            "currentStepIndex": index,
            "currentTurnTeam": index % 2,
            "stepMapIds": ids,
        })
        .to_string()
    };
    push_tx.send("not json".to_string()).unwrap();
    push_tx.send(partial(1, [2, 0, 0, 0, 0, 0, 0])).unwrap();
    let before = h
        .wait_for_snapshot(|s| s.state.current_step_index == 1)
        .await;
    assert!(before.timeline[0].is_done);
    assert!(before.timeline[1].is_current);

    // A stale push, then a same-index push whose only visible effect is
    // the captain flags, so its snapshot marks that the stale one was seen.
    push_tx.send(partial(0, [0, 0, 0, 0, 0, 0, 0])).unwrap();
    push_tx
        .send(serde_json::json!({ "captainTaken": [true, false] }).to_string())
        .unwrap();
    let after = h
        .wait_for_snapshot(|s| s.state.captain_taken == vec![true, false])
        .await;
    assert_eq!(after.state.current_step_index, 1);
    assert_eq!(after.timeline, before.timeline, "stale push changed the timeline");

    push_tx.send(partial(2, [2, 3, 0, 0, 0, 0, 0])).unwrap();
    let last = h
        .wait_for_snapshot(|s| s.state.current_step_index == 2)
        .await;
    assert_eq!(last.state.catalog.len(), 7, "catalog kept from full state");
    assert_eq!(last.state.teams[1].name, "Beta");
    assert_eq!(last.state.captain_taken, vec![true, false]);
    assert!(last.timeline[0].is_done && last.timeline[1].is_done);
    assert!(last.timeline[2].is_current);
}
