// In-memory match authority for integration tests.
//
// Runs a small veto engine so joins, turns and side choices behave like the
// real service: captain seats are handed out once, actions are checked
// against the acting team's token and turn, and state advances step by step.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use veto_app::authority::{AuthorityError, CreateResponse, JoinResponse, JoinTeam, MatchAuthority};
use veto_core::gate::OutgoingAction;
use veto_core::model::{
    ActionKind, CatalogOption, MatchState, OptionId, Phase, Role, SeriesType, StepTemplate, Team,
    UNSET,
};

pub const MAPS: [&str; 7] = ["Ascent", "Bind", "Haven", "Split", "Lotus", "Sunset", "Icebox"];

#[derive(Default)]
struct Inner {
    matches: HashMap<String, MatchState>,
    /// Issued captain tokens per match, indexed by team.
    tokens: HashMap<String, [Option<String>; 2]>,
    next_id: usize,
}

#[derive(Default)]
pub struct FakeAuthority {
    inner: Mutex<Inner>,
    pub get_state_calls: AtomicUsize,
    pub action_calls: AtomicUsize,
    /// When set, every `get_state` fails with a 500.
    pub fail_get_state: Mutex<bool>,
}

fn template(series: SeriesType) -> Vec<StepTemplate> {
    use ActionKind::*;
    let raw: &[(ActionKind, u8)] = match series {
        SeriesType::Bo1 => &[
            (Ban, 0),
            (Ban, 1),
            (Ban, 0),
            (Ban, 1),
            (Ban, 0),
            (Ban, 1),
            (Side, 1),
        ],
        SeriesType::Bo3 => &[
            (Ban, 0),
            (Ban, 1),
            (Pick, 0),
            (Side, 1),
            (Pick, 1),
            (Side, 0),
            (Ban, 0),
            (Ban, 1),
            (Side, 1),
        ],
    };
    raw.iter()
        .map(|&(action, team_index)| StepTemplate { action, team_index })
        .collect()
}

fn phase_for(kind: ActionKind) -> Phase {
    match kind {
        ActionKind::Ban => Phase::Ban,
        ActionKind::Pick => Phase::Pick,
        ActionKind::Side => Phase::Side,
    }
}

fn rejected(body: &str) -> AuthorityError {
    AuthorityError::Status {
        endpoint: "action",
        status: 403,
        body: body.to_string(),
    }
}

impl FakeAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, match_id: &str) -> Option<MatchState> {
        self.inner.lock().unwrap().matches.get(match_id).cloned()
    }

    pub fn set_fail_get_state(&self, fail: bool) {
        *self.fail_get_state.lock().unwrap() = fail;
    }

    /// Apply an action directly, as if another client had made it.
    pub fn force_action(&self, match_id: &str, kind: ActionKind, target: u32) -> MatchState {
        let mut inner = self.inner.lock().unwrap();
        let state = inner.matches.get_mut(match_id).unwrap();
        let team = state.current_turn_team;
        advance(state, team, kind, target).unwrap();
        state.clone()
    }
}

/// The veto engine: validate and apply one action for `team`.
fn advance(
    state: &mut MatchState,
    team: u8,
    kind: ActionKind,
    target: u32,
) -> Result<(), AuthorityError> {
    let index = state.current_step_index;
    let Some(step) = state.steps.get(index).copied() else {
        return Err(rejected("match completed"));
    };
    if step.team_index != team || state.current_turn_team != team {
        return Err(rejected("not your turn"));
    }
    if step.action != kind {
        return Err(rejected("wrong action for this step"));
    }

    match kind {
        ActionKind::Ban | ActionKind::Pick => {
            let used = state.step_option_ids.contains(&target);
            if used || state.option(target).is_none() {
                return Err(rejected("map not available"));
            }
            state.step_option_ids[index] = target;
            let team_state = &mut state.teams[usize::from(team)];
            if kind == ActionKind::Ban {
                team_state.banned_map_ids.push(target);
            } else {
                team_state.picked_map_ids.push(target);
            }
        }
        ActionKind::Side => {
            if target > 1 {
                return Err(rejected("invalid side"));
            }
            let is_last = index + 1 == state.steps.len();
            let map = if is_last {
                state.decider_option_id
            } else {
                state.step_option_ids[index - 1]
            };
            state.step_option_ids[index] = map;
            state.step_side_values[index] = target as i8;
            if is_last {
                state.decider_side = target as i8;
            }
        }
    }

    let next = index + 1;
    state.current_step_index = next;
    match state.steps.get(next).copied() {
        Some(next_step) => {
            state.current_turn_team = next_step.team_index;
            state.phase = phase_for(next_step.action);
            if next + 1 == state.steps.len() {
                let decider = state
                    .catalog
                    .iter()
                    .map(|o| o.id)
                    .find(|id| !state.step_option_ids.contains(id))
                    .unwrap_or(0);
                state.decider_option_id = decider;
                state.decider_side_picker_team = next_step.team_index as i8;
            }
        }
        None => state.phase = Phase::Completed,
    }
    Ok(())
}

#[async_trait]
impl MatchAuthority for FakeAuthority {
    async fn create(
        &self,
        team_a: &str,
        team_b: &str,
        series: SeriesType,
    ) -> Result<CreateResponse, AuthorityError> {
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let id = format!("match{}", inner.next_id);

        let steps = template(series);
        let state = MatchState {
            id: id.clone(),
            phase: Phase::Ban,
            current_turn_team: 0,
            current_step_index: 0,
            captain_taken: vec![false, false],
            decider_option_id: 0,
            series_type: series,
            teams: [team_a, team_b]
                .iter()
                .map(|name| Team {
                    name: name.to_string(),
                    banned_map_ids: vec![],
                    picked_map_ids: vec![],
                })
                .collect(),
            catalog: MAPS
                .iter()
                .enumerate()
                .map(|(i, name)| CatalogOption {
                    id: i as OptionId + 1,
                    name: name.to_string(),
                    preview_url: None,
                    map_img_url: Some(format!("/maps/{}.png", name.to_lowercase())),
                })
                .collect(),
            decider_side: UNSET,
            decider_side_picker_team: UNSET,
            step_option_ids: vec![0; steps.len()],
            step_side_values: vec![UNSET; steps.len()],
            steps,
        };
        inner.matches.insert(id.clone(), state);
        inner.tokens.insert(id.clone(), [None, None]);
        Ok(CreateResponse { match_id: id })
    }

    async fn get_state(&self, match_id: &str) -> Result<MatchState, AuthorityError> {
        self.get_state_calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail_get_state.lock().unwrap() {
            return Err(AuthorityError::Status {
                endpoint: "state",
                status: 500,
                body: "unavailable".to_string(),
            });
        }
        self.state(match_id).ok_or_else(|| AuthorityError::Status {
            endpoint: "state",
            status: 404,
            body: "no such match".to_string(),
        })
    }

    async fn join(
        &self,
        match_id: &str,
        team: JoinTeam,
        _token: Option<&str>,
    ) -> Result<JoinResponse, AuthorityError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.matches.contains_key(match_id) {
            return Err(AuthorityError::Status {
                endpoint: "join",
                status: 404,
                body: "no such match".to_string(),
            });
        }

        let JoinTeam::Team(team) = team else {
            return Ok(JoinResponse {
                match_id: match_id.to_string(),
                role: Role::Spectator,
                team: None,
                token: None,
            });
        };

        let slot = &mut inner.tokens.get_mut(match_id).unwrap()[usize::from(team)];
        if slot.is_some() {
            return Err(AuthorityError::Conflict {
                endpoint: "join",
                body: format!("captain for team {team} already taken"),
            });
        }
        let token = format!("token-{match_id}-{team}");
        *slot = Some(token.clone());
        if let Some(state) = inner.matches.get_mut(match_id) {
            state.captain_taken[usize::from(team)] = true;
        }

        Ok(JoinResponse {
            match_id: match_id.to_string(),
            role: Role::Captain,
            team: Some(serde_json::json!(team)),
            token: Some(token),
        })
    }

    async fn apply_action(&self, action: &OutgoingAction) -> Result<MatchState, AuthorityError> {
        self.action_calls.fetch_add(1, Ordering::SeqCst);
        let mut inner = self.inner.lock().unwrap();

        let issued = inner
            .tokens
            .get(&action.match_id)
            .and_then(|tokens| tokens[usize::from(action.team.min(1))].clone());
        if issued.as_deref() != Some(action.token.as_str()) {
            return Err(rejected("invalid token"));
        }

        let state = inner
            .matches
            .get_mut(&action.match_id)
            .ok_or_else(|| rejected("no such match"))?;
        advance(state, action.team, action.kind, action.target)?;
        Ok(state.clone())
    }
}
