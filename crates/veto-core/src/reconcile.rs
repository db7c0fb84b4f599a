// Reconciliation of incoming state payloads into the single canonical
// MatchState.
//
// Field retention for partial payloads (no catalog):
//
//   field                         | taken from
//   ------------------------------+------------------------------------------
//   catalog                       | previous (never sent in a partial)
//   steps                         | previous (template is immutable)
//   teams[i].name                 | previous
//   teams[i].banned/picked ids    | incoming when present, else previous
//   every other top-level field   | incoming when present, else previous
//
// A full payload replaces the state outright. Neither kind may move
// `current_step_index` or `phase` backwards for the same match.

use thiserror::Error;
use tracing::{debug, warn};

use crate::model::{MatchPatch, MatchState, Phase, StatePayload, Team};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MergeRejection {
    #[error("stale update: step index {incoming} is behind rendered index {current}")]
    Stale { current: usize, incoming: usize },

    #[error("stale update: phase moved backwards")]
    PhaseRegressed,

    #[error("partial update received before any full state")]
    NoBaseline,

    #[error("update for match {received} while showing match {expected}")]
    OtherMatch { expected: String, received: String },

    #[error("update breaks the step array invariant")]
    Malformed,
}

/// Merge `incoming` over `previous`. Pure: the caller decides what to do with
/// the result, and on rejection keeps `previous` untouched.
pub fn merge(
    previous: Option<&MatchState>,
    incoming: StatePayload,
) -> Result<MatchState, MergeRejection> {
    let Some(previous) = previous else {
        return match incoming {
            StatePayload::Full(state) => checked(state),
            StatePayload::Partial(_) => Err(MergeRejection::NoBaseline),
        };
    };

    match incoming {
        StatePayload::Full(state) => {
            if state.id != previous.id {
                // A different match entirely; nothing to order against.
                return checked(state);
            }
            guard_order(previous, state.current_step_index, Some(state.phase))?;
            checked(state)
        }
        StatePayload::Partial(patch) => {
            if let Some(id) = patch.id.as_deref() {
                if id != previous.id {
                    return Err(MergeRejection::OtherMatch {
                        expected: previous.id.clone(),
                        received: id.to_string(),
                    });
                }
            }
            guard_order(
                previous,
                patch.current_step_index.unwrap_or(previous.current_step_index),
                patch.phase,
            )?;
            checked(overlay(previous, patch))
        }
    }
}

fn guard_order(
    previous: &MatchState,
    incoming_index: usize,
    incoming_phase: Option<Phase>,
) -> Result<(), MergeRejection> {
    if incoming_index < previous.current_step_index {
        return Err(MergeRejection::Stale {
            current: previous.current_step_index,
            incoming: incoming_index,
        });
    }
    if incoming_phase.is_some_and(|phase| phase < previous.phase) {
        return Err(MergeRejection::PhaseRegressed);
    }
    Ok(())
}

fn checked(state: MatchState) -> Result<MatchState, MergeRejection> {
    if state.is_well_formed() {
        Ok(state)
    } else {
        Err(MergeRejection::Malformed)
    }
}

fn overlay(previous: &MatchState, patch: MatchPatch) -> MatchState {
    let mut merged = previous.clone();

    if let Some(phase) = patch.phase {
        merged.phase = phase;
    }
    if let Some(team) = patch.current_turn_team {
        merged.current_turn_team = team;
    }
    if let Some(index) = patch.current_step_index {
        merged.current_step_index = index;
    }
    if let Some(taken) = patch.captain_taken {
        merged.captain_taken = taken;
    }
    if let Some(id) = patch.decider_option_id {
        merged.decider_option_id = id;
    }
    if let Some(series) = patch.series_type {
        merged.series_type = series;
    }
    if let Some(side) = patch.decider_side {
        merged.decider_side = side;
    }
    if let Some(picker) = patch.decider_side_picker_team {
        merged.decider_side_picker_team = picker;
    }
    if let Some(ids) = patch.step_option_ids {
        merged.step_option_ids = ids;
    }
    if let Some(sides) = patch.step_side_values {
        merged.step_side_values = sides;
    }

    for (i, team_patch) in patch.teams.into_iter().flatten().enumerate() {
        match merged.teams.get_mut(i) {
            Some(team) => {
                if let Some(banned) = team_patch.banned_map_ids {
                    team.banned_map_ids = banned;
                }
                if let Some(picked) = team_patch.picked_map_ids {
                    team.picked_map_ids = picked;
                }
            }
            None => merged.teams.push(Team {
                name: team_patch.name.unwrap_or_else(|| format!("Team {i}")),
                banned_map_ids: team_patch.banned_map_ids.unwrap_or_default(),
                picked_map_ids: team_patch.picked_map_ids.unwrap_or_default(),
            }),
        }
    }

    merged
}

// ---------------------------------------------------------------------------
// StateReconciler
// ---------------------------------------------------------------------------

/// Owner and only writer of the canonical state for one match view.
#[derive(Debug, Default)]
pub struct StateReconciler {
    state: Option<MatchState>,
}

impl StateReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> Option<&MatchState> {
        self.state.as_ref()
    }

    /// Apply one payload. On rejection the canonical state is unchanged.
    pub fn apply(&mut self, incoming: StatePayload) -> Result<&MatchState, MergeRejection> {
        match merge(self.state.as_ref(), incoming) {
            Ok(next) => {
                debug!(
                    "Canonical state for {} now at step {} ({:?})",
                    next.id, next.current_step_index, next.phase
                );
                let state = self.state.insert(next);
                Ok(&*state)
            }
            Err(rejection) => {
                match &rejection {
                    MergeRejection::Stale { .. } | MergeRejection::PhaseRegressed => {
                        debug!("Discarding out-of-order update: {rejection}")
                    }
                    _ => warn!("Discarding state update: {rejection}"),
                }
                Err(rejection)
            }
        }
    }

    /// Drop the canonical state, e.g. when leaving the match view.
    pub fn reset(&mut self) {
        self.state = None;
    }
}
