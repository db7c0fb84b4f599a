// Read-only helpers for the match and summary views.

use crate::model::{ActionKind, MatchState, OptionId, Phase, Side};
use crate::timeline::ResolvedOption;

/// Shown wherever a side or team is not decided yet.
pub const TBD: &str = "TBD";

pub fn current_team_name(state: &MatchState) -> String {
    state.team_name(state.current_turn_team)
}

/// Display name for an option id; `None` for the unset id.
pub fn option_name(state: &MatchState, id: OptionId) -> Option<String> {
    ResolvedOption::lookup(state, id).map(|o| o.name)
}

pub fn is_banned(state: &MatchState, id: OptionId) -> bool {
    state.teams.iter().any(|t| t.banned_map_ids.contains(&id))
}

pub fn is_picked(state: &MatchState, id: OptionId) -> bool {
    state.teams.iter().any(|t| t.picked_map_ids.contains(&id))
}

/// The decider is only revealed once the match is over.
pub fn is_decider(state: &MatchState, id: OptionId) -> bool {
    state.phase == Phase::Completed && id != 0 && state.decider_option_id == id
}

pub fn team_picked_names(state: &MatchState, team: u8) -> Vec<String> {
    state
        .team(team)
        .map(|t| {
            t.picked_map_ids
                .iter()
                .filter_map(|&id| option_name(state, id))
                .collect()
        })
        .unwrap_or_default()
}

pub fn decider(state: &MatchState) -> Option<ResolvedOption> {
    ResolvedOption::lookup(state, state.decider_option_id)
}

/// The decider side picker and the side they chose, if both are set.
fn decider_choice(state: &MatchState) -> Option<(u8, Side)> {
    let picker = u8::try_from(state.decider_side_picker_team).ok()?;
    let side = Side::from_code(state.decider_side)?;
    Some((picker, side))
}

fn team_starting_on(state: &MatchState, wanted: Side) -> Option<String> {
    let (picker, side) = decider_choice(state)?;
    let other = if picker == 0 { 1 } else { 0 };
    let team = if side == wanted { picker } else { other };
    Some(state.team_name(team))
}

/// Team starting on attack on the decider, `None` while undecided.
pub fn attacking_team(state: &MatchState) -> Option<String> {
    team_starting_on(state, Side::Attack)
}

pub fn defending_team(state: &MatchState) -> Option<String> {
    team_starting_on(state, Side::Defense)
}

/// One map of a best-of-three series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesCard {
    pub option: ResolvedOption,
    /// Team that picked the map; `None` for the decider.
    pub picked_by: Option<u8>,
    pub side_line: String,
}

fn side_line(team_name: String, side: Option<Side>) -> String {
    match side {
        Some(side) => format!("{team_name} STARTS ON {}", side.short_label()),
        None => TBD.to_string(),
    }
}

/// Who chose a starting side on `id` and what they chose.
fn side_line_for(state: &MatchState, id: OptionId) -> String {
    if id == state.decider_option_id {
        return match u8::try_from(state.decider_side_picker_team) {
            Ok(picker) => side_line(state.team_name(picker), Side::from_code(state.decider_side)),
            Err(_) => TBD.to_string(),
        };
    }

    let side_step = state.steps.iter().enumerate().find(|(i, step)| {
        step.action == ActionKind::Side && state.step_option_ids.get(*i) == Some(&id)
    });
    match side_step {
        Some((i, step)) => side_line(
            state.team_name(step.team_index),
            state
                .step_side_values
                .get(i)
                .copied()
                .and_then(Side::from_code),
        ),
        None => "SIDE INFO MISSING".to_string(),
    }
}

/// Each team's first pick followed by the decider, skipping anything unset.
pub fn series_cards(state: &MatchState) -> Vec<SeriesCard> {
    let picks = (0..2u8).filter_map(|team| {
        let id = *state.team(team)?.picked_map_ids.first()?;
        Some((id, Some(team)))
    });
    let decider = (state.decider_option_id != 0).then_some((state.decider_option_id, None));

    picks
        .chain(decider)
        .filter_map(|(id, picked_by)| {
            // Ids outside the catalog have nothing to show.
            state.option(id)?;
            Some(SeriesCard {
                option: ResolvedOption::lookup(state, id)?,
                picked_by,
                side_line: side_line_for(state, id),
            })
        })
        .collect()
}
