// Display-ready veto timeline derived from the step template and the
// parallel step arrays. Rebuilt wholesale on every canonical update.

use crate::model::{ActionKind, MatchState, OptionId, Side};

/// A catalog option resolved for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOption {
    pub id: OptionId,
    pub name: String,
    pub image: Option<String>,
}

impl ResolvedOption {
    /// Resolve `id` against the catalog. Unknown non-zero ids keep a
    /// placeholder name so the row still reads sensibly.
    pub fn lookup(state: &MatchState, id: OptionId) -> Option<Self> {
        if id == 0 {
            return None;
        }
        Some(match state.option(id) {
            Some(option) => ResolvedOption {
                id,
                name: option.name.clone(),
                image: option.image().map(str::to_string),
            },
            None => ResolvedOption {
                id,
                name: format!("Map {id}"),
                image: None,
            },
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineRow {
    pub index: usize,
    pub kind: ActionKind,
    pub team: u8,
    pub team_name: String,
    pub option: Option<ResolvedOption>,
    /// Only ever set on side rows.
    pub side: Option<Side>,
    pub is_current: bool,
    pub is_done: bool,
}

impl TimelineRow {
    pub fn side_label(&self) -> Option<&'static str> {
        self.side.map(Side::label)
    }
}

/// Build one row per template step, in template order.
pub fn build(state: &MatchState) -> Vec<TimelineRow> {
    state
        .steps
        .iter()
        .enumerate()
        .map(|(i, step)| {
            let option_id = state.step_option_ids.get(i).copied().unwrap_or(0);
            let side = match step.action {
                ActionKind::Side => state
                    .step_side_values
                    .get(i)
                    .copied()
                    .and_then(Side::from_code),
                ActionKind::Ban | ActionKind::Pick => None,
            };

            TimelineRow {
                index: i,
                kind: step.action,
                team: step.team_index,
                team_name: state.team_name(step.team_index),
                option: ResolvedOption::lookup(state, option_id),
                side,
                is_current: state.current_step_index == i,
                is_done: option_id != 0,
            }
        })
        .collect()
}
