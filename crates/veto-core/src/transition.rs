// Reveal-then-fade presentation of the step that just completed.
//
// Idle -> Showing (dwell) -> FadingOut (fade) -> Idle. Time is supplied by
// the caller, so the machine never sleeps on its own: the owner asks for
// `next_deadline()` and calls `tick()` once it has passed.

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::model::{ActionKind, MatchState, Phase, Side};
use crate::timeline::ResolvedOption;

pub const DEFAULT_DWELL: Duration = Duration::from_millis(2500);
pub const DEFAULT_FADE: Duration = Duration::from_millis(600);

/// What happened on a completed step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Headline {
    pub step_index: usize,
    pub kind: ActionKind,
    pub team: u8,
    pub team_name: String,
    pub option: Option<ResolvedOption>,
    pub side: Option<Side>,
}

impl Headline {
    fn resolve(state: &MatchState, step_index: usize) -> Option<Self> {
        let step = state.steps.get(step_index)?;
        let option_id = state.step_option_ids.get(step_index).copied().unwrap_or(0);
        let side = match step.action {
            ActionKind::Side => state
                .step_side_values
                .get(step_index)
                .copied()
                .and_then(Side::from_code),
            ActionKind::Ban | ActionKind::Pick => None,
        };
        Some(Headline {
            step_index,
            kind: step.action,
            team: step.team_index,
            team_name: state.team_name(step.team_index),
            option: ResolvedOption::lookup(state, option_id),
            side,
        })
    }

    pub fn text(&self) -> String {
        let option = self
            .option
            .as_ref()
            .map(|o| o.name.as_str())
            .unwrap_or("a map");
        match self.kind {
            ActionKind::Ban => format!("{} banned {option}", self.team_name),
            ActionKind::Pick => format!("{} picked {option}", self.team_name),
            ActionKind::Side => match self.side {
                Some(side) => format!("{} chose {} on {option}", self.team_name, side.label()),
                None => format!("{} chose a side on {option}", self.team_name),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionState {
    Idle,
    Showing { headline: Headline, until: Instant },
    FadingOut { headline: Headline, until: Instant },
}

pub struct TransitionSequencer {
    state: TransitionState,
    /// Highest step index already accounted for; `None` until the first state.
    last_index: Option<usize>,
    halted: bool,
    dwell: Duration,
    fade: Duration,
}

impl Default for TransitionSequencer {
    fn default() -> Self {
        Self::new(DEFAULT_DWELL, DEFAULT_FADE)
    }
}

impl TransitionSequencer {
    pub fn new(dwell: Duration, fade: Duration) -> Self {
        Self {
            state: TransitionState::Idle,
            last_index: None,
            halted: false,
            dwell,
            fade,
        }
    }

    pub fn state(&self) -> &TransitionState {
        &self.state
    }

    pub fn headline(&self) -> Option<&Headline> {
        match &self.state {
            TransitionState::Idle => None,
            TransitionState::Showing { headline, .. }
            | TransitionState::FadingOut { headline, .. } => Some(headline),
        }
    }

    /// Feed a canonical state update. Returns `true` when a new transition
    /// started showing.
    ///
    /// The first state observed only sets the baseline. When several steps
    /// advanced since the last observation only the latest completed step is
    /// shown, replacing whatever was on screen.
    pub fn observe(&mut self, match_state: &MatchState, now: Instant) -> bool {
        if self.halted {
            return false;
        }
        if match_state.phase == Phase::Completed {
            debug!("Match completed, transition sequencer halted");
            self.halted = true;
            self.state = TransitionState::Idle;
            return false;
        }

        let index = match_state.current_step_index;
        let Some(last) = self.last_index else {
            self.last_index = Some(index);
            return false;
        };
        if index <= last {
            return false;
        }
        self.last_index = Some(index);

        let Some(headline) = Headline::resolve(match_state, index - 1) else {
            return false;
        };
        debug!("Showing transition: {}", headline.text());
        self.state = TransitionState::Showing {
            headline,
            until: now + self.dwell,
        };
        true
    }

    /// Advance past any deadline that has elapsed. Returns `true` if the state
    /// changed.
    pub fn tick(&mut self, now: Instant) -> bool {
        let mut changed = false;
        loop {
            let next = match &self.state {
                TransitionState::Showing { headline, until } if now >= *until => {
                    TransitionState::FadingOut {
                        headline: headline.clone(),
                        until: *until + self.fade,
                    }
                }
                TransitionState::FadingOut { until, .. } if now >= *until => TransitionState::Idle,
                _ => return changed,
            };
            self.state = next;
            changed = true;
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        match &self.state {
            TransitionState::Idle => None,
            TransitionState::Showing { until, .. } | TransitionState::FadingOut { until, .. } => {
                Some(*until)
            }
        }
    }

    /// Forget everything, e.g. when the view switches matches.
    pub fn reset(&mut self) {
        self.state = TransitionState::Idle;
        self.last_index = None;
        self.halted = false;
    }
}
