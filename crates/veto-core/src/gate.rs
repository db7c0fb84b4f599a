// Local gating of captain actions before they are sent to the authority.
//
// The gate mirrors just enough of the turn rules to disable controls
// optimistically. The authority still has the final word; nothing here
// mutates match state.

use thiserror::Error;
use tracing::debug;

use crate::identity::Identity;
use crate::model::{ActionKind, MatchState, OptionId, Phase, Side};

/// What the user clicked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionTarget {
    /// A catalog option (map card).
    Option(OptionId),
    /// One of the side buttons.
    Side(Side),
}

/// A validated action, ready to go out as an `applyAction` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingAction {
    pub match_id: String,
    pub team: u8,
    pub kind: ActionKind,
    /// Option id for bans/picks, side code for side choices.
    pub target: u32,
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Dispatch(OutgoingAction),
    /// Clicking a map during side selection does nothing.
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateRejection {
    #[error("Only team captains can make picks, bans and side choices")]
    NotCaptain,

    #[error("It is currently {team_name}'s turn")]
    NotYourTurn { team_name: String },

    #[error("Match is already completed")]
    MatchCompleted,

    #[error("Sides can only be chosen during side selection")]
    SideOutOfPhase,

    #[error("Waiting for the previous action to be confirmed")]
    Busy,
}

/// Whether `identity` may act on `state` right now.
pub fn can_act(state: &MatchState, identity: &Identity) -> bool {
    check(state, identity, None).is_ok()
}

/// Run the ordered precondition checks. `target` is `None` when only asking
/// whether controls should be enabled.
fn check<'a>(
    state: &MatchState,
    identity: &'a Identity,
    target: Option<ActionTarget>,
) -> Result<Option<(u8, &'a str, ActionKind)>, GateRejection> {
    let (Some(team), Some(token)) = (identity.team, identity.token.as_deref()) else {
        return Err(GateRejection::NotCaptain);
    };
    if !identity.is_captain() {
        return Err(GateRejection::NotCaptain);
    }
    if state.current_turn_team != team {
        return Err(GateRejection::NotYourTurn {
            team_name: state.team_name(state.current_turn_team),
        });
    }
    let Some(kind) = state.phase.action() else {
        return Err(GateRejection::MatchCompleted);
    };
    match (state.phase, target) {
        (Phase::Side, Some(ActionTarget::Option(_))) => return Ok(None),
        (Phase::Ban | Phase::Pick, Some(ActionTarget::Side(_))) => {
            return Err(GateRejection::SideOutOfPhase)
        }
        _ => {}
    }
    Ok(Some((team, token, kind)))
}

/// Turn gate for one match view. Holds the busy flag while an action is in
/// flight.
#[derive(Debug, Default)]
pub struct ActionGate {
    busy: bool,
}

impl ActionGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// Controls should be enabled: the caller may act and nothing is in flight.
    pub fn is_open(&self, state: &MatchState, identity: &Identity) -> bool {
        !self.busy && can_act(state, identity)
    }

    /// Validate a click. A dispatch decision puts the gate into the busy state
    /// until [`ActionGate::settle`] is called with the authority's answer.
    pub fn dispatch(
        &mut self,
        state: &MatchState,
        identity: &Identity,
        target: ActionTarget,
    ) -> Result<GateDecision, GateRejection> {
        if self.busy {
            return Err(GateRejection::Busy);
        }

        let Some((team, token, kind)) = check(state, identity, Some(target))? else {
            debug!("Ignoring option click during side selection");
            return Ok(GateDecision::Ignored);
        };

        let target = match target {
            ActionTarget::Option(id) => id,
            ActionTarget::Side(side) => side.code(),
        };

        self.busy = true;
        Ok(GateDecision::Dispatch(OutgoingAction {
            match_id: state.id.clone(),
            team,
            kind,
            target,
            token: token.to_string(),
        }))
    }

    /// The authority answered (either way); accept clicks again.
    pub fn settle(&mut self) {
        self.busy = false;
    }
}
