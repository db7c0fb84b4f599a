// Match state as pushed by the match authority: the canonical full state,
// the partial updates layered on top of it, and the closed enums behind the
// authority's numeric codes.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Catalog option identifier. `0` means "unset" in every slot that holds one.
pub type OptionId = u32;

/// Sentinel used by the authority for an unset side or side picker.
pub const UNSET: i8 = -1;

fn unset() -> i8 {
    UNSET
}

// ---------------------------------------------------------------------------
// Codes
// ---------------------------------------------------------------------------

/// A numeric code the authority sent that has no known meaning.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} code {code}")]
pub struct UnknownCode {
    pub kind: &'static str,
    pub code: u8,
}

/// Phase of the veto. Ordinal, never decreases over a match's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Phase {
    Ban,
    Pick,
    Side,
    Completed,
}

impl Phase {
    pub fn label(self) -> &'static str {
        match self {
            Phase::Ban => "Ban Phase",
            Phase::Pick => "Pick Phase",
            Phase::Side => "Side Selection",
            Phase::Completed => "Completed",
        }
    }

    /// The action a captain performs during this phase, if any.
    pub fn action(self) -> Option<ActionKind> {
        match self {
            Phase::Ban => Some(ActionKind::Ban),
            Phase::Pick => Some(ActionKind::Pick),
            Phase::Side => Some(ActionKind::Side),
            Phase::Completed => None,
        }
    }
}

impl TryFrom<u8> for Phase {
    type Error = UnknownCode;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Phase::Ban),
            1 => Ok(Phase::Pick),
            2 => Ok(Phase::Side),
            3 => Ok(Phase::Completed),
            _ => Err(UnknownCode { kind: "phase", code }),
        }
    }
}

impl From<Phase> for u8 {
    fn from(phase: Phase) -> Self {
        match phase {
            Phase::Ban => 0,
            Phase::Pick => 1,
            Phase::Side => 2,
            Phase::Completed => 3,
        }
    }
}

/// What a single template step asks the acting team to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ActionKind {
    Ban,
    Pick,
    Side,
}

impl ActionKind {
    /// Name used for the `action` parameter of the authority's action call.
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Ban => "ban",
            ActionKind::Pick => "pick",
            ActionKind::Side => "side",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<u8> for ActionKind {
    type Error = UnknownCode;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(ActionKind::Ban),
            1 => Ok(ActionKind::Pick),
            2 => Ok(ActionKind::Side),
            _ => Err(UnknownCode { kind: "action", code }),
        }
    }
}

impl From<ActionKind> for u8 {
    fn from(kind: ActionKind) -> Self {
        match kind {
            ActionKind::Ban => 0,
            ActionKind::Pick => 1,
            ActionKind::Side => 2,
        }
    }
}

/// Starting side chosen for a map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Attack,
    Defense,
}

impl Side {
    /// Decode the authority's side value; anything but 0/1 is unset.
    pub fn from_code(code: i8) -> Option<Side> {
        match code {
            0 => Some(Side::Attack),
            1 => Some(Side::Defense),
            _ => None,
        }
    }

    pub fn code(self) -> u32 {
        match self {
            Side::Attack => 0,
            Side::Defense => 1,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Side::Attack => "Attack",
            Side::Defense => "Defense",
        }
    }

    pub fn short_label(self) -> &'static str {
        match self {
            Side::Attack => "ATK",
            Side::Defense => "DEF",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeriesType {
    #[default]
    Bo1,
    Bo3,
}

impl SeriesType {
    pub fn as_str(self) -> &'static str {
        match self {
            SeriesType::Bo1 => "bo1",
            SeriesType::Bo3 => "bo3",
        }
    }
}

/// Role granted to the local user for a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Captain,
    Spectator,
}

// ---------------------------------------------------------------------------
// Full state
// ---------------------------------------------------------------------------

/// One selectable option (a map).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogOption {
    pub id: OptionId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map_img_url: Option<String>,
}

impl CatalogOption {
    /// Best image for display: the still image, falling back to the preview.
    pub fn image(&self) -> Option<&str> {
        self.map_img_url
            .as_deref()
            .or(self.preview_url.as_deref())
            .filter(|url| !url.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub name: String,
    #[serde(default)]
    pub banned_map_ids: Vec<OptionId>,
    #[serde(default)]
    pub picked_map_ids: Vec<OptionId>,
}

/// One entry of the fixed turn template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepTemplate {
    pub action: ActionKind,
    pub team_index: u8,
}

/// The complete match state as owned by the authority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchState {
    pub id: String,
    pub phase: Phase,
    pub current_turn_team: u8,
    pub current_step_index: usize,
    #[serde(default)]
    pub captain_taken: Vec<bool>,
    #[serde(rename = "deciderMapId", default)]
    pub decider_option_id: OptionId,
    #[serde(default)]
    pub series_type: SeriesType,
    pub teams: Vec<Team>,
    #[serde(rename = "availableMaps")]
    pub catalog: Vec<CatalogOption>,
    #[serde(default = "unset")]
    pub decider_side: i8,
    #[serde(default = "unset")]
    pub decider_side_picker_team: i8,
    /// Fixed at creation; never changes for the match's lifetime.
    #[serde(default)]
    pub steps: Vec<StepTemplate>,
    #[serde(rename = "stepMapIds", default)]
    pub step_option_ids: Vec<OptionId>,
    #[serde(rename = "stepSideVals", default)]
    pub step_side_values: Vec<i8>,
}

impl MatchState {
    /// Parallel arrays line up with the template and the step index is in range.
    pub fn is_well_formed(&self) -> bool {
        self.step_option_ids.len() == self.steps.len()
            && self.step_side_values.len() == self.steps.len()
            && self.current_step_index <= self.steps.len()
    }

    pub fn option(&self, id: OptionId) -> Option<&CatalogOption> {
        if id == 0 {
            return None;
        }
        self.catalog.iter().find(|o| o.id == id)
    }

    pub fn team(&self, index: u8) -> Option<&Team> {
        self.teams.get(usize::from(index))
    }

    /// Display name for a team, `Team N` when the slot is missing.
    pub fn team_name(&self, index: u8) -> String {
        self.team(index)
            .map(|t| t.name.clone())
            .unwrap_or_else(|| format!("Team {index}"))
    }
}

// ---------------------------------------------------------------------------
// Partial updates
// ---------------------------------------------------------------------------

/// Per-team fields of a partial update. Names are usually left out.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamPatch {
    pub name: Option<String>,
    pub banned_map_ids: Option<Vec<OptionId>>,
    pub picked_map_ids: Option<Vec<OptionId>>,
}

/// A state push without the catalog. The step template, if sent, is ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchPatch {
    pub id: Option<String>,
    pub phase: Option<Phase>,
    pub current_turn_team: Option<u8>,
    pub current_step_index: Option<usize>,
    pub captain_taken: Option<Vec<bool>>,
    #[serde(rename = "deciderMapId")]
    pub decider_option_id: Option<OptionId>,
    pub series_type: Option<SeriesType>,
    pub teams: Option<Vec<TeamPatch>>,
    pub decider_side: Option<i8>,
    pub decider_side_picker_team: Option<i8>,
    #[serde(rename = "stepMapIds")]
    pub step_option_ids: Option<Vec<OptionId>>,
    #[serde(rename = "stepSideVals")]
    pub step_side_values: Option<Vec<i8>>,
}

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload is not a JSON object")]
    NotAnObject,
}

/// A decoded state message, full or partial.
#[derive(Debug, Clone, PartialEq)]
pub enum StatePayload {
    Full(MatchState),
    Partial(MatchPatch),
}

impl StatePayload {
    /// Decode a raw message. Presence of the catalog field marks a full payload.
    pub fn parse(text: &str) -> Result<Self, PayloadError> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self, PayloadError> {
        let is_full = match value.as_object() {
            Some(obj) => obj.contains_key("availableMaps"),
            None => return Err(PayloadError::NotAnObject),
        };
        if is_full {
            Ok(StatePayload::Full(serde_json::from_value(value)?))
        } else {
            Ok(StatePayload::Partial(serde_json::from_value(value)?))
        }
    }

    pub fn current_step_index(&self) -> Option<usize> {
        match self {
            StatePayload::Full(state) => Some(state.current_step_index),
            StatePayload::Partial(patch) => patch.current_step_index,
        }
    }

    pub fn match_id(&self) -> Option<&str> {
        match self {
            StatePayload::Full(state) => Some(&state.id),
            StatePayload::Partial(patch) => patch.id.as_deref(),
        }
    }
}

// ---------------------------------------------------------------------------
// Test fixtures
// ---------------------------------------------------------------------------
