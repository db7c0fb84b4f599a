// Messages between the match view loop and whatever front-end drives it.

use chrono::{DateTime, Utc};

use veto_core::identity::Identity;
use veto_core::model::{MatchState, OptionId, Side};
use veto_core::timeline::TimelineRow;
use veto_core::transition::Headline;

/// Commands from the front-end to the view loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    /// Enter (or switch to) a match view. `team` is the raw route parameter.
    Navigate {
        match_id: String,
        team: Option<String>,
    },
    /// Leave the current match view.
    Leave,
    ClickOption(OptionId),
    ClickSide(Side),
    /// Reload state from the authority and resubscribe.
    Refresh,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
}

/// Updates from the view loop to the front-end.
#[derive(Debug, Clone)]
pub enum UiUpdate {
    Snapshot(Box<ViewSnapshot>),
    Error(String),
    /// The team URL had no credential behind it; show the spectator view.
    RedirectToSpectator { match_id: String },
    /// The match could not be loaded; go back to the landing view.
    NavigateHome,
    /// The veto is over; the front-end should switch to the summary.
    MatchCompleted { match_id: String },
    ConnectionStatus(ConnectionStatus),
}

/// Whether the current transition headline is fully shown or fading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadlineStage {
    Showing,
    FadingOut,
}

/// Everything a front-end needs to draw the match view.
#[derive(Debug, Clone)]
pub struct ViewSnapshot {
    pub state: MatchState,
    pub identity: Identity,
    pub timeline: Vec<TimelineRow>,
    pub headline: Option<(Headline, HeadlineStage)>,
    /// Controls enabled: it is this captain's turn and nothing is in flight.
    pub can_act: bool,
    pub busy: bool,
    pub connection: ConnectionStatus,
    pub synced_at: DateTime<Utc>,
}
