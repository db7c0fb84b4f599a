// Resolves who the local user is for a match view: a team captain holding a
// stored token, or a spectator.

use tracing::{debug, info};

use crate::credentials::{CredentialStore, KeyValueStore};
use crate::model::Role;

/// The caller's role for the lifetime of one match view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub role: Role,
    pub team: Option<u8>,
    pub token: Option<String>,
}

impl Identity {
    pub fn spectator() -> Self {
        Self {
            role: Role::Spectator,
            team: None,
            token: None,
        }
    }

    /// A captain with a team and a token, i.e. someone who may act.
    pub fn is_captain(&self) -> bool {
        self.role == Role::Captain && self.team.is_some() && self.token.is_some()
    }
}

/// Outcome of resolving a route into an identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub identity: Identity,
    /// The route named a team but no credential backs it; the visible route
    /// should be replaced by the spectator route.
    pub redirect_to_spectator: bool,
}

/// Derive the identity for `match_id` from the optional team route parameter
/// and the stored credentials.
pub fn resolve<S: KeyValueStore>(
    store: &CredentialStore<S>,
    match_id: &str,
    team_param: Option<&str>,
) -> Resolution {
    let Some(raw_team) = team_param else {
        debug!("No team in route for match {match_id}, joining as spectator");
        return Resolution {
            identity: Identity::spectator(),
            redirect_to_spectator: false,
        };
    };

    let route_team = raw_team.trim().parse::<u8>().ok();

    let Some(stored) = store.get(match_id, Some(raw_team)) else {
        info!("No stored credential for match {match_id} team {raw_team}, downgrading to spectator");
        return Resolution {
            identity: Identity::spectator(),
            redirect_to_spectator: true,
        };
    };

    let identity = Identity {
        role: stored.role.unwrap_or(Role::Captain),
        team: stored.team.or(route_team),
        token: stored.token.filter(|t| !t.is_empty()),
    };
    debug!(
        "Resolved match {match_id} as {:?} for team {:?}",
        identity.role, identity.team
    );

    Resolution {
        identity,
        redirect_to_spectator: false,
    }
}
