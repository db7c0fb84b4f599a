// Join flow: ask the authority for a seat, persist what it grants and pick
// the view to land on.

use thiserror::Error;
use tracing::info;

use veto_core::credentials::{CredentialStore, KeyValueStore, StoreError, StoredCredential};
use veto_core::model::Role;

use crate::authority::{AuthorityError, JoinTeam, MatchAuthority};

#[derive(Debug, Error)]
pub enum JoinError {
    #[error(transparent)]
    Authority(#[from] AuthorityError),

    #[error("joined, but the credential could not be saved: {0}")]
    Store(#[from] StoreError),
}

/// Where the user should go after joining.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Captain { match_id: String, team: u8 },
    Spectator { match_id: String },
}

impl Route {
    pub fn match_id(&self) -> &str {
        match self {
            Route::Captain { match_id, .. } | Route::Spectator { match_id } => match_id,
        }
    }

    /// The team route parameter, `None` for the spectator view.
    pub fn team_param(&self) -> Option<String> {
        match self {
            Route::Captain { team, .. } => Some(team.to_string()),
            Route::Spectator { .. } => None,
        }
    }
}

/// Join `match_id` as `team` and remember the outcome.
///
/// A captain answer with a token and a numeric team stores the captain
/// credential; anything else stores the spectator marker.
pub async fn join_match<A, S>(
    authority: &A,
    store: &CredentialStore<S>,
    match_id: &str,
    team: JoinTeam,
) -> Result<Route, JoinError>
where
    A: MatchAuthority + ?Sized,
    S: KeyValueStore,
{
    let response = authority.join(match_id, team, None).await?;

    let captain_seat = match (response.role, response.team_index(), response.token.as_deref()) {
        (Role::Captain, Some(team), Some(token)) if !token.is_empty() => Some((team, token)),
        _ => None,
    };

    match captain_seat {
        Some((team, token)) => {
            store.put(
                &response.match_id,
                team,
                &StoredCredential::captain(team, token),
            )?;
            info!("Joined match {} as captain of team {team}", response.match_id);
            Ok(Route::Captain {
                match_id: response.match_id,
                team,
            })
        }
        None => {
            store.put_spectator(&response.match_id)?;
            info!("Joined match {} as spectator", response.match_id);
            Ok(Route::Spectator {
                match_id: response.match_id,
            })
        }
    }
}
