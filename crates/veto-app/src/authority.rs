// Request/response client for the match authority.
//
// Every call is a plain GET with query parameters; the authority answers
// with JSON. Nothing here retries: failures go straight back to the caller.

use std::fmt;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use veto_core::gate::OutgoingAction;
use veto_core::model::{MatchState, Role, SeriesType};

use crate::config::AuthorityConfig;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum AuthorityError {
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// The slot asked for is already held, e.g. a second captain for a team.
    #[error("{endpoint} conflict: {body}")]
    Conflict { endpoint: &'static str, body: String },

    #[error("{endpoint} returned HTTP {status}: {body}")]
    Status {
        endpoint: &'static str,
        status: u16,
        body: String,
    },

    #[error("could not decode {endpoint} response: {source}")]
    Decode {
        endpoint: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl AuthorityError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, AuthorityError::Conflict { .. })
    }
}

/// Which seat to ask for when joining.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinTeam {
    Team(u8),
    Spectator,
}

impl JoinTeam {
    pub fn as_param(self) -> String {
        match self {
            JoinTeam::Team(team) => team.to_string(),
            JoinTeam::Spectator => "spectator".to_string(),
        }
    }
}

impl fmt::Display for JoinTeam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_param())
    }
}

impl std::str::FromStr for JoinTeam {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "0" => Ok(JoinTeam::Team(0)),
            "1" => Ok(JoinTeam::Team(1)),
            "spectator" => Ok(JoinTeam::Spectator),
            other => Err(format!("expected 0, 1 or spectator, got {other:?}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateResponse {
    pub match_id: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinResponse {
    pub match_id: String,
    pub role: Role,
    /// Kept raw: only a numeric team counts as a captain seat.
    #[serde(default)]
    pub team: Option<serde_json::Value>,
    #[serde(default)]
    pub token: Option<String>,
}

impl JoinResponse {
    pub fn team_index(&self) -> Option<u8> {
        self.team
            .as_ref()
            .and_then(|v| v.as_u64())
            .and_then(|n| u8::try_from(n).ok())
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// The remote authority as seen by the client.
#[async_trait]
pub trait MatchAuthority: Send + Sync {
    async fn create(
        &self,
        team_a: &str,
        team_b: &str,
        series: SeriesType,
    ) -> Result<CreateResponse, AuthorityError>;

    async fn get_state(&self, match_id: &str) -> Result<MatchState, AuthorityError>;

    async fn join(
        &self,
        match_id: &str,
        team: JoinTeam,
        token: Option<&str>,
    ) -> Result<JoinResponse, AuthorityError>;

    /// Returns the full state after the action was applied.
    async fn apply_action(&self, action: &OutgoingAction) -> Result<MatchState, AuthorityError>;
}

// ---------------------------------------------------------------------------
// HttpAuthority
// ---------------------------------------------------------------------------

pub struct HttpAuthority {
    http: reqwest::Client,
    base_url: String,
}

impl HttpAuthority {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &AuthorityConfig) -> Self {
        Self::new(config.base_url.clone())
    }

    async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        query: &[(&str, String)],
    ) -> Result<T, AuthorityError> {
        let url = format!("{}/match/{endpoint}", self.base_url);
        debug!("GET {url}");

        let response = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|source| AuthorityError::Transport { endpoint, source })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|source| AuthorityError::Transport { endpoint, source })?;

        if status == StatusCode::CONFLICT {
            warn!("{endpoint} conflict: {body}");
            return Err(AuthorityError::Conflict { endpoint, body });
        }
        if !status.is_success() {
            warn!("{endpoint} returned HTTP {status}");
            return Err(AuthorityError::Status {
                endpoint,
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|source| AuthorityError::Decode { endpoint, source })
    }
}

#[async_trait]
impl MatchAuthority for HttpAuthority {
    async fn create(
        &self,
        team_a: &str,
        team_b: &str,
        series: SeriesType,
    ) -> Result<CreateResponse, AuthorityError> {
        self.get(
            "create",
            &[
                ("teamA", team_a.to_string()),
                ("teamB", team_b.to_string()),
                ("series", series.as_str().to_string()),
            ],
        )
        .await
    }

    async fn get_state(&self, match_id: &str) -> Result<MatchState, AuthorityError> {
        self.get("state", &[("id", match_id.to_string())]).await
    }

    async fn join(
        &self,
        match_id: &str,
        team: JoinTeam,
        token: Option<&str>,
    ) -> Result<JoinResponse, AuthorityError> {
        let mut query = vec![("id", match_id.to_string()), ("team", team.as_param())];
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            query.push(("token", token.to_string()));
        }
        self.get("join", &query).await
    }

    async fn apply_action(&self, action: &OutgoingAction) -> Result<MatchState, AuthorityError> {
        self.get(
            "action",
            &[
                ("id", action.match_id.clone()),
                ("team", action.team.to_string()),
                ("action", action.kind.as_str().to_string()),
                ("map", action.target.to_string()),
                ("token", action.token.clone()),
            ],
        )
        .await
    }
}
