// Integration tests for match creation and the join flow against the
// in-memory authority.

mod common;

use std::sync::Arc;

use common::FakeAuthority;
use veto_app::authority::{JoinTeam, MatchAuthority};
use veto_app::join::{join_match, JoinError, Route};
use veto_core::credentials::{captain_key, spectator_key, CredentialStore, KeyValueStore, MemoryStore};
use veto_core::identity;
use veto_core::model::{Phase, Role, SeriesType};

fn store() -> (Arc<MemoryStore>, CredentialStore<Arc<MemoryStore>>) {
    let backend = Arc::new(MemoryStore::new());
    (Arc::clone(&backend), CredentialStore::new(backend))
}

#[tokio::test]
async fn created_bo1_match_starts_in_ban_phase() {
    let authority = FakeAuthority::new();
    let created = authority
        .create("Alpha", "Beta", SeriesType::Bo1)
        .await
        .unwrap();

    let state = authority.get_state(&created.match_id).await.unwrap();
    assert_eq!(state.teams[0].name, "Alpha");
    assert_eq!(state.teams[1].name, "Beta");
    assert_eq!(state.phase, Phase::Ban);
    assert_eq!(state.current_step_index, 0);
    assert!(state.is_well_formed());
}

#[tokio::test]
async fn captain_join_stores_credential_and_restores_identity() {
    let authority = FakeAuthority::new();
    let (backend, credentials) = store();
    let match_id = authority
        .create("Alpha", "Beta", SeriesType::Bo1)
        .await
        .unwrap()
        .match_id;

    let route = join_match(&authority, &credentials, &match_id, JoinTeam::Team(0))
        .await
        .unwrap();
    assert_eq!(
        route,
        Route::Captain {
            match_id: match_id.clone(),
            team: 0
        }
    );
    assert!(backend
        .get(&captain_key(&match_id, "0"))
        .unwrap()
        .is_some());

    let resolution = identity::resolve(&credentials, &match_id, route.team_param().as_deref());
    assert!(!resolution.redirect_to_spectator);
    assert_eq!(resolution.identity.role, Role::Captain);
    assert_eq!(resolution.identity.team, Some(0));
    assert!(resolution.identity.token.is_some());
}

#[tokio::test]
async fn second_captain_for_same_team_is_a_conflict() {
    let authority = FakeAuthority::new();
    let (_backend, credentials) = store();
    let match_id = authority
        .create("Alpha", "Beta", SeriesType::Bo1)
        .await
        .unwrap()
        .match_id;

    join_match(&authority, &credentials, &match_id, JoinTeam::Team(0))
        .await
        .unwrap();
    let err = join_match(&authority, &credentials, &match_id, JoinTeam::Team(0))
        .await
        .unwrap_err();

    match err {
        JoinError::Authority(e) => assert!(e.is_conflict(), "expected conflict, got {e}"),
        other => panic!("expected authority error, got {other}"),
    }
}

#[tokio::test]
async fn spectator_join_writes_marker() {
    let authority = FakeAuthority::new();
    let (backend, credentials) = store();
    let match_id = authority
        .create("Alpha", "Beta", SeriesType::Bo3)
        .await
        .unwrap()
        .match_id;

    let route = join_match(&authority, &credentials, &match_id, JoinTeam::Spectator)
        .await
        .unwrap();
    assert_eq!(route.team_param(), None);
    assert_eq!(
        backend.get(&spectator_key(&match_id)).unwrap().as_deref(),
        Some(r#"{"role":"spectator"}"#)
    );
}

#[tokio::test]
async fn joining_unknown_match_surfaces_error() {
    let authority = FakeAuthority::new();
    let (_backend, credentials) = store();
    let result = join_match(&authority, &credentials, "nope", JoinTeam::Team(1)).await;
    assert!(matches!(result, Err(JoinError::Authority(_))));
}
