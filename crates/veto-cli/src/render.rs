// Plain-text rendering of the match view and the series summary.

use std::fmt::Write;

use veto_app::protocol::{ConnectionStatus, HeadlineStage, ViewSnapshot};
use veto_core::model::{MatchState, Phase, Role, SeriesType};
use veto_core::summary::{self, TBD};
use veto_core::timeline::TimelineRow;

fn role_line(snapshot: &ViewSnapshot) -> String {
    match (snapshot.identity.role, snapshot.identity.team) {
        (Role::Captain, Some(team)) => {
            format!("captain of {}", snapshot.state.team_name(team))
        }
        _ => "spectator".to_string(),
    }
}

fn timeline_line(row: &TimelineRow) -> String {
    let marker = if row.is_current { ">" } else { " " };
    let mut line = format!(
        "{marker} {:>2}. {:<4} {:<12}",
        row.index + 1,
        row.kind.as_str().to_ascii_uppercase(),
        row.team_name,
    );
    match (&row.option, row.side_label()) {
        (Some(option), Some(side)) => {
            let _ = write!(line, " {} ({side})", option.name);
        }
        (Some(option), None) => {
            let _ = write!(line, " {}", option.name);
        }
        (None, _) if row.is_current => line.push_str(" ..."),
        (None, _) => {}
    }
    line.trim_end().to_string()
}

/// Catalog status line for one option.
fn option_line(state: &MatchState, id: u32, name: &str) -> String {
    let status = if summary::is_banned(state, id) {
        " [banned]"
    } else if summary::is_picked(state, id) {
        " [picked]"
    } else if summary::is_decider(state, id) {
        " [decider]"
    } else {
        ""
    };
    format!("  {id:>2} {name}{status}")
}

/// The full match view.
pub fn render_snapshot(snapshot: &ViewSnapshot) -> String {
    let state = &snapshot.state;
    let mut out = String::new();

    let _ = writeln!(
        out,
        "{} vs {}  [{}]  {}",
        state.team_name(0),
        state.team_name(1),
        state.series_type.as_str(),
        state.phase.label(),
    );
    let connection = match snapshot.connection {
        ConnectionStatus::Connected => "live",
        ConnectionStatus::Disconnected => "polling",
    };
    let _ = writeln!(
        out,
        "you are {}  ({connection}, synced {})",
        role_line(snapshot),
        snapshot.synced_at.format("%H:%M:%S"),
    );

    if state.phase != Phase::Completed {
        let mut turn = format!("turn: {}", summary::current_team_name(state));
        if snapshot.busy {
            turn.push_str("  (waiting for server)");
        } else if snapshot.can_act {
            turn.push_str("  (your move)");
        }
        let _ = writeln!(out, "{turn}");
    }

    if let Some((headline, stage)) = &snapshot.headline {
        let text = match stage {
            HeadlineStage::Showing => headline.text().to_uppercase(),
            HeadlineStage::FadingOut => headline.text(),
        };
        let _ = writeln!(out, "\n  *** {text} ***");
    }

    out.push('\n');
    for row in &snapshot.timeline {
        let _ = writeln!(out, "{}", timeline_line(row));
    }

    out.push('\n');
    for option in &state.catalog {
        let _ = writeln!(out, "{}", option_line(state, option.id, &option.name));
    }

    out.trim_end().to_string()
}

/// The result view shown once the veto is over.
pub fn render_summary(state: &MatchState) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} vs {}  [{}]",
        state.team_name(0),
        state.team_name(1),
        state.series_type.as_str(),
    );

    match state.series_type {
        SeriesType::Bo1 => {
            let decider = summary::decider(state)
                .map(|o| o.name)
                .unwrap_or_else(|| TBD.to_string());
            let _ = writeln!(out, "map: {decider}");
            let _ = writeln!(
                out,
                "attack: {}",
                summary::attacking_team(state).unwrap_or_else(|| TBD.to_string())
            );
            let _ = writeln!(
                out,
                "defense: {}",
                summary::defending_team(state).unwrap_or_else(|| TBD.to_string())
            );
        }
        SeriesType::Bo3 => {
            for (i, card) in summary::series_cards(state).iter().enumerate() {
                let source = match card.picked_by {
                    Some(team) => format!("{} pick", state.team_name(team)),
                    None => "decider".to_string(),
                };
                let _ = writeln!(
                    out,
                    "map {}: {} ({source})  {}",
                    i + 1,
                    card.option.name,
                    card.side_line
                );
            }
        }
    }

    out.trim_end().to_string()
}
