// Line-based command input for the `watch` view.
//
// Translates stdin lines into UserCommand messages for the view loop.
// Option names are resolved against the catalog of the last snapshot; the
// action kind itself is never taken from the user, the gate derives it
// from the phase.

use thiserror::Error;

use veto_app::protocol::UserCommand;
use veto_core::model::{MatchState, OptionId, Side};

pub const HELP: &str = "\
commands:
  ban <map> | pick <map> | <map>   act on a map (name or id)
  side atk|def                     choose a starting side
  refresh                          reload the match and resubscribe
  leave                            leave the match view
  help                             show this help
  quit                             exit";

/// What a line of input asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Command(UserCommand),
    Help,
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("unknown map {0:?}")]
    UnknownOption(String),
    #[error("expected atk or def, got {0:?}")]
    UnknownSide(String),
    #[error("{0} needs an argument")]
    MissingArgument(&'static str),
    #[error("no match loaded yet")]
    NoMatch,
}

/// Parse one line of input. `state` is the last snapshot's state, if any.
pub fn parse_line(line: &str, state: Option<&MatchState>) -> Result<Input, InputError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Input::Empty);
    }

    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let command = match word.to_ascii_lowercase().as_str() {
        "help" | "?" => return Ok(Input::Help),
        "quit" | "q" | "exit" => UserCommand::Quit,
        "refresh" | "r" => UserCommand::Refresh,
        "leave" => UserCommand::Leave,
        "side" => {
            if rest.is_empty() {
                return Err(InputError::MissingArgument("side"));
            }
            UserCommand::ClickSide(parse_side(rest)?)
        }
        "ban" | "pick" => {
            if rest.is_empty() {
                return Err(InputError::MissingArgument("ban/pick"));
            }
            UserCommand::ClickOption(resolve_option(rest, state)?)
        }
        // A bare map name or id.
        _ => UserCommand::ClickOption(resolve_option(line, state)?),
    };
    Ok(Input::Command(command))
}

fn parse_side(text: &str) -> Result<Side, InputError> {
    match text.to_ascii_lowercase().as_str() {
        "atk" | "attack" | "a" | "0" => Ok(Side::Attack),
        "def" | "defense" | "defence" | "d" | "1" => Ok(Side::Defense),
        _ => Err(InputError::UnknownSide(text.to_string())),
    }
}

/// Match by catalog id first, then by case-insensitive name.
fn resolve_option(text: &str, state: Option<&MatchState>) -> Result<OptionId, InputError> {
    let state = state.ok_or(InputError::NoMatch)?;

    if let Ok(id) = text.parse::<OptionId>() {
        if state.option(id).is_some() {
            return Ok(id);
        }
    }

    state
        .catalog
        .iter()
        .find(|o| o.name.eq_ignore_ascii_case(text))
        .map(|o| o.id)
        .ok_or_else(|| InputError::UnknownOption(text.to_string()))
}
