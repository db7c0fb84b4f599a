// Terminal front-end for the map veto: input parsing, text rendering and the
// interactive watch loop.

pub mod input;
pub mod render;
pub mod watch;
