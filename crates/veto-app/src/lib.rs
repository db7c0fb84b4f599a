// Application layer: configuration, the authority client, the join flow and
// the match view event loop built on veto-core.

pub mod authority;
pub mod config;
pub mod join;
pub mod protocol;
pub mod view;
