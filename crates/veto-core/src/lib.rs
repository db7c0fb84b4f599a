pub mod credentials;
pub mod gate;
pub mod identity;
pub mod model;
pub mod reconcile;
pub mod summary;
pub mod sync;
pub mod timeline;
pub mod transition;
