mod config_watcher;
mod runtime;
mod startup;
mod state;

pub(crate) use startup::start;
pub(crate) use state::{AppState, WsTx};

pub use state::{RackState, RackStatus};
