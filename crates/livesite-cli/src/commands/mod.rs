//! Command implementations for the `livesite` CLI.

mod analyze;
mod run;
mod schedule;
mod setup;

pub use analyze::execute as analyze;
pub use run::execute as run_now;
pub use schedule::execute as schedule;
pub use setup::execute as setup;
