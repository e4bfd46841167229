// ABOUTME: Command module aggregator for the stagecraft CLI.
// ABOUTME: Re-exports the deploy, status, and restart handlers and shared setup.

mod connection;
mod deploy;
mod restart;
mod status;

pub use connection::{connect, load_config};
pub use deploy::deploy;
pub use restart::restart;
pub use status::status;
