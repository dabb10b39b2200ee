/*!
Crate error type.

Nothing in the core is fatal after initialisation; the simulator degrades
(stderr sinks, defaults) rather than aborts. The variants here cover the
few genuinely fatal paths: unreadable config files and workers that died.
*/

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config file {path}: {source}")]
    ConfigFile {
        path: String,
        source: std::io::Error,
    },

    #[error("simulation worker panicked: {0}")]
    Worker(String),
}
