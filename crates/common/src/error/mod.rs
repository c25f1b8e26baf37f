pub mod diagnostics;

use std::{
    error::Error,
    fmt::{self, Display, Formatter},
};

/// Top level error for the command line front end. Library crates keep their
/// own typed errors; this just records which step of a command failed.
#[derive(Debug)]
pub enum AskError {
    Config(Box<dyn Error + Send + Sync>),
    Schema(Box<dyn Error + Send + Sync>),
    Run(Box<dyn Error + Send + Sync>),
}

impl Display for AskError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            AskError::Config(e) => write!(f, "configuration failed: {e}"),
            AskError::Schema(e) => write!(f, "schema step failed: {e}"),
            AskError::Run(e) => write!(f, "run failed: {e}"),
        }
    }
}

impl Error for AskError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AskError::Config(e) | AskError::Schema(e) | AskError::Run(e) => Some(&**e),
        }
    }
}
