//! The question pipeline: identify tables, write SQL, check it, run it
//! (repairing once on an unknown column), and narrate the result.

pub mod error;
pub mod executor;
pub mod generator;
pub mod identifier;
pub mod pipeline;
mod prompt;
pub mod refiner;
pub mod validator;

pub use error::{ExecutionError, GenerationError, PipelineError};
pub use executor::{Execution, QueryExecutor};
pub use generator::{SqlCandidate, SqlGenerator};
pub use identifier::TableIdentifier;
pub use pipeline::{Pipeline, PipelineResponse, PipelineSettings};
pub use refiner::ResultRefiner;
pub use validator::{validate, Rejection, ValidatedSql};
