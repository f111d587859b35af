//! The error type shared by the compilation entry points.

use thiserror::Error;

use crate::{
    bytecode::AssembleError, composite::InvalidComposite, parse::ParseError,
    scope::ScopeImbalance,
};

/// An error that occurred while compiling VTT assembly.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    ScopeImbalance(#[from] ScopeImbalance),
    #[error(transparent)]
    InvalidComposite(#[from] InvalidComposite),
    #[error(transparent)]
    Assemble(#[from] AssembleError),
    #[error("{0}")]
    Argument(String),
    #[error("missing {kind} program '{name}'")]
    MissingProgram { kind: &'static str, name: String },
    #[error("failed to compile '{name}': {source}")]
    Program {
        name: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Attaches the name of the program being compiled.
    pub(crate) fn in_program(self, name: &str) -> Self {
        Error::Program {
            name: name.to_owned(),
            source: Box::new(self),
        }
    }

    /// Returns the innermost error, skipping program context.
    pub fn root(&self) -> &Error {
        match self {
            Error::Program { source, .. } => source.root(),
            other => other,
        }
    }
}
