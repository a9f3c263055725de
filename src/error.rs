use serde::Serialize;

/// Failure and diagnostic kinds raised while reconstructing a method.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum ReconstructError {
    #[error("unresolved symbol: {0}")]
    UnresolvedSymbol(String),
    #[error("generic unification conflict for {name}: {first} vs {second}")]
    UnificationConflict {
        name: String,
        first: String,
        second: String,
    },
    #[error("malformed control flow: {0}")]
    MalformedControlFlow(String),
    #[error("stack simulation failed at offset {offset}: {message}")]
    StackSimulation { offset: u32, message: String },
    #[error("irreducible control flow: {0}")]
    IrreducibleControlFlow(String),
    #[error("instruction budget exceeded: {count} > {limit}")]
    BudgetExceeded { count: usize, limit: usize },
    #[error("unreachable code dropped: {0}")]
    DeadCode(String),
}

impl ReconstructError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReconstructError::UnresolvedSymbol(_) => ErrorKind::UnresolvedSymbol,
            ReconstructError::UnificationConflict { .. } => ErrorKind::UnificationConflict,
            ReconstructError::MalformedControlFlow(_) => ErrorKind::MalformedControlFlow,
            ReconstructError::StackSimulation { .. } => ErrorKind::StackSimulation,
            ReconstructError::IrreducibleControlFlow(_) => ErrorKind::IrreducibleControlFlow,
            ReconstructError::BudgetExceeded { .. } => ErrorKind::BudgetExceeded,
            ReconstructError::DeadCode(_) => ErrorKind::DeadCode,
        }
    }

    /// Whether the error aborts reconstruction of the method it was raised in.
    pub fn is_fatal(&self) -> bool {
        self.kind().is_fatal()
    }

    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        ReconstructError::MalformedControlFlow(message.into())
    }

    pub(crate) fn stack(offset: u32, message: impl Into<String>) -> Self {
        ReconstructError::StackSimulation {
            offset,
            message: message.into(),
        }
    }
}

/// Error classification, also used as the SARIF rule id.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize)]
pub enum ErrorKind {
    UnresolvedSymbol,
    UnificationConflict,
    MalformedControlFlow,
    StackSimulation,
    IrreducibleControlFlow,
    BudgetExceeded,
    DeadCode,
}

impl ErrorKind {
    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            ErrorKind::MalformedControlFlow | ErrorKind::StackSimulation | ErrorKind::BudgetExceeded
        )
    }

    pub fn rule_id(self) -> &'static str {
        match self {
            ErrorKind::UnresolvedSymbol => "UNRESOLVED_SYMBOL",
            ErrorKind::UnificationConflict => "UNIFICATION_CONFLICT",
            ErrorKind::MalformedControlFlow => "MALFORMED_CONTROL_FLOW",
            ErrorKind::StackSimulation => "STACK_SIMULATION",
            ErrorKind::IrreducibleControlFlow => "IRREDUCIBLE_CONTROL_FLOW",
            ErrorKind::BudgetExceeded => "BUDGET_EXCEEDED",
            ErrorKind::DeadCode => "DEAD_CODE",
        }
    }
}

/// Non-fatal finding recorded against a method.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Diagnostic {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&ReconstructError> for Diagnostic {
    fn from(error: &ReconstructError) -> Self {
        Diagnostic {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}
