use crate::proof::ProofNode;
use crate::types::{fmt_expr, Expr, Position, Tok};
use std::path::PathBuf;

#[derive(Copy, Clone, PartialEq, Eq)]
enum Severity {
  Error,
  Warning,
}

/// A source location, used to prefix diagnostics.
#[derive(Clone, Debug)]
pub struct Loc {
  pub file: PathBuf,
  pub pos: Position,
}

/// A violation found while replaying a proof on the stack machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
  StackUnderflow { needed: usize, available: usize },
  TypeMismatch { typecode: Tok, var: Tok, found: Expr },
  DisjointViolation(Tok, Tok),
  HypothesisMismatch { expected: Expr, found: Expr },
  StackNotSingleton(usize),
  ConclusionMismatch { expected: Expr, found: Expr },
  MalformedProof(String),
}

impl std::fmt::Display for VerifyError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      VerifyError::StackUnderflow { needed, available } =>
        write!(f, "stack underflow: needed {needed} entries, found {available}"),
      VerifyError::TypeMismatch { typecode, var, found } => write!(
        f,
        "stack entry '{}' doesn't match mandatory hypothesis '{typecode} {var}'",
        fmt_expr(found)
      ),
      VerifyError::DisjointViolation(x, y) => write!(f, "disjoint variable violation: {x}, {y}"),
      VerifyError::HypothesisMismatch { expected, found } => write!(
        f,
        "stack entry '{}' doesn't match hypothesis '{}'",
        fmt_expr(found),
        fmt_expr(expected)
      ),
      VerifyError::StackNotSingleton(n) => write!(f, "stack has {n} entries at end of proof"),
      VerifyError::ConclusionMismatch { expected, found } => write!(
        f,
        "assertion proved '{}' doesn't match '{}'",
        fmt_expr(found),
        fmt_expr(expected)
      ),
      VerifyError::MalformedProof(msg) => write!(f, "malformed proof: {msg}"),
    }
  }
}

#[derive(Debug)]
pub struct VerifyFailure {
  /// The proof being checked; empty for anonymous derived proofs.
  pub proof: String,
  /// The step at which replay failed, if any.
  pub label: Option<Tok>,
  pub kind: VerifyError,
  /// The top of the stack, when the proof ran to completion but proved the wrong statement.
  pub partial: Option<ProofNode>,
}

#[derive(Debug)]
pub enum MmError {
  Syntax(String),
  Redeclaration { what: &'static str, name: Tok },
  Undeclared { what: &'static str, name: Tok },
  KeyNotFound(String),
  Verify(Box<VerifyFailure>),
  VocabularyExhausted { typecode: Tok },
  UnknownToken(char),
  RefactorVerificationFailed { proof: String, theorem: String },
  PredictionCount { expected: usize, found: usize },
  Io(PathBuf, std::io::Error),
  Json(serde_json::Error),
  /// An error attributed to a location in a source file.
  At(Loc, Box<MmError>),
}

pub type Result<T, E = MmError> = std::result::Result<T, E>;

impl MmError {
  pub fn verify(proof: &str, label: Option<Tok>, kind: VerifyError) -> Self {
    MmError::Verify(Box::new(VerifyFailure { proof: proof.to_owned(), label, kind, partial: None }))
  }

  pub fn with_partial(mut self, node: ProofNode) -> Self {
    if let MmError::Verify(f) = &mut self {
      f.partial = Some(node)
    }
    self
  }

  pub fn at(self, loc: Loc) -> Self {
    match self {
      e @ MmError::At(..) => e,
      e => MmError::At(loc, Box::new(e)),
    }
  }

  /// The replay violation behind this error, if it is one.
  pub fn verify_kind(&self) -> Option<&VerifyError> {
    match self {
      MmError::Verify(f) => Some(&f.kind),
      MmError::At(_, e) => e.verify_kind(),
      _ => None,
    }
  }

  fn severity(&self) -> Severity {
    match self {
      MmError::VocabularyExhausted { .. } => Severity::Warning,
      MmError::At(_, e) => e.severity(),
      _ => Severity::Error,
    }
  }

  /// Print the error to stderr. Returns true if the error is fatal.
  pub fn report(&self) -> bool {
    let severity = self.severity();
    let sev = match severity {
      Severity::Error => "error",
      Severity::Warning => "warning",
    };
    match self {
      MmError::At(loc, e) => eprintln!("{}:{:?}: {sev}: {e}", loc.file.display(), loc.pos),
      e => eprintln!("{sev}: {e}"),
    }
    severity == Severity::Error
  }
}

impl std::fmt::Display for MmError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      MmError::Syntax(msg) => write!(f, "{msg}"),
      MmError::Redeclaration { what, name } => write!(f, "{what} '{name}' already declared"),
      MmError::Undeclared { what, name } => write!(f, "{what} '{name}' not declared"),
      MmError::KeyNotFound(key) => write!(f, "'{key}' not found"),
      MmError::Verify(fail) => {
        match &fail.label {
          Some(label) if fail.proof.is_empty() => write!(f, "at step {label}: ")?,
          Some(label) => write!(f, "proof of {} at step {label}: ", fail.proof)?,
          None if fail.proof.is_empty() => {}
          None => write!(f, "proof of {}: ", fail.proof)?,
        }
        write!(f, "{}", fail.kind)
      }
      MmError::VocabularyExhausted { typecode } =>
        write!(f, "no unused variable of type '{typecode}' left"),
      MmError::UnknownToken(c) => write!(f, "character {c:?} is not in the vocabulary"),
      MmError::RefactorVerificationFailed { proof, theorem } =>
        write!(f, "rewriting {proof} with {theorem} produced an invalid proof"),
      MmError::PredictionCount { expected, found } =>
        write!(f, "expected {expected} predictions, got {found}"),
      MmError::Io(path, e) => write!(f, "{}: {e}", path.display()),
      MmError::Json(e) => write!(f, "{e}"),
      MmError::At(_, e) => write!(f, "{e}"),
    }
  }
}

impl std::error::Error for MmError {}

impl From<serde_json::Error> for MmError {
  fn from(e: serde_json::Error) -> Self { MmError::Json(e) }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::types::expr_of;

  #[test]
  fn located_errors_do_not_nest() {
    let loc = Loc { file: "a.mm".into(), pos: Position { line: 3, col: 1 } };
    let e = MmError::Syntax("EOF before $.".into()).at(loc.clone()).at(loc);
    match e {
      MmError::At(_, inner) => assert!(matches!(*inner, MmError::Syntax(_))),
      _ => panic!("expected a located error"),
    }
  }

  #[test]
  fn verify_messages_name_the_step() {
    let e = MmError::verify(
      "th1",
      Some("ax-mp".into()),
      VerifyError::HypothesisMismatch { expected: expr_of("|- ph"), found: expr_of("|- ps") },
    );
    assert_eq!(
      e.to_string(),
      "proof of th1 at step ax-mp: stack entry '|- ps' doesn't match hypothesis '|- ph'"
    );
    assert!(matches!(e.verify_kind(), Some(VerifyError::HypothesisMismatch { .. })));
  }
}
