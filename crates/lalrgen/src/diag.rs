//! Numbered diagnostics and the keep-going reporting policy.
//!
//! Every phase of the generator reports through a [`Reporter`] instead of
//! raising its own error types. Recoverable errors bump a counter and, under
//! keep-going, let the phase continue so the remaining errors in the same run
//! can also be surfaced; fatal errors abort immediately. "Error count > 0" is
//! the authoritative failure signal for the whole run.

use std::fmt;

// Diagnostic codes. Fatal conditions first.
pub const E_IO: u16 = 1;
pub const E_SYNTAX: u16 = 2;
pub const E_TERMINAL_LHS: u16 = 3;
pub const E_NO_ACCEPT_STATE: u16 = 4;
pub const E_EMPTY_GRAMMAR: u16 = 5;
pub const E_UNDEFINED_TOKEN: u16 = 10;
pub const E_UNDEFINED_START: u16 = 11;
pub const E_DUPLICATE_DECL: u16 = 12;
pub const E_DUPLICATE_RULE: u16 = 13;
pub const E_PREC_FIRST: u16 = 14;
pub const E_NO_PRECEDENCE: u16 = 15;
pub const E_BAD_IDENT: u16 = 16;
pub const E_MIDRULE_NODE: u16 = 17;
pub const E_REDUCE_REDUCE: u16 = 20;
pub const E_ACCEPT_CONFLICT: u16 = 21;
pub const W_DEFAULT_SHIFT: u16 = 30;
pub const W_UNUSED_NONTERMINAL: u16 = 31;

/// Line/column position in the grammar file, 1-based.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Pos {
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
    Fatal,
}

#[derive(Debug)]
pub struct Diagnostic {
    pub code: u16,
    pub severity: Severity,
    pub pos: Option<Pos>,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Warning => "warning",
            Severity::Error | Severity::Fatal => "error",
        };
        write!(f, "{}[E{:03}]", level, self.code)?;
        if let Some(pos) = self.pos {
            write!(f, " {}", pos)?;
        }
        write!(f, ": {}", self.message)
    }
}

/// How a run reacts to recoverable errors.
#[derive(Debug, Copy, Clone, Default)]
pub struct Policy {
    /// Continue generating a best-effort table past recoverable errors.
    pub keep_going: bool,
    /// Dump parser diagnostics while generating.
    pub verbose: bool,
}

/// The run was cut short. Carries the error count at the point of abort.
#[derive(Debug, thiserror::Error)]
#[error("aborted after {errors} error(s)")]
pub struct Abort {
    pub errors: usize,
}

#[derive(Debug)]
pub struct Reporter {
    policy: Policy,
    diagnostics: Vec<Diagnostic>,
    errors: usize,
}

impl Reporter {
    pub fn new(policy: Policy) -> Self {
        Self {
            policy,
            diagnostics: Vec::new(),
            errors: 0,
        }
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    pub fn error_count(&self) -> usize {
        self.errors
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn warning(&mut self, code: u16, pos: Option<Pos>, message: impl Into<String>) {
        self.push(Severity::Warning, code, pos, message.into());
    }

    /// Report a recoverable error. Returns `Err` unless the policy says to
    /// keep going, so call sites can simply `?` out of the current phase.
    pub fn error(
        &mut self,
        code: u16,
        pos: Option<Pos>,
        message: impl Into<String>,
    ) -> Result<(), Abort> {
        self.errors += 1;
        self.push(Severity::Error, code, pos, message.into());
        if self.policy.keep_going {
            Ok(())
        } else {
            Err(Abort {
                errors: self.errors,
            })
        }
    }

    /// Report a condition the run cannot continue from. The returned [`Abort`]
    /// is meant to be wrapped in `Err(..)` right away.
    pub fn fatal(&mut self, code: u16, pos: Option<Pos>, message: impl Into<String>) -> Abort {
        self.errors += 1;
        self.push(Severity::Fatal, code, pos, message.into());
        Abort {
            errors: self.errors,
        }
    }

    fn push(&mut self, severity: Severity, code: u16, pos: Option<Pos>, message: String) {
        tracing::debug!(code, ?pos, "{}", message);
        self.diagnostics.push(Diagnostic {
            code,
            severity,
            pos,
            message,
        });
    }
}
