use crate::{flatten, Type};
use std::fmt::{Display, Formatter, Result as FmtResult};
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A 1-based line and column in the source text.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl Display for Position {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Marks the end of a run of instructions compiled from one source position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bookmark {
    pub offset: usize,
    pub position: Position,
}

impl Bookmark {
    pub fn new(offset: usize, position: Position) -> Self {
        Self { offset, position }
    }
}

/// Resolves an instruction offset to the bookmark that covers it.
///
/// Bookmark `n` covers the offsets in `(bookmarks[n - 1].offset,
/// bookmarks[n].offset]`, the first bookmark covers everything up to and
/// including its own offset and the last one everything past it.
pub fn resolve_bookmark(bookmarks: &[Bookmark], offset: usize) -> Option<&Bookmark> {
    let (mut previous, rest) = bookmarks.split_first()?;
    for current in rest {
        if offset <= previous.offset {
            return Some(previous);
        } else if previous.offset < offset && offset <= current.offset {
            return Some(current);
        }
        previous = current;
    }
    Some(previous)
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ErrorKind {
    #[error("{0}")]
    IllegalToken(String),

    #[error("unable to parse {0:?} as integer")]
    InvalidInteger(String),

    #[error("expected {expected}, got {found} instead")]
    UnexpectedToken { expected: String, found: String },

    #[error("no prefix parse function for {0} found")]
    NoPrefixParse(String),

    #[error("undefined identifier '{0}'")]
    UnresolvedIdentifier(String),

    #[error("cannot assign to {0}")]
    InvalidAssignment(String),

    #[error("expression nested deeper than {0} levels")]
    NestingTooDeep(usize),

    #[error("operand {operand} of {opcode} does not fit in {width} bytes")]
    OperandTooLarge {
        opcode: String,
        operand: usize,
        width: usize,
    },

    #[error("unsupported operator '{operator}' for types {left} and {right}")]
    UnsupportedOperator {
        operator: &'static str,
        left: Type,
        right: Type,
    },

    #[error("unsupported operator '{operator}' for type {operand}")]
    UnsupportedPrefixOperator { operator: &'static str, operand: Type },

    #[error("index operator not supported: {left}[{index}]")]
    UnsupportedIndex { left: Type, index: Type },

    #[error("can't divide by 0")]
    DivisionByZero,

    #[error("wrong number of arguments: expected {expected}, got {got}")]
    WrongArgumentCount { expected: usize, got: usize },

    #[error("calling non-function of type {0}")]
    NotCallable(Type),

    #[error("not a function: {0}")]
    NotAFunction(String),

    #[error("argument to '{builtin}' not supported, got {got}")]
    UnsupportedArgument { builtin: &'static str, got: Type },

    #[error("stack overflow")]
    StackOverflow,

    #[error("call stack exceeded {0} frames")]
    FrameOverflow(usize),

    #[error("internal error: {0}")]
    Internal(String),
}

/// A failure tied to a position in the compiled file.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{position}: {kind}")]
pub struct Diagnostic {
    pub position: Position,
    pub kind: ErrorKind,
}

impl Diagnostic {
    pub fn new(position: Position, kind: ErrorKind) -> Self {
        Self { position, kind }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("{}", render_diagnostics(.file, .diagnostics))]
    Compile {
        file: String,
        diagnostics: Vec<Diagnostic>,
    },

    #[error("{file}:{position}: {kind}")]
    Runtime {
        file: String,
        position: Position,
        kind: ErrorKind,
    },
}

impl Error {
    /// The reason behind the first reported failure.
    pub fn kind(&self) -> Option<&ErrorKind> {
        match self {
            Self::Compile { diagnostics, .. } => {
                diagnostics.first().map(|diagnostic| &diagnostic.kind)
            }
            Self::Runtime { kind, .. } => Some(kind),
        }
    }
}

fn render_diagnostics(file: &str, diagnostics: &[Diagnostic]) -> String {
    let lines = diagnostics
        .iter()
        .map(|diagnostic| format!("{}:{}", file, diagnostic))
        .collect::<Vec<_>>();
    flatten(&lines, "\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bookmarks(offsets: &[usize]) -> Vec<Bookmark> {
        offsets
            .iter()
            .enumerate()
            .map(|(line, offset)| Bookmark::new(*offset, Position::new(line + 1, 1)))
            .collect()
    }

    #[test]
    fn test_resolve_bookmark() {
        let table = bookmarks(&[3, 6, 10]);
        let tests = [
            (0, 1),
            (2, 1),
            (3, 1),
            (4, 2),
            (6, 2),
            (7, 3),
            (10, 3),
            (42, 3),
        ];

        for (offset, expected_line) in tests {
            let bookmark = resolve_bookmark(&table, offset).unwrap();
            assert_eq!(bookmark.position.line, expected_line, "offset {}", offset);
        }
    }

    #[test]
    fn test_resolve_bookmark_edges() {
        assert_eq!(resolve_bookmark(&[], 5), None);

        let single = bookmarks(&[4]);
        assert_eq!(resolve_bookmark(&single, 0), Some(&single[0]));
        assert_eq!(resolve_bookmark(&single, 4), Some(&single[0]));
        assert_eq!(resolve_bookmark(&single, 9), Some(&single[0]));
    }

    #[test]
    fn test_error_display() {
        let compile = Error::Compile {
            file: "main.sl".to_string(),
            diagnostics: vec![
                Diagnostic::new(
                    Position::new(1, 5),
                    ErrorKind::UnresolvedIdentifier("x".to_string()),
                ),
                Diagnostic::new(
                    Position::new(3, 1),
                    ErrorKind::InvalidAssignment("1".to_string()),
                ),
            ],
        };
        assert_eq!(
            compile.to_string(),
            "main.sl:1:5: undefined identifier 'x'\nmain.sl:3:1: cannot assign to 1"
        );

        let runtime = Error::Runtime {
            file: "main.sl".to_string(),
            position: Position::new(2, 7),
            kind: ErrorKind::UnsupportedOperator {
                operator: "+",
                left: Type::Integer,
                right: Type::String,
            },
        };
        assert_eq!(
            runtime.to_string(),
            "main.sl:2:7: unsupported operator '+' for types int and string"
        );
    }
}
