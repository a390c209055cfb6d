//! AST type definitions.

use std::fmt;
use std::sync::Arc;

/// Source location attached to AST nodes.
///
/// `line` and `column` are 1-based; `offset` is the 0-based byte offset into
/// the source text. The parser records offsets first and fills line/column in
/// a single pass once the whole script has been parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Position {
    pub line: u32,
    pub column: u32,
    pub offset: usize,
}

impl Position {
    pub fn new(line: u32, column: u32, offset: usize) -> Self {
        Self { line, column, offset }
    }

    /// A position known only by byte offset.
    pub fn at_offset(offset: usize) -> Self {
        Self { line: 0, column: 0, offset }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A parsed script: nodes in evaluation order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Script {
    pub nodes: Vec<Node>,
}

impl Script {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Top-level function definitions, in source order.
    pub fn functions(&self) -> impl Iterator<Item = &Arc<FunctionDef>> {
        self.nodes.iter().filter_map(|n| match n {
            Node::FunctionDef(def) => Some(def),
            _ => None,
        })
    }
}

/// A single node of a script.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// A nested sequence evaluated in the current scope: `A=1 B=2`.
    Script(Script),
    /// Simple command: `name arg1 arg2 > file`
    Command(Command),
    /// Variable assignment: `NAME=value`
    Assignment(Assignment),
    /// Two or more commands joined by `|`, or a negated command.
    Pipeline(Pipeline),
    /// `a && b || c`, evaluated left to right with short-circuit.
    AndOr(AndOr),
    /// `if COND; then ...; else ...; fi`
    If(If),
    /// `for VAR in WORDS; do ...; done`
    For(For),
    /// `while COND; do ...; done`
    While(While),
    /// `function NAME() { ... }` or `NAME() { ... }`
    FunctionDef(Arc<FunctionDef>),
    /// `( ... )`
    Subshell(Subshell),
    /// `break [N]`
    Break(Option<Word>),
    /// `continue [N]`
    Continue(Option<Word>),
    /// `return [N]`
    Return(Option<Word>),
    /// `exit [N]`
    Exit(Option<Word>),
}

impl Node {
    /// Position of the node, if it carries one.
    pub fn position(&self) -> Option<Position> {
        match self {
            Node::Script(s) => s.nodes.first().and_then(Node::position),
            Node::Command(c) => Some(c.pos),
            Node::Assignment(a) => Some(a.pos),
            Node::Pipeline(p) => Some(p.pos),
            Node::AndOr(a) => a.head.position(),
            Node::If(i) => Some(i.pos),
            Node::For(f) => Some(f.pos),
            Node::While(w) => Some(w.pos),
            Node::FunctionDef(d) => Some(d.pos),
            Node::Subshell(s) => Some(s.pos),
            Node::Break(_) | Node::Continue(_) | Node::Return(_) | Node::Exit(_) => None,
        }
    }
}

/// A command invocation with prefix assignments, arguments and redirections.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub name: Word,
    pub args: Vec<Word>,
    pub redirects: Vec<Redirect>,
    /// `NAME=value` words preceding the command name.
    pub prefix: Vec<Assignment>,
    pub pos: Position,
}

impl Command {
    /// The command name when it is a plain literal word.
    pub fn literal_name(&self) -> Option<String> {
        self.name.as_literal()
    }
}

/// `NAME=value`
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub name: String,
    pub value: Word,
    pub pos: Position,
}

/// Commands connected by pipes.
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    pub stages: Vec<Command>,
    /// `! a | b` inverts the exit status.
    pub negated: bool,
    pub pos: Position,
}

/// Short-circuit connective between two statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connective {
    /// `&&` runs the right side only if the left succeeded.
    And,
    /// `||` runs the right side only if the left failed.
    Or,
}

impl fmt::Display for Connective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Connective::And => write!(f, "&&"),
            Connective::Or => write!(f, "||"),
        }
    }
}

/// `head op1 n1 op2 n2 ...`, left-associative with equal precedence.
#[derive(Debug, Clone, PartialEq)]
pub struct AndOr {
    pub head: Box<Node>,
    pub tail: Vec<(Connective, Node)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct If {
    /// Condition list; its last exit status decides the branch.
    pub cond: Vec<Node>,
    pub then_branch: Vec<Node>,
    /// `elif` chains are desugared into a nested `If` here.
    pub else_branch: Option<Vec<Node>>,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct For {
    pub var: String,
    /// Expanded exactly once, before the first iteration.
    pub items: Vec<Word>,
    pub body: Vec<Node>,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct While {
    pub cond: Vec<Node>,
    pub body: Vec<Node>,
    pub pos: Position,
}

/// A function definition. The body is parsed once and shared by every call.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub body: Vec<Node>,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Subshell {
    pub body: Vec<Node>,
    pub pos: Position,
}

/// A shell word: adjacent fragments concatenated at expansion time.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Word {
    pub parts: Vec<WordPart>,
}

impl Word {
    pub fn new(parts: Vec<WordPart>) -> Self {
        Self { parts }
    }

    pub fn literal(s: impl Into<String>) -> Self {
        Self {
            parts: vec![WordPart::Literal(s.into())],
        }
    }

    /// The text of a word made only of literal fragments.
    pub fn as_literal(&self) -> Option<String> {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                WordPart::Literal(s) | WordPart::SingleQuoted(s) => out.push_str(s),
                WordPart::DoubleQuoted(inner) => {
                    for p in inner {
                        match p {
                            WordPart::Literal(s) => out.push_str(s),
                            _ => return None,
                        }
                    }
                }
                _ => return None,
            }
        }
        Some(out)
    }

    /// True when the word is a single unquoted literal equal to `s`.
    pub fn is_bare(&self, s: &str) -> bool {
        matches!(self.parts.as_slice(), [WordPart::Literal(l)] if l == s)
    }
}

/// One fragment of a [`Word`].
#[derive(Debug, Clone, PartialEq)]
pub enum WordPart {
    /// Unquoted text with escapes removed.
    Literal(String),
    /// `'...'`
    SingleQuoted(String),
    /// `"..."`: only literals and expansions appear inside.
    DoubleQuoted(Vec<WordPart>),
    /// `$NAME` or `${NAME}`
    Var(String),
    /// `$?`, `$#`, `$@`, `$0`..`$9`, `$$`
    Special(SpecialVar),
    /// `$(...)`
    CommandSubst(Box<Script>),
    /// Leading `~`
    Tilde,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialVar {
    /// `$?`
    LastStatus,
    /// `$#`
    ArgCount,
    /// `$@` and `$*`
    AllArgs,
    /// `$0`..`$9`
    Positional(u8),
    /// `$$`
    ProcessId,
}

impl fmt::Display for SpecialVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpecialVar::LastStatus => write!(f, "$?"),
            SpecialVar::ArgCount => write!(f, "$#"),
            SpecialVar::AllArgs => write!(f, "$@"),
            SpecialVar::Positional(n) => write!(f, "${n}"),
            SpecialVar::ProcessId => write!(f, "$$"),
        }
    }
}

/// A redirection attached to a command.
#[derive(Debug, Clone, PartialEq)]
pub struct Redirect {
    pub kind: RedirectKind,
    pub target: RedirectTarget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectKind {
    /// `> file`
    StdoutOverwrite,
    /// `>> file`
    StdoutAppend,
    /// `< file`
    Stdin,
    /// `2> file`
    Stderr,
    /// `2>> file`
    StderrAppend,
    /// `2>&1`
    StderrToStdout,
    /// `<<DELIM`
    HereDoc,
}

impl fmt::Display for RedirectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RedirectKind::StdoutOverwrite => ">",
            RedirectKind::StdoutAppend => ">>",
            RedirectKind::Stdin => "<",
            RedirectKind::Stderr => "2>",
            RedirectKind::StderrAppend => "2>>",
            RedirectKind::StderrToStdout => "2>&1",
            RedirectKind::HereDoc => "<<",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RedirectTarget {
    /// A file path word.
    File(Word),
    /// Here-document body; literal when the delimiter was quoted.
    Body(Word),
    /// `2>&1` has no target word.
    None,
}
