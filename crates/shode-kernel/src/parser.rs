//! Parser for shode source text.
//!
//! Transforms the token stream from the lexer into a [`Script`] using chumsky
//! combinators. Positions are recorded as byte offsets while parsing and
//! resolved to line/column in one pass at the end.

use std::path::Path;
use std::sync::Arc;

use chumsky::{
    error::{RichPattern, RichReason},
    input::ValueInput,
    prelude::*,
};

use crate::ast::{
    AndOr, Assignment, Command, Connective, For, FunctionDef, If, Node, Pipeline, Position,
    Redirect, RedirectKind, RedirectTarget, Script, Subshell, While, Word, WordPart,
};
use crate::error::{ParseError, ShellError};
use crate::lexer::{self, LineIndex, Token};

/// Span type used throughout the parser.
pub type Span = SimpleSpan;

type Extra<'tokens> = extra::Err<Rich<'tokens, Token, Span>>;

/// Parse shode source into a script.
pub fn parse(source: &str) -> Result<Script, ParseError> {
    let index = LineIndex::new(source);
    match parse_at(source, 0) {
        Ok(mut script) => {
            locate_nodes(&mut script.nodes, &index);
            Ok(script)
        }
        Err(mut err) => {
            err.position = index.position(err.position.offset);
            Err(err)
        }
    }
}

/// Read and parse a script file. A leading `#!` line is a comment.
pub fn parse_file(path: &Path) -> Result<Script, ShellError> {
    let source = std::fs::read_to_string(path)
        .map_err(|e| ShellError::io(format!("reading {}", path.display()), e))?;
    Ok(parse(&source)?)
}

/// Parse `source` as a fragment starting at byte `base` of a larger text.
///
/// Positions in the result carry offsets only; [`parse`] fills in lines and
/// columns for the whole tree, nested substitutions included.
pub(crate) fn parse_at(source: &str, base: usize) -> Result<Script, ParseError> {
    let tokens = lexer::tokenize_at(source, base).map_err(|e| e.into_parse_error())?;
    let tokens: Vec<(Token, Span)> = tokens
        .into_iter()
        .map(|spanned| (spanned.token, spanned.span.into()))
        .collect();

    let end = base + source.len();
    let end_span: Span = (end..end).into();

    let result = script_parser()
        .parse(tokens.as_slice().map(end_span, |(t, s)| (t, s)))
        .into_result()
        .map_err(|errs| {
            let err = errs
                .into_iter()
                .next()
                .map(|e| to_parse_error(e, end))
                .unwrap_or_else(|| ParseError {
                    position: Position::at_offset(base),
                    expected: vec![],
                    found: "nothing".to_string(),
                });
            background_error(&tokens, err.position.offset).unwrap_or(err)
        });
    result
}

/// No rule consumes `&`, so one at or before the failure point is the
/// real cause.
fn background_error(tokens: &[(Token, Span)], failed_at: usize) -> Option<ParseError> {
    let (_, span) = tokens
        .iter()
        .find(|(t, span)| matches!(t, Token::Amp) && span.start <= failed_at)?;
    Some(ParseError {
        position: Position::at_offset(span.start),
        expected: vec![
            "a command separator".to_string(),
            "end of input (background jobs are not supported)".to_string(),
        ],
        found: Token::Amp.to_string(),
    })
}

fn to_parse_error(err: Rich<'_, Token, Span>, end: usize) -> ParseError {
    let mut expected: Vec<String> = err.expected().map(pattern_text).collect();
    expected.sort();
    expected.dedup();
    if expected.is_empty() {
        expected.push(match err.reason() {
            RichReason::Custom(msg) => msg.clone(),
            _ => err.to_string(),
        });
    }
    let (found, offset) = match err.found() {
        Some(t) => (t.to_string(), err.span().start),
        None => ("end of input".to_string(), end),
    };
    ParseError {
        position: Position::at_offset(offset),
        expected,
        found,
    }
}

/// Render an expected pattern without chumsky's extra quoting.
fn pattern_text(pattern: &RichPattern<'_, Token>) -> String {
    match pattern {
        RichPattern::Token(t) => (**t).to_string(),
        RichPattern::Label(label) => label.to_string(),
        RichPattern::EndOfInput => "end of input".to_string(),
        other => other.to_string(),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Parser Combinators
// ═══════════════════════════════════════════════════════════════════════════

fn script_parser<'tokens, I>() -> impl Parser<'tokens, I, Script, Extra<'tokens>>
where
    I: ValueInput<'tokens, Token = Token, Span = Span>,
{
    list(statement_parser())
        .then_ignore(end())
        .map(Script::new)
}

fn separator<'tokens, I>() -> impl Parser<'tokens, I, (), Extra<'tokens>> + Clone
where
    I: ValueInput<'tokens, Token = Token, Span = Span>,
{
    choice((just(Token::Newline), just(Token::Semi))).ignored()
}

/// Statements separated by `;` or newlines, possibly empty.
fn list<'tokens, I, S>(stmt: S) -> impl Parser<'tokens, I, Vec<Node>, Extra<'tokens>> + Clone
where
    I: ValueInput<'tokens, Token = Token, Span = Span>,
    S: Parser<'tokens, I, Node, Extra<'tokens>> + Clone + 'tokens,
{
    separator()
        .repeated()
        .ignore_then(
            stmt.then_ignore(separator().repeated())
                .repeated()
                .collect::<Vec<_>>(),
        )
        .boxed()
}

/// Like [`list`] but requires at least one statement.
fn list1<'tokens, I, S>(stmt: S) -> impl Parser<'tokens, I, Vec<Node>, Extra<'tokens>> + Clone
where
    I: ValueInput<'tokens, Token = Token, Span = Span>,
    S: Parser<'tokens, I, Node, Extra<'tokens>> + Clone + 'tokens,
{
    separator()
        .repeated()
        .ignore_then(
            stmt.then_ignore(separator().repeated())
                .repeated()
                .at_least(1)
                .collect::<Vec<_>>(),
        )
        .boxed()
}

/// A statement: a pipeline, assignment or compound command, optionally
/// chained with `&&` / `||`.
fn statement_parser<'tokens, I>() -> impl Parser<'tokens, I, Node, Extra<'tokens>> + Clone
where
    I: ValueInput<'tokens, Token = Token, Span = Span>,
{
    recursive(|stmt| {
        let unit = choice((
            if_parser(stmt.clone()),
            while_parser(stmt.clone()),
            for_parser(stmt.clone()),
            function_parser(stmt.clone()),
            subshell_parser(stmt.clone()),
            group_parser(stmt),
            control_parser(),
            pipeline_parser(),
            assignments_parser(),
        ))
        .boxed();

        let connective = choice((
            just(Token::And).to(Connective::And),
            just(Token::Or).to(Connective::Or),
        ))
        .then_ignore(just(Token::Newline).repeated());

        unit.clone()
            .then(connective.then(unit).repeated().collect::<Vec<_>>())
            .map(|(head, tail)| {
                if tail.is_empty() {
                    head
                } else {
                    Node::AndOr(AndOr {
                        head: Box::new(head),
                        tail,
                    })
                }
            })
            .labelled("statement")
    })
}

/// A word in argument position. Reserved words and `NAME=value` are plain
/// text here.
fn arg_word_parser<'tokens, I>() -> impl Parser<'tokens, I, Word, Extra<'tokens>> + Clone
where
    I: ValueInput<'tokens, Token = Token, Span = Span>,
{
    let keyword = any()
        .filter(|t: &Token| t.keyword_text().is_some())
        .map(|t: Token| Word::literal(t.keyword_text().unwrap_or_default()));

    select! {
        Token::Word(w) => w,
        Token::Assign(name, value) => assignment_word(name, value),
    }
    .or(keyword)
    .labelled("word")
}

fn assignment_word(name: String, value: Word) -> Word {
    let mut parts = vec![WordPart::Literal(format!("{name}="))];
    let mut rest = value.parts.into_iter();
    if let Some(first) = rest.next() {
        match first {
            WordPart::Literal(s) => parts[0] = WordPart::Literal(format!("{name}={s}")),
            other => parts.push(other),
        }
    }
    parts.extend(rest);
    Word::new(parts)
}

/// A bare, unquoted literal used as a variable or function name.
fn name_parser<'tokens, I>(
    what: &'static str,
    valid: fn(&str) -> bool,
) -> impl Parser<'tokens, I, String, Extra<'tokens>> + Clone
where
    I: ValueInput<'tokens, Token = Token, Span = Span>,
{
    select! { Token::Word(w) => w }
        .try_map(move |w, span| match w.parts.as_slice() {
            [WordPart::Literal(s)] if valid(s) => Ok(s.clone()),
            _ => Err(Rich::custom(span, format!("expected {what}"))),
        })
        .labelled(what)
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c == '_' || c.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

fn is_function_name(s: &str) -> bool {
    !s.is_empty() && !s.contains('/') && !s.contains('=')
}

fn assign_parser<'tokens, I>() -> impl Parser<'tokens, I, Assignment, Extra<'tokens>> + Clone
where
    I: ValueInput<'tokens, Token = Token, Span = Span>,
{
    select! { Token::Assign(name, value) => (name, value) }.map_with(|(name, value), e| {
        let span: Span = e.span();
        Assignment {
            name,
            value,
            pos: Position::at_offset(span.start),
        }
    })
}

/// `A=1` on its own, or `A=1 B=2` as a sequence.
fn assignments_parser<'tokens, I>() -> impl Parser<'tokens, I, Node, Extra<'tokens>> + Clone
where
    I: ValueInput<'tokens, Token = Token, Span = Span>,
{
    assign_parser()
        .repeated()
        .at_least(1)
        .collect::<Vec<_>>()
        .map(|mut assignments| {
            if assignments.len() == 1 {
                if let Some(a) = assignments.pop() {
                    return Node::Assignment(a);
                }
            }
            Node::Script(Script::new(
                assignments.into_iter().map(Node::Assignment).collect(),
            ))
        })
        .labelled("assignment")
        .boxed()
}

fn redirect_parser<'tokens, I>() -> impl Parser<'tokens, I, Redirect, Extra<'tokens>> + Clone
where
    I: ValueInput<'tokens, Token = Token, Span = Span>,
{
    choice((
        just(Token::Redirect(RedirectKind::StderrToStdout)).to(Redirect {
            kind: RedirectKind::StderrToStdout,
            target: RedirectTarget::None,
        }),
        select! { Token::Redirect(kind) => kind }
            .then(arg_word_parser().labelled("redirection target"))
            .map(|(kind, target)| Redirect {
                kind,
                target: RedirectTarget::File(target),
            }),
        select! { Token::HereDoc(body) => body }.map(|body| Redirect {
            kind: RedirectKind::HereDoc,
            target: RedirectTarget::Body(body),
        }),
    ))
    .labelled("redirection")
}

enum Element {
    Arg(Word),
    Redirect(Redirect),
}

/// Command: `[NAME=value...] name args... [redirects...]`
fn command_parser<'tokens, I>() -> impl Parser<'tokens, I, Command, Extra<'tokens>> + Clone
where
    I: ValueInput<'tokens, Token = Token, Span = Span>,
{
    let element = choice((
        redirect_parser().map(Element::Redirect),
        arg_word_parser().map(Element::Arg),
    ));

    assign_parser()
        .repeated()
        .collect::<Vec<_>>()
        .then(select! { Token::Word(w) => w }.labelled("command name"))
        .then(element.repeated().collect::<Vec<_>>())
        .map_with(|((prefix, name), elements), e| {
            let span: Span = e.span();
            let mut args = Vec::new();
            let mut redirects = Vec::new();
            for element in elements {
                match element {
                    Element::Arg(w) => args.push(w),
                    Element::Redirect(r) => redirects.push(r),
                }
            }
            Command {
                name,
                args,
                redirects,
                prefix,
                pos: Position::at_offset(span.start),
            }
        })
        .labelled("command")
        .boxed()
}

/// Pipeline: `[!] cmd | cmd | cmd`. A lone command stays a command.
fn pipeline_parser<'tokens, I>() -> impl Parser<'tokens, I, Node, Extra<'tokens>> + Clone
where
    I: ValueInput<'tokens, Token = Token, Span = Span>,
{
    just(Token::Bang)
        .or_not()
        .then(
            command_parser()
                .separated_by(just(Token::Pipe).then_ignore(just(Token::Newline).repeated()))
                .at_least(1)
                .collect::<Vec<_>>(),
        )
        .map_with(|(bang, mut stages), e| {
            let span: Span = e.span();
            let negated = bang.is_some();
            if !negated && stages.len() == 1 {
                if let Some(command) = stages.pop() {
                    return Node::Command(command);
                }
            }
            Node::Pipeline(Pipeline {
                stages,
                negated,
                pos: Position::at_offset(span.start),
            })
        })
        .labelled("pipeline")
        .boxed()
}

/// If statement with elif/else branches.
///
/// elif clauses are desugared to nested if/else:
///   `if A; then X; elif B; then Y; else Z; fi`
/// becomes:
///   `if A; then X; else if B; then Y; else Z; fi; fi`
fn if_parser<'tokens, I, S>(stmt: S) -> impl Parser<'tokens, I, Node, Extra<'tokens>> + Clone
where
    I: ValueInput<'tokens, Token = Token, Span = Span>,
    S: Parser<'tokens, I, Node, Extra<'tokens>> + Clone + 'tokens,
{
    let branch = list1(stmt.clone())
        .then_ignore(just(Token::Then))
        .then(list(stmt.clone()));

    let elif_branch = just(Token::Elif)
        .ignore_then(branch.clone())
        .map_with(|(cond, body), e| {
            let span: Span = e.span();
            (cond, body, Position::at_offset(span.start))
        });

    let else_branch = just(Token::Else).ignore_then(list(stmt));

    just(Token::If)
        .ignore_then(branch)
        .then(elif_branch.repeated().collect::<Vec<_>>())
        .then(else_branch.or_not())
        .then_ignore(just(Token::Fi))
        .map_with(|(((cond, then_branch), elifs), else_branch), e| {
            let span: Span = e.span();
            Node::If(build_if_chain(
                cond,
                then_branch,
                Position::at_offset(span.start),
                elifs,
                else_branch,
            ))
        })
        .labelled("if statement")
        .boxed()
}

fn build_if_chain(
    cond: Vec<Node>,
    then_branch: Vec<Node>,
    pos: Position,
    mut elifs: Vec<(Vec<Node>, Vec<Node>, Position)>,
    else_branch: Option<Vec<Node>>,
) -> If {
    if elifs.is_empty() {
        return If {
            cond,
            then_branch,
            else_branch,
            pos,
        };
    }
    let (elif_cond, elif_then, elif_pos) = elifs.remove(0);
    let nested = build_if_chain(elif_cond, elif_then, elif_pos, elifs, else_branch);
    If {
        cond,
        then_branch,
        else_branch: Some(vec![Node::If(nested)]),
        pos,
    }
}

/// For loop: `for VAR in WORDS; do BODY; done`
fn for_parser<'tokens, I, S>(stmt: S) -> impl Parser<'tokens, I, Node, Extra<'tokens>> + Clone
where
    I: ValueInput<'tokens, Token = Token, Span = Span>,
    S: Parser<'tokens, I, Node, Extra<'tokens>> + Clone + 'tokens,
{
    just(Token::For)
        .ignore_then(name_parser("variable name", is_identifier))
        .then_ignore(just(Token::In))
        .then(arg_word_parser().repeated().collect::<Vec<_>>())
        .then_ignore(separator().repeated().at_least(1))
        .then_ignore(just(Token::Do))
        .then(list(stmt))
        .then_ignore(just(Token::Done))
        .map_with(|((var, items), body), e| {
            let span: Span = e.span();
            Node::For(For {
                var,
                items,
                body,
                pos: Position::at_offset(span.start),
            })
        })
        .labelled("for loop")
        .boxed()
}

/// While loop: `while COND; do BODY; done`
fn while_parser<'tokens, I, S>(stmt: S) -> impl Parser<'tokens, I, Node, Extra<'tokens>> + Clone
where
    I: ValueInput<'tokens, Token = Token, Span = Span>,
    S: Parser<'tokens, I, Node, Extra<'tokens>> + Clone + 'tokens,
{
    just(Token::While)
        .ignore_then(list1(stmt.clone()))
        .then_ignore(just(Token::Do))
        .then(list(stmt))
        .then_ignore(just(Token::Done))
        .map_with(|(cond, body), e| {
            let span: Span = e.span();
            Node::While(While {
                cond,
                body,
                pos: Position::at_offset(span.start),
            })
        })
        .labelled("while loop")
        .boxed()
}

/// `function name() { }`, `function name { }` or `name() { }`
fn function_parser<'tokens, I, S>(stmt: S) -> impl Parser<'tokens, I, Node, Extra<'tokens>> + Clone
where
    I: ValueInput<'tokens, Token = Token, Span = Span>,
    S: Parser<'tokens, I, Node, Extra<'tokens>> + Clone + 'tokens,
{
    let parens = just(Token::LParen).then(just(Token::RParen));
    let body = just(Token::Newline)
        .repeated()
        .ignore_then(just(Token::LBrace))
        .ignore_then(list(stmt))
        .then_ignore(just(Token::RBrace));

    let keyword_form = just(Token::Function)
        .ignore_then(name_parser("function name", is_function_name))
        .then_ignore(parens.clone().or_not())
        .then(body.clone());

    let posix_form = name_parser("function name", is_function_name)
        .then_ignore(parens)
        .then(body);

    choice((keyword_form, posix_form))
        .map_with(|(name, body), e| {
            let span: Span = e.span();
            Node::FunctionDef(Arc::new(FunctionDef {
                name,
                body,
                pos: Position::at_offset(span.start),
            }))
        })
        .labelled("function definition")
        .boxed()
}

/// `( BODY )`
fn subshell_parser<'tokens, I, S>(stmt: S) -> impl Parser<'tokens, I, Node, Extra<'tokens>> + Clone
where
    I: ValueInput<'tokens, Token = Token, Span = Span>,
    S: Parser<'tokens, I, Node, Extra<'tokens>> + Clone + 'tokens,
{
    just(Token::LParen)
        .ignore_then(list(stmt))
        .then_ignore(just(Token::RParen))
        .map_with(|body, e| {
            let span: Span = e.span();
            Node::Subshell(Subshell {
                body,
                pos: Position::at_offset(span.start),
            })
        })
        .labelled("subshell")
        .boxed()
}

/// `{ BODY }` runs in the current scope.
fn group_parser<'tokens, I, S>(stmt: S) -> impl Parser<'tokens, I, Node, Extra<'tokens>> + Clone
where
    I: ValueInput<'tokens, Token = Token, Span = Span>,
    S: Parser<'tokens, I, Node, Extra<'tokens>> + Clone + 'tokens,
{
    just(Token::LBrace)
        .ignore_then(list(stmt))
        .then_ignore(just(Token::RBrace))
        .map(|body| Node::Script(Script::new(body)))
        .labelled("command group")
        .boxed()
}

/// `break [N]`, `continue [N]`, `return [N]`, `exit [N]`
fn control_parser<'tokens, I>() -> impl Parser<'tokens, I, Node, Extra<'tokens>> + Clone
where
    I: ValueInput<'tokens, Token = Token, Span = Span>,
{
    let arg = arg_word_parser().or_not();
    choice((
        just(Token::Break).ignore_then(arg.clone()).map(Node::Break),
        just(Token::Continue).ignore_then(arg.clone()).map(Node::Continue),
        just(Token::Return).ignore_then(arg.clone()).map(Node::Return),
        just(Token::Exit).ignore_then(arg).map(Node::Exit),
    ))
    .boxed()
}

// ═══════════════════════════════════════════════════════════════════════════
// Position resolution
// ═══════════════════════════════════════════════════════════════════════════

fn locate_nodes(nodes: &mut [Node], index: &LineIndex<'_>) {
    for node in nodes {
        locate_node(node, index);
    }
}

fn locate_node(node: &mut Node, index: &LineIndex<'_>) {
    let fix = |pos: &mut Position| *pos = index.position(pos.offset);
    match node {
        Node::Script(s) => locate_nodes(&mut s.nodes, index),
        Node::Command(c) => locate_command(c, index),
        Node::Assignment(a) => {
            fix(&mut a.pos);
            locate_word(&mut a.value, index);
        }
        Node::Pipeline(p) => {
            fix(&mut p.pos);
            for stage in &mut p.stages {
                locate_command(stage, index);
            }
        }
        Node::AndOr(a) => {
            locate_node(&mut a.head, index);
            for (_, rhs) in &mut a.tail {
                locate_node(rhs, index);
            }
        }
        Node::If(i) => {
            fix(&mut i.pos);
            locate_nodes(&mut i.cond, index);
            locate_nodes(&mut i.then_branch, index);
            if let Some(e) = &mut i.else_branch {
                locate_nodes(e, index);
            }
        }
        Node::For(f) => {
            fix(&mut f.pos);
            for item in &mut f.items {
                locate_word(item, index);
            }
            locate_nodes(&mut f.body, index);
        }
        Node::While(w) => {
            fix(&mut w.pos);
            locate_nodes(&mut w.cond, index);
            locate_nodes(&mut w.body, index);
        }
        Node::FunctionDef(def) => {
            let def = Arc::make_mut(def);
            fix(&mut def.pos);
            locate_nodes(&mut def.body, index);
        }
        Node::Subshell(s) => {
            fix(&mut s.pos);
            locate_nodes(&mut s.body, index);
        }
        Node::Break(w) | Node::Continue(w) | Node::Return(w) | Node::Exit(w) => {
            if let Some(w) = w {
                locate_word(w, index);
            }
        }
    }
}

fn locate_command(c: &mut Command, index: &LineIndex<'_>) {
    c.pos = index.position(c.pos.offset);
    for a in &mut c.prefix {
        a.pos = index.position(a.pos.offset);
        locate_word(&mut a.value, index);
    }
    locate_word(&mut c.name, index);
    for arg in &mut c.args {
        locate_word(arg, index);
    }
    for r in &mut c.redirects {
        if let RedirectTarget::File(w) | RedirectTarget::Body(w) = &mut r.target {
            locate_word(w, index);
        }
    }
}

fn locate_word(word: &mut Word, index: &LineIndex<'_>) {
    for part in &mut word.parts {
        locate_part(part, index);
    }
}

fn locate_part(part: &mut WordPart, index: &LineIndex<'_>) {
    match part {
        WordPart::CommandSubst(script) => locate_nodes(&mut script.nodes, index),
        WordPart::DoubleQuoted(inner) => {
            for p in inner {
                locate_part(p, index);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_are_line_and_column() {
        let script = parse("echo a\n  ls -l\n").expect("parses");
        let Node::Command(second) = &script.nodes[1] else {
            panic!("expected command, got {:?}", script.nodes[1]);
        };
        assert_eq!(second.pos, Position::new(2, 3, 9));
    }

    #[test]
    fn nested_substitution_positions_use_outer_text() {
        let script = parse("x\necho $(pwd)").expect("parses");
        let Node::Command(cmd) = &script.nodes[1] else {
            panic!("expected command");
        };
        let WordPart::CommandSubst(inner) = &cmd.args[0].parts[0] else {
            panic!("expected substitution");
        };
        let Node::Command(pwd) = &inner.nodes[0] else {
            panic!("expected command");
        };
        assert_eq!(pwd.pos.line, 2);
        assert_eq!(pwd.pos.column, 8);
    }

    #[test]
    fn error_carries_position_and_expectation() {
        let err = parse("if true; then\n  echo hi\n").expect_err("missing fi");
        assert_eq!(err.position, Position::new(3, 1, 24));
        assert_eq!(err.found, "end of input");
        assert!(
            err.expected.iter().any(|e| e == "fi"),
            "expected list should mention fi: {:?}",
            err.expected
        );
        assert!(err.expected.iter().all(|e| !e.starts_with('\'')), "{:?}", err.expected);
    }

    #[test]
    fn unterminated_quote_is_a_parse_error() {
        let err = parse("echo 'oops").expect_err("unterminated");
        assert_eq!(err.position, Position::new(1, 6, 5));
        assert_eq!(err.expected, vec!["closing '".to_string()]);
    }

    #[test]
    fn parse_file_ignores_shebang() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("s.sh");
        std::fs::write(&path, "#!/usr/bin/env shode\necho hi\n").expect("write");
        let script = parse_file(&path).expect("parses");
        assert_eq!(script.nodes.len(), 1);
        assert_eq!(script.nodes[0].position().map(|p| p.line), Some(2));
    }
}
