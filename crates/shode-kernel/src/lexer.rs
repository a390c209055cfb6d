//! Lexer for shode source text.
//!
//! Tokenizing happens in two passes:
//!
//! 1. logos splits the text into raw fragments (bare text, quoted strings,
//!    `$VAR` references, operators). Here-document bodies are consumed
//!    directly from the source at the newline that follows their `<<DELIM`.
//! 2. Fragments that touch (no whitespace between their spans) are glued into
//!    a single [`Word`]. A lone bare word that spells a reserved word becomes a
//!    keyword token, and a leading `NAME=` turns the word into an assignment.
//!
//! Whether a keyword or assignment is structural is left to the parser: in
//! argument position both are ordinary words again.

use std::fmt;

use logos::{Lexer, Logos, Span};

use crate::ast::{Position, RedirectKind, SpecialVar, Word, WordPart};
use crate::error::ParseError;
use crate::parser;

/// A token with its byte span in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub token: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(token: T, span: Span) -> Self {
        Self { token, span }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum LexErrorKind {
    #[default]
    UnexpectedChar,
    UnterminatedSingleQuote,
    UnterminatedDoubleQuote,
    UnterminatedSubstitution,
    UnterminatedHereDoc(String),
    /// A `$(...)` body that failed to parse.
    Substitution(Box<ParseError>),
}

impl fmt::Display for LexErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LexErrorKind::UnexpectedChar => write!(f, "unexpected character"),
            LexErrorKind::UnterminatedSingleQuote => write!(f, "unterminated single quote"),
            LexErrorKind::UnterminatedDoubleQuote => write!(f, "unterminated double quote"),
            LexErrorKind::UnterminatedSubstitution => write!(f, "unterminated $("),
            LexErrorKind::UnterminatedHereDoc(d) => write!(f, "here-document without {d}"),
            LexErrorKind::Substitution(e) => write!(f, "in command substitution: {e}"),
        }
    }
}

/// A lexing failure with the span where it was detected.
#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub kind: LexErrorKind,
    pub span: Span,
}

impl LexError {
    /// Express the failure in the parser's error shape.
    pub fn into_parse_error(self) -> ParseError {
        let position = Position::at_offset(self.span.start);
        let (expected, found) = match self.kind {
            LexErrorKind::Substitution(inner) => return *inner,
            LexErrorKind::UnexpectedChar => (vec!["word or operator".to_string()], "invalid character".to_string()),
            LexErrorKind::UnterminatedSingleQuote => (vec!["closing '".to_string()], "end of input".to_string()),
            LexErrorKind::UnterminatedDoubleQuote => (vec!["closing \"".to_string()], "end of input".to_string()),
            LexErrorKind::UnterminatedSubstitution => (vec!["closing )".to_string()], "end of input".to_string()),
            LexErrorKind::UnterminatedHereDoc(delim) => (vec![format!("here-document delimiter {delim}")], "end of input".to_string()),
        };
        ParseError {
            position,
            expected,
            found,
        }
    }
}

/// Delimiter details of a `<<DELIM` operator.
#[derive(Debug, Clone, PartialEq)]
pub struct HereDocSpec {
    delim: String,
    quoted: bool,
    strip_tabs: bool,
    body: String,
    body_offset: usize,
}

/// First-pass fragments produced by logos.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(error = LexErrorKind)]
#[logos(skip r"[ \t\r]+")]
#[logos(skip r"\\\n")]
enum Raw {
    #[regex(r"#[^\n]*", logos::skip)]
    Comment,

    #[token("\n")]
    Newline,
    #[token(";")]
    Semi,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("|")]
    Pipe,
    #[token("&")]
    Amp,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,

    #[token(">")]
    Gt,
    #[token(">>")]
    GtGt,
    #[token("<")]
    Lt,
    #[token("2>")]
    ErrGt,
    #[token("2>>")]
    ErrGtGt,
    #[token("2>&1")]
    ErrToOut,
    #[regex(r#"<<-?[ \t]*('[^'\n]*'|"[^"\n]*"|[A-Za-z0-9_.\-]+)"#, heredoc_spec)]
    HereDoc(HereDocSpec),

    #[regex(r"'[^']*'", |lex| strip_quotes(lex.slice()))]
    Single(String),
    #[regex(r#""([^"\\]|\\[\s\S])*""#, |lex| strip_quotes(lex.slice()))]
    Double(String),

    #[regex(r"\$[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice()[1..].to_string())]
    Var(String),
    #[regex(r"\$\{[A-Za-z_][A-Za-z0-9_]*\}", |lex| { let s = lex.slice(); s[2..s.len() - 1].to_string() })]
    BracedVar(String),
    #[regex(r"\$[0-9?#@*$]", |lex| lex.slice().chars().nth(1))]
    Special(char),
    #[token("$(", command_subst)]
    Subst(String),
    #[token("$")]
    Dollar,

    #[regex(r"\\[^\n]", |lex| lex.slice()[1..].to_string())]
    Escaped(String),
    #[regex(r#"[^\s'"$|&;<>(){}\\#][^\s'"$|&;<>()\\]*"#, |lex| lex.slice().to_string())]
    Bare(String),
}

fn strip_quotes(s: &str) -> String {
    s[1..s.len() - 1].to_string()
}

fn heredoc_spec(lex: &mut Lexer<Raw>) -> HereDocSpec {
    let rest = &lex.slice()[2..];
    let strip_tabs = rest.starts_with('-');
    let rest = rest.trim_start_matches('-').trim_start();
    let quoted = rest.starts_with('\'') || rest.starts_with('"');
    let delim = if quoted { strip_quotes(rest) } else { rest.to_string() };
    HereDocSpec {
        delim,
        quoted,
        strip_tabs,
        body: String::new(),
        body_offset: 0,
    }
}

fn command_subst(lex: &mut Lexer<Raw>) -> Result<String, LexErrorKind> {
    let rest = lex.remainder();
    let end = find_subst_end(rest).ok_or(LexErrorKind::UnterminatedSubstitution)?;
    let inner = rest[..end].to_string();
    lex.bump(end + 1);
    Ok(inner)
}

/// Byte index of the `)` closing a `$(` whose body starts at `s[0]`.
fn find_subst_end(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut depth = 1usize;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 1,
            b'\'' => {
                i += 1;
                while i < bytes.len() && bytes[i] != b'\'' {
                    i += 1;
                }
            }
            b'"' => {
                i += 1;
                while i < bytes.len() && bytes[i] != b'"' {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
            }
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Tokens consumed by the parser.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Word(Word),
    /// `NAME=value` as a single word.
    Assign(String, Word),

    If,
    Then,
    Elif,
    Else,
    Fi,
    For,
    In,
    While,
    Do,
    Done,
    Function,
    Break,
    Continue,
    Return,
    Exit,
    Bang,

    Newline,
    Semi,
    And,
    Or,
    Pipe,
    Amp,
    LParen,
    RParen,
    LBrace,
    RBrace,

    Redirect(RedirectKind),
    /// `<<DELIM` with its body already read.
    HereDoc(Word),
}

const KEYWORDS: &[(&str, Token)] = &[
    ("if", Token::If),
    ("then", Token::Then),
    ("elif", Token::Elif),
    ("else", Token::Else),
    ("fi", Token::Fi),
    ("for", Token::For),
    ("in", Token::In),
    ("while", Token::While),
    ("do", Token::Do),
    ("done", Token::Done),
    ("function", Token::Function),
    ("break", Token::Break),
    ("continue", Token::Continue),
    ("return", Token::Return),
    ("exit", Token::Exit),
    ("!", Token::Bang),
];

impl Token {
    /// The source spelling of a reserved word.
    pub fn keyword_text(&self) -> Option<&'static str> {
        KEYWORDS
            .iter()
            .find(|(_, t)| t == self)
            .map(|(text, _)| *text)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(text) = self.keyword_text() {
            return f.write_str(text);
        }
        match self {
            Token::Word(w) => match w.as_literal() {
                Some(text) => write!(f, "word {text:?}"),
                None => write!(f, "word"),
            },
            Token::Assign(name, _) => write!(f, "assignment to {name}"),
            Token::Newline => write!(f, "newline"),
            Token::Semi => write!(f, ";"),
            Token::And => write!(f, "&&"),
            Token::Or => write!(f, "||"),
            Token::Pipe => write!(f, "|"),
            Token::Amp => write!(f, "&"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::Redirect(kind) => write!(f, "{kind}"),
            Token::HereDoc(_) => write!(f, "here-document"),
            _ => write!(f, "keyword"),
        }
    }
}

/// Tokenize a complete source text.
pub fn tokenize(source: &str) -> Result<Vec<Spanned<Token>>, LexError> {
    tokenize_at(source, 0)
}

/// Tokenize `source` as if it started at byte `base` of a larger text.
pub fn tokenize_at(source: &str, base: usize) -> Result<Vec<Spanned<Token>>, LexError> {
    let raw = lex_raw(source, base)?;
    assemble(raw)
}

fn lex_raw(source: &str, base: usize) -> Result<Vec<Spanned<Raw>>, LexError> {
    let mut lexer = Raw::lexer(source);
    let mut out: Vec<Spanned<Raw>> = Vec::new();
    let mut pending: Vec<usize> = Vec::new();

    while let Some(result) = lexer.next() {
        let span = lexer.span();
        let shifted = (span.start + base)..(span.end + base);
        let raw = match result {
            Ok(raw) => raw,
            Err(kind) => {
                let kind = match (kind, lexer.slice().chars().next()) {
                    (LexErrorKind::UnexpectedChar, Some('\'')) => LexErrorKind::UnterminatedSingleQuote,
                    (LexErrorKind::UnexpectedChar, Some('"')) => LexErrorKind::UnterminatedDoubleQuote,
                    (kind, _) => kind,
                };
                return Err(LexError { kind, span: shifted });
            }
        };

        let is_newline = raw == Raw::Newline;
        if matches!(raw, Raw::HereDoc(_)) {
            pending.push(out.len());
        }
        out.push(Spanned::new(raw, shifted));

        if is_newline && !pending.is_empty() {
            let mut body_offset = base + span.end;
            for index in std::mem::take(&mut pending) {
                let op_span = out[index].span.clone();
                let Raw::HereDoc(spec) = &mut out[index].token else {
                    continue;
                };
                let (body, consumed) = read_heredoc_body(lexer.remainder(), spec).ok_or_else(|| LexError {
                    kind: LexErrorKind::UnterminatedHereDoc(spec.delim.clone()),
                    span: op_span,
                })?;
                spec.body = body;
                spec.body_offset = body_offset;
                body_offset += consumed;
                lexer.bump(consumed);
            }
        }
    }

    if let Some(&index) = pending.first() {
        let Raw::HereDoc(spec) = &out[index].token else {
            return Err(LexError {
                kind: LexErrorKind::UnexpectedChar,
                span: out[index].span.clone(),
            });
        };
        return Err(LexError {
            kind: LexErrorKind::UnterminatedHereDoc(spec.delim.clone()),
            span: out[index].span.clone(),
        });
    }
    Ok(out)
}

/// Read lines up to the delimiter line; returns the body and bytes consumed.
fn read_heredoc_body(rest: &str, spec: &HereDocSpec) -> Option<(String, usize)> {
    let mut body = String::new();
    let mut consumed = 0;
    for line in rest.split_inclusive('\n') {
        consumed += line.len();
        let content = line.strip_suffix('\n').unwrap_or(line);
        let content = if spec.strip_tabs {
            content.trim_start_matches('\t')
        } else {
            content
        };
        if content == spec.delim {
            return Some((body, consumed));
        }
        body.push_str(content);
        body.push('\n');
    }
    None
}

fn is_fragment(raw: &Raw) -> bool {
    matches!(
        raw,
        Raw::Single(_)
            | Raw::Double(_)
            | Raw::Var(_)
            | Raw::BracedVar(_)
            | Raw::Special(_)
            | Raw::Subst(_)
            | Raw::Dollar
            | Raw::Escaped(_)
            | Raw::Bare(_)
    )
}

fn is_brace(raw: &Raw) -> bool {
    matches!(raw, Raw::LBrace | Raw::RBrace)
}

/// Glue touching fragments into words and map operators to parser tokens.
fn assemble(raw: Vec<Spanned<Raw>>) -> Result<Vec<Spanned<Token>>, LexError> {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        let current = &raw[i];
        let touches_next = raw
            .get(i + 1)
            .is_some_and(|next| next.span.start == current.span.end && is_fragment(&next.token));
        let touches_prev = i > 0
            && raw[i - 1].span.end == current.span.start
            && is_fragment(&raw[i - 1].token);

        if is_fragment(&current.token)
            || (is_brace(&current.token) && (touches_next || touches_prev))
        {
            let start = i;
            let mut end = i + 1;
            while end < raw.len()
                && raw[end].span.start == raw[end - 1].span.end
                && (is_fragment(&raw[end].token) || is_brace(&raw[end].token))
            {
                end += 1;
            }
            let span = raw[start].span.start..raw[end - 1].span.end;
            out.push(Spanned::new(word_token(&raw[start..end])?, span));
            i = end;
            continue;
        }

        let token = match &current.token {
            Raw::Newline => Token::Newline,
            Raw::Semi => Token::Semi,
            Raw::AndAnd => Token::And,
            Raw::OrOr => Token::Or,
            Raw::Pipe => Token::Pipe,
            Raw::Amp => Token::Amp,
            Raw::LParen => Token::LParen,
            Raw::RParen => Token::RParen,
            Raw::LBrace => Token::LBrace,
            Raw::RBrace => Token::RBrace,
            Raw::Gt => Token::Redirect(RedirectKind::StdoutOverwrite),
            Raw::GtGt => Token::Redirect(RedirectKind::StdoutAppend),
            Raw::Lt => Token::Redirect(RedirectKind::Stdin),
            Raw::ErrGt => Token::Redirect(RedirectKind::Stderr),
            Raw::ErrGtGt => Token::Redirect(RedirectKind::StderrAppend),
            Raw::ErrToOut => Token::Redirect(RedirectKind::StderrToStdout),
            Raw::HereDoc(spec) => Token::HereDoc(heredoc_word(spec)?),
            _ => {
                return Err(LexError {
                    kind: LexErrorKind::UnexpectedChar,
                    span: current.span.clone(),
                })
            }
        };
        out.push(Spanned::new(token, current.span.clone()));
        i += 1;
    }
    Ok(out)
}

fn heredoc_word(spec: &HereDocSpec) -> Result<Word, LexError> {
    if spec.quoted {
        return Ok(Word::new(vec![WordPart::SingleQuoted(spec.body.clone())]));
    }
    let parts = split_interpolated(&spec.body, spec.body_offset, Quoting::HereDoc)?;
    Ok(Word::new(parts))
}

/// Turn a run of touching fragments into a word, keyword or assignment.
fn word_token(frags: &[Spanned<Raw>]) -> Result<Token, LexError> {
    if let [Spanned { token: Raw::Bare(text), .. }] = frags {
        if let Some((_, keyword)) = KEYWORDS.iter().find(|(k, _)| *k == text.as_str()) {
            return Ok(keyword.clone());
        }
    }

    let mut parts = Vec::new();
    let mut assign_name = None;
    for (index, frag) in frags.iter().enumerate() {
        match &frag.token {
            Raw::Bare(text) if index == 0 => {
                if let Some((name, rest)) = split_assignment(text) {
                    assign_name = Some(name.to_string());
                    push_literal(&mut parts, rest);
                } else if text == "~" || text.starts_with("~/") {
                    parts.push(WordPart::Tilde);
                    push_literal(&mut parts, &text[1..]);
                } else {
                    push_literal(&mut parts, text);
                }
            }
            Raw::Bare(text) | Raw::Escaped(text) => push_literal(&mut parts, text),
            Raw::LBrace => push_literal(&mut parts, "{"),
            Raw::RBrace => push_literal(&mut parts, "}"),
            Raw::Dollar => push_literal(&mut parts, "$"),
            Raw::Single(text) => parts.push(WordPart::SingleQuoted(text.clone())),
            Raw::Double(text) => {
                let inner = split_interpolated(text, frag.span.start + 1, Quoting::Double)?;
                parts.push(WordPart::DoubleQuoted(inner));
            }
            Raw::Var(name) | Raw::BracedVar(name) => parts.push(WordPart::Var(name.clone())),
            Raw::Special(c) => parts.push(WordPart::Special(special_var(*c))),
            Raw::Subst(text) => {
                let script = parser::parse_at(text, frag.span.start + 2).map_err(|e| LexError {
                    kind: LexErrorKind::Substitution(Box::new(e)),
                    span: frag.span.clone(),
                })?;
                parts.push(WordPart::CommandSubst(Box::new(script)));
            }
            _ => {
                return Err(LexError {
                    kind: LexErrorKind::UnexpectedChar,
                    span: frag.span.clone(),
                })
            }
        }
    }

    let word = Word::new(parts);
    Ok(match assign_name {
        Some(name) => Token::Assign(name, word),
        None => Token::Word(word),
    })
}

fn split_assignment(text: &str) -> Option<(&str, &str)> {
    let (name, rest) = text.split_once('=')?;
    let mut chars = name.chars();
    let first = chars.next()?;
    let valid = (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    valid.then_some((name, rest))
}

fn special_var(c: char) -> SpecialVar {
    match c {
        '?' => SpecialVar::LastStatus,
        '#' => SpecialVar::ArgCount,
        '@' | '*' => SpecialVar::AllArgs,
        '$' => SpecialVar::ProcessId,
        digit => SpecialVar::Positional(digit.to_digit(10).unwrap_or(0) as u8),
    }
}

fn push_literal(parts: &mut Vec<WordPart>, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(WordPart::Literal(last)) = parts.last_mut() {
        last.push_str(text);
    } else {
        parts.push(WordPart::Literal(text.to_string()));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quoting {
    Double,
    HereDoc,
}

/// Split the inside of `"..."` or a here-document into literals and expansions.
fn split_interpolated(text: &str, base: usize, quoting: Quoting) -> Result<Vec<WordPart>, LexError> {
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut iter = text.char_indices().peekable();

    let flush = |literal: &mut String, parts: &mut Vec<WordPart>| {
        if !literal.is_empty() {
            push_literal(parts, literal);
            literal.clear();
        }
    };

    while let Some((i, c)) = iter.next() {
        match c {
            '\\' => match iter.peek().map(|&(_, n)| n) {
                Some('\n') => {
                    iter.next();
                }
                Some(n @ ('$' | '\\' | '`')) => {
                    literal.push(n);
                    iter.next();
                }
                Some('"') if quoting == Quoting::Double => {
                    literal.push('"');
                    iter.next();
                }
                _ => literal.push('\\'),
            },
            '$' => {
                let rest = &text[i + 1..];
                if let Some(inner) = rest.strip_prefix('(') {
                    let end = find_subst_end(inner).ok_or(LexError {
                        kind: LexErrorKind::UnterminatedSubstitution,
                        span: (base + i)..(base + text.len()),
                    })?;
                    let offset = base + i + 2;
                    let script = parser::parse_at(&inner[..end], offset).map_err(|e| LexError {
                        kind: LexErrorKind::Substitution(Box::new(e)),
                        span: (base + i)..(offset + end + 1),
                    })?;
                    flush(&mut literal, &mut parts);
                    parts.push(WordPart::CommandSubst(Box::new(script)));
                    skip_chars(&mut iter, i + 2 + end + 1);
                } else if let Some(braced) = rest.strip_prefix('{') {
                    match braced.find('}') {
                        Some(close) if is_name(&braced[..close]) => {
                            flush(&mut literal, &mut parts);
                            parts.push(WordPart::Var(braced[..close].to_string()));
                            skip_chars(&mut iter, i + 2 + close + 1);
                        }
                        _ => literal.push('$'),
                    }
                } else {
                    let name_len = rest
                        .char_indices()
                        .take_while(|&(j, ch)| {
                            ch == '_' || ch.is_ascii_alphabetic() || (j > 0 && ch.is_ascii_digit())
                        })
                        .count();
                    if name_len > 0 {
                        flush(&mut literal, &mut parts);
                        parts.push(WordPart::Var(rest[..name_len].to_string()));
                        skip_chars(&mut iter, i + 1 + name_len);
                    } else if let Some(special) = rest.chars().next().filter(|ch| "0123456789?#@*$".contains(*ch)) {
                        flush(&mut literal, &mut parts);
                        parts.push(WordPart::Special(special_var(special)));
                        skip_chars(&mut iter, i + 2);
                    } else {
                        literal.push('$');
                    }
                }
            }
            other => literal.push(other),
        }
    }
    flush(&mut literal, &mut parts);
    Ok(parts)
}

/// Advance `iter` until the next char starts at or after byte `target`.
fn skip_chars(iter: &mut std::iter::Peekable<std::str::CharIndices<'_>>, target: usize) {
    while iter.peek().is_some_and(|&(j, _)| j < target) {
        iter.next();
    }
}

fn is_name(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c == '_' || c.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

/// Maps byte offsets to 1-based line/column positions.
#[derive(Debug, Clone)]
pub struct LineIndex<'a> {
    source: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    pub fn new(source: &'a str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(source.match_indices('\n').map(|(i, _)| i + 1));
        Self {
            source,
            line_starts,
        }
    }

    pub fn position(&self, offset: usize) -> Position {
        let offset = offset.min(self.source.len());
        let line = self.line_starts.partition_point(|&start| start <= offset);
        let start = self.line_starts[line.saturating_sub(1)];
        let column = self
            .source
            .get(start..offset)
            .map(|s| s.chars().count())
            .unwrap_or(offset - start);
        Position::new(line as u32, column as u32 + 1, offset)
    }
}
