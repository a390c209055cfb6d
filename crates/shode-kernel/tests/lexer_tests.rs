//! Lexer tests using rstest for parameterization.

use rstest::rstest;
use shode_kernel::ast::{RedirectKind, SpecialVar, Word, WordPart};
use shode_kernel::lexer::{tokenize, LexErrorKind, Token};

/// Render a token compactly so cases read like the source they came from.
fn format_token(token: &Token) -> String {
    fn escape(s: &str) -> String {
        s.replace('\n', "\\n").replace('\t', "\\t")
    }

    fn part(p: &WordPart) -> String {
        match p {
            WordPart::Literal(s) => escape(s),
            WordPart::SingleQuoted(s) => format!("'{}'", escape(s)),
            WordPart::DoubleQuoted(inner) => format!("\"{}\"", inner.iter().map(part).collect::<String>()),
            WordPart::Var(name) => format!("${{{name}}}"),
            WordPart::Special(v) => v.to_string(),
            WordPart::CommandSubst(_) => "$(..)".to_string(),
            WordPart::Tilde => "~".to_string(),
        }
    }

    fn word(w: &Word) -> String {
        w.parts.iter().map(part).collect()
    }

    if let Some(keyword) = token.keyword_text() {
        return keyword.to_uppercase();
    }
    match token {
        Token::Word(w) => format!("WORD({})", word(w)),
        Token::Assign(name, value) => format!("ASSIGN({name}={})", word(value)),
        Token::Newline => "NEWLINE".to_string(),
        Token::Semi => "SEMI".to_string(),
        Token::And => "AMPAMP".to_string(),
        Token::Or => "PIPEPIPE".to_string(),
        Token::Pipe => "PIPE".to_string(),
        Token::Amp => "AMP".to_string(),
        Token::LParen => "LPAREN".to_string(),
        Token::RParen => "RPAREN".to_string(),
        Token::LBrace => "LBRACE".to_string(),
        Token::RBrace => "RBRACE".to_string(),
        Token::Redirect(kind) => format!("REDIR({kind})"),
        Token::HereDoc(body) => format!("HEREDOC({})", word(body)),
        other => format!("{other:?}"),
    }
}

fn lex(input: &str) -> Vec<String> {
    tokenize(input)
        .unwrap_or_else(|e| panic!("lex error for {input:?}: {}", e.kind))
        .iter()
        .map(|t| format_token(&t.token))
        .collect()
}

#[rstest]
#[case::plain_words("echo hello world", &["WORD(echo)", "WORD(hello)", "WORD(world)"])]
#[case::keywords("if then elif else fi", &["IF", "THEN", "ELIF", "ELSE", "FI"])]
#[case::loop_keywords("for x in a; do done", &["FOR", "WORD(x)", "IN", "WORD(a)", "SEMI", "DO", "DONE"])]
#[case::bang("! true", &["!", "WORD(true)"])]
#[case::quoted_keyword_is_a_word("'if'", &["WORD('if')"])]
#[case::assignment("NAME=value", &["ASSIGN(NAME=value)"])]
#[case::assignment_quoted("NAME=\"a b\"", &["ASSIGN(NAME=\"a b\")"])]
#[case::not_an_assignment("1X=2", &["WORD(1X=2)"])]
#[case::and_or("a && b || c", &["WORD(a)", "AMPAMP", "WORD(b)", "PIPEPIPE", "WORD(c)"])]
#[case::pipe("a | b", &["WORD(a)", "PIPE", "WORD(b)"])]
#[case::amp("sleep 1 &", &["WORD(sleep)", "WORD(1)", "AMP"])]
#[case::separators("a; b\nc", &["WORD(a)", "SEMI", "WORD(b)", "NEWLINE", "WORD(c)"])]
#[case::parens("(a)", &["LPAREN", "WORD(a)", "RPAREN"])]
#[case::braces("{ a; }", &["LBRACE", "WORD(a)", "SEMI", "RBRACE"])]
#[case::brace_inside_word("a{b}c", &["WORD(a{b}c)"])]
fn tokens(#[case] input: &str, #[case] expected: &[&str]) {
    assert_eq!(lex(input), expected);
}

#[rstest]
#[case::overwrite("cmd > out", &["WORD(cmd)", "REDIR(>)", "WORD(out)"])]
#[case::append("cmd >> out", &["WORD(cmd)", "REDIR(>>)", "WORD(out)"])]
#[case::stdin("cmd < input", &["WORD(cmd)", "REDIR(<)", "WORD(input)"])]
#[case::keyword_target("cmd < in", &["WORD(cmd)", "REDIR(<)", "IN"])]
#[case::stderr("cmd 2> err", &["WORD(cmd)", "REDIR(2>)", "WORD(err)"])]
#[case::stderr_append("cmd 2>> err", &["WORD(cmd)", "REDIR(2>>)", "WORD(err)"])]
#[case::stderr_to_stdout("cmd 2>&1", &["WORD(cmd)", "REDIR(2>&1)"])]
#[case::touching("cmd >out", &["WORD(cmd)", "REDIR(>)", "WORD(out)"])]
fn redirects(#[case] input: &str, #[case] expected: &[&str]) {
    assert_eq!(lex(input), expected);
}

#[rstest]
#[case::var("$HOME", &["WORD(${HOME})"])]
#[case::braced("${HOME}x", &["WORD(${HOME}x)"])]
#[case::status("$?", &["WORD($?)"])]
#[case::count("$#", &["WORD($#)"])]
#[case::all("$@", &["WORD($@)"])]
#[case::positional("$1", &["WORD($1)"])]
#[case::glued("pre$X.txt", &["WORD(pre${X}.txt)"])]
#[case::single_quotes_are_literal("'$X'", &["WORD('$X')"])]
#[case::double_quotes_interpolate("\"a $X b\"", &["WORD(\"a ${X} b\")"])]
#[case::escaped_dollar("\"\\$X\"", &["WORD(\"$X\")"])]
#[case::lone_dollar("$", &["WORD($)"])]
#[case::tilde("~/src", &["WORD(~/src)"])]
#[case::substitution("$(echo hi)", &["WORD($(..))"])]
fn expansions(#[case] input: &str, #[case] expected: &[&str]) {
    assert_eq!(lex(input), expected);
}

#[test]
fn comments_and_continuations_are_skipped() {
    assert_eq!(lex("echo a # trailing"), vec!["WORD(echo)", "WORD(a)"]);
    assert_eq!(lex("echo a \\\n  b"), vec!["WORD(echo)", "WORD(a)", "WORD(b)"]);
}

#[test]
fn tilde_is_a_part_only_at_word_start() {
    let tokens = tokenize("~/x a~b").unwrap();
    let Token::Word(first) = &tokens[0].token else {
        panic!("expected word");
    };
    assert_eq!(first.parts[0], WordPart::Tilde);
    let Token::Word(second) = &tokens[1].token else {
        panic!("expected word");
    };
    assert_eq!(second.parts, vec![WordPart::Literal("a~b".into())]);
}

#[test]
fn specials_map_to_variants() {
    let tokens = tokenize("$$ $0").unwrap();
    let specials: Vec<WordPart> = tokens
        .iter()
        .filter_map(|t| match &t.token {
            Token::Word(w) => w.parts.first().cloned(),
            _ => None,
        })
        .collect();
    assert_eq!(
        specials,
        vec![
            WordPart::Special(SpecialVar::ProcessId),
            WordPart::Special(SpecialVar::Positional(0)),
        ]
    );
}

#[test]
fn heredoc_body_is_read_after_the_line() {
    assert_eq!(
        lex("cat <<EOF\nhello $NAME\nEOF\necho done"),
        vec![
            "WORD(cat)",
            "HEREDOC(hello ${NAME}\\n)",
            "NEWLINE",
            "WORD(echo)",
            "DONE",
        ]
    );
}

#[test]
fn quoted_heredoc_delimiter_keeps_body_literal() {
    assert_eq!(
        lex("cat <<'EOF'\n$NAME\nEOF\n"),
        vec!["WORD(cat)", "HEREDOC('$NAME\\n')", "NEWLINE"]
    );
}

#[test]
fn heredoc_dash_strips_leading_tabs() {
    assert_eq!(
        lex("cat <<-EOF\n\tindented\n\tEOF\n"),
        vec!["WORD(cat)", "HEREDOC(indented\\n)", "NEWLINE"]
    );
}

#[test]
fn redirect_kinds_are_exact() {
    let tokens = tokenize("a 2>&1").unwrap();
    assert_eq!(tokens[1].token, Token::Redirect(RedirectKind::StderrToStdout));
}

#[test]
fn spans_cover_whole_words() {
    let tokens = tokenize("echo \"a b\"").unwrap();
    assert_eq!(tokens[1].span.start, 5);
    assert_eq!(tokens[1].span.end, 10);
}

#[rstest]
#[case::single_quote("echo 'oops", LexErrorKind::UnterminatedSingleQuote)]
#[case::double_quote("echo \"oops", LexErrorKind::UnterminatedDoubleQuote)]
#[case::substitution("echo $(date", LexErrorKind::UnterminatedSubstitution)]
#[case::heredoc("cat <<EOF\nno end\n", LexErrorKind::UnterminatedHereDoc("EOF".into()))]
fn lex_errors(#[case] input: &str, #[case] expected: LexErrorKind) {
    let err = tokenize(input).expect_err("should fail");
    assert_eq!(err.kind, expected);
}
