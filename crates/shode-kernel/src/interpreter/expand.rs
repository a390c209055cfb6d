//! Word expansion: variables, specials, tilde, command substitution and
//! field splitting.
//!
//! Unquoted expansion results are split on whitespace; anything inside
//! quotes stays in one field. `"$@"` is the exception and yields one field
//! per positional argument (none when there are none).

use crate::ast::{Script, SpecialVar, Word, WordPart};
use crate::engine::Engine;
use crate::error::ShellResult;
use crate::scheduler::{InputSource, OutputSink};

use super::context::ExecContext;
use super::scope::Flow;

/// Fields under construction.
#[derive(Debug, Default)]
struct Fields {
    done: Vec<String>,
    current: String,
    /// `current` is a field even when empty (it came from quotes).
    has_content: bool,
    split: bool,
}

impl Fields {
    fn new(split: bool) -> Self {
        Self {
            split,
            ..Self::default()
        }
    }

    fn literal(&mut self, text: &str) {
        self.current.push_str(text);
        self.has_content = true;
    }

    /// An unquoted expansion result.
    fn expansion(&mut self, text: &str) {
        if !self.split {
            self.current.push_str(text);
            return;
        }
        let mut pieces = text.split_whitespace().peekable();
        if pieces.peek().is_none() {
            if !text.is_empty() {
                self.finish();
            }
            return;
        }
        if text.starts_with(char::is_whitespace) {
            self.finish();
        }
        let mut first = true;
        for piece in pieces {
            if !first {
                self.finish();
            }
            self.literal(piece);
            first = false;
        }
        if text.ends_with(char::is_whitespace) {
            self.finish();
        }
    }

    fn finish(&mut self) {
        if self.has_content {
            self.done.push(std::mem::take(&mut self.current));
            self.has_content = false;
        }
    }

    fn into_fields(mut self) -> Vec<String> {
        self.finish();
        self.done
    }

    fn into_string(self) -> String {
        let mut out = self.done.join(" ");
        if !self.current.is_empty() {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(&self.current);
        }
        out
    }
}

impl Engine {
    /// Expand words into argument fields.
    pub(crate) async fn expand_words(&self, ctx: &mut ExecContext, words: &[Word]) -> ShellResult<Vec<String>> {
        let mut out = Vec::with_capacity(words.len());
        for word in words {
            let mut fields = Fields::new(true);
            self.expand_parts(ctx, &word.parts, &mut fields).await?;
            out.extend(fields.into_fields());
        }
        Ok(out)
    }

    /// Expand one word into exactly one string, without field splitting.
    pub(crate) async fn expand_single(&self, ctx: &mut ExecContext, word: &Word) -> ShellResult<String> {
        let mut fields = Fields::new(false);
        self.expand_parts(ctx, &word.parts, &mut fields).await?;
        Ok(fields.into_string())
    }

    async fn expand_parts(
        &self,
        ctx: &mut ExecContext,
        parts: &[WordPart],
        fields: &mut Fields,
    ) -> ShellResult<()> {
        for (index, part) in parts.iter().enumerate() {
            match part {
                WordPart::Literal(text) | WordPart::SingleQuoted(text) => fields.literal(text),
                WordPart::DoubleQuoted(inner) => {
                    if inner.is_empty() {
                        fields.literal("");
                    }
                    let mut flat = Vec::new();
                    flatten_quoted(inner, &mut flat);
                    for quoted in flat {
                        self.expand_quoted(ctx, quoted, fields).await?;
                    }
                }
                WordPart::Var(name) => {
                    let value = ctx.env.get_env(name).unwrap_or_default();
                    fields.expansion(&value);
                }
                WordPart::Special(SpecialVar::AllArgs) => {
                    let joined = ctx.scope.positional.args.join(" ");
                    fields.expansion(&joined);
                }
                WordPart::Special(special) => {
                    let value = special_value(ctx, *special);
                    fields.expansion(&value);
                }
                WordPart::CommandSubst(script) => {
                    let output = self.substitute(ctx, script).await?;
                    fields.expansion(&output);
                }
                WordPart::Tilde => {
                    if index == 0 {
                        fields.literal(&ctx.env.get_env("HOME").unwrap_or_default());
                    } else {
                        fields.literal("~");
                    }
                }
            }
        }
        Ok(())
    }

    async fn expand_quoted(&self, ctx: &mut ExecContext, part: &WordPart, fields: &mut Fields) -> ShellResult<()> {
        match part {
            WordPart::Literal(text) | WordPart::SingleQuoted(text) => fields.literal(text),
            WordPart::Var(name) => fields.literal(&ctx.env.get_env(name).unwrap_or_default()),
            WordPart::Special(SpecialVar::AllArgs) => {
                let args = ctx.scope.positional.args.clone();
                if !fields.split {
                    fields.literal(&args.join(" "));
                    return Ok(());
                }
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        fields.finish();
                    }
                    fields.literal(arg);
                }
            }
            WordPart::Special(special) => fields.literal(&special_value(ctx, *special)),
            WordPart::CommandSubst(script) => {
                let output = self.substitute(ctx, script).await?;
                fields.literal(&output);
            }
            WordPart::Tilde => fields.literal("~"),
            WordPart::DoubleQuoted(_) => fields.literal(""),
        }
        Ok(())
    }

    /// Run `$(...)` in a private copy of the environment and return its
    /// stdout with trailing newlines removed.
    pub(crate) async fn substitute(&self, ctx: &mut ExecContext, script: &Script) -> ShellResult<String> {
        let (sink, buf) = OutputSink::capture();
        let mut sub = ctx.subshell();
        sub.stdout = sink;
        sub.stdin = InputSource::empty();
        sub.recorder = None;
        sub.conditional = 0;

        let flow = self.run_nodes(&mut sub, &script.nodes).await?;
        let status = match flow {
            Flow::Exit(code) => code,
            _ => sub.scope.last_status,
        };
        ctx.subst_status = Some(status);

        let mut text = buf.to_string_lossy();
        while text.ends_with('\n') {
            text.pop();
            if text.ends_with('\r') {
                text.pop();
            }
        }
        Ok(text)
    }
}

/// Parts of a quoted word with nested quotes inlined.
fn flatten_quoted<'a>(parts: &'a [WordPart], out: &mut Vec<&'a WordPart>) {
    for part in parts {
        match part {
            WordPart::DoubleQuoted(inner) => flatten_quoted(inner, out),
            other => out.push(other),
        }
    }
}

fn special_value(ctx: &ExecContext, special: SpecialVar) -> String {
    match special {
        SpecialVar::LastStatus => ctx.scope.last_status.to_string(),
        SpecialVar::ArgCount => ctx.scope.positional.args.len().to_string(),
        SpecialVar::AllArgs => ctx.scope.positional.args.join(" "),
        SpecialVar::Positional(n) => ctx.scope.positional.get(n),
        SpecialVar::ProcessId => std::process::id().to_string(),
    }
}

/// Source-like rendering of a word, for pipeline descriptions in results.
pub(crate) fn render_word(word: &Word) -> String {
    let mut out = String::new();
    for part in &word.parts {
        render_part(part, &mut out);
    }
    out
}

fn render_part(part: &WordPart, out: &mut String) {
    match part {
        WordPart::Literal(text) => out.push_str(text),
        WordPart::SingleQuoted(text) => {
            out.push('\'');
            out.push_str(text);
            out.push('\'');
        }
        WordPart::DoubleQuoted(inner) => {
            out.push('"');
            for p in inner {
                render_part(p, out);
            }
            out.push('"');
        }
        WordPart::Var(name) => {
            out.push('$');
            out.push_str(name);
        }
        WordPart::Special(special) => out.push_str(&special.to_string()),
        WordPart::CommandSubst(_) => out.push_str("$(...)"),
        WordPart::Tilde => out.push('~'),
    }
}
