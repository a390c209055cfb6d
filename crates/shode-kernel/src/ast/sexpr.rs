//! Compact S-expression rendering of the AST.
//!
//! Used by `shode --ast` and by parser snapshot tests. One top-level node
//! per line; nested nodes render inline.

use super::types::*;

/// Render a script, one top-level node per line.
pub fn to_sexpr(script: &Script) -> String {
    script
        .nodes
        .iter()
        .map(node)
        .collect::<Vec<_>>()
        .join("\n")
}

fn node(n: &Node) -> String {
    match n {
        Node::Script(s) => list("seq", &s.nodes),
        Node::Command(c) => command(c),
        Node::Assignment(a) => format!("(assign {} {})", a.name, word(&a.value)),
        Node::Pipeline(p) => {
            let stages: Vec<String> = p.stages.iter().map(command).collect();
            let pipe = format!("(pipe {})", stages.join(" "));
            if p.negated {
                format!("(not {pipe})")
            } else {
                pipe
            }
        }
        Node::AndOr(a) => {
            let mut out = format!("(and-or {}", node(&a.head));
            for (op, rhs) in &a.tail {
                out.push_str(&format!(" {op} {}", node(rhs)));
            }
            out.push(')');
            out
        }
        Node::If(i) => {
            let mut out = format!("(if {} {}", list("cond", &i.cond), list("then", &i.then_branch));
            if let Some(e) = &i.else_branch {
                out.push(' ');
                out.push_str(&list("else", e));
            }
            out.push(')');
            out
        }
        Node::For(f) => {
            let items: Vec<String> = f.items.iter().map(word).collect();
            format!("(for {} (in {}) {})", f.var, items.join(" "), list("do", &f.body))
        }
        Node::While(w) => format!("(while {} {})", list("cond", &w.cond), list("do", &w.body)),
        Node::FunctionDef(d) => {
            let body: Vec<String> = d.body.iter().map(node).collect();
            if body.is_empty() {
                format!("(fn {})", d.name)
            } else {
                format!("(fn {} {})", d.name, body.join(" "))
            }
        }
        Node::Subshell(s) => list("subshell", &s.body),
        Node::Break(n) => control("break", n),
        Node::Continue(n) => control("continue", n),
        Node::Return(n) => control("return", n),
        Node::Exit(n) => control("exit", n),
    }
}

fn list(tag: &str, nodes: &[Node]) -> String {
    let inner: Vec<String> = nodes.iter().map(node).collect();
    if inner.is_empty() {
        format!("({tag})")
    } else {
        format!("({tag} {})", inner.join(" "))
    }
}

fn control(tag: &str, arg: &Option<Word>) -> String {
    match arg {
        Some(w) => format!("({tag} {})", word(w)),
        None => format!("({tag})"),
    }
}

fn command(c: &Command) -> String {
    let mut parts = Vec::new();
    if !c.prefix.is_empty() {
        let env: Vec<String> = c
            .prefix
            .iter()
            .map(|a| format!("{}={}", a.name, word(&a.value)))
            .collect();
        parts.push(format!("(env {})", env.join(" ")));
    }
    parts.push(word(&c.name));
    parts.extend(c.args.iter().map(word));
    for r in &c.redirects {
        parts.push(match &r.target {
            RedirectTarget::File(w) => format!("({} {})", r.kind, word(w)),
            RedirectTarget::Body(w) => format!("(<< {})", word(w)),
            RedirectTarget::None => format!("({})", r.kind),
        });
    }
    format!("(cmd {})", parts.join(" "))
}

fn word(w: &Word) -> String {
    w.parts.iter().map(part).collect()
}

fn part(p: &WordPart) -> String {
    match p {
        WordPart::Literal(s) => s.clone(),
        WordPart::SingleQuoted(s) => format!("'{s}'"),
        WordPart::DoubleQuoted(inner) => {
            let body: String = inner.iter().map(part).collect();
            format!("\"{body}\"")
        }
        WordPart::Var(name) => format!("${{{name}}}"),
        WordPart::Special(v) => v.to_string(),
        WordPart::CommandSubst(s) => {
            let inner: Vec<String> = s.nodes.iter().map(node).collect();
            format!("$({})", inner.join("; "))
        }
        WordPart::Tilde => "~".to_string(),
    }
}
