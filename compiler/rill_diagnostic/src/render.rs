//! Build [`Report`]s from diagnostics and format them as plain text.

use crate::Report;
use rill_ir::{Diagnostic, ModuleEnv};
use std::fmt::Write as _;

/// Resolve one diagnostic into a [`Report`], filling names in from the env.
pub fn report_for(diagnostic: &Diagnostic, env: &ModuleEnv) -> Report {
    let (message, hint) = message_and_hint(diagnostic, env);
    Report {
        severity: diagnostic.severity(),
        tag: diagnostic.tag(),
        message,
        region: diagnostic.region(),
        hint,
    }
}

fn message_and_hint(diagnostic: &Diagnostic, env: &ModuleEnv) -> (String, Option<String>) {
    let ident = |i: rill_ir::Ident| env.idents.text(i).to_owned();
    match diagnostic {
        Diagnostic::LeadingZero { .. } => (
            "integer literals may not start with `0`".to_owned(),
            Some("remove the leading zero, or write the value in hex (`0x…`).".to_owned()),
        ),
        Diagnostic::EmptySingleQuote { .. } => (
            "this scalar literal is empty".to_owned(),
            Some("a single-quoted literal must contain exactly one character, like `'a'`.".to_owned()),
        ),
        Diagnostic::TooLongSingleQuote { .. } => (
            "this scalar literal has more than one character".to_owned(),
            Some("use a double-quoted string for text, or keep a single character here.".to_owned()),
        ),
        Diagnostic::UnclosedString { .. } => (
            "this string literal is never closed".to_owned(),
            Some("add a closing `\"` before the end of the line.".to_owned()),
        ),
        Diagnostic::UnclosedInterpolation { .. } => (
            "this `${` interpolation is never closed".to_owned(),
            Some("add a closing `}` to finish the interpolation.".to_owned()),
        ),
        Diagnostic::InvalidNumberSuffix { .. } => (
            "unknown precision suffix on this number".to_owned(),
            Some("valid suffixes are i8…i128, u8…u128, f32, f64, and dec.".to_owned()),
        ),
        Diagnostic::UnknownToken { .. } => ("I don't recognize this character".to_owned(), None),
        Diagnostic::Parse { reason, .. } => (
            format!("syntax problem: {}", reason.tag().replace('_', " ")),
            None,
        ),
        Diagnostic::IdentNotInScope { ident: i, .. } => (
            format!("nothing named `{}` is in scope", ident(*i)),
            Some("check the spelling, or add an import that exposes it.".to_owned()),
        ),
        Diagnostic::IdentAlreadyInScope { ident: i, .. } => (
            format!("`{}` is already defined in this scope", ident(*i)),
            Some("rename one of the two definitions.".to_owned()),
        ),
        Diagnostic::ShadowingWarning { ident: i, .. } => (
            format!("`{}` shadows an outer definition", ident(*i)),
            Some("the outer value is unreachable in this scope; consider a different name.".to_owned()),
        ),
        Diagnostic::UnknownOperator { .. } => (
            "this is not a known operator".to_owned(),
            Some("supported operators: |> or and == != < > <= >= + - * / // %.".to_owned()),
        ),
        Diagnostic::UndeclaredType { name, .. } => (
            format!("no type named `{}` is declared", ident(*name)),
            None,
        ),
        Diagnostic::TypeRedeclared { name, .. } => (
            format!("the type `{}` is declared twice", ident(*name)),
            Some("remove or rename the second declaration.".to_owned()),
        ),
        Diagnostic::InvalidTopLevelStatement { .. } => (
            "this statement is not allowed in this position".to_owned(),
            Some(
                "the top level allows imports, definitions, type declarations, type \
                 annotations, and expect statements; imports and type declarations \
                 may only appear there."
                    .to_owned(),
            ),
        ),
        Diagnostic::ExposedButNotImplemented { name, .. } => (
            format!("`{}` is exposed by the header but never defined", ident(*name)),
            Some("define it in this module, or remove it from the exposes list.".to_owned()),
        ),
        Diagnostic::RedundantExposed { name, .. } => (
            format!("`{}` appears twice in the exposes list", ident(*name)),
            Some("remove the duplicate entry.".to_owned()),
        ),
        Diagnostic::TypeMismatch {
            expected,
            found,
            path,
            ..
        } => (
            format!("type mismatch: expected `{expected}`, found `{found}`"),
            (!path.is_empty()).then(|| format!("the two sides disagree {path}.")),
        ),
        Diagnostic::IncompatibleListElements { first, second, .. } => (
            format!("list elements have incompatible types: `{first}` and `{second}`"),
            Some("every element of a list must have the same type.".to_owned()),
        ),
        Diagnostic::IncompatibleIfBranches { first, second, .. } => (
            format!("if branches have incompatible types: `{first}` and `{second}`"),
            Some("every branch of an if must produce the same type.".to_owned()),
        ),
        Diagnostic::IncompatibleMatchBranches { first, second, .. } => (
            format!("match branches have incompatible types: `{first}` and `{second}`"),
            Some("every branch of a match must produce the same type.".to_owned()),
        ),
        Diagnostic::NumberPrecisionMismatch { first, second, .. } => (
            format!("conflicting number precisions: `{first}` and `{second}`"),
            None,
        ),
        Diagnostic::UnusedBranch { .. } => (
            "this branch can never be taken".to_owned(),
            Some("an earlier branch already matches every value this one would.".to_owned()),
        ),
    }
}

/// Render one diagnostic as a plain-text block with the source excerpt.
pub fn render(diagnostic: &Diagnostic, env: &ModuleEnv, filename: &str) -> String {
    let report = report_for(diagnostic, env);
    let (line, col) = env.line_col(report.region.start);
    let line_text = env.line_text(line);

    let mut out = String::new();
    let _ = writeln!(out, "{} [{}]", report.headline(), report.tag);
    let _ = writeln!(out, "  --> {}:{}:{}", filename, line + 1, col + 1);

    let gutter = format!("{}", line + 1);
    let _ = writeln!(out, "{} | {}", gutter, line_text);

    // Underline the part of the region that falls on this line.
    let len = (report.region.len() as usize).max(1).min(line_text.len().saturating_sub(col).max(1));
    let _ = writeln!(
        out,
        "{} | {}{}",
        " ".repeat(gutter.len()),
        " ".repeat(col),
        "^".repeat(len)
    );

    if let Some(hint) = &report.hint {
        let _ = writeln!(out, "hint: {hint}");
    }
    out
}

/// Render every diagnostic on the env, in emission order.
pub fn render_all(env: &ModuleEnv, filename: &str) -> String {
    let mut out = String::new();
    for diagnostic in &env.diagnostics {
        out.push_str(&render(diagnostic, env, filename));
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rill_ir::{Region, Severity};

    #[test]
    fn report_fills_in_ident_text() {
        let mut env = ModuleEnv::new("foo = bar");
        let bar = env.idents.intern("bar");
        let diag = Diagnostic::IdentNotInScope {
            ident: bar,
            region: Region::new(6, 9),
        };
        let report = report_for(&diag, &env);
        assert_eq!(report.severity, Severity::Error);
        assert_eq!(report.message, "nothing named `bar` is in scope");
        assert_eq!(report.tag, "ident_not_in_scope");
    }

    #[test]
    fn render_includes_excerpt_and_caret() {
        let mut env = ModuleEnv::new("x = 1\ny = oops\n");
        let oops = env.idents.intern("oops");
        let diag = Diagnostic::IdentNotInScope {
            ident: oops,
            region: Region::new(10, 14),
        };
        let text = render(&diag, &env, "Main.rill");
        assert!(text.contains("Main.rill:2:5"));
        assert!(text.contains("y = oops"));
        assert!(text.contains("^^^^"));
        assert!(text.contains("hint:"));
    }
}
