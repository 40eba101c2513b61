//! Lexer for Rill.
//!
//! Raw token recognition is a `logos` state machine; a driving wrapper adds
//! the two things regular tokens can't express:
//!
//! - **String modes**: `"…"` and `"""…"""` bodies are scanned by hand so
//!   that `${expr}` interpolation boundaries become real tokens
//!   (`StrBegin`, `StrPart`, `InterpOpen` … `InterpClose`, `StrEnd`) and the
//!   parser can nest expression subtrees between the literal parts.
//! - **Tight-dot synthesis**: `.foo` / `.0` immediately following a value
//!   token become `NoSpaceDotLowerIdent` / `NoSpaceDotInt` access tokens.
//!
//! The lexer is total: every input produces a token stream ending in
//! `EndOfFile`, with problems reported as diagnostics on the `ModuleEnv`,
//! never as failures.

mod escape;
#[cfg(test)]
mod tests;

use escape::{scalar_content, unescape_str};
use logos::Logos;
use rill_ir::{Base, Diagnostic, ModuleEnv, NumSuffix, Region, Token, TokenKind, TokenList};

/// Raw token recognized by logos, before interning and mode handling.
#[derive(Logos, Debug, Clone, Copy, PartialEq)]
#[logos(skip r"[ \t\r]+")]
enum RawToken {
    #[regex(r"#[^\n]*")]
    Comment,

    #[token("\n")]
    Newline,

    // Keywords
    #[token("module")]
    KwModule,
    #[token("app")]
    KwApp,
    #[token("package")]
    KwPackage,
    #[token("platform")]
    KwPlatform,
    #[token("hosted")]
    KwHosted,
    #[token("import")]
    KwImport,
    #[token("expect")]
    KwExpect,
    #[token("crash")]
    KwCrash,
    #[token("if")]
    KwIf,
    #[token("else")]
    KwElse,
    #[token("match")]
    KwMatch,
    #[token("and")]
    KwAnd,
    #[token("or")]
    KwOr,
    #[token("as")]
    KwAs,

    // Punctuation
    #[token("(")]
    OpenRound,
    #[token(")")]
    CloseRound,
    #[token("[")]
    OpenSquare,
    #[token("]")]
    CloseSquare,
    #[token("{")]
    OpenCurly,
    #[token("}")]
    CloseCurly,
    #[token(",")]
    Comma,
    #[token("...")]
    TripleDot,
    #[token("..")]
    DoubleDot,
    #[token(".")]
    Dot,
    #[token(":=")]
    ColonEq,
    #[token(":")]
    Colon,
    #[token("->")]
    Arrow,
    #[token("=>")]
    FatArrow,
    #[token("|>")]
    OpPizza,
    #[token("|")]
    Bar,
    #[token("_", priority = 3)]
    Underscore,

    // Operators
    #[token("==")]
    OpEquals,
    #[token("=")]
    OpAssign,
    #[token("!=")]
    OpNotEquals,
    #[token("!")]
    OpBang,
    #[token("<=")]
    OpLtEq,
    #[token("<")]
    OpLt,
    #[token(">=")]
    OpGtEq,
    #[token(">")]
    OpGt,
    #[token("+")]
    OpPlus,
    #[token("-")]
    OpMinus,
    #[token("*")]
    OpStar,
    #[token("//")]
    OpDoubleSlash,
    #[token("/")]
    OpSlash,
    #[token("%")]
    OpPercent,

    // String openers; bodies are scanned by hand in the driver.
    #[token("\"\"\"")]
    MultilineStrStart,
    #[token("\"")]
    StrStart,

    // Single-quoted scalar literal, closing quote optional (validated later).
    #[regex(r"'([^'\\\n]|\\.)*'", priority = 4)]
    SingleQuoteLit,
    #[regex(r"'([^'\\\n]|\\.)*")]
    UnterminatedSingleQuote,

    // Identifiers. Lower idents may end in `!`.
    #[regex(r"[a-z_][a-zA-Z0-9_]*!?")]
    LowerIdent,
    #[regex(r"[A-Z][a-zA-Z0-9_]*")]
    UpperIdent,

    // Numbers. Suffix text is captured loosely and validated by hand so bad
    // suffixes become diagnostics instead of token splits.
    #[regex(r"0x[0-9a-fA-F_]+([iu][0-9]+)?", priority = 5)]
    HexInt,
    #[regex(r"0b[01_]+([iu][0-9]+)?", priority = 5)]
    BinInt,
    #[regex(r"[0-9][0-9_]*\.[0-9][0-9_]*([eE][+-]?[0-9]+)?([a-zA-Z][a-zA-Z0-9]*)?", priority = 4)]
    Frac,
    #[regex(r"[0-9][0-9_]*[eE][+-]?[0-9]+([a-zA-Z][a-zA-Z0-9]*)?", priority = 4)]
    FracSci,
    #[regex(r"[0-9][0-9_]*([a-zA-Z][a-zA-Z0-9]*)?", priority = 3)]
    Int,
}

/// An open string literal whose body scan was interrupted by `${`.
struct StrMode {
    multiline: bool,
    /// Braces opened inside the interpolation that must close before the
    /// interpolation itself does.
    brace_depth: u32,
    open_region: Region,
}

/// Lex `env.source` into a token list, recording tokenize diagnostics.
pub fn lex(env: &mut ModuleEnv) -> TokenList {
    let source = std::mem::take(&mut env.source);
    let tokens = lex_into(&source, env);
    env.source = source;
    tokens
}

fn lex_into(source: &str, env: &mut ModuleEnv) -> TokenList {
    let mut out = TokenList::with_source_len(source.len());
    let mut logos = RawToken::lexer(source);
    let mut interp_stack: Vec<StrMode> = Vec::new();
    let mut prev_end: u32 = 0;
    // A `.` waiting to see whether it fuses into a tight access token.
    let mut pending_dot: Option<(Region, bool)> = None;

    while let Some(result) = logos.next() {
        let region = Region::from_range(logos.span());
        let slice = logos.slice();

        let raw = match result {
            Ok(raw) => raw,
            Err(()) => {
                flush_dot(&mut pending_dot, &mut out, &mut prev_end);
                env.push_diagnostic(Diagnostic::UnknownToken { region });
                push(&mut out, &mut prev_end, TokenKind::Error, region);
                continue;
            }
        };

        // Resolve a pending `.` against this token.
        if let Some((dot_region, tight_left)) = pending_dot.take() {
            let tight_right = region.start == dot_region.end;
            if tight_left && tight_right {
                match raw {
                    RawToken::LowerIdent => {
                        let ident = env.idents.intern(slice);
                        push(
                            &mut out,
                            &mut prev_end,
                            TokenKind::NoSpaceDotLowerIdent(ident),
                            dot_region.merge(region),
                        );
                        continue;
                    }
                    RawToken::Int if slice.bytes().all(|b| b.is_ascii_digit()) => {
                        let index = slice.parse::<u32>().unwrap_or(u32::MAX);
                        push(
                            &mut out,
                            &mut prev_end,
                            TokenKind::NoSpaceDotInt(index),
                            dot_region.merge(region),
                        );
                        continue;
                    }
                    _ => {}
                }
            }
            push(&mut out, &mut prev_end, TokenKind::Dot, dot_region);
        }

        match raw {
            RawToken::Dot => {
                let tight_left = region.start == prev_end;
                pending_dot = Some((region, tight_left));
            }
            RawToken::StrStart => {
                push(&mut out, &mut prev_end, TokenKind::StrBegin, region);
                scan_string_body(false, region, &mut logos, env, &mut out, &mut prev_end, &mut interp_stack);
            }
            RawToken::MultilineStrStart => {
                push(&mut out, &mut prev_end, TokenKind::MultilineStrBegin, region);
                scan_string_body(true, region, &mut logos, env, &mut out, &mut prev_end, &mut interp_stack);
            }
            RawToken::OpenCurly => {
                if let Some(mode) = interp_stack.last_mut() {
                    mode.brace_depth += 1;
                }
                push(&mut out, &mut prev_end, TokenKind::OpenCurly, region);
            }
            RawToken::CloseCurly => {
                let closes_interp =
                    matches!(interp_stack.last(), Some(mode) if mode.brace_depth == 0);
                if closes_interp {
                    push(&mut out, &mut prev_end, TokenKind::InterpClose, region);
                    if let Some(mode) = interp_stack.pop() {
                        scan_string_body(
                            mode.multiline,
                            mode.open_region,
                            &mut logos,
                            env,
                            &mut out,
                            &mut prev_end,
                            &mut interp_stack,
                        );
                    }
                } else {
                    if let Some(mode) = interp_stack.last_mut() {
                        mode.brace_depth -= 1;
                    }
                    push(&mut out, &mut prev_end, TokenKind::CloseCurly, region);
                }
            }
            other => {
                let kind = convert(other, slice, region, env);
                push(&mut out, &mut prev_end, kind, region);
            }
        }
    }

    flush_dot(&mut pending_dot, &mut out, &mut prev_end);
    for mode in interp_stack.drain(..) {
        env.push_diagnostic(Diagnostic::UnclosedInterpolation {
            region: mode.open_region,
        });
    }

    let eof = Region::point(rill_ir::to_u32(source.len(), "source"));
    out.push(Token::new(TokenKind::EndOfFile, eof));
    out
}

#[inline]
fn push(out: &mut TokenList, prev_end: &mut u32, kind: TokenKind, region: Region) {
    *prev_end = region.end;
    out.push(Token::new(kind, region));
}

fn flush_dot(pending: &mut Option<(Region, bool)>, out: &mut TokenList, prev_end: &mut u32) {
    if let Some((region, _)) = pending.take() {
        push(out, prev_end, TokenKind::Dot, region);
    }
}

/// Scan a string body from the current logos position up to the closing
/// quote, the next `${`, or an error boundary. Consumes the scanned bytes.
#[allow(clippy::too_many_arguments)]
fn scan_string_body(
    multiline: bool,
    open_region: Region,
    logos: &mut logos::Lexer<'_, RawToken>,
    env: &mut ModuleEnv,
    out: &mut TokenList,
    prev_end: &mut u32,
    interp_stack: &mut Vec<StrMode>,
) {
    let rem = logos.remainder();
    let base = logos.span().end;
    let mut bytes = rem.char_indices().peekable();

    while let Some((i, c)) = bytes.next() {
        match c {
            '\\' => {
                bytes.next();
            }
            '\n' if !multiline => {
                emit_part(&rem[..i], base, i, env, out, prev_end);
                env.push_diagnostic(Diagnostic::UnclosedString { region: open_region });
                let at = rill_ir::to_u32(base + i, "source");
                push(out, prev_end, TokenKind::StrEnd, Region::point(at));
                logos.bump(i);
                return;
            }
            '"' => {
                let is_close = !multiline || rem[i..].starts_with("\"\"\"");
                if is_close {
                    let quote_len = if multiline { 3 } else { 1 };
                    emit_part(&rem[..i], base, i, env, out, prev_end);
                    let start = rill_ir::to_u32(base + i, "source");
                    let end = rill_ir::to_u32(base + i + quote_len, "source");
                    push(out, prev_end, TokenKind::StrEnd, Region::new(start, end));
                    logos.bump(i + quote_len);
                    return;
                }
            }
            '$' => {
                if let Some(&(_, '{')) = bytes.peek() {
                    emit_part(&rem[..i], base, i, env, out, prev_end);
                    let start = rill_ir::to_u32(base + i, "source");
                    let end = rill_ir::to_u32(base + i + 2, "source");
                    push(out, prev_end, TokenKind::InterpOpen, Region::new(start, end));
                    logos.bump(i + 2);
                    interp_stack.push(StrMode {
                        multiline,
                        brace_depth: 0,
                        open_region,
                    });
                    return;
                }
            }
            _ => {}
        }
    }

    // End of file inside the string.
    emit_part(rem, base, rem.len(), env, out, prev_end);
    env.push_diagnostic(Diagnostic::UnclosedString { region: open_region });
    let at = rill_ir::to_u32(base + rem.len(), "source");
    push(out, prev_end, TokenKind::StrEnd, Region::point(at));
    logos.bump(rem.len());
}

fn emit_part(
    raw: &str,
    base: usize,
    len: usize,
    env: &mut ModuleEnv,
    out: &mut TokenList,
    prev_end: &mut u32,
) {
    if raw.is_empty() {
        return;
    }
    let lit = env.strings.insert(unescape_str(raw));
    let start = rill_ir::to_u32(base, "source");
    let end = rill_ir::to_u32(base + len, "source");
    push(out, prev_end, TokenKind::StrPart(lit), Region::new(start, end));
}

/// Convert a simple raw token, interning and validating as needed.
fn convert(raw: RawToken, slice: &str, region: Region, env: &mut ModuleEnv) -> TokenKind {
    match raw {
        RawToken::Comment => TokenKind::Comment,
        RawToken::Newline => TokenKind::Newline,

        RawToken::KwModule => TokenKind::KwModule,
        RawToken::KwApp => TokenKind::KwApp,
        RawToken::KwPackage => TokenKind::KwPackage,
        RawToken::KwPlatform => TokenKind::KwPlatform,
        RawToken::KwHosted => TokenKind::KwHosted,
        RawToken::KwImport => TokenKind::KwImport,
        RawToken::KwExpect => TokenKind::KwExpect,
        RawToken::KwCrash => TokenKind::KwCrash,
        RawToken::KwIf => TokenKind::KwIf,
        RawToken::KwElse => TokenKind::KwElse,
        RawToken::KwMatch => TokenKind::KwMatch,
        RawToken::KwAnd => TokenKind::KwAnd,
        RawToken::KwOr => TokenKind::KwOr,
        RawToken::KwAs => TokenKind::KwAs,

        RawToken::OpenRound => TokenKind::OpenRound,
        RawToken::CloseRound => TokenKind::CloseRound,
        RawToken::OpenSquare => TokenKind::OpenSquare,
        RawToken::CloseSquare => TokenKind::CloseSquare,
        RawToken::OpenCurly => TokenKind::OpenCurly,
        RawToken::CloseCurly => TokenKind::CloseCurly,
        RawToken::Comma => TokenKind::Comma,
        RawToken::TripleDot => TokenKind::TripleDot,
        RawToken::DoubleDot => TokenKind::DoubleDot,
        RawToken::Dot => TokenKind::Dot,
        RawToken::ColonEq => TokenKind::ColonEq,
        RawToken::Colon => TokenKind::Colon,
        RawToken::Arrow => TokenKind::Arrow,
        RawToken::FatArrow => TokenKind::FatArrow,
        RawToken::OpPizza => TokenKind::OpPizza,
        RawToken::Bar => TokenKind::Bar,
        RawToken::Underscore => TokenKind::Underscore,

        RawToken::OpEquals => TokenKind::OpEquals,
        RawToken::OpAssign => TokenKind::OpAssign,
        RawToken::OpNotEquals => TokenKind::OpNotEquals,
        RawToken::OpBang => TokenKind::OpBang,
        RawToken::OpLtEq => TokenKind::OpLtEq,
        RawToken::OpLt => TokenKind::OpLt,
        RawToken::OpGtEq => TokenKind::OpGtEq,
        RawToken::OpGt => TokenKind::OpGt,
        RawToken::OpPlus => TokenKind::OpPlus,
        RawToken::OpMinus => TokenKind::OpMinus,
        RawToken::OpStar => TokenKind::OpStar,
        RawToken::OpDoubleSlash => TokenKind::OpDoubleSlash,
        RawToken::OpSlash => TokenKind::OpSlash,
        RawToken::OpPercent => TokenKind::OpPercent,

        RawToken::LowerIdent => TokenKind::LowerIdent(env.idents.intern(slice)),
        RawToken::UpperIdent => TokenKind::UpperIdent(env.idents.intern(slice)),

        RawToken::SingleQuoteLit => {
            let inner = &slice[1..slice.len() - 1];
            let (count, first) = scalar_content(inner);
            match (count, first) {
                (1, Some(c)) => TokenKind::SingleQuote(c as u32),
                (0, _) => {
                    env.push_diagnostic(Diagnostic::EmptySingleQuote { region });
                    TokenKind::Error
                }
                _ => {
                    env.push_diagnostic(Diagnostic::TooLongSingleQuote { region });
                    TokenKind::Error
                }
            }
        }
        RawToken::UnterminatedSingleQuote => {
            env.push_diagnostic(Diagnostic::UnknownToken { region });
            TokenKind::Error
        }

        RawToken::HexInt => parse_radix_int(slice, 16, Base::Hex, region, env),
        RawToken::BinInt => parse_radix_int(slice, 2, Base::Binary, region, env),
        RawToken::Int => parse_decimal_int(slice, region, env),
        RawToken::Frac | RawToken::FracSci => parse_frac(slice, region, env),

        // Handled by the driver before `convert` is reached.
        RawToken::StrStart | RawToken::MultilineStrStart => TokenKind::Error,
    }
}

/// Split `slice` into numeric text and trailing suffix text at the first
/// character `is_digit` rejects.
fn split_at_suffix(slice: &str, is_digit: impl Fn(char) -> bool) -> (&str, &str) {
    let split = slice
        .char_indices()
        .find(|&(_, c)| !is_digit(c) && c != '_')
        .map_or(slice.len(), |(i, _)| i);
    slice.split_at(split)
}

fn validate_suffix(
    suffix_text: &str,
    region: Region,
    env: &mut ModuleEnv,
) -> Option<NumSuffix> {
    if suffix_text.is_empty() {
        return None;
    }
    match NumSuffix::from_str(suffix_text) {
        Some(suffix) => Some(suffix),
        None => {
            env.push_diagnostic(Diagnostic::InvalidNumberSuffix { region });
            None
        }
    }
}

fn parse_radix_int(
    slice: &str,
    radix: u32,
    base: Base,
    region: Region,
    env: &mut ModuleEnv,
) -> TokenKind {
    let body = &slice[2..]; // past `0x` / `0b`
    let (digits, suffix_text) = split_at_suffix(body, |c| c.is_digit(radix));
    let cleaned: String = digits.chars().filter(|&c| c != '_').collect();
    let value = u128::from_str_radix(&cleaned, radix)
        .map(|v| i128::try_from(v).unwrap_or(i128::MAX))
        .unwrap_or(i128::MAX);
    let suffix = validate_suffix(suffix_text, region, env);
    TokenKind::Int { value, base, suffix }
}

fn parse_decimal_int(slice: &str, region: Region, env: &mut ModuleEnv) -> TokenKind {
    let (digits, suffix_text) = split_at_suffix(slice, |c| c.is_ascii_digit());
    if digits.len() > 1 && digits.starts_with('0') {
        env.push_diagnostic(Diagnostic::LeadingZero { region });
    }
    let cleaned: String = digits.chars().filter(|&c| c != '_').collect();
    let value = cleaned.parse::<i128>().unwrap_or(i128::MAX);
    let suffix = validate_suffix(suffix_text, region, env);
    TokenKind::Int {
        value,
        base: Base::Decimal,
        suffix,
    }
}

fn parse_frac(slice: &str, region: Region, env: &mut ModuleEnv) -> TokenKind {
    // Numeric part: digits, optional `.digits`, optional exponent.
    let mut end = 0;
    let bytes = slice.as_bytes();
    while end < bytes.len() && (bytes[end].is_ascii_digit() || bytes[end] == b'_') {
        end += 1;
    }
    if end < bytes.len() && bytes[end] == b'.' {
        end += 1;
        while end < bytes.len() && (bytes[end].is_ascii_digit() || bytes[end] == b'_') {
            end += 1;
        }
    }
    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut probe = end + 1;
        if probe < bytes.len() && (bytes[probe] == b'+' || bytes[probe] == b'-') {
            probe += 1;
        }
        if probe < bytes.len() && bytes[probe].is_ascii_digit() {
            end = probe;
            while end < bytes.len() && bytes[end].is_ascii_digit() {
                end += 1;
            }
        }
    }
    let (number, suffix_text) = slice.split_at(end);
    let cleaned: String = number.chars().filter(|&c| c != '_').collect();
    let value = cleaned.parse::<f64>().unwrap_or(f64::NAN);
    let suffix = validate_suffix(suffix_text, region, env);
    TokenKind::Frac {
        bits: value.to_bits(),
        suffix,
    }
}
