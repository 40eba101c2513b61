use crate::lex;
use pretty_assertions::assert_eq;
use rill_ir::{Base, Diagnostic, ModuleEnv, NumSuffix, TokenKind};

fn kinds(source: &str) -> (Vec<TokenKind>, ModuleEnv) {
    let mut env = ModuleEnv::new(source);
    let tokens = lex(&mut env);
    (tokens.iter().map(|t| t.kind).collect(), env)
}

#[test]
fn basic_definition() {
    let (kinds, env) = kinds("x = 42");
    assert_eq!(kinds.len(), 4);
    assert!(matches!(kinds[0], TokenKind::LowerIdent(_)));
    assert_eq!(kinds[1], TokenKind::OpAssign);
    assert!(matches!(
        kinds[2],
        TokenKind::Int {
            value: 42,
            base: Base::Decimal,
            suffix: None,
        }
    ));
    assert_eq!(kinds[3], TokenKind::EndOfFile);
    assert!(env.diagnostics.is_empty());
}

#[test]
fn ends_in_eof_and_covers_all_bytes() {
    let source = "foo(1, 2)\n";
    let mut env = ModuleEnv::new(source);
    let tokens = lex(&mut env);
    let last = tokens.get(tokens.len() - 1);
    assert_eq!(last.kind, TokenKind::EndOfFile);
    assert_eq!(last.region.start as usize, source.len());
    // Every token's region is a contiguous substring of the source.
    for token in tokens.iter() {
        let region = token.region;
        assert!(region.end as usize <= source.len());
        assert!(region.start <= region.end);
    }
}

#[test]
fn newlines_and_comments_are_tokens() {
    let (kinds, _) = kinds("x # trailing\ny");
    assert!(matches!(kinds[0], TokenKind::LowerIdent(_)));
    assert_eq!(kinds[1], TokenKind::Comment);
    assert_eq!(kinds[2], TokenKind::Newline);
    assert!(matches!(kinds[3], TokenKind::LowerIdent(_)));
}

#[test]
fn upper_and_lower_idents_split() {
    let (kinds, env) = kinds("Maybe just_x ok!");
    assert!(matches!(kinds[0], TokenKind::UpperIdent(_)));
    assert!(matches!(kinds[1], TokenKind::LowerIdent(_)));
    let TokenKind::LowerIdent(bang) = kinds[2] else {
        panic!("expected lower ident, got {:?}", kinds[2]);
    };
    assert_eq!(env.idents.text(bang), "ok!");
}

#[test]
fn numeric_bases_and_suffixes() {
    let (kinds, env) = kinds("0x1F 0b101 7u8 2.5dec 1e3");
    assert!(matches!(
        kinds[0],
        TokenKind::Int { value: 31, base: Base::Hex, suffix: None }
    ));
    assert!(matches!(
        kinds[1],
        TokenKind::Int { value: 5, base: Base::Binary, suffix: None }
    ));
    assert!(matches!(
        kinds[2],
        TokenKind::Int { value: 7, suffix: Some(NumSuffix::U8), .. }
    ));
    assert!(matches!(
        kinds[3],
        TokenKind::Frac { suffix: Some(NumSuffix::Dec), .. }
    ));
    // Scientific notation produces a fractional literal.
    let TokenKind::Frac { bits, suffix: None } = kinds[4] else {
        panic!("expected frac, got {:?}", kinds[4]);
    };
    assert_eq!(f64::from_bits(bits), 1000.0);
    assert!(env.diagnostics.is_empty());
}

#[test]
fn leading_zero_is_a_diagnostic() {
    let (kinds, env) = kinds("007");
    assert!(matches!(kinds[0], TokenKind::Int { value: 7, .. }));
    assert!(matches!(env.diagnostics[0], Diagnostic::LeadingZero { .. }));
}

#[test]
fn zero_itself_is_fine() {
    let (_, env) = kinds("0");
    assert!(env.diagnostics.is_empty());
}

#[test]
fn invalid_suffix_is_a_diagnostic() {
    let (kinds, env) = kinds("5q32");
    assert!(matches!(kinds[0], TokenKind::Int { value: 5, suffix: None, .. }));
    assert!(matches!(
        env.diagnostics[0],
        Diagnostic::InvalidNumberSuffix { .. }
    ));
}

#[test]
fn single_quote_scalars() {
    let (kinds, env) = kinds("'x' '\\n'");
    assert_eq!(kinds[0], TokenKind::SingleQuote('x' as u32));
    assert_eq!(kinds[1], TokenKind::SingleQuote('\n' as u32));
    assert!(env.diagnostics.is_empty());
}

#[test]
fn empty_single_quote_diagnostic() {
    let (kinds, env) = kinds("''");
    assert_eq!(kinds[0], TokenKind::Error);
    assert!(matches!(
        env.diagnostics[0],
        Diagnostic::EmptySingleQuote { .. }
    ));
}

#[test]
fn too_long_single_quote_diagnostic() {
    let (kinds, env) = kinds("'ab'");
    assert_eq!(kinds[0], TokenKind::Error);
    assert!(matches!(
        env.diagnostics[0],
        Diagnostic::TooLongSingleQuote { .. }
    ));
}

#[test]
fn plain_string_tokens() {
    let (kinds, env) = kinds(r#""hello""#);
    assert_eq!(kinds[0], TokenKind::StrBegin);
    let TokenKind::StrPart(lit) = kinds[1] else {
        panic!("expected part, got {:?}", kinds[1]);
    };
    assert_eq!(env.strings.text(lit), "hello");
    assert_eq!(kinds[2], TokenKind::StrEnd);
    assert!(env.diagnostics.is_empty());
}

#[test]
fn string_interpolation_boundaries() {
    let (kinds, env) = kinds(r#""a${name}b""#);
    assert_eq!(kinds[0], TokenKind::StrBegin);
    assert!(matches!(kinds[1], TokenKind::StrPart(_)));
    assert_eq!(kinds[2], TokenKind::InterpOpen);
    assert!(matches!(kinds[3], TokenKind::LowerIdent(_)));
    assert_eq!(kinds[4], TokenKind::InterpClose);
    assert!(matches!(kinds[5], TokenKind::StrPart(_)));
    assert_eq!(kinds[6], TokenKind::StrEnd);
    assert!(env.diagnostics.is_empty());
}

#[test]
fn interpolation_with_nested_braces() {
    // A record literal inside an interpolation: inner braces must not close it.
    let (kinds, env) = kinds(r#""v: ${{x: 1}.x}""#);
    assert!(kinds.contains(&TokenKind::InterpOpen));
    assert!(kinds.contains(&TokenKind::OpenCurly));
    assert!(kinds.contains(&TokenKind::InterpClose));
    assert_eq!(kinds.iter().filter(|k| **k == TokenKind::StrEnd).count(), 1);
    assert!(env.diagnostics.is_empty());
}

#[test]
fn multiline_string() {
    let (kinds, env) = kinds("\"\"\"line1\nline2\"\"\"");
    assert_eq!(kinds[0], TokenKind::MultilineStrBegin);
    let TokenKind::StrPart(lit) = kinds[1] else {
        panic!("expected part, got {:?}", kinds[1]);
    };
    assert_eq!(env.strings.text(lit), "line1\nline2");
    assert_eq!(kinds[2], TokenKind::StrEnd);
}

#[test]
fn unclosed_string_recovers() {
    let (kinds, env) = kinds("\"abc\nx");
    assert!(matches!(
        env.diagnostics[0],
        Diagnostic::UnclosedString { .. }
    ));
    // The newline and following tokens still lex.
    assert!(kinds.contains(&TokenKind::Newline));
    assert_eq!(kinds[kinds.len() - 1], TokenKind::EndOfFile);
}

#[test]
fn dot_access_variants() {
    let (kinds, _) = kinds("rec.field tup.0 a..b ...");
    assert!(matches!(kinds[0], TokenKind::LowerIdent(_)));
    assert!(matches!(kinds[1], TokenKind::NoSpaceDotLowerIdent(_)));
    assert!(matches!(kinds[2], TokenKind::LowerIdent(_)));
    assert_eq!(kinds[3], TokenKind::NoSpaceDotInt(0));
    assert!(matches!(kinds[4], TokenKind::LowerIdent(_)));
    assert_eq!(kinds[5], TokenKind::DoubleDot);
    assert!(matches!(kinds[6], TokenKind::LowerIdent(_)));
    assert_eq!(kinds[7], TokenKind::TripleDot);
}

#[test]
fn loose_dot_stays_a_dot() {
    let (kinds, _) = kinds("a . b");
    assert_eq!(kinds[1], TokenKind::Dot);
}

#[test]
fn fat_arrow_and_pizza_distinct() {
    let (kinds, _) = kinds("=> |> | >=");
    assert_eq!(kinds[0], TokenKind::FatArrow);
    assert_eq!(kinds[1], TokenKind::OpPizza);
    assert_eq!(kinds[2], TokenKind::Bar);
    assert_eq!(kinds[3], TokenKind::OpGtEq);
}

#[test]
fn keywords() {
    let (kinds, _) = kinds("if else match and or as crash expect import module");
    assert_eq!(
        kinds[..10],
        [
            TokenKind::KwIf,
            TokenKind::KwElse,
            TokenKind::KwMatch,
            TokenKind::KwAnd,
            TokenKind::KwOr,
            TokenKind::KwAs,
            TokenKind::KwCrash,
            TokenKind::KwExpect,
            TokenKind::KwImport,
            TokenKind::KwModule,
        ]
    );
}

#[test]
fn unknown_byte_is_error_token_plus_diagnostic() {
    let (kinds, env) = kinds("x @ y");
    assert_eq!(kinds[1], TokenKind::Error);
    assert!(matches!(env.diagnostics[0], Diagnostic::UnknownToken { .. }));
    assert!(matches!(kinds[2], TokenKind::LowerIdent(_)));
}
