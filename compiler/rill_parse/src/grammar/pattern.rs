//! Pattern parsing.

use crate::{ParseContext, Parser};
use rill_ir::ast::{ListRest, MalformedReason, PatternKind, PatternRecordField};
use rill_ir::{ast, TokenKind};
use rill_stack::grow_stack;

impl Parser<'_> {
    /// Parse one pattern.
    pub(crate) fn pattern(&mut self) -> ast::PatternIdx {
        grow_stack(|| self.pattern_inner())
    }

    fn pattern_inner(&mut self) -> ast::PatternIdx {
        let token = self.cursor.peek(self.nl());
        match token.kind {
            TokenKind::LowerIdent(name) => {
                self.cursor.advance(self.nl());
                self.store.alloc_pattern(PatternKind::Ident(name), token.region)
            }
            TokenKind::Underscore => {
                self.cursor.advance(self.nl());
                self.store.alloc_pattern(PatternKind::Underscore, token.region)
            }
            TokenKind::Int { value, .. } => {
                self.cursor.advance(self.nl());
                self.store.alloc_pattern(PatternKind::Int { value }, token.region)
            }
            TokenKind::Frac { bits, .. } => {
                self.cursor.advance(self.nl());
                self.store.alloc_pattern(PatternKind::Frac { bits }, token.region)
            }
            TokenKind::OpMinus => {
                // Negative literal pattern.
                self.cursor.advance(self.nl());
                let inner = self.cursor.peek(self.nl());
                match inner.kind {
                    TokenKind::Int { value, .. } => {
                        self.cursor.advance(self.nl());
                        self.store.alloc_pattern(
                            PatternKind::Int { value: -value },
                            token.region.merge(inner.region),
                        )
                    }
                    TokenKind::Frac { bits, .. } => {
                        self.cursor.advance(self.nl());
                        self.store.alloc_pattern(
                            PatternKind::Frac {
                                bits: (-f64::from_bits(bits)).to_bits(),
                            },
                            token.region.merge(inner.region),
                        )
                    }
                    _ => self.malformed_pattern(
                        MalformedReason::PatternUnexpectedToken,
                        token.region.merge(inner.region),
                    ),
                }
            }
            TokenKind::SingleQuote(scalar) => {
                self.cursor.advance(self.nl());
                self.store
                    .alloc_pattern(PatternKind::SingleQuote(scalar), token.region)
            }
            TokenKind::StrBegin => self.str_pattern(),
            TokenKind::UpperIdent(_) => self.tag_pattern(),
            TokenKind::OpenRound => self.tuple_pattern(),
            TokenKind::OpenCurly => self.record_pattern(),
            TokenKind::OpenSquare => self.list_pattern(),
            TokenKind::EndOfFile => {
                self.malformed_pattern(MalformedReason::PatternUnexpectedToken, token.region)
            }
            _ => {
                self.cursor.advance(self.nl());
                self.malformed_pattern(MalformedReason::PatternUnexpectedToken, token.region)
            }
        }
    }

    /// A plain string pattern; interpolation is not a pattern.
    fn str_pattern(&mut self) -> ast::PatternIdx {
        let begin = self.cursor.advance(self.nl());
        let lit = match self.cursor.peek(false).kind {
            TokenKind::StrPart(lit) => {
                self.cursor.advance(false);
                lit
            }
            TokenKind::StrEnd => self.env.strings.insert(String::new()),
            _ => {
                let region = self.cursor.peek_region(false);
                let pattern =
                    self.malformed_pattern(MalformedReason::PatternUnexpectedToken, region);
                self.cursor.recover_to_stmt_boundary();
                return pattern;
            }
        };
        let end = match self.cursor.eat(TokenKind::StrEnd, false) {
            Some(token) => token.region,
            None => {
                let region = self.cursor.peek_region(false);
                return self.malformed_pattern(MalformedReason::PatternUnexpectedToken, region);
            }
        };
        self.store
            .alloc_pattern(PatternKind::Str(lit), begin.region.merge(end))
    }

    /// `Tag` or `Tag(p1, p2)`.
    fn tag_pattern(&mut self) -> ast::PatternIdx {
        let token = self.cursor.advance(self.nl());
        let TokenKind::UpperIdent(name) = token.kind else {
            return self.malformed_pattern(MalformedReason::PatternUnexpectedToken, token.region);
        };
        let mut region = token.region;
        let mut args = Vec::new();
        if self.cursor.at(TokenKind::OpenRound, self.nl())
            && self.cursor.peek(self.nl()).region.start == region.end
        {
            self.cursor.advance(self.nl());
            self.with_context(ParseContext::IGNORE_NEWLINES, |p| loop {
                if let Some(close) = p.cursor.eat(TokenKind::CloseRound, true) {
                    region = region.merge(close.region);
                    break;
                }
                if p.cursor.at_eof() {
                    let at = p.cursor.peek_region(true);
                    args.push(p.malformed_pattern(MalformedReason::ExpectedPatternClose, at));
                    break;
                }
                args.push(p.pattern());
                if p.cursor.eat(TokenKind::Comma, true).is_none()
                    && !p.cursor.at(TokenKind::CloseRound, true)
                {
                    let at = p.cursor.peek_region(true);
                    args.push(p.malformed_pattern(MalformedReason::ExpectedPatternClose, at));
                    p.cursor.recover_to_stmt_boundary();
                    break;
                }
            });
        }
        let args = self.store.alloc_pattern_span(args);
        self.store.alloc_pattern(PatternKind::Tag { name, args }, region)
    }

    /// `(p, p)` tuple pattern, or plain grouping for a single pattern.
    fn tuple_pattern(&mut self) -> ast::PatternIdx {
        let open = self.cursor.advance(self.nl());
        self.with_context(ParseContext::IGNORE_NEWLINES, |p| {
            let mut items = Vec::new();
            let mut region = open.region;
            loop {
                if let Some(close) = p.cursor.eat(TokenKind::CloseRound, true) {
                    region = region.merge(close.region);
                    break;
                }
                if p.cursor.at_eof() {
                    let at = p.cursor.peek_region(true);
                    items.push(p.malformed_pattern(MalformedReason::ExpectedPatternClose, at));
                    break;
                }
                items.push(p.pattern());
                if p.cursor.eat(TokenKind::Comma, true).is_none()
                    && !p.cursor.at(TokenKind::CloseRound, true)
                {
                    let at = p.cursor.peek_region(true);
                    items.push(p.malformed_pattern(MalformedReason::ExpectedPatternClose, at));
                    p.cursor.recover_to_stmt_boundary();
                    break;
                }
            }
            if items.len() == 1 {
                items[0]
            } else {
                let items = p.store.alloc_pattern_span(items);
                p.store.alloc_pattern(PatternKind::Tuple { items }, region)
            }
        })
    }

    /// `{ x, y: pat }` record destructure.
    fn record_pattern(&mut self) -> ast::PatternIdx {
        let open = self.cursor.advance(self.nl());
        self.with_context(ParseContext::IGNORE_NEWLINES, |p| {
            let mut fields = Vec::new();
            let mut region = open.region;
            loop {
                if let Some(close) = p.cursor.eat(TokenKind::CloseCurly, true) {
                    region = region.merge(close.region);
                    break;
                }
                let token = p.cursor.peek(true);
                let TokenKind::LowerIdent(name) = token.kind else {
                    let pattern =
                        p.malformed_pattern(MalformedReason::ExpectedPatternClose, token.region);
                    p.cursor.recover_to_stmt_boundary();
                    return pattern;
                };
                p.cursor.advance(true);
                let sub = if p.cursor.eat(TokenKind::Colon, true).is_some() {
                    Some(p.pattern())
                } else {
                    None
                };
                fields.push(PatternRecordField {
                    name,
                    region: token.region,
                    sub,
                });
                if p.cursor.eat(TokenKind::Comma, true).is_none()
                    && !p.cursor.at(TokenKind::CloseCurly, true)
                {
                    let pattern = p.malformed_pattern(
                        MalformedReason::ExpectedPatternClose,
                        p.cursor.peek_region(true),
                    );
                    p.cursor.recover_to_stmt_boundary();
                    return pattern;
                }
            }
            let fields = p.store.alloc_pattern_fields(fields);
            p.store.alloc_pattern(PatternKind::Record { fields }, region)
        })
    }

    /// `[a, b]`, `[first, ..]`, `[first, .. as rest, last]`.
    fn list_pattern(&mut self) -> ast::PatternIdx {
        let open = self.cursor.advance(self.nl());
        self.with_context(ParseContext::IGNORE_NEWLINES, |p| {
            let mut before = Vec::new();
            let mut after = Vec::new();
            let mut rest: Option<ListRest> = None;
            let mut region = open.region;
            loop {
                if let Some(close) = p.cursor.eat(TokenKind::CloseSquare, true) {
                    region = region.merge(close.region);
                    break;
                }
                if p.cursor.at_eof() {
                    let at = p.cursor.peek_region(true);
                    before.push(p.malformed_pattern(MalformedReason::ExpectedPatternClose, at));
                    break;
                }
                if p.cursor.eat(TokenKind::DoubleDot, true).is_some() {
                    let mut name = None;
                    if p.cursor.eat(TokenKind::KwAs, true).is_some() {
                        if let TokenKind::LowerIdent(bound) = p.cursor.peek(true).kind {
                            p.cursor.advance(true);
                            name = Some(bound);
                        }
                    }
                    if rest.is_some() {
                        // Two rests in one list pattern.
                        let at = p.cursor.peek_region(true);
                        before.push(
                            p.malformed_pattern(MalformedReason::PatternUnexpectedToken, at),
                        );
                    }
                    rest = Some(ListRest { name });
                } else {
                    let item = p.pattern();
                    if rest.is_some() {
                        after.push(item);
                    } else {
                        before.push(item);
                    }
                }
                if p.cursor.eat(TokenKind::Comma, true).is_none()
                    && !p.cursor.at(TokenKind::CloseSquare, true)
                {
                    let at = p.cursor.peek_region(true);
                    before.push(p.malformed_pattern(MalformedReason::ExpectedPatternClose, at));
                    p.cursor.recover_to_stmt_boundary();
                    break;
                }
            }
            let before = p.store.alloc_pattern_span(before);
            let after = p.store.alloc_pattern_span(after);
            p.store
                .alloc_pattern(PatternKind::List { before, rest, after }, region)
        })
    }
}
