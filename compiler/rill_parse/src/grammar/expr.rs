//! Expression parsing: Pratt-style precedence climbing over a recursive
//! descent core.
//!
//! Precedence, low to high: `|>`; `or`; `and`; comparisons; `+ -`;
//! `* / // %`; unary `-` and `!`; application and field access.

use crate::{ParseContext, Parser};
use rill_ir::ast::{
    AstBinOp, AstUnaryOp, ExprKind, IfBranch, MalformedReason, MatchArm, RecordField,
};
use rill_ir::{ast, Region, TokenKind};
use rill_stack::grow_stack;

/// Left binding power for a binary operator token.
fn binop_bp(kind: TokenKind) -> Option<(AstBinOp, u8)> {
    Some(match kind {
        TokenKind::OpPizza => (AstBinOp::Pizza, 1),
        TokenKind::KwOr => (AstBinOp::Or, 2),
        TokenKind::KwAnd => (AstBinOp::And, 3),
        TokenKind::OpEquals => (AstBinOp::Eq, 4),
        TokenKind::OpNotEquals => (AstBinOp::Ne, 4),
        TokenKind::OpLt => (AstBinOp::Lt, 4),
        TokenKind::OpGt => (AstBinOp::Gt, 4),
        TokenKind::OpLtEq => (AstBinOp::Le, 4),
        TokenKind::OpGtEq => (AstBinOp::Ge, 4),
        TokenKind::OpPlus => (AstBinOp::Add, 5),
        TokenKind::OpMinus => (AstBinOp::Sub, 5),
        TokenKind::OpStar => (AstBinOp::Mul, 6),
        TokenKind::OpSlash => (AstBinOp::Div, 6),
        TokenKind::OpDoubleSlash => (AstBinOp::DivTrunc, 6),
        TokenKind::OpPercent => (AstBinOp::Rem, 6),
        _ => return None,
    })
}

impl Parser<'_> {
    /// Parse a full expression.
    pub(crate) fn expr(&mut self) -> ast::ExprIdx {
        self.expr_bp(0)
    }

    fn expr_bp(&mut self, min_bp: u8) -> ast::ExprIdx {
        grow_stack(|| {
            let mut lhs = self.unary();
            loop {
                let token = self.cursor.peek(self.nl());
                let Some((op, bp)) = binop_bp(token.kind) else { break };
                if bp <= min_bp {
                    break;
                }
                self.cursor.advance(self.nl());
                let rhs = self.expr_bp(bp);
                let region = self
                    .store
                    .expr_region(lhs)
                    .merge(self.store.expr_region(rhs));
                lhs = self.store.alloc_expr(ExprKind::BinOp { op, lhs, rhs }, region);
            }
            lhs
        })
    }

    fn unary(&mut self) -> ast::ExprIdx {
        let token = self.cursor.peek(self.nl());
        let op = match token.kind {
            TokenKind::OpMinus => Some(AstUnaryOp::Negate),
            TokenKind::OpBang => Some(AstUnaryOp::Not),
            _ => None,
        };
        if let Some(op) = op {
            self.cursor.advance(self.nl());
            let operand = self.unary();
            let region = token.region.merge(self.store.expr_region(operand));
            return self.store.alloc_expr(ExprKind::Unary { op, operand }, region);
        }
        let atom = self.atom();
        self.postfix(atom)
    }

    /// Field access, tuple access, and application chains.
    fn postfix(&mut self, mut lhs: ast::ExprIdx) -> ast::ExprIdx {
        loop {
            let token = self.cursor.peek(self.nl());
            match token.kind {
                TokenKind::NoSpaceDotLowerIdent(field) => {
                    self.cursor.advance(self.nl());
                    let region = self.store.expr_region(lhs).merge(token.region);
                    lhs = self
                        .store
                        .alloc_expr(ExprKind::FieldAccess { receiver: lhs, field }, region);
                }
                TokenKind::NoSpaceDotInt(index) => {
                    self.cursor.advance(self.nl());
                    let region = self.store.expr_region(lhs).merge(token.region);
                    lhs = self
                        .store
                        .alloc_expr(ExprKind::TupleAccess { receiver: lhs, index }, region);
                }
                // `foo. 0` and similar: a loose dot followed by an integer.
                TokenKind::Dot
                    if matches!(self.cursor.peek2(self.nl()).kind, TokenKind::Int { .. }) =>
                {
                    self.cursor.advance(self.nl());
                    let int = self.cursor.advance(self.nl());
                    let region = token.region.merge(int.region);
                    lhs = self.malformed_expr(MalformedReason::ExprNoSpaceDotInt, region);
                }
                // Application: parens directly against the callee.
                TokenKind::OpenRound
                    if token.region.start == self.store.expr_region(lhs).end =>
                {
                    let args = self.call_args();
                    let end = self.cursor.token_at(self.cursor.pos().saturating_sub(1)).region;
                    let region = self.store.expr_region(lhs).merge(end);
                    lhs = self
                        .store
                        .alloc_expr(ExprKind::Apply { func: lhs, args }, region);
                }
                _ => break,
            }
        }
        lhs
    }

    /// `(a, b, …)` argument list; the opening paren is at the cursor.
    fn call_args(&mut self) -> ast::ExprSpan {
        self.cursor.advance(self.nl());
        self.with_context(ParseContext::IGNORE_NEWLINES, |p| {
            p.without_context(ParseContext::NO_CURLY, |p| {
                let mut args = Vec::new();
                loop {
                    if p.cursor.eat(TokenKind::CloseRound, true).is_some() {
                        break;
                    }
                    if p.cursor.at_eof() {
                        let region = p.cursor.peek_region(true);
                        args.push(
                            p.malformed_expr(MalformedReason::ExpectedExprCloseRoundOrComma, region),
                        );
                        break;
                    }
                    args.push(p.expr());
                    if p.cursor.eat(TokenKind::Comma, true).is_none()
                        && !p.cursor.at(TokenKind::CloseRound, true)
                    {
                        let region = p.cursor.peek_region(true);
                        args.push(
                            p.malformed_expr(MalformedReason::ExpectedExprCloseRoundOrComma, region),
                        );
                        p.cursor.recover_to_stmt_boundary();
                        break;
                    }
                }
                p.store.alloc_expr_span(args)
            })
        })
    }

    fn atom(&mut self) -> ast::ExprIdx {
        let token = self.cursor.peek(self.nl());
        match token.kind {
            TokenKind::Int { value, base, suffix } => {
                self.cursor.advance(self.nl());
                self.store
                    .alloc_expr(ExprKind::Int { value, base, suffix }, token.region)
            }
            TokenKind::Frac { bits, suffix } => {
                self.cursor.advance(self.nl());
                self.store
                    .alloc_expr(ExprKind::Frac { bits, suffix }, token.region)
            }
            TokenKind::SingleQuote(scalar) => {
                self.cursor.advance(self.nl());
                self.store.alloc_expr(ExprKind::SingleQuote(scalar), token.region)
            }
            TokenKind::StrBegin | TokenKind::MultilineStrBegin => self.string_expr(),
            TokenKind::LowerIdent(name) => {
                self.cursor.advance(self.nl());
                self.store.alloc_expr(ExprKind::Var(name), token.region)
            }
            TokenKind::UpperIdent(_) => self.upper_path_expr(),
            TokenKind::OpenRound => self.paren_or_tuple(),
            TokenKind::OpenSquare => self.list_expr(),
            TokenKind::OpenCurly => {
                if self.context.contains(ParseContext::NO_CURLY) {
                    // The brace belongs to the enclosing construct.
                    self.malformed_expr(
                        MalformedReason::ExprUnexpectedToken,
                        Region::point(token.region.start),
                    )
                } else {
                    self.block_or_record()
                }
            }
            TokenKind::Bar => self.lambda(),
            TokenKind::KwIf => self.if_expr(),
            TokenKind::KwMatch => self.match_expr(),
            TokenKind::KwCrash => {
                self.cursor.advance(self.nl());
                let message = self.expr_bp(7);
                let region = token.region.merge(self.store.expr_region(message));
                self.store.alloc_expr(ExprKind::Crash { message }, region)
            }
            TokenKind::EndOfFile => {
                self.malformed_expr(MalformedReason::ExprUnexpectedToken, token.region)
            }
            // An operator token where an operand should be: a misspelled or
            // misplaced operator (`x = * 3`, `a ** b`).
            kind if binop_bp(kind).is_some()
                || matches!(kind, TokenKind::OpAssign | TokenKind::FatArrow) =>
            {
                self.cursor.advance(self.nl());
                self.env
                    .push_diagnostic(rill_ir::Diagnostic::UnknownOperator { region: token.region });
                self.store
                    .alloc_expr(ExprKind::Malformed(MalformedReason::ExprUnexpectedToken), token.region)
            }
            _ => {
                self.cursor.advance(self.nl());
                self.malformed_expr(MalformedReason::ExprUnexpectedToken, token.region)
            }
        }
    }

    /// String literal: `StrBegin (StrPart | InterpOpen expr InterpClose)* StrEnd`.
    fn string_expr(&mut self) -> ast::ExprIdx {
        let begin = self.cursor.advance(self.nl());
        let mut segments = Vec::new();
        let mut end_region = begin.region;
        loop {
            let token = self.cursor.peek(false);
            match token.kind {
                TokenKind::StrPart(lit) => {
                    self.cursor.advance(false);
                    segments.push(self.store.alloc_expr(ExprKind::StrPart(lit), token.region));
                }
                TokenKind::InterpOpen => {
                    self.cursor.advance(false);
                    let inner = self.with_context(ParseContext::IGNORE_NEWLINES, |p| {
                        p.without_context(ParseContext::NO_CURLY, Parser::expr)
                    });
                    segments.push(inner);
                    if self.cursor.eat(TokenKind::InterpClose, true).is_none() {
                        segments.push(self.malformed_expr(
                            MalformedReason::UnclosedInterpolation,
                            self.cursor.peek_region(true),
                        ));
                    }
                }
                TokenKind::StrEnd => {
                    end_region = token.region;
                    self.cursor.advance(false);
                    break;
                }
                _ => {
                    // Tokenizer guarantees StrEnd, but recover anyway.
                    segments.push(
                        self.malformed_expr(MalformedReason::UnclosedString, token.region),
                    );
                    break;
                }
            }
        }
        let segments = self.store.alloc_expr_span(segments);
        self.store
            .alloc_expr(ExprKind::Str { segments }, begin.region.merge(end_region))
    }

    /// `Foo`, `Foo.Bar`, `Foo.bar`, `Foo.Bar.baz`.
    fn upper_path_expr(&mut self) -> ast::ExprIdx {
        let first = self.cursor.advance(self.nl());
        let TokenKind::UpperIdent(first_name) = first.kind else {
            return self.malformed_expr(MalformedReason::ExprUnexpectedToken, first.region);
        };
        let mut components = vec![first_name];
        let mut region = first.region;
        while self.cursor.at(TokenKind::Dot, self.nl())
            && matches!(self.cursor.peek2(self.nl()).kind, TokenKind::UpperIdent(_))
        {
            self.cursor.advance(self.nl());
            let part = self.cursor.advance(self.nl());
            if let TokenKind::UpperIdent(name) = part.kind {
                components.push(name);
                region = region.merge(part.region);
            }
        }

        // `Module.value` — qualified lookup.
        if let TokenKind::NoSpaceDotLowerIdent(name) = self.cursor.peek(self.nl()).kind {
            let dot = self.cursor.advance(self.nl());
            let module = self.join_components(&components);
            return self.store.alloc_expr(
                ExprKind::ModuleAccess { module, name },
                region.merge(dot.region),
            );
        }

        if components.len() == 1 {
            self.store.alloc_expr(ExprKind::Tag(first_name), region)
        } else {
            // `Module.Tag` — qualified tag or type.
            let name = components[components.len() - 1];
            let module = self.join_components(&components[..components.len() - 1]);
            self.store
                .alloc_expr(ExprKind::ModuleAccess { module, name }, region)
        }
    }

    /// Intern the dotted join of upper path components.
    pub(crate) fn join_components(&mut self, components: &[rill_ir::Ident]) -> rill_ir::Ident {
        let joined = components
            .iter()
            .map(|&c| self.env.idents.text(c))
            .collect::<Vec<_>>()
            .join(".");
        self.env.idents.intern(&joined)
    }

    /// `(…)`: grouping, the unit value, or a tuple.
    fn paren_or_tuple(&mut self) -> ast::ExprIdx {
        let open = self.cursor.advance(self.nl());
        self.with_context(ParseContext::IGNORE_NEWLINES, |p| {
            p.without_context(ParseContext::NO_CURLY, |p| {
                if let Some(close) = p.cursor.eat(TokenKind::CloseRound, true) {
                    let items = p.store.alloc_expr_span([]);
                    return p
                        .store
                        .alloc_expr(ExprKind::Tuple { items }, open.region.merge(close.region));
                }
                let first = p.expr();
                if p.cursor.eat(TokenKind::Comma, true).is_some() {
                    let mut items = vec![first];
                    loop {
                        if p.cursor.at(TokenKind::CloseRound, true) {
                            break;
                        }
                        items.push(p.expr());
                        if p.cursor.eat(TokenKind::Comma, true).is_none() {
                            break;
                        }
                    }
                    let close = p.expect_close_round();
                    let items = p.store.alloc_expr_span(items);
                    return p
                        .store
                        .alloc_expr(ExprKind::Tuple { items }, open.region.merge(close));
                }
                let _ = p.expect_close_round();
                first
            })
        })
    }

    fn expect_close_round(&mut self) -> Region {
        match self.cursor.eat(TokenKind::CloseRound, true) {
            Some(token) => token.region,
            None => {
                let region = self.cursor.peek_region(true);
                self.malformed_expr(MalformedReason::ExpectedExprCloseRoundOrComma, region);
                self.cursor.recover_to_stmt_boundary();
                region
            }
        }
    }

    /// `[a, b, …]` list literal.
    fn list_expr(&mut self) -> ast::ExprIdx {
        let open = self.cursor.advance(self.nl());
        self.with_context(ParseContext::IGNORE_NEWLINES, |p| {
            p.without_context(ParseContext::NO_CURLY, |p| {
                let mut items = Vec::new();
                let close;
                loop {
                    if let Some(token) = p.cursor.eat(TokenKind::CloseSquare, true) {
                        close = token.region;
                        break;
                    }
                    if p.cursor.at_eof() {
                        let region = p.cursor.peek_region(true);
                        items.push(
                            p.malformed_expr(MalformedReason::ExpectedExprCloseSquareOrComma, region),
                        );
                        close = region;
                        break;
                    }
                    items.push(p.expr());
                    if p.cursor.eat(TokenKind::Comma, true).is_none()
                        && !p.cursor.at(TokenKind::CloseSquare, true)
                    {
                        let region = p.cursor.peek_region(true);
                        items.push(
                            p.malformed_expr(MalformedReason::ExpectedExprCloseSquareOrComma, region),
                        );
                        p.cursor.recover_to_stmt_boundary();
                        close = region;
                        break;
                    }
                }
                let items = p.store.alloc_expr_span(items);
                p.store
                    .alloc_expr(ExprKind::List { items }, open.region.merge(close))
            })
        })
    }

    /// `{ … }`: a record literal or a statement block, decided by lookahead.
    fn block_or_record(&mut self) -> ast::ExprIdx {
        let open = self.cursor.advance(self.nl());
        let first = self.cursor.peek(true);
        let looks_like_record = match first.kind {
            TokenKind::CloseCurly => true,
            TokenKind::LowerIdent(_) => matches!(
                self.cursor.peek2(true).kind,
                TokenKind::Colon | TokenKind::Comma | TokenKind::CloseCurly
            ),
            _ => false,
        };
        if looks_like_record {
            self.record_expr(open.region)
        } else {
            self.block_expr(open.region)
        }
    }

    fn record_expr(&mut self, open: Region) -> ast::ExprIdx {
        self.with_context(ParseContext::IGNORE_NEWLINES, |p| {
            p.without_context(ParseContext::NO_CURLY, |p| {
                let mut fields = Vec::new();
                let close;
                loop {
                    if let Some(token) = p.cursor.eat(TokenKind::CloseCurly, true) {
                        close = token.region;
                        break;
                    }
                    let token = p.cursor.peek(true);
                    let TokenKind::LowerIdent(name) = token.kind else {
                        let region = token.region;
                        p.malformed_expr(MalformedReason::ExpectedExprCloseCurlyOrComma, region);
                        p.cursor.recover_to_stmt_boundary();
                        close = region;
                        break;
                    };
                    p.cursor.advance(true);
                    let value = if p.cursor.eat(TokenKind::Colon, true).is_some() {
                        Some(p.expr())
                    } else {
                        None
                    };
                    fields.push(RecordField {
                        name,
                        name_region: token.region,
                        value,
                    });
                    if p.cursor.eat(TokenKind::Comma, true).is_none()
                        && !p.cursor.at(TokenKind::CloseCurly, true)
                    {
                        let region = p.cursor.peek_region(true);
                        p.malformed_expr(MalformedReason::ExpectedExprCloseCurlyOrComma, region);
                        p.cursor.recover_to_stmt_boundary();
                        close = region;
                        break;
                    }
                }
                let fields = p.store.alloc_record_fields(fields);
                p.store
                    .alloc_expr(ExprKind::Record { fields }, open.merge(close))
            })
        })
    }

    fn block_expr(&mut self, open: Region) -> ast::ExprIdx {
        self.without_context(ParseContext::IGNORE_NEWLINES | ParseContext::NO_CURLY, |p| {
            let mut stmts = Vec::new();
            let close;
            loop {
                while p.cursor.eat(TokenKind::Newline, false).is_some() {}
                if let Some(token) = p.cursor.eat(TokenKind::CloseCurly, false) {
                    close = token.region;
                    break;
                }
                if p.cursor.at_eof() {
                    let region = p.cursor.peek_region(false);
                    p.malformed_stmt(MalformedReason::ExpectedBlockClose, region);
                    close = region;
                    break;
                }
                stmts.push(p.stmt());
            }
            let stmts = p.store.alloc_stmt_span(stmts);
            p.store.alloc_expr(ExprKind::Block { stmts }, open.merge(close))
        })
    }

    /// `|x, y| body` lambda.
    fn lambda(&mut self) -> ast::ExprIdx {
        let open = self.cursor.advance(self.nl());
        let mut params = Vec::new();
        if self.cursor.eat(TokenKind::Bar, self.nl()).is_none() {
            loop {
                params.push(self.pattern());
                if self.cursor.eat(TokenKind::Comma, self.nl()).is_some() {
                    continue;
                }
                if self.cursor.eat(TokenKind::Bar, self.nl()).is_some() {
                    break;
                }
                let region = self.cursor.peek_region(self.nl());
                return self.malformed_expr(MalformedReason::ExpectedLambdaBody, region);
            }
        }
        let body = self.expr();
        let params = self.store.alloc_pattern_span(params);
        let region = open.region.merge(self.store.expr_region(body));
        self.store
            .alloc_expr(ExprKind::Lambda { params, body }, region)
    }

    /// `if c1 b1 else if c2 b2 else bN`.
    fn if_expr(&mut self) -> ast::ExprIdx {
        let start = self.cursor.peek_region(self.nl());
        let mut branches = Vec::new();
        let final_else;
        loop {
            self.cursor.advance(self.nl()); // `if`
            let cond = self.with_context(ParseContext::NO_CURLY, Parser::expr);
            let body = self.expr();
            branches.push(IfBranch { cond, body });
            if self.cursor.eat(TokenKind::KwElse, self.nl()).is_none() {
                let region = self.cursor.peek_region(self.nl());
                final_else = self.malformed_expr(MalformedReason::NoElse, region);
                break;
            }
            if self.cursor.at(TokenKind::KwIf, self.nl()) {
                continue;
            }
            final_else = self.expr();
            break;
        }
        let region = start.merge(self.store.expr_region(final_else));
        let branches = self.store.alloc_if_branches(branches);
        self.store
            .alloc_expr(ExprKind::If { branches, final_else }, region)
    }

    /// `match cond { pat | pat => body, … }`.
    fn match_expr(&mut self) -> ast::ExprIdx {
        let start = self.cursor.advance(self.nl()).region;
        let cond = self.with_context(ParseContext::NO_CURLY, Parser::expr);

        if self.cursor.eat(TokenKind::OpenCurly, self.nl()).is_none() {
            let region = self.cursor.peek_region(self.nl());
            return self.malformed_expr(MalformedReason::ExprUnexpectedToken, region);
        }

        let mut arms = Vec::new();
        let close;
        loop {
            while self.cursor.eat(TokenKind::Newline, false).is_some() {}
            if let Some(token) = self.cursor.eat(TokenKind::CloseCurly, false) {
                close = token.region;
                break;
            }
            if self.cursor.at_eof() {
                let region = self.cursor.peek_region(false);
                self.malformed_expr(MalformedReason::ExpectedBlockClose, region);
                close = region;
                break;
            }

            let arm_start = self.cursor.peek_region(false);
            let mut patterns = vec![self.pattern()];
            while self.cursor.eat(TokenKind::Bar, false).is_some() {
                patterns.push(self.pattern());
            }
            let body = if self.cursor.eat(TokenKind::FatArrow, false).is_some() {
                self.expr()
            } else {
                let region = self.cursor.peek_region(false);
                let body = self.malformed_expr(MalformedReason::ExpectedMatchArrow, region);
                self.cursor.recover_to_stmt_boundary();
                body
            };
            let patterns = self.store.alloc_pattern_span(patterns);
            let region = arm_start.merge(self.store.expr_region(body));
            arms.push(MatchArm { patterns, body, region });
            let _ = self.cursor.eat(TokenKind::Comma, false);
        }

        let arms = self.store.alloc_match_arms(arms);
        self.store
            .alloc_expr(ExprKind::Match { cond, arms }, start.merge(close))
    }
}
