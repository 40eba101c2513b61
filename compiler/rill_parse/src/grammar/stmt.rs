//! Statement parsing.
//!
//! Statements are newline-separated. The parser accepts every statement form
//! everywhere; the canonicalizer enforces which forms are valid at top level
//! versus inside blocks.

use crate::Parser;
use rill_ir::ast::{Import, MalformedReason, StmtKind, TypeDeclKind, TypeHeader};
use rill_ir::{ast, TokenKind};

impl Parser<'_> {
    /// Parse one statement.
    pub(crate) fn stmt(&mut self) -> ast::StmtIdx {
        let start = self.cursor.peek(false);
        match start.kind {
            TokenKind::KwImport => self.import_stmt(),
            TokenKind::KwExpect => {
                self.cursor.advance(false);
                let body = self.expr();
                let region = start.region.merge(self.store.expr_region(body));
                self.store.alloc_stmt(StmtKind::Expect { body }, region)
            }
            TokenKind::UpperIdent(_) if self.upcoming_type_decl() => self.type_decl_stmt(),
            TokenKind::LowerIdent(name)
                if self.cursor.peek2(false).kind == TokenKind::Colon =>
            {
                // `name : anno`
                self.cursor.advance(false);
                self.cursor.advance(false);
                let anno = self.type_anno_sequence();
                let region = start.region.merge(self.store.anno_region(anno));
                self.store.alloc_stmt(StmtKind::TypeAnno { name, anno }, region)
            }
            _ if self.upcoming_decl() => {
                let pattern = self.pattern();
                if self.cursor.eat(TokenKind::OpAssign, false).is_none() {
                    let region = self.cursor.peek_region(false);
                    let stmt = self.malformed_stmt(MalformedReason::ExpectedDeclBody, region);
                    self.cursor.recover_to_stmt_boundary();
                    return stmt;
                }
                let body = self.expr();
                let region = start.region.merge(self.store.expr_region(body));
                self.store.alloc_stmt(StmtKind::Decl { pattern, body }, region)
            }
            TokenKind::EndOfFile => {
                self.malformed_stmt(MalformedReason::StatementUnexpectedToken, start.region)
            }
            _ => {
                let expr = self.expr();
                let region = self.store.expr_region(expr);
                self.store.alloc_stmt(StmtKind::Expr(expr), region)
            }
        }
    }

    /// Look ahead for `=` at bracket depth zero before the next newline:
    /// that makes the statement a declaration.
    fn upcoming_decl(&self) -> bool {
        self.scan_for(|kind| kind == TokenKind::OpAssign)
    }

    /// Look ahead for `:` / `:=` at depth zero before the next newline or
    /// `=`: that makes an `Upper…` statement a type declaration.
    fn upcoming_type_decl(&self) -> bool {
        self.scan_for(|kind| matches!(kind, TokenKind::Colon | TokenKind::ColonEq))
    }

    fn scan_for(&self, hit: impl Fn(TokenKind) -> bool) -> bool {
        let mut depth: u32 = 0;
        let mut index = self.cursor.pos();
        loop {
            let token = self.cursor.token_at(index);
            match token.kind {
                TokenKind::EndOfFile => return false,
                TokenKind::Newline if depth == 0 => return false,
                TokenKind::OpenRound
                | TokenKind::OpenSquare
                | TokenKind::OpenCurly
                | TokenKind::InterpOpen => depth += 1,
                TokenKind::CloseRound
                | TokenKind::CloseSquare
                | TokenKind::CloseCurly
                | TokenKind::InterpClose => {
                    if depth == 0 {
                        return false;
                    }
                    depth -= 1;
                }
                kind if depth == 0 && hit(kind) => return true,
                TokenKind::OpAssign if depth == 0 => return false,
                _ => {}
            }
            index += 1;
        }
    }

    /// `Name a b : anno` or `Name a b := anno`.
    fn type_decl_stmt(&mut self) -> ast::StmtIdx {
        let start = self.cursor.advance(false);
        let TokenKind::UpperIdent(name) = start.kind else {
            return self.malformed_stmt(MalformedReason::StatementUnexpectedToken, start.region);
        };

        let mut args = Vec::new();
        while let TokenKind::LowerIdent(arg) = self.cursor.peek(false).kind {
            let token = self.cursor.advance(false);
            args.push((arg, token.region));
        }
        let args = self.store.alloc_name_span(args);
        let header = self.store.alloc_type_header(TypeHeader {
            name,
            name_region: start.region,
            args,
        });

        let kind = match self.cursor.advance(false).kind {
            TokenKind::Colon => TypeDeclKind::Alias,
            TokenKind::ColonEq => TypeDeclKind::Nominal,
            _ => {
                let region = self.cursor.peek_region(false);
                let stmt = self.malformed_stmt(MalformedReason::StatementUnexpectedToken, region);
                self.cursor.recover_to_stmt_boundary();
                return stmt;
            }
        };

        let anno = self.type_anno_sequence();
        let region = start.region.merge(self.store.anno_region(anno));
        self.store
            .alloc_stmt(StmtKind::TypeDecl { header, anno, kind }, region)
    }

    /// `import pf.Foo.Bar as Alias exposing [a, B]`.
    fn import_stmt(&mut self) -> ast::StmtIdx {
        let start = self.cursor.advance(false);

        // Optional `shorthand.` prefix: a lower ident directly before the
        // first upper path component.
        let mut shorthand = None;
        if let TokenKind::LowerIdent(ident) = self.cursor.peek(false).kind {
            if self.cursor.peek2(false).kind == TokenKind::Dot {
                self.cursor.advance(false);
                self.cursor.advance(false);
                shorthand = Some(ident);
            }
        }

        // Dotted module path: `Foo` or `Foo.Bar`. Tight `.lower` would have
        // fused in the lexer, so a trailing value import is not valid here.
        let mut path = String::new();
        let mut module_region = self.cursor.peek_region(false);
        loop {
            let token = self.cursor.peek(false);
            let TokenKind::UpperIdent(part) = token.kind else {
                if path.is_empty() {
                    let stmt =
                        self.malformed_stmt(MalformedReason::ImportBadPath, token.region);
                    self.cursor.recover_to_stmt_boundary();
                    return stmt;
                }
                break;
            };
            self.cursor.advance(false);
            if !path.is_empty() {
                path.push('.');
            }
            path.push_str(self.env.idents.text(part));
            module_region = module_region.merge(token.region);
            if self.cursor.at(TokenKind::Dot, false)
                && matches!(self.cursor.peek2(false).kind, TokenKind::UpperIdent(_))
            {
                self.cursor.advance(false);
            } else {
                break;
            }
        }
        let module = self.env.idents.intern(&path);

        let mut alias = None;
        if self.cursor.eat(TokenKind::KwAs, false).is_some() {
            match self.cursor.peek(false).kind {
                TokenKind::UpperIdent(name) => {
                    self.cursor.advance(false);
                    alias = Some(name);
                }
                _ => {
                    let region = self.cursor.peek_region(false);
                    let stmt = self.malformed_stmt(MalformedReason::ImportBadPath, region);
                    self.cursor.recover_to_stmt_boundary();
                    return stmt;
                }
            }
        }

        // Optional `exposing [a, B]`; `exposing` is contextual.
        let mut exposing = Vec::new();
        if let TokenKind::LowerIdent(word) = self.cursor.peek(false).kind {
            if self.env.idents.text(word) == "exposing" {
                self.cursor.advance(false);
                if self.cursor.eat(TokenKind::OpenSquare, false).is_some() {
                    loop {
                        let token = self.cursor.peek(true);
                        match token.kind {
                            TokenKind::CloseSquare => {
                                self.cursor.advance(true);
                                break;
                            }
                            TokenKind::LowerIdent(name) | TokenKind::UpperIdent(name) => {
                                self.cursor.advance(true);
                                exposing.push((name, token.region));
                                let _ = self.cursor.eat(TokenKind::Comma, true);
                            }
                            _ => {
                                let stmt = self.malformed_stmt(
                                    MalformedReason::ImportBadPath,
                                    token.region,
                                );
                                self.cursor.recover_to_stmt_boundary();
                                return stmt;
                            }
                        }
                    }
                }
            }
        }
        let exposing = self.store.alloc_name_span(exposing);

        let import = self.store.alloc_import(Import {
            shorthand,
            module,
            module_region,
            alias,
            exposing,
        });
        let end = self.cursor.token_at(self.cursor.pos().saturating_sub(1)).region;
        self.store
            .alloc_stmt(StmtKind::Import(import), start.region.merge(end))
    }
}
