//! Type annotation parsing.

use crate::{ParseContext, Parser};
use rill_ir::ast::{AnnoRecordField, AnnoTag, MalformedReason, TypeAnnoKind};
use rill_ir::{ast, TokenKind};
use rill_stack::grow_stack;

impl Parser<'_> {
    /// Parse a full annotation: `a, b -> ret`, `List Str`, `{ x: I64 }`, …
    ///
    /// Commas and arrows at this level build a function type; a lone
    /// annotation is returned as-is.
    pub(crate) fn type_anno_sequence(&mut self) -> ast::TypeAnnoIdx {
        grow_stack(|| {
            let first = self.type_anno_apply();
            let mut args = vec![first];
            while self.cursor.eat(TokenKind::Comma, self.nl()).is_some() {
                args.push(self.type_anno_apply());
            }
            let effectful = match self.cursor.peek(self.nl()).kind {
                TokenKind::Arrow => false,
                TokenKind::FatArrow => true,
                _ => {
                    if args.len() > 1 {
                        // Commas without an arrow aren't a type.
                        let region = self.cursor.peek_region(self.nl());
                        return self.malformed_anno(MalformedReason::TypeUnexpectedToken, region);
                    }
                    return first;
                }
            };
            self.cursor.advance(self.nl());
            let ret = self.type_anno_sequence();
            let region = self
                .store
                .anno_region(first)
                .merge(self.store.anno_region(ret));
            let args = self.store.alloc_anno_span(args);
            self.store
                .alloc_anno(TypeAnnoKind::Fn { args, ret, effectful }, region)
        })
    }

    /// A type application: an atom, or an upper reference with juxtaposed
    /// atom arguments (`List Str`, `Dict k v`).
    fn type_anno_apply(&mut self) -> ast::TypeAnnoIdx {
        let token = self.cursor.peek(self.nl());
        if let TokenKind::UpperIdent(_) = token.kind {
            let (module, name, mut region) = self.type_upper_path();
            let mut args = Vec::new();
            while self.at_anno_atom_start() {
                let arg = self.type_anno_atom();
                region = region.merge(self.store.anno_region(arg));
                args.push(arg);
            }
            let args = self.store.alloc_anno_span(args);
            return self
                .store
                .alloc_anno(TypeAnnoKind::Apply { module, name, args }, region);
        }
        self.type_anno_atom()
    }

    fn at_anno_atom_start(&self) -> bool {
        matches!(
            self.cursor.peek(self.nl()).kind,
            TokenKind::UpperIdent(_)
                | TokenKind::LowerIdent(_)
                | TokenKind::Underscore
                | TokenKind::OpenRound
                | TokenKind::OpenCurly
                | TokenKind::OpenSquare
        )
    }

    /// `Foo` or `Json.Decoder`, returning `(module, name, region)`.
    fn type_upper_path(&mut self) -> (Option<rill_ir::Ident>, rill_ir::Ident, rill_ir::Region) {
        let first = self.cursor.advance(self.nl());
        let TokenKind::UpperIdent(first_name) = first.kind else {
            // Caller checked; treat as an anonymous name.
            return (None, self.env.idents.intern("?"), first.region);
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
        if components.len() == 1 {
            (None, first_name, region)
        } else {
            let name = components[components.len() - 1];
            let module = self.join_components(&components[..components.len() - 1]);
            (Some(module), name, region)
        }
    }

    fn type_anno_atom(&mut self) -> ast::TypeAnnoIdx {
        let token = self.cursor.peek(self.nl());
        match token.kind {
            TokenKind::LowerIdent(name) => {
                self.cursor.advance(self.nl());
                self.store.alloc_anno(TypeAnnoKind::Var(name), token.region)
            }
            TokenKind::Underscore => {
                self.cursor.advance(self.nl());
                self.store.alloc_anno(TypeAnnoKind::Underscore, token.region)
            }
            TokenKind::UpperIdent(_) => {
                let (module, name, region) = self.type_upper_path();
                let args = self.store.alloc_anno_span([]);
                self.store
                    .alloc_anno(TypeAnnoKind::Apply { module, name, args }, region)
            }
            TokenKind::OpenRound => self.paren_anno(),
            TokenKind::OpenCurly => self.record_anno(),
            TokenKind::OpenSquare => self.tag_union_anno(),
            TokenKind::EndOfFile => {
                self.malformed_anno(MalformedReason::TypeUnexpectedToken, token.region)
            }
            _ => {
                self.cursor.advance(self.nl());
                self.malformed_anno(MalformedReason::TypeUnexpectedToken, token.region)
            }
        }
    }

    /// `( … )`: grouping, a tuple type, or a parenthesized function type.
    fn paren_anno(&mut self) -> ast::TypeAnnoIdx {
        let open = self.cursor.advance(self.nl());
        self.with_context(ParseContext::IGNORE_NEWLINES, |p| {
            let mut elems = Vec::new();
            loop {
                if p.cursor.at(TokenKind::CloseRound, true) || p.cursor.at_eof() {
                    break;
                }
                elems.push(p.type_anno_apply());
                if p.cursor.eat(TokenKind::Comma, true).is_none() {
                    break;
                }
            }

            // A trailing arrow makes the element list the argument list.
            let effectful = match p.cursor.peek(true).kind {
                TokenKind::Arrow => Some(false),
                TokenKind::FatArrow => Some(true),
                _ => None,
            };
            let result = if let Some(effectful) = effectful {
                p.cursor.advance(true);
                let ret = p.type_anno_sequence();
                let region = open.region.merge(p.store.anno_region(ret));
                let args = p.store.alloc_anno_span(elems);
                p.store
                    .alloc_anno(TypeAnnoKind::Fn { args, ret, effectful }, region)
            } else if elems.len() == 1 {
                elems[0]
            } else {
                let region = open.region.merge(p.cursor.peek_region(true));
                let elems = p.store.alloc_anno_span(elems);
                p.store.alloc_anno(TypeAnnoKind::Tuple { elems }, region)
            };

            if p.cursor.eat(TokenKind::CloseRound, true).is_none() {
                let region = p.cursor.peek_region(true);
                let malformed = p.malformed_anno(MalformedReason::ExpectedTypeClose, region);
                p.cursor.recover_to_stmt_boundary();
                return malformed;
            }
            result
        })
    }

    /// `{ name: Anno, … }` with an optional tight extension var after `}`.
    fn record_anno(&mut self) -> ast::TypeAnnoIdx {
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
                    let malformed =
                        p.malformed_anno(MalformedReason::ExpectedTypeClose, token.region);
                    p.cursor.recover_to_stmt_boundary();
                    return malformed;
                };
                p.cursor.advance(true);
                if p.cursor.eat(TokenKind::Colon, true).is_none() {
                    let malformed = p.malformed_anno(
                        MalformedReason::ExpectedTypeClose,
                        p.cursor.peek_region(true),
                    );
                    p.cursor.recover_to_stmt_boundary();
                    return malformed;
                }
                let anno = p.type_anno_apply();
                fields.push(AnnoRecordField {
                    name,
                    region: token.region,
                    anno,
                });
                let _ = p.cursor.eat(TokenKind::Comma, true);
            }
            let ext = p.tight_ext_var(region);
            let fields = p.store.alloc_anno_fields(fields);
            p.store
                .alloc_anno(TypeAnnoKind::Record { fields, ext }, region)
        })
    }

    /// `[Tag, Other Payload]` with an optional tight extension var after `]`.
    fn tag_union_anno(&mut self) -> ast::TypeAnnoIdx {
        let open = self.cursor.advance(self.nl());
        self.with_context(ParseContext::IGNORE_NEWLINES, |p| {
            let mut tags = Vec::new();
            let mut region = open.region;
            loop {
                if let Some(close) = p.cursor.eat(TokenKind::CloseSquare, true) {
                    region = region.merge(close.region);
                    break;
                }
                let token = p.cursor.peek(true);
                let TokenKind::UpperIdent(name) = token.kind else {
                    let malformed =
                        p.malformed_anno(MalformedReason::ExpectedTypeClose, token.region);
                    p.cursor.recover_to_stmt_boundary();
                    return malformed;
                };
                p.cursor.advance(true);
                let mut args = Vec::new();
                while p.at_anno_atom_start() {
                    args.push(p.type_anno_atom());
                }
                let args = p.store.alloc_anno_span(args);
                tags.push(AnnoTag {
                    name,
                    region: token.region,
                    args,
                });
                let _ = p.cursor.eat(TokenKind::Comma, true);
            }
            let ext = p.tight_ext_var(region);
            let tags = p.store.alloc_anno_tags(tags);
            p.store
                .alloc_anno(TypeAnnoKind::TagUnion { tags, ext }, region)
        })
    }

    /// A lowercase extension var written tight against a closing bracket
    /// (`[A, B]rest`, `{ x: I64 }other`).
    fn tight_ext_var(&mut self, closed: rill_ir::Region) -> Option<ast::TypeAnnoIdx> {
        let token = self.cursor.peek(false);
        if let TokenKind::LowerIdent(name) = token.kind {
            if token.region.start == closed.end {
                self.cursor.advance(false);
                return Some(self.store.alloc_anno(TypeAnnoKind::Var(name), token.region));
            }
        }
        None
    }
}
