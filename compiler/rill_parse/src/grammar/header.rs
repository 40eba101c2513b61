//! Module header parsing.
//!
//! A file may begin with one of `module`, `app`, `package`, `platform`, or
//! `hosted`. Platform section names (`requires`, `exposes`, `packages`,
//! `provides`) are contextual: ordinary lower idents compared by text.

use crate::{ParseContext, Parser};
use rill_ir::ast::{Header, MalformedReason, NameSpan, PackageField, PackageFieldSpan};
use rill_ir::{Region, StringLit, TokenKind};

impl Parser<'_> {
    /// Parse the header, if the file starts with one.
    pub(crate) fn header(&mut self) -> Option<(Header, Region)> {
        let start = self.cursor.peek(true);
        let header = match start.kind {
            TokenKind::KwModule => {
                self.cursor.advance(true);
                let exposes = self.name_list();
                Header::Module { exposes }
            }
            TokenKind::KwApp => {
                self.cursor.advance(true);
                let provides = self.name_list();
                let packages = self.package_record();
                Header::App { provides, packages }
            }
            TokenKind::KwPackage => {
                self.cursor.advance(true);
                let exposes = self.name_list();
                let packages = self.package_record();
                Header::Package { exposes, packages }
            }
            TokenKind::KwPlatform => {
                self.cursor.advance(true);
                let name = self.header_string();
                let mut requires = NameSpan::EMPTY;
                let mut exposes = NameSpan::EMPTY;
                let mut provides = NameSpan::EMPTY;
                let mut packages = PackageFieldSpan::EMPTY;
                // Sections may appear in any order.
                loop {
                    let token = self.cursor.peek(false);
                    let TokenKind::LowerIdent(ident) = token.kind else { break };
                    match self.env.idents.text(ident) {
                        "requires" => {
                            self.cursor.advance(false);
                            requires = self.name_list();
                        }
                        "exposes" => {
                            self.cursor.advance(false);
                            exposes = self.name_list();
                        }
                        "provides" => {
                            self.cursor.advance(false);
                            provides = self.name_list();
                        }
                        "packages" => {
                            self.cursor.advance(false);
                            packages = self.package_record();
                        }
                        _ => break,
                    }
                }
                Header::Platform {
                    name,
                    requires,
                    exposes,
                    packages,
                    provides,
                }
            }
            TokenKind::KwHosted => {
                self.cursor.advance(true);
                let exposes = self.name_list();
                Header::Hosted { exposes }
            }
            _ => return None,
        };
        let end = self.cursor.token_at(self.cursor.pos().saturating_sub(1)).region;
        Some((header, start.region.merge(end)))
    }

    /// `[name, Name, …]` exposes/provides list.
    fn name_list(&mut self) -> NameSpan {
        if self.cursor.eat(TokenKind::OpenSquare, true).is_none() {
            let region = self.cursor.peek_region(true);
            self.env.push_diagnostic(rill_ir::Diagnostic::Parse {
                reason: MalformedReason::HeaderUnexpectedToken,
                region,
            });
            return NameSpan::EMPTY;
        }
        self.with_context(ParseContext::IGNORE_NEWLINES, |p| {
            let mut names = Vec::new();
            loop {
                let token = p.cursor.peek(true);
                match token.kind {
                    TokenKind::CloseSquare => {
                        p.cursor.advance(true);
                        break;
                    }
                    TokenKind::LowerIdent(ident) | TokenKind::UpperIdent(ident) => {
                        p.cursor.advance(true);
                        names.push((ident, token.region));
                        if p.cursor.eat(TokenKind::Comma, true).is_none()
                            && !p.cursor.at(TokenKind::CloseSquare, true)
                        {
                            p.env.push_diagnostic(rill_ir::Diagnostic::Parse {
                                reason: MalformedReason::HeaderUnexpectedToken,
                                region: p.cursor.peek_region(true),
                            });
                            p.cursor.recover_to_stmt_boundary();
                            break;
                        }
                    }
                    _ => {
                        p.env.push_diagnostic(rill_ir::Diagnostic::Parse {
                            reason: MalformedReason::HeaderUnexpectedToken,
                            region: token.region,
                        });
                        p.cursor.recover_to_stmt_boundary();
                        break;
                    }
                }
            }
            p.store.alloc_name_span(names)
        })
    }

    /// `{ pf: platform "path", dep: "path" }` packages record.
    fn package_record(&mut self) -> PackageFieldSpan {
        if self.cursor.eat(TokenKind::OpenCurly, true).is_none() {
            self.env.push_diagnostic(rill_ir::Diagnostic::Parse {
                reason: MalformedReason::HeaderUnexpectedToken,
                region: self.cursor.peek_region(true),
            });
            return PackageFieldSpan::EMPTY;
        }
        self.with_context(ParseContext::IGNORE_NEWLINES, |p| {
            let mut fields = Vec::new();
            loop {
                let token = p.cursor.peek(true);
                match token.kind {
                    TokenKind::CloseCurly => {
                        p.cursor.advance(true);
                        break;
                    }
                    TokenKind::LowerIdent(shorthand) => {
                        p.cursor.advance(true);
                        if p.cursor.eat(TokenKind::Colon, true).is_none() {
                            p.env.push_diagnostic(rill_ir::Diagnostic::Parse {
                                reason: MalformedReason::HeaderUnexpectedToken,
                                region: p.cursor.peek_region(true),
                            });
                            p.cursor.recover_to_stmt_boundary();
                            break;
                        }
                        let is_platform = p.cursor.eat(TokenKind::KwPlatform, true).is_some();
                        let path = p.header_string();
                        let end = p.cursor.token_at(p.cursor.pos().saturating_sub(1)).region;
                        fields.push(PackageField {
                            shorthand,
                            is_platform,
                            path,
                            region: token.region.merge(end),
                        });
                        let _ = p.cursor.eat(TokenKind::Comma, true);
                    }
                    _ => {
                        p.env.push_diagnostic(rill_ir::Diagnostic::Parse {
                            reason: MalformedReason::HeaderUnexpectedToken,
                            region: token.region,
                        });
                        p.cursor.recover_to_stmt_boundary();
                        break;
                    }
                }
            }
            p.store.alloc_package_fields(fields)
        })
    }

    /// A plain (non-interpolated) string literal in header position.
    fn header_string(&mut self) -> StringLit {
        if self.cursor.eat(TokenKind::StrBegin, true).is_none() {
            self.env.push_diagnostic(rill_ir::Diagnostic::Parse {
                reason: MalformedReason::HeaderUnexpectedToken,
                region: self.cursor.peek_region(true),
            });
            return self.env.strings.insert(String::new());
        }
        let lit = match self.cursor.peek(true).kind {
            TokenKind::StrPart(lit) => {
                self.cursor.advance(true);
                lit
            }
            _ => self.env.strings.insert(String::new()),
        };
        if self.cursor.eat(TokenKind::StrEnd, true).is_none() {
            self.env.push_diagnostic(rill_ir::Diagnostic::Parse {
                reason: MalformedReason::HeaderUnexpectedToken,
                region: self.cursor.peek_region(true),
            });
            self.cursor.recover_to_stmt_boundary();
        }
        lit
    }
}
