//! Type annotation resolution.
//!
//! Annotations resolve in the type scope, which is separate from the value
//! scope. Unresolved names produce `undeclared_type` plus an `Error`
//! annotation that the checker turns into an `err` type var.

use crate::lower::Canonicalizer;
use crate::scope::TypeBinding;
use rill_ir::ast::{self, TypeAnnoKind};
use rill_ir::cir::{self, Anno, AnnoField, AnnoTag, BuiltinType, ExternalKind, TypeRef};
use rill_ir::{Diagnostic, Ident, Region};
use rill_stack::grow_stack;

impl Canonicalizer<'_> {
    pub(crate) fn lower_anno(&mut self, anno: ast::TypeAnnoIdx) -> cir::AnnoIdx {
        grow_stack(|| self.lower_anno_inner(anno))
    }

    fn lower_anno_inner(&mut self, anno: ast::TypeAnnoIdx) -> cir::AnnoIdx {
        let ast = self.ast();
        let region = ast.anno_region(anno);
        match *ast.anno_kind(anno) {
            TypeAnnoKind::Var(name) => self.cir.alloc_anno(Anno::Var { name }, region),
            TypeAnnoKind::Underscore => self.cir.alloc_anno(Anno::Underscore, region),
            TypeAnnoKind::Apply { module, name, args } => {
                self.lower_anno_apply(module, name, args, region)
            }
            TypeAnnoKind::Fn { args, ret, effectful } => {
                let lowered: Vec<_> = self
                    .ast()
                    .anno_span(args)
                    .to_vec()
                    .into_iter()
                    .map(|arg| self.lower_anno(arg))
                    .collect();
                let ret = self.lower_anno(ret);
                let args = self.cir.alloc_anno_span(lowered);
                self.cir
                    .alloc_anno(Anno::Fn { args, ret, effectful }, region)
            }
            TypeAnnoKind::Record { fields, ext } => {
                let mut lowered = Vec::new();
                for field in self.ast().anno_fields(fields).to_vec() {
                    let anno = self.lower_anno(field.anno);
                    lowered.push(AnnoField {
                        name: field.name,
                        anno,
                    });
                }
                let ext = ext.map(|ext| self.lower_anno(ext));
                let fields = self.cir.alloc_anno_fields(lowered);
                self.cir.alloc_anno(Anno::Record { fields, ext }, region)
            }
            TypeAnnoKind::TagUnion { tags, ext } => {
                let mut lowered = Vec::new();
                for tag in self.ast().anno_tags(tags).to_vec() {
                    let args: Vec<_> = self
                        .ast()
                        .anno_span(tag.args)
                        .to_vec()
                        .into_iter()
                        .map(|arg| self.lower_anno(arg))
                        .collect();
                    let args = self.cir.alloc_anno_span(args);
                    lowered.push(AnnoTag {
                        name: tag.name,
                        args,
                    });
                }
                let ext = ext.map(|ext| self.lower_anno(ext));
                let tags = self.cir.alloc_anno_tags(lowered);
                self.cir.alloc_anno(Anno::TagUnion { tags, ext }, region)
            }
            TypeAnnoKind::Tuple { elems } => {
                let lowered: Vec<_> = self
                    .ast()
                    .anno_span(elems)
                    .to_vec()
                    .into_iter()
                    .map(|elem| self.lower_anno(elem))
                    .collect();
                let elems = self.cir.alloc_anno_span(lowered);
                self.cir.alloc_anno(Anno::Tuple { elems }, region)
            }
            TypeAnnoKind::Malformed(_) => self.cir.alloc_anno(Anno::Error, region),
        }
    }

    fn lower_anno_apply(
        &mut self,
        module: Option<Ident>,
        name: Ident,
        args: ast::TypeAnnoSpan,
        region: Region,
    ) -> cir::AnnoIdx {
        let lowered: Vec<_> = self
            .ast()
            .anno_span(args)
            .to_vec()
            .into_iter()
            .map(|arg| self.lower_anno(arg))
            .collect();
        let args = self.cir.alloc_anno_span(lowered);

        let target = if let Some(module) = module {
            match self.module_aliases.get(&module).copied() {
                Some(module_id) => {
                    let external = self.external_decl(module_id, name, ExternalKind::Type);
                    TypeRef::External(external)
                }
                None => {
                    self.env
                        .push_diagnostic(Diagnostic::UndeclaredType { name, region });
                    return self.cir.alloc_anno(Anno::Error, region);
                }
            }
        } else if let Some(builtin) = BuiltinType::from_name(self.env.idents.text(name)) {
            TypeRef::Builtin(builtin)
        } else {
            match self.scope.lookup_type(name) {
                Some(TypeBinding::Local(decl)) => TypeRef::Local(decl),
                Some(TypeBinding::External(external)) => TypeRef::External(external),
                None => {
                    self.env
                        .push_diagnostic(Diagnostic::UndeclaredType { name, region });
                    return self.cir.alloc_anno(Anno::Error, region);
                }
            }
        };

        self.cir.alloc_anno(Anno::Apply { target, args }, region)
    }
}
