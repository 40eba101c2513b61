//! Unification.
//!
//! `unify(a, b)` merges the two type graphs according to the structural
//! rules of the language: flex vars adopt their counterpart, rigid vars
//! unify only with themselves, records and tag unions unify row-polymorphically
//! through their extension vars, and numbers join along the
//! unbound → precision → compact lattice.
//!
//! On any mismatch both representatives are poisoned to `Err` (so one bad
//! expression doesn't cascade into dozens of reports) and a [`Mismatch`]
//! carrying both rendered types and the unification path is returned.

use crate::render::render_var;
use crate::types::{Content, FlatType, Func, IntReq, Num, Var};
use crate::TypeStore;
use rill_ir::{Ident, IdentStore};
use rill_stack::grow_stack;

/// Why two types failed to unify.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum MismatchKind {
    General,
    Rigid,
    Nominal,
    IntPrecisionMismatch,
    FracPrecisionMismatch,
    NumberKind,
    Arity,
    Purity,
    MissingField(Ident),
    MissingTag(Ident),
}

/// A failed unification, rendered at the moment of failure (before the
/// participating vars were poisoned).
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Mismatch {
    pub kind: MismatchKind,
    pub expected: String,
    pub found: String,
    /// Human description of where inside the types the clash happened.
    pub path: String,
}

/// Guard against runaway descent through cyclic nominal backings.
const MAX_DEPTH: u32 = 64;

/// Unify two vars. See the module docs for the contract.
pub fn unify(
    store: &mut TypeStore,
    idents: &IdentStore,
    a: Var,
    b: Var,
) -> Result<(), Mismatch> {
    let mut unifier = Unifier {
        store,
        idents,
        path: Vec::new(),
        depth: 0,
    };
    unifier.unify_vars(a, b)
}

struct Unifier<'a> {
    store: &'a mut TypeStore,
    idents: &'a IdentStore,
    path: Vec<String>,
    depth: u32,
}

impl Unifier<'_> {
    fn unify_vars(&mut self, a: Var, b: Var) -> Result<(), Mismatch> {
        grow_stack(|| self.unify_vars_inner(a, b))
    }

    fn unify_vars_inner(&mut self, a: Var, b: Var) -> Result<(), Mismatch> {
        let a_root = self.store.resolve(a);
        let b_root = self.store.resolve(b);
        if a_root == b_root {
            return Ok(());
        }
        if self.depth > MAX_DEPTH {
            return self.fail(MismatchKind::General, a_root, b_root);
        }
        self.depth += 1;
        let result = self.dispatch(a_root, b_root);
        self.depth -= 1;
        result
    }

    fn dispatch(&mut self, a: Var, b: Var) -> Result<(), Mismatch> {
        let a_content = self.store.content(a);
        let b_content = self.store.content(b);
        match (a_content, b_content) {
            // Errors absorb everything silently.
            (Content::Err, _) | (_, Content::Err) => {
                self.store.union(a, b, Content::Err);
                Ok(())
            }

            // Flex vars adopt the counterpart. A both-named merge keeps the
            // smaller interned handle, so `unify(a, b)` and `unify(b, a)`
            // produce the same representative content.
            (Content::FlexVar(a_name), Content::FlexVar(b_name)) => {
                let name = match (a_name, b_name) {
                    (Some(x), Some(y)) => Some(x.min(y)),
                    (x, y) => x.or(y),
                };
                self.store.union(a, b, Content::FlexVar(name));
                Ok(())
            }
            (Content::FlexVar(_), other) | (other, Content::FlexVar(_)) => {
                self.store.union(a, b, other);
                Ok(())
            }

            (Content::RigidVar(a_name), Content::RigidVar(b_name)) if a_name == b_name => {
                self.store.union(a, b, Content::RigidVar(a_name));
                Ok(())
            }
            (Content::RigidVar(_), _) | (_, Content::RigidVar(_)) => {
                self.fail(MismatchKind::Rigid, a, b)
            }

            (
                Content::Alias { ident: a_ident, args: a_args, backing: a_backing },
                Content::Alias { ident: b_ident, args: b_args, backing: b_backing },
            ) if a_ident == b_ident => {
                self.unify_zip(a_args, b_args)?;
                self.unify_vars(a_backing, b_backing)?;
                self.store.union(
                    a,
                    b,
                    Content::Alias { ident: a_ident, args: a_args, backing: a_backing },
                );
                Ok(())
            }
            // An alias is transparent against anything else: unify its
            // backing, keep the alias name on the merged var.
            (Content::Alias { ident, args, backing }, _) => {
                self.unify_vars(backing, b)?;
                self.store.union(a, b, Content::Alias { ident, args, backing });
                Ok(())
            }
            (_, Content::Alias { ident, args, backing }) => {
                self.unify_vars(a, backing)?;
                self.store.union(a, b, Content::Alias { ident, args, backing });
                Ok(())
            }

            (Content::Structure(s), Content::Structure(t)) => self.unify_flat(a, b, s, t),
        }
    }

    fn unify_flat(&mut self, a: Var, b: Var, s: FlatType, t: FlatType) -> Result<(), Mismatch> {
        use FlatType::*;
        match (s, t) {
            (Str, Str) => self.merge(a, b, Str),

            (Box(x), Box(y)) => {
                self.unify_vars(x, y)?;
                self.merge(a, b, Box(x))
            }

            (List(x), List(y)) => {
                self.in_path("in the list element", |u| u.unify_vars(x, y))?;
                self.merge(a, b, List(x))
            }
            (ListUnbound, List(y)) => self.merge(a, b, List(y)),
            (List(x), ListUnbound) => self.merge(a, b, List(x)),
            (ListUnbound, ListUnbound) => self.merge(a, b, ListUnbound),

            (Tuple(xs), Tuple(ys)) => {
                if xs.count() != ys.count() {
                    return self.fail(MismatchKind::Arity, a, b);
                }
                self.unify_zip(xs, ys)?;
                self.merge(a, b, Tuple(xs))
            }

            (Num(x), Num(y)) => self.unify_num(a, b, x, y),

            (
                Nominal { ident: a_ident, args: a_args, backing, origin },
                Nominal { ident: b_ident, args: b_args, .. },
            ) => {
                if a_ident != b_ident {
                    return self.fail(MismatchKind::Nominal, a, b);
                }
                self.unify_zip(a_args, b_args)?;
                self.merge(a, b, Nominal { ident: a_ident, args: a_args, backing, origin })
            }
            (Nominal { .. }, _) | (_, Nominal { .. }) => self.fail(MismatchKind::Nominal, a, b),

            // Functions: purity joins through FnUnbound as bottom.
            (FnPure(x), FnPure(y)) | (FnPure(x), FnUnbound(y)) | (FnUnbound(x), FnPure(y)) => {
                let merged = self.unify_func(a, b, x, y)?;
                self.merge(a, b, FnPure(merged))
            }
            (FnEffectful(x), FnEffectful(y))
            | (FnEffectful(x), FnUnbound(y))
            | (FnUnbound(x), FnEffectful(y)) => {
                let merged = self.unify_func(a, b, x, y)?;
                self.merge(a, b, FnEffectful(merged))
            }
            (FnUnbound(x), FnUnbound(y)) => {
                let merged = self.unify_func(a, b, x, y)?;
                self.merge(a, b, FnUnbound(merged))
            }
            (FnPure(_), FnEffectful(_)) | (FnEffectful(_), FnPure(_)) => {
                self.fail(MismatchKind::Purity, a, b)
            }

            // A record literal adopts an extension var on first contact.
            (RecordUnbound { fields }, _) => {
                let rank = self.store_rank(a);
                let ext = self.store.fresh_with(Content::Structure(EmptyRecord), rank);
                self.store.set_content(a, Content::Structure(Record { fields, ext }));
                self.unify_vars(a, b)
            }
            (_, RecordUnbound { fields }) => {
                let rank = self.store_rank(b);
                let ext = self.store.fresh_with(Content::Structure(EmptyRecord), rank);
                self.store.set_content(b, Content::Structure(Record { fields, ext }));
                self.unify_vars(a, b)
            }

            (Record { fields: a_fields, ext: a_ext }, Record { fields: b_fields, ext: b_ext }) => {
                self.unify_records(a, b, a_fields, a_ext, b_fields, b_ext)
            }
            (Record { fields, ext }, EmptyRecord) => {
                if let Some(&(missing, _)) = self.store.fields(fields).first() {
                    return self.fail(MismatchKind::MissingField(missing), a, b);
                }
                self.unify_vars(ext, b)?;
                self.merge(a, b, EmptyRecord)
            }
            (EmptyRecord, Record { fields, ext }) => {
                if let Some(&(missing, _)) = self.store.fields(fields).first() {
                    return self.fail(MismatchKind::MissingField(missing), a, b);
                }
                self.unify_vars(a, ext)?;
                self.merge(a, b, EmptyRecord)
            }
            (EmptyRecord, EmptyRecord) => self.merge(a, b, EmptyRecord),

            (
                TagUnion { tags: a_tags, ext: a_ext },
                TagUnion { tags: b_tags, ext: b_ext },
            ) => self.unify_tag_unions(a, b, a_tags, a_ext, b_tags, b_ext),
            (TagUnion { tags, ext }, EmptyTagUnion) => {
                if let Some(&(missing, _)) = self.store.tags(tags).first() {
                    return self.fail(MismatchKind::MissingTag(missing), a, b);
                }
                self.unify_vars(ext, b)?;
                self.merge(a, b, EmptyTagUnion)
            }
            (EmptyTagUnion, TagUnion { tags, ext }) => {
                if let Some(&(missing, _)) = self.store.tags(tags).first() {
                    return self.fail(MismatchKind::MissingTag(missing), a, b);
                }
                self.unify_vars(a, ext)?;
                self.merge(a, b, EmptyTagUnion)
            }
            (EmptyTagUnion, EmptyTagUnion) => self.merge(a, b, EmptyTagUnion),

            _ => self.fail(MismatchKind::General, a, b),
        }
    }

    fn unify_func(&mut self, a: Var, b: Var, x: Func, y: Func) -> Result<Func, Mismatch> {
        if x.args.count() != y.args.count() {
            return Err(self.fail_err(MismatchKind::Arity, a, b));
        }
        let x_args = self.store.vars(x.args).to_vec();
        let y_args = self.store.vars(y.args).to_vec();
        for (i, (&xa, &ya)) in x_args.iter().zip(y_args.iter()).enumerate() {
            self.in_path(&format!("in argument {}", i + 1), |u| u.unify_vars(xa, ya))?;
        }
        self.in_path("in the return type", |u| u.unify_vars(x.ret, y.ret))?;
        Ok(x)
    }

    fn unify_records(
        &mut self,
        a: Var,
        b: Var,
        a_fields: crate::FieldSlice,
        a_ext: Var,
        b_fields: crate::FieldSlice,
        b_ext: Var,
    ) -> Result<(), Mismatch> {
        let a_list = self.store.fields(a_fields).to_vec();
        let b_list = self.store.fields(b_fields).to_vec();

        // Field slices are name-sorted, so a merge walk partitions them.
        let mut shared: Vec<(Ident, Var, Var)> = Vec::new();
        let mut only_a: Vec<(Ident, Var)> = Vec::new();
        let mut only_b: Vec<(Ident, Var)> = Vec::new();
        let (mut i, mut j) = (0, 0);
        while i < a_list.len() && j < b_list.len() {
            match a_list[i].0.cmp(&b_list[j].0) {
                std::cmp::Ordering::Equal => {
                    shared.push((a_list[i].0, a_list[i].1, b_list[j].1));
                    i += 1;
                    j += 1;
                }
                std::cmp::Ordering::Less => {
                    only_a.push(a_list[i]);
                    i += 1;
                }
                std::cmp::Ordering::Greater => {
                    only_b.push(b_list[j]);
                    j += 1;
                }
            }
        }
        only_a.extend_from_slice(&a_list[i..]);
        only_b.extend_from_slice(&b_list[j..]);

        for (name, a_var, b_var) in &shared {
            let label = format!("in field `{}`", self.idents.text(*name));
            let (a_var, b_var) = (*a_var, *b_var);
            self.in_path(&label, |u| u.unify_vars(a_var, b_var))?;
        }

        let rank = self.store_rank(a).min(self.store_rank(b));
        let merged_fields: Vec<(Ident, Var)> = shared
            .iter()
            .map(|&(name, var, _)| (name, var))
            .chain(only_a.iter().copied())
            .chain(only_b.iter().copied())
            .collect();

        // Row-polymorphism: each side's extension absorbs the fields the
        // other side has and it lacks.
        let merged_ext = match (only_a.is_empty(), only_b.is_empty()) {
            (true, true) => {
                self.unify_vars(a_ext, b_ext)?;
                a_ext
            }
            (true, false) => {
                let fields = self.store.alloc_fields(only_b);
                let sub = self.store.fresh_with(
                    Content::Structure(FlatType::Record { fields, ext: b_ext }),
                    rank,
                );
                self.unify_vars(a_ext, sub)?;
                b_ext
            }
            (false, true) => {
                let fields = self.store.alloc_fields(only_a);
                let sub = self.store.fresh_with(
                    Content::Structure(FlatType::Record { fields, ext: a_ext }),
                    rank,
                );
                self.unify_vars(b_ext, sub)?;
                a_ext
            }
            (false, false) => {
                let shared_ext = self.store.fresh(rank);
                let b_only_fields = self.store.alloc_fields(only_b);
                let a_sub = self.store.fresh_with(
                    Content::Structure(FlatType::Record { fields: b_only_fields, ext: shared_ext }),
                    rank,
                );
                self.unify_vars(a_ext, a_sub)?;
                let a_only_fields = self.store.alloc_fields(only_a);
                let b_sub = self.store.fresh_with(
                    Content::Structure(FlatType::Record { fields: a_only_fields, ext: shared_ext }),
                    rank,
                );
                self.unify_vars(b_ext, b_sub)?;
                shared_ext
            }
        };

        let fields = self.store.alloc_fields(merged_fields);
        self.merge(a, b, FlatType::Record { fields, ext: merged_ext })
    }

    fn unify_tag_unions(
        &mut self,
        a: Var,
        b: Var,
        a_tags: crate::TagSlice,
        a_ext: Var,
        b_tags: crate::TagSlice,
        b_ext: Var,
    ) -> Result<(), Mismatch> {
        let a_list = self.store.tags(a_tags).to_vec();
        let b_list = self.store.tags(b_tags).to_vec();

        let mut shared: Vec<(Ident, crate::VarSlice, crate::VarSlice)> = Vec::new();
        let mut only_a: Vec<(Ident, crate::VarSlice)> = Vec::new();
        let mut only_b: Vec<(Ident, crate::VarSlice)> = Vec::new();
        let (mut i, mut j) = (0, 0);
        while i < a_list.len() && j < b_list.len() {
            match a_list[i].0.cmp(&b_list[j].0) {
                std::cmp::Ordering::Equal => {
                    shared.push((a_list[i].0, a_list[i].1, b_list[j].1));
                    i += 1;
                    j += 1;
                }
                std::cmp::Ordering::Less => {
                    only_a.push(a_list[i]);
                    i += 1;
                }
                std::cmp::Ordering::Greater => {
                    only_b.push(b_list[j]);
                    j += 1;
                }
            }
        }
        only_a.extend_from_slice(&a_list[i..]);
        only_b.extend_from_slice(&b_list[j..]);

        for &(name, a_payload, b_payload) in &shared {
            if a_payload.count() != b_payload.count() {
                return self.fail(MismatchKind::Arity, a, b);
            }
            let a_vars = self.store.vars(a_payload).to_vec();
            let b_vars = self.store.vars(b_payload).to_vec();
            let label = format!("in the payload of `{}`", self.idents.text(name));
            for (&x, &y) in a_vars.iter().zip(b_vars.iter()) {
                self.in_path(&label, |u| u.unify_vars(x, y))?;
            }
        }

        let rank = self.store_rank(a).min(self.store_rank(b));
        let merged_tags: Vec<(Ident, crate::VarSlice)> = shared
            .iter()
            .map(|&(name, payload, _)| (name, payload))
            .chain(only_a.iter().copied())
            .chain(only_b.iter().copied())
            .collect();

        let merged_ext = match (only_a.is_empty(), only_b.is_empty()) {
            (true, true) => {
                self.unify_vars(a_ext, b_ext)?;
                a_ext
            }
            (true, false) => {
                let tags = self.store.alloc_tags(only_b);
                let sub = self.store.fresh_with(
                    Content::Structure(FlatType::TagUnion { tags, ext: b_ext }),
                    rank,
                );
                self.unify_vars(a_ext, sub)?;
                b_ext
            }
            (false, true) => {
                let tags = self.store.alloc_tags(only_a);
                let sub = self.store.fresh_with(
                    Content::Structure(FlatType::TagUnion { tags, ext: a_ext }),
                    rank,
                );
                self.unify_vars(b_ext, sub)?;
                a_ext
            }
            (false, false) => {
                let shared_ext = self.store.fresh(rank);
                let b_only_tags = self.store.alloc_tags(only_b);
                let a_sub = self.store.fresh_with(
                    Content::Structure(FlatType::TagUnion { tags: b_only_tags, ext: shared_ext }),
                    rank,
                );
                self.unify_vars(a_ext, a_sub)?;
                let a_only_tags = self.store.alloc_tags(only_a);
                let b_sub = self.store.fresh_with(
                    Content::Structure(FlatType::TagUnion { tags: a_only_tags, ext: shared_ext }),
                    rank,
                );
                self.unify_vars(b_ext, b_sub)?;
                shared_ext
            }
        };

        let tags = self.store.alloc_tags(merged_tags);
        self.merge(a, b, FlatType::TagUnion { tags, ext: merged_ext })
    }

    fn unify_num(&mut self, a: Var, b: Var, x: Num, y: Num) -> Result<(), Mismatch> {
        use crate::types::NumCompact::{Frac, Int};
        use Num::*;
        let merged = match (x, y) {
            (NumUnbound(r1), NumUnbound(r2)) => NumUnbound(r1.merge(r2)),
            (NumUnbound(r1), IntUnbound(r2)) | (IntUnbound(r1), NumUnbound(r2)) => {
                IntUnbound(r1.merge(r2))
            }
            (NumUnbound(_), FracUnbound) | (FracUnbound, NumUnbound(_)) => FracUnbound,
            (IntUnbound(r1), IntUnbound(r2)) => IntUnbound(r1.merge(r2)),
            (FracUnbound, FracUnbound) => FracUnbound,
            (IntUnbound(_), FracUnbound) | (FracUnbound, IntUnbound(_)) => {
                return self.fail(MismatchKind::NumberKind, a, b);
            }

            // Evidence meets a precision requirement: the number compacts.
            (NumUnbound(req), IntPrecision(p))
            | (IntPrecision(p), NumUnbound(req))
            | (IntUnbound(req), IntPrecision(p))
            | (IntPrecision(p), IntUnbound(req)) => {
                if !int_req_fits(req, p) {
                    return self.fail(MismatchKind::IntPrecisionMismatch, a, b);
                }
                Compact(Int(p))
            }
            (NumUnbound(_), FracPrecision(p))
            | (FracPrecision(p), NumUnbound(_))
            | (FracUnbound, FracPrecision(p))
            | (FracPrecision(p), FracUnbound) => Compact(Frac(p)),
            (IntUnbound(_), FracPrecision(_)) | (FracPrecision(_), IntUnbound(_)) => {
                return self.fail(MismatchKind::NumberKind, a, b);
            }
            (FracUnbound, IntPrecision(_)) | (IntPrecision(_), FracUnbound) => {
                return self.fail(MismatchKind::NumberKind, a, b);
            }

            (IntPrecision(p), IntPrecision(q)) => {
                if p != q {
                    return self.fail(MismatchKind::IntPrecisionMismatch, a, b);
                }
                IntPrecision(p)
            }
            (FracPrecision(p), FracPrecision(q)) => {
                if p != q {
                    return self.fail(MismatchKind::FracPrecisionMismatch, a, b);
                }
                FracPrecision(p)
            }
            (IntPrecision(_), FracPrecision(_)) | (FracPrecision(_), IntPrecision(_)) => {
                return self.fail(MismatchKind::NumberKind, a, b);
            }

            (Compact(c1), Compact(c2)) => {
                if c1 != c2 {
                    let kind = match (c1, c2) {
                        (Int(_), Int(_)) => MismatchKind::IntPrecisionMismatch,
                        (Frac(_), Frac(_)) => MismatchKind::FracPrecisionMismatch,
                        _ => MismatchKind::NumberKind,
                    };
                    return self.fail(kind, a, b);
                }
                Compact(c1)
            }
            (Compact(Int(p)), NumUnbound(req))
            | (NumUnbound(req), Compact(Int(p)))
            | (Compact(Int(p)), IntUnbound(req))
            | (IntUnbound(req), Compact(Int(p))) => {
                if !int_req_fits(req, p) {
                    return self.fail(MismatchKind::IntPrecisionMismatch, a, b);
                }
                Compact(Int(p))
            }
            (Compact(Frac(p)), NumUnbound(_))
            | (NumUnbound(_), Compact(Frac(p)))
            | (Compact(Frac(p)), FracUnbound)
            | (FracUnbound, Compact(Frac(p))) => Compact(Frac(p)),
            (Compact(Int(p)), IntPrecision(q)) | (IntPrecision(q), Compact(Int(p))) => {
                if p != q {
                    return self.fail(MismatchKind::IntPrecisionMismatch, a, b);
                }
                Compact(Int(p))
            }
            (Compact(Frac(p)), FracPrecision(q)) | (FracPrecision(q), Compact(Frac(p))) => {
                if p != q {
                    return self.fail(MismatchKind::FracPrecisionMismatch, a, b);
                }
                Compact(Frac(p))
            }
            (Compact(Int(_)), FracUnbound)
            | (FracUnbound, Compact(Int(_)))
            | (Compact(Int(_)), FracPrecision(_))
            | (FracPrecision(_), Compact(Int(_)))
            | (Compact(Frac(_)), IntUnbound(_))
            | (IntUnbound(_), Compact(Frac(_)))
            | (Compact(Frac(_)), IntPrecision(_))
            | (IntPrecision(_), Compact(Frac(_))) => {
                return self.fail(MismatchKind::NumberKind, a, b);
            }

            // `Num a` / `Int a` / `Frac a` from annotations: unify the
            // parameter vars, or bind the parameter to the counterpart.
            (NumPoly(v1), NumPoly(v2)) => {
                self.unify_vars(v1, v2)?;
                NumPoly(v1)
            }
            (IntPoly(v1), IntPoly(v2)) => {
                self.unify_vars(v1, v2)?;
                IntPoly(v1)
            }
            (FracPoly(v1), FracPoly(v2)) => {
                self.unify_vars(v1, v2)?;
                FracPoly(v1)
            }
            (NumPoly(v), other) | (other, NumPoly(v)) => {
                let rank = self.store_rank(a);
                let inner = self
                    .store
                    .fresh_with(Content::Structure(FlatType::Num(other)), rank);
                self.unify_vars(v, inner)?;
                NumPoly(v)
            }
            (IntPoly(v), other @ (IntUnbound(_) | IntPrecision(_) | Compact(Int(_))))
            | (other @ (IntUnbound(_) | IntPrecision(_) | Compact(Int(_))), IntPoly(v)) => {
                let rank = self.store_rank(a);
                let inner = self
                    .store
                    .fresh_with(Content::Structure(FlatType::Num(other)), rank);
                self.unify_vars(v, inner)?;
                IntPoly(v)
            }
            (FracPoly(v), other @ (FracUnbound | FracPrecision(_) | Compact(Frac(_))))
            | (other @ (FracUnbound | FracPrecision(_) | Compact(Frac(_))), FracPoly(v)) => {
                let rank = self.store_rank(a);
                let inner = self
                    .store
                    .fresh_with(Content::Structure(FlatType::Num(other)), rank);
                self.unify_vars(v, inner)?;
                FracPoly(v)
            }
            (IntPoly(_), _) | (_, IntPoly(_)) | (FracPoly(_), _) | (_, FracPoly(_)) => {
                return self.fail(MismatchKind::NumberKind, a, b);
            }
        };
        self.merge(a, b, FlatType::Num(merged))
    }

    fn unify_zip(&mut self, xs: crate::VarSlice, ys: crate::VarSlice) -> Result<(), Mismatch> {
        let x_vars = self.store.vars(xs).to_vec();
        let y_vars = self.store.vars(ys).to_vec();
        for (&x, &y) in x_vars.iter().zip(y_vars.iter()) {
            self.unify_vars(x, y)?;
        }
        Ok(())
    }

    fn merge(&mut self, a: Var, b: Var, flat: FlatType) -> Result<(), Mismatch> {
        self.store.union(a, b, Content::Structure(flat));
        Ok(())
    }

    fn store_rank(&mut self, var: Var) -> crate::Rank {
        self.store.desc(var).rank
    }

    fn in_path<T>(
        &mut self,
        label: &str,
        f: impl FnOnce(&mut Self) -> Result<T, Mismatch>,
    ) -> Result<T, Mismatch> {
        self.path.push(label.to_owned());
        let result = f(self);
        self.path.pop();
        result
    }

    fn fail(&mut self, kind: MismatchKind, a: Var, b: Var) -> Result<(), Mismatch> {
        Err(self.fail_err(kind, a, b))
    }

    /// Render both sides, poison them, and build the mismatch.
    fn fail_err(&mut self, kind: MismatchKind, a: Var, b: Var) -> Mismatch {
        let expected = render_var(self.store, self.idents, a);
        let found = render_var(self.store, self.idents, b);
        self.store.union(a, b, Content::Err);
        Mismatch {
            kind,
            expected,
            found,
            path: self.path.join(", "),
        }
    }
}

/// Whether literal evidence fits an integer precision.
fn int_req_fits(req: IntReq, precision: crate::IntPrecision) -> bool {
    if req.sign_needed && !precision.is_signed() {
        return false;
    }
    let bits = precision.size() * 8;
    let usable = if precision.is_signed() { bits - 1 } else { bits };
    // A negative value at exactly the sign boundary still fits; keep the
    // check conservative rather than exact.
    u32::from(req.bits_needed) <= usable
}
