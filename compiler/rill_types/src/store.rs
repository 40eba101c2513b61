//! The union-find type store.
//!
//! Variables are dense indices. Each root carries a [`Descriptor`]; non-root
//! variables point at their parent. `resolve` path-compresses, so chains stay
//! near-flat and resolution is effectively constant time. Representatives are
//! the only place content is read from.

use crate::types::{Content, Descriptor, FlatType, Mark, Rank, Var, VarSlice};
use crate::{FieldSlice, TagSlice};
use rill_ir::Ident;
use rustc_hash::FxHashMap;

/// Union-find forest of type descriptors plus the side buffers compound
/// contents slice into.
pub struct TypeStore {
    /// Parent pointers; a var is a root iff `parents[v] == v`.
    parents: Vec<u32>,
    /// Union-by-size weights, valid at roots.
    sizes: Vec<u32>,
    /// Descriptors, valid at roots.
    descs: Vec<Descriptor>,
    var_buf: Vec<Var>,
    field_buf: Vec<(Ident, Var)>,
    tag_buf: Vec<(Ident, VarSlice)>,
}

impl TypeStore {
    /// Create an empty store.
    pub fn new() -> Self {
        TypeStore {
            parents: Vec::with_capacity(256),
            sizes: Vec::with_capacity(256),
            descs: Vec::with_capacity(256),
            var_buf: Vec::new(),
            field_buf: Vec::new(),
            tag_buf: Vec::new(),
        }
    }

    /// Number of variables allocated.
    pub fn len(&self) -> usize {
        self.parents.len()
    }

    /// Whether no variables exist yet.
    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }

    /// Allocate a fresh unnamed flex var at `rank`.
    pub fn fresh(&mut self, rank: Rank) -> Var {
        self.fresh_with(Content::FlexVar(None), rank)
    }

    /// Allocate a fresh var with explicit content at `rank`.
    pub fn fresh_with(&mut self, content: Content, rank: Rank) -> Var {
        let raw = u32::try_from(self.parents.len())
            .unwrap_or_else(|_| panic!("type store exceeded {} vars", u32::MAX));
        self.parents.push(raw);
        self.sizes.push(1);
        self.descs.push(Descriptor {
            content,
            rank,
            mark: Mark::NONE,
        });
        Var(raw)
    }

    /// Find the representative of `var`, compressing the path.
    pub fn resolve(&mut self, var: Var) -> Var {
        let mut root = var;
        while self.parents[root.index()] != root.raw() {
            root = Var(self.parents[root.index()]);
        }
        // Second pass: point everything on the path at the root.
        let mut walk = var;
        while walk != root {
            let next = Var(self.parents[walk.index()]);
            self.parents[walk.index()] = root.raw();
            walk = next;
        }
        root
    }

    /// Content of `var`'s representative.
    pub fn content(&mut self, var: Var) -> Content {
        let root = self.resolve(var);
        self.descs[root.index()].content
    }

    /// Descriptor of `var`'s representative.
    pub fn desc(&mut self, var: Var) -> Descriptor {
        let root = self.resolve(var);
        self.descs[root.index()]
    }

    /// Overwrite the representative's content.
    pub fn set_content(&mut self, var: Var, content: Content) {
        let root = self.resolve(var);
        self.descs[root.index()].content = content;
    }

    /// Overwrite the representative's rank.
    pub fn set_rank(&mut self, var: Var, rank: Rank) {
        let root = self.resolve(var);
        self.descs[root.index()].rank = rank;
    }

    /// Overwrite the representative's mark.
    pub fn set_mark(&mut self, var: Var, mark: Mark) {
        let root = self.resolve(var);
        self.descs[root.index()].mark = mark;
    }

    /// Union two variables, giving the merged root `content`.
    ///
    /// Union-by-size picks the physical root; the semantic winner is
    /// whatever `content` the caller passes. The merged rank is the lower of
    /// the two (the outermost scope wins).
    pub fn union(&mut self, a: Var, b: Var, content: Content) {
        let a_root = self.resolve(a);
        let b_root = self.resolve(b);
        if a_root == b_root {
            self.descs[a_root.index()].content = content;
            return;
        }
        let rank = self.descs[a_root.index()]
            .rank
            .min(self.descs[b_root.index()].rank);
        let (winner, loser) = if self.sizes[a_root.index()] >= self.sizes[b_root.index()] {
            (a_root, b_root)
        } else {
            (b_root, a_root)
        };
        self.parents[loser.index()] = winner.raw();
        self.sizes[winner.index()] += self.sizes[loser.index()];
        self.descs[winner.index()] = Descriptor {
            content,
            rank,
            mark: Mark::NONE,
        };
    }

    // === Side buffers ===

    /// Store a var list, returning its slice.
    pub fn alloc_vars(&mut self, vars: impl IntoIterator<Item = Var>) -> VarSlice {
        let start = u32::try_from(self.var_buf.len())
            .unwrap_or_else(|_| panic!("type store var buffer exceeded {} entries", u32::MAX));
        self.var_buf.extend(vars);
        let len = u16::try_from(self.var_buf.len() - start as usize)
            .unwrap_or_else(|_| panic!("type var slice exceeded {} entries", u16::MAX));
        VarSlice { start, len }
    }

    /// The vars covered by `slice`.
    pub fn vars(&self, slice: VarSlice) -> &[Var] {
        let start = slice.start as usize;
        &self.var_buf[start..start + slice.len as usize]
    }

    /// Store a field list in canonical order (sorted by interned handle).
    pub fn alloc_fields(&mut self, fields: impl IntoIterator<Item = (Ident, Var)>) -> FieldSlice {
        let start = u32::try_from(self.field_buf.len())
            .unwrap_or_else(|_| panic!("type store field buffer exceeded {} entries", u32::MAX));
        self.field_buf.extend(fields);
        self.field_buf[start as usize..].sort_by_key(|&(name, _)| name);
        let len = u16::try_from(self.field_buf.len() - start as usize)
            .unwrap_or_else(|_| panic!("type field slice exceeded {} entries", u16::MAX));
        FieldSlice { start, len }
    }

    /// The fields covered by `slice`.
    pub fn fields(&self, slice: FieldSlice) -> &[(Ident, Var)] {
        let start = slice.start as usize;
        &self.field_buf[start..start + slice.len as usize]
    }

    /// Store a tag list in canonical order (sorted by interned handle).
    pub fn alloc_tags(
        &mut self,
        tags: impl IntoIterator<Item = (Ident, VarSlice)>,
    ) -> TagSlice {
        let start = u32::try_from(self.tag_buf.len())
            .unwrap_or_else(|_| panic!("type store tag buffer exceeded {} entries", u32::MAX));
        self.tag_buf.extend(tags);
        self.tag_buf[start as usize..].sort_by_key(|&(name, _)| name);
        let len = u16::try_from(self.tag_buf.len() - start as usize)
            .unwrap_or_else(|_| panic!("type tag slice exceeded {} entries", u16::MAX));
        TagSlice { start, len }
    }

    /// The tags covered by `slice`.
    pub fn tags(&self, slice: TagSlice) -> &[(Ident, VarSlice)] {
        let start = slice.start as usize;
        &self.tag_buf[start..start + slice.len as usize]
    }

    // === Generalization ===

    /// Generalize the type graph reachable from `var`: every variable whose
    /// rank is at or above `boundary` becomes quantified. Lower-ranked
    /// (escaping) variables stay monomorphic.
    pub fn generalize(&mut self, var: Var, boundary: Rank) {
        let root = self.resolve(var);
        let desc = self.descs[root.index()];
        if desc.rank.is_generalized() || desc.rank < boundary {
            return;
        }
        self.descs[root.index()].rank = Rank::GENERALIZED;
        self.walk_children(desc.content, |store, child| store.generalize(child, boundary));
    }

    // === Instantiation ===

    /// Copy the generalized parts of `var`'s type graph, substituting fresh
    /// vars for every quantified var. Sharing is preserved: two references
    /// to one quantified var map to one fresh var, so recursive uses point
    /// at the same fresh root. Monomorphic parts are shared, not copied.
    pub fn instantiate(&mut self, var: Var, rank: Rank) -> Var {
        let mut subst: FxHashMap<Var, Var> = FxHashMap::default();
        self.instantiate_help(var, rank, &mut subst)
    }

    fn instantiate_help(&mut self, var: Var, rank: Rank, subst: &mut FxHashMap<Var, Var>) -> Var {
        let root = self.resolve(var);
        if let Some(&copied) = subst.get(&root) {
            return copied;
        }
        let desc = self.descs[root.index()];
        if !desc.rank.is_generalized() {
            return root;
        }
        match desc.content {
            Content::FlexVar(name) => {
                let fresh = self.fresh_with(Content::FlexVar(name), rank);
                subst.insert(root, fresh);
                fresh
            }
            Content::RigidVar(name) => {
                // Rigids become flex on instantiation: the scheme's caller
                // may pick any type for them.
                let fresh = self.fresh_with(Content::FlexVar(Some(name)), rank);
                subst.insert(root, fresh);
                fresh
            }
            Content::Err => root,
            Content::Alias { ident, args, backing } => {
                let fresh = self.fresh(rank);
                subst.insert(root, fresh);
                let args: Vec<Var> = self.vars(args).to_vec();
                let args: Vec<Var> = args
                    .into_iter()
                    .map(|arg| self.instantiate_help(arg, rank, subst))
                    .collect();
                let backing = self.instantiate_help(backing, rank, subst);
                let args = self.alloc_vars(args);
                self.set_content(fresh, Content::Alias { ident, args, backing });
                fresh
            }
            Content::Structure(flat) => {
                let fresh = self.fresh(rank);
                subst.insert(root, fresh);
                let copied = self.instantiate_flat(flat, rank, subst);
                self.set_content(fresh, Content::Structure(copied));
                fresh
            }
        }
    }

    fn instantiate_flat(
        &mut self,
        flat: FlatType,
        rank: Rank,
        subst: &mut FxHashMap<Var, Var>,
    ) -> FlatType {
        let copy_slice = |store: &mut Self, slice: VarSlice, subst: &mut FxHashMap<Var, Var>| {
            let vars: Vec<Var> = store.vars(slice).to_vec();
            let vars: Vec<Var> = vars
                .into_iter()
                .map(|v| store.instantiate_help(v, rank, subst))
                .collect();
            store.alloc_vars(vars)
        };
        match flat {
            FlatType::Str => FlatType::Str,
            FlatType::EmptyRecord => FlatType::EmptyRecord,
            FlatType::EmptyTagUnion => FlatType::EmptyTagUnion,
            FlatType::ListUnbound => FlatType::ListUnbound,
            FlatType::Num(num) => FlatType::Num(num),
            FlatType::Box(elem) => FlatType::Box(self.instantiate_help(elem, rank, subst)),
            FlatType::List(elem) => FlatType::List(self.instantiate_help(elem, rank, subst)),
            FlatType::Tuple(elems) => FlatType::Tuple(copy_slice(self, elems, subst)),
            FlatType::Nominal { ident, args, backing, origin } => FlatType::Nominal {
                ident,
                args: copy_slice(self, args, subst),
                backing: self.instantiate_help(backing, rank, subst),
                origin,
            },
            FlatType::FnPure(func) => FlatType::FnPure(self.instantiate_func(func, rank, subst)),
            FlatType::FnEffectful(func) => {
                FlatType::FnEffectful(self.instantiate_func(func, rank, subst))
            }
            FlatType::FnUnbound(func) => {
                FlatType::FnUnbound(self.instantiate_func(func, rank, subst))
            }
            FlatType::Record { fields, ext } => {
                let copied: Vec<(Ident, Var)> = self.fields(fields).to_vec();
                let copied: Vec<(Ident, Var)> = copied
                    .into_iter()
                    .map(|(name, v)| (name, self.instantiate_help(v, rank, subst)))
                    .collect();
                FlatType::Record {
                    fields: self.alloc_fields(copied),
                    ext: self.instantiate_help(ext, rank, subst),
                }
            }
            FlatType::RecordUnbound { fields } => {
                let copied: Vec<(Ident, Var)> = self.fields(fields).to_vec();
                let copied: Vec<(Ident, Var)> = copied
                    .into_iter()
                    .map(|(name, v)| (name, self.instantiate_help(v, rank, subst)))
                    .collect();
                FlatType::RecordUnbound {
                    fields: self.alloc_fields(copied),
                }
            }
            FlatType::TagUnion { tags, ext } => {
                let copied: Vec<(Ident, VarSlice)> = self.tags(tags).to_vec();
                let copied: Vec<(Ident, VarSlice)> = copied
                    .into_iter()
                    .map(|(name, payload)| {
                        let payload = {
                            let vars: Vec<Var> = self.vars(payload).to_vec();
                            let vars: Vec<Var> = vars
                                .into_iter()
                                .map(|v| self.instantiate_help(v, rank, subst))
                                .collect();
                            self.alloc_vars(vars)
                        };
                        (name, payload)
                    })
                    .collect();
                FlatType::TagUnion {
                    tags: self.alloc_tags(copied),
                    ext: self.instantiate_help(ext, rank, subst),
                }
            }
        }
    }

    /// Call `f` on each var directly referenced by `content`.
    fn walk_children(&mut self, content: Content, mut f: impl FnMut(&mut Self, Var)) {
        match content {
            Content::FlexVar(_) | Content::RigidVar(_) | Content::Err => {}
            Content::Alias { args, backing, .. } => {
                for var in self.vars(args).to_vec() {
                    f(self, var);
                }
                f(self, backing);
            }
            Content::Structure(flat) => match flat {
                FlatType::Str
                | FlatType::EmptyRecord
                | FlatType::EmptyTagUnion
                | FlatType::ListUnbound => {}
                FlatType::Num(num) => match num {
                    crate::Num::NumPoly(v) | crate::Num::IntPoly(v) | crate::Num::FracPoly(v) => {
                        f(self, v);
                    }
                    _ => {}
                },
                FlatType::Box(v) | FlatType::List(v) => f(self, v),
                FlatType::Tuple(elems) => {
                    for var in self.vars(elems).to_vec() {
                        f(self, var);
                    }
                }
                FlatType::Nominal { args, backing, .. } => {
                    for var in self.vars(args).to_vec() {
                        f(self, var);
                    }
                    f(self, backing);
                }
                FlatType::FnPure(func) | FlatType::FnEffectful(func) | FlatType::FnUnbound(func) => {
                    for var in self.vars(func.args).to_vec() {
                        f(self, var);
                    }
                    f(self, func.ret);
                }
                FlatType::Record { fields, ext } => {
                    for (_, var) in self.fields(fields).to_vec() {
                        f(self, var);
                    }
                    f(self, ext);
                }
                FlatType::RecordUnbound { fields } => {
                    for (_, var) in self.fields(fields).to_vec() {
                        f(self, var);
                    }
                }
                FlatType::TagUnion { tags, ext } => {
                    for (_, payload) in self.tags(tags).to_vec() {
                        for var in self.vars(payload).to_vec() {
                            f(self, var);
                        }
                    }
                    f(self, ext);
                }
            },
        }
    }

    fn instantiate_func(
        &mut self,
        func: crate::Func,
        rank: Rank,
        subst: &mut FxHashMap<Var, Var>,
    ) -> crate::Func {
        let args: Vec<Var> = self.vars(func.args).to_vec();
        let args: Vec<Var> = args
            .into_iter()
            .map(|v| self.instantiate_help(v, rank, subst))
            .collect();
        crate::Func {
            args: self.alloc_vars(args),
            ret: self.instantiate_help(func.ret, rank, subst),
        }
    }
}

impl Default for TypeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TypeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TypeStore({} vars)", self.parents.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IntReq;
    use crate::Num;

    #[test]
    fn fresh_vars_resolve_to_themselves() {
        let mut store = TypeStore::new();
        let a = store.fresh(Rank::TOP);
        assert_eq!(store.resolve(a), a);
        assert!(matches!(store.content(a), Content::FlexVar(None)));
    }

    #[test]
    fn union_merges_representatives() {
        let mut store = TypeStore::new();
        let a = store.fresh(Rank::TOP);
        let b = store.fresh(Rank::TOP);
        store.union(a, b, Content::Structure(FlatType::Str));
        assert_eq!(store.resolve(a), store.resolve(b));
        assert!(matches!(store.content(a), Content::Structure(FlatType::Str)));
        assert!(matches!(store.content(b), Content::Structure(FlatType::Str)));
    }

    #[test]
    fn path_compression_flattens_chains() {
        let mut store = TypeStore::new();
        let vars: Vec<Var> = (0..10).map(|_| store.fresh(Rank::TOP)).collect();
        for window in vars.windows(2) {
            store.union(window[0], window[1], Content::FlexVar(None));
        }
        let root = store.resolve(vars[0]);
        for &var in &vars {
            assert_eq!(store.resolve(var), root);
        }
    }

    #[test]
    fn instantiate_replaces_generalized_vars() {
        let mut store = TypeStore::new();
        // scheme: a -> a, generalized.
        let a = store.fresh(Rank::TOP.next());
        let args = store.alloc_vars([a]);
        let func = store.fresh_with(
            Content::Structure(FlatType::FnUnbound(crate::Func { args, ret: a })),
            Rank::TOP.next(),
        );
        store.generalize(func, Rank::TOP.next());

        let inst = store.instantiate(func, Rank::TOP);
        assert_ne!(store.resolve(inst), store.resolve(func));
        let Content::Structure(FlatType::FnUnbound(copied)) = store.content(inst) else {
            panic!("expected function");
        };
        // Sharing preserved: the arg and ret map to the same fresh var.
        let arg = store.vars(copied.args)[0];
        assert_eq!(store.resolve(arg), store.resolve(copied.ret));
        // And it is not the original quantified var.
        assert_ne!(store.resolve(arg), store.resolve(a));
    }

    #[test]
    fn instantiate_shares_monomorphic_parts() {
        let mut store = TypeStore::new();
        let concrete = store.fresh_with(
            Content::Structure(FlatType::Num(Num::NumUnbound(IntReq::default()))),
            Rank::TOP,
        );
        let inst = store.instantiate(concrete, Rank::TOP);
        assert_eq!(store.resolve(inst), store.resolve(concrete));
    }
}
