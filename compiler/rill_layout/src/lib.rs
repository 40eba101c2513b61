//! Runtime memory layout computation.
//!
//! Maps resolved types to byte-level layouts: size, alignment, field
//! offsets, tag union representations, and closure environments. Layouts
//! are interned: equal layouts share a [`LayoutIdx`], so the interpreter
//! can compare representations by handle.
//!
//! Numeric defaults: a still-unbound `Num` lowers to `I64`, a still-unbound
//! `Frac` to `Dec`, matching what the evaluator scenarios expect.

mod union;

pub use union::{UnionLayout, UnionRepr, VariantLayout};

use rill_ir::Ident;
use rill_types::{
    Content, FlatType, FracPrecision, IntPrecision, Num, NumCompact, TypeStore, Var,
};
use rustc_hash::FxHashMap;

/// Handle to an interned layout.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
#[repr(transparent)]
pub struct LayoutIdx(u32);

impl LayoutIdx {
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Debug for LayoutIdx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LayoutIdx({})", self.0)
    }
}

/// Scalar layouts.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Scalar {
    Int(IntPrecision),
    Frac(FracPrecision),
    /// One byte; tag index in `{0, 1}`.
    Bool,
    /// A string handle into the evaluator's string table.
    Str,
}

impl Scalar {
    pub const fn size(self) -> u32 {
        match self {
            Scalar::Int(p) => p.size(),
            Scalar::Frac(p) => p.size(),
            Scalar::Bool => 1,
            Scalar::Str => 8,
        }
    }

    pub const fn alignment(self) -> u32 {
        match self {
            Scalar::Int(p) => p.size(),
            Scalar::Frac(p) => p.size(),
            Scalar::Bool => 1,
            Scalar::Str => 8,
        }
    }
}

/// The layout of one value.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Layout {
    Scalar(Scalar),
    /// Field table handle; zero fields is the zero-sized unit.
    Record(u32),
    /// Element table handle.
    Tuple(u32),
    /// List header (pointer, length, capacity), reserved by size only.
    List { elem: LayoutIdx },
    /// Boxed value: one pointer.
    Box { elem: LayoutIdx },
    /// Tag union; representation handle.
    Union(u32),
    /// Function value: fixed header plus `env_size` bytes of captures.
    Closure { env_size: u32 },
}

/// One record field with its resolved offset.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct FieldLayout {
    pub name: Ident,
    pub offset: u32,
    pub layout: LayoutIdx,
}

/// One tuple element with its resolved offset. `index` is the source
/// position; elements are stored in memory order.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct ElemLayout {
    pub index: u32,
    pub offset: u32,
    pub layout: LayoutIdx,
}

/// Why a type has no layout.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum LayoutError {
    /// The type is (or contains) `err`; checking already reported it.
    TypeError,
    /// The type graph loops in a position that cannot be unwrapped.
    Recursive,
}

impl std::fmt::Display for LayoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LayoutError::TypeError => write!(f, "type had errors, no layout exists"),
            LayoutError::Recursive => write!(f, "unrepresentable recursive type"),
        }
    }
}

impl std::error::Error for LayoutError {}

/// Size of the fixed closure header: body idx, params span, captures span,
/// env size.
pub const CLOSURE_HEADER_SIZE: u32 = 24;

/// Interning store for layouts.
pub struct LayoutStore {
    layouts: Vec<Layout>,
    sizes: Vec<u32>,
    aligns: Vec<u32>,
    dedup: FxHashMap<Layout, LayoutIdx>,
    record_tables: Vec<Vec<FieldLayout>>,
    tuple_tables: Vec<Vec<ElemLayout>>,
    unions: Vec<UnionLayout>,
    /// Vars currently being laid out, for recursion detection.
    in_progress: Vec<Var>,
    unit_idx: Option<LayoutIdx>,
}

impl LayoutStore {
    pub fn new() -> Self {
        LayoutStore {
            layouts: Vec::new(),
            sizes: Vec::new(),
            aligns: Vec::new(),
            dedup: FxHashMap::default(),
            record_tables: Vec::new(),
            tuple_tables: Vec::new(),
            unions: Vec::new(),
            in_progress: Vec::new(),
            unit_idx: None,
        }
    }

    /// The layout behind a handle.
    #[inline]
    pub fn get(&self, idx: LayoutIdx) -> &Layout {
        &self.layouts[idx.index()]
    }

    /// Size in bytes.
    #[inline]
    pub fn size(&self, idx: LayoutIdx) -> u32 {
        self.sizes[idx.index()]
    }

    /// Alignment in bytes (at least 1).
    #[inline]
    pub fn alignment(&self, idx: LayoutIdx) -> u32 {
        self.aligns[idx.index()]
    }

    /// Field table of a record layout.
    pub fn record_fields(&self, table: u32) -> &[FieldLayout] {
        &self.record_tables[table as usize]
    }

    /// Element table of a tuple layout.
    pub fn tuple_elems(&self, table: u32) -> &[ElemLayout] {
        &self.tuple_tables[table as usize]
    }

    /// Union data of a union layout.
    pub fn union(&self, handle: u32) -> &UnionLayout {
        &self.unions[handle as usize]
    }

    /// Intern a layout, computing size and alignment.
    pub fn intern(&mut self, layout: Layout) -> LayoutIdx {
        if let Some(&idx) = self.dedup.get(&layout) {
            return idx;
        }
        let (size, align) = self.measure(&layout);
        let idx = LayoutIdx(u32::try_from(self.layouts.len()).unwrap_or_else(|_| {
            panic!("layout store exceeded {} layouts", u32::MAX)
        }));
        self.dedup.insert(layout, idx);
        self.layouts.push(layout);
        self.sizes.push(size);
        self.aligns.push(align);
        idx
    }

    fn measure(&self, layout: &Layout) -> (u32, u32) {
        match layout {
            Layout::Scalar(scalar) => (scalar.size(), scalar.alignment()),
            Layout::Record(table) => {
                let fields = &self.record_tables[*table as usize];
                struct_extent(fields.iter().map(|f| (f.offset, f.layout)), self)
            }
            Layout::Tuple(table) => {
                let elems = &self.tuple_tables[*table as usize];
                struct_extent(elems.iter().map(|e| (e.offset, e.layout)), self)
            }
            Layout::List { .. } => (24, 8),
            Layout::Box { .. } => (8, 8),
            Layout::Union(handle) => {
                let union = &self.unions[*handle as usize];
                (union.size, union.alignment)
            }
            Layout::Closure { env_size } => (CLOSURE_HEADER_SIZE + env_size, 8),
        }
    }

    /// The unit layout: an empty record. Zero size, alignment one.
    pub fn unit(&mut self) -> LayoutIdx {
        if let Some(idx) = self.unit_idx {
            return idx;
        }
        self.record_tables.push(Vec::new());
        let table = (self.record_tables.len() - 1) as u32;
        let idx = self.intern(Layout::Record(table));
        self.unit_idx = Some(idx);
        idx
    }

    /// The `Bool` scalar layout.
    pub fn bool_layout(&mut self) -> LayoutIdx {
        self.intern(Layout::Scalar(Scalar::Bool))
    }

    /// The `Str` scalar layout.
    pub fn str_layout(&mut self) -> LayoutIdx {
        self.intern(Layout::Scalar(Scalar::Str))
    }

    /// A closure layout for a lambda with `env_size` bytes of captures.
    pub fn closure_layout(&mut self, env_size: u32) -> LayoutIdx {
        self.intern(Layout::Closure { env_size })
    }

    /// Compute the layout of a resolved type.
    pub fn layout_of(
        &mut self,
        types: &mut TypeStore,
        var: Var,
    ) -> Result<LayoutIdx, LayoutError> {
        let root = types.resolve(var);
        if self.in_progress.contains(&root) {
            // Recursive references are representable only inside tag
            // unions, which handle them before descending.
            return Err(LayoutError::Recursive);
        }
        self.in_progress.push(root);
        let result = self.layout_of_content(types, root);
        self.in_progress.pop();
        result
    }

    fn layout_of_content(
        &mut self,
        types: &mut TypeStore,
        root: Var,
    ) -> Result<LayoutIdx, LayoutError> {
        match types.content(root) {
            Content::Err => Err(LayoutError::TypeError),
            // An unconstrained value is never inspected; unit stands in.
            Content::FlexVar(_) | Content::RigidVar(_) => Ok(self.unit()),
            Content::Alias { backing, .. } => self.layout_of(types, backing),
            Content::Structure(flat) => self.layout_of_flat(types, flat),
        }
    }

    fn layout_of_flat(
        &mut self,
        types: &mut TypeStore,
        flat: FlatType,
    ) -> Result<LayoutIdx, LayoutError> {
        match flat {
            FlatType::Str => Ok(self.str_layout()),
            FlatType::Num(num) => Ok(self.layout_of_num(num)),
            FlatType::Box(elem) => {
                let elem = self.layout_of(types, elem)?;
                Ok(self.intern(Layout::Box { elem }))
            }
            FlatType::List(elem) => {
                let elem = self.layout_of(types, elem)?;
                Ok(self.intern(Layout::List { elem }))
            }
            FlatType::ListUnbound => {
                let elem = self.unit();
                Ok(self.intern(Layout::List { elem }))
            }
            FlatType::Tuple(elems) => {
                let vars = types.vars(elems).to_vec();
                let mut layouts = Vec::with_capacity(vars.len());
                for (index, var) in vars.into_iter().enumerate() {
                    layouts.push((index as u32, self.layout_of(types, var)?));
                }
                Ok(self.tuple_from(layouts))
            }
            FlatType::Nominal { ident: _, backing, .. } => {
                // `Bool` lowers to its dedicated scalar; other nominal types
                // share their backing's layout.
                if self.is_bool_backing(types, backing) {
                    Ok(self.bool_layout())
                } else {
                    self.layout_of(types, backing)
                }
            }
            FlatType::FnPure(_) | FlatType::FnEffectful(_) | FlatType::FnUnbound(_) => {
                // The true environment size comes from the lambda value;
                // the type alone describes an empty environment.
                Ok(self.closure_layout(0))
            }
            FlatType::Record { fields, ext } => {
                let mut all = types.fields(fields).to_vec();
                self.collect_record_ext(types, ext, &mut all);
                self.record_from(types, all)
            }
            FlatType::RecordUnbound { fields } => {
                let all = types.fields(fields).to_vec();
                self.record_from(types, all)
            }
            FlatType::EmptyRecord => Ok(self.unit()),
            FlatType::TagUnion { tags, ext } => {
                let mut all = types.tags(tags).to_vec();
                self.collect_tag_ext(types, ext, &mut all);
                self.union_from(types, all)
            }
            FlatType::EmptyTagUnion => Ok(self.unit()),
        }
    }

    fn layout_of_num(&mut self, num: Num) -> LayoutIdx {
        let scalar = match num {
            Num::Compact(NumCompact::Int(p)) | Num::IntPrecision(p) => Scalar::Int(p),
            Num::Compact(NumCompact::Frac(p)) | Num::FracPrecision(p) => Scalar::Frac(p),
            // Defaults for still-unbound numbers.
            Num::NumUnbound(_) | Num::IntUnbound(_) | Num::NumPoly(_) | Num::IntPoly(_) => {
                Scalar::Int(IntPrecision::I64)
            }
            Num::FracUnbound | Num::FracPoly(_) => Scalar::Frac(FracPrecision::Dec),
        };
        self.intern(Layout::Scalar(scalar))
    }

    fn is_bool_backing(&mut self, types: &mut TypeStore, backing: Var) -> bool {
        // Bool's backing is exactly a closed two-tag union of empty tags.
        if let Content::Structure(FlatType::TagUnion { tags, .. }) = types.content(backing) {
            let tags = types.tags(tags).to_vec();
            return tags.len() == 2 && tags.iter().all(|(_, payload)| payload.is_empty());
        }
        false
    }

    fn collect_record_ext(
        &mut self,
        types: &mut TypeStore,
        ext: Var,
        fields: &mut Vec<(Ident, Var)>,
    ) {
        let mut current = ext;
        loop {
            match types.content(current) {
                Content::Structure(FlatType::Record { fields: more, ext }) => {
                    fields.extend_from_slice(&types.fields(more).to_vec());
                    current = ext;
                }
                Content::Structure(FlatType::RecordUnbound { fields: more }) => {
                    fields.extend_from_slice(&types.fields(more).to_vec());
                    return;
                }
                Content::Alias { backing, .. } => current = backing,
                _ => return,
            }
        }
    }

    fn collect_tag_ext(
        &mut self,
        types: &mut TypeStore,
        ext: Var,
        tags: &mut Vec<(Ident, rill_types::VarSlice)>,
    ) {
        let mut current = ext;
        loop {
            match types.content(current) {
                Content::Structure(FlatType::TagUnion { tags: more, ext }) => {
                    tags.extend_from_slice(&types.tags(more).to_vec());
                    current = ext;
                }
                Content::Alias { backing, .. } => current = backing,
                _ => return,
            }
        }
    }

    /// Build a record layout: fields sorted by alignment descending, then
    /// source order, each placed at the next aligned offset.
    ///
    /// The tie-break mirrors [`tuple_from`](Self::tuple_from): each field's
    /// position in the incoming row decides ties, not its name.
    fn record_from(
        &mut self,
        types: &mut TypeStore,
        fields: Vec<(Ident, Var)>,
    ) -> Result<LayoutIdx, LayoutError> {
        if fields.is_empty() {
            return Ok(self.unit());
        }
        let mut resolved: Vec<(u32, Ident, LayoutIdx)> = Vec::with_capacity(fields.len());
        for (position, (name, var)) in fields.into_iter().enumerate() {
            resolved.push((position as u32, name, self.layout_of(types, var)?));
        }
        resolved.sort_by(|&(a_pos, _, a), &(b_pos, _, b)| {
            self.alignment(b)
                .cmp(&self.alignment(a))
                .then(a_pos.cmp(&b_pos))
        });

        let mut offset = 0u32;
        let mut table = Vec::with_capacity(resolved.len());
        for (_, name, layout) in resolved {
            offset = align_up(offset, self.alignment(layout));
            table.push(FieldLayout { name, offset, layout });
            offset += self.size(layout);
        }
        self.record_tables.push(table);
        let handle = (self.record_tables.len() - 1) as u32;
        Ok(self.intern(Layout::Record(handle)))
    }

    fn tuple_from(&mut self, elems: Vec<(u32, LayoutIdx)>) -> LayoutIdx {
        let mut ordered = elems;
        ordered.sort_by(|&(a_index, a), &(b_index, b)| {
            self.alignment(b)
                .cmp(&self.alignment(a))
                .then(a_index.cmp(&b_index))
        });
        let mut offset = 0u32;
        let mut table = Vec::with_capacity(ordered.len());
        for (index, layout) in ordered {
            offset = align_up(offset, self.alignment(layout));
            table.push(ElemLayout { index, offset, layout });
            offset += self.size(layout);
        }
        self.tuple_tables.push(table);
        let handle = (self.tuple_tables.len() - 1) as u32;
        self.intern(Layout::Tuple(handle))
    }

    fn union_from(
        &mut self,
        types: &mut TypeStore,
        tags: Vec<(Ident, rill_types::VarSlice)>,
    ) -> Result<LayoutIdx, LayoutError> {
        let union = union::build_union(self, types, tags)?;
        self.unions.push(union);
        let handle = (self.unions.len() - 1) as u32;
        Ok(self.intern(Layout::Union(handle)))
    }
}

impl Default for LayoutStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Round `offset` up to `align` (a power of two or 1).
pub fn align_up(offset: u32, align: u32) -> u32 {
    debug_assert!(align > 0);
    offset.div_ceil(align) * align
}

fn struct_extent(
    parts: impl Iterator<Item = (u32, LayoutIdx)>,
    store: &LayoutStore,
) -> (u32, u32) {
    let mut end = 0u32;
    let mut align = 1u32;
    for (offset, layout) in parts {
        end = end.max(offset + store.size(layout));
        align = align.max(store.alignment(layout));
    }
    (align_up(end, align), align)
}

#[cfg(test)]
mod tests;
