//! Tag union representations.
//!
//! The representation is chosen from the shape of the tag set:
//!
//! | Shape                                   | Representation        |
//! |-----------------------------------------|-----------------------|
//! | one tag, no payload                     | `SingleTagStruct` (zero-sized) |
//! | all tags empty                          | `Enumeration` (one byte) |
//! | one tag with payload, not recursive     | `SingleTagStruct`     |
//! | one tag, recursive                      | `NonNullableUnwrapped`|
//! | two tags, one empty, recursive          | `NullableUnwrapped`   |
//! | many tags, one empty, recursive         | `NullableWrapped`     |
//! | otherwise                               | `Wrapped` (discriminant byte + widest payload) |
//!
//! Recursive payload positions are stored behind a pointer.

use crate::{align_up, Layout, LayoutError, LayoutIdx, LayoutStore};
use rill_ir::Ident;
use rill_types::{TypeStore, Var, VarSlice};

/// How a tag union is represented in memory.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub enum UnionRepr {
    /// No payloads anywhere: just a discriminant byte.
    Enumeration,
    /// A single tag: the payload struct itself, no discriminant.
    SingleTagStruct,
    /// A single recursive tag: a pointer to the payload.
    NonNullableUnwrapped,
    /// Two tags, one empty: the empty tag is the null pointer.
    NullableUnwrapped { null_tag: u16 },
    /// Many tags, one empty: null pointer plus tagged pointees.
    NullableWrapped { null_tag: u16 },
    /// Discriminant byte after the widest payload region.
    Wrapped,
}

/// Layout of one variant's payload.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct VariantLayout {
    pub name: Ident,
    pub arg_layouts: Vec<LayoutIdx>,
    /// Offset of each argument within the payload region.
    pub arg_offsets: Vec<u32>,
    /// Total payload extent of this variant.
    pub payload_size: u32,
}

/// A fully computed tag union layout. Variants are in canonical order; a
/// variant's position in the list is its discriminant value.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct UnionLayout {
    pub repr: UnionRepr,
    pub variants: Vec<VariantLayout>,
    /// Byte offset of the discriminant, when one exists.
    pub discriminant_offset: Option<u32>,
    pub size: u32,
    pub alignment: u32,
}

impl UnionLayout {
    /// Discriminant value of a tag, by name.
    pub fn discriminant_of(&self, name: Ident) -> Option<u16> {
        self.variants
            .iter()
            .position(|v| v.name == name)
            .map(|i| i as u16)
    }
}

pub(crate) fn build_union(
    store: &mut LayoutStore,
    types: &mut TypeStore,
    tags: Vec<(Ident, VarSlice)>,
) -> Result<UnionLayout, LayoutError> {
    let mut recursive = false;
    let mut variants: Vec<VariantLayout> = Vec::with_capacity(tags.len());
    let mut max_payload = 0u32;
    let mut max_align = 1u32;

    for (name, payload) in tags {
        let payload_vars: Vec<Var> = types.vars(payload).to_vec();
        let mut arg_layouts = Vec::with_capacity(payload_vars.len());
        let mut arg_offsets = Vec::with_capacity(payload_vars.len());
        let mut offset = 0u32;
        for var in payload_vars {
            let layout = match store.layout_of(types, var) {
                Ok(layout) => layout,
                Err(LayoutError::Recursive) => {
                    // Recursive positions are pointers to the union itself.
                    recursive = true;
                    let unit = store.unit();
                    store.intern(Layout::Box { elem: unit })
                }
                Err(other) => return Err(other),
            };
            offset = align_up(offset, store.alignment(layout));
            arg_offsets.push(offset);
            offset += store.size(layout);
            max_align = max_align.max(store.alignment(layout));
            arg_layouts.push(layout);
        }
        max_payload = max_payload.max(offset);
        variants.push(VariantLayout {
            name,
            arg_layouts,
            arg_offsets,
            payload_size: offset,
        });
    }

    let all_empty = variants.iter().all(|v| v.arg_layouts.is_empty());
    let null_tag = variants
        .iter()
        .position(|v| v.arg_layouts.is_empty())
        .map(|i| i as u16);

    let (repr, discriminant_offset, size, alignment) = if all_empty {
        if variants.len() == 1 {
            // A single empty tag carries no information at all.
            (UnionRepr::SingleTagStruct, None, 0, 1)
        } else {
            (UnionRepr::Enumeration, Some(0), 1, 1)
        }
    } else if variants.len() == 1 {
        if recursive {
            (UnionRepr::NonNullableUnwrapped, None, 8, 8)
        } else {
            (
                UnionRepr::SingleTagStruct,
                None,
                align_up(max_payload, max_align),
                max_align,
            )
        }
    } else if recursive {
        match null_tag {
            Some(null) if variants.len() == 2 => {
                (UnionRepr::NullableUnwrapped { null_tag: null }, None, 8, 8)
            }
            Some(null) => (UnionRepr::NullableWrapped { null_tag: null }, None, 8, 8),
            None => {
                // Recursive through pointers, so the non-null layout rules
                // still apply.
                let payload_area = align_up(max_payload, max_align);
                let size = align_up(payload_area + 1, max_align);
                (UnionRepr::Wrapped, Some(payload_area), size, max_align)
            }
        }
    } else {
        // Discriminant byte lives after the widest payload region.
        let payload_area = align_up(max_payload, max_align);
        let size = align_up(payload_area + 1, max_align);
        (UnionRepr::Wrapped, Some(payload_area), size, max_align)
    };

    Ok(UnionLayout {
        repr,
        variants,
        discriminant_offset,
        size,
        alignment,
    })
}
