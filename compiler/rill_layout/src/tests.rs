use crate::{Layout, LayoutStore, Scalar, UnionRepr};
use pretty_assertions::assert_eq;
use rill_ir::IdentStore;
use rill_types::{
    Content, FlatType, FracPrecision, IntPrecision, IntReq, Num, Rank, TypeStore, Var,
};

fn str_var(types: &mut TypeStore) -> Var {
    types.fresh_with(Content::Structure(FlatType::Str), Rank::TOP)
}

fn int_var(types: &mut TypeStore, precision: IntPrecision) -> Var {
    types.fresh_with(
        Content::Structure(FlatType::Num(Num::Compact(rill_types::NumCompact::Int(precision)))),
        Rank::TOP,
    )
}

#[test]
fn scalar_sizes_and_alignments() {
    let mut store = LayoutStore::new();
    let mut types = TypeStore::new();

    let u8_var = int_var(&mut types, IntPrecision::U8);
    let Ok(u8_layout) = store.layout_of(&mut types, u8_var) else {
        panic!("expected layout");
    };
    assert_eq!(store.size(u8_layout), 1);
    assert_eq!(store.alignment(u8_layout), 1);

    let dec = types.fresh_with(
        Content::Structure(FlatType::Num(Num::Compact(rill_types::NumCompact::Frac(
            FracPrecision::Dec,
        )))),
        Rank::TOP,
    );
    let Ok(dec_layout) = store.layout_of(&mut types, dec) else {
        panic!("expected layout");
    };
    assert_eq!(store.size(dec_layout), 16);
    assert_eq!(store.alignment(dec_layout), 16);
}

#[test]
fn unbound_num_defaults_to_i64() {
    let mut store = LayoutStore::new();
    let mut types = TypeStore::new();
    let num = types.fresh_with(
        Content::Structure(FlatType::Num(Num::NumUnbound(IntReq::default()))),
        Rank::TOP,
    );
    let Ok(layout) = store.layout_of(&mut types, num) else {
        panic!("expected layout");
    };
    assert_eq!(store.size(layout), 8);
    assert!(matches!(
        store.get(layout),
        Layout::Scalar(Scalar::Int(IntPrecision::I64))
    ));
}

#[test]
fn unbound_frac_defaults_to_dec() {
    let mut store = LayoutStore::new();
    let mut types = TypeStore::new();
    let frac = types.fresh_with(
        Content::Structure(FlatType::Num(Num::FracUnbound)),
        Rank::TOP,
    );
    let Ok(layout) = store.layout_of(&mut types, frac) else {
        panic!("expected layout");
    };
    assert_eq!(store.size(layout), 16);
}

#[test]
fn record_fields_sorted_by_alignment_then_position() {
    let mut store = LayoutStore::new();
    let mut types = TypeStore::new();
    let mut idents = IdentStore::new();

    let a = idents.intern("a");
    let b = idents.intern("b");
    let c = idents.intern("c");
    // a: U8, b: I64, c: U8 — the I64 field must come first; the two U8
    // fields keep their relative row order.
    let a_var = int_var(&mut types, IntPrecision::U8);
    let b_var = int_var(&mut types, IntPrecision::I64);
    let c_var = int_var(&mut types, IntPrecision::U8);
    let fields = types.alloc_fields([(a, a_var), (b, b_var), (c, c_var)]);
    let record = types.fresh_with(
        Content::Structure(FlatType::RecordUnbound { fields }),
        Rank::TOP,
    );

    let Ok(layout) = store.layout_of(&mut types, record) else {
        panic!("expected layout");
    };
    let Layout::Record(table) = *store.get(layout) else {
        panic!("expected record layout");
    };
    let fields = store.record_fields(table);
    assert_eq!(fields[0].name, b);
    assert_eq!(fields[0].offset, 0);
    assert_eq!(fields[1].name, a);
    assert_eq!(fields[1].offset, 8);
    assert_eq!(fields[2].name, c);
    assert_eq!(fields[2].offset, 9);
    // Total: 8 (i64) + 1 + 1, rounded up to alignment 8.
    assert_eq!(store.size(layout), 16);
    assert_eq!(store.alignment(layout), 8);
}

#[test]
fn record_tie_break_follows_row_position_not_name() {
    let mut store = LayoutStore::new();
    let mut types = TypeStore::new();
    let mut idents = IdentStore::new();

    let a = idents.intern("a");
    let b = idents.intern("b");
    // `{ b: U8 | { a: U8 } }`: the row presents `b` before `a` even though
    // `a` sorts first by name. Same alignment, so position decides.
    let a_var = int_var(&mut types, IntPrecision::U8);
    let b_var = int_var(&mut types, IntPrecision::U8);
    let inner_fields = types.alloc_fields([(a, a_var)]);
    let closed = types.fresh_with(Content::Structure(FlatType::EmptyRecord), Rank::TOP);
    let ext = types.fresh_with(
        Content::Structure(FlatType::Record { fields: inner_fields, ext: closed }),
        Rank::TOP,
    );
    let outer_fields = types.alloc_fields([(b, b_var)]);
    let record = types.fresh_with(
        Content::Structure(FlatType::Record { fields: outer_fields, ext }),
        Rank::TOP,
    );

    let Ok(layout) = store.layout_of(&mut types, record) else {
        panic!("expected layout");
    };
    let Layout::Record(table) = *store.get(layout) else {
        panic!("expected record layout");
    };
    let fields = store.record_fields(table);
    assert_eq!(fields[0].name, b);
    assert_eq!(fields[0].offset, 0);
    assert_eq!(fields[1].name, a);
    assert_eq!(fields[1].offset, 1);
}

#[test]
fn empty_record_is_zero_sized_with_a_handle() {
    let mut store = LayoutStore::new();
    let mut types = TypeStore::new();
    let empty = types.fresh_with(Content::Structure(FlatType::EmptyRecord), Rank::TOP);
    let Ok(layout) = store.layout_of(&mut types, empty) else {
        panic!("expected layout");
    };
    assert_eq!(store.size(layout), 0);
    assert_eq!(store.alignment(layout), 1);
    // Stable handle: the unit layout is interned once.
    let again = store.unit();
    assert_eq!(layout, again);
}

#[test]
fn tuple_elements_keep_source_indices() {
    let mut store = LayoutStore::new();
    let mut types = TypeStore::new();
    // (U8, I64): the I64 moves to offset 0, but keeps index 1.
    let e0 = int_var(&mut types, IntPrecision::U8);
    let e1 = int_var(&mut types, IntPrecision::I64);
    let elems = types.alloc_vars([e0, e1]);
    let tuple = types.fresh_with(Content::Structure(FlatType::Tuple(elems)), Rank::TOP);

    let Ok(layout) = store.layout_of(&mut types, tuple) else {
        panic!("expected layout");
    };
    let Layout::Tuple(table) = *store.get(layout) else {
        panic!("expected tuple layout");
    };
    let elems = store.tuple_elems(table);
    assert_eq!(elems[0].index, 1);
    assert_eq!(elems[0].offset, 0);
    assert_eq!(elems[1].index, 0);
    assert_eq!(elems[1].offset, 8);
}

#[test]
fn enumeration_union_is_one_byte() {
    let mut store = LayoutStore::new();
    let mut types = TypeStore::new();
    let mut idents = IdentStore::new();
    let red = idents.intern("Red");
    let green = idents.intern("Green");

    let p1 = types.alloc_vars([]);
    let p2 = types.alloc_vars([]);
    let tags = types.alloc_tags([(red, p1), (green, p2)]);
    let ext = types.fresh_with(Content::Structure(FlatType::EmptyTagUnion), Rank::TOP);
    let union = types.fresh_with(
        Content::Structure(FlatType::TagUnion { tags, ext }),
        Rank::TOP,
    );

    let Ok(layout) = store.layout_of(&mut types, union) else {
        panic!("expected layout");
    };
    assert_eq!(store.size(layout), 1);
    let Layout::Union(handle) = *store.get(layout) else {
        panic!("expected union layout");
    };
    assert_eq!(store.union(handle).repr, UnionRepr::Enumeration);
    // Discriminants follow the canonical (interning) order of the tags.
    assert_eq!(store.union(handle).discriminant_of(red), Some(0));
    assert_eq!(store.union(handle).discriminant_of(green), Some(1));
}

#[test]
fn wrapped_union_puts_discriminant_after_payload() {
    let mut store = LayoutStore::new();
    let mut types = TypeStore::new();
    let mut idents = IdentStore::new();
    let some = idents.intern("Present");
    let none = idents.intern("Absent");

    let payload_var = int_var(&mut types, IntPrecision::I64);
    let p1 = types.alloc_vars([payload_var]);
    let p2 = types.alloc_vars([]);
    let tags = types.alloc_tags([(some, p1), (none, p2)]);
    let ext = types.fresh_with(Content::Structure(FlatType::EmptyTagUnion), Rank::TOP);
    let union = types.fresh_with(
        Content::Structure(FlatType::TagUnion { tags, ext }),
        Rank::TOP,
    );

    let Ok(layout) = store.layout_of(&mut types, union) else {
        panic!("expected layout");
    };
    let Layout::Union(handle) = *store.get(layout) else {
        panic!("expected union layout");
    };
    let union = store.union(handle);
    assert_eq!(union.repr, UnionRepr::Wrapped);
    assert_eq!(union.discriminant_offset, Some(8));
    // 8 payload + 1 discriminant, rounded up to alignment 8.
    assert_eq!(union.size, 16);
}

#[test]
fn single_tag_with_payload_has_no_discriminant() {
    let mut store = LayoutStore::new();
    let mut types = TypeStore::new();
    let mut idents = IdentStore::new();
    let wrap = idents.intern("Wrap");

    let payload_var = str_var(&mut types);
    let p = types.alloc_vars([payload_var]);
    let tags = types.alloc_tags([(wrap, p)]);
    let ext = types.fresh_with(Content::Structure(FlatType::EmptyTagUnion), Rank::TOP);
    let union = types.fresh_with(
        Content::Structure(FlatType::TagUnion { tags, ext }),
        Rank::TOP,
    );

    let Ok(layout) = store.layout_of(&mut types, union) else {
        panic!("expected layout");
    };
    let Layout::Union(handle) = *store.get(layout) else {
        panic!("expected union layout");
    };
    assert_eq!(store.union(handle).repr, UnionRepr::SingleTagStruct);
    assert_eq!(store.union(handle).discriminant_offset, None);
    assert_eq!(store.union(handle).size, 8);
}

#[test]
fn closure_layout_includes_header_and_env() {
    let mut store = LayoutStore::new();
    let layout = store.closure_layout(12);
    assert_eq!(store.size(layout), crate::CLOSURE_HEADER_SIZE + 12);
    assert_eq!(store.alignment(layout), 8);
}

#[test]
fn list_layout_is_reserved_header() {
    let mut store = LayoutStore::new();
    let mut types = TypeStore::new();
    let elem = str_var(&mut types);
    let list = types.fresh_with(Content::Structure(FlatType::List(elem)), Rank::TOP);
    let Ok(layout) = store.layout_of(&mut types, list) else {
        panic!("expected layout");
    };
    assert_eq!(store.size(layout), 24);
    assert_eq!(store.alignment(layout), 8);
}

#[test]
fn type_error_has_no_layout() {
    let mut store = LayoutStore::new();
    let mut types = TypeStore::new();
    let err = types.fresh_with(Content::Err, Rank::TOP);
    assert!(store.layout_of(&mut types, err).is_err());
}
