//! Render types as user-facing strings for diagnostics.

use crate::types::{Content, FlatType, Num, Var};
use crate::TypeStore;
use rill_ir::IdentStore;

/// Depth cap so cyclic (recursive nominal) types render finitely.
const MAX_DEPTH: u32 = 8;

/// Render the type at `var` as a display string.
pub fn render_var(store: &mut TypeStore, idents: &IdentStore, var: Var) -> String {
    render_at(store, idents, var, 0)
}

fn render_at(store: &mut TypeStore, idents: &IdentStore, var: Var, depth: u32) -> String {
    if depth > MAX_DEPTH {
        return "…".to_owned();
    }
    match store.content(var) {
        Content::FlexVar(Some(name)) => idents.text(name).to_owned(),
        Content::FlexVar(None) => "*".to_owned(),
        Content::RigidVar(name) => idents.text(name).to_owned(),
        Content::Err => "<type error>".to_owned(),
        Content::Alias { ident, args, .. } => {
            render_applied(store, idents, idents.text(ident).to_owned(), args, depth)
        }
        Content::Structure(flat) => render_flat(store, idents, flat, depth),
    }
}

fn render_applied(
    store: &mut TypeStore,
    idents: &IdentStore,
    name: String,
    args: crate::VarSlice,
    depth: u32,
) -> String {
    if args.is_empty() {
        return name;
    }
    let rendered: Vec<String> = store
        .vars(args)
        .to_vec()
        .into_iter()
        .map(|arg| render_at(store, idents, arg, depth + 1))
        .collect();
    format!("{}({})", name, rendered.join(", "))
}

fn render_flat(store: &mut TypeStore, idents: &IdentStore, flat: FlatType, depth: u32) -> String {
    match flat {
        FlatType::Str => "Str".to_owned(),
        FlatType::Box(elem) => {
            format!("Box({})", render_at(store, idents, elem, depth + 1))
        }
        FlatType::List(elem) => {
            format!("List({})", render_at(store, idents, elem, depth + 1))
        }
        FlatType::ListUnbound => "List(*)".to_owned(),
        FlatType::Tuple(elems) => {
            let rendered: Vec<String> = store
                .vars(elems)
                .to_vec()
                .into_iter()
                .map(|elem| render_at(store, idents, elem, depth + 1))
                .collect();
            format!("({})", rendered.join(", "))
        }
        FlatType::Num(num) => render_num(store, idents, num, depth),
        FlatType::Nominal { ident, args, .. } => {
            render_applied(store, idents, idents.text(ident).to_owned(), args, depth)
        }
        FlatType::FnPure(func) | FlatType::FnUnbound(func) => {
            render_fn(store, idents, func, "->", depth)
        }
        FlatType::FnEffectful(func) => render_fn(store, idents, func, "=>", depth),
        FlatType::Record { fields, ext } => {
            let mut parts: Vec<String> = store
                .fields(fields)
                .to_vec()
                .into_iter()
                .map(|(name, var)| {
                    format!(
                        "{}: {}",
                        idents.text(name),
                        render_at(store, idents, var, depth + 1)
                    )
                })
                .collect();
            // An open extension shows as a trailing `*`.
            if !matches!(
                store.content(ext),
                Content::Structure(FlatType::EmptyRecord)
            ) {
                parts.push("*".to_owned());
            }
            format!("{{ {} }}", parts.join(", "))
        }
        FlatType::RecordUnbound { fields } => {
            let parts: Vec<String> = store
                .fields(fields)
                .to_vec()
                .into_iter()
                .map(|(name, var)| {
                    format!(
                        "{}: {}",
                        idents.text(name),
                        render_at(store, idents, var, depth + 1)
                    )
                })
                .collect();
            format!("{{ {} }}", parts.join(", "))
        }
        FlatType::EmptyRecord => "{}".to_owned(),
        FlatType::TagUnion { tags, ext } => {
            let mut parts: Vec<String> = Vec::new();
            for (name, payload) in store.tags(tags).to_vec() {
                if payload.is_empty() {
                    parts.push(idents.text(name).to_owned());
                } else {
                    let args: Vec<String> = store
                        .vars(payload)
                        .to_vec()
                        .into_iter()
                        .map(|arg| render_at(store, idents, arg, depth + 1))
                        .collect();
                    parts.push(format!("{}({})", idents.text(name), args.join(", ")));
                }
            }
            let open = !matches!(
                store.content(ext),
                Content::Structure(FlatType::EmptyTagUnion)
            );
            if open {
                format!("[{}]*", parts.join(", "))
            } else {
                format!("[{}]", parts.join(", "))
            }
        }
        FlatType::EmptyTagUnion => "[]".to_owned(),
    }
}

fn render_num(store: &mut TypeStore, idents: &IdentStore, num: Num, depth: u32) -> String {
    match num {
        Num::NumUnbound(_) => "Num(*)".to_owned(),
        Num::IntUnbound(_) => "Int(*)".to_owned(),
        Num::FracUnbound => "Frac(*)".to_owned(),
        Num::NumPoly(var) => format!("Num({})", render_at(store, idents, var, depth + 1)),
        Num::IntPoly(var) => format!("Int({})", render_at(store, idents, var, depth + 1)),
        Num::FracPoly(var) => format!("Frac({})", render_at(store, idents, var, depth + 1)),
        Num::IntPrecision(precision) => precision.name().to_owned(),
        Num::FracPrecision(precision) => precision.name().to_owned(),
        Num::Compact(crate::NumCompact::Int(precision)) => precision.name().to_owned(),
        Num::Compact(crate::NumCompact::Frac(precision)) => precision.name().to_owned(),
    }
}

fn render_fn(
    store: &mut TypeStore,
    idents: &IdentStore,
    func: crate::Func,
    arrow: &str,
    depth: u32,
) -> String {
    let args: Vec<String> = store
        .vars(func.args)
        .to_vec()
        .into_iter()
        .map(|arg| render_at(store, idents, arg, depth + 1))
        .collect();
    let ret = render_at(store, idents, func.ret, depth + 1);
    format!("{} {} {}", args.join(", "), arrow, ret)
}
