//! Type content representation.
//!
//! Every type lives in the union-find [`TypeStore`](crate::TypeStore) as a
//! `(Content, Rank, Mark)` descriptor. `Content` is `Copy`: compound shapes
//! hold slices into the store's side buffers rather than owning vectors.

use rill_ir::{Ident, ModuleId, NumSuffix};

/// Index of a type variable in the store.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct Var(pub(crate) u32);

impl Var {
    /// Raw index.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub(crate) const fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Debug for Var {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Var({})", self.0)
    }
}

/// Generalization rank: the let-nesting level a variable was created at.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct Rank(pub u32);

impl Rank {
    /// The rank of generalized (quantified) variables.
    pub const GENERALIZED: Rank = Rank(0);
    /// The rank of the module's top level.
    pub const TOP: Rank = Rank(1);

    #[inline]
    #[must_use]
    pub fn next(self) -> Rank {
        Rank(self.0 + 1)
    }

    #[inline]
    pub fn is_generalized(self) -> bool {
        self == Rank::GENERALIZED
    }
}

/// Scratch mark used by traversals (exhaustiveness, occurs-style walks).
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct Mark(pub u32);

impl Mark {
    pub const NONE: Mark = Mark(0);
    /// Set on a match scrutinee once its branches were checked.
    pub const EXHAUSTIVENESS_CHECKED: Mark = Mark(1);
}

/// Slice of vars in the store's var buffer.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct VarSlice {
    pub start: u32,
    pub len: u16,
}

impl VarSlice {
    pub const EMPTY: VarSlice = VarSlice { start: 0, len: 0 };

    #[inline]
    pub const fn count(self) -> usize {
        self.len as usize
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.len == 0
    }
}

/// Slice of `(name, var)` fields in the store's field buffer, in canonical
/// (interned handle) order.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct FieldSlice {
    pub start: u32,
    pub len: u16,
}

impl FieldSlice {
    pub const EMPTY: FieldSlice = FieldSlice { start: 0, len: 0 };

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.len == 0
    }
}

/// Slice of `(name, payload)` tags in the store's tag buffer, in canonical
/// (interned handle) order.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct TagSlice {
    pub start: u32,
    pub len: u16,
}

impl TagSlice {
    pub const EMPTY: TagSlice = TagSlice { start: 0, len: 0 };

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.len == 0
    }
}

/// Integer precisions.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum IntPrecision {
    I8,
    I16,
    I32,
    I64,
    I128,
    U8,
    U16,
    U32,
    U64,
    U128,
}

impl IntPrecision {
    /// Size in bytes of a value at this precision.
    pub const fn size(self) -> u32 {
        match self {
            IntPrecision::I8 | IntPrecision::U8 => 1,
            IntPrecision::I16 | IntPrecision::U16 => 2,
            IntPrecision::I32 | IntPrecision::U32 => 4,
            IntPrecision::I64 | IntPrecision::U64 => 8,
            IntPrecision::I128 | IntPrecision::U128 => 16,
        }
    }

    /// Whether values at this precision are signed.
    pub const fn is_signed(self) -> bool {
        matches!(
            self,
            IntPrecision::I8
                | IntPrecision::I16
                | IntPrecision::I32
                | IntPrecision::I64
                | IntPrecision::I128
        )
    }

    pub const fn name(self) -> &'static str {
        match self {
            IntPrecision::I8 => "I8",
            IntPrecision::I16 => "I16",
            IntPrecision::I32 => "I32",
            IntPrecision::I64 => "I64",
            IntPrecision::I128 => "I128",
            IntPrecision::U8 => "U8",
            IntPrecision::U16 => "U16",
            IntPrecision::U32 => "U32",
            IntPrecision::U64 => "U64",
            IntPrecision::U128 => "U128",
        }
    }
}

/// Fractional precisions. `Dec` is 128-bit fixed point, 18 decimal places.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum FracPrecision {
    F32,
    F64,
    Dec,
}

impl FracPrecision {
    pub const fn size(self) -> u32 {
        match self {
            FracPrecision::F32 => 4,
            FracPrecision::F64 => 8,
            FracPrecision::Dec => 16,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            FracPrecision::F32 => "F32",
            FracPrecision::F64 => "F64",
            FracPrecision::Dec => "Dec",
        }
    }
}

/// A concrete numeric representation.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum NumCompact {
    Int(IntPrecision),
    Frac(FracPrecision),
}

/// Evidence a numeric literal carries about the precision it needs.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct IntReq {
    /// The value was negative, so an unsigned precision cannot hold it.
    pub sign_needed: bool,
    /// Minimum bit width that holds the value.
    pub bits_needed: u8,
}

impl IntReq {
    /// Requirements for a literal value.
    pub fn for_value(value: i128) -> IntReq {
        let sign_needed = value < 0;
        let magnitude = value.unsigned_abs();
        let bits = 128 - magnitude.leading_zeros();
        IntReq {
            sign_needed,
            bits_needed: bits.min(128) as u8,
        }
    }

    /// Merge evidence from two sources.
    #[must_use]
    pub fn merge(self, other: IntReq) -> IntReq {
        IntReq {
            sign_needed: self.sign_needed || other.sign_needed,
            bits_needed: self.bits_needed.max(other.bits_needed),
        }
    }
}

/// The unified numeric representation.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum Num {
    /// Could still become an integer or a fraction.
    NumUnbound(IntReq),
    /// An integer of not-yet-known precision.
    IntUnbound(IntReq),
    /// A fraction of not-yet-known precision.
    FracUnbound,
    /// `Num a` from an annotation.
    NumPoly(Var),
    /// `Int a` from an annotation.
    IntPoly(Var),
    /// `Frac a` from an annotation.
    FracPoly(Var),
    /// A precision requirement from an annotation (`I64`).
    IntPrecision(IntPrecision),
    /// A precision requirement from an annotation (`Dec`).
    FracPrecision(FracPrecision),
    /// Fully resolved representation.
    Compact(NumCompact),
}

/// A function shape shared by the three purity variants.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct Func {
    pub args: VarSlice,
    pub ret: Var,
}

/// Concrete (non-variable) type shapes.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum FlatType {
    Str,
    Box(Var),
    List(Var),
    /// The type of `[]` before its element type is known.
    ListUnbound,
    Tuple(VarSlice),
    Num(Num),
    Nominal {
        ident: Ident,
        args: VarSlice,
        backing: Var,
        origin: Option<ModuleId>,
    },
    FnPure(Func),
    FnEffectful(Func),
    /// A function whose purity is not yet determined.
    FnUnbound(Func),
    Record {
        fields: FieldSlice,
        ext: Var,
    },
    /// A record literal before its extension is decided.
    RecordUnbound {
        fields: FieldSlice,
    },
    EmptyRecord,
    TagUnion {
        tags: TagSlice,
        ext: Var,
    },
    EmptyTagUnion,
}

/// What a resolved type variable is.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum Content {
    /// A unification variable, optionally carrying a display name.
    FlexVar(Option<Ident>),
    /// A variable from a user annotation; unifies only with itself.
    RigidVar(Ident),
    /// A named synonym: identity by expansion.
    Alias {
        ident: Ident,
        args: VarSlice,
        backing: Var,
    },
    Structure(FlatType),
    /// Poisoned by an earlier mismatch; unifies with anything silently.
    Err,
}

/// A variable's descriptor: what it is, where it was born, traversal scratch.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct Descriptor {
    pub content: Content,
    pub rank: Rank,
    pub mark: Mark,
}

/// Map a literal suffix to its numeric content.
pub fn num_for_suffix(suffix: NumSuffix) -> Num {
    match suffix {
        NumSuffix::I8 => Num::Compact(NumCompact::Int(IntPrecision::I8)),
        NumSuffix::I16 => Num::Compact(NumCompact::Int(IntPrecision::I16)),
        NumSuffix::I32 => Num::Compact(NumCompact::Int(IntPrecision::I32)),
        NumSuffix::I64 => Num::Compact(NumCompact::Int(IntPrecision::I64)),
        NumSuffix::I128 => Num::Compact(NumCompact::Int(IntPrecision::I128)),
        NumSuffix::U8 => Num::Compact(NumCompact::Int(IntPrecision::U8)),
        NumSuffix::U16 => Num::Compact(NumCompact::Int(IntPrecision::U16)),
        NumSuffix::U32 => Num::Compact(NumCompact::Int(IntPrecision::U32)),
        NumSuffix::U64 => Num::Compact(NumCompact::Int(IntPrecision::U64)),
        NumSuffix::U128 => Num::Compact(NumCompact::Int(IntPrecision::U128)),
        NumSuffix::F32 => Num::Compact(NumCompact::Frac(FracPrecision::F32)),
        NumSuffix::F64 => Num::Compact(NumCompact::Frac(FracPrecision::F64)),
        NumSuffix::Dec => Num::Compact(NumCompact::Frac(FracPrecision::Dec)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_req_for_values() {
        assert_eq!(
            IntReq::for_value(0),
            IntReq { sign_needed: false, bits_needed: 0 }
        );
        assert_eq!(
            IntReq::for_value(255),
            IntReq { sign_needed: false, bits_needed: 8 }
        );
        assert_eq!(
            IntReq::for_value(-1),
            IntReq { sign_needed: true, bits_needed: 1 }
        );
    }

    #[test]
    fn int_req_merge() {
        let a = IntReq { sign_needed: false, bits_needed: 8 };
        let b = IntReq { sign_needed: true, bits_needed: 4 };
        assert_eq!(a.merge(b), IntReq { sign_needed: true, bits_needed: 8 });
    }

    #[test]
    fn precision_sizes() {
        assert_eq!(IntPrecision::I8.size(), 1);
        assert_eq!(IntPrecision::U128.size(), 16);
        assert_eq!(FracPrecision::Dec.size(), 16);
        assert!(IntPrecision::I64.is_signed());
        assert!(!IntPrecision::U64.is_signed());
    }
}
