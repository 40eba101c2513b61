//! Rill IR - the data model shared by every compiler stage.
//!
//! This crate contains the core data structures for the Rill compiler:
//! - Regions for source locations
//! - Interned identifiers and string literals
//! - Tokens and `TokenList` for lexer output
//! - Untyped AST nodes with their arena (`AstStore`)
//! - Canonical IR nodes with their arena (`CirStore`)
//! - The per-module container `ModuleEnv`
//! - The closed `Diagnostic` union accumulated by every stage
//!
//! # Design Philosophy
//!
//! - **Intern everything**: identifier text → `Ident` (u32), string payloads
//!   → `StringLit` (u32)
//! - **Flatten everything**: no `Box<Expr>`; children are index handles into
//!   append-only arenas owned by the stores
//! - **Recover everywhere**: every node family has a `Malformed` variant so
//!   no stage ever halts on bad input
//!
//! Types that contain floats store them as `u64` bits so that every node is
//! `Eq + Hash`.

/// Compile-time assertion that a type has a specific size.
///
/// Used to prevent accidental size regressions in frequently-allocated types.
#[macro_export]
macro_rules! static_assert_size {
    ($ty:ty, $size:expr) => {
        const _: [(); $size] = [(); ::std::mem::size_of::<$ty>()];
    };
}

/// Declare a `u32`-backed index newtype with the standard handle API.
macro_rules! define_index {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
        #[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
        #[repr(transparent)]
        pub struct $name(u32);

        impl $name {
            /// Create from a raw index.
            #[inline]
            pub const fn new(raw: u32) -> Self {
                Self(raw)
            }

            /// Raw `u32` value.
            #[inline]
            pub const fn raw(self) -> u32 {
                self.0
            }

            /// Index as `usize` for slice access.
            #[inline]
            pub const fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }
    };
}

/// Declare a `(start: u32, len: u16)` span newtype over an arena side buffer.
macro_rules! define_span {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Eq, PartialEq, Hash)]
        #[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
        pub struct $name {
            pub start: u32,
            pub len: u16,
        }

        impl $name {
            /// Empty span.
            pub const EMPTY: Self = Self { start: 0, len: 0 };

            /// Create a new span.
            #[inline]
            pub const fn new(start: u32, len: u16) -> Self {
                Self { start, len }
            }

            /// Number of elements covered.
            #[inline]
            pub const fn count(self) -> usize {
                self.len as usize
            }

            /// Whether the span covers no elements.
            #[inline]
            pub const fn is_empty(self) -> bool {
                self.len == 0
            }
        }

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                write!(
                    f,
                    concat!(stringify!($name), "({}..+{})"),
                    self.start, self.len
                )
            }
        }
    };
}

pub(crate) use define_index;
pub(crate) use define_span;

pub mod ast;
pub mod cir;
mod diagnostic;
mod env;
mod ident;
mod region;
mod string_lit;
mod token;

pub use ast::AstStore;
pub use cir::CirStore;
pub use diagnostic::{Diagnostic, Severity};
pub use env::ModuleEnv;
pub use ident::{Ident, IdentStore, ModuleId, ModuleStore};
pub use region::Region;
pub use string_lit::{StringLit, StringLitStore};
pub use token::{Base, NumSuffix, Token, TokenKind, TokenList};

/// Convert `usize` to `u32`, panicking with a clear message on overflow.
#[inline]
pub fn to_u32(value: usize, context: &str) -> u32 {
    u32::try_from(value).unwrap_or_else(|_| {
        panic!(
            "arena capacity exceeded: {context} has {value} elements, max is {}",
            u32::MAX
        )
    })
}

/// Convert `usize` to `u16`, panicking with a clear message on overflow.
#[inline]
pub fn to_u16(value: usize, context: &str) -> u16 {
    u16::try_from(value).unwrap_or_else(|_| {
        panic!(
            "range length exceeded: {context} has {value} elements, max is {}",
            u16::MAX
        )
    })
}
