//! Lexically-scoped symbol table.
//!
//! Bindings live in levels: one per block or lambda, pushed on entry and
//! popped on exit. Value and type namespaces are separate. Each level also
//! records whether it is a function boundary, which is what capture analysis
//! keys off.

use rill_ir::cir::{ExternalDeclIdx, PatternIdx, TypeDeclIdx};
use rill_ir::{Ident, Region};
use rustc_hash::FxHashMap;

/// Where a value reference resolves.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ValueBinding {
    /// A local binding, by the pattern that introduced it.
    Local(PatternIdx),
    /// An imported value.
    External(ExternalDeclIdx),
}

/// Where a type reference resolves.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum TypeBinding {
    Local(TypeDeclIdx),
    External(ExternalDeclIdx),
}

/// Outcome of introducing a name.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Introduced {
    /// First binding of this name in scope.
    Fresh,
    /// Same name already bound in the *same* level (an error).
    Duplicate { original: Region },
    /// Same name bound in an outer level (a warning).
    Shadows { original: Region },
}

struct Level {
    values: FxHashMap<Ident, (ValueBinding, Region)>,
    types: FxHashMap<Ident, (TypeBinding, Region)>,
    /// True for lambda bodies: crossing this level means capturing.
    function_boundary: bool,
}

/// The canonicalizer's symbol table.
pub struct Scope {
    levels: Vec<Level>,
}

impl Scope {
    /// Create a scope with the module-level frame in place.
    pub fn new() -> Self {
        Scope {
            levels: vec![Level {
                values: FxHashMap::default(),
                types: FxHashMap::default(),
                function_boundary: false,
            }],
        }
    }

    /// Enter a block level.
    pub fn push(&mut self) {
        self.levels.push(Level {
            values: FxHashMap::default(),
            types: FxHashMap::default(),
            function_boundary: false,
        });
    }

    /// Enter a lambda body level.
    pub fn push_function(&mut self) {
        self.levels.push(Level {
            values: FxHashMap::default(),
            types: FxHashMap::default(),
            function_boundary: true,
        });
    }

    /// Leave the innermost level, dropping its introductions.
    pub fn pop(&mut self) {
        debug_assert!(self.levels.len() > 1, "cannot pop the module level");
        self.levels.pop();
    }

    /// Introduce a value binding into the innermost level.
    pub fn introduce_value(
        &mut self,
        ident: Ident,
        binding: ValueBinding,
        region: Region,
    ) -> Introduced {
        let outcome = match self.lookup_value_with_region(ident) {
            Some((_, original, level)) if level == self.levels.len() - 1 => {
                Introduced::Duplicate { original }
            }
            Some((_, original, _)) => Introduced::Shadows { original },
            None => Introduced::Fresh,
        };
        // The newest binding wins in either case, so healthy code after the
        // diagnostic still resolves to something sensible.
        if let Some(level) = self.levels.last_mut() {
            level.values.insert(ident, (binding, region));
        }
        outcome
    }

    /// Introduce a type binding into the innermost level.
    pub fn introduce_type(
        &mut self,
        ident: Ident,
        binding: TypeBinding,
        region: Region,
    ) -> Introduced {
        let outcome = match self.lookup_type_with_region(ident) {
            Some((_, original, level)) if level == self.levels.len() - 1 => {
                Introduced::Duplicate { original }
            }
            Some((_, original, _)) => Introduced::Shadows { original },
            None => Introduced::Fresh,
        };
        if let Some(level) = self.levels.last_mut() {
            level.types.insert(ident, (binding, region));
        }
        outcome
    }

    /// Resolve a value reference, innermost level first.
    pub fn lookup_value(&self, ident: Ident) -> Option<ValueBinding> {
        self.lookup_value_with_region(ident).map(|(b, _, _)| b)
    }

    /// Resolve a value reference along with how many function boundaries lie
    /// between the use site and the binding. Zero means same function.
    pub fn lookup_value_with_crossings(&self, ident: Ident) -> Option<(ValueBinding, usize)> {
        let mut crossings = 0;
        for level in self.levels.iter().rev() {
            if let Some(&(binding, _)) = level.values.get(&ident) {
                return Some((binding, crossings));
            }
            if level.function_boundary {
                crossings += 1;
            }
        }
        None
    }

    /// Whether the binding for `ident` lives in the module-level frame.
    pub fn is_module_level(&self, ident: Ident) -> bool {
        for (depth, level) in self.levels.iter().enumerate().rev() {
            if level.values.contains_key(&ident) {
                return depth == 0;
            }
        }
        false
    }

    fn lookup_value_with_region(&self, ident: Ident) -> Option<(ValueBinding, Region, usize)> {
        for (depth, level) in self.levels.iter().enumerate().rev() {
            if let Some(&(binding, region)) = level.values.get(&ident) {
                return Some((binding, region, depth));
            }
        }
        None
    }

    /// Resolve a type reference, innermost level first.
    pub fn lookup_type(&self, ident: Ident) -> Option<TypeBinding> {
        self.lookup_type_with_region(ident).map(|(b, _, _)| b)
    }

    fn lookup_type_with_region(&self, ident: Ident) -> Option<(TypeBinding, Region, usize)> {
        for (depth, level) in self.levels.iter().enumerate().rev() {
            if let Some(&(binding, region)) = level.types.get(&ident) {
                return Some((binding, region, depth));
            }
        }
        None
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rill_ir::cir::PatternIdx;

    fn local(raw: u32) -> ValueBinding {
        ValueBinding::Local(PatternIdx::new(raw))
    }

    #[test]
    fn introduce_and_lookup() {
        let mut scope = Scope::new();
        let x = Ident::new(0);
        assert_eq!(
            scope.introduce_value(x, local(0), Region::new(0, 1)),
            Introduced::Fresh
        );
        assert_eq!(scope.lookup_value(x), Some(local(0)));
    }

    #[test]
    fn duplicate_in_same_level() {
        let mut scope = Scope::new();
        let x = Ident::new(0);
        scope.introduce_value(x, local(0), Region::new(0, 1));
        assert!(matches!(
            scope.introduce_value(x, local(1), Region::new(5, 6)),
            Introduced::Duplicate { .. }
        ));
        // Newest wins.
        assert_eq!(scope.lookup_value(x), Some(local(1)));
    }

    #[test]
    fn shadowing_across_levels() {
        let mut scope = Scope::new();
        let x = Ident::new(0);
        scope.introduce_value(x, local(0), Region::new(0, 1));
        scope.push();
        assert!(matches!(
            scope.introduce_value(x, local(1), Region::new(5, 6)),
            Introduced::Shadows { .. }
        ));
        assert_eq!(scope.lookup_value(x), Some(local(1)));
        scope.pop();
        assert_eq!(scope.lookup_value(x), Some(local(0)));
    }

    #[test]
    fn function_boundary_crossings() {
        let mut scope = Scope::new();
        let x = Ident::new(0);
        scope.push();
        scope.introduce_value(x, local(0), Region::new(0, 1));
        scope.push_function();
        scope.push_function();
        let Some((_, crossings)) = scope.lookup_value_with_crossings(x) else {
            panic!("expected binding");
        };
        assert_eq!(crossings, 2);
    }
}
