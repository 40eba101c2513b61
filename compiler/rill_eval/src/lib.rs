//! Tree-walking interpreter for Rill, plus the whole-pipeline drivers.
//!
//! The interpreter executes CIR directly on a bump stack driven by an
//! explicit work queue; see [`interp`] for the machinery. The [`compile`]
//! and [`compile_and_eval`] entry points chain
//! lex → parse → canonicalize → check (→ evaluate) for hosts and tests.

mod error;
mod interp;
mod stack;
#[cfg(test)]
mod tests;
mod value;

pub use error::EvalError;
pub use interp::{Binding, Interpreter, WorkItem, WorkKind};
pub use stack::{StackMemory, StackValue};
pub use value::{dec_div, dec_mul, FracValue, DEC_SCALE};

use rill_canon::CanonOutput;
use rill_ir::ModuleEnv;
use rill_types::CheckOutput;

/// Everything the front- and middle-end produce for one module.
pub struct Compiled {
    pub env: ModuleEnv,
    pub canon: CanonOutput,
    pub check: CheckOutput,
}

/// Run the pipeline up to and including type checking.
pub fn compile(source: &str, module_name: Option<&str>) -> Compiled {
    let mut env = ModuleEnv::new(source);
    env.module_name = module_name.map(str::to_owned);
    let tokens = rill_lexer::lex(&mut env);
    let parsed = rill_parse::parse_module(&tokens, &mut env);
    let canon = rill_canon::canonicalize(&parsed.header, &parsed.stmts, &parsed.store, &mut env);
    let check = rill_types::check_module(&canon, &mut env);
    Compiled { env, canon, check }
}

/// The outcome of evaluating a module's last definition.
pub struct Evaluated {
    /// Display rendering of the value.
    pub rendered: String,
    /// Display rendering of the definition's type.
    pub type_rendered: String,
    /// The value's raw bytes (little-endian scalars).
    pub bytes: Vec<u8>,
}

/// Compile a module and evaluate its top-level definitions in order,
/// returning the value of the last one.
///
/// A failed evaluation is terminal for that evaluation only; the compiled
/// module state remains intact in `Compiled`.
pub fn compile_and_eval(
    source: &str,
) -> (Compiled, Result<Evaluated, EvalError>) {
    let mut compiled = compile(source, None);
    let result = eval_last_def(&mut compiled);
    (compiled, result)
}

fn eval_last_def(compiled: &mut Compiled) -> Result<Evaluated, EvalError> {
    let def_vars = compiled.check.def_vars.clone();
    let mut interp = Interpreter::new(&compiled.canon, &mut compiled.check, &compiled.env);

    let mut last = None;
    for (i, &def_idx) in compiled.canon.defs.iter().enumerate() {
        let value = interp.eval_def(def_idx)?;
        last = Some((value, def_vars[i]));
    }
    let (value, def_var) = last.ok_or(EvalError::InvalidStackState)?;

    let rendered = interp.render_value(value);
    let bytes = interp.value_bytes(value).to_vec();
    let type_rendered =
        rill_types::render_var(&mut compiled.check.store, &compiled.env.idents, def_var);
    Ok(Evaluated {
        rendered,
        type_rendered,
        bytes,
    })
}
