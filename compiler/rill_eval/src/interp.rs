//! The stack-based, work-queue evaluator.
//!
//! Execution never recurses in the host language: every nested evaluation
//! is a [`WorkItem`] pushed onto an explicit LIFO queue, scheduled in
//! reverse of execution order. Values live as raw bytes in a bump stack
//! ([`StackMemory`]); the parallel value stack tracks `(layout, offset)`
//! pairs, and popping the top value truncates the memory back to its
//! offset.
//!
//! Calls push a [`Frame`] capturing the bases of the stacks; returning
//! copies the result down over the frame and restores the bases.

use crate::stack::{StackMemory, StackValue};
use crate::value::{
    dec_div, dec_mul, read_frac, read_int, write_frac, write_int, FracValue, DEC_SCALE,
};
use crate::EvalError;
use rill_canon::CanonOutput;
use rill_ir::cir::{self, Binop, CirStore, DestructKind, Expr, Pattern, Stmt};
use rill_ir::{Ident, ModuleEnv};
use rill_layout::{align_up, Layout, LayoutIdx, LayoutStore, Scalar, UnionRepr, CLOSURE_HEADER_SIZE};
use rill_types::CheckOutput;
use tracing::trace;

/// A unit of deferred computation. Items are pushed in reverse of execution
/// order; `expr` names the expression the item belongs to.
#[derive(Copy, Clone, Debug)]
pub struct WorkItem {
    pub expr: cir::ExprIdx,
    pub kind: WorkKind,
}

/// What a work item does when popped.
#[derive(Copy, Clone, Debug)]
pub enum WorkKind {
    /// Evaluate the expression, pushing its value.
    EvalExpr,
    /// Pop two operands, push the result.
    Binop(Binop),
    /// Negate the value on top of the stack, in place.
    UnaryMinus,
    /// Flip the boolean on top of the stack, in place.
    UnaryNot,
    /// Pop the condition; run the branch body or try the next condition.
    IfCheckCondition { branch: u32 },
    /// Pop the left operand of `and`/`or`; short-circuit or evaluate the rest.
    ShortCircuit { is_and: bool },
    /// Try to match the scrutinee against a branch, binding on success.
    MatchCheckBranch { branch: u32 },
    /// Replace `[scrutinee, result]` with `[result]`.
    MatchCleanup {
        value_base: u32,
        memory_base: u32,
        bindings_base: u32,
    },
    /// After the function and `arg_count` arguments: push a frame, bind
    /// parameters and captures, schedule the body.
    LambdaCall { arg_count: u32 },
    /// Pop the return value, restore the frame's bases, re-push the value.
    LambdaReturn,
    /// Bind the value on top of the stack (which stays as its storage).
    BindPattern { pattern: cir::PatternIdx },
    /// Incremental record assembly; `next` is the next field to evaluate.
    RecordFields { next: u32 },
    /// Incremental tuple assembly; `next` is the next element to evaluate.
    TupleElems { next: u32 },
    /// Incremental tag payload assembly.
    TagFields { next: u32 },
    /// Pop a record, push one of its fields.
    FieldGet { field: Ident },
    /// Pop a tuple, push one of its elements.
    TupleGet { index: u32 },
    /// Pop `count` string segments, push their concatenation.
    StrConcat { count: u32 },
    /// Replace the block's working values with its result.
    BlockCleanup {
        value_base: u32,
        memory_base: u32,
        bindings_base: u32,
    },
    /// Pop a boolean; fail the evaluation if it is false.
    ExpectCheck,
    /// Pop the message string and crash.
    CrashWith,
}

/// A binding from a canonicalized pattern to a value location.
#[derive(Copy, Clone, Debug)]
pub struct Binding {
    pub pattern: cir::PatternIdx,
    pub offset: u32,
    pub layout: LayoutIdx,
}

/// Bases of the stacks at call entry.
#[derive(Copy, Clone, Debug)]
struct Frame {
    memory_base: u32,
    value_base: u32,
    bindings_base: u32,
}

/// Maximum call depth before reporting `StackOverflow`.
const MAX_FRAMES: usize = 8 * 1024;

/// The evaluator for one module.
pub struct Interpreter<'a> {
    cir: &'a CirStore,
    env: &'a ModuleEnv,
    check: &'a mut CheckOutput,
    pub layouts: LayoutStore,
    stack: StackMemory,
    values: Vec<StackValue>,
    bindings: Vec<Binding>,
    frames: Vec<Frame>,
    work: Vec<WorkItem>,
    /// Runtime string table; `Str` values are `u64` handles into it.
    strings: Vec<String>,
}

impl<'a> Interpreter<'a> {
    pub fn new(canon: &'a CanonOutput, check: &'a mut CheckOutput, env: &'a ModuleEnv) -> Self {
        Interpreter {
            cir: &canon.cir,
            env,
            check,
            layouts: LayoutStore::new(),
            stack: StackMemory::new(),
            values: Vec::new(),
            bindings: Vec::new(),
            frames: Vec::new(),
            work: Vec::new(),
            strings: Vec::new(),
        }
    }

    /// Evaluate a definition's body and leave it bound for later lookups.
    pub fn eval_def(&mut self, def_idx: cir::DefIdx) -> Result<StackValue, EvalError> {
        let def = *self.cir.def(def_idx);
        self.work.push(WorkItem {
            expr: def.expr,
            kind: WorkKind::BindPattern { pattern: def.pattern },
        });
        self.work.push(WorkItem {
            expr: def.expr,
            kind: WorkKind::EvalExpr,
        });
        self.run()
    }

    /// Evaluate one expression to a value on top of the stack.
    pub fn eval_expr(&mut self, expr: cir::ExprIdx) -> Result<StackValue, EvalError> {
        self.work.push(WorkItem {
            expr,
            kind: WorkKind::EvalExpr,
        });
        self.run()
    }

    fn run(&mut self) -> Result<StackValue, EvalError> {
        // Snapshot so a failed evaluation leaves module state intact.
        let memory_base = self.stack.used();
        let value_base = self.values.len();
        let bindings_base = self.bindings.len();
        let frames_base = self.frames.len();

        while let Some(item) = self.work.pop() {
            if let Err(error) = self.step(item) {
                self.work.clear();
                self.frames.truncate(frames_base);
                self.bindings.truncate(bindings_base);
                self.values.truncate(value_base);
                self.stack.truncate_to(memory_base);
                return Err(error);
            }
        }

        self.values
            .last()
            .copied()
            .ok_or(EvalError::InvalidStackState)
    }

    fn step(&mut self, item: WorkItem) -> Result<(), EvalError> {
        trace!(?item, "step");
        match item.kind {
            WorkKind::EvalExpr => self.eval(item.expr),
            WorkKind::Binop(op) => self.do_binop(op),
            WorkKind::UnaryMinus => self.do_unary_minus(),
            WorkKind::UnaryNot => self.do_unary_not(),
            WorkKind::IfCheckCondition { branch } => self.do_if_check(item.expr, branch),
            WorkKind::ShortCircuit { is_and } => self.do_short_circuit(item.expr, is_and),
            WorkKind::MatchCheckBranch { branch } => self.do_match_check(item.expr, branch),
            WorkKind::MatchCleanup {
                value_base,
                memory_base,
                bindings_base,
            }
            | WorkKind::BlockCleanup {
                value_base,
                memory_base,
                bindings_base,
            } => self.do_cleanup(value_base, memory_base, bindings_base),
            WorkKind::LambdaCall { arg_count } => self.do_lambda_call(arg_count),
            WorkKind::LambdaReturn => self.do_lambda_return(),
            WorkKind::BindPattern { pattern } => self.do_bind_top(pattern),
            WorkKind::RecordFields { next } => self.do_record_fields(item.expr, next),
            WorkKind::TupleElems { next } => self.do_tuple_elems(item.expr, next),
            WorkKind::TagFields { next } => self.do_tag_fields(item.expr, next),
            WorkKind::FieldGet { field } => self.do_field_get(field),
            WorkKind::TupleGet { index } => self.do_tuple_get(index),
            WorkKind::StrConcat { count } => self.do_str_concat(count),
            WorkKind::ExpectCheck => self.do_expect_check(),
            WorkKind::CrashWith => self.do_crash_with(),
        }
    }

    // === Layout plumbing ===

    fn expr_layout(&mut self, expr: cir::ExprIdx) -> Result<LayoutIdx, EvalError> {
        let var = self.check.expr_var(expr);
        self.layouts
            .layout_of(&mut self.check.store, var)
            .map_err(|e| EvalError::LayoutError(e.to_string()))
    }

    fn pattern_layout(&mut self, pattern: cir::PatternIdx) -> Result<LayoutIdx, EvalError> {
        let var = self.check.pattern_var(pattern);
        self.layouts
            .layout_of(&mut self.check.store, var)
            .map_err(|e| EvalError::LayoutError(e.to_string()))
    }

    // === Value stack plumbing ===

    fn push_value(&mut self, layout: LayoutIdx) -> Result<StackValue, EvalError> {
        let size = self.layouts.size(layout);
        let align = self.layouts.alignment(layout);
        let offset = self.stack.alloca(size, align)?;
        let value = StackValue { layout, offset };
        self.values.push(value);
        Ok(value)
    }

    fn top_value(&self) -> Result<StackValue, EvalError> {
        self.values.last().copied().ok_or(EvalError::InvalidStackState)
    }

    fn push_str_value(&mut self, text: String) -> Result<StackValue, EvalError> {
        let handle = self.strings.len() as u64;
        self.strings.push(text);
        let layout = self.layouts.str_layout();
        let value = self.push_value(layout)?;
        self.stack
            .slice_mut(value.offset, 8)
            .copy_from_slice(&handle.to_le_bytes());
        Ok(value)
    }

    fn str_text(&self, value: StackValue) -> Result<&str, EvalError> {
        let bytes = self.stack.slice(value.offset, 8);
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        let handle = u64::from_le_bytes(buf) as usize;
        self.strings
            .get(handle)
            .map(String::as_str)
            .ok_or(EvalError::InvalidStackState)
    }

    fn push_bool_value(&mut self, value: bool) -> Result<StackValue, EvalError> {
        let layout = self.layouts.bool_layout();
        let pushed = self.push_value(layout)?;
        self.stack.slice_mut(pushed.offset, 1)[0] = u8::from(value);
        Ok(pushed)
    }

    /// Pop `count` values, replacing them with one freshly assembled value
    /// of `layout`; `fill` writes its bytes given the popped values.
    fn replace_values(
        &mut self,
        count: usize,
        layout: LayoutIdx,
        fill: impl FnOnce(&mut Self, &[StackValue], u32) -> Result<(), EvalError>,
    ) -> Result<(), EvalError> {
        if self.values.len() < count {
            return Err(EvalError::InvalidStackState);
        }
        let base_offset = if count == 0 {
            self.stack.used()
        } else {
            self.values[self.values.len() - count].offset
        };
        let popped: Vec<StackValue> = self.values[self.values.len() - count..].to_vec();

        // Assemble above the operands, then slide the result down.
        let size = self.layouts.size(layout);
        let align = self.layouts.alignment(layout);
        let scratch = self.stack.alloca(size, align)?;
        fill(self, &popped, scratch)?;

        let dst = align_up(base_offset, align);
        self.stack.copy_down(scratch, dst, size);
        self.values.truncate(self.values.len() - count);
        self.stack.truncate_to(dst + size);
        self.values.push(StackValue { layout, offset: dst });
        Ok(())
    }

    // === Expression evaluation ===

    fn eval(&mut self, expr_idx: cir::ExprIdx) -> Result<(), EvalError> {
        let expr = *self.cir.expr(expr_idx);
        match expr {
            Expr::Int { value, .. } => {
                let layout = self.expr_layout(expr_idx)?;
                let pushed = self.push_value(layout)?;
                self.write_int_literal(pushed, value)
            }
            Expr::Frac { bits, .. } => {
                let layout = self.expr_layout(expr_idx)?;
                let pushed = self.push_value(layout)?;
                let value = f64::from_bits(bits);
                match *self.layouts.get(layout) {
                    Layout::Scalar(Scalar::Frac(precision)) => {
                        let size = self.layouts.size(layout);
                        let bytes = self.stack.slice_mut(pushed.offset, size);
                        write_frac(bytes, precision, FracValue::F64(value));
                        Ok(())
                    }
                    _ => Err(EvalError::TypeMismatch),
                }
            }
            Expr::Scalar(value) => {
                let layout = self.expr_layout(expr_idx)?;
                let pushed = self.push_value(layout)?;
                self.write_int_literal(pushed, i128::from(value))
            }
            Expr::StrSegment(lit) => {
                let text = self.env.strings.text(lit).to_owned();
                self.push_str_value(text).map(|_| ())
            }
            Expr::Str { segments } => {
                let segments = self.cir.expr_span(segments);
                let count = segments.len() as u32;
                if count == 0 {
                    return self.push_str_value(String::new()).map(|_| ());
                }
                self.work.push(WorkItem {
                    expr: expr_idx,
                    kind: WorkKind::StrConcat { count },
                });
                for &segment in segments.iter().rev() {
                    self.work.push(WorkItem {
                        expr: segment,
                        kind: WorkKind::EvalExpr,
                    });
                }
                Ok(())
            }

            Expr::LookupLocal { pattern } => {
                let binding = self
                    .bindings
                    .iter()
                    .rev()
                    .find(|b| b.pattern == pattern)
                    .copied()
                    .ok_or(EvalError::PatternNotFound)?;
                let size = self.layouts.size(binding.layout);
                let pushed = self.push_value(binding.layout)?;
                self.stack.copy_bytes(binding.offset, pushed.offset, size);
                Ok(())
            }
            Expr::LookupExternal { external } => {
                let decl = self.cir.external_decl(external);
                let name = self.env.idents.text(decl.name);
                Err(EvalError::Crash(format!(
                    "imported value `{name}` is not available to the interpreter"
                )))
            }

            Expr::List { .. } => Err(EvalError::Crash(
                "list values are not supported by the interpreter".to_owned(),
            )),

            Expr::Tuple { .. } => {
                self.work.push(WorkItem {
                    expr: expr_idx,
                    kind: WorkKind::TupleElems { next: 0 },
                });
                Ok(())
            }
            Expr::Record { .. } => {
                self.work.push(WorkItem {
                    expr: expr_idx,
                    kind: WorkKind::RecordFields { next: 0 },
                });
                Ok(())
            }
            Expr::EmptyRecord => {
                let layout = self.layouts.unit();
                self.push_value(layout).map(|_| ())
            }

            Expr::FieldAccess { receiver, field } => {
                self.work.push(WorkItem {
                    expr: expr_idx,
                    kind: WorkKind::FieldGet { field },
                });
                self.work.push(WorkItem {
                    expr: receiver,
                    kind: WorkKind::EvalExpr,
                });
                Ok(())
            }
            Expr::TupleAccess { receiver, index } => {
                self.work.push(WorkItem {
                    expr: expr_idx,
                    kind: WorkKind::TupleGet { index },
                });
                self.work.push(WorkItem {
                    expr: receiver,
                    kind: WorkKind::EvalExpr,
                });
                Ok(())
            }

            Expr::Tag { name, args } => {
                let layout = self.expr_layout(expr_idx)?;
                if matches!(self.layouts.get(layout), Layout::Scalar(Scalar::Bool)) {
                    let truthy = self.env.idents.text(name) == "True";
                    return self.push_bool_value(truthy).map(|_| ());
                }
                let _ = args;
                self.work.push(WorkItem {
                    expr: expr_idx,
                    kind: WorkKind::TagFields { next: 0 },
                });
                Ok(())
            }

            Expr::Call { func, args } => {
                let args = self.cir.expr_span(args);
                self.work.push(WorkItem {
                    expr: expr_idx,
                    kind: WorkKind::LambdaCall {
                        arg_count: args.len() as u32,
                    },
                });
                for &arg in args.iter().rev() {
                    self.work.push(WorkItem {
                        expr: arg,
                        kind: WorkKind::EvalExpr,
                    });
                }
                self.work.push(WorkItem {
                    expr: func,
                    kind: WorkKind::EvalExpr,
                });
                Ok(())
            }

            Expr::Binop { op, lhs, rhs } => {
                self.work.push(WorkItem {
                    expr: expr_idx,
                    kind: WorkKind::Binop(op),
                });
                self.work.push(WorkItem {
                    expr: rhs,
                    kind: WorkKind::EvalExpr,
                });
                self.work.push(WorkItem {
                    expr: lhs,
                    kind: WorkKind::EvalExpr,
                });
                Ok(())
            }
            Expr::And { lhs, .. } => {
                self.work.push(WorkItem {
                    expr: expr_idx,
                    kind: WorkKind::ShortCircuit { is_and: true },
                });
                self.work.push(WorkItem {
                    expr: lhs,
                    kind: WorkKind::EvalExpr,
                });
                Ok(())
            }
            Expr::Or { lhs, .. } => {
                self.work.push(WorkItem {
                    expr: expr_idx,
                    kind: WorkKind::ShortCircuit { is_and: false },
                });
                self.work.push(WorkItem {
                    expr: lhs,
                    kind: WorkKind::EvalExpr,
                });
                Ok(())
            }
            Expr::UnaryMinus { operand } => {
                self.work.push(WorkItem {
                    expr: expr_idx,
                    kind: WorkKind::UnaryMinus,
                });
                self.work.push(WorkItem {
                    expr: operand,
                    kind: WorkKind::EvalExpr,
                });
                Ok(())
            }
            Expr::UnaryNot { operand } => {
                self.work.push(WorkItem {
                    expr: expr_idx,
                    kind: WorkKind::UnaryNot,
                });
                self.work.push(WorkItem {
                    expr: operand,
                    kind: WorkKind::EvalExpr,
                });
                Ok(())
            }

            Expr::Lambda { .. } => self.make_closure(expr_idx),

            Expr::If { branches, .. } => {
                let first = self.cir.if_branches(branches)[0];
                self.work.push(WorkItem {
                    expr: expr_idx,
                    kind: WorkKind::IfCheckCondition { branch: 0 },
                });
                self.work.push(WorkItem {
                    expr: first.cond,
                    kind: WorkKind::EvalExpr,
                });
                Ok(())
            }

            Expr::Match { cond, .. } => {
                self.work.push(WorkItem {
                    expr: expr_idx,
                    kind: WorkKind::MatchCheckBranch { branch: 0 },
                });
                self.work.push(WorkItem {
                    expr: cond,
                    kind: WorkKind::EvalExpr,
                });
                Ok(())
            }

            Expr::Block { stmts, result } => {
                self.work.push(WorkItem {
                    expr: expr_idx,
                    kind: WorkKind::BlockCleanup {
                        value_base: self.values.len() as u32,
                        memory_base: self.stack.used(),
                        bindings_base: self.bindings.len() as u32,
                    },
                });
                self.work.push(WorkItem {
                    expr: result,
                    kind: WorkKind::EvalExpr,
                });
                for &stmt in self.cir.stmt_span(stmts).iter().rev() {
                    match *self.cir.stmt(stmt) {
                        Stmt::Def(def_idx) => {
                            let def = *self.cir.def(def_idx);
                            self.work.push(WorkItem {
                                expr: def.expr,
                                kind: WorkKind::BindPattern { pattern: def.pattern },
                            });
                            self.work.push(WorkItem {
                                expr: def.expr,
                                kind: WorkKind::EvalExpr,
                            });
                        }
                        Stmt::Expect { body } => {
                            self.work.push(WorkItem {
                                expr: body,
                                kind: WorkKind::ExpectCheck,
                            });
                            self.work.push(WorkItem {
                                expr: body,
                                kind: WorkKind::EvalExpr,
                            });
                        }
                    }
                }
                Ok(())
            }

            Expr::Crash { message } => {
                self.work.push(WorkItem {
                    expr: expr_idx,
                    kind: WorkKind::CrashWith,
                });
                self.work.push(WorkItem {
                    expr: message,
                    kind: WorkKind::EvalExpr,
                });
                Ok(())
            }

            Expr::RuntimeError { kind } => Err(EvalError::Crash(format!(
                "reached a runtime error ({kind:?})"
            ))),
        }
    }

    fn write_int_literal(&mut self, value: StackValue, literal: i128) -> Result<(), EvalError> {
        match *self.layouts.get(value.layout) {
            Layout::Scalar(Scalar::Int(precision)) => {
                let size = self.layouts.size(value.layout);
                write_int(self.stack.slice_mut(value.offset, size), precision, literal);
                Ok(())
            }
            Layout::Scalar(Scalar::Frac(precision)) => {
                let size = self.layouts.size(value.layout);
                write_frac(
                    self.stack.slice_mut(value.offset, size),
                    precision,
                    FracValue::Dec(literal.saturating_mul(DEC_SCALE)),
                );
                Ok(())
            }
            _ => Err(EvalError::TypeMismatch),
        }
    }

    // === Closures ===

    /// Captures that actually live in the environment: a capture whose
    /// pattern is bound by the lambda's own parameter destructuring is
    /// skipped both here and at the call site.
    fn included_captures(
        &self,
        params: cir::PatternSpan,
        captures: cir::CaptureSpan,
    ) -> Vec<cir::Capture> {
        let mut param_bound = Vec::new();
        for &param in self.cir.pattern_span(params) {
            collect_pattern_idxs(self.cir, param, &mut param_bound);
        }
        self.cir
            .captures(captures)
            .iter()
            .filter(|capture| !param_bound.contains(&capture.pattern))
            .copied()
            .collect()
    }

    fn make_closure(&mut self, expr_idx: cir::ExprIdx) -> Result<(), EvalError> {
        let Expr::Lambda { params, body, captures } = *self.cir.expr(expr_idx) else {
            return Err(EvalError::InvalidStackState);
        };
        let included = self.included_captures(params, captures);

        // Environment layout: each capture at its own alignment, in order.
        let mut env_size = 0u32;
        let mut capture_slots = Vec::with_capacity(included.len());
        for capture in &included {
            let layout = self.pattern_layout(capture.pattern)?;
            env_size = align_up(env_size, self.layouts.alignment(layout));
            capture_slots.push((env_size, layout));
            env_size += self.layouts.size(layout);
        }

        let layout = self.layouts.closure_layout(env_size);
        let value = self.push_value(layout)?;

        // Header: body idx, params span, captures span, env size.
        let header = self.stack.slice_mut(value.offset, CLOSURE_HEADER_SIZE);
        header[0..4].copy_from_slice(&body.raw().to_le_bytes());
        header[4..8].copy_from_slice(&params.start.to_le_bytes());
        header[8..10].copy_from_slice(&params.len.to_le_bytes());
        header[12..16].copy_from_slice(&captures.start.to_le_bytes());
        header[16..18].copy_from_slice(&captures.len.to_le_bytes());
        header[20..24].copy_from_slice(&env_size.to_le_bytes());

        // Copy each captured binding's bytes into the environment.
        for (capture, (slot_offset, slot_layout)) in included.iter().zip(capture_slots) {
            let binding = self
                .bindings
                .iter()
                .rev()
                .find(|b| b.pattern == capture.pattern)
                .copied()
                .ok_or(EvalError::PatternNotFound)?;
            let size = self.layouts.size(slot_layout);
            let dst = value.offset + CLOSURE_HEADER_SIZE + slot_offset;
            self.stack.copy_bytes(binding.offset, dst, size);
        }
        Ok(())
    }

    fn read_closure_header(
        &self,
        value: StackValue,
    ) -> (cir::ExprIdx, cir::PatternSpan, cir::CaptureSpan) {
        let header = self.stack.slice(value.offset, CLOSURE_HEADER_SIZE);
        let body = cir::ExprIdx::new(u32::from_le_bytes([
            header[0], header[1], header[2], header[3],
        ]));
        let params = cir::PatternSpan::new(
            u32::from_le_bytes([header[4], header[5], header[6], header[7]]),
            u16::from_le_bytes([header[8], header[9]]),
        );
        let captures = cir::CaptureSpan::new(
            u32::from_le_bytes([header[12], header[13], header[14], header[15]]),
            u16::from_le_bytes([header[16], header[17]]),
        );
        (body, params, captures)
    }

    fn do_lambda_call(&mut self, arg_count: u32) -> Result<(), EvalError> {
        if self.frames.len() >= MAX_FRAMES {
            return Err(EvalError::StackOverflow);
        }
        let total = self.values.len();
        if total < arg_count as usize + 1 {
            return Err(EvalError::InvalidStackState);
        }
        let closure_index = total - arg_count as usize - 1;
        let closure = self.values[closure_index];
        if !matches!(self.layouts.get(closure.layout), Layout::Closure { .. }) {
            return Err(EvalError::TypeMismatch);
        }
        let (body, params, captures) = self.read_closure_header(closure);

        if params.count() != arg_count as usize {
            return Err(EvalError::ArityMismatch {
                expected: params.count() as u32,
                got: arg_count,
            });
        }

        self.frames.push(Frame {
            memory_base: closure.offset,
            value_base: closure_index as u32,
            bindings_base: self.bindings.len() as u32,
        });

        // Bind parameter patterns over the argument values in place.
        let params_list = self.cir.pattern_span(params).to_vec();
        for (i, param) in params_list.into_iter().enumerate() {
            let arg = self.values[closure_index + 1 + i];
            let before = self.bindings.len();
            if !self.match_pattern(param, arg.offset, arg.layout)? {
                self.bindings.truncate(before);
                return Err(EvalError::Crash(
                    "argument did not match the parameter pattern".to_owned(),
                ));
            }
        }

        // Reattach captures as bindings into the closure's environment.
        let included = self.included_captures(params, captures);
        let mut env_offset = 0u32;
        for capture in included {
            let layout = self.pattern_layout(capture.pattern)?;
            env_offset = align_up(env_offset, self.layouts.alignment(layout));
            self.bindings.push(Binding {
                pattern: capture.pattern,
                offset: closure.offset + CLOSURE_HEADER_SIZE + env_offset,
                layout,
            });
            env_offset += self.layouts.size(layout);
        }

        self.work.push(WorkItem {
            expr: body,
            kind: WorkKind::LambdaReturn,
        });
        self.work.push(WorkItem {
            expr: body,
            kind: WorkKind::EvalExpr,
        });
        Ok(())
    }

    fn do_lambda_return(&mut self) -> Result<(), EvalError> {
        let result = self.top_value()?;
        let frame = self.frames.pop().ok_or(EvalError::InvalidStackState)?;

        let size = self.layouts.size(result.layout);
        let align = self.layouts.alignment(result.layout);
        let dst = align_up(frame.memory_base, align);
        self.stack.copy_down(result.offset, dst, size);

        self.bindings.truncate(frame.bindings_base as usize);
        self.values.truncate(frame.value_base as usize);
        self.stack.truncate_to(dst + size);
        self.values.push(StackValue {
            layout: result.layout,
            offset: dst,
        });
        Ok(())
    }

    // === Control flow ===

    fn pop_bool(&mut self) -> Result<bool, EvalError> {
        let value = self.top_value()?;
        if !matches!(self.layouts.get(value.layout), Layout::Scalar(Scalar::Bool)) {
            return Err(EvalError::TypeMismatch);
        }
        let byte = self.stack.slice(value.offset, 1)[0];
        self.values.pop();
        self.stack.truncate_to(value.offset);
        Ok(byte != 0)
    }

    fn do_if_check(&mut self, expr: cir::ExprIdx, branch: u32) -> Result<(), EvalError> {
        let Expr::If { branches, final_else } = *self.cir.expr(expr) else {
            return Err(EvalError::InvalidStackState);
        };
        let branches = self.cir.if_branches(branches).to_vec();
        let taken = self.pop_bool()?;
        if taken {
            self.work.push(WorkItem {
                expr: branches[branch as usize].body,
                kind: WorkKind::EvalExpr,
            });
        } else if ((branch + 1) as usize) < branches.len() {
            self.work.push(WorkItem {
                expr,
                kind: WorkKind::IfCheckCondition { branch: branch + 1 },
            });
            self.work.push(WorkItem {
                expr: branches[(branch + 1) as usize].cond,
                kind: WorkKind::EvalExpr,
            });
        } else {
            self.work.push(WorkItem {
                expr: final_else,
                kind: WorkKind::EvalExpr,
            });
        }
        Ok(())
    }

    fn do_short_circuit(&mut self, expr: cir::ExprIdx, is_and: bool) -> Result<(), EvalError> {
        let (rhs, short_value) = match *self.cir.expr(expr) {
            Expr::And { rhs, .. } => (rhs, false),
            Expr::Or { rhs, .. } => (rhs, true),
            _ => return Err(EvalError::InvalidStackState),
        };
        let lhs = self.pop_bool()?;
        let decided = if is_and { !lhs } else { lhs };
        if decided {
            self.push_bool_value(short_value).map(|_| ())
        } else {
            self.work.push(WorkItem {
                expr: rhs,
                kind: WorkKind::EvalExpr,
            });
            Ok(())
        }
    }

    fn do_match_check(&mut self, expr: cir::ExprIdx, branch: u32) -> Result<(), EvalError> {
        let Expr::Match { branches, .. } = *self.cir.expr(expr) else {
            return Err(EvalError::InvalidStackState);
        };
        let branches = self.cir.branches(branches).to_vec();
        if branch as usize >= branches.len() {
            return Err(EvalError::Crash("no branch of this match matched".to_owned()));
        }
        let scrutinee = self.top_value()?;
        let cleanup = WorkKind::MatchCleanup {
            value_base: (self.values.len() - 1) as u32,
            memory_base: scrutinee.offset,
            bindings_base: self.bindings.len() as u32,
        };

        let alternatives = self.cir.pattern_span(branches[branch as usize].patterns).to_vec();
        for pattern in alternatives {
            let before = self.bindings.len();
            if self.match_pattern(pattern, scrutinee.offset, scrutinee.layout)? {
                self.work.push(WorkItem { expr, kind: cleanup });
                self.work.push(WorkItem {
                    expr: branches[branch as usize].body,
                    kind: WorkKind::EvalExpr,
                });
                return Ok(());
            }
            self.bindings.truncate(before);
        }

        self.work.push(WorkItem {
            expr,
            kind: WorkKind::MatchCheckBranch { branch: branch + 1 },
        });
        Ok(())
    }

    fn do_cleanup(
        &mut self,
        value_base: u32,
        memory_base: u32,
        bindings_base: u32,
    ) -> Result<(), EvalError> {
        let result = self.top_value()?;
        let size = self.layouts.size(result.layout);
        let align = self.layouts.alignment(result.layout);
        let dst = align_up(memory_base, align);
        self.stack.copy_down(result.offset, dst, size);
        self.bindings.truncate(bindings_base as usize);
        self.values.truncate(value_base as usize);
        self.stack.truncate_to(dst + size);
        self.values.push(StackValue {
            layout: result.layout,
            offset: dst,
        });
        Ok(())
    }

    fn do_bind_top(&mut self, pattern: cir::PatternIdx) -> Result<(), EvalError> {
        let value = self.top_value()?;
        let before = self.bindings.len();
        if !self.match_pattern(pattern, value.offset, value.layout)? {
            self.bindings.truncate(before);
            return Err(EvalError::Crash(
                "value did not match the binding pattern".to_owned(),
            ));
        }
        Ok(())
    }

    fn do_expect_check(&mut self) -> Result<(), EvalError> {
        let passed = self.pop_bool()?;
        if passed {
            Ok(())
        } else {
            Err(EvalError::Crash("expectation failed".to_owned()))
        }
    }

    fn do_crash_with(&mut self) -> Result<(), EvalError> {
        let value = self.top_value()?;
        let message = self.str_text(value)?.to_owned();
        Err(EvalError::Crash(message))
    }

    // === Aggregates ===

    fn do_record_fields(&mut self, expr: cir::ExprIdx, next: u32) -> Result<(), EvalError> {
        let Expr::Record { fields } = *self.cir.expr(expr) else {
            return Err(EvalError::InvalidStackState);
        };
        let fields = self.cir.fields(fields).to_vec();
        if (next as usize) < fields.len() {
            self.work.push(WorkItem {
                expr,
                kind: WorkKind::RecordFields { next: next + 1 },
            });
            self.work.push(WorkItem {
                expr: fields[next as usize].value,
                kind: WorkKind::EvalExpr,
            });
            return Ok(());
        }

        let layout = self.expr_layout(expr)?;
        let Layout::Record(table) = *self.layouts.get(layout) else {
            return Err(EvalError::TypeMismatch);
        };
        let field_layouts = self.layouts.record_fields(table).to_vec();
        self.replace_values(fields.len(), layout, |interp, popped, scratch| {
            for (field, value) in fields.iter().zip(popped) {
                let slot = field_layouts
                    .iter()
                    .find(|f| f.name == field.name)
                    .ok_or(EvalError::TypeMismatch)?;
                let size = interp.layouts.size(slot.layout);
                interp.stack.copy_bytes(value.offset, scratch + slot.offset, size);
            }
            Ok(())
        })
    }

    fn do_tuple_elems(&mut self, expr: cir::ExprIdx, next: u32) -> Result<(), EvalError> {
        let Expr::Tuple { elems } = *self.cir.expr(expr) else {
            return Err(EvalError::InvalidStackState);
        };
        let elems = self.cir.expr_span(elems).to_vec();
        if (next as usize) < elems.len() {
            self.work.push(WorkItem {
                expr,
                kind: WorkKind::TupleElems { next: next + 1 },
            });
            self.work.push(WorkItem {
                expr: elems[next as usize],
                kind: WorkKind::EvalExpr,
            });
            return Ok(());
        }

        let layout = self.expr_layout(expr)?;
        let Layout::Tuple(table) = *self.layouts.get(layout) else {
            return Err(EvalError::TypeMismatch);
        };
        let elem_layouts = self.layouts.tuple_elems(table).to_vec();
        self.replace_values(elems.len(), layout, |interp, popped, scratch| {
            for slot in &elem_layouts {
                let value = popped
                    .get(slot.index as usize)
                    .ok_or(EvalError::TypeMismatch)?;
                let size = interp.layouts.size(slot.layout);
                interp.stack.copy_bytes(value.offset, scratch + slot.offset, size);
            }
            Ok(())
        })
    }

    fn do_tag_fields(&mut self, expr: cir::ExprIdx, next: u32) -> Result<(), EvalError> {
        let Expr::Tag { name, args } = *self.cir.expr(expr) else {
            return Err(EvalError::InvalidStackState);
        };
        let args = self.cir.expr_span(args).to_vec();
        if (next as usize) < args.len() {
            self.work.push(WorkItem {
                expr,
                kind: WorkKind::TagFields { next: next + 1 },
            });
            self.work.push(WorkItem {
                expr: args[next as usize],
                kind: WorkKind::EvalExpr,
            });
            return Ok(());
        }

        let layout = self.expr_layout(expr)?;
        let Layout::Union(handle) = *self.layouts.get(layout) else {
            return Err(EvalError::TypeMismatch);
        };
        let union = self.layouts.union(handle).clone();
        let discriminant = union.discriminant_of(name).ok_or(EvalError::TypeMismatch)?;

        match union.repr {
            UnionRepr::NonNullableUnwrapped
            | UnionRepr::NullableUnwrapped { .. }
            | UnionRepr::NullableWrapped { .. } => Err(EvalError::Crash(
                "recursive tag values are not supported by the interpreter".to_owned(),
            )),
            UnionRepr::Enumeration => self.replace_values(args.len(), layout, |interp, _, scratch| {
                interp.stack.slice_mut(scratch, 1)[0] = discriminant as u8;
                Ok(())
            }),
            UnionRepr::SingleTagStruct | UnionRepr::Wrapped => {
                let variant = union.variants[discriminant as usize].clone();
                let discriminant_offset = union.discriminant_offset;
                self.replace_values(args.len(), layout, |interp, popped, scratch| {
                    for ((offset, slot_layout), value) in variant
                        .arg_offsets
                        .iter()
                        .zip(&variant.arg_layouts)
                        .map(|(&o, &l)| (o, l))
                        .zip(popped)
                    {
                        let size = interp.layouts.size(slot_layout);
                        interp.stack.copy_bytes(value.offset, scratch + offset, size);
                    }
                    if let Some(disc_offset) = discriminant_offset {
                        interp.stack.slice_mut(scratch + disc_offset, 1)[0] = discriminant as u8;
                    }
                    Ok(())
                })
            }
        }
    }

    fn do_field_get(&mut self, field: Ident) -> Result<(), EvalError> {
        let record = self.top_value()?;
        let Layout::Record(table) = *self.layouts.get(record.layout) else {
            return Err(EvalError::TypeMismatch);
        };
        let slot = self
            .layouts
            .record_fields(table)
            .iter()
            .find(|f| f.name == field)
            .copied()
            .ok_or(EvalError::TypeMismatch)?;

        let size = self.layouts.size(slot.layout);
        let align = self.layouts.alignment(slot.layout);
        let dst = align_up(record.offset, align);
        self.stack.copy_down(record.offset + slot.offset, dst, size);
        self.values.pop();
        self.stack.truncate_to(dst + size);
        self.values.push(StackValue {
            layout: slot.layout,
            offset: dst,
        });
        Ok(())
    }

    fn do_tuple_get(&mut self, index: u32) -> Result<(), EvalError> {
        let tuple = self.top_value()?;
        let Layout::Tuple(table) = *self.layouts.get(tuple.layout) else {
            return Err(EvalError::TypeMismatch);
        };
        let slot = self
            .layouts
            .tuple_elems(table)
            .iter()
            .find(|e| e.index == index)
            .copied()
            .ok_or(EvalError::TypeMismatch)?;

        let size = self.layouts.size(slot.layout);
        let align = self.layouts.alignment(slot.layout);
        let dst = align_up(tuple.offset, align);
        self.stack.copy_down(tuple.offset + slot.offset, dst, size);
        self.values.pop();
        self.stack.truncate_to(dst + size);
        self.values.push(StackValue {
            layout: slot.layout,
            offset: dst,
        });
        Ok(())
    }

    fn do_str_concat(&mut self, count: u32) -> Result<(), EvalError> {
        let count = count as usize;
        if self.values.len() < count {
            return Err(EvalError::InvalidStackState);
        }
        let mut text = String::new();
        for value in self.values[self.values.len() - count..].to_vec() {
            text.push_str(self.str_text(value)?);
        }
        let first = self.values[self.values.len() - count];
        self.values.truncate(self.values.len() - count);
        self.stack.truncate_to(first.offset);
        self.push_str_value(text).map(|_| ())
    }

    // === Binops ===

    fn do_binop(&mut self, op: Binop) -> Result<(), EvalError> {
        if self.values.len() < 2 {
            return Err(EvalError::InvalidStackState);
        }
        let rhs = self.values[self.values.len() - 1];
        let lhs = self.values[self.values.len() - 2];

        if op.is_comparison() {
            let result = self.compare(op, lhs, rhs)?;
            self.values.truncate(self.values.len() - 2);
            self.stack.truncate_to(lhs.offset);
            return self.push_bool_value(result).map(|_| ());
        }

        // Arithmetic: both operands share the left-hand operand's layout.
        match *self.layouts.get(lhs.layout) {
            Layout::Scalar(Scalar::Int(precision)) => {
                let size = self.layouts.size(lhs.layout);
                let a = read_int(self.stack.slice(lhs.offset, size), precision);
                let b = read_int(self.stack.slice(rhs.offset, size), precision);
                let result = match op {
                    Binop::Add => a.wrapping_add(b),
                    Binop::Sub => a.wrapping_sub(b),
                    Binop::Mul => a.wrapping_mul(b),
                    Binop::Div | Binop::DivTrunc => {
                        if b == 0 {
                            return Err(EvalError::DivisionByZero);
                        }
                        a / b
                    }
                    Binop::Rem => {
                        if b == 0 {
                            return Err(EvalError::DivisionByZero);
                        }
                        a % b
                    }
                    _ => return Err(EvalError::TypeMismatch),
                };
                self.values.truncate(self.values.len() - 2);
                self.stack.truncate_to(lhs.offset);
                let pushed = self.push_value(lhs.layout)?;
                write_int(self.stack.slice_mut(pushed.offset, size), precision, result);
                Ok(())
            }
            Layout::Scalar(Scalar::Frac(precision)) => {
                let size = self.layouts.size(lhs.layout);
                let a = read_frac(self.stack.slice(lhs.offset, size), precision);
                let b = read_frac(self.stack.slice(rhs.offset, size), precision);
                let result = match precision {
                    rill_types::FracPrecision::Dec => {
                        let (a, b) = (a.to_dec(), b.to_dec());
                        let raw = match op {
                            Binop::Add => a.wrapping_add(b),
                            Binop::Sub => a.wrapping_sub(b),
                            Binop::Mul => dec_mul(a, b)?,
                            Binop::Div => dec_div(a, b)?,
                            Binop::DivTrunc | Binop::Rem => {
                                if b == 0 {
                                    return Err(EvalError::DivisionByZero);
                                }
                                match op {
                                    Binop::DivTrunc => (a / b).saturating_mul(DEC_SCALE),
                                    _ => a % b,
                                }
                            }
                            _ => return Err(EvalError::TypeMismatch),
                        };
                        FracValue::Dec(raw)
                    }
                    _ => {
                        let (a, b) = (a.to_f64(), b.to_f64());
                        let raw = match op {
                            Binop::Add => a + b,
                            Binop::Sub => a - b,
                            Binop::Mul => a * b,
                            Binop::Div => {
                                if b == 0.0 {
                                    return Err(EvalError::DivisionByZero);
                                }
                                a / b
                            }
                            Binop::DivTrunc => {
                                if b == 0.0 {
                                    return Err(EvalError::DivisionByZero);
                                }
                                (a / b).trunc()
                            }
                            Binop::Rem => {
                                if b == 0.0 {
                                    return Err(EvalError::DivisionByZero);
                                }
                                a % b
                            }
                            _ => return Err(EvalError::TypeMismatch),
                        };
                        FracValue::F64(raw)
                    }
                };
                self.values.truncate(self.values.len() - 2);
                self.stack.truncate_to(lhs.offset);
                let pushed = self.push_value(lhs.layout)?;
                write_frac(self.stack.slice_mut(pushed.offset, size), precision, result);
                Ok(())
            }
            _ => Err(EvalError::TypeMismatch),
        }
    }

    fn compare(&mut self, op: Binop, lhs: StackValue, rhs: StackValue) -> Result<bool, EvalError> {
        use std::cmp::Ordering;
        let ordering = match *self.layouts.get(lhs.layout) {
            Layout::Scalar(Scalar::Int(precision)) => {
                let size = self.layouts.size(lhs.layout);
                let a = read_int(self.stack.slice(lhs.offset, size), precision);
                let b = read_int(self.stack.slice(rhs.offset, size), precision);
                a.cmp(&b)
            }
            Layout::Scalar(Scalar::Frac(precision)) => {
                let size = self.layouts.size(lhs.layout);
                let a = read_frac(self.stack.slice(lhs.offset, size), precision);
                let b = read_frac(self.stack.slice(rhs.offset, size), precision);
                match precision {
                    rill_types::FracPrecision::Dec => a.to_dec().cmp(&b.to_dec()),
                    _ => a
                        .to_f64()
                        .partial_cmp(&b.to_f64())
                        .unwrap_or(Ordering::Equal),
                }
            }
            Layout::Scalar(Scalar::Bool) => {
                let a = self.stack.slice(lhs.offset, 1)[0];
                let b = self.stack.slice(rhs.offset, 1)[0];
                a.cmp(&b)
            }
            Layout::Scalar(Scalar::Str) => {
                let a = self.str_text(lhs)?.to_owned();
                let b = self.str_text(rhs)?;
                return match op {
                    Binop::Eq => Ok(a == b),
                    Binop::Ne => Ok(a != b),
                    _ => Err(EvalError::TypeMismatch),
                };
            }
            // Aggregates support equality by byte comparison (memory is
            // zero-initialized, so padding compares equal).
            _ => {
                let size = self.layouts.size(lhs.layout);
                let a = self.stack.slice(lhs.offset, size).to_vec();
                let b = self.stack.slice(rhs.offset, size);
                return match op {
                    Binop::Eq => Ok(a == b),
                    Binop::Ne => Ok(a != b),
                    _ => Err(EvalError::TypeMismatch),
                };
            }
        };
        Ok(match op {
            Binop::Eq => ordering == Ordering::Equal,
            Binop::Ne => ordering != Ordering::Equal,
            Binop::Lt => ordering == Ordering::Less,
            Binop::Gt => ordering == Ordering::Greater,
            Binop::Le => ordering != Ordering::Greater,
            Binop::Ge => ordering != Ordering::Less,
            _ => return Err(EvalError::TypeMismatch),
        })
    }

    fn do_unary_minus(&mut self) -> Result<(), EvalError> {
        let value = self.top_value()?;
        match *self.layouts.get(value.layout) {
            Layout::Scalar(Scalar::Int(precision)) => {
                let size = self.layouts.size(value.layout);
                let current = read_int(self.stack.slice(value.offset, size), precision);
                write_int(
                    self.stack.slice_mut(value.offset, size),
                    precision,
                    current.wrapping_neg(),
                );
                Ok(())
            }
            Layout::Scalar(Scalar::Frac(precision)) => {
                let size = self.layouts.size(value.layout);
                let current = read_frac(self.stack.slice(value.offset, size), precision);
                let negated = match current {
                    FracValue::F32(v) => FracValue::F32(-v),
                    FracValue::F64(v) => FracValue::F64(-v),
                    FracValue::Dec(raw) => FracValue::Dec(-raw),
                };
                write_frac(self.stack.slice_mut(value.offset, size), precision, negated);
                Ok(())
            }
            _ => Err(EvalError::TypeMismatch),
        }
    }

    fn do_unary_not(&mut self) -> Result<(), EvalError> {
        let value = self.top_value()?;
        if !matches!(self.layouts.get(value.layout), Layout::Scalar(Scalar::Bool)) {
            return Err(EvalError::TypeMismatch);
        }
        let byte = self.stack.slice(value.offset, 1)[0];
        self.stack.slice_mut(value.offset, 1)[0] = u8::from(byte == 0);
        Ok(())
    }

    // === Pattern matching ===

    /// Walk `pattern` over the value at `offset`, appending bindings as it
    /// goes. Returns whether the value matched; on `false` the caller rolls
    /// the bindings back.
    fn match_pattern(
        &mut self,
        pattern: cir::PatternIdx,
        offset: u32,
        layout: LayoutIdx,
    ) -> Result<bool, EvalError> {
        match *self.cir.pattern(pattern) {
            Pattern::Bind { .. } => {
                self.bindings.push(Binding { pattern, offset, layout });
                Ok(true)
            }
            Pattern::Underscore => Ok(true),
            Pattern::IntLiteral { value } => match *self.layouts.get(layout) {
                Layout::Scalar(Scalar::Int(precision)) => {
                    let size = self.layouts.size(layout);
                    Ok(read_int(self.stack.slice(offset, size), precision) == value)
                }
                Layout::Scalar(Scalar::Frac(precision)) => {
                    let size = self.layouts.size(layout);
                    let actual = read_frac(self.stack.slice(offset, size), precision);
                    Ok(actual.to_dec() == value.saturating_mul(DEC_SCALE))
                }
                _ => Err(EvalError::TypeMismatch),
            },
            Pattern::FracLiteral { bits } => match *self.layouts.get(layout) {
                Layout::Scalar(Scalar::Frac(precision)) => {
                    let size = self.layouts.size(layout);
                    let actual = read_frac(self.stack.slice(offset, size), precision);
                    let wanted = f64::from_bits(bits);
                    Ok(match precision {
                        rill_types::FracPrecision::Dec => {
                            actual.to_dec() == FracValue::dec_from_f64(wanted)
                        }
                        _ => (actual.to_f64() - wanted).abs() < f64::EPSILON,
                    })
                }
                _ => Err(EvalError::TypeMismatch),
            },
            Pattern::StrLiteral(lit) => {
                let value = StackValue { layout, offset };
                let actual = self.str_text(value)?;
                Ok(actual == self.env.strings.text(lit))
            }
            Pattern::Scalar(wanted) => match *self.layouts.get(layout) {
                Layout::Scalar(Scalar::Int(precision)) => {
                    let size = self.layouts.size(layout);
                    Ok(read_int(self.stack.slice(offset, size), precision)
                        == i128::from(wanted))
                }
                _ => Err(EvalError::TypeMismatch),
            },
            Pattern::Tag { name, args } => self.match_tag(name, args, offset, layout),
            Pattern::Record { destructs } => {
                let Layout::Record(table) = *self.layouts.get(layout) else {
                    return Err(EvalError::TypeMismatch);
                };
                let fields = self.layouts.record_fields(table).to_vec();
                for destruct in self.cir.destructs(destructs).to_vec() {
                    let slot = fields
                        .iter()
                        .find(|f| f.name == destruct.label)
                        .copied()
                        .ok_or(EvalError::TypeMismatch)?;
                    let sub = match destruct.kind {
                        DestructKind::Required(sub) | DestructKind::SubPattern(sub) => sub,
                    };
                    if !self.match_pattern(sub, offset + slot.offset, slot.layout)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Pattern::Tuple { patterns } => {
                let Layout::Tuple(table) = *self.layouts.get(layout) else {
                    return Err(EvalError::TypeMismatch);
                };
                let elems = self.layouts.tuple_elems(table).to_vec();
                for (index, sub) in self.cir.pattern_span(patterns).to_vec().into_iter().enumerate()
                {
                    let slot = elems
                        .iter()
                        .find(|e| e.index == index as u32)
                        .copied()
                        .ok_or(EvalError::TypeMismatch)?;
                    if !self.match_pattern(sub, offset + slot.offset, slot.layout)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Pattern::List { .. } => Err(EvalError::TypeMismatch),
            Pattern::RuntimeError { .. } => Err(EvalError::Crash(
                "reached a malformed pattern".to_owned(),
            )),
        }
    }

    fn match_tag(
        &mut self,
        name: Ident,
        args: cir::PatternSpan,
        offset: u32,
        layout: LayoutIdx,
    ) -> Result<bool, EvalError> {
        // Boolean tags match against the Bool scalar directly.
        if matches!(self.layouts.get(layout), Layout::Scalar(Scalar::Bool)) {
            let byte = self.stack.slice(offset, 1)[0];
            let wanted = self.env.idents.text(name) == "True";
            return Ok((byte != 0) == wanted);
        }
        let Layout::Union(handle) = *self.layouts.get(layout) else {
            return Err(EvalError::TypeMismatch);
        };
        let union = self.layouts.union(handle).clone();
        let Some(discriminant) = union.discriminant_of(name) else {
            return Ok(false);
        };
        match union.repr {
            UnionRepr::Enumeration => {
                let actual = self.stack.slice(offset, 1)[0];
                Ok(actual == discriminant as u8)
            }
            UnionRepr::SingleTagStruct => {
                let variant = &union.variants[discriminant as usize];
                let offsets = variant.arg_offsets.clone();
                let arg_layouts = variant.arg_layouts.clone();
                for ((sub, slot_offset), slot_layout) in self
                    .cir
                    .pattern_span(args)
                    .to_vec()
                    .into_iter()
                    .zip(offsets)
                    .zip(arg_layouts)
                {
                    if !self.match_pattern(sub, offset + slot_offset, slot_layout)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            UnionRepr::Wrapped => {
                let disc_offset = union
                    .discriminant_offset
                    .ok_or(EvalError::InvalidStackState)?;
                let actual = self.stack.slice(offset + disc_offset, 1)[0];
                if actual != discriminant as u8 {
                    return Ok(false);
                }
                let variant = &union.variants[discriminant as usize];
                let offsets = variant.arg_offsets.clone();
                let arg_layouts = variant.arg_layouts.clone();
                for ((sub, slot_offset), slot_layout) in self
                    .cir
                    .pattern_span(args)
                    .to_vec()
                    .into_iter()
                    .zip(offsets)
                    .zip(arg_layouts)
                {
                    if !self.match_pattern(sub, offset + slot_offset, slot_layout)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            _ => Err(EvalError::Crash(
                "recursive tag values are not supported by the interpreter".to_owned(),
            )),
        }
    }

    // === Rendering (for hosts and tests) ===

    /// Render a value as display text.
    pub fn render_value(&mut self, value: StackValue) -> String {
        match *self.layouts.get(value.layout) {
            Layout::Scalar(Scalar::Int(precision)) => {
                let size = self.layouts.size(value.layout);
                read_int(self.stack.slice(value.offset, size), precision).to_string()
            }
            Layout::Scalar(Scalar::Frac(precision)) => {
                let size = self.layouts.size(value.layout);
                let raw = read_frac(self.stack.slice(value.offset, size), precision);
                format!("{}", raw.to_f64())
            }
            Layout::Scalar(Scalar::Bool) => {
                if self.stack.slice(value.offset, 1)[0] != 0 {
                    "True".to_owned()
                } else {
                    "False".to_owned()
                }
            }
            Layout::Scalar(Scalar::Str) => match self.str_text(value) {
                Ok(text) => format!("{text:?}"),
                Err(_) => "<invalid string>".to_owned(),
            },
            Layout::Record(table) => {
                let fields = self.layouts.record_fields(table).to_vec();
                if fields.is_empty() {
                    return "{}".to_owned();
                }
                let parts: Vec<String> = fields
                    .into_iter()
                    .map(|f| {
                        let inner = self.render_value(StackValue {
                            layout: f.layout,
                            offset: value.offset + f.offset,
                        });
                        format!("{}: {}", self.env.idents.text(f.name), inner)
                    })
                    .collect();
                format!("{{{}}}", parts.join(", "))
            }
            Layout::Tuple(table) => {
                let mut elems = self.layouts.tuple_elems(table).to_vec();
                elems.sort_by_key(|e| e.index);
                let parts: Vec<String> = elems
                    .into_iter()
                    .map(|e| {
                        self.render_value(StackValue {
                            layout: e.layout,
                            offset: value.offset + e.offset,
                        })
                    })
                    .collect();
                format!("({})", parts.join(", "))
            }
            Layout::Union(handle) => {
                let union = self.layouts.union(handle).clone();
                let discriminant = match (union.repr.clone(), union.discriminant_offset) {
                    (UnionRepr::SingleTagStruct, _) => 0u8,
                    (_, Some(disc_offset)) => self.stack.slice(value.offset + disc_offset, 1)[0],
                    _ => return "<tag>".to_owned(),
                };
                let Some(variant) = union.variants.get(discriminant as usize) else {
                    return "<tag>".to_owned();
                };
                let name = self.env.idents.text(variant.name).to_owned();
                if variant.arg_layouts.is_empty() {
                    return name;
                }
                let parts: Vec<String> = variant
                    .arg_offsets
                    .iter()
                    .zip(&variant.arg_layouts)
                    .map(|(&o, &l)| {
                        self.render_value(StackValue {
                            layout: l,
                            offset: value.offset + o,
                        })
                    })
                    .collect();
                format!("{name}({})", parts.join(", "))
            }
            Layout::Closure { .. } => "<function>".to_owned(),
            Layout::List { .. } => "<list>".to_owned(),
            Layout::Box { .. } => "<box>".to_owned(),
        }
    }

    /// Raw bytes of a value, for determinism checks at the host boundary.
    pub fn value_bytes(&self, value: StackValue) -> &[u8] {
        let size = self.layouts.size(value.layout);
        self.stack.slice(value.offset, size)
    }
}

/// Collect every pattern index reachable from `pattern` (itself included).
fn collect_pattern_idxs(cir: &CirStore, pattern: cir::PatternIdx, out: &mut Vec<cir::PatternIdx>) {
    out.push(pattern);
    match *cir.pattern(pattern) {
        Pattern::Tag { args, .. } => {
            for &sub in cir.pattern_span(args) {
                collect_pattern_idxs(cir, sub, out);
            }
        }
        Pattern::Tuple { patterns } => {
            for &sub in cir.pattern_span(patterns) {
                collect_pattern_idxs(cir, sub, out);
            }
        }
        Pattern::Record { destructs } => {
            for destruct in cir.destructs(destructs) {
                match destruct.kind {
                    DestructKind::Required(sub) | DestructKind::SubPattern(sub) => {
                        collect_pattern_idxs(cir, sub, out);
                    }
                }
            }
        }
        Pattern::List { before, rest, after } => {
            for &sub in cir.pattern_span(before) {
                collect_pattern_idxs(cir, sub, out);
            }
            for &sub in cir.pattern_span(after) {
                collect_pattern_idxs(cir, sub, out);
            }
            if let Some(cir::ListRest { pattern: Some(rest_pattern) }) = rest {
                out.push(rest_pattern);
            }
        }
        _ => {}
    }
}
