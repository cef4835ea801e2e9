//! The tree-walking evaluator (component F): executes a resolved AST directly,
//! carrying an explicit operand stack alongside the [`Context`] so every
//! in-flight intermediate `Value` is a GC root even while it is only a Rust
//! local variable mid-expression (SPEC_FULL.md §4.F, §5).
//!
//! The AST carries no per-node line numbers (only the lexer/parser do, straight
//! off token positions), so diagnostics raised here report line 0. This is a
//! known simplification relative to the lexer/parser, which report real lines.

use indexmap::IndexMap;
use std::rc::Rc;

use crate::ast::{BinOp, Expr, ListOp, Literal, LogicOp, RelOp, Stmt, UnOp};
use crate::context::Context;
use crate::diagnostics::{Category, DiagnosticSink};
use crate::heap::{FunctionObj, HeapData, StructObj};
use crate::io::PrintSink;
use crate::scope::{Scope, ScopeRef};
use crate::types::LinkedList;
use crate::value::{self, Value};

const NO_LINE: u32 = 0;

/// Non-local control transfer: a `return` statement unwinds the statement
/// sequencer up to the enclosing function call boundary, where it is consumed
/// and turned into that call's result (SPEC_FULL.md §9).
enum Flow {
    Normal,
    Return(Value),
}

pub struct Evaluator<'a> {
    ctx: &'a mut Context,
    sink: &'a mut DiagnosticSink,
    out: &'a mut dyn PrintSink,
    operand_stack: Vec<Value>,
    trace: bool,
}

impl<'a> Evaluator<'a> {
    pub fn new(ctx: &'a mut Context, sink: &'a mut DiagnosticSink, out: &'a mut dyn PrintSink) -> Self {
        Self {
            ctx,
            sink,
            out,
            operand_stack: Vec::new(),
            trace: false,
        }
    }

    /// Enables node-by-node tracing of executed statements to stderr
    /// (the evaluator side of `--debug`, SPEC_FULL.md §4.M).
    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    /// Runs a whole program: a fresh sequence of top-level statements.
    /// A stray top-level `return` is treated exactly like one hitting a
    /// function's call boundary — there's no enclosing call to hand a value
    /// back to, so it simply stops the remaining top-level statements.
    pub fn run(&mut self, program: &[Stmt]) {
        self.exec_stmts(program);
    }

    fn type_error(&mut self, message: impl Into<String>) -> Value {
        self.sink.report(Category::TypeError, message, NO_LINE);
        Value::Null
    }

    // ---- statements --------------------------------------------------

    fn exec_stmts(&mut self, stmts: &[Stmt]) -> Flow {
        for s in stmts {
            match self.exec_stmt(s) {
                Flow::Normal => {}
                ret @ Flow::Return(_) => return ret,
            }
        }
        Flow::Normal
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> Flow {
        if self.trace {
            eprintln!("trace: {stmt:?}");
        }
        match stmt {
            Stmt::Print(e) => {
                let v = self.eval(e);
                let text = v.to_display_string(&self.ctx.heap);
                self.out.print(&text);
                Flow::Normal
            }
            Stmt::Println(e) => {
                let v = self.eval(e);
                let text = v.to_display_string(&self.ctx.heap);
                self.out.print(&text);
                self.out.print("\n");
                Flow::Normal
            }
            Stmt::Let(assign_expr) => {
                self.eval(assign_expr);
                Flow::Normal
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let cv = self.eval(cond);
                if cv.truthy(self.sink, NO_LINE) {
                    self.exec_block(then_branch)
                } else if let Some(else_b) = else_branch {
                    self.exec_block(else_b)
                } else {
                    Flow::Normal
                }
            }
            Stmt::While { cond, body } => {
                loop {
                    let cv = self.eval(cond);
                    if !cv.truthy(self.sink, NO_LINE) {
                        break;
                    }
                    match self.exec_block(body) {
                        Flow::Normal => {}
                        ret @ Flow::Return(_) => return ret,
                    }
                }
                Flow::Normal
            }
            Stmt::Return(expr) => {
                let v = match expr {
                    Some(e) => self.eval(e),
                    None => Value::Null,
                };
                Flow::Return(v)
            }
            Stmt::FuncDef { name, params, body } => {
                let closure = self.ctx.current_scope();
                let func = FunctionObj::TreeWalk {
                    name: name.clone(),
                    params: params.clone(),
                    body: Rc::new(body.clone()),
                    closure,
                };
                let id = self.ctx.heap.make_function(func);
                self.ctx.bind_local(name, Value::Ref(id));
                Flow::Normal
            }
            Stmt::StructDef { name, fields } => {
                self.ctx.register_struct_type(name.clone(), fields.clone());
                Flow::Normal
            }
            Stmt::Block(body) => self.exec_block(body),
            Stmt::Expr(e) => {
                self.eval(e);
                Flow::Normal
            }
            Stmt::Error => Flow::Normal,
        }
    }

    /// A nested block (`if`/`while`/`{ }`) opens its own scope. A function or
    /// lambda *body* is executed without this extra scope — the one scope
    /// opened for the call already matches the one scope the resolver pushed
    /// for that body (see `call_tree_walk`).
    fn exec_block(&mut self, stmts: &[Stmt]) -> Flow {
        self.ctx.open_scope();
        let flow = self.exec_stmts(stmts);
        self.ctx.close_scope(&self.operand_stack);
        flow
    }

    // ---- expression evaluation plumbing -------------------------------

    /// Evaluates `e`. Callers that need to hold the result live across a
    /// further recursive `eval` (which might itself call a function and
    /// trigger a GC cycle) must push it onto `operand_stack` first — see
    /// `eval_pair`/`eval_seq`.
    fn eval(&mut self, e: &Expr) -> Value {
        self.eval_inner(e)
    }

    /// Evaluates `a` then `b`, keeping `a`'s value rooted on the operand
    /// stack while `b` evaluates.
    fn eval_pair(&mut self, a: &Expr, b: &Expr) -> (Value, Value) {
        let va = self.eval(a);
        self.operand_stack.push(va.clone());
        let vb = self.eval(b);
        self.operand_stack.pop();
        (va, vb)
    }

    /// Evaluates every expression in order, keeping each prior result rooted
    /// while later ones evaluate.
    fn eval_seq(&mut self, exprs: &[Expr]) -> Vec<Value> {
        let mut values = Vec::with_capacity(exprs.len());
        for e in exprs {
            let v = self.eval(e);
            self.operand_stack.push(v.clone());
            values.push(v);
        }
        for _ in 0..exprs.len() {
            self.operand_stack.pop();
        }
        values
    }

    fn eval_inner(&mut self, e: &Expr) -> Value {
        match e {
            Expr::Const(lit) => self.eval_literal(lit),
            Expr::Id { name, depth } => self.ctx.lookup(name, *depth, self.sink, NO_LINE),
            Expr::Unop { op, expr } => self.eval_unop(*op, expr),
            Expr::Binop { op, lhs, rhs } => {
                let (a, b) = self.eval_pair(lhs, rhs);
                self.apply_binop(*op, &a, &b)
            }
            Expr::Relop { op, lhs, rhs } => {
                let (a, b) = self.eval_pair(lhs, rhs);
                Value::Bool(self.apply_relop(*op, &a, &b))
            }
            Expr::Logic { op, lhs, rhs } => self.eval_logic(*op, lhs, rhs),
            Expr::Assign { target, value } => {
                let v = self.eval(value);
                self.operand_stack.push(v.clone());
                self.assign_to(target, v.clone());
                self.operand_stack.pop();
                v
            }
            Expr::Subscript { container, index } => self.eval_subscript(container, index),
            Expr::Call { callee, args } => self.eval_call(callee, args),
            Expr::Lambda { params, body } => {
                let closure = self.ctx.current_scope();
                let func = FunctionObj::TreeWalk {
                    name: "<lambda>".to_string(),
                    params: params.clone(),
                    body: Rc::new(body.clone()),
                    closure,
                };
                Value::Ref(self.ctx.heap.make_function(func))
            }
            Expr::List(items) => {
                let values = self.eval_seq(items);
                let list = LinkedList::from_values(values);
                Value::Ref(self.ctx.heap.make_list(list))
            }
            Expr::ListOp { op, args } => self.eval_list_op(*op, args),
            Expr::Range { start, end } => self.eval_range(start, end),
            Expr::Comprehension { source, mapper, predicate } => self.eval_comprehension(source, mapper, predicate),
            Expr::Regex { text, pattern } => self.eval_regex(text, pattern),
            Expr::Bless { type_name } => self.eval_bless(type_name),
            Expr::Typeof(inner) => {
                let v = self.eval(inner);
                let name = v.kind_name(&self.ctx.heap);
                Value::Ref(self.ctx.heap.make_string(name.to_string()))
            }
            Expr::Ternary {
                cond,
                then_branch,
                else_branch,
            } => {
                let cv = self.eval(cond);
                if cv.truthy(self.sink, NO_LINE) {
                    self.eval(then_branch)
                } else {
                    self.eval(else_branch)
                }
            }
            Expr::Error => Value::Null,
        }
    }

    fn eval_literal(&mut self, lit: &Literal) -> Value {
        match lit {
            Literal::Int(i) => Value::Int(*i),
            Literal::Real(r) => Value::Real(*r),
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Char(c) => Value::Char(*c),
            Literal::Nil => Value::Null,
            Literal::Str(s) => Value::Ref(self.ctx.heap.make_string(s.clone())),
        }
    }

    fn eval_unop(&mut self, op: UnOp, expr: &Expr) -> Value {
        match op {
            UnOp::Neg => {
                let v = self.eval(expr);
                value::neg(&v, self.sink, NO_LINE)
            }
            UnOp::Not => {
                let v = self.eval(expr);
                value::not(&v, self.sink, NO_LINE)
            }
            UnOp::PostInc | UnOp::PostDec => {
                let old = self.eval(expr);
                let delta = if op == UnOp::PostInc { 1 } else { -1 };
                let updated = value::add(&old, &Value::Int(delta), &mut self.ctx.heap, self.sink, NO_LINE);
                self.operand_stack.push(old.clone());
                self.assign_to(expr, updated);
                self.operand_stack.pop();
                old
            }
        }
    }

    fn apply_binop(&mut self, op: BinOp, a: &Value, b: &Value) -> Value {
        match op {
            BinOp::Add => value::add(a, b, &mut self.ctx.heap, self.sink, NO_LINE),
            BinOp::Sub => value::sub(a, b, self.sink, NO_LINE),
            BinOp::Mul => value::mul(a, b, self.sink, NO_LINE),
            BinOp::Div => value::div(a, b, self.sink, NO_LINE),
            BinOp::Mod => value::modulo(a, b, self.sink, NO_LINE),
            BinOp::Pow => value::pow(a, b, self.sink, NO_LINE),
        }
    }

    fn apply_relop(&mut self, op: RelOp, a: &Value, b: &Value) -> bool {
        match op {
            RelOp::Lt => value::lt(a, b, &self.ctx.heap),
            RelOp::Gt => value::gt(a, b, &self.ctx.heap),
            RelOp::Lte => value::lte(a, b, &self.ctx.heap),
            RelOp::Gte => value::gte(a, b, &self.ctx.heap),
            RelOp::Equ => value::equ(a, b, &self.ctx.heap),
            RelOp::Neq => !value::equ(a, b, &self.ctx.heap),
        }
    }

    /// Short-circuiting: the right operand is only evaluated (and so only
    /// then matters for rooting) when the left operand doesn't decide it.
    /// Both operands must be Bool, which never carries a heap reference, so
    /// no extra rooting discipline is needed here.
    fn eval_logic(&mut self, op: LogicOp, lhs: &Expr, rhs: &Expr) -> Value {
        let l = self.eval(lhs);
        let lb = l.truthy(self.sink, NO_LINE);
        match op {
            LogicOp::And if !lb => Value::Bool(false),
            LogicOp::Or if lb => Value::Bool(true),
            _ => {
                let r = self.eval(rhs);
                Value::Bool(r.truthy(self.sink, NO_LINE))
            }
        }
    }

    // ---- assignment / subscript ---------------------------------------

    fn assign_to(&mut self, target: &Expr, value: Value) {
        match target {
            Expr::Id { name, depth } => self.ctx.assign(name, *depth, value, self.sink, NO_LINE),
            Expr::Subscript { container, index } => {
                let cval = self.eval(container);
                let Value::Ref(id) = cval else {
                    self.type_error("cannot index-assign a non-container value");
                    return;
                };
                let is_struct = matches!(self.ctx.heap.get(id), HeapData::Struct(_));
                if is_struct {
                    let Expr::Id { name: field, .. } = index.as_ref() else {
                        self.type_error("struct field assignment requires a bare field name");
                        return;
                    };
                    match self.ctx.heap.get_mut(id) {
                        HeapData::Struct(s) if s.fields.contains_key(field) => {
                            s.fields.insert(field.clone(), value);
                        }
                        _ => self.sink.report(Category::IndexError, format!("no such field '{field}'"), NO_LINE),
                    }
                } else {
                    let idx_val = self.eval(index);
                    let Some(i) = as_int(&idx_val) else {
                        self.type_error("list index must be numeric");
                        return;
                    };
                    if i < 0 {
                        self.sink.report(Category::IndexError, "negative list index", NO_LINE);
                        return;
                    }
                    match self.ctx.heap.get_mut(id) {
                        HeapData::List(list) => {
                            if !list.set(i as usize, value) {
                                self.sink.report(Category::IndexError, "list index out of bounds", NO_LINE);
                            }
                        }
                        _ => {
                            self.type_error("cannot index-assign a non-List, non-Struct value");
                        }
                    }
                }
            }
            _ => {
                self.type_error("invalid assignment target");
            }
        }
    }

    fn eval_subscript(&mut self, container: &Expr, index: &Expr) -> Value {
        let cval = self.eval(container);
        let Value::Ref(id) = cval else {
            return self.type_error("cannot index a non-container value");
        };
        let is_struct = matches!(self.ctx.heap.get(id), HeapData::Struct(_));
        let is_list = matches!(self.ctx.heap.get(id), HeapData::List(_));
        if is_struct {
            let Expr::Id { name: field, .. } = index else {
                return self.type_error("struct field access requires a bare field name");
            };
            match self.ctx.heap.get(id) {
                HeapData::Struct(s) => match s.fields.get(field) {
                    Some(v) => v.clone(),
                    None => {
                        self.sink.report(Category::IndexError, format!("no such field '{field}'"), NO_LINE);
                        Value::Null
                    }
                },
                _ => unreachable!(),
            }
        } else if is_list {
            let idx_val = self.eval(index);
            let Some(i) = as_int(&idx_val) else {
                return self.type_error("list index must be numeric");
            };
            if i < 0 {
                self.sink.report(Category::IndexError, "negative list index", NO_LINE);
                return Value::Null;
            }
            match self.ctx.heap.get(id) {
                HeapData::List(list) => list.get(i as usize).cloned().unwrap_or_else(|| {
                    self.sink.report(Category::IndexError, "list index out of bounds", NO_LINE);
                    Value::Null
                }),
                _ => unreachable!(),
            }
        } else {
            self.type_error("cannot index a non-List, non-Struct value")
        }
    }

    // ---- function calls -------------------------------------------------

    fn eval_call(&mut self, callee: &Expr, args: &[Expr]) -> Value {
        let callee_val = self.eval(callee);
        self.operand_stack.push(callee_val.clone());
        let arg_vals = self.eval_seq(args);
        self.operand_stack.pop();
        self.invoke(callee_val, arg_vals)
    }

    fn invoke(&mut self, callee: Value, args: Vec<Value>) -> Value {
        let Value::Ref(id) = callee else {
            return self.type_error("attempt to call a non-function value");
        };
        let func = match self.ctx.heap.get(id) {
            HeapData::Function(f) => f.clone(),
            _ => return self.type_error("attempt to call a non-function value"),
        };
        match func {
            FunctionObj::TreeWalk { params, body, closure, .. } => self.call_tree_walk(&params, &body, closure, args),
            FunctionObj::Compiled { .. } => self.type_error("cannot call a compiled function from the evaluator"),
        }
    }

    fn call_tree_walk(&mut self, params: &[String], body: &Rc<Vec<Stmt>>, closure: Option<ScopeRef>, args: Vec<Value>) -> Value {
        let scope = Scope::new(closure);
        {
            let mut borrowed = scope.borrow_mut();
            for (i, p) in params.iter().enumerate() {
                borrowed.bind(p, args.get(i).cloned().unwrap_or(Value::Null));
            }
        }
        self.ctx.open_prepared_scope(scope);
        let flow = self.exec_stmts(body);
        let result = match flow {
            Flow::Return(v) => v,
            Flow::Normal => Value::Null,
        };
        self.operand_stack.push(result.clone());
        self.ctx.close_scope(&self.operand_stack);
        self.operand_stack.pop();
        result
    }

    // ---- lists ----------------------------------------------------------

    fn expect_list(&mut self, v: &Value) -> Option<LinkedList> {
        if let Value::Ref(id) = v {
            if let HeapData::List(l) = self.ctx.heap.get(*id) {
                return Some(l.clone());
            }
        }
        self.type_error("expected a List");
        None
    }

    fn eval_list_op(&mut self, op: ListOp, args: &[Expr]) -> Value {
        let values = self.eval_seq(args);
        match op {
            ListOp::Size => {
                let Some(list) = values.first().and_then(|v| self.expect_list(v)) else {
                    return Value::Null;
                };
                Value::Int(list.len() as i64)
            }
            ListOp::Empty => {
                let Some(list) = values.first().and_then(|v| self.expect_list(v)) else {
                    return Value::Null;
                };
                Value::Bool(list.is_empty())
            }
            ListOp::Append => {
                let (Some(list_val), Some(elem)) = (values.first(), values.get(1)) else {
                    return self.type_error("append requires (list, value)");
                };
                let Some(mut list) = self.expect_list(list_val) else {
                    return Value::Null;
                };
                list.push_back(elem.clone());
                Value::Ref(self.ctx.heap.make_list(list))
            }
            ListOp::Push => {
                let (Some(list_val), Some(elem)) = (values.first(), values.get(1)) else {
                    return self.type_error("push requires (list, value)");
                };
                let Some(mut list) = self.expect_list(list_val) else {
                    return Value::Null;
                };
                list.push_front(elem.clone());
                Value::Ref(self.ctx.heap.make_list(list))
            }
            ListOp::First => {
                let Some(list) = values.first().and_then(|v| self.expect_list(v)) else {
                    return Value::Null;
                };
                list.first().cloned().unwrap_or(Value::Null)
            }
            ListOp::Rest => {
                let Some(list) = values.first().and_then(|v| self.expect_list(v)) else {
                    return Value::Null;
                };
                Value::Ref(self.ctx.heap.make_list(list.rest()))
            }
            ListOp::Map => self.list_map(&values),
            ListOp::Filter => self.list_filter(&values),
            ListOp::Reduce => self.list_reduce(&values),
            ListOp::Sort => self.list_sort(&values),
        }
    }

    /// `list_val`/`func` are no longer rooted on the operand stack once
    /// `eval_seq` hands them back (it pops everything before returning), and
    /// every `invoke` below may itself close a scope and run a GC — so both
    /// of them, and each freshly produced element of `out`, must be pushed
    /// back onto `operand_stack` for the duration of the loop, exactly like
    /// `eval_pair`/`eval_seq` already do for plain expression evaluation.
    fn list_map(&mut self, values: &[Value]) -> Value {
        let (Some(list_val), Some(func)) = (values.first(), values.get(1)) else {
            return self.type_error("map requires (list, function)");
        };
        let Some(list) = self.expect_list(list_val) else {
            return Value::Null;
        };
        let elems: Vec<Value> = list.iter().cloned().collect();
        self.operand_stack.push(list_val.clone());
        self.operand_stack.push(func.clone());
        let mut rooted = 2;
        let mut out = LinkedList::new();
        for elem in elems {
            let mapped = self.invoke(func.clone(), vec![elem]);
            self.operand_stack.push(mapped.clone());
            rooted += 1;
            out.push_back(mapped);
        }
        for _ in 0..rooted {
            self.operand_stack.pop();
        }
        Value::Ref(self.ctx.heap.make_list(out))
    }

    fn list_filter(&mut self, values: &[Value]) -> Value {
        let (Some(list_val), Some(func)) = (values.first(), values.get(1)) else {
            return self.type_error("filter requires (list, predicate)");
        };
        let Some(list) = self.expect_list(list_val) else {
            return Value::Null;
        };
        let elems: Vec<Value> = list.iter().cloned().collect();
        self.operand_stack.push(list_val.clone());
        self.operand_stack.push(func.clone());
        let mut rooted = 2;
        let mut out = LinkedList::new();
        for elem in elems {
            let keep = self.invoke(func.clone(), vec![elem.clone()]);
            if keep.truthy(self.sink, NO_LINE) {
                self.operand_stack.push(elem.clone());
                rooted += 1;
                out.push_back(elem);
            }
        }
        for _ in 0..rooted {
            self.operand_stack.pop();
        }
        Value::Ref(self.ctx.heap.make_list(out))
    }

    fn list_reduce(&mut self, values: &[Value]) -> Value {
        let (Some(list_val), Some(func)) = (values.first(), values.get(1)) else {
            return self.type_error("reduce requires (list, function)");
        };
        let Some(list) = self.expect_list(list_val) else {
            return Value::Null;
        };
        let mut elems = list.iter().cloned();
        let Some(first) = elems.next() else {
            return Value::Null;
        };
        self.operand_stack.push(list_val.clone());
        self.operand_stack.push(func.clone());
        let mut rooted = 2;
        let mut acc = first;
        self.operand_stack.push(acc.clone());
        rooted += 1;
        for elem in elems {
            acc = self.invoke(func.clone(), vec![acc, elem]);
            self.operand_stack.push(acc.clone());
            rooted += 1;
        }
        for _ in 0..rooted {
            self.operand_stack.pop();
        }
        acc
    }

    fn list_sort(&mut self, values: &[Value]) -> Value {
        let Some(list) = values.first().and_then(|v| self.expect_list(v)) else {
            return Value::Null;
        };
        let mut elems: Vec<Value> = list.iter().cloned().collect();
        elems.sort_by(|a, b| value::compare(a, b, &self.ctx.heap));
        Value::Ref(self.ctx.heap.make_list(LinkedList::from_values(elems)))
    }

    fn eval_range(&mut self, start: &Expr, end: &Expr) -> Value {
        let (a, b) = self.eval_pair(start, end);
        let (Some(x), Some(y)) = (as_int(&a), as_int(&b)) else {
            return self.type_error("range bounds must be Int");
        };
        let mut list = LinkedList::new();
        if x <= y {
            for i in x..=y {
                list.push_back(Value::Int(i));
            }
        } else {
            for i in (y..=x).rev() {
                list.push_back(Value::Int(i));
            }
        }
        Value::Ref(self.ctx.heap.make_list(list))
    }

    /// `source | mapper [| predicate]`: the predicate (if present) filters
    /// the raw source elements first, then the mapper runs over survivors.
    ///
    /// `src_val`/`mapper_val`/`predicate_val` stay pushed on `operand_stack`
    /// for the whole loop below, not just while they're being evaluated:
    /// every `invoke` of the mapper/predicate may close a scope and run a
    /// GC, and none of the three is reachable from anywhere else once
    /// evaluated. Each freshly produced `mapped` value is rooted the same
    /// way as it's appended to `out`.
    fn eval_comprehension(&mut self, source: &Expr, mapper: &Expr, predicate: &Option<Box<Expr>>) -> Value {
        let src_val = self.eval(source);
        self.operand_stack.push(src_val.clone());
        let mapper_val = self.eval(mapper);
        self.operand_stack.push(mapper_val.clone());
        let predicate_val = predicate.as_ref().map(|p| self.eval(p));
        if let Some(p) = &predicate_val {
            self.operand_stack.push(p.clone());
        }
        let mut rooted = 2 + predicate_val.is_some() as usize;

        let Some(list) = self.expect_list(&src_val) else {
            for _ in 0..rooted {
                self.operand_stack.pop();
            }
            return Value::Null;
        };
        let elems: Vec<Value> = list.iter().cloned().collect();
        let mut out = LinkedList::new();
        for elem in elems {
            let keep = match &predicate_val {
                Some(p) => {
                    let r = self.invoke(p.clone(), vec![elem.clone()]);
                    r.truthy(self.sink, NO_LINE)
                }
                None => true,
            };
            if keep {
                let mapped = self.invoke(mapper_val.clone(), vec![elem]);
                self.operand_stack.push(mapped.clone());
                rooted += 1;
                out.push_back(mapped);
            }
        }
        for _ in 0..rooted {
            self.operand_stack.pop();
        }
        Value::Ref(self.ctx.heap.make_list(out))
    }

    fn eval_regex(&mut self, text: &Expr, pattern: &Expr) -> Value {
        let (t, p) = self.eval_pair(text, pattern);
        let text_str = t.to_display_string(&self.ctx.heap);
        let pattern_str = p.to_display_string(&self.ctx.heap);
        match regex::Regex::new(&pattern_str) {
            Ok(re) => Value::Bool(re.is_match(&text_str)),
            Err(e) => {
                self.sink.report(Category::TypeError, format!("invalid regex pattern: {e}"), NO_LINE);
                Value::Bool(false)
            }
        }
    }

    fn eval_bless(&mut self, type_name: &str) -> Value {
        let Some(fields) = self.ctx.instance_type(type_name).map(<[String]>::to_vec) else {
            self.sink.report(Category::NameError, format!("no struct type '{type_name}'"), NO_LINE);
            return Value::Null;
        };
        let mut map: IndexMap<String, Value> = IndexMap::new();
        for f in fields {
            map.insert(f, Value::Null);
        }
        let obj = StructObj {
            type_name: type_name.to_string(),
            fields: map,
            blessed: true,
        };
        Value::Ref(self.ctx.heap.make_struct(obj))
    }
}

fn as_int(v: &Value) -> Option<i64> {
    match v {
        Value::Int(i) => Some(*i),
        Value::Bool(b) => Some(*b as i64),
        Value::Real(r) if r.floor() == *r => Some(*r as i64),
        _ => None,
    }
}
