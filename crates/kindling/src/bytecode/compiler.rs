//! Single-pass AST → bytecode compiler (component H).
//!
//! Unlike the evaluator, the VM backend does not use the resolver's `depth`
//! annotations at all: this pass keeps its own symbol table, assigning each
//! local a fixed slot index within its enclosing function, and routes every
//! other name through the constant pool as a "global" slot (SPEC_FULL.md
//! §4.H). Struct type definitions are registered into the shared [`Context`]
//! as a compile-time side effect, since they carry no runtime-observable
//! ordering (SPEC_FULL.md §4.H `StructDef` note below).

use ahash::AHashMap;

use crate::ast::{BinOp, Expr, ListOp, Literal, LogicOp, RelOp, Stmt, UnOp};
use crate::bytecode::constant_pool::ConstantPool;
use crate::bytecode::opcode::{Instruction, OpCode};
use crate::context::Context;
use crate::diagnostics::{Category, DiagnosticSink};
use crate::heap::FunctionObj;
use crate::value::Value;

/// The compiled program: a flat instruction vector plus the constant pool it
/// indexes into. Every heap-referencing literal baked into the program
/// (string literals, compiled function descriptors) lives in `constants`
/// rather than inline in `code`, so the VM can enumerate `constants` as
/// permanent GC roots without having to scan the instruction stream itself.
pub struct CompiledProgram {
    pub code: Vec<Instruction>,
    pub constants: ConstantPool,
}

/// One function's nested block scopes. Slots are never reused across
/// sibling blocks within the same function — simplicity over density, and it
/// keeps `local_count` a plain high-water mark.
struct FunctionScope {
    blocks: Vec<AHashMap<String, u16>>,
    next_slot: u16,
}

impl FunctionScope {
    fn new() -> Self {
        Self {
            blocks: vec![AHashMap::new()],
            next_slot: 0,
        }
    }

    fn push_block(&mut self) {
        self.blocks.push(AHashMap::new());
    }

    fn pop_block(&mut self) {
        self.blocks.pop();
    }

    fn declare(&mut self, name: &str) -> u16 {
        let slot = self.next_slot;
        self.next_slot += 1;
        self.blocks.last_mut().expect("function scope always has a block").insert(name.to_string(), slot);
        slot
    }

    fn resolve(&self, name: &str) -> Option<u16> {
        self.blocks.iter().rev().find_map(|b| b.get(name).copied())
    }
}

/// A function body queued for compilation after the enclosing sequence
/// finishes, so its `code_address` is known before the descriptor is patched.
struct PendingFn {
    heap_id: crate::heap::HeapId,
    params: Vec<String>,
    body: Vec<Stmt>,
}

pub struct Compiler<'a> {
    code: Vec<Instruction>,
    constants: ConstantPool,
    /// name -> constant-pool slot, for top-level `let`/`func` bindings.
    globals: AHashMap<String, u16>,
    /// `None` at top level; `Some` while compiling a function/lambda body.
    function: Option<FunctionScope>,
    pending: Vec<PendingFn>,
    ctx: &'a mut Context,
    sink: &'a mut DiagnosticSink,
}

impl<'a> Compiler<'a> {
    pub fn new(ctx: &'a mut Context, sink: &'a mut DiagnosticSink) -> Self {
        Self {
            code: Vec::new(),
            constants: ConstantPool::new(),
            globals: AHashMap::new(),
            function: None,
            pending: Vec::new(),
            ctx,
            sink,
        }
    }

    pub fn compile_program(mut self, program: &[Stmt]) -> CompiledProgram {
        for s in program {
            self.compile_stmt(s);
        }
        self.emit(OpCode::Halt, Value::Null);
        self.compile_pending();
        CompiledProgram {
            code: self.code,
            constants: self.constants,
        }
    }

    fn emit(&mut self, op: OpCode, operand: Value) -> usize {
        self.code.push(Instruction::new(op, operand));
        self.code.len() - 1
    }

    fn emit_bare(&mut self, op: OpCode) -> usize {
        self.code.push(Instruction::bare(op));
        self.code.len() - 1
    }

    /// Patches a previously reserved slot's operand once its branch target
    /// address is known (the reserve-and-patch idiom, SPEC_FULL.md §4.H).
    fn patch(&mut self, at: usize, target: usize) {
        self.code[at].operand = Value::Int(target as i64);
    }

    fn here(&self) -> usize {
        self.code.len()
    }

    // ---- name resolution -------------------------------------------------

    /// Interns an anonymous constant (a string literal or a freshly built
    /// function descriptor) into a constant-pool slot and returns its index.
    fn intern(&mut self, value: Value) -> u16 {
        self.constants.alloc(value) as u16
    }

    fn global_slot(&mut self, name: &str) -> u16 {
        if let Some(&slot) = self.globals.get(name) {
            return slot;
        }
        let slot = self.intern(Value::Null);
        self.globals.insert(name.to_string(), slot);
        slot
    }

    /// Emits the read sequence for a bare identifier: local slot if the
    /// current function declares it, otherwise a global slot.
    fn emit_load(&mut self, name: &str) {
        if let Some(slot) = self.function.as_ref().and_then(|f| f.resolve(name)) {
            self.emit(OpCode::Load, Value::Int(slot as i64));
        } else {
            let slot = self.global_slot(name);
            self.emit(OpCode::GLoad, Value::Int(slot as i64));
        }
    }

    /// Emits the address-then-store half of `target := value` (§4.H's
    /// assignment lowering), assuming `value` has already been compiled and
    /// pushed. The address instruction goes on top of it; `Store`/`GStore`
    /// pop address first, then value, and write.
    fn emit_store_to_name(&mut self, name: &str) {
        if let Some(slot) = self.function.as_ref().and_then(|f| f.resolve(name)) {
            self.emit(OpCode::Lda, Value::Int(slot as i64));
            self.emit_bare(OpCode::Store);
        } else {
            let slot = self.global_slot(name);
            self.emit(OpCode::GLda, Value::Int(slot as i64));
            self.emit_bare(OpCode::GStore);
        }
    }

    // ---- statements --------------------------------------------------

    fn compile_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Print(e) => {
                self.compile_expr(e);
                self.emit_bare(OpCode::Print);
            }
            Stmt::Println(e) => {
                self.compile_expr(e);
                self.emit_bare(OpCode::Println);
            }
            Stmt::Let(assign_expr) => {
                self.compile_expr(assign_expr);
                self.emit_bare(OpCode::Pop);
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => self.compile_if(cond, then_branch, else_branch.as_deref()),
            Stmt::While { cond, body } => self.compile_while(cond, body),
            Stmt::Return(expr) => {
                match expr {
                    Some(e) => self.compile_expr(e),
                    None => {
                        self.emit_bare(OpCode::Null);
                    }
                }
                self.emit_bare(OpCode::Ret);
            }
            Stmt::FuncDef { name, params, body } => self.compile_func_def(name, params, body),
            Stmt::StructDef { name, fields } => {
                // Struct layouts are static: register directly rather than
                // emitting a runtime op (no opcode observes ordering here).
                self.ctx.register_struct_type(name.clone(), fields.clone());
            }
            Stmt::Block(body) => self.compile_block(body),
            Stmt::Expr(e) => {
                self.compile_expr(e);
                self.emit_bare(OpCode::Pop);
            }
            Stmt::Error => {}
        }
    }

    fn compile_block(&mut self, stmts: &[Stmt]) {
        self.emit_bare(OpCode::OpenScope);
        if let Some(f) = &mut self.function {
            f.push_block();
        }
        for s in stmts {
            self.compile_stmt(s);
        }
        if let Some(f) = &mut self.function {
            f.pop_block();
        }
        self.emit_bare(OpCode::CloseScope);
    }

    fn compile_if(&mut self, cond: &Expr, then_branch: &[Stmt], else_branch: Option<&[Stmt]>) {
        self.compile_expr(cond);
        let brf_at = self.emit(OpCode::Brf, Value::Null);
        self.compile_block(then_branch);
        if let Some(else_b) = else_branch {
            let br_at = self.emit(OpCode::Br, Value::Null);
            self.patch(brf_at, self.here());
            self.compile_block(else_b);
            let end = self.here();
            self.patch(br_at, end);
        } else {
            self.patch(brf_at, self.here());
        }
    }

    fn compile_while(&mut self, cond: &Expr, body: &[Stmt]) {
        let top = self.here();
        self.compile_expr(cond);
        let brf_at = self.emit(OpCode::Brf, Value::Null);
        self.compile_block(body);
        self.emit(OpCode::Br, Value::Int(top as i64));
        self.patch(brf_at, self.here());
    }

    fn compile_func_def(&mut self, name: &str, params: &[String], body: &[Stmt]) {
        let heap_id = self.ctx.heap.make_function(FunctionObj::Compiled {
            name: name.to_string(),
            arg_count: params.len(),
            local_count: 0,
            addr: 0,
        });
        self.pending.push(PendingFn {
            heap_id,
            params: params.to_vec(),
            body: body.to_vec(),
        });
        self.emit(OpCode::Closure, Value::Ref(heap_id));
        self.emit_store_to_name(name);
        self.emit_bare(OpCode::Pop);
    }

    /// Compiles every queued function body, appending each after the code
    /// emitted so far, then patches its heap descriptor's `addr` (and
    /// `local_count`, known only once the body has been compiled).
    fn compile_pending(&mut self) {
        while let Some(pending) = self.pending.pop() {
            let addr = self.here();
            let mut scope = FunctionScope::new();
            for p in &pending.params {
                scope.declare(p);
            }
            self.function = Some(scope);
            for s in &pending.body {
                self.compile_stmt(s);
            }
            // Fall off the end without an explicit `return`: push Null, ret.
            self.emit_bare(OpCode::Null);
            self.emit_bare(OpCode::Ret);
            let local_count = self.function.take().map(|f| f.next_slot).unwrap_or(0);
            if let crate::heap::HeapData::Function(FunctionObj::Compiled { addr: a, local_count: lc, .. }) =
                self.ctx.heap.get_mut(pending.heap_id)
            {
                *a = addr;
                *lc = local_count as usize;
            }
        }
    }

    // ---- expressions ---------------------------------------------------

    fn compile_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Const(lit) => self.compile_literal(lit),
            Expr::Id { name, .. } => self.emit_load(name),
            Expr::Unop { op, expr } => self.compile_unop(*op, expr),
            Expr::Binop { op, lhs, rhs } => {
                self.compile_expr(lhs);
                self.compile_expr(rhs);
                self.emit_bare(binop_opcode(*op));
            }
            Expr::Relop { op, lhs, rhs } => {
                self.compile_expr(lhs);
                self.compile_expr(rhs);
                self.emit_bare(relop_opcode(*op));
            }
            Expr::Logic { op, lhs, rhs } => self.compile_logic(*op, lhs, rhs),
            Expr::Assign { target, value } => self.compile_assign(target, value),
            Expr::Subscript { container, index } => {
                self.compile_expr(container);
                self.compile_subscript_index(container, index);
                self.emit_bare(OpCode::FLoad);
            }
            Expr::Call { callee, args } => {
                self.compile_expr(callee);
                for a in args {
                    self.compile_expr(a);
                }
                self.emit(OpCode::Call, Value::Int(args.len() as i64));
            }
            Expr::Lambda { params, body } => {
                let heap_id = self.ctx.heap.make_function(FunctionObj::Compiled {
                    name: "<lambda>".to_string(),
                    arg_count: params.len(),
                    local_count: 0,
                    addr: 0,
                });
                self.pending.push(PendingFn {
                    heap_id,
                    params: params.clone(),
                    body: body.clone(),
                });
                self.emit(OpCode::Closure, Value::Ref(heap_id));
            }
            Expr::List(items) => {
                for item in items {
                    self.compile_expr(item);
                }
                self.emit(OpCode::MkList, Value::Int(items.len() as i64));
            }
            Expr::ListOp { op, args } => self.compile_list_op(*op, args),
            Expr::Range { .. } | Expr::Comprehension { .. } | Expr::Regex { .. } => {
                self.sink.report(
                    Category::TypeError,
                    "ranges, comprehensions, and regex matching are evaluator-only; the VM ISA has no opcode for them"
                        .to_string(),
                    0,
                );
                self.emit_bare(OpCode::Null);
            }
            Expr::Bless { type_name } => {
                let name_id = self.ctx.heap.make_string(type_name.clone());
                self.emit(OpCode::Struct, Value::Ref(name_id));
            }
            Expr::Typeof(inner) => {
                // No dedicated opcode; evaluator-only, matching the Range/Comprehension gap above.
                self.compile_expr(inner);
                self.emit_bare(OpCode::Pop);
                self.sink.report(Category::TypeError, "typeof is evaluator-only".to_string(), 0);
                self.emit_bare(OpCode::Null);
            }
            Expr::Ternary {
                cond,
                then_branch,
                else_branch,
            } => {
                self.compile_expr(cond);
                let brf_at = self.emit(OpCode::Brf, Value::Null);
                self.compile_expr(then_branch);
                let br_at = self.emit(OpCode::Br, Value::Null);
                self.patch(brf_at, self.here());
                self.compile_expr(else_branch);
                self.patch(br_at, self.here());
            }
            Expr::Error => {
                self.emit_bare(OpCode::Null);
            }
        }
    }

    fn compile_literal(&mut self, lit: &Literal) {
        match lit {
            Literal::Int(i) => {
                self.emit(OpCode::Const, Value::Int(*i));
            }
            Literal::Real(r) => {
                self.emit(OpCode::Const, Value::Real(*r));
            }
            Literal::Bool(b) => {
                self.emit(OpCode::Const, Value::Bool(*b));
            }
            Literal::Char(c) => {
                self.emit(OpCode::Const, Value::Char(*c));
            }
            Literal::Nil => {
                self.emit_bare(OpCode::Null);
            }
            Literal::Str(s) => {
                let id = self.ctx.heap.make_string(s.clone());
                let slot = self.intern(Value::Ref(id));
                self.emit(OpCode::GLoad, Value::Int(slot as i64));
            }
        }
    }

    fn compile_unop(&mut self, op: UnOp, expr: &Expr) {
        match op {
            UnOp::Neg => {
                self.compile_expr(expr);
                self.emit_bare(OpCode::Neg);
            }
            UnOp::Not => {
                self.compile_expr(expr);
                self.emit_bare(OpCode::Not);
            }
            UnOp::PostInc | UnOp::PostDec => {
                // `e++`/`e--`: load, duplicate via a second load, add/sub one,
                // store back; the *original* value is what the expression
                // yields, so we compile the read-then-write twice rather than
                // adding a `dup` opcode the ISA doesn't define.
                self.compile_expr(expr);
                self.compile_expr(expr);
                self.emit(OpCode::Const, Value::Int(if op == UnOp::PostInc { 1 } else { -1 }));
                self.emit_bare(OpCode::Add);
                self.compile_assign_value_already_on_stack(expr);
            }
        }
    }

    /// Stores the value already sitting on top of the stack into `target`.
    /// `Store`/`FStore` re-push the stored value so the assignment remains
    /// an expression (§4.F); the write-back half of post-inc/dec discards
    /// that republished copy since it already kept the pre-increment value.
    fn compile_assign_value_already_on_stack(&mut self, target: &Expr) {
        match target {
            Expr::Id { name, .. } => {
                let name = name.clone();
                self.emit_store_to_name(&name);
                self.emit_bare(OpCode::Pop);
            }
            Expr::Subscript { container, index } => {
                self.compile_expr(container);
                self.compile_subscript_index(container, index);
                self.emit_bare(OpCode::FStore);
                self.emit_bare(OpCode::Pop);
            }
            _ => {
                self.sink.report(Category::TypeError, "invalid assignment target".to_string(), 0);
                self.emit_bare(OpCode::Pop);
            }
        }
    }

    fn compile_assign(&mut self, target: &Expr, value: &Expr) {
        self.compile_expr(value);
        match target {
            Expr::Id { name, .. } => {
                let name = name.clone();
                self.emit_store_to_name(&name);
            }
            Expr::Subscript { container, index } => {
                self.compile_expr(container);
                self.compile_subscript_index(container, index);
                self.emit_bare(OpCode::FStore);
            }
            _ => {
                self.sink.report(Category::TypeError, "invalid assignment target".to_string(), 0);
            }
        }
    }

    /// Pushes the two-slot index operand `fload`/`fstore` expect: the
    /// evaluated index (used when the container turns out to be a List) and,
    /// when `index` is a bare identifier, that name as an interned string
    /// (used when the container turns out to be a Struct — the literal-field
    /// rule from SPEC_FULL.md §9). Which container kind the runtime value
    /// actually is isn't known until `fload`/`fstore` pops it, so both are
    /// always pushed and the VM picks the matching one; a non-identifier
    /// index pushes `Null` for the field-name slot.
    fn compile_subscript_index(&mut self, _container: &Expr, index: &Expr) {
        self.compile_expr(index);
        if let Expr::Id { name, .. } = index {
            let id = self.ctx.heap.make_string(name.clone());
            self.emit(OpCode::Const, Value::Ref(id));
        } else {
            self.emit_bare(OpCode::Null);
        }
    }

    fn compile_logic(&mut self, op: LogicOp, lhs: &Expr, rhs: &Expr) {
        self.compile_expr(lhs);
        match op {
            LogicOp::And => {
                // false && rhs -> short circuit to `false` without evaluating rhs.
                let brf_at = self.emit(OpCode::Brf, Value::Null);
                self.compile_expr(rhs);
                let end_at = self.emit(OpCode::Br, Value::Null);
                self.patch(brf_at, self.here());
                self.emit(OpCode::Const, Value::Bool(false));
                self.patch(end_at, self.here());
            }
            LogicOp::Or => {
                let brf_at = self.emit(OpCode::Brf, Value::Null);
                self.emit(OpCode::Const, Value::Bool(true));
                let end_at = self.emit(OpCode::Br, Value::Null);
                self.patch(brf_at, self.here());
                self.compile_expr(rhs);
                self.patch(end_at, self.here());
            }
        }
    }

    fn compile_list_op(&mut self, op: ListOp, args: &[Expr]) {
        match op {
            ListOp::Append => {
                for a in args {
                    self.compile_expr(a);
                }
                self.emit_bare(OpCode::AppendList);
            }
            ListOp::Size => {
                for a in args {
                    self.compile_expr(a);
                }
                self.emit_bare(OpCode::ListSize);
            }
            ListOp::Push | ListOp::First | ListOp::Rest | ListOp::Map | ListOp::Filter | ListOp::Reduce | ListOp::Sort | ListOp::Empty => {
                self.sink.report(
                    Category::TypeError,
                    format!("{op:?} has no VM opcode; the ISA only implements append/size for lists"),
                    0,
                );
                for a in args {
                    self.compile_expr(a);
                    self.emit_bare(OpCode::Pop);
                }
                self.emit_bare(OpCode::Null);
            }
        }
    }
}

/// `Add` dispatches on operand kind at runtime exactly like the evaluator's
/// `value::add` (numeric promotion, or concatenation if either side is a
/// String) — `Sconcat` exists in the ISA as an explicit alternative a future
/// front end could target directly, but this compiler never needs it since
/// `+` is not statically typed here either.
fn binop_opcode(op: BinOp) -> OpCode {
    match op {
        BinOp::Add => OpCode::Add,
        BinOp::Sub => OpCode::Sub,
        BinOp::Mul => OpCode::Mul,
        BinOp::Div => OpCode::Div,
        BinOp::Mod => OpCode::Mod,
        BinOp::Pow => OpCode::Pow,
    }
}

fn relop_opcode(op: RelOp) -> OpCode {
    match op {
        RelOp::Lt => OpCode::Lt,
        RelOp::Gt => OpCode::Gt,
        RelOp::Lte => OpCode::Lte,
        RelOp::Gte => OpCode::Gte,
        RelOp::Equ => OpCode::Equ,
        RelOp::Neq => OpCode::Neq,
    }
}

pub fn compile(program: &[Stmt], ctx: &mut Context, sink: &mut DiagnosticSink) -> CompiledProgram {
    Compiler::new(ctx, sink).compile_program(program)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn function_scope_assigns_sequential_slots_and_never_reuses_them_across_blocks() {
        let mut scope = FunctionScope::new();
        assert_eq!(scope.declare("a"), 0);
        assert_eq!(scope.declare("b"), 1);
        scope.push_block();
        assert_eq!(scope.declare("c"), 2);
        assert_eq!(scope.resolve("a"), Some(0));
        scope.pop_block();
        // `c` was declared in the popped block and is no longer visible by
        // name, but its slot (2) is never handed out again.
        assert_eq!(scope.resolve("c"), None);
        assert_eq!(scope.declare("d"), 3);
    }

    #[test]
    fn inner_block_shadows_an_outer_declaration_of_the_same_name() {
        let mut scope = FunctionScope::new();
        let outer = scope.declare("x");
        scope.push_block();
        let inner = scope.declare("x");
        assert_ne!(outer, inner);
        assert_eq!(scope.resolve("x"), Some(inner));
        scope.pop_block();
        assert_eq!(scope.resolve("x"), Some(outer));
    }

    #[test]
    fn top_level_let_bindings_compile_to_global_constant_pool_slots() {
        let mut ctx = Context::new();
        let mut sink = DiagnosticSink::new();
        let program = crate::parse("let x := 41; let y := x + 1;", &mut sink);
        assert!(sink.is_empty());
        let compiled = compile(&program, &mut ctx, &mut sink);
        assert!(sink.is_empty());
        // Two globals were interned (x, y), each starting out Null until the
        // Let's GStore runs at execution time.
        assert_eq!(compiled.constants.values().count(), 2);
    }
}
