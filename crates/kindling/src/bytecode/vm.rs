//! The stack VM (component I): fetch/decode/execute loop over the bytecode
//! the compiler produces, sharing the evaluator's [`Context`] (heap + struct
//! type registry) and [`Value`] model (SPEC_FULL.md §4.I).

use crate::bytecode::compiler::CompiledProgram;
use crate::bytecode::opcode::OpCode;
use crate::context::Context;
use crate::diagnostics::{Category, DiagnosticSink};
use crate::heap::{FunctionObj, HeapData, StructObj};
use crate::io::PrintSink;
use crate::types::LinkedList;
use crate::value::{self, Value};

/// Local slots per frame and call-stack depth, matching the original's own
/// compile-time constants (`LOCALS_MAX`, `CALLSTACK_MAX`) per SPEC_FULL.md §10.
const LOCALS_MAX: usize = 256;
const CALLSTACK_MAX: usize = 256;

const NO_LINE: u32 = 0;

struct Frame {
    return_address: usize,
    locals: Vec<Value>,
}

pub struct Vm<'a> {
    code: Vec<crate::bytecode::opcode::Instruction>,
    constants: crate::bytecode::constant_pool::ConstantPool,
    ctx: &'a mut Context,
    sink: &'a mut DiagnosticSink,
    out: &'a mut dyn PrintSink,
    operand_stack: Vec<Value>,
    frames: Vec<Frame>,
    ip: usize,
    trace: bool,
}

impl<'a> Vm<'a> {
    pub fn new(program: CompiledProgram, ctx: &'a mut Context, sink: &'a mut DiagnosticSink, out: &'a mut dyn PrintSink) -> Self {
        Self {
            code: program.code,
            constants: program.constants,
            ctx,
            sink,
            out,
            operand_stack: Vec::new(),
            frames: Vec::new(),
            ip: 0,
            trace: false,
        }
    }

    /// Enables instruction-by-instruction tracing to stderr (the VM side of
    /// `--debug`, SPEC_FULL.md §4.M).
    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    fn pop(&mut self) -> Value {
        self.operand_stack.pop().unwrap_or_else(|| {
            self.sink.report(Category::StackFault, "operand stack underflow", NO_LINE);
            Value::Null
        })
    }

    fn push(&mut self, v: Value) {
        self.operand_stack.push(v);
    }

    fn current_locals(&mut self) -> &mut [Value] {
        match self.frames.last_mut() {
            Some(f) => &mut f.locals,
            None => {
                self.sink.report(Category::StackFault, "local slot access outside any call frame", NO_LINE);
                &mut []
            }
        }
    }

    fn local_slot(&mut self, idx: usize) -> Value {
        self.current_locals().get(idx).cloned().unwrap_or_else(|| {
            self.sink.report(Category::StackFault, "local slot out of range", NO_LINE);
            Value::Null
        })
    }

    fn set_local_slot(&mut self, idx: usize, value: Value) {
        if let Some(slot) = self.current_locals().get_mut(idx) {
            *slot = value;
        } else {
            self.sink.report(Category::StackFault, "local slot out of range", NO_LINE);
        }
    }

    /// Runs the fetch/decode/execute loop to completion (`Halt`, fall off the
    /// end of the code, or a top-level `Ret` with no frame to return to).
    pub fn run(&mut self) {
        while self.ip < self.code.len() {
            let instr = self.code[self.ip].clone();
            if self.trace {
                eprintln!("trace: {:04} {instr:?}", self.ip);
            }
            self.ip += 1;
            match instr.op {
                OpCode::Halt => break,
                OpCode::Const => self.push(instr.operand),
                OpCode::Add => self.binop(|a, b, heap, sink| value::add(a, b, heap, sink, NO_LINE)),
                OpCode::Sub => self.binop(|a, b, _, sink| value::sub(a, b, sink, NO_LINE)),
                OpCode::Mul => self.binop(|a, b, _, sink| value::mul(a, b, sink, NO_LINE)),
                OpCode::Div => self.binop(|a, b, _, sink| value::div(a, b, sink, NO_LINE)),
                OpCode::Mod => self.binop(|a, b, _, sink| value::modulo(a, b, sink, NO_LINE)),
                OpCode::Pow => self.binop(|a, b, _, sink| value::pow(a, b, sink, NO_LINE)),
                OpCode::Sconcat => {
                    let b = self.pop();
                    let a = self.pop();
                    let s = format!("{}{}", a.to_display_string(&self.ctx.heap), b.to_display_string(&self.ctx.heap));
                    let id = self.ctx.heap.make_string(s);
                    self.push(Value::Ref(id));
                }
                OpCode::Neg => {
                    let a = self.pop();
                    let v = value::neg(&a, self.sink, NO_LINE);
                    self.push(v);
                }
                OpCode::Not => {
                    let a = self.pop();
                    let v = value::not(&a, self.sink, NO_LINE);
                    self.push(v);
                }
                OpCode::Equ => self.relop(value::equ),
                OpCode::Neq => self.relop(|a, b, heap| !value::equ(a, b, heap)),
                OpCode::Lt => self.relop(value::lt),
                OpCode::Gt => self.relop(value::gt),
                OpCode::Lte => self.relop(value::lte),
                OpCode::Gte => self.relop(value::gte),
                OpCode::MkList => self.exec_mklist(&instr.operand),
                OpCode::AppendList => self.exec_append_list(),
                OpCode::ListSize => self.exec_list_size(),
                OpCode::Def => {
                    // Never emitted by this compiler (which binds functions
                    // via Closure + Store/GStore), kept for ISA exhaustiveness.
                }
                OpCode::Call => self.exec_call(&instr.operand),
                OpCode::Ret => {
                    if self.exec_ret() {
                        break;
                    }
                }
                OpCode::Closure => self.push(instr.operand),
                OpCode::OpenScope => {}
                OpCode::CloseScope => self.collect_garbage(),
                OpCode::Br => self.ip = as_addr(&instr.operand),
                OpCode::Brf => {
                    let cond = self.pop();
                    if !cond.truthy(self.sink, NO_LINE) {
                        self.ip = as_addr(&instr.operand);
                    }
                }
                OpCode::GLoad => {
                    let idx = as_addr(&instr.operand);
                    let v = self.constants.get(idx).cloned().unwrap_or(Value::Null);
                    self.push(v);
                }
                OpCode::GLda => self.push(instr.operand.clone()),
                OpCode::GStore => {
                    let addr = self.pop();
                    let value = self.pop();
                    let idx = as_addr(&addr);
                    self.constants.update_at(idx, value.clone());
                    self.push(value);
                }
                OpCode::Load => {
                    let idx = as_addr(&instr.operand);
                    let v = self.local_slot(idx);
                    self.push(v);
                }
                OpCode::Lda => self.push(instr.operand.clone()),
                OpCode::Store => {
                    let addr = self.pop();
                    let value = self.pop();
                    self.set_local_slot(as_addr(&addr), value.clone());
                    self.push(value);
                }
                OpCode::FLoad => self.exec_fload(),
                OpCode::FLda => {
                    // Address-of a field/element has no separate representation
                    // in this compiler's lowering (container ref doubles as the
                    // address); kept for ISA exhaustiveness.
                }
                OpCode::FStore => self.exec_fstore(),
                OpCode::Struct => self.exec_struct(&instr.operand),
                OpCode::Null => self.push(Value::Null),
                OpCode::Print => {
                    let v = self.pop();
                    let text = v.to_display_string(&self.ctx.heap);
                    self.out.print(&text);
                }
                OpCode::Println => {
                    let v = self.pop();
                    let text = v.to_display_string(&self.ctx.heap);
                    self.out.print(&text);
                    self.out.print("\n");
                }
                OpCode::Pop => {
                    self.pop();
                }
                OpCode::Label => {}
            }
        }
    }

    fn binop(&mut self, f: impl Fn(&Value, &Value, &mut crate::heap::Heap, &mut DiagnosticSink) -> Value) {
        let b = self.pop();
        let a = self.pop();
        let v = f(&a, &b, &mut self.ctx.heap, self.sink);
        self.push(v);
    }

    fn relop(&mut self, f: impl Fn(&Value, &Value, &crate::heap::Heap) -> bool) {
        let b = self.pop();
        let a = self.pop();
        let v = f(&a, &b, &self.ctx.heap);
        self.push(Value::Bool(v));
    }

    fn exec_mklist(&mut self, operand: &Value) {
        let n = as_addr(operand);
        let mut items = Vec::with_capacity(n);
        for _ in 0..n {
            items.push(self.pop());
        }
        items.reverse();
        let list = LinkedList::from_values(items);
        let id = self.ctx.heap.make_list(list);
        self.push(Value::Ref(id));
    }

    fn exec_append_list(&mut self) {
        let elem = self.pop();
        let list_val = self.pop();
        let Some(mut list) = self.expect_list(&list_val) else {
            self.push(Value::Null);
            return;
        };
        list.push_back(elem);
        let id = self.ctx.heap.make_list(list);
        self.push(Value::Ref(id));
    }

    fn exec_list_size(&mut self) {
        let list_val = self.pop();
        match self.expect_list(&list_val) {
            Some(list) => self.push(Value::Int(list.len() as i64)),
            None => self.push(Value::Null),
        }
    }

    fn expect_list(&mut self, v: &Value) -> Option<LinkedList> {
        if let Value::Ref(id) = v {
            if let HeapData::List(l) = self.ctx.heap.get(*id) {
                return Some(l.clone());
            }
        }
        self.sink.report(Category::TypeError, "expected a List", NO_LINE);
        None
    }

    /// `call argc`: pops `argc` argument values and the callee below them,
    /// and starts a new frame at the callee's compiled entry point. Calling
    /// through an arbitrary popped `Value` (rather than a static
    /// constant-pool index, as SPEC_FULL.md §4.G's prose literally describes)
    /// lets this opcode serve both a statically-known named call and a call
    /// through a variable holding a function value, with no second opcode —
    /// see DESIGN.md.
    fn exec_call(&mut self, operand: &Value) {
        let argc = as_addr(operand);
        let mut args = Vec::with_capacity(argc);
        for _ in 0..argc {
            args.push(self.pop());
        }
        args.reverse();
        let callee = self.pop();

        let Value::Ref(id) = callee else {
            self.sink.report(Category::TypeError, "attempt to call a non-function value", NO_LINE);
            self.push(Value::Null);
            return;
        };
        let func = match self.ctx.heap.get(id) {
            HeapData::Function(f) => f.clone(),
            _ => {
                self.sink.report(Category::TypeError, "attempt to call a non-function value", NO_LINE);
                self.push(Value::Null);
                return;
            }
        };
        let FunctionObj::Compiled {
            arg_count,
            local_count,
            addr,
            ..
        } = func
        else {
            self.sink.report(Category::TypeError, "cannot call an evaluator closure from the VM", NO_LINE);
            self.push(Value::Null);
            return;
        };

        if self.frames.len() >= CALLSTACK_MAX {
            self.sink.report(Category::StackFault, "call stack overflow", NO_LINE);
            self.push(Value::Null);
            return;
        }
        let local_count = local_count.max(arg_count).min(LOCALS_MAX);
        let mut locals = vec![Value::Null; local_count];
        for (i, slot) in locals.iter_mut().enumerate().take(arg_count) {
            *slot = args.get(i).cloned().unwrap_or(Value::Null);
        }
        self.frames.push(Frame {
            return_address: self.ip,
            locals,
        });
        self.ip = addr;
    }

    /// Returns `true` when the fetch loop should stop entirely — a `ret`
    /// with no active frame behaves like `halt`, mirroring the evaluator's
    /// stray-top-level-`return` handling (SPEC_FULL.md §5).
    fn exec_ret(&mut self) -> bool {
        let value = self.pop();
        match self.frames.pop() {
            Some(frame) => {
                self.ip = frame.return_address;
                self.push(value);
                self.collect_garbage();
                false
            }
            None => true,
        }
    }

    /// `fload`: pops `[container, index, field_name_or_null]` (top to
    /// bottom: field_name_or_null, index, container) and pushes the
    /// referenced element/field.
    fn exec_fload(&mut self) {
        let field_name = self.pop();
        let index = self.pop();
        let container = self.pop();
        let Value::Ref(id) = container else {
            self.sink.report(Category::TypeError, "cannot index a non-container value", NO_LINE);
            self.push(Value::Null);
            return;
        };
        match self.ctx.heap.get(id) {
            HeapData::Struct(s) => {
                let Some(key) = self.field_name_string(&field_name) else {
                    self.sink.report(Category::TypeError, "struct field access requires a bare field name", NO_LINE);
                    self.push(Value::Null);
                    return;
                };
                match s.fields.get(&key) {
                    Some(v) => self.push(v.clone()),
                    None => {
                        self.sink.report(Category::IndexError, format!("no such field '{key}'"), NO_LINE);
                        self.push(Value::Null);
                    }
                }
            }
            HeapData::List(list) => {
                let Some(i) = as_int(&index) else {
                    self.sink.report(Category::TypeError, "list index must be numeric", NO_LINE);
                    self.push(Value::Null);
                    return;
                };
                if i < 0 {
                    self.sink.report(Category::IndexError, "negative list index", NO_LINE);
                    self.push(Value::Null);
                    return;
                }
                match list.get(i as usize) {
                    Some(v) => self.push(v.clone()),
                    None => {
                        self.sink.report(Category::IndexError, "list index out of bounds", NO_LINE);
                        self.push(Value::Null);
                    }
                }
            }
            _ => {
                self.sink.report(Category::TypeError, "cannot index a non-List, non-Struct value", NO_LINE);
                self.push(Value::Null);
            }
        }
    }

    /// `fstore`: pops `[value, container, index, field_name_or_null]` (top to
    /// bottom: field_name_or_null, index, container, value), mutates in
    /// place, and re-pushes `value` so the assignment remains an expression.
    fn exec_fstore(&mut self) {
        let field_name = self.pop();
        let index = self.pop();
        let container = self.pop();
        let value = self.pop();
        let Value::Ref(id) = container else {
            self.sink.report(Category::TypeError, "cannot index-assign a non-container value", NO_LINE);
            self.push(value);
            return;
        };
        let is_struct = matches!(self.ctx.heap.get(id), HeapData::Struct(_));
        if is_struct {
            let Some(key) = self.field_name_string(&field_name) else {
                self.sink.report(Category::TypeError, "struct field assignment requires a bare field name", NO_LINE);
                self.push(value);
                return;
            };
            match self.ctx.heap.get_mut(id) {
                HeapData::Struct(s) if s.fields.contains_key(&key) => {
                    s.fields.insert(key, value.clone());
                }
                _ => self.sink.report(Category::IndexError, format!("no such field '{key}'"), NO_LINE),
            }
        } else {
            let Some(i) = as_int(&index) else {
                self.sink.report(Category::TypeError, "list index must be numeric", NO_LINE);
                self.push(value);
                return;
            };
            if i < 0 {
                self.sink.report(Category::IndexError, "negative list index", NO_LINE);
                self.push(value);
                return;
            }
            match self.ctx.heap.get_mut(id) {
                HeapData::List(list) => {
                    if !list.set(i as usize, value.clone()) {
                        self.sink.report(Category::IndexError, "list index out of bounds", NO_LINE);
                    }
                }
                _ => self.sink.report(Category::TypeError, "cannot index-assign a non-List, non-Struct value", NO_LINE),
            }
        }
        self.push(value);
    }

    fn field_name_string(&self, v: &Value) -> Option<String> {
        match v {
            Value::Ref(id) => match self.ctx.heap.get(*id) {
                HeapData::String(s) => Some(s.clone()),
                _ => None,
            },
            _ => None,
        }
    }

    fn exec_struct(&mut self, operand: &Value) {
        let Some(type_name) = self.field_name_string(operand) else {
            self.sink.report(Category::TypeError, "struct opcode requires an interned type name", NO_LINE);
            self.push(Value::Null);
            return;
        };
        let Some(fields) = self.ctx.instance_type(&type_name).map(|f| f.to_vec()) else {
            self.sink.report(Category::NameError, format!("no struct type '{type_name}'"), NO_LINE);
            self.push(Value::Null);
            return;
        };
        let mut map = indexmap::IndexMap::new();
        for f in fields {
            map.insert(f, Value::Null);
        }
        let obj = StructObj {
            type_name,
            fields: map,
            blessed: true,
        };
        let id = self.ctx.heap.make_struct(obj);
        self.push(Value::Ref(id));
    }

    /// Roots = operand stack ∪ every active frame's locals ∪ every
    /// constant-pool slot ∪ every heap reference baked directly into an
    /// instruction's operand (a `Closure`'s function object, a `Struct`'s
    /// type-name string, a subscript's interned field name). Those last ones
    /// are allocated once at compile time and sit in the code stream rather
    /// than the constant pool, so without this they'd be unrooted — and
    /// collectible — until the instant their owning instruction runs.
    /// Collection runs on frame close (`ret`) and block close
    /// (`close_scope`), mirroring the evaluator's "GC on scope exit" trigger.
    fn collect_garbage(&mut self) {
        let mut roots: Vec<Value> = self.operand_stack.clone();
        for frame in &self.frames {
            roots.extend(frame.locals.iter().cloned());
        }
        roots.extend(self.constants.values().cloned());
        roots.extend(self.code.iter().map(|instr| instr.operand.clone()));
        self.ctx.heap.collect(roots);
    }
}

fn as_addr(v: &Value) -> usize {
    match v {
        Value::Int(i) => (*i).max(0) as usize,
        _ => 0,
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
