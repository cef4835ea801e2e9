//! The Context façade (component D): single owner of all mutable evaluation
//! state, passed explicitly rather than reached for as a global (SPEC_FULL.md
//! §9 "Global state").

use ahash::{AHashMap, AHashSet};
use std::rc::Rc;

use crate::ast::GLOBAL_DEPTH;
use crate::diagnostics::{Category, DiagnosticSink};
use crate::heap::Heap;
use crate::scope::{ancestor, Scope, ScopeRef};
use crate::value::Value;

pub struct Context {
    globals: AHashMap<String, Value>,
    call_stack: Vec<ScopeRef>,
    struct_types: AHashMap<String, Vec<String>>,
    pub heap: Heap,
}

impl Context {
    pub fn new() -> Self {
        Self {
            globals: AHashMap::new(),
            call_stack: Vec::new(),
            struct_types: AHashMap::new(),
            heap: Heap::new(),
        }
    }

    pub fn nil(&self) -> Value {
        Value::Null
    }

    /// Opens a fresh, empty scope access-linked to the current top of the
    /// call stack (used for plain `{ … }` block entry).
    pub fn open_scope(&mut self) {
        let parent = self.call_stack.last().cloned();
        self.call_stack.push(Scope::new(parent));
    }

    /// Opens a scope prepared elsewhere (a call's parameter-binding scope,
    /// access-linked through its closure's captured chain rather than the
    /// caller's dynamic scope).
    pub fn open_prepared_scope(&mut self, scope: ScopeRef) {
        self.call_stack.push(scope);
    }

    /// Closes the current top scope and runs a GC cycle rooted at whatever
    /// remains reachable (operand stack ∪ globals ∪ the rest of the call
    /// stack, transitively through access links).
    pub fn close_scope(&mut self, operand_stack: &[Value]) {
        self.call_stack.pop();
        self.collect_garbage(operand_stack);
    }

    pub fn bind_local(&mut self, name: &str, value: Value) {
        match self.call_stack.last() {
            Some(scope) => scope.borrow_mut().bind(name, value),
            None => {
                self.globals.insert(name.to_string(), value);
            }
        }
    }

    pub fn lookup(&mut self, name: &str, depth: i32, sink: &mut DiagnosticSink, line: u32) -> Value {
        if depth == GLOBAL_DEPTH {
            return self.globals.get(name).cloned().unwrap_or_else(|| {
                sink.report(Category::NameError, format!("undefined global '{name}'"), line);
                Value::Null
            });
        }
        let Some(top) = self.call_stack.last() else {
            sink.report(Category::NameError, format!("no active scope for '{name}'"), line);
            return Value::Null;
        };
        let Some(target) = ancestor(top, depth) else {
            sink.report(Category::NameError, format!("broken access chain for '{name}'"), line);
            return Value::Null;
        };
        target.borrow().get(name).unwrap_or_else(|| {
            sink.report(Category::NameError, format!("undefined local '{name}'"), line);
            Value::Null
        })
    }

    pub fn assign(&mut self, name: &str, depth: i32, value: Value, sink: &mut DiagnosticSink, line: u32) {
        if depth == GLOBAL_DEPTH {
            self.globals.insert(name.to_string(), value);
            return;
        }
        let Some(top) = self.call_stack.last() else {
            sink.report(Category::NameError, format!("no active scope for '{name}'"), line);
            return;
        };
        match ancestor(top, depth) {
            Some(target) => {
                if !target.borrow_mut().set(name, value) {
                    sink.report(Category::NameError, format!("undefined local '{name}'"), line);
                }
            }
            None => sink.report(Category::NameError, format!("broken access chain for '{name}'"), line),
        }
    }

    pub fn current_scope(&self) -> Option<ScopeRef> {
        self.call_stack.last().cloned()
    }

    pub fn register_struct_type(&mut self, name: String, fields: Vec<String>) {
        self.struct_types.insert(name, fields);
    }

    pub fn instance_type(&self, name: &str) -> Option<&[String]> {
        self.struct_types.get(name).map(Vec::as_slice)
    }

    fn collect_garbage(&mut self, operand_stack: &[Value]) {
        let mut roots: Vec<Value> = operand_stack.to_vec();
        roots.extend(self.globals.values().cloned());

        let mut visited: AHashSet<usize> = AHashSet::new();
        let mut frontier: Vec<ScopeRef> = self.call_stack.clone();
        while let Some(scope) = frontier.pop() {
            let ptr = Rc::as_ptr(&scope) as usize;
            if !visited.insert(ptr) {
                continue;
            }
            let borrowed = scope.borrow();
            roots.extend(borrowed.values().cloned());
            if let Some(link) = &borrowed.access_link {
                frontier.push(link.clone());
            }
        }

        self.heap.collect(roots);
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
