//! Single-pass scope resolver (component E).
//!
//! Walks the freshly parsed AST once, maintaining a stack of name sets that
//! mirrors exactly the scopes the evaluator/VM will open at runtime (one per
//! function/lambda body, one per block — including `if`/`while` bodies, which
//! are blocks syntactically), and rewrites every [`Expr::Id`] depth in place.

use ahash::AHashSet;

use crate::ast::{self, Expr, Stmt};
use crate::diagnostics::{Category, DiagnosticSink};

pub struct Resolver<'a> {
    scopes: Vec<AHashSet<String>>,
    sink: &'a mut DiagnosticSink,
}

impl<'a> Resolver<'a> {
    pub fn new(sink: &'a mut DiagnosticSink) -> Self {
        Self {
            scopes: vec![AHashSet::new()],
            sink,
        }
    }

    pub fn resolve_program(&mut self, stmts: &mut [Stmt]) {
        self.resolve_stmts(stmts);
    }

    fn push_scope(&mut self) {
        self.scopes.push(AHashSet::new());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn declare(&mut self, name: &str) {
        let top = self.scopes.last_mut().expect("global scope always present");
        if !top.insert(name.to_string()) {
            self.sink
                .report(Category::NameError, format!("'{name}' is already declared in this scope"), 0);
        }
    }

    /// Returns `-1` for a name found in the global scope, otherwise the
    /// number of access-link hops from the current scope to the declaring one.
    fn resolve_name(&mut self, name: &str) -> i32 {
        match self.find_name(name) {
            Some(depth) => depth,
            None => {
                self.sink
                    .report(Category::NameError, format!("undeclared identifier '{name}'"), 0);
                ast::GLOBAL_DEPTH
            }
        }
    }

    /// Like `resolve_name`, but reports nothing when the name isn't declared.
    /// A bare identifier under a subscript (`p[x]`) is ambiguous at resolve
    /// time between a variable index (List) and a literal field name
    /// (Struct) — see SPEC_FULL.md §9 — so failing to find it as a variable
    /// here isn't necessarily an error; the evaluator/VM only consult this
    /// depth when the container turns out to be a List.
    fn resolve_name_lenient(&mut self, name: &str) -> i32 {
        self.find_name(name).unwrap_or(ast::GLOBAL_DEPTH)
    }

    fn find_name(&self, name: &str) -> Option<i32> {
        let top = self.scopes.len() - 1;
        for hop in 0..=top {
            let idx = top - hop;
            if self.scopes[idx].contains(name) {
                return Some(if idx == 0 { ast::GLOBAL_DEPTH } else { hop as i32 });
            }
        }
        None
    }

    fn resolve_stmts(&mut self, stmts: &mut [Stmt]) {
        for s in stmts {
            self.resolve_stmt(s);
        }
    }

    fn resolve_stmt(&mut self, stmt: &mut Stmt) {
        match stmt {
            Stmt::Print(e) | Stmt::Println(e) | Stmt::Expr(e) => self.resolve_expr(e),
            Stmt::Let(e) => self.resolve_let(e),
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.resolve_expr(cond);
                self.push_scope();
                self.resolve_stmts(then_branch);
                self.pop_scope();
                if let Some(else_branch) = else_branch {
                    self.push_scope();
                    self.resolve_stmts(else_branch);
                    self.pop_scope();
                }
            }
            Stmt::While { cond, body } => {
                self.resolve_expr(cond);
                self.push_scope();
                self.resolve_stmts(body);
                self.pop_scope();
            }
            Stmt::Return(Some(e)) => self.resolve_expr(e),
            Stmt::Return(None) => {}
            Stmt::FuncDef { name, params, body } => {
                self.declare(name);
                self.push_scope();
                for p in params.iter() {
                    self.declare(p);
                }
                self.resolve_stmts(body);
                self.pop_scope();
            }
            Stmt::StructDef { .. } => {
                // Struct type names live in the Context's type-template
                // registry, not in lexical scope: `bless Name` reads the
                // token literally and never goes through `resolve_name`.
            }
            Stmt::Block(body) => {
                self.push_scope();
                self.resolve_stmts(body);
                self.pop_scope();
            }
            Stmt::Error => {}
        }
    }

    /// `let x := e`: the right-hand side resolves in the enclosing scope
    /// (the new binding is not visible to its own initializer), then `x` is
    /// declared and resolved — always at hop `0` (or `-1` at global scope).
    fn resolve_let(&mut self, e: &mut Expr) {
        let Expr::Assign { target, value } = e else {
            self.resolve_expr(e);
            return;
        };
        self.resolve_expr(value);
        if let Expr::Id { name, depth } = target.as_mut() {
            self.declare(name);
            *depth = self.resolve_name(name);
        } else {
            self.resolve_expr(target);
        }
    }

    fn resolve_expr(&mut self, expr: &mut Expr) {
        match expr {
            Expr::Const(_) | Expr::Bless { .. } | Expr::Error => {}
            Expr::Id { name, depth } => *depth = self.resolve_name(name),
            Expr::Unop { expr, .. } | Expr::Typeof(expr) => self.resolve_expr(expr),
            Expr::Binop { lhs, rhs, .. } | Expr::Relop { lhs, rhs, .. } | Expr::Logic { lhs, rhs, .. } => {
                self.resolve_expr(lhs);
                self.resolve_expr(rhs);
            }
            Expr::Assign { target, value } => {
                self.resolve_expr(value);
                match target.as_mut() {
                    Expr::Id { name, depth } => *depth = self.resolve_name(name),
                    other => self.resolve_expr(other),
                }
            }
            Expr::Subscript { container, index } => {
                self.resolve_expr(container);
                // A bare-identifier index is resolved leniently so list
                // subscripting by a variable still works, without flagging a
                // struct field-name literal as an undeclared identifier; any
                // other index expression resolves normally.
                match index.as_mut() {
                    Expr::Id { name, depth } => *depth = self.resolve_name_lenient(name),
                    other => self.resolve_expr(other),
                }
            }
            Expr::Call { callee, args } => {
                self.resolve_expr(callee);
                for a in args {
                    self.resolve_expr(a);
                }
            }
            Expr::Lambda { params, body } => {
                self.push_scope();
                for p in params.iter() {
                    self.declare(p);
                }
                self.resolve_stmts(body);
                self.pop_scope();
            }
            Expr::List(items) => {
                for item in items {
                    self.resolve_expr(item);
                }
            }
            Expr::ListOp { args, .. } => {
                for a in args {
                    self.resolve_expr(a);
                }
            }
            Expr::Range { start, end } => {
                self.resolve_expr(start);
                self.resolve_expr(end);
            }
            Expr::Comprehension {
                source,
                mapper,
                predicate,
            } => {
                self.resolve_expr(source);
                self.resolve_expr(mapper);
                if let Some(p) = predicate {
                    self.resolve_expr(p);
                }
            }
            Expr::Regex { text, pattern } => {
                self.resolve_expr(text);
                self.resolve_expr(pattern);
            }
            Expr::Ternary {
                cond,
                then_branch,
                else_branch,
            } => {
                self.resolve_expr(cond);
                self.resolve_expr(then_branch);
                self.resolve_expr(else_branch);
            }
        }
    }
}

pub fn resolve(stmts: &mut [Stmt], sink: &mut DiagnosticSink) {
    Resolver::new(sink).resolve_program(stmts);
}
