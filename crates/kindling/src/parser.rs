//! Recursive-descent / precedence-climbing parser.
//!
//! Produces the *unresolved* AST (identifier depths all [`ast::UNRESOLVED`]);
//! the scope resolver (component E) runs afterward. On an unexpected token the
//! parser reports [`Category::ParseError`], emits [`Expr::Error`] /
//! [`Stmt::Error`], discards the offending token, and resumes at the next
//! statement boundary.

use crate::ast::{self, BinOp, Expr, ListOp, Literal, LogicOp, RelOp, Stmt, UnOp};
use crate::diagnostics::{Category, DiagnosticSink};
use crate::token::{Token, TokenKind};

pub struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    sink: &'a mut DiagnosticSink,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: Vec<Token>, sink: &'a mut DiagnosticSink) -> Self {
        Self { tokens, pos: 0, sink }
    }

    pub fn parse_program(&mut self) -> Vec<Stmt> {
        let mut stmts = Vec::new();
        while !self.at_end() {
            stmts.push(self.statement());
        }
        stmts
    }

    fn at_end(&self) -> bool {
        self.peek_kind() == TokenKind::Eoi
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> TokenKind {
        self.peek().kind
    }

    fn line(&self) -> u32 {
        self.peek().line
    }

    fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Token {
        if self.check(kind) {
            self.advance()
        } else {
            let line = self.line();
            self.sink.report(
                Category::ParseError,
                format!("expected {what}, found '{}'", self.peek().text),
                line,
            );
            self.advance();
            Token::new(kind, "", line)
        }
    }

    /// Best-effort recovery: discard tokens up to the next `;`, `}`, or EOF.
    fn synchronize(&mut self) {
        while !self.at_end() {
            if self.check(TokenKind::Semi) {
                self.advance();
                return;
            }
            if self.check(TokenKind::Rc) {
                return;
            }
            self.advance();
        }
    }

    // ---- statements ----

    fn statement(&mut self) -> Stmt {
        let stmt = match self.peek_kind() {
            TokenKind::Print => {
                self.advance();
                let e = self.expression();
                Stmt::Print(e)
            }
            TokenKind::Println => {
                self.advance();
                let e = self.expression();
                Stmt::Println(e)
            }
            TokenKind::Let | TokenKind::Var => {
                self.advance();
                let e = self.expression();
                Stmt::Let(e)
            }
            TokenKind::If => self.if_statement(),
            TokenKind::While => self.while_statement(),
            TokenKind::Return => {
                self.advance();
                if self.check(TokenKind::Semi) || self.check(TokenKind::Rc) || self.at_end() {
                    Stmt::Return(None)
                } else {
                    Stmt::Return(Some(self.expression()))
                }
            }
            TokenKind::Func => self.func_def(),
            TokenKind::Struct => self.struct_def(),
            TokenKind::Lc => Stmt::Block(self.block()),
            TokenKind::Err => {
                let line = self.line();
                self.sink.report(Category::ParseError, "unexpected token", line);
                self.advance();
                self.synchronize();
                return Stmt::Error;
            }
            _ => Stmt::Expr(self.expression()),
        };
        self.matches(TokenKind::Semi);
        stmt
    }

    fn block(&mut self) -> Vec<Stmt> {
        self.expect(TokenKind::Lc, "'{'");
        let mut stmts = Vec::new();
        while !self.check(TokenKind::Rc) && !self.at_end() {
            stmts.push(self.statement());
        }
        self.expect(TokenKind::Rc, "'}'");
        stmts
    }

    fn if_statement(&mut self) -> Stmt {
        self.advance();
        self.expect(TokenKind::Lp, "'('");
        let cond = self.expression();
        self.expect(TokenKind::Rp, "')'");
        let then_branch = self.block();
        let else_branch = if self.matches(TokenKind::Else) {
            Some(self.block())
        } else {
            None
        };
        Stmt::If {
            cond,
            then_branch,
            else_branch,
        }
    }

    fn while_statement(&mut self) -> Stmt {
        self.advance();
        self.expect(TokenKind::Lp, "'('");
        let cond = self.expression();
        self.expect(TokenKind::Rp, "')'");
        let body = self.block();
        Stmt::While { cond, body }
    }

    fn func_def(&mut self) -> Stmt {
        self.advance();
        let name = self.expect(TokenKind::Id, "function name").text;
        let params = self.param_list();
        let body = self.block();
        Stmt::FuncDef { name, params, body }
    }

    fn param_list(&mut self) -> Vec<String> {
        self.expect(TokenKind::Lp, "'('");
        let mut params = Vec::new();
        if !self.check(TokenKind::Rp) {
            loop {
                params.push(self.expect(TokenKind::Id, "parameter name").text);
                if !self.matches(TokenKind::Coma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::Rp, "')'");
        params
    }

    fn struct_def(&mut self) -> Stmt {
        self.advance();
        let name = self.expect(TokenKind::Id, "struct name").text;
        self.expect(TokenKind::Lc, "'{'");
        let mut fields = Vec::new();
        while !self.check(TokenKind::Rc) && !self.at_end() {
            fields.push(self.expect(TokenKind::Id, "field name").text);
            self.matches(TokenKind::Semi);
            self.matches(TokenKind::Coma);
        }
        self.expect(TokenKind::Rc, "'}'");
        Stmt::StructDef { name, fields }
    }

    // ---- expressions, lowest to highest precedence ----

    fn expression(&mut self) -> Expr {
        self.assignment()
    }

    fn assignment(&mut self) -> Expr {
        let expr = self.ternary();
        if self.matches(TokenKind::Assign) {
            let value = self.assignment();
            return Expr::Assign {
                target: Box::new(expr),
                value: Box::new(value),
            };
        }
        expr
    }

    fn ternary(&mut self) -> Expr {
        let cond = self.logic_or();
        if self.matches(TokenKind::Question) {
            let then_branch = self.expression();
            self.expect(TokenKind::Colon, "':'");
            let else_branch = self.ternary();
            return Expr::Ternary {
                cond: Box::new(cond),
                then_branch: Box::new(then_branch),
                else_branch: Box::new(else_branch),
            };
        }
        cond
    }

    fn logic_or(&mut self) -> Expr {
        let mut lhs = self.logic_and();
        while self.matches(TokenKind::Or) {
            let rhs = self.logic_and();
            lhs = Expr::Logic {
                op: LogicOp::Or,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        lhs
    }

    fn logic_and(&mut self) -> Expr {
        let mut lhs = self.equality();
        while self.matches(TokenKind::And) {
            let rhs = self.equality();
            lhs = Expr::Logic {
                op: LogicOp::And,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        lhs
    }

    fn equality(&mut self) -> Expr {
        let mut lhs = self.comparison();
        loop {
            let op = match self.peek_kind() {
                TokenKind::Equ => RelOp::Equ,
                TokenKind::Neq => RelOp::Neq,
                _ => break,
            };
            self.advance();
            let rhs = self.comparison();
            lhs = Expr::Relop {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        lhs
    }

    fn comparison(&mut self) -> Expr {
        let mut lhs = self.term();
        loop {
            let op = match self.peek_kind() {
                TokenKind::Lt => RelOp::Lt,
                TokenKind::Gt => RelOp::Gt,
                TokenKind::Lte => RelOp::Lte,
                TokenKind::Gte => RelOp::Gte,
                _ => break,
            };
            self.advance();
            let rhs = self.term();
            lhs = Expr::Relop {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        lhs
    }

    fn term(&mut self) -> Expr {
        let mut lhs = self.factor();
        loop {
            let op = match self.peek_kind() {
                TokenKind::Add => BinOp::Add,
                TokenKind::Sub => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.factor();
            lhs = Expr::Binop {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        lhs
    }

    fn factor(&mut self) -> Expr {
        let mut lhs = self.unary();
        loop {
            let op = match self.peek_kind() {
                TokenKind::Mul => BinOp::Mul,
                TokenKind::Div => BinOp::Div,
                TokenKind::Mod => BinOp::Mod,
                _ => break,
            };
            self.advance();
            let rhs = self.unary();
            lhs = Expr::Binop {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        lhs
    }

    fn unary(&mut self) -> Expr {
        let op = match self.peek_kind() {
            TokenKind::Sub => Some(UnOp::Neg),
            TokenKind::Not => Some(UnOp::Not),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let expr = self.unary();
            return Expr::Unop { op, expr: Box::new(expr) };
        }
        self.pipe_expr()
    }

    /// `source | mapper [| predicate]`, binding looser than `..` but tighter
    /// than the arithmetic/comparison tiers above.
    fn pipe_expr(&mut self) -> Expr {
        let source = self.range_expr();
        if self.matches(TokenKind::Pipe) {
            let mapper = self.range_expr();
            let predicate = if self.matches(TokenKind::Pipe) {
                Some(Box::new(self.range_expr()))
            } else {
                None
            };
            return Expr::Comprehension {
                source: Box::new(source),
                mapper: Box::new(mapper),
                predicate,
            };
        }
        source
    }

    fn range_expr(&mut self) -> Expr {
        let start = self.power();
        if self.matches(TokenKind::Range) {
            let end = self.power();
            return Expr::Range {
                start: Box::new(start),
                end: Box::new(end),
            };
        }
        start
    }

    fn power(&mut self) -> Expr {
        let base = self.postfix();
        if self.matches(TokenKind::Pow) {
            let exp = self.unary();
            return Expr::Binop {
                op: BinOp::Pow,
                lhs: Box::new(base),
                rhs: Box::new(exp),
            };
        }
        base
    }

    fn postfix(&mut self) -> Expr {
        let mut expr = self.primary();
        loop {
            expr = match self.peek_kind() {
                TokenKind::Inc => {
                    self.advance();
                    Expr::Unop {
                        op: UnOp::PostInc,
                        expr: Box::new(expr),
                    }
                }
                TokenKind::Dec => {
                    self.advance();
                    Expr::Unop {
                        op: UnOp::PostDec,
                        expr: Box::new(expr),
                    }
                }
                TokenKind::Lb => {
                    self.advance();
                    let index = self.expression();
                    self.expect(TokenKind::Rb, "']'");
                    Expr::Subscript {
                        container: Box::new(expr),
                        index: Box::new(index),
                    }
                }
                TokenKind::Lp => {
                    let args = self.arg_list();
                    Expr::Call {
                        callee: Box::new(expr),
                        args,
                    }
                }
                _ => break,
            };
        }
        expr
    }

    fn arg_list(&mut self) -> Vec<Expr> {
        self.expect(TokenKind::Lp, "'('");
        let mut args = Vec::new();
        if !self.check(TokenKind::Rp) {
            loop {
                args.push(self.expression());
                if !self.matches(TokenKind::Coma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::Rp, "')'");
        args
    }

    fn list_op(&mut self, op: ListOp) -> Expr {
        self.advance();
        let args = self.arg_list();
        Expr::ListOp { op, args }
    }

    fn primary(&mut self) -> Expr {
        let line = self.line();
        match self.peek_kind() {
            TokenKind::Num => {
                let text = self.advance().text;
                Expr::Const(Literal::Int(text.parse().unwrap_or(0)))
            }
            TokenKind::Real => {
                let text = self.advance().text;
                Expr::Const(Literal::Real(text.parse().unwrap_or(0.0)))
            }
            TokenKind::Str => Expr::Const(Literal::Str(self.advance().text)),
            TokenKind::Char => {
                let text = self.advance().text;
                Expr::Const(Literal::Char(text.chars().next().unwrap_or('\0')))
            }
            TokenKind::True => {
                self.advance();
                Expr::Const(Literal::Bool(true))
            }
            TokenKind::False => {
                self.advance();
                Expr::Const(Literal::Bool(false))
            }
            TokenKind::Nil => {
                self.advance();
                Expr::Const(Literal::Nil)
            }
            TokenKind::Id => {
                let name = self.advance().text;
                Expr::Id {
                    name,
                    depth: ast::UNRESOLVED,
                }
            }
            TokenKind::Lp => {
                self.advance();
                let e = self.expression();
                self.expect(TokenKind::Rp, "')'");
                e
            }
            TokenKind::Lb => {
                self.advance();
                let mut items = Vec::new();
                if !self.check(TokenKind::Rb) {
                    loop {
                        items.push(self.expression());
                        if !self.matches(TokenKind::Coma) {
                            break;
                        }
                    }
                }
                self.expect(TokenKind::Rb, "']'");
                Expr::List(items)
            }
            TokenKind::Size => self.list_op(ListOp::Size),
            TokenKind::Empty => self.list_op(ListOp::Empty),
            TokenKind::Append => self.list_op(ListOp::Append),
            TokenKind::Push => self.list_op(ListOp::Push),
            TokenKind::First => self.list_op(ListOp::First),
            TokenKind::Rest => self.list_op(ListOp::Rest),
            TokenKind::Map => self.list_op(ListOp::Map),
            TokenKind::Filter => self.list_op(ListOp::Filter),
            TokenKind::Reduce => self.list_op(ListOp::Reduce),
            TokenKind::Sort => self.list_op(ListOp::Sort),
            TokenKind::Matchre => {
                self.advance();
                self.expect(TokenKind::Lp, "'('");
                let text = self.expression();
                self.expect(TokenKind::Coma, "','");
                let pattern = self.expression();
                self.expect(TokenKind::Rp, "')'");
                Expr::Regex {
                    text: Box::new(text),
                    pattern: Box::new(pattern),
                }
            }
            TokenKind::Typeof => {
                self.advance();
                self.expect(TokenKind::Lp, "'('");
                let e = self.expression();
                self.expect(TokenKind::Rp, "')'");
                Expr::Typeof(Box::new(e))
            }
            TokenKind::Bless => {
                self.advance();
                let type_name = self.expect(TokenKind::Id, "struct type name").text;
                Expr::Bless { type_name }
            }
            TokenKind::Amp => self.lambda(),
            TokenKind::Err => {
                self.sink.report(Category::ParseError, "unexpected token", line);
                self.advance();
                Expr::Error
            }
            _ => {
                self.sink.report(
                    Category::ParseError,
                    format!("unexpected token '{}'", self.peek().text),
                    line,
                );
                self.advance();
                Expr::Error
            }
        }
    }

    fn lambda(&mut self) -> Expr {
        self.advance();
        let params = self.param_list();
        if self.matches(TokenKind::Arrow) {
            let body_expr = self.expression();
            Expr::Lambda {
                params,
                body: vec![Stmt::Return(Some(body_expr))],
            }
        } else {
            let body = self.block();
            Expr::Lambda { params, body }
        }
    }
}

pub fn parse(tokens: Vec<Token>, sink: &mut DiagnosticSink) -> Vec<Stmt> {
    Parser::new(tokens, sink).parse_program()
}
