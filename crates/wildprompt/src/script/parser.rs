//! Recursive-descent parser producing the statement tree.
//!
//! ```text
//! stmt       := if | for | while | "break" | "continue" | simple
//! simple     := expr [ ("=" | "+=" | "-=") expr ]
//! block      := "{" stmt* "}"
//! expr       := or
//! or         := and ("or" and)*
//! and        := not ("and" not)*
//! not        := "not" not | comparison
//! comparison := additive [cmp additive]
//! additive   := term (("+" | "-") term)*
//! term       := unary (("*" | "/" | "%") unary)*
//! unary      := "-" unary | postfix
//! postfix    := primary ("(" args ")" | "[" index "]" | "." ident)*
//! ```

use super::ast::{BinaryOp, Expr, Stmt, StmtKind, UnaryOp};
use super::error::ScriptError;
use super::lexer::{tokenize, Token, TokenKind};

const MAX_NESTING: usize = 64;

pub fn parse(source: &str) -> Result<Vec<Stmt>, ScriptError> {
    let tokens = tokenize(source)?;
    Parser::new(tokens).program()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    loop_depth: usize,
    nesting: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            loop_depth: 0,
            nesting: 0,
        }
    }

    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].kind
    }

    fn line(&self) -> usize {
        self.tokens[self.pos.min(self.tokens.len() - 1)].line
    }

    fn advance(&mut self) -> TokenKind {
        let kind = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        kind
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek() == kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<(), ScriptError> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(self.error(format!("expected {}, found {}", what, describe(self.peek()))))
        }
    }

    fn error(&self, message: impl Into<String>) -> ScriptError {
        ScriptError::Syntax {
            line: self.line(),
            message: message.into(),
        }
    }

    fn skip_newlines(&mut self) {
        while self.eat(&TokenKind::Newline) {}
    }

    fn enter(&mut self) -> Result<(), ScriptError> {
        self.nesting += 1;
        if self.nesting > MAX_NESTING {
            return Err(self.error("script is nested too deeply"));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.nesting -= 1;
    }

    /// Operator and postfix chains build left-deep trees, so each link
    /// counts as one level.
    fn leave_chain(&mut self, links: usize) {
        self.nesting -= links;
    }

    fn program(mut self) -> Result<Vec<Stmt>, ScriptError> {
        let mut statements = Vec::new();
        self.skip_newlines();
        while !self.check(&TokenKind::Eof) {
            statements.push(self.statement()?);
            self.end_of_statement()?;
            self.skip_newlines();
        }
        Ok(statements)
    }

    fn end_of_statement(&mut self) -> Result<(), ScriptError> {
        match self.peek() {
            TokenKind::Newline => {
                self.advance();
                Ok(())
            }
            TokenKind::RBrace | TokenKind::Eof => Ok(()),
            other => Err(self.error(format!("expected end of statement, found {}", describe(other)))),
        }
    }

    fn block(&mut self) -> Result<Vec<Stmt>, ScriptError> {
        self.enter()?;
        self.expect(&TokenKind::LBrace, "'{'")?;
        let mut statements = Vec::new();
        self.skip_newlines();
        while !self.check(&TokenKind::RBrace) {
            if self.check(&TokenKind::Eof) {
                return Err(self.error("missing '}'"));
            }
            statements.push(self.statement()?);
            self.end_of_statement()?;
            self.skip_newlines();
        }
        self.advance();
        self.leave();
        Ok(statements)
    }

    fn statement(&mut self) -> Result<Stmt, ScriptError> {
        let line = self.line();
        let kind = match self.peek() {
            TokenKind::If => self.if_statement()?,
            TokenKind::For => self.for_statement()?,
            TokenKind::While => self.while_statement()?,
            TokenKind::Break | TokenKind::Continue => {
                if self.loop_depth == 0 {
                    return Err(self.error(format!("{} outside of a loop", describe(self.peek()))));
                }
                match self.advance() {
                    TokenKind::Break => StmtKind::Break,
                    _ => StmtKind::Continue,
                }
            }
            _ => self.simple_statement()?,
        };
        Ok(Stmt { kind, line })
    }

    fn if_statement(&mut self) -> Result<StmtKind, ScriptError> {
        self.advance();
        let mut branches = vec![(self.expression()?, self.block()?)];
        let mut otherwise = None;

        loop {
            // `}` and `elif`/`else` may sit on separate lines
            let save = self.pos;
            self.skip_newlines();
            if self.eat(&TokenKind::Elif) {
                branches.push((self.expression()?, self.block()?));
            } else if self.eat(&TokenKind::Else) {
                if self.check(&TokenKind::If) {
                    self.advance();
                    branches.push((self.expression()?, self.block()?));
                } else {
                    otherwise = Some(self.block()?);
                    break;
                }
            } else {
                self.pos = save;
                break;
            }
        }

        Ok(StmtKind::If {
            branches,
            otherwise,
        })
    }

    fn for_statement(&mut self) -> Result<StmtKind, ScriptError> {
        self.advance();
        let var = self.identifier()?;
        self.expect(&TokenKind::In, "'in'")?;
        let iterable = self.expression()?;
        let body = self.loop_body()?;
        Ok(StmtKind::For {
            var,
            iterable,
            body,
        })
    }

    fn while_statement(&mut self) -> Result<StmtKind, ScriptError> {
        self.advance();
        let condition = self.expression()?;
        let body = self.loop_body()?;
        Ok(StmtKind::While { condition, body })
    }

    fn loop_body(&mut self) -> Result<Vec<Stmt>, ScriptError> {
        self.loop_depth += 1;
        let body = self.block();
        self.loop_depth -= 1;
        body
    }

    fn simple_statement(&mut self) -> Result<StmtKind, ScriptError> {
        let target = self.expression()?;

        let op = match self.peek() {
            TokenKind::Assign => None,
            TokenKind::PlusAssign => Some(BinaryOp::Add),
            TokenKind::MinusAssign => Some(BinaryOp::Sub),
            _ => return Ok(StmtKind::Expr(target)),
        };
        self.advance();

        if !is_assignable(&target) {
            return Err(self.error("can only assign to a variable or an index"));
        }
        let value = self.expression()?;

        Ok(match op {
            None => StmtKind::Assign { target, value },
            Some(op) => StmtKind::AugAssign { target, op, value },
        })
    }

    fn identifier(&mut self) -> Result<String, ScriptError> {
        match self.advance() {
            TokenKind::Ident(name) => Ok(name),
            other => Err(self.error(format!("expected a name, found {}", describe(&other)))),
        }
    }

    fn expression(&mut self) -> Result<Expr, ScriptError> {
        self.enter()?;
        let expr = self.or_expr();
        self.leave();
        expr
    }

    fn or_expr(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.and_expr()?;
        let mut links = 0;
        while self.eat(&TokenKind::Or) {
            self.enter()?;
            links += 1;
            let right = self.and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        self.leave_chain(links);
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.not_expr()?;
        let mut links = 0;
        while self.eat(&TokenKind::And) {
            self.enter()?;
            links += 1;
            let right = self.not_expr()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        self.leave_chain(links);
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<Expr, ScriptError> {
        if self.eat(&TokenKind::Not) {
            self.enter()?;
            let operand = self.not_expr();
            self.leave();
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand?),
            });
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, ScriptError> {
        let left = self.additive()?;

        let op = match self.peek() {
            TokenKind::Eq => BinaryOp::Eq,
            TokenKind::NotEq => BinaryOp::NotEq,
            TokenKind::Lt => BinaryOp::Lt,
            TokenKind::LtEq => BinaryOp::LtEq,
            TokenKind::Gt => BinaryOp::Gt,
            TokenKind::GtEq => BinaryOp::GtEq,
            TokenKind::In => BinaryOp::In,
            TokenKind::Not => {
                // `not in`
                if self.tokens.get(self.pos + 1).map(|t| &t.kind) == Some(&TokenKind::In) {
                    self.advance();
                    BinaryOp::NotIn
                } else {
                    return Ok(left);
                }
            }
            _ => return Ok(left),
        };
        self.advance();

        let right = self.additive()?;
        Ok(Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    fn additive(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.term()?;
        let mut links = 0;
        loop {
            let op = match self.peek() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            self.enter()?;
            links += 1;
            let right = self.term()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        self.leave_chain(links);
        Ok(left)
    }

    fn term(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.unary()?;
        let mut links = 0;
        loop {
            let op = match self.peek() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => break,
            };
            self.advance();
            self.enter()?;
            links += 1;
            let right = self.unary()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        self.leave_chain(links);
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, ScriptError> {
        if self.eat(&TokenKind::Minus) {
            self.enter()?;
            let operand = self.unary();
            self.leave();
            return Ok(Expr::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(operand?),
            });
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, ScriptError> {
        let mut expr = self.primary()?;
        let mut links = 0;
        loop {
            if matches!(
                self.peek(),
                TokenKind::LParen | TokenKind::LBracket | TokenKind::Dot
            ) {
                self.enter()?;
                links += 1;
            }
            match self.peek() {
                TokenKind::LParen => {
                    self.advance();
                    let args = self.arguments()?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                    };
                }
                TokenKind::LBracket => {
                    self.advance();
                    expr = self.index_or_slice(expr)?;
                }
                TokenKind::Dot => {
                    self.advance();
                    let name = self.identifier()?;
                    expr = Expr::Attr {
                        target: Box::new(expr),
                        name,
                    };
                }
                _ => break,
            }
        }
        self.leave_chain(links);
        Ok(expr)
    }

    fn arguments(&mut self) -> Result<Vec<Expr>, ScriptError> {
        let mut args = Vec::new();
        if self.eat(&TokenKind::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.expression()?);
            if self.eat(&TokenKind::RParen) {
                return Ok(args);
            }
            self.expect(&TokenKind::Comma, "',' or ')'")?;
            if self.eat(&TokenKind::RParen) {
                return Ok(args);
            }
        }
    }

    fn index_or_slice(&mut self, target: Expr) -> Result<Expr, ScriptError> {
        let start = if self.check(&TokenKind::Colon) {
            None
        } else {
            Some(Box::new(self.expression()?))
        };

        if self.eat(&TokenKind::Colon) {
            let end = if self.check(&TokenKind::RBracket) {
                None
            } else {
                Some(Box::new(self.expression()?))
            };
            self.expect(&TokenKind::RBracket, "']'")?;
            return Ok(Expr::Slice {
                target: Box::new(target),
                start,
                end,
            });
        }

        self.expect(&TokenKind::RBracket, "']'")?;
        match start {
            Some(index) => Ok(Expr::Index {
                target: Box::new(target),
                index,
            }),
            None => Err(self.error("empty index")),
        }
    }

    fn primary(&mut self) -> Result<Expr, ScriptError> {
        match self.advance() {
            TokenKind::Int(n) => Ok(Expr::Int(n)),
            TokenKind::Float(f) => Ok(Expr::Float(f)),
            TokenKind::Str(s) => Ok(Expr::Str(s)),
            TokenKind::True => Ok(Expr::Bool(true)),
            TokenKind::False => Ok(Expr::Bool(false)),
            TokenKind::None => Ok(Expr::None),
            TokenKind::Ident(name) => Ok(Expr::Var(name)),
            TokenKind::LParen => {
                let expr = self.expression()?;
                self.expect(&TokenKind::RParen, "')'")?;
                Ok(expr)
            }
            TokenKind::LBracket => self.list_or_comprehension(),
            other => Err(self.error(format!("unexpected {}", describe(&other)))),
        }
    }

    fn list_or_comprehension(&mut self) -> Result<Expr, ScriptError> {
        if self.eat(&TokenKind::RBracket) {
            return Ok(Expr::List(Vec::new()));
        }

        let first = self.expression()?;

        if self.eat(&TokenKind::For) {
            let var = self.identifier()?;
            self.expect(&TokenKind::In, "'in'")?;
            let iterable = self.expression()?;
            let condition = if self.eat(&TokenKind::If) {
                Some(Box::new(self.expression()?))
            } else {
                None
            };
            self.expect(&TokenKind::RBracket, "']'")?;
            return Ok(Expr::Comprehension {
                element: Box::new(first),
                var,
                iterable: Box::new(iterable),
                condition,
            });
        }

        let mut items = vec![first];
        loop {
            if self.eat(&TokenKind::RBracket) {
                return Ok(Expr::List(items));
            }
            self.expect(&TokenKind::Comma, "',' or ']'")?;
            if self.eat(&TokenKind::RBracket) {
                return Ok(Expr::List(items));
            }
            items.push(self.expression()?);
        }
    }
}

fn is_assignable(expr: &Expr) -> bool {
    match expr {
        Expr::Var(_) => true,
        Expr::Index { target, .. } => is_assignable(target),
        _ => false,
    }
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Ident(name) => format!("name '{}'", name),
        TokenKind::Str(_) => "string".to_string(),
        TokenKind::Int(_) | TokenKind::Float(_) => "number".to_string(),
        TokenKind::Newline => "end of line".to_string(),
        TokenKind::Eof => "end of script".to_string(),
        other => format!("{:?}", other).to_lowercase(),
    }
}
