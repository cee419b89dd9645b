use std::rc::Rc;

use crate::ast::{Expr, ExprId, FunctionDef, LiteralValue, Program, Stmt};
use crate::diagnostics::Diagnostics;
use crate::token::{Literal, Token, TokenKind};

/// Zero-sized sentinel raised on a parse error after the diagnostic has
/// been reported. `declaration` catches it and synchronizes to the next
/// statement boundary, so one input can accumulate several diagnostics.
struct ParseInterrupt;

type PResult<T> = Result<T, ParseInterrupt>;

/// Whether a function-shaped production is a free function or a class
/// member. Only members may omit the parameter list (getter form).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FunctionKind {
    Function,
    Method,
}

pub struct Parser<'d> {
    tokens: Vec<Token>,
    pos: usize,
    diagnostics: &'d mut Diagnostics,
    next_id: &'d mut u32,
}

impl<'d> Parser<'d> {
    pub fn new(tokens: Vec<Token>, diagnostics: &'d mut Diagnostics, next_id: &'d mut u32) -> Self {
        Self {
            tokens,
            pos: 0,
            diagnostics,
            next_id,
        }
    }

    pub fn parse_program(mut self) -> Program {
        let mut statements = Vec::new();
        while !self.is_at_end() {
            if let Some(statement) = self.declaration() {
                statements.push(statement);
            }
        }
        Program { statements }
    }

    fn declaration(&mut self) -> Option<Stmt> {
        let result = if self.match_kind(TokenKind::Class) {
            self.class_declaration()
        } else if self.check(TokenKind::Fun) && self.check_next(TokenKind::Identifier) {
            self.advance();
            self.function(FunctionKind::Function).map(Stmt::Function)
        } else if self.match_kind(TokenKind::Var) {
            self.var_declaration()
        } else {
            self.statement()
        };

        match result {
            Ok(statement) => Some(statement),
            Err(ParseInterrupt) => {
                self.synchronize();
                None
            }
        }
    }

    fn class_declaration(&mut self) -> PResult<Stmt> {
        let name = self.consume(TokenKind::Identifier, "Expected class name")?;
        let superclass = if self.match_kind(TokenKind::Less) {
            let super_name = self.consume(TokenKind::Identifier, "Expected superclass name")?;
            Some(Expr::Variable {
                id: self.fresh_id(),
                name: super_name,
            })
        } else {
            None
        };

        self.consume(TokenKind::LeftBrace, "Expected '{' before class body")?;
        let mut methods = Vec::new();
        let mut statics = Vec::new();
        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            let is_static = self.match_kind(TokenKind::Static);
            let member = self.function(FunctionKind::Method)?;
            if is_static {
                statics.push(member);
            } else {
                methods.push(member);
            }
        }
        self.consume(TokenKind::RightBrace, "Expected '}' after class body")?;

        Ok(Stmt::Class {
            name,
            superclass,
            methods,
            statics,
        })
    }

    fn function(&mut self, kind: FunctionKind) -> PResult<Rc<FunctionDef>> {
        let name = self.consume(TokenKind::Identifier, "Expected function name")?;
        let params = if self.check(TokenKind::LeftParen) {
            self.advance();
            Some(self.parameter_list()?)
        } else {
            // Missing "()" is the getter form, legal only inside a class.
            if kind != FunctionKind::Method {
                self.diagnostics
                    .error(name.line, "Getters may only exist within a class");
            }
            None
        };
        self.consume(TokenKind::LeftBrace, "Expected '{' before function body")?;
        let body = self.block_statements()?;
        Ok(Rc::new(FunctionDef {
            name: Some(name),
            params,
            body,
        }))
    }

    fn parameter_list(&mut self) -> PResult<Vec<Token>> {
        let mut params = Vec::new();
        if !self.check(TokenKind::RightParen) {
            loop {
                if params.len() >= 255 {
                    let line = self.peek().line;
                    self.diagnostics
                        .error(line, "Cannot have more than 255 parameters");
                }
                params.push(self.consume(TokenKind::Identifier, "Expected parameter name")?);
                if !self.match_kind(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expected ')' after parameters")?;
        Ok(params)
    }

    fn var_declaration(&mut self) -> PResult<Stmt> {
        let name = self.consume(TokenKind::Identifier, "Expected variable name")?;
        let init = if self.match_kind(TokenKind::Equal) {
            Some(self.comma()?)
        } else {
            None
        };
        self.consume(TokenKind::Semicolon, "Expected ';' after variable declaration")?;
        Ok(Stmt::Var { name, init })
    }

    fn statement(&mut self) -> PResult<Stmt> {
        if self.match_kind(TokenKind::If) {
            return self.if_statement();
        }
        if self.match_kind(TokenKind::Print) {
            let value = self.comma()?;
            self.consume(TokenKind::Semicolon, "Expected ';' after value")?;
            return Ok(Stmt::Print(value));
        }
        if self.match_kind(TokenKind::Return) {
            return self.return_statement();
        }
        if self.match_kind(TokenKind::While) {
            return self.while_statement();
        }
        if self.match_kind(TokenKind::For) {
            return self.for_statement();
        }
        if self.match_kind(TokenKind::Break) {
            let keyword = self.previous().clone();
            self.consume(TokenKind::Semicolon, "Expected ';' after 'break'")?;
            return Ok(Stmt::Break(keyword));
        }
        if self.match_kind(TokenKind::Continue) {
            let keyword = self.previous().clone();
            self.consume(TokenKind::Semicolon, "Expected ';' after 'continue'")?;
            return Ok(Stmt::Continue(keyword));
        }
        if self.match_kind(TokenKind::LeftBrace) {
            return Ok(Stmt::Block(self.block_statements()?));
        }
        self.expression_statement()
    }

    fn if_statement(&mut self) -> PResult<Stmt> {
        self.consume(TokenKind::LeftParen, "Expected '(' after 'if'")?;
        let cond = self.comma()?;
        self.consume(TokenKind::RightParen, "Expected ')' after condition")?;
        let then_branch = Box::new(self.statement()?);
        let else_branch = if self.match_kind(TokenKind::Else) {
            Some(Box::new(self.statement()?))
        } else {
            None
        };
        Ok(Stmt::If {
            cond,
            then_branch,
            else_branch,
        })
    }

    fn return_statement(&mut self) -> PResult<Stmt> {
        let keyword = self.previous().clone();
        let value = if self.check(TokenKind::Semicolon) {
            None
        } else {
            Some(self.comma()?)
        };
        self.consume(TokenKind::Semicolon, "Expected ';' after return value")?;
        Ok(Stmt::Return { keyword, value })
    }

    fn while_statement(&mut self) -> PResult<Stmt> {
        self.consume(TokenKind::LeftParen, "Expected '(' after 'while'")?;
        let cond = self.comma()?;
        self.consume(TokenKind::RightParen, "Expected ')' after condition")?;
        let body = Box::new(self.statement()?);
        Ok(Stmt::Loop {
            init: None,
            cond,
            update: None,
            body,
        })
    }

    fn for_statement(&mut self) -> PResult<Stmt> {
        self.consume(TokenKind::LeftParen, "Expected '(' after 'for'")?;

        let init = if self.match_kind(TokenKind::Semicolon) {
            None
        } else if self.match_kind(TokenKind::Var) {
            Some(Box::new(self.var_declaration()?))
        } else {
            Some(Box::new(self.expression_statement()?))
        };

        let cond = if self.check(TokenKind::Semicolon) {
            Expr::Literal(LiteralValue::Bool(true))
        } else {
            self.comma()?
        };
        self.consume(TokenKind::Semicolon, "Expected ';' after loop condition")?;

        let update = if self.check(TokenKind::RightParen) {
            None
        } else {
            Some(self.comma()?)
        };
        self.consume(TokenKind::RightParen, "Expected ')' after for clauses")?;

        let body = Box::new(self.statement()?);
        Ok(Stmt::Loop {
            init,
            cond,
            update,
            body,
        })
    }

    fn block_statements(&mut self) -> PResult<Vec<Stmt>> {
        let mut statements = Vec::new();
        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            if let Some(statement) = self.declaration() {
                statements.push(statement);
            }
        }
        self.consume(TokenKind::RightBrace, "Expected '}' after block")?;
        Ok(statements)
    }

    fn expression_statement(&mut self) -> PResult<Stmt> {
        let expr = self.comma()?;
        self.consume(TokenKind::Semicolon, "Expected ';' after expression")?;
        Ok(Stmt::Expression(expr))
    }

    /// Lowest-precedence expression level. A single operand folds back to
    /// the operand itself rather than a one-element comma list.
    fn comma(&mut self) -> PResult<Expr> {
        let first = self.assignment()?;
        if !self.check(TokenKind::Comma) {
            return Ok(first);
        }
        let mut list = vec![first];
        while self.match_kind(TokenKind::Comma) {
            list.push(self.assignment()?);
        }
        Ok(Expr::Comma(list))
    }

    fn assignment(&mut self) -> PResult<Expr> {
        let expr = self.or_expression()?;

        if self.match_kind(TokenKind::Equal) {
            let equals = self.previous().clone();
            let value = Box::new(self.assignment()?);
            return Ok(match expr {
                Expr::Variable { name, .. } => Expr::Assign {
                    id: self.fresh_id(),
                    name,
                    value,
                },
                Expr::Get { object, name } => Expr::Set {
                    object,
                    name,
                    value,
                },
                other => {
                    self.diagnostics
                        .error(equals.line, "Invalid assignment target");
                    other
                }
            });
        }

        Ok(expr)
    }

    fn or_expression(&mut self) -> PResult<Expr> {
        let mut expr = self.and_expression()?;
        while self.match_kind(TokenKind::Or) {
            let op = self.previous().clone();
            let right = self.and_expression()?;
            expr = Expr::Logical {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn and_expression(&mut self) -> PResult<Expr> {
        let mut expr = self.equality()?;
        while self.match_kind(TokenKind::And) {
            let op = self.previous().clone();
            let right = self.equality()?;
            expr = Expr::Logical {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn equality(&mut self) -> PResult<Expr> {
        let mut expr = self.comparison()?;
        while self.match_kinds(&[TokenKind::BangEqual, TokenKind::EqualEqual]) {
            let op = self.previous().clone();
            let right = self.comparison()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn comparison(&mut self) -> PResult<Expr> {
        let mut expr = self.term()?;
        while self.match_kinds(&[
            TokenKind::Less,
            TokenKind::LessEqual,
            TokenKind::Greater,
            TokenKind::GreaterEqual,
        ]) {
            let op = self.previous().clone();
            let right = self.term()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn term(&mut self) -> PResult<Expr> {
        let mut expr = self.factor()?;
        while self.match_kinds(&[TokenKind::Plus, TokenKind::Minus]) {
            let op = self.previous().clone();
            let right = self.factor()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn factor(&mut self) -> PResult<Expr> {
        let mut expr = self.power()?;
        while self.match_kinds(&[TokenKind::Star, TokenKind::Slash, TokenKind::Percent]) {
            let op = self.previous().clone();
            let right = self.power()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn power(&mut self) -> PResult<Expr> {
        let base = self.unary()?;
        if self.match_kind(TokenKind::StarStar) {
            let op = self.previous().clone();
            // Right-associative.
            let exponent = self.power()?;
            return Ok(Expr::Binary {
                left: Box::new(base),
                op,
                right: Box::new(exponent),
            });
        }
        Ok(base)
    }

    fn unary(&mut self) -> PResult<Expr> {
        if self.match_kinds(&[TokenKind::Bang, TokenKind::Minus]) {
            let op = self.previous().clone();
            let right = self.unary()?;
            return Ok(Expr::Unary {
                op,
                right: Box::new(right),
            });
        }
        self.call()
    }

    fn call(&mut self) -> PResult<Expr> {
        let mut expr = self.primary()?;
        loop {
            if self.match_kind(TokenKind::LeftParen) {
                expr = self.finish_call(expr)?;
            } else if self.match_kind(TokenKind::Dot) {
                let name = self.consume(TokenKind::Identifier, "Expected property name after '.'")?;
                expr = Expr::Get {
                    object: Box::new(expr),
                    name,
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn finish_call(&mut self, callee: Expr) -> PResult<Expr> {
        let mut args = Vec::new();
        if !self.check(TokenKind::RightParen) {
            loop {
                if args.len() >= 255 {
                    let line = self.peek().line;
                    self.diagnostics
                        .error(line, "Cannot have more than 255 arguments");
                }
                args.push(self.assignment()?);
                if !self.match_kind(TokenKind::Comma) {
                    break;
                }
            }
        }
        let paren = self.consume(TokenKind::RightParen, "Expected ')' after arguments")?;
        Ok(Expr::Call {
            callee: Box::new(callee),
            paren,
            args,
        })
    }

    fn primary(&mut self) -> PResult<Expr> {
        if self.match_kind(TokenKind::False) {
            return Ok(Expr::Literal(LiteralValue::Bool(false)));
        }
        if self.match_kind(TokenKind::True) {
            return Ok(Expr::Literal(LiteralValue::Bool(true)));
        }
        if self.match_kind(TokenKind::Nil) {
            return Ok(Expr::Literal(LiteralValue::Nil));
        }
        if self.match_kind(TokenKind::Number) {
            let value = match &self.previous().literal {
                Literal::Number(n) => *n,
                _ => 0.0,
            };
            return Ok(Expr::Literal(LiteralValue::Number(value)));
        }
        if self.match_kind(TokenKind::String) {
            let value = match &self.previous().literal {
                Literal::String(s) => s.clone(),
                _ => String::new(),
            };
            return Ok(Expr::Literal(LiteralValue::String(value)));
        }
        if self.match_kind(TokenKind::This) {
            return Ok(Expr::This {
                id: self.fresh_id(),
                keyword: self.previous().clone(),
            });
        }
        if self.match_kind(TokenKind::Super) {
            let keyword = self.previous().clone();
            self.consume(TokenKind::Dot, "Expected '.' after 'super'")?;
            let member = self.consume(TokenKind::Identifier, "Expected superclass member name")?;
            return Ok(Expr::Super {
                id: self.fresh_id(),
                keyword,
                member,
            });
        }
        if self.match_kind(TokenKind::Identifier) {
            return Ok(Expr::Variable {
                id: self.fresh_id(),
                name: self.previous().clone(),
            });
        }
        if self.match_kind(TokenKind::LeftParen) {
            let inner = self.comma()?;
            self.consume(TokenKind::RightParen, "Expected ')' after expression")?;
            return Ok(Expr::Grouping(Box::new(inner)));
        }
        if self.match_kind(TokenKind::Fun) {
            return self.lambda();
        }
        if self.match_kind(TokenKind::Delete) {
            return self.delete_expression();
        }

        let line = self.peek().line;
        Err(self.error(line, "Expected expression"))
    }

    fn lambda(&mut self) -> PResult<Expr> {
        let name = if self.check(TokenKind::Identifier) {
            Some(self.advance())
        } else {
            None
        };
        self.consume(TokenKind::LeftParen, "Expected '(' after 'fun'")?;
        let params = self.parameter_list()?;
        self.consume(TokenKind::LeftBrace, "Expected '{' before function body")?;
        let body = self.block_statements()?;
        Ok(Expr::Function(Rc::new(FunctionDef {
            name,
            params: Some(params),
            body,
        })))
    }

    fn delete_expression(&mut self) -> PResult<Expr> {
        let keyword = self.previous().clone();
        let target = self.comma()?;
        match target {
            Expr::Get { object, name } => Ok(Expr::Delete { object, name }),
            Expr::Comma(mut list) => {
                // Only the final operand is deleted; the rest evaluate for
                // their side effects.
                match list.pop() {
                    Some(Expr::Get { object, name }) => {
                        list.push(Expr::Delete { object, name });
                        Ok(Expr::Comma(list))
                    }
                    _ => Err(self.error(keyword.line, "Delete expression must end with field access")),
                }
            }
            _ => Err(self.error(keyword.line, "Delete expression must end with field access")),
        }
    }

    fn synchronize(&mut self) {
        self.advance();
        while !self.is_at_end() {
            if self.previous().kind == TokenKind::Semicolon {
                return;
            }
            match self.peek().kind {
                TokenKind::Class
                | TokenKind::Fun
                | TokenKind::Var
                | TokenKind::For
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Print
                | TokenKind::Return => return,
                _ => {
                    self.advance();
                }
            }
        }
    }

    fn fresh_id(&mut self) -> ExprId {
        let id = ExprId(*self.next_id);
        *self.next_id += 1;
        id
    }

    fn consume(&mut self, kind: TokenKind, message: &str) -> PResult<Token> {
        if self.check(kind) {
            return Ok(self.advance());
        }
        let line = self.peek().line;
        Err(self.error(line, message))
    }

    fn error(&mut self, line: usize, message: &str) -> ParseInterrupt {
        self.diagnostics.error(line, message);
        ParseInterrupt
    }

    fn match_kind(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn match_kinds(&mut self, kinds: &[TokenKind]) -> bool {
        for &kind in kinds {
            if self.check(kind) {
                self.advance();
                return true;
            }
        }
        false
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn check_next(&self, kind: TokenKind) -> bool {
        self.tokens
            .get(self.pos + 1)
            .is_some_and(|token| token.kind == kind)
    }

    fn advance(&mut self) -> Token {
        if !self.is_at_end() {
            self.pos += 1;
        }
        self.previous().clone()
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.pos.saturating_sub(1)]
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }
}

/// Parse a token list into a program, reporting syntax errors into
/// `diagnostics`. `next_id` is the interpreter-owned counter for
/// reference-expression ids.
pub fn parse(tokens: Vec<Token>, diagnostics: &mut Diagnostics, next_id: &mut u32) -> Program {
    Parser::new(tokens, diagnostics, next_id).parse_program()
}
