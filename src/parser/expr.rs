//! Expression and function-body statement parsing.

use super::Parser;
use super::lexer;
use super::token::Token;
use crate::ast::{Expr, FunctionBody, Param, Property, PropertyKey, Stmt, VarKind};
use crate::error::CompileError;
use crate::location::Location;

impl Parser<'_> {
    pub(super) fn parse_expr(&mut self) -> Result<Expr, CompileError> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Result<Expr, CompileError> {
        if let Some(arrow) = self.try_parse_arrow()? {
            return Ok(arrow);
        }

        let start = self.info().start;
        let left = self.parse_conditional()?;
        if let Token::Operator(op) = *self.peek() {
            if self.peek().is_assignment() {
                if !is_assignment_target(&left) {
                    return Err(CompileError::syntax(self.filename, "invalid assignment target")
                        .at(Location::from_positions(start, self.prev_end())));
                }
                self.next();
                let value = self.parse_assignment()?;
                return Ok(Expr::Assign {
                    op,
                    target: Box::new(left),
                    value: Box::new(value),
                });
            }
        }
        Ok(left)
    }

    fn parse_conditional(&mut self) -> Result<Expr, CompileError> {
        let test = self.parse_binary(1)?;
        if !self.eat(&Token::Question) {
            return Ok(test);
        }
        let consequent = self.parse_assignment()?;
        self.expect(&Token::Colon, "in conditional expression")?;
        let alternate = self.parse_assignment()?;
        Ok(Expr::Conditional {
            test: Box::new(test),
            consequent: Box::new(consequent),
            alternate: Box::new(alternate),
        })
    }

    fn parse_binary(&mut self, min_prec: u8) -> Result<Expr, CompileError> {
        let mut left = self.parse_unary()?;
        loop {
            let prec = self.peek().precedence();
            if prec == 0 || prec < min_prec {
                break;
            }
            let op = match self.next().token {
                Token::Operator(op) => op,
                Token::Ident(word) if word == "in" => "in",
                _ => "instanceof",
            };
            // `**` is right-associative.
            let right = if op == "**" {
                self.parse_binary(prec)?
            } else {
                self.parse_binary(prec + 1)?
            };
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, CompileError> {
        match self.peek() {
            Token::Operator(op @ ("!" | "-" | "+" | "~")) => {
                let op = *op;
                self.next();
                let arg = self.parse_unary()?;
                Ok(Expr::Unary {
                    op,
                    arg: Box::new(arg),
                })
            }
            Token::Operator(op @ ("++" | "--")) => {
                let op = *op;
                let start = self.info().start;
                self.next();
                let target = self.parse_unary()?;
                if !is_assignment_target(&target) {
                    return Err(CompileError::syntax(self.filename, format!("invalid `{op}` target"))
                        .at(Location::from_positions(start, self.prev_end())));
                }
                Ok(Expr::Update {
                    op,
                    prefix: true,
                    target: Box::new(target),
                })
            }
            Token::Ident(word) if matches!(word.as_str(), "typeof" | "void" | "delete") => {
                let op = match word.as_str() {
                    "typeof" => "typeof",
                    "void" => "void",
                    _ => "delete",
                };
                self.next();
                let arg = self.parse_unary()?;
                Ok(Expr::Unary {
                    op,
                    arg: Box::new(arg),
                })
            }
            Token::Ident(word) if word == "await" => {
                self.next();
                let arg = self.parse_unary()?;
                Ok(Expr::Await(Box::new(arg)))
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Result<Expr, CompileError> {
        let start = self.info().start;
        let expr = self.parse_call_member()?;
        let info = self.info();
        if let Token::Operator(op @ ("++" | "--")) = info.token {
            if !info.newline_before {
                if !is_assignment_target(&expr) {
                    return Err(CompileError::syntax(self.filename, format!("invalid `{op}` target"))
                        .at(Location::from_positions(start, info.end)));
                }
                self.next();
                return Ok(Expr::Update {
                    op,
                    prefix: false,
                    target: Box::new(expr),
                });
            }
        }
        Ok(expr)
    }

    fn parse_call_member(&mut self) -> Result<Expr, CompileError> {
        let mut expr = if self.at_ident("new") {
            self.parse_new()?
        } else {
            self.parse_primary()?
        };
        loop {
            let newline = self.info().newline_before;
            match self.peek() {
                Token::Dot => {
                    self.next();
                    let property = self.parse_property_name()?;
                    expr = Expr::Member {
                        object: Box::new(expr),
                        property,
                        optional: false,
                    };
                }
                Token::QuestionDot => {
                    self.next();
                    expr = match self.peek() {
                        Token::Lparen => Expr::Call {
                            callee: Box::new(expr),
                            args: self.parse_arguments()?,
                            optional: true,
                        },
                        Token::Lbracket => {
                            self.next();
                            let index = self.parse_expr()?;
                            self.expect(&Token::Rbracket, "to close index")?;
                            Expr::Index {
                                object: Box::new(expr),
                                index: Box::new(index),
                                optional: true,
                            }
                        }
                        _ => Expr::Member {
                            object: Box::new(expr),
                            property: self.parse_property_name()?,
                            optional: true,
                        },
                    };
                }
                Token::Lbracket if !newline => {
                    self.next();
                    let index = self.parse_expr()?;
                    self.expect(&Token::Rbracket, "to close index")?;
                    expr = Expr::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                        optional: false,
                    };
                }
                Token::Lparen if !newline => {
                    let args = self.parse_arguments()?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                        optional: false,
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_new(&mut self) -> Result<Expr, CompileError> {
        self.next();
        let mut callee = self.parse_primary()?;
        while self.eat(&Token::Dot) {
            let property = self.parse_property_name()?;
            callee = Expr::member(callee, property);
        }
        let args = if self.at(&Token::Lparen) {
            self.parse_arguments()?
        } else {
            Vec::new()
        };
        Ok(Expr::New {
            callee: Box::new(callee),
            args,
        })
    }

    fn parse_property_name(&mut self) -> Result<String, CompileError> {
        match self.peek().clone() {
            Token::Ident(name) => {
                self.next();
                Ok(name)
            }
            other => Err(self.error_here(format!("expected a property name, found `{other}`"))),
        }
    }

    fn parse_arguments(&mut self) -> Result<Vec<Expr>, CompileError> {
        self.expect(&Token::Lparen, "to open arguments")?;
        let mut args = Vec::new();
        while !self.at(&Token::Rparen) {
            args.push(self.parse_element()?);
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::Rparen, "to close arguments")?;
        Ok(args)
    }

    /// An array element or call argument: an expression or `...spread`.
    fn parse_element(&mut self) -> Result<Expr, CompileError> {
        if self.eat(&Token::DotDotDot) {
            let inner = self.parse_assignment()?;
            return Ok(Expr::Spread(Box::new(inner)));
        }
        self.parse_assignment()
    }

    fn parse_primary(&mut self) -> Result<Expr, CompileError> {
        let info = self.next();
        let loc = info.loc();
        match info.token {
            Token::Number(raw) => Ok(Expr::Number(raw)),
            Token::String { value, quote } => Ok(Expr::String { value, quote }),
            Token::Template(raw) => self.split_template_literal(&raw, info.start),
            Token::Ref(name) => Ok(Expr::Ref(name)),
            Token::Ident(word) => self.parse_word(word, loc),
            Token::Lparen => {
                let inner = self.parse_expr()?;
                self.expect(&Token::Rparen, "to close parenthesis")?;
                Ok(Expr::Paren(Box::new(inner)))
            }
            Token::Lbracket => {
                let mut items = Vec::new();
                while !self.at(&Token::Rbracket) {
                    items.push(self.parse_element()?);
                    if !self.eat(&Token::Comma) {
                        break;
                    }
                }
                self.expect(&Token::Rbracket, "to close array")?;
                Ok(Expr::Array(items))
            }
            Token::Lbrace => self.parse_object_rest(),
            Token::Eof => Err(CompileError::syntax(self.filename, "unexpected end of input").at(loc)),
            other => Err(CompileError::syntax(self.filename, format!("unexpected `{other}`")).at(loc)),
        }
    }

    /// Literal keywords, identifiers and rejected keywords.
    fn parse_word(&self, word: String, loc: Location) -> Result<Expr, CompileError> {
        let literal = match word.as_str() {
            "true" => Some(Expr::Bool(true)),
            "false" => Some(Expr::Bool(false)),
            "null" => Some(Expr::Null),
            "undefined" => Some(Expr::Undefined),
            _ => None,
        };
        if let Some(literal) = literal {
            return Ok(literal);
        }
        if word == "function" {
            return Err(
                CompileError::syntax(self.filename, "function expressions are not supported")
                    .with_suggestion("use an arrow function: `(x) => ...`")
                    .at(loc),
            );
        }
        if Token::is_keyword_txt(&word) {
            return Err(
                CompileError::syntax(self.filename, format!("unexpected keyword `{word}`")).at(loc),
            );
        }
        Ok(Expr::Ident(word))
    }

    /// Object literal members after the opening `{`.
    fn parse_object_rest(&mut self) -> Result<Expr, CompileError> {
        let mut props = Vec::new();
        while !self.at(&Token::Rbrace) {
            if self.eat(&Token::DotDotDot) {
                props.push(Property::Spread(self.parse_assignment()?));
            } else {
                let info = self.next();
                let loc = info.loc();
                let key = match info.token {
                    Token::Ident(name) => {
                        if matches!(self.peek(), Token::Comma | Token::Rbrace) {
                            props.push(Property::Shorthand(name));
                            if !self.eat(&Token::Comma) {
                                break;
                            }
                            continue;
                        }
                        PropertyKey::Ident(name)
                    }
                    Token::Ref(name) if matches!(self.peek(), Token::Comma | Token::Rbrace) => {
                        props.push(Property::KeyValue {
                            key: PropertyKey::Ident(name.clone()),
                            value: Expr::Ref(name),
                        });
                        if !self.eat(&Token::Comma) {
                            break;
                        }
                        continue;
                    }
                    Token::String { value, quote } => PropertyKey::String { value, quote },
                    Token::Number(raw) => PropertyKey::Number(raw),
                    Token::Lbracket => {
                        let key = self.parse_assignment()?;
                        self.expect(&Token::Rbracket, "to close computed key")?;
                        PropertyKey::Computed(Box::new(key))
                    }
                    other => {
                        return Err(CompileError::syntax(
                            self.filename,
                            format!("unexpected `{other}` in object literal"),
                        )
                        .at(loc));
                    }
                };
                self.expect(&Token::Colon, "after object key")?;
                let value = self.parse_assignment()?;
                props.push(Property::KeyValue { key, value });
            }
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::Rbrace, "to close object")?;
        Ok(Expr::Object(props))
    }

    /// Split a template literal into raw quasis and parsed `${}` holes.
    fn split_template_literal(
        &mut self,
        raw: &str,
        start: crate::location::Position,
    ) -> Result<Expr, CompileError> {
        let content_start = start.offset + 1;
        let content_end = content_start + raw.len();
        let mut quasis = Vec::new();
        let mut exprs = Vec::new();
        let mut quasi_start = content_start;
        let bytes = self.src.as_bytes();
        let mut i = content_start;
        while i < content_end {
            match bytes[i] {
                b'\\' => i += 2,
                b'$' if bytes.get(i + 1) == Some(&b'{') => {
                    quasis.push(self.src[quasi_start..i].to_string());
                    let hole_start = i + 2;
                    let hole_end = lexer::hole_end(self.src, hole_start, content_end).ok_or_else(|| {
                        CompileError::syntax(self.filename, "unterminated `${` in template literal")
                            .at(Location::at(start))
                    })?;
                    let pos = start.advance_over(&self.src[start.offset..hole_start]);
                    exprs.push(super::parse_expression_range(self.filename, self.src, pos, hole_end)?);
                    i = hole_end + 1;
                    quasi_start = i;
                }
                _ => i += 1,
            }
        }
        quasis.push(self.src[quasi_start..content_end].to_string());
        Ok(Expr::Template { quasis, exprs })
    }

    /// Parse an arrow function if one starts here.
    fn try_parse_arrow(&mut self) -> Result<Option<Expr>, CompileError> {
        let is_async = self.at_ident("async")
            && matches!(self.peek_nth(1), Token::Ident(_) | Token::Lparen)
            && self.arrow_follows(1);
        if !is_async && !self.arrow_follows(0) {
            return Ok(None);
        }
        if is_async {
            self.next();
        }

        let params = if let Token::Ident(name) = self.peek().clone() {
            self.next();
            vec![Param::named(name)]
        } else {
            self.parse_params()?
        };
        self.expect(&Token::EqualGreater, "after arrow parameters")?;

        let body = if self.at(&Token::Lbrace) {
            FunctionBody::Block(self.parse_block()?)
        } else {
            FunctionBody::Expr(Box::new(self.parse_assignment()?))
        };
        Ok(Some(Expr::Arrow {
            is_async,
            params,
            body: Box::new(body),
        }))
    }

    /// Whether the tokens at `n` begin arrow parameters followed by `=>`.
    fn arrow_follows(&self, n: usize) -> bool {
        match self.peek_nth(n) {
            Token::Ident(name) if !Token::is_keyword_txt(name) => {
                matches!(self.peek_nth(n + 1), Token::EqualGreater)
            }
            Token::Lparen => {
                let mut depth = 0usize;
                let mut i = n;
                loop {
                    match self.peek_nth(i) {
                        Token::Lparen | Token::Lbracket | Token::Lbrace => depth += 1,
                        Token::Rparen | Token::Rbracket | Token::Rbrace => {
                            depth -= 1;
                            if depth == 0 {
                                // Optional return type annotation: `(): T =>`.
                                return matches!(self.peek_nth(i + 1), Token::EqualGreater)
                                    || (matches!(self.peek_nth(i + 1), Token::Colon)
                                        && self.annotation_then_arrow(i + 2));
                            }
                        }
                        Token::Eof => return false,
                        _ => {}
                    }
                    i += 1;
                }
            }
            _ => false,
        }
    }

    /// A return type such as `Promise<void>` or `string[] | null` then `=>`.
    fn annotation_then_arrow(&self, mut i: usize) -> bool {
        loop {
            match self.peek_nth(i) {
                Token::EqualGreater => return true,
                Token::Ident(_) | Token::Dot | Token::Lbracket | Token::Rbracket => i += 1,
                Token::Operator("<" | ">" | "|" | "&") => i += 1,
                _ => return false,
            }
        }
    }

    /// `(a, b = 1, ...rest)` with optional ignored type annotations.
    pub(super) fn parse_params(&mut self) -> Result<Vec<Param>, CompileError> {
        self.expect(&Token::Lparen, "to open parameters")?;
        let mut params = Vec::new();
        while !self.at(&Token::Rparen) {
            let rest = self.eat(&Token::DotDotDot);
            let name = self.expect_name("for parameter")?;
            if self.eat(&Token::Colon) {
                self.skip_param_type();
            }
            let default = if self.at_operator("=") {
                self.next();
                Some(self.parse_assignment()?)
            } else {
                None
            };
            params.push(Param {
                name,
                default,
                rest,
            });
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::Rparen, "to close parameters")?;
        if self.eat(&Token::Colon) {
            while !matches!(self.peek(), Token::EqualGreater | Token::Lbrace | Token::Eof) {
                self.next();
            }
        }
        Ok(params)
    }

    fn skip_param_type(&mut self) {
        let mut depth = 0usize;
        loop {
            match self.peek() {
                Token::Eof => return,
                Token::Comma | Token::Rparen if depth == 0 => return,
                Token::Operator("=") if depth == 0 => return,
                Token::Lparen | Token::Lbracket | Token::Lbrace | Token::Operator("<") => depth += 1,
                Token::Rparen | Token::Rbracket | Token::Rbrace | Token::Operator(">") => {
                    depth = depth.saturating_sub(1)
                }
                _ => {}
            }
            self.next();
        }
    }

    /// `{ statements }`.
    pub(super) fn parse_block(&mut self) -> Result<Vec<Stmt>, CompileError> {
        self.expect(&Token::Lbrace, "to open block")?;
        let mut stmts = Vec::new();
        loop {
            while self.eat(&Token::Semicolon) {}
            if self.eat(&Token::Rbrace) {
                return Ok(stmts);
            }
            if self.at(&Token::Eof) {
                return Err(self
                    .error_here("unterminated block")
                    .with_suggestion("add the missing `}`"));
            }
            stmts.push(self.parse_statement()?);
        }
    }

    fn parse_statement(&mut self) -> Result<Stmt, CompileError> {
        let word = match self.peek() {
            Token::Lbrace => return Ok(Stmt::Block(self.parse_block()?)),
            Token::Ident(word) => word.clone(),
            _ => String::new(),
        };
        match word.as_str() {
            "const" | "let" | "var" => {
                let kind = var_kind(&word);
                self.next();
                let name = self.expect_name("in declaration")?;
                if self.eat(&Token::Colon) {
                    self.skip_param_type();
                }
                let init = if self.at_operator("=") {
                    self.next();
                    Some(self.parse_expr()?)
                } else {
                    None
                };
                self.expect_statement_end()?;
                Ok(Stmt::VarDecl { kind, name, init })
            }
            "if" => {
                self.next();
                self.expect(&Token::Lparen, "after `if`")?;
                let test = self.parse_expr()?;
                self.expect(&Token::Rparen, "after condition")?;
                let consequent = Box::new(self.parse_statement()?);
                let alternate = if self.at_ident("else") {
                    self.next();
                    Some(Box::new(self.parse_statement()?))
                } else {
                    None
                };
                Ok(Stmt::If {
                    test,
                    consequent,
                    alternate,
                })
            }
            "return" => {
                self.next();
                let info = self.info();
                let value = if info.newline_before
                    || matches!(info.token, Token::Semicolon | Token::Rbrace | Token::Eof)
                {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect_statement_end()?;
                Ok(Stmt::Return(value))
            }
            "for" => {
                self.next();
                self.expect(&Token::Lparen, "after `for`")?;
                let kind = match self.peek() {
                    Token::Ident(w) if matches!(w.as_str(), "const" | "let" | "var") => var_kind(w),
                    _ => return Err(self.unsupported_for()),
                };
                self.next();
                let binding = self.expect_name("in `for` loop")?;
                if !self.at_ident("of") {
                    return Err(self.unsupported_for());
                }
                self.next();
                let iterable = self.parse_expr()?;
                self.expect(&Token::Rparen, "to close `for`")?;
                let body = Box::new(self.parse_statement()?);
                Ok(Stmt::ForOf {
                    kind,
                    binding,
                    iterable,
                    body,
                })
            }
            "while" => {
                self.next();
                self.expect(&Token::Lparen, "after `while`")?;
                let test = self.parse_expr()?;
                self.expect(&Token::Rparen, "after condition")?;
                let body = Box::new(self.parse_statement()?);
                Ok(Stmt::While { test, body })
            }
            _ => {
                let expr = self.parse_expr()?;
                self.expect_statement_end()?;
                Ok(Stmt::Expr(expr))
            }
        }
    }

    fn unsupported_for(&self) -> CompileError {
        self.error_here("only `for (const item of items)` loops are supported")
            .with_suggestion("iterate with `for (const item of items)` or an array method")
    }
}

fn var_kind(word: &str) -> VarKind {
    match word {
        "let" => VarKind::Let,
        "var" => VarKind::Var,
        _ => VarKind::Const,
    }
}

fn is_assignment_target(expr: &Expr) -> bool {
    match expr {
        Expr::Ident(_) | Expr::Ref(_) | Expr::Member { optional: false, .. } => true,
        Expr::Index { optional: false, .. } => true,
        Expr::Paren(inner) => is_assignment_target(inner),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::{Expr, FunctionBody, Property, Stmt};
    use crate::parser::parse_expression;

    fn expr(src: &str) -> Expr {
        parse_expression(src, "t.mtm").unwrap()
    }

    #[test]
    fn test_precedence() {
        let Expr::Binary { op, right, .. } = expr("1 + 2 * 3") else {
            panic!("expected binary");
        };
        assert_eq!(op, "+");
        assert!(matches!(*right, Expr::Binary { op: "*", .. }));

        let Expr::Binary { op, left, .. } = expr("a || b && c ?? d") else {
            panic!("expected binary");
        };
        assert_eq!(op, "??");
        assert!(matches!(*left, Expr::Binary { op: "||", .. }));

        let Expr::Binary { right, .. } = expr("2 ** 3 ** 2") else {
            panic!("expected binary");
        };
        assert!(matches!(*right, Expr::Binary { op: "**", .. }));
    }

    #[test]
    fn test_arrows() {
        assert!(matches!(expr("x => x + 1"), Expr::Arrow { is_async: false, .. }));
        assert!(matches!(expr("async () => await go()"), Expr::Arrow { is_async: true, .. }));

        let Expr::Arrow { params, body, .. } = expr("(a, b = 1, ...rest): number => { return a }") else {
            panic!("expected arrow");
        };
        assert_eq!(params.len(), 3);
        assert!(params[1].default.is_some());
        assert!(params[2].rest);
        assert!(matches!(*body, FunctionBody::Block(ref b) if matches!(b[0], Stmt::Return(Some(_)))));

        // A parenthesized expression is not an arrow.
        assert!(matches!(expr("(a + b) * 2"), Expr::Binary { .. }));
    }

    #[test]
    fn test_assignment_and_update() {
        assert!(matches!(expr("$count += 2"), Expr::Assign { op: "+=", .. }));
        assert!(matches!(expr("$count++"), Expr::Update { prefix: false, op: "++", .. }));
        assert!(matches!(expr("--$count"), Expr::Update { prefix: true, .. }));
        assert!(parse_expression("1 = 2", "t.mtm").is_err());
        assert!(parse_expression("f()++", "t.mtm").is_err());
    }

    #[test]
    fn test_member_call_chains() {
        let e = expr("user?.profile.name.toUpperCase()");
        assert!(matches!(e, Expr::Call { .. }));
        assert!(matches!(expr("items[0]"), Expr::Index { .. }));
        assert!(matches!(expr("new Date(1)"), Expr::New { .. }));
        assert!(matches!(expr("fn?.(1)"), Expr::Call { optional: true, .. }));
    }

    #[test]
    fn test_objects_and_arrays() {
        let Expr::Object(props) = expr("{ a: 1, b, 'c': 2, [k]: 3, ...rest, $count }") else {
            panic!("expected object");
        };
        assert_eq!(props.len(), 6);
        assert!(matches!(props[1], Property::Shorthand(ref n) if n == "b"));
        assert!(matches!(props[4], Property::Spread(_)));

        let Expr::Array(items) = expr("[1, ...xs, 3,]") else {
            panic!("expected array");
        };
        assert_eq!(items.len(), 3);
    }

    #[test]
    fn test_template_literal() {
        let Expr::Template { quasis, exprs } = expr("`Hi ${$name}, you have ${$n + 1} items`") else {
            panic!("expected template");
        };
        assert_eq!(quasis, vec!["Hi ", ", you have ", " items"]);
        assert_eq!(exprs[0], Expr::Ref("name".into()));
        assert!(matches!(exprs[1], Expr::Binary { .. }));
    }

    #[test]
    fn test_conditional_and_unary() {
        assert!(matches!(expr("!$a ? -1 : +2"), Expr::Conditional { .. }));
        assert!(matches!(expr("typeof x"), Expr::Unary { op: "typeof", .. }));
        assert!(matches!(expr("a instanceof B"), Expr::Binary { op: "instanceof", .. }));
    }

    #[test]
    fn test_keywords_are_rejected() {
        let err = parse_expression("function () {}", "t.mtm").unwrap_err();
        assert!(err.suggestion.is_some());
        assert!(parse_expression("return", "t.mtm").is_err());
    }
}
