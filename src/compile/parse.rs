use std::fmt::Display;
use std::sync::Arc;

use crate::compile::lex::{Lexer, Token};
use crate::directive::{CompileFn, Definition, Expression, Fragment, Mode, Origin};
use crate::types::ast;
use crate::types::span::Span;
use crate::{Engine, Error, Result, Value};

/// A parser that constructs an AST from a token stream.
///
/// The parser is implemented as a simple hand written parser with no recursion
/// for statements. It sometimes needs to peek at the next token to know how to
/// proceed and uses the `peeked` buffer to do this.
pub struct Parser<'engine, 'source> {
    /// The engine, used to resolve directives.
    engine: &'engine Engine,

    /// A lexer that tokenizes the template source.
    tokens: Lexer<'engine, 'source>,

    /// The identity of the template, used for directive origins.
    identity: Arc<str>,

    /// Remember a peeked value, even if it was `None`
    peeked: Option<Option<(Token, Span)>>,
}

/// Stores the state of a statement during parsing.
enum State {
    /// A partial `if` statement.
    If {
        /// Whether or not this `if` statement is an `else if` clause.
        is_else_if: bool,
        /// Whether this is an an `if not` or a `if` statement.
        not: bool,
        /// The condition in the `if` block.
        cond: ast::Expr,
        /// The span of the `if` block.
        span: Span,
        /// Whether or not this `if` statement has an `else` clause.
        has_else: bool,
    },

    /// A partial `for` statement.
    For {
        /// The loop variables.
        vars: ast::LoopVars,
        /// The value we are iterating over.
        iterable: ast::Expr,
        /// The span of the `for` block.
        span: Span,
    },

    /// A paired directive waiting for its end marker.
    Directive {
        /// The name of the directive, without the `end` prefix.
        name: String,
        /// The compiled start marker.
        open: ast::Directive,
        /// Compiles the end marker.
        close: Arc<CompileFn>,
    },
}

/// A parsed block definition.
enum Block {
    If(bool, ast::Expr),
    Else,
    ElseIf(bool, ast::Expr),
    EndIf,
    For(ast::LoopVars, ast::Expr),
    EndFor,
    Include(ast::String, Option<ast::Expr>),
}

/// A parsed directive tag.
enum Tag {
    Single(ast::Directive),
    Open(String, ast::Directive, Arc<CompileFn>),
    Close(ast::Directive),
}

/// A keyword in the template syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Keyword {
    If,
    Not,
    Else,
    EndIf,
    For,
    In,
    EndFor,
    Include,
    With,
    True,
    False,
    None,
}

#[derive(Clone, Copy)]
enum Sign {
    Neg,
    Pos,
}

impl<'engine, 'source> Parser<'engine, 'source> {
    /// Construct a new parser.
    pub fn new(engine: &'engine Engine, source: &'source str, name: Option<&str>) -> Self {
        Self {
            engine,
            tokens: Lexer::new(engine, source),
            identity: Origin::identity(name, source),
            peeked: None,
        }
    }

    /// Construct a parser over the raw expression of a directive.
    fn bounded(engine: &'engine Engine, source: &'source str, span: Span) -> Self {
        Self {
            engine,
            tokens: Lexer::with_bounds(engine, source, span),
            identity: Arc::from(""),
            peeked: None,
        }
    }

    /// Parses a template.
    ///
    /// This function works using two stacks:
    /// - A stack of blocks e.g. `{% if cond %} ... {% else %}`.
    /// - A stack of scopes which collect each parsed statement.
    pub fn parse_template(mut self) -> Result<ast::Template> {
        let mut blocks = vec![];
        let mut scopes = vec![ast::Scope::new()];

        while let Some(next) = self.next()? {
            let stmt = match next {
                // Simply raw template, emit a single statement for it.
                (Token::Raw, span) => ast::Stmt::Raw(span),

                // The start of a comment, e.g. `{# ... #}`
                (Token::BeginComment, _) => {
                    if self.is_next(Token::Raw)? {
                        self.expect(Token::Raw)?;
                    }
                    self.expect(Token::EndComment)?;
                    continue;
                }

                // The start of an expression, e.g. `{{ user.name }}`
                (Token::BeginExpr, begin) => {
                    let expr = self.parse_expr()?;
                    let end = self.expect(Token::EndExpr)?;
                    let span = begin.combine(end);
                    ast::Stmt::InlineExpr(ast::InlineExpr { expr, span })
                }

                // The start of a directive, e.g. `{% cache {global: true} %}`
                (Token::BeginBlock, begin) if self.is_next(Token::Ident)? => {
                    let name = self.parse_ident()?;
                    let (raw, end) = self.parse_raw_expr(name.span.n)?;
                    let span = begin.combine(end);

                    match self.parse_directive(&blocks, name, raw, span)? {
                        Tag::Single(directive) => ast::Stmt::Directive(directive),

                        // The start of a paired directive. For example:
                        //
                        //   {% cache %}
                        //
                        // Like an `if` statement this starts a new scope.
                        Tag::Open(name, open, close) => {
                            blocks.push(State::Directive { name, open, close });
                            scopes.push(ast::Scope::new());
                            continue;
                        }

                        // The end of a paired directive. For example:
                        //
                        //   {% endcache %}
                        //
                        // `parse_directive` already checked that the innermost
                        // block is the matching start marker.
                        Tag::Close(close) => match blocks.pop() {
                            Some(State::Directive { open, .. }) => {
                                let body = scopes.pop().unwrap();
                                ast::Stmt::Block(ast::Block { open, body, close })
                            }
                            _ => panic!("parser bug: expected directive block"),
                        },
                    }
                }

                // The start of a block, e.g. `{% if cond %}`
                (Token::BeginBlock, begin) => {
                    let block = self.parse_block()?;
                    let end = self.expect(Token::EndBlock)?;
                    let span = begin.combine(end);

                    match block {
                        // The start of an `if` statement. For example:
                        //
                        //   {% if cond %}
                        //
                        // We must push a block to the block stack and a scope
                        // to the scope stack because an if statement starts a
                        // new scope.
                        Block::If(not, cond) => {
                            blocks.push(State::If {
                                is_else_if: false,
                                not,
                                cond,
                                span,
                                has_else: false,
                            });
                            scopes.push(ast::Scope::new());
                            continue;
                        }

                        // An `else if` clause. For example:
                        //
                        //   {% else if cond %}
                        //
                        // We expect that the previous block was an `if` block
                        // and update it accordingly. We must also push two
                        // scopes to the scope stack, one for the `else` and one
                        // for the `if`.
                        Block::ElseIf(not, cond) => {
                            let err =
                                || Error::syntax("unexpected `else if` block", self.source(), span);
                            match blocks.last_mut().ok_or_else(err)? {
                                State::If {
                                    has_else: has_else @ false,
                                    ..
                                } => {
                                    *has_else = true;
                                }
                                _ => return Err(err()),
                            }
                            blocks.push(State::If {
                                is_else_if: true,
                                not,
                                cond,
                                span,
                                has_else: false,
                            });
                            scopes.push(ast::Scope::new());
                            scopes.push(ast::Scope::new());
                            continue;
                        }

                        // The `else` clause of an `if` statement. For example:
                        //
                        //   {% else %}
                        //
                        // We expect that the previous block was an `if` block
                        // and update it accordingly.
                        Block::Else => {
                            let err =
                                || Error::syntax("unexpected `else` block", self.source(), span);
                            match blocks.last_mut().ok_or_else(err)? {
                                State::If {
                                    has_else: has_else @ false,
                                    ..
                                } => {
                                    *has_else = true;
                                }
                                _ => return Err(err()),
                            }
                            scopes.push(ast::Scope::new());
                            continue;
                        }

                        // The end of an `if` statement. For example:
                        //
                        //   {% endif %}
                        //
                        // We have to make sure to pop back the scopes until we
                        // get to the original `if`. Any `else if` blocks along
                        // the way are desugared into an `if` statement.
                        Block::EndIf => {
                            let err =
                                || Error::syntax("unexpected `endif` block", self.source(), span);

                            loop {
                                match blocks.pop().ok_or_else(err)? {
                                    State::If {
                                        is_else_if,
                                        not,
                                        cond,
                                        has_else,
                                        ..
                                    } => {
                                        let else_branch = has_else.then(|| scopes.pop().unwrap());
                                        let then_branch = scopes.pop().unwrap();
                                        let stmt = ast::Stmt::IfElse(ast::IfElse {
                                            not,
                                            cond,
                                            then_branch,
                                            else_branch,
                                        });
                                        if !is_else_if {
                                            break stmt;
                                        }
                                        scopes.last_mut().unwrap().stmts.push(stmt);
                                    }
                                    _ => return Err(err()),
                                };
                            }
                        }

                        // The start of a `for` statement. For example:
                        //
                        //   {% for vars in iterable %}
                        //
                        Block::For(vars, iterable) => {
                            blocks.push(State::For {
                                vars,
                                iterable,
                                span,
                            });
                            scopes.push(ast::Scope::new());
                            continue;
                        }

                        // The end of a `for` statement. For example:
                        //
                        //   {% endfor %}
                        //
                        // We expect that the previous block was a `for` block.
                        Block::EndFor => {
                            let err =
                                || Error::syntax("unexpected `endfor` block", self.source(), span);

                            let for_loop = match blocks.pop().ok_or_else(err)? {
                                State::For { vars, iterable, .. } => {
                                    let body = scopes.pop().unwrap();
                                    ast::ForLoop {
                                        vars,
                                        iterable,
                                        body,
                                    }
                                }
                                _ => return Err(err()),
                            };
                            ast::Stmt::ForLoop(for_loop)
                        }

                        // An `include` statement. For example:
                        //
                        //   {% include name with expr %}
                        //
                        Block::Include(name, globals) => {
                            ast::Stmt::Include(ast::Include { name, globals })
                        }
                    }
                }
                (tk, span) => {
                    panic!("lexer bug: received token `{tk:?}` at {span:?}");
                }
            };
            scopes.last_mut().unwrap().stmts.push(stmt);
        }

        if let Some(block) = blocks.first() {
            let (msg, span) = match block {
                State::If { span, .. } => ("unclosed `if` block".to_owned(), *span),
                State::For { span, .. } => ("unclosed `for` block".to_owned(), *span),
                State::Directive { name, open, .. } => {
                    (format!("unclosed `{name}` block"), open.span)
                }
            };
            return Err(Error::syntax(msg, self.source(), span));
        }

        assert!(
            scopes.len() == 1,
            "parser bug: we should end with a single scope"
        );

        Ok(ast::Template {
            scope: scopes.remove(0),
        })
    }

    /// Parses a single block. All of the following are valid blocks.
    ///
    ///   if user.is_enabled
    ///
    ///   else
    ///
    ///   endif
    ///
    ///   for uid, user in group.user_map | filter_enabled
    ///
    ///   endfor
    ///
    ///   include "nested" with user
    ///
    fn parse_block(&mut self) -> Result<Block> {
        let (kw, span) = self.parse_keyword()?;
        match kw {
            Keyword::If => {
                let (not, expr) = self.parse_if_cond()?;
                Ok(Block::If(not, expr))
            }
            Keyword::Else => {
                if self.is_next_keyword(Keyword::If)? {
                    self.expect_keyword(Keyword::If)?;
                    let (not, expr) = self.parse_if_cond()?;
                    Ok(Block::ElseIf(not, expr))
                } else {
                    Ok(Block::Else)
                }
            }
            Keyword::EndIf => Ok(Block::EndIf),
            Keyword::For => {
                let vars = self.parse_loop_vars()?;
                self.expect_keyword(Keyword::In)?;
                let iterable = self.parse_expr()?;
                Ok(Block::For(vars, iterable))
            }
            Keyword::EndFor => Ok(Block::EndFor),
            Keyword::Include => {
                let span = self.expect(Token::String)?;
                let name = self.parse_string(span)?;
                let name = ast::String { name, span };
                let globals = if self.is_next_keyword(Keyword::With)? {
                    self.expect_keyword(Keyword::With)?;
                    Some(self.parse_expr()?)
                } else {
                    None
                };
                Ok(Block::Include(name, globals))
            }
            kw => Err(self.err_unexpected_keyword(kw.human(), span)),
        }
    }

    /// Collects the tokens up to the end of the block, returning the span of
    /// the raw expression and the span of the end tag.
    ///
    /// The tokens are only checked lexically here, the expression itself is
    /// parsed once the directive has chosen how its arguments are passed.
    fn parse_raw_expr(&mut self, after: usize) -> Result<(Span, Span)> {
        let mut raw = Span::empty(after);
        loop {
            match self.next()? {
                Some((Token::EndBlock, end)) => return Ok((raw, end)),
                Some((_, span)) if raw.is_empty() => raw = span,
                Some((_, span)) => raw = raw.combine(span),
                None => return Err(self.err_unexpected_eof(Token::EndBlock.human())),
            }
        }
    }

    /// Resolves a directive tag against the engine registry and compiles it.
    fn parse_directive(
        &mut self,
        blocks: &[State],
        name: ast::Ident,
        raw: Span,
        span: Span,
    ) -> Result<Tag> {
        let source = self.source();
        let name_raw = &source[name.span];

        // The end marker of the innermost open paired directive.
        if let Some(State::Directive { name: open, close, .. }) = blocks.last() {
            if name_raw.strip_prefix("end") == Some(open.as_str()) {
                let close = close.clone();
                let expr = self.expression(raw);
                let fragment = close(&expr).map_err(|err| err.enrich(source, span))?;
                let directive = self.build_directive(name, fragment, &expr, span)?;
                return Ok(Tag::Close(directive));
            }
        }

        match self.engine.registry.resolve(name_raw) {
            Some(Definition { compile, end }) => {
                let compile = compile.clone();
                let end = end.clone();
                let expr = self.expression(raw);
                let fragment = compile(&expr).map_err(|err| err.enrich(source, span))?;
                let directive = self.build_directive(name, fragment, &expr, span)?;
                match end {
                    Some(close) => Ok(Tag::Open(name_raw.to_owned(), directive, close)),
                    None => Ok(Tag::Single(directive)),
                }
            }
            None => {
                let is_end = name_raw
                    .strip_prefix("end")
                    .map_or(false, |n| self.engine.registry.is_paired(n));
                let msg = match is_end {
                    true => format!("unexpected `{name_raw}` block"),
                    false => format!("unknown directive `{name_raw}`"),
                };
                Err(Error::syntax(msg, source, name.span))
            }
        }
    }

    /// Constructs the expression carrier for the given raw span.
    fn expression(&self, raw: Span) -> Expression {
        let source = self.source();
        Expression {
            raw: source[raw].to_owned(),
            span: raw,
            origin: Origin::new(self.identity.clone(), source, raw.m),
        }
    }

    /// Parses the arguments of a directive according to the fragment mode.
    fn build_directive(
        &self,
        name: ast::Ident,
        fragment: Fragment,
        expr: &Expression,
        span: Span,
    ) -> Result<ast::Directive> {
        let Fragment { mode, span: args, func } = fragment;
        let source = self.source();
        let args = match mode {
            Mode::Bare if !expr.span.is_empty() => {
                return Err(Error::syntax(
                    format!("directive `{}` takes no arguments", &source[name.span]),
                    source,
                    expr.span,
                ));
            }
            Mode::Bare => ast::DirectiveArgs::None,
            Mode::Call => {
                let values = Parser::bounded(self.engine, source, args).parse_call_args()?;
                ast::DirectiveArgs::Call(values.into())
            }
            Mode::Assign => {
                let values = Parser::bounded(self.engine, source, args).parse_assign_args()?;
                ast::DirectiveArgs::Assign(values.into())
            }
        };
        Ok(ast::Directive {
            name,
            func,
            args,
            origin: expr.origin.clone(),
            span,
        })
    }

    /// Parses a comma separated list of expressions.
    ///
    ///   "/login", 302
    ///
    fn parse_call_args(mut self) -> Result<Vec<ast::Expr>> {
        let mut values = Vec::new();
        if self.peek()?.is_none() {
            return Ok(values);
        }
        loop {
            values.push(self.parse_expr()?);
            match self.next()? {
                None => break,
                Some((Token::Comma, _)) => continue,
                Some((tk, span)) => return Err(self.err_unexpected_token("comma", tk, span)),
            }
        }
        Ok(values)
    }

    /// Parses a comma separated list of assignments.
    ///
    ///   title = page.title | upper, count = 3
    ///
    fn parse_assign_args(mut self) -> Result<Vec<(ast::Ident, ast::Expr)>> {
        let mut values = Vec::new();
        loop {
            let name = self.parse_ident()?;
            self.expect(Token::Equals)?;
            values.push((name, self.parse_expr()?));
            match self.next()? {
                None => break,
                Some((Token::Comma, _)) => continue,
                Some((tk, span)) => return Err(self.err_unexpected_token("comma", tk, span)),
            }
        }
        Ok(values)
    }

    /// Parses an if condition.
    ///
    /// This is an expression with an optional `not`.
    ///
    ///   not user.is_enabled
    ///
    fn parse_if_cond(&mut self) -> Result<(bool, ast::Expr)> {
        if self.is_next_keyword(Keyword::Not)? {
            self.expect_keyword(Keyword::Not)?;
            let expr = self.parse_expr()?;
            Ok((true, expr))
        } else {
            let expr = self.parse_expr()?;
            Ok((false, expr))
        }
    }

    /// Parses an expression.
    ///
    /// This is a base expression with zero or more filter calls. For example:
    ///
    ///   user.name | lower | prefix: "Mr. "
    ///
    fn parse_expr(&mut self) -> Result<ast::Expr> {
        let mut expr = ast::Expr::Base(self.parse_base_expr()?);
        while self.is_next(Token::Pipe)? {
            self.expect(Token::Pipe)?;
            let name = self.parse_ident()?;
            let (args, span) = if self.is_next(Token::Colon)? {
                let span = self.expect(Token::Colon)?;
                let args = self.parse_args(span)?;
                let span = expr.span().combine(args.span);
                (Some(args), span)
            } else {
                (None, expr.span().combine(name.span))
            };
            expr = ast::Expr::Call(ast::Call {
                name,
                args,
                receiver: Box::new(expr),
                span,
            });
        }
        Ok(expr)
    }

    /// Parses a variable, literal, list or map.
    ///
    /// This is either a variable like
    ///
    ///   users.2.name
    ///
    /// Or a literal like
    ///
    ///   "John Smith"
    ///
    ///    0x150
    ///
    /// Or a list or map like
    ///
    ///   [entry, "meta"]
    ///
    ///   { key: "sidebar", global: true }
    ///
    fn parse_base_expr(&mut self) -> Result<ast::BaseExpr> {
        let expr = match self.parse()? {
            (Token::Keyword, span) => {
                let lit = self.parse_literal_keyword(span)?;
                ast::BaseExpr::Literal(lit)
            }

            (Token::Minus, sign) => {
                let span = self.expect(Token::Number)?;
                let lit =
                    self.parse_literal_number(&self.source()[span], sign.combine(span), Sign::Neg)?;
                ast::BaseExpr::Literal(lit)
            }

            (Token::Plus, sign) => {
                let span = self.expect(Token::Number)?;
                let lit =
                    self.parse_literal_number(&self.source()[span], sign.combine(span), Sign::Pos)?;
                ast::BaseExpr::Literal(lit)
            }

            (Token::Number, span) => {
                let lit = self.parse_literal_number(&self.source()[span], span, Sign::Pos)?;
                ast::BaseExpr::Literal(lit)
            }

            (Token::String, span) => {
                let lit = self.parse_literal_string(span)?;
                ast::BaseExpr::Literal(lit)
            }

            (Token::LBracket, begin) => ast::BaseExpr::List(self.parse_list(begin)?),

            (Token::LBrace, begin) => ast::BaseExpr::Map(self.parse_map(begin)?),

            (Token::Ident, span) => {
                let first = ast::Member {
                    op: ast::AccessOp::Direct,
                    access: ast::Access::Key(ast::Ident { span }),
                    span,
                };
                let var = self.parse_var(first)?;
                ast::BaseExpr::Var(var)
            }
            (tk, span) => {
                return Err(self.err_unexpected_token("expression", tk, span));
            }
        };
        Ok(expr)
    }

    /// Parses the remainder of a list literal.
    ///
    ///   [1, "two", three | upper]
    ///
    fn parse_list(&mut self, begin: Span) -> Result<ast::List> {
        let mut items = Vec::new();
        loop {
            if self.is_next(Token::RBracket)? {
                break;
            }
            items.push(self.parse_expr()?);
            if !self.is_next(Token::Comma)? {
                break;
            }
            self.expect(Token::Comma)?;
        }
        let end = self.expect(Token::RBracket)?;
        Ok(ast::List {
            items,
            span: begin.combine(end),
        })
    }

    /// Parses the remainder of a map literal. Keys can be identifiers,
    /// keywords or strings.
    ///
    ///   { key: "nav", "if": enabled }
    ///
    fn parse_map(&mut self, begin: Span) -> Result<ast::Map> {
        let mut items = Vec::new();
        loop {
            if self.is_next(Token::RBrace)? {
                break;
            }
            let key = match self.parse()? {
                (Token::Ident | Token::Keyword, span) => self.source()[span].to_owned(),
                (Token::String, span) => self.parse_string(span)?,
                (tk, span) => return Err(self.err_unexpected_token("map key", tk, span)),
            };
            self.expect(Token::Colon)?;
            items.push((key, self.parse_expr()?));
            if !self.is_next(Token::Comma)? {
                break;
            }
            self.expect(Token::Comma)?;
        }
        let end = self.expect(Token::RBrace)?;
        Ok(ast::Map {
            items,
            span: begin.combine(end),
        })
    }

    /// Parses a variable specification.
    ///
    ///    user
    ///
    ///    user.names.0
    ///
    ///    user?.age
    ///
    fn parse_var(&mut self, first: ast::Member) -> Result<ast::Var> {
        let mut path = vec![first];
        loop {
            let op = match self.peek()? {
                Some((Token::Dot, _)) => ast::AccessOp::Direct,
                Some((Token::QuestionDot, _)) => ast::AccessOp::Optional,
                _ => break,
            };
            let (_, sp) = self.parse()?;
            let access = self.parse_access()?;
            path.push(ast::Member {
                op,
                access,
                span: sp.combine(access.span()),
            });
        }
        Ok(ast::Var { path })
    }

    /// Parses a type of member access.
    ///
    /// This is a path segment which is either an index or an identifier.
    ///
    ///   users
    ///
    ///   2
    ///
    fn parse_access(&mut self) -> Result<ast::Access> {
        match self.parse()? {
            (Token::Index, span) => {
                let value = match self.source()[span].parse() {
                    Ok(value) => value,
                    Err(_) => {
                        return Err(Error::syntax(
                            format!(
                                "base 10 literal out of range for unsigned {}-bit integer",
                                usize::BITS
                            ),
                            self.source(),
                            span,
                        ));
                    }
                };
                Ok(ast::Access::Index(ast::Index { value, span }))
            }
            (Token::Ident | Token::Keyword, span) => Ok(ast::Access::Key(ast::Ident { span })),
            (tk, span) => Err(self.err_unexpected_token("identifier or index", tk, span)),
        }
    }

    /// Parses filter arguments.
    ///
    /// This is just a comma separate list of base expressions. For example
    ///
    ///   user.name, "a string", true
    ///
    fn parse_args(&mut self, span: Span) -> Result<ast::Args> {
        let mut values = Vec::new();
        loop {
            values.push(self.parse_base_expr()?);
            if !self.is_next(Token::Comma)? {
                break;
            }
            self.expect(Token::Comma)?;
        }
        let span = span.combine(values.last().unwrap().span());
        Ok(ast::Args { values, span })
    }

    /// Parses loop variable(s).
    ///
    /// This is either a single identifier or two comma separated identifiers.
    /// Both of the following are valid:
    ///
    ///   item
    ///
    ///   key, value
    ///
    fn parse_loop_vars(&mut self) -> Result<ast::LoopVars> {
        let key = self.parse_ident()?;
        if !self.is_next(Token::Comma)? {
            return Ok(ast::LoopVars::Item(key));
        }
        self.expect(Token::Comma)?;
        let value = self.parse_ident()?;
        let span = key.span.combine(value.span);
        Ok(ast::LoopVars::KeyValue(ast::KeyValue { key, value, span }))
    }

    /// Parses a keyword literal, `true`, `false` or `none`.
    fn parse_literal_keyword(&mut self, span: Span) -> Result<ast::Literal> {
        let value = match &self.source()[span] {
            "false" => Value::Bool(false),
            "true" => Value::Bool(true),
            "none" => Value::None,
            kw => {
                return Err(self.err_unexpected_keyword(kw, span));
            }
        };
        Ok(ast::Literal { value, span })
    }

    /// Parses an integer or a float.
    fn parse_literal_number(
        &self,
        raw: &'source str,
        span: Span,
        sign: Sign,
    ) -> Result<ast::Literal> {
        match self.parse_literal_integer(raw, span, sign) {
            Ok(lit) => Ok(lit),
            Err(err) => match self.parse_literal_float(raw, span, sign) {
                Ok(lit) => Ok(lit),
                Err(err2) => {
                    if raw.contains(['.', '-', '+']) {
                        Err(err2)
                    } else {
                        Err(err)
                    }
                }
            },
        }
    }

    /// Parse an integer.
    fn parse_literal_integer(&self, raw: &str, span: Span, sign: Sign) -> Result<ast::Literal> {
        let digits = raw.as_bytes();
        let (i, radix) = match digits {
            [b'0', b'b', ..] => (2, 2),
            [b'0', b'o', ..] => (2, 8),
            [b'0', b'x', ..] => (2, 16),
            _ => (0, 10),
        };
        let int = digits[i..]
            .iter()
            .enumerate()
            .filter(|(_, &d)| d != b'_')
            .try_fold(0i64, |acc, (j, &d)| {
                let x = (d as char).to_digit(radix).ok_or_else(|| {
                    let m = span.m + i + j;
                    Error::syntax(
                        format!("invalid digit for base {radix} literal"),
                        self.source(),
                        m..m + 1,
                    )
                })?;
                let err = || {
                    Error::syntax(
                        format!("base {radix} literal out of range for 64-bit integer"),
                        self.source(),
                        span,
                    )
                };
                let value = acc.checked_mul(radix.into()).ok_or_else(err)?;
                match sign {
                    Sign::Pos => value.checked_add(x.into()),
                    Sign::Neg => value.checked_sub(x.into()),
                }
                .ok_or_else(err)
            })?;
        let value = Value::Integer(int);
        Ok(ast::Literal { value, span })
    }

    /// Parses a float.
    fn parse_literal_float(&self, raw: &str, span: Span, sign: Sign) -> Result<ast::Literal> {
        let float: f64 = raw
            .parse()
            .map_err(|_| Error::syntax("invalid float literal", self.source(), span))?;
        let value = match sign {
            Sign::Neg => Value::Float(-float),
            Sign::Pos => Value::Float(float),
        };
        Ok(ast::Literal { value, span })
    }

    /// Parses a string.
    fn parse_literal_string(&self, span: Span) -> Result<ast::Literal> {
        let value = Value::String(self.parse_string(span)?);
        Ok(ast::Literal { value, span })
    }

    /// Parses a string and handles escape characters.
    fn parse_string(&self, span: Span) -> Result<String> {
        let raw = &self.source()[span];
        let inner = &raw[1..raw.len() - 1];
        if !inner.contains('\\') {
            return Ok(inner.to_owned());
        }
        let mut iter = inner.char_indices().map(|(i, c)| (span.m + 1 + i, c));
        let mut string = String::with_capacity(inner.len());
        while let Some((i, c)) = iter.next() {
            if c != '\\' {
                string.push(c);
                continue;
            }
            let c = match iter.next() {
                Some((_, 'n')) => '\n',
                Some((_, 'r')) => '\r',
                Some((_, 't')) => '\t',
                Some((_, '\\')) => '\\',
                Some((_, '"')) => '"',
                Some((j, c)) => {
                    return Err(Error::syntax(
                        "unknown escape character",
                        self.source(),
                        i..j + c.len_utf8(),
                    ));
                }
                None => {
                    return Err(Error::syntax(
                        "unknown escape character",
                        self.source(),
                        i..i + 1,
                    ));
                }
            };
            string.push(c);
        }
        Ok(string)
    }

    /// Expects the given keyword.
    fn expect_keyword(&mut self, exp: Keyword) -> Result<Span> {
        let (kw, span) = self.parse_keyword()?;
        if kw != exp {
            let exp = exp.human();
            let kw = kw.human();
            return Err(Error::syntax(
                format!("expected keyword `{exp}`, found keyword `{kw}`"),
                self.source(),
                span,
            ));
        }
        Ok(span)
    }

    /// Parses a keyword.
    fn parse_keyword(&mut self) -> Result<(Keyword, Span)> {
        let span = self.expect(Token::Keyword)?;
        let kw = &self.source()[span];
        Ok((Keyword::from_str(kw), span))
    }

    /// Parses an identifier.
    fn parse_ident(&mut self) -> Result<ast::Ident> {
        let span = self.expect(Token::Ident)?;
        Ok(ast::Ident { span })
    }

    /// Parses any token.
    fn parse(&mut self) -> Result<(Token, Span)> {
        match self.next()? {
            Some((tk, sp)) => Ok((tk, sp)),
            None => Err(self.err_unexpected_eof("token")),
        }
    }

    /// Parses the specified token and returns its span.
    fn expect(&mut self, exp: Token) -> Result<Span> {
        match self.next()? {
            Some((tk, span)) if tk == exp => Ok(span),
            Some((tk, span)) => Err(self.err_unexpected_token(exp.human(), tk, span)),
            None => Err(self.err_unexpected_eof(exp.human())),
        }
    }

    /// Returns `true` if the next token is a keyword equal to the provided one.
    fn is_next_keyword(&mut self, exp: Keyword) -> Result<bool> {
        Ok(self
            .peek()?
            .map(|(tk, sp)| tk == Token::Keyword && Keyword::from_str(&self.source()[sp]) == exp)
            .unwrap_or(false))
    }

    /// Returns `true` if the next token is equal to the provided one.
    fn is_next(&mut self, token: Token) -> Result<bool> {
        Ok(self.peek()?.map(|(tk, _)| tk == token).unwrap_or(false))
    }

    /// Returns a copy of the next token without affecting the result of the
    /// following `.next()` call.
    fn peek(&mut self) -> Result<Option<(Token, Span)>> {
        if let o @ None = &mut self.peeked {
            *o = Some(self.tokens.next()?);
        }
        Ok(self.peeked.unwrap())
    }

    /// Returns the next token and span in the stream.
    fn next(&mut self) -> Result<Option<(Token, Span)>> {
        match self.peeked.take() {
            Some(v) => Ok(v),
            None => self.tokens.next(),
        }
    }

    fn source(&self) -> &'source str {
        self.tokens.source
    }

    fn err_unexpected_eof(&self, exp: impl Display) -> Error {
        let n = self.source().len();
        Error::syntax(format!("expected {exp}, found EOF"), self.source(), n..n)
    }

    fn err_unexpected_token(&self, exp: impl Display, got: Token, span: Span) -> Error {
        let got = got.human();
        Error::syntax(format!("expected {exp}, found {got}"), self.source(), span)
    }

    fn err_unexpected_keyword(&self, kw: impl Display, span: Span) -> Error {
        Error::syntax(format!("unexpected keyword `{kw}`"), self.source(), span)
    }
}

impl Keyword {
    pub(crate) const fn all() -> &'static [&'static str] {
        &[
            "if", "not", "else", "endif", "for", "in", "endfor", "include", "with", "true",
            "false", "none",
        ]
    }

    const fn human(&self) -> &'static str {
        match self {
            Self::If => "if",
            Self::Not => "not",
            Self::Else => "else",
            Self::EndIf => "endif",
            Self::For => "for",
            Self::In => "in",
            Self::EndFor => "endfor",
            Self::Include => "include",
            Self::With => "with",
            Self::True => "true",
            Self::False => "false",
            Self::None => "none",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "if" => Self::If,
            "not" => Self::Not,
            "else" => Self::Else,
            "endif" => Self::EndIf,
            "for" => Self::For,
            "in" => Self::In,
            "endfor" => Self::EndFor,
            "include" => Self::Include,
            "with" => Self::With,
            "true" => Self::True,
            "false" => Self::False,
            "none" => Self::None,
            _ => unreachable!(),
        }
    }
}
