//! AST representing a template.

use std::sync::Arc;

use crate::directive::{Mode, Origin, RuntimeFn};
use crate::types::span::Span;
use crate::Value;

#[cfg_attr(internal_debug, derive(Debug))]
pub struct Template {
    pub scope: Scope,
}

#[cfg_attr(internal_debug, derive(Debug))]
pub struct Scope {
    pub stmts: Vec<Stmt>,
}

#[cfg_attr(internal_debug, derive(Debug))]
pub enum Stmt {
    Raw(Span),
    InlineExpr(InlineExpr),
    Include(Include),
    IfElse(IfElse),
    ForLoop(ForLoop),
    Directive(Directive),
    Block(Block),
}

#[cfg_attr(internal_debug, derive(Debug))]
pub struct InlineExpr {
    pub expr: Expr,
    pub span: Span,
}

#[cfg_attr(internal_debug, derive(Debug))]
pub struct Include {
    pub name: String,
    pub globals: Option<Expr>,
}

#[cfg_attr(internal_debug, derive(Debug))]
pub struct String {
    pub name: std::string::String,
    pub span: Span,
}

#[cfg_attr(internal_debug, derive(Debug))]
pub struct IfElse {
    pub not: bool,
    pub cond: Expr,
    pub then_branch: Scope,
    pub else_branch: Option<Scope>,
}

#[cfg_attr(internal_debug, derive(Debug))]
pub struct ForLoop {
    pub vars: LoopVars,
    pub iterable: Expr,
    pub body: Scope,
}

#[cfg_attr(internal_debug, derive(Debug))]
pub enum LoopVars {
    Item(Ident),
    KeyValue(KeyValue),
}

#[cfg_attr(internal_debug, derive(Debug))]
pub struct KeyValue {
    pub key: Ident,
    pub value: Ident,
    pub span: Span,
}

/// A single directive occurrence, e.g. `{% header "X-Frame: deny" %}`.
#[derive(Clone)]
pub struct Directive {
    pub name: Ident,
    pub func: Arc<RuntimeFn>,
    pub args: DirectiveArgs,
    pub origin: Origin,
    pub span: Span,
}

/// A paired directive and the scope between its start and end markers.
#[cfg_attr(internal_debug, derive(Debug))]
pub struct Block {
    pub open: Directive,
    pub body: Scope,
    pub close: Directive,
}

/// The arguments of a directive, parsed according to its [`Mode`].
#[derive(Clone)]
#[cfg_attr(internal_debug, derive(Debug))]
pub enum DirectiveArgs {
    None,
    Call(Arc<[Expr]>),
    Assign(Arc<[(Ident, Expr)]>),
}

#[derive(Clone)]
#[cfg_attr(internal_debug, derive(Debug))]
pub enum Expr {
    Base(BaseExpr),
    Call(Call),
}

#[derive(Clone)]
#[cfg_attr(internal_debug, derive(Debug))]
pub struct Call {
    pub name: Ident,
    pub args: Option<Args>,
    pub receiver: Box<Expr>,
    pub span: Span,
}

#[derive(Clone)]
#[cfg_attr(internal_debug, derive(Debug))]
pub struct Args {
    pub values: Vec<BaseExpr>,
    pub span: Span,
}

#[derive(Clone)]
#[cfg_attr(internal_debug, derive(Debug))]
pub enum BaseExpr {
    Var(Var),
    Literal(Literal),
    List(List),
    Map(Map),
}

#[derive(Clone)]
#[cfg_attr(internal_debug, derive(Debug))]
pub struct List {
    pub items: Vec<Expr>,
    pub span: Span,
}

#[derive(Clone)]
#[cfg_attr(internal_debug, derive(Debug))]
pub struct Map {
    pub items: Vec<(std::string::String, Expr)>,
    pub span: Span,
}

#[derive(Clone)]
#[cfg_attr(internal_debug, derive(Debug))]
pub struct Var {
    pub path: Vec<Member>,
}

#[derive(Clone, Copy)]
#[cfg_attr(internal_debug, derive(Debug))]
pub struct Member {
    pub op: AccessOp,
    pub access: Access,
    pub span: Span,
}

#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(internal_debug, derive(Debug))]
pub enum AccessOp {
    Direct,
    Optional,
}

#[derive(Clone, Copy)]
#[cfg_attr(internal_debug, derive(Debug))]
pub enum Access {
    Index(Index),
    Key(Ident),
}

#[derive(Clone, Copy)]
#[cfg_attr(internal_debug, derive(Debug))]
pub struct Index {
    pub value: usize,
    pub span: Span,
}

#[derive(Clone, Copy)]
#[cfg_attr(internal_debug, derive(Debug))]
pub struct Ident {
    pub span: Span,
}

#[derive(Clone)]
#[cfg_attr(internal_debug, derive(Debug))]
pub struct Literal {
    pub value: Value,
    pub span: Span,
}

impl Scope {
    pub const fn new() -> Self {
        Self { stmts: Vec::new() }
    }
}

impl String {
    pub fn as_str(&self) -> &str {
        &self.name
    }
}

impl Directive {
    pub fn mode(&self) -> Mode {
        match self.args {
            DirectiveArgs::None => Mode::Bare,
            DirectiveArgs::Call(_) => Mode::Call,
            DirectiveArgs::Assign(_) => Mode::Assign,
        }
    }
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Self::Base(base) => base.span(),
            Self::Call(call) => call.span,
        }
    }
}

impl BaseExpr {
    pub fn span(&self) -> Span {
        match self {
            BaseExpr::Var(var) => var.span(),
            BaseExpr::Literal(lit) => lit.span,
            BaseExpr::List(list) => list.span,
            BaseExpr::Map(map) => map.span,
        }
    }
}

impl Var {
    pub fn span(&self) -> Span {
        self.first().span.combine(self.last().span)
    }

    pub fn first(&self) -> &Member {
        self.path.first().unwrap()
    }

    pub fn last(&self) -> &Member {
        self.path.last().unwrap()
    }

    pub fn rest(&self) -> &[Member] {
        &self.path[1..]
    }
}

impl Access {
    pub const fn span(&self) -> Span {
        match self {
            Access::Index(index) => index.span,
            Access::Key(ident) => ident.span,
        }
    }
}

#[cfg(internal_debug)]
impl std::fmt::Debug for Directive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Directive")
            .field("name", &self.name)
            .field("args", &self.args)
            .field("origin", &self.origin)
            .field("span", &self.span)
            .finish_non_exhaustive()
    }
}
