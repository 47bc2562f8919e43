//! Defines a compiled [`Template`] which is a sequence of [`Instr`] that can be
//! executed by the renderer.

use crate::types::ast;
use crate::types::span::Span;

/// A placeholder jump target that is patched once the target is known.
pub const FIXME: usize = !0;

pub struct Template {
    pub name: Option<String>,
    pub source: String,
    pub instrs: Vec<Instr>,
}

#[cfg_attr(internal_debug, derive(Debug))]
pub enum Instr {
    /// Jump to an instruction
    Jump(usize),

    /// Jump to the instruction if the expression is true
    JumpIfTrue(usize, ast::Expr),

    /// Jump to the instruction if the expression is false
    JumpIfFalse(usize, ast::Expr),

    /// Emit the expression using the default formatter
    Emit(ast::Expr),

    /// Emit raw template
    EmitRaw(Span),

    /// Apply the filter or value formatter to the expression and emit it
    EmitWith(ast::Expr, ast::Ident, Span),

    /// Start a loop over the expression
    LoopStart(ast::LoopVars, ast::Expr),

    /// Advance and jump to the end of the loop when exhausted
    LoopNext(usize),

    /// Render a template
    Include(ast::String),

    /// Render a template with the expression as globals
    IncludeWith(ast::String, ast::Expr),

    /// Execute a single directive
    Directive(ast::Directive),

    /// Execute the start marker of a paired directive, the jump target is the
    /// instruction after the matching end marker
    DirectiveStart(ast::Directive, usize),

    /// Execute the end marker of a paired directive
    DirectiveEnd(ast::Directive),
}

impl std::fmt::Debug for Template {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("<compiled>")
    }
}
