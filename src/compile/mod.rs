//! Compile the template into a program that can be executed by the renderer.
//!
//! This process has three stages:
//! - The lexer chunks the template source into tokens.
//! - The parser constructs an AST from the token stream, handing the raw
//!   expression of every directive occurrence to the registered compiler.
//! - The compiler takes the AST and constructs the program.

mod lex;
mod parse;
mod search;

pub use crate::compile::search::Searcher;
use crate::types::ast;
use crate::types::program::{Instr, Template, FIXME};
use crate::{Engine, Result};

/// Compile a template into a program.
pub fn template(engine: &Engine, source: String, name: Option<String>) -> Result<Template> {
    let ast = parse::Parser::new(engine, &source, name.as_deref())
        .parse_template()
        .map_err(|err| match &name {
            Some(name) => err.with_template_name(name.clone()),
            None => err,
        })?;
    let instrs = Compiler::new().compile_template(ast);
    Ok(Template {
        name,
        source,
        instrs,
    })
}

/// A compiler that constructs a program from an AST.
struct Compiler {
    instrs: Vec<Instr>,
}

impl Compiler {
    fn new() -> Self {
        Self { instrs: Vec::new() }
    }

    fn compile_template(mut self, template: ast::Template) -> Vec<Instr> {
        let ast::Template { scope } = template;
        self.compile_scope(scope);
        self.instrs
    }

    fn compile_scope(&mut self, scope: ast::Scope) {
        for stmt in scope.stmts {
            self.compile_stmt(stmt);
        }
    }

    fn compile_stmt(&mut self, stmt: ast::Stmt) {
        match stmt {
            ast::Stmt::Raw(raw) => {
                self.push(Instr::EmitRaw(raw));
            }

            ast::Stmt::InlineExpr(ast::InlineExpr { expr, span }) => {
                // The last filter might be a value formatter, which can only
                // be decided at render time.
                let instr = match expr {
                    ast::Expr::Call(ast::Call {
                        name,
                        args: None,
                        receiver,
                        ..
                    }) => Instr::EmitWith(*receiver, name, span),
                    expr => Instr::Emit(expr),
                };
                self.push(instr);
            }

            ast::Stmt::Include(ast::Include { name, globals }) => match globals {
                Some(globals) => {
                    self.push(Instr::IncludeWith(name, globals));
                }
                None => {
                    self.push(Instr::Include(name));
                }
            },

            ast::Stmt::IfElse(ast::IfElse {
                not,
                cond,
                then_branch,
                else_branch,
            }) => {
                // then branch
                let instr = if not {
                    Instr::JumpIfTrue(FIXME, cond)
                } else {
                    Instr::JumpIfFalse(FIXME, cond)
                };
                let j = self.push(instr);
                self.compile_scope(then_branch);

                match else_branch {
                    Some(else_branch) => {
                        // else branch
                        let j2 = self.push(Instr::Jump(FIXME));
                        self.update_jump(j);
                        self.compile_scope(else_branch);
                        self.update_jump(j2)
                    }
                    None => {
                        self.update_jump(j);
                    }
                }
            }

            ast::Stmt::ForLoop(ast::ForLoop {
                vars,
                iterable,
                body,
            }) => {
                self.push(Instr::LoopStart(vars, iterable));
                let j = self.push(Instr::LoopNext(FIXME));
                self.compile_scope(body);
                self.push(Instr::Jump(j));
                self.update_jump(j);
            }

            ast::Stmt::Directive(directive) => {
                self.push(Instr::Directive(directive));
            }

            ast::Stmt::Block(ast::Block { open, body, close }) => {
                let j = self.push(Instr::DirectiveStart(open, FIXME));
                self.compile_scope(body);
                self.push(Instr::DirectiveEnd(close));
                self.update_jump(j);
            }
        }
    }

    fn update_jump(&mut self, i: usize) {
        let n = self.instrs.len();
        let j = match &mut self.instrs[i] {
            Instr::Jump(j)
            | Instr::JumpIfTrue(j, _)
            | Instr::JumpIfFalse(j, _)
            | Instr::LoopNext(j)
            | Instr::DirectiveStart(_, j) => j,
            _ => panic!("not a jump instr"),
        };
        *j = n;
    }

    fn push(&mut self, instr: Instr) -> usize {
        let i = self.instrs.len();
        self.instrs.push(instr);
        i
    }
}
