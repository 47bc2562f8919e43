use std::fmt::Write;

use crate::directive::{Args, Context, Flow};
use crate::fmt::Formatter;
use crate::render::iter::LoopState;
use crate::render::stack::{Stack, State};
use crate::render::RenderState;
use crate::types::ast;
use crate::types::program::{Instr, Template};
use crate::types::span::Span;
use crate::value::ValueCow;
use crate::{Engine, EngineFn, Error, Result, Value};

pub(crate) struct RendererImpl<'render> {
    pub(crate) engine: &'render Engine,
    pub(crate) state: RenderState,
    pub(crate) stack: Stack<'render>,
}

/// Why rendering of the current template stopped.
enum Step<'render> {
    Done,
    Halt,
    Include {
        template_name: &'render ast::String,
    },
    IncludeWith {
        template_name: &'render ast::String,
        globals: ValueCow<'render>,
    },
    /// An include requested by a directive.
    IncludeNamed {
        name: String,
        globals: Value,
        span: Span,
    },
}

impl<'render> RendererImpl<'render> {
    pub(crate) fn render(
        mut self,
        f: &mut Formatter<'_>,
        template: &'render Template,
        max_include_depth: usize,
    ) -> Result<RenderState> {
        let mut templates = vec![(template, 0, false)];

        while let Some((t, pc, has_scope)) = templates.last_mut() {
            let t: &'render Template = *t;
            let named = |e: Error| match &t.name {
                Some(name) => e.with_template_name(name.clone()),
                None => e,
            };
            let step = self.render_one(f, t, pc).map_err(named)?;
            match step {
                Step::Done => {
                    if *has_scope {
                        self.stack.pop_scope();
                        self.stack.pop_boundary();
                        self.state.pop_frame();
                    }
                    templates.pop();
                }
                Step::Halt => {
                    tracing::debug!("render halted");
                    self.state.captures.clear();
                    break;
                }
                Step::Include { template_name } => {
                    let template = self
                        .get_template(template_name.as_str())
                        .ok_or_else(|| {
                            Error::render("unknown template", &t.source, template_name.span)
                        })
                        .map_err(named)?;
                    templates.push((template, 0, false));
                }
                Step::IncludeWith {
                    template_name,
                    globals,
                } => {
                    let template = self
                        .get_template(template_name.as_str())
                        .ok_or_else(|| {
                            Error::render("unknown template", &t.source, template_name.span)
                        })
                        .map_err(named)?;
                    self.push_scope(globals);
                    templates.push((template, 0, true));
                }
                Step::IncludeNamed { name, globals, span } => {
                    let template = self
                        .get_template(&name)
                        .ok_or_else(|| {
                            Error::render(
                                format!("unknown template `{name}`"),
                                &t.source,
                                span,
                            )
                        })
                        .map_err(named)?;
                    self.push_scope(ValueCow::Owned(globals));
                    templates.push((template, 0, true));
                }
            }
            if templates.len() > max_include_depth {
                return Err(Error::max_include_depth(max_include_depth));
            }
        }

        Ok(self.state)
    }

    fn render_one(
        &mut self,
        f: &mut Formatter<'_>,
        t: &'render Template,
        pc: &mut usize,
    ) -> Result<Step<'render>> {
        let engine = self.engine;
        let source: &'render str = &t.source;

        while let Some(instr) = t.instrs.get(*pc) {
            match instr {
                Instr::Jump(j) => {
                    *pc = *j;
                    continue;
                }

                Instr::JumpIfTrue(j, expr) => {
                    if self.eval(source, expr)?.as_bool(source, expr.span())? {
                        *pc = *j;
                        continue;
                    }
                }

                Instr::JumpIfFalse(j, expr) => {
                    if !self.eval(source, expr)?.as_bool(source, expr.span())? {
                        *pc = *j;
                        continue;
                    }
                }

                Instr::Emit(expr) => {
                    let value = self.eval(source, expr)?;
                    let formatter = &engine.default_formatter;
                    self.with_sink(f, |f| formatter(f, &*value))
                        .map_err(|err| Error::format(err, source, expr.span()))?;
                }

                Instr::EmitRaw(span) => {
                    let raw = &source[*span];
                    // We don't need to enrich this error because it can only
                    // fail because of an IO error.
                    self.with_sink(f, |f| f.write_str(raw))?;
                }

                Instr::EmitWith(expr, name, span) => {
                    let value = self.eval(source, expr)?;
                    match engine.functions.get(&source[name.span]) {
                        // The referenced function is a filter, so we apply
                        // it and then emit the value using the default
                        // formatter.
                        Some(EngineFn::Filter(filter)) => {
                            let result = filter(&*value, &[])
                                .map_err(|err| err.enrich(source, name.span))?;
                            let formatter = &engine.default_formatter;
                            self.with_sink(f, |f| formatter(f, &result))
                                .map_err(|err| Error::format(err, source, *span))?;
                        }
                        // The referenced function is a formatter so we simply
                        // emit the value with it.
                        Some(EngineFn::Formatter(formatter)) => {
                            self.with_sink(f, |f| formatter(f, &*value))
                                .map_err(|err| Error::format(err, source, name.span))?;
                        }
                        None => {
                            return Err(Error::render(
                                "unknown filter or formatter",
                                source,
                                name.span,
                            ));
                        }
                    }
                }

                Instr::LoopStart(vars, iterable) => {
                    let value = self.eval(source, iterable)?;
                    let state = LoopState::new(source, vars, value, iterable.span())?;
                    self.stack.push(State::Loop(state));
                }

                Instr::LoopNext(j) => {
                    let exhausted = match self.stack.last_loop_state_mut() {
                        Some(state) => state.iterate().is_none(),
                        None => true,
                    };
                    if exhausted {
                        self.stack.pop_loop_state();
                        *pc = *j;
                        continue;
                    }
                }

                Instr::Include(template_name) => {
                    *pc += 1;
                    return Ok(Step::Include { template_name });
                }

                Instr::IncludeWith(template_name, globals) => {
                    *pc += 1;
                    let globals = self.eval(source, globals)?;
                    return Ok(Step::IncludeWith {
                        template_name,
                        globals,
                    });
                }

                Instr::Directive(directive) | Instr::DirectiveEnd(directive) => {
                    match self.run_directive(f, source, directive)? {
                        Flow::Continue | Flow::Skip => {}
                        Flow::Halt => return Ok(Step::Halt),
                        Flow::Include { name, globals } => {
                            *pc += 1;
                            return Ok(Step::IncludeNamed {
                                name,
                                globals,
                                span: directive.span,
                            });
                        }
                    }
                }

                Instr::DirectiveStart(directive, j) => {
                    match self.run_directive(f, source, directive)? {
                        Flow::Continue => {}
                        Flow::Skip => {
                            tracing::trace!(
                                directive = &source[directive.name.span],
                                "skipping block"
                            );
                            *pc = *j;
                            continue;
                        }
                        Flow::Halt => return Ok(Step::Halt),
                        Flow::Include { name, globals } => {
                            *pc += 1;
                            return Ok(Step::IncludeNamed {
                                name,
                                globals,
                                span: directive.span,
                            });
                        }
                    }
                }
            }
            *pc += 1;
        }

        debug_assert!(*pc == t.instrs.len());
        Ok(Step::Done)
    }

    /// Evaluates the directive arguments and runs it.
    fn run_directive(
        &mut self,
        f: &mut Formatter<'_>,
        source: &'render str,
        directive: &'render ast::Directive,
    ) -> Result<Flow> {
        let enrich = |err: Error| err.enrich(source, directive.span);
        let args = self.directive_args(source, &directive.args)?;
        let mut ctx = Context::new(self.engine, &mut self.state, f, &directive.origin);
        (directive.func)(&mut ctx, args).map_err(enrich)
    }

    fn directive_args(&self, source: &'render str, args: &'render ast::DirectiveArgs) -> Result<Args> {
        match args {
            ast::DirectiveArgs::None => Ok(Args::default()),
            ast::DirectiveArgs::Call(exprs) => {
                let values = exprs
                    .iter()
                    .map(|expr| self.eval(source, expr).map(ValueCow::into_owned))
                    .collect::<Result<_>>()?;
                Ok(Args::new(values, Vec::new()))
            }
            ast::DirectiveArgs::Assign(bindings) => {
                let mut names = Vec::with_capacity(bindings.len());
                let mut values = Vec::with_capacity(bindings.len());
                for (name, expr) in bindings.iter() {
                    names.push(source[name.span].to_owned());
                    values.push(self.eval(source, expr)?.into_owned());
                }
                Ok(Args::new(values, names))
            }
        }
    }

    fn eval(&self, source: &'render str, expr: &'render ast::Expr) -> Result<ValueCow<'render>> {
        match expr {
            ast::Expr::Base(base) => self.eval_base(source, base),
            ast::Expr::Call(ast::Call {
                name,
                args,
                receiver,
                ..
            }) => {
                let value = self.eval(source, receiver)?;
                match self.engine.functions.get(&source[name.span]) {
                    Some(EngineFn::Filter(filter)) => {
                        let args = match args {
                            Some(args) => args
                                .values
                                .iter()
                                .map(|arg| self.eval_base(source, arg).map(ValueCow::into_owned))
                                .collect::<Result<Vec<_>>>()?,
                            None => Vec::new(),
                        };
                        let result =
                            filter(&*value, &args).map_err(|err| err.enrich(source, name.span))?;
                        Ok(ValueCow::Owned(result))
                    }
                    // The referenced function is a formatter which is not valid
                    // in the middle of an expression.
                    Some(EngineFn::Formatter(_)) => Err(Error::render(
                        "expected filter, found formatter",
                        source,
                        name.span,
                    )),
                    None => Err(Error::render("unknown filter", source, name.span)),
                }
            }
        }
    }

    fn eval_base(
        &self,
        source: &'render str,
        base: &'render ast::BaseExpr,
    ) -> Result<ValueCow<'render>> {
        match base {
            ast::BaseExpr::Var(var) => {
                self.stack
                    .lookup_var(source, var, &self.state.locals, &self.engine.shared)
            }
            ast::BaseExpr::Literal(literal) => Ok(ValueCow::Borrowed(&literal.value)),
            ast::BaseExpr::List(list) => {
                let items = list
                    .items
                    .iter()
                    .map(|item| self.eval(source, item).map(ValueCow::into_owned))
                    .collect::<Result<_>>()?;
                Ok(ValueCow::Owned(Value::List(items)))
            }
            ast::BaseExpr::Map(map) => {
                let items = map
                    .items
                    .iter()
                    .map(|(key, item)| {
                        let value = self.eval(source, item)?.into_owned();
                        Ok::<_, Error>((key.clone(), value))
                    })
                    .collect::<Result<_>>()?;
                Ok(ValueCow::Owned(Value::Map(items)))
            }
        }
    }

    /// Runs `f` with the innermost capture buffer, else with the output.
    fn with_sink<R>(&mut self, base: &mut Formatter<'_>, f: impl FnOnce(&mut Formatter<'_>) -> R) -> R {
        match self.state.captures.last_mut() {
            Some(buf) => f(&mut Formatter::with_string(buf)),
            None => f(base),
        }
    }

    fn push_scope(&mut self, globals: ValueCow<'render>) {
        let frame = self.state.push_frame();
        self.stack.push(State::Boundary);
        self.stack.push(State::Scope(globals, frame));
    }

    fn get_template(&self, name: &str) -> Option<&'render Template> {
        self.engine.templates.get(name)
    }
}
