use crate::render::iter::LoopState;
use crate::render::value::lookup_path;
use crate::types::ast;
use crate::value::{Map, ValueCow};
use crate::{Error, Result, Value};

#[cfg_attr(internal_debug, derive(Debug))]
pub struct Stack<'render> {
    stack: Vec<State<'render>>,
}

#[cfg_attr(internal_debug, derive(Debug))]
pub enum State<'render> {
    /// An entire scope of variables and the index of its frame of
    /// render-local bindings.
    Scope(ValueCow<'render>, usize),

    /// The current state of a loop iteration
    Loop(LoopState<'render>),

    /// Used to represent a template boundary.
    Boundary,
}

impl<'render> Stack<'render> {
    pub fn new(globals: ValueCow<'render>) -> Self {
        Self {
            stack: vec![State::Scope(globals, 0)],
        }
    }

    /// Resolves a variable.
    ///
    /// Loop variables are checked first, then the render-local bindings and
    /// the variables of each scope up to the template boundary, then the
    /// shared engine globals.
    pub fn lookup_var(
        &self,
        source: &str,
        var: &ast::Var,
        locals: &[Map<String, Value>],
        shared: &'render Map<String, Value>,
    ) -> Result<ValueCow<'render>> {
        let first = var.first();
        let name = &source[first.span];

        let mut found = None;
        for state in self.stack.iter().rev() {
            match state {
                State::Loop(loop_state) => {
                    if let Some(value) = loop_state.resolve(source, name) {
                        found = Some(value);
                        break;
                    }
                }
                State::Scope(scope, frame) => {
                    if let Some(value) = locals.get(*frame).and_then(|l| l.get(name)) {
                        found = Some(ValueCow::Owned(value.clone()));
                        break;
                    }
                    if let Some(value) = lookup_key(scope, name) {
                        found = Some(value);
                        break;
                    }
                }
                State::Boundary => break,
            }
        }

        match found.or_else(|| shared.get(name).map(ValueCow::Borrowed)) {
            Some(value) => lookup_path(source, value, var.rest()),
            None => Err(Error::render("not found in this scope", source, first.span)),
        }
    }

    pub fn push(&mut self, state: State<'render>) {
        self.stack.push(state);
    }

    pub fn last_loop_state_mut(&mut self) -> Option<&mut LoopState<'render>> {
        match self.stack.last_mut() {
            Some(State::Loop(loop_state)) => Some(loop_state),
            _ => None,
        }
    }

    pub fn pop_loop_state(&mut self) {
        debug_assert!(matches!(self.stack.last(), Some(State::Loop(_))));
        self.stack.pop();
    }

    pub fn pop_scope(&mut self) {
        debug_assert!(matches!(self.stack.last(), Some(State::Scope(..))));
        self.stack.pop();
    }

    pub fn pop_boundary(&mut self) {
        debug_assert!(matches!(self.stack.last(), Some(State::Boundary)));
        self.stack.pop();
    }
}

fn lookup_key<'render>(scope: &ValueCow<'render>, name: &str) -> Option<ValueCow<'render>> {
    match scope {
        &ValueCow::Borrowed(v) => v.as_map()?.get(name).map(ValueCow::Borrowed),
        ValueCow::Owned(v) => v.as_map()?.get(name).cloned().map(ValueCow::Owned),
    }
}
