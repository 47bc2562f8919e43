//! Directives extend the template syntax with named tags.
//!
//! A directive occurrence like `{% header "X-Frame-Options: DENY" %}` is
//! handed to the compiler function registered under its name. The compiler
//! receives the raw, unparsed expression as an [`Expression`] and returns a
//! [`Fragment`]: the argument [`Mode`] and the function to execute at render
//! time. The arguments are evaluated by the renderer right before the
//! fragment runs, never at compile time.
//!
//! Paired directives, for example `{% cache %} ... {% endcache %}`, register a
//! second compiler for the end marker.
//!
//! # Examples
//!
//! ```
//! use quill::directive::{Flow, Fragment};
//! use quill::Engine;
//!
//! let mut engine = Engine::new();
//! engine.add_directive("shout", |expr| {
//!     Ok(Fragment::call(expr, |ctx, args| {
//!         let text = args.get(0).and_then(|v| v.as_str()).unwrap_or_default();
//!         ctx.write_str(&text.to_uppercase())?;
//!         Ok(Flow::Continue)
//!     }))
//! });
//!
//! let result = engine.compile(r#"{% shout "hi" %}"#)?.render(()).to_string()?;
//! assert_eq!(result, "HI");
//! # Ok::<(), quill::Error>(())
//! ```

pub(crate) mod builtins;
pub(crate) mod cache;
pub(crate) mod localized;
pub(crate) mod paginate;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::context::{Request, Response};
use crate::render::RenderState;
use crate::store::Query;
use crate::types::span::Span;
use crate::{Engine, Result, Value};

/// A directive compiler function or closure.
pub type CompileFn = dyn Fn(&Expression) -> Result<Fragment> + Send + Sync + 'static;

/// A directive runtime function or closure.
pub type RuntimeFn = dyn Fn(&mut Context<'_>, Args) -> Result<Flow> + Send + Sync + 'static;

/// The table of directives known to an engine.
#[derive(Default)]
pub(crate) struct Registry {
    directives: BTreeMap<String, Definition>,
}

/// A registered directive.
#[derive(Clone)]
pub(crate) struct Definition {
    pub compile: Arc<CompileFn>,
    pub end: Option<Arc<CompileFn>>,
}

/// The raw expression of a directive occurrence.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    /// The expression text exactly as written in the template, without the
    /// directive name.
    pub raw: String,

    /// The region of the template source the expression was taken from.
    pub(crate) span: Span,

    /// Where the directive occurs.
    pub origin: Origin,
}

/// The location of a directive occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Origin {
    /// The template name, or a digest of the source for anonymous templates.
    pub identity: Arc<str>,
    /// 1-based line number.
    pub line: usize,
    /// 1-based column number.
    pub column: usize,
}

/// The executable code emitted for a directive occurrence.
pub struct Fragment {
    pub(crate) mode: Mode,
    pub(crate) span: Span,
    pub(crate) func: Arc<RuntimeFn>,
}

/// How the arguments of a directive are parsed and passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// A comma separated list of expressions, `"/login", 302`.
    Call,
    /// A comma separated list of bindings, `title = page.title, n = 3`.
    Assign,
    /// No arguments are allowed.
    Bare,
}

/// What the renderer should do after a directive has executed.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    /// Continue with the next instruction.
    Continue,
    /// Skip everything up to and including the matching end marker. Only
    /// meaningful for the start marker of a paired directive.
    Skip,
    /// Stop rendering, nothing else is written.
    Halt,
    /// Render the named engine template in place with the given globals.
    Include { name: String, globals: Value },
}

/// The evaluated arguments of a directive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    values: Vec<Value>,
    names: Vec<String>,
}

/// The render-local state available to a directive at render time.
pub struct Context<'a> {
    engine: &'a Engine,
    state: &'a mut RenderState,
    base: &'a mut (dyn fmt::Write + 'a),
    origin: &'a Origin,
}

impl Registry {
    /// Inserts a directive, replacing any previous one with the same name.
    pub fn register(&mut self, name: String, compile: Arc<CompileFn>, end: Option<Arc<CompileFn>>) {
        tracing::debug!(directive = %name, paired = end.is_some(), "registering directive");
        self.directives.insert(name, Definition { compile, end });
    }

    pub fn resolve(&self, name: &str) -> Option<&Definition> {
        self.directives.get(name)
    }

    /// Returns `true` if a paired directive is registered under `name`.
    pub fn is_paired(&self, name: &str) -> bool {
        self.resolve(name).map_or(false, |def| def.end.is_some())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.directives.keys().map(String::as_str)
    }
}

impl Expression {
    /// Returns `true` if the directive was written without an expression.
    pub fn is_empty(&self) -> bool {
        self.raw.trim().is_empty()
    }
}

impl Origin {
    /// Returns the identity of a template.
    pub(crate) fn identity(name: Option<&str>, source: &str) -> Arc<str> {
        match name {
            Some(name) => Arc::from(name),
            None => {
                let digest = Sha256::digest(source.as_bytes());
                Arc::from(hex::encode(&digest[..8]))
            }
        }
    }

    pub(crate) fn new(identity: Arc<str>, source: &str, offset: usize) -> Self {
        let before = &source[..offset];
        let line = before.matches('\n').count() + 1;
        let start = before.rfind('\n').map_or(0, |i| i + 1);
        let column = before[start..].chars().count() + 1;
        Self {
            identity,
            line,
            column,
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.identity, self.line, self.column)
    }
}

impl Fragment {
    /// Runs `f` with the comma separated expression list evaluated.
    pub fn call<F>(expr: &Expression, f: F) -> Self
    where
        F: Fn(&mut Context<'_>, Args) -> Result<Flow> + Send + Sync + 'static,
    {
        Self {
            mode: Mode::Call,
            span: expr.span,
            func: Arc::new(f),
        }
    }

    /// Runs `f` with the `name = expr` bindings evaluated.
    pub fn assign<F>(expr: &Expression, f: F) -> Self
    where
        F: Fn(&mut Context<'_>, Args) -> Result<Flow> + Send + Sync + 'static,
    {
        Self {
            mode: Mode::Assign,
            span: expr.span,
            func: Arc::new(f),
        }
    }

    /// Runs `f` without arguments.
    pub fn bare<F>(f: F) -> Self
    where
        F: Fn(&mut Context<'_>, Args) -> Result<Flow> + Send + Sync + 'static,
    {
        Self {
            mode: Mode::Bare,
            span: Span::empty(0),
            func: Arc::new(f),
        }
    }

    /// Returns the argument mode of the fragment.
    pub fn mode(&self) -> Mode {
        self.mode
    }
}

impl fmt::Debug for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fragment")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl Args {
    pub(crate) fn new(values: Vec<Value>, names: Vec<String>) -> Self {
        Self { values, names }
    }

    /// Returns the argument at the given position.
    pub fn get(&self, i: usize) -> Option<&Value> {
        self.values.get(i)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the positional arguments.
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Returns the `name = value` bindings of an [`Mode::Assign`] directive.
    pub fn bindings(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    pub fn into_bindings(self) -> impl Iterator<Item = (String, Value)> {
        self.names.into_iter().zip(self.values)
    }
}

impl<'a> Context<'a> {
    pub(crate) fn new(
        engine: &'a Engine,
        state: &'a mut RenderState,
        base: &'a mut (dyn fmt::Write + 'a),
        origin: &'a Origin,
    ) -> Self {
        Self {
            engine,
            state,
            base,
            origin,
        }
    }

    /// Writes to the innermost capture buffer, else to the render output.
    pub fn write_str(&mut self, s: &str) -> Result<()> {
        match self.state.captures.last_mut() {
            Some(buf) => buf.push_str(s),
            None => self.base.write_str(s)?,
        }
        Ok(())
    }

    /// The engine that is rendering.
    pub fn engine(&self) -> &'a Engine {
        self.engine
    }

    /// The ambient request of this render.
    pub fn request(&self) -> &Request {
        &self.state.request
    }

    /// The response produced by this render so far.
    pub fn response_mut(&mut self) -> &mut Response {
        &mut self.state.response
    }

    /// Where the executing directive occurs.
    pub fn origin(&self) -> &Origin {
        self.origin
    }

    /// Binds a render-local variable in the current template scope.
    pub fn set_local(&mut self, name: impl Into<String>, value: Value) {
        self.state.set_local(name.into(), value);
    }

    /// Returns the query attached to this render under `name`.
    pub fn query_mut(&mut self, name: &str) -> Option<&mut (dyn Query + 'static)> {
        self.state.queries.get_mut(name).map(|q| &mut **q)
    }

    /// Returns the identities of the open `cache` blocks, outermost first.
    pub fn cache_block_ids(&self) -> Vec<usize> {
        self.state.blocks.ids()
    }

    pub(crate) fn state_mut(&mut self) -> &mut RenderState {
        &mut *self.state
    }

    /// Starts capturing output into a new buffer.
    pub(crate) fn begin_capture(&mut self) {
        self.state.captures.push(String::new());
    }

    /// Stops the innermost capture and returns what was written to it.
    pub(crate) fn end_capture(&mut self) -> String {
        self.state.captures.pop().unwrap_or_default()
    }
}

/// Registers the directives every engine starts with.
pub(crate) fn register_builtins(registry: &mut Registry) {
    builtins::register(registry);
    cache::register(registry);
    localized::register(registry);
    paginate::register(registry);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_line_and_column() {
        let source = "a\nbc {% cache %}";
        let origin = Origin::new(Arc::from("page"), source, 5);
        assert_eq!((origin.line, origin.column), (2, 4));
        assert_eq!(origin.to_string(), "page:2:4");
    }

    #[test]
    fn anonymous_identity_is_stable() {
        let a = Origin::identity(None, "{% cache %}x{% endcache %}");
        let b = Origin::identity(None, "{% cache %}x{% endcache %}");
        let c = Origin::identity(None, "{% cache %}y{% endcache %}");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 16);
        assert_eq!(&*Origin::identity(Some("page"), "ignored"), "page");
    }

    #[test]
    fn registry_last_write_wins() {
        let mut registry = Registry::default();
        let first = builtins::compiler(|_| Ok(Fragment::bare(|_, _| Ok(Flow::Continue))));
        let second = builtins::compiler(|_| Ok(Fragment::bare(|_, _| Ok(Flow::Halt))));
        registry.register("x".into(), first, None);
        registry.register("x".into(), second.clone(), Some(second));
        assert!(registry.is_paired("x"));
        assert_eq!(registry.names().collect::<Vec<_>>(), ["x"]);
    }
}
