#![allow(clippy::wrong_self_convention)]

mod core;
mod iter;
mod stack;
mod value;

use std::collections::BTreeMap;
use std::io;

use crate::context::{Rendered, Request, Response};
use crate::directive::cache::BlockStack;
use crate::fmt::{Formatter, Writer};
use crate::render::core::RendererImpl;
use crate::render::stack::Stack;
use crate::store::Query;
use crate::types::program::Template;
use crate::value::{Map, ValueCow};
use crate::{Engine, Error, Result, Value};

/// A renderer that interprets a compiled [`Template`][crate::Template].
///
/// This struct is created by [`Template::render`][crate::Template::render] or
/// [`Template::render_from`][crate::Template::render_from] and friends.
///
/// ```
/// use quill::{Engine, Request, User};
///
/// let engine = Engine::new();
/// let template = engine.compile("{% auth %}Hi {{ name }}{% endauth %}")?;
/// let result = template
///     .render(serde_json::json!({ "name": "Ada" }))
///     .with_request(Request::new().with_user(User::new("1")))
///     .to_string()?;
/// assert_eq!(result, "Hi Ada");
/// # Ok::<(), quill::Error>(())
/// ```
#[must_use = "must call `.to_string()`, `.to_writer(..)` or `.to_response()` on the renderer"]
pub struct Renderer<'render> {
    engine: &'render Engine,
    template: &'render Template,
    globals: Globals<'render>,
    request: Request,
    queries: BTreeMap<String, Box<dyn Query>>,
    max_include_depth: Option<usize>,
}

enum Globals<'render> {
    Owned(Result<Value>),
    Borrowed(&'render Value),
}

/// The state of a single render that directives may read and modify.
///
/// It is never shared between renders.
#[derive(Default)]
pub(crate) struct RenderState {
    pub request: Request,
    pub response: Response,
    pub blocks: BlockStack,
    pub queries: BTreeMap<String, Box<dyn Query>>,
    /// Render-local bindings, one frame per template scope.
    pub locals: Vec<Map<String, Value>>,
    /// Open capture buffers, output goes to the innermost one.
    pub captures: Vec<String>,
}

impl RenderState {
    fn new(request: Request, queries: BTreeMap<String, Box<dyn Query>>) -> Self {
        Self {
            request,
            queries,
            locals: vec![Map::new()],
            ..Self::default()
        }
    }

    /// Binds a variable in the innermost frame.
    pub fn set_local(&mut self, name: String, value: Value) {
        match self.locals.last_mut() {
            Some(frame) => {
                frame.insert(name, value);
            }
            None => self.locals.push(Map::from([(name, value)])),
        }
    }

    pub fn push_frame(&mut self) -> usize {
        self.locals.push(Map::new());
        self.locals.len() - 1
    }

    pub fn pop_frame(&mut self) {
        self.locals.pop();
    }
}

impl<'render> Renderer<'render> {
    fn new(engine: &'render Engine, template: &'render Template, globals: Globals<'render>) -> Self {
        Self {
            engine,
            template,
            globals,
            request: Request::default(),
            queries: BTreeMap::new(),
            max_include_depth: None,
        }
    }

    pub(crate) fn with_serde<S>(engine: &'render Engine, template: &'render Template, globals: S) -> Self
    where
        S: serde::Serialize,
    {
        Self::new(engine, template, Globals::Owned(crate::to_value(globals)))
    }

    pub(crate) fn with_value(
        engine: &'render Engine,
        template: &'render Template,
        globals: &'render Value,
    ) -> Self {
        Self::new(engine, template, Globals::Borrowed(globals))
    }

    /// Set the ambient request of this render.
    ///
    /// Directives read the locale, page, preview flags and user from it.
    pub fn with_request(mut self, request: Request) -> Self {
        self.request = request;
        self
    }

    /// Attach a query that templates can paginate by name.
    ///
    /// ```
    /// use quill::{Engine, ListQuery};
    ///
    /// let engine = Engine::new();
    /// let result = engine
    ///     .compile(r#"{% paginate "posts", "items", "info", { pageSize: 2 } %}{{ info.totalPages }}"#)?
    ///     .render(())
    ///     .with_query("posts", ListQuery::new(vec![1.into(), 2.into(), 3.into()]))
    ///     .to_string()?;
    /// assert_eq!(result, "2");
    /// # Ok::<(), quill::Error>(())
    /// ```
    pub fn with_query<Q>(mut self, name: impl Into<String>, query: Q) -> Self
    where
        Q: Query + 'static,
    {
        self.queries.insert(name.into(), Box::new(query));
        self
    }

    /// Set the maximum length of the template render stack.
    ///
    /// This is the maximum number of nested `{% include ... %}` statements that
    /// are allowed during rendering, as counted from the root template.
    ///
    /// Defaults to the engine setting.
    pub fn with_max_include_depth(mut self, depth: usize) -> Self {
        self.max_include_depth = Some(depth);
        self
    }

    /// Render the template to a string.
    ///
    /// A redirect issued during the render is discarded, use
    /// [`to_response`][Renderer::to_response] to observe it.
    pub fn to_string(self) -> Result<String> {
        self.to_response().map(|rendered| rendered.body)
    }

    /// Render the template to a string along with the response produced by
    /// its directives.
    pub fn to_response(self) -> Result<Rendered> {
        let mut body = String::with_capacity(self.template.source.len());
        let response = self.render(&mut Formatter::with_string(&mut body))?;
        Ok(Rendered { body, response })
    }

    /// Render the template to the given writer.
    pub fn to_writer<W>(self, writer: W) -> Result<Response>
    where
        W: io::Write,
    {
        let mut w = Writer::new(writer);
        let result = {
            let mut f = Formatter::new(&mut w);
            self.render(&mut f)
        };
        result.map_err(|err| w.take_err().map(Error::from).unwrap_or(err))
    }

    fn render(self, f: &mut Formatter<'_>) -> Result<Response> {
        let Self {
            engine,
            template,
            globals,
            request,
            queries,
            max_include_depth,
        } = self;
        let max_include_depth =
            max_include_depth.unwrap_or(engine.settings().max_include_depth);

        let owned;
        let globals = match globals {
            Globals::Owned(result) => {
                owned = result?;
                &owned
            }
            Globals::Borrowed(value) => value,
        };

        tracing::trace!(template = template.name.as_deref(), "rendering");
        let state = RendererImpl {
            engine,
            state: RenderState::new(request, queries),
            stack: Stack::new(ValueCow::Borrowed(globals)),
        }
        .render(f, template, max_include_depth)?;
        Ok(state.response)
    }
}
