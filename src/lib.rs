//! A template engine with a pluggable directive compiler and fragment
//! caching.
//!
//! # Features
//!
//! ### Syntax
//!
//! - Expressions: `{{ entry.title }}`
//! - Conditionals: `{% if entry.enabled %} ... {% endif %}`
//! - Loops: `{% for entry in entries %} ... {% endfor %}`
//! - Nested templates: `{% include "nested" %}`
//! - Configurable delimiters: `<? entry.title ?>`, `(( if entry.enabled ))`
//! - Filter functions: `{{ entry.body | markdown: "gfm" }}`
//! - Directives: `{% header "Cache-Control: max-age=60" %}`
//!
//! ### Directives
//!
//! Directives are named tags whose compiler receives the raw expression and
//! returns the code to run at render time. The engine ships with
//!
//! - `set`, `header`, `redirect` and `markdown`
//! - the guards `requireLogin`, `requireGuest`, `requireAdmin` and
//!   `requirePermission`
//! - the conditional blocks `auth` and `guest`
//! - `includeLocalized` and `paginate`
//! - `cache` ... `endcache` fragment caching backed by a [`CacheStore`]
//!
//! See the [`directive`] module for how to add your own.
//!
//! # Getting started
//!
//! Your entry point is the [`Engine`] struct. The engine stores the syntax
//! config, directives, filter functions, collaborators and compiled templates.
//! Generally, you only need to construct one engine during the lifetime of a
//! program.
//!
//! ```
//! let engine = quill::Engine::new();
//! ```
//!
//! Next, [`.add_template`][Engine::add_template] is used to compile and store a
//! template in the engine.
//!
//! ```
//! # let mut engine = quill::Engine::new();
//! engine.add_template("hello", "Hello {{ user.name }}!")?;
//! # Ok::<(), quill::Error>(())
//! ```
//!
//! Finally, the template is rendered by fetching it using
//! [`.get_template`][Engine::get_template] and calling
//! [`.render`][TemplateRef::render].
//!
//! ```
//! use serde_json::json;
//!
//! # let mut engine = quill::Engine::new();
//! # engine.add_template("hello", "Hello {{ user.name }}!")?;
//! let template = engine.get_template("hello").unwrap();
//! let result = template.render(json!({ "user": { "name": "John Smith" } })).to_string()?;
//! assert_eq!(result, "Hello John Smith!");
//! # Ok::<(), quill::Error>(())
//! ```
//!
//! # Examples
//!
//! ### Cache a fragment
//!
//! ```
//! use std::sync::Arc;
//! use quill::{Engine, MemoryStore};
//!
//! let mut engine = Engine::new();
//! engine.set_cache_store(Arc::new(MemoryStore::new()));
//! engine.add_template("nav", r#"{% cache { key: "nav", global: true } %}{{ n }}{% endcache %}"#)?;
//!
//! let nav = engine.get_template("nav").unwrap();
//! assert_eq!(nav.render(serde_json::json!({ "n": 1 })).to_string()?, "1");
//! assert_eq!(nav.render(serde_json::json!({ "n": 2 })).to_string()?, "1");
//! # Ok::<(), quill::Error>(())
//! ```
//!
//! ### Observe the response
//!
//! ```
//! let rendered = quill::Engine::new()
//!     .compile(r#"{% header "X-Frame-Options: DENY" %}{% redirect "/login", 301 %}ignored"#)?
//!     .render(())
//!     .to_response()?;
//!
//! assert_eq!(rendered.body, "");
//! assert_eq!(rendered.response.header("x-frame-options"), Some("DENY"));
//! assert_eq!(rendered.response.redirect().map(|r| r.status), Some(301));
//! # Ok::<(), quill::Error>(())
//! ```
//!
//! ### Render a template using custom syntax
//!
//! ```
//! let syntax = quill::Syntax::builder().expr("<?", "?>").block("<%", "%>").build();
//!
//! let result = quill::Engine::with_syntax(syntax)
//!     .compile("Hello <? user.name ?>")?
//!     .render(serde_json::json!({ "user": { "name": "John Smith" } }))
//!     .to_string()?;
//!
//! assert_eq!(result, "Hello John Smith");
//! # Ok::<(), quill::Error>(())
//! ```
//!
//! ### Add and use a custom formatter
//!
//! ```
//! use std::fmt::Write;
//!
//! let mut engine = quill::Engine::new();
//! engine.add_formatter("debug", |f, value| {
//!     write!(f, "Value::{:?}", value)?;
//!     Ok(())
//! });
//!
//! let result = engine
//!     .compile("User age: {{ user.age | debug }}")?
//!     .render(serde_json::json!({ "user": { "age": 23 } }))
//!     .to_string()?;
//!
//! assert_eq!(result, "User age: Value::Integer(23)");
//! # Ok::<(), quill::Error>(())
//! ```

mod compile;
mod config;
mod context;
pub mod directive;
mod error;
mod filters;
pub mod fmt;
mod markdown;
mod render;
mod store;
mod types;
mod value;

use std::collections::BTreeMap;
use std::sync::Arc;

pub use crate::config::Settings;
pub use crate::context::{Redirect, Rendered, Request, Response, User, ViewResolver};
pub use crate::error::{BoxError, Error, ErrorKind, Result};
pub use crate::filters::FilterFn;
pub use crate::render::Renderer;
pub use crate::store::{CacheEntry, CacheStore, ListQuery, MemoryStore, Query};
pub use crate::types::syntax::{Syntax, SyntaxBuilder};
pub use crate::value::{to_value, Map, Value};

use crate::compile::Searcher;
use crate::directive::{Expression, Fragment, Registry};
use crate::fmt::{FormatFn, Formatter};
use crate::types::program;

/// The compilation and rendering engine.
///
/// The engine is [`Send`] and [`Sync`] so it can be shared between threads,
/// every render keeps its own state.
pub struct Engine {
    searcher: Searcher,
    pub(crate) registry: Registry,
    pub(crate) functions: BTreeMap<String, EngineFn>,
    pub(crate) default_formatter: Box<FormatFn>,
    pub(crate) shared: Map<String, Value>,
    cache_store: Option<Arc<dyn CacheStore>>,
    view_resolver: Option<Arc<dyn ViewResolver>>,
    settings: Settings,
    pub(crate) templates: BTreeMap<String, program::Template>,
}

pub(crate) enum EngineFn {
    Filter(Box<FilterFn>),
    Formatter(Box<FormatFn>),
}

/// A compiled template.
pub struct Template<'engine> {
    engine: &'engine Engine,
    template: program::Template,
}

/// A reference to a compiled template in an [`Engine`].
#[derive(Clone, Copy)]
pub struct TemplateRef<'engine> {
    engine: &'engine Engine,
    template: &'engine program::Template,
}

impl Default for Engine {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// Construct a new engine.
    #[inline]
    pub fn new() -> Self {
        Self::with_syntax(Syntax::default())
    }

    /// Construct a new engine with custom syntax.
    ///
    /// # Examples
    ///
    /// ```
    /// use quill::{Engine, Syntax};
    ///
    /// let syntax = Syntax::builder().expr("<{", "}>").block("<[", "]>").build();
    /// let engine = Engine::with_syntax(syntax);
    /// ```
    pub fn with_syntax(syntax: Syntax) -> Self {
        let mut registry = Registry::default();
        directive::register_builtins(&mut registry);
        let functions = filters::builtins()
            .into_iter()
            .map(|(name, f)| (name.to_owned(), EngineFn::Filter(f)))
            .collect();
        Self {
            searcher: Searcher::new(syntax),
            registry,
            functions,
            default_formatter: Box::new(fmt::default),
            shared: Map::new(),
            cache_store: None,
            view_resolver: None,
            settings: Settings::default(),
            templates: BTreeMap::new(),
        }
    }

    /// Replace the engine settings.
    ///
    /// ```
    /// use quill::{Engine, Settings};
    ///
    /// let settings = Settings { default_page_size: 20, ..Settings::default() };
    /// let engine = Engine::new().with_settings(settings);
    /// assert_eq!(engine.settings().default_page_size, 20);
    /// ```
    #[inline]
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Returns the engine settings.
    #[inline]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Add a directive.
    ///
    /// A directive with the same name is replaced. Templates that were
    /// compiled before keep the previous definition.
    pub fn add_directive<F>(&mut self, name: impl Into<String>, compile: F)
    where
        F: Fn(&Expression) -> Result<Fragment> + Send + Sync + 'static,
    {
        self.registry.register(name.into(), Arc::new(compile), None);
    }

    /// Add a paired directive closed by `end{name}`.
    ///
    /// ```
    /// use quill::directive::{Flow, Fragment};
    /// use quill::Engine;
    ///
    /// let mut engine = Engine::new();
    /// engine.add_block_directive(
    ///     "hidden",
    ///     |expr| Ok(Fragment::call(expr, |_, _| Ok(Flow::Skip))),
    ///     |_| Ok(Fragment::bare(|_, _| Ok(Flow::Continue))),
    /// );
    ///
    /// let result = engine.compile("a{% hidden %}b{% endhidden %}c")?.render(()).to_string()?;
    /// assert_eq!(result, "ac");
    /// # Ok::<(), quill::Error>(())
    /// ```
    pub fn add_block_directive<F, E>(&mut self, name: impl Into<String>, compile: F, end: E)
    where
        F: Fn(&Expression) -> Result<Fragment> + Send + Sync + 'static,
        E: Fn(&Expression) -> Result<Fragment> + Send + Sync + 'static,
    {
        self.registry
            .register(name.into(), Arc::new(compile), Some(Arc::new(end)));
    }

    /// Add a conditional block that renders its body only when the predicate
    /// returns `true` for the current request and the directive arguments.
    ///
    /// ```
    /// use quill::{Engine, Request, User};
    ///
    /// let mut engine = Engine::new();
    /// engine.add_condition("can", |request, args| {
    ///     let permission = args.first().and_then(|v| v.as_str()).unwrap_or_default();
    ///     request.user.as_ref().map_or(false, |u| u.can(permission))
    /// });
    ///
    /// let template = engine.compile(r#"{% can "publish" %}Publish{% endcan %}"#)?;
    /// let user = User::new("1").with_permission("publish");
    /// let result = template.render(()).with_request(Request::new().with_user(user)).to_string()?;
    /// assert_eq!(result, "Publish");
    /// # Ok::<(), quill::Error>(())
    /// ```
    pub fn add_condition<F>(&mut self, name: impl Into<String>, predicate: F)
    where
        F: Fn(&Request, &[Value]) -> bool + Send + Sync + 'static,
    {
        let (compile, end) = directive::builtins::condition(predicate);
        self.registry.register(name.into(), compile, Some(end));
    }

    /// Add a new filter to the engine.
    ///
    /// **Note:** filters and formatters share the same namespace.
    #[inline]
    pub fn add_filter<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&Value, &[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        self.functions
            .insert(name.into(), EngineFn::Filter(Box::new(f)));
    }

    /// Add a new value formatter to the engine.
    ///
    /// **Note:** filters and formatters share the same namespace.
    #[inline]
    pub fn add_formatter<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&mut Formatter<'_>, &Value) -> fmt::Result + Sync + Send + 'static,
    {
        self.functions
            .insert(name.into(), EngineFn::Formatter(Box::new(f)));
    }

    /// Set the default formatter.
    #[inline]
    pub fn set_default_formatter<F>(&mut self, f: F)
    where
        F: Fn(&mut Formatter<'_>, &Value) -> fmt::Result + Sync + Send + 'static,
    {
        self.default_formatter = Box::new(f);
    }

    /// Add a global value that is visible to every render.
    ///
    /// Render globals and local bindings shadow shared values.
    ///
    /// ```
    /// let mut engine = quill::Engine::new();
    /// engine.share("site", "Quill");
    /// let result = engine.compile("{{ site }}")?.render(()).to_string()?;
    /// assert_eq!(result, "Quill");
    /// # Ok::<(), quill::Error>(())
    /// ```
    #[inline]
    pub fn share(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.shared.insert(key.into(), value.into());
    }

    /// Set the store used by `cache` blocks.
    ///
    /// Without a store every `cache` block renders its body.
    #[inline]
    pub fn set_cache_store(&mut self, store: Arc<dyn CacheStore>) {
        self.cache_store = Some(store);
    }

    /// Returns the store used by `cache` blocks.
    #[inline]
    pub fn cache_store(&self) -> Option<&dyn CacheStore> {
        self.cache_store.as_deref()
    }

    /// Set the resolver used for first-match view resolution.
    ///
    /// Without a resolver views are looked up in the engine templates.
    #[inline]
    pub fn set_view_resolver(&mut self, resolver: Arc<dyn ViewResolver>) {
        self.view_resolver = Some(resolver);
    }

    /// Returns the resolver used for first-match view resolution.
    #[inline]
    pub fn view_resolver(&self) -> Option<&dyn ViewResolver> {
        self.view_resolver.as_deref()
    }

    /// Add a template to the engine.
    ///
    /// The template will be compiled and stored under the given name. Compile
    /// errors carry the template name.
    pub fn add_template<N, S>(&mut self, name: N, source: S) -> Result<()>
    where
        N: Into<String>,
        S: Into<String>,
    {
        let name = name.into();
        let template = compile::template(self, source.into(), Some(name.clone()))?;
        self.templates.insert(name, template);
        Ok(())
    }

    /// Lookup a template by name.
    #[inline]
    pub fn get_template(&self, name: &str) -> Option<TemplateRef<'_>> {
        self.templates.get(name).map(|template| TemplateRef {
            engine: self,
            template,
        })
    }

    /// Remove a template from the engine, returns `true` if it existed.
    #[inline]
    pub fn remove_template(&mut self, name: &str) -> bool {
        self.templates.remove(name).is_some()
    }

    /// Compile a template.
    ///
    /// The template will not be stored in the engine.
    #[inline]
    pub fn compile<S>(&self, source: S) -> Result<Template<'_>>
    where
        S: Into<String>,
    {
        let template = compile::template(self, source.into(), None)?;
        Ok(Template {
            engine: self,
            template,
        })
    }

    /// Renders the first of the candidate views that exists.
    ///
    /// The configured [`ViewResolver`] is used if there is one, otherwise the
    /// candidates are looked up in the engine templates.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorKind::ViewNotFound`] error when none of the
    /// candidates exist.
    pub fn render_first<S>(&self, candidates: &[String], data: S) -> Result<String>
    where
        S: serde::Serialize,
    {
        let data = to_value(data)?;
        tracing::debug!(?candidates, "resolving first view");
        if let Some(resolver) = self.view_resolver() {
            return resolver.render_first(candidates, &data);
        }
        match candidates.iter().find_map(|c| self.get_template(c)) {
            Some(template) => template.render_from(&data).to_string(),
            None => Err(Error::view_not_found(candidates.iter().cloned())),
        }
    }

    /// Renders `view` preferring the variant for the request locale.
    ///
    /// With the locale `en` the view `en.{view}` is tried before `{view}`.
    ///
    /// ```
    /// use quill::{Engine, Request};
    ///
    /// let mut engine = Engine::new();
    /// engine.add_template("meta", "default")?;
    /// engine.add_template("fr.meta", "français")?;
    ///
    /// let fr = engine.render_localized("meta", (), Request::new().with_locale("fr"))?;
    /// let en = engine.render_localized("meta", (), Request::new().with_locale("en"))?;
    /// assert_eq!((fr.body.as_str(), en.body.as_str()), ("français", "default"));
    /// # Ok::<(), quill::Error>(())
    /// ```
    pub fn render_localized<S>(&self, view: &str, data: S, request: Request) -> Result<Rendered>
    where
        S: serde::Serialize,
    {
        let candidates = directive::localized::candidates(&request.locale, view);
        if self.view_resolver.is_some() {
            let body = self.render_first(&candidates, data)?;
            return Ok(Rendered {
                body,
                response: Response::default(),
            });
        }
        tracing::debug!(?candidates, "resolving localized view");
        let data = to_value(data)?;
        match candidates.iter().find_map(|c| self.get_template(c)) {
            Some(template) => template
                .render_from(&data)
                .with_request(request)
                .to_response(),
            None => Err(Error::view_not_found(candidates)),
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("directives", &self.registry.names().collect::<Vec<_>>())
            .field("functions", &self.functions.keys())
            .field("shared", &self.shared)
            .field("settings", &self.settings)
            .field("templates", &self.templates.keys())
            .finish_non_exhaustive()
    }
}

impl<'engine> Template<'engine> {
    /// Returns a renderer for the template using the provided value as
    /// globals.
    #[inline]
    pub fn render<S>(&self, ctx: S) -> Renderer<'_>
    where
        S: serde::Serialize,
    {
        Renderer::with_serde(self.engine, &self.template, ctx)
    }

    /// Returns a renderer for the template using the provided [`Value`] as
    /// globals.
    #[inline]
    pub fn render_from<'render>(&'render self, ctx: &'render Value) -> Renderer<'render> {
        Renderer::with_value(self.engine, &self.template, ctx)
    }

    /// Returns the original template source.
    #[inline]
    pub fn source(&self) -> &str {
        &self.template.source
    }
}

impl std::fmt::Debug for Template<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Template")
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

impl<'engine> TemplateRef<'engine> {
    /// Returns a renderer for the template using the provided value as
    /// globals.
    #[inline]
    pub fn render<S>(&self, ctx: S) -> Renderer<'engine>
    where
        S: serde::Serialize,
    {
        Renderer::with_serde(self.engine, self.template, ctx)
    }

    /// Returns a renderer for the template using the provided [`Value`] as
    /// globals.
    #[inline]
    pub fn render_from<'render>(&self, ctx: &'render Value) -> Renderer<'render>
    where
        'engine: 'render,
    {
        Renderer::with_value(self.engine, self.template, ctx)
    }

    /// Returns the name the template is stored under.
    #[inline]
    pub fn name(&self) -> &'engine str {
        self.template.name.as_deref().unwrap_or_default()
    }

    /// Returns the original template source.
    #[inline]
    pub fn source(&self) -> &'engine str {
        &self.template.source
    }
}

impl std::fmt::Debug for TemplateRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateRef")
            .field("name", &self.name())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Engine>();
    }
}
