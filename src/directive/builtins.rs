//! The simple built-in directives.
//!
//! ```text
//! {% set title = entry.title | upper, count = 3 %}
//! {% header "Cache-Control: max-age=3600" %}
//! {% redirect "/login", 302 %}
//! {% requireLogin %}
//! {% requirePermission "publishEntries" %}
//! {% markdown entry.body, "gfm", { allowHtml: false } %}
//! {% auth %} ... {% endauth %}
//! ```

use std::sync::Arc;

use crate::context::Request;
use crate::directive::{Args, CompileFn, Context, Expression, Flow, Fragment, Registry};
use crate::markdown::{self, Flavor, Sanitizer};
use crate::{Error, Result, Value};

pub(crate) fn register(registry: &mut Registry) {
    let mut single = |name: &str, compile: Arc<CompileFn>| {
        registry.register(name.to_owned(), compile, None);
    };
    single("set", compiler(|expr| Ok(Fragment::assign(expr, set))));
    single("header", compiler(|expr| Ok(Fragment::call(expr, header))));
    single("redirect", compiler(|expr| Ok(Fragment::call(expr, redirect))));
    single("markdown", compiler(|expr| Ok(Fragment::call(expr, markdown))));
    single("requireLogin", compiler(|expr| Ok(Fragment::call(expr, require_login))));
    single("requireGuest", compiler(|expr| Ok(Fragment::call(expr, require_guest))));
    single("requireAdmin", compiler(|expr| Ok(Fragment::call(expr, require_admin))));
    single(
        "requirePermission",
        compiler(|expr| Ok(Fragment::call(expr, require_permission))),
    );

    let (compile, end) = condition(|request, _| request.user.is_some());
    registry.register("auth".to_owned(), compile, Some(end));
    let (compile, end) = condition(|request, _| request.user.is_none());
    registry.register("guest".to_owned(), compile, Some(end));
}

pub(crate) fn compiler<F>(f: F) -> Arc<CompileFn>
where
    F: Fn(&Expression) -> Result<Fragment> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Builds the start and end compilers of a conditional block.
pub(crate) fn condition<F>(predicate: F) -> (Arc<CompileFn>, Arc<CompileFn>)
where
    F: Fn(&Request, &[Value]) -> bool + Send + Sync + 'static,
{
    let predicate = Arc::new(predicate);
    let compile = compiler(move |expr| {
        let predicate = predicate.clone();
        Ok(Fragment::call(expr, move |ctx, args| {
            match predicate(ctx.request(), args.into_values().as_slice()) {
                true => Ok(Flow::Continue),
                false => Ok(Flow::Skip),
            }
        }))
    });
    let end = compiler(|_| Ok(Fragment::bare(|_, _| Ok(Flow::Continue))));
    (compile, end)
}

/// Binds render-local variables.
fn set(ctx: &mut Context<'_>, args: Args) -> Result<Flow> {
    for (name, value) in args.into_bindings() {
        ctx.set_local(name, value);
    }
    Ok(Flow::Continue)
}

/// Sets a single response header from a `Name: value` string.
fn header(ctx: &mut Context<'_>, args: Args) -> Result<Flow> {
    let line = match args.get(0) {
        Some(Value::String(s)) => s.as_str(),
        Some(v) => {
            return Err(Error::invalid_arguments(format!(
                "`header` expected a string argument, found {}",
                v.human()
            )))
        }
        None => return Err(Error::invalid_arguments("`header` requires an argument")),
    };
    let (name, value) = line.split_once(':').unwrap_or((line, ""));
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::invalid_arguments("`header` requires a header name"));
    }
    ctx.response_mut().set_header(name, value.trim());
    Ok(Flow::Continue)
}

/// Issues a redirect and ends the render.
fn redirect(ctx: &mut Context<'_>, args: Args) -> Result<Flow> {
    let url = match args.get(0) {
        Some(Value::String(url)) if !url.is_empty() => url.clone(),
        _ => {
            return Err(Error::invalid_arguments(
                "`redirect` requires a URL as the first argument",
            ))
        }
    };
    let status = match args.get(1) {
        None | Some(Value::None) => 302,
        Some(value) => status_code(value)?,
    };
    tracing::debug!(%url, status, origin = %ctx.origin(), "redirecting");
    ctx.response_mut().set_redirect(url, status);
    Ok(Flow::Halt)
}

fn status_code(value: &Value) -> Result<u16> {
    let n = match value {
        Value::Integer(n) => Some(*n),
        Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    n.and_then(|n| u16::try_from(n).ok())
        .filter(|n| (100..=999).contains(n))
        .ok_or_else(|| Error::invalid_arguments("`redirect` status code must be an integer"))
}

/// Converts markdown to sanitized HTML and writes it.
fn markdown(ctx: &mut Context<'_>, args: Args) -> Result<Flow> {
    let text = match args.get(0) {
        None | Some(Value::None) => "",
        Some(Value::String(s)) => s.as_str(),
        Some(v) => {
            return Err(Error::invalid_arguments(format!(
                "`markdown` expected a string, found {}",
                v.human()
            )))
        }
    };
    let flavor = match args.get(1) {
        None | Some(Value::None) => Flavor::parse(&ctx.engine().settings().markdown_flavor)?,
        Some(Value::String(name)) => Flavor::parse(name)?,
        Some(v) => {
            return Err(Error::invalid_arguments(format!(
                "`markdown` flavor must be a string, found {}",
                v.human()
            )))
        }
    };
    let sanitizer = Sanitizer::from_value(args.get(2).unwrap_or(&Value::None))?;
    let html = markdown::render(text, flavor, &sanitizer);
    ctx.write_str(&html)?;
    Ok(Flow::Continue)
}

fn require_login(ctx: &mut Context<'_>, _: Args) -> Result<Flow> {
    if ctx.request().user.is_none() {
        tracing::debug!(origin = %ctx.origin(), "login required");
        return Err(Error::unauthorized("Login required."));
    }
    Ok(Flow::Continue)
}

fn require_guest(ctx: &mut Context<'_>, _: Args) -> Result<Flow> {
    if ctx.request().user.is_some() {
        tracing::debug!(origin = %ctx.origin(), "guest access required");
        return Err(Error::forbidden("Guest access required."));
    }
    Ok(Flow::Continue)
}

fn require_admin(ctx: &mut Context<'_>, _: Args) -> Result<Flow> {
    if !ctx.request().user.as_ref().map_or(false, |u| u.admin) {
        tracing::debug!(origin = %ctx.origin(), "admin access required");
        return Err(Error::forbidden("Admin access required."));
    }
    Ok(Flow::Continue)
}

fn require_permission(ctx: &mut Context<'_>, args: Args) -> Result<Flow> {
    let permission = match args.get(0) {
        Some(Value::String(p)) => p,
        _ => {
            return Err(Error::invalid_arguments(
                "`requirePermission` requires a permission name",
            ))
        }
    };
    let user = ctx.request().user.as_ref();
    if !user.map_or(false, |u| u.can(permission)) {
        tracing::debug!(%permission, origin = %ctx.origin(), "insufficient permissions");
        return Err(Error::forbidden("Insufficient permissions."));
    }
    Ok(Flow::Continue)
}
