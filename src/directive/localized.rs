//! The `includeLocalized` directive.
//!
//! ```text
//! {% includeLocalized "meta", { title: entry.title } %}
//! ```
//!
//! With the request locale `en` this renders `en.meta` if it exists and
//! `meta` otherwise.

use crate::directive::builtins::compiler;
use crate::directive::{Args, Context, Flow, Fragment, Registry};
use crate::value::Map;
use crate::{Error, Result, Value};

pub(crate) fn register(registry: &mut Registry) {
    registry.register(
        "includeLocalized".to_owned(),
        compiler(|expr| Ok(Fragment::call(expr, include_localized))),
        None,
    );
}

/// Returns the views to try for `name`, most specific first.
pub(crate) fn candidates(locale: &str, name: &str) -> Vec<String> {
    match locale {
        "" => vec![name.to_owned()],
        locale => vec![format!("{locale}.{name}"), name.to_owned()],
    }
}

fn include_localized(ctx: &mut Context<'_>, args: Args) -> Result<Flow> {
    let (name, data) = split_args(args.into_values())?;
    let candidates = candidates(&ctx.request().locale, &name);
    tracing::debug!(?candidates, origin = %ctx.origin(), "resolving localized view");

    if let Some(resolver) = ctx.engine().view_resolver() {
        let body = resolver.render_first(&candidates, &data)?;
        ctx.write_str(&body)?;
        return Ok(Flow::Continue);
    }

    let engine = ctx.engine();
    match candidates
        .iter()
        .find(|c| engine.get_template(c).is_some())
    {
        Some(name) => Ok(Flow::Include {
            name: name.clone(),
            globals: data,
        }),
        None => Err(Error::view_not_found(candidates)),
    }
}

/// Accepts `name, data` and the single list form `[name, data]`.
fn split_args(values: Vec<Value>) -> Result<(String, Value)> {
    let mut values = match <[Value; 1]>::try_from(values) {
        Ok([Value::List(list)]) => list,
        Ok([value]) => vec![value],
        Err(values) => values,
    }
    .into_iter();

    let name = match values.next() {
        Some(Value::String(name)) if !name.is_empty() => name,
        _ => {
            return Err(Error::invalid_arguments(
                "`includeLocalized` requires a view name as the first argument",
            ))
        }
    };
    let data = match values.next() {
        None | Some(Value::None) => Value::Map(Map::new()),
        Some(data @ Value::Map(_)) => data,
        Some(v) => {
            return Err(Error::invalid_arguments(format!(
                "`includeLocalized` data must be a map, found {}",
                v.human()
            )))
        }
    };
    if values.next().is_some() {
        return Err(Error::invalid_arguments(
            "`includeLocalized` takes at most two arguments",
        ));
    }
    Ok((name, data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidates_with_locale() {
        assert_eq!(candidates("en", "meta"), ["en.meta", "meta"]);
        assert_eq!(candidates("", "meta"), ["meta"]);
    }

    #[test]
    fn split_args_forms() {
        let data = Value::from([("x", 1)]);
        let (name, got) = split_args(vec![Value::from("meta"), data.clone()]).unwrap();
        assert_eq!((name.as_str(), &got), ("meta", &data));

        let list = Value::from(vec![Value::from("meta"), data.clone()]);
        let (name, got) = split_args(vec![list]).unwrap();
        assert_eq!((name.as_str(), &got), ("meta", &data));

        let (_, got) = split_args(vec![Value::from("meta")]).unwrap();
        assert_eq!(got, Value::Map(Map::new()));
    }

    #[test]
    fn split_args_requires_name() {
        let err = split_args(Vec::new()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "`includeLocalized` requires a view name as the first argument"
        );
        assert!(split_args(vec![Value::from("a"), Value::from(1)]).is_err());
    }
}
