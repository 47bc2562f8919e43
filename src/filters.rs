//! Filter functions.
//!
//! A filter receives the piped value and the evaluated filter arguments.
//!
//! ```text
//! {{ entry.body | markdown: "gfm" }}
//! ```
//!
//! # Examples
//!
//! ```
//! use quill::{Engine, Error, Value};
//!
//! let mut engine = Engine::new();
//! engine.add_filter("repeat", |value, args| {
//!     let s = value.as_str().ok_or("expected string")?;
//!     let n = args.first().and_then(Value::as_integer).unwrap_or(2);
//!     Ok(Value::from(s.repeat(n.max(0) as usize)))
//! });
//!
//! let result = engine
//!     .compile(r#"{{ word | repeat: 3 }}"#)?
//!     .render(serde_json::json!({ "word": "ab" }))
//!     .to_string()?;
//! assert_eq!(result, "ababab");
//! # Ok::<(), Error>(())
//! ```

use crate::fmt::html_escape;
use crate::markdown::{self, Flavor};
use crate::{Error, Result, Value};

/// A filter function or closure.
pub type FilterFn = dyn Fn(&Value, &[Value]) -> Result<Value> + Send + Sync + 'static;

/// Returns the builtin filters.
pub(crate) fn builtins() -> Vec<(&'static str, Box<FilterFn>)> {
    vec![
        ("lower", Box::new(lower) as Box<FilterFn>),
        ("upper", Box::new(upper) as Box<FilterFn>),
        ("markdown", Box::new(markdown) as Box<FilterFn>),
        ("purify", Box::new(purify) as Box<FilterFn>),
    ]
}

/// Returns the lowercase equivalent of a string.
fn lower(value: &Value, args: &[Value]) -> Result<Value> {
    expect_args("lower", args, 0)?;
    Ok(Value::from(expect_str("lower", value)?.to_lowercase()))
}

/// Returns the uppercase equivalent of a string.
fn upper(value: &Value, args: &[Value]) -> Result<Value> {
    expect_args("upper", args, 0)?;
    Ok(Value::from(expect_str("upper", value)?.to_uppercase()))
}

/// Converts markdown to HTML.
///
/// ```text
/// {{ text | markdown }}
/// {{ text | markdown: "gfm", true }}
/// ```
///
/// The optional arguments are the flavor and whether to strip a single
/// wrapping paragraph. The output is not sanitized.
fn markdown(value: &Value, args: &[Value]) -> Result<Value> {
    expect_args("markdown", args, 2)?;
    let text = match value {
        Value::None => "",
        value => expect_str("markdown", value)?,
    };
    let flavor = match args.first() {
        None | Some(Value::None) => Flavor::Original,
        Some(Value::String(name)) => Flavor::parse(name)?,
        Some(v) => {
            return Err(Error::from(format!(
                "filter `markdown` expected string flavor, found {}",
                v.human()
            )))
        }
    };
    let inline_only = args.get(1).map_or(false, Value::is_truthy);
    Ok(Value::from(markdown::to_html(text, flavor, inline_only)))
}

/// Escapes HTML markup in a string.
fn purify(value: &Value, args: &[Value]) -> Result<Value> {
    expect_args("purify", args, 0)?;
    match value {
        Value::None => Ok(Value::from("")),
        value => Ok(Value::from(html_escape(expect_str("purify", value)?))),
    }
}

fn expect_args(name: &str, args: &[Value], max: usize) -> Result<()> {
    if args.len() > max {
        return Err(Error::from(format!(
            "filter `{name}` expected at most {max} argument(s), found {}",
            args.len()
        )));
    }
    Ok(())
}

fn expect_str<'a>(name: &str, value: &'a Value) -> Result<&'a str> {
    value.as_str().ok_or_else(|| {
        Error::from(format!(
            "filter `{name}` expected string, found {}",
            value.human()
        ))
    })
}
