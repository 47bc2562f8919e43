//! The `paginate` directive.
//!
//! ```text
//! {% paginate "entries", "items", "info", { pageSize: 10 } %}
//! {% for item in items %} ... {% endfor %}
//! Page {{ info.currentPage }} of {{ info.totalPages }}
//! ```
//!
//! The first argument names a query attached to the render with
//! [`Renderer::with_query`][crate::Renderer::with_query], or is a list that is
//! paginated in memory.

use serde::Serialize;

use crate::directive::builtins::compiler;
use crate::directive::{Args, Context, Flow, Fragment, Registry};
use crate::store::{ListQuery, Query};
use crate::value::Map;
use crate::{to_value, Error, Result, Value};

/// The resolved pagination config.
#[derive(Debug, Default, PartialEq)]
struct Config {
    page_size: Option<usize>,
    current_page: Option<i64>,
    /// Options passed through to the page info.
    extra: Map<String, Value>,
}

/// The page metadata bound next to the results.
#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    total: usize,
    page_size: usize,
    current_page: i64,
    total_pages: i64,
    first: usize,
    last: usize,
    prev_page: Option<i64>,
    next_page: Option<i64>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

const RESERVED: &[&str] = &[
    "total",
    "pageSize",
    "currentPage",
    "totalPages",
    "first",
    "last",
    "prevPage",
    "nextPage",
];

pub(crate) fn register(registry: &mut Registry) {
    registry.register(
        "paginate".to_owned(),
        compiler(|expr| Ok(Fragment::call(expr, paginate))),
        None,
    );
}

fn paginate(ctx: &mut Context<'_>, args: Args) -> Result<Flow> {
    let settings = ctx.engine().settings();
    let mut args = args.into_values().into_iter();
    let source = args.next().unwrap_or_default();
    let results_key = binding(args.next(), &settings.results_key)?;
    let info_key = binding(args.next(), &settings.page_info_key)?;
    let config = Config::parse(args.next().unwrap_or_default())?;
    let requested_page = ctx.request().page;

    let (results, info) = match source {
        Value::String(name) if !name.is_empty() => {
            let query = ctx.query_mut(&name).ok_or_else(|| {
                Error::invalid_arguments(format!("no query named `{name}` is attached"))
            })?;
            run(query, config, requested_page, settings.default_page_size)?
        }
        Value::List(rows) => {
            let mut query = ListQuery::new(rows);
            run(&mut query, config, requested_page, settings.default_page_size)?
        }
        _ => {
            return Err(Error::invalid_arguments(
                "`paginate` requires a query as the first argument",
            ))
        }
    };

    tracing::debug!(
        total = info.total,
        page = info.current_page,
        size = info.page_size,
        "paginated query"
    );
    ctx.set_local(results_key, Value::List(results));
    ctx.set_local(info_key, to_value(info)?);
    Ok(Flow::Continue)
}

/// Paginates the query.
///
/// The page size is the configured one, else the query limit, else the
/// default. The limit is cleared before slicing.
fn run(
    query: &mut dyn Query,
    config: Config,
    requested_page: Option<i64>,
    default_page_size: usize,
) -> Result<(Vec<Value>, PageInfo)> {
    let page_size = config
        .page_size
        .or_else(|| query.limit())
        .unwrap_or(default_page_size)
        .max(1);
    query.set_limit(None);

    let total = query.count().map_err(Error::store)?;
    let total_pages = i64::try_from(total.div_ceil(page_size).max(1)).unwrap_or(i64::MAX);
    let current_page = config
        .current_page
        .or(requested_page)
        .unwrap_or(1)
        .clamp(1, total_pages);

    let offset = usize::try_from(current_page - 1)
        .unwrap_or(0)
        .saturating_mul(page_size);
    let results = query.slice(offset, page_size).map_err(Error::store)?;
    let (first, last) = match results.len() {
        0 => (0, 0),
        n => (offset + 1, offset + n),
    };

    let info = PageInfo {
        total,
        page_size,
        current_page,
        total_pages,
        first,
        last,
        prev_page: (current_page > 1).then(|| current_page - 1),
        next_page: (current_page < total_pages).then(|| current_page + 1),
        extra: config.extra,
    };
    Ok((results, info))
}

fn binding(value: Option<Value>, default: &str) -> Result<String> {
    match value {
        None | Some(Value::None) => Ok(default.to_owned()),
        Some(Value::String(s)) if !s.is_empty() => Ok(s),
        Some(v) => Err(Error::invalid_arguments(format!(
            "`paginate` binding names must be strings, found {}",
            v.human()
        ))),
    }
}

impl Config {
    fn parse(value: Value) -> Result<Self> {
        let mut map = match value {
            Value::None => return Ok(Self::default()),
            Value::Map(map) => map,
            v => {
                return Err(Error::invalid_arguments(format!(
                    "`paginate` config must be a map, found {}",
                    v.human()
                )))
            }
        };

        let page_size = match map.remove("pageSize") {
            None | Some(Value::None) => None,
            Some(v) => Some(positive(&v).ok_or_else(|| {
                Error::invalid_arguments("`pageSize` must be a positive integer")
            })?),
        };
        let current_page = match map.remove("currentPage") {
            None | Some(Value::None) => None,
            Some(v) => Some(
                positive(&v)
                    .and_then(|n| i64::try_from(n).ok())
                    .ok_or_else(|| {
                        Error::invalid_arguments("`currentPage` must be a positive integer")
                    })?,
            ),
        };
        map.retain(|k, _| !RESERVED.contains(&k.as_str()));

        Ok(Self {
            page_size,
            current_page,
            extra: map,
        })
    }
}

fn positive(value: &Value) -> Option<usize> {
    let n = match value {
        Value::Integer(n) => *n,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    usize::try_from(n).ok().filter(|n| *n > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(n: i64) -> ListQuery {
        ListQuery::new((0..n).map(Value::from).collect())
    }

    fn config(page_size: Option<usize>, current_page: Option<i64>) -> Config {
        Config {
            page_size,
            current_page,
            ..Config::default()
        }
    }

    #[test]
    fn second_page_of_twenty_five() {
        let (results, info) = run(&mut rows(25), config(Some(10), Some(2)), None, 100).unwrap();
        assert_eq!(results, (10..20).map(Value::from).collect::<Vec<_>>());
        assert_eq!(info.total, 25);
        assert_eq!(info.total_pages, 3);
        assert_eq!((info.first, info.last), (11, 20));
        assert_eq!((info.prev_page, info.next_page), (Some(1), Some(3)));
    }

    #[test]
    fn page_size_falls_back_to_query_limit_then_default() {
        let mut query = rows(25).with_limit(5);
        let (results, info) = run(&mut query, Config::default(), None, 100).unwrap();
        assert_eq!(info.page_size, 5);
        assert_eq!(results.len(), 5);
        assert_eq!(query.limit(), None);

        let (_, info) = run(&mut rows(25), Config::default(), None, 100).unwrap();
        assert_eq!(info.page_size, 100);
        assert_eq!(info.total_pages, 1);
    }

    #[test]
    fn current_page_from_request_and_clamped() {
        let (_, info) = run(&mut rows(25), config(Some(10), None), Some(3), 100).unwrap();
        assert_eq!(info.current_page, 3);
        assert_eq!((info.first, info.last), (21, 25));
        assert_eq!(info.next_page, None);

        let (_, info) = run(&mut rows(25), config(Some(10), Some(9)), None, 100).unwrap();
        assert_eq!(info.current_page, 3);
    }

    #[test]
    fn empty_query() {
        let (results, info) = run(&mut rows(0), Config::default(), None, 100).unwrap();
        assert!(results.is_empty());
        assert_eq!((info.total, info.total_pages), (0, 1));
        assert_eq!((info.first, info.last), (0, 0));
    }

    #[test]
    fn config_passes_through_extra_options() {
        let value = Value::from([
            ("pageSize", Value::from(10)),
            ("pageTrigger", Value::from("p")),
            ("total", Value::from(1)),
        ]);
        let config = Config::parse(value).unwrap();
        assert_eq!(config.page_size, Some(10));
        assert_eq!(
            config.extra,
            Map::from([("pageTrigger".to_owned(), Value::from("p"))])
        );
    }

    #[test]
    fn config_rejects_bad_page_size() {
        let err = Config::parse(Value::from([("pageSize", 0)])).unwrap_err();
        assert_eq!(err.to_string(), "`pageSize` must be a positive integer");
    }
}
