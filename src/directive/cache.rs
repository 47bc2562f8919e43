//! The `cache` and `endcache` directives.
//!
//! ```text
//! {% cache { key: "sidebar", global: true, duration: "1 hour" } %}
//!   ...
//! {% endcache %}
//! ```
//!
//! A block is bypassed when the request is a preview, carries a preview token,
//! when `if` is false or `unless` is true, or when the engine has no cache
//! store. Bypassed blocks always render their body and never touch the store.
//!
//! Otherwise the store is queried with the explicit key or a key derived from
//! the block location and options. On a hit the stored body is written and
//! the renderer skips to after `endcache`. On a miss the body output is
//! captured until `endcache`, stored and then written.

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};

use crate::directive::builtins::compiler;
use crate::directive::{Args, Context, Flow, Fragment, Origin, Registry};
use crate::store::CacheEntry;
use crate::value::Map;
use crate::{Error, Result, Value};

/// The open `cache` blocks of a single render.
#[derive(Debug, Default)]
pub(crate) struct BlockStack {
    next_id: usize,
    open: Vec<Block>,
}

#[derive(Debug)]
struct Block {
    id: usize,
    /// What to store at `endcache`, `None` if the block is bypassed.
    pending: Option<Pending>,
}

#[derive(Debug)]
struct Pending {
    key: String,
    global: bool,
    duration: Option<Duration>,
    expiration: Option<DateTime<Utc>>,
}

/// The parsed options map.
#[derive(Debug, PartialEq)]
struct Options {
    key: Option<String>,
    global: bool,
    duration: Option<Duration>,
    expiration: Option<DateTime<Utc>>,
    cond: bool,
    unless: bool,
    raw: Map<String, Value>,
}

pub(crate) fn register(registry: &mut Registry) {
    registry.register(
        "cache".to_owned(),
        compiler(|expr| Ok(Fragment::call(expr, start))),
        Some(compiler(|_| Ok(Fragment::bare(end)))),
    );
}

impl BlockStack {
    fn push(&mut self, pending: Option<Pending>) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        self.open.push(Block { id, pending });
        id
    }

    fn pop(&mut self) -> Option<Block> {
        self.open.pop()
    }

    /// Returns the identities of the open blocks, outermost first.
    pub fn ids(&self) -> Vec<usize> {
        self.open.iter().map(|b| b.id).collect()
    }
}

/// Executes the start marker.
fn start(ctx: &mut Context<'_>, args: Args) -> Result<Flow> {
    let options = Options::parse(args.get(0))?;
    let request = ctx.request();
    let store = ctx.engine().cache_store();
    let bypassed = request.preview
        || request.token.is_some()
        || !options.cond
        || options.unless
        || store.is_none();

    let store = match store {
        Some(store) if !bypassed => store,
        _ => {
            let id = ctx.state_mut().blocks.push(None);
            tracing::debug!(block = id, origin = %ctx.origin(), "cache bypassed");
            ctx.begin_capture();
            return Ok(Flow::Continue);
        }
    };

    let key = match options.key {
        Some(key) => key,
        None => derive_key(ctx.origin(), &options.raw)?,
    };
    if let Some(body) = store.get(&key, options.global).map_err(Error::store)? {
        tracing::debug!(%key, global = options.global, "cache hit");
        ctx.write_str(&body)?;
        return Ok(Flow::Skip);
    }

    tracing::debug!(%key, global = options.global, "cache miss");
    store.start(options.global).map_err(Error::store)?;
    let id = ctx.state_mut().blocks.push(Some(Pending {
        key,
        global: options.global,
        duration: options.duration,
        expiration: options.expiration,
    }));
    tracing::trace!(block = id, "buffering cache block");
    ctx.begin_capture();
    Ok(Flow::Continue)
}

/// Executes the end marker, the innermost open block is the matching one.
fn end(ctx: &mut Context<'_>, _: Args) -> Result<Flow> {
    let block = ctx
        .state_mut()
        .blocks
        .pop()
        .ok_or_else(|| Error::from("`endcache` without an open `cache` block"))?;
    let body = ctx.end_capture();
    if let Some(Pending {
        key,
        global,
        duration,
        expiration,
    }) = block.pending
    {
        if let Some(store) = ctx.engine().cache_store() {
            tracing::debug!(%key, global, block = block.id, "storing cache block");
            store
                .put(CacheEntry {
                    key,
                    global,
                    duration,
                    expiration,
                    body: body.clone(),
                })
                .map_err(Error::store)?;
        }
    }
    ctx.write_str(&body)?;
    Ok(Flow::Continue)
}

/// Derives a stable key from the block location and its evaluated options.
fn derive_key(origin: &Origin, options: &Map<String, Value>) -> Result<String> {
    let json = serde_json::to_string(options).map_err(Error::serialize)?;
    let mut hasher = Sha256::new();
    hasher.update(origin.identity.as_bytes());
    hasher.update(format!("|{}:{}|", origin.line, origin.column).as_bytes());
    hasher.update(json.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

impl Options {
    fn parse(value: Option<&Value>) -> Result<Self> {
        let raw = match value {
            None | Some(Value::None) => Map::new(),
            Some(Value::Map(map)) => map.clone(),
            Some(v) => {
                return Err(Error::invalid_arguments(format!(
                    "`cache` options must be a map, found {}",
                    v.human()
                )))
            }
        };
        let key = match raw.get("key") {
            None | Some(Value::None) => None,
            Some(Value::String(s)) if s.is_empty() => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Integer(n)) => Some(n.to_string()),
            Some(v) => {
                return Err(Error::invalid_arguments(format!(
                    "`cache` key must be a string, found {}",
                    v.human()
                )))
            }
        };
        let flag = |name: &str, default: bool| raw.get(name).map_or(default, Value::is_truthy);
        Ok(Self {
            key,
            global: flag("global", false),
            duration: raw.get("duration").map(parse_duration).transpose()?.flatten(),
            expiration: raw
                .get("expiration")
                .map(parse_expiration)
                .transpose()?
                .flatten(),
            cond: flag("if", true),
            unless: flag("unless", false),
            raw,
        })
    }
}

/// Parses a duration given as seconds or as a string like `"3 weeks"`.
fn parse_duration(value: &Value) -> Result<Option<Duration>> {
    let err = || {
        Error::invalid_arguments(format!(
            "`cache` duration must be seconds or a string like \"1 hour\", found {value:?}"
        ))
    };
    let seconds = match value {
        Value::None => return Ok(None),
        Value::Integer(n) => *n,
        Value::String(s) => {
            let s = s.trim();
            match s.split_once(char::is_whitespace) {
                None => s.parse().map_err(|_| err())?,
                Some((n, unit)) => {
                    let n: i64 = n.parse().map_err(|_| err())?;
                    let unit = match unit.trim().trim_end_matches('s') {
                        "second" | "sec" => 1,
                        "minute" | "min" => 60,
                        "hour" => 60 * 60,
                        "day" => 60 * 60 * 24,
                        "week" => 60 * 60 * 24 * 7,
                        "month" => 60 * 60 * 24 * 30,
                        "year" => 60 * 60 * 24 * 365,
                        _ => return Err(err()),
                    };
                    n.checked_mul(unit).ok_or_else(err)?
                }
            }
        }
        _ => return Err(err()),
    };
    Duration::try_seconds(seconds).map(Some).ok_or_else(err)
}

/// Parses an expiration given as an RFC 3339 string or a unix timestamp.
fn parse_expiration(value: &Value) -> Result<Option<DateTime<Utc>>> {
    let err = || {
        Error::invalid_arguments(format!(
            "`cache` expiration must be an RFC 3339 date or a unix timestamp, found {value:?}"
        ))
    };
    match value {
        Value::None => Ok(None),
        Value::Integer(n) => DateTime::<Utc>::from_timestamp(*n, 0).map(Some).ok_or_else(err),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|_| err()),
        _ => Err(err()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn origin(line: usize, column: usize) -> Origin {
        Origin {
            identity: Arc::from("page"),
            line,
            column,
        }
    }

    #[test]
    fn options_defaults() {
        let options = Options::parse(None).unwrap();
        assert_eq!(options.key, None);
        assert!(!options.global);
        assert!(options.cond);
        assert!(!options.unless);
        assert_eq!(options.duration, None);
        assert_eq!(options.expiration, None);
    }

    #[test]
    fn options_parse() {
        let value = Value::from([
            ("key", Value::from("nav")),
            ("global", Value::from(true)),
            ("duration", Value::from("2 hours")),
            ("expiration", Value::from("2030-01-01T00:00:00Z")),
            ("unless", Value::from(true)),
        ]);
        let options = Options::parse(Some(&value)).unwrap();
        assert_eq!(options.key.as_deref(), Some("nav"));
        assert!(options.global);
        assert!(options.unless);
        assert_eq!(options.duration, Some(Duration::hours(2)));
        assert_eq!(
            options.expiration.map(|e| e.timestamp()),
            Some(1_893_456_000)
        );
    }

    #[test]
    fn options_empty_key_is_derived() {
        let value = Value::from([("key", "")]);
        assert_eq!(Options::parse(Some(&value)).unwrap().key, None);
    }

    #[test]
    fn options_not_a_map() {
        let err = Options::parse(Some(&Value::from(1))).unwrap_err();
        assert_eq!(err.to_string(), "`cache` options must be a map, found integer");
    }

    #[test]
    fn duration_forms() {
        assert_eq!(
            parse_duration(&Value::from(90)).unwrap(),
            Some(Duration::seconds(90))
        );
        assert_eq!(
            parse_duration(&Value::from("3 weeks")).unwrap(),
            Some(Duration::weeks(3))
        );
        assert_eq!(
            parse_duration(&Value::from("1 minute")).unwrap(),
            Some(Duration::minutes(1))
        );
        assert!(parse_duration(&Value::from("soon")).is_err());
    }

    #[test]
    fn derived_key_is_stable() {
        let a = Value::from([("global", true)]);
        let a = a.as_map().unwrap();
        let key = derive_key(&origin(3, 1), a).unwrap();
        assert_eq!(key, derive_key(&origin(3, 1), a).unwrap());
        assert_eq!(key.len(), 64);
    }

    #[test]
    fn derived_key_depends_on_location_and_options() {
        let a = Value::from([("global", true)]);
        let b = Value::from([("global", false)]);
        let a = a.as_map().unwrap();
        let b = b.as_map().unwrap();
        let key = derive_key(&origin(3, 1), a).unwrap();
        assert_ne!(key, derive_key(&origin(3, 1), b).unwrap());
        assert_ne!(key, derive_key(&origin(4, 1), a).unwrap());
    }

    #[test]
    fn block_ids_are_distinct() {
        let mut blocks = BlockStack::default();
        blocks.push(None);
        blocks.push(None);
        assert_eq!(blocks.ids(), [0, 1]);
        blocks.pop();
        blocks.push(None);
        assert_eq!(blocks.ids(), [0, 2]);
    }
}
