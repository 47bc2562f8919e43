use crate::types::ast;
use crate::types::span::Span;
use crate::value::ValueCow;
use crate::{Error, Result, Value};

impl ValueCow<'_> {
    pub fn as_bool(&self, source: &str, span: Span) -> Result<bool> {
        match &**self {
            Value::Bool(cond) => Ok(*cond),
            value => Err(Error::render(
                format!(
                    "expected bool, but expression evaluated to {}",
                    value.human()
                ),
                source,
                span,
            )),
        }
    }
}

/// Index the value with the remaining members of a path.
///
/// Optional access on a missing member evaluates to [`Value::None`].
pub fn lookup_path<'a>(
    source: &str,
    value: ValueCow<'a>,
    path: &[ast::Member],
) -> Result<ValueCow<'a>> {
    if path.is_empty() {
        return Ok(value);
    }
    match value {
        // If the value is borrowed we can return a reference with lifetime 'a
        ValueCow::Borrowed(v) => Ok(match index_path(source, v, path)? {
            Some(v) => ValueCow::Borrowed(v),
            None => ValueCow::Owned(Value::None),
        }),
        // Otherwise only clone the edge value that we lookup
        ValueCow::Owned(v) => Ok(ValueCow::Owned(
            index_path(source, &v, path)?.cloned().unwrap_or_default(),
        )),
    }
}

fn index_path<'a>(
    source: &str,
    mut value: &'a Value,
    path: &[ast::Member],
) -> Result<Option<&'a Value>> {
    for member in path {
        match index(source, value, member)? {
            Some(v) => value = v,
            None => return Ok(None),
        }
    }
    Ok(Some(value))
}

/// Index into the value with the given path member.
fn index<'a>(source: &str, value: &'a Value, member: &ast::Member) -> Result<Option<&'a Value>> {
    let optional = member.op == ast::AccessOp::Optional;
    let found = match (value, &member.access) {
        (Value::None, _) if optional => return Ok(None),
        (Value::List(list), ast::Access::Index(i)) => list.get(i.value),
        (Value::Map(map), ast::Access::Key(ident)) => map.get(&source[ident.span]),
        (Value::Map(map), ast::Access::Index(i)) => map.get(&i.value.to_string()),
        (Value::List(_), ast::Access::Key(_)) => {
            return Err(Error::render(
                "cannot index list with string",
                source,
                member.access.span(),
            ))
        }
        (value, _) => {
            return Err(Error::render(
                format!("cannot index into {}", value.human()),
                source,
                member.access.span(),
            ))
        }
    };
    match (found, &member.access) {
        (Some(v), _) => Ok(Some(v)),
        (None, _) if optional => Ok(None),
        (None, ast::Access::Index(i)) => Err(Error::render("index out of bounds", source, i.span)),
        (None, ast::Access::Key(k)) => Err(Error::render("not found in map", source, k.span)),
    }
}
