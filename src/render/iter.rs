use std::slice;
use std::vec;

use crate::types::ast;
use crate::types::span::Span;
use crate::value::{btree_map, ValueCow};
use crate::{Error, Result, Value};

#[cfg_attr(internal_debug, derive(Debug))]
pub enum LoopState<'render> {
    ListBorrowed {
        item: &'render ast::Ident,
        iter: slice::Iter<'render, Value>,
        value: Option<&'render Value>,
    },
    ListOwned {
        item: &'render ast::Ident,
        iter: vec::IntoIter<Value>,
        value: Option<Value>,
    },
    MapBorrowed {
        kv: &'render ast::KeyValue,
        iter: btree_map::Iter<'render, String, Value>,
        value: Option<(&'render String, &'render Value)>,
    },
    MapOwned {
        kv: &'render ast::KeyValue,
        iter: btree_map::IntoIter<String, Value>,
        value: Option<(String, Value)>,
    },
}

impl<'render> LoopState<'render> {
    pub fn new(
        source: &str,
        vars: &'render ast::LoopVars,
        iterable: ValueCow<'render>,
        span: Span,
    ) -> Result<Self> {
        let human = iterable.human();
        let err = || {
            Error::render(
                format!("expected iterable, but expression evaluated to {human}"),
                source,
                span,
            )
        };

        let unpack_list_item = |vars: &'render ast::LoopVars| match vars {
            ast::LoopVars::Item(item) => Ok(item),
            ast::LoopVars::KeyValue(kv) => Err(Error::render(
                "cannot unpack list item into two variables",
                source,
                kv.span,
            )),
        };

        let unpack_map_item = |vars: &'render ast::LoopVars| match vars {
            ast::LoopVars::Item(item) => Err(Error::render(
                "cannot unpack map item into one variable",
                source,
                item.span,
            )),
            ast::LoopVars::KeyValue(kv) => Ok(kv),
        };

        match iterable {
            ValueCow::Borrowed(Value::List(list)) => Ok(Self::ListBorrowed {
                item: unpack_list_item(vars)?,
                iter: list.iter(),
                value: None,
            }),
            ValueCow::Borrowed(Value::Map(map)) => Ok(Self::MapBorrowed {
                kv: unpack_map_item(vars)?,
                iter: map.iter(),
                value: None,
            }),
            ValueCow::Owned(Value::List(list)) => Ok(Self::ListOwned {
                item: unpack_list_item(vars)?,
                iter: list.into_iter(),
                value: None,
            }),
            ValueCow::Owned(Value::Map(map)) => Ok(Self::MapOwned {
                kv: unpack_map_item(vars)?,
                iter: map.into_iter(),
                value: None,
            }),
            _ => Err(err()),
        }
    }

    /// Advances the loop, returns `None` when it is exhausted.
    pub fn iterate(&mut self) -> Option<()> {
        match self {
            Self::ListBorrowed { iter, value, .. } => {
                *value = Some(iter.next()?);
            }
            Self::ListOwned { iter, value, .. } => {
                *value = Some(iter.next()?);
            }
            Self::MapBorrowed { iter, value, .. } => {
                *value = Some(iter.next()?);
            }
            Self::MapOwned { iter, value, .. } => {
                *value = Some(iter.next()?);
            }
        }
        Some(())
    }

    /// Returns the value of the loop variable `name` if it is one.
    pub fn resolve(&self, source: &str, name: &str) -> Option<ValueCow<'render>> {
        match self {
            Self::ListBorrowed {
                item,
                value: Some(value),
                ..
            } if &source[item.span] == name => Some(ValueCow::Borrowed(*value)),

            Self::ListOwned {
                item,
                value: Some(value),
                ..
            } if &source[item.span] == name => Some(ValueCow::Owned(value.clone())),

            Self::MapBorrowed {
                kv,
                value: Some((key, _)),
                ..
            } if &source[kv.key.span] == name => {
                Some(ValueCow::Owned(Value::String((*key).clone())))
            }

            Self::MapOwned {
                kv,
                value: Some((key, _)),
                ..
            } if &source[kv.key.span] == name => Some(ValueCow::Owned(Value::String(key.clone()))),

            Self::MapBorrowed {
                kv,
                value: Some((_, value)),
                ..
            } if &source[kv.value.span] == name => Some(ValueCow::Borrowed(*value)),

            Self::MapOwned {
                kv,
                value: Some((_, value)),
                ..
            } if &source[kv.value.span] == name => Some(ValueCow::Owned(value.clone())),

            _ => None,
        }
    }
}
