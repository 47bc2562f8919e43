use std::cmp::max;
use std::fmt;
use std::io;
use std::sync::Arc;

#[cfg(feature = "unicode")]
use unicode_width::UnicodeWidthStr;

use crate::types::span::Span;

/// A convenient type alias for results in this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// A boxed error returned by external collaborators such as a cache store.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// An error that can occur during template compilation or rendering.
///
/// Use [`Error::kind`] to decide how to surface the error, for example an
/// [`ErrorKind::Unauthorized`] error usually maps to a `401` response.
#[derive(Clone)]
pub struct Error {
    reason: Reason,

    /// The template source and the region of it that caused the error.
    pretty: Option<(String, Span)>,

    /// The name of the template that caused the error.
    name: Option<String>,
}

/// The category of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The template source is invalid.
    Syntax,
    /// A value could not be rendered, e.g. an unknown variable.
    Render,
    /// A directive received missing or malformed arguments.
    InvalidArguments,
    /// A guard directive requires a logged in user.
    Unauthorized,
    /// A guard directive rejected the current user.
    Forbidden,
    /// None of the candidate views exist.
    ViewNotFound,
    /// A cache store or other collaborator failed.
    Store,
    /// Too many nested includes.
    MaxIncludeDepth,
    /// Writing the rendered output failed.
    Io,
    /// The render context could not be serialized.
    Serialize,
}

#[derive(Debug, Clone, thiserror::Error)]
enum Reason {
    #[error("{0}")]
    Syntax(String),

    #[error("{0}")]
    Render(String),

    #[error("{0}")]
    InvalidArguments(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("view not found, tried {}", .0.join(", "))]
    ViewNotFound(Vec<String>),

    #[error("store error: {0}")]
    Store(#[source] Arc<dyn std::error::Error + Send + Sync + 'static>),

    #[error("reached the maximum include depth ({0})")]
    MaxIncludeDepth(usize),

    #[error("io error: {0}")]
    Io(#[source] Arc<io::Error>),

    #[error("failed to serialize value: {0}")]
    Serialize(#[source] Arc<serde_json::Error>),
}

impl Error {
    fn new(reason: Reason) -> Self {
        Self {
            reason,
            pretty: None,
            name: None,
        }
    }

    /// Construct a new syntax error.
    pub(crate) fn syntax(msg: impl Into<String>, source: &str, span: impl Into<Span>) -> Self {
        Self::new(Reason::Syntax(msg.into())).enrich(source, span)
    }

    /// Construct a new render error.
    pub(crate) fn render(msg: impl Into<String>, source: &str, span: impl Into<Span>) -> Self {
        Self::new(Reason::Render(msg.into())).enrich(source, span)
    }

    /// Construct a render error from a value formatter error.
    pub(crate) fn format(err: crate::fmt::Error, source: &str, span: Span) -> Self {
        match err.message() {
            Some(msg) => Self::render(msg, source, span),
            None => Self::render("failed to format value", source, span),
        }
    }

    /// Construct a new error for when the include depth is exceeded.
    pub(crate) fn max_include_depth(max: usize) -> Self {
        Self::new(Reason::MaxIncludeDepth(max))
    }

    /// Construct a new error for a value that could not be serialized.
    pub(crate) fn serialize(err: serde_json::Error) -> Self {
        Self::new(Reason::Serialize(Arc::new(err)))
    }

    /// Construct a new error for missing or malformed directive arguments.
    pub fn invalid_arguments(msg: impl Into<String>) -> Self {
        Self::new(Reason::InvalidArguments(msg.into()))
    }

    /// Construct a new error for a guard that requires a logged in user.
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::new(Reason::Unauthorized(msg.into()))
    }

    /// Construct a new error for a guard that rejected the current user.
    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::new(Reason::Forbidden(msg.into()))
    }

    /// Construct a new error for when none of the candidate views exist.
    pub fn view_not_found<I, S>(candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Reason::ViewNotFound(
            candidates.into_iter().map(Into::into).collect(),
        ))
    }

    /// Construct a new error from a failing collaborator.
    pub fn store(err: impl Into<crate::BoxError>) -> Self {
        let err: crate::BoxError = err.into();
        Self::new(Reason::Store(Arc::from(err)))
    }

    /// Returns the category of this error.
    pub fn kind(&self) -> ErrorKind {
        match &self.reason {
            Reason::Syntax(_) => ErrorKind::Syntax,
            Reason::Render(_) => ErrorKind::Render,
            Reason::InvalidArguments(_) => ErrorKind::InvalidArguments,
            Reason::Unauthorized(_) => ErrorKind::Unauthorized,
            Reason::Forbidden(_) => ErrorKind::Forbidden,
            Reason::ViewNotFound(_) => ErrorKind::ViewNotFound,
            Reason::Store(_) => ErrorKind::Store,
            Reason::MaxIncludeDepth(_) => ErrorKind::MaxIncludeDepth,
            Reason::Io(_) => ErrorKind::Io,
            Reason::Serialize(_) => ErrorKind::Serialize,
        }
    }

    /// Returns the name of the template that caused the error, if known.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Attaches the source location, unless the error already has one.
    pub(crate) fn enrich(mut self, source: &str, span: impl Into<Span>) -> Self {
        if self.pretty.is_none() && !source.is_empty() {
            self.pretty = Some((source.to_owned(), span.into()));
        }
        self
    }

    /// Attaches the template name, unless the error already has one.
    pub(crate) fn with_template_name(mut self, name: String) -> Self {
        if self.name.is_none() {
            self.name = Some(name);
        }
        self
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::new(Reason::Io(Arc::new(err)))
    }
}

impl From<fmt::Error> for Error {
    fn from(_: fmt::Error) -> Self {
        Self::new(Reason::Render("failed to write output".into()))
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Self::new(Reason::Render(msg))
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Self::new(Reason::Render(msg.to_owned()))
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        std::error::Error::source(&self.reason)
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.pretty {
            Some((source, span)) => {
                fmt_pretty(&self.reason.to_string(), self.name(), source, *span, f)
            }
            None => write!(f, "{}", self.reason),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.pretty {
            Some((source, span)) => {
                if f.alternate() {
                    fmt_pretty(&self.reason.to_string(), self.name(), source, *span, f)
                } else {
                    write!(f, "{} between bytes {} and {}", self.reason, span.m, span.n)
                }
            }
            None => write!(f, "{}", self.reason),
        }
    }
}

fn fmt_pretty(
    msg: &str,
    name: Option<&str>,
    source: &str,
    span: Span,
    f: &mut fmt::Formatter<'_>,
) -> fmt::Result {
    let lines: Vec<_> = source.split_terminator('\n').collect();
    let (line, col) = to_line_col(&lines, span.m);
    let width = max(1, width(&source[span]));
    let code = lines.get(line).or(lines.last()).copied().unwrap_or_default();

    let num = (line + 1).to_string();
    let pad = num.len();
    let pipe = "|";
    let underline = "^".repeat(width);

    if let Some(name) = name {
        write!(f, "\n {0:pad$}--> {name}:{num}:{col}", "", col = col + 1)?;
    }

    write!(
        f,
        "\n \
        {0:pad$} {pipe}\n \
        {num:>} {pipe} {code}\n \
        {0:pad$} {pipe} {underline:>width$} {msg}\n",
        "",
        pad = pad,
        pipe = pipe,
        num = num,
        code = code,
        underline = underline,
        width = col + width,
        msg = msg
    )
}

fn to_line_col(lines: &[&str], offset: usize) -> (usize, usize) {
    let mut n = 0;
    for (i, line) in lines.iter().enumerate() {
        let len = line.len() + 1;
        if n + len > offset {
            return (i, width(&line[..offset - n]));
        }
        n += len;
    }
    (
        lines.len().saturating_sub(1),
        lines.last().map(|l| width(l)).unwrap_or(0),
    )
}

#[cfg(feature = "unicode")]
fn width(s: &str) -> usize {
    s.width()
}

#[cfg(not(feature = "unicode"))]
fn width(s: &str) -> usize {
    s.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_with_span() {
        let err = Error::syntax("unexpected keyword `in`", "{{ in }}", 3..5);
        assert_eq!(err.kind(), ErrorKind::Syntax);
        assert_eq!(
            err.to_string(),
            "unexpected keyword `in` between bytes 3 and 5"
        );
    }

    #[test]
    fn display_pretty_with_name() {
        let err = Error::syntax("unknown directive `nope`", "a\n{% nope %}", 5..9)
            .with_template_name("page".into());
        assert_eq!(
            format!("{err:#}"),
            "\n  --> page:2:4\n   |\n 2 | {% nope %}\n   |    ^^^^ unknown directive `nope`\n"
        );
    }

    #[test]
    fn enrich_keeps_first_span() {
        let err = Error::invalid_arguments("missing url")
            .enrich("{% redirect %}", 0..14)
            .enrich("other", 0..1);
        assert_eq!(err.kind(), ErrorKind::InvalidArguments);
        assert_eq!(err.to_string(), "missing url between bytes 0 and 14");
    }
}
