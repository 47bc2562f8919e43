//! Markdown conversion shared by the `markdown` directive and filter.

use pulldown_cmark::{html, CowStr, Event, Options, Parser, Tag};

use crate::{Error, Result, Value};

/// A markdown dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flavor {
    Original,
    Gfm,
    GfmComment,
    Extra,
    PreEncode,
}

/// Controls what survives in the generated HTML.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Sanitizer {
    allow_html: bool,
    /// `None` keeps every link.
    allowed_schemes: Option<Vec<String>>,
}

impl Flavor {
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "original" => Ok(Self::Original),
            "gfm" => Ok(Self::Gfm),
            "gfm-comment" => Ok(Self::GfmComment),
            "extra" => Ok(Self::Extra),
            "pre-encode" => Ok(Self::PreEncode),
            _ => Err(Error::invalid_arguments(format!(
                "unknown markdown flavor `{name}`"
            ))),
        }
    }

    fn options(self) -> Options {
        match self {
            Self::Original | Self::PreEncode => Options::empty(),
            Self::Gfm | Self::GfmComment => {
                Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS
            }
            Self::Extra => {
                Options::ENABLE_TABLES
                    | Options::ENABLE_FOOTNOTES
                    | Options::ENABLE_HEADING_ATTRIBUTES
            }
        }
    }
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self {
            allow_html: false,
            allowed_schemes: Some(vec!["http".into(), "https".into(), "mailto".into()]),
        }
    }
}

impl Sanitizer {
    /// Builds a sanitizer from the config map passed to the directive.
    pub fn from_value(config: &Value) -> Result<Self> {
        let mut sanitizer = Self::default();
        let map = match config {
            Value::None => return Ok(sanitizer),
            Value::Map(map) => map,
            value => {
                return Err(Error::invalid_arguments(format!(
                    "markdown sanitizer config must be a map, found {}",
                    value.human()
                )))
            }
        };
        if let Some(allow) = map.get("allowHtml") {
            sanitizer.allow_html = allow.is_truthy();
        }
        if let Some(schemes) = map.get("allowedSchemes") {
            sanitizer.allowed_schemes = match schemes {
                Value::List(list) => Some(
                    list.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_ascii_lowercase)
                        .collect(),
                ),
                _ => {
                    return Err(Error::invalid_arguments(
                        "`allowedSchemes` must be a list of strings",
                    ))
                }
            };
        }
        Ok(sanitizer)
    }

    /// A sanitizer that keeps raw HTML and every link.
    fn permissive() -> Self {
        Self {
            allow_html: true,
            allowed_schemes: None,
        }
    }

    fn allows_url(&self, url: &str) -> bool {
        match (scheme(url), &self.allowed_schemes) {
            (None, _) | (_, None) => true,
            (Some(s), Some(allowed)) => allowed.iter().any(|a| a.eq_ignore_ascii_case(s)),
        }
    }
}

/// Converts markdown to HTML and sanitizes the result.
pub(crate) fn render(text: &str, flavor: Flavor, sanitizer: &Sanitizer) -> String {
    let allow_html = sanitizer.allow_html && flavor != Flavor::PreEncode;
    let events = Parser::new_ext(text, flavor.options()).map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) if !allow_html => Event::Text(raw),
        Event::SoftBreak if flavor == Flavor::GfmComment => Event::HardBreak,
        Event::Start(Tag::Link {
            link_type,
            dest_url,
            title,
            id,
        }) => Event::Start(Tag::Link {
            link_type,
            dest_url: clean_url(sanitizer, dest_url),
            title,
            id,
        }),
        Event::Start(Tag::Image {
            link_type,
            dest_url,
            title,
            id,
        }) => Event::Start(Tag::Image {
            link_type,
            dest_url: clean_url(sanitizer, dest_url),
            title,
            id,
        }),
        event => event,
    });
    let mut out = String::with_capacity(text.len() * 3 / 2);
    html::push_html(&mut out, events);
    out
}

/// Converts markdown to HTML without sanitizing, unless the flavor encodes
/// raw HTML itself.
///
/// With `inline_only` a single wrapping paragraph is removed.
pub(crate) fn to_html(text: &str, flavor: Flavor, inline_only: bool) -> String {
    let html = render(text, flavor, &Sanitizer::permissive());
    if !inline_only {
        return html;
    }
    let trimmed = html.trim_end();
    match trimmed
        .strip_prefix("<p>")
        .and_then(|s| s.strip_suffix("</p>"))
    {
        Some(inner) if !inner.contains("<p>") => inner.to_owned(),
        _ => html,
    }
}

fn clean_url<'a>(sanitizer: &Sanitizer, url: CowStr<'a>) -> CowStr<'a> {
    if sanitizer.allows_url(&url) {
        url
    } else {
        tracing::trace!(url = %url, "removing disallowed link");
        CowStr::Borrowed("#")
    }
}

/// Returns the scheme of an absolute URL.
fn scheme(url: &str) -> Option<&str> {
    let end = url.find(':')?;
    let scheme = &url[..end];
    let valid = scheme
        .chars()
        .next()
        .map_or(false, |c| c.is_ascii_alphabetic())
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid.then_some(scheme)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_raw_html_by_default() {
        let html = render(
            "Hi <script>alert(1)</script>",
            Flavor::Original,
            &Sanitizer::default(),
        );
        assert_eq!(html, "<p>Hi &lt;script&gt;alert(1)&lt;/script&gt;</p>\n");
    }

    #[test]
    fn allows_html_when_configured() {
        let config = Value::from([("allowHtml", true)]);
        let html = render(
            "Hi <b>there</b>",
            Flavor::Original,
            &Sanitizer::from_value(&config).unwrap(),
        );
        assert_eq!(html, "<p>Hi <b>there</b></p>\n");
    }

    #[test]
    fn pre_encode_always_escapes() {
        let config = Value::from([("allowHtml", true)]);
        let html = render(
            "<b>x</b>",
            Flavor::PreEncode,
            &Sanitizer::from_value(&config).unwrap(),
        );
        assert_eq!(html, "<p>&lt;b&gt;x&lt;/b&gt;</p>\n");
    }

    #[test]
    fn disallowed_schemes_are_replaced() {
        let html = render(
            "[a](javascript:alert(1)) [b](https://example.com) [c](/relative)",
            Flavor::Original,
            &Sanitizer::default(),
        );
        assert_eq!(
            html,
            "<p><a href=\"#\">a</a> <a href=\"https://example.com\">b</a> <a href=\"/relative\">c</a></p>\n"
        );
    }

    #[test]
    fn gfm_comment_hard_breaks() {
        let html = render("a\nb", Flavor::GfmComment, &Sanitizer::default());
        assert_eq!(html, "<p>a<br />\nb</p>\n");
    }

    #[test]
    fn inline_only() {
        assert_eq!(to_html("*hi*", Flavor::Original, true), "<em>hi</em>");
        assert_eq!(to_html("*hi*", Flavor::Original, false), "<p><em>hi</em></p>\n");
    }

    #[test]
    fn unknown_flavor() {
        let err = Flavor::parse("fancy").unwrap_err();
        assert_eq!(err.to_string(), "unknown markdown flavor `fancy`");
    }
}
