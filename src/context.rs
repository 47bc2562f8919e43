//! The ambient request a template is rendered for, and the response it
//! produces.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{Result, Value};

/// The request a template is rendered for.
///
/// Directives read the locale, the current page, the preview signals and the
/// logged in user from here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Request {
    /// The current locale, empty when there is no locale prefix.
    pub locale: String,
    /// The current page number, usually taken from the query string.
    pub page: Option<i64>,
    /// Whether the request is a preview of unpublished content.
    pub preview: bool,
    /// The preview token, if one was supplied.
    pub token: Option<String>,
    /// The logged in user.
    pub user: Option<User>,
}

/// A logged in user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    pub id: String,
    pub admin: bool,
    pub permissions: BTreeSet<String>,
}

/// The response side effects of a render.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    headers: Vec<(String, String)>,
    redirect: Option<Redirect>,
}

/// A redirect issued by the `redirect` directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub url: String,
    pub status: u16,
}

/// The result of [`Renderer::to_response`][crate::Renderer::to_response].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub body: String,
    pub response: Response,
}

/// Renders the first existing view out of a list of candidates.
///
/// Configure one with
/// [`Engine::set_view_resolver`][crate::Engine::set_view_resolver] when views
/// live outside of the engine.
pub trait ViewResolver: Send + Sync {
    /// Renders the first candidate that exists with `data` as its globals.
    ///
    /// Returns an [`ErrorKind::ViewNotFound`][crate::ErrorKind::ViewNotFound]
    /// error when none of the candidates exist.
    fn render_first(&self, candidates: &[String], data: &Value) -> Result<String>;
}

impl Request {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    pub fn with_page(mut self, page: i64) -> Self {
        self.page = Some(page);
        self
    }

    pub fn with_preview(mut self, preview: bool) -> Self {
        self.preview = preview;
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_user(mut self, user: User) -> Self {
        self.user = Some(user);
        self
    }
}

impl User {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_admin(mut self, admin: bool) -> Self {
        self.admin = admin;
        self
    }

    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.insert(permission.into().to_lowercase());
        self
    }

    /// Returns `true` if the user is an admin or holds the permission.
    ///
    /// Permission names are compared case-insensitively.
    pub fn can(&self, permission: &str) -> bool {
        self.admin
            || self
                .permissions
                .iter()
                .any(|p| p.eq_ignore_ascii_case(permission))
    }
}

impl Response {
    /// Sets a header, replacing any earlier header with the same name.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .headers
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(&name))
        {
            Some(header) => *header = (name, value),
            None => self.headers.push((name, value)),
        }
    }

    /// Returns the value of a header, the name is case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns the headers in the order they were first set.
    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn redirect(&self) -> Option<&Redirect> {
        self.redirect.as_ref()
    }

    pub fn set_redirect(&mut self, url: impl Into<String>, status: u16) {
        self.redirect = Some(Redirect {
            url: url.into(),
            status,
        });
    }
}
