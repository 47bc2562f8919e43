use serde::Deserialize;

/// Engine settings.
///
/// Every field has a default so settings can be deserialized from a partial
/// document.
///
/// ```
/// let settings: quill::Settings = serde_json::from_str(r#"{ "defaultPageSize": 20 }"#)?;
/// assert_eq!(settings.default_page_size, 20);
/// assert_eq!(settings.results_key, "elements");
/// # Ok::<(), serde_json::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// The page size used by `paginate` when neither the config nor the query
    /// supply one.
    pub default_page_size: usize,

    /// The default binding name for the paginated rows.
    pub results_key: String,

    /// The default binding name for the page info.
    pub page_info_key: String,

    /// The flavor used by `markdown` when none is given.
    pub markdown_flavor: String,

    /// The maximum number of nested includes.
    pub max_include_depth: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_page_size: 100,
            results_key: "elements".into(),
            page_info_key: "pageInfo".into(),
            markdown_flavor: "original".into(),
            max_include_depth: 64,
        }
    }
}
