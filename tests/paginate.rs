use quill::{Engine, ErrorKind, ListQuery, Request, Settings, Value};
use rstest::rstest;
use serde_json::json;

fn rows(n: i64) -> ListQuery {
    ListQuery::new((1..=n).map(Value::from).collect())
}

const SUMMARY: &str = "{% for row in elements %}{{ row }},{% endfor %}\
    |{{ pageInfo.total }}|{{ pageInfo.pageSize }}\
    |{{ pageInfo.currentPage }}/{{ pageInfo.totalPages }}\
    |{{ pageInfo.first }}-{{ pageInfo.last }}\
    |{{ pageInfo.prevPage }}<>{{ pageInfo.nextPage }}";

#[test]
fn paginate_named_query() {
    let source = format!(r#"{{% paginate "posts", none, none, {{ pageSize: 10, currentPage: 2 }} %}}{SUMMARY}"#);
    let result = Engine::new()
        .compile(source)
        .unwrap()
        .render(())
        .with_query("posts", rows(25))
        .to_string()
        .unwrap();
    assert_eq!(
        result,
        "11,12,13,14,15,16,17,18,19,20,|25|10|2/3|11-20|1<>3"
    );
}

#[rstest]
#[case::first_page(Some(1), "1,2,3,4,5,|12|5|1/3|1-5|<>2")]
#[case::last_page(Some(3), "11,12,|12|5|3/3|11-12|2<>")]
#[case::clamped_high(Some(9), "11,12,|12|5|3/3|11-12|2<>")]
#[case::clamped_low(Some(-4), "1,2,3,4,5,|12|5|1/3|1-5|<>2")]
#[case::no_page(None, "1,2,3,4,5,|12|5|1/3|1-5|<>2")]
fn paginate_page_from_request(#[case] page: Option<i64>, #[case] expected: &str) {
    let source = format!(r#"{{% paginate "posts", none, none, {{ pageSize: 5 }} %}}{SUMMARY}"#);
    let request = Request {
        page,
        ..Request::default()
    };
    let result = Engine::new()
        .compile(source)
        .unwrap()
        .render(())
        .with_request(request)
        .with_query("posts", rows(12))
        .to_string()
        .unwrap();
    assert_eq!(result, expected);
}

#[test]
fn paginate_config_page_overrides_request() {
    let result = Engine::new()
        .compile(r#"{% paginate "posts", "items", "info", { pageSize: 5, currentPage: "2" } %}{{ info.currentPage }}"#)
        .unwrap()
        .render(())
        .with_request(Request::new().with_page(3))
        .with_query("posts", rows(12))
        .to_string()
        .unwrap();
    assert_eq!(result, "2");
}

#[test]
fn paginate_page_size_from_query_limit() {
    let result = Engine::new()
        .compile(r#"{% paginate "posts", "items", "info" %}{{ info.pageSize }} {{ info.totalPages }}"#)
        .unwrap()
        .render(())
        .with_query("posts", rows(12).with_limit(4))
        .to_string()
        .unwrap();
    assert_eq!(result, "4 3");
}

#[test]
fn paginate_page_size_from_settings() {
    let settings: Settings = serde_json::from_value(json!({
        "defaultPageSize": 3,
        "resultsKey": "rows",
        "pageInfoKey": "meta",
    }))
    .unwrap();
    let result = Engine::new()
        .with_settings(settings)
        .compile(r#"{% paginate "posts" %}{% for r in rows %}{{ r }}{% endfor %} {{ meta.totalPages }}"#)
        .unwrap()
        .render(())
        .with_query("posts", rows(7))
        .to_string()
        .unwrap();
    assert_eq!(result, "123 3");
}

#[test]
fn paginate_literal_list() {
    let result = Engine::new()
        .compile(r#"{% paginate items, "page", "info", { pageSize: 2 } %}{% for x in page %}{{ x }}{% endfor %}/{{ info.totalPages }}"#)
        .unwrap()
        .render(json!({ "items": ["a", "b", "c"] }))
        .with_request(Request::new().with_page(2))
        .to_string()
        .unwrap();
    assert_eq!(result, "c/2");
}

#[test]
fn paginate_empty_query() {
    let source = format!(r#"{{% paginate "posts" %}}{SUMMARY}"#);
    let result = Engine::new()
        .compile(source)
        .unwrap()
        .render(())
        .with_query("posts", ListQuery::default())
        .to_string()
        .unwrap();
    assert_eq!(result, "|0|100|1/1|0-0|<>");
}

#[test]
fn paginate_extra_options_are_passed_through() {
    let result = Engine::new()
        .compile(r#"{% paginate "posts", "items", "info", { pageSize: 5, anchor: "top", total: 1 } %}{{ info.anchor }} {{ info.total }}"#)
        .unwrap()
        .render(())
        .with_query("posts", rows(12))
        .to_string()
        .unwrap();
    assert_eq!(result, "top 12");
}

#[test]
fn paginate_bindings_are_render_local() {
    let mut engine = Engine::new();
    engine
        .add_template("list", r#"{% include "pager" %}{{ info.currentPage }}"#)
        .unwrap();
    engine
        .add_template("pager", r#"{% paginate "posts", "items", "info", { pageSize: 5 } %}"#)
        .unwrap();
    let template = engine.get_template("list").unwrap();
    let result = template
        .render(())
        .with_request(Request::new().with_page(2))
        .with_query("posts", rows(12))
        .to_string()
        .unwrap();
    assert_eq!(result, "2");

    // Another render does not see the bindings of the first one.
    let err = engine
        .compile("{{ info }}")
        .unwrap()
        .render(())
        .to_string()
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Render);
}

#[rstest]
#[case::unknown_query(r#"{% paginate "nope" %}"#, "no query named `nope` is attached")]
#[case::not_a_query("{% paginate 1 %}", "`paginate` requires a query as the first argument")]
#[case::no_args("{% paginate %}", "`paginate` requires a query as the first argument")]
#[case::bad_binding(r#"{% paginate "posts", 1 %}"#, "`paginate` binding names must be strings, found integer")]
#[case::bad_config(r#"{% paginate "posts", none, none, 1 %}"#, "`paginate` config must be a map, found integer")]
#[case::bad_page_size(r#"{% paginate "posts", none, none, { pageSize: 0 } %}"#, "`pageSize` must be a positive integer")]
#[case::bad_current_page(r#"{% paginate "posts", none, none, { currentPage: "x" } %}"#, "`currentPage` must be a positive integer")]
fn paginate_err_invalid_arguments(#[case] source: &str, #[case] msg: &str) {
    let err = Engine::new()
        .compile(source)
        .unwrap()
        .render(())
        .with_query("posts", rows(3))
        .to_string()
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArguments);
    assert!(err.to_string().starts_with(msg), "{err}");
}
