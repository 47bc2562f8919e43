use std::sync::Arc;

use quill::{Engine, ErrorKind, Redirect, Rendered, Request, Result, User, Value, ViewResolver};
use rstest::rstest;
use serde_json::json;

fn render(engine: &Engine, source: &str, data: serde_json::Value, request: Request) -> Result<Rendered> {
    engine
        .compile(source)?
        .render(data)
        .with_request(request)
        .to_response()
}

////////////////////////////////////////////////////////////////////////////////
// set
////////////////////////////////////////////////////////////////////////////////

#[test]
fn set_binds_locals() {
    let result = Engine::new()
        .compile(r#"{% set title = name | upper, n = 3 %}{{ title }} {{ n }}"#)
        .unwrap()
        .render(json!({ "name": "quill" }))
        .to_string()
        .unwrap();
    assert_eq!(result, "QUILL 3");
}

#[test]
fn set_shadows_globals_but_not_loop_vars() {
    let result = Engine::new()
        .compile("{% set x = 2 %}{{ x }}{% for x in [7] %}{{ x }}{% endfor %}{{ x }}")
        .unwrap()
        .render(json!({ "x": 1 }))
        .to_string()
        .unwrap();
    assert_eq!(result, "272");
}

#[test]
fn set_inside_loop_is_visible_after_it() {
    let result = Engine::new()
        .compile("{% for i in [1, 2, 3] %}{% set last = i %}{% endfor %}{{ last }}")
        .unwrap()
        .render(())
        .to_string()
        .unwrap();
    assert_eq!(result, "3");
}

#[test]
fn set_shares_the_frame_with_plain_includes() {
    let mut engine = Engine::new();
    engine
        .add_template("page", r#"{% include "partial" %}{{ title }}"#)
        .unwrap();
    engine
        .add_template("partial", r#"{% set title = "from partial" %}"#)
        .unwrap();
    let result = engine
        .get_template("page")
        .unwrap()
        .render(())
        .to_string()
        .unwrap();
    assert_eq!(result, "from partial");
}

#[test]
fn set_does_not_leak_out_of_include_with() {
    let mut engine = Engine::new();
    engine
        .add_template(
            "page",
            r#"{% set title = "page" %}{% include "partial" with {} %}{{ title }}"#,
        )
        .unwrap();
    engine
        .add_template("partial", r#"{% set title = "partial" %}{{ title }},"#)
        .unwrap();
    let result = engine
        .get_template("page")
        .unwrap()
        .render(())
        .to_string()
        .unwrap();
    assert_eq!(result, "partial,page");
}

#[test]
fn set_err_requires_assignments() {
    let err = Engine::new().compile(r#"{% set "x" %}"#).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Syntax);
}

////////////////////////////////////////////////////////////////////////////////
// header
////////////////////////////////////////////////////////////////////////////////

#[rstest]
#[case::simple(r#"{% header "X-Frame-Options: DENY" %}"#, "X-Frame-Options", "DENY")]
#[case::trimmed(r#"{% header "  Cache-Control :  max-age=3600 " %}"#, "Cache-Control", "max-age=3600")]
#[case::colon_in_value(r#"{% header "Link: <https://a.test>; rel=preload" %}"#, "Link", "<https://a.test>; rel=preload")]
#[case::no_value(r#"{% header "X-Empty" %}"#, "X-Empty", "")]
fn header_sets_response_header(#[case] source: &str, #[case] name: &str, #[case] value: &str) {
    let rendered = render(&Engine::new(), source, json!({}), Request::new()).unwrap();
    assert_eq!(rendered.body, "");
    assert_eq!(rendered.response.header(name), Some(value));
}

#[test]
fn header_replaces_earlier_value() {
    let rendered = render(
        &Engine::new(),
        r#"{% header "X-Mode: a" %}{% header line %}"#,
        json!({ "line": "x-mode: b" }),
        Request::new(),
    )
    .unwrap();
    assert_eq!(rendered.response.headers().collect::<Vec<_>>(), [("x-mode", "b")]);
}

#[rstest]
#[case::missing("{% header %}", "`header` requires an argument")]
#[case::not_string("{% header 1 %}", "`header` expected a string argument, found integer")]
#[case::no_name(r#"{% header ": value" %}"#, "`header` requires a header name")]
fn header_err_invalid_arguments(#[case] source: &str, #[case] msg: &str) {
    let err = render(&Engine::new(), source, json!({}), Request::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArguments);
    assert!(err.to_string().starts_with(msg), "{err}");
}

////////////////////////////////////////////////////////////////////////////////
// redirect
////////////////////////////////////////////////////////////////////////////////

#[rstest]
#[case::default_status(r#"{% redirect "/login" %}"#, 302)]
#[case::integer_status(r#"{% redirect "/login", 301 %}"#, 301)]
#[case::string_status(r#"{% redirect "/login", "301" %}"#, 301)]
#[case::none_status(r#"{% redirect "/login", none %}"#, 302)]
fn redirect_sets_response(#[case] source: &str, #[case] status: u16) {
    let rendered = render(&Engine::new(), source, json!({}), Request::new()).unwrap();
    assert_eq!(
        rendered.response.redirect(),
        Some(&Redirect {
            url: "/login".into(),
            status
        })
    );
}

#[test]
fn redirect_halts_render() {
    let rendered = render(
        &Engine::new(),
        r#"a{% redirect to %}b{{ missing }}"#,
        json!({ "to": "/elsewhere" }),
        Request::new(),
    )
    .unwrap();
    assert_eq!(rendered.body, "a");
    assert_eq!(rendered.response.redirect().unwrap().url, "/elsewhere");
}

#[test]
fn redirect_halts_render_from_included_template() {
    let mut engine = Engine::new();
    engine
        .add_template("page", r#"a{% include "guard" %}c"#)
        .unwrap();
    engine
        .add_template("guard", r#"b{% redirect "/login" %}x"#)
        .unwrap();
    let rendered = engine
        .get_template("page")
        .unwrap()
        .render(())
        .to_response()
        .unwrap();
    assert_eq!(rendered.body, "ab");
    assert_eq!(rendered.response.redirect().unwrap().status, 302);
}

#[test]
fn redirect_discards_cached_capture() {
    let rendered = render(
        &Engine::new(),
        r#"{% cache %}captured{% redirect "/a" %}{% endcache %}"#,
        json!({}),
        Request::new(),
    )
    .unwrap();
    assert_eq!(rendered.body, "");
}

#[rstest]
#[case::no_url("{% redirect %}", "`redirect` requires a URL as the first argument")]
#[case::empty_url(r#"{% redirect "" %}"#, "`redirect` requires a URL as the first argument")]
#[case::bad_status(r#"{% redirect "/a", "abc" %}"#, "`redirect` status code must be an integer")]
#[case::out_of_range(r#"{% redirect "/a", 70000 %}"#, "`redirect` status code must be an integer")]
fn redirect_err_invalid_arguments(#[case] source: &str, #[case] msg: &str) {
    let err = render(&Engine::new(), source, json!({}), Request::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArguments);
    assert!(err.to_string().starts_with(msg), "{err}");
}

////////////////////////////////////////////////////////////////////////////////
// guards
////////////////////////////////////////////////////////////////////////////////

#[rstest]
#[case::login_anonymous("{% requireLogin %}ok", None, Some((ErrorKind::Unauthorized, "Login required.")))]
#[case::login_user("{% requireLogin %}ok", Some(User::new("1")), None)]
#[case::guest_anonymous("{% requireGuest %}ok", None, None)]
#[case::guest_user("{% requireGuest %}ok", Some(User::new("1")), Some((ErrorKind::Forbidden, "Guest access required.")))]
#[case::admin_user("{% requireAdmin %}ok", Some(User::new("1")), Some((ErrorKind::Forbidden, "Admin access required.")))]
#[case::admin_anonymous("{% requireAdmin %}ok", None, Some((ErrorKind::Forbidden, "Admin access required.")))]
#[case::admin_admin("{% requireAdmin %}ok", Some(User::new("1").with_admin(true)), None)]
#[case::permission_missing(r#"{% requirePermission "publish" %}ok"#, Some(User::new("1")), Some((ErrorKind::Forbidden, "Insufficient permissions.")))]
#[case::permission_granted(r#"{% requirePermission "PUBLISH" %}ok"#, Some(User::new("1").with_permission("publish")), None)]
#[case::permission_admin(r#"{% requirePermission "publish" %}ok"#, Some(User::new("1").with_admin(true)), None)]
fn guards(
    #[case] source: &str,
    #[case] user: Option<User>,
    #[case] expected: Option<(ErrorKind, &str)>,
) {
    let request = Request {
        user,
        ..Request::default()
    };
    let result = render(&Engine::new(), source, json!({}), request);
    match expected {
        None => assert_eq!(result.unwrap().body, "ok"),
        Some((kind, msg)) => {
            let err = result.unwrap_err();
            assert_eq!(err.kind(), kind);
            assert!(err.to_string().starts_with(msg), "{err}");
        }
    }
}

#[test]
fn guard_err_points_at_directive() {
    let err = render(&Engine::new(), "a\n{% requireLogin %}", json!({}), Request::new())
        .unwrap_err();
    assert_eq!(
        format!("{:#}", err),
        "
   |
 2 | {% requireLogin %}
   | ^^^^^^^^^^^^^^^^^^ Login required.
"
    );
}

#[test]
fn require_permission_err_requires_name() {
    let err = render(&Engine::new(), "{% requirePermission %}", json!({}), Request::new())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArguments);
}

////////////////////////////////////////////////////////////////////////////////
// conditional blocks
////////////////////////////////////////////////////////////////////////////////

#[rstest]
#[case::anonymous(None, "[guest]")]
#[case::user(Some(User::new("1")), "[auth 1]")]
fn auth_and_guest_blocks(#[case] user: Option<User>, #[case] expected: &str) {
    let source = "[{% auth %}auth {{ id }}{% endauth %}{% guest %}guest{% endguest %}]";
    let request = Request {
        user,
        ..Request::default()
    };
    let rendered = render(&Engine::new(), source, json!({ "id": 1 }), request).unwrap();
    assert_eq!(rendered.body, expected);
}

#[test]
fn skipped_block_does_not_evaluate_body() {
    let rendered = render(
        &Engine::new(),
        "{% auth %}{{ missing.value }}{% redirect %}{% endauth %}ok",
        json!({}),
        Request::new(),
    )
    .unwrap();
    assert_eq!(rendered.body, "ok");
    assert_eq!(rendered.response.redirect(), None);
}

#[test]
fn add_condition_with_arguments() {
    let mut engine = Engine::new();
    engine.add_condition("can", |request, args| {
        let permission = args.first().and_then(Value::as_str).unwrap_or_default();
        request.user.as_ref().map_or(false, |u| u.can(permission))
    });
    let source = r#"{% can "publish" %}publish{% endcan %}{% can "delete" %}delete{% endcan %}"#;
    let request = Request::new().with_user(User::new("1").with_permission("publish"));
    let rendered = render(&engine, source, json!({}), request).unwrap();
    assert_eq!(rendered.body, "publish");
}

#[test]
fn add_block_directive_captures_body() {
    use quill::directive::{Flow, Fragment};

    let mut engine = Engine::new();
    engine.add_block_directive(
        "loud",
        |expr| {
            Ok(Fragment::call(expr, |ctx, _| {
                ctx.write_str("<")?;
                Ok(Flow::Continue)
            }))
        },
        |_| {
            Ok(Fragment::bare(|ctx, _| {
                ctx.write_str(">")?;
                Ok(Flow::Continue)
            }))
        },
    );
    let rendered = render(&engine, "{% loud %}{{ a }}{% endloud %}", json!({ "a": 1 }), Request::new())
        .unwrap();
    assert_eq!(rendered.body, "<1>");
}

////////////////////////////////////////////////////////////////////////////////
// markdown
////////////////////////////////////////////////////////////////////////////////

#[rstest]
#[case::default(
    "{% markdown body %}",
    "Hi <script>alert(1)</script>",
    "<p>Hi &lt;script&gt;alert(1)&lt;/script&gt;</p>\n"
)]
#[case::allow_html(
    "{% markdown body, none, { allowHtml: true } %}",
    "Hi <b>there</b>",
    "<p>Hi <b>there</b></p>\n"
)]
#[case::gfm_strikethrough(
    r#"{% markdown body, "gfm" %}"#,
    "~~old~~",
    "<p><del>old</del></p>\n"
)]
#[case::original_no_strikethrough(
    r#"{% markdown body, "original" %}"#,
    "~~old~~",
    "<p>~~old~~</p>\n"
)]
#[case::gfm_comment(r#"{% markdown body, "gfm-comment" %}"#, "a\nb", "<p>a<br />\nb</p>\n")]
#[case::schemes(
    r#"{% markdown body, none, { allowedSchemes: ["https"] } %}"#,
    "[a](mailto:x@y.test) [b](https://y.test)",
    "<p><a href=\"#\">a</a> <a href=\"https://y.test\">b</a></p>\n"
)]
#[case::none_body("{% markdown missing %}", "", "")]
fn markdown_directive(#[case] source: &str, #[case] body: &str, #[case] expected: &str) {
    let data = json!({ "body": body, "missing": null });
    let rendered = render(&Engine::new(), source, data, Request::new()).unwrap();
    assert_eq!(rendered.body, expected);
}

#[test]
fn markdown_directive_uses_configured_flavor() {
    let settings: quill::Settings =
        serde_json::from_value(json!({ "markdownFlavor": "gfm" })).unwrap();
    let engine = Engine::new().with_settings(settings);
    let rendered = render(&engine, "{% markdown body %}", json!({ "body": "~~x~~" }), Request::new())
        .unwrap();
    assert_eq!(rendered.body, "<p><del>x</del></p>\n");
}

#[rstest]
#[case::unknown_flavor(r#"{% markdown "x", "fancy" %}"#, "unknown markdown flavor `fancy`")]
#[case::not_string("{% markdown 1 %}", "`markdown` expected a string, found integer")]
#[case::bad_sanitizer(r#"{% markdown "x", none, 1 %}"#, "markdown sanitizer config must be a map, found integer")]
fn markdown_directive_err(#[case] source: &str, #[case] msg: &str) {
    let err = render(&Engine::new(), source, json!({}), Request::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArguments);
    assert!(err.to_string().starts_with(msg), "{err}");
}

////////////////////////////////////////////////////////////////////////////////
// includeLocalized
////////////////////////////////////////////////////////////////////////////////

fn localized_engine() -> Engine {
    let mut engine = Engine::new();
    engine.add_template("meta", "default {{ title }}").unwrap();
    engine.add_template("en.meta", "english {{ title }}").unwrap();
    engine
}

#[rstest]
#[case::locale_variant("en", "[english Home]")]
#[case::fallback("de", "[default Home]")]
#[case::no_locale("", "[default Home]")]
fn include_localized(#[case] locale: &str, #[case] expected: &str) {
    let rendered = render(
        &localized_engine(),
        r#"[{% includeLocalized "meta", { title: page.title } %}]"#,
        json!({ "page": { "title": "Home" } }),
        Request::new().with_locale(locale),
    )
    .unwrap();
    assert_eq!(rendered.body, expected);
}

#[test]
fn include_localized_list_form() {
    let rendered = render(
        &localized_engine(),
        r#"{% includeLocalized ["meta", { title: "List" }] %}"#,
        json!({}),
        Request::new().with_locale("en"),
    )
    .unwrap();
    assert_eq!(rendered.body, "english List");
}

#[test]
fn include_localized_is_a_boundary() {
    let rendered = render(
        &localized_engine(),
        r#"{% includeLocalized "meta" %}"#,
        json!({ "title": "outer" }),
        Request::new(),
    );
    let err = rendered.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Render);
    assert_eq!(err.name(), Some("meta"));
}

#[test]
fn include_localized_sees_shared_globals() {
    let mut engine = localized_engine();
    engine.share("title", "shared");
    let rendered = render(&engine, r#"{% includeLocalized "meta" %}"#, json!({}), Request::new())
        .unwrap();
    assert_eq!(rendered.body, "default shared");
}

#[test]
fn include_localized_err_view_not_found() {
    let err = render(
        &localized_engine(),
        r#"{% includeLocalized "nope" %}"#,
        json!({}),
        Request::new().with_locale("en"),
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ViewNotFound);
    assert!(
        err.to_string().starts_with("view not found, tried en.nope, nope"),
        "{err}"
    );
}

#[rstest]
#[case::no_args("{% includeLocalized %}", "`includeLocalized` requires a view name as the first argument")]
#[case::empty_name(r#"{% includeLocalized "" %}"#, "`includeLocalized` requires a view name as the first argument")]
#[case::bad_data(r#"{% includeLocalized "meta", 1 %}"#, "`includeLocalized` data must be a map, found integer")]
fn include_localized_err_invalid_arguments(#[case] source: &str, #[case] msg: &str) {
    let err = render(&localized_engine(), source, json!({}), Request::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArguments);
    assert!(err.to_string().starts_with(msg), "{err}");
}

struct EchoResolver;

impl ViewResolver for EchoResolver {
    fn render_first(&self, candidates: &[String], data: &Value) -> Result<String> {
        let title = data
            .as_map()
            .and_then(|m| m.get("title"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        Ok(format!("{} -> {}", candidates.join(" | "), title))
    }
}

#[test]
fn include_localized_with_view_resolver() {
    let mut engine = Engine::new();
    engine.set_view_resolver(Arc::new(EchoResolver));
    let rendered = render(
        &engine,
        r#"{% includeLocalized "meta", { title: "Hi" } %}"#,
        json!({}),
        Request::new().with_locale("fr"),
    )
    .unwrap();
    assert_eq!(rendered.body, "fr.meta | meta -> Hi");
}
