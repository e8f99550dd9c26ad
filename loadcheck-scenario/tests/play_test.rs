use loadcheck_core::{Credentials, ErrorKind, RunContext};
use loadcheck_http::HttpSettings;
use loadcheck_metrics::create_counters;
use loadcheck_pool::{SessionSettings, UserPool};
use loadcheck_runner::ScenarioContext;
use loadcheck_scenario::ScenarioSet;
use std::sync::Arc;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/html; charset=utf-8")
}

fn context(server: &MockServer) -> ScenarioContext {
    let pool = UserPool::seeded(
        vec![Credentials::new("alice", "s3cr3t-pw")],
        SessionSettings::default(),
        1,
    )
    .unwrap();
    let settings = HttpSettings::new(&server.uri()).unwrap();
    ScenarioContext::new(RunContext::new(), pool, create_counters(), Arc::new(settings))
}

async fn run_only_scenario(ctx: &ScenarioContext, yaml: &str) -> loadcheck_core::BenchResult<()> {
    let set = ScenarioSet::from_yaml(yaml).unwrap();
    let table = set.table();
    assert_eq!(table.len(), 1);
    let scenario = table.choose(&mut rand::thread_rng()).unwrap().clone();

    let mut lease = ctx.acquire().await.unwrap();
    scenario.run(ctx, &mut lease).await
}

#[tokio::test]
async fn test_login_post_and_read_back() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .and(body_string_contains("name=alice"))
        .and(body_string_contains("password=s3cr3t-pw"))
        .respond_with(
            ResponseTemplate::new(303)
                .insert_header("Location", "/")
                .insert_header("Set-Cookie", "sid=abc; Path=/"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .and(header("cookie", "sid=abc"))
        .respond_with(html(
            r#"<p class="greeting">alice</p><form><input name="csrf" value="tok-1"></form>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/notes"))
        .and(body_string_contains("csrf=tok-1"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/notes/7"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/notes/7"))
        .respond_with(html("<h1>first note</h1><ul><li>a</li><li>b</li></ul>"))
        .mount(&server)
        .await;

    let ctx = context(&server);
    let outcome = run_only_scenario(
        &ctx,
        r#"
scenarios:
  - name: post-note
    vars:
      title: first note
    steps:
      - method: POST
        path: /login
        label: login
        form: {name: "{{user.name}}", password: "{{user.secret}}"}
        expect_status: [302, 303]
        expect_location: "^/$"
      - path: /
        label: top page
        assert:
          - {selector: p.greeting, text: "{{user.name}}"}
        extract:
          csrf: "input[name=csrf]@value"
      - method: POST
        path: /notes
        form: {title: "{{title}}", csrf: "{{csrf}}"}
        capture_redirect: note
      - path: "{{note}}"
        metric: note
        assert:
          - {selector: h1, text: "{{title}}"}
          - {selector: li, count: 2}
"#,
    )
    .await;

    assert!(outcome.is_ok(), "{:?}", outcome);
    assert_eq!(ctx.counters().get("login-303"), 1);
    assert_eq!(ctx.counters().get("root-200"), 1);
    assert_eq!(ctx.counters().get("note-200"), 1);
}

#[tokio::test]
async fn test_failed_assertion_is_soft() {
    let server = MockServer::start().await;
    Mock::given(path("/"))
        .respond_with(html("<ul><li>only one</li></ul>"))
        .mount(&server)
        .await;

    let ctx = context(&server);
    let err = run_only_scenario(
        &ctx,
        r#"
scenarios:
  - name: list
    steps:
      - path: /
        label: listing
        assert: [{selector: li, count: 2}]
"#,
    )
    .await
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Check);
    assert_eq!(
        err.to_string(),
        "listing: expected 2 elements matching 'li', found 1"
    );
}

#[tokio::test]
async fn test_fatal_step_escalates() {
    let server = MockServer::start().await;
    Mock::given(path("/login"))
        .respond_with(ResponseTemplate::new(303).insert_header("Location", "/"))
        .mount(&server)
        .await;

    let ctx = context(&server);
    let err = run_only_scenario(
        &ctx,
        r#"
scenarios:
  - name: bad-login
    steps:
      - method: POST
        path: /login
        label: login with wrong password
        form: {name: "{{user.name}}", password: wrong}
        expect_status: 403
        fatal: true
"#,
    )
    .await
    .unwrap_err();

    assert!(err.is_fatal());
    assert_eq!(
        err.to_string(),
        "fatal: login with wrong password: expected 403, got 303"
    );
}

#[tokio::test]
async fn test_register_and_clear_session() {
    let server = MockServer::start().await;
    Mock::given(path("/signup"))
        .respond_with(ResponseTemplate::new(200).insert_header("Set-Cookie", "sid=new; Path=/"))
        .mount(&server)
        .await;
    Mock::given(path("/whoami"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let ctx = context(&server);
    let outcome = run_only_scenario(
        &ctx,
        r#"
scenarios:
  - name: signup
    vars:
      login: "user-{{random:10}}"
    steps:
      - method: POST
        path: /signup
        form: {name: "{{login}}", password: pw}
        expect_status: 200
      - register: {name: "{{login}}", secret: pw}
      - clear_session: true
      - path: /whoami
        expect_status: 401
"#,
    )
    .await;

    assert!(outcome.is_ok(), "{:?}", outcome);
    assert_eq!(ctx.pool().len(), 2);
    assert!(ctx.pool().names().iter().any(|n| n.starts_with("user-")));
}
