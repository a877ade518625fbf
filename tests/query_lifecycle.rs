// Integration tests for read consumers against the mock transport

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use snap_query::prelude::*;
use snap_query::transport::mock::MockTransport;
use tokio::sync::watch;
use tokio::time::{Duration, timeout};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct Todo {
    #[serde(rename = "userId")]
    user_id: u32,
    id: u32,
    title: String,
    completed: bool,
}

const TEMPLATE: &str = "https://jsonplaceholder.typicode.com/todos/:id";

fn todo_one() -> Todo {
    Todo {
        user_id: 1,
        id: 1,
        title: "delectus aut autem".to_string(),
        completed: false,
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn setup() -> (MockTransport, QueryHook<Todo>) {
    init_tracing();
    let mock = MockTransport::new();
    let client = Arc::new(QueryClient::new(mock.clone()));
    let hook = QueryHook::new(client, TEMPLATE, QueryHookOptions::default());
    (mock, hook)
}

async fn next_settled(rx: &mut watch::Receiver<FetchState<Todo>>) -> color_eyre::Result<FetchState<Todo>> {
    let state = timeout(Duration::from_secs(1), rx.wait_for(|s| !s.is_loading()))
        .await??
        .clone();
    Ok(state)
}

#[tokio::test]
async fn test_todo_fetch_goes_idle_loading_success() -> color_eyre::Result<()> {
    let (mock, hook) = setup();
    mock.respond(
        "https://jsonplaceholder.typicode.com/todos/1",
        Ok(json!({ "userId": 1, "id": 1, "title": "delectus aut autem", "completed": false })),
    );

    let handle = hook.mount(QueryParams::new().path("id", 1));
    let mut rx = handle.watch();
    assert_eq!(*rx.borrow_and_update(), FetchState::Loading { previous_data: None });

    let state = next_settled(&mut rx).await?;
    assert_eq!(state, FetchState::Success { data: todo_one() });
    assert!(state.is_fetched());
    assert_eq!(mock.call_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_todo_fetch_transport_failure() -> color_eyre::Result<()> {
    let (mock, hook) = setup();
    mock.respond(
        "https://jsonplaceholder.typicode.com/todos/1",
        Err(TransportError::Network("network".to_string())),
    );

    let handle = hook.mount(QueryParams::new().path("id", 1));
    let state = next_settled(&mut handle.watch()).await?;

    assert!(state.is_error());
    assert_eq!(
        state.error(),
        Some(&FetchError::Transport(TransportError::Network("network".to_string())))
    );
    assert_eq!(state.data(), None);
    Ok(())
}

#[tokio::test]
async fn test_out_of_order_responses_keep_newest() -> color_eyre::Result<()> {
    let (mock, hook) = setup();
    let first = mock.hold("https://jsonplaceholder.typicode.com/todos/1");
    let second = mock.hold("https://jsonplaceholder.typicode.com/todos/1");

    let handle = hook.mount(QueryParams::new().path("id", 1));
    tokio::task::yield_now().await;
    let refreshed = handle.refresh();
    tokio::task::yield_now().await;

    second.resolve(Ok(json!({ "userId": 1, "id": 1, "title": "new", "completed": true })));
    let _ = first.resolve(Ok(json!({ "userId": 1, "id": 1, "title": "old", "completed": false })));

    let state = timeout(Duration::from_secs(1), refreshed).await?;
    assert_eq!(state.data().map(|todo| todo.title.as_str()), Some("new"));

    tokio::task::yield_now().await;
    assert_eq!(handle.state().data().map(|todo| todo.title.as_str()), Some("new"));
    Ok(())
}

#[tokio::test]
async fn test_cancelled_attempt_never_settles() {
    let (mock, hook) = setup();
    let responder = mock.hold("https://jsonplaceholder.typicode.com/todos/1");

    let handle = hook.mount(QueryParams::new().path("id", 1));
    tokio::task::yield_now().await;
    assert!(handle.cancel());

    let _ = responder.resolve(Ok(json!({ "userId": 1, "id": 1, "title": "late", "completed": false })));
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(handle.state(), FetchState::Idle);
    assert_eq!(mock.cancellations(), 1);
}

#[tokio::test]
async fn test_failure_after_success_retains_data() -> color_eyre::Result<()> {
    let (mock, hook) = setup();
    let url = "https://jsonplaceholder.typicode.com/todos/1";
    mock.respond(url, Ok(json!({ "userId": 1, "id": 1, "title": "delectus aut autem", "completed": false })));
    mock.respond(url, Err(TransportError::Status { status: 503, body: "busy".to_string() }));

    let handle = hook.mount(QueryParams::new().path("id", 1));
    next_settled(&mut handle.watch()).await?;

    let state = handle.refresh().await;
    assert!(state.is_error());
    assert_eq!(state.error().and_then(FetchError::status), Some(503));
    assert_eq!(state.data(), Some(&todo_one()));
    Ok(())
}

#[tokio::test]
async fn test_skip_never_calls_transport() {
    let (mock, hook) = setup();

    let handle = hook.mount(QueryParams::new().path("id", 1).skip(true));
    handle.refresh().await;
    handle.update(QueryParams::new().path("id", 2).skip(true));
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(handle.state(), FetchState::Idle);
    assert_eq!(mock.call_count(), 0);
}

#[tokio::test]
async fn test_unresolved_placeholder_in_strict_mode() -> color_eyre::Result<()> {
    let (mock, hook) = setup();

    let handle = hook.mount(
        QueryParams::new().options(RequestOptions::new().strict_path_params(true)),
    );
    let state = next_settled(&mut handle.watch()).await?;

    assert!(matches!(state.error(), Some(FetchError::Url(_))));
    assert_eq!(mock.call_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_request_carries_merged_options() -> color_eyre::Result<()> {
    init_tracing();
    let mock = MockTransport::new();
    let client = Arc::new(QueryClient::with_defaults(
        mock.clone(),
        RequestOptions::new().header("accept", "application/json"),
    ));
    let hook = QueryHook::<Todo>::new(
        client,
        TEMPLATE,
        QueryHookOptions {
            base: RequestOptions::new().query("expand", "user"),
            ..QueryHookOptions::default()
        },
    );
    mock.respond_always(
        "https://jsonplaceholder.typicode.com/todos/1",
        Ok(json!({ "userId": 1, "id": 1, "title": "delectus aut autem", "completed": false })),
    );

    let handle = hook.mount(
        QueryParams::new()
            .path("id", 1)
            .options(RequestOptions::new().header("x-trace", "abc")),
    );
    next_settled(&mut handle.watch()).await?;

    let calls = mock.calls();
    let request = &calls[0];
    assert_eq!(request.method(), Method::Get);
    assert_eq!(request.options.headers["accept"], "application/json");
    assert_eq!(request.options.headers["x-trace"], "abc");
    assert_eq!(request.options.query["expand"], "user");
    Ok(())
}
