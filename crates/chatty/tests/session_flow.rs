//! End-to-end tests of a session wired to in-memory kernel channels.
//!
//! The kernel side is simulated: the test holds the shell receiver and the
//! inbound sender, so it sees exactly what the session sends and controls
//! exactly what it receives.

use chatty::notebook_state::FrontendCell;
use chatty::{
    ContextForm, DispatchOutcome, InputEvent, KernelHandle, KernelReady, Key, NotebookState,
    PreviewPane, QueryBox, SessionContext,
};
use chatty_messages::{InboundMessage, OutboundRequest, OutboundType};
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};

struct FakeKernel {
    shell_rx: mpsc::Receiver<OutboundRequest>,
    inbound_tx: mpsc::Sender<InboundMessage>,
}

impl FakeKernel {
    async fn emit(&self, value: Value) {
        self.inbound_tx
            .send(InboundMessage::from_value(value).unwrap())
            .await
            .unwrap();
    }
}

async fn attached_session() -> (SessionContext, FakeKernel) {
    let mut session =
        SessionContext::new("notebook", NotebookState::new_empty(), PreviewPane::default());

    let (shell_tx, shell_rx) = mpsc::channel(16);
    let (inbound_tx, inbound_rx) = mpsc::channel(16);
    let (ready_tx, ready_rx) = oneshot::channel();

    ready_tx
        .send(Ok(KernelReady {
            handle: KernelHandle::new("kernel-abc", shell_tx),
            inbound: inbound_rx,
        }))
        .ok()
        .unwrap();
    session.wait_ready(ready_rx).await.unwrap();

    (
        session,
        FakeKernel {
            shell_rx,
            inbound_tx,
        },
    )
}

/// Close the inbound stream and wait until everything has been routed.
async fn drain(session: &mut SessionContext, kernel: FakeKernel) -> mpsc::Receiver<OutboundRequest> {
    let FakeKernel {
        shell_rx,
        inbound_tx,
    } = kernel;
    drop(inbound_tx);
    session.join_router().await;
    shell_rx
}

fn cells(session: &SessionContext) -> Vec<FrontendCell> {
    session.notebook().lock().unwrap().cells_for_frontend()
}

fn preview_text(session: &SessionContext) -> String {
    session.preview().lock().unwrap().text().to_string()
}

#[tokio::test]
async fn test_status_messages_change_nothing() {
    let (mut session, kernel) = attached_session().await;

    for state in ["busy", "idle", "starting"] {
        kernel
            .emit(json!({
                "msg_type": "status",
                "id": format!("status-{state}"),
                "parent_header": {"msg_type": "llm_request"},
                "content": {"execution_state": state}
            }))
            .await;
    }
    drain(&mut session, kernel).await;

    assert!(cells(&session).is_empty());
    assert_eq!(preview_text(&session), "");
}

#[tokio::test]
async fn test_llm_responses_append_markdown_in_arrival_order() {
    let (mut session, kernel) = attached_session().await;

    kernel
        .emit(json!({"msg_type": "llm_response", "id": "r2", "content": {"text": "second"}}))
        .await;
    kernel
        .emit(json!({"msg_type": "llm_response", "id": "r1", "content": {"text": "first"}}))
        .await;
    drain(&mut session, kernel).await;

    assert_eq!(
        cells(&session),
        vec![
            FrontendCell::Markdown {
                id: "r2-text".to_string(),
                source: "second".to_string()
            },
            FrontendCell::Markdown {
                id: "r1-text".to_string(),
                source: "first".to_string()
            },
        ]
    );
}

#[tokio::test]
async fn test_code_cell_appends_code() {
    let (mut session, kernel) = attached_session().await;

    kernel
        .emit(json!({
            "msg_type": "code_cell",
            "id": "c7",
            "content": {"language": "python", "code": "df.groupby('week').sum()"}
        }))
        .await;
    drain(&mut session, kernel).await;

    assert_eq!(
        cells(&session),
        vec![FrontendCell::Code {
            id: "c7-code".to_string(),
            source: "df.groupby('week').sum()".to_string(),
            execution_count: None,
        }]
    );
}

#[tokio::test]
async fn test_stream_only_inserts_for_llm_replies() {
    let (mut session, kernel) = attached_session().await;

    kernel
        .emit(json!({
            "msg_type": "stream",
            "id": "s1",
            "parent_header": {"msg_type": "execute_request"},
            "content": {"name": "stdout", "text": "chatter"}
        }))
        .await;
    kernel
        .emit(json!({
            "msg_type": "stream",
            "id": "s2",
            "parent_header": {},
            "content": {"name": "stdout", "text": "more chatter"}
        }))
        .await;
    kernel
        .emit(json!({
            "msg_type": "stream",
            "id": "s3",
            "parent_header": {"msg_type": "llm_request"},
            "content": {"name": "stdout", "text": "Thinking about it"}
        }))
        .await;
    drain(&mut session, kernel).await;

    assert_eq!(
        cells(&session),
        vec![FrontendCell::Markdown {
            id: "s3-text".to_string(),
            source: "Thinking about it".to_string()
        }]
    );
}

#[tokio::test]
async fn test_malformed_message_does_not_stop_routing() {
    let (mut session, kernel) = attached_session().await;

    kernel
        .emit(json!({"msg_type": "llm_response", "id": "bad", "content": {}}))
        .await;
    kernel
        .emit(json!({"msg_type": "mystery", "id": "m1", "content": {"x": 1}}))
        .await;
    kernel
        .emit(json!({"msg_type": "llm_response", "id": "good", "content": {"text": "ok"}}))
        .await;
    drain(&mut session, kernel).await;

    let ids: Vec<String> = cells(&session).iter().map(|c| c.id().to_string()).collect();
    assert_eq!(ids, vec!["good-text"]);
}

#[tokio::test]
async fn test_duplicate_message_inserts_once() {
    let (mut session, kernel) = attached_session().await;

    let message = json!({"msg_type": "llm_response", "id": "dup", "content": {"text": "once"}});
    kernel.emit(message.clone()).await;
    kernel.emit(message).await;
    drain(&mut session, kernel).await;

    assert_eq!(cells(&session).len(), 1);
}

#[tokio::test]
async fn test_reply_with_non_nbformat_id_still_appends() {
    let (mut session, kernel) = attached_session().await;
    let long_id = "7".repeat(70);

    kernel
        .emit(json!({"msg_type": "llm_response", "id": long_id, "content": {"text": "long"}}))
        .await;
    kernel
        .emit(json!({"msg_type": "llm_response", "id": "a.b", "content": {"text": "dotted"}}))
        .await;
    kernel
        .emit(json!({"msg_type": "llm_response", "id": "a.b", "content": {"text": "again"}}))
        .await;
    drain(&mut session, kernel).await;

    let ids: Vec<String> = cells(&session).iter().map(|c| c.id().to_string()).collect();
    assert_eq!(ids, vec![format!("{long_id}-text"), "a.b-text".to_string()]);
}

#[tokio::test]
async fn test_enter_and_click_produce_identical_content() {
    let (mut session, kernel) = attached_session().await;
    let mut query = QueryBox::new();
    query.set_value("summarize the dataset");

    query
        .handle(InputEvent::KeyDown(Key::Enter), &session)
        .unwrap();
    query.handle(InputEvent::SubmitClicked, &session).unwrap();

    let mut shell_rx = drain(&mut session, kernel).await;
    let by_key = shell_rx.recv().await.unwrap();
    let by_click = shell_rx.recv().await.unwrap();

    assert_eq!(by_key.content, by_click.content);
    assert_eq!(by_key.msg_type, OutboundType::LlmRequest);
    assert_eq!(by_click.msg_type, OutboundType::LlmRequest);
    assert_eq!(by_key.session, "notebook");
    assert!(by_key.msg_id.starts_with("kernel-abc-query-"));
    assert!(by_click.msg_id.starts_with("kernel-abc-query-"));
}

#[tokio::test]
async fn test_query_without_kernel_sends_nothing() {
    let session =
        SessionContext::new("notebook", NotebookState::new_empty(), PreviewPane::default());
    let mut query = QueryBox::new();
    query.set_value("anyone there?");

    let by_key = query
        .handle(InputEvent::KeyDown(Key::Enter), &session)
        .unwrap();
    let by_click = query.handle(InputEvent::SubmitClicked, &session).unwrap();

    assert_eq!(by_key, DispatchOutcome::NoKernel);
    assert_eq!(by_click, DispatchOutcome::NoKernel);
    assert!(session.kernel().is_none());
}

#[tokio::test]
async fn test_context_then_dataset_preview() {
    let (mut session, mut kernel) = attached_session().await;
    let mut form = ContextForm::new("dataset");
    form.set_info_text(r#"{"id": "truth-incident-hospitalization"}"#);

    form.handle(InputEvent::SubmitClicked, &session).unwrap();

    let request = kernel.shell_rx.recv().await.unwrap();
    assert_eq!(request.msg_type, OutboundType::ContextSetupRequest);
    assert_eq!(
        request.content,
        json!({"context": "dataset", "context_info": {"id": "truth-incident-hospitalization"}})
    );
    assert_eq!(request.msg_id, "kernel-abc-setcontext-1");

    kernel
        .emit(json!({
            "msg_type": "dataset",
            "id": "d1",
            "parent_header": {},
            "content": {"csv": [["x", "y"], ["1", "2"]]}
        }))
        .await;
    drain(&mut session, kernel).await;

    assert_eq!(preview_text(&session), "x,y\n1,2");
    assert!(cells(&session).is_empty());
}

#[tokio::test]
async fn test_invalid_context_sends_nothing() {
    let (mut session, kernel) = attached_session().await;
    let mut form = ContextForm::new("dataset");
    form.set_info_text("{\"id\": ");

    assert!(form.handle(InputEvent::SubmitClicked, &session).is_err());
    assert!(form.error().is_some());

    let mut shell_rx = drain(&mut session, kernel).await;
    session.teardown();
    assert!(shell_rx.recv().await.is_none());
}

#[tokio::test]
async fn test_reattach_replaces_subscription() {
    let (mut session, old_kernel) = attached_session().await;

    let (shell_tx, _shell_rx) = mpsc::channel(4);
    let (inbound_tx, inbound_rx) = mpsc::channel(4);
    session.attach(KernelReady {
        handle: KernelHandle::new("kernel-new", shell_tx),
        inbound: inbound_rx,
    });
    assert_eq!(session.kernel().map(|k| k.kernel_id()), Some("kernel-new"));

    // The old stream is no longer read.
    let _ = old_kernel
        .inbound_tx
        .send(
            InboundMessage::from_value(
                json!({"msg_type": "llm_response", "id": "old", "content": {"text": "stale"}}),
            )
            .unwrap(),
        )
        .await;

    inbound_tx
        .send(
            InboundMessage::from_value(
                json!({"msg_type": "llm_response", "id": "new", "content": {"text": "fresh"}}),
            )
            .unwrap(),
        )
        .await
        .unwrap();
    drop(inbound_tx);
    session.join_router().await;

    let ids: Vec<String> = cells(&session).iter().map(|c| c.id().to_string()).collect();
    assert_eq!(ids, vec!["new-text"]);
}
