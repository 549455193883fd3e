//! Common test utilities for integration tests.

use canvas_core::{
    AppStateStore, ControllerConfig, ConversationStore, MemoryEditor, SessionController,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

/// One step of a scripted completion service.
#[derive(Debug, Clone)]
pub enum Step {
    /// Send a text frame
    Send(String),
    /// Wait before the next step
    Pause(Duration),
    /// Close the connection from the server side
    Close,
    /// Drop the socket without a close handshake
    Abort,
}

pub fn chunk(text: &str) -> Step {
    Step::Send(serde_json::json!({ "type": "completion.chunk", "content": text }).to_string())
}

pub fn event(description: &str, artifact_id: &str) -> Step {
    Step::Send(
        serde_json::json!({
            "type": "event",
            "payload": {
                "description": description,
                "content": "",
                "isOngoing": true,
                "payload": { "artifactId": artifact_id }
            }
        })
        .to_string(),
    )
}

pub fn usage() -> Step {
    Step::Send(
        serde_json::json!({
            "type": "completion.usage",
            "payload": { "generated_tokens": 12, "traceId": "t-1", "traceUrl": "" }
        })
        .to_string(),
    )
}

/// Serve one WebSocket connection that plays `steps` after receiving the request.
///
/// After the script the server keeps reading until the client goes away.
/// The handle resolves to the request frame the client sent.
pub async fn serve(steps: Vec<Step>) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("ws://{}/api/canvas/completion", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

        let request = loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => break text.as_str().to_string(),
                Some(Ok(_)) => continue,
                _ => return String::new(),
            }
        };

        for step in steps {
            match step {
                Step::Send(text) => {
                    if ws.send(Message::Text(text.into())).await.is_err() {
                        return request;
                    }
                }
                Step::Pause(duration) => tokio::time::sleep(duration).await,
                Step::Close => {
                    let _ = ws.close(None).await;
                    break;
                }
                Step::Abort => {
                    drop(ws);
                    return request;
                }
            }
        }

        while let Some(Ok(_)) = ws.next().await {}
        request
    });

    (endpoint, handle)
}

/// An endpoint nothing listens on.
pub async fn refused_endpoint() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("ws://{addr}")
}

pub struct Harness {
    pub controller: SessionController,
    pub conversation: Arc<ConversationStore>,
    pub app_state: Arc<AppStateStore>,
    pub editor: Arc<MemoryEditor>,
}

pub fn harness(endpoint: &str, request_timeout: Option<Duration>) -> Harness {
    let editor = Arc::new(MemoryEditor::new());
    let conversation = Arc::new(ConversationStore::new(editor.clone()));
    let app_state = Arc::new(AppStateStore::new());
    let config = ControllerConfig {
        endpoint: endpoint.to_string(),
        request_timeout,
        ..Default::default()
    };
    let controller = SessionController::new(config, conversation.clone(), app_state.clone());

    Harness {
        controller,
        conversation,
        app_state,
        editor,
    }
}
