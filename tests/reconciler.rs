//! End-to-end reconciliation: scripted transports drive the transcript
//! the same way the app event loop does, in strict arrival order.

use async_trait::async_trait;
use futures::StreamExt;
use quill::message::{Message, StreamEvent};
use quill::segment::{self, Segment};
use quill::transport::{EventStream, Transport, TransportError};
use quill::tui::transcript::Transcript;

struct ScriptedTransport {
    deltas: Vec<&'static str>,
    /// Fail with this error after all deltas instead of completing
    error: Option<TransportError>,
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn complete(
        &self,
        _history: &[Message],
        _turn: &Message,
    ) -> Result<EventStream, TransportError> {
        let deltas = self.deltas.clone();
        let error = self.error.clone();
        Ok(Box::pin(async_stream::stream! {
            for delta in deltas {
                yield Ok(StreamEvent::Delta(delta.to_string()));
            }
            match error {
                Some(e) => yield Err(e),
                None => yield Ok(StreamEvent::Done),
            }
        }))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Drive a transport's reply into the transcript the way the event
/// loop does, recording the trailing content after each delta.
async fn drive(transcript: &mut Transcript, transport: &dyn Transport, text: &str) -> Vec<String> {
    let turn = Message::user(text);
    let history = transcript.messages().to_vec();
    transcript.push_user(turn.clone());
    transcript.begin_reply();

    let mut observed = Vec::new();
    let mut stream = transport.complete(&history, &turn).await.unwrap();
    while let Some(event) = stream.next().await {
        match event {
            Ok(StreamEvent::Delta(delta)) => {
                transcript.apply_delta(&delta);
                observed.push(transcript.messages().last().unwrap().content.clone());
            }
            Ok(StreamEvent::Done) => {
                transcript.finish_reply();
                break;
            }
            Err(error) => {
                transcript.fail_reply(&error);
                break;
            }
        }
    }
    observed
}

#[tokio::test]
async fn deltas_render_cumulatively_in_order() {
    let transport = ScriptedTransport {
        deltas: vec!["Hel", "lo, ", "world"],
        error: None,
    };
    let mut transcript = Transcript::new();

    let observed = drive(&mut transcript, &transport, "greet me").await;
    assert_eq!(observed, ["Hel", "Hello, ", "Hello, world"]);
    assert!(!transcript.is_streaming());
    assert_eq!(transcript.messages().last().unwrap().content, "Hello, world");
}

#[tokio::test]
async fn transport_failure_is_isolated_to_one_turn() {
    let mut transcript = Transcript::new();

    // A turn that completes
    let ok = ScriptedTransport {
        deltas: vec!["fine"],
        error: None,
    };
    drive(&mut transcript, &ok, "first").await;

    // A turn that dies mid-stream
    let failing = ScriptedTransport {
        deltas: vec!["par", "tial"],
        error: Some(TransportError::Stream("connection reset".into())),
    };
    drive(&mut transcript, &failing, "second").await;

    let contents: Vec<&str> = transcript
        .messages()
        .iter()
        .map(|m| m.content.as_str())
        .collect();
    // Earlier transcript content is never corrupted
    assert_eq!(contents[0], "first");
    assert_eq!(contents[1], "fine");
    // The partial reply survives and the error is a visible message
    assert_eq!(contents[3], "partial");
    assert!(contents[4].contains("connection reset"));
    assert!(transcript.banner.is_some());
}

#[tokio::test]
async fn streamed_reply_segments_cleanly_once_complete() {
    let reply = "Here you go:\n```mermaid\nflowchart LR\nA --> B\n```\nand the code:\n```rust\nfn main() {}\n```\n";
    // Character-level deltas: fences arrive split across many chunks
    let deltas: Vec<&'static str> = reply
        .char_indices()
        .map(|(i, c)| &reply[i..i + c.len_utf8()])
        .collect();
    let transport = ScriptedTransport {
        deltas,
        error: None,
    };

    let mut transcript = Transcript::new();
    drive(&mut transcript, &transport, "show me").await;

    let content = &transcript.messages().last().unwrap().content;
    assert_eq!(content, reply);

    let segments = segment::segment(content);
    assert_eq!(segments.len(), 4);
    assert!(matches!(&segments[1], Segment::Diagram { source, .. }
        if source == "flowchart LR\nA --> B"));
    assert!(matches!(&segments[3], Segment::Code { lang, .. } if lang == "rust"));
}

#[tokio::test]
async fn autoscroll_pause_survives_streaming() {
    let mut transcript = Transcript::new();
    let max_scroll = 400;

    // Reader scrolls far above the bottom while a reply streams
    transcript.push_user(Message::user("long question"));
    transcript.begin_reply();
    transcript.on_manual_scroll(100, max_scroll);
    assert!(transcript.show_jump_affordance());

    for _ in 0..50 {
        transcript.apply_delta("more text\n");
    }
    // Streamed content does not force-scroll
    assert_eq!(transcript.scroll_position(max_scroll + 50), 100);

    // Jumping back resumes following
    transcript.follow_bottom();
    assert_eq!(transcript.scroll_position(max_scroll + 50), max_scroll + 50);
    assert!(!transcript.show_jump_affordance());
}
