//! Transport collaborator: streams model reply deltas
//!
//! The upstream protocol is a black box. A transport takes the prior
//! turn history plus the new user turn and yields an ordered stream of
//! text deltas terminating with [`StreamEvent::Done`].

use crate::config::TransportConfig;
use crate::message::{Message, Role, StreamEvent};
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use std::process::Stdio;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_stream::wrappers::ReceiverStream;

/// Stream of events from a transport
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, TransportError>> + Send>>;

#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("failed to start `{command}`: {detail}")]
    Spawn { command: String, detail: String },
    #[error("reply stream failed: {0}")]
    Stream(String),
    #[error("transport exited with status {code}: {detail}")]
    Exited { code: i32, detail: String },
}

/// Transport trait for model backends
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send the turn history and get a streaming reply
    async fn complete(
        &self,
        history: &[Message],
        turn: &Message,
    ) -> Result<EventStream, TransportError>;

    /// Get the transport name
    fn name(&self) -> &str;
}

/// Build a transport from config: a subprocess transport when a command
/// is configured, the built-in echo transport otherwise.
pub fn from_config(config: &TransportConfig) -> Box<dyn Transport> {
    if config.command.is_empty() {
        Box::new(EchoTransport)
    } else {
        Box::new(CommandTransport {
            command: config.command.clone(),
            args: config.args.clone(),
        })
    }
}

/// Render the turn history into the prompt written to the backend.
///
/// Folder context and attachment references are prepended to the user's
/// text, in history order.
fn render_prompt(history: &[Message], turn: &Message) -> String {
    let mut prompt = String::new();
    for msg in history.iter().chain(std::iter::once(turn)) {
        let role = match msg.role {
            Role::User => "user",
            Role::Model => "model",
        };
        prompt.push_str(role);
        prompt.push_str(": ");
        if let Some(folder) = &msg.folder {
            prompt.push_str(&format!(
                "[folder {} ({} files)]\n{}\n",
                folder.name, folder.file_count, folder.context
            ));
        }
        if let Some(attachment) = &msg.attachment {
            prompt.push_str(&format!(
                "[attachment {} ({})]\n",
                attachment.name, attachment.media_type
            ));
        }
        prompt.push_str(&msg.content);
        prompt.push('\n');
    }
    prompt
}

/// Transport that drives an external CLI: writes the prompt to the
/// command's stdin and streams its stdout line by line as deltas.
pub struct CommandTransport {
    command: String,
    args: Vec<String>,
}

#[async_trait]
impl Transport for CommandTransport {
    async fn complete(
        &self,
        history: &[Message],
        turn: &Message,
    ) -> Result<EventStream, TransportError> {
        let prompt = render_prompt(history, turn);

        let mut child = tokio::process::Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| TransportError::Spawn {
                command: self.command.clone(),
                detail: e.to_string(),
            })?;

        let mut stdin = child.stdin.take().ok_or_else(|| TransportError::Spawn {
            command: self.command.clone(),
            detail: "stdin unavailable".to_string(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| TransportError::Spawn {
            command: self.command.clone(),
            detail: "stdout unavailable".to_string(),
        })?;

        let (tx, rx) = tokio::sync::mpsc::channel(64);
        tokio::spawn(async move {
            if let Err(e) = stdin.write_all(prompt.as_bytes()).await {
                let _ = tx.send(Err(TransportError::Stream(e.to_string()))).await;
                return;
            }
            drop(stdin);

            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let delta = format!("{line}\n");
                        if tx.send(Ok(StreamEvent::Delta(delta))).await.is_err() {
                            // Receiver dropped: reply no longer wanted
                            let _ = child.kill().await;
                            return;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        let _ = tx.send(Err(TransportError::Stream(e.to_string()))).await;
                        return;
                    }
                }
            }

            match child.wait_with_output().await {
                Ok(output) if output.status.success() => {
                    let _ = tx.send(Ok(StreamEvent::Done)).await;
                }
                Ok(output) => {
                    let detail = String::from_utf8_lossy(&output.stderr).trim().to_string();
                    let _ = tx
                        .send(Err(TransportError::Exited {
                            code: output.status.code().unwrap_or(-1),
                            detail,
                        }))
                        .await;
                }
                Err(e) => {
                    let _ = tx.send(Err(TransportError::Stream(e.to_string()))).await;
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    fn name(&self) -> &str {
        "command"
    }
}

/// Fallback transport that replays the user's text back as deltas.
/// Lets the client run end to end with no backend configured.
pub struct EchoTransport;

#[async_trait]
impl Transport for EchoTransport {
    async fn complete(
        &self,
        _history: &[Message],
        turn: &Message,
    ) -> Result<EventStream, TransportError> {
        let text = if turn.content.is_empty() {
            "(empty message)".to_string()
        } else {
            turn.content.clone()
        };

        let (tx, rx) = tokio::sync::mpsc::channel(64);
        tokio::spawn(async move {
            // Word-sized deltas, paced so streaming behavior is visible
            for word in split_inclusive_words(&text) {
                if tx.send(Ok(StreamEvent::Delta(word))).await.is_err() {
                    return;
                }
                tokio::time::sleep(std::time::Duration::from_millis(30)).await;
            }
            let _ = tx.send(Ok(StreamEvent::Done)).await;
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    fn name(&self) -> &str {
        "echo"
    }
}

fn split_inclusive_words(text: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        current.push(c);
        if c.is_whitespace() {
            words.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[test]
    fn test_render_prompt_order_and_context() {
        let history = vec![Message::user("hi"), Message::model("hello")];
        let mut turn = Message::user("what next?");
        turn.folder = Some(crate::message::FolderSummary {
            name: "proj".into(),
            file_count: 2,
            context: "== a.rs ==\nfn a() {}".into(),
        });

        let prompt = render_prompt(&history, &turn);
        let hi = prompt.find("user: hi").unwrap();
        let hello = prompt.find("model: hello").unwrap();
        let folder = prompt.find("[folder proj (2 files)]").unwrap();
        let next = prompt.find("what next?").unwrap();
        assert!(hi < hello && hello < folder && folder < next);
    }

    #[tokio::test]
    async fn test_echo_transport_replays_deltas_in_order() {
        let transport = EchoTransport;
        let turn = Message::user("one two three");
        let mut stream = transport.complete(&[], &turn).await.unwrap();

        let mut seen = String::new();
        let mut done = false;
        while let Some(event) = stream.next().await {
            match event.unwrap() {
                StreamEvent::Delta(d) => seen.push_str(&d),
                StreamEvent::Done => {
                    done = true;
                    break;
                }
            }
        }
        assert!(done);
        assert_eq!(seen, "one two three");
    }

    #[test]
    fn test_split_inclusive_words_preserves_text() {
        let text = "a b  c\nd";
        assert_eq!(split_inclusive_words(text).concat(), text);
    }
}
