//! CLI channel: stdin/stdout REPL for local runs without Telegram.

use async_trait::async_trait;
use futures::stream;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::channels::{Channel, IncomingMessage, InboundEvent, MessageStream, OutgoingResponse};
use crate::error::ChannelError;
use crate::triage::UserIdentity;

const LOCAL_USER_ID: &str = "local-user";

/// Reads one message per line from stdin and prints replies to stdout.
///
/// Button presses are typed as commands (`/faqs`, `/human`).
pub struct CliChannel {
    user: UserIdentity,
}

impl CliChannel {
    pub fn new() -> Self {
        Self {
            user: UserIdentity::new(LOCAL_USER_ID, "Local"),
        }
    }
}

impl Default for CliChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Text shown under replies that carry a menu.
fn menu_hint(response: &OutgoingResponse) -> Option<String> {
    let markup = response.markup?;
    let options: Vec<String> = markup
        .buttons()
        .iter()
        .map(|action| format!("{} (/{})", action.label(), action.token()))
        .collect();
    Some(format!("[{}]", options.join("  ")))
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let user = self.user.clone();

        tokio::spawn(async move {
            let stdin = tokio::io::stdin();
            let reader = BufReader::new(stdin);
            let mut lines = reader.lines();

            eprint!("> ");

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let Some(event) = InboundEvent::from_text(&line) else {
                            eprint!("> ");
                            continue;
                        };
                        let msg = IncomingMessage::new("cli", user.clone(), event);
                        if tx.send(msg).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break, // EOF
                    Err(e) => {
                        tracing::error!("Error reading stdin: {}", e);
                        break;
                    }
                }
            }
        });

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn respond(
        &self,
        _msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        println!("\n{}", response.content);
        if let Some(hint) = menu_hint(&response) {
            println!("{hint}");
        }
        println!();
        eprint!("> ");
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}
