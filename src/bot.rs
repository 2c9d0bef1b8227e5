//! Bot dispatcher: reads a channel's message stream and answers each event.
//!
//! Every inbound event gets its own task, so a slow completion for one user
//! never delays anyone else.

use std::sync::Arc;

use futures::StreamExt;
use tokio::task::JoinSet;

use crate::channels::{
    ButtonAction, Channel, Command, InboundEvent, IncomingMessage, OutgoingResponse,
};
use crate::error::Error;
use crate::triage::TriagePipeline;

/// Map one inbound event to the reply the user should see.
pub async fn dispatch(pipeline: &TriagePipeline, message: &IncomingMessage) -> OutgoingResponse {
    match &message.event {
        InboundEvent::Command {
            command: Command::Start | Command::Help,
        } => OutgoingResponse::text(&pipeline.messages().welcome).with_menu(),
        InboundEvent::Command {
            command: Command::Human,
        }
        | InboundEvent::Button {
            action: ButtonAction::Human,
            ..
        } => OutgoingResponse::text(pipeline.escalate(&message.user).await.text),
        InboundEvent::Command {
            command: Command::Faqs,
        } => OutgoingResponse::text(pipeline.list_topics()),
        InboundEvent::Button {
            action: ButtonAction::Faqs,
            ..
        } => OutgoingResponse::text(pipeline.list_topics()).editing(),
        InboundEvent::Text { text } => {
            let result = pipeline.handle(text, &message.user).await;
            tracing::debug!(
                user = %message.user.id,
                source = %result.source,
                escalated = result.escalation_requested,
                "Triage complete"
            );
            OutgoingResponse::text(result.text)
        }
    }
}

/// Ties one channel to the triage pipeline.
pub struct Bot {
    pipeline: Arc<TriagePipeline>,
    channel: Arc<dyn Channel>,
}

impl Bot {
    pub fn new(pipeline: Arc<TriagePipeline>, channel: Arc<dyn Channel>) -> Self {
        Self { pipeline, channel }
    }

    /// Run until Ctrl+C or until the channel stream ends.
    ///
    /// On end of stream, in-flight replies are allowed to finish; on Ctrl+C
    /// they are aborted.
    pub async fn run(self) -> Result<(), Error> {
        let mut stream = self.channel.start().await?;
        let mut tasks = JoinSet::new();

        tracing::info!(channel = self.channel.name(), "Bot ready and listening");

        let interrupted = loop {
            let message = tokio::select! {
                biased;
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Ctrl+C received, shutting down...");
                    break true;
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!("Message task panicked: {e}");
                    }
                    continue;
                }
                msg = stream.next() => match msg {
                    Some(m) => m,
                    None => {
                        tracing::info!("Channel stream ended, shutting down...");
                        break false;
                    }
                },
            };

            let pipeline = Arc::clone(&self.pipeline);
            let channel = Arc::clone(&self.channel);
            tasks.spawn(async move {
                let response = dispatch(&pipeline, &message).await;
                if let Err(e) = channel.respond(&message, response).await {
                    tracing::error!(
                        user = %message.user.id,
                        channel = %message.channel,
                        "Failed to send reply: {e}"
                    );
                }
            });
        };

        if interrupted {
            tasks.abort_all();
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined
                && !e.is_cancelled()
            {
                tracing::error!("Message task panicked: {e}");
            }
        }

        self.channel.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    use async_trait::async_trait;

    use super::*;
    use crate::channels::{MessageStream, ReplyMarkup};
    use crate::config::TriageConfig;
    use crate::error::{ChannelError, EscalationError, LlmError};
    use crate::escalation::{EscalationNotice, EscalationSink};
    use crate::knowledge::{FaqEntry, KnowledgeBase};
    use crate::llm::CompletionService;
    use crate::triage::UserIdentity;

    struct FixedCompletion {
        reply: String,
        delay: Duration,
    }

    #[async_trait]
    impl CompletionService for FixedCompletion {
        fn model_name(&self) -> &str {
            "fixed"
        }

        async fn generate(&self, _prompt: &str) -> Result<String, LlmError> {
            tokio::time::sleep(self.delay).await;
            Ok(self.reply.clone())
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        notices: Mutex<Vec<EscalationNotice>>,
    }

    #[async_trait]
    impl EscalationSink for RecordingSink {
        async fn notify(&self, notice: &EscalationNotice) -> Result<(), EscalationError> {
            self.notices.lock().unwrap().push(notice.clone());
            Ok(())
        }
    }

    /// Channel that replays a fixed list of events and records replies.
    struct ScriptedChannel {
        script: Mutex<Vec<IncomingMessage>>,
        replies: Mutex<Vec<(uuid::Uuid, OutgoingResponse)>>,
    }

    impl ScriptedChannel {
        fn new(script: Vec<IncomingMessage>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script),
                replies: Mutex::new(Vec::new()),
            })
        }

        fn reply_to(&self, id: uuid::Uuid) -> Option<OutgoingResponse> {
            self.replies
                .lock()
                .unwrap()
                .iter()
                .find(|(msg_id, _)| *msg_id == id)
                .map(|(_, r)| r.clone())
        }
    }

    #[async_trait]
    impl Channel for ScriptedChannel {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn start(&self) -> Result<MessageStream, ChannelError> {
            let script = std::mem::take(&mut *self.script.lock().unwrap());
            Ok(Box::pin(futures::stream::iter(script)))
        }

        async fn respond(
            &self,
            msg: &IncomingMessage,
            response: OutgoingResponse,
        ) -> Result<(), ChannelError> {
            self.replies.lock().unwrap().push((msg.id, response));
            Ok(())
        }

        async fn health_check(&self) -> Result<(), ChannelError> {
            Ok(())
        }
    }

    fn pipeline_with(reply: &str, delay: Duration) -> (Arc<TriagePipeline>, Arc<RecordingSink>) {
        let kb = KnowledgeBase::new(vec![
            FaqEntry::new("Horario", "Abrimos 9 a 18", ["horario"]),
            FaqEntry::new("Envíos", "Enviamos a todo el país", ["envío", "envio"]),
        ]);
        let sink = Arc::new(RecordingSink::default());
        let pipeline = TriagePipeline::new(
            Arc::new(kb),
            Arc::new(FixedCompletion {
                reply: reply.to_string(),
                delay,
            }),
            sink.clone(),
            TriageConfig::default(),
        );
        (Arc::new(pipeline), sink)
    }

    fn message(event: InboundEvent) -> IncomingMessage {
        IncomingMessage::new("scripted", UserIdentity::new("42", "Ana"), event)
    }

    fn text(t: &str) -> IncomingMessage {
        message(InboundEvent::Text { text: t.into() })
    }

    fn command(command: Command) -> IncomingMessage {
        message(InboundEvent::Command { command })
    }

    fn button(action: ButtonAction) -> IncomingMessage {
        message(InboundEvent::Button {
            action,
            callback_id: Some("cb".into()),
        })
    }

    #[tokio::test]
    async fn start_and_help_show_welcome_with_menu() {
        let (pipeline, _) = pipeline_with("x", Duration::ZERO);
        for cmd in [Command::Start, Command::Help] {
            let r = dispatch(&pipeline, &command(cmd)).await;
            assert_eq!(r.content, pipeline.messages().welcome);
            assert_eq!(r.markup, Some(ReplyMarkup::MainMenu));
        }
    }

    #[tokio::test]
    async fn human_command_and_button_escalate() {
        let (pipeline, sink) = pipeline_with("x", Duration::ZERO);
        let by_command = dispatch(&pipeline, &command(Command::Human)).await;
        let by_button = dispatch(&pipeline, &button(ButtonAction::Human)).await;

        assert_eq!(by_command.content, pipeline.messages().explicit_escalation_ack);
        assert_eq!(by_button.content, pipeline.messages().explicit_escalation_ack);
        let notices = sink.notices.lock().unwrap();
        assert_eq!(notices.len(), 2);
        assert!(notices.iter().all(|n| n.query.is_none()));
    }

    #[tokio::test]
    async fn faqs_button_edits_in_place_command_does_not() {
        let (pipeline, _) = pipeline_with("x", Duration::ZERO);
        let by_command = dispatch(&pipeline, &command(Command::Faqs)).await;
        let by_button = dispatch(&pipeline, &button(ButtonAction::Faqs)).await;

        assert_eq!(
            by_command.content,
            "📚 FAQs Disponibles:\n• Horario\n• Envíos"
        );
        assert!(!by_command.edit);
        assert_eq!(by_button.content, by_command.content);
        assert!(by_button.edit);
    }

    #[tokio::test]
    async fn text_goes_through_triage() {
        let (pipeline, _) = pipeline_with("Claro, con gusto.", Duration::ZERO);
        let faq = dispatch(&pipeline, &text("¿Cuál es el HORARIO?")).await;
        assert_eq!(faq.content, "Abrimos 9 a 18");
        assert!(faq.markup.is_none());

        let generated = dispatch(&pipeline, &text("¿Aceptan tarjetas?")).await;
        assert_eq!(generated.content, "Claro, con gusto.");
    }

    #[tokio::test]
    async fn run_answers_every_message_then_stops() {
        let (pipeline, sink) = pipeline_with("Te transferiré a un humano.", Duration::ZERO);
        let msgs = vec![
            command(Command::Start),
            text("horario"),
            text("quiero devolver algo"),
            button(ButtonAction::Faqs),
        ];
        let ids: Vec<_> = msgs.iter().map(|m| m.id).collect();
        let channel = ScriptedChannel::new(msgs);

        Bot::new(pipeline.clone(), channel.clone()).run().await.unwrap();

        assert_eq!(channel.replies.lock().unwrap().len(), 4);
        assert_eq!(
            channel.reply_to(ids[1]).unwrap().content,
            "Abrimos 9 a 18"
        );
        assert_eq!(
            channel.reply_to(ids[2]).unwrap().content,
            pipeline.messages().escalation_ack
        );
        assert_eq!(
            sink.notices.lock().unwrap()[0].query.as_deref(),
            Some("quiero devolver algo")
        );
    }

    #[tokio::test]
    async fn run_handles_messages_concurrently() {
        let (pipeline, _) = pipeline_with("ok", Duration::from_millis(200));
        let msgs: Vec<_> = (0..8).map(|i| text(&format!("pregunta {i}"))).collect();
        let channel = ScriptedChannel::new(msgs);

        let started = Instant::now();
        Bot::new(pipeline, channel.clone()).run().await.unwrap();

        assert_eq!(channel.replies.lock().unwrap().len(), 8);
        assert!(started.elapsed() < Duration::from_millis(1000));
    }
}
