//! Full triage path: real Gemini client and Telegram sink against local stubs.

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use secrecy::SecretString;
use serde_json::json;

use common::{BOT_TOKEN, GeminiStub, TelegramStub};
use helpdesk_triage::bot::dispatch;
use helpdesk_triage::channels::{Command, InboundEvent, IncomingMessage, TelegramChannel};
use helpdesk_triage::config::TriageConfig;
use helpdesk_triage::error::LlmError;
use helpdesk_triage::escalation::TelegramEscalationSink;
use helpdesk_triage::knowledge::KnowledgeBase;
use helpdesk_triage::llm::{CompletionService, GeminiClient};
use helpdesk_triage::triage::{TriagePipeline, TriageSource, UserIdentity};

const FAQS: &str = r#"[
  {"question": "¿Cuál es el horario?", "answer": "De 9 a 18.", "keywords": ["horario"]},
  {"question": "¿Hacen envíos?", "answer": "Sí, a todo el país.", "keywords": ["envío", "envio"]}
]"#;

const SUPPORT_CHAT: &str = "-100555";

struct Harness {
    pipeline: TriagePipeline,
    gemini: Arc<GeminiStub>,
    telegram: Arc<TelegramStub>,
}

async fn harness(gemini: Arc<GeminiStub>) -> Harness {
    let telegram = TelegramStub::new();
    let channel = Arc::new(
        TelegramChannel::new(SecretString::from(BOT_TOKEN)).with_api_base(telegram.start().await),
    );
    let config = TriageConfig::default();
    let sink = Arc::new(TelegramEscalationSink::new(
        channel,
        SUPPORT_CHAT,
        config.messages.no_query_marker.clone(),
    ));
    let completion = GeminiClient::new(SecretString::from("g-key"), "gemini-test")
        .unwrap()
        .with_base_url(gemini.start().await);

    let pipeline = TriagePipeline::new(
        Arc::new(KnowledgeBase::from_json_str(FAQS).unwrap()),
        Arc::new(completion),
        sink,
        config,
    );
    Harness {
        pipeline,
        gemini,
        telegram,
    }
}

fn ana() -> UserIdentity {
    UserIdentity::new("42", "Ana")
}

#[tokio::test]
async fn faq_hit_never_reaches_gemini() {
    let h = harness(GeminiStub::replying("unused")).await;

    let result = h.pipeline.handle("¿Cuál es el HORARIO?", &ana()).await;

    assert_eq!(result.source, TriageSource::KnowledgeBase);
    assert_eq!(result.text, "De 9 a 18.");
    assert!(h.gemini.requests().is_empty());
    assert!(h.telegram.calls().is_empty());
}

#[tokio::test]
async fn generated_answer_is_returned_verbatim() {
    let h = harness(GeminiStub::replying("Aceptamos tarjetas y efectivo.")).await;

    let result = h.pipeline.handle("¿Aceptan Tarjetas?", &ana()).await;

    assert_eq!(result.source, TriageSource::Generated);
    assert_eq!(result.text, "Aceptamos tarjetas y efectivo.");

    let requests = h.gemini.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].0.as_deref(), Some("g-key"));
    let prompt = requests[0].1["contents"][0]["parts"][0]["text"]
        .as_str()
        .unwrap();
    assert!(prompt.contains("Pregunta: ¿aceptan tarjetas?"));
    assert!(h.telegram.calls().is_empty());
}

#[tokio::test]
async fn handoff_answer_escalates_to_support_chat() {
    let h = harness(GeminiStub::replying(
        "No tengo esa información, te voy a transferir con un agente.",
    ))
    .await;

    let result = h.pipeline.handle("Mi pedido llegó roto", &ana()).await;

    assert_eq!(result.source, TriageSource::Escalated);
    assert_eq!(result.text, h.pipeline.messages().escalation_ack);
    assert!(!result.text.contains("transferir"));

    let sent = h.telegram.calls_to("sendMessage");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["chat_id"], SUPPORT_CHAT);
    assert!(
        sent[0]["text"]
            .as_str()
            .unwrap()
            .ends_with("Consulta: mi pedido llegó roto")
    );
}

#[tokio::test]
async fn gemini_auth_failure_yields_technical_difficulties() {
    let h = harness(GeminiStub::with_response(
        StatusCode::FORBIDDEN,
        json!({"error": {"code": 403, "message": "API key not valid"}}),
    ))
    .await;

    let result = h.pipeline.handle("hola", &ana()).await;

    assert_eq!(result.source, TriageSource::Failed);
    assert_eq!(result.text, h.pipeline.messages().technical_difficulties);
    assert!(h.telegram.calls().is_empty());
}

#[tokio::test]
async fn gemini_status_codes_map_to_errors() {
    let forbidden = GeminiStub::with_response(StatusCode::FORBIDDEN, json!({}));
    let client = GeminiClient::new(SecretString::from("bad"), "gemini-test")
        .unwrap()
        .with_base_url(forbidden.start().await);
    assert!(matches!(
        client.generate("hola").await,
        Err(LlmError::AuthFailed { .. })
    ));

    let blocked = GeminiStub::with_response(
        StatusCode::OK,
        json!({"promptFeedback": {"blockReason": "SAFETY"}}),
    );
    let client = GeminiClient::new(SecretString::from("k"), "gemini-test")
        .unwrap()
        .with_base_url(blocked.start().await);
    assert!(matches!(
        client.generate("hola").await,
        Err(LlmError::InvalidResponse { .. })
    ));
}

#[tokio::test]
async fn human_command_notifies_without_query() {
    let h = harness(GeminiStub::replying("unused")).await;
    let msg = IncomingMessage::new(
        "telegram",
        ana(),
        InboundEvent::Command {
            command: Command::Human,
        },
    );

    let reply = tokio::time::timeout(Duration::from_secs(5), dispatch(&h.pipeline, &msg))
        .await
        .unwrap();

    assert_eq!(reply.content, h.pipeline.messages().explicit_escalation_ack);
    assert!(h.gemini.requests().is_empty());
    let sent = h.telegram.calls_to("sendMessage");
    assert_eq!(sent.len(), 1);
    assert!(
        sent[0]["text"]
            .as_str()
            .unwrap()
            .ends_with("Consulta: (solicitud directa, sin consulta)")
    );
}
