//! Configuration types.
//!
//! Everything is read once at startup into a [`BotConfig`] value that is
//! passed down explicitly; nothing below `main` looks at the environment.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::{LlmBackend, LlmConfig};

/// Default instruction template sent to the completion service.
pub const DEFAULT_PROMPT_TEMPLATE: &str = "Eres un asistente virtual de servicio al cliente.\n\
Responde de manera clara y concisa en español.\n\
Si no sabes la respuesta, di que transferirás a un humano.\n\n\
Pregunta: {query}\n\
Respuesta:";

/// Placeholder replaced by the normalized user query.
pub const QUERY_PLACEHOLDER: &str = "{query}";

/// Phrases in a generated answer that hand the conversation to a human.
pub const DEFAULT_ESCALATION_TRIGGERS: &[&str] =
    &["transferir", "humano", "agente", "no sé", "no puedo"];

const DEFAULT_FAQ_PATH: &str = "faqs.json";
const DEFAULT_PORT: u16 = 5000;

/// User-visible canned texts.
#[derive(Debug, Clone)]
pub struct BotMessages {
    pub welcome: String,
    pub technical_difficulties: String,
    /// Sent when a generated answer triggers escalation.
    pub escalation_ack: String,
    /// Sent when the user asks for a human explicitly.
    pub explicit_escalation_ack: String,
    pub faq_header: String,
    /// Shown in the support notification when there is no query.
    pub no_query_marker: String,
}

impl Default for BotMessages {
    fn default() -> Self {
        Self {
            welcome: "¡Hola! Soy tu asistente virtual. ¿En qué puedo ayudarte?\n\
                      - Escribe tu pregunta\n\
                      - Usa /help para ayuda\n\
                      - Usa /human para hablar con un agente"
                .to_string(),
            technical_difficulties: "⚠️ Lo siento, estoy teniendo dificultades técnicas."
                .to_string(),
            escalation_ack: "⏳ Un agente humano se contactará contigo en breve.".to_string(),
            explicit_escalation_ack: "🔹 Tu consulta ha sido elevada a nuestro equipo de soporte."
                .to_string(),
            faq_header: "📚 FAQs Disponibles:".to_string(),
            no_query_marker: "(solicitud directa, sin consulta)".to_string(),
        }
    }
}

/// Policy knobs for the triage pipeline.
#[derive(Debug, Clone)]
pub struct TriageConfig {
    /// Case-insensitive substrings that flag a generated answer for escalation.
    pub escalation_triggers: Vec<String>,
    /// Prompt template; must contain [`QUERY_PLACEHOLDER`].
    pub prompt_template: String,
    /// Upper bound on one completion call (timeouts count as failures).
    pub completion_timeout: Duration,
    /// Upper bound on one escalation notification attempt.
    pub escalation_timeout: Duration,
    pub messages: BotMessages,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            escalation_triggers: DEFAULT_ESCALATION_TRIGGERS
                .iter()
                .map(|t| t.to_string())
                .collect(),
            prompt_template: DEFAULT_PROMPT_TEMPLATE.to_string(),
            completion_timeout: Duration::from_secs(30),
            escalation_timeout: Duration::from_secs(10),
            messages: BotMessages::default(),
        }
    }
}

/// How Telegram delivers updates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelegramTransport {
    /// Long-poll `getUpdates`.
    Polling,
    /// Register a webhook and serve it on `listen`.
    Webhook { listen: SocketAddr, base_url: String },
}

/// Where user messages come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportMode {
    Telegram(TelegramTransport),
    /// Local stdin/stdout REPL; escalations still go to the support chat.
    Cli,
}

/// Telegram gateway settings.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: SecretString,
    /// Chat that receives escalation notices.
    pub support_chat_id: String,
    pub mode: TransportMode,
}

/// Full process configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub telegram: TelegramConfig,
    pub llm: LlmConfig,
    pub faq_path: PathBuf,
    pub log_dir: Option<PathBuf>,
    pub triage: TriageConfig,
}

impl BotConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required =
            |key: &str| var(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()));

        let bot_token = required("TELEGRAM_TOKEN")?;
        let support_chat_id = required("SUPPORT_CHAT_ID")?;
        let gemini_key = required("GEMINI_API_KEY")?;

        let backend = match var("HELPDESK_LLM_BACKEND") {
            Some(raw) => raw.parse::<LlmBackend>().map_err(|message| {
                ConfigError::InvalidValue {
                    key: "HELPDESK_LLM_BACKEND".into(),
                    message,
                }
            })?,
            None => LlmBackend::Gemini,
        };
        let api_key = match backend {
            LlmBackend::Gemini => gemini_key,
            LlmBackend::Anthropic => required("ANTHROPIC_API_KEY")?,
            LlmBackend::OpenAi => required("OPENAI_API_KEY")?,
        };
        let model =
            var("HELPDESK_MODEL").unwrap_or_else(|| backend.default_model().to_string());

        let port = parse_or("PORT", var("PORT"), DEFAULT_PORT)?;
        let mode = match var("HELPDESK_MODE").as_deref() {
            None | Some("polling") => TransportMode::Telegram(TelegramTransport::Polling),
            Some("webhook") => {
                let base_url = var("HELPDESK_BASE_URL")
                    .or_else(|| var("RENDER_EXTERNAL_URL"))
                    .unwrap_or_else(|| format!("http://localhost:{port}"));
                TransportMode::Telegram(TelegramTransport::Webhook {
                    listen: SocketAddr::from(([0, 0, 0, 0], port)),
                    base_url: base_url.trim_end_matches('/').to_string(),
                })
            }
            Some("cli") => TransportMode::Cli,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "HELPDESK_MODE".into(),
                    message: format!("expected 'polling', 'webhook' or 'cli', got '{other}'"),
                });
            }
        };

        let mut triage = TriageConfig::default();
        if let Some(raw) = var("HELPDESK_ESCALATION_TRIGGERS") {
            let triggers: Vec<String> = raw
                .split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect();
            if triggers.is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: "HELPDESK_ESCALATION_TRIGGERS".into(),
                    message: "at least one trigger is required".into(),
                });
            }
            triage.escalation_triggers = triggers;
        }
        if let Some(path) = var("HELPDESK_PROMPT_TEMPLATE_PATH") {
            let template = std::fs::read_to_string(&path)?;
            if !template.contains(QUERY_PLACEHOLDER) {
                return Err(ConfigError::InvalidValue {
                    key: "HELPDESK_PROMPT_TEMPLATE_PATH".into(),
                    message: format!("template {path} has no {QUERY_PLACEHOLDER} placeholder"),
                });
            }
            triage.prompt_template = template;
        }
        triage.completion_timeout = parse_timeout(
            "HELPDESK_COMPLETION_TIMEOUT_SECS",
            var("HELPDESK_COMPLETION_TIMEOUT_SECS"),
            triage.completion_timeout,
        )?;
        triage.escalation_timeout = parse_timeout(
            "HELPDESK_ESCALATION_TIMEOUT_SECS",
            var("HELPDESK_ESCALATION_TIMEOUT_SECS"),
            triage.escalation_timeout,
        )?;

        Ok(Self {
            telegram: TelegramConfig {
                bot_token: SecretString::from(bot_token),
                support_chat_id,
                mode,
            },
            llm: LlmConfig {
                backend,
                api_key: SecretString::from(api_key),
                model,
            },
            faq_path: var("HELPDESK_FAQ_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_FAQ_PATH)),
            log_dir: var("HELPDESK_LOG_DIR").map(PathBuf::from),
            triage,
        })
    }
}

/// Whole seconds, at least one.
fn parse_timeout(
    key: &str,
    raw: Option<String>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match parse_or(key, raw, default.as_secs())? {
        0 => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "timeout must be at least 1 second".into(),
        }),
        secs => Ok(Duration::from_secs(secs)),
    }
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}
