//! Draft generation over masked text.
//!
//! The orchestrator never returns an error: transport and parse failures
//! become [`AiOutcome::fallback`] so the ticket still lands for manual review.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::knowledge::{ContextProvider, NoContext};
use crate::llm::TextGenerator;
use crate::pipeline::types::AiOutcome;
use crate::tickets::model::{Category, Sentiment};

/// Snippets pulled from the knowledge base per message.
const CONTEXT_TOP_K: usize = 3;

const SPAM_MARKERS: &[&str] = &["реклам", "скидк", "распродаж", "spam", "unsubscribe"];
const URGENT_MARKERS: &[&str] = &["срочн", "утечк", "взрыв", "авари", "urgent", "leak"];
const NEGATIVE_MARKERS: &[&str] = &["сломал", "не работает", "неисправ", "ошибк", "жалоб"];
const GRATITUDE_MARKERS: &[&str] = &["спасибо", "благодар"];
const CALIBRATION_MARKERS: &[&str] = &["калибр", "поверк"];
const DOCUMENTATION_MARKERS: &[&str] = &["документ", "паспорт", "инструкц", "сертификат"];

const INSTRUCTIONS: &str = "Ты инженер службы поддержки производителя газоаналитического оборудования.\n\
Персональные данные в письме заменены метками вида <NAME_1>, <DEVICE_1>, <PHONE_1>, <EMAIL_1>.\n\
Ответь строго одним JSON-объектом без пояснений:\n\
{\"sentiment\": \"positive|negative|neutral\", \
\"category\": \"malfunction|calibration|documentation|consultation|spam|gratitude\", \
\"important\": false, \"summary\": \"...\", \"answer\": \"...\"}\n\
Правила:\n\
- important=true только при угрозе безопасности: утечка газа, взрыв, пометка \"срочно\".\n\
- summary: одно предложение о сути обращения.\n\
- answer: вежливый ответ клиенту. Используй метки из письма вместо имён и номеров. \
К метке имени можно добавить падеж: <NAME_1_NOM>, <NAME_1_GEN>, <NAME_1_DAT>, \
<NAME_1_ACC>, <NAME_1_INS>, <NAME_1_ABL>.\n\
- Для спама answer = null.";

/// Where drafts come from.
#[derive(Clone)]
pub enum DraftBackend {
    /// Keyword rules, no network.
    Mock,
    Live(Arc<dyn TextGenerator>),
}

impl std::fmt::Debug for DraftBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mock => f.write_str("Mock"),
            Self::Live(g) => write!(f, "Live({})", g.model_name()),
        }
    }
}

#[derive(Clone)]
pub struct AiResponseOrchestrator {
    backend: DraftBackend,
    context: Arc<dyn ContextProvider>,
}

impl AiResponseOrchestrator {
    pub fn new(backend: DraftBackend, context: Arc<dyn ContextProvider>) -> Self {
        Self { backend, context }
    }

    pub fn mock() -> Self {
        Self::new(DraftBackend::Mock, Arc::new(NoContext))
    }

    pub async fn process(&self, masked: &str, device_hint: Option<&str>) -> AiOutcome {
        self.process_with_default(masked, device_hint, false).await
    }

    /// Like [`process`](Self::process), with the `important` value used if
    /// drafting fails.
    pub async fn process_with_default(
        &self,
        masked: &str,
        device_hint: Option<&str>,
        important_default: bool,
    ) -> AiOutcome {
        let generator = match &self.backend {
            DraftBackend::Mock => return mock_outcome(masked),
            DraftBackend::Live(generator) => generator,
        };

        let snippets = self.context.query(masked, CONTEXT_TOP_K).await;
        let prompt = build_prompt(masked, device_hint, &snippets);

        let raw = match generator.generate(&prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(model = generator.model_name(), error = %e, "Draft generation failed");
                return AiOutcome::fallback(format!("Ошибка генерации ответа: {e}"), important_default);
            }
        };

        match parse_outcome(&raw) {
            Ok(outcome) => {
                debug!(category = %outcome.category, important = outcome.important, "Draft parsed");
                outcome
            }
            Err(reason) => {
                warn!(raw_response = %raw, error = %reason, "Unparseable draft response");
                AiOutcome::fallback(format!("Некорректный ответ модели: {reason}"), important_default)
            }
        }
    }
}

fn build_prompt(masked: &str, device_hint: Option<&str>, snippets: &[String]) -> String {
    let mut prompt = String::with_capacity(INSTRUCTIONS.len() + masked.len() + 256);
    prompt.push_str(INSTRUCTIONS);

    if !snippets.is_empty() {
        prompt.push_str("\n\nБаза знаний:\n");
        for snippet in snippets {
            prompt.push_str("- ");
            prompt.push_str(snippet);
            prompt.push('\n');
        }
    }

    if let Some(device) = device_hint {
        prompt.push_str(&format!("\nПрибор клиента: {device}\n"));
    }

    prompt.push_str("\nПисьмо:\n");
    prompt.push_str(masked);
    prompt
}

#[derive(Debug, Deserialize)]
struct RawAiResponse {
    #[serde(default)]
    sentiment: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    important: Option<bool>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    answer: Option<String>,
}

fn parse_outcome(raw: &str) -> Result<AiOutcome, String> {
    let (Some(start), Some(end)) = (raw.find('{'), raw.rfind('}')) else {
        return Err("no JSON object in response".into());
    };
    if end < start {
        return Err("no JSON object in response".into());
    }

    let parsed: RawAiResponse =
        serde_json::from_str(&raw[start..=end]).map_err(|e| format!("JSON parse error: {e}"))?;

    let summary = parsed
        .summary
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| "missing summary".to_string())?;

    Ok(AiOutcome {
        sentiment: parsed
            .sentiment
            .and_then(|s| s.parse().ok())
            .unwrap_or(Sentiment::Neutral),
        category: parsed
            .category
            .and_then(|c| c.parse().ok())
            .unwrap_or(Category::Consultation),
        summary,
        answer: parsed.answer.filter(|a| !a.trim().is_empty()),
        important: parsed.important.unwrap_or(false),
        manual_required: false,
    })
}

fn contains_any(haystack: &str, markers: &[&str]) -> bool {
    markers.iter().any(|m| haystack.contains(m))
}

/// Deterministic canned draft for offline runs.
fn mock_outcome(masked: &str) -> AiOutcome {
    let lower = masked.to_lowercase();
    let important = contains_any(&lower, URGENT_MARKERS);

    if contains_any(&lower, SPAM_MARKERS) {
        return AiOutcome {
            sentiment: Sentiment::Neutral,
            category: Category::Spam,
            summary: "Рекламная рассылка".into(),
            answer: None,
            important,
            manual_required: false,
        };
    }

    let negative = contains_any(&lower, NEGATIVE_MARKERS);
    let (sentiment, category) = if contains_any(&lower, GRATITUDE_MARKERS) && !negative {
        (Sentiment::Positive, Category::Gratitude)
    } else if negative || important {
        (Sentiment::Negative, Category::Malfunction)
    } else if contains_any(&lower, CALIBRATION_MARKERS) {
        (Sentiment::Neutral, Category::Calibration)
    } else if contains_any(&lower, DOCUMENTATION_MARKERS) {
        (Sentiment::Neutral, Category::Documentation)
    } else {
        (Sentiment::Neutral, Category::Consultation)
    };

    let has_name = masked.contains("<NAME_1>");
    let has_device = masked.contains("<DEVICE_1>");

    let summary = match (has_name, has_device) {
        (true, true) => format!("<NAME_1> обращается по прибору <DEVICE_1> ({category})"),
        (true, false) => format!("<NAME_1> обращается в поддержку ({category})"),
        (false, true) => format!("Обращение по прибору <DEVICE_1> ({category})"),
        (false, false) => format!("Обращение в поддержку ({category})"),
    };

    let mut answer = if has_name {
        "Здравствуйте, <NAME_1_NOM>!".to_string()
    } else {
        "Здравствуйте!".to_string()
    };
    answer.push_str(" Ваше обращение зарегистрировано.");
    if has_device {
        answer.push_str(" Специалист проверит информацию по прибору <DEVICE_1>.");
    }
    if important {
        answer.push_str(" Обращение отмечено как срочное.");
    }
    answer.push_str(" Мы свяжемся с вами в ближайшее время.");

    AiOutcome {
        sentiment,
        category,
        summary,
        answer: Some(answer),
        important,
        manual_required: false,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::error::LlmError;

    struct StubGenerator {
        reply: Result<String, String>,
        prompts: Mutex<Vec<String>>,
    }

    impl StubGenerator {
        fn ok(reply: &str) -> Arc<Self> {
            Arc::new(Self { reply: Ok(reply.into()), prompts: Mutex::new(Vec::new()) })
        }

        fn failing(reason: &str) -> Arc<Self> {
            Arc::new(Self { reply: Err(reason.into()), prompts: Mutex::new(Vec::new()) })
        }
    }

    #[async_trait]
    impl TextGenerator for StubGenerator {
        fn model_name(&self) -> &str {
            "stub"
        }

        async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.reply.clone().map_err(|reason| LlmError::RequestFailed {
                provider: "stub".into(),
                reason,
            })
        }
    }

    struct FixedContext(Vec<String>);

    #[async_trait]
    impl ContextProvider for FixedContext {
        async fn query(&self, _text: &str, top_k: usize) -> Vec<String> {
            self.0.iter().take(top_k).cloned().collect()
        }
    }

    fn live(generator: Arc<StubGenerator>) -> AiResponseOrchestrator {
        AiResponseOrchestrator::new(DraftBackend::Live(generator), Arc::new(NoContext))
    }

    #[tokio::test]
    async fn failing_generator_falls_back_to_manual_review() {
        let orchestrator = live(StubGenerator::failing("connection refused"));
        let outcome = orchestrator.process("<NAME_1> пишет", None).await;
        assert!(outcome.manual_required);
        assert!(!outcome.summary.is_empty());
        assert_eq!(outcome.category, Category::ProcessingError);
        assert!(!outcome.important);
        assert!(outcome.answer.is_none());
    }

    #[tokio::test]
    async fn invalid_json_falls_back_with_caller_default() {
        let orchestrator = live(StubGenerator::ok("Sure! {not json at all}"));
        let outcome = orchestrator.process_with_default("text", None, true).await;
        assert!(outcome.manual_required);
        assert!(outcome.important);
        assert!(!outcome.summary.is_empty());
    }

    #[tokio::test]
    async fn response_without_object_falls_back() {
        let orchestrator = live(StubGenerator::ok("I cannot help with that"));
        let outcome = orchestrator.process("text", None).await;
        assert!(outcome.manual_required);
        assert_eq!(outcome.sentiment, Sentiment::Neutral);
    }

    #[tokio::test]
    async fn wrapped_json_is_parsed() {
        let reply = "```json\n{\"sentiment\": \"negative\", \"category\": \"malfunction\", \
                     \"important\": true, \"summary\": \"Прибор не включается\", \
                     \"answer\": \"Здравствуйте, <NAME_1_NOM>!\"}\n```";
        let orchestrator = live(StubGenerator::ok(reply));
        let outcome = orchestrator.process("<NAME_1>: прибор не включается", None).await;
        assert!(!outcome.manual_required);
        assert!(outcome.important);
        assert_eq!(outcome.sentiment, Sentiment::Negative);
        assert_eq!(outcome.category, Category::Malfunction);
        assert_eq!(outcome.summary, "Прибор не включается");
        assert_eq!(outcome.answer.as_deref(), Some("Здравствуйте, <NAME_1_NOM>!"));
    }

    #[tokio::test]
    async fn unknown_labels_get_defaults() {
        let reply = r#"{"sentiment": "furious", "category": "other", "summary": "Вопрос", "answer": null}"#;
        let outcome = live(StubGenerator::ok(reply)).process("text", None).await;
        assert_eq!(outcome.sentiment, Sentiment::Neutral);
        assert_eq!(outcome.category, Category::Consultation);
        assert!(!outcome.important);
        assert!(outcome.answer.is_none());
        assert!(!outcome.manual_required);
    }

    #[tokio::test]
    async fn missing_summary_is_invalid() {
        let reply = r#"{"sentiment": "neutral", "category": "spam"}"#;
        let outcome = live(StubGenerator::ok(reply)).process("text", None).await;
        assert!(outcome.manual_required);
    }

    #[tokio::test]
    async fn prompt_carries_text_hint_and_context() {
        let generator = StubGenerator::ok(r#"{"summary": "ok"}"#);
        let orchestrator = AiResponseOrchestrator::new(
            DraftBackend::Live(generator.clone()),
            Arc::new(FixedContext(vec!["Калибровка раз в год.".into()])),
        );
        orchestrator.process("<NAME_1> спрашивает про калибровку", Some("ДГС ЭРИС-230")).await;

        let prompts = generator.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        let prompt = &prompts[0];
        assert!(prompt.starts_with(INSTRUCTIONS));
        assert!(prompt.contains("База знаний"));
        assert!(prompt.contains("Калибровка раз в год."));
        assert!(prompt.contains("ДГС ЭРИС-230"));
        assert!(prompt.ends_with("<NAME_1> спрашивает про калибровку"));
    }

    #[tokio::test]
    async fn mock_flags_urgent_leak() {
        let outcome = AiResponseOrchestrator::mock()
            .process("Меня зовут <NAME_1>. Срочно! Утечка газа. Прибор <DEVICE_1>.", None)
            .await;
        assert!(outcome.important);
        assert!(!outcome.manual_required);
        assert_eq!(outcome.category, Category::Malfunction);
        let answer = outcome.answer.unwrap();
        assert!(answer.contains("<NAME_1_NOM>"));
        assert!(answer.contains("<DEVICE_1>"));
    }

    #[tokio::test]
    async fn mock_detects_spam() {
        let outcome = AiResponseOrchestrator::mock()
            .process("Только сегодня скидки на рекламу!", None)
            .await;
        assert_eq!(outcome.category, Category::Spam);
        assert!(outcome.answer.is_none());
        assert!(!outcome.important);
    }

    #[tokio::test]
    async fn mock_answer_uses_only_present_placeholders() {
        let outcome = AiResponseOrchestrator::mock()
            .process("Спасибо за быструю помощь с калибровкой!", None)
            .await;
        assert_eq!(outcome.category, Category::Gratitude);
        assert_eq!(outcome.sentiment, Sentiment::Positive);
        let answer = outcome.answer.unwrap();
        assert!(!answer.contains('<'));
        assert!(!outcome.summary.contains('<'));
    }
}
