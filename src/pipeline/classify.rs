//! Tone, threat and type classification.
//!
//! Two interchangeable strategies:
//! - [`RuleClassifier`]: keyword sets checked in descending severity, no LLM.
//! - [`LlmClassifier`]: three sequential single-word completion calls, each
//!   strictly decoded; any failure falls back to that field's default.

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, warn};

use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};
use crate::pipeline::extract::{detect_correspondence_type, keyword_pattern};
use crate::pipeline::types::{
    ClassificationInvalid, ClassificationResult, CorrespondenceType, Tone, clamp_score,
};

/// Max tokens for each single-word classification call.
const CLASSIFY_MAX_TOKENS: u32 = 10;

/// Classification should be as deterministic as the provider allows.
const CLASSIFY_TEMPERATURE: f32 = 0.0;

/// Letter text sent to the classifier is truncated to this many characters.
const CLASSIFY_MAX_CHARS: usize = 4000;

/// Which strategy to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ClassifierMode {
    #[default]
    Rules,
    Llm,
}

impl ClassifierMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "rules" | "rule" | "keywords" => Some(Self::Rules),
            "llm" | "delegated" => Some(Self::Llm),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rules => "rules",
            Self::Llm => "llm",
        }
    }
}

/// Classifies letter text. Never fails: unusable signals become defaults.
#[async_trait]
pub trait Classifier: Send + Sync {
    fn name(&self) -> &str;

    async fn classify(&self, text: &str) -> ClassificationResult;
}

/// Build the configured classifier.
pub fn build_classifier(mode: ClassifierMode, llm: Arc<dyn LlmProvider>) -> Arc<dyn Classifier> {
    match mode {
        ClassifierMode::Rules => Arc::new(RuleClassifier::default_rules()),
        ClassifierMode::Llm => Arc::new(LlmClassifier::new(llm)),
    }
}

// ── Rule-based ──────────────────────────────────────────────────────

/// One severity band: any whole-word keyword hit assigns this tone and score.
#[derive(Debug, Clone)]
pub struct SeverityRule {
    pub tone: Tone,
    pub threat_score: u8,
    pattern: Option<Regex>,
}

impl SeverityRule {
    pub fn new<S: AsRef<str>>(tone: Tone, threat_score: u8, keywords: &[S]) -> Self {
        Self {
            tone,
            threat_score,
            pattern: keyword_pattern(keywords),
        }
    }

    /// The first keyword occurrence in `text`, if any.
    pub fn find<'t>(&self, text: &'t str) -> Option<&'t str> {
        self.pattern.as_ref()?.find(text).map(|m| m.as_str())
    }
}

/// Keyword-set classifier.
pub struct RuleClassifier {
    /// Highest severity first.
    rules: Vec<SeverityRule>,
}

impl RuleClassifier {
    /// Create a classifier with the default keyword sets.
    pub fn default_rules() -> Self {
        Self::new(vec![
            SeverityRule::new(
                Tone::Threat,
                90,
                &[
                    "bailiff",
                    "enforcement agent",
                    "enforcement officer",
                    "high court enforcement",
                    "warrant",
                    "seize",
                    "seized",
                    "seizure",
                    "take control of goods",
                    "committal",
                    "imprisonment",
                    "forced entry",
                    "repossess",
                    "repossession",
                    "repossessed",
                    "disconnect",
                    "disconnection",
                    "disconnected",
                ],
            ),
            SeverityRule::new(
                Tone::Escalation,
                70,
                &[
                    "summons",
                    "final notice",
                    "final demand",
                    "court action",
                    "county court",
                    "legal proceedings",
                    "legal action",
                    "ccj",
                    "letter before action",
                    "default notice",
                ],
            ),
            SeverityRule::new(
                Tone::Demand,
                50,
                &[
                    "demand",
                    "overdue",
                    "arrears",
                    "must pay",
                    "payment is required",
                    "immediately",
                    "within 7 days",
                    "within 14 days",
                    "reminder",
                ],
            ),
            SeverityRule::new(
                Tone::Request,
                20,
                &[
                    "please provide",
                    "please confirm",
                    "please contact",
                    "please send",
                    "please return",
                    "please complete",
                    "kindly",
                    "we request",
                    "we would be grateful",
                    "could you",
                    "we ask that you",
                ],
            ),
        ])
    }

    /// Create a classifier from explicit rules. Rules are sorted by severity.
    pub fn new(mut rules: Vec<SeverityRule>) -> Self {
        rules.sort_by(|a, b| b.tone.cmp(&a.tone).then(b.threat_score.cmp(&a.threat_score)));
        Self { rules }
    }

    /// Synchronous evaluation.
    pub fn evaluate(&self, text: &str) -> ClassificationResult {
        let correspondence_type = detect_correspondence_type(text);

        for rule in &self.rules {
            if let Some(keyword) = rule.find(text) {
                debug!(
                    tone = %rule.tone,
                    keyword = %keyword,
                    "Severity rule matched"
                );
                return ClassificationResult::new(
                    rule.tone,
                    i64::from(rule.threat_score),
                    correspondence_type,
                );
            }
        }

        ClassificationResult::new(Tone::default(), 0, correspondence_type)
    }
}

#[async_trait]
impl Classifier for RuleClassifier {
    fn name(&self) -> &str {
        "rules"
    }

    async fn classify(&self, text: &str) -> ClassificationResult {
        self.evaluate(text)
    }
}

// ── Delegated ───────────────────────────────────────────────────────

/// Classifier that asks a completion service one question per field.
pub struct LlmClassifier {
    llm: Arc<dyn LlmProvider>,
}

impl LlmClassifier {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// One single-purpose call. Service errors come back as `None`.
    async fn ask(&self, field: &'static str, instruction: String, text: &str) -> Option<String> {
        let letter: String = text.chars().take(CLASSIFY_MAX_CHARS).collect();
        let request = CompletionRequest::new(vec![
            ChatMessage::system(instruction),
            ChatMessage::user(letter),
        ])
        .with_max_tokens(CLASSIFY_MAX_TOKENS)
        .with_temperature(CLASSIFY_TEMPERATURE);

        match self.llm.complete(request).await {
            Ok(response) => Some(response.content),
            Err(e) => {
                warn!(field, error = %e, "Classification call failed, using default");
                None
            }
        }
    }
}

#[async_trait]
impl Classifier for LlmClassifier {
    fn name(&self) -> &str {
        "llm"
    }

    async fn classify(&self, text: &str) -> ClassificationResult {
        let tone = self
            .ask("tone", tone_instruction(), text)
            .await
            .map(|raw| Tone::decode(&raw))
            .map_or_else(Tone::default, |r| or_default(r, Tone::default()));

        let correspondence_type = self
            .ask("correspondence type", type_instruction(), text)
            .await
            .map(|raw| CorrespondenceType::decode(&raw))
            .map_or_else(CorrespondenceType::default, |r| {
                or_default(r, CorrespondenceType::default())
            });

        let threat_score = self
            .ask("threat score", score_instruction(), text)
            .await
            .map(|raw| decode_score(&raw))
            .map_or(0, |r| or_default(r, 0));

        ClassificationResult {
            tone,
            threat_score,
            correspondence_type,
        }
    }
}

/// Recover from a decode failure by substituting the default.
fn or_default<T>(result: Result<T, ClassificationInvalid>, default: T) -> T {
    result.unwrap_or_else(|e| {
        warn!(field = e.field, raw = %e.raw, "Invalid classifier output, using default");
        default
    })
}

/// Strictly decode a numeric score and clamp it into `0..=100`.
pub fn decode_score(raw: &str) -> Result<u8, ClassificationInvalid> {
    let trimmed = raw.trim().trim_end_matches('.').trim_end_matches('%').trim();
    if let Ok(n) = trimmed.parse::<i64>() {
        return Ok(clamp_score(n));
    }
    match trimmed.parse::<f64>() {
        Ok(f) if f.is_finite() => Ok(clamp_score(f.round() as i64)),
        _ => Err(ClassificationInvalid {
            field: "threat score",
            raw: raw.to_string(),
        }),
    }
}

fn tone_instruction() -> String {
    let words: Vec<&str> = Tone::ALL.iter().map(|t| t.as_str()).collect();
    format!(
        "Classify the tone of the letter you are given. \
         Reply with exactly one word from this list and nothing else: {}.",
        words.join(", ")
    )
}

fn type_instruction() -> String {
    let words: Vec<&str> = CorrespondenceType::ALL.iter().map(|t| t.as_str()).collect();
    format!(
        "Classify who sent the letter you are given. \
         Reply with exactly one word from this list and nothing else: {}.",
        words.join(", ")
    )
}

fn score_instruction() -> String {
    "Rate how threatening the letter you are given is, from 0 (routine) to 100 \
     (imminent enforcement). Reply with a single integer and nothing else."
        .to_string()
}
