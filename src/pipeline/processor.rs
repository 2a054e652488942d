//! Letter processor: turns an uploaded letter into a delivered draft reply.
//!
//! Flow per request:
//! 1. Download attachment → OCR → raw text (`Extracted`)
//! 2. Entity extraction + classification (`Classified`)
//! 3. Reference rotation + prompt assembly (`Composed`)
//! 4. Drafting call (`Generated`)
//! 5. Inline or file delivery (`Delivered`)
//!
//! Any failure moves the request to `Failed`, skips the remaining stages and
//! is reported to the requester as one message. Nothing is retried.

use std::sync::Arc;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::error::{LlmError, PipelineError};
use crate::llm::provider::LlmProvider;
use crate::ocr::OcrService;
use crate::pipeline::classify::Classifier;
use crate::pipeline::compose::{ComposedPrompt, compose, compose_question};
use crate::pipeline::extract::extract;
use crate::pipeline::faq::FaqTable;
use crate::pipeline::references::{MAXIMS, case_law_for};
use crate::pipeline::rotation::{RotationStore, select};
use crate::pipeline::router::{ArtifactStore, ResponseRouter};
use crate::pipeline::types::{
    AttachmentSource, ClassificationResult, CorrespondenceType, DeliveryChannel, DeliveryMode,
    DeliveryOutcome, EntitySet, GeneratedResponse, LetterRequest, Recipient, ReferenceFamily,
    ReferenceSelection, ReplyTarget, Stage,
};

/// Summary of a successfully delivered letter.
#[derive(Debug, Clone)]
pub struct ProcessedLetter {
    pub request_id: Uuid,
    pub entities: EntitySet,
    pub classification: ClassificationResult,
    pub references: ReferenceSelection,
    /// Cursor values used for (case law, maxim).
    pub cursors: (u64, u64),
    pub response_chars: usize,
    pub outcome: DeliveryOutcome,
}

/// Tracks the stage a request has reached, for failure reporting.
struct StageTracker {
    request_id: Uuid,
    stage: Stage,
}

impl StageTracker {
    fn new(request_id: Uuid) -> Self {
        Self {
            request_id,
            stage: Stage::Received,
        }
    }

    fn advance(&mut self, stage: Stage) {
        debug!(
            request_id = %self.request_id,
            from = self.stage.as_str(),
            to = stage.as_str(),
            "Stage transition"
        );
        self.stage = stage;
    }
}

/// Orchestrates the drafting pipeline. Shared across concurrent requests.
pub struct LetterProcessor {
    llm: Arc<dyn LlmProvider>,
    ocr: Arc<dyn OcrService>,
    classifier: Arc<dyn Classifier>,
    rotation: Arc<RotationStore>,
    router: ResponseRouter,
    faq: FaqTable,
    config: PipelineConfig,
}

impl LetterProcessor {
    /// Create a new letter processor.
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        ocr: Arc<dyn OcrService>,
        classifier: Arc<dyn Classifier>,
        rotation: Arc<RotationStore>,
        config: PipelineConfig,
    ) -> Self {
        let router = ResponseRouter::new(
            config.inline_limit,
            ArtifactStore::new(&config.export_dir, config.export_prefix.clone()),
            config.keep_exports,
        );
        Self {
            llm,
            ocr,
            classifier,
            rotation,
            router,
            faq: FaqTable::empty(),
            config,
        }
    }

    /// Attach an FAQ table for `/ask` questions.
    pub fn with_faq(mut self, faq: FaqTable) -> Self {
        self.faq = faq;
        self
    }

    pub fn rotation(&self) -> &Arc<RotationStore> {
        &self.rotation
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn recipient(&self) -> Recipient {
        if self.config.private_delivery {
            Recipient::Private
        } else {
            Recipient::Context
        }
    }

    /// Process a letter and report any failure to the requester.
    pub async fn handle(
        &self,
        request: &LetterRequest,
        source: &dyn AttachmentSource,
        channel: &dyn DeliveryChannel,
    ) -> Result<ProcessedLetter, PipelineError> {
        let result = self.process(request, source, channel).await;
        if let Err(ref e) = result {
            self.report_failure(channel, &request.reply_to, e).await;
        }
        result
    }

    /// Run a letter through every stage.
    pub async fn process(
        &self,
        request: &LetterRequest,
        source: &dyn AttachmentSource,
        channel: &dyn DeliveryChannel,
    ) -> Result<ProcessedLetter, PipelineError> {
        info!(
            request_id = %request.id,
            requester = %request.requester,
            "Processing letter"
        );

        let mut tracker = StageTracker::new(request.id);
        match self.run(request, source, channel, &mut tracker).await {
            Ok(processed) => {
                tracker.advance(Stage::Delivered);
                info!(
                    request_id = %request.id,
                    tone = %processed.classification.tone,
                    threat_score = processed.classification.threat_score,
                    mode = ?processed.outcome.channel,
                    "Letter processed"
                );
                Ok(processed)
            }
            Err(e) => {
                error!(
                    request_id = %request.id,
                    stage = tracker.stage.as_str(),
                    kind = e.kind().as_str(),
                    error = %e,
                    "Letter processing failed"
                );
                tracker.advance(Stage::Failed);
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        request: &LetterRequest,
        source: &dyn AttachmentSource,
        channel: &dyn DeliveryChannel,
        tracker: &mut StageTracker,
    ) -> Result<ProcessedLetter, PipelineError> {
        // Step 1: attachment → text
        let attachment = request
            .attachment
            .as_ref()
            .ok_or(PipelineError::NoAttachment)?;
        let bytes = source.fetch(attachment).await?;
        debug!(request_id = %request.id, bytes = bytes.len(), "Attachment downloaded");

        let text = self
            .ocr
            .extract_text(&bytes, attachment.mime_type.as_deref())
            .await?;
        if text.trim().is_empty() {
            return Err(PipelineError::EmptyExtraction);
        }
        tracker.advance(Stage::Extracted);

        // Step 2: entities + classification
        let entities = extract(&text);
        let classification = self.classifier.classify(&text).await;
        tracker.advance(Stage::Classified);

        // Step 3: rotation + prompt
        let case_type = effective_type(&entities, &classification);
        let (references, cursors) = self.select_references(&request.requester, case_type).await;
        let prompt = compose(&text, &entities, &classification, &references);
        tracker.advance(Stage::Composed);

        // Step 4: drafting
        let response = self.generate(prompt).await?;
        tracker.advance(Stage::Generated);

        // Step 5: delivery
        let address = request.reply_to.address(self.recipient());
        let outcome = self.router.route(&response, channel, address).await?;

        Ok(ProcessedLetter {
            request_id: request.id,
            entities,
            classification,
            references,
            cursors,
            response_chars: response.chars,
            outcome,
        })
    }

    /// Answer a free-text question: FAQ link if covered, otherwise a drafted answer.
    pub async fn answer(
        &self,
        requester: &str,
        reply_to: &ReplyTarget,
        question: &str,
        channel: &dyn DeliveryChannel,
    ) -> Result<DeliveryOutcome, PipelineError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(PipelineError::EmptyQuestion);
        }

        if let Some(reply) = self.faq.answer(question) {
            info!(requester, "Question answered from FAQ");
            channel
                .send_text(reply_to.address(self.recipient()), &reply)
                .await?;
            return Ok(DeliveryOutcome {
                channel: DeliveryMode::Inline,
                success: true,
            });
        }

        info!(requester, chars = question.chars().count(), "Answering question");
        let response = self.generate(compose_question(question)).await?;
        self.router
            .route(&response, channel, reply_to.address(self.recipient()))
            .await
    }

    /// Answer a question and report any failure to the requester.
    pub async fn handle_question(
        &self,
        requester: &str,
        reply_to: &ReplyTarget,
        question: &str,
        channel: &dyn DeliveryChannel,
    ) -> Result<DeliveryOutcome, PipelineError> {
        let result = self.answer(requester, reply_to, question, channel).await;
        if let Err(ref e) = result {
            warn!(requester, kind = e.kind().as_str(), error = %e, "Question failed");
            self.report_failure(channel, reply_to, e).await;
        }
        result
    }

    /// Advance both rotation cursors and pick the references they point at.
    async fn select_references(
        &self,
        requester: &str,
        case_type: CorrespondenceType,
    ) -> (ReferenceSelection, (u64, u64)) {
        let case_cursor = self
            .rotation
            .next_index(requester, ReferenceFamily::CaseLaw)
            .await;
        let maxim_cursor = self
            .rotation
            .next_index(requester, ReferenceFamily::Maxim)
            .await;

        let selection = ReferenceSelection {
            case_law: select(case_law_for(case_type), case_cursor)
                .unwrap_or_default()
                .to_string(),
            maxim: select(MAXIMS, maxim_cursor).unwrap_or_default().to_string(),
        };
        (selection, (case_cursor, maxim_cursor))
    }

    async fn generate(&self, prompt: ComposedPrompt) -> Result<GeneratedResponse, PipelineError> {
        let request = prompt.into_request(self.config.max_tokens, self.config.temperature);
        let completion = self.llm.complete(request).await?;
        if completion.content.trim().is_empty() {
            return Err(PipelineError::GenerationFailed(LlmError::InvalidResponse {
                provider: self.llm.model_name().to_string(),
                reason: "empty completion".into(),
            }));
        }
        let response = GeneratedResponse::new(completion.content);
        debug!(
            model = self.llm.model_name(),
            chars = response.chars,
            input_tokens = completion.input_tokens,
            output_tokens = completion.output_tokens,
            "Draft generated"
        );
        Ok(response)
    }

    /// Report a failure through the original request context.
    async fn report_failure(
        &self,
        channel: &dyn DeliveryChannel,
        reply_to: &ReplyTarget,
        err: &PipelineError,
    ) {
        let message = err.user_message();
        if let Err(send_err) = channel
            .send_text(reply_to.address(Recipient::Context), &message)
            .await
        {
            warn!(error = %send_err, "Could not report failure to requester");
        }
    }
}

/// Classifier type, unless it is the generic default and extraction found better.
fn effective_type(entities: &EntitySet, classification: &ClassificationResult) -> CorrespondenceType {
    if classification.correspondence_type == CorrespondenceType::General {
        entities.correspondence_type
    } else {
        classification.correspondence_type
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::error::{ChannelError, ErrorKind, OcrError};
    use crate::llm::provider::{CompletionRequest, CompletionResponse};
    use crate::pipeline::classify::RuleClassifier;
    use crate::pipeline::faq::FaqEntry;
    use crate::pipeline::types::{Attachment, Tone};

    // ── Stubs ───────────────────────────────────────────────────────

    /// Mock LLM that returns a fixed draft and records prompts.
    struct MockDraftLlm {
        response: Result<String, ()>,
        prompts: Mutex<Vec<CompletionRequest>>,
    }

    impl MockDraftLlm {
        fn ok(response: &str) -> Arc<Self> {
            Arc::new(Self {
                response: Ok(response.into()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                response: Err(()),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LlmProvider for MockDraftLlm {
        fn model_name(&self) -> &str {
            "mock-draft"
        }

        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            self.prompts.lock().unwrap().push(request);
            match &self.response {
                Ok(content) => Ok(CompletionResponse {
                    content: content.clone(),
                    input_tokens: 100,
                    output_tokens: 50,
                }),
                Err(()) => Err(LlmError::RequestFailed {
                    provider: "mock".into(),
                    reason: "rate limited".into(),
                }),
            }
        }
    }

    struct FixedOcr(&'static str);

    #[async_trait]
    impl OcrService for FixedOcr {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn extract_text(
            &self,
            _bytes: &[u8],
            _mime_type: Option<&str>,
        ) -> Result<String, OcrError> {
            Ok(self.0.to_string())
        }
    }

    struct BytesSource {
        fail: bool,
    }

    #[async_trait]
    impl AttachmentSource for BytesSource {
        async fn fetch(&self, _attachment: &Attachment) -> Result<Vec<u8>, ChannelError> {
            if self.fail {
                Err(ChannelError::DownloadFailed {
                    name: "test".into(),
                    reason: "HTTP 404".into(),
                })
            } else {
                Ok(vec![0xFF, 0xD8, 0xFF])
            }
        }
    }

    /// Records sends per address; refuses the configured address.
    #[derive(Default)]
    struct RecordingChannel {
        texts: Mutex<Vec<(String, String)>>,
        files: Mutex<Vec<(String, PathBuf)>>,
        refuse: Option<String>,
    }

    #[async_trait]
    impl DeliveryChannel for RecordingChannel {
        fn name(&self) -> &str {
            "recording"
        }

        async fn send_text(&self, address: &str, text: &str) -> Result<(), ChannelError> {
            if self.refuse.as_deref() == Some(address) {
                return Err(ChannelError::Forbidden {
                    name: "recording".into(),
                    recipient: address.into(),
                });
            }
            self.texts
                .lock()
                .unwrap()
                .push((address.to_string(), text.to_string()));
            Ok(())
        }

        async fn send_file(
            &self,
            address: &str,
            path: &Path,
            _caption: Option<&str>,
        ) -> Result<(), ChannelError> {
            self.files
                .lock()
                .unwrap()
                .push((address.to_string(), path.to_path_buf()));
            Ok(())
        }
    }

    fn config(dir: &Path) -> PipelineConfig {
        PipelineConfig {
            export_dir: dir.to_path_buf(),
            ..Default::default()
        }
    }

    fn processor(llm: Arc<dyn LlmProvider>, text: &'static str, config: PipelineConfig) -> LetterProcessor {
        LetterProcessor::new(
            llm,
            Arc::new(FixedOcr(text)),
            Arc::new(RuleClassifier::default_rules()),
            RotationStore::new(),
            config,
        )
    }

    fn request(requester: &str) -> LetterRequest {
        LetterRequest::new(
            requester,
            Some(Attachment::new("file-1").with_mime_type("image/jpeg")),
            ReplyTarget {
                context: "chat-1".into(),
                requester: "user-1".into(),
            },
        )
    }

    // ── Letter flow ─────────────────────────────────────────────────

    #[tokio::test]
    async fn admin_letter_is_drafted_inline() {
        let dir = tempfile::tempdir().unwrap();
        let llm = MockDraftLlm::ok("Dear Council, thank you.");
        let p = processor(
            llm.clone(),
            "Dear Mrs Jane Doe, your council tax band for 2024 is D.",
            config(dir.path()),
        );
        let channel = RecordingChannel::default();

        let processed = p
            .process(&request("u1"), &BytesSource { fail: false }, &channel)
            .await
            .unwrap();

        assert_eq!(processed.entities.name, "Mrs Jane Doe");
        assert_eq!(processed.classification.tone, Tone::Admin);
        assert_eq!(processed.outcome.channel, DeliveryMode::Inline);
        assert_eq!(
            channel.texts.lock().unwrap().as_slice(),
            [("chat-1".to_string(), "Dear Council, thank you.".to_string())]
        );

        let prompts = llm.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0].max_tokens, Some(1500));
        assert!(prompts[0].last_user_message().unwrap().contains("Mrs Jane Doe"));
    }

    #[tokio::test]
    async fn missing_attachment_fails_and_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let p = processor(MockDraftLlm::ok("x"), "text", config(dir.path()));
        let channel = RecordingChannel::default();
        let mut req = request("u1");
        req.attachment = None;

        let err = p
            .handle(&req, &BytesSource { fail: false }, &channel)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoAttachment);
        let texts = channel.texts.lock().unwrap();
        assert_eq!(texts.len(), 1);
        assert!(texts[0].1.starts_with("Error: No attachment"));
    }

    #[tokio::test]
    async fn download_failure_skips_generation() {
        let dir = tempfile::tempdir().unwrap();
        let llm = MockDraftLlm::ok("x");
        let p = processor(llm.clone(), "text", config(dir.path()));
        let err = p
            .process(
                &request("u1"),
                &BytesSource { fail: true },
                &RecordingChannel::default(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DownloadFailed);
        assert!(llm.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn whitespace_extraction_stops_before_generation() {
        let dir = tempfile::tempdir().unwrap();
        let llm = MockDraftLlm::ok("x");
        let p = processor(llm.clone(), "  \n\t ", config(dir.path()));
        let err = p
            .process(
                &request("u1"),
                &BytesSource { fail: false },
                &RecordingChannel::default(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptyExtraction);
        assert!(llm.prompts.lock().unwrap().is_empty());
        assert!(p.rotation().is_empty().await);
    }

    #[tokio::test]
    async fn generation_failure_is_surfaced() {
        let dir = tempfile::tempdir().unwrap();
        let p = processor(MockDraftLlm::failing(), "Dear Sir", config(dir.path()));
        let channel = RecordingChannel::default();
        let err = p
            .handle(&request("u1"), &BytesSource { fail: false }, &channel)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::GenerationFailed);
        assert!(channel.texts.lock().unwrap()[0].1.contains("rate limited"));
    }

    #[tokio::test]
    async fn empty_completion_is_generation_failure() {
        let dir = tempfile::tempdir().unwrap();
        let p = processor(MockDraftLlm::ok("   "), "Dear Sir", config(dir.path()));
        let err = p
            .process(
                &request("u1"),
                &BytesSource { fail: false },
                &RecordingChannel::default(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::GenerationFailed);
    }

    #[tokio::test]
    async fn private_delivery_refusal_reported_in_context() {
        let dir = tempfile::tempdir().unwrap();
        let p = processor(
            MockDraftLlm::ok("draft"),
            "Dear Sir",
            PipelineConfig {
                private_delivery: true,
                ..config(dir.path())
            },
        );
        let channel = RecordingChannel {
            refuse: Some("user-1".into()),
            ..Default::default()
        };
        let err = p
            .handle(&request("u1"), &BytesSource { fail: false }, &channel)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DeliveryForbidden);
        let texts = channel.texts.lock().unwrap();
        assert_eq!(texts.len(), 1);
        assert_eq!(texts[0].0, "chat-1");
        assert!(texts[0].1.contains("privately"));
    }

    #[tokio::test]
    async fn long_draft_goes_out_as_file() {
        let dir = tempfile::tempdir().unwrap();
        let long = "w".repeat(2500);
        let p = processor(MockDraftLlm::ok(&long), "Dear Sir", config(dir.path()));
        let channel = RecordingChannel::default();
        let processed = p
            .process(&request("u1"), &BytesSource { fail: false }, &channel)
            .await
            .unwrap();
        assert_eq!(processed.outcome.channel, DeliveryMode::File);
        assert_eq!(processed.response_chars, 2500);
        assert_eq!(channel.files.lock().unwrap().len(), 1);
        assert!(channel.texts.lock().unwrap().is_empty());
    }

    // ── Rotation ────────────────────────────────────────────────────

    #[tokio::test]
    async fn consecutive_letters_rotate_maxims() {
        let dir = tempfile::tempdir().unwrap();
        let p = processor(MockDraftLlm::ok("ok"), "Dear Sir", config(dir.path()));
        let channel = RecordingChannel::default();
        let source = BytesSource { fail: false };

        let first = p.process(&request("u1"), &source, &channel).await.unwrap();
        let second = p.process(&request("u1"), &source, &channel).await.unwrap();
        let other = p.process(&request("u2"), &source, &channel).await.unwrap();

        assert_eq!(first.references.maxim, MAXIMS[0]);
        assert_eq!(second.references.maxim, MAXIMS[1]);
        assert_eq!(other.references.maxim, MAXIMS[0]);
        assert_eq!(first.cursors, (0, 0));
        assert_eq!(second.cursors, (1, 1));
    }

    #[test]
    fn effective_type_prefers_specific_classification() {
        let entities = EntitySet {
            correspondence_type: CorrespondenceType::Water,
            ..Default::default()
        };
        let general = ClassificationResult::default();
        assert_eq!(effective_type(&entities, &general), CorrespondenceType::Water);

        let specific =
            ClassificationResult::new(Tone::Admin, 0, CorrespondenceType::Solicitor);
        assert_eq!(effective_type(&entities, &specific), CorrespondenceType::Solicitor);
    }

    // ── Questions ───────────────────────────────────────────────────

    fn reply_to() -> ReplyTarget {
        ReplyTarget {
            context: "chat-1".into(),
            requester: "user-1".into(),
        }
    }

    #[tokio::test]
    async fn faq_question_skips_llm() {
        let dir = tempfile::tempdir().unwrap();
        let llm = MockDraftLlm::ok("llm answer");
        let p = processor(llm.clone(), "", config(dir.path())).with_faq(FaqTable::new(vec![
            FaqEntry {
                keyword: "put home in a trust".into(),
                link: "https://example.org/3".into(),
            },
        ]));
        let channel = RecordingChannel::default();

        let outcome = p
            .answer("u1", &reply_to(), "How do I put home in a trust?", &channel)
            .await
            .unwrap();
        assert_eq!(outcome.channel, DeliveryMode::Inline);
        assert!(llm.prompts.lock().unwrap().is_empty());
        assert_eq!(
            channel.texts.lock().unwrap()[0].1,
            "This has already been answered here: https://example.org/3"
        );
    }

    #[tokio::test]
    async fn faq_reply_follows_private_delivery() {
        let dir = tempfile::tempdir().unwrap();
        let p = processor(
            MockDraftLlm::ok("llm answer"),
            "",
            PipelineConfig {
                private_delivery: true,
                ..config(dir.path())
            },
        )
        .with_faq(FaqTable::new(vec![FaqEntry {
            keyword: "put home in a trust".into(),
            link: "https://example.org/3".into(),
        }]));
        let channel = RecordingChannel::default();

        p.answer("u1", &reply_to(), "How do I put home in a trust?", &channel)
            .await
            .unwrap();
        p.answer("u1", &reply_to(), "What is equitable title?", &channel)
            .await
            .unwrap();

        let texts = channel.texts.lock().unwrap();
        assert_eq!(texts.len(), 2);
        assert!(texts.iter().all(|(address, _)| address == "user-1"));
    }

    #[tokio::test]
    async fn other_questions_use_llm_with_notice() {
        let dir = tempfile::tempdir().unwrap();
        let llm = MockDraftLlm::ok("Equitable title is...");
        let p = processor(llm.clone(), "", config(dir.path()));
        let channel = RecordingChannel::default();

        p.answer("u1", &reply_to(), "What is equitable title?", &channel)
            .await
            .unwrap();

        let prompts = llm.prompts.lock().unwrap();
        assert!(prompts[0].system_prompt().contains("do NOT give legal advice"));
        assert_eq!(prompts[0].last_user_message(), Some("What is equitable title?"));
        assert_eq!(channel.texts.lock().unwrap()[0].1, "Equitable title is...");
    }

    #[tokio::test]
    async fn empty_question_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let p = processor(MockDraftLlm::ok("x"), "", config(dir.path()));
        let channel = RecordingChannel::default();
        let err = p
            .handle_question("u1", &reply_to(), "   ", &channel)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::EmptyQuestion));
        assert!(channel.texts.lock().unwrap()[0].1.contains("/ask"));
    }
}
