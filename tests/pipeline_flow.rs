//! End-to-end tests for the letter drafting pipeline.
//!
//! Each test wires a `LetterProcessor` with stub OCR and LLM collaborators,
//! an in-memory attachment source and a recording delivery channel, then
//! drives it through the public API.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use letter_assist::config::PipelineConfig;
use letter_assist::error::{ChannelError, ErrorKind, LlmError, OcrError};
use letter_assist::llm::provider::{CompletionRequest, CompletionResponse, LlmProvider};
use letter_assist::ocr::OcrService;
use letter_assist::pipeline::LetterProcessor;
use letter_assist::pipeline::classify::RuleClassifier;
use letter_assist::pipeline::references::{MAXIMS, case_law_for};
use letter_assist::pipeline::rotation::RotationStore;
use letter_assist::pipeline::router::DEFAULT_INLINE_LIMIT;
use letter_assist::pipeline::types::{
    Attachment, AttachmentSource, CorrespondenceType, DeliveryChannel, DeliveryMode,
    LetterRequest, ReferenceFamily, ReplyTarget, Tone,
};

// ── Collaborator stubs ──────────────────────────────────────────────

/// Stub LLM provider: returns a fixed reply and counts calls.
struct StubLlm {
    reply: String,
    calls: Mutex<Vec<CompletionRequest>>,
}

impl StubLlm {
    fn new(reply: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.into(),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmProvider for StubLlm {
    fn model_name(&self) -> &str {
        "stub"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.calls.lock().unwrap().push(request);
        Ok(CompletionResponse {
            content: self.reply.clone(),
            input_tokens: 0,
            output_tokens: 0,
        })
    }
}

/// OCR stub keyed by attachment bytes (the test source hands out the reference as bytes).
#[derive(Default)]
struct MapOcr {
    texts: HashMap<Vec<u8>, String>,
}

impl MapOcr {
    fn with(mut self, reference: &str, text: &str) -> Self {
        self.texts.insert(reference.as_bytes().to_vec(), text.to_string());
        self
    }
}

#[async_trait]
impl OcrService for MapOcr {
    fn name(&self) -> &str {
        "map"
    }

    async fn extract_text(&self, bytes: &[u8], _mime: Option<&str>) -> Result<String, OcrError> {
        Ok(self.texts.get(bytes).cloned().unwrap_or_default())
    }
}

/// Serves the attachment reference itself as the file content.
struct EchoSource;

#[async_trait]
impl AttachmentSource for EchoSource {
    async fn fetch(&self, attachment: &Attachment) -> Result<Vec<u8>, ChannelError> {
        Ok(attachment.reference.as_bytes().to_vec())
    }
}

#[derive(Default)]
struct RecordingChannel {
    texts: Mutex<Vec<(String, String)>>,
    files: Mutex<Vec<(String, PathBuf)>>,
}

#[async_trait]
impl DeliveryChannel for RecordingChannel {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send_text(&self, address: &str, text: &str) -> Result<(), ChannelError> {
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

// ── Helpers ─────────────────────────────────────────────────────────

const ADMIN_LETTER: &str = "Dear Mrs Jane Doe,\n\
     Your council tax band for the year starting 01/04/2024 is band C.\n\
     Yours sincerely, Revenues Team";

const THREAT_LETTER: &str = "FINAL NOTICE\n\
     Dear Mr John Smith, your council tax account is in arrears. \
     A liability order summons has been issued and the matter will be \
     passed to a bailiff on 12/03/2024.";

fn processor(llm: Arc<StubLlm>, ocr: MapOcr, export_dir: &Path) -> LetterProcessor {
    LetterProcessor::new(
        llm,
        Arc::new(ocr),
        Arc::new(RuleClassifier::default_rules()),
        RotationStore::new(),
        PipelineConfig {
            export_dir: export_dir.to_path_buf(),
            ..Default::default()
        },
    )
}

fn letter(requester: &str, reference: &str) -> LetterRequest {
    LetterRequest::new(
        requester,
        Some(Attachment::new(reference).with_mime_type("image/png")),
        ReplyTarget {
            context: "chat-1".into(),
            requester: requester.into(),
        },
    )
}

// ── Scenarios ───────────────────────────────────────────────────────

#[tokio::test]
async fn admin_council_tax_letter() {
    let dir = tempfile::tempdir().unwrap();
    let llm = StubLlm::new("Dear Revenues Team, thank you for confirming my band.");
    let p = processor(llm.clone(), MapOcr::default().with("admin", ADMIN_LETTER), dir.path());
    let channel = RecordingChannel::default();

    let processed = p
        .process(&letter("jane", "admin"), &EchoSource, &channel)
        .await
        .unwrap();

    assert_eq!(processed.entities.name, "Mrs Jane Doe");
    assert_eq!(processed.entities.date, "01/04/2024");
    assert_eq!(processed.entities.correspondence_type, CorrespondenceType::CouncilTax);
    assert_eq!(processed.classification.tone, Tone::Admin);
    assert_eq!(processed.classification.threat_score, 0);
    assert_eq!(processed.outcome.channel, DeliveryMode::Inline);
    assert_eq!(llm.call_count(), 1);

    let prompt = llm.calls.lock().unwrap()[0]
        .last_user_message()
        .unwrap()
        .to_string();
    assert!(prompt.contains("Mrs Jane Doe"));
    assert!(prompt.contains("COUNCIL_TAX"));
}

#[tokio::test]
async fn threat_letter_uses_type_case_law_and_advances_cursor() {
    let dir = tempfile::tempdir().unwrap();
    let p = processor(
        StubLlm::new("Dear Sirs, I dispute this."),
        MapOcr::default().with("threat", THREAT_LETTER),
        dir.path(),
    );
    let channel = RecordingChannel::default();

    let before = p.rotation().peek("john", ReferenceFamily::CaseLaw).await;
    let processed = p
        .process(&letter("john", "threat"), &EchoSource, &channel)
        .await
        .unwrap();
    let after = p.rotation().peek("john", ReferenceFamily::CaseLaw).await;

    assert_eq!(processed.classification.tone, Tone::Threat);
    assert!(processed.classification.threat_score >= 80);
    assert_eq!(
        processed.classification.correspondence_type,
        CorrespondenceType::CouncilTax
    );

    let cases = case_law_for(CorrespondenceType::CouncilTax);
    assert_eq!(processed.references.case_law, cases[before as usize % cases.len()]);
    assert_eq!(after, before + 1);
}

#[tokio::test]
async fn maxims_rotate_then_wrap() {
    let dir = tempfile::tempdir().unwrap();
    let p = processor(
        StubLlm::new("reply"),
        MapOcr::default().with("admin", ADMIN_LETTER),
        dir.path(),
    );
    let channel = RecordingChannel::default();

    let mut selected = Vec::new();
    for _ in 0..=MAXIMS.len() {
        let processed = p
            .process(&letter("jane", "admin"), &EchoSource, &channel)
            .await
            .unwrap();
        selected.push(processed.references.maxim);
    }

    assert_eq!(selected[0], MAXIMS[0]);
    assert_eq!(selected[1], MAXIMS[1]);
    assert_ne!(selected[0], selected[1]);
    assert_eq!(selected[MAXIMS.len()], MAXIMS[0]);
}

#[tokio::test]
async fn empty_extraction_never_reaches_generation() {
    let dir = tempfile::tempdir().unwrap();
    let llm = StubLlm::new("unused");
    let p = processor(llm.clone(), MapOcr::default(), dir.path());
    let channel = RecordingChannel::default();

    let err = p
        .handle(&letter("jane", "blank-page"), &EchoSource, &channel)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::EmptyExtraction);
    assert_eq!(llm.call_count(), 0);
    assert_eq!(
        channel.texts.lock().unwrap().as_slice(),
        [(
            "chat-1".to_string(),
            "Error: No readable text was found in the document.".to_string()
        )]
    );
}

#[tokio::test]
async fn routing_boundary_is_exact() {
    let dir = tempfile::tempdir().unwrap();
    let ocr = || MapOcr::default().with("admin", ADMIN_LETTER);
    let channel = RecordingChannel::default();

    let at_limit = processor(StubLlm::new("a".repeat(DEFAULT_INLINE_LIMIT)), ocr(), dir.path());
    let inline = at_limit
        .process(&letter("jane", "admin"), &EchoSource, &channel)
        .await
        .unwrap();
    assert_eq!(inline.outcome.channel, DeliveryMode::Inline);

    let over = processor(StubLlm::new("a".repeat(DEFAULT_INLINE_LIMIT + 1)), ocr(), dir.path());
    let file = over
        .process(&letter("jane", "admin"), &EchoSource, &channel)
        .await
        .unwrap();
    assert_eq!(file.outcome.channel, DeliveryMode::File);

    assert_eq!(channel.texts.lock().unwrap().len(), 1);
    let files = channel.files.lock().unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].0, "chat-1");
}

#[tokio::test]
async fn concurrent_requesters_keep_gapless_cursors() {
    let dir = tempfile::tempdir().unwrap();
    let p = Arc::new(processor(
        StubLlm::new("reply"),
        MapOcr::default().with("admin", ADMIN_LETTER),
        dir.path(),
    ));
    let channel = Arc::new(RecordingChannel::default());

    let per_requester = 8;
    let handles: Vec<_> = ["alice", "bob", "carol"]
        .into_iter()
        .flat_map(|requester| std::iter::repeat_n(requester, per_requester))
        .map(|requester| {
            let p = Arc::clone(&p);
            let channel = Arc::clone(&channel);
            tokio::spawn(async move {
                let processed = p
                    .process(&letter(requester, "admin"), &EchoSource, channel.as_ref())
                    .await
                    .unwrap();
                (requester, processed.cursors.1)
            })
        })
        .collect();

    let mut seen: HashMap<&str, Vec<u64>> = HashMap::new();
    for result in futures::future::join_all(handles).await {
        let (requester, cursor) = result.unwrap();
        seen.entry(requester).or_default().push(cursor);
    }

    let expected: Vec<u64> = (0..per_requester as u64).collect();
    for (requester, mut cursors) in seen {
        cursors.sort_unstable();
        assert_eq!(cursors, expected, "cursors for {requester}");
        assert_eq!(
            p.rotation().peek(requester, ReferenceFamily::Maxim).await,
            per_requester as u64
        );
    }
}
