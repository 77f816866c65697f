use super::*;
use crate::generation::{CompletionProvider, GenerationError};
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

const TRANSCRIPT: &str = r#"{
    "results": {
        "items": [
            { "start_time": "0.0", "alternatives": [{ "confidence": "0.99", "content": "chest" }] },
            { "alternatives": [{ "content": "pain" }], "type": "pronunciation" },
            { "alternatives": [] },
            { "alternatives": [{ "content": "since" }, { "content": "sense" }] },
            { "alternatives": [{ "content": "Tuesday" }] }
        ]
    }
}"#;

const KNOWLEDGE: &str = "section_header,section_text\n\
HPI,Patient reports pain after exertion.\n\
ROS,Denies fever.\n";

const REVIEW_OF_SYSTEMS_OPENING: &str =
    "Based on the provided clinical conversation and the Conversation Transcript";

#[derive(Default)]
struct KeywordEmbedder {
    calls: AtomicUsize,
}

impl Embedder for KeywordEmbedder {
    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let lower = text.to_lowercase();
        Ok(vec![
            if lower.contains("pain") { 1.0 } else { 0.0 },
            if lower.contains("fever") { 1.0 } else { 0.0 },
            0.0,
            0.1,
        ])
    }
}

/// Returns the prompt it was given, optionally failing on one marker
#[derive(Default)]
struct EchoProvider {
    calls: AtomicUsize,
    fail_on: Option<&'static str>,
}

impl CompletionProvider for EchoProvider {
    fn complete(&self, prompt: &str) -> std::result::Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.fail_on {
            Some(marker) if prompt.starts_with(marker) => {
                Err(GenerationError::Provider("model unavailable".to_string()))
            }
            _ => Ok(prompt.to_string()),
        }
    }
}

#[derive(Default)]
struct MemoryStore {
    saved: Mutex<Vec<(SectionKind, String)>>,
}

#[async_trait::async_trait]
impl ResultStore for MemoryStore {
    async fn save(&self, category: SectionKind, text: &str) -> Result<i64> {
        let mut saved = self
            .saved
            .lock()
            .map_err(|_| ScribeError::Persistence("poisoned".to_string()))?;
        saved.push((category, text.to_string()));
        Ok(saved.len() as i64)
    }

    async fn list(&self, category: SectionKind) -> Result<Vec<String>> {
        let saved = self
            .saved
            .lock()
            .map_err(|_| ScribeError::Persistence("poisoned".to_string()))?;
        Ok(saved
            .iter()
            .filter(|(kind, _)| *kind == category)
            .map(|(_, text)| text.clone())
            .collect())
    }
}

struct Fixture {
    _temp_dir: TempDir,
    config: Config,
    transcript: PathBuf,
    knowledge: PathBuf,
}

fn fixture() -> Fixture {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let transcript = temp_dir.path().join("visit.json");
    let knowledge = temp_dir.path().join("clinical_examples.csv");
    std::fs::write(&transcript, TRANSCRIPT).expect("should write transcript");
    std::fs::write(&knowledge, KNOWLEDGE).expect("should write knowledge base");

    let mut config = Config::with_base_dir(temp_dir.path().join("data"));
    config.ollama.embedding_dimension = 4;

    Fixture {
        _temp_dir: temp_dir,
        config,
        transcript,
        knowledge,
    }
}

async fn pipeline(
    fixture: &Fixture,
    embedder: Arc<KeywordEmbedder>,
    provider: Arc<EchoProvider>,
) -> NotePipeline {
    let knowledge_base = KnowledgeBase::open(&fixture.config, embedder)
        .await
        .expect("should open knowledge base");
    NotePipeline::new(
        &fixture.config,
        knowledge_base,
        SectionGenerator::new(provider),
    )
}

#[tokio::test]
async fn run_fills_template_with_transcript_and_relabelled_knowledge() {
    let fixture = fixture();
    let provider = Arc::new(EchoProvider::default());
    let mut pipeline = pipeline(&fixture, Arc::default(), provider.clone()).await;

    let text = pipeline
        .run("physical-exam", &fixture.transcript, &fixture.knowledge)
        .await
        .expect("should run");

    assert!(text.contains("chest pain since Tuesday"));
    assert!(text.contains("Other Patient reports pain after exertion."));
    assert!(!text.contains("{transcript}"));
    assert!(!text.contains("{knowledge_base}"));
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn run_saves_to_attached_store() {
    let fixture = fixture();
    let store = Arc::new(MemoryStore::default());
    let mut pipeline = pipeline(&fixture, Arc::default(), Arc::default())
        .await
        .with_store(store.clone());

    let text = pipeline
        .run("generic", &fixture.transcript, &fixture.knowledge)
        .await
        .expect("should run");

    let saved = store
        .list(SectionKind::GenericSummary)
        .await
        .expect("should list");
    assert_eq!(saved, vec![text]);
}

#[tokio::test]
async fn run_persists_to_sqlite_store() {
    let fixture = fixture();
    let pipeline = pipeline(&fixture, Arc::default(), Arc::default()).await;
    let store = Arc::new(SqliteResultStore::new(
        pipeline.knowledge_base().database().clone(),
    ));
    let mut pipeline = pipeline.with_store(store.clone());

    pipeline
        .run("history", &fixture.transcript, &fixture.knowledge)
        .await
        .expect("should run");
    pipeline
        .run("history", &fixture.transcript, &fixture.knowledge)
        .await
        .expect("should run");

    let saved = store.list(SectionKind::History).await.expect("should list");
    assert_eq!(saved.len(), 2);
}

#[tokio::test]
async fn unknown_section_fails_before_any_io() {
    let fixture = fixture();
    let embedder = Arc::new(KeywordEmbedder::default());
    let provider = Arc::new(EchoProvider::default());
    let mut pipeline = pipeline(&fixture, embedder.clone(), provider.clone()).await;

    let result = pipeline
        .run(
            "discharge-summary",
            Path::new("/nonexistent/visit.json"),
            Path::new("/nonexistent/kb.csv"),
        )
        .await;

    assert!(matches!(result, Err(ScribeError::Config(_))));
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn malformed_transcript_aborts_before_generation() {
    let fixture = fixture();
    std::fs::write(&fixture.transcript, r#"{"results": {}}"#).expect("should write");
    let provider = Arc::new(EchoProvider::default());
    let store = Arc::new(MemoryStore::default());
    let mut pipeline = pipeline(&fixture, Arc::default(), provider.clone())
        .await
        .with_store(store.clone());

    let result = pipeline
        .run("history", &fixture.transcript, &fixture.knowledge)
        .await;

    assert!(matches!(result, Err(ScribeError::MalformedTranscript(_))));
    assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    assert!(
        store
            .list(SectionKind::History)
            .await
            .expect("should list")
            .is_empty()
    );
}

#[tokio::test]
async fn missing_knowledge_base_aborts_before_generation() {
    let fixture = fixture();
    let provider = Arc::new(EchoProvider::default());
    let mut pipeline = pipeline(&fixture, Arc::default(), provider.clone()).await;

    let result = pipeline
        .run(
            "history",
            &fixture.transcript,
            &fixture.knowledge.with_file_name("absent.csv"),
        )
        .await;

    assert!(matches!(result, Err(ScribeError::CorpusLoad(_))));
    assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn repeated_runs_reuse_the_knowledge_base() {
    let fixture = fixture();
    let embedder = Arc::new(KeywordEmbedder::default());
    let mut pipeline = pipeline(&fixture, embedder.clone(), Arc::default()).await;

    pipeline
        .run("history", &fixture.transcript, &fixture.knowledge)
        .await
        .expect("should run");
    let after_first = embedder.calls.load(Ordering::SeqCst);

    pipeline
        .run("history", &fixture.transcript, &fixture.knowledge)
        .await
        .expect("should run");

    // Only the query is embedded the second time
    assert_eq!(embedder.calls.load(Ordering::SeqCst), after_first + 1);
    assert_eq!(
        pipeline
            .knowledge_base()
            .list()
            .await
            .expect("should list")
            .len(),
        1
    );
}

#[tokio::test]
async fn batch_reports_failures_per_section() {
    let fixture = fixture();
    let embedder = Arc::new(KeywordEmbedder::default());
    let provider = Arc::new(EchoProvider {
        calls: AtomicUsize::new(0),
        fail_on: Some(REVIEW_OF_SYSTEMS_OPENING),
    });
    let store = Arc::new(MemoryStore::default());
    let mut pipeline = pipeline(&fixture, embedder.clone(), provider.clone())
        .await
        .with_store(store.clone());

    let outcomes = pipeline
        .run_batch(
            &[
                SectionKind::History,
                SectionKind::ReviewOfSystems,
                SectionKind::PhysicalExam,
            ],
            &fixture.transcript,
            &fixture.knowledge,
        )
        .await
        .expect("should run batch");

    let kinds: Vec<_> = outcomes.iter().map(|o| o.kind).collect();
    assert_eq!(
        kinds,
        vec![
            SectionKind::History,
            SectionKind::ReviewOfSystems,
            SectionKind::PhysicalExam
        ]
    );
    assert!(outcomes[0].is_ok());
    assert!(matches!(
        outcomes[1].result,
        Err(ScribeError::Generation(GenerationError::Provider(_)))
    ));
    assert!(outcomes[2].is_ok());
    assert_eq!(provider.calls.load(Ordering::SeqCst), 3);

    // Two entries embedded at ingest plus a single query embedding
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);

    let saved = store.saved.lock().expect("lock").clone();
    let saved_kinds: Vec<_> = saved.iter().map(|(kind, _)| *kind).collect();
    assert_eq!(
        saved_kinds,
        vec![SectionKind::History, SectionKind::PhysicalExam]
    );
}

#[tokio::test]
async fn batch_load_errors_abort_everything() {
    let fixture = fixture();
    std::fs::write(&fixture.transcript, "not json").expect("should write");
    let provider = Arc::new(EchoProvider::default());
    let mut pipeline = pipeline(&fixture, Arc::default(), provider.clone()).await;

    let result = pipeline
        .run_batch(&SectionKind::ALL, &fixture.transcript, &fixture.knowledge)
        .await;

    assert!(matches!(result, Err(ScribeError::MalformedTranscript(_))));
    assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn same_named_knowledge_base_from_another_file_is_reingested() {
    let fixture = fixture();
    let mut pipeline = pipeline(&fixture, Arc::default(), Arc::default()).await;

    let first = pipeline
        .run("history", &fixture.transcript, &fixture.knowledge)
        .await
        .expect("should run");
    assert!(first.contains("pain after exertion"));

    let other_dir = fixture.knowledge.with_file_name("other");
    std::fs::create_dir_all(&other_dir).expect("should create dir");
    let other = other_dir.join("clinical_examples.csv");
    std::fs::write(
        &other,
        "section_header,section_text\nHPI,Patient reports pain in the right knee.\n",
    )
    .expect("should write knowledge base");

    let second = pipeline
        .run("history", &fixture.transcript, &other)
        .await
        .expect("should run");
    assert!(second.contains("pain in the right knee"));
    assert!(!second.contains("pain after exertion"));

    let registrations = pipeline.knowledge_base().list().await.expect("should list");
    assert_eq!(registrations.len(), 1);
    assert_eq!(registrations[0].source_path, other.display().to_string());
}

#[tokio::test]
async fn edited_knowledge_base_is_reingested() {
    let fixture = fixture();
    let mut pipeline = pipeline(&fixture, Arc::default(), Arc::default()).await;

    pipeline
        .run("history", &fixture.transcript, &fixture.knowledge)
        .await
        .expect("should run");

    std::fs::write(
        &fixture.knowledge,
        "section_header,section_text\nHPI,Patient reports sharp pain when breathing.\n",
    )
    .expect("should rewrite knowledge base");

    let text = pipeline
        .run("history", &fixture.transcript, &fixture.knowledge)
        .await
        .expect("should run");
    assert!(text.contains("sharp pain when breathing"));
    assert!(!text.contains("pain after exertion"));
}

#[tokio::test]
async fn empty_knowledge_base_still_produces_history() {
    let fixture = fixture();
    std::fs::write(
        &fixture.transcript,
        r#"{
            "results": {
                "items": [
                    { "alternatives": [{ "content": "Patient" }] },
                    { "alternatives": [{ "content": "reports" }] },
                    { "alternatives": [{ "content": "abdominal" }] },
                    { "alternatives": [{ "content": "pain" }] },
                    { "alternatives": [{ "content": "for" }] },
                    { "alternatives": [{ "content": "three" }] },
                    { "alternatives": [{ "content": "days" }] }
                ]
            }
        }"#,
    )
    .expect("should write transcript");
    std::fs::write(&fixture.knowledge, "section_header,section_text\n")
        .expect("should write knowledge base");

    let embedder = Arc::new(KeywordEmbedder::default());
    let provider = Arc::new(EchoProvider::default());
    let mut pipeline = pipeline(&fixture, embedder.clone(), provider.clone()).await;

    let text = pipeline
        .run("history", &fixture.transcript, &fixture.knowledge)
        .await
        .expect("empty knowledge base should not fail generation");

    assert!(text.contains("Patient reports abdominal pain for three days"));
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

    let record = pipeline
        .knowledge_base()
        .find("clinical_examples")
        .await
        .expect("should query")
        .expect("empty knowledge base should be registered");
    assert_eq!(record.entry_count, 0);
}
