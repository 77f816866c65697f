use super::*;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Default)]
struct EchoProvider {
    calls: AtomicUsize,
}

impl CompletionProvider for EchoProvider {
    fn complete(&self, prompt: &str) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(prompt.to_string())
    }
}

struct ScriptedProvider {
    responses: Mutex<Vec<Result<String, GenerationError>>>,
}

impl CompletionProvider for ScriptedProvider {
    fn complete(&self, _prompt: &str) -> Result<String, GenerationError> {
        self.responses
            .lock()
            .expect("lock should not be poisoned")
            .remove(0)
    }
}

fn scripted(response: Result<String, GenerationError>) -> SectionGenerator {
    SectionGenerator::new(Arc::new(ScriptedProvider {
        responses: Mutex::new(vec![response]),
    }))
}

#[test]
fn echo_generation_passes_transcript_through() {
    let provider = Arc::new(EchoProvider::default());
    let generator = SectionGenerator::new(provider.clone());

    let text = generator
        .generate(
            SectionKind::History,
            "Patient reports abdominal pain for three days",
            "",
        )
        .expect("echo generation should succeed");

    assert!(text.contains("abdominal pain"));
    assert!(text.contains("History of Present Illness"));
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn one_provider_call_per_section() {
    let provider = Arc::new(EchoProvider::default());
    let generator = SectionGenerator::new(provider.clone());

    for kind in SectionKind::ALL {
        generator
            .generate(kind, "transcript", "knowledge")
            .expect("echo generation should succeed");
    }

    assert_eq!(provider.calls.load(Ordering::SeqCst), SectionKind::ALL.len());
}

#[test]
fn whitespace_completion_is_empty_response() {
    let generator = scripted(Ok("  \n\t".to_string()));
    let result = generator.generate(SectionKind::PhysicalExam, "t", "k");
    assert_eq!(result, Err(GenerationError::EmptyResponse));
}

#[test]
fn provider_errors_pass_through_unchanged() {
    let generator = scripted(Err(GenerationError::RateLimited("slow down".to_string())));
    let result = generator.generate(SectionKind::AssessmentPlan, "t", "k");
    assert_eq!(
        result,
        Err(GenerationError::RateLimited("slow down".to_string()))
    );
}

#[test]
fn prompt_matches_template_rendering() {
    let prompt = SectionGenerator::prompt(SectionKind::ReviewOfSystems, "abc", "def");
    assert_eq!(
        prompt,
        PromptTemplate::for_section(SectionKind::ReviewOfSystems).render("abc", "def")
    );
}
