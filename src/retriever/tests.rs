use super::*;
use crate::knowledge::{KnowledgeEntry, KnowledgeMetadata, RetrievalHit};

fn node(ordinal: usize, text: &str) -> RetrievedNode {
    RetrievedNode::new(format!("node-{ordinal}"), ordinal, text, ordinal as f32 * 0.1)
}

fn result(texts: &[&str]) -> RetrievalResult {
    let hits: Vec<RetrievalHit> = texts
        .iter()
        .enumerate()
        .map(|(ordinal, text)| RetrievalHit {
            entry: KnowledgeEntry {
                ordinal,
                text: (*text).to_string(),
                metadata: KnowledgeMetadata {
                    category: "examples".to_string(),
                    source_row: Some(ordinal),
                },
            },
            node_id: format!("node-{ordinal}"),
            distance: ordinal as f32 * 0.1,
        })
        .collect();
    RetrievalResult::from_hits(hits)
}

#[test]
fn patient_relabel_is_case_sensitive_substring_replacement() {
    let relabel = PatientRelabel;
    assert_eq!(relabel.apply("Patient denies pain."), "Other Patient denies pain.");
    assert_eq!(relabel.apply("Patient's mother"), "Other Patient's mother");
    assert_eq!(relabel.apply("Patients were seen"), "Other Patients were seen");
    assert_eq!(relabel.apply("the patient is stable"), "the patient is stable");
    assert_eq!(relabel.apply(""), "");
}

#[test]
fn default_retrieval_config() {
    let config = RetrievalConfig::default();
    assert_eq!(config.truncation, TruncationPolicy::TopK { k: 5 });
    assert_eq!(config.candidate_pool, 10);
}

#[test]
fn candidate_limit_follows_policy() {
    let retriever = Retriever::new(RetrievalConfig {
        candidate_pool: 25,
        truncation: TruncationPolicy::TopK { k: 3 },
    });
    assert_eq!(retriever.candidate_limit(), 3);

    let retriever = Retriever::new(RetrievalConfig {
        candidate_pool: 25,
        truncation: TruncationPolicy::WordBudget { max_words: 100 },
    });
    assert_eq!(retriever.candidate_limit(), 25);
}

#[test]
fn top_k_keeps_first_k() {
    let nodes = vec![node(0, "a"), node(1, "b"), node(2, "c")];
    let kept = truncate(TruncationPolicy::TopK { k: 2 }, nodes.clone());
    assert_eq!(kept, nodes[..2].to_vec());

    let kept = truncate(TruncationPolicy::TopK { k: 10 }, nodes.clone());
    assert_eq!(kept.len(), 3);
}

#[test]
fn word_budget_overshoots_by_at_most_one_chunk() {
    let nodes = vec![
        node(0, "one two three"),
        node(1, "four five six"),
        node(2, "seven eight nine"),
    ];

    // 3 words fit, 6 words pass the budget of 4 and stop the scan
    let kept = truncate(TruncationPolicy::WordBudget { max_words: 4 }, nodes.clone());
    assert_eq!(kept.len(), 2);

    let kept = truncate(TruncationPolicy::WordBudget { max_words: 6 }, nodes.clone());
    assert_eq!(kept.len(), 3);

    let kept = truncate(TruncationPolicy::WordBudget { max_words: 1 }, nodes);
    assert_eq!(kept.len(), 1);
}

#[test]
fn word_budget_keeps_everything_under_budget() {
    let nodes = vec![node(0, "short"), node(1, "text")];
    let kept = truncate(TruncationPolicy::WordBudget { max_words: 3000 }, nodes);
    assert_eq!(kept.len(), 2);
}

#[test]
fn assemble_relabels_once_and_joins_with_newlines() {
    let retriever = Retriever::new(RetrievalConfig::default());
    let context = retriever.assemble(result(&[
        "Patient reports chest pain.",
        "Other Patient was seen.",
    ]));

    assert_eq!(
        context.text,
        "Other Patient reports chest pain.\nOther Other Patient was seen."
    );
    assert_eq!(context.nodes.len(), 2);
    assert_eq!(context.nodes[0].content(), "Other Patient reports chest pain.");
}

#[test]
fn assemble_counts_words_after_relabel() {
    let retriever = Retriever::new(RetrievalConfig {
        candidate_pool: 10,
        truncation: TruncationPolicy::WordBudget { max_words: 2 },
    });

    // "Other Patient" is two words, which already passes the budget
    let context = retriever.assemble(result(&["Patient", "ignored"]));
    assert_eq!(context.text, "Other Patient");
}

#[test]
fn assemble_without_transforms_keeps_text() {
    let retriever = Retriever::with_transforms(RetrievalConfig::default(), Vec::new());
    let context = retriever.assemble(result(&["Patient stable."]));
    assert_eq!(context.text, "Patient stable.");
}

#[test]
fn empty_result_gives_empty_context() {
    let retriever = Retriever::new(RetrievalConfig::default());
    let context = retriever.assemble(RetrievalResult::default());
    assert!(context.nodes.is_empty());
    assert_eq!(context.text, "");
}

#[test]
fn truncation_policy_toml() {
    let config: RetrievalConfig = toml::from_str(
        r#"
            candidate_pool = 12

            [truncation]
            policy = "word_budget"
            max_words = 3000
        "#,
    )
    .expect("should parse retrieval config");

    assert_eq!(config.candidate_pool, 12);
    assert_eq!(
        config.truncation,
        TruncationPolicy::WordBudget { max_words: 3000 }
    );

    let rendered = toml::to_string(&RetrievalConfig::default()).expect("should serialize");
    assert!(rendered.contains("policy = \"top_k\""));
    assert!(rendered.contains("k = 5"));
}
