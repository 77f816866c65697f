use super::*;

#[test]
fn every_template_has_both_placeholders() {
    for kind in SectionKind::ALL {
        let template = PromptTemplate::for_section(kind);
        assert_eq!(template.kind(), kind);
        assert_eq!(
            template.as_str().matches(TRANSCRIPT_PLACEHOLDER).count(),
            1,
            "{kind} template should reference the transcript once"
        );
        assert_eq!(
            template.as_str().matches(KNOWLEDGE_BASE_PLACEHOLDER).count(),
            1,
            "{kind} template should reference the knowledge base once"
        );
    }
}

#[test]
fn render_fills_placeholders() {
    let template = PromptTemplate::for_section(SectionKind::History);
    let prompt = template.render("Patient reports abdominal pain", "GENHX: prior appendectomy");

    assert!(prompt.contains("Conversation Transcript:\nPatient reports abdominal pain\n\n"));
    assert!(prompt.contains("Relevant Knowledge Base:\nGENHX: prior appendectomy\n\n"));
    assert!(!prompt.contains(TRANSCRIPT_PLACEHOLDER));
    assert!(!prompt.contains(KNOWLEDGE_BASE_PLACEHOLDER));
}

#[test]
fn substituted_text_is_not_rescanned() {
    let template = PromptTemplate::for_section(SectionKind::GenericSummary);
    let prompt = template.render("says {knowledge_base} aloud", "kb text");

    assert!(prompt.contains("says {knowledge_base} aloud"));
    assert_eq!(prompt.matches("kb text").count(), 1);
}

#[test]
fn empty_values_render() {
    let template = PromptTemplate::for_section(SectionKind::PhysicalExam);
    let prompt = template.render("", "");
    assert!(prompt.contains("Conversation Transcript:\n\n\n"));
}

#[test]
fn templates_are_distinct() {
    let rendered: Vec<String> = SectionKind::ALL
        .iter()
        .map(|kind| PromptTemplate::for_section(*kind).render("t", "k"))
        .collect();

    for (i, a) in rendered.iter().enumerate() {
        for b in &rendered[i + 1..] {
            assert_ne!(a, b);
        }
    }
}
