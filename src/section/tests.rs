use super::*;

#[test]
fn parse_canonical_names() {
    for kind in SectionKind::ALL {
        let parsed: SectionKind = kind.as_str().parse().expect("canonical name should parse");
        assert_eq!(parsed, kind);
    }
}

#[test]
fn parse_aliases() {
    assert_eq!(
        "generic".parse::<SectionKind>().expect("alias parses"),
        SectionKind::GenericSummary
    );
    assert_eq!(
        "Review_Of_Systems"
            .parse::<SectionKind>()
            .expect("alias parses"),
        SectionKind::ReviewOfSystems
    );
    assert_eq!(
        " HPI ".parse::<SectionKind>().expect("alias parses"),
        SectionKind::History
    );
}

#[test]
fn unknown_kind_is_config_error() {
    let err = "discharge".parse::<SectionKind>().expect_err("should fail");
    assert!(matches!(err, ScribeError::Config(_)));
    assert!(err.to_string().contains("discharge"));
    assert!(err.to_string().contains("assessment-plan"));
}

#[test]
fn serde_uses_kebab_case() {
    let json = serde_json::to_string(&SectionKind::PhysicalExam).expect("serializes");
    assert_eq!(json, "\"physical-exam\"");
    let kind: SectionKind = serde_json::from_str("\"assessment-plan\"").expect("deserializes");
    assert_eq!(kind, SectionKind::AssessmentPlan);
}
