use chrono::Utc;

use super::*;

#[test]
fn knowledge_base_status_display() {
    assert_eq!(KnowledgeBaseStatus::Pending.to_string(), "Pending");
    assert_eq!(KnowledgeBaseStatus::Ready.to_string(), "Ready");
    assert_eq!(KnowledgeBaseStatus::Failed.to_string(), "Failed");
}

#[test]
fn knowledge_base_readiness() {
    let mut record = KnowledgeBaseRecord {
        id: 1,
        name: "mts-dialog".to_string(),
        source_path: "/data/mts-dialog.csv".to_string(),
        granularity: "row".to_string(),
        fingerprint: "ab12".to_string(),
        status: KnowledgeBaseStatus::Pending,
        entry_count: 0,
        created_date: Utc::now().naive_utc(),
    };
    assert!(!record.is_ready());

    record.status = KnowledgeBaseStatus::Ready;
    assert!(record.is_ready());
}

#[test]
fn status_serde_uses_variant_names() {
    let json = serde_json::to_string(&KnowledgeBaseStatus::Ready).expect("can serialize json");
    assert_eq!(json, "\"Ready\"");
}
