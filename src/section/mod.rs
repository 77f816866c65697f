// Section categories for generated clinical text

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::ScribeError;

/// The fixed set of note sections the generator can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SectionKind {
    History,
    ReviewOfSystems,
    PhysicalExam,
    AssessmentPlan,
    GenericSummary,
}

impl SectionKind {
    pub const ALL: [SectionKind; 5] = [
        SectionKind::History,
        SectionKind::ReviewOfSystems,
        SectionKind::PhysicalExam,
        SectionKind::AssessmentPlan,
        SectionKind::GenericSummary,
    ];

    /// Stable identifier used in the database and on the command line
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            SectionKind::History => "history",
            SectionKind::ReviewOfSystems => "review-of-systems",
            SectionKind::PhysicalExam => "physical-exam",
            SectionKind::AssessmentPlan => "assessment-plan",
            SectionKind::GenericSummary => "generic-summary",
        }
    }

    #[inline]
    pub fn title(self) -> &'static str {
        match self {
            SectionKind::History => "History of Present Illness",
            SectionKind::ReviewOfSystems => "Review of Systems",
            SectionKind::PhysicalExam => "Physical Exam",
            SectionKind::AssessmentPlan => "Assessment and Plan",
            SectionKind::GenericSummary => "Visit Summary",
        }
    }
}

impl std::fmt::Display for SectionKind {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SectionKind {
    type Err = ScribeError;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        match normalized.as_str() {
            "history" | "hpi" => Ok(SectionKind::History),
            "review-of-systems" | "ros" => Ok(SectionKind::ReviewOfSystems),
            "physical-exam" | "pe" => Ok(SectionKind::PhysicalExam),
            "assessment-plan" | "ap" => Ok(SectionKind::AssessmentPlan),
            "generic-summary" | "generic" | "summary" => Ok(SectionKind::GenericSummary),
            _ => Err(ScribeError::Config(format!(
                "Unknown section kind '{}' (expected one of: {})",
                s,
                SectionKind::ALL
                    .iter()
                    .map(|k| k.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
        }
    }
}

/// A generated section of text tagged with its category
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub kind: SectionKind,
    pub text: String,
}
