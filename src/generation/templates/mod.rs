#[cfg(test)]
mod tests;

use crate::section::SectionKind;

const TRANSCRIPT_PLACEHOLDER: &str = "{transcript}";
const KNOWLEDGE_BASE_PLACEHOLDER: &str = "{knowledge_base}";

const HISTORY_TEMPLATE: &str = "The following is a clinical conversation between a doctor and a patient. \
Based on this conversation transcript and using relevant information from the provided knowledgebase, \
generate a detailed History of Present Illness (HPI) for the patient. The HPI should include the following sections:\n\n\
1. Chief Complaint: Brief description of only the primary symptom. Don't mention the age of the patient.\n\
2. Previous Occurrences: Any similar past episodes.\n\
3. Family History: Relevant family medical history.\n\
4. Symptoms: only current symptoms.\n\n\
Conversation Transcript:\n{transcript}\n\n\
Relevant Knowledge Base:\n{knowledge_base}\n\n\
Please ensure the HPI is comprehensive, clear, and formatted properly.";

const REVIEW_OF_SYSTEMS_TEMPLATE: &str = "Based on the provided clinical conversation and the Conversation Transcript, \
generate a detailed Review of Systems (RoS) for the patient based on the Conversation Transcript. \
The RoS should cover the following body systems and include specific details if mentioned, otherwise state 'denies any issues':\n\n\
1. General: Chief complaint\n\
2. Skin: Any skin issues or rashes.\n\
3. Head: Any headaches or head injuries.\n\
4. Eyes: Vision problems or eye pain.\n\
5. Ears, Nose, Throat: Hearing issues, nasal congestion, sore throat, etc.\n\
6. Cardiovascular: Heart problems, chest pain, etc.\n\
7. Respiratory: Breathing issues, cough, etc.\n\
8. Gastrointestinal: Abdominal pain, nausea, etc.\n\
9. Genitourinary: Urination problems, etc.\n\
Conversation Transcript:\n{transcript}\n\n\
Relevant Knowledge Base:\n{knowledge_base}\n\n\
Please ensure the RoS is comprehensive, clear, and formatted properly.";

const PHYSICAL_EXAM_TEMPLATE: &str = "The following is a clinical conversation between a doctor and a patient. \
Based on this conversation transcript and using relevant information from the provided knowledgebase if any, \
generate a detailed physical exam (PE) summary for the patient. The PE should include the findings mentioned by the doctor during the examination. \
Please ensure the PE is comprehensive, clear, and formatted properly.\n\n\
Conversation Transcript:\n{transcript}\n\n\
Knowledge Base, only if any reference is present:\n{knowledge_base}\n\n\
Please list only the test names mentioned by the doctor in the Conversation Transcript, excluding any medications or treatments.";

const ASSESSMENT_PLAN_TEMPLATE: &str = "Based on the provided clinical conversation between the doctor and the patient, \
generate a detailed Assessment Plan. \
The Assessment Plan should include only the doctor's assessment and plan, clearly separated into two sections: Assessment and Plan. \
Each section should be detailed and follow the structure provided in the conversation.\n\n\
Conversation Transcript:\n{transcript}\n\n\
Reference Material:\n{knowledge_base}\n\n\
Assessment:\n\
Provide a detailed assessment of the patient's condition based on the Conversation Transcript.\n\n\
Plan:\n\
1. List only the results of diagnostic tests given to the patient mentioned in the Conversation Transcript.\n\
2. Include any relevant diagnostic results, such as EKG findings, if mentioned in the Conversation Transcript.\n\
3. Mention the diagnosis and follow-up instructions provided by the doctor in the Conversation Transcript.\n\
Ensure not to include any medications or treatments that are not mentioned explicitly in the transcript.\n\n\
Please ensure the assessment plan is comprehensive, clear, and formatted properly.";

const GENERIC_SUMMARY_TEMPLATE: &str = "The following is a clinical conversation between a doctor and a patient. \
Based on this conversation transcript and using relevant information from the provided knowledgebase, \
generate an abstract summarizing the key points discussed.\n\n\
Conversation Transcript:\n{transcript}\n\n\
Relevant Knowledge Base:\n{knowledge_base}\n\n\
Please ensure the abstract is concise and highlights the main concerns, findings, and recommendations.";

/// A fixed instruction template with `{transcript}` and `{knowledge_base}` slots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptTemplate {
    kind: SectionKind,
    template: &'static str,
}

impl PromptTemplate {
    #[inline]
    pub const fn for_section(kind: SectionKind) -> Self {
        let template = match kind {
            SectionKind::History => HISTORY_TEMPLATE,
            SectionKind::ReviewOfSystems => REVIEW_OF_SYSTEMS_TEMPLATE,
            SectionKind::PhysicalExam => PHYSICAL_EXAM_TEMPLATE,
            SectionKind::AssessmentPlan => ASSESSMENT_PLAN_TEMPLATE,
            SectionKind::GenericSummary => GENERIC_SUMMARY_TEMPLATE,
        };
        Self { kind, template }
    }

    #[inline]
    pub const fn kind(&self) -> SectionKind {
        self.kind
    }

    #[inline]
    pub const fn as_str(&self) -> &'static str {
        self.template
    }

    /// Fill both placeholders in a single left-to-right pass.
    ///
    /// Substituted text is never rescanned, so a transcript that happens to
    /// contain `{knowledge_base}` is passed through literally.
    #[inline]
    pub fn render(&self, transcript: &str, knowledge_base: &str) -> String {
        let mut rendered =
            String::with_capacity(self.template.len() + transcript.len() + knowledge_base.len());
        let mut rest = self.template;

        while let Some(start) = rest.find('{') {
            let (before, tail) = rest.split_at(start);
            rendered.push_str(before);

            if let Some(after) = tail.strip_prefix(TRANSCRIPT_PLACEHOLDER) {
                rendered.push_str(transcript);
                rest = after;
            } else if let Some(after) = tail.strip_prefix(KNOWLEDGE_BASE_PLACEHOLDER) {
                rendered.push_str(knowledge_base);
                rest = after;
            } else {
                let (brace, after) = tail.split_at(1);
                rendered.push_str(brace);
                rest = after;
            }
        }

        rendered.push_str(rest);
        rendered
    }
}
