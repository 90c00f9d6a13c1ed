use super::models::{CandidateRecord, FitEvaluation, ParsedResume, RoleRef};

/// Combines extracted fields and a fit evaluation into a storable record.
/// Consumes the parsed resume so its raw text is dropped here and never
/// reaches storage. New records always start unapproved.
pub fn assemble_record(
    parsed: ParsedResume,
    evaluation: FitEvaluation,
    role: &RoleRef,
    source_portal: &str,
) -> CandidateRecord {
    let fields = parsed.fields;

    CandidateRecord {
        role_id: role.role_id.clone(),
        role_name: role.role_name.clone(),
        candidate_name: fields.name,
        phone: fields.phone,
        email: fields.email,
        location: fields.location,
        source_portal: source_portal.to_string(),
        auto_fit_score: evaluation.score,
        auto_fit_label: evaluation.label,
        auto_screen_comment: evaluation.comment,
        hr_approved: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{CandidateFields, ExtractionRoute, FitLabel};

    #[test]
    fn record_copies_fields_and_starts_unapproved() {
        let parsed = ParsedResume {
            source_file: "jane.pdf".to_string(),
            fields: CandidateFields {
                name: "Jane Doe".to_string(),
                email: Some("jane@example.com".to_string()),
                phone: None,
                location: Some("Pune".to_string()),
            },
            resume_text: "Jane Doe python aws".to_string(),
            route: ExtractionRoute::TextLayer,
        };
        let evaluation = FitEvaluation {
            score: 50,
            label: FitLabel::GoodFit,
            comment: "Match Score: 50%.".to_string(),
            matched: vec!["python".to_string()],
            missing: vec!["django".to_string()],
        };
        let role = RoleRef {
            role_id: "ROLE001".to_string(),
            role_name: "Python Developer".to_string(),
        };

        let record = assemble_record(parsed, evaluation, &role, "Local Resume");

        assert_eq!(record.role_id, "ROLE001");
        assert_eq!(record.role_name, "Python Developer");
        assert_eq!(record.candidate_name, "Jane Doe");
        assert_eq!(record.email.as_deref(), Some("jane@example.com"));
        assert_eq!(record.phone, None);
        assert_eq!(record.location.as_deref(), Some("Pune"));
        assert_eq!(record.source_portal, "Local Resume");
        assert_eq!(record.auto_fit_score, 50);
        assert_eq!(record.auto_fit_label, FitLabel::GoodFit);
        assert!(!record.hr_approved);
    }
}
