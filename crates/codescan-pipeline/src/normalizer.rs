use codescan_core::{CategorizedResult, Language, LanguageMapping, NormalizedResult};
use chrono::Utc;
use std::collections::HashMap;
use uuid::Uuid;

/// Turns categorized findings into the canonical result record.
#[derive(Debug, Clone)]
pub struct Normalizer {
    project_id: String,
    execution_id: String,
    languages: HashMap<String, Language>,
}

impl Normalizer {
    pub fn new(
        project_id: impl Into<String>,
        execution_id: impl Into<String>,
        mappings: &[LanguageMapping],
    ) -> Self {
        Self {
            project_id: project_id.into(),
            execution_id: execution_id.into(),
            languages: mappings
                .iter()
                .map(|m| (m.file_path.clone(), m.language))
                .collect(),
        }
    }

    pub fn language_of(&self, file_path: &str) -> Language {
        self.languages
            .get(file_path)
            .copied()
            .unwrap_or(Language::Unknown)
    }

    pub fn normalize(&self, categorized: &CategorizedResult) -> NormalizedResult {
        let source = &categorized.source;
        let location = source.location();
        let file_path = source.file_path().to_string();
        NormalizedResult {
            id: Uuid::new_v4().to_string(),
            project_id: self.project_id.clone(),
            execution_id: self.execution_id.clone(),
            language: self.language_of(&file_path),
            line_start: location.start_line,
            line_end: location.end_line.max(location.start_line),
            file_path,
            main_category: categorized.main_category,
            sub_category: categorized.sub_category,
            rule_id: source.rule_id().to_string(),
            severity: source.severity(),
            message: source.message().to_string(),
            suggestion: source.suggestion().map(str::to_string),
            raw: source.to_raw(),
            ai_explanation: None,
            ai_suggestion: None,
            ai_security_advice: None,
            deterministic: true,
            created_at: Utc::now(),
        }
    }

    pub fn normalize_all(&self, categorized: &[CategorizedResult]) -> Vec<NormalizedResult> {
        categorized.iter().map(|c| self.normalize(c)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categorizer::Categorizer;
    use codescan_core::{
        DetectionMethod, Location, MainCategory, Severity, StaticFinding, StaticFindingKind,
    };

    #[test]
    fn normalizes_static_findings() {
        let mappings = vec![LanguageMapping {
            file_path: "src/a.py".into(),
            language: Language::Python,
            confidence: 0.9,
            method: DetectionMethod::Extension,
        }];
        let normalizer = Normalizer::new("proj", "exec", &mappings);
        let finding = StaticFinding::new(
            StaticFindingKind::HighComplexity,
            "too complex",
            Severity::High,
            Location::new("src/a.py", 4, 1, 40, 1),
        );
        let categorized = Categorizer::new().categorize_finding(&finding);

        let first = normalizer.normalize(&categorized);
        let second = normalizer.normalize(&categorized);
        assert_ne!(first.id, second.id);
        assert_eq!(first.language, Language::Python);
        assert_eq!((first.line_start, first.line_end), (4, 40));
        assert_eq!(first.rule_id, "high-complexity");
        assert_eq!(first.main_category, MainCategory::Quality);
        assert!(first.deterministic);
        assert!(!first.has_ai_fields());
        assert_eq!(first.raw["kind"], "static");
    }

    #[test]
    fn unmapped_files_are_unknown() {
        let normalizer = Normalizer::new("proj", "exec", &[]);
        assert_eq!(normalizer.language_of("x.zig"), Language::Unknown);
    }
}
