use crate::error::PipelineError;
use crate::stage::StageProgress;
use codescan_core::{Language, NormalizedResult, Severity};
use codescan_graph::GraphStats;
use codescan_parser::{CacheStats, LanguageStatistics};
use serde::Serialize;
use std::collections::BTreeMap;

pub const TOP_LANGUAGES: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LanguageShare {
    pub language: Language,
    pub files: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineSummary {
    pub total_findings: usize,
    pub by_severity: BTreeMap<Severity, usize>,
    pub by_category: BTreeMap<String, usize>,
    pub top_languages: Vec<LanguageShare>,
    pub files_analyzed: usize,
    pub files_skipped: usize,
    pub parse_errors: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub duration_ms: u64,
}

/// Per-run counters the summary is built from.
#[derive(Debug, Clone, Default)]
pub struct RunCounters {
    pub files_analyzed: usize,
    pub files_skipped: usize,
    pub parse_errors: usize,
    pub cache_before: Option<CacheStats>,
    pub cache_after: Option<CacheStats>,
}

impl PipelineSummary {
    pub fn build(
        results: &[NormalizedResult],
        languages: Option<&LanguageStatistics>,
        counters: &RunCounters,
        duration_ms: u64,
    ) -> Self {
        let mut by_severity = BTreeMap::new();
        let mut by_category = BTreeMap::new();
        for result in results {
            *by_severity.entry(result.severity).or_insert(0) += 1;
            *by_category
                .entry(result.main_category.as_str().to_string())
                .or_insert(0) += 1;
        }

        let top_languages = languages
            .map(|stats| {
                stats
                    .top(TOP_LANGUAGES)
                    .iter()
                    .map(|s| LanguageShare {
                        language: s.language,
                        files: s.file_count,
                        percentage: s.percentage,
                    })
                    .collect()
            })
            .unwrap_or_default();

        let (cache_hits, cache_misses) = match (&counters.cache_before, &counters.cache_after) {
            (Some(before), Some(after)) => (
                after.hits.saturating_sub(before.hits),
                after.misses.saturating_sub(before.misses),
            ),
            _ => (0, 0),
        };

        Self {
            total_findings: results.len(),
            by_severity,
            by_category,
            top_languages,
            files_analyzed: counters.files_analyzed,
            files_skipped: counters.files_skipped,
            parse_errors: counters.parse_errors,
            cache_hits,
            cache_misses,
            duration_ms,
        }
    }

    pub fn count_at_least(&self, severity: Severity) -> usize {
        self.by_severity
            .iter()
            .filter(|(s, _)| **s >= severity)
            .map(|(_, n)| n)
            .sum()
    }
}

/// Everything one analysis run produced.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub success: bool,
    pub project_id: String,
    pub execution_id: String,
    pub results: Vec<NormalizedResult>,
    pub progress: Vec<StageProgress>,
    pub summary: PipelineSummary,
    pub errors: Vec<PipelineError>,
    pub language_stats: Option<LanguageStatistics>,
    pub graph_stats: Option<GraphStats>,
    pub error: Option<String>,
}

impl PipelineResult {
    pub fn findings_at_least(&self, severity: Severity) -> impl Iterator<Item = &NormalizedResult> {
        self.results.iter().filter(move |r| r.severity >= severity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codescan_core::{DetectionMethod, FileInfo, LanguageMapping};

    #[test]
    fn cache_counts_are_deltas() {
        let counters = RunCounters {
            cache_before: Some(CacheStats {
                hits: 2,
                misses: 5,
                entries: 5,
                capacity: 10,
                hit_rate: 0.28,
            }),
            cache_after: Some(CacheStats {
                hits: 7,
                misses: 6,
                entries: 6,
                capacity: 10,
                hit_rate: 0.53,
            }),
            ..RunCounters::default()
        };
        let summary = PipelineSummary::build(&[], None, &counters, 12);
        assert_eq!((summary.cache_hits, summary.cache_misses), (5, 1));
        assert_eq!(summary.total_findings, 0);
        assert_eq!(summary.count_at_least(Severity::Info), 0);
    }

    #[test]
    fn top_languages_come_from_statistics() {
        let files = vec![
            FileInfo::new("a.ts", "x\n"),
            FileInfo::new("b.ts", "x\n"),
            FileInfo::new("c.py", "x\n"),
        ];
        let mappings: Vec<LanguageMapping> = files
            .iter()
            .map(|f| LanguageMapping {
                file_path: f.path.clone(),
                language: if f.extension == "ts" {
                    Language::TypeScript
                } else {
                    Language::Python
                },
                confidence: 0.9,
                method: DetectionMethod::Extension,
            })
            .collect();
        let stats = LanguageStatistics::from_mappings(&mappings, &files);
        let summary = PipelineSummary::build(&[], Some(&stats), &RunCounters::default(), 0);
        assert_eq!(summary.top_languages.len(), 2);
        assert_eq!(summary.top_languages[0].language, Language::TypeScript);
        assert_eq!(summary.top_languages[0].files, 2);
    }
}
