use anyhow::Result;
use codescan_core::{NormalizedResult, Severity};
use codescan_parser::LanguageStatistics;
use codescan_pipeline::PipelineResult;
use colored::{ColoredString, Colorize};
use std::fmt::Write;

fn severity_label(severity: Severity) -> ColoredString {
    let label = format!("{:<8}", severity.as_str());
    match severity {
        Severity::Critical => label.red().bold(),
        Severity::High => label.red(),
        Severity::Medium => label.yellow(),
        Severity::Low => label.blue(),
        Severity::Info => label.dimmed(),
    }
}

fn ordered(results: &[NormalizedResult]) -> Vec<&NormalizedResult> {
    let mut ordered: Vec<&NormalizedResult> = results.iter().collect();
    ordered.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then_with(|| a.file_path.cmp(&b.file_path))
            .then_with(|| a.line_start.cmp(&b.line_start))
            .then_with(|| a.rule_id.cmp(&b.rule_id))
    });
    ordered
}

/// Human readable report, most severe findings first.
pub fn render_pretty(result: &PipelineResult) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} {} ({})",
        "Project".cyan().bold(),
        result.project_id,
        result.execution_id.dimmed()
    );

    for finding in ordered(&result.results) {
        let _ = writeln!(
            out,
            "{} {}:{} {} {}",
            severity_label(finding.severity),
            finding.file_path,
            finding.line_start,
            finding.rule_id.cyan(),
            finding.message
        );
        if let Some(suggestion) = &finding.suggestion {
            let _ = writeln!(out, "         {} {}", "fix:".green(), suggestion);
        }
        if let Some(explanation) = &finding.ai_explanation {
            let _ = writeln!(out, "         {} {}", "ai:".magenta(), explanation);
        }
    }

    let summary = &result.summary;
    let _ = writeln!(out);
    let _ = writeln!(out, "{}", "Summary".cyan().bold());
    let _ = writeln!(
        out,
        "  files: {} analyzed, {} skipped, {} parse errors",
        summary.files_analyzed, summary.files_skipped, summary.parse_errors
    );
    let _ = writeln!(
        out,
        "  findings: {}",
        summary.total_findings.to_string().yellow()
    );
    for severity in Severity::ALL {
        if let Some(count) = summary.by_severity.get(&severity) {
            let _ = writeln!(out, "    {} {}", severity_label(severity), count);
        }
    }
    for (category, count) in &summary.by_category {
        let _ = writeln!(out, "    {:<12} {}", category, count);
    }
    if !summary.top_languages.is_empty() {
        let languages: Vec<String> = summary
            .top_languages
            .iter()
            .map(|l| format!("{} {:.1}%", l.language, l.percentage))
            .collect();
        let _ = writeln!(out, "  languages: {}", languages.join(", "));
    }
    let _ = writeln!(
        out,
        "  cache: {} hits, {} misses; {} ms",
        summary.cache_hits, summary.cache_misses, summary.duration_ms
    );

    match &result.error {
        None => {
            let _ = writeln!(out, "{}", "Analysis completed".green().bold());
        }
        Some(error) => {
            let _ = writeln!(out, "{} {}", "Analysis failed:".red().bold(), error);
        }
    }
    out
}

pub fn render_json(result: &PipelineResult) -> Result<String> {
    Ok(serde_json::to_string_pretty(result)?)
}

pub fn render_languages(stats: &LanguageStatistics) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} files, {} lines",
        stats.total_files.to_string().yellow(),
        stats.total_lines
    );
    for language in &stats.languages {
        let _ = writeln!(
            out,
            "  {:<12} {:>6} files {:>8} lines {:>6.1}%",
            language.language.to_string(),
            language.file_count,
            language.line_count,
            language.percentage
        );
    }
    if let Some(primary) = stats.primary_language {
        let _ = writeln!(out, "primary: {}", primary.to_string().green());
    }
    if stats.unknown_files > 0 {
        let _ = writeln!(out, "unrecognized: {} files", stats.unknown_files);
    }
    out
}

/// 1 when the run failed or a finding reaches `fail_on`, otherwise 0.
pub fn exit_code(result: &PipelineResult, fail_on: Option<Severity>) -> i32 {
    if !result.success {
        return 1;
    }
    match fail_on {
        Some(threshold) if result.findings_at_least(threshold).next().is_some() => 1,
        _ => 0,
    }
}
