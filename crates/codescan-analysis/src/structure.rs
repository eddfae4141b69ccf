use crate::analyzer::{AnalysisInput, AnalyzerOutput, StaticAnalyzer};
use codescan_core::{Location, PipelineConfig, Severity, StaticFinding, StaticFindingKind};
use codescan_graph::{normalize_path, resolve_import};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use tracing::debug;

pub const DEFAULT_MAX_NESTING_DEPTH: usize = 5;
pub const DEFAULT_MAX_MODULE_FILES: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    Presentation,
    Application,
    Domain,
    Infrastructure,
}

impl Layer {
    pub const ALL: [Layer; 4] = [
        Layer::Presentation,
        Layer::Application,
        Layer::Domain,
        Layer::Infrastructure,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Layer::Presentation => "presentation",
            Layer::Application => "application",
            Layer::Domain => "domain",
            Layer::Infrastructure => "infrastructure",
        }
    }

    fn keywords(&self) -> &'static [&'static str] {
        match self {
            Layer::Presentation => &[
                "presentation",
                "ui",
                "views",
                "controllers",
                "components",
                "pages",
                "routes",
                "handlers",
                "api",
                "web",
            ],
            Layer::Application => &["application", "services", "usecases"],
            Layer::Domain => &["domain", "models", "entities", "core"],
            Layer::Infrastructure => &[
                "infrastructure",
                "infra",
                "repositories",
                "db",
                "persistence",
                "adapters",
            ],
        }
    }

    /// Layers this one may import from, besides itself.
    pub fn allowed_dependencies(&self) -> &'static [Layer] {
        match self {
            Layer::Presentation => &[Layer::Application, Layer::Domain],
            Layer::Application => &[Layer::Domain, Layer::Infrastructure],
            Layer::Infrastructure => &[Layer::Domain],
            Layer::Domain => &[],
        }
    }

    pub fn may_depend_on(&self, other: Layer) -> bool {
        *self == other || self.allowed_dependencies().contains(&other)
    }

    /// Layer of the outermost directory segment that names one.
    pub fn detect(file_path: &str) -> Option<Layer> {
        let normalized = normalize_path(file_path);
        let mut segments: Vec<&str> = normalized.split('/').collect();
        segments.pop();
        segments.iter().find_map(|segment| {
            let segment = segment.to_ascii_lowercase();
            Layer::ALL
                .into_iter()
                .find(|layer| layer.keywords().contains(&segment.as_str()))
        })
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleInfo {
    /// Directory path; `""` for the project root.
    pub path: String,
    pub files: Vec<String>,
    pub depth: usize,
    pub layer: Option<Layer>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerViolation {
    pub from_file: String,
    pub to_file: String,
    pub from_layer: Layer,
    pub to_layer: Layer,
    pub line: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StructureReport {
    pub modules: Vec<ModuleInfo>,
    pub layers: BTreeMap<Layer, Vec<String>>,
    pub violations: Vec<LayerViolation>,
    pub max_depth: usize,
}

impl StructureReport {
    pub fn module(&self, path: &str) -> Option<&ModuleInfo> {
        self.modules.iter().find(|m| m.path == path)
    }
}

fn module_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

fn depth_of(module: &str) -> usize {
    if module.is_empty() {
        0
    } else {
        module.split('/').filter(|s| *s != "..").count()
    }
}

#[derive(Debug, Clone)]
pub struct StructureAnalyzer {
    max_nesting_depth: usize,
    max_module_files: usize,
}

impl Default for StructureAnalyzer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_NESTING_DEPTH, DEFAULT_MAX_MODULE_FILES)
    }
}

impl StructureAnalyzer {
    pub fn new(max_nesting_depth: usize, max_module_files: usize) -> Self {
        Self {
            max_nesting_depth,
            max_module_files,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.max_nesting_depth, config.max_module_files)
    }

    fn collect_modules(&self, input: &AnalysisInput) -> BTreeMap<String, Vec<String>> {
        let mut modules: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for file in input.files.iter() {
            let path = normalize_path(&file.path);
            modules
                .entry(module_of(&path).to_string())
                .or_default()
                .push(path);
        }
        for files in modules.values_mut() {
            files.sort();
            files.dedup();
        }
        modules
    }

    fn find_violations(&self, input: &AnalysisInput) -> Vec<LayerViolation> {
        let known: HashSet<String> = input
            .files
            .iter()
            .map(|f| normalize_path(&f.path))
            .collect();
        let mut violations = Vec::new();

        for ast in input.parsed() {
            let from_file = normalize_path(&ast.file_path);
            let Some(from_layer) = Layer::detect(&from_file) else {
                continue;
            };
            for import in ast.imports.iter().filter(|i| i.is_relative) {
                let to_file = resolve_import(&from_file, &import.source, &known).unwrap_or_else(|| {
                    let dir = module_of(&from_file);
                    normalize_path(&format!("{}/{}", dir, import.source))
                });
                let Some(to_layer) = Layer::detect(&to_file) else {
                    continue;
                };
                if !from_layer.may_depend_on(to_layer) {
                    violations.push(LayerViolation {
                        from_file: from_file.clone(),
                        to_file,
                        from_layer,
                        to_layer,
                        line: import.line,
                    });
                }
            }
        }
        violations
    }
}

impl StaticAnalyzer for StructureAnalyzer {
    type Report = StructureReport;

    fn name(&self) -> &'static str {
        "structure"
    }

    fn analyze(&self, input: &AnalysisInput) -> AnalyzerOutput<StructureReport> {
        let mut report = StructureReport::default();
        let mut findings = Vec::new();

        for (path, files) in self.collect_modules(input) {
            let depth = depth_of(&path);
            let layer = files.first().and_then(|f| Layer::detect(f));
            report.max_depth = report.max_depth.max(depth);

            if depth > self.max_nesting_depth {
                findings.push(
                    StaticFinding::new(
                        StaticFindingKind::DeepNesting,
                        format!(
                            "Directory '{}' is nested {} levels deep (limit {})",
                            path, depth, self.max_nesting_depth
                        ),
                        Severity::Low,
                        Location::file(&files[0]),
                    )
                    .with_metadata("module", path.clone())
                    .with_metadata("depth", depth),
                );
            }
            if files.len() > self.max_module_files {
                findings.push(
                    StaticFinding::new(
                        StaticFindingKind::FatModule,
                        format!(
                            "Module '{}' contains {} files (limit {})",
                            path,
                            files.len(),
                            self.max_module_files
                        ),
                        Severity::Medium,
                        Location::file(&files[0]),
                    )
                    .with_metadata("module", path.clone())
                    .with_metadata("fileCount", files.len()),
                );
            }
            if let Some(layer) = layer {
                report.layers.entry(layer).or_default().push(path.clone());
            }
            report.modules.push(ModuleInfo {
                path,
                files,
                depth,
                layer,
            });
        }

        for violation in self.find_violations(input) {
            findings.push(
                StaticFinding::new(
                    StaticFindingKind::LayerViolation,
                    format!(
                        "{} layer must not depend on {} layer ({} imports {})",
                        violation.from_layer,
                        violation.to_layer,
                        violation.from_file,
                        violation.to_file
                    ),
                    Severity::High,
                    Location::line(&violation.from_file, violation.line),
                )
                .with_metadata("fromLayer", violation.from_layer.as_str())
                .with_metadata("toLayer", violation.to_layer.as_str())
                .with_metadata("target", violation.to_file.clone()),
            );
            report.violations.push(violation);
        }

        debug!(
            modules = report.modules.len(),
            violations = report.violations.len(),
            "structure analysis finished"
        );
        AnalyzerOutput { report, findings }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codescan_core::FileInfo;

    #[test]
    fn detects_layers_from_directory_names() {
        assert_eq!(Layer::detect("src/ui/Button.tsx"), Some(Layer::Presentation));
        assert_eq!(Layer::detect("src/services/billing.ts"), Some(Layer::Application));
        assert_eq!(Layer::detect("app/Domain/order.py"), Some(Layer::Domain));
        assert_eq!(Layer::detect("src/db/pool.go"), Some(Layer::Infrastructure));
        assert_eq!(Layer::detect("src/util/strings.ts"), None);
        // the file name itself is not a layer marker
        assert_eq!(Layer::detect("src/api.ts"), None);
    }

    #[test]
    fn allowed_dependency_table() {
        assert!(Layer::Presentation.may_depend_on(Layer::Domain));
        assert!(Layer::Application.may_depend_on(Layer::Infrastructure));
        assert!(!Layer::Domain.may_depend_on(Layer::Infrastructure));
        assert!(!Layer::Infrastructure.may_depend_on(Layer::Presentation));
        assert!(Layer::Domain.may_depend_on(Layer::Domain));
    }

    #[test]
    fn flags_deep_and_fat_modules() {
        let mut files = vec![FileInfo::new("a/b/c/d/e/f/deep.ts", "")];
        for i in 0..21 {
            files.push(FileInfo::new(format!("big/f{}.ts", i), ""));
        }
        let input = AnalysisInput::new(files, Vec::new());
        let output = StructureAnalyzer::default().analyze(&input);

        let kinds: Vec<_> = output.findings.iter().map(|f| f.kind).collect();
        assert!(kinds.contains(&StaticFindingKind::DeepNesting));
        assert!(kinds.contains(&StaticFindingKind::FatModule));
        assert_eq!(output.report.module("big").map(|m| m.files.len()), Some(21));
        assert_eq!(output.report.max_depth, 6);
    }
}
