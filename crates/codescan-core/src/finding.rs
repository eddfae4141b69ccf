use crate::hash::short_hash;
use crate::types::{Language, Location, Severity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Category a rule declares for itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum RuleCategory {
    Security,
    Style,
    Architecture,
    Test,
    Quality,
    Custom(String),
}

impl RuleCategory {
    pub fn as_str(&self) -> &str {
        match self {
            RuleCategory::Security => "security",
            RuleCategory::Style => "style",
            RuleCategory::Architecture => "architecture",
            RuleCategory::Test => "test",
            RuleCategory::Quality => "quality",
            RuleCategory::Custom(s) => s,
        }
    }
}

impl From<String> for RuleCategory {
    fn from(s: String) -> Self {
        match s.to_lowercase().as_str() {
            "security" => RuleCategory::Security,
            "style" => RuleCategory::Style,
            "architecture" => RuleCategory::Architecture,
            "test" => RuleCategory::Test,
            "quality" => RuleCategory::Quality,
            _ => RuleCategory::Custom(s),
        }
    }
}

impl From<RuleCategory> for String {
    fn from(c: RuleCategory) -> Self {
        c.as_str().to_string()
    }
}

impl fmt::Display for RuleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleViolation {
    pub rule_id: String,
    pub rule_name: String,
    pub category: RuleCategory,
    pub severity: Severity,
    pub message: String,
    pub file_path: String,
    pub location: Location,
    pub suggestion: Option<String>,
    #[serde(default)]
    pub references: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StaticFindingKind {
    HighComplexity,
    FileTooLong,
    LayerViolation,
    DeepNesting,
    FatModule,
    CircularDependency,
    HighCoupling,
    DeadCode,
    DeepCallChain,
}

impl StaticFindingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StaticFindingKind::HighComplexity => "high-complexity",
            StaticFindingKind::FileTooLong => "file-too-long",
            StaticFindingKind::LayerViolation => "layer-violation",
            StaticFindingKind::DeepNesting => "deep-nesting",
            StaticFindingKind::FatModule => "fat-module",
            StaticFindingKind::CircularDependency => "circular-dependency",
            StaticFindingKind::HighCoupling => "high-coupling",
            StaticFindingKind::DeadCode => "dead-code",
            StaticFindingKind::DeepCallChain => "deep-call-chain",
        }
    }
}

impl fmt::Display for StaticFindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticFinding {
    pub id: String,
    pub kind: StaticFindingKind,
    pub message: String,
    pub severity: Severity,
    pub location: Location,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl StaticFinding {
    /// The id is derived from kind, location and message, so repeated runs agree.
    pub fn new(
        kind: StaticFindingKind,
        message: impl Into<String>,
        severity: Severity,
        location: Location,
    ) -> Self {
        let message = message.into();
        let id = short_hash(&[
            kind.as_str(),
            &location.file_path,
            &location.start_line.to_string(),
            &message,
        ]);
        Self {
            id,
            kind,
            message,
            severity,
            location,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MainCategory {
    Structure,
    Quality,
    Security,
    Operations,
    Test,
    Standards,
}

impl MainCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            MainCategory::Structure => "STRUCTURE",
            MainCategory::Quality => "QUALITY",
            MainCategory::Security => "SECURITY",
            MainCategory::Operations => "OPERATIONS",
            MainCategory::Test => "TEST",
            MainCategory::Standards => "STANDARDS",
        }
    }
}

impl fmt::Display for MainCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubCategory {
    Secret,
    Injection,
    Xss,
    CodeExecution,
    Crypto,
    Transport,
    Authentication,
    Deserialization,
    DataExposure,
    Complexity,
    FileSize,
    DeadCode,
    Naming,
    MagicValue,
    DebugCode,
    Formatting,
    FunctionSize,
    TypeSafety,
    Coupling,
    CircularDependency,
    Layering,
    Nesting,
    ModuleSize,
    CallDepth,
    ImportHygiene,
    Coverage,
    TestQuality,
    Logging,
    Other,
}

impl SubCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubCategory::Secret => "SECRET",
            SubCategory::Injection => "INJECTION",
            SubCategory::Xss => "XSS",
            SubCategory::CodeExecution => "CODE_EXECUTION",
            SubCategory::Crypto => "CRYPTO",
            SubCategory::Transport => "TRANSPORT",
            SubCategory::Authentication => "AUTHENTICATION",
            SubCategory::Deserialization => "DESERIALIZATION",
            SubCategory::DataExposure => "DATA_EXPOSURE",
            SubCategory::Complexity => "COMPLEXITY",
            SubCategory::FileSize => "FILE_SIZE",
            SubCategory::DeadCode => "DEAD_CODE",
            SubCategory::Naming => "NAMING",
            SubCategory::MagicValue => "MAGIC_VALUE",
            SubCategory::DebugCode => "DEBUG_CODE",
            SubCategory::Formatting => "FORMATTING",
            SubCategory::FunctionSize => "FUNCTION_SIZE",
            SubCategory::TypeSafety => "TYPE_SAFETY",
            SubCategory::Coupling => "COUPLING",
            SubCategory::CircularDependency => "CIRCULAR_DEPENDENCY",
            SubCategory::Layering => "LAYERING",
            SubCategory::Nesting => "NESTING",
            SubCategory::ModuleSize => "MODULE_SIZE",
            SubCategory::CallDepth => "CALL_DEPTH",
            SubCategory::ImportHygiene => "IMPORT_HYGIENE",
            SubCategory::Coverage => "COVERAGE",
            SubCategory::TestQuality => "TEST_QUALITY",
            SubCategory::Logging => "LOGGING",
            SubCategory::Other => "OTHER",
        }
    }
}

impl fmt::Display for SubCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The finding a categorized result was derived from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "finding", rename_all = "snake_case")]
pub enum FindingSource {
    Violation(RuleViolation),
    Static(StaticFinding),
}

impl FindingSource {
    pub fn rule_id(&self) -> &str {
        match self {
            FindingSource::Violation(v) => &v.rule_id,
            FindingSource::Static(f) => f.kind.as_str(),
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            FindingSource::Violation(v) => v.severity,
            FindingSource::Static(f) => f.severity,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            FindingSource::Violation(v) => &v.message,
            FindingSource::Static(f) => &f.message,
        }
    }

    pub fn location(&self) -> &Location {
        match self {
            FindingSource::Violation(v) => &v.location,
            FindingSource::Static(f) => &f.location,
        }
    }

    pub fn file_path(&self) -> &str {
        match self {
            FindingSource::Violation(v) => &v.file_path,
            FindingSource::Static(f) => &f.location.file_path,
        }
    }

    pub fn suggestion(&self) -> Option<&str> {
        match self {
            FindingSource::Violation(v) => v.suggestion.as_deref(),
            FindingSource::Static(_) => None,
        }
    }

    pub fn to_raw(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorizedResult {
    pub main_category: MainCategory,
    pub sub_category: SubCategory,
    pub source: FindingSource,
}

/// Text produced by the optional AI enhancement stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiFields {
    pub explanation: Option<String>,
    pub suggestion: Option<String>,
    pub security_advice: Option<String>,
}

impl AiFields {
    pub fn is_empty(&self) -> bool {
        self.explanation.is_none() && self.suggestion.is_none() && self.security_advice.is_none()
    }
}

/// Canonical finding record handed to the result sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedResult {
    pub id: String,
    pub project_id: String,
    pub execution_id: String,
    pub file_path: String,
    pub line_start: u32,
    pub line_end: u32,
    pub language: Language,
    pub main_category: MainCategory,
    pub sub_category: SubCategory,
    pub rule_id: String,
    pub severity: Severity,
    pub message: String,
    pub suggestion: Option<String>,
    pub raw: serde_json::Value,
    pub ai_explanation: Option<String>,
    pub ai_suggestion: Option<String>,
    pub ai_security_advice: Option<String>,
    pub deterministic: bool,
    pub created_at: DateTime<Utc>,
}

impl NormalizedResult {
    /// Writes AI text. Fields absent in `fields` are left untouched; nothing
    /// else on the record can change through this path.
    pub fn apply_ai(&mut self, fields: AiFields) {
        if let Some(explanation) = fields.explanation {
            self.ai_explanation = Some(explanation);
        }
        if let Some(suggestion) = fields.suggestion {
            self.ai_suggestion = Some(suggestion);
        }
        if let Some(advice) = fields.security_advice {
            self.ai_security_advice = Some(advice);
        }
    }

    pub fn has_ai_fields(&self) -> bool {
        self.ai_explanation.is_some()
            || self.ai_suggestion.is_some()
            || self.ai_security_advice.is_some()
    }
}
