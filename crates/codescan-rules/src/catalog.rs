use crate::builtin::builtin_ast_rules;
use crate::lexical::{
    ArchitectureRules, LexicalRuleSet, SecurityRules, StyleRules, TestRules,
};
use codescan_core::{RuleCategory, Severity};
use serde::Serialize;

/// Where a catalogued rule is implemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    Lexical,
    Ast,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogEntry {
    pub id: String,
    pub name: String,
    pub category: RuleCategory,
    pub severity: Severity,
    pub description: String,
    pub kind: RuleKind,
}

/// Every built-in rule, lexical sets first, in declaration order.
#[derive(Debug, Clone, Serialize)]
pub struct RuleCatalog {
    entries: Vec<CatalogEntry>,
}

impl RuleCatalog {
    pub fn builtin() -> Self {
        let sets: [&dyn LexicalRuleSet; 4] =
            [&SecurityRules, &StyleRules, &TestRules, &ArchitectureRules];

        let mut entries: Vec<CatalogEntry> = sets
            .iter()
            .flat_map(|set| set.rules().iter())
            .map(|d| CatalogEntry {
                id: d.id.to_string(),
                name: d.name.to_string(),
                category: d.category.clone(),
                severity: d.severity,
                description: d.description.to_string(),
                kind: RuleKind::Lexical,
            })
            .collect();

        entries.extend(builtin_ast_rules().into_iter().map(|rule| CatalogEntry {
            id: rule.id,
            name: rule.name,
            category: rule.category,
            severity: rule.severity,
            description: rule.description,
            kind: RuleKind::Ast,
        }));

        Self { entries }
    }

    pub fn get(&self, id: &str) -> Option<&CatalogEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn by_category(&self, category: &RuleCategory) -> Vec<&CatalogEntry> {
        self.entries
            .iter()
            .filter(|e| &e.category == category)
            .collect()
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for RuleCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_are_unique() {
        let catalog = RuleCatalog::builtin();
        let ids: HashSet<&str> = catalog.entries().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids.len(), catalog.len());
        assert_eq!(catalog.len(), 16 + 6 + 5 + 6 + 5);
    }

    #[test]
    fn lookup() {
        let catalog = RuleCatalog::builtin();
        let entry = catalog.get("security/aws-secret-key").unwrap();
        assert_eq!(entry.severity, Severity::Critical);
        assert_eq!(entry.kind, RuleKind::Lexical);
        assert_eq!(
            catalog.get("ast/too-many-parameters").map(|e| e.kind),
            Some(RuleKind::Ast)
        );
        assert!(catalog.get("nope").is_none());
        assert_eq!(catalog.by_category(&RuleCategory::Test).len(), 5);
    }
}
