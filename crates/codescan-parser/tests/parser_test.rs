use codescan_core::{AstFile, AstNodeType, FileInfo, Language, ParseFidelity};
use codescan_parser::{AstCache, AstParser, LanguageRegistry, LanguageStatistics};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn write(dir: &TempDir, name: &str, content: &str) -> FileInfo {
    let path = dir.path().join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    let content = fs::read_to_string(&path).unwrap();
    FileInfo::new(path.to_string_lossy().to_string(), content)
}

fn function_names(ast: &AstFile) -> Vec<String> {
    ast.functions().iter().filter_map(|f| f.name.clone()).collect()
}

#[test]
fn test_detect_and_parse_mixed_project() {
    let dir = TempDir::new().unwrap();
    let files = vec![
        write(
            &dir,
            "src/app.ts",
            "import { run } from './run';\nexport function main() { run(); }\n",
        ),
        write(&dir, "src/run.ts", "export const run = () => {};\n"),
        write(&dir, "tools/build.py", "import os\n\ndef build():\n    os.getcwd()\n"),
        write(&dir, "bin/deploy", "#!/usr/bin/env python3\nprint('x')\n"),
        write(&dir, "README.md", "# readme\n"),
    ];

    let registry = LanguageRegistry::new();
    let mappings: Vec<_> = files.iter().map(|f| registry.detect(f)).collect();
    let languages: Vec<_> = mappings.iter().map(|m| m.language).collect();
    assert_eq!(
        languages,
        vec![
            Language::TypeScript,
            Language::TypeScript,
            Language::Python,
            Language::Python,
            Language::Unknown,
        ]
    );

    let stats = LanguageStatistics::from_mappings(&mappings, &files);
    // python wins the file-count tie on lines
    assert_eq!(stats.primary_language, Some(Language::Python));
    assert_eq!(stats.unknown_files, 1);
    assert!(stats.is_multi_language);

    let parser = AstParser::default();
    let pairs: Vec<_> = files.into_iter().zip(mappings).collect();
    let asts = parser.parse_all(&pairs);
    assert_eq!(asts.len(), 5);

    assert_eq!(asts[0].fidelity, ParseFidelity::Full);
    assert_eq!(asts[0].imports[0].source, "./run");
    assert_eq!(asts[1].functions()[0].name.as_deref(), Some("run"));
    assert_eq!(asts[2].fidelity, ParseFidelity::Full);
    assert_eq!(asts[2].root.find_all(AstNodeType::Call).len(), 1);
    assert!(!asts[3].has_error());
    assert!(asts[4].has_error());
}

#[test]
fn test_parse_is_deterministic() {
    let source = "package main\n\nimport \"fmt\"\n\nfunc main() {\n\tfmt.Println(1)\n}\n";
    let a = AstParser::default().parse_content("main.go", source, Language::Go);
    let b = AstParser::default().parse_content("main.go", source, Language::Go);
    assert_eq!(a, b);
    let ids_a: Vec<_> = a.nodes().map(|n| n.id.clone()).collect();
    let ids_b: Vec<_> = b.nodes().map(|n| n.id.clone()).collect();
    assert_eq!(ids_a, ids_b);
}

#[test]
fn test_changed_content_misses_cache() {
    let cache = Arc::new(AstCache::new(10));
    let parser = AstParser::new(cache.clone());
    let first = parser.parse_content("a.java", "class A {}\n", Language::Java);
    let second = parser.parse_content("a.java", "class A { void f() {} }\n", Language::Java);
    assert_ne!(first.content_hash, second.content_hash);
    assert_eq!(cache.stats().misses, 2);
    assert_eq!(cache.len(), 1);
    assert_eq!(second.functions().len(), 1);

    let go = parser.parse_content("a.go", "package a; func f() { g() }\n", Language::Go);
    assert_eq!(cache.stats().misses, 3);
    assert_eq!(go.functions().len(), 1);
    assert_eq!(go.root.find_all(AstNodeType::Call).len(), 1);
}

#[test]
fn test_one_line_java_class_matches_multi_line() {
    let parser = AstParser::default();
    let one_line = parser.parse_content(
        "A.java",
        "public class A { public void run() { helper(); } private void helper() {} }\n",
        Language::Java,
    );
    let multi_line = parser.parse_content(
        "B.java",
        "public class A {\n    public void run() {\n        helper();\n    }\n\n    private void helper() {}\n}\n",
        Language::Java,
    );

    assert_eq!(function_names(&one_line), vec!["run", "helper"]);
    assert_eq!(function_names(&one_line), function_names(&multi_line));
    assert!(one_line.functions().iter().all(|f| f.is_method()));
    assert_eq!(one_line.fidelity, ParseFidelity::Full);
}

#[test]
fn test_parent_links_follow_tree() {
    let source = "class A:\n    def f(self):\n        g()\n";
    let ast = AstParser::default().parse_content("a.py", source, Language::Python);
    for node in ast.nodes() {
        for child in &node.children {
            assert_eq!(child.parent.as_deref(), Some(node.id.as_str()));
        }
    }
    assert!(ast.root.parent.is_none());
}
