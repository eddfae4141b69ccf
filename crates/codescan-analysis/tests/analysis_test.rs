use codescan_analysis::{
    complexity_severity, AnalysisInput, CallGraphAnalyzer, ComplexityAnalyzer, DependencyAnalyzer,
    Layer, StaticAnalyzer, StructureAnalyzer,
};
use codescan_core::{FileInfo, Language, Severity, StaticFindingKind};
use codescan_parser::AstParser;

fn input(files: &[(&str, &str)]) -> AnalysisInput {
    let parser = AstParser::default();
    let mut infos = Vec::new();
    let mut asts = Vec::new();
    for (path, source) in files {
        let language = if path.ends_with(".py") {
            Language::Python
        } else {
            Language::TypeScript
        };
        asts.push(parser.parse_content(path, source, language));
        infos.push(FileInfo::new(*path, *source));
    }
    AnalysisInput::new(infos, asts)
}

#[test]
fn test_import_cycle_reported_once() {
    let input = input(&[
        ("src/a.ts", "import { b } from './b';\nexport const a = 1;\n"),
        ("src/b.ts", "import { c } from './c';\nexport const b = 2;\n"),
        ("src/c.ts", "import { a } from './a';\nexport const c = 3;\n"),
    ]);
    let output = DependencyAnalyzer::default().analyze(&input);

    let cycles: Vec<_> = output
        .findings
        .iter()
        .filter(|f| f.kind == StaticFindingKind::CircularDependency)
        .collect();
    assert_eq!(cycles.len(), 1);
    assert_eq!(cycles[0].severity, Severity::High);
    assert_eq!(
        output.report.cycles,
        vec![vec![
            "src/a.ts".to_string(),
            "src/b.ts".to_string(),
            "src/c.ts".to_string()
        ]]
    );
    assert_eq!(output.report.fan_in.get("src/a.ts"), Some(&1));
}

#[test]
fn test_acyclic_chain_has_no_cycle() {
    let input = input(&[
        ("src/a.ts", "import { b } from './b';\nimport React from 'react';\n"),
        ("src/b.ts", "import { c } from './c';\nimport { x } from '@scope/pkg/deep';\n"),
        ("src/c.ts", "export const c = 3;\n"),
    ]);
    let output = DependencyAnalyzer::default().analyze(&input);

    assert!(output.report.cycles.is_empty());
    assert!(output
        .findings
        .iter()
        .all(|f| f.kind != StaticFindingKind::CircularDependency));
    assert_eq!(output.report.dependencies_of("src/a.ts"), vec!["src/b.ts"]);
    assert_eq!(output.report.fan_out.get("src/a.ts"), Some(&2));
    assert_eq!(output.report.external_packages.get("react"), Some(&1));
    assert_eq!(output.report.external_packages.get("@scope/pkg"), Some(&1));
}

#[test]
fn test_high_coupling() {
    let mut imports = String::new();
    for i in 0..16 {
        imports.push_str(&format!("import x{} from 'pkg{}';\n", i, i));
    }
    let input = input(&[("src/hub.ts", imports.as_str())]);
    let output = DependencyAnalyzer::default().analyze(&input);
    assert_eq!(output.findings.len(), 1);
    assert_eq!(output.findings[0].kind, StaticFindingKind::HighCoupling);
    assert_eq!(output.findings[0].severity, Severity::Medium);
}

#[test]
fn test_branchy_function_is_flagged() {
    let mut source = String::from("export function branchy(x: number) {\n");
    for i in 0..16 {
        source.push_str(&format!("  if (x === {}) {{ return {}; }}\n", i, i));
    }
    source.push_str("  return -1;\n}\n\nexport function simple() {\n  return 1;\n}\n");
    let input = input(&[("src/branchy.ts", source.as_str())]);
    let output = ComplexityAnalyzer::default().analyze(&input);

    let branchy = output
        .report
        .functions
        .iter()
        .find(|f| f.name == "branchy")
        .unwrap();
    assert_eq!(branchy.complexity, 17);
    let simple = output
        .report
        .functions
        .iter()
        .find(|f| f.name == "simple")
        .unwrap();
    assert_eq!(simple.complexity, 1);

    assert_eq!(output.findings.len(), 1);
    assert_eq!(output.findings[0].kind, StaticFindingKind::HighComplexity);
    assert_eq!(output.findings[0].severity, complexity_severity(17));
    assert_eq!(output.report.files[0].max_complexity, 17);
}

#[test]
fn test_long_file_is_flagged() {
    let mut source = String::new();
    for _ in 0..310 {
        source.push_str("# filler\n");
    }
    source.push_str("def run():\n    return 1\n");
    let input = input(&[("tools/long.py", source.as_str())]);
    let output = ComplexityAnalyzer::default().analyze(&input);

    let long: Vec<_> = output
        .findings
        .iter()
        .filter(|f| f.kind == StaticFindingKind::FileTooLong)
        .collect();
    assert_eq!(long.len(), 1);
    assert_eq!(long[0].severity, Severity::Low);
}

#[test]
fn test_domain_importing_presentation_is_a_violation() {
    let input = input(&[
        ("src/domain/order.ts", "import { render } from '../ui/view';\nexport class Order {}\n"),
        ("src/ui/view.ts", "import { Order } from '../domain/order';\nexport function render() {}\n"),
    ]);
    let output = StructureAnalyzer::default().analyze(&input);

    let violations: Vec<_> = output
        .findings
        .iter()
        .filter(|f| f.kind == StaticFindingKind::LayerViolation)
        .collect();
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].severity, Severity::High);
    assert_eq!(violations[0].location.file_path, "src/domain/order.ts");
    assert_eq!(output.report.violations[0].to_layer, Layer::Presentation);
    assert_eq!(
        output.report.layers.get(&Layer::Domain),
        Some(&vec!["src/domain".to_string()])
    );
}

#[test]
fn test_dead_code_and_entry_points() {
    let input = input(&[(
        "src/jobs.ts",
        "function helper() { return 1; }\nfunction unused() { return 2; }\nexport function run() { return helper(); }\n",
    )]);
    let output = CallGraphAnalyzer::default().analyze(&input);

    assert_eq!(output.report.entry_points, vec!["src/jobs.ts::run"]);
    assert_eq!(output.report.dead_functions, vec!["src/jobs.ts::unused"]);
    assert_eq!(
        output.report.callees_of("src/jobs.ts::run"),
        &["src/jobs.ts::helper".to_string()]
    );
    let dead: Vec<_> = output
        .findings
        .iter()
        .filter(|f| f.kind == StaticFindingKind::DeadCode)
        .collect();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].severity, Severity::Low);
}

#[test]
fn test_deep_call_chain() {
    let source = "def main():\n    step1()\n\ndef step1():\n    step2()\n\ndef step2():\n    step3()\n\ndef step3():\n    step4()\n\ndef step4():\n    step5()\n\ndef step5():\n    step6()\n\ndef step6():\n    return 1\n\ndef _unused():\n    pass\n";
    let input = input(&[("app/flow.py", source)]);
    let output = CallGraphAnalyzer::default().analyze(&input);

    let chains: Vec<_> = output
        .findings
        .iter()
        .filter(|f| f.kind == StaticFindingKind::DeepCallChain)
        .collect();
    assert_eq!(chains.len(), 1);
    assert_eq!(chains[0].severity, Severity::Medium);
    assert_eq!(output.report.deep_chains[0].len(), 7);
    assert_eq!(output.report.dead_functions, vec!["app/flow.py::_unused"]);
}

#[test]
fn test_failed_parses_are_skipped() {
    let input = AnalysisInput::new(
        vec![FileInfo::new("src/x.ts", "export function f() {}\n")],
        Vec::new(),
    );
    let output = CallGraphAnalyzer::default().analyze(&input);
    assert!(output.report.functions.is_empty());
    assert!(output.findings.is_empty());
}
