// ABOUTME: Path normalization and import specifier resolution against the analyzed file set.
// ABOUTME: Probes source extensions and index files the way module loaders do.
use std::collections::HashSet;
use std::path::Path;

const PROBE_EXTENSIONS: &[&str] = &[
    "ts", "tsx", "d.ts", "js", "jsx", "mjs", "cjs", "mts", "cts", "py", "java", "go",
];
const INDEX_FILES: &[&str] = &["index", "__init__"];

/// Forward slashes, no `.` segments, `..` folded where possible.
pub fn normalize_path(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let absolute = unified.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => match parts.last() {
                Some(last) if *last != ".." => {
                    parts.pop();
                }
                _ if absolute => {}
                _ => parts.push(".."),
            },
            other => parts.push(other),
        }
    }
    let joined = parts.join("/");
    if absolute {
        format!("/{}", joined)
    } else {
        joined
    }
}

/// Path without its final extension.
pub fn strip_extension(path: &str) -> &str {
    let file_start = path.rfind('/').map(|i| i + 1).unwrap_or(0);
    match path[file_start..].rfind('.') {
        Some(dot) if dot > 0 => &path[..file_start + dot],
        _ => path,
    }
}

fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// Python relative module syntax (`.models`, `..core.base`) as a relative path.
fn python_module_path(specifier: &str) -> String {
    let dots = specifier.chars().take_while(|c| *c == '.').count();
    let rest = specifier[dots..].replace('.', "/");
    let prefix = if dots <= 1 {
        "./".to_string()
    } else {
        "../".repeat(dots - 1)
    };
    format!("{}{}", prefix, rest)
}

/// Dotted Python/Java module names (`pkg.models`, `com.acme.Service`) matched
/// against path suffixes of known files.
fn resolve_dotted(from: &str, specifier: &str, known: &HashSet<String>) -> Option<String> {
    let ext = Path::new(from).extension()?.to_str()?;
    if !matches!(ext, "py" | "java") || specifier.contains('/') {
        return None;
    }
    let module = specifier.trim_end_matches(".*").replace('.', "/");
    let candidates = [format!("{}.{}", module, ext), format!("{}/__init__.py", module)];
    known
        .iter()
        .filter(|path| {
            candidates
                .iter()
                .any(|c| *path == c || path.ends_with(&format!("/{}", c)))
        })
        .min()
        .cloned()
}

/// Resolves an import made from `from_file` to a member of `known`
/// (normalized paths). Package specifiers only resolve through dotted
/// Python/Java module names.
pub fn resolve_import(from_file: &str, specifier: &str, known: &HashSet<String>) -> Option<String> {
    let from = normalize_path(from_file);
    if !specifier.starts_with('.') {
        return resolve_dotted(&from, specifier, known);
    }
    let is_python = Path::new(&from)
        .extension()
        .map(|e| e == "py" || e == "pyi")
        .unwrap_or(false);
    let relative = if is_python && !specifier.contains('/') {
        python_module_path(specifier)
    } else {
        specifier.to_string()
    };

    let dir = parent_dir(&from);
    let joined = if dir.is_empty() {
        relative
    } else {
        format!("{}/{}", dir, relative)
    };
    let base = normalize_path(&joined);

    if known.contains(&base) {
        return Some(base);
    }
    // `./util.js` written against a `util.ts` source
    let stem = strip_extension(&base);
    for ext in PROBE_EXTENSIONS {
        let candidate = format!("{}.{}", base, ext);
        if known.contains(&candidate) {
            return Some(candidate);
        }
        if stem != base {
            let candidate = format!("{}.{}", stem, ext);
            if known.contains(&candidate) {
                return Some(candidate);
            }
        }
    }
    for index in INDEX_FILES {
        for ext in PROBE_EXTENSIONS {
            let candidate = format!("{}/{}.{}", base, index, ext);
            if known.contains(&candidate) {
                return Some(candidate);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn known(paths: &[&str]) -> HashSet<String> {
        paths.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn normalizes_dot_segments() {
        assert_eq!(normalize_path("src/./a/../b.ts"), "src/b.ts");
        assert_eq!(normalize_path("./src\\x.ts"), "src/x.ts");
        assert_eq!(normalize_path("../up.ts"), "../up.ts");
        assert_eq!(normalize_path("/root/./a.ts"), "/root/a.ts");
    }

    #[test]
    fn strips_only_final_extension() {
        assert_eq!(strip_extension("src/a.service.ts"), "src/a.service");
        assert_eq!(strip_extension("src.d/Makefile"), "src.d/Makefile");
        assert_eq!(strip_extension(".env"), ".env");
    }

    #[test]
    fn probes_extensions_and_index_files() {
        let files = known(&["src/a.ts", "src/lib/index.ts", "src/util.ts"]);
        assert_eq!(resolve_import("src/b.ts", "./a", &files), Some("src/a.ts".into()));
        assert_eq!(resolve_import("src/b.ts", "./lib", &files), Some("src/lib/index.ts".into()));
        assert_eq!(resolve_import("src/b.ts", "./util.js", &files), Some("src/util.ts".into()));
        assert_eq!(resolve_import("src/b.ts", "react", &files), None);
        assert_eq!(resolve_import("src/b.ts", "./missing", &files), None);
    }

    #[test]
    fn resolves_python_relative_modules() {
        let files = known(&["pkg/models.py", "core/__init__.py", "pkg/sub/x.py"]);
        assert_eq!(
            resolve_import("pkg/views.py", ".models", &files),
            Some("pkg/models.py".into())
        );
        assert_eq!(
            resolve_import("pkg/sub/x.py", "..models", &files),
            Some("pkg/models.py".into())
        );
        assert_eq!(resolve_import("app.py", "core", &files), Some("core/__init__.py".into()));
        assert_eq!(resolve_import("app.py", "os", &files), None);
    }

    #[test]
    fn resolves_java_packages_by_suffix() {
        let files = known(&["src/main/java/com/acme/Service.java"]);
        assert_eq!(
            resolve_import("src/main/java/com/acme/web/Api.java", "com.acme.Service", &files),
            Some("src/main/java/com/acme/Service.java".into())
        );
        assert_eq!(resolve_import("main.go", "fmt", &files), None);
    }
}
