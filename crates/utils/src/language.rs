//! File-extension language detection and unified-diff helpers used when
//! turning a pull request's changed files into analyzable units.

const EXTENSIONS: &[(&str, &str)] = &[
    (".py", "python"),
    (".js", "javascript"),
    (".ts", "typescript"),
    (".jsx", "javascript"),
    (".tsx", "typescript"),
    (".java", "java"),
    (".cpp", "cpp"),
    (".c", "c"),
    (".h", "c"),
    (".go", "go"),
    (".rs", "rust"),
    (".php", "php"),
    (".rb", "ruby"),
    (".swift", "swift"),
    (".kt", "kotlin"),
    (".scala", "scala"),
    (".sh", "shell"),
    (".sql", "sql"),
    (".html", "html"),
    (".css", "css"),
    (".scss", "scss"),
    (".sass", "sass"),
    (".xml", "xml"),
    (".yaml", "yaml"),
    (".yml", "yaml"),
    (".json", "json"),
    (".md", "markdown"),
    (".txt", "text"),
];

/// Best-effort language detection from a filename. Returns "unknown" when no
/// extension matches.
pub fn detect_language(filename: &str) -> &'static str {
    let lower = filename.to_lowercase();
    EXTENSIONS
        .iter()
        .find(|(ext, _)| lower.ends_with(ext))
        .map(|(_, lang)| *lang)
        .unwrap_or("unknown")
}

/// Extracts the starting line numbers of added hunks from a unified diff
/// patch, e.g. `@@ -1,4 +10,6 @@` yields 10. Malformed hunk headers are
/// skipped.
pub fn extract_changed_lines(patch: &str) -> Vec<i64> {
    let mut changed_lines = Vec::new();
    for line in patch.lines() {
        if !line.starts_with("@@") {
            continue;
        }
        let Some(added) = line.split(' ').nth(2) else {
            continue;
        };
        let Some(range) = added.strip_prefix('+') else {
            continue;
        };
        let start = range.split(',').next().unwrap_or(range);
        if let Ok(n) = start.parse::<i64>() {
            changed_lines.push(n);
        }
    }
    changed_lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_common_languages() {
        assert_eq!(detect_language("src/app.py"), "python");
        assert_eq!(detect_language("Main.JAVA"), "java");
        assert_eq!(detect_language("lib.rs"), "rust");
        assert_eq!(detect_language("Makefile"), "unknown");
    }

    #[test]
    fn extracts_hunk_start_lines() {
        let patch = "@@ -1,4 +1,6 @@\n+a\n@@ -20,3 +25,8 @@\n+b\n";
        assert_eq!(extract_changed_lines(patch), vec![1, 25]);
    }

    #[test]
    fn ignores_malformed_hunks() {
        assert!(extract_changed_lines("@@ garbage\nnot a hunk").is_empty());
        assert!(extract_changed_lines("").is_empty());
    }
}
