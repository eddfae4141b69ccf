// ABOUTME: Security line rules: hardcoded secrets, injection, XSS, eval, weak crypto,
// ABOUTME: plain HTTP, disabled verification, unsafe deserialization and sensitive logging.
use super::{run_line_rules, LexicalRuleSet, LineRule, Lines, RuleDescriptor};
use crate::error::Result;
use crate::source::SourceFile;
use codescan_core::{Language, RuleCategory, RuleViolation, Severity};
use once_cell::sync::Lazy;

const AWS_SECRET_KEY: usize = 0;
const PRIVATE_KEY: usize = 1;
const AWS_ACCESS_KEY_ID: usize = 2;
const GITHUB_TOKEN: usize = 3;
const SLACK_TOKEN: usize = 4;
const STRIPE_KEY: usize = 5;
const HARDCODED_SECRET: usize = 6;
const SQL_INJECTION: usize = 7;
const COMMAND_INJECTION: usize = 8;
const XSS: usize = 9;
const UNSAFE_EVAL: usize = 10;
const WEAK_CRYPTO: usize = 11;
const INSECURE_TRANSPORT: usize = 12;
const DISABLED_VERIFICATION: usize = 13;
const UNSAFE_DESERIALIZATION: usize = 14;
const SENSITIVE_LOGGING: usize = 15;

pub static SECURITY_RULES: [RuleDescriptor; 16] = [
    RuleDescriptor {
        id: "security/aws-secret-key",
        name: "AWS secret access key",
        category: RuleCategory::Security,
        severity: Severity::Critical,
        description: "Hardcoded AWS secret access key",
    },
    RuleDescriptor {
        id: "security/private-key",
        name: "Private key block",
        category: RuleCategory::Security,
        severity: Severity::Critical,
        description: "PEM private key committed to source",
    },
    RuleDescriptor {
        id: "security/aws-access-key-id",
        name: "AWS access key id",
        category: RuleCategory::Security,
        severity: Severity::Critical,
        description: "Hardcoded AWS access key id",
    },
    RuleDescriptor {
        id: "security/github-token",
        name: "GitHub token",
        category: RuleCategory::Security,
        severity: Severity::Critical,
        description: "Hardcoded GitHub access token",
    },
    RuleDescriptor {
        id: "security/slack-token",
        name: "Slack token",
        category: RuleCategory::Security,
        severity: Severity::High,
        description: "Hardcoded Slack token",
    },
    RuleDescriptor {
        id: "security/stripe-key",
        name: "Stripe live key",
        category: RuleCategory::Security,
        severity: Severity::Critical,
        description: "Hardcoded Stripe live secret key",
    },
    RuleDescriptor {
        id: "security/hardcoded-secret",
        name: "Hardcoded credential",
        category: RuleCategory::Security,
        severity: Severity::High,
        description: "Password, token or API key assigned from a string literal",
    },
    RuleDescriptor {
        id: "security/sql-injection",
        name: "SQL injection",
        category: RuleCategory::Security,
        severity: Severity::High,
        description: "SQL statement built by string concatenation or interpolation",
    },
    RuleDescriptor {
        id: "security/command-injection",
        name: "Command injection",
        category: RuleCategory::Security,
        severity: Severity::High,
        description: "Shell command built from dynamic input",
    },
    RuleDescriptor {
        id: "security/xss",
        name: "Cross-site scripting",
        category: RuleCategory::Security,
        severity: Severity::High,
        description: "Unescaped HTML written into the DOM",
    },
    RuleDescriptor {
        id: "security/unsafe-eval",
        name: "Dynamic code execution",
        category: RuleCategory::Security,
        severity: Severity::High,
        description: "eval or an equivalent executes dynamic code",
    },
    RuleDescriptor {
        id: "security/weak-crypto",
        name: "Weak cryptography",
        category: RuleCategory::Security,
        severity: Severity::Medium,
        description: "Broken hash or cipher algorithm",
    },
    RuleDescriptor {
        id: "security/insecure-transport",
        name: "Insecure transport",
        category: RuleCategory::Security,
        severity: Severity::Medium,
        description: "Plain HTTP URL to a non-local host",
    },
    RuleDescriptor {
        id: "security/disabled-verification",
        name: "Disabled authentication or TLS verification",
        category: RuleCategory::Security,
        severity: Severity::High,
        description: "Certificate verification, CSRF protection or authentication switched off",
    },
    RuleDescriptor {
        id: "security/unsafe-deserialization",
        name: "Unsafe deserialization",
        category: RuleCategory::Security,
        severity: Severity::High,
        description: "Deserializer that can instantiate arbitrary objects",
    },
    RuleDescriptor {
        id: "security/sensitive-logging",
        name: "Sensitive data in logs",
        category: RuleCategory::Security,
        severity: Severity::Medium,
        description: "Credential-like value passed to a logging call",
    },
];

const SQL_VERBS: &str = r"(?:select\s.+\sfrom|insert\s+into|update\s+\w+\s+set|delete\s+from)";

/// Most specific first; a line reports only the first secret it matches.
static SECRET_RULES: Lazy<Vec<LineRule>> = Lazy::new(|| {
    vec![
        LineRule::new(
            &SECURITY_RULES[AWS_SECRET_KEY],
            &[r#"(?i)aws[_-]?secret[_-]?(?:access[_-]?)?key\w*['"]?\s*[:=]\s*['"][A-Za-z0-9/+=]{40}['"]"#],
        )
        .raw()
        .message("AWS secret access key is hardcoded")
        .suggestion("Load AWS credentials from the environment or a secrets manager"),
        LineRule::new(
            &SECURITY_RULES[PRIVATE_KEY],
            &[r"-----BEGIN (?:RSA |EC |DSA |OPENSSH |ENCRYPTED )?PRIVATE KEY-----"],
        )
        .raw()
        .message("Private key material is committed to source")
        .suggestion("Remove the key, rotate it and load it from secure storage"),
        LineRule::new(&SECURITY_RULES[AWS_ACCESS_KEY_ID], &[r"\b(?:AKIA|ASIA)[0-9A-Z]{16}\b"])
            .raw()
            .message("AWS access key id is hardcoded")
            .suggestion("Load AWS credentials from the environment or a secrets manager"),
        LineRule::new(
            &SECURITY_RULES[GITHUB_TOKEN],
            &[r"\bgh[pousr]_[A-Za-z0-9]{36,}\b", r"\bgithub_pat_[A-Za-z0-9_]{22,}\b"],
        )
        .raw()
        .message("GitHub token is hardcoded")
        .suggestion("Revoke the token and read it from the environment"),
        LineRule::new(&SECURITY_RULES[SLACK_TOKEN], &[r"\bxox[baprs]-[A-Za-z0-9-]{10,}"])
            .raw()
            .message("Slack token is hardcoded")
            .suggestion("Revoke the token and read it from the environment"),
        LineRule::new(&SECURITY_RULES[STRIPE_KEY], &[r"\b[sr]k_live_[A-Za-z0-9]{20,}\b"])
            .raw()
            .message("Stripe live key is hardcoded")
            .suggestion("Roll the key and read it from the environment"),
        LineRule::new(
            &SECURITY_RULES[HARDCODED_SECRET],
            &[r#"(?i)\b[\w.-]*(?:password|passwd|pwd|secret|api[_-]?key|apikey|access[_-]?token|auth[_-]?token|client[_-]?secret|private[_-]?key)[\w-]*['"]?\s*[:=]\s*['"][^'"\s]{8,}['"]"#],
        )
        .raw()
        .excluding(r#"(?i)[:=]\s*['"](?:\$\{|<|\{\{|your[_-]|change[_-]?me|example|placeholder|dummy|x{4,}|\*{4,})"#)
        .message("Credential is assigned from a string literal")
        .suggestion("Read credentials from configuration or a secrets manager"),
    ]
});

static SECURITY_LINE_RULES: Lazy<Vec<LineRule>> = Lazy::new(|| {
    vec![
        LineRule::new(
            &SECURITY_RULES[SQL_INJECTION],
            &[
                format!(r#"(?i)['"`][^'"`]*\b{}\b[^'"`]*['"`]\s*\+\s*\w"#, SQL_VERBS),
                format!(r#"(?i)`[^`]*\b{}\b[^`]*\$\{{"#, SQL_VERBS),
                format!(r#"(?i)\bf['"][^'"]*\b{}\b[^'"]*\{{"#, SQL_VERBS),
                format!(r#"(?i)['"][^'"]*\b{}\b[^'"]*['"]\s*(?:%\s*[\w(]|\.format\s*\()"#, SQL_VERBS),
                format!(r#"(?i)\bfmt\.Sprintf\s*\(\s*"[^"]*\b{}\b"#, SQL_VERBS),
            ],
        )
        .raw()
        .message("SQL query is built from dynamic strings")
        .suggestion("Use parameterized queries or prepared statements"),
        LineRule::new(
            &SECURITY_RULES[COMMAND_INJECTION],
            &[
                r#"\b(?:exec|execSync)\s*\(\s*(?:`[^`]*\$\{|['"][^'"]*['"]\s*\+)"#,
                r#"\bos\.(?:system|popen)\s*\(\s*(?:f['"]|[A-Za-z_]|['"][^'"]*['"]\s*(?:\+|%|\.format))"#,
                r"\bsubprocess\.\w+\s*\(.*shell\s*=\s*True",
                r#"\bRuntime\.getRuntime\(\)\.exec\s*\(\s*(?:[A-Za-z_]|"[^"]*"\s*\+)"#,
                r#"\bexec\.Command\s*\(\s*"(?:sh|bash|cmd)"\s*,\s*"(?:-c|/c)""#,
            ],
        )
        .raw()
        .message("Shell command is built from dynamic input")
        .suggestion("Pass arguments as a list and avoid invoking a shell"),
        LineRule::new(
            &SECURITY_RULES[XSS],
            &[
                r"\.(?:innerHTML|outerHTML)\s*\+?=",
                r"\bdangerouslySetInnerHTML\b",
                r"\bdocument\.write(?:ln)?\s*\(",
                r"\.insertAdjacentHTML\s*\(",
                r"\bmark_safe\s*\(",
            ],
        )
        .message("HTML is written without escaping")
        .suggestion("Use textContent or a sanitizer before inserting HTML"),
        LineRule::new(
            &SECURITY_RULES[UNSAFE_EVAL],
            &[
                r"(?:^|[^\w.])eval\s*\(",
                r"\bnew\s+Function\s*\(",
                r#"\bset(?:Timeout|Interval)\s*\(\s*['"`]"#,
            ],
        )
        .message("Dynamic code is evaluated at runtime")
        .suggestion("Replace eval with explicit parsing or dispatch"),
        LineRule::new(&SECURITY_RULES[UNSAFE_EVAL], &[r"(?:^|[^\w.])exec\s*\("])
            .only(&[Language::Python])
            .message("Dynamic code is executed with exec")
            .suggestion("Replace exec with explicit dispatch"),
        LineRule::new(
            &SECURITY_RULES[WEAK_CRYPTO],
            &[
                r#"(?i)\bcreateHash\s*\(\s*['"](?:md5|sha1)['"]"#,
                r"(?i)\bhashlib\.(?:md5|sha1)\b",
                r#"(?i)MessageDigest\.getInstance\s*\(\s*"(?:md5|sha-?1)""#,
                r#"(?i)Cipher\.getInstance\s*\(\s*"(?:des|desede|rc4|aes/ecb)"#,
                r#""crypto/(?:md5|sha1|des|rc4)""#,
                r"\bcreateCipher\s*\(",
            ],
        )
        .raw()
        .message("Weak or broken cryptographic algorithm")
        .suggestion("Use SHA-256 or stronger hashes and authenticated ciphers such as AES-GCM"),
        LineRule::new(&SECURITY_RULES[INSECURE_TRANSPORT], &[r#"['"`]http://[^'"`\s]+"#])
            .raw()
            .excluding(r"http://(?:localhost|127\.0\.0\.1|0\.0\.0\.0|\[::1\])|www\.w3\.org|xmlns|schemas\.")
            .message("Plain HTTP URL; traffic is unencrypted")
            .suggestion("Use https://"),
        LineRule::new(
            &SECURITY_RULES[DISABLED_VERIFICATION],
            &[
                r"\brejectUnauthorized\s*:\s*false\b",
                r"\bverify\s*=\s*False\b",
                r"\bInsecureSkipVerify\s*:\s*true\b",
                r#"\bNODE_TLS_REJECT_UNAUTHORIZED\s*=\s*['"]?0"#,
                r"@csrf_exempt\b",
                r"(?i)\bcsrf\s*\(\s*\)\s*\.disable\s*\(",
                r"(?i)\b(?:auth|authentication|authorization)(?:_?enabled|_?required)?\s*[:=]\s*(?:false|False)\b",
            ],
        )
        .raw()
        .message("Security verification is disabled")
        .suggestion("Keep certificate verification and authentication enabled"),
        LineRule::new(
            &SECURITY_RULES[UNSAFE_DESERIALIZATION],
            &[
                r"\b(?:c?[Pp]ickle|marshal|dill)\.loads?\s*\(",
                r"\bnew\s+ObjectInputStream\s*\(",
                r"\bunserialize\s*\(",
                r"\bBinaryFormatter\b",
                r"\bjsonpickle\.decode\s*\(",
            ],
        )
        .message("Untrusted data may be deserialized into arbitrary objects")
        .suggestion("Deserialize into plain data formats such as JSON"),
        LineRule::new(&SECURITY_RULES[UNSAFE_DESERIALIZATION], &[r"\byaml\.load\s*\("])
            .excluding(r"SafeLoader|safe_load")
            .message("yaml.load without a safe loader")
            .suggestion("Use yaml.safe_load"),
        LineRule::new(
            &SECURITY_RULES[SENSITIVE_LOGGING],
            &[r"(?i)\b(?:console\.(?:log|info|debug|warn|error)|print|println|printf|logger\.\w+|logging\.\w+|log\.\w+|System\.out\.println|fmt\.Print\w*)\s*\(.*\b(?:password|passwd|secret|token|api_?key|ssn|credit_?card|card_?number)\b"],
        )
        .message("Sensitive value is written to logs")
        .suggestion("Redact credentials before logging"),
    ]
});

/// Security checks that need only the source text.
#[derive(Debug, Clone, Copy, Default)]
pub struct SecurityRules;

impl SecurityRules {
    fn secrets(file: &SourceFile, lines: &Lines<'_>) -> Vec<RuleViolation> {
        let mut violations = Vec::new();
        for (idx, raw) in lines.raw.iter().enumerate() {
            let masked = lines.masked(idx);
            if let Some((rule, column)) = SECRET_RULES
                .iter()
                .find_map(|rule| rule.match_column(raw, masked).map(|c| (rule, c)))
            {
                violations.push(rule.violation(file, idx + 1, column));
            }
        }
        violations
    }
}

impl LexicalRuleSet for SecurityRules {
    fn id(&self) -> &'static str {
        "security"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Security
    }

    fn rules(&self) -> &'static [RuleDescriptor] {
        &SECURITY_RULES
    }

    fn check(&self, file: &SourceFile) -> Result<Vec<RuleViolation>> {
        let content = file.content()?;
        let lines = Lines::new(content, file.language);

        let mut violations = Self::secrets(file, &lines);
        violations.extend(run_line_rules(&SECURITY_LINE_RULES, file, &lines));
        violations.sort_by(|a, b| {
            (a.location.start_line, &a.rule_id).cmp(&(b.location.start_line, &b.rule_id))
        });
        Ok(violations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(path: &str, language: Language, source: &str) -> Vec<RuleViolation> {
        SecurityRules
            .check(&SourceFile::new(path, language, source))
            .unwrap()
    }

    fn ids(violations: &[RuleViolation]) -> Vec<&str> {
        violations.iter().map(|v| v.rule_id.as_str()).collect()
    }

    #[test]
    fn aws_secret_wins_over_generic_secret() {
        let source = format!(
            "// config\nimport x from 'y';\nconst AWS_SECRET_ACCESS_KEY = \"AKIA{}\";\n",
            "A".repeat(36)
        );
        let found = check("a.ts", Language::TypeScript, &source);
        assert_eq!(ids(&found), vec!["security/aws-secret-key"]);
        assert_eq!(found[0].severity, Severity::Critical);
        assert_eq!(found[0].location.start_line, 3);
        assert_eq!(found[0].location.end_line, 3);
        assert_eq!(found[0].file_path, "a.ts");
    }

    #[test]
    fn generic_secret_and_placeholders() {
        let found = check("a.py", Language::Python, "password = \"hunter2hunter2\"\n");
        assert_eq!(ids(&found), vec!["security/hardcoded-secret"]);

        let found = check("a.py", Language::Python, "password = \"${DB_PASSWORD}\"\n");
        assert!(found.is_empty());
    }

    #[test]
    fn injection_and_eval() {
        let source = "const q = \"SELECT * FROM users WHERE id = \" + id;\neval(input);\nel.innerHTML = html;\n";
        let found = check("a.js", Language::JavaScript, source);
        assert_eq!(
            ids(&found),
            vec!["security/sql-injection", "security/unsafe-eval", "security/xss"]
        );
    }

    #[test]
    fn python_specific_checks() {
        let source = "import pickle, yaml\nsubprocess.run(cmd, shell=True)\ndata = pickle.loads(blob)\ncfg = yaml.load(f, Loader=yaml.SafeLoader)\nrequests.get(url, verify=False)\n";
        let found = check("a.py", Language::Python, source);
        assert_eq!(
            ids(&found),
            vec![
                "security/command-injection",
                "security/unsafe-deserialization",
                "security/disabled-verification"
            ]
        );
    }

    #[test]
    fn keywords_inside_comments_and_strings_are_ignored() {
        let source = "// eval(x) would be bad\nconst s = \"document.write(x)\";\nfetch('http://localhost:8080/api');\n";
        assert!(check("a.ts", Language::TypeScript, source).is_empty());
    }

    #[test]
    fn plain_http_and_weak_hashes() {
        let source = "const api = 'http://api.example.com';\nconst h = crypto.createHash('md5');\n";
        let found = check("a.ts", Language::TypeScript, source);
        assert_eq!(
            ids(&found),
            vec!["security/insecure-transport", "security/weak-crypto"]
        );
    }

    #[test]
    fn missing_content() {
        let file = SourceFile {
            path: "a.ts".into(),
            language: Language::TypeScript,
            content: None,
        };
        assert!(SecurityRules.check(&file).is_err());
        assert!(SecurityRules.check_project(&[file]).unwrap().is_empty());
    }
}
