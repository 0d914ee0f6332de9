//! Built-in rule table and command segmentation

use super::Severity;
use regex::Regex;
use std::sync::LazyLock;
use tracing::warn;

/// Which text a rule is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Scope {
    /// Each `|`, `&&`, `||`, `;` separated segment on its own.
    Segment,
    /// The whole command line.
    Command,
}

struct RuleSpec {
    kind: &'static str,
    severity: Severity,
    message: &'static str,
    scope: Scope,
    /// At least one must match.
    any_of: &'static [&'static str],
    /// All must match as well.
    all_of: &'static [&'static str],
}

// ── Shared fragments ───────────────────────────────────────────────────────

/// `rm` as the program a segment runs, possibly behind assignments, a
/// group opener or a wrapper such as `sudo`.
const RM_COMMAND: &str = r"^\s*[({!]*\s*(?:[A-Za-z_][A-Za-z0-9_]*=\S*\s+)*(?:(?:sudo|doas|env|exec|command|nohup|nice|time|xargs|eval)\s+(?:\S+\s+)*?)?(?:\S*/)?rm\s";
const RM_FORCE_OR_RECURSIVE: &str = r"\s(?:-[a-zA-Z]*[rRf][a-zA-Z]*|--recursive|--force)(?:\s|$)";
const RM_RECURSIVE: &str = r"\s(?:-[a-zA-Z]*[rR][a-zA-Z]*|--recursive)(?:\s|$)";
const ROOT_ADJACENT_TARGET: &str = r#"(?:^|\s)["']?(?:/|/\*|~|~/|~/\*|\*|\.|\./|\./\*|\.\.|\.\./|\$HOME|\$HOME/|\$HOME/\*|\$\{HOME\}/?|/(?:bin|boot|dev|etc|home|lib|lib32|lib64|opt|proc|root|sbin|srv|sys|usr|var)/?\*?)["']?(?:\s|$)"#;

const BUILTIN_RULES: &[RuleSpec] = &[
    RuleSpec {
        kind: "recursive_delete",
        severity: Severity::Critical,
        message: "recursive or forced deletion of a root-level, home or wildcard path",
        scope: Scope::Segment,
        any_of: &[RM_COMMAND],
        all_of: &[RM_FORCE_OR_RECURSIVE, ROOT_ADJACENT_TARGET],
    },
    RuleSpec {
        kind: "disk_overwrite",
        severity: Severity::Critical,
        message: "raw write or format of a block device",
        scope: Scope::Segment,
        any_of: &[
            r"\bdd\s(?:.*\s)?of=/dev/(?:sd|hd|vd|xvd|nvme|mmcblk|disk|md|dm-|mapper/)",
            r"(?:^|\s|/)mkfs(?:\.[a-z0-9]+)?(?:\s|$)",
            r">\s*/dev/(?:sd|hd|vd|xvd|nvme|mmcblk|disk)",
            r"(?:^|\s|/)(?:wipefs|blkdiscard)\s",
            r"(?:^|\s|/)shred\s(?:.*\s)?/dev/",
        ],
        all_of: &[],
    },
    RuleSpec {
        kind: "fork_bomb",
        severity: Severity::Critical,
        message: "self-replicating process construct (fork bomb)",
        scope: Scope::Command,
        any_of: &[
            r":\s*\(\s*\)\s*\{[^}]*:\s*\|\s*:\s*&",
            r"\b[A-Za-z_]\w*\s*\(\s*\)\s*\{\s*[A-Za-z_]\w*\s*\|\s*[A-Za-z_]\w*\s*&\s*;?\s*\}",
            r"\bfork\s*(?:\(\s*\))?\s*while\s*fork\b",
            r"\bwhile\s*\(?\s*fork\b",
            r"\bwhile\s+(?:true|:)\s*;\s*do\s+[^;]*&\s*done",
        ],
        all_of: &[],
    },
    RuleSpec {
        kind: "remote_pipe_shell",
        severity: Severity::High,
        message: "downloaded content is executed by a shell or interpreter",
        scope: Scope::Command,
        any_of: &[
            r"\b(?:curl|wget|fetch)\b[^|;&]*\|\s*(?:sudo\s+(?:-\S+\s+)*)?(?:env\s+)?(?:/\S*/)?(?:ba|da|k|z|c|tc|fi)?sh\b",
            r"\b(?:curl|wget)\b[^|;&]*\|\s*(?:sudo\s+)?(?:python[0-9.]*|perl|ruby|node|php)\b",
            r#"\b(?:ba|da|z)?sh\s+(?:-c\s+)?["']?\$\(\s*(?:curl|wget)\b"#,
            r"(?:\bsource|\.|\b(?:ba|z)?sh)\s*<\s*\(\s*(?:curl|wget)\b",
            r#"\beval\s+["']?\$\(\s*(?:curl|wget)\b"#,
        ],
        all_of: &[],
    },
    RuleSpec {
        kind: "encoded_execution",
        severity: Severity::High,
        message: "decoded payload is piped into a shell",
        scope: Scope::Command,
        any_of: &[r"\bbase64\s+(?:-d|-D|--decode)\b[^|;&]*\|\s*(?:ba|z)?sh\b"],
        all_of: &[],
    },
    RuleSpec {
        kind: "privilege_escalation",
        severity: Severity::Medium,
        message: "runs with elevated privileges",
        scope: Scope::Segment,
        any_of: &[r"^\s*(?:[A-Za-z_][A-Za-z0-9_]*=\S*\s+)*(?:\S*/)?(?:sudo|su|doas|pkexec|run0)(?:\s|$)"],
        all_of: &[],
    },
    RuleSpec {
        kind: "system_permission_change",
        severity: Severity::Medium,
        message: "recursive permission or ownership change on a system path",
        scope: Scope::Segment,
        any_of: &[r"(?:^|\s|/)(?:chmod|chown|chgrp)\s"],
        all_of: &[
            r"\s(?:-[a-zA-Z]*R[a-zA-Z]*|--recursive)(?:\s|$)",
            r"\s/(?:(?:bin|boot|dev|etc|home|lib|lib32|lib64|opt|proc|root|sbin|srv|sys|usr|var)\b\S*)?(?:\s|$)",
        ],
    },
    RuleSpec {
        kind: "environment_injection",
        severity: Severity::High,
        message: "overrides the dynamic loader environment",
        scope: Scope::Command,
        any_of: &[r"\b(?:LD_PRELOAD|LD_LIBRARY_PATH|LD_AUDIT|DYLD_INSERT_LIBRARIES|DYLD_LIBRARY_PATH)="],
        all_of: &[],
    },
    RuleSpec {
        kind: "system_power",
        severity: Severity::High,
        message: "shuts down or restarts the machine",
        scope: Scope::Segment,
        any_of: &[
            r"^\s*(?:(?:sudo|doas)\s+(?:-\S+\s+)*)?(?:\S*/)?(?:shutdown|reboot|poweroff|halt)(?:\s|$)",
            r"^\s*(?:(?:sudo|doas)\s+)?(?:\S*/)?(?:init|telinit)\s+[06](?:\s|$)",
            r"\bsystemctl\s+(?:poweroff|reboot|halt|kexec)\b",
        ],
        all_of: &[],
    },
    RuleSpec {
        kind: "file_deletion",
        severity: Severity::Low,
        message: "recursive deletion",
        scope: Scope::Segment,
        any_of: &[RM_COMMAND],
        all_of: &[RM_RECURSIVE],
    },
    RuleSpec {
        kind: "network_access",
        severity: Severity::Low,
        message: "opens a network connection",
        scope: Scope::Segment,
        any_of: &[r"^\s*(?:(?:sudo|doas)\s+)?(?:\S*/)?(?:curl|wget|nc|ncat|netcat|socat|ssh|scp|sftp|rsync|ftp|telnet)(?:\s|$)"],
        all_of: &[],
    },
    RuleSpec {
        kind: "process_kill",
        severity: Severity::Low,
        message: "forcibly signals other processes",
        scope: Scope::Segment,
        any_of: &[
            r"^\s*(?:(?:sudo|doas)\s+)?(?:\S*/)?(?:pkill|killall)(?:\s|$)",
            r"^\s*(?:(?:sudo|doas)\s+)?(?:\S*/)?kill\s+(?:-9|-KILL|-SIGKILL|-s\s+(?:9|KILL|SIGKILL))(?:\s|$)",
        ],
        all_of: &[],
    },
];

/// A rule with its patterns compiled.
#[derive(Debug)]
pub(super) struct CompiledRule {
    pub kind: &'static str,
    pub severity: Severity,
    pub message: String,
    pub scope: Scope,
    any_of: Vec<Regex>,
    all_of: Vec<Regex>,
}

impl CompiledRule {
    pub fn new(
        kind: &'static str,
        severity: Severity,
        message: impl Into<String>,
        scope: Scope,
        any_of: Vec<Regex>,
    ) -> Self {
        Self {
            kind,
            severity,
            message: message.into(),
            scope,
            any_of,
            all_of: Vec::new(),
        }
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.any_of.iter().any(|re| re.is_match(text))
            && self.all_of.iter().all(|re| re.is_match(text))
    }
}

fn compile_all(patterns: &[&str], kind: &str) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|p| match Regex::new(p) {
            Ok(re) => Some(re),
            Err(e) => {
                warn!(rule = %kind, error = %e, "Skipping invalid rule pattern");
                None
            }
        })
        .collect()
}

/// Built-in rules, compiled once, in table order.
pub(super) static BUILTIN: LazyLock<Vec<CompiledRule>> = LazyLock::new(|| {
    BUILTIN_RULES
        .iter()
        .map(|spec| CompiledRule {
            kind: spec.kind,
            severity: spec.severity,
            message: spec.message.to_string(),
            scope: spec.scope,
            any_of: compile_all(spec.any_of, spec.kind),
            all_of: compile_all(spec.all_of, spec.kind),
        })
        .collect()
});

/// Split a command line into its chained segments.
///
/// Separators inside quotes are ignored, as are the `&` of `2>&1`-style
/// redirections.
pub(super) fn split_segments(command: &str) -> Vec<&str> {
    let bytes = command.as_bytes();
    let mut segments = Vec::new();
    let mut start = 0;
    let mut quote: Option<u8> = None;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = quote {
            if b == b'\\' && q == b'"' {
                i += 2;
                continue;
            }
            if b == q {
                quote = None;
            }
            i += 1;
            continue;
        }

        match b {
            b'\\' => {
                i += 2;
                continue;
            }
            b'\'' | b'"' => quote = Some(b),
            b';' | b'\n' | b'|' | b'&' => {
                let prev = if i > 0 { bytes[i - 1] } else { 0 };
                let next = bytes.get(i + 1).copied();
                let is_redirect =
                    b == b'&' && (prev == b'>' || prev == b'<' || next == Some(b'>'));
                if !is_redirect {
                    segments.push(&command[start..i]);
                    // `&&`, `||` and `|&` are one separator
                    if matches!((b, next), (b'&', Some(b'&')) | (b'|', Some(b'|' | b'&'))) {
                        i += 1;
                    }
                    start = i + 1;
                }
            }
            _ => {}
        }
        i += 1;
    }
    if start < bytes.len() {
        segments.push(&command[start..]);
    }

    segments
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// The program a segment runs: leading `VAR=value` assignments and
/// grouping characters are skipped, paths are reduced to their basename.
pub(super) fn leading_command(segment: &str) -> Option<&str> {
    segment
        .split_whitespace()
        .map(|token| token.trim_start_matches(['(', '{', '!', '$', '`', '"', '\'']))
        .filter(|token| !token.is_empty())
        .find(|token| !is_assignment(token))
        .map(|token| {
            let token = token.trim_end_matches(['"', '\'', ')', ';']);
            token.rsplit('/').next().unwrap_or(token)
        })
}

fn is_assignment(token: &str) -> bool {
    match token.split_once('=') {
        Some((name, _)) => {
            !name.is_empty()
                && name
                    .chars()
                    .next()
                    .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
                && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_patterns_compile() {
        for (spec, rule) in BUILTIN_RULES.iter().zip(BUILTIN.iter()) {
            assert_eq!(spec.any_of.len(), rule.any_of.len(), "rule {}", spec.kind);
            assert_eq!(spec.all_of.len(), rule.all_of.len(), "rule {}", spec.kind);
        }
    }

    #[test]
    fn test_split_segments() {
        assert_eq!(
            split_segments("cd /tmp && ls -la | grep x; echo done"),
            vec!["cd /tmp", "ls -la", "grep x", "echo done"]
        );
        assert_eq!(split_segments("make 2>&1 | tee log"), vec!["make 2>&1", "tee log"]);
        assert_eq!(split_segments("echo 'a | b; c'"), vec!["echo 'a | b; c'"]);
        assert_eq!(split_segments("false || true"), vec!["false", "true"]);
        assert!(split_segments("   ").is_empty());
    }

    #[test]
    fn test_leading_command() {
        assert_eq!(leading_command("ls -la"), Some("ls"));
        assert_eq!(leading_command("FOO=1 BAR=2 /usr/bin/env x"), Some("env"));
        assert_eq!(leading_command("(cd /tmp"), Some("cd"));
        assert_eq!(leading_command(""), None);
    }
}
