//! Command validator

use super::config::SecurityConfig;
use super::rules::{leading_command, split_segments, CompiledRule, Scope, BUILTIN};
use super::{Severity, ValidationVerdict, ValidationWarning};
use crate::error::{Error, Result};
use crate::sanitize::terminal_control_char;
use regex::Regex;
use std::path::{Path, PathBuf};

const NOT_WHITELISTED: &str = "not_whitelisted";
const CONTROL_CHARACTERS: &str = "control_characters";
const MAX_EXTRA_WARNING_SCORE: u8 = 20;

/// Scores commands against the built-in rule table plus the configured
/// denylist and whitelist.
#[derive(Debug)]
pub struct Validator {
    config: SecurityConfig,
    denied_paths: Vec<PathBuf>,
    denied_rule: Option<CompiledRule>,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(SecurityConfig::default())
    }
}

impl Validator {
    /// Create a validator for the given configuration.
    #[must_use]
    pub fn new(config: SecurityConfig) -> Self {
        let home = dirs::home_dir();
        let mut denied_paths = Vec::new();
        let mut patterns = Vec::new();

        for raw in &config.denied_paths {
            let raw = raw.trim_end_matches('/');
            if raw.is_empty() {
                continue;
            }
            let mut spellings = vec![raw.to_string()];
            let expanded = match (raw.strip_prefix("~/"), &home) {
                (Some(rest), Some(home)) => {
                    let path = home.join(rest);
                    spellings.push(format!("$HOME/{rest}"));
                    spellings.push(path.to_string_lossy().into_owned());
                    path
                }
                _ => PathBuf::from(raw),
            };
            denied_paths.push(std::fs::canonicalize(&expanded).unwrap_or(expanded));

            for spelling in spellings {
                let pattern = format!(
                    r#"(?:^|[\s=:<>'"(]){}(?:$|[\s/'"):;|&])"#,
                    regex::escape(&spelling)
                );
                if let Ok(re) = Regex::new(&pattern) {
                    patterns.push(re);
                }
            }
        }

        let denied_rule = (!patterns.is_empty()).then(|| {
            CompiledRule::new(
                "denied_path",
                Severity::High,
                "touches a denied path",
                Scope::Command,
                patterns,
            )
        });

        Self {
            config,
            denied_paths,
            denied_rule,
        }
    }

    /// The configuration this validator was built from.
    #[must_use]
    pub fn config(&self) -> &SecurityConfig {
        &self.config
    }

    /// Validate a command. Never fails and has no side effects.
    #[must_use]
    pub fn validate(&self, command: &str) -> ValidationVerdict {
        let sanitized = sanitize_command(command);
        let mut warnings = Vec::new();

        // A canonical-mode PTY edits the line on these before the shell reads it.
        if let Some(c) = terminal_control_char(command.trim()) {
            warnings.push(ValidationWarning {
                kind: CONTROL_CHARACTERS.to_string(),
                message: format!("contains terminal control character {:?}", c),
                severity: Severity::Critical,
            });
        }
        if sanitized.trim().is_empty() {
            if warnings.is_empty() {
                return empty_verdict(sanitized);
            }
            return build_verdict(sanitized, warnings);
        }

        let segments = split_segments(&sanitized);

        for rule in BUILTIN.iter().chain(self.denied_rule.iter()) {
            let matched = match rule.scope {
                Scope::Command => rule.is_match(&sanitized),
                Scope::Segment => segments.iter().any(|s| rule.is_match(s)),
            };
            if matched {
                warnings.push(ValidationWarning {
                    kind: rule.kind.to_string(),
                    message: rule.message.clone(),
                    severity: rule.severity,
                });
            }
        }

        if self.config.whitelist_mode {
            for segment in &segments {
                let Some(program) = leading_command(segment) else {
                    continue;
                };
                if !self.config.allowed_commands.iter().any(|a| a == program) {
                    warnings.push(ValidationWarning {
                        kind: NOT_WHITELISTED.to_string(),
                        message: format!("'{program}' is not in the allowed command list"),
                        severity: Severity::High,
                    });
                }
            }
        }

        build_verdict(sanitized, warnings)
    }

    /// Check a requested working directory: it must exist, be a
    /// directory and not sit under a denied path.
    pub fn validate_cwd(&self, cwd: &Path) -> Result<PathBuf> {
        let canonical = std::fs::canonicalize(cwd).map_err(|e| {
            Error::InvalidInput(format!(
                "Cannot resolve working directory '{}': {}",
                cwd.display(),
                e
            ))
        })?;
        if !canonical.is_dir() {
            return Err(Error::InvalidInput(format!(
                "Working directory '{}' is not a directory",
                cwd.display()
            )));
        }
        if self.config.enabled && self.denied_paths.iter().any(|d| canonical.starts_with(d)) {
            return Err(Error::ValidationBlocked(format!(
                "Working directory '{}' is restricted",
                cwd.display()
            )));
        }
        Ok(canonical)
    }
}

fn sanitize_command(command: &str) -> String {
    command
        .trim()
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\t'))
        .collect()
}

fn empty_verdict(sanitized: String) -> ValidationVerdict {
    ValidationVerdict {
        sanitized_command: sanitized,
        safe: false,
        severity: Severity::Low,
        blocked: false,
        requires_confirmation: false,
        warnings: vec![ValidationWarning {
            kind: "empty_command".to_string(),
            message: "command is empty".to_string(),
            severity: Severity::Low,
        }],
        risk_score: Severity::Low.base_score(),
        recommendation: "CONFIRM: command is empty, nothing would run".to_string(),
    }
}

fn build_verdict(sanitized: String, warnings: Vec<ValidationWarning>) -> ValidationVerdict {
    let severity = warnings
        .iter()
        .map(|w| w.severity)
        .max()
        .unwrap_or_default();
    let whitelist_rejected = warnings.iter().any(|w| w.kind == NOT_WHITELISTED);
    let blocked = severity == Severity::Critical || whitelist_rejected;
    let requires_confirmation = matches!(severity, Severity::Medium | Severity::High);

    let extra = (warnings.len().saturating_sub(1) * 5).min(MAX_EXTRA_WARNING_SCORE as usize) as u8;
    let risk_score = severity.base_score().saturating_add(extra).min(100);

    let headline = if whitelist_rejected && severity != Severity::Critical {
        warnings.iter().find(|w| w.kind == NOT_WHITELISTED)
    } else {
        warnings.iter().find(|w| w.severity == severity)
    }
    .map(|w| w.message.as_str());

    let recommendation = match (blocked, requires_confirmation, headline) {
        (true, _, Some(msg)) => format!("BLOCK: {msg}"),
        (true, _, None) => "BLOCK".to_string(),
        (false, true, Some(msg)) => format!("CONFIRM: {msg}"),
        (false, true, None) => "CONFIRM".to_string(),
        (false, false, _) => "ALLOW".to_string(),
    };

    ValidationVerdict {
        sanitized_command: sanitized,
        safe: !blocked && severity <= Severity::Low,
        severity,
        blocked,
        requires_confirmation,
        warnings,
        risk_score,
        recommendation,
    }
}
