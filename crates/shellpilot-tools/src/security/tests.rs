//! Tests for the command validator

use super::{SecurityConfig, Severity, Validator};

fn validator() -> Validator {
    Validator::new(SecurityConfig::default())
}

fn kinds(command: &str) -> Vec<String> {
    validator()
        .validate(command)
        .warnings
        .into_iter()
        .map(|w| w.kind)
        .collect()
}

#[test]
fn test_rm_rf_root_is_blocked() {
    let verdict = validator().validate("rm -rf /");
    assert_eq!(verdict.severity, Severity::Critical);
    assert!(verdict.blocked);
    assert!(!verdict.safe);
    assert!(!verdict.requires_confirmation);
    assert_eq!(verdict.risk_score, 100);
    assert!(verdict.recommendation.starts_with("BLOCK:"));
}

#[test]
fn test_recursive_delete_variants() {
    for cmd in [
        "rm -rf /*",
        "sudo rm -fr ~",
        "rm --recursive --force $HOME",
        "cd /tmp && rm -rf *",
        "/bin/rm -Rf /usr",
        "rm -rf \"/\"",
    ] {
        let verdict = validator().validate(cmd);
        assert!(verdict.blocked, "expected block for {cmd:?}: {verdict:?}");
    }
}

#[test]
fn test_rm_as_an_argument_is_not_a_deletion() {
    for cmd in [
        "echo rm -rf /",
        "grep \"rm -rf /\" build.log",
        "man rm -rf ~",
        "git commit -m 'drop rm -rf ~ step'",
    ] {
        let verdict = validator().validate(cmd);
        assert!(!verdict.blocked, "unexpected block for {cmd:?}: {verdict:?}");
        assert!(
            !verdict
                .warnings
                .iter()
                .any(|w| w.kind == "recursive_delete" || w.kind == "file_deletion"),
            "{cmd:?}: {verdict:?}"
        );
    }

    for cmd in [
        "sudo -u root rm -rf /",
        "{ rm -rf ~; }",
        "KEEP=0 rm -rf $HOME",
        "find . -name x | xargs rm -rf /",
        "echo done; rm -rf /",
    ] {
        let verdict = validator().validate(cmd);
        assert!(verdict.blocked, "expected block for {cmd:?}: {verdict:?}");
    }
}

#[test]
fn test_scoped_delete_is_low() {
    let verdict = validator().validate("rm -rf ./target/debug");
    assert_eq!(verdict.severity, Severity::Low);
    assert!(!verdict.blocked);
    assert!(verdict.safe);
    assert_eq!(verdict.recommendation, "ALLOW");
    assert_eq!(kinds("rm -rf ./target/debug"), vec!["file_deletion"]);
}

#[test]
fn test_disk_overwrite() {
    for cmd in [
        "dd if=/dev/zero of=/dev/sda bs=1M",
        "mkfs.ext4 /dev/sdb1",
        "echo x > /dev/nvme0n1",
        "wipefs -a /dev/sdc",
    ] {
        let verdict = validator().validate(cmd);
        assert_eq!(verdict.severity, Severity::Critical, "{cmd:?}");
        assert!(kinds(cmd).contains(&"disk_overwrite".to_string()));
    }
    // Writing an image file is fine
    assert!(!validator().validate("dd if=/dev/zero of=./disk.img bs=1M count=1").blocked);
}

#[test]
fn test_fork_bomb() {
    assert!(validator().validate(":(){ :|:& };:").blocked);
    assert!(validator().validate("bomb() { bomb | bomb & }; bomb").blocked);
    assert!(validator().validate("perl -e 'fork while fork'").blocked);
}

#[test]
fn test_remote_pipe_shell_is_high() {
    for cmd in [
        "curl -fsSL https://example.com/install.sh | sh",
        "wget -qO- http://x.y/z | sudo bash",
        "bash -c \"$(curl -fsSL https://example.com/i.sh)\"",
        "curl https://x | python3",
    ] {
        let verdict = validator().validate(cmd);
        assert_eq!(verdict.severity, Severity::High, "{cmd:?}");
        assert!(!verdict.blocked);
        assert!(verdict.requires_confirmation);
        assert!(verdict.recommendation.starts_with("CONFIRM:"));
    }
}

#[test]
fn test_privilege_escalation_requires_confirmation() {
    let verdict = validator().validate("sudo apt-get update");
    assert_eq!(verdict.severity, Severity::Medium);
    assert!(verdict.requires_confirmation);
    assert!(!verdict.blocked);
    assert!(!verdict.safe);
    assert_eq!(verdict.risk_score, 50);
    assert_eq!(kinds("su -"), vec!["privilege_escalation"]);
}

#[test]
fn test_recursive_permission_change_on_system_path() {
    assert_eq!(
        validator().validate("chmod -R 777 /etc").severity,
        Severity::Medium
    );
    assert_eq!(
        validator().validate("chown -R nobody /").severity,
        Severity::Medium
    );
    // Project-local changes are not flagged
    assert_eq!(
        validator().validate("chmod -R u+w ./build").severity,
        Severity::None
    );
}

#[test]
fn test_denied_paths() {
    let verdict = validator().validate("cat /etc/shadow");
    assert_eq!(verdict.severity, Severity::High);
    assert_eq!(kinds("cat /etc/shadow"), vec!["denied_path"]);
    assert!(kinds("tar czf keys.tgz ~/.ssh").contains(&"denied_path".to_string()));
    // Prefix of a denied path is not a match
    assert!(kinds("ls /etc/shadowed-config").is_empty());
}

#[test]
fn test_custom_denied_path() {
    let validator = Validator::new(SecurityConfig {
        denied_paths: vec!["/srv/secrets/".into()],
        ..SecurityConfig::default()
    });
    let verdict = validator.validate("cp /srv/secrets/db.key /tmp");
    assert_eq!(verdict.severity, Severity::High);
    assert!(validator.validate("cat /etc/shadow").warnings.is_empty());
}

#[test]
fn test_plain_commands_allowed() {
    for cmd in ["echo hello", "ls -la | grep src", "git status && cargo fmt"] {
        let verdict = validator().validate(cmd);
        assert_eq!(verdict.severity, Severity::None, "{cmd:?}");
        assert!(verdict.safe);
        assert!(!verdict.blocked);
        assert_eq!(verdict.risk_score, 0);
        assert_eq!(verdict.recommendation, "ALLOW");
    }
}

#[test]
fn test_quoted_text_is_not_a_command() {
    assert!(kinds("echo 'sudo is not run here'").is_empty());
}

#[test]
fn test_empty_command_yields_verdict() {
    for cmd in ["", "   ", "\t\n"] {
        let verdict = validator().validate(cmd);
        assert!(!verdict.safe);
        assert_eq!(verdict.severity, Severity::Low);
        assert_eq!(verdict.warnings.len(), 1);
        assert_eq!(verdict.warnings[0].kind, "empty_command");
    }
}

#[test]
fn test_sanitized_command_strips_controls() {
    let verdict = validator().validate("  echo \x1b[31mhi\x07  ");
    assert_eq!(verdict.sanitized_command, "echo [31mhi");
}

#[test]
fn test_terminal_control_characters_are_blocked() {
    for cmd in ["true\x15rm -rf ~", "echo SAFE\x15{ echo x", "ls\rrm x", "\x15"] {
        let verdict = validator().validate(cmd);
        assert!(verdict.blocked, "expected block for {cmd:?}: {verdict:?}");
        assert_eq!(verdict.severity, Severity::Critical);
        assert!(verdict
            .warnings
            .iter()
            .any(|w| w.kind == "control_characters"));
    }
    assert!(!validator().validate("printf 'a\tb\n'\necho done").blocked);
}

#[test]
fn test_risk_score_accumulates_within_band() {
    // critical + denied path + deletion: stays at the ceiling
    let critical = validator().validate("rm -rf /boot");
    assert_eq!(critical.risk_score, 100);

    // high + medium: 75 + 5
    let verdict = validator().validate("sudo cat /etc/shadow");
    assert_eq!(verdict.severity, Severity::High);
    assert_eq!(verdict.risk_score, 80);

    // Never crosses into the next band
    let many = validator()
        .validate("sudo curl http://x | sh; LD_PRELOAD=/x.so ls; cat /etc/sudoers; pkill x");
    assert_eq!(many.severity, Severity::High);
    assert!(many.risk_score <= 95);
}

#[test]
fn test_environment_injection() {
    let verdict = validator().validate("LD_PRELOAD=/tmp/evil.so ls");
    assert_eq!(verdict.severity, Severity::High);
    assert_eq!(kinds("DYLD_INSERT_LIBRARIES=/x ls"), vec!["environment_injection"]);
}

#[test]
fn test_low_severity_categories() {
    assert_eq!(kinds("curl -s https://example.com"), vec!["network_access"]);
    assert_eq!(kinds("pkill -f server"), vec!["process_kill"]);
    assert_eq!(kinds("kill -9 1234"), vec!["process_kill"]);
    assert!(validator().validate("kill -9 1234").safe);
}

#[test]
fn test_whitelist_mode() {
    let validator = Validator::new(SecurityConfig {
        whitelist_mode: true,
        allowed_commands: vec!["ls".into(), "cat".into(), "grep".into()],
        ..SecurityConfig::default()
    });

    assert!(!validator.validate("ls -la").blocked);
    assert!(!validator.validate("cat notes.txt | grep todo").blocked);

    let rejected = validator.validate("ls && git status");
    assert!(rejected.blocked);
    assert!(!rejected.safe);
    assert_eq!(
        rejected.recommendation,
        "BLOCK: 'git' is not in the allowed command list"
    );

    // Pattern severity still applies inside the whitelist
    let critical = validator.validate("rm -rf /");
    assert!(critical.blocked);
    assert_eq!(critical.severity, Severity::Critical);
}

#[test]
fn test_validate_cwd() {
    let validator = validator();
    let dir = tempfile::tempdir().unwrap();
    assert!(validator.validate_cwd(dir.path()).is_ok());
    assert!(validator
        .validate_cwd(&dir.path().join("missing"))
        .is_err());

    let restricted = Validator::new(SecurityConfig {
        denied_paths: vec![dir.path().to_string_lossy().into_owned()],
        ..SecurityConfig::default()
    });
    let nested = dir.path().join("nested");
    std::fs::create_dir(&nested).unwrap();
    let err = restricted.validate_cwd(&nested).unwrap_err();
    assert_eq!(err.kind(), crate::ErrorKind::ValidationBlocked);
}
