//! Shared defaults for sessions, output handling and validation

// ── Time/Size Constants ────────────────────────────────────────────────────

pub const DEFAULT_SESSION_ID: &str = "default";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const MAX_TIMEOUT_SECS: u64 = 1800;
pub const MAX_ACTIVE_SESSIONS: usize = 10;
pub const MAX_OUTPUT_BYTES: usize = 100 * 1024; // 100 KB
pub const HISTORY_LIMIT: usize = 50;
pub const SESSION_IDLE_TIMEOUT_SECS: u64 = 1800; // 30 minutes
pub const SESSION_SWEEP_INTERVAL_SECS: u64 = 60;
pub const KILL_GRACE_MS: u64 = 1000;
pub const SHELL_STARTUP_TIMEOUT_MS: u64 = 5000;
pub const SYNTAX_CHECK_TIMEOUT_MS: u64 = 5000;
pub const PROMPT_IDLE_MS: u64 = 300;
pub const MAX_STREAM_EVENTS: usize = 500;
pub const READ_CHUNK_BYTES: usize = 4096;
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Exit code reported for an attempt that hit its timeout (as `timeout(1)` does).
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Exit codes treated as transient by default:
/// curl resolve/connect failures (6, 7), operation timeout (28),
/// EX_TEMPFAIL (75) and timeouts (124).
pub const DEFAULT_RETRYABLE_EXIT_CODES: &[i32] = &[6, 7, 28, 75, TIMEOUT_EXIT_CODE];

// ── Completion Sentinel ────────────────────────────────────────────────────

pub const SENTINEL_PREFIX: &str = "__SP_";
pub const SENTINEL_SUFFIX: &str = "__";

// ── Shell Environment ──────────────────────────────────────────────────────

/// Environment variables inherited by PTY sessions.
pub const ENV_WHITELIST: &[&str] = &[
    "PATH",
    "HOME",
    "USER",
    "LOGNAME",
    "LANG",
    "LC_ALL",
    "TMPDIR",
    "XDG_RUNTIME_DIR",
    "SHELL",
];

/// Variables forced into every session so programs stay non-interactive
/// about paging and colors.
pub const FORCED_ENV: &[(&str, &str)] = &[
    ("TERM", "dumb"),
    ("PAGER", "cat"),
    ("GIT_PAGER", "cat"),
    ("NO_COLOR", "1"),
];

// ── Security Defaults ──────────────────────────────────────────────────────

pub const DEFAULT_DENIED_PATHS: &[&str] = &[
    "/etc/shadow",
    "/etc/sudoers",
    "/boot",
    "/proc/kcore",
    "/dev/mem",
    "~/.ssh",
    "~/.gnupg",
    "~/.aws",
];

/// Regexes for secrets masked in returned output.
pub const SECRET_PATTERNS: &[&str] = &[
    r"-----BEGIN [A-Z ]*PRIVATE KEY-----[\s\S]*?(?:-----END [A-Z ]*PRIVATE KEY-----|\z)",
    r"\bAKIA[0-9A-Z]{16}\b",
    r"(?i)aws_secret_access_key\s*[=:]\s*\S+",
    r"\bsk-[A-Za-z0-9_-]{16,}",
    r"\bgh[pousr]_[A-Za-z0-9]{20,}",
    r"\bglpat-[A-Za-z0-9_-]{16,}",
    r"\bxox[abpr]-[A-Za-z0-9-]{10,}",
    r"\b(?:postgres|postgresql|mysql|mongodb)://[^\s:@/]+:[^\s@/]+@",
];

// ── Prompt Detection ───────────────────────────────────────────────────────

/// Trailing-line patterns that indicate a program is waiting for input.
pub const DEFAULT_PROMPT_PATTERNS: &[&str] = &[
    r"(?i)\b(?:password|passphrase|passcode|pin)\b[^:\n]*:\s*$",
    r"(?i)\[(?:y/n|y/N|Y/n)\]\s*:?\s*$",
    r"(?i)\((?:yes/no)(?:/\[fingerprint\])?\)\??\s*$",
    r"(?i)\b(?:continue|proceed|overwrite)\?\s*$",
    r"(?i)\b(?:username|login)\s*:\s*$",
];
