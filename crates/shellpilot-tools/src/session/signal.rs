//! Process-group signals

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Signal accepted by `kill_session`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum KillSignal {
    /// Polite termination
    #[default]
    #[serde(rename = "SIGTERM")]
    Term,
    /// Interrupt, as from Ctrl-C
    #[serde(rename = "SIGINT")]
    Int,
    /// Hang-up
    #[serde(rename = "SIGHUP")]
    Hup,
    /// Quit with core dump
    #[serde(rename = "SIGQUIT")]
    Quit,
    /// Immediate termination
    #[serde(rename = "SIGKILL")]
    Kill,
}

impl KillSignal {
    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Term => "SIGTERM",
            Self::Int => "SIGINT",
            Self::Hup => "SIGHUP",
            Self::Quit => "SIGQUIT",
            Self::Kill => "SIGKILL",
        }
    }

    fn raw(&self) -> libc::c_int {
        match self {
            Self::Term => libc::SIGTERM,
            Self::Int => libc::SIGINT,
            Self::Hup => libc::SIGHUP,
            Self::Quit => libc::SIGQUIT,
            Self::Kill => libc::SIGKILL,
        }
    }
}

impl std::fmt::Display for KillSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for KillSignal {
    type Err = Error;

    /// Accepts `SIGTERM`, `TERM`, `term` or the signal number.
    fn from_str(s: &str) -> Result<Self> {
        let upper = s.trim().to_ascii_uppercase();
        let name = upper.strip_prefix("SIG").unwrap_or(&upper);
        match name {
            "TERM" | "15" => Ok(Self::Term),
            "INT" | "2" => Ok(Self::Int),
            "HUP" | "1" => Ok(Self::Hup),
            "QUIT" | "3" => Ok(Self::Quit),
            "KILL" | "9" => Ok(Self::Kill),
            _ => Err(Error::InvalidInput(format!("Unsupported signal '{}'", s))),
        }
    }
}

/// Send `signal` to the process group led by `pid`. A group that no
/// longer exists is not an error.
#[allow(unsafe_code)]
pub(crate) fn signal_group(pid: u32, signal: KillSignal) -> std::io::Result<()> {
    let pgid = libc::pid_t::try_from(pid)
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "pid out of range"))?;
    // SAFETY: kill(2) takes plain integers; a negative pid addresses the group.
    let rc = unsafe { libc::kill(-pgid, signal.raw()) };
    if rc == 0 {
        return Ok(());
    }
    let err = std::io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        Ok(())
    } else {
        Err(err)
    }
}
