//! Hot restart: hand live connections to a fresh copy of the process.
//!
//! The old process writes one [`SavedNetwork`] per live connection to a
//! JSON state file, clears close-on-exec on the sockets and re-executes
//! itself with `--state <file>`. The new process reads and deletes the file
//! and resumes each session on the inherited descriptor, already
//! registered.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::io::Write;
use std::os::fd::RawFd;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::RestartError;

/// Name of the state file inside the data directory.
pub const STATE_FILE_NAME: &str = "state.json";

/// Command line flag carrying the state file path.
pub const STATE_FLAG: &str = "--state";

/// What a replacement process needs to resume one network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedNetwork {
    pub host: String,
    pub port: u16,
    /// Inherited socket descriptor.
    pub fd: RawFd,
    pub nick: String,
    /// Membership map, short name to long name.
    #[serde(default)]
    pub channels: BTreeMap<String, String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Bytes already read from the server but not yet processed. They are
    /// decoded first after the connection is resumed.
    #[serde(default)]
    pub unread: Vec<u8>,
}

/// Contents of the state file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateFile {
    pub saved_at: DateTime<Utc>,
    #[serde(default)]
    pub networks: BTreeMap<String, SavedNetwork>,
}

impl StateFile {
    pub fn new(networks: BTreeMap<String, SavedNetwork>) -> Self {
        Self {
            saved_at: Utc::now(),
            networks,
        }
    }

    /// Path of the state file in `datadir`.
    pub fn path_in(datadir: &Path) -> PathBuf {
        datadir.join(STATE_FILE_NAME)
    }

    /// Write the file atomically: a temporary file next to `path` is
    /// synced and renamed over it.
    pub fn save(&self, path: &Path) -> Result<(), RestartError> {
        let tmp = path.with_extension("json.tmp");
        let data = serde_json::to_vec_pretty(self)?;

        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(&data)?;
        file.sync_all()?;
        drop(file);

        std::fs::rename(&tmp, path)?;
        debug!(path = %path.display(), networks = self.networks.len(), "state file written");
        Ok(())
    }

    /// Read the file and delete it.
    ///
    /// The file is removed even when it cannot be parsed, so a broken
    /// state file only costs one cold start.
    pub fn load_and_remove(path: &Path) -> Result<Self, RestartError> {
        let data = std::fs::read(path);
        std::fs::remove_file(path)?;
        let state: StateFile = serde_json::from_slice(&data?)?;

        info!(
            path = %path.display(),
            saved_at = %state.saved_at,
            networks = state.networks.len(),
            "loaded restart state"
        );
        Ok(state)
    }
}

/// Replace `args` (without the program name) so they carry `--state path`.
pub fn restart_args<I>(args: I, state_path: &Path) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    let mut args: Vec<OsString> = args.into_iter().collect();
    let value = state_path.as_os_str().to_owned();

    match args.iter().position(|a| a == STATE_FLAG) {
        Some(index) if index + 1 < args.len() => args[index + 1] = value,
        Some(_) => args.push(value),
        None => {
            args.push(OsString::from(STATE_FLAG));
            args.push(value);
        }
    }
    args
}

/// Re-execute the running binary with `--state state_path`.
///
/// Only returns if `exec` failed.
pub fn exec_with_state(state_path: &Path) -> RestartError {
    let exe = match std::env::current_exe() {
        Ok(exe) => exe,
        Err(e) => return RestartError::Io(e),
    };
    let args = restart_args(std::env::args_os().skip(1), state_path);

    info!(exe = %exe.display(), ?args, "executing replacement process");
    let source = std::process::Command::new(&exe).args(&args).exec();
    RestartError::Exec {
        path: exe.display().to_string(),
        source,
    }
}
