//! Recorder process launch
//!
//! The recorder is started as `[interpreter] program <task_id> <user_id>` and
//! left to run on its own: no waiting, no output capture.

use crate::LaunchRequest;
use crate::config::RecorderConfig;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("Recording script not found.")]
    NotFound { program: PathBuf },
    #[error("Failed to start recording.")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A recorder that was spawned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchReceipt {
    pub request: LaunchRequest,
    pub pid: Option<u32>,
    pub started_at: DateTime<Utc>,
}

pub trait RecorderLauncher {
    fn launch(&self, request: LaunchRequest) -> Result<LaunchReceipt, LaunchError>;
}

impl<L: RecorderLauncher + ?Sized> RecorderLauncher for &L {
    fn launch(&self, request: LaunchRequest) -> Result<LaunchReceipt, LaunchError> {
        (**self).launch(request)
    }
}

/// Spawns the recorder as a detached child process.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
    interpreter: Option<PathBuf>,
    search_dirs: Vec<PathBuf>,
}

impl ProcessLauncher {
    /// Relative programs are looked up next to the running executable, then in
    /// the working directory.
    pub fn new(program: impl Into<PathBuf>, interpreter: Option<PathBuf>) -> Self {
        let search_dirs = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .into_iter()
            .chain(std::env::current_dir().ok())
            .collect();
        Self {
            program: program.into(),
            interpreter,
            search_dirs,
        }
    }

    pub fn from_config(config: &RecorderConfig) -> Self {
        Self::new(config.program.clone(), config.interpreter.clone())
    }

    pub fn with_search_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.search_dirs = dirs;
        self
    }

    /// Locate the entry point.
    ///
    /// A bare name run without an interpreter that isn't found in the search
    /// directories is left for `PATH` lookup at spawn time.
    fn resolve(&self) -> Result<PathBuf, LaunchError> {
        if self.program.is_absolute() {
            return if self.program.exists() {
                Ok(self.program.clone())
            } else {
                Err(LaunchError::NotFound {
                    program: self.program.clone(),
                })
            };
        }

        if let Some(found) = self
            .search_dirs
            .iter()
            .map(|dir| dir.join(&self.program))
            .find(|candidate| candidate.exists())
        {
            return Ok(found);
        }

        let bare_name = self.program.components().count() == 1;
        if bare_name && self.interpreter.is_none() {
            return Ok(self.program.clone());
        }
        Err(LaunchError::NotFound {
            program: self.program.clone(),
        })
    }
}

impl RecorderLauncher for ProcessLauncher {
    fn launch(&self, request: LaunchRequest) -> Result<LaunchReceipt, LaunchError> {
        let program = self.resolve().inspect_err(|_| {
            warn!(program = %self.program.display(), "recorder not found");
        })?;

        let mut command = match &self.interpreter {
            Some(interpreter) => {
                let mut c = Command::new(interpreter);
                c.arg(&program);
                c
            }
            None => Command::new(&program),
        };
        command.args(request.args()).stdin(Stdio::null());

        let child = command.spawn().map_err(|source| {
            warn!(program = %program.display(), "failed to start recorder: {}", source);
            if source.kind() == std::io::ErrorKind::NotFound {
                LaunchError::NotFound {
                    program: program.clone(),
                }
            } else {
                LaunchError::Spawn {
                    program: program.clone(),
                    source,
                }
            }
        })?;

        let receipt = LaunchReceipt {
            pid: child.id(),
            request,
            started_at: Utc::now(),
        };
        info!(
            task_id = %receipt.request.task_id,
            user_id = %receipt.request.user_id,
            pid = ?receipt.pid,
            "recording started"
        );
        Ok(receipt)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::TaskId;
    use std::time::Duration;
    use tempfile::TempDir;

    fn request() -> LaunchRequest {
        LaunchRequest::new(TaskId::parse("ab12cd34ef").unwrap(), "alice")
    }

    async fn wait_for(path: &Path) -> String {
        for _ in 0..100 {
            if let Ok(contents) = std::fs::read_to_string(path) {
                if contents.ends_with('\n') {
                    return contents;
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("{} never written", path.display());
    }

    fn write_script(dir: &TempDir, out: &Path) -> PathBuf {
        let script = dir.path().join("record.sh");
        std::fs::write(
            &script,
            format!("printf '%s %s\\n' \"$1\" \"$2\" > '{}'\n", out.display()),
        )
        .unwrap();
        script
    }

    #[tokio::test]
    async fn passes_task_then_user() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("args.txt");
        let script = write_script(&dir, &out);

        let launcher = ProcessLauncher::new(&script, Some(PathBuf::from("/bin/sh")));
        let receipt = launcher.launch(request()).unwrap();
        assert_eq!(receipt.request, request());
        assert!(receipt.pid.is_some());

        assert_eq!(wait_for(&out).await, "AB12CD34EF alice\n");
    }

    #[tokio::test]
    async fn relative_program_found_in_search_dir() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("args.txt");
        write_script(&dir, &out);

        let launcher = ProcessLauncher::new("record.sh", Some(PathBuf::from("/bin/sh")))
            .with_search_dirs(vec![dir.path().to_path_buf()]);
        launcher.launch(request()).unwrap();
        assert_eq!(wait_for(&out).await, "AB12CD34EF alice\n");
    }

    #[tokio::test]
    async fn missing_script_is_not_found() {
        let dir = TempDir::new().unwrap();
        let launcher = ProcessLauncher::new("Record_Mac.py", Some(PathBuf::from("/bin/sh")))
            .with_search_dirs(vec![dir.path().to_path_buf()]);
        let err = launcher.launch(request()).unwrap_err();
        assert!(matches!(err, LaunchError::NotFound { .. }));
        assert_eq!(err.to_string(), "Recording script not found.");
    }

    #[tokio::test]
    async fn missing_absolute_program_is_not_found() {
        let launcher = ProcessLauncher::new("/nonexistent/srot-recorder", None);
        assert!(matches!(
            launcher.launch(request()),
            Err(LaunchError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn bare_name_missing_from_path_is_not_found() {
        let launcher = ProcessLauncher::new("srot-recorder-does-not-exist", None)
            .with_search_dirs(Vec::new());
        assert!(matches!(
            launcher.launch(request()),
            Err(LaunchError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn non_executable_program_fails_to_spawn() {
        let dir = TempDir::new().unwrap();
        let program = dir.path().join("not-executable");
        std::fs::write(&program, "#!/bin/sh\n").unwrap();

        let err = ProcessLauncher::new(&program, None)
            .launch(request())
            .unwrap_err();
        assert!(matches!(err, LaunchError::Spawn { .. }));
        assert_eq!(err.to_string(), "Failed to start recording.");
    }
}
