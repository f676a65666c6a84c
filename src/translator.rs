use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::HostError;

/// External pedalboard-to-host-command translator.
///
/// Invoked once per load with the pedalboard description path appended to
/// `args`; its stdout is the newline-terminated host command text. Any
/// failure (spawn, non-zero exit, non-UTF-8 output) is a hard
/// [`HostError::Translation`].
#[derive(Debug, Clone)]
pub struct Translator {
    program: PathBuf,
    args: Vec<String>,
}

impl Translator {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Translator {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    fn error(&self, reason: impl Into<String>) -> HostError {
        HostError::Translation {
            program: self.program.display().to_string(),
            reason: reason.into(),
        }
    }

    pub fn translate(&self, pedalboard: &Path) -> Result<String, HostError> {
        log::debug!(
            "translating pedalboard {} via {}",
            pedalboard.display(),
            self.program.display()
        );
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(pedalboard)
            .output()
            .map_err(|e| self.error(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(self.error(format!(
                "exit status {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        String::from_utf8(output.stdout).map_err(|_| self.error("output is not valid UTF-8"))
    }
}
