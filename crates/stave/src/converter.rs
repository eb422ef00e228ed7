use crate::config::INPUT_PLACEHOLDER;
use crate::error::{PluginError, PluginResult};
use std::io::Write;
use std::process::Command;
use tracing::debug;

/// Turns a whole outline document into rendered markup.
pub trait Converter: Send + Sync {
    fn available(&self) -> bool;

    fn convert(&self, source: &str) -> PluginResult<String>;
}

/// Runs an external program on a temporary copy of the document.
///
/// Every argument equal to `{input}` is replaced by the path of the
/// temporary file; the program's stdout is the converted body.
pub struct CommandConverter {
    program: String,
    args: Vec<String>,
}

impl CommandConverter {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn from_command_line(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self::new(program.clone(), args.to_vec()))
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Converter for CommandConverter {
    fn available(&self) -> bool {
        which::which(&self.program).is_ok()
    }

    fn convert(&self, source: &str) -> PluginResult<String> {
        let mut input = tempfile::Builder::new()
            .prefix("stave-")
            .suffix(".org")
            .tempfile()?;
        input.write_all(source.as_bytes())?;
        input.flush()?;

        let input_path = input.path().to_string_lossy().into_owned();
        let args: Vec<&str> = self
            .args
            .iter()
            .map(|arg| {
                if arg == INPUT_PLACEHOLDER {
                    input_path.as_str()
                } else {
                    arg.as_str()
                }
            })
            .collect();

        debug!(program = %self.program, ?args, "running converter");

        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .map_err(|error| PluginError::Process {
                program: self.program.clone(),
                message: error.to_string(),
            })?;

        if !output.status.success() {
            let mut diagnostic = String::from_utf8_lossy(&output.stdout).into_owned();
            diagnostic.push_str(&String::from_utf8_lossy(&output.stderr));
            return Err(PluginError::Conversion {
                output: diagnostic.trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
