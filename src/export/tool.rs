//! Conversion tools
//!
//! A [`ConversionTool`] turns a native model file into an ONNX file when
//! invoked with `--input <native> --output <onnx>`. [`ProcessTool`] runs an
//! external program, [`BuiltinConverter`] does the conversion in process.

use std::ffi::{OsStr, OsString};
use std::path::PathBuf;
use std::process::Command;

use tracing::debug;

use crate::error::{SplitError, SplitResult};
use crate::io::{read_graph, save_onnx, to_onnx};

/// Captured result of a tool invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit code, -1 when the process was terminated by a signal
    pub exit_code: i32,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
}

impl ToolOutput {
    /// Whether the tool reported success
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Converts a native model file to ONNX
pub trait ConversionTool {
    /// Tool name used in logs
    fn name(&self) -> &str;

    /// Run the tool with arguments, blocking until it finishes
    ///
    /// Only failures to start the tool are errors; a failed conversion is
    /// reported through [`ToolOutput::exit_code`].
    fn run(&self, args: &[OsString]) -> SplitResult<ToolOutput>;
}

/// External converter program
#[derive(Debug, Clone)]
pub struct ProcessTool {
    program: PathBuf,
    prefix_args: Vec<OsString>,
}

impl ProcessTool {
    /// Tool running `program`
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            prefix_args: Vec::new(),
        }
    }

    /// Add an argument passed before `--input`
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.prefix_args.push(arg.as_ref().to_os_string());
        self
    }

    /// Add several arguments passed before `--input`
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.prefix_args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }
}

impl ConversionTool for ProcessTool {
    fn name(&self) -> &str {
        self.program
            .file_name()
            .and_then(OsStr::to_str)
            .unwrap_or("converter")
    }

    fn run(&self, args: &[OsString]) -> SplitResult<ToolOutput> {
        debug!(program = %self.program.display(), ?args, "running converter");
        let output = Command::new(&self.program)
            .args(&self.prefix_args)
            .args(args)
            .output()
            .map_err(|e| {
                SplitError::Io(std::io::Error::new(
                    e.kind(),
                    format!("failed to start {}: {}", self.program.display(), e),
                ))
            })?;

        Ok(ToolOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// In-process converter using the crate's own ONNX mapping
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinConverter;

impl BuiltinConverter {
    fn parse_args(args: &[OsString]) -> Result<(PathBuf, PathBuf), String> {
        let mut input = None;
        let mut output = None;
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            let slot = match arg.to_str() {
                Some("--input") => &mut input,
                Some("--output") => &mut output,
                _ => return Err(format!("unexpected argument {:?}", arg)),
            };
            let value = iter
                .next()
                .ok_or_else(|| format!("missing value for {:?}", arg))?;
            *slot = Some(PathBuf::from(value));
        }
        match (input, output) {
            (Some(i), Some(o)) => Ok((i, o)),
            _ => Err("usage: --input <native> --output <onnx>".to_string()),
        }
    }
}

impl ConversionTool for BuiltinConverter {
    fn name(&self) -> &str {
        "builtin"
    }

    fn run(&self, args: &[OsString]) -> SplitResult<ToolOutput> {
        let (input, output) = match Self::parse_args(args) {
            Ok(paths) => paths,
            Err(msg) => {
                return Ok(ToolOutput {
                    exit_code: 2,
                    stderr: msg,
                    ..Default::default()
                })
            }
        };

        // Conversion failures become diagnostics, like an external tool's
        let converted = read_graph(&input)
            .and_then(|graph| to_onnx(&graph))
            .and_then(|model| save_onnx(&model, &output));
        Ok(match converted {
            Ok(()) => ToolOutput {
                exit_code: 0,
                stdout: format!("wrote {}", output.display()),
                stderr: String::new(),
            },
            Err(e) => ToolOutput {
                exit_code: 1,
                stdout: String::new(),
                stderr: e.to_string(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn os(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    #[test]
    fn test_builtin_bad_arguments() {
        let out = BuiltinConverter.run(&os(&["--input"])).unwrap();
        assert!(!out.success());
        assert!(out.stderr.contains("--input"));

        let out = BuiltinConverter.run(&os(&["--verbose"])).unwrap();
        assert_eq!(out.exit_code, 2);
    }

    #[test]
    fn test_builtin_missing_model() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("absent.mgraph");
        let output = dir.path().join("absent.onnx");
        let out = BuiltinConverter
            .run(&[
                "--input".into(),
                input.clone().into_os_string(),
                "--output".into(),
                output.into_os_string(),
            ])
            .unwrap();
        assert_eq!(out.exit_code, 1);
        assert!(out.stderr.contains("absent.mgraph"));
    }

    #[cfg(unix)]
    #[test]
    fn test_process_tool_captures_stderr() {
        let tool = ProcessTool::new("sh").args(["-c", "echo conversion exploded >&2; exit 3", "sh"]);
        let out = tool.run(&os(&["--input", "a", "--output", "b"])).unwrap();
        assert_eq!(out.exit_code, 3);
        assert_eq!(out.stderr.trim(), "conversion exploded");
        assert_eq!(tool.name(), "sh");
    }

    #[test]
    fn test_process_tool_missing_program() {
        let tool = ProcessTool::new("/nonexistent/converter-binary");
        assert!(tool.run(&os(&["--input", "a"])).is_err());
    }
}
