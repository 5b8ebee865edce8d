//! Command-line templating for the external program.
//!
//! Each argument is an [upon] template rendered with two variables:
//!
//! | Variable | Description                                              |
//! |----------|----------------------------------------------------------|
//! | `input`  | Path of the file being transformed                       |
//! | `output` | Path the program must write its result to                |
//!
//! The first element names the program and is used verbatim. Arguments are
//! passed to the program directly (no shell), so paths containing spaces or
//! quotes need no escaping.
//!
//! ```
//! use tamp_inplace::CommandTemplate;
//! use std::path::Path;
//!
//! let template = CommandTemplate::new(["convert", "{{ input }}", "-compress", "LZW", "{{ output }}"]).unwrap();
//! let command = template.render(Path::new("/data/a.tif"), Path::new("/data/.tmp_a.tif")).unwrap();
//! assert_eq!(command.get_program(), "convert");
//! assert_eq!(command.get_args().count(), 4);
//! ```

use crate::error::{Error, ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use std::ffi::OsString;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::path::Path;
use std::process::Command;
use upon::{Engine, Template};

/// Sentinel rendered in place of `output` while validating a template.
const OUTPUT_SENTINEL: &str = "\u{0}tamp-output\u{0}";

enum Arg {
    /// The whole argument is `{{ input }}`: the path is passed through as is.
    Input,
    /// The whole argument is `{{ output }}`.
    Output,
    Rendered(Template<'static>),
}

impl Arg {
    fn compile(engine: &Engine<'static>, source: &str) -> Result<Self> {
        let placeholder = source
            .trim()
            .strip_prefix("{{")
            .and_then(|rest| rest.strip_suffix("}}"))
            .map(str::trim);
        Ok(match placeholder {
            Some("input") => Self::Input,
            Some("output") => Self::Output,
            _ => Self::Rendered(engine.compile(source.to_string()).or_raise(|| ErrorKind::Template(source.to_string()))?),
        })
    }
}

/// A compiled command line producing one [`Command`] per file.
///
/// Templates are compiled eagerly so that syntax errors surface when the
/// configuration is loaded, not halfway through a run. An argument consisting
/// of nothing but `{{ input }}` or `{{ output }}` takes the path verbatim, so
/// file names that are not valid UTF-8 only fail when embedded in a longer
/// argument.
pub struct CommandTemplate {
    engine: Engine<'static>,
    program: String,
    args: Vec<Arg>,
    source: Vec<String>,
}

impl CommandTemplate {
    pub fn new(argv: impl IntoIterator<Item = impl Into<String>>) -> Result<Self> {
        let source: Vec<String> = argv.into_iter().map(Into::into).collect();
        let (program, args) = source
            .split_first()
            .ok_or_raise(|| ErrorKind::Template("command is empty".to_string()))?;
        if program.trim().is_empty() {
            exn::bail!(ErrorKind::Template("program name is empty".to_string()));
        }
        let engine = Engine::new();
        let args = args.iter().map(|arg| Arg::compile(&engine, arg)).collect::<Result<Vec<_>>>()?;
        let template = Self { engine, program: program.clone(), args, source };
        template.validate()?;
        Ok(template)
    }

    /// Name (or path) of the external program.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Builds the command that transforms `input` into `output`.
    pub fn render(&self, input: &Path, output: &Path) -> Result<Command> {
        let mut command = Command::new(&self.program);
        command.args(self.render_args(input, output)?);
        Ok(command)
    }

    fn render_args(&self, input: &Path, output: &Path) -> Result<Vec<OsString>> {
        self.args
            .iter()
            .zip(&self.source[1..])
            .map(|(arg, source)| match arg {
                Arg::Input => Ok(input.as_os_str().to_owned()),
                Arg::Output => Ok(output.as_os_str().to_owned()),
                Arg::Rendered(template) => {
                    let input = utf8(input)?;
                    let output = utf8(output)?;
                    template
                        .render(&self.engine, upon::value! { input: input, output: output })
                        .to_string()
                        .map(OsString::from)
                        .or_raise(|| ErrorKind::Template(source.clone()))
                },
            })
            .collect()
    }

    /// A command that never mentions its output path would leave nothing to
    /// commit, and every file would fail at the first rename.
    fn validate(&self) -> Result<()> {
        let rendered = self.render_args(Path::new("input"), Path::new(OUTPUT_SENTINEL))?;
        if !rendered.iter().any(|arg| arg.to_string_lossy().contains(OUTPUT_SENTINEL)) {
            exn::bail!(ErrorKind::Template("command never references {{ output }}".to_string()));
        }
        Ok(())
    }
}

fn utf8(path: &Path) -> Result<&str> {
    path.to_str().ok_or_raise(|| ErrorKind::NonUtf8Path(path.to_path_buf()))
}

impl TryFrom<Vec<String>> for CommandTemplate {
    type Error = Error;
    fn try_from(argv: Vec<String>) -> std::result::Result<Self, Self::Error> {
        Self::new(argv)
    }
}

impl Debug for CommandTemplate {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_tuple("CommandTemplate").field(&self.source).finish()
    }
}
