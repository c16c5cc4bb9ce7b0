//! `signtool` command construction and invocation.
//!
//! The signer is always called with the same template for a given image
//! type; only the output file, the attributes and the optional certificate
//! change between the header-only and the final pass.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

use crate::attr::Attribute;
use crate::{ImageType, Result, SignImageError};

/// Default program name looked up in `PATH`.
pub const DEFAULT_SIGNTOOL: &str = "signtool";

/// Outcome of one signer run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignStatus {
    Success,
    /// Non-zero exit; `None` when terminated by a signal.
    Failed(Option<i32>),
}

impl From<ExitStatus> for SignStatus {
    fn from(status: ExitStatus) -> Self {
        if status.success() {
            SignStatus::Success
        } else {
            SignStatus::Failed(status.code())
        }
    }
}

impl fmt::Display for SignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignStatus::Success => f.write_str("success"),
            SignStatus::Failed(Some(code)) => write!(f, "exit code {code}"),
            SignStatus::Failed(None) => f.write_str("terminated by signal"),
        }
    }
}

/// Everything needed to render one `signtool sign` command line.
#[derive(Debug, Clone)]
pub struct SignRequest<'a> {
    pub image_type: ImageType,
    pub prikey: &'a Path,
    pub wrapkey: Option<&'a Path>,
    pub infile: &'a Path,
    pub outfile: &'a Path,
    pub cert: Option<&'a Path>,
    pub attributes: &'a [Attribute],
}

impl SignRequest<'_> {
    /// Arguments following the program name.
    ///
    /// ```text
    /// sign -type <T> -pubkeytype <rom|image> -prikey <key>
    ///      [-algo aes128 -wrapkey <key>] -infile <in> -outfile <out>
    ///      [-attribute <id>=<value>]... [-cert <cert>]
    /// ```
    pub fn to_args(&self) -> Result<Vec<OsString>> {
        let pubkey = self
            .image_type
            .pub_key_type()
            .ok_or_else(|| SignImageError::UnsupportedType(self.image_type.to_string()))?;

        let mut args: Vec<OsString> = vec![
            "sign".into(),
            "-type".into(),
            self.image_type.short_name().into(),
            "-pubkeytype".into(),
            pubkey.as_str().into(),
            "-prikey".into(),
            self.prikey.into(),
        ];

        if self.image_type.needs_wrap_key() {
            let wrapkey = self
                .wrapkey
                .ok_or(SignImageError::MissingWrapKey(self.image_type))?;
            args.push("-algo".into());
            args.push("aes128".into());
            args.push("-wrapkey".into());
            args.push(wrapkey.into());
        }

        args.push("-infile".into());
        args.push(self.infile.into());
        args.push("-outfile".into());
        args.push(self.outfile.into());

        for attr in self.attributes {
            args.push("-attribute".into());
            args.push(attr.to_string().into());
        }

        if let Some(cert) = self.cert {
            args.push("-cert".into());
            args.push(cert.into());
        }

        Ok(args)
    }
}

/// Runs the signer. Implement this to plug in something other than the
/// `signtool` executable (e.g. an HSM wrapper, or a fake in tests).
pub trait SignTool {
    /// Program name shown in log lines.
    fn name(&self) -> String;

    /// Run the signer with `args` and wait for it to finish.
    fn run(&self, args: &[OsString]) -> Result<SignStatus>;
}

/// Spawns the external `signtool` binary.
#[derive(Debug, Clone)]
pub struct ExternalSignTool {
    program: PathBuf,
}

impl ExternalSignTool {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for ExternalSignTool {
    fn default() -> Self {
        Self::new(DEFAULT_SIGNTOOL)
    }
}

impl SignTool for ExternalSignTool {
    fn name(&self) -> String {
        self.program.display().to_string()
    }

    fn run(&self, args: &[OsString]) -> Result<SignStatus> {
        let status = Command::new(&self.program)
            .args(args)
            .status()
            .map_err(|source| SignImageError::SpawnSigner {
                program: self.name(),
                source,
            })?;
        Ok(status.into())
    }
}

/// Render a command line for logging.
pub fn display_command(program: &str, args: &[OsString]) -> String {
    let mut line = program.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(&arg.to_string_lossy());
    }
    line
}
