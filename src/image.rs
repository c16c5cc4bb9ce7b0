//! The signing pipeline: header-only pass, layout, final pass, concatenation.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use tempfile::NamedTempFile;

use crate::attr::{compute_attributes, AttrParams, Attribute, PayloadLayout};
use crate::signtool::{display_command, ExternalSignTool, SignRequest, SignStatus, SignTool};
use crate::{ImageType, Result, SignImageError};

/// Output of the first signing pass.
pub const HEADER_ONLY_NAME: &str = "header_only.bin";
/// Prefix of the second pass output (`_final_<infile>`).
pub const FINAL_PREFIX: &str = "_final_";
/// Prefix of the concatenated image (`signed_<infile>`).
pub const SIGNED_PREFIX: &str = "signed_";

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Parameters for one signing run.
#[derive(Debug, Clone)]
pub struct SignParams {
    pub image_type: ImageType,
    pub infile: PathBuf,
    pub prikey: PathBuf,
    /// Required for [`ImageType::Blw`].
    pub wrapkey: Option<PathBuf>,
    pub cert: Option<PathBuf>,
    pub scrtu_fw: Option<PathBuf>,
    pub ddr_fw: Option<PathBuf>,
    pub attrs: AttrParams,
    /// Directory receiving the header-only, final and signed images.
    pub outdir: PathBuf,
    /// Fail when `signtool` exits non-zero instead of carrying on.
    pub strict: bool,
}

impl Default for SignParams {
    fn default() -> Self {
        Self {
            image_type: ImageType::Blp,
            infile: PathBuf::new(),
            prikey: PathBuf::new(),
            wrapkey: None,
            cert: None,
            scrtu_fw: None,
            ddr_fw: None,
            attrs: AttrParams::default(),
            outdir: PathBuf::from("."),
            strict: false,
        }
    }
}

impl SignParams {
    pub fn builder() -> SignParamsBuilder {
        SignParamsBuilder::default()
    }

    /// Paths of the header-only, final and signed images.
    pub fn output_paths(&self) -> Result<(PathBuf, PathBuf, PathBuf)> {
        let name = self
            .infile
            .file_name()
            .ok_or_else(|| SignImageError::BadInputName(self.infile.display().to_string()))?;

        let prefixed = |prefix: &str| {
            let mut s = OsString::from(prefix);
            s.push(name);
            self.outdir.join(s)
        };

        Ok((
            self.outdir.join(HEADER_ONLY_NAME),
            prefixed(FINAL_PREFIX),
            prefixed(SIGNED_PREFIX),
        ))
    }

    fn request<'a>(&'a self, outfile: &'a Path, attributes: &'a [Attribute]) -> SignRequest<'a> {
        SignRequest {
            image_type: self.image_type,
            prikey: &self.prikey,
            wrapkey: self.wrapkey.as_deref(),
            infile: &self.infile,
            outfile,
            cert: self.cert.as_deref(),
            attributes,
        }
    }
}

/// Builder for [`SignParams`].
#[derive(Default)]
pub struct SignParamsBuilder {
    params: SignParams,
}

impl SignParamsBuilder {
    pub fn image_type(mut self, t: ImageType) -> Self {
        self.params.image_type = t;
        self
    }
    pub fn infile(mut self, path: impl Into<PathBuf>) -> Self {
        self.params.infile = path.into();
        self
    }
    pub fn prikey(mut self, path: impl Into<PathBuf>) -> Self {
        self.params.prikey = path.into();
        self
    }
    pub fn wrapkey(mut self, path: impl Into<PathBuf>) -> Self {
        self.params.wrapkey = Some(path.into());
        self
    }
    pub fn cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.params.cert = Some(path.into());
        self
    }
    pub fn scrtu_fw(mut self, path: impl Into<PathBuf>) -> Self {
        self.params.scrtu_fw = Some(path.into());
        self
    }
    pub fn ddr_fw(mut self, path: impl Into<PathBuf>) -> Self {
        self.params.ddr_fw = Some(path.into());
        self
    }
    pub fn attrs(mut self, attrs: AttrParams) -> Self {
        self.params.attrs = attrs;
        self
    }
    pub fn outdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.params.outdir = dir.into();
        self
    }
    pub fn strict(mut self, strict: bool) -> Self {
        self.params.strict = strict;
        self
    }
    pub fn build(self) -> SignParams {
        self.params
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Files produced by a signing run.
#[derive(Debug, Clone)]
pub struct SignedImage {
    pub header_only: PathBuf,
    pub final_header: PathBuf,
    pub signed: PathBuf,
    pub layout: PayloadLayout,
    pub attributes: Vec<Attribute>,
}

/// Sign with the `signtool` found in `PATH`.
pub fn sign_image(params: &SignParams) -> Result<SignedImage> {
    sign_image_with(params, &ExternalSignTool::default())
}

/// Sign with a caller-provided [`SignTool`].
///
/// Nothing touches the filesystem before the image type has been checked.
/// A `BLw` request without a wrap key is rejected at the same point on
/// purpose, rather than handing `signtool` an empty `-wrapkey`.
///
/// In lenient mode a failed signer run is only logged; if it left no output
/// behind, the size query or the concatenation then fails with an I/O error
/// and no `signed_` image is written.
pub fn sign_image_with(params: &SignParams, tool: &dyn SignTool) -> Result<SignedImage> {
    if !params.image_type.is_supported() {
        return Err(SignImageError::UnsupportedType(
            params.image_type.to_string(),
        ));
    }
    if params.image_type.needs_wrap_key() && params.wrapkey.is_none() {
        return Err(SignImageError::MissingWrapKey(params.image_type));
    }
    let (header_only, final_header, signed) = params.output_paths()?;

    // Pass 1: header only, to learn the header size
    let args = params.request(&header_only, &[]).to_args()?;
    run_signer(tool, &args, "header-only image", params.strict)?;

    let header_size = file_size(&header_only)?;
    info!("header_only_file_size: {header_size}");

    let scrtu_size = params.scrtu_fw.as_deref().map(file_size).transpose()?;
    info!("scrtu_fw_size: {}", scrtu_size.unwrap_or(0));
    let ddr_size = params.ddr_fw.as_deref().map(file_size).transpose()?;
    info!("ddr_fw_size: {}", ddr_size.unwrap_or(0));

    let layout = PayloadLayout {
        header_size,
        scrtu_size,
        ddr_size,
    };
    info!("total_size: {}", layout.total_size());

    // Pass 2: same template, offsets embedded
    let attributes = compute_attributes(&params.attrs, &layout);
    let args = params.request(&final_header, &attributes).to_args()?;
    run_signer(tool, &args, "final image", params.strict)?;

    let mut parts = vec![final_header.as_path()];
    parts.extend(params.scrtu_fw.as_deref());
    parts.extend(params.ddr_fw.as_deref());
    let written = concat_image(&signed, &parts)?;
    info!("{}: {written} bytes", signed.display());

    Ok(SignedImage {
        header_only,
        final_header,
        signed,
        layout,
        attributes,
    })
}

fn run_signer(
    tool: &dyn SignTool,
    args: &[OsString],
    stage: &'static str,
    strict: bool,
) -> Result<()> {
    info!("{}", display_command(&tool.name(), args));
    match tool.run(args)? {
        SignStatus::Success => Ok(()),
        status if strict => Err(SignImageError::SignerFailed { stage, status }),
        status => {
            warn!("signtool failed while producing {stage} ({status}), continuing");
            Ok(())
        }
    }
}

fn file_size(path: &Path) -> Result<u64> {
    fs::metadata(path)
        .map(|m| m.len())
        .map_err(|source| SignImageError::FileSize {
            path: path.display().to_string(),
            source,
        })
}

/// Write `parts` back to back into `output`. Returns the number of bytes
/// written.
///
/// Every part is opened before anything is written, and the image is built
/// in a temporary file next to `output` that only replaces it once complete,
/// so a failure never leaves a truncated image behind.
pub fn concat_image(output: impl AsRef<Path>, parts: &[&Path]) -> Result<u64> {
    let output = output.as_ref();
    debug!(
        "concatenating {} -> {}",
        parts
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(" "),
        output.display()
    );

    let inputs = parts
        .iter()
        .map(|part| {
            File::open(part).map_err(|source| SignImageError::ConcatInput {
                path: part.display().to_string(),
                source,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let dir = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let tmp = NamedTempFile::new_in(dir)?;

    let mut out = BufWriter::new(tmp);
    let mut total = 0;
    for mut input in inputs {
        total += io::copy(&mut input, &mut out)?;
    }
    let tmp = out.into_inner().map_err(|e| e.into_error())?;
    tmp.persist(output).map_err(|e| e.error)?;
    Ok(total)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
