//! # signimage
//!
//! Sign bootloader images with an external `signtool` and glue the
//! auxiliary firmware blobs behind the signed header.
//!
//! The flow mirrors what the boot ROM expects:
//!
//! 1. Sign the input once to learn the size of the signed header
//!    (`header_only.bin`)
//! 2. Lay out the SCRTU and DDR firmware behind that header and compute
//!    their offsets
//! 3. Sign again with the offsets (and the SPI attributes) embedded as
//!    `-attribute` pairs (`_final_<infile>`)
//! 4. Concatenate header, SCRTU firmware and DDR firmware
//!    (`signed_<infile>`)
//!
//! ## Example
//!
//! ```no_run
//! use signimage::{ImageType, SignParams};
//!
//! let params = SignParams::builder()
//!     .image_type(ImageType::Blp)
//!     .infile("bl2.bin")
//!     .prikey("rom_key.der")
//!     .scrtu_fw("scrtu.bin")
//!     .ddr_fw("ddr.bin")
//!     .build();
//!
//! let signed = signimage::sign_image(&params).unwrap();
//! println!("wrote {}", signed.signed.display());
//! ```

pub mod attr;
pub mod image;
pub mod signtool;

use std::fmt;
use std::io;

use thiserror::Error;

pub use attr::{compute_attributes, AttrParams, Attribute, PayloadLayout};
pub use image::{concat_image, sign_image, sign_image_with, SignParams, SignedImage};
pub use signtool::{ExternalSignTool, SignRequest, SignStatus, SignTool};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum SignImageError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("cannot stat '{path}': {source}")]
    FileSize { path: String, source: io::Error },

    #[error("not support image type '{0}'")]
    UnsupportedType(String),

    #[error("image type {0} requires a wrap key (-w)")]
    MissingWrapKey(ImageType),

    #[error("input file '{0}' has no file name")]
    BadInputName(String),

    #[error("cannot run '{program}': {source}")]
    SpawnSigner { program: String, source: io::Error },

    #[error("signtool failed while producing {stage} ({status})")]
    SignerFailed { stage: &'static str, status: SignStatus },

    #[error("cannot open '{path}': {source}")]
    ConcatInput { path: String, source: io::Error },

    #[error("missing {0}")]
    MissingArgument(&'static str),
}

pub type Result<T> = std::result::Result<T, SignImageError>;

// ---------------------------------------------------------------------------
// Image types understood by signtool
// ---------------------------------------------------------------------------

/// Bootloader image format passed to `signtool -type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageType {
    /// Header signed with the ROM key.
    Blp,
    Ble,
    Blx,
    /// Header signed and encrypted with the wrap key (AES-128).
    Blw,
}

/// Public key slot selected with `signtool -pubkeytype`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PubKeyType {
    Rom,
    Image,
}

impl PubKeyType {
    pub fn as_str(self) -> &'static str {
        match self {
            PubKeyType::Rom => "rom",
            PubKeyType::Image => "image",
        }
    }
}

impl ImageType {
    /// All known entries as `(type, short_name, long_name)`.
    pub fn table() -> &'static [(ImageType, &'static str, &'static str)] {
        &[
            (ImageType::Blp, "BLp", "Bootloader, header signed with ROM key"),
            (ImageType::Ble, "BLe", "Bootloader (no signing template)"),
            (ImageType::Blx, "BLx", "Bootloader (no signing template)"),
            (
                ImageType::Blw,
                "BLw",
                "Bootloader, header signed and encrypted with wrap key",
            ),
        ]
    }

    /// Look up by the exact `signtool` name. The names are case-sensitive.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::table()
            .iter()
            .find(|&&(_, short, _)| short == name)
            .map(|&(t, _, _)| t)
    }

    /// Name passed to `signtool -type`.
    pub fn short_name(self) -> &'static str {
        for &(t, short, _) in Self::table() {
            if t == self {
                return short;
            }
        }
        "unknown"
    }

    /// Human-readable description.
    pub fn long_name(self) -> &'static str {
        for &(t, _, long) in Self::table() {
            if t == self {
                return long;
            }
        }
        "Unknown"
    }

    /// Whether a signing template exists for this type.
    pub fn is_supported(self) -> bool {
        self.pub_key_type().is_some()
    }

    /// Key slot for the signing template, `None` for unsupported types.
    pub fn pub_key_type(self) -> Option<PubKeyType> {
        match self {
            ImageType::Blp => Some(PubKeyType::Rom),
            ImageType::Blw => Some(PubKeyType::Image),
            ImageType::Ble | ImageType::Blx => None,
        }
    }

    /// Whether the template encrypts with a wrap key.
    pub fn needs_wrap_key(self) -> bool {
        self == ImageType::Blw
    }
}

impl fmt::Display for ImageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
