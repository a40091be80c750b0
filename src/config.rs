//! Configuration types for document conversion and for the task service.
//!
//! Per-call conversion behaviour is controlled through [`ConversionOptions`],
//! built via its [`ConversionOptionsBuilder`]. Process-wide settings (object
//! store location, broker URLs, pdfium path) live in [`ServiceConfig`], read
//! once from the environment at startup.

use crate::error::DocPipeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Rasterisation density used when none is given.
pub const DEFAULT_DPI: u32 = 200;

/// Options for one document conversion.
///
/// Built via [`ConversionOptions::builder()`] or using
/// [`ConversionOptions::default()`].
///
/// # Example
/// ```rust
/// use edgequake_docpipe::{ConversionOptions, ImageFormat, ReturnMode};
///
/// let options = ConversionOptions::builder()
///     .dpi(150)
///     .max_side(1600)
///     .image_format(ImageFormat::Jpeg)
///     .return_mode(ReturnMode::Archive)
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionOptions {
    /// Rasterisation density in dots per inch. Must be > 0. Default: 200.
    ///
    /// PDF pages are rendered at `dpi / 72` pixels per point; the same value
    /// sizes pages when rasterised images are reassembled into a PDF.
    pub dpi: u32,

    /// Upper bound on the longest side of each page, in pixels.
    ///
    /// Pages larger than this are downscaled with Lanczos3, preserving aspect
    /// ratio. `None` keeps the rendered size.
    pub max_side: Option<u32>,

    /// Colour to composite transparent pages onto. `None` keeps the alpha
    /// channel as rendered.
    pub background: Option<Rgba>,

    /// Encoding used for BYTES, FILES and ARCHIVE output. Default: PNG.
    pub image_format: ImageFormat,

    /// Shape of the conversion result. Default: [`ReturnMode::Pages`].
    pub return_mode: ReturnMode,

    /// Naming hint for archive entries, e.g. `report.png` yields
    /// `report_0001.png`, `report_0002.png`, ….
    pub archive_entry_name_hint: Option<String>,

    /// Stem for generated page file names. Default: `page`.
    pub filename_prefix: String,

    /// Directory for FILES output and for `save`. Default: `./doc_images`.
    pub output_dir: Option<PathBuf>,

    /// Also persist every page to `output_dir`, whatever the return mode.
    pub save: bool,

    /// Wall-clock limit for an external converter run. Default: 300 s.
    pub tool_timeout_secs: u64,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            dpi: DEFAULT_DPI,
            max_side: None,
            background: None,
            image_format: ImageFormat::default(),
            return_mode: ReturnMode::default(),
            archive_entry_name_hint: None,
            filename_prefix: "page".to_string(),
            output_dir: None,
            save: false,
            tool_timeout_secs: 300,
        }
    }
}

impl ConversionOptions {
    /// Default directory for FILES output when none is configured.
    pub const DEFAULT_OUTPUT_DIR: &'static str = "./doc_images";

    /// Create a new builder for `ConversionOptions`.
    pub fn builder() -> ConversionOptionsBuilder {
        ConversionOptionsBuilder {
            options: Self::default(),
        }
    }

    /// The directory pages are written to in FILES mode or with `save`.
    pub fn resolved_output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(Self::DEFAULT_OUTPUT_DIR))
    }

    /// Check every constraint the builder enforces.
    pub fn validate(&self) -> Result<(), DocPipeError> {
        if self.dpi == 0 {
            return Err(DocPipeError::InvalidConfig("dpi must be > 0".into()));
        }
        if self.max_side == Some(0) {
            return Err(DocPipeError::InvalidConfig(
                "max_side must be > 0 when set".into(),
            ));
        }
        if self.filename_prefix.trim().is_empty() {
            return Err(DocPipeError::InvalidConfig(
                "filename_prefix must not be empty".into(),
            ));
        }
        if self.tool_timeout_secs == 0 {
            return Err(DocPipeError::InvalidConfig(
                "tool_timeout_secs must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`ConversionOptions`].
#[derive(Debug)]
pub struct ConversionOptionsBuilder {
    options: ConversionOptions,
}

impl ConversionOptionsBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.options.dpi = dpi;
        self
    }

    pub fn max_side(mut self, px: u32) -> Self {
        self.options.max_side = Some(px);
        self
    }

    pub fn background(mut self, colour: Rgba) -> Self {
        self.options.background = Some(colour);
        self
    }

    pub fn image_format(mut self, format: ImageFormat) -> Self {
        self.options.image_format = format;
        self
    }

    pub fn return_mode(mut self, mode: ReturnMode) -> Self {
        self.options.return_mode = mode;
        self
    }

    pub fn archive_entry_name_hint(mut self, hint: impl Into<String>) -> Self {
        self.options.archive_entry_name_hint = Some(hint.into());
        self
    }

    pub fn filename_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.options.filename_prefix = prefix.into();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.options.output_dir = Some(dir.into());
        self
    }

    pub fn save(mut self, v: bool) -> Self {
        self.options.save = v;
        self
    }

    pub fn tool_timeout_secs(mut self, secs: u64) -> Self {
        self.options.tool_timeout_secs = secs;
        self
    }

    /// Build the options, validating constraints.
    pub fn build(self) -> Result<ConversionOptions, DocPipeError> {
        self.options.validate()?;
        Ok(self.options)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Raster encoding for page output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ImageFormat {
    #[default]
    Png,
    Jpeg,
    Webp,
    Tiff,
    Bmp,
}

impl ImageFormat {
    /// Lower-case format name, used as the `{fmt}` part of generated file names.
    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Webp => "webp",
            ImageFormat::Tiff => "tiff",
            ImageFormat::Bmp => "bmp",
        }
    }

    /// Upper-case name as stored in artifact metadata (`PNG`, `JPEG`, …).
    pub fn name(self) -> &'static str {
        match self {
            ImageFormat::Png => "PNG",
            ImageFormat::Jpeg => "JPEG",
            ImageFormat::Webp => "WEBP",
            ImageFormat::Tiff => "TIFF",
            ImageFormat::Bmp => "BMP",
        }
    }

    pub(crate) fn to_image_crate(self) -> image::ImageFormat {
        match self {
            ImageFormat::Png => image::ImageFormat::Png,
            ImageFormat::Jpeg => image::ImageFormat::Jpeg,
            ImageFormat::Webp => image::ImageFormat::WebP,
            ImageFormat::Tiff => image::ImageFormat::Tiff,
            ImageFormat::Bmp => image::ImageFormat::Bmp,
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ImageFormat {
    type Err = DocPipeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(ImageFormat::Png),
            "jpeg" | "jpg" => Ok(ImageFormat::Jpeg),
            "webp" => Ok(ImageFormat::Webp),
            "tiff" | "tif" => Ok(ImageFormat::Tiff),
            "bmp" => Ok(ImageFormat::Bmp),
            other => Err(DocPipeError::InvalidConfig(format!(
                "unknown image format '{other}' (expected png, jpeg, webp, tiff or bmp)"
            ))),
        }
    }
}

/// What a conversion hands back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReturnMode {
    /// In-memory rasters. (default)
    #[default]
    Pages,
    /// One encoded image per page.
    Bytes,
    /// Pages written to disk; absolute paths returned.
    Files,
    /// One ZIP archive holding every encoded page.
    Archive,
    /// A single PDF. PDF, Office and HTML inputs keep their vector content.
    Pdf,
}

impl FromStr for ReturnMode {
    type Err = DocPipeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pages" | "pil" => Ok(ReturnMode::Pages),
            "bytes" => Ok(ReturnMode::Bytes),
            "files" => Ok(ReturnMode::Files),
            "archive" | "zip" => Ok(ReturnMode::Archive),
            "pdf" | "pdf_bytes" => Ok(ReturnMode::Pdf),
            other => Err(DocPipeError::InvalidConfig(format!(
                "unknown return mode '{other}' (expected pages, bytes, files, archive or pdf)"
            ))),
        }
    }
}

impl fmt::Display for ReturnMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReturnMode::Pages => "pages",
            ReturnMode::Bytes => "bytes",
            ReturnMode::Files => "files",
            ReturnMode::Archive => "archive",
            ReturnMode::Pdf => "pdf",
        })
    }
}

/// An 8-bit RGBA colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgba(pub [u8; 4]);

impl Rgba {
    pub const WHITE: Rgba = Rgba([255, 255, 255, 255]);
    pub const BLACK: Rgba = Rgba([0, 0, 0, 255]);
}

impl FromStr for Rgba {
    type Err = DocPipeError;

    /// Accepts `white`, `black`, `#RRGGBB`, `#RRGGBBAA` or `r,g,b[,a]`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let bad = || DocPipeError::InvalidConfig(format!("invalid colour '{s}'"));

        match s.to_ascii_lowercase().as_str() {
            "white" => return Ok(Rgba::WHITE),
            "black" => return Ok(Rgba::BLACK),
            _ => {}
        }

        if let Some(hex) = s.strip_prefix('#') {
            if hex.len() != 6 && hex.len() != 8 {
                return Err(bad());
            }
            let mut out = [0u8, 0, 0, 255];
            for (i, chunk) in hex.as_bytes().chunks(2).enumerate() {
                let pair = std::str::from_utf8(chunk).map_err(|_| bad())?;
                out[i] = u8::from_str_radix(pair, 16).map_err(|_| bad())?;
            }
            return Ok(Rgba(out));
        }

        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 3 && parts.len() != 4 {
            return Err(bad());
        }
        let mut out = [0u8, 0, 0, 255];
        for (i, p) in parts.iter().enumerate() {
            out[i] = p.parse().map_err(|_| bad())?;
        }
        Ok(Rgba(out))
    }
}

// ── Service configuration ────────────────────────────────────────────────

/// Object-store connection settings.
///
/// The S3 wire client itself lives outside this crate; these values are
/// carried so a deployment can construct one, and `bucket` names the
/// default bucket for canonical and legacy source keys.
#[derive(Clone)]
pub struct S3Config {
    pub endpoint_url: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
}

impl fmt::Debug for S3Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Config")
            .field("endpoint_url", &self.endpoint_url)
            .field("region", &self.region)
            .field("access_key", &"<redacted>")
            .field("secret_key", &"<redacted>")
            .field("bucket", &self.bucket)
            .finish()
    }
}

/// Process-wide settings for the task service and the CLI.
#[derive(Clone)]
pub struct ServiceConfig {
    pub s3: S3Config,
    pub broker_url: String,
    pub result_backend: String,
    pub database_url: Option<String>,
    /// Root of the filesystem-backed object store used by the CLI.
    pub storage_dir: PathBuf,
    /// Explicit pdfium library location (file or directory).
    pub pdfium_lib_path: Option<PathBuf>,
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("s3", &self.s3)
            .field("broker_url", &self.broker_url)
            .field("result_backend", &self.result_backend)
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "<redacted>"),
            )
            .field("storage_dir", &self.storage_dir)
            .field("pdfium_lib_path", &self.pdfium_lib_path)
            .finish()
    }
}

impl ServiceConfig {
    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self, DocPipeError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through an arbitrary variable lookup.
    ///
    /// Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, DocPipeError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let or = |name: &str, default: &str| get(name).unwrap_or_else(|| default.to_string());

        let bucket = or("S3_BUCKET", "llmops-bucket");
        if bucket.contains('/') {
            return Err(DocPipeError::InvalidConfig(format!(
                "S3_BUCKET must not contain '/': {bucket}"
            )));
        }

        Ok(Self {
            s3: S3Config {
                endpoint_url: or("S3_ENDPOINT_URL", "http://localhost:9000"),
                region: or("S3_REGION", "us-east-1"),
                access_key: or("S3_ACCESS_KEY", "minioadmin"),
                secret_key: or("S3_SECRET_KEY", "minioadmin"),
                bucket,
            },
            broker_url: or("CELERY_BROKER_URL", "redis://localhost:6379/0"),
            result_backend: or("CELERY_RESULT_BACKEND", "redis://localhost:6379/1"),
            database_url: get("DATABASE_URL"),
            storage_dir: PathBuf::from(or("DOCPIPE_STORAGE_DIR", "./docpipe_store")),
            pdfium_lib_path: get("PDFIUM_LIB_PATH").map(PathBuf::from),
        })
    }
}
