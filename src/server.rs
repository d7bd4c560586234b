//! MCP server exposing the operation engine over stdio

use crate::engine::output::{operation_file_name, InputFile, OperationOutput, TEXT_MIME};
use crate::engine::params::{
    HeaderFooterOptions, MetadataUpdate, PageNumberOptions, SignatureOptions, WatermarkKind,
    WatermarkOptions,
};
use crate::engine::{Engine, EngineConfig, Operation};
use crate::error::Error;
use crate::pdf::document::{Document, Metadata};
use crate::pdf::geometry::{Margins, PageSize, Rect};
use crate::pdf::pages::PageSpec;
use crate::pdf::preview::{overlay_crop, CropHandleMove, LatestWins, PreviewSession, PreviewState};
use crate::pdf::raster::{encode_image, RasterFormat, RasterizerConfig};
use crate::pdf::security::{self, Permissions, PrintLevel};
use crate::source::{
    resolve_base64, resolve_cache, resolve_path, CacheManager, CachedFile, ResolvedFile,
};
use anyhow::Result;
use base64::Engine as _;
use rmcp::{
    handler::server::tool::ToolRouter, handler::server::wrapper::Parameters, model::*,
    schemars::JsonSchema, tool, tool_handler, tool_router, ServerHandler, ServiceExt,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

const SOURCE_HELP: &str = "Source format: must be one of {\"path\": \"/absolute/path.pdf\"}, {\"base64\": \"...\", \"name\": \"optional.pdf\"}, or {\"cache_key\": \"...\"}";

/// Input file specification
#[derive(Debug, Clone, Serialize, JsonSchema)]
#[serde(untagged)]
pub enum FileSource {
    /// File path (absolute or relative)
    Path {
        /// Path to the file
        path: String,
    },
    /// Base64 encoded file
    Base64 {
        /// Base64 encoded content
        base64: String,
        /// File name used for output naming
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    /// Output of an earlier call
    CacheRef {
        /// Cache key returned by a previous tool
        cache_key: String,
    },
}

impl<'de> serde::Deserialize<'de> for FileSource {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        let string_field = |obj: &serde_json::Map<String, serde_json::Value>, key: &str| {
            obj.get(key).map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| serde::de::Error::custom(format!("\"{}\" must be a string", key)))
            })
        };

        let obj = value.as_object().ok_or_else(|| {
            serde::de::Error::custom(format!(
                "Invalid source: expected an object with one of \"path\", \"base64\" or \"cache_key\", but got {}",
                match &value {
                    serde_json::Value::Array(_) => "an array",
                    serde_json::Value::String(_) => "a string",
                    serde_json::Value::Number(_) => "a number",
                    serde_json::Value::Bool(_) => "a boolean",
                    serde_json::Value::Null => "null",
                    serde_json::Value::Object(_) => "an object",
                }
            ))
        })?;

        if let Some(path) = string_field(obj, "path") {
            return Ok(FileSource::Path { path: path? });
        }
        if let Some(base64) = string_field(obj, "base64") {
            let name = string_field(obj, "name").transpose()?;
            return Ok(FileSource::Base64 {
                base64: base64?,
                name,
            });
        }
        if let Some(cache_key) = string_field(obj, "cache_key") {
            return Ok(FileSource::CacheRef {
                cache_key: cache_key?,
            });
        }
        let keys: Vec<&String> = obj.keys().collect();
        Err(serde::de::Error::custom(format!(
            "Invalid source: expected an object with one of \"path\", \"base64\" or \"cache_key\", but got keys: {:?}",
            keys
        )))
    }
}

/// Security and resource configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Directories paths must stay inside; empty allows any path
    pub resource_dirs: Vec<String>,
    /// Maximum total bytes in cache (default: 512MB)
    pub cache_max_bytes: usize,
    /// Maximum number of cache entries (default: 100)
    pub cache_max_entries: usize,
    /// Maximum scale for previews and image export (default: 10.0)
    pub max_image_scale: f32,
    /// Maximum pixel area for previews (default: 100_000_000)
    pub max_image_pixels: u64,
    pub engine: EngineConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            resource_dirs: Vec::new(),
            cache_max_bytes: 512 * 1024 * 1024,
            cache_max_entries: 100,
            max_image_scale: 10.0,
            max_image_pixels: 100_000_000,
            engine: EngineConfig::default(),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "ignoring unparsable setting");
            default
        }),
        Err(_) => default,
    }
}

impl ServerConfig {
    /// Defaults overridden by `PDF_TOOLS_*` environment variables.
    ///
    /// Directory lists use the platform path separator.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let raster_defaults = RasterizerConfig::default();

        let resource_dirs = std::env::var_os("PDF_TOOLS_RESOURCE_DIRS")
            .map(|v| {
                std::env::split_paths(&v)
                    .filter(|p| !p.as_os_str().is_empty())
                    .map(|p| p.to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();

        let mut library_paths: Vec<PathBuf> = std::env::var_os("PDF_TOOLS_PDFIUM_PATH")
            .map(|v| std::env::split_paths(&v).collect())
            .unwrap_or_default();
        library_paths.extend(raster_defaults.library_paths);

        Self {
            resource_dirs,
            cache_max_bytes: env_or("PDF_TOOLS_CACHE_MAX_BYTES", defaults.cache_max_bytes),
            cache_max_entries: env_or("PDF_TOOLS_CACHE_MAX_ENTRIES", defaults.cache_max_entries),
            max_image_scale: env_or("PDF_TOOLS_MAX_IMAGE_SCALE", defaults.max_image_scale),
            max_image_pixels: env_or("PDF_TOOLS_MAX_IMAGE_PIXELS", defaults.max_image_pixels),
            engine: EngineConfig {
                rasterizer: RasterizerConfig {
                    library_paths,
                    use_system_library: env_or(
                        "PDF_TOOLS_PDFIUM_SYSTEM",
                        raster_defaults.use_system_library,
                    ),
                    export_scale: env_or("PDF_TOOLS_EXPORT_SCALE", raster_defaults.export_scale),
                    jpeg_quality: env_or("PDF_TOOLS_JPEG_QUALITY", raster_defaults.jpeg_quality),
                },
                ..defaults.engine
            },
        }
    }
}

/// PDF tools MCP server
#[derive(Clone)]
pub struct PdfToolsServer {
    engine: Arc<Engine>,
    cache: Arc<CacheManager>,
    preview: Arc<parking_lot::Mutex<PreviewSession>>,
    /// Crop-handle moves not yet drawn; only the newest is kept
    crop_moves: Arc<LatestWins<CropHandleMove>>,
    tool_router: ToolRouter<Self>,
    config: Arc<ServerConfig>,
}

// ============================================================================
// Shared request/response pieces
// ============================================================================

/// Where to save outputs besides the cache
#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct OutputParams {
    /// Save a single output file to this path
    #[serde(default)]
    pub output_path: Option<String>,
    /// Save every output file into this directory under its generated name
    #[serde(default)]
    pub output_dir: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OutputFileInfo {
    pub name: String,
    pub mime_type: String,
    pub size: usize,
    /// Cache key for chaining; absent when the file exceeded the cache budget
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OperationResult {
    pub operation: String,
    pub source: String,
    pub outputs: Vec<OutputFileInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compressed_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reduction_percent: Option<f64>,
    /// Extracted text, for text outputs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OperationResult {
    fn failed(operation: &str, source: String, error: String) -> Self {
        Self {
            operation: operation.to_string(),
            source,
            outputs: vec![],
            original_size: None,
            compressed_size: None,
            reduction_percent: None,
            text: None,
            error: Some(error),
        }
    }
}

fn respond<T: Serialize>(result: T) -> String {
    let response = serde_json::json!({ "results": [result] });
    serde_json::to_string_pretty(&response).unwrap_or_default()
}

// ============================================================================
// Tool parameters
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct MergePdfsParams {
    /// PDFs to combine, in order
    pub sources: Vec<FileSource>,
    #[serde(flatten)]
    pub output: OutputParams,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SplitPdfParams {
    pub source: FileSource,
    /// Password for an encrypted source
    #[serde(default)]
    pub password: Option<String>,
    #[serde(flatten)]
    pub output: OutputParams,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct PageSelectionParams {
    pub source: FileSource,
    /// 1-based page numbers as a list (`[3, 1]`) or a range expression (`"1-3,5"`, `"z"`, `"r2"`, `"1-z:odd"`)
    pub pages: PageSpec,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(flatten)]
    pub output: OutputParams,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RotatePagesParams {
    pub source: FileSource,
    /// Degrees to add to the current rotation; multiples of 90 display correctly
    pub degrees: i64,
    /// Pages to rotate, all when omitted
    #[serde(default)]
    pub pages: Option<PageSpec>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(flatten)]
    pub output: OutputParams,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CropPagesParams {
    pub source: FileSource,
    /// Margins in points removed from each side of every page
    pub margins: Margins,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(flatten)]
    pub output: OutputParams,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ResizePagesParams {
    pub source: FileSource,
    /// "A4", "Letter", "Legal", "A3", "A5" or "Tabloid"; unknown names mean A4
    pub page_size: PageSize,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(flatten)]
    pub output: OutputParams,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AddPageNumbersParams {
    pub source: FileSource,
    #[serde(flatten)]
    pub options: PageNumberOptions,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(flatten)]
    pub output: OutputParams,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AddHeaderFooterParams {
    pub source: FileSource,
    #[serde(flatten)]
    pub options: HeaderFooterOptions,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(flatten)]
    pub output: OutputParams,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AddWatermarkParams {
    pub source: FileSource,
    /// PNG or JPEG for image watermarks
    #[serde(default)]
    pub image: Option<FileSource>,
    #[serde(flatten)]
    pub options: WatermarkOptions,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(flatten)]
    pub output: OutputParams,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AddSignatureParams {
    pub source: FileSource,
    /// PNG or JPEG signature image
    pub image: FileSource,
    #[serde(flatten)]
    pub options: SignatureOptions,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(flatten)]
    pub output: OutputParams,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct PdfToImagesParams {
    pub source: FileSource,
    /// "jpg" (default) or "png"
    #[serde(default)]
    pub format: RasterFormat,
    /// Render scale, 2.5 by default
    #[serde(default)]
    pub scale: Option<f32>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(flatten)]
    pub output: OutputParams,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ImagesToPdfParams {
    /// PNG or JPEG images, one page each
    pub sources: Vec<FileSource>,
    #[serde(flatten)]
    pub output: OutputParams,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SingleSourceParams {
    pub source: FileSource,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(flatten)]
    pub output: OutputParams,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct EditMetadataParams {
    pub source: FileSource,
    #[serde(flatten)]
    pub update: MetadataUpdate,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(flatten)]
    pub output: OutputParams,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ProtectPdfParams {
    pub source: FileSource,
    /// Password required to open the PDF
    pub user_password: String,
    /// Password required to change permissions; defaults to the user password
    #[serde(default)]
    pub owner_password: Option<String>,
    /// "full" (default), "low" or "none"
    #[serde(default)]
    pub allow_print: PrintLevel,
    #[serde(default = "default_true")]
    pub allow_copy: bool,
    #[serde(default = "default_true")]
    pub allow_modify: bool,
    /// Password of the source, if it is already encrypted
    #[serde(default)]
    pub password: Option<String>,
    #[serde(flatten)]
    pub output: OutputParams,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UnprotectPdfParams {
    pub source: FileSource,
    pub password: String,
    #[serde(flatten)]
    pub output: OutputParams,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetPageInfoParams {
    pub sources: Vec<FileSource>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PageInfoEntry {
    /// 1-based
    pub page: usize,
    pub width: f64,
    pub height: f64,
    pub rotation: u16,
    pub media_box: Rect,
    pub crop_box: Rect,
}

#[derive(Debug, Serialize)]
pub struct GetPageInfoResult {
    pub source: String,
    pub page_count: usize,
    pub pages: Vec<PageInfoEntry>,
    pub metadata: Metadata,
    pub encrypted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn default_preview_width() -> u32 {
    800
}

fn default_preview_height() -> u32 {
    1000
}

fn default_preview_scale() -> f32 {
    2.0
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RenderPreviewParams {
    pub source: FileSource,
    /// 1-based page, default 1
    #[serde(default)]
    pub page: Option<u32>,
    /// Extra rotation in degrees on top of the page's own
    #[serde(default)]
    pub rotation: i64,
    #[serde(default = "default_preview_width")]
    pub max_width: u32,
    #[serde(default = "default_preview_height")]
    pub max_height: u32,
    /// Upper bound on the render scale
    #[serde(default = "default_preview_scale")]
    pub max_scale: f32,
    /// Crop margins in points from the media box edges, as the crop tool takes
    /// them; the area outside is shaded
    #[serde(default)]
    pub crop: Option<Margins>,
    /// A crop handle dragged on the previous preview, in its pixels
    #[serde(default)]
    pub crop_drag: Option<CropHandleMove>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RenderPreviewResult {
    pub source: String,
    pub page: usize,
    pub width: u32,
    pub height: u32,
    pub mime_type: String,
    pub data_base64: String,
    pub state: PreviewState,
    /// Crop margins in points after any handle drag
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crop: Option<Margins>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// Tool implementations
// ============================================================================

#[tool_router]
impl PdfToolsServer {
    pub fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    pub fn with_config(config: ServerConfig) -> Self {
        Self {
            engine: Arc::new(Engine::new(config.engine.clone())),
            cache: Arc::new(CacheManager::new(config.cache_max_entries, config.cache_max_bytes)),
            preview: Arc::new(parking_lot::Mutex::new(PreviewSession::new())),
            crop_moves: Arc::new(LatestWins::new()),
            tool_router: Self::tool_router(),
            config: Arc::new(config),
        }
    }

    #[tool(description = "Merge several PDFs into one, pages in input order. Every output is cached (cache_key) for chaining.")]
    async fn merge_pdfs(&self, Parameters(params): Parameters<MergePdfsParams>) -> String {
        let sources: Vec<&FileSource> = params.sources.iter().collect();
        self.run_tool(Operation::Merge, &sources, None, &params.output).await
    }

    #[tool(description = "Split a PDF into one single-page PDF per page, named <base>_page_<n>.pdf.")]
    async fn split_pdf(&self, Parameters(params): Parameters<SplitPdfParams>) -> String {
        self.run_tool(Operation::Split, &[&params.source], params.password.as_deref(), &params.output)
            .await
    }

    #[tool(description = "Keep only the listed pages, in the order listed.

Pages: a list of 1-based numbers ([3, 1]) or a range expression: \"1-3,5\", \"z\" (last page), \"r2\" (second to last), \"3-1\" (reverse), \"1-z:even\".")]
    async fn extract_pages(&self, Parameters(params): Parameters<PageSelectionParams>) -> String {
        let op = Operation::ExtractPages {
            pages: params.pages.clone(),
        };
        self.run_tool(op, &[&params.source], params.password.as_deref(), &params.output)
            .await
    }

    #[tool(description = "Remove the listed pages and keep the rest in their original order. Removing every page is an error.")]
    async fn delete_pages(&self, Parameters(params): Parameters<PageSelectionParams>) -> String {
        let op = Operation::DeletePages {
            pages: params.pages.clone(),
        };
        self.run_tool(op, &[&params.source], params.password.as_deref(), &params.output)
            .await
    }

    #[tool(description = "Rebuild the PDF with pages in exactly the given order. Omitted pages are dropped and repeated pages are duplicated.")]
    async fn organize_pages(&self, Parameters(params): Parameters<PageSelectionParams>) -> String {
        let op = Operation::OrganizePages {
            order: params.pages.clone(),
        };
        self.run_tool(op, &[&params.source], params.password.as_deref(), &params.output)
            .await
    }

    #[tool(description = "Add a rotation (degrees, may be negative) to all or selected pages.")]
    async fn rotate_pages(&self, Parameters(params): Parameters<RotatePagesParams>) -> String {
        let op = Operation::Rotate {
            degrees: params.degrees,
            pages: params.pages.clone(),
        };
        self.run_tool(op, &[&params.source], params.password.as_deref(), &params.output)
            .await
    }

    #[tool(description = "Crop every page by margins in points (top, right, bottom, left). Fails without changes if any page would become empty.")]
    async fn crop_pages(&self, Parameters(params): Parameters<CropPagesParams>) -> String {
        let op = Operation::Crop {
            margins: params.margins,
        };
        self.run_tool(op, &[&params.source], params.password.as_deref(), &params.output)
            .await
    }

    #[tool(description = "Set every page to a named paper size (A4, Letter, Legal, A3, A5, Tabloid). Content is not scaled.")]
    async fn resize_pages(&self, Parameters(params): Parameters<ResizePagesParams>) -> String {
        let op = Operation::Resize {
            page_size: params.page_size,
        };
        self.run_tool(op, &[&params.source], params.password.as_deref(), &params.output)
            .await
    }

    #[tool(description = "Stamp page numbers. position: top-left, top-center, top-right, bottom-left, bottom-center (default), bottom-right. format: number, page_of_total, roman.")]
    async fn add_page_numbers(&self, Parameters(params): Parameters<AddPageNumbersParams>) -> String {
        let op = Operation::AddPageNumbers(params.options.clone());
        self.run_tool(op, &[&params.source], params.password.as_deref(), &params.output)
            .await
    }

    #[tool(description = "Add a header and/or footer to every page. {page} and {total} are replaced per page.")]
    async fn add_header_footer(&self, Parameters(params): Parameters<AddHeaderFooterParams>) -> String {
        let op = Operation::AddHeaderFooter(params.options.clone());
        self.run_tool(op, &[&params.source], params.password.as_deref(), &params.output)
            .await
    }

    #[tool(description = "Watermark every page with text (kind \"text\") or an image (kind \"image\", pass image). layout: centered or tiled. Opacity, rotation, font size, color (#RRGGBB) and tile spacing are optional.")]
    async fn add_watermark(&self, Parameters(params): Parameters<AddWatermarkParams>) -> String {
        let op = Operation::AddWatermark(params.options.clone());
        let mut sources = vec![&params.source];
        if params.options.kind == WatermarkKind::Image {
            if let Some(image) = &params.image {
                sources.push(image);
            }
        }
        self.run_tool(op, &sources, params.password.as_deref(), &params.output)
            .await
    }

    #[tool(description = "Place a PNG or JPEG signature in a corner (top-left, top-right, bottom-left, bottom-right) of one page, the last page by default.")]
    async fn add_signature(&self, Parameters(params): Parameters<AddSignatureParams>) -> String {
        let op = Operation::AddSignature(params.options.clone());
        self.run_tool(
            op,
            &[&params.source, &params.image],
            params.password.as_deref(),
            &params.output,
        )
        .await
    }

    #[tool(description = "Render every page to JPG or PNG, one file per page named <base>_page_<n>.<ext>.")]
    async fn pdf_to_images(&self, Parameters(params): Parameters<PdfToImagesParams>) -> String {
        if let Some(scale) = params.scale {
            if scale <= 0.0 || scale > self.config.max_image_scale {
                let err = Error::ImageDimensionExceeded {
                    detail: format!(
                        "scale must be between 0.0 (exclusive) and {} (inclusive), got {}",
                        self.config.max_image_scale, scale
                    ),
                };
                return respond(OperationResult::failed(
                    "pdf_to_images",
                    Self::source_name(&params.source),
                    err.client_message(),
                ));
            }
        }
        let op = Operation::ConvertToImages {
            format: params.format,
            scale: params.scale,
        };
        self.run_tool(op, &[&params.source], params.password.as_deref(), &params.output)
            .await
    }

    #[tool(description = "Build a PDF from PNG or JPEG images, one A4 page per image, fitted inside 10 mm margins.")]
    async fn images_to_pdf(&self, Parameters(params): Parameters<ImagesToPdfParams>) -> String {
        let sources: Vec<&FileSource> = params.sources.iter().collect();
        self.run_tool(Operation::ImagesToPdf, &sources, None, &params.output)
            .await
    }

    #[tool(description = "Rewrite the PDF with object streams and compressed streams. Reports original and compressed sizes.")]
    async fn compress_pdf(&self, Parameters(params): Parameters<SingleSourceParams>) -> String {
        self.run_tool(Operation::Compress, &[&params.source], params.password.as_deref(), &params.output)
            .await
    }

    #[tool(description = "Set document information fields. Empty fields are left unchanged; keywords are comma-separated.")]
    async fn edit_metadata(&self, Parameters(params): Parameters<EditMetadataParams>) -> String {
        let op = Operation::EditMetadata(params.update.clone());
        self.run_tool(op, &[&params.source], params.password.as_deref(), &params.output)
            .await
    }

    #[tool(description = "Burn form field appearances into the page content and remove the form. A PDF without a form is returned unchanged.")]
    async fn flatten_pdf(&self, Parameters(params): Parameters<SingleSourceParams>) -> String {
        self.run_tool(Operation::Flatten, &[&params.source], params.password.as_deref(), &params.output)
            .await
    }

    #[tool(description = "Extract plain text, each page preceded by a --- Page N --- separator.")]
    async fn extract_text(&self, Parameters(params): Parameters<SingleSourceParams>) -> String {
        self.run_tool(Operation::ExtractText, &[&params.source], params.password.as_deref(), &params.output)
            .await
    }

    #[tool(description = "Add password protection (256-bit AES). allow_print: full, low or none.")]
    async fn protect_pdf(&self, Parameters(params): Parameters<ProtectPdfParams>) -> String {
        let result = self.process_protect_pdf(&params).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "protect_pdf failed");
            OperationResult::failed("protect", Self::source_name(&params.source), e.client_message())
        });
        respond(result)
    }

    #[tool(description = "Remove password protection. Requires the correct password.")]
    async fn unprotect_pdf(&self, Parameters(params): Parameters<UnprotectPdfParams>) -> String {
        let result = self.process_unprotect_pdf(&params).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "unprotect_pdf failed");
            OperationResult::failed("unprotect", Self::source_name(&params.source), e.client_message())
        });
        respond(result)
    }

    #[tool(description = "Page count, per-page size, rotation, media and crop boxes, and document information.")]
    async fn get_page_info(&self, Parameters(params): Parameters<GetPageInfoParams>) -> String {
        let mut results = Vec::new();
        for source in &params.sources {
            let result = self
                .process_get_page_info(source, params.password.as_deref())
                .await
                .unwrap_or_else(|e| {
                    tracing::warn!(error = %e, "get_page_info failed");
                    GetPageInfoResult {
                        source: Self::source_name(source),
                        page_count: 0,
                        pages: vec![],
                        metadata: Metadata::default(),
                        encrypted: false,
                        error: Some(e.client_message()),
                    }
                });
            results.push(result);
        }
        let response = serde_json::json!({ "results": results });
        serde_json::to_string_pretty(&response).unwrap_or_default()
    }

    #[tool(description = "Render one page as a PNG preview fitted into max_width x max_height. A newer preview request supersedes one still rendering. Optional crop margins shade the area that would be removed.")]
    async fn render_preview(&self, Parameters(params): Parameters<RenderPreviewParams>) -> String {
        let result = self.process_render_preview(&params).await.unwrap_or_else(|e| {
            match e {
                Error::RenderCancelled => tracing::debug!("preview superseded"),
                ref other => tracing::warn!(error = %other, "render_preview failed"),
            }
            RenderPreviewResult {
                source: Self::source_name(&params.source),
                page: params.page.unwrap_or(1) as usize,
                width: 0,
                height: 0,
                mime_type: String::new(),
                data_base64: String::new(),
                state: self.preview.lock().state(),
                crop: None,
                error: Some(e.client_message()),
            }
        });
        respond(result)
    }
}

impl PdfToolsServer {
    fn source_name(source: &FileSource) -> String {
        match source {
            FileSource::Path { path } => path.clone(),
            FileSource::Base64 { name, .. } => match name {
                Some(name) => format!("<base64:{}>", name),
                None => "<base64>".to_string(),
            },
            FileSource::CacheRef { cache_key } => format!("<cache:{}>", cache_key),
        }
    }

    fn resolve_source(&self, source: &FileSource) -> crate::error::Result<ResolvedFile> {
        match source {
            FileSource::Path { path } => {
                let checked = self.validate_path_access(path)?;
                resolve_path(checked)
            }
            FileSource::Base64 { base64, name } => resolve_base64(base64, name.as_deref()),
            FileSource::CacheRef { cache_key } => resolve_cache(cache_key, &self.cache),
        }
    }

    /// Resolve and, when a password is given, unlock the first source.
    fn resolve_inputs(
        &self,
        sources: &[&FileSource],
        password: Option<&str>,
    ) -> crate::error::Result<Vec<InputFile>> {
        let mut inputs = sources
            .iter()
            .map(|s| self.resolve_source(s).map(ResolvedFile::into_input))
            .collect::<crate::error::Result<Vec<_>>>()?;
        if let (Some(password), Some(first)) = (password, inputs.first_mut()) {
            first.data = security::decrypt(&first.data, password)?;
        }
        Ok(inputs)
    }

    /// Validate that a path is within allowed resource directories.
    /// If no resource_dirs are configured, all paths are allowed.
    fn validate_path_access(&self, path: &str) -> crate::error::Result<PathBuf> {
        if self.config.resource_dirs.is_empty() {
            return Ok(PathBuf::from(path));
        }
        let canonical = std::fs::canonicalize(path).map_err(|_| Error::PathAccessDenied {
            path: path.to_string(),
        })?;
        self.inside_resource_dirs(&canonical, path)
    }

    /// Like [`Self::validate_path_access`] for files that may not exist yet.
    fn validate_output_path_access(&self, path: &str) -> crate::error::Result<PathBuf> {
        if self.config.resource_dirs.is_empty() {
            return Ok(PathBuf::from(path));
        }
        let path_obj = Path::new(path);
        let parent = match path_obj.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let file_name = path_obj.file_name().ok_or_else(|| Error::PathAccessDenied {
            path: path.to_string(),
        })?;
        let canonical_parent = std::fs::canonicalize(parent).map_err(|_| Error::PathAccessDenied {
            path: path.to_string(),
        })?;
        self.inside_resource_dirs(&canonical_parent.join(file_name), path)
    }

    fn inside_resource_dirs(&self, canonical: &Path, original: &str) -> crate::error::Result<PathBuf> {
        let allowed = self.config.resource_dirs.iter().any(|dir| {
            std::fs::canonicalize(dir)
                .map(|d| canonical.starts_with(d))
                .unwrap_or(false)
        });
        if allowed {
            Ok(canonical.to_path_buf())
        } else {
            Err(Error::PathAccessDenied {
                path: original.to_string(),
            })
        }
    }

    /// Write `data` to `path` after the sandbox check, creating parent directories.
    fn write_output(&self, path: &str, data: &[u8]) -> crate::error::Result<String> {
        let target = self.validate_output_path_access(path)?;
        if let Some(parent) = target.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&target, data)?;
        Ok(target.display().to_string())
    }

    fn output_location(output: &OutputParams, name: &str, single: bool) -> Option<String> {
        match (&output.output_path, &output.output_dir) {
            (Some(path), _) if single => Some(path.clone()),
            (_, Some(dir)) => Some(Path::new(dir).join(name).display().to_string()),
            _ => None,
        }
    }

    async fn run_tool(
        &self,
        operation: Operation,
        sources: &[&FileSource],
        password: Option<&str>,
        output: &OutputParams,
    ) -> String {
        let id = operation.id();
        let result = self
            .process_operation(operation, sources, password, output)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(operation = id, error = %e, "operation failed");
                let source = sources
                    .first()
                    .map(|s| Self::source_name(s))
                    .unwrap_or_default();
                OperationResult::failed(id, source, e.client_message())
            });
        respond(result)
    }

    pub async fn process_operation(
        &self,
        operation: Operation,
        sources: &[&FileSource],
        password: Option<&str>,
        output: &OutputParams,
    ) -> crate::error::Result<OperationResult> {
        let inputs = self.resolve_inputs(sources, password)?;
        let source = sources
            .first()
            .map(|s| Self::source_name(s))
            .unwrap_or_default();
        let id = operation.id();

        let engine = self.engine.clone();
        let (result, page_counts) = tokio::task::spawn_blocking(move || {
            let result = engine.execute(&operation, &inputs)?;
            let page_counts: Vec<Option<usize>> = result
                .files()
                .iter()
                .map(|f| {
                    (f.mime_type == crate::engine::output::PDF_MIME)
                        .then(|| Document::load(&f.data).and_then(|d| d.page_count()).ok())
                        .flatten()
                })
                .collect();
            Ok::<_, Error>((result, page_counts))
        })
        .await
        .map_err(|e| Error::Rendering {
            reason: format!("Task join error: {}", e),
        })??;

        let report = match &result {
            OperationOutput::Compressed { report, .. } => Some(*report),
            _ => None,
        };
        let files = result.into_files();
        let single = files.len() == 1;
        let mut text = None;
        let mut outputs = Vec::with_capacity(files.len());
        for (file, page_count) in files.into_iter().zip(page_counts) {
            let output_path = match Self::output_location(output, &file.name, single) {
                Some(path) => Some(self.write_output(&path, &file.data)?),
                None => None,
            };
            if file.mime_type == TEXT_MIME {
                text = Some(String::from_utf8_lossy(&file.data).into_owned());
            }
            let size = file.data.len();
            let cache_key = self
                .cache
                .insert(CachedFile::new(file.name.clone(), file.mime_type, file.data));
            outputs.push(OutputFileInfo {
                name: file.name,
                mime_type: file.mime_type.to_string(),
                size,
                cache_key,
                page_count,
                output_path,
            });
        }

        Ok(OperationResult {
            operation: id.to_string(),
            source,
            outputs,
            original_size: report.map(|r| r.original_size),
            compressed_size: report.map(|r| r.compressed_size),
            reduction_percent: report.map(|r| r.reduction_percent),
            text,
            error: None,
        })
    }

    async fn process_protect_pdf(
        &self,
        params: &ProtectPdfParams,
    ) -> crate::error::Result<OperationResult> {
        let resolved = self.resolve_source(&params.source)?;
        let source = resolved.source_name.clone();
        let data = resolved.data;
        let user_password = params.user_password.clone();
        let owner_password = params.owner_password.clone();
        let source_password = params.password.clone();
        let permissions = Permissions {
            print: params.allow_print,
            copy: params.allow_copy,
            modify: params.allow_modify,
        };

        let output_data = tokio::task::spawn_blocking(move || {
            security::encrypt(
                &data,
                &user_password,
                owner_password.as_deref(),
                permissions,
                source_password.as_deref(),
            )
        })
        .await
        .map_err(|e| Error::Qpdf {
            reason: format!("Task join error: {}", e),
        })??;

        self.finish_security_output("protect", "_protected.pdf", source, output_data, &params.output)
    }

    async fn process_unprotect_pdf(
        &self,
        params: &UnprotectPdfParams,
    ) -> crate::error::Result<OperationResult> {
        let resolved = self.resolve_source(&params.source)?;
        let source = resolved.source_name.clone();
        let data = resolved.data;
        let password = params.password.clone();

        let output_data = tokio::task::spawn_blocking(move || security::decrypt(&data, &password))
            .await
            .map_err(|e| Error::Qpdf {
                reason: format!("Task join error: {}", e),
            })??;

        self.finish_security_output("unprotect", "_unlocked.pdf", source, output_data, &params.output)
    }

    fn finish_security_output(
        &self,
        id: &str,
        suffix: &str,
        source: String,
        data: Vec<u8>,
        output: &OutputParams,
    ) -> crate::error::Result<OperationResult> {
        let name = operation_file_name(id, self.engine.config().clock.now_millis(), suffix);
        let output_path = match Self::output_location(output, &name, true) {
            Some(path) => Some(self.write_output(&path, &data)?),
            None => None,
        };
        let size = data.len();
        let cache_key = self
            .cache
            .insert(CachedFile::new(name.clone(), crate::engine::output::PDF_MIME, data));
        Ok(OperationResult {
            operation: id.to_string(),
            source,
            outputs: vec![OutputFileInfo {
                name,
                mime_type: crate::engine::output::PDF_MIME.to_string(),
                size,
                cache_key,
                page_count: None,
                output_path,
            }],
            original_size: None,
            compressed_size: None,
            reduction_percent: None,
            text: None,
            error: None,
        })
    }

    async fn process_get_page_info(
        &self,
        source: &FileSource,
        password: Option<&str>,
    ) -> crate::error::Result<GetPageInfoResult> {
        let resolved = self.resolve_source(source)?;
        let source_name = resolved.source_name.clone();
        let data = resolved.data;
        let password = password.map(str::to_string);

        tokio::task::spawn_blocking(move || {
            let encrypted = security::is_encrypted(&data)?;
            let data = match password {
                Some(pwd) if encrypted => security::decrypt(&data, &pwd)?,
                _ => data,
            };
            let doc = Document::load(&data)?;
            let pages = doc
                .pages_info()?
                .into_iter()
                .enumerate()
                .map(|(i, info)| PageInfoEntry {
                    page: i + 1,
                    width: info.width,
                    height: info.height,
                    rotation: info.rotation,
                    media_box: info.media_box,
                    crop_box: info.crop_box,
                })
                .collect::<Vec<_>>();
            Ok::<_, Error>(GetPageInfoResult {
                source: source_name,
                page_count: pages.len(),
                pages,
                metadata: doc.metadata()?,
                encrypted,
                error: None,
            })
        })
        .await
        .map_err(|e| Error::Qpdf {
            reason: format!("Task join error: {}", e),
        })?
    }

    pub async fn process_render_preview(
        &self,
        params: &RenderPreviewParams,
    ) -> crate::error::Result<RenderPreviewResult> {
        let pixel_area = params.max_width as u64 * params.max_height as u64;
        if params.max_width == 0 || params.max_height == 0 || pixel_area > self.config.max_image_pixels {
            return Err(Error::ImageDimensionExceeded {
                detail: format!(
                    "preview box {}x{} must be non-empty and at most {} pixels",
                    params.max_width, params.max_height, self.config.max_image_pixels
                ),
            });
        }
        if !(params.max_scale > 0.0 && params.max_scale <= self.config.max_image_scale) {
            return Err(Error::ImageDimensionExceeded {
                detail: format!(
                    "max_scale must be between 0.0 (exclusive) and {} (inclusive), got {}",
                    self.config.max_image_scale, params.max_scale
                ),
            });
        }
        let page_index = match params.page {
            Some(0) => return Err(Error::validation("pages are numbered from 1")),
            Some(p) => p as usize - 1,
            None => 0,
        };

        let inputs = self.resolve_inputs(&[&params.source], params.password.as_deref())?;
        let source = Self::source_name(&params.source);
        let data = inputs.into_iter().next().map(|i| i.data).unwrap_or_default();

        let rasterizer = self.engine.rasterizer()?;
        if params.crop.is_some() {
            if let Some(m) = params.crop_drag {
                self.crop_moves.submit(m);
            }
        }
        let ticket = self.preview.lock().begin_render();
        let token = ticket.token().clone();
        let (rotation, max_w, max_h, cap) = (
            params.rotation,
            params.max_width as f64,
            params.max_height as f64,
            params.max_scale as f64,
        );

        let rendered = tokio::task::spawn_blocking(move || {
            let image = rasterizer.render_thumbnail(
                &data,
                page_index,
                rotation,
                max_w,
                max_h,
                cap,
                Some(&token),
            )?;
            let info = Document::load(&data)?.page_info(page_index)?;
            Ok::<_, Error>((image, info))
        })
        .await
        .map_err(|e| Error::Rendering {
            reason: format!("Task join error: {}", e),
        })?;

        let (mut image, info) = match rendered {
            Ok(r) => r,
            Err(e) => {
                self.preview.lock().abandon(&ticket);
                return Err(e);
            }
        };
        if !self.preview.lock().finish_render(&ticket) {
            return Err(Error::RenderCancelled);
        }

        let crop = match params.crop {
            Some(margins) => {
                let overlaid = overlay_crop(
                    &mut image,
                    &info,
                    params.rotation,
                    margins,
                    params.crop_drag,
                    &self.crop_moves,
                );
                match overlaid {
                    Ok(points) => Some(points),
                    Err(e) => {
                        self.preview.lock().abandon(&ticket);
                        return Err(e);
                    }
                }
            }
            None => None,
        };

        let png = encode_image(&image, RasterFormat::Png, 100)?;
        let state = {
            let mut session = self.preview.lock();
            if !session.finish_overlay(&ticket) {
                return Err(Error::RenderCancelled);
            }
            session.state()
        };

        Ok(RenderPreviewResult {
            source,
            page: page_index + 1,
            width: image.width(),
            height: image.height(),
            mime_type: RasterFormat::Png.mime_type().to_string(),
            data_base64: base64::engine::general_purpose::STANDARD.encode(png),
            state,
            crop,
            error: None,
        })
    }
}

impl Default for PdfToolsServer {
    fn default() -> Self {
        Self::new()
    }
}

#[tool_handler]
impl ServerHandler for PdfToolsServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "PDF Tools: merge, split, reorder, rotate, crop, resize, stamp (page numbers, \
                 header/footer, watermark, signature), convert to and from images, compress, \
                 edit metadata, flatten forms, extract text and protect PDFs. Every output is \
                 cached; pass {\"cache_key\": ...} as a source to chain calls."
                    .into(),
            ),
        }
    }
}

/// Run the MCP server with configuration from the environment
pub async fn run_server() -> Result<()> {
    run_server_with_config(ServerConfig::from_env()).await
}

pub async fn run_server_with_config(config: ServerConfig) -> Result<()> {
    tracing::debug!(?config, "server configuration");
    let server = PdfToolsServer::with_config(config);

    tracing::info!("PDF Tools server ready, waiting for connections...");

    let service = server.serve(rmcp::transport::io::stdio()).await?;
    service.waiting().await?;

    Ok(())
}
