//! Operation engine
//!
//! Every operation runs as load → transform → serialize on its own copy of
//! the input bytes and either produces all of its outputs or fails without
//! producing any.

pub mod convert;
pub mod layout;
pub mod optimize;
pub mod output;
pub mod params;
pub mod stamp;
pub mod structure;

use crate::error::{Error, Result};
use crate::pdf::document::{Document, SaveOptions};
use crate::pdf::geometry::{Margins, PageSize};
use crate::pdf::overlay::OverlayImage;
use crate::pdf::pages::PageSpec;
use crate::pdf::raster::{RasterFormat, Rasterizer, RasterizerConfig};
use output::{operation_file_name, page_file_name, InputFile, OperationOutput, OutputFile, TEXT_MIME};
use params::{
    HeaderFooterOptions, MetadataUpdate, PageNumberOptions, SignatureOptions, WatermarkKind,
    WatermarkOptions,
};
use parking_lot::Mutex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A transformation and its parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum Operation {
    /// Concatenate all inputs in order
    Merge,
    /// One PDF per page
    Split,
    ExtractPages { pages: PageSpec },
    DeletePages { pages: PageSpec },
    /// Rebuild with the pages in exactly this order
    OrganizePages { order: PageSpec },
    Rotate {
        degrees: i64,
        /// All pages when unset
        #[serde(default)]
        pages: Option<PageSpec>,
    },
    Crop { margins: Margins },
    Resize { page_size: PageSize },
    AddPageNumbers(PageNumberOptions),
    AddHeaderFooter(HeaderFooterOptions),
    /// Image marks take the image from the second input
    AddWatermark(WatermarkOptions),
    /// The signature image is the second input
    AddSignature(SignatureOptions),
    ConvertToImages {
        #[serde(default)]
        format: RasterFormat,
        /// Render scale, the rasterizer's export scale when unset
        #[serde(default)]
        scale: Option<f32>,
    },
    /// Every input is a PNG or JPEG image
    ImagesToPdf,
    Compress,
    EditMetadata(MetadataUpdate),
    Flatten,
    ExtractText,
}

impl Operation {
    /// Identifier used as the prefix of output file names
    pub fn id(&self) -> &'static str {
        match self {
            Operation::Merge => "merge",
            Operation::Split => "split",
            Operation::ExtractPages { .. } => "extract-pages",
            Operation::DeletePages { .. } => "delete-pages",
            Operation::OrganizePages { .. } => "organize-pages",
            Operation::Rotate { .. } => "rotate",
            Operation::Crop { .. } => "crop",
            Operation::Resize { .. } => "resize",
            Operation::AddPageNumbers(_) => "add-page-numbers",
            Operation::AddHeaderFooter(_) => "header-footer",
            Operation::AddWatermark(_) => "add-watermark",
            Operation::AddSignature(_) => "add-signature",
            Operation::ConvertToImages {
                format: RasterFormat::Jpg,
                ..
            } => "pdf-to-jpg",
            Operation::ConvertToImages {
                format: RasterFormat::Png,
                ..
            } => "pdf-to-png",
            Operation::ImagesToPdf => "jpg-to-pdf",
            Operation::Compress => "compress",
            Operation::EditMetadata(_) => "edit-metadata",
            Operation::Flatten => "flatten",
            Operation::ExtractText => "extract-text",
        }
    }

    /// Appended to `<id>_<timestamp>` for single-file outputs
    pub fn suffix(&self) -> &'static str {
        match self {
            Operation::Compress => "_compressed.pdf",
            Operation::ExtractText => "_text.txt",
            Operation::AddSignature(_) => "_signed.pdf",
            Operation::EditMetadata(_) => "_metadata.pdf",
            Operation::Flatten => "_flattened.pdf",
            Operation::AddHeaderFooter(_) => "_headerfooter.pdf",
            _ => ".pdf",
        }
    }

    /// Inputs the operation needs: (minimum, maximum)
    fn input_arity(&self) -> (usize, Option<usize>) {
        match self {
            Operation::Merge | Operation::ImagesToPdf => (1, None),
            Operation::AddSignature(_) => (2, Some(2)),
            Operation::AddWatermark(opts) if opts.kind == WatermarkKind::Image => (2, Some(2)),
            _ => (1, Some(1)),
        }
    }
}

/// Source of the timestamp in output file names
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Clock {
    #[default]
    System,
    /// Always this many milliseconds since the epoch
    Fixed(i64),
}

impl Clock {
    pub fn now_millis(self) -> i64 {
        match self {
            Clock::System => chrono::Utc::now().timestamp_millis(),
            Clock::Fixed(ms) => ms,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineConfig {
    pub rasterizer: RasterizerConfig,
    pub clock: Clock,
}

/// Runs operations. PDFium is bound on first use, so operations that never
/// rasterize work without it.
#[derive(Debug, Default)]
pub struct Engine {
    config: EngineConfig,
    rasterizer: Mutex<Option<Rasterizer>>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            rasterizer: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn rasterizer(&self) -> Result<Rasterizer> {
        let mut slot = self.rasterizer.lock();
        if let Some(rasterizer) = slot.as_ref() {
            return Ok(rasterizer.clone());
        }
        let rasterizer = Rasterizer::new(self.config.rasterizer.clone())?;
        *slot = Some(rasterizer.clone());
        Ok(rasterizer)
    }

    /// Run `operation` on `inputs`.
    pub fn execute(&self, operation: &Operation, inputs: &[InputFile]) -> Result<OperationOutput> {
        let (min, max) = operation.input_arity();
        if inputs.len() < min || max.is_some_and(|max| inputs.len() > max) {
            return Err(Error::validation(format!(
                "{} expects {} input file(s), got {}",
                operation.id(),
                match max {
                    Some(max) if max == min => min.to_string(),
                    Some(max) => format!("{}-{}", min, max),
                    None => format!("at least {}", min),
                },
                inputs.len()
            )));
        }

        let output = self.dispatch(operation, inputs)?;

        let files = output.files();
        tracing::info!(
            operation = operation.id(),
            inputs = inputs.len(),
            outputs = files.len(),
            bytes = files.iter().map(|f| f.data.len()).sum::<usize>(),
            "operation complete"
        );
        Ok(output)
    }

    fn dispatch(&self, operation: &Operation, inputs: &[InputFile]) -> Result<OperationOutput> {
        let primary = &inputs[0];
        let name = operation_file_name(operation.id(), self.config.clock.now_millis(), operation.suffix());

        let result = match operation {
            Operation::Merge => {
                let docs = inputs
                    .iter()
                    .map(|f| Document::load(&f.data))
                    .collect::<Result<Vec<_>>>()?;
                structure::merge(&docs)?
            }
            Operation::Split => {
                let doc = Document::load(&primary.data)?;
                let base = primary.base_name();
                let files = structure::split(&doc, base)?
                    .iter()
                    .enumerate()
                    .map(|(i, part)| {
                        Ok(OutputFile::pdf(
                            page_file_name(base, i + 1, "pdf"),
                            part.serialize(SaveOptions::default())?,
                        ))
                    })
                    .collect::<Result<Vec<_>>>()?;
                return Ok(OperationOutput::Multiple(files));
            }
            Operation::ExtractPages { pages } => {
                structure::extract_pages(&Document::load(&primary.data)?, pages)?
            }
            Operation::DeletePages { pages } => {
                structure::delete_pages(&Document::load(&primary.data)?, pages)?
            }
            Operation::OrganizePages { order } => {
                structure::organize_pages(&Document::load(&primary.data)?, order)?
            }
            Operation::Rotate { degrees, pages } => {
                let mut doc = Document::load(&primary.data)?;
                layout::rotate(&mut doc, *degrees, pages.as_ref())?;
                doc
            }
            Operation::Crop { margins } => {
                let mut doc = Document::load(&primary.data)?;
                layout::crop(&mut doc, *margins)?;
                doc
            }
            Operation::Resize { page_size } => {
                layout::resize(&Document::load(&primary.data)?, *page_size)?
            }
            Operation::AddPageNumbers(options) => {
                let mut doc = Document::load(&primary.data)?;
                stamp::add_page_numbers(&mut doc, options)?;
                doc
            }
            Operation::AddHeaderFooter(options) => {
                let mut doc = Document::load(&primary.data)?;
                stamp::add_header_footer(&mut doc, options)?;
                doc
            }
            Operation::AddWatermark(options) => {
                let image = match options.kind {
                    WatermarkKind::Image => Some(Self::overlay_image(inputs)?),
                    WatermarkKind::Text => None,
                };
                let mut doc = Document::load(&primary.data)?;
                stamp::add_watermark(&mut doc, options, image)?;
                doc
            }
            Operation::AddSignature(options) => {
                let image = Self::overlay_image(inputs)?;
                let mut doc = Document::load(&primary.data)?;
                stamp::add_signature(&mut doc, options, image)?;
                doc
            }
            Operation::ConvertToImages { format, scale } => {
                // Surface a corrupt input as such rather than as a render failure
                Document::load(&primary.data)?;
                let rasterizer = self.rasterizer()?;
                let scale = scale.unwrap_or(rasterizer.config().export_scale);
                let files = convert::pdf_to_images(
                    &rasterizer,
                    &primary.data,
                    primary.base_name(),
                    *format,
                    scale,
                )?;
                return Ok(OperationOutput::Multiple(files));
            }
            Operation::ImagesToPdf => convert::images_to_pdf(inputs)?,
            Operation::Compress => {
                let doc = Document::load(&primary.data)?;
                let (data, report) = optimize::compress(&doc, primary.data.len())?;
                return Ok(OperationOutput::Compressed {
                    file: OutputFile::pdf(name, data),
                    report,
                });
            }
            Operation::EditMetadata(update) => {
                let mut doc = Document::load(&primary.data)?;
                optimize::edit_metadata(&mut doc, update)?;
                doc
            }
            Operation::Flatten => {
                let mut doc = Document::load(&primary.data)?;
                optimize::flatten(&mut doc)?;
                doc
            }
            Operation::ExtractText => {
                Document::load(&primary.data)?;
                let text = convert::extract_text(&self.rasterizer()?, &primary.data)?;
                return Ok(OperationOutput::Single(OutputFile {
                    name,
                    data: text.into_bytes(),
                    mime_type: TEXT_MIME,
                }));
            }
        };

        let data = result.serialize(SaveOptions::default())?;
        Ok(OperationOutput::Single(OutputFile::pdf(name, data)))
    }

    fn overlay_image(inputs: &[InputFile]) -> Result<Arc<OverlayImage>> {
        let file = inputs
            .get(1)
            .ok_or_else(|| Error::validation("an image input is required"))?;
        Ok(Arc::new(OverlayImage::decode(&file.data)?))
    }
}
