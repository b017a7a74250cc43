//! Local downscale provider (spec §4.5, §6): the one operation with no
//! allowed remote providers — it never leaves the process. Grounded on the
//! teacher's synchronous, non-network providers (the `local.rs` stand-in used
//! in tests) but actually doing pixel work instead of echoing input back.

use super::{Artifact, GenerationProvider, InvokeOutcome, OpRequest, PollOutcome};
use crate::error::{CoreError, CoreResult};
use crate::types::{Kind, Operation, ProviderId};
use async_trait::async_trait;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AspectRatioMode {
    Original,
    Square,
}

impl AspectRatioMode {
    fn parse(raw: &str) -> CoreResult<Self> {
        match raw {
            "original" => Ok(Self::Original),
            "square" => Ok(Self::Square),
            other => Err(CoreError::Validation(format!("unknown aspect_ratio_mode '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Original,
    Jpeg,
    Png,
}

impl OutputFormat {
    fn parse(raw: &str) -> CoreResult<Self> {
        match raw {
            "original" => Ok(Self::Original),
            "jpeg" => Ok(Self::Jpeg),
            "png" => Ok(Self::Png),
            other => Err(CoreError::Validation(format!("unknown output_format '{other}'"))),
        }
    }
}

pub struct DownscaleProvider;

impl DownscaleProvider {
    pub fn new() -> Self {
        Self
    }

    /// Halves dimensions repeatedly until the encoded size is within budget
    /// or further halving would degenerate to a 0px edge.
    fn shrink_to_budget(
        mut img: DynamicImage,
        max_size_mb: f64,
        format: ImageFormat,
    ) -> CoreResult<Vec<u8>> {
        let max_bytes = (max_size_mb * 1_048_576.0) as usize;
        loop {
            let mut buf = Cursor::new(Vec::new());
            img.write_to(&mut buf, format)
                .map_err(|e| CoreError::Internal(format!("encode failed: {e}")))?;
            let bytes = buf.into_inner();
            if bytes.len() <= max_bytes {
                return Ok(bytes);
            }
            let (w, h) = (img.width(), img.height());
            if w <= 16 || h <= 16 {
                // Can't shrink further without destroying the image; ship what we have.
                return Ok(bytes);
            }
            img = img.resize(w / 2, h / 2, FilterType::Lanczos3);
        }
    }

    fn crop_to_square(img: DynamicImage) -> DynamicImage {
        let (w, h) = (img.width(), img.height());
        let side = w.min(h);
        let x = (w - side) / 2;
        let y = (h - side) / 2;
        img.crop_imm(x, y, side, side)
    }
}

impl Default for DownscaleProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerationProvider for DownscaleProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Local
    }

    fn kind(&self) -> Kind {
        Kind::Images
    }

    async fn invoke(&self, op: Operation, request: &OpRequest) -> CoreResult<InvokeOutcome> {
        if op != Operation::Downscale {
            return Err(CoreError::Internal(format!("downscale provider cannot handle {op:?}")));
        }

        let input = request
            .input_images
            .first()
            .ok_or_else(|| CoreError::Validation("downscale requires one input image".to_string()))?;

        let max_size_mb = request
            .params
            .get("max_size_mb")
            .and_then(|v| v.as_f64())
            .ok_or_else(|| CoreError::Validation("max_size_mb is required".to_string()))?;
        if !(0.1..=20.0).contains(&max_size_mb) {
            return Err(CoreError::Validation(
                "max_size_mb must be between 0.1 and 20.0".to_string(),
            ));
        }

        let aspect_mode = request
            .params
            .get("aspect_ratio_mode")
            .and_then(|v| v.as_str())
            .map(AspectRatioMode::parse)
            .transpose()?
            .unwrap_or(AspectRatioMode::Original);

        let output_format = request
            .params
            .get("output_format")
            .and_then(|v| v.as_str())
            .map(OutputFormat::parse)
            .transpose()?
            .unwrap_or(OutputFormat::Original);

        let source = image::load_from_memory(input)
            .map_err(|e| CoreError::Validation(format!("not a decodable image: {e}")))?;
        let detected_format = image::guess_format(input).unwrap_or(ImageFormat::Png);

        let cropped = match aspect_mode {
            AspectRatioMode::Original => source,
            AspectRatioMode::Square => Self::crop_to_square(source),
        };

        let (target_format, content_type, name) = match output_format {
            OutputFormat::Jpeg => (ImageFormat::Jpeg, "image/jpeg", "0.jpg"),
            OutputFormat::Png => (ImageFormat::Png, "image/png", "0.png"),
            OutputFormat::Original => match detected_format {
                ImageFormat::Jpeg => (ImageFormat::Jpeg, "image/jpeg", "0.jpg"),
                _ => (ImageFormat::Png, "image/png", "0.png"),
            },
        };

        let bytes = Self::shrink_to_budget(cropped, max_size_mb, target_format)?;

        Ok(InvokeOutcome::Sync {
            artifacts: vec![Artifact {
                name: name.to_string(),
                content_type: content_type.to_string(),
                bytes,
            }],
        })
    }

    async fn poll(&self, _op: Operation, _provider_job_id: &str) -> CoreResult<PollOutcome> {
        Err(CoreError::Internal("downscale is synchronous, there is nothing to poll".to_string()))
    }
}
