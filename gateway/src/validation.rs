//! Dispatch-layer validation (spec §4.5, §4.7 step 2). Grounded on the
//! teacher's `handlers.rs` pattern of validating the parsed request before
//! calling into a service, generalized to the spec's closed enumerations
//! (provider allow-lists, multi-view positional rules, operation-specific
//! required fields) instead of the teacher's free-form parameter struct.

use crate::handlers::dispatch::GenerateRequest;
use bff_shared::error::{CoreError, CoreResult};
use bff_shared::types::{Operation, ProviderId};

/// Validates provider-endpoint compatibility and the operation's required
/// parameters. Returns the resolved `ProviderId` (or `Local` for downscale,
/// which has no caller-supplied provider).
pub fn validate(operation: Operation, req: &GenerateRequest) -> CoreResult<ProviderId> {
    let provider = resolve_provider(operation, req)?;

    match operation {
        Operation::ImageInpaint if req.mask_url.is_none() => {
            return Err(CoreError::Validation("mask_url is required for image-inpaint".to_string()));
        }
        Operation::SearchAndRecolor if req.select_prompt.is_none() => {
            return Err(CoreError::Validation(
                "select_prompt is required for search-and-recolor".to_string(),
            ));
        }
        Operation::ImageToModel => {
            validate_multi_view(&req.input_urls)?;
            return Ok(provider);
        }
        Operation::Downscale => validate_downscale_params(&req.params)?,
        _ => {}
    }

    // Every other endpoint that takes input images requires all positions
    // filled — only image-to-model's multi-view list tolerates positional
    // structure, handled above.
    if matches!(
        operation,
        Operation::ImageToImage
            | Operation::SketchToImage
            | Operation::RemoveBackground
            | Operation::ImageInpaint
            | Operation::SearchAndRecolor
            | Operation::Upscale
            | Operation::Downscale
    ) {
        if req.input_urls.is_empty() || req.input_urls.iter().any(Option::is_none) {
            return Err(CoreError::Validation(format!("{operation:?} requires at least one input image")));
        }
    }

    Ok(provider)
}

fn resolve_provider(operation: Operation, req: &GenerateRequest) -> CoreResult<ProviderId> {
    let allowed = operation.allowed_providers();

    if allowed.is_empty() {
        // Downscale: no caller-supplied provider is meaningful.
        return Ok(ProviderId::Local);
    }

    let raw = req.provider.as_deref().ok_or_else(|| {
        CoreError::Validation(format!(
            "provider is required; supported providers for this endpoint: {}",
            allowed.iter().map(|p| p.to_string()).collect::<Vec<_>>().join(", ")
        ))
    })?;

    let provider = ProviderId::parse(raw)
        .ok_or_else(|| CoreError::Validation(format!("unknown provider '{raw}'")))?;

    if !allowed.contains(&provider) {
        return Err(CoreError::Validation(format!(
            "provider '{raw}' is not supported for this endpoint; supported providers: {}",
            allowed.iter().map(|p| p.to_string()).collect::<Vec<_>>().join(", ")
        )));
    }

    Ok(provider)
}

/// Multi-view constraint (spec §4.5, §8 scenario 4): `input_image_asset_urls`
/// is interpreted positionally as `[front, left, back, right]`. Position 0
/// (front) is required; once a `null` appears no later position may be
/// non-null — `[front, left]` is valid, `[front, null, back]` is not.
fn validate_multi_view(input_urls: &[Option<String>]) -> CoreResult<()> {
    const MSG: &str = "front view required and positions must be contiguous";

    if input_urls.len() > 4 {
        return Err(CoreError::Validation(MSG.to_string()));
    }
    match input_urls.first() {
        Some(Some(_)) => {}
        _ => return Err(CoreError::Validation(MSG.to_string())),
    }

    let mut seen_gap = false;
    for slot in input_urls {
        if slot.is_none() {
            seen_gap = true;
        } else if seen_gap {
            return Err(CoreError::Validation(MSG.to_string()));
        }
    }
    Ok(())
}

fn validate_downscale_params(params: &serde_json::Value) -> CoreResult<()> {
    let max_size_mb = params
        .get("max_size_mb")
        .and_then(|v| v.as_f64())
        .ok_or_else(|| CoreError::Validation("max_size_mb is required".to_string()))?;
    if !(0.1..=20.0).contains(&max_size_mb) {
        return Err(CoreError::Validation(
            "max_size_mb must be between 0.1 and 20.0".to_string(),
        ));
    }

    if let Some(mode) = params.get("aspect_ratio_mode").and_then(|v| v.as_str()) {
        if !matches!(mode, "original" | "square") {
            return Err(CoreError::Validation(format!("unknown aspect_ratio_mode '{mode}'")));
        }
    }
    if let Some(format) = params.get("output_format").and_then(|v| v.as_str()) {
        if !matches!(format, "original" | "jpeg" | "png") {
            return Err(CoreError::Validation(format!("unknown output_format '{format}'")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(provider: Option<&str>, input_urls: Vec<Option<&str>>) -> GenerateRequest {
        GenerateRequest {
            client_task_id: "t1".to_string(),
            user_id: None,
            provider: provider.map(str::to_string),
            prompt: Some("a cat".to_string()),
            select_prompt: None,
            style: None,
            input_urls: input_urls.into_iter().map(|o| o.map(str::to_string)).collect(),
            mask_url: None,
            input_model_url: None,
            params: serde_json::json!({}),
        }
    }

    #[test]
    fn rejects_provider_outside_allowed_set() {
        let result = validate(Operation::SearchAndRecolor, &{
            let mut r = req(Some("openai-like"), vec![Some("u1")]);
            r.select_prompt = Some("a hat".to_string());
            r
        });
        assert!(matches!(result, Err(CoreError::Validation(_))));
    }

    #[test]
    fn downscale_never_needs_a_provider() {
        let mut r = req(None, vec![Some("u1")]);
        r.params = serde_json::json!({ "max_size_mb": 2.0 });
        assert_eq!(validate(Operation::Downscale, &r).unwrap(), ProviderId::Local);
    }

    #[test]
    fn multi_view_rejects_empty_list() {
        let r = req(Some("flux-like"), vec![]);
        assert!(validate_multi_view(&r.input_urls).is_err());
    }

    #[test]
    fn multi_view_rejects_gap_before_later_view() {
        let r = req(Some("flux-like"), vec![Some("front"), None, Some("back")]);
        assert!(validate_multi_view(&r.input_urls).is_err());
    }

    #[test]
    fn multi_view_allows_a_contiguous_prefix() {
        let r = req(Some("flux-like"), vec![Some("front"), Some("left")]);
        assert!(validate_multi_view(&r.input_urls).is_ok());
    }

    #[test]
    fn inpaint_requires_mask_url() {
        let r = req(Some("stability-like"), vec![Some("u1")]);
        let result = validate(Operation::ImageInpaint, &r);
        assert!(matches!(result, Err(CoreError::Validation(_))));
    }
}
