//! Domain types shared by the gateway and the worker (spec §3, §4.5).

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantType {
    Storefront,
    App,
    Custom,
    Dev,
}

impl TenantType {
    pub fn key_prefix(&self) -> &'static str {
        match self {
            TenantType::Storefront => "sf",
            TenantType::App => "app",
            TenantType::Custom => "cus",
            TenantType::Dev => "dev",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "storefront" => Some(TenantType::Storefront),
            "app" => Some(TenantType::App),
            "custom" => Some(TenantType::Custom),
            "dev" => Some(TenantType::Dev),
            _ => None,
        }
    }
}

impl fmt::Display for TenantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TenantType::Storefront => "storefront",
            TenantType::App => "app",
            TenantType::Custom => "custom",
            TenantType::Dev => "dev",
        };
        write!(f, "{}", s)
    }
}

/// Which metadata table a row belongs to (spec §3: `images` vs `models`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    Images,
    Models,
}

impl Kind {
    pub fn table_name(&self) -> &'static str {
        match self {
            Kind::Images => "images",
            Kind::Models => "models",
        }
    }

    pub fn plural(&self) -> &'static str {
        match self {
            Kind::Images => "images",
            Kind::Models => "models",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowStatus {
    Pending,
    Processing,
    Complete,
    Failed,
}

impl RowStatus {
    /// Enforces the monotonic state machine from spec §3 invariant 2.
    pub fn can_transition_to(&self, next: RowStatus) -> bool {
        matches!(
            (self, next),
            (RowStatus::Pending, RowStatus::Processing)
                | (RowStatus::Processing, RowStatus::Complete)
                | (RowStatus::Processing, RowStatus::Failed)
        )
    }
}

impl fmt::Display for RowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RowStatus::Pending => "pending",
            RowStatus::Processing => "processing",
            RowStatus::Complete => "complete",
            RowStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Generic identifier for a third-party provider. Internal routing uses
/// these tags directly; anything client-visible must stay obfuscated
/// (spec §9) — callers render provider errors via `CoreError::sanitized_message`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderId {
    #[serde(rename = "openai-like")]
    OpenAiLike,
    #[serde(rename = "stability-like")]
    StabilityLike,
    #[serde(rename = "recraft-like")]
    RecraftLike,
    #[serde(rename = "flux-like")]
    FluxLike,
    /// Local (non-network) image processing used for downscale.
    Local,
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProviderId::OpenAiLike => "openai-like",
            ProviderId::StabilityLike => "stability-like",
            ProviderId::RecraftLike => "recraft-like",
            ProviderId::FluxLike => "flux-like",
            ProviderId::Local => "local",
        };
        write!(f, "{}", s)
    }
}

impl ProviderId {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "openai-like" => Some(ProviderId::OpenAiLike),
            "stability-like" => Some(ProviderId::StabilityLike),
            "recraft-like" => Some(ProviderId::RecraftLike),
            "flux-like" => Some(ProviderId::FluxLike),
            "local" => Some(ProviderId::Local),
            _ => None,
        }
    }
}

/// The generation operation a dispatch handler invokes (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    TextToImage,
    ImageToImage,
    SketchToImage,
    RemoveBackground,
    ImageInpaint,
    SearchAndRecolor,
    Upscale,
    Downscale,
    TextToModel,
    ImageToModel,
    RefineModel,
}

impl Operation {
    pub fn kind(&self) -> Kind {
        match self {
            Operation::TextToModel | Operation::ImageToModel | Operation::RefineModel => {
                Kind::Models
            }
            _ => Kind::Images,
        }
    }

    /// Queue family from spec §4.6.
    pub fn queue_name(&self) -> &'static str {
        match self {
            Operation::TextToModel | Operation::ImageToModel => "async_other",
            Operation::RefineModel => "async_refine",
            _ => "default",
        }
    }

    /// Route family used by the ingress rate limiter (spec §4.2).
    pub fn route_family(&self) -> &'static str {
        match self {
            Operation::Upscale => "upscale",
            Operation::Downscale => "downscale",
            Operation::RefineModel => "model_3d_refine",
            Operation::TextToModel | Operation::ImageToModel => "model_3d_other",
            _ => "image_sync",
        }
    }

    /// The closed provider allow-list per endpoint (spec §4.5 "provider
    /// selection matrix"). `Downscale` has no providers — local only.
    pub fn allowed_providers(&self) -> &'static [ProviderId] {
        use ProviderId::*;
        match self {
            Operation::TextToImage => &[OpenAiLike, StabilityLike, RecraftLike, FluxLike],
            Operation::ImageToImage => &[StabilityLike, RecraftLike, FluxLike],
            Operation::SketchToImage => &[StabilityLike, RecraftLike],
            Operation::RemoveBackground => &[RecraftLike, StabilityLike],
            Operation::ImageInpaint => &[StabilityLike, RecraftLike],
            Operation::SearchAndRecolor => &[RecraftLike],
            Operation::Upscale => &[StabilityLike, RecraftLike, FluxLike],
            Operation::Downscale => &[],
            Operation::TextToModel => &[FluxLike, StabilityLike],
            Operation::ImageToModel => &[FluxLike, StabilityLike],
            Operation::RefineModel => &[FluxLike],
        }
    }

    /// Whether the provider for this op is expected to be async (spec §4.5).
    /// Downscale is always sync (local processing).
    pub fn is_async_family(&self) -> bool {
        matches!(self, Operation::TextToModel | Operation::ImageToModel | Operation::RefineModel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_only_advances_forward() {
        assert!(RowStatus::Pending.can_transition_to(RowStatus::Processing));
        assert!(RowStatus::Processing.can_transition_to(RowStatus::Complete));
        assert!(RowStatus::Processing.can_transition_to(RowStatus::Failed));
        assert!(!RowStatus::Complete.can_transition_to(RowStatus::Processing));
        assert!(!RowStatus::Pending.can_transition_to(RowStatus::Complete));
        assert!(!RowStatus::Failed.can_transition_to(RowStatus::Complete));
    }

    #[test]
    fn operation_queue_routing_matches_spec_table() {
        assert_eq!(Operation::TextToImage.queue_name(), "default");
        assert_eq!(Operation::Downscale.queue_name(), "default");
        assert_eq!(Operation::TextToModel.queue_name(), "async_other");
        assert_eq!(Operation::ImageToModel.queue_name(), "async_other");
        assert_eq!(Operation::RefineModel.queue_name(), "async_refine");
    }

    #[test]
    fn downscale_has_no_allowed_providers() {
        assert!(Operation::Downscale.allowed_providers().is_empty());
    }
}
