//! Structured creation parameters, one variant per job kind
//!
//! Tool arguments arrive as loose JSON. They are deserialized into the
//! matching variant (filling in defaults) and validated here, so providers
//! only ever see well-formed requests.

use crate::job::JobKind;
use garde::Validate;
use meshforge_core::{ForgeError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextTo3dMode {
    /// Untextured base mesh
    #[default]
    Preview,
    /// Texture a finished preview task
    Refine,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtStyle {
    Realistic,
    Sculpture,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AiModel {
    #[serde(rename = "meshy-4")]
    Meshy4,
    #[serde(rename = "meshy-5")]
    Meshy5,
    #[default]
    #[serde(rename = "latest")]
    Latest,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topology {
    Quad,
    #[default]
    Triangle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFormat {
    Glb,
    Fbx,
    Obj,
    Usdz,
    Blend,
    Stl,
}

fn default_polycount() -> u32 {
    30_000
}

fn default_true() -> bool {
    true
}

fn default_formats() -> Vec<ModelFormat> {
    vec![ModelFormat::Glb]
}

fn default_height() -> f64 {
    1.7
}

/// Text-to-3D, in either preview or refine mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct TextTo3dParams {
    #[serde(default)]
    #[garde(skip)]
    pub mode: TextTo3dMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[garde(length(min = 1))]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[garde(skip)]
    pub art_style: Option<ArtStyle>,
    /// Required in refine mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[garde(length(min = 1))]
    pub preview_task_id: Option<String>,
    #[serde(default)]
    #[garde(skip)]
    pub ai_model: AiModel,
    #[serde(default)]
    #[garde(skip)]
    pub topology: Topology,
    #[serde(default = "default_polycount")]
    #[garde(range(min = 100, max = 300_000))]
    pub target_polycount: u32,
    #[serde(default = "default_true")]
    #[garde(skip)]
    pub should_remesh: bool,
    #[serde(default)]
    #[garde(skip)]
    pub enable_pbr: bool,
}

impl TextTo3dParams {
    /// A preview request with default settings
    pub fn preview(prompt: &str) -> Self {
        Self {
            mode: TextTo3dMode::Preview,
            prompt: Some(prompt.to_string()),
            art_style: None,
            preview_task_id: None,
            ai_model: AiModel::default(),
            topology: Topology::default(),
            target_polycount: default_polycount(),
            should_remesh: true,
            enable_pbr: false,
        }
    }

    /// A refine request texturing an earlier preview task
    pub fn refine(preview_task_id: &str) -> Self {
        Self {
            mode: TextTo3dMode::Refine,
            prompt: None,
            preview_task_id: Some(preview_task_id.to_string()),
            ..Self::preview("")
        }
    }

    fn check(&self) -> std::result::Result<(), &'static str> {
        match self.mode {
            TextTo3dMode::Preview if self.prompt.as_deref().unwrap_or("").trim().is_empty() => {
                Err("preview mode requires a prompt")
            }
            TextTo3dMode::Refine if self.preview_task_id.is_none() => {
                Err("refine mode requires preview_task_id")
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ImageTo3dParams {
    /// URL or data URI of the input image
    #[garde(length(min = 1))]
    pub image_url: String,
    #[serde(default)]
    #[garde(skip)]
    pub ai_model: AiModel,
    #[serde(default)]
    #[garde(skip)]
    pub topology: Topology,
    #[serde(default = "default_polycount")]
    #[garde(range(min = 100, max = 300_000))]
    pub target_polycount: u32,
    #[serde(default = "default_true")]
    #[garde(skip)]
    pub should_remesh: bool,
    #[serde(default = "default_true")]
    #[garde(skip)]
    pub should_texture: bool,
    #[serde(default)]
    #[garde(skip)]
    pub enable_pbr: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct MultiImageTo3dParams {
    #[garde(length(min = 1, max = 4))]
    pub image_urls: Vec<String>,
    #[serde(default)]
    #[garde(skip)]
    pub ai_model: AiModel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[garde(skip)]
    pub topology: Option<Topology>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[garde(range(min = 100, max = 300_000))]
    pub target_polycount: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[garde(skip)]
    pub should_remesh: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[garde(skip)]
    pub should_texture: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[garde(skip)]
    pub enable_pbr: Option<bool>,
}

impl MultiImageTo3dParams {
    fn check(&self) -> std::result::Result<(), &'static str> {
        if self.ai_model == AiModel::Meshy4 {
            return Err("multi-image-to-3d supports only meshy-5 or latest");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct RemeshParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[garde(length(min = 1))]
    pub input_task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[garde(length(min = 1))]
    pub model_url: Option<String>,
    #[serde(default = "default_formats")]
    #[garde(length(min = 1))]
    pub target_formats: Vec<ModelFormat>,
    #[serde(default)]
    #[garde(skip)]
    pub topology: Topology,
    #[serde(default = "default_polycount")]
    #[garde(range(min = 100, max = 300_000))]
    pub target_polycount: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct RetextureParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[garde(length(min = 1))]
    pub input_task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[garde(length(min = 1))]
    pub model_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[garde(length(min = 1))]
    pub text_style_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[garde(length(min = 1))]
    pub image_style_url: Option<String>,
    #[serde(default)]
    #[garde(skip)]
    pub ai_model: AiModel,
}

impl RetextureParams {
    fn check(&self) -> std::result::Result<(), &'static str> {
        check_model_source(&self.input_task_id, &self.model_url)?;
        if self.text_style_prompt.is_none() && self.image_style_url.is_none() {
            return Err("one of text_style_prompt or image_style_url is required");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct RigParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[garde(length(min = 1))]
    pub input_task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[garde(length(min = 1))]
    pub model_url: Option<String>,
    /// Character height, used to scale the skeleton
    #[serde(default = "default_height")]
    #[garde(range(min = 0.1, max = 100.0))]
    pub height_meters: f64,
}

impl RigParams {
    /// Rig the output of an earlier task
    pub fn for_task(input_task_id: &str) -> Self {
        Self {
            input_task_id: Some(input_task_id.to_string()),
            model_url: None,
            height_meters: default_height(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct AnimateParams {
    #[garde(length(min = 1))]
    pub rig_task_id: String,
    /// Action ID from the animation library
    #[garde(skip)]
    pub action_id: u32,
}

/// Model-input kinds take exactly one of a task ID or a model URL
fn check_model_source(
    input_task_id: &Option<String>,
    model_url: &Option<String>,
) -> std::result::Result<(), &'static str> {
    match (input_task_id, model_url) {
        (Some(_), None) | (None, Some(_)) => Ok(()),
        (None, None) => Err("one of input_task_id or model_url is required"),
        (Some(_), Some(_)) => Err("input_task_id and model_url are mutually exclusive"),
    }
}

/// Creation parameters for one job, tagged by kind
#[derive(Debug, Clone, PartialEq)]
pub enum JobParams {
    TextTo3d(TextTo3dParams),
    ImageTo3d(ImageTo3dParams),
    MultiImageTo3d(MultiImageTo3dParams),
    Remesh(RemeshParams),
    Retexture(RetextureParams),
    Rig(RigParams),
    Animate(AnimateParams),
}

impl JobParams {
    pub fn kind(&self) -> JobKind {
        match self {
            JobParams::TextTo3d(_) => JobKind::TextTo3d,
            JobParams::ImageTo3d(_) => JobKind::ImageTo3d,
            JobParams::MultiImageTo3d(_) => JobKind::MultiImageTo3d,
            JobParams::Remesh(_) => JobKind::Remesh,
            JobParams::Retexture(_) => JobKind::Retexture,
            JobParams::Rig(_) => JobKind::Rig,
            JobParams::Animate(_) => JobKind::Animate,
        }
    }

    /// Parse a kind name and its raw arguments.
    ///
    /// Fails with `UnsupportedKind` when `kind` is outside the closed set and
    /// with `InvalidParams` when the arguments do not fit the kind.
    pub fn from_args(kind: &str, args: serde_json::Value) -> Result<Self> {
        let kind: JobKind = kind
            .parse()
            .map_err(|_| ForgeError::UnsupportedKind(kind.to_string()))?;
        Self::from_kind_args(kind, args)
    }

    /// Parse arguments for an already-resolved kind
    pub fn from_kind_args(kind: JobKind, args: serde_json::Value) -> Result<Self> {
        let args = if args.is_null() {
            serde_json::Value::Object(Default::default())
        } else {
            args
        };

        let params = match kind {
            JobKind::TextTo3d => JobParams::TextTo3d(decode(kind, args)?),
            JobKind::ImageTo3d => JobParams::ImageTo3d(decode(kind, args)?),
            JobKind::MultiImageTo3d => JobParams::MultiImageTo3d(decode(kind, args)?),
            JobKind::Remesh => JobParams::Remesh(decode(kind, args)?),
            JobKind::Retexture => JobParams::Retexture(decode(kind, args)?),
            JobKind::Rig => JobParams::Rig(decode(kind, args)?),
            JobKind::Animate => JobParams::Animate(decode(kind, args)?),
        };
        params.validate()?;
        Ok(params)
    }

    /// Check the parameter contract of this kind
    pub fn validate(&self) -> Result<()> {
        let fields = match self {
            JobParams::TextTo3d(p) => p.validate(),
            JobParams::ImageTo3d(p) => p.validate(),
            JobParams::MultiImageTo3d(p) => p.validate(),
            JobParams::Remesh(p) => p.validate(),
            JobParams::Retexture(p) => p.validate(),
            JobParams::Rig(p) => p.validate(),
            JobParams::Animate(p) => p.validate(),
        };
        fields.map_err(|report| self.invalid(report.to_string()))?;

        let combined = match self {
            JobParams::TextTo3d(p) => p.check(),
            JobParams::MultiImageTo3d(p) => p.check(),
            JobParams::Remesh(p) => check_model_source(&p.input_task_id, &p.model_url),
            JobParams::Retexture(p) => p.check(),
            JobParams::Rig(p) => check_model_source(&p.input_task_id, &p.model_url),
            JobParams::ImageTo3d(_) | JobParams::Animate(_) => Ok(()),
        };
        combined.map_err(|msg| self.invalid(msg.to_string()))
    }

    /// The JSON request body sent to the backend
    pub fn to_body(&self) -> Result<serde_json::Value> {
        let body = match self {
            JobParams::TextTo3d(p) => serde_json::to_value(p)?,
            JobParams::ImageTo3d(p) => serde_json::to_value(p)?,
            JobParams::MultiImageTo3d(p) => serde_json::to_value(p)?,
            JobParams::Remesh(p) => serde_json::to_value(p)?,
            JobParams::Retexture(p) => serde_json::to_value(p)?,
            JobParams::Rig(p) => serde_json::to_value(p)?,
            JobParams::Animate(p) => serde_json::to_value(p)?,
        };
        Ok(body)
    }

    fn invalid(&self, detail: String) -> ForgeError {
        ForgeError::InvalidParams(format!("{}: {}", self.kind(), detail))
    }
}

fn decode<T: DeserializeOwned>(kind: JobKind, args: serde_json::Value) -> Result<T> {
    serde_json::from_value(args)
        .map_err(|e| ForgeError::InvalidParams(format!("{}: {}", kind, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_to_3d_defaults_to_preview() {
        let params =
            JobParams::from_args("text-to-3d", json!({"prompt": "a wooden crate"})).unwrap();
        let JobParams::TextTo3d(p) = params else {
            panic!("expected text-to-3d params");
        };
        assert_eq!(p.mode, TextTo3dMode::Preview);
        assert_eq!(p.ai_model, AiModel::Latest);
        assert_eq!(p.topology, Topology::Triangle);
        assert_eq!(p.target_polycount, 30_000);
        assert!(p.should_remesh);
        assert!(!p.enable_pbr);
    }

    #[test]
    fn test_refine_requires_preview_task_id() {
        let err = JobParams::from_args("text-to-3d", json!({"mode": "refine"})).unwrap_err();
        assert!(matches!(err, ForgeError::InvalidParams(_)));

        let ok = JobParams::from_args(
            "text-to-3d",
            json!({"mode": "refine", "preview_task_id": "prev-1"}),
        );
        assert!(ok.is_ok());
    }

    #[test]
    fn test_preview_requires_prompt() {
        let err = JobParams::from_args("text-to-3d", json!({})).unwrap_err();
        assert!(matches!(err, ForgeError::InvalidParams(_)));
    }

    #[test]
    fn test_unsupported_kind() {
        let err = JobParams::from_args("bogus-kind", json!({})).unwrap_err();
        assert!(matches!(err, ForgeError::UnsupportedKind(name) if name == "bogus-kind"));
    }

    #[test]
    fn test_polycount_bounds() {
        let low = JobParams::from_args(
            "image-to-3d",
            json!({"image_url": "https://example.com/a.png", "target_polycount": 99}),
        );
        assert!(low.is_err());

        let high = JobParams::from_args(
            "image-to-3d",
            json!({"image_url": "https://example.com/a.png", "target_polycount": 300_001}),
        );
        assert!(high.is_err());

        let edge = JobParams::from_args(
            "image-to-3d",
            json!({"image_url": "https://example.com/a.png", "target_polycount": 300_000}),
        );
        assert!(edge.is_ok());
    }

    #[test]
    fn test_multi_image_count() {
        let none = JobParams::from_args("multi-image-to-3d", json!({"image_urls": []}));
        assert!(none.is_err());

        let five = JobParams::from_args(
            "multi-image-to-3d",
            json!({"image_urls": ["a", "b", "c", "d", "e"]}),
        );
        assert!(five.is_err());

        let meshy4 = JobParams::from_args(
            "multi-image-to-3d",
            json!({"image_urls": ["a"], "ai_model": "meshy-4"}),
        );
        assert!(meshy4.is_err());
    }

    #[test]
    fn test_model_source_is_exclusive() {
        let neither = JobParams::from_args("remesh", json!({}));
        assert!(neither.is_err());

        let both = JobParams::from_args(
            "rig",
            json!({"input_task_id": "abc", "model_url": "https://example.com/m.glb"}),
        );
        assert!(both.is_err());

        let rig = JobParams::from_args("rig", json!({"input_task_id": "abc"})).unwrap();
        assert_eq!(rig, JobParams::Rig(RigParams::for_task("abc")));
    }

    #[test]
    fn test_retexture_needs_style() {
        let err = JobParams::from_args("retexture", json!({"input_task_id": "abc"}));
        assert!(err.is_err());

        let ok = JobParams::from_args(
            "retexture",
            json!({"input_task_id": "abc", "text_style_prompt": "weathered bronze"}),
        );
        assert!(ok.is_ok());
    }

    #[test]
    fn test_body_omits_unset_options() {
        let body = JobParams::TextTo3d(TextTo3dParams::refine("prev-9"))
            .to_body()
            .unwrap();
        assert_eq!(body["mode"], "refine");
        assert_eq!(body["preview_task_id"], "prev-9");
        assert!(body.get("prompt").is_none());
        assert!(body.get("art_style").is_none());

        let body = JobParams::Remesh(RemeshParams {
            input_task_id: Some("abc".to_string()),
            model_url: None,
            target_formats: default_formats(),
            topology: Topology::Quad,
            target_polycount: 5_000,
        })
        .to_body()
        .unwrap();
        assert_eq!(body["target_formats"], json!(["glb"]));
        assert_eq!(body["topology"], "quad");
    }

    #[test]
    fn test_animate_requires_fields() {
        let params =
            JobParams::from_args("animate", json!({"rig_task_id": "rig-1", "action_id": 4}))
                .unwrap();
        assert_eq!(params.kind(), JobKind::Animate);

        let err = JobParams::from_args("animate", serde_json::Value::Null).unwrap_err();
        assert!(matches!(err, ForgeError::InvalidParams(_)));
    }
}
