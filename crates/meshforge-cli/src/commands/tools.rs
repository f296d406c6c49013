//! Tool definitions exposed to MCP clients
//!
//! Each tool maps onto one provider operation. Failures never escape as
//! protocol errors; they come back as an `isError` result whose text starts
//! with `Error: `.

use meshforge_core::ForgeError;
use meshforge_gen::{AssetProvider, JobKind, JobParams};
use serde::Serialize;
use serde_json::{json, Value};

/// A tool as advertised by `tools/list`
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: &'static str,
    pub description: &'static str,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolContent {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub text: String,
}

/// Outcome of a `tools/call`
#[derive(Debug, Clone, Serialize)]
pub struct ToolResult {
    pub content: Vec<ToolContent>,
    #[serde(rename = "isError", skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl ToolResult {
    fn text(text: String) -> Self {
        Self {
            content: vec![ToolContent { kind: "text", text }],
            is_error: false,
        }
    }

    fn error(err: &ForgeError) -> Self {
        Self {
            content: vec![ToolContent {
                kind: "text",
                text: format!("Error: {}", err),
            }],
            is_error: true,
        }
    }

    /// Text of the first content block
    pub fn first_text(&self) -> &str {
        self.content.first().map(|c| c.text.as_str()).unwrap_or("")
    }
}

/// Creation tools and the job kind each one submits
const CREATE_TOOLS: [(&str, JobKind); 7] = [
    ("meshy_create_text_to_3d", JobKind::TextTo3d),
    ("meshy_create_image_to_3d", JobKind::ImageTo3d),
    ("meshy_create_multi_image_to_3d", JobKind::MultiImageTo3d),
    ("meshy_create_remesh", JobKind::Remesh),
    ("meshy_create_retexture", JobKind::Retexture),
    ("meshy_create_rigging", JobKind::Rig),
    ("meshy_create_animation", JobKind::Animate),
];

fn ai_model_schema() -> Value {
    json!({
        "type": "string",
        "enum": ["meshy-4", "meshy-5", "latest"],
        "default": "latest"
    })
}

fn topology_schema() -> Value {
    json!({ "type": "string", "enum": ["quad", "triangle"], "default": "triangle" })
}

fn polycount_schema() -> Value {
    json!({ "type": "integer", "minimum": 100, "maximum": 300000, "default": 30000 })
}

/// All tools, in a stable order
pub fn list_tools() -> Vec<ToolInfo> {
    vec![
        ToolInfo {
            name: "meshy_create_text_to_3d",
            description: "Generate a 3D model from a text prompt. Use mode 'preview' for an \
                untextured mesh, then 'refine' with preview_task_id to texture it.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "mode": { "type": "string", "enum": ["preview", "refine"], "default": "preview" },
                    "prompt": { "type": "string", "description": "Description of the model (preview mode)" },
                    "art_style": { "type": "string", "enum": ["realistic", "sculpture"] },
                    "preview_task_id": { "type": "string", "description": "Preview task to refine" },
                    "ai_model": ai_model_schema(),
                    "topology": topology_schema(),
                    "target_polycount": polycount_schema(),
                    "should_remesh": { "type": "boolean", "default": true },
                    "enable_pbr": { "type": "boolean", "default": false }
                }
            }),
        },
        ToolInfo {
            name: "meshy_create_image_to_3d",
            description: "Generate a 3D model from a single image URL or data URI.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "image_url": { "type": "string" },
                    "ai_model": ai_model_schema(),
                    "topology": topology_schema(),
                    "target_polycount": polycount_schema(),
                    "should_remesh": { "type": "boolean", "default": true },
                    "should_texture": { "type": "boolean", "default": true },
                    "enable_pbr": { "type": "boolean", "default": false }
                },
                "required": ["image_url"]
            }),
        },
        ToolInfo {
            name: "meshy_create_multi_image_to_3d",
            description: "Generate a 3D model from 1 to 4 images of the same object.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "image_urls": {
                        "type": "array",
                        "items": { "type": "string" },
                        "minItems": 1,
                        "maxItems": 4
                    },
                    "ai_model": { "type": "string", "enum": ["meshy-5", "latest"], "default": "latest" },
                    "topology": { "type": "string", "enum": ["quad", "triangle"] },
                    "target_polycount": { "type": "integer", "minimum": 100, "maximum": 300000 },
                    "should_remesh": { "type": "boolean" },
                    "should_texture": { "type": "boolean" },
                    "enable_pbr": { "type": "boolean" }
                },
                "required": ["image_urls"]
            }),
        },
        ToolInfo {
            name: "meshy_create_remesh",
            description: "Remesh an existing model, changing topology, polycount or formats.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "input_task_id": { "type": "string" },
                    "model_url": { "type": "string" },
                    "target_formats": {
                        "type": "array",
                        "items": { "type": "string", "enum": ["glb", "fbx", "obj", "usdz", "blend", "stl"] },
                        "default": ["glb"]
                    },
                    "topology": topology_schema(),
                    "target_polycount": polycount_schema()
                }
            }),
        },
        ToolInfo {
            name: "meshy_create_retexture",
            description: "Apply new textures to an existing model from a text or image style.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "input_task_id": { "type": "string" },
                    "model_url": { "type": "string" },
                    "text_style_prompt": { "type": "string" },
                    "image_style_url": { "type": "string" },
                    "ai_model": ai_model_schema()
                }
            }),
        },
        ToolInfo {
            name: "meshy_create_rigging",
            description: "Add a humanoid skeleton to a model.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "input_task_id": { "type": "string" },
                    "model_url": { "type": "string" },
                    "height_meters": { "type": "number", "minimum": 0.1, "maximum": 100, "default": 1.7 }
                }
            }),
        },
        ToolInfo {
            name: "meshy_create_animation",
            description: "Apply a library animation to a rigged model.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "rig_task_id": { "type": "string" },
                    "action_id": { "type": "integer", "minimum": 0 }
                },
                "required": ["rig_task_id", "action_id"]
            }),
        },
        ToolInfo {
            name: "meshy_get_job",
            description: "Get the current status and outputs of a job.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "job_id": { "type": "string" },
                    "type": {
                        "type": "string",
                        "enum": JobKind::ALL.iter().map(|k| k.as_str()).collect::<Vec<_>>()
                    }
                },
                "required": ["job_id", "type"]
            }),
        },
        ToolInfo {
            name: "meshy_get_balance",
            description: "Get the current credit balance.",
            input_schema: json!({ "type": "object", "properties": {} }),
        },
    ]
}

/// Dispatch a tool call against `provider`
pub fn call_tool(provider: &dyn AssetProvider, name: &str, args: Value) -> ToolResult {
    tracing::debug!(tool = name, "Tool call");
    match run_tool(provider, name, args) {
        Ok(text) => ToolResult::text(text),
        Err(err) => {
            tracing::warn!(tool = name, error = %err, "Tool call failed");
            ToolResult::error(&err)
        }
    }
}

fn run_tool(provider: &dyn AssetProvider, name: &str, args: Value) -> meshforge_core::Result<String> {
    if let Some((_, kind)) = CREATE_TOOLS.iter().find(|(tool, _)| *tool == name) {
        let params = JobParams::from_kind_args(*kind, args)?;
        let job = provider.create_job(params)?;
        return Ok(serde_json::to_string_pretty(&job)?);
    }

    match name {
        "meshy_get_job" => {
            let job_id = string_arg(&args, "job_id")?;
            let kind: JobKind = string_arg(&args, "type")?.parse()?;
            let job = provider.get_job(job_id, Some(kind))?;
            Ok(serde_json::to_string_pretty(&job)?)
        }
        "meshy_get_balance" => {
            let balance = provider.get_balance()?;
            Ok(serde_json::to_string_pretty(&balance)?)
        }
        _ => Err(ForgeError::InvalidParams(format!("Unknown tool: {}", name))),
    }
}

fn string_arg<'a>(args: &'a Value, key: &str) -> meshforge_core::Result<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ForgeError::InvalidParams(format!("'{}' is required", key)))
}
