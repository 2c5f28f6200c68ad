//! Translation of canonical function docs into provider tool payloads

pub mod name_map;
pub mod schema;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::types::FunctionDoc;
pub use name_map::{NameMap, sanitize_name};
pub use schema::{OpenApiCaster, PropertyCaster, Verbatim};

/// Shape of the tool entries a provider expects
#[derive(Deserialize, Serialize, Debug, Clone, Copy, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ToolStyle {
    /// `{"type": "function", "function": {name, description, parameters}}`
    #[default]
    Structured,
    /// `{"type": "function", name, description, parameters}`
    Flat,
}

/// JSON schema of a tool's parameters
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ToolParameters {
    #[serde(rename = "type")]
    pub schema_type: String,
    pub properties: Map<String, Value>,
    pub required: Vec<String>,
}

/// Function body of a structured tool
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ToolFunction {
    pub name: String,
    pub description: String,
    pub parameters: ToolParameters,
}

/// One tool entry of a request payload
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum ToolPayload {
    Structured {
        #[serde(rename = "type")]
        tool_type: String,
        function: ToolFunction,
        #[serde(skip_serializing_if = "Option::is_none")]
        strict: Option<bool>,
    },
    Flat {
        #[serde(rename = "type")]
        tool_type: String,
        name: String,
        description: String,
        parameters: ToolParameters,
        #[serde(skip_serializing_if = "Option::is_none")]
        strict: Option<bool>,
    },
}

impl ToolPayload {
    /// Sanitized name the provider will see
    pub fn name(&self) -> &str {
        match self {
            Self::Structured { function, .. } => &function.name,
            Self::Flat { name, .. } => name,
        }
    }
}

/// Tools for one test case plus the map needed to decode their calls
#[derive(Debug, Clone, Default)]
pub struct CompiledCatalog {
    pub tools: Vec<ToolPayload>,
    pub names: NameMap,
}

/// Rewrites function docs for a test category before compilation
pub trait DocPreprocessor: Send + Sync {
    fn preprocess(&self, functions: Vec<FunctionDoc>, category: &str) -> Vec<FunctionDoc>;
}

/// Returns docs unchanged
pub struct PassthroughDocs;

impl DocPreprocessor for PassthroughDocs {
    fn preprocess(&self, functions: Vec<FunctionDoc>, _category: &str) -> Vec<FunctionDoc> {
        functions
    }
}

/// Compile function docs into a fresh tool list and name map
///
/// Names are sanitized (`.` -> `_`). When two docs sanitize to the same name
/// the first one wins in the name map; both tools are still emitted.
pub fn compile(
    functions: &[FunctionDoc],
    style: ToolStyle,
    strict: bool,
    caster: &dyn PropertyCaster,
) -> CompiledCatalog {
    let mut names = NameMap::new();
    let mut tools = Vec::with_capacity(functions.len());

    for doc in functions {
        let sanitized = sanitize_name(&doc.name);
        if !names.insert(sanitized.clone(), doc.name.clone()) {
            warn!(
                "Tool name '{}' collides with an earlier function after sanitizing to '{}'",
                doc.name, sanitized
            );
        }

        let parameters = ToolParameters {
            schema_type: "object".into(),
            properties: caster.cast(doc.parameters.properties.clone()),
            required: doc.parameters.required.clone(),
        };
        let strict = strict.then_some(true);
        let tool = match style {
            ToolStyle::Structured => ToolPayload::Structured {
                tool_type: "function".into(),
                function: ToolFunction {
                    name: sanitized,
                    description: doc.description.clone(),
                    parameters,
                },
                strict,
            },
            ToolStyle::Flat => ToolPayload::Flat {
                tool_type: "function".into(),
                name: sanitized,
                description: doc.description.clone(),
                parameters,
                strict,
            },
        };
        tools.push(tool);
    }

    debug!("Compiled {} tools ({:?} style)", tools.len(), style);
    CompiledCatalog { tools, names }
}
