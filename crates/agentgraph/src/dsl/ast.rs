//! Graph description types: the JSON shape produced by authoring tools and
//! consumed by the parser.
//!
//! Mirrors `workflow/dsl/schema.rs` in spirit (tagged node enum, metadata
//! block, default-filled config) but describes a Pregel-style graph instead
//! of a task pipeline: nodes carry a `kind`, state fields carry a reducer
//! name, and edges may be conditional on a CEL-subset expression.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Top-level graph description as authored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphDescription {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub state_variables: Vec<StateVariableDef>,
    pub nodes: Vec<NodeDef>,
    #[serde(default)]
    pub edges: Vec<EdgeDef>,
    pub entry_point: String,
    #[serde(default)]
    pub finish_points: Vec<String>,
    #[serde(default)]
    pub recursion_limit: Option<u32>,
}

/// Declared state field. Reducer defaults to `"default"` (overwrite) when
/// omitted, matching the schema-inference seeding rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateVariableDef {
    pub name: String,
    #[serde(rename = "type", default = "default_type_name")]
    pub type_name: String,
    #[serde(default = "default_reducer_name")]
    pub reducer: String,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
    #[serde(default)]
    pub required: bool,
}

fn default_type_name() -> String {
    "any".to_string()
}

fn default_reducer_name() -> String {
    "default".to_string()
}

/// Node description. `id` is optional on input; the lenient parser assigns
/// one when missing (see `parser::assign_auto_ids`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDef {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(flatten)]
    pub kind: NodeKind,
}

/// The builtin node kinds a compiled graph may lower, tagged by
/// `builtin.*` name per the external DSL surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "builtin", rename_all = "snake_case")]
pub enum NodeKind {
    /// `builtin.start` — identity node. Carries no state change of its own;
    /// it exists so a graph (or a flattened loop's back-edge target) always
    /// has an unambiguous single entry with its own set of outgoing edges.
    Start,
    /// `builtin.llmagent` — invokes a referenced model with a prompt
    /// template, writes the raw and parsed response to state.
    Llmagent {
        model: String,
        #[serde(default)]
        system_prompt: Option<String>,
        #[serde(default)]
        prompt_template: Option<String>,
        #[serde(default)]
        output_field: Option<String>,
        #[serde(default)]
        output_schema: Option<serde_json::Value>,
        #[serde(default)]
        tools: Vec<String>,
        /// Explicit environment-variable name to hold this node's API key.
        /// Codegen honors this over its deterministic `<PROVIDER>_API_KEY`
        /// naming when present.
        #[serde(default)]
        env: Option<String>,
    },
    /// `builtin.transform` — evaluates a CEL-subset expression per declared
    /// output field and writes the result via `set_state`.
    Transform {
        #[serde(default)]
        set_state: HashMap<String, String>,
    },
    /// `builtin.mcp` — calls one tool on a remote MCP server and attaches
    /// the result to `node_structured[nodeId].results`. Each `arguments`
    /// value is a CEL-subset expression evaluated against `state.*`/
    /// `input.*` before the call.
    Mcp {
        server: agentgraph_kernel::McpServerConfig,
        tool: String,
        #[serde(default)]
        arguments: HashMap<String, String>,
    },
    /// `builtin.user_approval` — suspends the graph and resumes with an
    /// externally supplied value bound to `approval_field`.
    UserApproval {
        #[serde(default)]
        prompt: Option<String>,
        approval_field: String,
    },
    /// `builtin.end` — terminal marker; evaluates an optional output
    /// expression before the graph finishes.
    End {
        #[serde(default)]
        output: Option<String>,
    },
    /// `builtin.while` — loop header, flattened away at compile time into a
    /// promoted body and a conditional back-edge (see `compiler::flatten_loops`).
    While { condition: String, body: Vec<NodeDef> },
}

/// Unconditional or conditional edge between two node ids (post auto-id
/// assignment).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeDef {
    pub from: String,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub conditions: Vec<ConditionalEdgeDef>,
}

/// One arm of a conditional edge: `when` is a CEL-subset boolean
/// expression evaluated against `state.*`; the first arm that evaluates
/// true wins. An arm with no `when` is the default/else branch and must be
/// last.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionalEdgeDef {
    #[serde(default)]
    pub when: Option<String>,
    pub to: String,
}
