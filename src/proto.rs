//! Cloud assembly wire types
//!
//! Serde models for the artifacts a CDK synthesis writes to its output directory:
//! the construct tree (`tree.json`), the assembly manifest with per-stack metadata
//! (`manifest.json`) and the policy validation report
//! (`policy-validation-report.json`). Fields the correlation engine never reads are
//! left out; serde ignores them.
//!
//! Every optional collection defaults to empty so a partially written artifact still
//! deserializes. Missing data is then handled downstream as "no result" rather than
//! as a parse failure.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metadata entry type carrying a resource's logical id.
pub const LOGICAL_ID_METADATA: &str = "aws:cdk:logicalId";

pub const STACK_ARTIFACT: &str = "aws:cloudformation:stack";

pub const NESTED_ASSEMBLY_ARTIFACT: &str = "cdk:cloud-assembly";

pub const MANIFEST_FILE: &str = "manifest.json";

pub const TREE_FILE: &str = "tree.json";

pub const REPORT_FILE: &str = "policy-validation-report.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeDocument {
    #[serde(default)]
    pub version: String,

    pub tree: RawNode,
}

/// One construct as recorded in `tree.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawNode {
    pub id: String,

    #[serde(default)]
    pub path: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub construct_info: Option<ConstructInfo>,

    /// Ordered by construct id; the order of `tree.json` is not kept.
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub children: BTreeMap<String, RawNode>,
}

impl RawNode {
    /// Key of this construct in the per-stack metadata maps.
    pub fn metadata_path(&self) -> String {
        format!("/{}", self.path)
    }

    /// First child in id order. Stands in for "the" child on single-chain descents.
    pub fn first_child(&self) -> Option<&RawNode> {
        self.children.values().next()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstructInfo {
    pub fqn: String,

    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataEntry {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data: Option<serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub trace: Option<Vec<String>>,
}

impl MetadataEntry {
    pub fn is_logical_id(&self) -> bool {
        self.kind == LOGICAL_ID_METADATA
    }

    pub fn logical_id(&self) -> Option<&str> {
        if !self.is_logical_id() {
            return None;
        }
        self.data.as_ref().and_then(|data| data.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssemblyManifest {
    #[serde(default)]
    pub version: String,

    /// Ordered by artifact name, so metadata merges follow name order rather than
    /// the order of the manifest file.
    #[serde(default)]
    pub artifacts: BTreeMap<String, ArtifactManifest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactManifest {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub properties: ArtifactProperties,

    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub metadata: BTreeMap<String, Vec<MetadataEntry>>,
}

impl ArtifactManifest {
    pub fn is_stack(&self) -> bool {
        self.kind == STACK_ARTIFACT
    }

    pub fn is_nested_assembly(&self) -> bool {
        self.kind == NESTED_ASSEMBLY_ARTIFACT
    }
}

/// Union of the property bags of the artifact kinds we follow.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactProperties {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub template_file: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub directory_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub plugin_reports: Vec<PluginReport>,
}

impl ValidationReport {
    pub fn violations(&self) -> impl Iterator<Item = &Violation> {
        self.plugin_reports
            .iter()
            .flat_map(|report| report.violations.iter())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginReport {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub summary: Option<serde_json::Value>,

    #[serde(default)]
    pub violations: Vec<Violation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    pub rule_name: String,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub fix: Option<String>,

    #[serde(default)]
    pub violating_constructs: Vec<ViolatingConstruct>,
}

impl Violation {
    /// Every raw location of every violating construct, outermost construct first.
    pub fn locations(&self) -> Vec<&str> {
        self.violating_constructs
            .iter()
            .filter_map(|construct| construct.construct_stack.as_ref())
            .flat_map(|stack| stack.locations())
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolatingConstruct {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub construct_stack: Option<ConstructTrace>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub construct_path: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub template_path: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub resource_logical_id: Option<String>,
}

/// Construct stack as embedded in the validation report. Same shape as a
/// reconstructed trace chain: `child` points toward the violating resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstructTrace {
    pub id: String,

    #[serde(default)]
    pub path: String,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub construct: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub library_version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub location: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub child: Option<Box<ConstructTrace>>,
}

impl ConstructTrace {
    pub fn locations(&self) -> Vec<&str> {
        let mut locations = Vec::new();
        let mut current = Some(self);
        while let Some(trace) = current {
            if let Some(location) = trace.location.as_deref() {
                locations.push(location);
            }
            current = trace.child.as_deref();
        }
        locations
    }
}
