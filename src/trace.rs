//! Trace reconstruction
//!
//! Synthesis only records a stack trace on the low-level resource constructs, but
//! that single trace has a frame for every enclosing construct scope as well. This
//! module walks from a construct down to the resource carrying the trace and hands
//! one frame to each level on the way, producing a chain of locations from the
//! outermost construct to the resource.
//!
//! Frame assignment is positional: the working set is the first `depth` filtered
//! frames, each level pops the last remaining frame, and the recursion continues
//! with whatever is left. Because a child chain built from a parent's leftovers
//! must not be rebuilt from scratch, chains are memoized by construct path for the
//! lifetime of one reconstructor, which in turn lives for exactly one synthesis.

use crate::{
    config::TraceConfig,
    location::{contains_vendor_marker, is_frame, SourceLocation},
    proto::{ConstructInfo, MetadataEntry, RawNode},
};
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};
use tracing::debug;

/// Per-stack metadata merged across every stack and nested assembly, keyed by
/// metadata path (`/Stack/Construct/...`).
#[derive(Debug, Clone, Default)]
pub struct StackMetadata {
    entries: HashMap<String, Vec<MetadataEntry>>,
}

impl StackMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Later merges overwrite earlier entries for the same path.
    pub fn merge(&mut self, metadata: BTreeMap<String, Vec<MetadataEntry>>) {
        self.entries.extend(metadata);
    }

    pub fn insert(&mut self, path: impl Into<String>, entries: Vec<MetadataEntry>) {
        self.entries.insert(path.into(), entries);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn logical_id(&self, metadata_path: &str) -> Option<&str> {
        self.entries
            .get(metadata_path)?
            .iter()
            .find_map(MetadataEntry::logical_id)
    }

    /// The captured trace for a path. The logical-id entry's trace is preferred since
    /// that is the one recorded on the resource itself.
    pub fn trace(&self, metadata_path: &str) -> Option<&[String]> {
        let entries = self.entries.get(metadata_path)?;
        entries
            .iter()
            .filter(|entry| entry.is_logical_id())
            .chain(entries.iter().filter(|entry| !entry.is_logical_id()))
            .find_map(|entry| entry.trace.as_deref())
    }

    pub fn has_trace(&self, metadata_path: &str) -> bool {
        self.trace(metadata_path)
            .is_some_and(|frames| !frames.is_empty())
    }
}

/// `"/<construct path>/Resource"` → logical id.
#[derive(Debug, Clone, Default)]
pub struct LogicalIdIndex {
    by_path: HashMap<String, String>,
}

impl LogicalIdIndex {
    pub fn from_metadata(metadata: &StackMetadata) -> Self {
        let by_path = metadata
            .entries
            .keys()
            .filter_map(|path| {
                metadata
                    .logical_id(path)
                    .map(|logical_id| (path.clone(), logical_id.to_string()))
            })
            .collect();
        Self { by_path }
    }

    /// Logical id of the default `Resource` child of the construct at `construct_path`.
    pub fn get(&self, construct_path: &str) -> Option<&str> {
        self.by_path
            .get(&format!("/{}/Resource", construct_path))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }
}

/// One link of a reconstructed construct stack. `next` points toward the resource
/// that carried the trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceChain {
    pub id: String,
    pub path: String,
    pub construct: Option<ConstructInfo>,
    pub location: String,
    pub next: Option<Arc<TraceChain>>,
}

impl TraceChain {
    pub fn links(&self) -> impl Iterator<Item = &TraceChain> {
        std::iter::successors(Some(self), |link| link.next.as_deref())
    }

    pub fn locations(&self) -> impl Iterator<Item = &str> {
        self.links().map(|link| link.location.as_str())
    }

    /// First parseable location starting at this link.
    pub fn first_location(&self) -> Option<SourceLocation> {
        self.locations().find_map(SourceLocation::parse)
    }

    pub fn depth(&self) -> usize {
        self.links().count()
    }
}

#[derive(Debug)]
pub struct TraceReconstructor<'a> {
    metadata: &'a StackMetadata,
    config: &'a TraceConfig,
    cache: HashMap<String, Arc<TraceChain>>,
}

impl<'a> TraceReconstructor<'a> {
    pub fn new(metadata: &'a StackMetadata, config: &'a TraceConfig) -> Self {
        Self {
            metadata,
            config,
            cache: HashMap::new(),
        }
    }

    pub fn cached_chains(&self) -> usize {
        self.cache.len()
    }

    pub fn reconstruct(&mut self, node: &RawNode) -> Arc<TraceChain> {
        if let Some(chain) = self.cache.get(&node.path) {
            return Arc::clone(chain);
        }

        let descent = self.trace_descent(node);
        let leaf = descent[descent.len() - 1];
        let mut frames = self.working_frames(leaf, descent.len());

        debug!(
            "Reconstructing trace for {} (depth {}, {} frames from {})",
            node.path,
            descent.len(),
            frames.len(),
            leaf.path
        );

        self.build_chain(&descent, &mut frames)
    }

    /// Source location of a construct, or `None` when it has no usable frame or the
    /// frame points into vendored code.
    pub fn resolve_source(&mut self, node: &RawNode) -> Option<SourceLocation> {
        let chain = self.reconstruct(node);
        let location = chain.first_location()?;
        if location.is_vendored(&self.config.vendor_markers) {
            return None;
        }
        Some(location)
    }

    fn build_chain(&mut self, descent: &[&RawNode], frames: &mut Vec<String>) -> Arc<TraceChain> {
        let node = descent[0];
        if let Some(chain) = self.cache.get(&node.path) {
            return Arc::clone(chain);
        }

        let location = frames
            .pop()
            .unwrap_or_else(|| self.config.missing_location.clone());

        let next = if descent.len() > 1 {
            Some(self.build_chain(&descent[1..], frames))
        } else {
            None
        };

        let chain = Arc::new(TraceChain {
            id: node.id.clone(),
            path: node.path.clone(),
            construct: node.construct_info.clone(),
            location,
            next,
        });
        self.cache.insert(node.path.clone(), Arc::clone(&chain));
        chain
    }

    /// Path from `node` (inclusive) to the construct whose trace feeds the chain: the
    /// deepest descendant carrying trace metadata, lowest child id on ties. Without
    /// any traced descendant this is the plain first-child descent to a leaf.
    fn trace_descent<'n>(&self, node: &'n RawNode) -> Vec<&'n RawNode> {
        if let Some(mut path) = self.deepest_traced(node) {
            path.reverse();
            return path;
        }

        let mut path = vec![node];
        let mut current = node;
        while let Some(child) = current.first_child() {
            path.push(child);
            current = child;
        }
        path
    }

    /// Leaf-first path to the deepest traced construct under `node`.
    fn deepest_traced<'n>(&self, node: &'n RawNode) -> Option<Vec<&'n RawNode>> {
        let mut best: Option<Vec<&'n RawNode>> = None;
        for child in node.children.values() {
            if let Some(path) = self.deepest_traced(child) {
                if best.as_ref().map_or(true, |current| path.len() > current.len()) {
                    best = Some(path);
                }
            }
        }

        match best {
            Some(mut path) => {
                path.push(node);
                Some(path)
            }
            None if self.metadata.has_trace(&node.metadata_path()) => Some(vec![node]),
            None => None,
        }
    }

    /// The first `depth` usable frames of the construct's trace, outermost last.
    fn working_frames(&self, node: &RawNode, depth: usize) -> Vec<String> {
        let Some(trace) = self.metadata.trace(&node.metadata_path()) else {
            return Vec::new();
        };

        trace
            .iter()
            .enumerate()
            .filter(|(i, frame)| {
                *i == 0 || !contains_vendor_marker(frame, &self.config.vendor_markers)
            })
            .filter(|(_, frame)| is_frame(frame))
            .map(|(_, frame)| frame.clone())
            .take(depth)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::LOGICAL_ID_METADATA;

    #[test]
    fn test_three_level_tree_assigns_outermost_frame_to_stack() {
        let tree = create_test_tree();
        let metadata = create_test_metadata(vec![
            "at new CfnBucket (/app/lib.ts:10:3)",
            "at new AppStack (/app/main.ts:20:5)",
        ]);
        let config = TraceConfig::default();
        let mut traces = TraceReconstructor::new(&metadata, &config);

        let stack = &tree.children["Stack"];
        let chain = traces.reconstruct(stack);

        assert_eq!(chain.path, "Stack");
        assert_eq!(chain.location, "at new AppStack (/app/main.ts:20:5)");
        let resource = chain.next.as_ref().unwrap();
        assert_eq!(resource.path, "Stack/Resource");
        assert_eq!(resource.location, "at new CfnBucket (/app/lib.ts:10:3)");
        assert!(resource.next.is_none());
        assert_eq!(chain.depth(), 2);
    }

    #[test]
    fn test_reconstruct_is_memoized() {
        let tree = create_test_tree();
        let metadata = create_test_metadata(vec!["(/app/lib.ts:10:3)", "(/app/main.ts:20:5)"]);
        let config = TraceConfig::default();
        let mut traces = TraceReconstructor::new(&metadata, &config);

        let stack = &tree.children["Stack"];
        let first = traces.reconstruct(stack);
        let second = traces.reconstruct(stack);
        assert!(Arc::ptr_eq(&first, &second));

        let resource = &stack.children["Resource"];
        let from_cache = traces.reconstruct(resource);
        assert!(Arc::ptr_eq(first.next.as_ref().unwrap(), &from_cache));
        assert_eq!(traces.cached_chains(), 2);
    }

    #[test]
    fn test_child_first_reconstruction_agrees() {
        let tree = create_test_tree();
        let metadata = create_test_metadata(vec!["(/app/lib.ts:10:3)", "(/app/main.ts:20:5)"]);
        let config = TraceConfig::default();
        let mut traces = TraceReconstructor::new(&metadata, &config);

        let stack = &tree.children["Stack"];
        let resource = traces.reconstruct(&stack.children["Resource"]);
        assert_eq!(resource.location, "(/app/lib.ts:10:3)");

        let chain = traces.reconstruct(stack);
        assert_eq!(chain.location, "(/app/main.ts:20:5)");
        assert!(Arc::ptr_eq(chain.next.as_ref().unwrap(), &resource));
    }

    #[test]
    fn test_missing_frames_get_placeholder() {
        let tree = create_test_tree();
        let metadata = create_test_metadata(vec!["(/app/lib.ts:10:3)"]);
        let config = TraceConfig::default();
        let mut traces = TraceReconstructor::new(&metadata, &config);

        let chain = traces.reconstruct(&tree.children["Stack"]);
        assert_eq!(chain.location, "(/app/lib.ts:10:3)");
        assert_eq!(
            chain.next.as_ref().unwrap().location,
            config.missing_location
        );
    }

    #[test]
    fn test_absent_trace_yields_placeholders() {
        let tree = create_test_tree();
        let metadata = StackMetadata::new();
        let config = TraceConfig::default();
        let mut traces = TraceReconstructor::new(&metadata, &config);

        let chain = traces.reconstruct(&tree.children["Stack"]);
        assert!(chain
            .locations()
            .all(|location| location == config.missing_location));
        assert!(chain.first_location().is_none());
        assert_eq!(chain.depth(), 2);
    }

    #[test]
    fn test_vendor_frames_filtered_except_first() {
        let tree = create_test_tree();
        let metadata = create_test_metadata(vec![
            "at new CfnBucket (/app/node_modules/aws-cdk-lib/s3.js:1:1)",
            "at new Bucket (/app/node_modules/aws-cdk-lib/bucket.js:5:5)",
            "at node:internal/main:1:1",
            "at new AppStack (/app/main.ts:20:5)",
        ]);
        let config = TraceConfig::default();
        let mut traces = TraceReconstructor::new(&metadata, &config);

        let chain = traces.reconstruct(&tree.children["Stack"]);
        assert_eq!(chain.location, "at new AppStack (/app/main.ts:20:5)");
        assert_eq!(
            chain.next.as_ref().unwrap().location,
            "at new CfnBucket (/app/node_modules/aws-cdk-lib/s3.js:1:1)"
        );
    }

    #[test]
    fn test_resolve_source_skips_vendored_location() {
        let tree = create_test_tree();
        let metadata = create_test_metadata(vec![
            "(/app/node_modules/aws-cdk-lib/s3.js:1:1)",
            "(/app/main.ts:20:5)",
        ]);
        let config = TraceConfig::default();
        let mut traces = TraceReconstructor::new(&metadata, &config);

        let stack = &tree.children["Stack"];
        let source = traces.resolve_source(stack).unwrap();
        assert_eq!(source, SourceLocation::new("/app/main.ts", 19, 4));
        assert!(traces.resolve_source(&stack.children["Resource"]).is_none());
    }

    #[test]
    fn test_branching_tree_follows_deepest_traced_descendant() {
        let mut bucket = create_node("Bucket", "Stack/Bucket", vec![]);
        bucket.children.insert(
            "Resource".to_string(),
            create_node("Resource", "Stack/Bucket/Resource", vec![]),
        );
        let topic = create_node("Topic", "Stack/Topic", vec![]);
        let stack = create_node("Stack", "Stack", vec![bucket, topic]);

        let mut metadata = StackMetadata::new();
        metadata.insert(
            "/Stack/Bucket/Resource",
            vec![create_logical_id_entry(
                "BucketResource",
                vec![
                    "(/app/lib.ts:10:3)",
                    "(/app/constructs.ts:4:1)",
                    "(/app/main.ts:20:5)",
                ],
            )],
        );
        metadata.insert(
            "/Stack/Topic",
            vec![create_logical_id_entry("Topic", vec!["(/app/topic.ts:1:1)"])],
        );

        let config = TraceConfig::default();
        let mut traces = TraceReconstructor::new(&metadata, &config);
        let chain = traces.reconstruct(&stack);

        let paths: Vec<&str> = chain.links().map(|link| link.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["Stack", "Stack/Bucket", "Stack/Bucket/Resource"]
        );
        assert_eq!(
            chain.locations().collect::<Vec<_>>(),
            vec![
                "(/app/main.ts:20:5)",
                "(/app/constructs.ts:4:1)",
                "(/app/lib.ts:10:3)"
            ]
        );

        let topic = traces.reconstruct(&stack.children["Topic"]);
        assert_eq!(topic.location, "(/app/topic.ts:1:1)");
    }

    #[test]
    fn test_logical_id_index() {
        let metadata = create_test_metadata(vec!["(/app/lib.ts:10:3)"]);
        let index = LogicalIdIndex::from_metadata(&metadata);

        assert_eq!(index.len(), 1);
        assert_eq!(index.get("Stack"), Some("StackResource1234"));
        assert_eq!(index.get("Stack/Resource"), None);
    }

    #[test]
    fn test_metadata_merge_overwrites() {
        let mut metadata = StackMetadata::new();
        let mut first = BTreeMap::new();
        first.insert(
            "/Stack/Resource".to_string(),
            vec![create_logical_id_entry("Old", vec![])],
        );
        let mut second = BTreeMap::new();
        second.insert(
            "/Stack/Resource".to_string(),
            vec![create_logical_id_entry("New", vec![])],
        );

        metadata.merge(first);
        metadata.merge(second);

        assert_eq!(metadata.len(), 1);
        assert_eq!(metadata.logical_id("/Stack/Resource"), Some("New"));
        assert!(!metadata.has_trace("/Stack/Resource"));
    }

    #[test]
    fn test_trace_prefers_logical_id_entry() {
        let mut metadata = StackMetadata::new();
        metadata.insert(
            "/Stack/Resource",
            vec![
                MetadataEntry {
                    kind: "aws:cdk:warning".to_string(),
                    data: None,
                    trace: Some(vec!["(/app/warn.ts:1:1)".to_string()]),
                },
                create_logical_id_entry("Res", vec!["(/app/lib.ts:10:3)"]),
            ],
        );

        assert_eq!(
            metadata.trace("/Stack/Resource").unwrap(),
            &["(/app/lib.ts:10:3)".to_string()]
        );
    }

    fn create_test_tree() -> RawNode {
        let resource = create_node("Resource", "Stack/Resource", vec![]);
        let stack = create_node("Stack", "Stack", vec![resource]);
        create_node("App", "", vec![stack])
    }

    fn create_node(id: &str, path: &str, children: Vec<RawNode>) -> RawNode {
        RawNode {
            id: id.to_string(),
            path: path.to_string(),
            construct_info: None,
            children: children
                .into_iter()
                .map(|child| (child.id.clone(), child))
                .collect(),
        }
    }

    fn create_logical_id_entry(logical_id: &str, trace: Vec<&str>) -> MetadataEntry {
        MetadataEntry {
            kind: LOGICAL_ID_METADATA.to_string(),
            data: Some(serde_json::Value::String(logical_id.to_string())),
            trace: if trace.is_empty() {
                None
            } else {
                Some(trace.into_iter().map(String::from).collect())
            },
        }
    }

    fn create_test_metadata(trace: Vec<&str>) -> StackMetadata {
        let mut metadata = StackMetadata::new();
        metadata.insert(
            "/Stack/Resource",
            vec![create_logical_id_entry("StackResource1234", trace)],
        );
        metadata
    }
}
