//! Cloud assembly loading
//!
//! Reads what one synthesis left in its output directory. Stages nest whole cloud
//! assemblies in subdirectories, each with its own manifest, so stack metadata and
//! template paths are collected recursively and merged into one view. The construct
//! tree and the validation report only exist at the top level.
//!
//! The tree and manifests are required; the report is only written when a policy
//! plugin ran, and a missing template only loses go-to-implementation for its
//! resources.

use crate::{
    proto::{
        AssemblyManifest, TreeDocument, ValidationReport, MANIFEST_FILE, REPORT_FILE, TREE_FILE,
    },
    synth::errors::{SynthError, SynthResult},
    template::{TemplateIndex, TemplateLocator},
    trace::StackMetadata,
};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSource {
    pub stack: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct CloudAssembly {
    pub directory: PathBuf,
    pub tree: TreeDocument,
    pub metadata: StackMetadata,
    pub templates: Vec<TemplateSource>,
    pub report: Option<ValidationReport>,
}

impl CloudAssembly {
    pub fn load(directory: &Path) -> SynthResult<Self> {
        let tree: TreeDocument = read_json(&directory.join(TREE_FILE))?;

        let mut metadata = StackMetadata::new();
        let mut templates = Vec::new();
        collect_manifest(directory, &mut metadata, &mut templates)?;

        let report_path = directory.join(REPORT_FILE);
        let report = if report_path.exists() {
            Some(read_json::<ValidationReport>(&report_path)?)
        } else {
            debug!("No validation report in {:?}", directory);
            None
        };

        info!(
            "Loaded cloud assembly from {:?}: {} metadata paths, {} templates, report: {}",
            directory,
            metadata.len(),
            templates.len(),
            report.is_some()
        );

        Ok(Self {
            directory: directory.to_path_buf(),
            tree,
            metadata,
            templates,
            report,
        })
    }

    /// Locates resources in every readable template; unreadable ones are skipped.
    pub fn template_index(&self, locator: &TemplateLocator) -> TemplateIndex {
        let mut index = TemplateIndex::new();

        for source in &self.templates {
            match std::fs::read_to_string(&source.path) {
                Ok(text) => {
                    let uri = source.path.to_string_lossy();
                    index.extend(locator.locate(&uri, &text));
                }
                Err(e) => {
                    warn!(
                        "Skipping template for stack {} at {:?}: {}",
                        source.stack, source.path, e
                    );
                }
            }
        }

        index
    }
}

fn collect_manifest(
    directory: &Path,
    metadata: &mut StackMetadata,
    templates: &mut Vec<TemplateSource>,
) -> SynthResult<()> {
    let manifest: AssemblyManifest = read_json(&directory.join(MANIFEST_FILE))?;

    for (name, artifact) in manifest.artifacts {
        if artifact.is_stack() {
            match artifact.properties.template_file {
                Some(template_file) => templates.push(TemplateSource {
                    stack: name.clone(),
                    path: directory.join(template_file),
                }),
                None => warn!("Stack artifact {} has no template file", name),
            }
            metadata.merge(artifact.metadata);
        } else if artifact.is_nested_assembly() {
            if let Some(directory_name) = artifact.properties.directory_name {
                debug!("Descending into nested assembly {}", name);
                collect_manifest(&directory.join(directory_name), metadata, templates)?;
            }
        }
    }

    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> SynthResult<T> {
    let content = std::fs::read_to_string(path).map_err(|source| SynthError::ArtifactIo {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_str(&content).map_err(|source| SynthError::ArtifactParse {
        path: path.to_path_buf(),
        source,
    })
}
