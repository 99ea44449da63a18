//! Synthesis snapshots
//!
//! Everything derived from one synthesis run (construct tree, position index,
//! template ranges, validation report) is built together and published as a single
//! immutable [`Synthesis`]. Request handlers clone the current `Arc` and work on it
//! while the next rebuild proceeds on the synth worker.
//!
//! Generations are handed out in request order. A finished rebuild only replaces the
//! installed snapshot when it is newer, so a slow run can never overwrite the result
//! of a later one.

use crate::{
    assembly::CloudAssembly,
    config::CdkLspConfig,
    diagnostics::ViolationMapper,
    location::IndexKey,
    navigation::NavigationRecord,
    proto::ValidationReport,
    synth::errors::{SynthError, SynthResult},
    template::{TemplateIndex, TemplateLocator, TemplateRange},
    trace::{LogicalIdIndex, TraceReconstructor},
    tree::ConstructTree,
};
use lsp_types::Diagnostic;
use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, RwLock,
    },
};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct Synthesis {
    pub generation: u64,
    pub output_dir: PathBuf,
    pub tree: ConstructTree,
    pub templates: TemplateIndex,
    pub report: Option<ValidationReport>,
}

impl Synthesis {
    pub fn build(
        generation: u64,
        assembly: CloudAssembly,
        config: &CdkLspConfig,
    ) -> SynthResult<Self> {
        let locator = TemplateLocator::new(&config.templates.resource_type_prefix).map_err(|e| {
            SynthError::InvalidConfig {
                reason: format!("resource type prefix: {}", e),
            }
        })?;
        let templates = assembly.template_index(&locator);

        let logical_ids = LogicalIdIndex::from_metadata(&assembly.metadata);
        let mut traces = TraceReconstructor::new(&assembly.metadata, &config.trace);
        let tree = ConstructTree::build(&assembly.tree.tree, &mut traces, logical_ids);
        debug!("Reconstructed {} trace chains", traces.cached_chains());

        info!(
            "Built synthesis generation {}: {} constructs, {} source locations, {} template resources",
            generation,
            tree.len(),
            tree.indexed_locations(),
            templates.len()
        );

        Ok(Self {
            generation,
            output_dir: assembly.directory,
            tree,
            templates,
            report: assembly.report,
        })
    }

    pub fn diagnostics_for(&self, file: &str, mapper: &ViolationMapper) -> Vec<Diagnostic> {
        match &self.report {
            Some(report) => mapper.map(report, file),
            None => Vec::new(),
        }
    }

    pub fn implementations(&self, key: &IndexKey) -> Vec<TemplateRange> {
        self.tree.resources_under(key, &self.templates)
    }

    pub fn call_hierarchy(&self, key: &IndexKey) -> Vec<NavigationRecord> {
        self.tree.ancestor_chain_items(key)
    }

    pub fn incoming_callers(&self, key: &IndexKey) -> Vec<NavigationRecord> {
        self.tree.incoming_callers(key)
    }

    pub fn outgoing_callees(&self, key: &IndexKey) -> Vec<NavigationRecord> {
        self.tree.outgoing_callees(key)
    }
}

#[derive(Debug, Default)]
pub struct SynthesisStore {
    current: RwLock<Option<Arc<Synthesis>>>,

    allocated: AtomicU64,
}

impl SynthesisStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the generation number for the next rebuild. Starts at 1.
    pub fn next_generation(&self) -> u64 {
        self.allocated.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn latest_generation(&self) -> u64 {
        self.allocated.load(Ordering::SeqCst)
    }

    pub fn is_superseded(&self, generation: u64) -> bool {
        generation < self.latest_generation()
            || self
                .installed_generation()
                .is_some_and(|installed| installed >= generation)
    }

    pub fn current(&self) -> Option<Arc<Synthesis>> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn installed_generation(&self) -> Option<u64> {
        self.current().map(|synthesis| synthesis.generation)
    }

    /// Installs the snapshot unless a newer or equal generation is already in place.
    pub fn install(&self, synthesis: Arc<Synthesis>) -> bool {
        let mut current = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(installed) = current.as_ref() {
            if installed.generation >= synthesis.generation {
                debug!(
                    "Dropping generation {}, generation {} already installed",
                    synthesis.generation, installed.generation
                );
                return false;
            }
        }

        info!("Installed synthesis generation {}", synthesis.generation);
        *current = Some(synthesis);
        true
    }
}
