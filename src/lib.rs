//! CDK LSP Server
//!
//! Correlates the artifacts of a CDK synthesis with the source that produced them.
//! Synthesis records a stack trace on each low-level resource; rebuilding the
//! construct stack from those traces gives every construct the source line that
//! created it. That line index drives construct navigation (call hierarchy),
//! jumps into the rendered templates (go to implementation), and the placement of
//! policy violations as diagnostics.
//!
//! Everything derived from one synthesis is built once into an immutable snapshot,
//! so editor requests never observe a half-built index.

pub mod assembly;
pub mod config;
pub mod diagnostics;
pub mod location;
pub mod navigation;
pub mod proto;
pub mod server;
pub mod synth;
pub mod synthesis;
pub mod template;
pub mod trace;
pub mod tree;
pub mod workspace;

pub use config::CdkLspConfig;
pub use diagnostics::ViolationMapper;
pub use server::CdkLspServer;
pub use synth::SynthManager;
pub use synthesis::{Synthesis, SynthesisStore};
pub use template::TemplateLocator;
pub use trace::TraceReconstructor;
pub use tree::ConstructTree;
pub use workspace::WorkspaceManager;
