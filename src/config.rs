//! Configuration management
//!
//! Projects differ in how they invoke synthesis (npx, a pinned binary, extra context
//! flags) and in where vendored code lives, so the command line, vendor markers and
//! the template type namespace are all configurable. Settings arrive through the
//! initialize request's `initializationOptions`, either at the top level or nested
//! under a `cdk` key.
//!
//! Separate structs per section let one malformed section fall back to defaults
//! without discarding the rest of the configuration.

use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::PathBuf, time::Duration};
use tracing::{debug, info};

pub const DEFAULT_MISSING_LOCATION: &str = "Run with '--debug' to include location info";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CdkLspConfig {
    pub synth: SynthConfig,

    pub trace: TraceConfig,

    pub templates: TemplateConfig,

    pub diagnostics: DiagnosticsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthConfig {
    pub program: String,

    pub args: Vec<String>,

    pub env: HashMap<String, String>,

    pub output_dir: Option<PathBuf>,

    pub timeout_seconds: u64,

    pub on_save: bool,

    pub on_open: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    pub vendor_markers: Vec<String>,

    pub missing_location: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateConfig {
    pub resource_type_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    pub source: String,

    pub include_rule_code: bool,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            program: "npx".to_string(),
            args: vec![
                "cdk".to_string(),
                "synth".to_string(),
                "--context".to_string(),
                "@aws-cdk/core:validationReportJson=true".to_string(),
                "--debug".to_string(),
                "--quiet".to_string(),
                "--no-lookups".to_string(),
            ],
            env: HashMap::new(),
            output_dir: None,
            timeout_seconds: 300, // 5 minutes
            on_save: true,
            on_open: true,
        }
    }
}

impl SynthConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Configured output directory, or `cdk.out` under the resolved temp dir.
    pub fn resolved_output_dir(&self) -> PathBuf {
        if let Some(ref dir) = self.output_dir {
            return dir.clone();
        }

        let tmp = std::env::temp_dir();
        let tmp = std::fs::canonicalize(&tmp).unwrap_or(tmp);
        tmp.join("cdk.out")
    }
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            vendor_markers: vec!["node_modules".to_string()],
            missing_location: DEFAULT_MISSING_LOCATION.to_string(),
        }
    }
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            resource_type_prefix: "AWS::".to_string(),
        }
    }
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            source: "cdk".to_string(),
            include_rule_code: true,
        }
    }
}

impl CdkLspConfig {
    pub fn from_lsp_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        let mut config = CdkLspConfig::default();

        match value.get("cdk") {
            Some(cdk_settings) => config.update_from_value(cdk_settings.clone())?,
            None => config.update_from_value(value)?,
        }

        Ok(config)
    }

    /// Merges each recognised section; a section that fails to deserialize keeps its
    /// previous value.
    pub fn update_from_value(&mut self, value: serde_json::Value) -> Result<(), serde_json::Error> {
        if !value.is_object() {
            // surface the shape error the same way serde would
            serde_json::from_value::<serde_json::Map<String, serde_json::Value>>(value)?;
            return Ok(());
        }

        if let Some(synth_settings) = value.get("synth") {
            if let Ok(synth_config) = serde_json::from_value::<SynthConfig>(synth_settings.clone())
            {
                self.synth = synth_config;
                debug!("Updated synth configuration");
            }
        }

        if let Some(trace_settings) = value.get("trace") {
            if let Ok(trace_config) = serde_json::from_value::<TraceConfig>(trace_settings.clone())
            {
                self.trace = trace_config;
                debug!("Updated trace configuration");
            }
        }

        if let Some(template_settings) = value.get("templates") {
            if let Ok(template_config) =
                serde_json::from_value::<TemplateConfig>(template_settings.clone())
            {
                self.templates = template_config;
                debug!("Updated template configuration");
            }
        }

        if let Some(diagnostics_settings) = value.get("diagnostics") {
            if let Ok(diagnostics_config) =
                serde_json::from_value::<DiagnosticsConfig>(diagnostics_settings.clone())
            {
                self.diagnostics = diagnostics_config;
                debug!("Updated diagnostics configuration");
            }
        }

        info!("Configuration updated successfully");
        Ok(())
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.synth.program.trim().is_empty() {
            return Err("Synth program must not be empty".to_string());
        }

        if self.synth.timeout_seconds == 0 {
            return Err("Synth timeout must be greater than 0".to_string());
        }

        if self.templates.resource_type_prefix.is_empty() {
            return Err("Template resource type prefix must not be empty".to_string());
        }

        Ok(())
    }
}
