//! Diagnostic conversion
//!
//! Translates policy validation violations into LSP diagnostics for one source file.
//! A violation lists the construct stacks of everything that broke the rule; every
//! frame of those stacks that points into the file being published becomes an error
//! at that position. The same violation therefore shows up at each level of the
//! user's code that led to the offending resource, not just at the resource.
//!
//! Report locations are one-based. Only the target file's own frames count, so the
//! file path is escaped before it becomes part of the match pattern.

use crate::{
    config::DiagnosticsConfig,
    location::to_zero_based,
    proto::{ValidationReport, Violation},
};
use lsp_types::{Diagnostic, DiagnosticSeverity, NumberOrString, Position, Range};
use regex::Regex;
use std::{collections::HashMap, path::PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct ViolationMapper {
    source: String,

    include_rule_code: bool,
}

impl ViolationMapper {
    pub fn new() -> Self {
        Self::with_config(&DiagnosticsConfig::default())
    }

    pub fn with_config(config: &DiagnosticsConfig) -> Self {
        Self {
            source: config.source.clone(),
            include_rule_code: config.include_rule_code,
        }
    }

    pub fn map(&self, report: &ValidationReport, target_file: &str) -> Vec<Diagnostic> {
        // the path must start the location or follow `(` or whitespace
        let pattern = match Regex::new(&format!(
            r"(?:^|[(\s]){}:([0-9]+):([0-9]+)",
            regex::escape(target_file)
        )) {
            Ok(pattern) => pattern,
            Err(e) => {
                warn!("Cannot match report locations for {}: {}", target_file, e);
                return Vec::new();
            }
        };

        let pattern = &pattern;
        let diagnostics: Vec<Diagnostic> = report
            .violations()
            .flat_map(|violation| {
                violation
                    .locations()
                    .into_iter()
                    .filter_map(move |location| match_position(pattern, location))
                    .map(move |position| self.violation_to_diagnostic(violation, position))
            })
            .collect();

        debug!(
            "Mapped {} violations to {} diagnostics for {}",
            report.violations().count(),
            diagnostics.len(),
            target_file
        );

        diagnostics
    }

    pub fn violation_to_diagnostic(&self, violation: &Violation, position: Position) -> Diagnostic {
        let code = if self.include_rule_code {
            Some(NumberOrString::String(violation.rule_name.clone()))
        } else {
            None
        };

        Diagnostic {
            range: Range {
                start: position,
                end: position,
            },
            severity: Some(DiagnosticSeverity::ERROR),
            code,
            code_description: None,
            source: Some(self.source.clone()),
            message: violation_message(violation),
            related_information: None,
            tags: None,
            data: None,
        }
    }

    pub fn get_diagnostic_stats(
        diagnostics_by_file: &HashMap<PathBuf, Vec<Diagnostic>>,
    ) -> DiagnosticStats {
        let mut stats = DiagnosticStats::default();

        for diagnostics in diagnostics_by_file.values() {
            stats.total_count += diagnostics.len();
            if !diagnostics.is_empty() {
                stats.file_count += 1;
            }

            for diagnostic in diagnostics {
                if let Some(NumberOrString::String(rule)) = &diagnostic.code {
                    *stats.by_rule.entry(rule.clone()).or_default() += 1;
                }
            }
        }

        stats
    }
}

impl Default for ViolationMapper {
    fn default() -> Self {
        Self::new()
    }
}

/// `"<rule> failed!"` followed by the description and fix on their own indented lines.
pub fn violation_message(violation: &Violation) -> String {
    let mut message = format!("{} failed!", violation.rule_name);
    for part in [&violation.description, &violation.fix].into_iter().flatten() {
        message.push_str("\n\t");
        message.push_str(part);
    }
    message
}

fn match_position(pattern: &Regex, location: &str) -> Option<Position> {
    let captures = pattern.captures(location)?;
    let line = captures.get(1)?.as_str().parse::<u32>().ok()?;
    let column = captures.get(2)?.as_str().parse::<u32>().ok()?;
    Some(Position::new(to_zero_based(line), to_zero_based(column)))
}

#[derive(Debug, Clone, Default)]
pub struct DiagnosticStats {
    pub total_count: usize,
    pub file_count: usize,
    pub by_rule: HashMap<String, usize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_single_location_maps_to_one_diagnostic() {
        let mapper = ViolationMapper::new();
        let report = create_test_report(vec!["(/app/main.ts:19:4)"]);

        let diagnostics = mapper.map(&report, "/app/main.ts");

        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].range.start, Position::new(18, 3));
        assert_eq!(diagnostics[0].range.start, diagnostics[0].range.end);
        assert_eq!(diagnostics[0].severity, Some(DiagnosticSeverity::ERROR));
        assert_eq!(diagnostics[0].source, Some("cdk".to_string()));
    }

    #[test]
    fn test_message_and_code() {
        let mapper = ViolationMapper::new();
        let report = create_test_report(vec!["(/app/main.ts:19:4)"]);

        let diagnostic = &mapper.map(&report, "/app/main.ts")[0];

        assert_eq!(
            diagnostic.message,
            "bucket-encryption failed!\n\tBuckets must be encrypted\n\tEnable encryption"
        );
        match &diagnostic.code {
            Some(NumberOrString::String(code)) => assert_eq!(code, "bucket-encryption"),
            _ => panic!("Expected string code"),
        }
    }

    #[test]
    fn test_message_omits_absent_parts() {
        let violation: Violation = serde_json::from_value(json!({
            "ruleName": "no-public-access",
            "fix": "Block public access"
        }))
        .unwrap();

        assert_eq!(
            violation_message(&violation),
            "no-public-access failed!\n\tBlock public access"
        );
    }

    #[test]
    fn test_only_target_file_locations_match() {
        let mapper = ViolationMapper::new();
        let report = create_test_report(vec![
            "(/app/main.ts:19:4)",
            "(/app/lib/stack.ts:7:3)",
            "(/app/main.ts:30:1)",
        ]);

        let main = mapper.map(&report, "/app/main.ts");
        assert_eq!(main.len(), 2);
        assert_eq!(main[1].range.start, Position::new(29, 0));

        let stack = mapper.map(&report, "/app/lib/stack.ts");
        assert_eq!(stack.len(), 1);

        assert!(mapper.map(&report, "/app/other.ts").is_empty());
    }

    #[test]
    fn test_target_file_is_escaped() {
        let mapper = ViolationMapper::new();
        let report = create_test_report(vec!["(/app/mainXts:19:4)"]);

        assert!(mapper.map(&report, "/app/main.ts").is_empty());
    }

    #[test]
    fn test_zero_positions_are_preserved() {
        let mapper = ViolationMapper::new();
        let report = create_test_report(vec!["(/app/main.ts:0:0)"]);

        let diagnostics = mapper.map(&report, "/app/main.ts");
        assert_eq!(diagnostics[0].range.start, Position::new(0, 0));
    }

    #[test]
    fn test_custom_source_without_code() {
        let config = DiagnosticsConfig {
            source: "cdk-validate".to_string(),
            include_rule_code: false,
        };
        let mapper = ViolationMapper::with_config(&config);
        let report = create_test_report(vec!["(/app/main.ts:1:1)"]);

        let diagnostic = &mapper.map(&report, "/app/main.ts")[0];
        assert_eq!(diagnostic.source, Some("cdk-validate".to_string()));
        assert!(diagnostic.code.is_none());
    }

    #[test]
    fn test_path_suffix_does_not_match() {
        let mapper = ViolationMapper::new();
        let report = create_test_report(vec!["(/x/app/main.ts:3:1)", "/x/app/main.ts:4:1"]);

        assert!(mapper.map(&report, "/app/main.ts").is_empty());
        assert_eq!(mapper.map(&report, "/x/app/main.ts").len(), 2);
    }

    #[test]
    fn test_bare_and_framed_locations_match() {
        let mapper = ViolationMapper::new();
        let report = create_test_report(vec![
            "/app/main.ts:2:1",
            "at new AppStack (/app/main.ts:5:1)",
            "at /app/main.ts:9:1",
        ]);

        let lines: Vec<u32> = mapper
            .map(&report, "/app/main.ts")
            .iter()
            .map(|diagnostic| diagnostic.range.start.line)
            .collect();
        assert_eq!(lines, vec![1, 4, 8]);
    }

    #[test]
    fn test_diagnostic_stats() {
        let mapper = ViolationMapper::new();
        let report = create_test_report(vec!["(/app/main.ts:19:4)", "(/app/lib/stack.ts:7:3)"]);
        let files = ["/app/main.ts", "/app/lib/stack.ts", "/app/unrelated.ts"];
        let by_file: HashMap<PathBuf, Vec<Diagnostic>> = files
            .into_iter()
            .map(|file| (PathBuf::from(file), mapper.map(&report, file)))
            .collect();

        let stats = ViolationMapper::get_diagnostic_stats(&by_file);
        assert_eq!(stats.total_count, 2);
        assert_eq!(stats.file_count, 2);
        assert_eq!(stats.by_rule["bucket-encryption"], 2);
    }

    fn create_test_report(locations: Vec<&str>) -> ValidationReport {
        let mut stack = json!({ "id": "Resource", "path": "Stack/Bucket/Resource" });
        for (depth, location) in locations.iter().enumerate().rev() {
            stack = json!({
                "id": format!("Level{}", depth),
                "path": format!("Stack/Level{}", depth),
                "location": location,
                "child": stack
            });
        }

        serde_json::from_value(json!({
            "title": "Validation Report",
            "pluginReports": [{
                "summary": { "pluginName": "test-plugin", "status": "failure" },
                "violations": [{
                    "ruleName": "bucket-encryption",
                    "description": "Buckets must be encrypted",
                    "fix": "Enable encryption",
                    "violatingConstructs": [{
                        "constructStack": stack,
                        "constructPath": "Stack/Bucket/Resource",
                        "resourceLogicalId": "Bucket"
                    }]
                }]
            }]
        }))
        .unwrap()
    }
}
