//! Template resource location
//!
//! Finds where each resource block sits in a rendered template so "go to
//! implementation" can jump from a construct to the resources it produced. The
//! synthesizer pretty-prints templates with fixed indentation, which makes a line
//! scan sufficient: a block starts at `"<LogicalId>": {` when the next line declares
//! a resource `"Type"`, and ends at the first later line holding only a closing
//! brace at exactly the same indentation.

use lsp_types::{Position, Range};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::LazyLock};
use tracing::debug;

static RESOURCE_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^(\s*)"(\w+)"\s*:\s*\{"#).expect("valid resource key regex"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateRange {
    pub logical_id: String,
    pub template_uri: String,
    pub start_line: u32,
    pub end_line: u32,
}

impl TemplateRange {
    pub fn range(&self) -> Range {
        Range {
            start: Position::new(self.start_line, 0),
            end: Position::new(self.end_line, 0),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TemplateLocator {
    type_declaration: Regex,
}

impl TemplateLocator {
    /// `type_prefix` is the resource type namespace, e.g. `AWS::`.
    pub fn new(type_prefix: &str) -> Result<Self, regex::Error> {
        let pattern = format!(r#""Type"\s*:\s*"{}[^"]*",?\s*$"#, regex::escape(type_prefix));
        Ok(Self {
            type_declaration: Regex::new(&pattern)?,
        })
    }

    pub fn locate(&self, template_uri: &str, text: &str) -> HashMap<String, TemplateRange> {
        let lines: Vec<&str> = text.lines().collect();
        let mut resources = HashMap::new();

        for (start, window) in lines.windows(2).enumerate() {
            if !self.type_declaration.is_match(window[1]) {
                continue;
            }
            let Some(captures) = RESOURCE_KEY.captures(window[0]) else {
                continue;
            };
            let indent = captures.get(1).map_or("", |m| m.as_str());
            let logical_id = captures.get(2).map_or("", |m| m.as_str());

            let end = lines
                .iter()
                .enumerate()
                .skip(start + 1)
                .find(|(_, line)| is_block_end(line, indent))
                .map_or(start, |(index, _)| index);

            resources.insert(
                logical_id.to_string(),
                TemplateRange {
                    logical_id: logical_id.to_string(),
                    template_uri: template_uri.to_string(),
                    start_line: start as u32,
                    end_line: end as u32,
                },
            );
        }

        debug!(
            "Located {} resources in template {}",
            resources.len(),
            template_uri
        );
        resources
    }
}

fn is_block_end(line: &str, indent: &str) -> bool {
    match line.strip_prefix(indent) {
        Some(rest) => matches!(rest.trim_end(), "}" | "},"),
        None => false,
    }
}

/// Resource ranges across every template of one synthesis. Logical ids are only
/// unique per template; on a collision the template merged last wins.
#[derive(Debug, Clone, Default)]
pub struct TemplateIndex {
    by_logical_id: HashMap<String, TemplateRange>,
}

impl TemplateIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, ranges: HashMap<String, TemplateRange>) {
        self.by_logical_id.extend(ranges);
    }

    pub fn get(&self, logical_id: &str) -> Option<&TemplateRange> {
        self.by_logical_id.get(logical_id)
    }

    pub fn len(&self) -> usize {
        self.by_logical_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_logical_id.is_empty()
    }
}
