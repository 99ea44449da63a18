//! Editor-facing navigation items
//!
//! The construct tree answers queries with plain [`NavigationRecord`]s; this module
//! turns them into call hierarchy items and location links. Construct nesting is
//! presented as a call hierarchy: a construct "calls" the constructs it creates.

use crate::{location::SourceLocation, template::TemplateRange};
use lsp_types::{
    CallHierarchyIncomingCall, CallHierarchyItem, CallHierarchyOutgoingCall, LocationLink,
    SymbolKind, Url,
};
use serde::{Deserialize, Serialize};

/// A construct that has a source position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationRecord {
    pub id: String,
    pub path: String,
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl NavigationRecord {
    pub fn new(id: &str, path: &str, location: &SourceLocation) -> Self {
        Self {
            id: id.to_string(),
            path: path.to_string(),
            file: location.file.clone(),
            line: location.line,
            column: location.column,
        }
    }

    pub fn location(&self) -> SourceLocation {
        SourceLocation::new(self.file.clone(), self.line, self.column)
    }

    pub fn display_name(&self) -> String {
        format!("{} ({})", self.id, self.path)
    }

    /// `None` when the file is not an absolute path.
    pub fn to_call_hierarchy_item(&self) -> Option<CallHierarchyItem> {
        let uri = Url::from_file_path(&self.file).ok()?;
        let range = self.location().point_range();

        Some(CallHierarchyItem {
            name: self.display_name(),
            kind: SymbolKind::CLASS,
            tags: None,
            detail: None,
            uri,
            range,
            selection_range: range,
            data: None,
        })
    }

    pub fn to_incoming_call(&self) -> Option<CallHierarchyIncomingCall> {
        Some(CallHierarchyIncomingCall {
            from: self.to_call_hierarchy_item()?,
            from_ranges: vec![self.location().point_range()],
        })
    }

    pub fn to_outgoing_call(&self) -> Option<CallHierarchyOutgoingCall> {
        Some(CallHierarchyOutgoingCall {
            to: self.to_call_hierarchy_item()?,
            from_ranges: vec![self.location().point_range()],
        })
    }
}

impl TemplateRange {
    pub fn to_location_link(&self) -> Option<LocationLink> {
        let target_uri = Url::from_file_path(&self.template_uri).ok()?;
        let range = self.range();

        Some(LocationLink {
            origin_selection_range: None,
            target_uri,
            target_range: range,
            target_selection_range: range,
        })
    }
}

pub fn call_hierarchy_items(records: &[NavigationRecord]) -> Vec<CallHierarchyItem> {
    records
        .iter()
        .filter_map(NavigationRecord::to_call_hierarchy_item)
        .collect()
}

pub fn incoming_calls(records: &[NavigationRecord]) -> Vec<CallHierarchyIncomingCall> {
    records
        .iter()
        .filter_map(NavigationRecord::to_incoming_call)
        .collect()
}

pub fn outgoing_calls(records: &[NavigationRecord]) -> Vec<CallHierarchyOutgoingCall> {
    records
        .iter()
        .filter_map(NavigationRecord::to_outgoing_call)
        .collect()
}

pub fn location_links(ranges: &[TemplateRange]) -> Vec<LocationLink> {
    ranges
        .iter()
        .filter_map(TemplateRange::to_location_link)
        .collect()
}
