//! Workspace management
//!
//! Tracks open documents so diagnostics can be republished for every one of them
//! whenever a new synthesis lands, and so a closed document gets its diagnostics
//! cleared. Synthesis reads from disk, so edits only mark a document dirty; the next
//! save is what triggers a rebuild.
//!
//! DashMap lets the synth completion callback enumerate open documents from the
//! worker thread while the LSP loop keeps updating them.
//!
//! The first workspace folder is where synthesis looks for `cdk.json` when a request
//! names no document, so folder changes take effect on the next run.

use anyhow::{anyhow, Result};
use dashmap::DashMap;
use lsp_types::{InitializeParams, TextDocumentItem, Url, WorkspaceFolder};
use std::{
    path::PathBuf,
    sync::{Arc, RwLock},
};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct DocumentInfo {
    pub uri: Url,
    pub language_id: String,
    pub version: i32,
    pub content: String,
    pub is_dirty: bool,
}

impl DocumentInfo {
    /// Local path; `None` for non-file URIs such as untitled buffers.
    pub fn path(&self) -> Option<PathBuf> {
        self.uri.to_file_path().ok()
    }
}

#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    workspace_folders: Arc<RwLock<Vec<WorkspaceFolder>>>,

    open_documents: Arc<DashMap<Url, DocumentInfo>>,

    workspace_root: Option<PathBuf>,
}

impl WorkspaceManager {
    pub fn new(init_params: &InitializeParams) -> Self {
        let workspace_folders = init_params.workspace_folders.clone().unwrap_or_default();
        let workspace_root = Self::determine_workspace_root(init_params);

        info!("Initialized workspace with root: {:?}", workspace_root);
        if !workspace_folders.is_empty() {
            info!(
                "Workspace folders: {:?}",
                workspace_folders.iter().map(|f| &f.uri).collect::<Vec<_>>()
            );
        }

        Self {
            workspace_folders: Arc::new(RwLock::new(workspace_folders)),
            open_documents: Arc::new(DashMap::new()),
            workspace_root,
        }
    }

    /// First current workspace folder, falling back to the root given at initialize.
    pub fn get_workspace_root(&self) -> Option<PathBuf> {
        self.get_workspace_folders()
            .iter()
            .find_map(|folder| folder.uri.to_file_path().ok())
            .or_else(|| self.workspace_root.clone())
    }

    pub fn get_workspace_folders(&self) -> Vec<WorkspaceFolder> {
        self.workspace_folders
            .read()
            .map(|folders| folders.clone())
            .unwrap_or_default()
    }

    pub fn add_document(&self, document: TextDocumentItem) {
        let doc_info = DocumentInfo {
            uri: document.uri.clone(),
            language_id: document.language_id,
            version: document.version,
            content: document.text,
            is_dirty: false,
        };

        debug!("Adding document: {}", document.uri);
        self.open_documents.insert(document.uri, doc_info);
    }

    pub fn update_document(&self, uri: &Url, version: i32, content: String) -> Result<()> {
        if let Some(mut doc) = self.open_documents.get_mut(uri) {
            doc.version = version;
            doc.content = content;
            doc.is_dirty = true;

            debug!("Updated document: {} (version {})", uri, version);
            Ok(())
        } else {
            Err(anyhow!("Document not found: {}", uri))
        }
    }

    pub fn remove_document(&self, uri: &Url) -> Option<DocumentInfo> {
        debug!("Removing document: {}", uri);
        self.open_documents.remove(uri).map(|(_, doc)| doc)
    }

    pub fn get_document(&self, uri: &Url) -> Option<DocumentInfo> {
        self.open_documents.get(uri).map(|doc| doc.clone())
    }

    pub fn get_open_documents(&self) -> Vec<DocumentInfo> {
        self.open_documents
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn mark_document_saved(&self, uri: &Url) {
        if let Some(mut doc) = self.open_documents.get_mut(uri) {
            doc.is_dirty = false;
            debug!("Marked document as saved: {}", uri);
        }
    }

    pub fn is_document_open(&self, uri: &Url) -> bool {
        self.open_documents.contains_key(uri)
    }

    pub fn update_workspace_folders(&self, folders: Vec<WorkspaceFolder>) {
        info!(
            "Updating workspace folders: {:?}",
            folders.iter().map(|f| &f.uri).collect::<Vec<_>>()
        );
        match self.workspace_folders.write() {
            Ok(mut current) => *current = folders,
            Err(e) => warn!("Workspace folders lock poisoned: {}", e),
        }
    }

    fn determine_workspace_root(init_params: &InitializeParams) -> Option<PathBuf> {
        if let Some(folders) = &init_params.workspace_folders {
            if let Some(first_folder) = folders.first() {
                if let Ok(path) = first_folder.uri.to_file_path() {
                    return Some(path);
                }
            }
        }

        #[allow(deprecated)]
        if let Some(root_uri) = &init_params.root_uri {
            if let Ok(path) = root_uri.to_file_path() {
                return Some(path);
            }
        }

        #[allow(deprecated)]
        if let Some(root_path) = &init_params.root_path {
            return Some(PathBuf::from(root_path));
        }

        warn!("No workspace root found in initialization parameters");
        None
    }
}
