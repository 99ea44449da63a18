//! LSP server implementation
//!
//! Routes protocol requests to the current synthesis snapshot rather than holding any
//! correlation logic itself. Construct nesting is exposed through the call hierarchy
//! (enclosing constructs are callers, created constructs are callees), rendered
//! resources through "go to implementation", and policy violations as diagnostics.
//!
//! Synthesis takes seconds, so it runs on a dedicated worker. Requests always answer
//! from whatever snapshot is installed at that moment; when a newer one lands, the
//! worker's callback republishes diagnostics for every open document.

use crate::{
    config::CdkLspConfig,
    diagnostics::{DiagnosticStats, ViolationMapper},
    location::IndexKey,
    navigation,
    synth::{SynthEvent, SynthHandle, SynthManager, SynthStats, SynthTrigger},
    synthesis::{Synthesis, SynthesisStore},
    workspace::WorkspaceManager,
};
use anyhow::{anyhow, Result};
use crossbeam_channel::Sender;
use lsp_server::{Connection, Message, Notification, Request, RequestId, Response};
use lsp_types::{
    notification::{
        DidChangeTextDocument, DidChangeWorkspaceFolders, DidCloseTextDocument,
        DidOpenTextDocument, DidSaveTextDocument, LogMessage, Notification as _, PublishDiagnostics,
    },
    request::{
        CallHierarchyIncomingCalls, CallHierarchyOutgoingCalls, CallHierarchyPrepare,
        ExecuteCommand, GotoImplementation, Request as _,
    },
    CallHierarchyIncomingCallsParams, CallHierarchyOutgoingCallsParams, CallHierarchyPrepareParams,
    Diagnostic, ExecuteCommandParams, GotoDefinitionParams, GotoDefinitionResponse,
    InitializeParams, LogMessageParams, MessageType, Position, PublishDiagnosticsParams, Url,
};
use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{mpsc, Arc, Mutex},
    thread::JoinHandle,
};
use tracing::{debug, error, info, warn};

pub const SYNTH_COMMAND: &str = "cdk.synth";

pub const SYNTH_UPDATED_NOTIFICATION: &str = "cdk/synthUpdated";

pub struct CdkLspServer {
    workspace_manager: WorkspaceManager,
    violation_mapper: ViolationMapper,
    store: Arc<SynthesisStore>,
    config: CdkLspConfig,
    synth: SynthHandle,
    synth_stats: SynthStats,
    synth_thread: Mutex<Option<JoinHandle<()>>>,
}

impl CdkLspServer {
    pub fn new(
        init_params: &InitializeParams,
        config: CdkLspConfig,
        sender: Sender<Message>,
    ) -> Result<Self> {
        config.validate().map_err(|e| anyhow!(e))?;

        let workspace_manager = WorkspaceManager::new(init_params);
        let violation_mapper = ViolationMapper::with_config(&config.diagnostics);
        let store = Arc::new(SynthesisStore::new());

        let on_event = {
            let workspace_manager = workspace_manager.clone();
            let violation_mapper = violation_mapper.clone();
            Box::new(move |event: SynthEvent| {
                if let Err(e) =
                    Self::handle_synth_event(&sender, &workspace_manager, &violation_mapper, event)
                {
                    error!("Failed to report synthesis result: {}", e);
                }
            })
        };

        let manager = SynthManager::new(config.clone(), Arc::clone(&store), on_event);
        let synth_stats = manager.stats();

        let (synth_tx, synth_rx) = mpsc::channel();
        let synth = manager.handle(synth_tx);
        let synth_thread = std::thread::spawn(move || {
            manager.run(synth_rx);
        });

        Ok(Self {
            workspace_manager,
            violation_mapper,
            store,
            config,
            synth,
            synth_stats,
            synth_thread: Mutex::new(Some(synth_thread)),
        })
    }

    pub fn store(&self) -> &Arc<SynthesisStore> {
        &self.store
    }

    pub fn workspace(&self) -> &WorkspaceManager {
        &self.workspace_manager
    }

    /// Kills an in-flight synthesis and waits for the worker to exit.
    pub fn shutdown(&self) {
        self.synth.shutdown();

        let handle = match self.synth_thread.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("Synthesis worker panicked");
            }
        }

        let snapshot = self.synth_stats.snapshot();
        info!(
            "Synthesis worker stopped after {} runs ({} failed, {} superseded)",
            snapshot.total_runs, snapshot.failed_runs, snapshot.superseded_runs
        );
    }

    pub fn process_request(&self, connection: &Connection, req: Request) {
        let req_id = req.id.clone();

        let result = match req.method.as_str() {
            CallHierarchyPrepare::METHOD => self.handle_prepare_call_hierarchy(connection, req),
            CallHierarchyIncomingCalls::METHOD => self.handle_incoming_calls(connection, req),
            CallHierarchyOutgoingCalls::METHOD => self.handle_outgoing_calls(connection, req),
            GotoImplementation::METHOD => self.handle_implementation(connection, req),
            ExecuteCommand::METHOD => self.handle_execute_command(connection, req),
            _ => {
                debug!("Received unhandled request: {}", req.method);
                let response =
                    Response::new_err(req.id, -32601, format!("Unhandled method: {}", req.method));
                connection
                    .sender
                    .send(response.into())
                    .map_err(|e| anyhow!(e))
            }
        };

        if let Err(e) = result {
            let response = Response::new_err(req_id, -32603, e.to_string());
            let _ = connection.sender.send(response.into());
        }
    }

    pub fn process_notification(&self, connection: &Connection, not: Notification) {
        let method = not.method.clone();
        let result = match not.method.as_str() {
            DidOpenTextDocument::METHOD => self.handle_did_open(connection, not),
            DidChangeTextDocument::METHOD => self.handle_did_change(not),
            DidSaveTextDocument::METHOD => self.handle_did_save(not),
            DidCloseTextDocument::METHOD => self.handle_did_close(connection, not),
            DidChangeWorkspaceFolders::METHOD => self.handle_did_change_workspace_folders(not),
            _ => {
                debug!("Received unhandled notification: {}", method);
                Ok(())
            }
        };

        if let Err(e) = result {
            error!("Error processing notification {}: {}", method, e);
        }
    }

    fn handle_prepare_call_hierarchy(&self, connection: &Connection, req: Request) -> Result<()> {
        let params: CallHierarchyPrepareParams = serde_json::from_value(req.params)?;
        let position = params.text_document_position_params;
        let key = Self::query_key(&position.text_document.uri, position.position)?;

        let items = match self.store.current() {
            Some(synthesis) => navigation::call_hierarchy_items(&synthesis.call_hierarchy(&key)),
            None => Vec::new(),
        };
        debug!("Prepared {} call hierarchy items for {}", items.len(), key);

        Self::respond(connection, req.id, Some(items))
    }

    fn handle_incoming_calls(&self, connection: &Connection, req: Request) -> Result<()> {
        let params: CallHierarchyIncomingCallsParams = serde_json::from_value(req.params)?;
        let key = Self::query_key(&params.item.uri, params.item.selection_range.start)?;

        let calls = match self.store.current() {
            Some(synthesis) => navigation::incoming_calls(&synthesis.incoming_callers(&key)),
            None => Vec::new(),
        };
        debug!("Found {} incoming calls for {}", calls.len(), key);

        Self::respond(connection, req.id, Some(calls))
    }

    fn handle_outgoing_calls(&self, connection: &Connection, req: Request) -> Result<()> {
        let params: CallHierarchyOutgoingCallsParams = serde_json::from_value(req.params)?;
        let key = Self::query_key(&params.item.uri, params.item.selection_range.start)?;

        let calls = match self.store.current() {
            Some(synthesis) => navigation::outgoing_calls(&synthesis.outgoing_callees(&key)),
            None => Vec::new(),
        };
        debug!("Found {} outgoing calls for {}", calls.len(), key);

        Self::respond(connection, req.id, Some(calls))
    }

    fn handle_implementation(&self, connection: &Connection, req: Request) -> Result<()> {
        let params: GotoDefinitionParams = serde_json::from_value(req.params)?;
        let position = params.text_document_position_params;
        let key = Self::query_key(&position.text_document.uri, position.position)?;

        let links = match self.store.current() {
            Some(synthesis) => navigation::location_links(&synthesis.implementations(&key)),
            None => Vec::new(),
        };
        debug!("Found {} template resources for {}", links.len(), key);

        Self::respond(connection, req.id, Some(GotoDefinitionResponse::Link(links)))
    }

    fn handle_execute_command(&self, connection: &Connection, req: Request) -> Result<()> {
        let params: ExecuteCommandParams = serde_json::from_value(req.params)?;

        match params.command.as_str() {
            SYNTH_COMMAND => {
                let document = match params.arguments.first() {
                    Some(value) => Some(Self::extract_path_from_value(value)?),
                    None => None,
                };
                self.request_synth(SynthTrigger::Command, document)?;
                Self::respond(connection, req.id, serde_json::Value::Null)
            }
            _ => {
                let response = Response::new_err(
                    req.id,
                    -32601,
                    format!("Unknown command: {}", params.command),
                );
                connection.sender.send(response.into())?;
                Ok(())
            }
        }
    }

    fn handle_did_open(&self, connection: &Connection, not: Notification) -> Result<()> {
        let params: lsp_types::DidOpenTextDocumentParams = serde_json::from_value(not.params)?;
        let uri = params.text_document.uri.clone();
        let version = params.text_document.version;

        debug!("Document opened: {}", uri);
        self.workspace_manager.add_document(params.text_document);

        if let Some(synthesis) = self.store.current() {
            let diagnostics = self.diagnostics_for_uri(&synthesis, &uri);
            Self::publish_diagnostics(&connection.sender, uri.clone(), diagnostics, Some(version))?;
        }

        if self.config.synth.on_open && self.store.latest_generation() == 0 {
            let document = uri.to_file_path().ok();
            self.request_synth(SynthTrigger::Open, document)?;
        }

        Ok(())
    }

    fn handle_did_change(&self, not: Notification) -> Result<()> {
        let params: lsp_types::DidChangeTextDocumentParams = serde_json::from_value(not.params)?;

        debug!(
            "Document changed: {} (version {})",
            params.text_document.uri, params.text_document.version
        );

        if let Some(change) = params.content_changes.into_iter().last() {
            self.workspace_manager.update_document(
                &params.text_document.uri,
                params.text_document.version,
                change.text,
            )?;
        }

        Ok(())
    }

    fn handle_did_save(&self, not: Notification) -> Result<()> {
        let params: lsp_types::DidSaveTextDocumentParams = serde_json::from_value(not.params)?;
        let uri = params.text_document.uri;

        debug!("Document saved: {}", uri);
        self.workspace_manager.mark_document_saved(&uri);

        if self.config.synth.on_save {
            let document = uri
                .to_file_path()
                .map_err(|_| anyhow!("Invalid file URI: {}", uri))?;
            self.request_synth(SynthTrigger::Save, Some(document))?;
        }

        Ok(())
    }

    fn handle_did_close(&self, connection: &Connection, not: Notification) -> Result<()> {
        let params: lsp_types::DidCloseTextDocumentParams = serde_json::from_value(not.params)?;
        let uri = params.text_document.uri;

        debug!("Document closed: {}", uri);
        self.workspace_manager.remove_document(&uri);
        Self::publish_diagnostics(&connection.sender, uri, Vec::new(), None)
    }

    fn handle_did_change_workspace_folders(&self, not: Notification) -> Result<()> {
        let params: lsp_types::DidChangeWorkspaceFoldersParams =
            serde_json::from_value(not.params)?;

        let mut folders = self.workspace_manager.get_workspace_folders();
        folders.retain(|folder| !params.event.removed.contains(folder));
        folders.extend(params.event.added);
        self.workspace_manager.update_workspace_folders(folders);

        Ok(())
    }

    /// Queues a rebuild; without a document the project is searched from the first
    /// workspace folder.
    fn request_synth(&self, trigger: SynthTrigger, document: Option<PathBuf>) -> Result<u64> {
        let document = document.or_else(|| self.workspace_manager.get_workspace_root());
        let generation = self.synth.synthesize(trigger, document.clone())?;
        debug!(
            "Queued synthesis generation {} ({}) for {:?}",
            generation,
            trigger.as_str(),
            document
        );
        Ok(generation)
    }

    fn diagnostics_for_uri(&self, synthesis: &Synthesis, uri: &Url) -> Vec<Diagnostic> {
        match uri.to_file_path() {
            Ok(path) => synthesis.diagnostics_for(&path.to_string_lossy(), &self.violation_mapper),
            Err(_) => Vec::new(),
        }
    }

    fn handle_synth_event(
        sender: &Sender<Message>,
        workspace_manager: &WorkspaceManager,
        violation_mapper: &ViolationMapper,
        event: SynthEvent,
    ) -> Result<()> {
        match event {
            SynthEvent::Started {
                operation_id,
                generation,
                project_root,
            } => {
                debug!(
                    "Synthesis {} started (generation {}) in {:?}",
                    operation_id, generation, project_root
                );
                Ok(())
            }
            SynthEvent::Installed {
                synthesis,
                duration_ms,
                ..
            } => {
                let stats = Self::publish_synthesis_diagnostics(
                    sender,
                    workspace_manager,
                    violation_mapper,
                    &synthesis,
                )?;

                let notification = Notification::new(
                    SYNTH_UPDATED_NOTIFICATION.to_string(),
                    serde_json::json!({
                        "generation": synthesis.generation,
                        "durationMs": duration_ms,
                        "constructs": synthesis.tree.len(),
                        "violations": stats.total_count,
                        "files": stats.file_count,
                    }),
                );
                sender.send(notification.into())?;
                Ok(())
            }
            SynthEvent::Superseded { generation, .. } => {
                debug!("Synthesis generation {} superseded", generation);
                Ok(())
            }
            SynthEvent::Failed { error, .. } => {
                warn!("Synthesis failed: {}", error);
                let params = LogMessageParams {
                    typ: MessageType::WARNING,
                    message: format!("CDK synthesis failed: {}", error),
                };
                let notification =
                    Notification::new(LogMessage::METHOD.to_string(), serde_json::to_value(params)?);
                sender.send(notification.into())?;
                Ok(())
            }
        }
    }

    /// Republishes diagnostics for every open document against a new snapshot.
    pub fn publish_synthesis_diagnostics(
        sender: &Sender<Message>,
        workspace_manager: &WorkspaceManager,
        violation_mapper: &ViolationMapper,
        synthesis: &Synthesis,
    ) -> Result<DiagnosticStats> {
        let mut diagnostics_by_file: HashMap<PathBuf, Vec<Diagnostic>> = HashMap::new();

        for document in workspace_manager.get_open_documents() {
            let Some(path) = document.path() else {
                continue;
            };

            let diagnostics = synthesis.diagnostics_for(&path.to_string_lossy(), violation_mapper);
            debug!(
                "Publishing {} diagnostics for {} (generation {})",
                diagnostics.len(),
                document.uri,
                synthesis.generation
            );
            Self::publish_diagnostics(
                sender,
                document.uri.clone(),
                diagnostics.clone(),
                Some(document.version),
            )?;
            diagnostics_by_file.insert(path, diagnostics);
        }

        let stats = ViolationMapper::get_diagnostic_stats(&diagnostics_by_file);
        info!(
            "Published {} diagnostics across {} files for generation {}",
            stats.total_count, stats.file_count, synthesis.generation
        );
        Ok(stats)
    }

    fn publish_diagnostics(
        sender: &Sender<Message>,
        uri: Url,
        diagnostics: Vec<Diagnostic>,
        version: Option<i32>,
    ) -> Result<()> {
        let params = PublishDiagnosticsParams {
            uri,
            diagnostics,
            version,
        };
        let notification = Notification::new(
            PublishDiagnostics::METHOD.to_string(),
            serde_json::to_value(params)?,
        );
        sender.send(notification.into())?;
        Ok(())
    }

    fn respond<T: serde::Serialize>(connection: &Connection, id: RequestId, result: T) -> Result<()> {
        let response = Response::new_ok(id, result);
        connection.sender.send(response.into())?;
        Ok(())
    }

    fn query_key(uri: &Url, position: Position) -> Result<IndexKey> {
        let path = uri
            .to_file_path()
            .map_err(|_| anyhow!("Invalid file URI: {}", uri))?;
        Ok(IndexKey::new(&path.to_string_lossy(), position.line))
    }

    fn extract_path_from_value(value: &serde_json::Value) -> Result<PathBuf> {
        if let Some(path_str) = value.as_str() {
            return if path_str.starts_with("file://") {
                Url::parse(path_str)?
                    .to_file_path()
                    .map_err(|_| anyhow!("Invalid file URI: {}", path_str))
            } else {
                Ok(PathBuf::from(path_str))
            };
        }

        if let Some(obj) = value.as_object() {
            if let Some(fs_path) = obj.get("fsPath").and_then(|v| v.as_str()) {
                return Ok(PathBuf::from(fs_path));
            }

            if let Some(path) = obj.get("path").and_then(|v| v.as_str()) {
                return Ok(PathBuf::from(path));
            }

            return Err(anyhow!("URI object has no recognizable path field"));
        }

        Err(anyhow!(
            "Invalid path argument: expected string or URI object"
        ))
    }
}
