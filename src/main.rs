//! CDK LSP server entry point
//!
//! Synthesis runs on a dedicated worker thread owned by the server, so the LSP
//! message loop keeps answering navigation requests from the last snapshot while a
//! rebuild is in progress.

use anyhow::{Context, Result};
use lsp_server::{Connection, Message};
use lsp_types::{
    CallHierarchyServerCapability, ExecuteCommandOptions, ImplementationProviderCapability,
    InitializeParams, OneOf, ServerCapabilities, TextDocumentSyncCapability, TextDocumentSyncKind,
    WorkDoneProgressOptions, WorkspaceFoldersServerCapabilities, WorkspaceServerCapabilities,
};
use std::{env, sync::Arc};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use cdk_lsp::{server::SYNTH_COMMAND, *};

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() > 1 && (args[1] == "--version" || args[1] == "-V") {
        println!("cdk-lsp {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting CDK LSP server");

    let (connection, io_threads) = Connection::stdio();

    let server_capabilities = serde_json::to_value(ServerCapabilities {
        text_document_sync: Some(TextDocumentSyncCapability::Kind(TextDocumentSyncKind::FULL)),
        call_hierarchy_provider: Some(CallHierarchyServerCapability::Simple(true)),
        implementation_provider: Some(ImplementationProviderCapability::Simple(true)),
        execute_command_provider: Some(ExecuteCommandOptions {
            commands: vec![SYNTH_COMMAND.to_string()],
            work_done_progress_options: WorkDoneProgressOptions {
                work_done_progress: Some(false),
            },
        }),
        workspace: Some(WorkspaceServerCapabilities {
            workspace_folders: Some(WorkspaceFoldersServerCapabilities {
                supported: Some(true),
                change_notifications: Some(OneOf::Left(true)),
            }),
            file_operations: None,
        }),
        ..Default::default()
    })?;

    let init_params = connection.initialize(server_capabilities)?;
    let init_params: InitializeParams =
        serde_json::from_value(init_params).context("Malformed initialize params")?;

    let config = match &init_params.initialization_options {
        Some(options) => CdkLspConfig::from_lsp_value(options.clone()).unwrap_or_else(|e| {
            warn!("Ignoring malformed initialization options: {}", e);
            CdkLspConfig::default()
        }),
        None => CdkLspConfig::default(),
    };
    let config = match config.validate() {
        Ok(()) => config,
        Err(reason) => {
            warn!("Invalid configuration, falling back to defaults: {}", reason);
            CdkLspConfig::default()
        }
    };

    main_loop(connection, init_params, config).await?;

    io_threads.join()?;
    info!("Shutting down CDK LSP server");
    Ok(())
}

async fn main_loop(
    connection: Connection,
    init_params: InitializeParams,
    config: CdkLspConfig,
) -> Result<()> {
    info!("Starting main loop");

    let server = Arc::new(
        CdkLspServer::new(&init_params, config, connection.sender.clone())
            .context("Failed to start server")?,
    );
    let connection = Arc::new(connection);

    for msg in &connection.receiver {
        match msg {
            Message::Request(req) => {
                if connection.handle_shutdown(&req)? {
                    break;
                }

                let server = server.clone();
                let connection = connection.clone();
                tokio::spawn(async move {
                    server.process_request(&connection, req);
                });
            }
            Message::Notification(not) => {
                server.process_notification(&connection, not);
            }
            Message::Response(_) => {}
        }
    }

    server.shutdown();

    Ok(())
}
