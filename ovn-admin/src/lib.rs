// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Admin server for OVN northbound objects: a dropshot HTTP facade over the
//! `ovn-nbctl` CLI with idempotent reconciliation semantics.

use slog_error_chain::SlogInlineError;
use std::io;
use std::sync::Arc;

mod config;
mod context;
mod http_entrypoints;
mod nbctl;
mod reconcile;
mod vxlan;

pub mod fakes;

pub use config::{Config, LoadError, NbctlConfig};
pub use context::ServerContext;
pub use nbctl::{GatewayError, NbctlCli, NbctlGateway};
pub use reconcile::{OvnError, Reconciler};
pub use vxlan::{OverlayProvisioner, OVERLAY_SWITCH_NAME};

#[derive(Debug, thiserror::Error, SlogInlineError)]
pub enum StartError {
    #[error("failed to initialize logger")]
    InitializeLogger(#[source] io::Error),
    #[error("failed to initialize HTTP server")]
    InitializeHttpServer(#[source] dropshot::BuildError),
}

pub type Server = dropshot::HttpServer<Arc<ServerContext>>;

/// Start the dropshot server, routing all controller traffic through the
/// given gateway.
pub async fn start_server(
    config: Config,
    gateway: Arc<dyn NbctlGateway>,
) -> Result<Server, StartError> {
    let log = config
        .log
        .to_logger("ovn-admin")
        .map_err(StartError::InitializeLogger)?;

    let context = ServerContext::new(
        gateway,
        log.new(slog::o!("component" => "ServerContext")),
    );
    dropshot::ServerBuilder::new(
        http_entrypoints::api(),
        Arc::new(context),
        log.new(slog::o!("component" => "dropshot")),
    )
    .config(config.dropshot)
    .start()
    .map_err(StartError::InitializeHttpServer)
}
