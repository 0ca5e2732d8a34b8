// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Executable program to run ovn-admin, the OVN northbound admin server.

use anyhow::{Context, anyhow};
use camino::Utf8PathBuf;
use clap::Parser;
use ovn_admin::{Config, NbctlCli};
use std::sync::Arc;

#[derive(Debug, Parser)]
#[clap(name = "ovn-admin", about = "Admin server for OVN northbound objects")]
struct Args {
    #[clap(name = "CONFIG_FILE_PATH", action)]
    config_file_path: Utf8PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::from_file(&args.config_file_path)
        .with_context(|| {
            format!("failed to load config from {}", args.config_file_path)
        })?;
    let gateway = Arc::new(NbctlCli::new(&config.nbctl));

    let server = ovn_admin::start_server(config, gateway)
        .await
        .context("failed to start server")?;
    server.await.map_err(|err| anyhow!("server exited: {err}"))
}
