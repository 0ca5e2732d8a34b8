// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! VXLAN overlay provisioning across a set of hosts.
//!
//! Best-effort and sequenced, not transactional: the first failing step
//! aborts everything that follows, and steps already applied are not rolled
//! back. Callers resume by re-posting once the underlying problem is fixed.

use crate::nbctl::NbctlGateway;
use crate::reconcile::OvnError;
use ovn_admin_types::{HostProvisioned, OverlayReport, VxlanHost};
use slog::{Logger, info};

/// Fixed name of the shared overlay switch.
pub const OVERLAY_SWITCH_NAME: &str = "vxlan_overlay";

pub struct OverlayProvisioner<'a> {
    gateway: &'a dyn NbctlGateway,
    log: Logger,
}

impl<'a> OverlayProvisioner<'a> {
    pub fn new(gateway: &'a dyn NbctlGateway, log: Logger) -> Self {
        Self { gateway, log }
    }

    async fn run(&self, parts: &[&str]) -> Result<(), OvnError> {
        let args: Vec<String> =
            parts.iter().map(|part| part.to_string()).collect();
        self.gateway.run(&args).await?;
        Ok(())
    }

    /// Provision the overlay: the shared switch, then every host's logical
    /// port, then every host's VTEP. Port wiring completes for all hosts
    /// before any tunnel wiring begins, so a failure partway through phase
    /// two leaves every host fully ported rather than a half-ported,
    /// half-tunneled mix.
    pub async fn provision(
        &self,
        hosts: &[VxlanHost],
    ) -> Result<OverlayReport, OvnError> {
        self.run(&["ls-add", OVERLAY_SWITCH_NAME]).await?;
        info!(
            self.log, "created overlay switch";
            "switch" => OVERLAY_SWITCH_NAME,
            "hosts" => hosts.len(),
        );

        for host in hosts {
            let port = host.port_name();
            self.run(&["lsp-add", OVERLAY_SWITCH_NAME, &port]).await?;
            self.run(&["lsp-set-addresses", &port, &host.address_pair()])
                .await?;
            info!(
                self.log, "wired overlay port";
                "host" => &host.name,
                "port" => &port,
            );
        }

        for host in hosts {
            let vtep = host.vtep_name();
            self.run(&["vtep-add", &vtep]).await?;
            self.run(&["vtep-set-local-ip", &vtep, &host.vtep_ip.to_string()])
                .await?;
            self.run(&["vtep-bind-ls", &vtep, OVERLAY_SWITCH_NAME]).await?;
            info!(
                self.log, "bound overlay tunnel endpoint";
                "host" => &host.name,
                "vtep" => &vtep,
            );
        }

        Ok(OverlayReport {
            switch: OVERLAY_SWITCH_NAME.to_string(),
            hosts: hosts
                .iter()
                .map(|host| HostProvisioned {
                    name: host.name.clone(),
                    port: host.port_name(),
                    vtep: host.vtep_name(),
                })
                .collect(),
        })
    }
}
