// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::nbctl::NbctlGateway;
use crate::reconcile::Reconciler;
use crate::vxlan::OverlayProvisioner;
use slog::Logger;
use std::sync::Arc;

pub struct ServerContext {
    gateway: Arc<dyn NbctlGateway>,
    log: Logger,
}

impl ServerContext {
    pub fn new(gateway: Arc<dyn NbctlGateway>, log: Logger) -> Self {
        Self { gateway, log }
    }

    pub fn log(&self) -> &Logger {
        &self.log
    }

    pub fn reconciler(&self) -> Reconciler<'_> {
        Reconciler::new(
            &*self.gateway,
            self.log.new(slog::o!("component" => "Reconciler")),
        )
    }

    pub fn provisioner(&self) -> OverlayProvisioner<'_> {
        OverlayProvisioner::new(
            &*self.gateway,
            self.log.new(slog::o!("component" => "OverlayProvisioner")),
        )
    }
}
