// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::context::ServerContext;
use dropshot::HttpError;
use dropshot::{
    HttpResponseCreated, HttpResponseDeleted, HttpResponseOk, Path,
    RequestContext, TypedBody,
};
use ovn_admin_api::*;
use ovn_admin_types::{
    AclRule, LoadBalancer, LogicalRouter, LogicalSwitch, SwitchPort,
};
use slog::warn;
use slog_error_chain::InlineErrorChain;
use std::sync::Arc;

type OvnApiDescription = dropshot::ApiDescription<Arc<ServerContext>>;

pub fn api() -> OvnApiDescription {
    ovn_admin_api_mod::api_description::<OvnAdminImpl>()
        .expect("registered entrypoints")
}

fn not_found(kind: &str, name: &str) -> HttpError {
    HttpError::for_not_found(None, format!("{kind} {name:?} not found"))
}

enum OvnAdminImpl {}

impl OvnAdminApi for OvnAdminImpl {
    type Context = Arc<ServerContext>;

    async fn health_check(
        _rqctx: RequestContext<Self::Context>,
    ) -> Result<HttpResponseOk<HealthStatus>, HttpError> {
        Ok(HttpResponseOk(HealthStatus::healthy()))
    }

    async fn logical_switch_list(
        rqctx: RequestContext<Self::Context>,
    ) -> Result<HttpResponseOk<Vec<LogicalSwitch>>, HttpError> {
        let ctx = rqctx.context();
        let switches = ctx.reconciler().switch_list().await?;
        Ok(HttpResponseOk(switches))
    }

    async fn logical_switch_create(
        rqctx: RequestContext<Self::Context>,
        body: TypedBody<SwitchCreateParams>,
    ) -> Result<HttpResponseCreated<LogicalSwitch>, HttpError> {
        let ctx = rqctx.context();
        let params = body.into_inner();
        let switch = ctx.reconciler().switch_create(&params).await?;
        Ok(HttpResponseCreated(switch))
    }

    async fn logical_switch_get(
        rqctx: RequestContext<Self::Context>,
        path: Path<SwitchPathParams>,
    ) -> Result<HttpResponseOk<LogicalSwitch>, HttpError> {
        let ctx = rqctx.context();
        let name = path.into_inner().switch;
        match ctx.reconciler().switch_get(&name).await? {
            Some(switch) => Ok(HttpResponseOk(switch)),
            None => Err(not_found("logical switch", &name)),
        }
    }

    async fn logical_switch_update(
        rqctx: RequestContext<Self::Context>,
        path: Path<SwitchPathParams>,
        body: TypedBody<SwitchUpdateParams>,
    ) -> Result<HttpResponseOk<LogicalSwitch>, HttpError> {
        let ctx = rqctx.context();
        let name = path.into_inner().switch;
        let params = body.into_inner();
        match ctx.reconciler().switch_update(&name, &params).await? {
            Some(switch) => Ok(HttpResponseOk(switch)),
            None => Err(not_found("logical switch", &name)),
        }
    }

    async fn logical_switch_delete(
        rqctx: RequestContext<Self::Context>,
        path: Path<SwitchPathParams>,
    ) -> Result<HttpResponseDeleted, HttpError> {
        let ctx = rqctx.context();
        let name = path.into_inner().switch;
        if ctx.reconciler().switch_delete(&name).await? {
            Ok(HttpResponseDeleted())
        } else {
            Err(not_found("logical switch", &name))
        }
    }

    async fn logical_switch_port_list(
        rqctx: RequestContext<Self::Context>,
        path: Path<SwitchPathParams>,
    ) -> Result<HttpResponseOk<Vec<SwitchPort>>, HttpError> {
        let ctx = rqctx.context();
        let name = path.into_inner().switch;
        // The listing contract is "nothing to show" for both an empty switch
        // and a failed lookup; render failures as an empty list.
        match ctx.reconciler().switch_ports(&name).await {
            Ok(ports) => Ok(HttpResponseOk(ports)),
            Err(err) => {
                warn!(
                    ctx.log(),
                    "failed to list switch ports; rendering empty list";
                    "switch" => &name,
                    "err" => %InlineErrorChain::new(&err),
                );
                Ok(HttpResponseOk(Vec::new()))
            }
        }
    }

    async fn logical_router_list(
        rqctx: RequestContext<Self::Context>,
    ) -> Result<HttpResponseOk<Vec<LogicalRouter>>, HttpError> {
        let ctx = rqctx.context();
        let routers = ctx.reconciler().router_list().await?;
        Ok(HttpResponseOk(routers))
    }

    async fn logical_router_create(
        rqctx: RequestContext<Self::Context>,
        body: TypedBody<RouterCreateParams>,
    ) -> Result<HttpResponseCreated<LogicalRouter>, HttpError> {
        let ctx = rqctx.context();
        let params = body.into_inner();
        let router = ctx.reconciler().router_create(&params).await?;
        Ok(HttpResponseCreated(router))
    }

    async fn acl_create(
        rqctx: RequestContext<Self::Context>,
        body: TypedBody<AclCreateParams>,
    ) -> Result<HttpResponseCreated<AclRule>, HttpError> {
        let ctx = rqctx.context();
        let params = body.into_inner();
        match ctx.reconciler().acl_create(&params).await? {
            Some(rule) => Ok(HttpResponseCreated(rule)),
            None => Err(not_found("logical switch", &params.switch)),
        }
    }

    async fn load_balancer_list(
        rqctx: RequestContext<Self::Context>,
    ) -> Result<HttpResponseOk<Vec<LoadBalancer>>, HttpError> {
        let ctx = rqctx.context();
        let lbs = ctx.reconciler().lb_list().await?;
        Ok(HttpResponseOk(lbs))
    }

    async fn load_balancer_create(
        rqctx: RequestContext<Self::Context>,
        body: TypedBody<LoadBalancerCreateParams>,
    ) -> Result<HttpResponseCreated<LoadBalancer>, HttpError> {
        let ctx = rqctx.context();
        let params = body.into_inner();
        let lb = ctx.reconciler().lb_create(&params).await?;
        Ok(HttpResponseCreated(lb))
    }

    async fn load_balancer_delete(
        rqctx: RequestContext<Self::Context>,
        path: Path<LoadBalancerPathParams>,
    ) -> Result<HttpResponseDeleted, HttpError> {
        let ctx = rqctx.context();
        let name = path.into_inner().lb;
        if ctx.reconciler().lb_delete(&name).await? {
            Ok(HttpResponseDeleted())
        } else {
            Err(not_found("load balancer", &name))
        }
    }

    async fn vxlan_configure(
        rqctx: RequestContext<Self::Context>,
        body: TypedBody<VxlanConfigureParams>,
    ) -> Result<HttpResponseOk<VxlanConfigureResponse>, HttpError> {
        let ctx = rqctx.context();
        let params = body.into_inner();
        let report = ctx.provisioner().provision(&params.hosts).await?;
        Ok(HttpResponseOk(VxlanConfigureResponse::new(report)))
    }
}
