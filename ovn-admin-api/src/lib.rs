// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use dropshot::{
    HttpError, HttpResponseCreated, HttpResponseDeleted, HttpResponseOk,
    Path, RequestContext, TypedBody,
};
use ovn_admin_types::{
    AclAction, AclDirection, AclRule, LoadBalancer, LogicalRouter,
    LogicalSwitch, OverlayReport, SwitchPort, VxlanHost,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[dropshot::api_description]
pub trait OvnAdminApi {
    type Context;

    /// Liveness marker; does not touch the external controller.
    #[endpoint {
        method = GET,
        path = "/api/health",
    }]
    async fn health_check(
        rqctx: RequestContext<Self::Context>,
    ) -> Result<HttpResponseOk<HealthStatus>, HttpError>;

    /// List all logical switches.
    #[endpoint {
        method = GET,
        path = "/api/logical-switches",
    }]
    async fn logical_switch_list(
        rqctx: RequestContext<Self::Context>,
    ) -> Result<HttpResponseOk<Vec<LogicalSwitch>>, HttpError>;

    /// Create a logical switch. The returned object is re-read from the
    /// controller, so it reflects any externally defaulted fields.
    #[endpoint {
        method = POST,
        path = "/api/logical-switches",
    }]
    async fn logical_switch_create(
        rqctx: RequestContext<Self::Context>,
        body: TypedBody<SwitchCreateParams>,
    ) -> Result<HttpResponseCreated<LogicalSwitch>, HttpError>;

    /// Fetch a single logical switch by name.
    #[endpoint {
        method = GET,
        path = "/api/logical-switches/{switch}",
    }]
    async fn logical_switch_get(
        rqctx: RequestContext<Self::Context>,
        path: Path<SwitchPathParams>,
    ) -> Result<HttpResponseOk<LogicalSwitch>, HttpError>;

    /// Update a logical switch's metadata. Only the `external_ids` keys
    /// present in the request are touched; omitted keys keep their values.
    #[endpoint {
        method = PUT,
        path = "/api/logical-switches/{switch}",
    }]
    async fn logical_switch_update(
        rqctx: RequestContext<Self::Context>,
        path: Path<SwitchPathParams>,
        body: TypedBody<SwitchUpdateParams>,
    ) -> Result<HttpResponseOk<LogicalSwitch>, HttpError>;

    /// Delete a logical switch. 404 if it does not exist; deleting also
    /// invalidates the switch's ports on the controller side.
    #[endpoint {
        method = DELETE,
        path = "/api/logical-switches/{switch}",
    }]
    async fn logical_switch_delete(
        rqctx: RequestContext<Self::Context>,
        path: Path<SwitchPathParams>,
    ) -> Result<HttpResponseDeleted, HttpError>;

    /// List the ports attached to a logical switch. A failed lookup renders
    /// as an empty list; callers cannot distinguish "no ports" from "could
    /// not ask".
    #[endpoint {
        method = GET,
        path = "/api/logical-switches/{switch}/ports",
    }]
    async fn logical_switch_port_list(
        rqctx: RequestContext<Self::Context>,
        path: Path<SwitchPathParams>,
    ) -> Result<HttpResponseOk<Vec<SwitchPort>>, HttpError>;

    /// List all logical routers.
    #[endpoint {
        method = GET,
        path = "/api/logical-routers",
    }]
    async fn logical_router_list(
        rqctx: RequestContext<Self::Context>,
    ) -> Result<HttpResponseOk<Vec<LogicalRouter>>, HttpError>;

    /// Create a logical router.
    #[endpoint {
        method = POST,
        path = "/api/logical-routers",
    }]
    async fn logical_router_create(
        rqctx: RequestContext<Self::Context>,
        body: TypedBody<RouterCreateParams>,
    ) -> Result<HttpResponseCreated<LogicalRouter>, HttpError>;

    /// Create an ACL scoped to a logical switch. 404 if the parent switch
    /// does not exist.
    #[endpoint {
        method = POST,
        path = "/api/acls",
    }]
    async fn acl_create(
        rqctx: RequestContext<Self::Context>,
        body: TypedBody<AclCreateParams>,
    ) -> Result<HttpResponseCreated<AclRule>, HttpError>;

    /// List all load balancers.
    #[endpoint {
        method = GET,
        path = "/api/load-balancers",
    }]
    async fn load_balancer_list(
        rqctx: RequestContext<Self::Context>,
    ) -> Result<HttpResponseOk<Vec<LoadBalancer>>, HttpError>;

    /// Create a load balancer mapping one VIP to a set of backends.
    #[endpoint {
        method = POST,
        path = "/api/load-balancers",
    }]
    async fn load_balancer_create(
        rqctx: RequestContext<Self::Context>,
        body: TypedBody<LoadBalancerCreateParams>,
    ) -> Result<HttpResponseCreated<LoadBalancer>, HttpError>;

    /// Delete a load balancer. 404 if it does not exist.
    #[endpoint {
        method = DELETE,
        path = "/api/load-balancers/{lb}",
    }]
    async fn load_balancer_delete(
        rqctx: RequestContext<Self::Context>,
        path: Path<LoadBalancerPathParams>,
    ) -> Result<HttpResponseDeleted, HttpError>;

    /// Provision a VXLAN overlay across a set of hosts: one shared overlay
    /// switch, then a logical port per host, then a VTEP per host bound to
    /// the switch. Best-effort: first error aborts, already-provisioned
    /// hosts are not rolled back.
    #[endpoint {
        method = POST,
        path = "/configure_vxlan",
    }]
    async fn vxlan_configure(
        rqctx: RequestContext<Self::Context>,
        body: TypedBody<VxlanConfigureParams>,
    ) -> Result<HttpResponseOk<VxlanConfigureResponse>, HttpError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct HealthStatus {
    pub status: String,
    pub message: String,
}

impl HealthStatus {
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            message: "OVN admin server is running".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct SwitchPathParams {
    /// Name of the logical switch.
    pub switch: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct LoadBalancerPathParams {
    /// Name of the load balancer.
    pub lb: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct SwitchCreateParams {
    pub name: String,
    #[serde(default)]
    pub external_ids: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct SwitchUpdateParams {
    /// Keys to set; existing keys not named here are left untouched.
    #[serde(default)]
    pub external_ids: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct RouterCreateParams {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct AclCreateParams {
    /// Name of the parent logical switch.
    pub switch: String,
    #[serde(default)]
    pub direction: AclDirection,
    #[serde(default = "AclCreateParams::default_priority")]
    pub priority: i64,
    /// Match expression in OVN's match language.
    #[serde(rename = "match")]
    pub match_expr: String,
    #[serde(default)]
    pub action: AclAction,
}

impl AclCreateParams {
    fn default_priority() -> i64 {
        ovn_admin_types::DEFAULT_ACL_PRIORITY
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct LoadBalancerCreateParams {
    pub name: String,
    /// Virtual IP, optionally `addr:port`.
    pub vip: String,
    /// Backend endpoints the VIP balances across.
    pub backends: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct VxlanConfigureParams {
    pub hosts: Vec<VxlanHost>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct VxlanConfigureResponse {
    pub success: String,
    pub report: OverlayReport,
}

impl VxlanConfigureResponse {
    pub fn new(report: OverlayReport) -> Self {
        Self {
            success: "VXLAN overlays configured successfully".to_string(),
            report,
        }
    }
}
