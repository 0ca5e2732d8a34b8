// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Idempotent CRUD over northbound objects, layered on the gateway.
//!
//! Absence is an outcome, not an error: reads and updates return
//! `Ok(None)` and deletes return `Ok(false)` for resources that do not
//! exist. Only validation failures, controller unavailability, command
//! failures, and undecodable output are errors.

use crate::nbctl::{GatewayError, NbctlGateway};
use backoff::ExponentialBackoff;
use dropshot::HttpError;
use ovn_admin_api::{
    AclCreateParams, LoadBalancerCreateParams, RouterCreateParams,
    SwitchCreateParams, SwitchUpdateParams,
};
use ovn_admin_types::{
    AclRule, LoadBalancer, LogicalRouter, LogicalSwitch, ParseError,
    SwitchPort,
};
use slog::{Logger, info, warn};
use slog_error_chain::{InlineErrorChain, SlogInlineError};
use std::time::Duration;

const JSON_FORMAT: &str = "--format=json";

#[derive(Debug, thiserror::Error, SlogInlineError)]
pub enum OvnError {
    #[error("invalid request: {0}")]
    Validation(String),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("failed to decode `ovn-nbctl` output {stdout:?}")]
    Decode {
        stdout: String,
        #[source]
        err: ParseError,
    },
    #[error("{kind} {name:?} not visible after create")]
    CreateVanished { kind: &'static str, name: String },
}

impl From<OvnError> for HttpError {
    fn from(err: OvnError) -> Self {
        match err {
            OvnError::Validation(_) => {
                let message = InlineErrorChain::new(&err).to_string();
                HttpError::for_bad_request(None, message)
            }
            OvnError::Gateway(_)
            | OvnError::Decode { .. }
            | OvnError::CreateVanished { .. } => {
                let message = InlineErrorChain::new(&err).to_string();
                HttpError {
                    status_code:
                        dropshot::ErrorStatusCode::INTERNAL_SERVER_ERROR,
                    error_code: Some(String::from("Internal")),
                    external_message: message.clone(),
                    internal_message: message,
                    headers: None,
                }
            }
        }
    }
}

/// Retry policy for transient controller unavailability: bounded, short,
/// and never applied to deterministic command failures.
fn unavailable_retry_policy() -> ExponentialBackoff {
    const INITIAL_INTERVAL: Duration = Duration::from_millis(50);
    const MAX_INTERVAL: Duration = Duration::from_millis(250);
    const GIVE_UP: Duration = Duration::from_secs(1);
    ExponentialBackoff {
        current_interval: INITIAL_INTERVAL,
        initial_interval: INITIAL_INTERVAL,
        multiplier: 2.0,
        max_interval: MAX_INTERVAL,
        max_elapsed_time: Some(GIVE_UP),
        ..ExponentialBackoff::default()
    }
}

fn to_args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|part| part.to_string()).collect()
}

pub struct Reconciler<'a> {
    gateway: &'a dyn NbctlGateway,
    log: Logger,
}

impl<'a> Reconciler<'a> {
    pub fn new(gateway: &'a dyn NbctlGateway, log: Logger) -> Self {
        Self { gateway, log }
    }

    async fn run(&self, args: Vec<String>) -> Result<String, OvnError> {
        let stdout = backoff::future::retry_notify(
            unavailable_retry_policy(),
            || async {
                self.gateway.run(&args).await.map_err(|err| match err {
                    GatewayError::Unavailable { .. } => {
                        backoff::Error::transient(err)
                    }
                    other => backoff::Error::permanent(other),
                })
            },
            |err, delay| {
                warn!(
                    self.log,
                    "OVN controller unavailable; will retry";
                    "retry_after" => ?delay,
                    "err" => %InlineErrorChain::new(&err),
                );
            },
        )
        .await?;
        Ok(stdout)
    }

    fn decode<T>(
        stdout: String,
        parse: impl FnOnce(&str) -> Result<T, ParseError>,
    ) -> Result<T, OvnError> {
        parse(&stdout).map_err(|err| OvnError::Decode { stdout, err })
    }

    // Logical switches

    pub async fn switch_list(&self) -> Result<Vec<LogicalSwitch>, OvnError> {
        let stdout = self
            .run(to_args(&[JSON_FORMAT, "list", "Logical_Switch"]))
            .await?;
        Self::decode(stdout, LogicalSwitch::parse_list)
    }

    pub async fn switch_get(
        &self,
        name: &str,
    ) -> Result<Option<LogicalSwitch>, OvnError> {
        let stdout = match self
            .run(to_args(&[JSON_FORMAT, "list", "Logical_Switch", name]))
            .await
        {
            Ok(stdout) => stdout,
            // A failed single-row query means the row does not exist.
            // Unavailability and decode failures still propagate.
            Err(OvnError::Gateway(GatewayError::Command(_))) => {
                return Ok(None);
            }
            Err(err) => return Err(err),
        };
        let switches = Self::decode(stdout, LogicalSwitch::parse_list)?;
        Ok(switches.into_iter().next())
    }

    pub async fn switch_create(
        &self,
        params: &SwitchCreateParams,
    ) -> Result<LogicalSwitch, OvnError> {
        let name = required_name(&params.name, "switch name")?;
        let mut args = to_args(&["ls-add", name]);
        if !params.external_ids.is_empty() {
            args.extend(to_args(&["--", "set", "Logical_Switch", name]));
            for (key, value) in &params.external_ids {
                args.push(format!("external_ids:{key}={value}"));
            }
        }
        self.run(args).await?;
        info!(self.log, "created logical switch"; "switch" => name);
        // Hand back what the controller now has, not what we sent, so
        // externally defaulted fields are reflected.
        self.switch_get(name).await?.ok_or_else(|| {
            OvnError::CreateVanished {
                kind: "logical switch",
                name: name.to_string(),
            }
        })
    }

    pub async fn switch_update(
        &self,
        name: &str,
        params: &SwitchUpdateParams,
    ) -> Result<Option<LogicalSwitch>, OvnError> {
        // Never mutate (and in particular never create) a resource the
        // controller doesn't currently have.
        if self.switch_get(name).await?.is_none() {
            return Ok(None);
        }
        if !params.external_ids.is_empty() {
            let mut args = to_args(&["set", "Logical_Switch", name]);
            for (key, value) in &params.external_ids {
                args.push(format!("external_ids:{key}={value}"));
            }
            self.run(args).await?;
            info!(self.log, "updated logical switch"; "switch" => name);
        }
        self.switch_get(name).await
    }

    pub async fn switch_delete(&self, name: &str) -> Result<bool, OvnError> {
        if self.switch_get(name).await?.is_none() {
            return Ok(false);
        }
        self.run(to_args(&["ls-del", name])).await?;
        info!(self.log, "deleted logical switch"; "switch" => name);
        Ok(true)
    }

    pub async fn switch_ports(
        &self,
        name: &str,
    ) -> Result<Vec<SwitchPort>, OvnError> {
        let stdout =
            self.run(to_args(&[JSON_FORMAT, "lsp-list", name])).await?;
        Self::decode(stdout, SwitchPort::parse_list)
    }

    // Logical routers

    pub async fn router_list(&self) -> Result<Vec<LogicalRouter>, OvnError> {
        let stdout = self
            .run(to_args(&[JSON_FORMAT, "list", "Logical_Router"]))
            .await?;
        Self::decode(stdout, LogicalRouter::parse_list)
    }

    pub async fn router_create(
        &self,
        params: &RouterCreateParams,
    ) -> Result<LogicalRouter, OvnError> {
        let name = required_name(&params.name, "router name")?;
        self.run(to_args(&["lr-add", name])).await?;
        info!(self.log, "created logical router"; "router" => name);
        self.router_get(name).await?.ok_or_else(|| {
            OvnError::CreateVanished {
                kind: "logical router",
                name: name.to_string(),
            }
        })
    }

    async fn router_get(
        &self,
        name: &str,
    ) -> Result<Option<LogicalRouter>, OvnError> {
        let stdout = match self
            .run(to_args(&[JSON_FORMAT, "list", "Logical_Router", name]))
            .await
        {
            Ok(stdout) => stdout,
            Err(OvnError::Gateway(GatewayError::Command(_))) => {
                return Ok(None);
            }
            Err(err) => return Err(err),
        };
        let routers = Self::decode(stdout, LogicalRouter::parse_list)?;
        Ok(routers.into_iter().next())
    }

    // ACLs

    /// Create an ACL on its parent switch. Returns `Ok(None)` if the parent
    /// switch does not exist; ACLs are never created against an absent
    /// parent.
    pub async fn acl_create(
        &self,
        params: &AclCreateParams,
    ) -> Result<Option<AclRule>, OvnError> {
        let switch = required_name(&params.switch, "switch name")?;
        if params.match_expr.trim().is_empty() {
            return Err(OvnError::Validation(
                "match expression is required".to_string(),
            ));
        }
        if self.switch_get(switch).await?.is_none() {
            return Ok(None);
        }
        self.run(to_args(&[
            "acl-add",
            switch,
            &params.direction.to_string(),
            &params.priority.to_string(),
            &params.match_expr,
            &params.action.to_string(),
        ]))
        .await?;
        info!(
            self.log, "created ACL";
            "switch" => switch,
            "direction" => %params.direction,
            "priority" => params.priority,
        );
        Ok(Some(AclRule {
            direction: params.direction,
            priority: params.priority,
            match_expr: params.match_expr.clone(),
            action: params.action,
        }))
    }

    // Load balancers

    pub async fn lb_list(&self) -> Result<Vec<LoadBalancer>, OvnError> {
        let stdout = self
            .run(to_args(&[JSON_FORMAT, "list", "Load_Balancer"]))
            .await?;
        Self::decode(stdout, LoadBalancer::parse_list)
    }

    pub async fn lb_create(
        &self,
        params: &LoadBalancerCreateParams,
    ) -> Result<LoadBalancer, OvnError> {
        let name = required_name(&params.name, "load balancer name")?;
        let vip = required_name(&params.vip, "load balancer VIP")?;
        if params.backends.is_empty() {
            return Err(OvnError::Validation(
                "at least one backend is required".to_string(),
            ));
        }
        self.run(to_args(&["lb-add", name, vip, &params.backends.join(",")]))
            .await?;
        info!(self.log, "created load balancer"; "lb" => name);
        self.lb_get(name).await?.ok_or_else(|| OvnError::CreateVanished {
            kind: "load balancer",
            name: name.to_string(),
        })
    }

    pub async fn lb_delete(&self, name: &str) -> Result<bool, OvnError> {
        if self.lb_get(name).await?.is_none() {
            return Ok(false);
        }
        self.run(to_args(&["lb-del", name])).await?;
        info!(self.log, "deleted load balancer"; "lb" => name);
        Ok(true)
    }

    async fn lb_get(
        &self,
        name: &str,
    ) -> Result<Option<LoadBalancer>, OvnError> {
        let stdout = match self
            .run(to_args(&[JSON_FORMAT, "list", "Load_Balancer", name]))
            .await
        {
            Ok(stdout) => stdout,
            Err(OvnError::Gateway(GatewayError::Command(_))) => {
                return Ok(None);
            }
            Err(err) => return Err(err),
        };
        let lbs = Self::decode(stdout, LoadBalancer::parse_list)?;
        Ok(lbs.into_iter().next())
    }
}

fn required_name<'n>(
    name: &'n str,
    what: &str,
) -> Result<&'n str, OvnError> {
    if name.trim().is_empty() {
        return Err(OvnError::Validation(format!("{what} is required")));
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::FakeNbctl;
    use ovn_admin_types::{AclAction, AclDirection};
    use std::collections::BTreeMap;

    fn test_logger(name: &'static str) -> Logger {
        Logger::root(slog::Discard, slog::o!("test" => name))
    }

    fn ids(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn create_then_read_equivalence() {
        let fake = FakeNbctl::new();
        let reconciler =
            Reconciler::new(&fake, test_logger("create_then_read"));
        let created = reconciler
            .switch_create(&SwitchCreateParams {
                name: "sw0".to_string(),
                external_ids: ids(&[("owner", "admin")]),
            })
            .await
            .expect("created switch");
        let read = reconciler
            .switch_get("sw0")
            .await
            .expect("read switch")
            .expect("switch exists");
        assert_eq!(created, read);
        assert_eq!(read.external_ids, ids(&[("owner", "admin")]));
    }

    #[tokio::test]
    async fn create_requires_a_name() {
        let fake = FakeNbctl::new();
        let reconciler =
            Reconciler::new(&fake, test_logger("create_requires_name"));
        let err = reconciler
            .switch_create(&SwitchCreateParams {
                name: "  ".to_string(),
                external_ids: BTreeMap::new(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, OvnError::Validation(_)));
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn duplicate_create_surfaces_controller_rejection() {
        let fake = FakeNbctl::new();
        let reconciler =
            Reconciler::new(&fake, test_logger("duplicate_create"));
        let params = SwitchCreateParams {
            name: "sw0".to_string(),
            external_ids: BTreeMap::new(),
        };
        reconciler.switch_create(&params).await.expect("first create");
        let err = reconciler.switch_create(&params).await.unwrap_err();
        assert!(matches!(
            err,
            OvnError::Gateway(GatewayError::Command(_))
        ));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let fake = FakeNbctl::new();
        let reconciler =
            Reconciler::new(&fake, test_logger("delete_idempotent"));
        reconciler
            .switch_create(&SwitchCreateParams {
                name: "sw0".to_string(),
                external_ids: BTreeMap::new(),
            })
            .await
            .expect("created switch");
        assert!(reconciler.switch_delete("sw0").await.expect("first delete"));
        assert!(
            !reconciler.switch_delete("sw0").await.expect("second delete"),
            "second delete must report absence, not fail"
        );
    }

    #[tokio::test]
    async fn update_on_absent_switch_issues_no_mutations() {
        let fake = FakeNbctl::new();
        let reconciler =
            Reconciler::new(&fake, test_logger("update_absent"));
        let result = reconciler
            .switch_update(
                "ghost",
                &SwitchUpdateParams { external_ids: ids(&[("a", "1")]) },
            )
            .await
            .expect("update completed");
        assert!(result.is_none());
        // The only gateway traffic was the existence probe.
        assert_eq!(fake.calls_matching(&["set", "Logical_Switch"]), 0);
        assert_eq!(
            fake.calls_matching(&["list", "Logical_Switch", "ghost"]),
            1
        );
    }

    #[tokio::test]
    async fn partial_update_preserves_other_keys() {
        let fake = FakeNbctl::new();
        let reconciler =
            Reconciler::new(&fake, test_logger("partial_update"));
        reconciler
            .switch_create(&SwitchCreateParams {
                name: "sw0".to_string(),
                external_ids: ids(&[("a", "1"), ("b", "2")]),
            })
            .await
            .expect("created switch");
        let updated = reconciler
            .switch_update(
                "sw0",
                &SwitchUpdateParams { external_ids: ids(&[("b", "3")]) },
            )
            .await
            .expect("update completed")
            .expect("switch exists");
        assert_eq!(updated.external_ids, ids(&[("a", "1"), ("b", "3")]));
    }

    #[tokio::test]
    async fn unavailable_controller_fails_every_operation() {
        let fake = FakeNbctl::new();
        fake.set_unavailable();
        let reconciler =
            Reconciler::new(&fake, test_logger("unavailable"));
        let err = reconciler.switch_list().await.unwrap_err();
        assert!(matches!(
            err,
            OvnError::Gateway(GatewayError::Unavailable { .. })
        ));
        let err = reconciler.switch_delete("sw0").await.unwrap_err();
        assert!(matches!(
            err,
            OvnError::Gateway(GatewayError::Unavailable { .. })
        ));
        // Nothing got through to the controller.
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn command_failures_are_not_retried() {
        let fake = FakeNbctl::new();
        fake.fail_matching(&["lr-add"], "permission denied");
        let reconciler =
            Reconciler::new(&fake, test_logger("no_retry_on_command"));
        let err = reconciler
            .router_create(&RouterCreateParams { name: "r0".to_string() })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OvnError::Gateway(GatewayError::Command(_))
        ));
        assert_eq!(fake.calls_matching(&["lr-add"]), 1);
    }

    #[tokio::test]
    async fn malformed_list_output_is_a_decode_error() {
        let fake = FakeNbctl::new();
        fake.respond_matching(
            &["list", "Logical_Switch"],
            "ovn-nbctl: not json",
        );
        let reconciler =
            Reconciler::new(&fake, test_logger("malformed_list"));
        let err = reconciler.switch_list().await.unwrap_err();
        assert!(matches!(err, OvnError::Decode { .. }));
    }

    #[tokio::test]
    async fn malformed_port_listing_is_a_decode_error() {
        let fake = FakeNbctl::new();
        let reconciler =
            Reconciler::new(&fake, test_logger("malformed_ports"));
        reconciler
            .switch_create(&SwitchCreateParams {
                name: "sw0".to_string(),
                external_ids: BTreeMap::new(),
            })
            .await
            .expect("created switch");
        fake.respond_matching(&["lsp-list", "sw0"], "<garbage>");
        let err = reconciler.switch_ports("sw0").await.unwrap_err();
        // The reconciler reports the failure; rendering it as an empty list
        // is the HTTP handler's choice, not ours.
        assert!(matches!(err, OvnError::Decode { .. }));
    }

    #[tokio::test]
    async fn acl_create_requires_existing_parent_switch() {
        let fake = FakeNbctl::new();
        let reconciler = Reconciler::new(&fake, test_logger("acl_parent"));
        let params = AclCreateParams {
            switch: "ghost".to_string(),
            direction: AclDirection::ToLport,
            priority: 1000,
            match_expr: "ip4.src == 10.0.0.0/24".to_string(),
            action: AclAction::Allow,
        };
        let result =
            reconciler.acl_create(&params).await.expect("acl create ran");
        assert!(result.is_none());
        assert_eq!(fake.calls_matching(&["acl-add"]), 0);
    }

    #[tokio::test]
    async fn acl_create_spells_arguments_like_the_cli() {
        let fake = FakeNbctl::new();
        let reconciler = Reconciler::new(&fake, test_logger("acl_args"));
        reconciler
            .switch_create(&SwitchCreateParams {
                name: "sw0".to_string(),
                external_ids: BTreeMap::new(),
            })
            .await
            .expect("created switch");
        let rule = reconciler
            .acl_create(&AclCreateParams {
                switch: "sw0".to_string(),
                direction: AclDirection::FromLport,
                priority: 2002,
                match_expr: "tcp.dst == 22".to_string(),
                action: AclAction::Reject,
            })
            .await
            .expect("acl create ran")
            .expect("parent exists");
        assert_eq!(rule.action, AclAction::Reject);
        assert_eq!(
            fake.calls_matching(&[
                "acl-add",
                "sw0",
                "from-lport",
                "2002",
                "tcp.dst == 22",
                "reject",
            ]),
            1
        );
    }

    #[tokio::test]
    async fn load_balancer_round_trip() {
        let fake = FakeNbctl::new();
        let reconciler = Reconciler::new(&fake, test_logger("lb"));
        let created = reconciler
            .lb_create(&LoadBalancerCreateParams {
                name: "web".to_string(),
                vip: "10.0.0.10:80".to_string(),
                backends: vec![
                    "10.0.0.1:8080".to_string(),
                    "10.0.0.2:8080".to_string(),
                ],
            })
            .await
            .expect("created lb");
        assert_eq!(
            created.vips.get("10.0.0.10:80").map(String::as_str),
            Some("10.0.0.1:8080,10.0.0.2:8080")
        );
        assert_eq!(reconciler.lb_list().await.expect("listed lbs"), vec![created]);
        assert!(reconciler.lb_delete("web").await.expect("first delete"));
        assert!(!reconciler.lb_delete("web").await.expect("second delete"));
    }
}
