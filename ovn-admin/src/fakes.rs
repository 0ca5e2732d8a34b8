// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A recording, in-memory fake of the [`NbctlGateway`] for tests.
//!
//! The fake interprets the same command vocabulary the reconciler and
//! provisioner emit (`ls-add`, `set`, `list`, `lsp-*`, `vtep-*`, …) against
//! a small in-memory northbound database, so tests can assert real
//! round-trip behavior instead of scripting every response. Individual
//! commands can still be forced to fail or to return arbitrary output.

use crate::nbctl::{CommandFailureInfo, GatewayError, NbctlGateway};
use async_trait::async_trait;
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use std::os::unix::process::ExitStatusExt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

const FAKE_UUID: &str = "00000000-0000-0000-0000-000000000000";

#[derive(Default)]
struct NbState {
    /// switch name -> external_ids
    switches: BTreeMap<String, BTreeMap<String, String>>,
    routers: BTreeSet<String>,
    /// lb name -> vips
    load_balancers: BTreeMap<String, BTreeMap<String, String>>,
    /// switch name -> [(port name, addresses)]
    ports: BTreeMap<String, Vec<(String, Vec<String>)>>,
    vteps: BTreeSet<String>,
}

#[derive(Default)]
pub struct FakeNbctl {
    state: Mutex<NbState>,
    calls: Mutex<Vec<Vec<String>>>,
    unavailable: AtomicBool,
    /// (contiguous arg subsequence, stderr) -> forced command failure
    failures: Mutex<Vec<(Vec<String>, String)>>,
    /// (contiguous arg subsequence, stdout) -> canned output
    canned: Mutex<Vec<(Vec<String>, String)>>,
}

impl FakeNbctl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail as if the controller were down.
    pub fn set_unavailable(&self) {
        self.unavailable.store(true, Ordering::SeqCst);
    }

    /// Force any command whose arguments contain `pattern` as a contiguous
    /// subsequence to fail with the given stderr.
    pub fn fail_matching(&self, pattern: &[&str], stderr: &str) {
        self.failures.lock().unwrap().push((
            pattern.iter().map(|s| s.to_string()).collect(),
            stderr.to_string(),
        ));
    }

    /// Force any command whose arguments contain `pattern` to return the
    /// given stdout verbatim instead of consulting the in-memory state.
    pub fn respond_matching(&self, pattern: &[&str], stdout: &str) {
        self.canned.lock().unwrap().push((
            pattern.iter().map(|s| s.to_string()).collect(),
            stdout.to_string(),
        ));
    }

    /// Every command dispatched so far, in order. Calls rejected because the
    /// fake was marked unavailable are not recorded.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of recorded calls containing `pattern` as a contiguous
    /// subsequence.
    pub fn calls_matching(&self, pattern: &[&str]) -> usize {
        self.calls()
            .iter()
            .filter(|args| contains_subsequence(args, pattern))
            .count()
    }

    fn command_failure(args: &[String], stderr: &str) -> GatewayError {
        GatewayError::Command(Box::new(CommandFailureInfo {
            command: format!("ovn-nbctl {}", args.join(" ")),
            status: std::process::ExitStatus::from_raw(1 << 8),
            stdout: String::new(),
            stderr: stderr.to_string(),
        }))
    }

    fn apply_segment(
        state: &mut NbState,
        all_args: &[String],
        segment: &[String],
    ) -> Result<String, GatewayError> {
        let no_row = |name: &str| {
            Self::command_failure(
                all_args,
                &format!("ovn-nbctl: no row \"{name}\" in table"),
            )
        };
        // Skip leading flags like --format=json; "--" segment separators
        // were already consumed by the caller.
        let words: Vec<&str> = segment
            .iter()
            .map(String::as_str)
            .filter(|a| !a.starts_with("--"))
            .collect();
        match words.as_slice() {
            ["show"] => Ok(String::new()),
            ["ls-add", name] => {
                if state.switches.contains_key(*name) {
                    return Err(Self::command_failure(
                        all_args,
                        &format!("ovn-nbctl: {name}: a switch with this name already exists"),
                    ));
                }
                state.switches.insert(name.to_string(), BTreeMap::new());
                state.ports.insert(name.to_string(), Vec::new());
                Ok(String::new())
            }
            ["ls-del", name] => {
                if state.switches.remove(*name).is_none() {
                    return Err(no_row(name));
                }
                state.ports.remove(*name);
                Ok(String::new())
            }
            ["set", "Logical_Switch", name, assignments @ ..] => {
                let Some(external_ids) = state.switches.get_mut(*name) else {
                    return Err(no_row(name));
                };
                for assignment in assignments {
                    let Some(kv) =
                        assignment.strip_prefix("external_ids:")
                    else {
                        return Err(Self::command_failure(
                            all_args,
                            &format!("ovn-nbctl: bad assignment {assignment:?}"),
                        ));
                    };
                    let Some((k, v)) = kv.split_once('=') else {
                        return Err(Self::command_failure(
                            all_args,
                            &format!("ovn-nbctl: bad assignment {assignment:?}"),
                        ));
                    };
                    external_ids.insert(k.to_string(), v.to_string());
                }
                Ok(String::new())
            }
            ["list", "Logical_Switch", rest @ ..] => {
                let rows: Vec<_> = match rest {
                    [] => state.switches.iter().collect(),
                    [name] => match state.switches.get_key_value(*name) {
                        Some(entry) => vec![entry],
                        None => return Err(no_row(name)),
                    },
                    _ => return Err(no_row("")),
                };
                let data: Vec<_> = rows
                    .into_iter()
                    .map(|(name, ids)| {
                        json!([
                            ["uuid", FAKE_UUID],
                            map_atom(ids),
                            name,
                        ])
                    })
                    .collect();
                Ok(json!({
                    "data": data,
                    "headings": ["_uuid", "external_ids", "name"],
                })
                .to_string())
            }
            ["lr-add", name] => {
                if !state.routers.insert(name.to_string()) {
                    return Err(Self::command_failure(
                        all_args,
                        &format!("ovn-nbctl: {name}: a router with this name already exists"),
                    ));
                }
                Ok(String::new())
            }
            ["list", "Logical_Router", rest @ ..] => {
                let rows: Vec<&String> = match rest {
                    [] => state.routers.iter().collect(),
                    [name] => match state.routers.get(*name) {
                        Some(name) => vec![name],
                        None => return Err(no_row(name)),
                    },
                    _ => return Err(no_row("")),
                };
                let data: Vec<_> = rows
                    .into_iter()
                    .map(|name| json!([["uuid", FAKE_UUID], name]))
                    .collect();
                Ok(json!({
                    "data": data,
                    "headings": ["_uuid", "name"],
                })
                .to_string())
            }
            ["acl-add", switch, _direction, _priority, _match, _action] => {
                if !state.switches.contains_key(*switch) {
                    return Err(no_row(switch));
                }
                Ok(String::new())
            }
            ["lb-add", name, vip, backends] => {
                if state.load_balancers.contains_key(*name) {
                    return Err(Self::command_failure(
                        all_args,
                        &format!("ovn-nbctl: {name}: a load balancer with this name already exists"),
                    ));
                }
                let mut vips = BTreeMap::new();
                vips.insert(vip.to_string(), backends.to_string());
                state.load_balancers.insert(name.to_string(), vips);
                Ok(String::new())
            }
            ["lb-del", name] => {
                if state.load_balancers.remove(*name).is_none() {
                    return Err(no_row(name));
                }
                Ok(String::new())
            }
            ["list", "Load_Balancer", rest @ ..] => {
                let rows: Vec<_> = match rest {
                    [] => state.load_balancers.iter().collect(),
                    [name] => match state.load_balancers.get_key_value(*name) {
                        Some(entry) => vec![entry],
                        None => return Err(no_row(name)),
                    },
                    _ => return Err(no_row("")),
                };
                let data: Vec<_> = rows
                    .into_iter()
                    .map(|(name, vips)| {
                        json!([["uuid", FAKE_UUID], name, map_atom(vips)])
                    })
                    .collect();
                Ok(json!({
                    "data": data,
                    "headings": ["_uuid", "name", "vips"],
                })
                .to_string())
            }
            ["lsp-add", switch, port] => {
                let Some(ports) = state.ports.get_mut(*switch) else {
                    return Err(no_row(switch));
                };
                ports.push((port.to_string(), Vec::new()));
                Ok(String::new())
            }
            ["lsp-set-addresses", port, address] => {
                let entry = state
                    .ports
                    .values_mut()
                    .flat_map(|ports| ports.iter_mut())
                    .find(|(name, _)| name == port);
                let Some((_, addresses)) = entry else {
                    return Err(no_row(port));
                };
                *addresses = vec![address.to_string()];
                Ok(String::new())
            }
            ["lsp-list", switch] => {
                let Some(ports) = state.ports.get(*switch) else {
                    return Err(no_row(switch));
                };
                let data: Vec<_> = ports
                    .iter()
                    .map(|(name, addresses)| {
                        json!([name, string_set_atom(addresses)])
                    })
                    .collect();
                Ok(json!({
                    "data": data,
                    "headings": ["name", "addresses"],
                })
                .to_string())
            }
            ["vtep-add", name] => {
                state.vteps.insert(name.to_string());
                Ok(String::new())
            }
            ["vtep-set-local-ip", name, _ip] => {
                if !state.vteps.contains(*name) {
                    return Err(no_row(name));
                }
                Ok(String::new())
            }
            ["vtep-bind-ls", name, switch] => {
                if !state.vteps.contains(*name) {
                    return Err(no_row(name));
                }
                if !state.switches.contains_key(*switch) {
                    return Err(no_row(switch));
                }
                Ok(String::new())
            }
            other => Err(Self::command_failure(
                all_args,
                &format!("ovn-nbctl: unknown command {other:?}"),
            )),
        }
    }
}

#[async_trait]
impl NbctlGateway for FakeNbctl {
    async fn check_available(&self) -> bool {
        !self.unavailable.load(Ordering::SeqCst)
    }

    async fn run(&self, args: &[String]) -> Result<String, GatewayError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(GatewayError::Unavailable {
                reason: "fake controller marked unavailable".to_string(),
            });
        }
        self.calls.lock().unwrap().push(args.to_vec());

        for (pattern, stderr) in self.failures.lock().unwrap().iter() {
            if contains_subsequence(args, pattern) {
                return Err(Self::command_failure(args, stderr));
            }
        }
        for (pattern, stdout) in self.canned.lock().unwrap().iter() {
            if contains_subsequence(args, pattern) {
                return Ok(stdout.clone());
            }
        }

        let mut state = self.state.lock().unwrap();
        let mut last_output = String::new();
        for segment in args.split(|arg| arg == "--") {
            last_output = Self::apply_segment(&mut state, args, segment)?;
        }
        Ok(last_output)
    }
}

fn contains_subsequence<A: AsRef<str>, B: AsRef<str>>(
    haystack: &[A],
    needle: &[B],
) -> bool {
    if needle.is_empty() || needle.len() > haystack.len() {
        return false;
    }
    haystack.windows(needle.len()).any(|window| {
        window
            .iter()
            .zip(needle)
            .all(|(a, b)| a.as_ref() == b.as_ref())
    })
}

fn map_atom(map: &BTreeMap<String, String>) -> serde_json::Value {
    json!([
        "map",
        map.iter().map(|(k, v)| json!([k, v])).collect::<Vec<_>>()
    ])
}

fn string_set_atom(elems: &[String]) -> serde_json::Value {
    // OVSDB collapses single-element sets to the bare atom.
    match elems {
        [single] => json!(single),
        many => json!(["set", many]),
    }
}
