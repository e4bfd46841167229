// ABOUTME: In-memory Platform for integration tests.
// ABOUTME: Stores applied objects, simulates readiness, and replays scripted failures.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use stagecraft::platform::{Document, Platform, PlatformError, ResourceKind};
use stagecraft::types::PodName;
use std::collections::{BTreeMap, HashMap, VecDeque};

/// Kubernetes `kind` of a resource kind.
pub fn kind_name(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Namespace => "Namespace",
        ResourceKind::Secret => "Secret",
        ResourceKind::Deployment => "Deployment",
        ResourceKind::ReplicaSet => "ReplicaSet",
        ResourceKind::Pod => "Pod",
        ResourceKind::Service => "Service",
        ResourceKind::Ingress => "Ingress",
        ResourceKind::PersistentVolumeClaim => "PersistentVolumeClaim",
    }
}

/// One recorded platform call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Apply { kind: String, name: String },
    Get { kind: ResourceKind, name: String },
    Delete { kind: ResourceKind, name: String, force: bool },
    Exec { pod: String, command: Vec<String> },
    List { kind: ResourceKind },
    Patch { kind: ResourceKind, name: String },
    Logs { pod: String },
    Events,
    Describe { kind: ResourceKind, name: String },
    ServerVersion,
}

struct State {
    objects: BTreeMap<(String, String), Value>,
    calls: Vec<Call>,
    failures: HashMap<&'static str, VecDeque<PlatformError>>,
    exec_stdout: String,
    auto_ready: bool,
    reachable: bool,
}

/// A cluster held in memory.
///
/// With `auto_ready` on (the default), applied deployments come up at once with
/// running pods, claims bind, and ingresses get an address.
pub struct FakePlatform {
    state: Mutex<State>,
}

impl Default for FakePlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl FakePlatform {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                objects: BTreeMap::new(),
                calls: Vec::new(),
                failures: HashMap::new(),
                exec_stdout: "200".to_string(),
                auto_ready: true,
                reachable: true,
            }),
        }
    }

    pub fn set_auto_ready(&self, on: bool) {
        self.state.lock().auto_ready = on;
    }

    pub fn set_reachable(&self, on: bool) {
        self.state.lock().reachable = on;
    }

    /// What `exec_in_pod` prints, e.g. an HTTP status code.
    pub fn set_exec_stdout(&self, stdout: impl Into<String>) {
        self.state.lock().exec_stdout = stdout.into();
    }

    /// Make the next calls of `op` fail with these errors, in order.
    pub fn fail_next(&self, op: &'static str, errors: Vec<PlatformError>) {
        self.state
            .lock()
            .failures
            .entry(op)
            .or_default()
            .extend(errors);
    }

    /// Insert an object as if it already existed in the cluster.
    pub fn seed(&self, object: Value) {
        let kind = text(&object, "/kind").to_string();
        let name = text(&object, "/metadata/name").to_string();
        self.state.lock().objects.insert((kind, name), object);
    }

    pub fn seed_namespace(&self, name: &str) {
        self.seed(json!({"kind": "Namespace", "metadata": {"name": name}}));
    }

    /// A deployment with the given counts and matching pods, all healthy.
    pub fn seed_healthy_workload(&self, name: &str, replicas: u32) {
        self.seed(deployment_object(name, replicas, replicas));
        for i in 0..replicas {
            self.seed(pod_object(&format!("{}-{}", name, i), name, "Running", None));
        }
    }

    /// A pod labelled for `app`, optionally waiting for `reason`.
    pub fn seed_pod(&self, name: &str, app: &str, phase: &str, waiting: Option<&str>) {
        self.seed(pod_object(name, app, phase, waiting));
    }

    pub fn object(&self, kind: &str, name: &str) -> Option<Value> {
        self.state
            .lock()
            .objects
            .get(&(kind.to_string(), name.to_string()))
            .cloned()
    }

    pub fn contains(&self, kind: &str, name: &str) -> bool {
        self.object(kind, name).is_some()
    }

    /// Decoded value of one key of a secret.
    pub fn secret_value(&self, secret: &str, key: &str) -> Option<String> {
        let object = self.object("Secret", secret)?;
        let encoded = object.pointer(&format!("/data/{}", key))?.as_str()?;
        String::from_utf8(STANDARD.decode(encoded).ok()?).ok()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    /// Names of applied objects of one kind, in order of application.
    pub fn applied(&self, kind: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Apply { kind: k, name } if k == kind => Some(name),
                _ => None,
            })
            .collect()
    }

    /// Kinds of every applied object, in order of application.
    pub fn applied_kinds(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Apply { kind, .. } => Some(kind),
                _ => None,
            })
            .collect()
    }

    pub fn deleted(&self, kind: ResourceKind) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Delete { kind: k, name, .. } if k == kind => Some(name),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.state.lock().calls.push(call);
    }

    fn scripted_failure(&self, op: &'static str) -> Result<(), PlatformError> {
        let mut state = self.state.lock();
        if !state.reachable {
            return Err(PlatformError::Unavailable(
                "unable to connect to the server".to_string(),
            ));
        }
        match state.failures.get_mut(op).and_then(VecDeque::pop_front) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn store(&self, mut object: Value) {
        let kind = text(&object, "/kind").to_string();
        let name = text(&object, "/metadata/name").to_string();
        let mut state = self.state.lock();
        let auto_ready = state.auto_ready;

        match kind.as_str() {
            "Secret" => encode_string_data(&mut object),
            "Deployment" => {
                let previous = state
                    .objects
                    .get(&(kind.clone(), name.clone()))
                    .map(|o| count(o, "/metadata/generation"))
                    .unwrap_or(0);
                set(&mut object, "/metadata/generation", json!(previous + 1));
                if auto_ready {
                    let replicas = count(&object, "/spec/replicas").max(1);
                    mark_rolled_out(&mut object, replicas);
                    let app = deployment_app(&object, &name);
                    state
                        .objects
                        .retain(|(k, _), o| !(k == "Pod" && label(o, "app") == Some(app.as_str())));
                    for i in 0..replicas {
                        let pod = pod_object(&format!("{}-{}", name, i), &app, "Running", None);
                        state
                            .objects
                            .insert(("Pod".to_string(), format!("{}-{}", name, i)), pod);
                    }
                }
            }
            "PersistentVolumeClaim" if auto_ready => {
                set(&mut object, "/status/phase", json!("Bound"));
            }
            "Ingress" if auto_ready => {
                set(
                    &mut object,
                    "/status/loadBalancer/ingress",
                    json!([{"hostname": "lb.example.com"}]),
                );
            }
            _ => {}
        }

        state.objects.insert((kind, name), object);
    }
}

#[async_trait]
impl Platform for FakePlatform {
    async fn apply(&self, document: &Document) -> Result<(), PlatformError> {
        self.scripted_failure("apply")?;
        let objects = parse_documents(&document.body)?;
        for object in objects {
            let kind = text(&object, "/kind").to_string();
            let name = text(&object, "/metadata/name").to_string();
            if kind.is_empty() || name.is_empty() {
                return Err(PlatformError::Rejected(format!(
                    "{}: object without kind or name",
                    document.source
                )));
            }
            self.record(Call::Apply {
                kind: kind.clone(),
                name: name.clone(),
            });
            self.store(object);
        }
        Ok(())
    }

    async fn get(&self, kind: ResourceKind, name: &str) -> Result<Value, PlatformError> {
        self.record(Call::Get {
            kind,
            name: name.to_string(),
        });
        self.scripted_failure("get")?;
        self.object(kind_name(kind), name)
            .ok_or_else(|| PlatformError::NotFound {
                kind,
                name: name.to_string(),
            })
    }

    async fn delete(&self, kind: ResourceKind, name: &str, force: bool) -> Result<(), PlatformError> {
        self.record(Call::Delete {
            kind,
            name: name.to_string(),
            force,
        });
        self.scripted_failure("delete")?;
        self.state
            .lock()
            .objects
            .remove(&(kind_name(kind).to_string(), name.to_string()));
        Ok(())
    }

    async fn exec_in_pod(&self, pod: &PodName, command: &[String]) -> Result<String, PlatformError> {
        self.record(Call::Exec {
            pod: pod.to_string(),
            command: command.to_vec(),
        });
        self.scripted_failure("exec")?;
        if !self.contains("Pod", pod.as_str()) {
            return Err(PlatformError::NotFound {
                kind: ResourceKind::Pod,
                name: pod.to_string(),
            });
        }
        Ok(self.state.lock().exec_stdout.clone())
    }

    async fn list(&self, kind: ResourceKind, selector: Option<&str>) -> Result<Vec<Value>, PlatformError> {
        self.record(Call::List { kind });
        self.scripted_failure("list")?;
        let wanted = kind_name(kind);
        let state = self.state.lock();
        Ok(state
            .objects
            .iter()
            .filter(|((k, _), o)| k == wanted && selector.is_none_or(|s| matches_selector(o, s)))
            .map(|(_, o)| o.clone())
            .collect())
    }

    async fn patch(&self, kind: ResourceKind, name: &str, patch: &Value) -> Result<(), PlatformError> {
        self.record(Call::Patch {
            kind,
            name: name.to_string(),
        });
        self.scripted_failure("patch")?;
        let mut object = self
            .object(kind_name(kind), name)
            .ok_or_else(|| PlatformError::NotFound {
                kind,
                name: name.to_string(),
            })?;
        merge(&mut object, patch);
        self.store(object);
        Ok(())
    }

    async fn logs(&self, pod: &PodName, tail: u32) -> Result<String, PlatformError> {
        self.record(Call::Logs {
            pod: pod.to_string(),
        });
        self.scripted_failure("logs")?;
        Ok(format!("last {} lines of {}", tail, pod))
    }

    async fn events(&self, limit: usize) -> Result<Vec<String>, PlatformError> {
        self.record(Call::Events);
        self.scripted_failure("events")?;
        Ok(vec!["Warning BackOff pod/web-0 Back-off restarting failed container".to_string()]
            .into_iter()
            .take(limit)
            .collect())
    }

    async fn describe(&self, kind: ResourceKind, name: &str) -> Result<String, PlatformError> {
        self.record(Call::Describe {
            kind,
            name: name.to_string(),
        });
        self.scripted_failure("describe")?;
        Ok(format!("Name: {}\nKind: {}", name, kind_name(kind)))
    }

    async fn server_version(&self) -> Result<String, PlatformError> {
        self.record(Call::ServerVersion);
        self.scripted_failure("server_version")?;
        Ok("v1.29.4".to_string())
    }
}

/// Every object in a YAML (or JSON) stream; empty documents are skipped.
fn parse_documents(body: &str) -> Result<Vec<Value>, PlatformError> {
    let mut objects = Vec::new();
    for document in serde_yaml::Deserializer::from_str(body) {
        let value = serde_yaml::Value::deserialize(document)
            .map_err(|e| PlatformError::Rejected(format!("invalid document: {}", e)))?;
        if value.is_null() {
            continue;
        }
        let value = serde_json::to_value(value)
            .map_err(|e| PlatformError::Rejected(format!("invalid document: {}", e)))?;
        objects.push(value);
    }
    Ok(objects)
}

pub fn deployment_object(name: &str, desired: u32, ready: u32) -> Value {
    json!({
        "kind": "Deployment",
        "metadata": {"name": name, "generation": 1},
        "spec": {
            "replicas": desired,
            "selector": {"matchLabels": {"app": name}},
            "template": {"metadata": {"labels": {"app": name}}}
        },
        "status": {
            "observedGeneration": 1,
            "replicas": desired,
            "readyReplicas": ready,
            "updatedReplicas": ready,
            "availableReplicas": ready
        }
    })
}

pub fn pod_object(name: &str, app: &str, phase: &str, waiting: Option<&str>) -> Value {
    let ready = phase == "Running" && waiting.is_none();
    let container = match waiting {
        Some(reason) => json!({"name": "app", "state": {"waiting": {"reason": reason}}, "restartCount": 4}),
        None => json!({"name": "app", "state": {"running": {}}, "restartCount": 0}),
    };
    json!({
        "kind": "Pod",
        "metadata": {"name": name, "labels": {"app": app}},
        "status": {
            "phase": phase,
            "conditions": [{"type": "Ready", "status": if ready { "True" } else { "False" }}],
            "containerStatuses": [container]
        }
    })
}

fn mark_rolled_out(object: &mut Value, replicas: u32) {
    let generation = count(object, "/metadata/generation");
    set(
        object,
        "/status",
        json!({
            "observedGeneration": generation,
            "replicas": replicas,
            "readyReplicas": replicas,
            "updatedReplicas": replicas,
            "availableReplicas": replicas
        }),
    );
}

fn deployment_app(object: &Value, fallback: &str) -> String {
    object
        .pointer("/spec/template/metadata/labels/app")
        .and_then(Value::as_str)
        .unwrap_or(fallback)
        .to_string()
}

fn encode_string_data(object: &mut Value) {
    let Some(Value::Object(string_data)) = object.as_object_mut().and_then(|o| o.remove("stringData"))
    else {
        return;
    };
    let data: Map<String, Value> = string_data
        .into_iter()
        .map(|(k, v)| {
            let plain = v.as_str().unwrap_or("").to_string();
            (k, Value::String(STANDARD.encode(plain)))
        })
        .collect();
    set(object, "/data", Value::Object(data));
}

fn matches_selector(object: &Value, selector: &str) -> bool {
    selector.split(',').filter(|s| !s.is_empty()).all(|pair| {
        match pair.split_once('=') {
            Some((key, value)) => label(object, key.trim()) == Some(value.trim()),
            None => false,
        }
    })
}

fn label<'a>(object: &'a Value, key: &str) -> Option<&'a str> {
    object
        .pointer("/metadata/labels")
        .and_then(|l| l.get(key))
        .and_then(Value::as_str)
}

fn text<'a>(value: &'a Value, pointer: &str) -> &'a str {
    value.pointer(pointer).and_then(Value::as_str).unwrap_or("")
}

fn count(value: &Value, pointer: &str) -> u32 {
    value
        .pointer(pointer)
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(0)
}

/// Set a value at a JSON pointer, creating intermediate objects.
fn set(target: &mut Value, pointer: &str, value: Value) {
    let mut current = target;
    let parts: Vec<&str> = pointer.trim_start_matches('/').split('/').collect();
    let Some((last, parents)) = parts.split_last() else {
        return;
    };
    for part in parents {
        if !current.get(*part).is_some_and(Value::is_object) {
            current[*part] = json!({});
        }
        current = &mut current[*part];
    }
    current[*last] = value;
}

/// JSON merge patch.
fn merge(target: &mut Value, patch: &Value) {
    let Value::Object(patch) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = json!({});
    }
    for (key, value) in patch {
        if value.is_null() {
            if let Some(map) = target.as_object_mut() {
                map.remove(key);
            }
        } else {
            merge(&mut target[key.as_str()], value);
        }
    }
}
