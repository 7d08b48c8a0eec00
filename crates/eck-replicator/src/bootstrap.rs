//! Bootstrap injection into the ECK `Elasticsearch` resource.
//!
//! The repository plugin has to be installed on every Elasticsearch node
//! before a repository of that type can be registered. ECK rolls out pod
//! template changes itself, so Init only edits the resource: it adds the
//! installer init container to every node set and references the object
//! storage credentials secret in `spec.secureSettings`. Existing pod
//! template content is kept.

use kube::api::DynamicObject;
use serde_json::{json, Map, Value};

use crate::config::BootstrapSettings;
use crate::error::{PluginError, PluginResult};

fn malformed(path: &str, expected: &str) -> PluginError {
    PluginError::invalid_config(format!("Elasticsearch {path}"), format!("expected {expected}"))
}

fn object_field<'a>(
    parent: &'a mut Map<String, Value>,
    key: &str,
    path: &str,
) -> PluginResult<&'a mut Map<String, Value>> {
    let entry = parent.entry(key).or_insert(Value::Null);
    if entry.is_null() {
        *entry = Value::Object(Map::new());
    }
    entry
        .as_object_mut()
        .ok_or_else(|| malformed(path, "an object"))
}

fn array_field<'a>(
    parent: &'a mut Map<String, Value>,
    key: &str,
    path: &str,
) -> PluginResult<&'a mut Vec<Value>> {
    let entry = parent.entry(key).or_insert(Value::Null);
    if entry.is_null() {
        *entry = Value::Array(Vec::new());
    }
    entry
        .as_array_mut()
        .ok_or_else(|| malformed(path, "an array"))
}

/// Adds or updates the installer init container in one pod template.
fn ensure_init_container(
    init_containers: &mut Vec<Value>,
    bootstrap: &BootstrapSettings,
) -> bool {
    let command = json!(bootstrap.command);
    let existing = init_containers
        .iter_mut()
        .find(|c| c.get("name").and_then(Value::as_str) == Some(bootstrap.container_name.as_str()));

    match existing {
        Some(container) if container.get("command") == Some(&command) => false,
        Some(container) => {
            container["command"] = command;
            true
        }
        None => {
            init_containers.push(json!({
                "name": bootstrap.container_name,
                "command": command,
            }));
            true
        }
    }
}

/// Edits `elasticsearch` so every node runs the bootstrap step and can
/// read `credentials_secret`.
///
/// Returns whether anything changed; an unchanged resource needs no update.
pub fn inject_bootstrap(
    elasticsearch: &mut DynamicObject,
    bootstrap: &BootstrapSettings,
    credentials_secret: &str,
) -> PluginResult<bool> {
    if elasticsearch.data.is_null() {
        elasticsearch.data = Value::Object(Map::new());
    }
    let root = elasticsearch
        .data
        .as_object_mut()
        .ok_or_else(|| malformed("body", "an object"))?;
    let spec = object_field(root, "spec", "spec")?;
    let mut changed = false;

    let node_sets = array_field(spec, "nodeSets", "spec.nodeSets")?;
    if node_sets.is_empty() {
        return Err(PluginError::invalid_config(
            "Elasticsearch spec.nodeSets",
            "must not be empty",
        ));
    }
    for (i, node_set) in node_sets.iter_mut().enumerate() {
        let path = format!("spec.nodeSets[{i}]");
        let node_set = node_set
            .as_object_mut()
            .ok_or_else(|| malformed(&path, "an object"))?;
        let template = object_field(node_set, "podTemplate", &format!("{path}.podTemplate"))?;
        let pod_spec = object_field(template, "spec", &format!("{path}.podTemplate.spec"))?;
        let init_containers = array_field(
            pod_spec,
            "initContainers",
            &format!("{path}.podTemplate.spec.initContainers"),
        )?;
        changed |= ensure_init_container(init_containers, bootstrap);
    }

    if !credentials_secret.is_empty() {
        let secure_settings = array_field(spec, "secureSettings", "spec.secureSettings")?;
        let referenced = secure_settings
            .iter()
            .any(|s| s.get("secretName").and_then(Value::as_str) == Some(credentials_secret));
        if !referenced {
            secure_settings.push(json!({ "secretName": credentials_secret }));
            changed = true;
        }
    }

    Ok(changed)
}
