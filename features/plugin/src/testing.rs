//! In-process [`ModuleRuntime`] for tests.

use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::error::plugin_error::LoadSnafu;
use crate::registrar::RegistrationKind;
use crate::runtime::ModuleRuntime;
use crate::runtime::RegistrationCall;

#[derive(Debug, Clone)]
pub(crate) enum Behavior {
    Register(Vec<RegistrationCall>),
    Throw(String),
    /// Throw `message` for the first `times` invocations, then register.
    ThrowThenRegister {
        times: usize,
        message: String,
        calls: Vec<RegistrationCall>,
    },
    Hang(Duration, Vec<RegistrationCall>),
}

/// Behaves per rule; a rule applies when its key is a substring of the
/// entry path. Unmatched entries register nothing.
#[derive(Debug, Default)]
pub(crate) struct FakeRuntime {
    rules: Mutex<Vec<(String, Behavior)>>,
    invocations: Mutex<HashMap<PathBuf, usize>>,
}

impl FakeRuntime {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn on(self, key: &str, behavior: Behavior) -> Self {
        self.rules
            .lock()
            .unwrap()
            .push((key.to_string(), behavior));
        self
    }

    pub(crate) fn invocations(&self, entry: &Path) -> usize {
        self.invocations
            .lock()
            .unwrap()
            .get(entry)
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn total_invocations(&self) -> usize {
        self.invocations.lock().unwrap().values().sum()
    }
}

/// Whether a `node` binary is on PATH. Tests that run real modules skip
/// without one.
pub(crate) fn node_available() -> bool {
    let available = std::process::Command::new("node")
        .arg("--version")
        .output()
        .is_ok_and(|output| output.status.success());
    if !available {
        eprintln!("node not found on PATH, skipping");
    }
    available
}

pub(crate) fn effect(name: &str, category: &str) -> RegistrationCall {
    call(RegistrationKind::Effect, name, category)
}

pub(crate) fn config(name: &str) -> RegistrationCall {
    call(RegistrationKind::Config, name, "config")
}

fn call(kind: RegistrationKind, name: &str, category: &str) -> RegistrationCall {
    RegistrationCall {
        kind,
        name: name.to_string(),
        category: category.to_string(),
        metadata: serde_json::json!({}),
        class_name: name.to_string(),
    }
}

#[async_trait]
impl ModuleRuntime for FakeRuntime {
    async fn import_and_register(&self, entry: &Path) -> Result<Vec<RegistrationCall>> {
        let count = {
            let mut invocations = self.invocations.lock().unwrap();
            let count = invocations.entry(entry.to_path_buf()).or_insert(0);
            *count += 1;
            *count
        };
        let entry_str = entry.to_string_lossy().to_string();
        let behavior = self
            .rules
            .lock()
            .unwrap()
            .iter()
            .find(|(key, _)| entry_str.contains(key.as_str()))
            .map(|(_, b)| b.clone());

        match behavior {
            None => Ok(Vec::new()),
            Some(Behavior::Register(calls)) => Ok(calls),
            Some(Behavior::Throw(message)) => LoadSnafu {
                entry: entry.to_path_buf(),
                message,
            }
            .fail(),
            Some(Behavior::ThrowThenRegister {
                times,
                message,
                calls,
            }) => {
                if count <= times {
                    LoadSnafu {
                        entry: entry.to_path_buf(),
                        message,
                    }
                    .fail()
                } else {
                    Ok(calls)
                }
            }
            Some(Behavior::Hang(delay, calls)) => {
                tokio::time::sleep(delay).await;
                Ok(calls)
            }
        }
    }
}
