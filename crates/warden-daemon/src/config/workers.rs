use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use warden_types::{LaunchSpec, WorkerDefinition};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerEntry {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    pub critical: bool,
    pub purpose: String,
}

impl Default for WorkerEntry {
    fn default() -> Self {
        Self {
            name: String::new(),
            command: String::new(),
            args: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
            critical: false,
            purpose: String::new(),
        }
    }
}

impl WorkerEntry {
    pub fn to_definition(&self) -> WorkerDefinition {
        WorkerDefinition {
            name: self.name.clone(),
            launch: LaunchSpec {
                program: self.command.clone(),
                args: self.args.clone(),
                cwd: self.cwd.clone(),
                env: self.env.clone(),
            },
            critical: self.critical,
            purpose: self.purpose.clone(),
        }
    }
}
