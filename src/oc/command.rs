//! `oc` invocations and their captured results.

use std::fmt;

/// Verbs that change cluster state.
const MUTATING_VERBS: &[&str] = &["patch", "rsh", "delete", "apply", "create", "replace"];

/// A single `oc` invocation, stored as an argument vector (never a shell string).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcCommand {
    args: Vec<String>,
}

impl OcCommand {
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// `oc get <resource> [name] [-n namespace] -o json`
    pub fn get_json(resource: &str, name: Option<&str>, namespace: Option<&str>) -> Self {
        let mut args = vec!["get".to_string(), resource.to_string()];
        if let Some(name) = name {
            args.push(name.to_string());
        }
        if let Some(namespace) = namespace {
            args.push("-n".to_string());
            args.push(namespace.to_string());
        }
        args.push("-o".to_string());
        args.push("json".to_string());
        Self { args }
    }

    /// `oc patch <resource> <name> --type=merge --patch <json>`
    pub fn merge_patch(resource: &str, name: &str, patch: &serde_json::Value) -> Self {
        Self::new([
            "patch".to_string(),
            resource.to_string(),
            name.to_string(),
            "--type=merge".to_string(),
            "--patch".to_string(),
            patch.to_string(),
        ])
    }

    /// `oc wait <resource> --all --for=condition=<condition> --timeout=<secs>s`
    pub fn wait_for_all(resource: &str, condition: &str, timeout_secs: u64) -> Self {
        Self::new([
            "wait".to_string(),
            resource.to_string(),
            "--all".to_string(),
            format!("--for=condition={}", condition),
            format!("--timeout={}s", timeout_secs),
        ])
    }

    /// `oc rsh -n <namespace> <pod> <command...>`
    pub fn rsh(namespace: &str, pod: &str, command: &[&str]) -> Self {
        let mut args = vec![
            "rsh".to_string(),
            "-n".to_string(),
            namespace.to_string(),
            pod.to_string(),
        ];
        args.extend(command.iter().map(|s| s.to_string()));
        Self { args }
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn verb(&self) -> &str {
        self.args.first().map(String::as_str).unwrap_or_default()
    }

    /// Returns true if running this command changes cluster state.
    pub fn is_mutating(&self) -> bool {
        MUTATING_VERBS.contains(&self.verb())
    }
}

impl fmt::Display for OcCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "oc {}", self.args.join(" "))
    }
}

/// Captured result of one command execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: Some(0),
        }
    }

    pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code: Some(exit_code),
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == Some(0)
    }
}
