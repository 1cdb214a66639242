use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod config;
pub mod endpoint;
pub mod shape;

pub use shape::{AttrValue, Shape};

pub const EXEC_RUNTIME: &str = "python";
pub const SKETCH_ENV_KEY: &str = "SKETCH";
pub const SKETCH_ENV_VALUE: &str = "yes";

pub fn default_command() -> Vec<String> {
    vec!["python".to_string(), "start.py".to_string()]
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeVariant {
    #[default]
    Standard,
    Sketch,
}

impl RuntimeVariant {
    /// Maps a stored runtime label to a variant. Only `sketch` selects the
    /// sketch environment.
    pub fn from_label(label: &str) -> Self {
        if label.trim() == "sketch" {
            RuntimeVariant::Sketch
        } else {
            RuntimeVariant::Standard
        }
    }

    pub fn is_sketch(self) -> bool {
        matches!(self, RuntimeVariant::Sketch)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileEntry {
    pub path: String,
    pub content: String,
}

impl FileEntry {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    pub code: String,
    pub variant: RuntimeVariant,
    pub env: BTreeMap<String, String>,
    pub files: Vec<FileEntry>,
    pub command: Vec<String>,
}

impl ExecutionRequest {
    pub fn new(code: impl Into<String>, variant: RuntimeVariant) -> Self {
        Self {
            code: code.into(),
            variant,
            env: BTreeMap::new(),
            files: Vec::new(),
            command: default_command(),
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_files(mut self, files: Vec<FileEntry>) -> Self {
        self.files = files;
        self
    }

    pub fn with_command(mut self, command: Vec<String>) -> Self {
        self.command = command;
        self
    }

    pub fn to_message(&self) -> ExecMessage {
        let mut env = self.env.clone();
        if self.variant.is_sketch() {
            env.insert(SKETCH_ENV_KEY.to_string(), SKETCH_ENV_VALUE.to_string());
        }
        ExecMessage::Exec {
            runtime: EXEC_RUNTIME.to_string(),
            code: self.code.clone(),
            env,
            files: self.files.clone(),
            command: self.command.clone(),
        }
    }
}

/// Outbound message; exactly one is sent per connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "msgtype", rename_all = "snake_case")]
pub enum ExecMessage {
    Exec {
        runtime: String,
        code: String,
        env: BTreeMap<String, String>,
        files: Vec<FileEntry>,
        command: Vec<String>,
    },
}

/// Inbound messages streamed back by the sandbox.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "msgtype", rename_all = "snake_case")]
pub enum InboundMessage {
    Write { data: String },
    Shape { shape: Shape },
    #[serde(rename = "exitstatus")]
    ExitStatus { exitstatus: i64 },
    #[serde(other)]
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sketch_variant_sets_env_flag() {
        let request = ExecutionRequest::new("print(1)", RuntimeVariant::Sketch)
            .with_env("LANG", "C")
            .with_files(vec![FileEntry::new("start.py", "exec(open('main.py').read())")]);
        let json = serde_json::to_value(request.to_message()).expect("serialize");
        assert_eq!(json["msgtype"], "exec");
        assert_eq!(json["runtime"], "python");
        assert_eq!(json["code"], "print(1)");
        assert_eq!(json["env"]["SKETCH"], "yes");
        assert_eq!(json["env"]["LANG"], "C");
        assert_eq!(json["files"][0]["path"], "start.py");
        assert_eq!(json["command"], serde_json::json!(["python", "start.py"]));
        assert!(!request.env.contains_key(SKETCH_ENV_KEY));
    }

    #[test]
    fn standard_variant_leaves_env_alone() {
        let request = ExecutionRequest::new("print(1)", RuntimeVariant::Standard);
        let json = serde_json::to_value(request.to_message()).expect("serialize");
        assert_eq!(json["env"], serde_json::json!({}));
    }

    #[test]
    fn inbound_messages_decode_by_tag() {
        let write: InboundMessage =
            serde_json::from_str(r#"{"msgtype": "write", "data": "1\n"}"#).unwrap();
        assert_eq!(
            write,
            InboundMessage::Write {
                data: "1\n".to_string()
            }
        );
        let exit: InboundMessage =
            serde_json::from_str(r#"{"msgtype": "exitstatus", "exitstatus": 0}"#).unwrap();
        assert_eq!(exit, InboundMessage::ExitStatus { exitstatus: 0 });
        let shape: InboundMessage = serde_json::from_str(
            r#"{"msgtype": "shape", "shape": {"tag": "circle", "r": 5}}"#,
        )
        .unwrap();
        assert!(matches!(shape, InboundMessage::Shape { shape } if shape.tag == "circle"));
    }

    #[test]
    fn unknown_tags_are_tolerated() {
        let message: InboundMessage =
            serde_json::from_str(r#"{"msgtype": "progress", "percent": 40}"#).unwrap();
        assert_eq!(message, InboundMessage::Unknown);
    }

    #[test]
    fn runtime_labels_map_to_variants() {
        assert_eq!(RuntimeVariant::from_label("sketch"), RuntimeVariant::Sketch);
        assert_eq!(
            RuntimeVariant::from_label("python-canvas"),
            RuntimeVariant::Standard
        );
    }
}
