//! Command Protocol
//!
//! The external model drives the substrate through a narrow command set:
//! one JSON object per line (`{"action": ..., "params": {...}}`) or a
//! pipe-delimited instruction (`store_memory|content|tier`). Every command
//! returns a `{status, action, message?, data?}` object.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// =============================================================================
// Commands
// =============================================================================

/// A parsed substrate command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "params", rename_all = "snake_case")]
pub enum Command {
    /// Store a new memory record
    StoreMemory {
        /// Record content
        content: String,
        /// Tier index; the coordinator defaults to working (3)
        #[serde(default)]
        tier: Option<u8>,
        /// Category label
        #[serde(default)]
        category: Option<String>,
        /// Subcategory label
        #[serde(default)]
        subcategory: Option<String>,
        /// Tags
        #[serde(default)]
        tags: Option<Vec<String>>,
        /// Opaque metadata
        #[serde(default)]
        metadata: Option<BTreeMap<String, Value>>,
        /// Confidence in [0, 100]
        #[serde(default)]
        confidence: Option<i64>,
    },

    /// Retrieve records by query
    RetrieveMemory {
        /// The query string
        query: String,
        /// Restrict to a tier
        #[serde(default)]
        tier: Option<u8>,
        /// Restrict to a category
        #[serde(default)]
        category: Option<String>,
        /// Result limit
        #[serde(default)]
        limit: Option<usize>,
    },

    /// Create an association edge between two records
    CreateAssociation {
        /// Source record id
        source_id: String,
        /// Target record id
        target_id: String,
        /// Relation label (opaque)
        #[serde(default)]
        relation: Option<String>,
        /// Weight in [0, 1]
        #[serde(default)]
        weight: Option<f64>,
    },

    /// Report substrate status
    GetStatus,

    /// Sweep expired working memories
    Cleanup,

    /// Create a backup
    Backup,
}

impl Command {
    /// The action name used in responses.
    #[must_use]
    pub fn action(&self) -> &'static str {
        match self {
            Self::StoreMemory { .. } => "store_memory",
            Self::RetrieveMemory { .. } => "retrieve_memory",
            Self::CreateAssociation { .. } => "create_association",
            Self::GetStatus => "get_status",
            Self::Cleanup => "cleanup",
            Self::Backup => "backup",
        }
    }
}

// =============================================================================
// Parsing
// =============================================================================

/// Why a line failed to parse as a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandParseError {
    /// The line is not command-shaped at all (free text)
    NotACommand,
    /// The line looked like a command but was malformed
    Malformed(String),
}

/// Parse one line as a command: JSON object first, then the pipe syntax.
///
/// # Errors
/// `NotACommand` for plain text; `Malformed` for near-miss command lines.
pub fn parse_command(line: &str) -> Result<Command, CommandParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(CommandParseError::NotACommand);
    }

    if line.starts_with('{') {
        return serde_json::from_str(line)
            .map_err(|e| CommandParseError::Malformed(e.to_string()));
    }

    if line.contains('|') || is_bare_action(line) {
        return parse_pipe_command(line);
    }

    Err(CommandParseError::NotACommand)
}

fn is_bare_action(line: &str) -> bool {
    matches!(line, "get_status" | "cleanup" | "backup")
}

fn parse_pipe_command(line: &str) -> Result<Command, CommandParseError> {
    let parts: Vec<&str> = line.split('|').map(str::trim).collect();
    let malformed = |why: &str| CommandParseError::Malformed(format!("{why}: {line}"));

    match parts[0] {
        "store_memory" => {
            let content = parts
                .get(1)
                .filter(|c| !c.is_empty())
                .ok_or_else(|| malformed("store_memory needs content"))?;
            let tier = match parts.get(2) {
                Some(raw) if !raw.is_empty() => {
                    Some(raw.parse::<u8>().map_err(|_| malformed("bad tier"))?)
                }
                _ => None,
            };
            Ok(Command::StoreMemory {
                content: (*content).to_string(),
                tier,
                category: None,
                subcategory: None,
                tags: None,
                metadata: None,
                confidence: None,
            })
        }
        "retrieve_memory" => {
            let query = parts
                .get(1)
                .filter(|q| !q.is_empty())
                .ok_or_else(|| malformed("retrieve_memory needs a query"))?;
            let limit = match parts.get(2) {
                Some(raw) if !raw.is_empty() => {
                    Some(raw.parse::<usize>().map_err(|_| malformed("bad limit"))?)
                }
                _ => None,
            };
            Ok(Command::RetrieveMemory {
                query: (*query).to_string(),
                tier: None,
                category: None,
                limit,
            })
        }
        "create_association" => {
            let source = parts
                .get(1)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| malformed("create_association needs a source"))?;
            let target = parts
                .get(2)
                .filter(|t| !t.is_empty())
                .ok_or_else(|| malformed("create_association needs a target"))?;
            let weight = match parts.get(4) {
                Some(raw) if !raw.is_empty() => {
                    Some(raw.parse::<f64>().map_err(|_| malformed("bad weight"))?)
                }
                _ => None,
            };
            Ok(Command::CreateAssociation {
                source_id: (*source).to_string(),
                target_id: (*target).to_string(),
                relation: parts.get(3).filter(|r| !r.is_empty()).map(|r| (*r).to_string()),
                weight,
            })
        }
        "get_status" => Ok(Command::GetStatus),
        "cleanup" => Ok(Command::Cleanup),
        "backup" => Ok(Command::Backup),
        other => Err(CommandParseError::Malformed(format!("unknown action: {other}"))),
    }
}

// =============================================================================
// Responses
// =============================================================================

/// Response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    /// The command succeeded
    Ok,
    /// The command failed
    Error,
}

/// The uniform command response object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResponse {
    /// Outcome
    pub status: ResponseStatus,
    /// Echoed action name
    pub action: String,
    /// Failure message, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Result payload, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl CommandResponse {
    /// A success response with payload.
    #[must_use]
    pub fn ok(action: &str, data: Value) -> Self {
        Self {
            status: ResponseStatus::Ok,
            action: action.to_string(),
            message: None,
            data: Some(data),
        }
    }

    /// A failure response.
    #[must_use]
    pub fn error(action: &str, message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            action: action.to_string(),
            message: Some(message.into()),
            data: None,
        }
    }

    /// Whether the command succeeded.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == ResponseStatus::Ok
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json_store_memory() {
        let line = r#"{"action": "store_memory", "params": {"content": "note", "tier": 2, "tags": ["a"]}}"#;
        let command = parse_command(line).unwrap();
        match command {
            Command::StoreMemory { content, tier, tags, .. } => {
                assert_eq!(content, "note");
                assert_eq!(tier, Some(2));
                assert_eq!(tags, Some(vec!["a".to_string()]));
            }
            other => panic!("wrong command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_json_unit_actions() {
        assert_eq!(
            parse_command(r#"{"action": "get_status"}"#).unwrap(),
            Command::GetStatus
        );
        assert_eq!(parse_command("cleanup").unwrap(), Command::Cleanup);
    }

    #[test]
    fn test_parse_pipe_syntax() {
        let command = parse_command("store_memory|remember this|3").unwrap();
        assert!(matches!(
            command,
            Command::StoreMemory { tier: Some(3), .. }
        ));

        let command = parse_command("retrieve_memory|concurrency|5").unwrap();
        assert!(matches!(
            command,
            Command::RetrieveMemory { limit: Some(5), .. }
        ));

        let command = parse_command("create_association|M2_a|M2_b|supports|0.8").unwrap();
        match command {
            Command::CreateAssociation { relation, weight, .. } => {
                assert_eq!(relation.as_deref(), Some("supports"));
                assert_eq!(weight, Some(0.8));
            }
            other => panic!("wrong command: {other:?}"),
        }
    }

    #[test]
    fn test_free_text_is_not_a_command() {
        assert_eq!(
            parse_command("I think the answer is stored already."),
            Err(CommandParseError::NotACommand)
        );
        assert_eq!(parse_command(""), Err(CommandParseError::NotACommand));
    }

    #[test]
    fn test_malformed_commands_rejected() {
        assert!(matches!(
            parse_command(r#"{"action": "store_memory"}"#),
            Err(CommandParseError::Malformed(_))
        ));
        assert!(matches!(
            parse_command("store_memory|"),
            Err(CommandParseError::Malformed(_))
        ));
        assert!(matches!(
            parse_command("explode|now"),
            Err(CommandParseError::Malformed(_))
        ));
    }

    #[test]
    fn test_response_shape() {
        let response = CommandResponse::ok("get_status", serde_json::json!({"total": 3}));
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["status"], "ok");
        assert_eq!(value["action"], "get_status");
        assert!(value.get("message").is_none());

        let response = CommandResponse::error("cleanup", "store is read-only");
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["status"], "error");
        assert_eq!(value["message"], "store is read-only");
    }

    #[test]
    fn test_wire_roundtrip() {
        let command = Command::RetrieveMemory {
            query: "decay".to_string(),
            tier: None,
            category: None,
            limit: Some(3),
        };
        let wire = serde_json::to_string(&command).unwrap();
        assert!(wire.contains(r#""action":"retrieve_memory""#));
        assert_eq!(parse_command(&wire).unwrap(), command);
    }
}
