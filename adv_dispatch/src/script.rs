use std::fs;
use std::path::Path;
use std::sync::Arc;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::DispatchError;
use crate::pattern::Pattern;
use crate::registry::HandlerRegistry;
use crate::table::DispatchRow;

/// One row of a room script: when `on` matches, run `handler`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptAction {
    pub on: Pattern,
    pub handler: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Ordered action list for one room, as authored in JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomScript {
    pub room: String,
    #[serde(default)]
    pub actions: Vec<ScriptAction>,
}

impl RoomScript {
    pub fn from_json_str(raw: &str) -> Result<Self, DispatchError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn from_path(path: &Path) -> Result<Self, DispatchError> {
        let raw = fs::read_to_string(path).map_err(|source| DispatchError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let script = Self::from_json_str(&raw)?;
        debug!(
            "loaded room `{}` ({} actions) from {}",
            script.room,
            script.actions.len(),
            path.display()
        );
        Ok(script)
    }

    /// Resolve every action against `registry`, keeping script order.
    pub fn bind<C>(&self, registry: &HandlerRegistry<C>) -> Result<Vec<DispatchRow<C>>, DispatchError> {
        self.actions
            .iter()
            .enumerate()
            .map(|(row, action)| {
                let handler =
                    registry
                        .get(&action.handler)
                        .ok_or_else(|| DispatchError::UnknownHandler {
                            room: self.room.clone(),
                            row,
                            handler: action.handler.clone(),
                        })?;
                let label = action.label.as_deref().unwrap_or(&action.handler);
                Ok(DispatchRow::shared(action.on, Arc::clone(handler)).labeled(label))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::ActionDispatchTable;
    use crate::trigger::{ActionKind, Trigger};
    use std::io::Write;
    use tempfile::NamedTempFile;

    const BRIDGE: &str = r#"{
        "room": "bridge",
        "actions": [
            { "on": ["use", 5, 7, "*"], "handler": "open_panel" },
            { "on": "use:*:*:*", "handler": "fallback", "label": "use anything" }
        ]
    }"#;

    fn registry() -> HandlerRegistry<Vec<String>> {
        let mut registry = HandlerRegistry::new();
        registry.register("open_panel", |log: &mut Vec<String>, _event: &Trigger| {
            log.push("panel".to_string())
        });
        registry.register("fallback", |log: &mut Vec<String>, event: &Trigger| {
            log.push(format!("fallback {event}"))
        });
        registry
    }

    #[test]
    fn bound_rows_keep_script_order() {
        let script = RoomScript::from_json_str(BRIDGE).unwrap();
        let rows = script.bind(&registry()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].label(), Some("open_panel"));
        assert_eq!(rows[1].label(), Some("use anything"));

        let mut table = ActionDispatchTable::new();
        table.build(rows);
        let mut log = Vec::new();
        table.handle(&mut log, &Trigger::new(ActionKind::Use, 5, 7, 3));
        table.handle(&mut log, &Trigger::new(ActionKind::Use, 1, 2, 3));
        assert_eq!(log, vec!["panel", "fallback use:1:2:3"]);
    }

    #[test]
    fn unknown_handler_names_the_row() {
        let script = RoomScript::from_json_str(
            r#"{ "room": "brig", "actions": [ { "on": "look:*:*:*", "handler": "nope" } ] }"#,
        )
        .unwrap();
        let err = script.bind(&registry()).unwrap_err();
        assert!(matches!(
            err,
            DispatchError::UnknownHandler { ref room, row: 0, ref handler }
                if room == "brig" && handler == "nope"
        ));
    }

    #[test]
    fn loads_from_disk() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(BRIDGE.as_bytes()).unwrap();
        let script = RoomScript::from_path(file.path()).unwrap();
        assert_eq!(script.room, "bridge");
        assert_eq!(script.actions.len(), 2);

        let missing = RoomScript::from_path(Path::new("/definitely/not/here.json"));
        assert!(matches!(missing, Err(DispatchError::Io { .. })));
    }

    #[test]
    fn malformed_patterns_fail_to_parse() {
        let err = RoomScript::from_json_str(
            r#"{ "room": "x", "actions": [ { "on": ["dance", 1, 2, 3], "handler": "h" } ] }"#,
        )
        .unwrap_err();
        assert!(matches!(err, DispatchError::Parse(_)));
    }
}
