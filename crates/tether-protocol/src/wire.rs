//! Wire records
//!
//! Rich domain values that hold closures or opaque data never go on the wire
//! directly. Each has a record here and explicit conversions both ways.

use serde::{Deserialize, Serialize};
use tether_api::{ChatMsg, ChatUd, GameMenuEntry, GameMenuEntryInfo, TerminalMenuEntry};
use tether_core::CallbackRegistration;

/// Arguments of a call bounded by the caller's deadline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Timed<T> {
    /// Relative deadline, `0` for none.
    #[serde(default)]
    pub timeout_ms: u64,
    #[serde(flatten)]
    pub args: T,
}

impl<T> Timed<T> {
    pub fn new(timeout_ms: u64, args: T) -> Self {
        Self { timeout_ms, args }
    }
}

/// A registration id (listener, subscription, intercept or entry).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IdArgs {
    pub id: String,
}

impl IdArgs {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NameArgs {
    pub name: String,
}

impl NameArgs {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Registration of a callback scoped by a name (sender, topic, api).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NamedCallback {
    pub name: String,
    #[serde(flatten)]
    pub callback: CallbackRegistration,
}

impl NamedCallback {
    pub fn new(name: impl Into<String>, callback: CallbackRegistration) -> Self {
        Self {
            name: name.into(),
            callback,
        }
    }
}

/// [`ChatUd`] without its opaque aux value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatUdWire {
    pub name: String,
    pub msg: Vec<String>,
    pub kind: i32,
    pub raw_msg: String,
    pub raw_name: String,
    pub raw_parameters: Vec<String>,
    pub parsed_msg: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatMsgWire {
    pub msg: Vec<String>,
    pub name: String,
    pub parsed_msg: String,
    pub raw_msg: String,
    pub raw_parameters: Vec<String>,
    pub msg_type: u8,
    pub ud: ChatUdWire,
}

impl From<ChatMsg> for ChatMsgWire {
    fn from(chat: ChatMsg) -> Self {
        let ud = chat.ud;
        Self {
            msg: chat.msg,
            name: chat.name,
            parsed_msg: chat.parsed_msg,
            raw_msg: chat.raw_msg,
            raw_parameters: chat.raw_parameters,
            msg_type: chat.msg_type,
            ud: ChatUdWire {
                name: ud.name,
                msg: ud.msg,
                kind: ud.kind,
                raw_msg: ud.raw_msg,
                raw_name: ud.raw_name,
                raw_parameters: ud.raw_parameters,
                parsed_msg: ud.parsed_msg,
            },
        }
    }
}

impl From<ChatMsgWire> for ChatMsg {
    fn from(wire: ChatMsgWire) -> Self {
        let ud = wire.ud;
        Self {
            msg: wire.msg,
            name: wire.name,
            parsed_msg: wire.parsed_msg,
            raw_msg: wire.raw_msg,
            raw_parameters: wire.raw_parameters,
            msg_type: wire.msg_type,
            ud: ChatUd {
                name: ud.name,
                msg: ud.msg,
                kind: ud.kind,
                raw_msg: ud.raw_msg,
                raw_name: ud.raw_name,
                raw_parameters: ud.raw_parameters,
                aux: None,
                parsed_msg: ud.parsed_msg,
            },
        }
    }
}

/// Menu entry without its trigger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MenuEntryWire {
    pub triggers: Vec<String>,
    pub argument_hint: String,
    pub usage: String,
}

impl From<&GameMenuEntry> for MenuEntryWire {
    fn from(entry: &GameMenuEntry) -> Self {
        Self {
            triggers: entry.triggers.clone(),
            argument_hint: entry.argument_hint.clone(),
            usage: entry.usage.clone(),
        }
    }
}

impl From<&TerminalMenuEntry> for MenuEntryWire {
    fn from(entry: &TerminalMenuEntry) -> Self {
        Self {
            triggers: entry.triggers.clone(),
            argument_hint: entry.argument_hint.clone(),
            usage: entry.usage.clone(),
        }
    }
}

impl MenuEntryWire {
    pub fn into_game_entry(self, on_trigger: tether_api::EventHandler<ChatMsg>) -> GameMenuEntry {
        GameMenuEntry {
            triggers: self.triggers,
            argument_hint: self.argument_hint,
            usage: self.usage,
            on_trigger,
        }
    }

    pub fn into_terminal_entry(
        self,
        on_trigger: tether_api::EventHandler<Vec<String>>,
    ) -> TerminalMenuEntry {
        TerminalMenuEntry {
            triggers: self.triggers,
            argument_hint: self.argument_hint,
            usage: self.usage,
            on_trigger,
        }
    }

    pub fn info(self, entry_id: impl Into<String>) -> GameMenuEntryInfo {
        GameMenuEntryInfo {
            entry_id: entry_id.into(),
            triggers: self.triggers,
            argument_hint: self.argument_hint,
            usage: self.usage,
        }
    }
}

/// Registration of a menu entry together with its trigger bridge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MenuEntryRegistration {
    pub entry: MenuEntryWire,
    pub trigger: CallbackRegistration,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_chat_aux_is_stripped() {
        let chat = ChatMsg {
            name: "steve".into(),
            msg: vec!["hi".into()],
            ud: ChatUd {
                raw_name: "§esteve".into(),
                aux: Some(Arc::new(42_u32)),
                ..Default::default()
            },
            ..Default::default()
        };
        let wire = ChatMsgWire::from(chat);
        let json = serde_json::to_value(&wire).unwrap();
        assert!(json["ud"].get("aux").is_none());

        let back = ChatMsg::from(wire);
        assert_eq!(back.name, "steve");
        assert_eq!(back.ud.raw_name, "§esteve");
        assert!(back.ud.aux.is_none());
    }

    #[test]
    fn test_timed_flattens_args() {
        let timed = Timed::new(50, NameArgs::new("say hi"));
        let json = serde_json::to_value(&timed).unwrap();
        assert_eq!(json, serde_json::json!({"timeout_ms": 50, "name": "say hi"}));

        let back: Timed<NameArgs> = serde_json::from_value(serde_json::json!({"name": "x"})).unwrap();
        assert_eq!(back.timeout_ms, 0);
    }
}
