// Button-to-action mapping, as stored in `keymap.json`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::CoreError;
use crate::model::ButtonId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ActionKind {
    /// HTTP GET or POST.
    ApiCall,
    /// Shell command, not awaited.
    Exec,
    /// Click event on the realtime channel.
    SocketEmit,
    Notify,
    PlaySound,
    None,
}

impl ActionKind {
    /// Strict parse for user input.
    pub fn parse(kind: &str) -> Result<Self, CoreError> {
        kind.parse()
            .map_err(|_| CoreError::UnknownAction(kind.to_owned()))
    }
}

/// One mapping entry. Which optional fields matter depends on `action`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub action: ActionKind,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub method: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub body: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cmd: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub event: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    /// File path, or `beep` for the built-in tone.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sound: String,
}

impl Action {
    pub fn new(action: ActionKind) -> Self {
        Self {
            action,
            url: String::new(),
            method: String::new(),
            body: String::new(),
            cmd: String::new(),
            event: String::new(),
            message: String::new(),
            title: String::new(),
            sound: String::new(),
        }
    }

    pub fn socket_emit(event: &str) -> Self {
        Self {
            event: event.to_owned(),
            ..Self::new(ActionKind::SocketEmit)
        }
    }

    pub fn notify(title: &str, message: &str) -> Self {
        Self {
            title: title.to_owned(),
            message: message.to_owned(),
            ..Self::new(ActionKind::Notify)
        }
    }

    pub fn api_call(method: &str, url: &str, body: &str) -> Self {
        Self {
            method: method.to_owned(),
            url: url.to_owned(),
            body: body.to_owned(),
            ..Self::new(ActionKind::ApiCall)
        }
    }

    pub fn exec(cmd: &str) -> Self {
        Self {
            cmd: cmd.to_owned(),
            ..Self::new(ActionKind::Exec)
        }
    }

    pub fn play_sound(sound: &str) -> Self {
        Self {
            sound: sound.to_owned(),
            ..Self::new(ActionKind::PlaySound)
        }
    }
}

/// Keys are button names (`ButtonId` strings); unknown names are kept so
/// hand-edited files survive a load/save cycle.
pub type KeyMap = BTreeMap<String, Action>;

/// Mapping used when no key map file exists.
pub fn default_key_map() -> KeyMap {
    let mut map = KeyMap::new();
    map.insert(
        ButtonId::OffHook.to_string(),
        Action::socket_emit(headlink_api::frame::EVENT_CLICK),
    );
    map.insert(
        ButtonId::HookSwitch.to_string(),
        Action::socket_emit(headlink_api::frame::EVENT_CLICK),
    );
    map.insert(
        ButtonId::Mute.to_string(),
        Action::notify(crate::notify::APP_TITLE, "Mute toggled"),
    );
    map.insert(
        ButtonId::VolumeUp.to_string(),
        Action {
            message: "Volume up".into(),
            ..Action::new(ActionKind::None)
        },
    );
    map.insert(
        ButtonId::VolumeDown.to_string(),
        Action {
            message: "Volume down".into(),
            ..Action::new(ActionKind::None)
        },
    );
    map
}
