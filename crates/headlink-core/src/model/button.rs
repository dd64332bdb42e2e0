// ── Button identifiers ──

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumCount, EnumIter, EnumString};

/// Telephony buttons a headset can report.
///
/// The string form (`Mute`, `HookSwitch`, ...) is stable: it is the key
/// used in key maps and the button name sent in click events.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    AsRefStr,
    EnumString,
    EnumIter,
    EnumCount,
)]
pub enum ButtonId {
    Cyclic,
    CyclicEnd,
    Decline,
    DialNext,
    DialPrev,
    EndCall,
    FireAlarm,
    Flash,
    FlexibleBootMute,
    #[strum(serialize = "GN1")]
    #[serde(rename = "GN1")]
    Gn1,
    #[strum(serialize = "GN2")]
    #[serde(rename = "GN2")]
    Gn2,
    #[strum(serialize = "GN3")]
    #[serde(rename = "GN3")]
    Gn3,
    #[strum(serialize = "GN4")]
    #[serde(rename = "GN4")]
    Gn4,
    #[strum(serialize = "GN5")]
    #[serde(rename = "GN5")]
    Gn5,
    #[strum(serialize = "GN6")]
    #[serde(rename = "GN6")]
    Gn6,
    HookSwitch,
    Jabra,
    Key0,
    Key1,
    Key2,
    Key3,
    Key4,
    Key5,
    Key6,
    Key7,
    Key8,
    Key9,
    KeyClear,
    KeyPound,
    KeyStar,
    LineBusy,
    Mute,
    Offline,
    OffHook,
    Online,
    PseudoOffHook,
    Redial,
    RejectCall,
    SpeedDial,
    Transfer,
    VoiceMail,
    VolumeDown,
    VolumeUp,
}
