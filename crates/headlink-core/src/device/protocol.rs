//! Raw HID report decoding.
//!
//! A report is `[report_id, state, ..]`. Only the telephony report (`0x01`)
//! carries button state; every other combination is dropped without error
//! since headsets emit plenty of reports the agent does not care about.
//!
//! | report | state  | button       |
//! |--------|--------|--------------|
//! | `0x01` | `0x01` | `OffHook`    |
//! | `0x01` | `0x02` | `Mute`       |
//! | `0x01` | `0x04` | `HookSwitch` |
//! | `0x01` | `0x08` | `Flash`      |

use crate::model::{ButtonEvent, ButtonId};

const TELEPHONY_REPORT: u8 = 0x01;

/// Map a raw frame to `(button, pressed)`.
pub fn decode_frame(frame: &[u8]) -> Option<(ButtonId, bool)> {
    let [report, state, ..] = frame else {
        return None;
    };

    if *report != TELEPHONY_REPORT {
        return None;
    }

    let button = match *state {
        0x01 => ButtonId::OffHook,
        0x02 => ButtonId::Mute,
        0x04 => ButtonId::HookSwitch,
        0x08 => ButtonId::Flash,
        _ => return None,
    };
    Some((button, true))
}

/// Decode a frame read from `device_id` into a button event.
pub fn decode(device_id: u16, frame: &[u8]) -> Option<ButtonEvent> {
    decode_frame(frame).map(|(button, pressed)| ButtonEvent {
        device_id,
        button,
        pressed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mute_frame() {
        assert_eq!(
            decode(7, &[0x01, 0x02]),
            Some(ButtonEvent {
                device_id: 7,
                button: ButtonId::Mute,
                pressed: true,
            })
        );
    }

    #[test]
    fn full_table() {
        assert_eq!(decode_frame(&[0x01, 0x01]), Some((ButtonId::OffHook, true)));
        assert_eq!(decode_frame(&[0x01, 0x04]), Some((ButtonId::HookSwitch, true)));
        assert_eq!(decode_frame(&[0x01, 0x08, 0xff, 0x00]), Some((ButtonId::Flash, true)));
    }

    #[test]
    fn unmapped_and_short_frames_are_dropped() {
        assert_eq!(decode(1, &[0x09, 0x09]), None);
        assert_eq!(decode(1, &[0x01, 0x03]), None);
        assert_eq!(decode(1, &[0x02, 0x02]), None);
        assert_eq!(decode(1, &[0x01]), None);
        assert_eq!(decode(1, &[]), None);
    }
}
