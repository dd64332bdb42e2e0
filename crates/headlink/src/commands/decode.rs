//! `decode`: run a raw HID report through the frame decoder.

use serde::Serialize;

use headlink_core::ButtonId;
use headlink_core::device::protocol;

use crate::cli::{DecodeArgs, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize, PartialEq, Eq)]
struct Decoded {
    bytes: Vec<u8>,
    button: Option<ButtonId>,
    pressed: Option<bool>,
}

pub fn handle(args: &DecodeArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let bytes = parse_hex(&args.hex.join(" "))?;
    let frame = protocol::decode_frame(&bytes);
    let decoded = Decoded {
        bytes,
        button: frame.map(|(button, _)| button),
        pressed: frame.map(|(_, pressed)| pressed),
    };

    let out = output::render_single(&global.output, &decoded, |d| match (d.button, &global.output) {
        (Some(button), OutputFormat::Plain) => button.to_string(),
        (Some(button), _) => {
            let state = if d.pressed == Some(true) { "pressed" } else { "released" };
            format!("{button} {state}")
        }
        (None, OutputFormat::Plain) => String::new(),
        (None, _) => "Report ignored (not a telephony button)".to_owned(),
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}

/// Accepts `0102`, `01 02`, `01:02` and `0x01,0x02`.
fn parse_hex(input: &str) -> Result<Vec<u8>, CliError> {
    let digits: String = input
        .split([',', ' '])
        .map(|chunk| chunk.trim_start_matches("0x").trim_start_matches("0X"))
        .collect::<String>()
        .chars()
        .filter(|c| *c != ':' && !c.is_whitespace())
        .collect();

    let invalid = |reason: String| CliError::Validation {
        field: "hex".into(),
        reason,
    };

    if digits.is_empty() {
        return Err(invalid("no bytes given".into()));
    }
    if digits.len() % 2 != 0 {
        return Err(invalid(format!("odd number of hex digits in '{input}'")));
    }

    (0..digits.len())
        .step_by(2)
        .map(|i| {
            digits
                .get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| invalid(format!("'{input}' is not valid hex")))
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn hex_forms() {
        assert_eq!(parse_hex("0102").unwrap(), vec![0x01, 0x02]);
        assert_eq!(parse_hex("01 02").unwrap(), vec![0x01, 0x02]);
        assert_eq!(parse_hex("01:08").unwrap(), vec![0x01, 0x08]);
        assert_eq!(parse_hex("0x01,0x04").unwrap(), vec![0x01, 0x04]);
    }

    #[test]
    fn bad_hex_is_rejected() {
        assert!(parse_hex("").is_err());
        assert!(parse_hex("012").is_err());
        assert!(parse_hex("zz").is_err());
        assert!(parse_hex("é1").is_err());
    }
}
