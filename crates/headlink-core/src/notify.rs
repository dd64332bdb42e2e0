// ── Desktop notifications and sounds ──
//
// User-visible side effects go through `Notifier` so the monitor, the
// agent and the action executor never talk to the desktop directly.
// Every platform raises the urgent variant with the built-in tone.

use std::fs::File;
use std::io::BufReader;
use std::time::Duration;

use rodio::source::SineWave;
use rodio::{Decoder, OutputStream, Sink, Source};
use tokio::process::Command;

use crate::error::CoreError;

pub const APP_TITLE: &str = "Headlink";

pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, message: &str) -> Result<(), CoreError>;
    /// Urgent variant of `notify`.
    fn alert(&self, title: &str, message: &str) -> Result<(), CoreError>;
    /// Built-in tone.
    fn beep(&self) -> Result<(), CoreError>;
    fn play_file(&self, path: &str) -> Result<(), CoreError>;
}

/// Writes notifications to the log only. Used headless and in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, message: &str) -> Result<(), CoreError> {
        tracing::info!(title, message, "Notification");
        Ok(())
    }

    fn alert(&self, title: &str, message: &str) -> Result<(), CoreError> {
        tracing::warn!(title, message, "Alert");
        Ok(())
    }

    fn beep(&self) -> Result<(), CoreError> {
        tracing::info!("Beep");
        Ok(())
    }

    fn play_file(&self, path: &str) -> Result<(), CoreError> {
        tracing::info!(path, "Play sound");
        Ok(())
    }
}

/// Shells out to the platform's notification tool and plays sounds through
/// the default audio output.
///
/// Commands are spawned and not awaited; only a failure to start is
/// reported. Sounds play on their own thread, so callers never wait for
/// playback. Must be called from within a tokio runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct DesktopNotifier;

const BEEP_HZ: f32 = 880.0;
const BEEP_LENGTH: Duration = Duration::from_millis(300);
const BEEP_GAIN: f32 = 0.3;

type Sound = Box<dyn Source<Item = f32> + Send>;

impl DesktopNotifier {
    fn spawn(program: &str, args: &[&str]) -> Result<(), CoreError> {
        Command::new(program)
            .args(args)
            .spawn()
            .map(drop)
            .map_err(|e| CoreError::Spawn {
                command: program.to_owned(),
                reason: e.to_string(),
            })
    }

    /// The built-in tone: a short sine burst.
    fn tone() -> Sound {
        Box::new(
            SineWave::new(BEEP_HZ)
                .take_duration(BEEP_LENGTH)
                .amplify(BEEP_GAIN),
        )
    }

    /// Open and decode `path` on the caller's thread so a missing or
    /// unreadable file is reported, not just logged.
    fn load(path: &str) -> Result<Sound, CoreError> {
        let file = File::open(path)
            .map_err(|e| CoreError::Notification(format!("cannot open sound file {path}: {e}")))?;
        let decoder = Decoder::new(BufReader::new(file))
            .map_err(|e| CoreError::Notification(format!("cannot decode sound file {path}: {e}")))?;
        Ok(Box::new(decoder.convert_samples::<f32>()))
    }

    /// Play `sound` to the end on a detached thread. The output stream is
    /// opened on that thread and must outlive the sink.
    fn play(sound: Sound) -> Result<(), CoreError> {
        std::thread::Builder::new()
            .name("headlink-audio".into())
            .spawn(move || {
                let (_stream, handle) = match OutputStream::try_default() {
                    Ok(output) => output,
                    Err(e) => {
                        tracing::warn!(error = %e, "No audio output available");
                        return;
                    }
                };
                let sink = match Sink::try_new(&handle) {
                    Ok(sink) => sink,
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to open audio sink");
                        return;
                    }
                };
                sink.append(sound);
                sink.sleep_until_end();
            })
            .map(drop)
            .map_err(|e| CoreError::Notification(format!("failed to spawn audio thread: {e}")))
    }
}

impl Notifier for DesktopNotifier {
    #[cfg(target_os = "windows")]
    fn notify(&self, title: &str, message: &str) -> Result<(), CoreError> {
        let script = format!(
            "[void][System.Reflection.Assembly]::LoadWithPartialName('System.Windows.Forms');\
             $n = New-Object System.Windows.Forms.NotifyIcon;\
             $n.Icon = [System.Drawing.SystemIcons]::Information;\
             $n.Visible = $true;\
             $n.ShowBalloonTip(5000, '{}', '{}', 'Info')",
            title.replace('\'', "''"),
            message.replace('\'', "''")
        );
        Self::spawn("powershell", &["-NoProfile", "-Command", &script])
    }

    #[cfg(target_os = "macos")]
    fn notify(&self, title: &str, message: &str) -> Result<(), CoreError> {
        let script = format!("display notification {message:?} with title {title:?}");
        Self::spawn("osascript", &["-e", &script])
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    fn notify(&self, title: &str, message: &str) -> Result<(), CoreError> {
        Self::spawn("notify-send", &[title, message])
    }

    fn alert(&self, title: &str, message: &str) -> Result<(), CoreError> {
        if cfg!(any(target_os = "windows", target_os = "macos")) {
            self.notify(title, message)?;
        } else {
            Self::spawn("notify-send", &["--urgency=critical", title, message])?;
        }
        self.beep()
    }

    fn beep(&self) -> Result<(), CoreError> {
        Self::play(Self::tone())
    }

    fn play_file(&self, path: &str) -> Result<(), CoreError> {
        Self::play(Self::load(path)?)
    }
}

/// Records every call. Test double for components that notify.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingNotifier {
    pub calls: std::sync::Mutex<Vec<String>>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
impl RecordingNotifier {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn push(&self, call: String) -> Result<(), CoreError> {
        self.calls.lock().unwrap().push(call);
        Ok(())
    }
}

#[cfg(test)]
impl Notifier for RecordingNotifier {
    fn notify(&self, title: &str, message: &str) -> Result<(), CoreError> {
        self.push(format!("notify:{title}:{message}"))
    }

    fn alert(&self, title: &str, message: &str) -> Result<(), CoreError> {
        self.push(format!("alert:{title}:{message}"))
    }

    fn beep(&self) -> Result<(), CoreError> {
        self.push("beep".into())
    }

    fn play_file(&self, path: &str) -> Result<(), CoreError> {
        self.push(format!("play:{path}"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::Write as _;

    use super::*;

    #[test]
    fn tone_is_a_short_bounded_burst() {
        let tone = DesktopNotifier::tone();
        let rate = tone.sample_rate();
        let samples = tone.count();
        assert!(samples > 0);
        // Under half a second of mono audio.
        assert!(samples < usize::try_from(rate).unwrap() / 2, "{samples} samples at {rate} Hz");
    }

    #[test]
    fn missing_sound_file_is_reported() {
        let err = DesktopNotifier
            .play_file("/nonexistent/headlink/ring.wav")
            .unwrap_err();
        assert!(
            matches!(&err, CoreError::Notification(msg) if msg.contains("cannot open")),
            "{err}"
        );
    }

    #[test]
    fn undecodable_sound_file_is_reported() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"definitely not audio").unwrap();

        let err = DesktopNotifier
            .play_file(file.path().to_str().unwrap())
            .unwrap_err();
        assert!(
            matches!(&err, CoreError::Notification(msg) if msg.contains("cannot decode")),
            "{err}"
        );
    }
}
