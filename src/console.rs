//! Human-readable progress output on stdout.

use crate::ota::{Reporter, TransferProgress, UpdateKind, TOTAL_BARS};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

/// Bytes shown in the upload hex preview
const HEX_PREVIEW_LEN: usize = 16;

pub struct ConsoleReporter {
    timestamps: bool,
    bar: Mutex<Option<ProgressBar>>,
}

impl ConsoleReporter {
    pub fn new(timestamps: bool) -> Self {
        Self {
            timestamps,
            bar: Mutex::new(None),
        }
    }

    fn prefix(&self) -> String {
        timestamp_prefix(self.timestamps)
    }

    fn print(&self, text: &str) {
        let mut stdout = std::io::stdout();
        let _ = write!(stdout, "{}", text);
        let _ = stdout.flush();
    }

    fn println(&self, text: &str) {
        println!("{}", text);
    }

    fn with_bar(&self, f: impl FnOnce(&mut Option<ProgressBar>)) {
        let mut bar = self.bar.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut bar);
    }
}

impl Reporter for ConsoleReporter {
    fn signed_image(&self, path: &Path) {
        self.println(&format!(
            "{}Detected Signed Update. {:?} will be uploaded instead.",
            self.prefix(),
            path.display().to_string()
        ));
    }

    fn converting_elf(&self, _path: &Path) {
        self.println(&format!("{}Converting ELF to BIN", self.prefix()));
    }

    fn sending_request(&self, kind: UpdateKind, host: &str, port: u16) {
        self.println(&format!(
            "{}Sending OTA {} update request to {}:{}",
            self.prefix(),
            kind.label(),
            host,
            port
        ));
    }

    fn retrying(&self, attempt: u32) {
        if attempt == 2 {
            self.print(&format!("{}Retrying...", self.prefix()));
        } else {
            self.print(".");
        }
    }

    fn connect_outcome(&self, connected: bool) {
        if connected {
            self.println(&format!(" {}", "connected!".green()));
        } else {
            self.println(&format!(" {}", "failed!".red()));
        }
    }

    fn authenticating(&self) {
        self.print(&format!("{}Authenticating...", self.prefix()));
    }

    fn authenticated(&self, ok: bool) {
        if ok {
            self.println(&format!(" {}", "done!".green()));
        } else {
            self.println(&format!(" {}", "failed!".red()));
        }
    }

    fn upload_started(&self, head: &[u8], total: usize) {
        self.println(&format!(
            "{}Uploading {}...",
            self.prefix(),
            hex_preview(head)
        ));
        self.println(&format!(
            "{}Total:    |<{}>| {} bytes",
            self.prefix(),
            "-".repeat(TOTAL_BARS as usize - 2),
            total
        ));

        let bar = ProgressBar::with_draw_target(Some(TOTAL_BARS), ProgressDrawTarget::stdout());
        let template = format!("{}Progress: [{{bar:{}}}] {{msg}}", self.prefix(), TOTAL_BARS);
        if let Ok(style) = ProgressStyle::with_template(&template) {
            bar.set_style(style.progress_chars("= "));
        }
        self.with_bar(|slot| *slot = Some(bar));
    }

    fn chunk_sent(&self, progress: &TransferProgress) {
        let position = progress.bar_position(TOTAL_BARS);
        self.with_bar(|slot| {
            if let Some(bar) = slot {
                bar.set_position(position);
            }
        });
    }

    fn upload_finished(&self, progress: &TransferProgress) {
        let seconds = progress.elapsed().as_secs_f64();
        self.with_bar(|slot| {
            if let Some(bar) = slot.take() {
                bar.finish_with_message(format!("{:.2} seconds", seconds));
            }
        });
    }

    fn verifying(&self) {
        self.print(&format!("{}Verifying...", self.prefix()));
    }

    fn verify_tick(&self) {
        self.print(".");
    }

    fn verified(&self, ok: bool) {
        if ok {
            self.println(&format!(" {}", "done!".green()));
        } else {
            self.println(&format!(" {}", "failed!".red()));
        }
    }

    fn finished(&self, elapsed: Duration) {
        self.println(&format!(
            "{}OTA update finished in {:.2} seconds.",
            self.prefix(),
            elapsed.as_secs_f64()
        ));
    }
}

/// `[YYYY-MM-DD HH:MM:SS]: ` in UTC, or empty.
pub fn timestamp_prefix(enabled: bool) -> String {
    if !enabled {
        return String::new();
    }
    format!("[{}]: ", chrono::Utc::now().format("%Y-%m-%d %H:%M:%S"))
}

/// Upper-case, space-separated hex of the first bytes of `data`.
pub fn hex_preview(data: &[u8]) -> String {
    data.iter()
        .take(HEX_PREVIEW_LEN)
        .map(|b| hex::encode_upper([*b]))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_preview() {
        assert_eq!(hex_preview(&[0x00, 0x0a, 0xff]), "00 0A FF");
        assert_eq!(hex_preview(&[]), "");

        let long: Vec<u8> = (0..32).collect();
        let preview = hex_preview(&long);
        assert_eq!(preview.split(' ').count(), 16);
        assert!(preview.ends_with("0F"));
    }

    #[test]
    fn test_timestamp_prefix() {
        assert_eq!(timestamp_prefix(false), "");

        let prefix = timestamp_prefix(true);
        assert!(prefix.starts_with('['));
        assert!(prefix.ends_with("]: "));
        // [YYYY-MM-DD HH:MM:SS]:
        assert_eq!(prefix.len(), 1 + 19 + 3);
    }
}
