//! Device control surface.
//!
//! The automation core depends only on this small synchronous contract;
//! the transport behind it is a collaborator concern. The bundled
//! [`AdbShellDevice`] shells out to the `adb` binary, which keeps the
//! core testable against mocks and keeps device quirks in one place.

use std::process::Command;

use image::GrayImage;

use crate::error::{PilotError, PilotResult};

/// The small contract the core needs from a device: input injection,
/// screen capture, two shell diagnostics, and process stop/launch for
/// recovery.
pub trait DeviceControl: Send + Sync {
    fn tap(&self, x: u32, y: u32) -> PilotResult<()>;
    fn swipe(&self, x1: u32, y1: u32, x2: u32, y2: u32, duration_ms: u32) -> PilotResult<()>;
    /// Capture the current screen, decoded to grayscale for matching.
    fn capture_screenshot(&self) -> PilotResult<GrayImage>;
    /// Raw window/activity diagnostic text for foreground detection.
    fn query_foreground_text(&self) -> PilotResult<String>;
    /// Raw process-list text (one process per line, name last).
    fn query_process_list(&self) -> PilotResult<String>;
    fn force_stop(&self, package: &str) -> PilotResult<()>;
    fn launch(&self, package: &str) -> PilotResult<()>;
}

/// Reference implementation over the `adb` command-line tool.
pub struct AdbShellDevice {
    /// Optional `-s` serial for multi-device setups.
    serial: Option<String>,
}

impl AdbShellDevice {
    pub fn new(serial: Option<String>) -> Self {
        Self { serial }
    }

    fn shell(&self, args: &[&str]) -> PilotResult<Vec<u8>> {
        let mut cmd = Command::new("adb");
        if let Some(serial) = &self.serial {
            cmd.args(["-s", serial]);
        }
        cmd.arg("shell").args(args);
        self.run(cmd, args.join(" "))
    }

    fn exec_out(&self, args: &[&str]) -> PilotResult<Vec<u8>> {
        let mut cmd = Command::new("adb");
        if let Some(serial) = &self.serial {
            cmd.args(["-s", serial]);
        }
        cmd.arg("exec-out").args(args);
        self.run(cmd, args.join(" "))
    }

    fn run(&self, mut cmd: Command, description: String) -> PilotResult<Vec<u8>> {
        let output = cmd.output().map_err(|e| PilotError::DeviceCommand {
            command: description.clone(),
            reason: e.to_string(),
        })?;
        if !output.status.success() {
            return Err(PilotError::DeviceCommand {
                command: description,
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output.stdout)
    }
}

impl DeviceControl for AdbShellDevice {
    fn tap(&self, x: u32, y: u32) -> PilotResult<()> {
        self.shell(&["input", "tap", &x.to_string(), &y.to_string()])?;
        Ok(())
    }

    fn swipe(&self, x1: u32, y1: u32, x2: u32, y2: u32, duration_ms: u32) -> PilotResult<()> {
        self.shell(&[
            "input",
            "swipe",
            &x1.to_string(),
            &y1.to_string(),
            &x2.to_string(),
            &y2.to_string(),
            &duration_ms.to_string(),
        ])?;
        Ok(())
    }

    fn capture_screenshot(&self) -> PilotResult<GrayImage> {
        let png = self.exec_out(&["screencap", "-p"])?;
        let image = image::load_from_memory(&png).map_err(|e| {
            PilotError::ScreenshotDecodeFailed {
                reason: e.to_string(),
            }
        })?;
        Ok(image.to_luma8())
    }

    fn query_foreground_text(&self) -> PilotResult<String> {
        // window service first; formats vary across Android releases and
        // the watchdog's parser tries several patterns
        let out = self.shell(&["dumpsys", "window", "windows"])?;
        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    fn query_process_list(&self) -> PilotResult<String> {
        let out = self.shell(&["ps", "-A"])?;
        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    fn force_stop(&self, package: &str) -> PilotResult<()> {
        self.shell(&["am", "force-stop", package])?;
        Ok(())
    }

    fn launch(&self, package: &str) -> PilotResult<()> {
        // monkey keeps us activity-agnostic
        self.shell(&[
            "monkey",
            "-p",
            package,
            "-c",
            "android.intent.category.LAUNCHER",
            "1",
        ])?;
        Ok(())
    }
}
