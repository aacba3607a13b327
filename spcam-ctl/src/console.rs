//! Line-oriented console front-end.
//!
//! Reads menu choices from stdin and prints status events as they
//! arrive. Input, device events and Ctrl-C are multiplexed with
//! `tokio::select!`.

use std::io::BufRead;
use std::str::FromStr;

use spcam_core::{
    CameraController, CameraError, CameraResult, Resolution, StatusEvent, WhiteBalance,
};
use tokio::sync::mpsc;
use tracing::{debug, info};

// ── ConsoleCommand ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    Record(Resolution),
    Stop,
    Snapshot,
    /// Show the white balance presets and wait for a choice.
    WhiteBalanceMenu,
    WhiteBalance(WhiteBalance),
    Shutdown,
    Status,
    Help,
    Quit,
}

impl FromStr for ConsoleCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_whitespace();
        let head = parts.next().unwrap_or_default().to_ascii_lowercase();
        let arg = parts.next();

        let cmd = match head.as_str() {
            "1" | "qvga" => Self::Record(Resolution::Qvga),
            "2" | "vga" => Self::Record(Resolution::Vga),
            "3" | "hd" => Self::Record(Resolution::Hd),
            "4" | "stop" => Self::Stop,
            "5" | "snap" | "snapshot" => Self::Snapshot,
            "6" | "wb" => match arg {
                Some(choice) => Self::WhiteBalance(parse_white_balance(choice)?),
                None => Self::WhiteBalanceMenu,
            },
            "7" | "shutdown" => Self::Shutdown,
            "8" | "q" | "quit" | "exit" => Self::Quit,
            "status" => Self::Status,
            "h" | "help" | "?" => Self::Help,
            "" => return Err("empty input".into()),
            other => return Err(format!("unknown command: {other}")),
        };
        Ok(cmd)
    }
}

/// Accepts a menu number (1-6), a preset name or a wire character.
pub fn parse_white_balance(choice: &str) -> Result<WhiteBalance, String> {
    let choice = choice.trim();
    if let Ok(n) = choice.parse::<usize>() {
        return n
            .checked_sub(1)
            .and_then(|i| WhiteBalance::ALL.get(i).copied())
            .ok_or_else(|| format!("no white balance preset {n}"));
    }
    choice.parse::<WhiteBalance>().map_err(|e| e.to_string())
}

fn print_menu() {
    println!();
    println!("=== Camera Control ===");
    println!("1. Start recording (QVGA)");
    println!("2. Start recording (VGA)");
    println!("3. Start recording (HD)");
    println!("4. Stop recording");
    println!("5. Take snapshot");
    println!("6. Set white balance");
    println!("7. Shutdown device");
    println!("8. Exit");
    println!("Enter choice:");
}

fn print_white_balance_menu() {
    println!();
    println!("=== White Balance ===");
    for (i, mode) in WhiteBalance::ALL.iter().enumerate() {
        println!("{}. {}", i + 1, mode.name());
    }
    println!("Enter choice:");
}

// ── Console ──────────────────────────────────────────────────────

pub struct Console {
    controller: CameraController,
    events: mpsc::Receiver<StatusEvent>,
    awaiting_white_balance: bool,
}

impl Console {
    pub fn new(controller: CameraController, events: mpsc::Receiver<StatusEvent>) -> Self {
        Self {
            controller,
            events,
            awaiting_white_balance: false,
        }
    }

    /// Run until the user quits, stdin closes or Ctrl-C, then disconnect.
    pub async fn run(mut self) -> CameraResult<()> {
        let mut lines = spawn_stdin_reader();
        print_menu();

        loop {
            tokio::select! {
                line = lines.recv() => match line {
                    Some(line) => {
                        if !self.handle_line(&line).await {
                            break;
                        }
                    }
                    None => {
                        info!("stdin closed");
                        break;
                    }
                },
                Some(event) = self.events.recv() => println!("[STATUS] {event}"),
                _ = tokio::signal::ctrl_c() => {
                    println!();
                    break;
                }
            }
        }

        println!("Exiting...");
        if self.controller.is_connected() {
            self.controller.disconnect().await?;
        }
        while let Ok(event) = self.events.try_recv() {
            println!("[STATUS] {event}");
        }
        Ok(())
    }

    /// Returns `false` when the console should exit.
    async fn handle_line(&mut self, line: &str) -> bool {
        let line = line.trim();
        if line.is_empty() {
            return true;
        }

        if std::mem::take(&mut self.awaiting_white_balance) {
            match parse_white_balance(line) {
                Ok(mode) => self.report(self.controller.set_white_balance(mode).await),
                Err(e) => println!("{e}"),
            }
            print_menu();
            return true;
        }

        let cmd = match line.parse::<ConsoleCommand>() {
            Ok(cmd) => cmd,
            Err(e) => {
                println!("{e}. Please try again.");
                return true;
            }
        };
        debug!(?cmd, "console command");

        match cmd {
            ConsoleCommand::Record(res) => self.report(self.controller.start_recording(res).await),
            ConsoleCommand::Stop => self.report(self.controller.stop_recording().await),
            ConsoleCommand::Snapshot => self.report(self.controller.take_snapshot().await),
            ConsoleCommand::WhiteBalanceMenu => {
                self.awaiting_white_balance = true;
                print_white_balance_menu();
                return true;
            }
            ConsoleCommand::WhiteBalance(mode) => {
                self.report(self.controller.set_white_balance(mode).await)
            }
            ConsoleCommand::Shutdown => self.report(self.controller.shutdown_device().await),
            ConsoleCommand::Status => {
                println!(
                    "Status: {} | link: {} | frames received: {}",
                    self.controller.status_text(),
                    if self.controller.is_connected() { "up" } else { "down" },
                    self.controller.frames_received()
                );
            }
            ConsoleCommand::Help => {}
            ConsoleCommand::Quit => return false,
        }
        print_menu();
        true
    }

    /// Refusals already arrive as status events; print everything else.
    fn report(&self, result: CameraResult<()>) {
        match result {
            Ok(()) | Err(CameraError::CommandRefused { .. }) => {}
            Err(e) => println!("Error: {e}"),
        }
    }
}

/// Forward stdin lines over a channel from a detached thread.
///
/// A blocking stdin read cannot be cancelled, so the thread is left to
/// die with the process.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}
