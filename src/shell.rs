//! Line-oriented front-end for the explorer.
//!
//! Commands: bands, select, op, operands, compute, ratio, difference, rgb,
//! show, stats, save, notes, dismiss, help, quit. New notifications are
//! appended to the output after every command.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::debug;

use crate::backend::Backend;
use crate::explorer::Explorer;
use crate::notifications::Severity;
use crate::panels::{ActionOutcome, Operation};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Output line styling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Info,
    Success,
    Error,
    Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct Shell<B> {
    explorer: Explorer<B>,
    output: Vec<(String, OutputKind)>,
    /// Highest notification id already printed.
    last_seen: u64,
    errors: usize,
    settle_timeout: Duration,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

impl<B: Backend> Shell<B> {
    pub fn new(explorer: Explorer<B>, settle_timeout: Duration) -> Self {
        Self {
            explorer,
            output: Vec::new(),
            last_seen: 0,
            errors: 0,
            settle_timeout,
        }
    }

    pub fn explorer(&self) -> &Explorer<B> {
        &self.explorer
    }

    /// Number of error notifications raised so far.
    pub fn error_count(&self) -> usize {
        self.errors
    }

    /// Take the output accumulated since the last call.
    pub fn take_output(&mut self) -> Vec<(String, OutputKind)> {
        std::mem::take(&mut self.output)
    }

    /// Load the catalog and report how it went.
    pub async fn mount(&mut self) {
        if self.explorer.mount().await {
            let count = self.explorer.catalog().bands().len();
            self.push(format!("{count} bands available. Type `help` for commands."), OutputKind::Info);
        }
        self.flush_notifications();
    }

    /// Run one command line.
    pub async fn execute(&mut self, line: &str) -> Flow {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.is_empty() {
            return Flow::Continue;
        }
        debug!(target: "shell", command = parts[0], "execute");

        let flow = match parts[0] {
            "help" => {
                self.cmd_help();
                Flow::Continue
            }
            "quit" | "exit" => Flow::Quit,
            // The rest of the line is the path, spaces included.
            "save" if parts.len() > 1 => {
                let path = line.trim_start()["save".len()..].trim();
                self.cmd_save(Path::new(path)).await;
                Flow::Continue
            }
            other => {
                self.dispatch(other, &parts[1..]).await;
                Flow::Continue
            }
        };
        self.flush_notifications();
        flow
    }

    /// Read commands from stdin until `quit` or end of input.
    pub async fn run(&mut self) -> Result<()> {
        let mut stdout = tokio::io::stdout();
        self.mount().await;
        write_lines(&mut stdout, self.take_output()).await?;

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            stdout.write_all(b"cog> ").await?;
            stdout.flush().await?;
            let Some(line) = lines.next_line().await.context("Failed to read stdin")? else {
                break;
            };
            let flow = self.execute(&line).await;
            write_lines(&mut stdout, self.take_output()).await?;
            if flow == Flow::Quit {
                break;
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

impl<B: Backend> Shell<B> {
    async fn dispatch(&mut self, command: &str, args: &[&str]) {
        match (command, args) {
            ("bands", []) => self.cmd_bands(),
            ("select", [band]) => self.cmd_select(band).await,
            ("op", [name]) => self.cmd_op(name),
            ("operands", [first, second]) => self.cmd_operands(first, second),
            ("compute", []) => self.cmd_compute().await,
            ("ratio", [first, second]) => {
                self.explorer.arithmetic().set_operation(Operation::Ratio);
                self.cmd_operands(first, second);
                self.cmd_compute().await;
            }
            ("difference" | "diff", [first, second]) => {
                self.explorer.arithmetic().set_operation(Operation::Difference);
                self.cmd_operands(first, second);
                self.cmd_compute().await;
            }
            ("rgb", [red, green, blue]) => self.cmd_rgb(red, green, blue).await,
            ("show", []) => self.cmd_show().await,
            ("stats", []) => self.cmd_stats().await,
            ("notes", []) => self.cmd_notes(),
            ("dismiss", [id]) => self.cmd_dismiss(id),
            (
                "bands" | "select" | "op" | "operands" | "compute" | "ratio" | "difference"
                | "diff" | "rgb" | "show" | "stats" | "save" | "notes" | "dismiss",
                _,
            ) => self.push_error(&format!("Usage: {}", usage(command))),
            (other, _) => {
                self.push_error(&format!("Unknown command: `{other}`. Type `help` for usage."))
            }
        }
    }

    fn cmd_help(&mut self) {
        self.push("Commands:".into(), OutputKind::Info);
        for (command, description) in COMMANDS {
            self.push(format!("  {command:<28} {description}"), OutputKind::Value);
        }
    }

    fn cmd_bands(&mut self) {
        let entries = self.explorer.catalog().entries();
        if entries.is_empty() {
            self.push("No bands loaded.".into(), OutputKind::Info);
            return;
        }
        for entry in entries {
            let marker = if entry.selected { '*' } else { ' ' };
            self.push(format!("{marker} {}", entry.label), OutputKind::Value);
        }
    }

    async fn cmd_select(&mut self, band: &str) {
        let outcome = self.explorer.catalog().select_band(band.into()).await;
        self.report(outcome, &format!("Showing band {band}"));
    }

    fn cmd_op(&mut self, name: &str) {
        match name.parse::<Operation>() {
            Ok(op) => {
                self.explorer.arithmetic().set_operation(op);
                self.push(format!("Operation set to {op}"), OutputKind::Success);
            }
            Err(e) => self.push_error(&e),
        }
    }

    fn cmd_operands(&mut self, first: &str, second: &str) {
        let arithmetic = self.explorer.arithmetic();
        arithmetic.set_first(first.into());
        arithmetic.set_second(second.into());
    }

    async fn cmd_compute(&mut self) {
        let form = self.explorer.arithmetic().form();
        let outcome = self.explorer.arithmetic().compute().await;
        self.report(outcome, &format!("Computed {}", form.operation));
    }

    async fn cmd_rgb(&mut self, red: &str, green: &str, blue: &str) {
        let composite = self.explorer.composite();
        composite.set_channels(red.into(), green.into(), blue.into());
        let outcome = composite.compose().await;
        self.report(outcome, "Composite ready");
    }

    async fn cmd_show(&mut self) {
        let view = self.explorer.settle_display(self.settle_timeout).await;
        for line in view.lines() {
            self.push(line, OutputKind::Value);
        }
        let kind = self.explorer.session().visualization().kind();
        if view.image().is_some() {
            self.push(format!("({} visualization)", kind.label()), OutputKind::Info);
        }
    }

    async fn cmd_stats(&mut self) {
        let view = self.explorer.settle_statistics(self.settle_timeout).await;
        for line in view.lines() {
            self.push(line, OutputKind::Value);
        }
    }

    async fn cmd_save(&mut self, path: &Path) {
        let view = self.explorer.settle_display(self.settle_timeout).await;
        let Some(image) = view.image() else {
            self.push_error("Nothing to save: no image is displayed.");
            return;
        };
        match write_image(path, image.bytes()).await {
            Ok(()) => self.push(
                format!("Saved {} ({} bytes) to {}", image.source(), image.len(), path.display()),
                OutputKind::Success,
            ),
            Err(e) => self.push_error(&format!("{e:#}")),
        }
    }

    fn cmd_notes(&mut self) {
        let notifications = self.explorer.notifications();
        notifications.prune_expired(Utc::now());
        let pending = notifications.pending();
        if pending.is_empty() {
            self.push("No notifications.".into(), OutputKind::Info);
        }
        for note in pending {
            self.push(note.to_string(), kind_of(note.severity));
        }
    }

    fn cmd_dismiss(&mut self, id: &str) {
        match id.trim_start_matches('#').parse::<u64>() {
            Ok(id) if self.explorer.notifications().dismiss(id) => {
                self.push(format!("Dismissed #{id}"), OutputKind::Success)
            }
            Ok(id) => self.push_error(&format!("No pending notification #{id}")),
            Err(_) => self.push_error(&format!("Not a notification id: `{id}`")),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const COMMANDS: [(&str, &str); 15] = [
    ("bands", "List the available bands"),
    ("select <band>", "Convert and show a band"),
    ("op <ratio|difference>", "Choose the band operation"),
    ("operands <first> <second>", "Choose the two operand bands"),
    ("compute", "Run the chosen operation"),
    ("ratio <num> <den>", "Shortcut: op ratio, operands, compute"),
    ("difference <a> <b>", "Shortcut: op difference, operands, compute"),
    ("rgb <red> <green> <blue>", "Build an RGB composite"),
    ("show", "Show the displayed image"),
    ("stats", "Show statistics of the selected band"),
    ("save <file>", "Write the displayed image to a file"),
    ("notes", "List pending notifications"),
    ("dismiss <id>", "Dismiss a notification"),
    ("help", "Show this help"),
    ("quit", "Leave the explorer"),
];

fn usage(command: &str) -> &'static str {
    let command = if command == "diff" { "difference" } else { command };
    COMMANDS
        .iter()
        .find(|(usage, _)| usage.split_whitespace().next() == Some(command))
        .map(|(usage, _)| *usage)
        .unwrap_or("help")
}

fn kind_of(severity: Severity) -> OutputKind {
    match severity {
        Severity::Info => OutputKind::Success,
        Severity::Warning | Severity::Error => OutputKind::Error,
    }
}

impl<B: Backend> Shell<B> {
    fn push(&mut self, line: String, kind: OutputKind) {
        self.output.push((line, kind));
    }

    fn push_error(&mut self, message: &str) {
        self.output.push((message.to_string(), OutputKind::Error));
    }

    fn report(&mut self, outcome: ActionOutcome, success: &str) {
        match outcome {
            ActionOutcome::Published => self.push(success.to_string(), OutputKind::Success),
            ActionOutcome::Superseded => self.push(
                "Result discarded: a newer request replaced it.".into(),
                OutputKind::Info,
            ),
            // The notification says what went wrong.
            ActionOutcome::Failed => {}
        }
    }

    /// Print notifications raised since the last flush, then drop expired
    /// ones from the queue.
    fn flush_notifications(&mut self) {
        let notifications = self.explorer.notifications();
        let fresh: Vec<_> = notifications
            .pending()
            .into_iter()
            .filter(|n| n.id > self.last_seen)
            .collect();
        notifications.prune_expired(Utc::now());
        for note in fresh {
            self.last_seen = note.id;
            if note.severity == Severity::Error {
                self.errors += 1;
            }
            self.output.push((note.to_string(), kind_of(note.severity)));
        }
    }
}

async fn write_image(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}

async fn write_lines(
    out: &mut tokio::io::Stdout,
    lines: Vec<(String, OutputKind)>,
) -> std::io::Result<()> {
    for (line, kind) in lines {
        let prefix = match kind {
            OutputKind::Error => "! ",
            OutputKind::Success => "+ ",
            OutputKind::Info | OutputKind::Value => "",
        };
        out.write_all(format!("{prefix}{line}\n").as_bytes()).await?;
    }
    out.flush().await
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
