//! The interactive side of a run. The pipeline works on its own thread and reports through a
//! channel; the front end drains that channel on a fixed interval and renders what it finds.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
use std::time::Duration;

use anyhow::{bail, Result};

use mapmatch::{Pipeline, ProgressSink, RunSummary, Settings, Severity, Transport};

/// How often queued progress gets rendered.
pub const DRAIN_INTERVAL: Duration = Duration::from_millis(150);

pub enum Message {
    Log(String, Severity),
    /// Always the last message of a run, whether it worked or not.
    Done(Option<RunSummary>),
}

struct ChannelSink(Sender<Message>);

impl ProgressSink for ChannelSink {
    fn emit(&self, message: &str, severity: Severity) {
        // If the front end went away, nobody is listening anymore
        let _ = self.0.send(Message::Log(message.to_string(), severity));
    }
}

/// What the user picked, and whether a run is underway.
#[derive(Default)]
pub struct Session {
    selected: Option<PathBuf>,
    running: bool,
}

impl Session {
    pub fn select(&mut self, path: PathBuf) {
        self.selected = Some(path);
    }

    pub fn selected(&self) -> Option<&Path> {
        self.selected.as_deref()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Starts the pipeline on a worker thread. The input path is read once, here; selecting
    /// another file later doesn't affect this run.
    pub fn start_run<T: Transport + Send + 'static>(
        &mut self,
        settings: Settings,
        transport: T,
    ) -> Result<Receiver<Message>> {
        if self.running {
            bail!("A run is already in progress");
        }
        let input = match self.selected.clone() {
            Some(path) => path,
            None => bail!("Please select a GeoJSON file first."),
        };

        let (tx, rx) = channel();
        std::thread::Builder::new()
            .name("mapmatch-run".to_string())
            .spawn(move || {
                let sink = ChannelSink(tx);
                let summary = Pipeline::new(settings, transport).run(&input, &sink);
                let _ = sink.0.send(Message::Done(summary));
            })?;
        self.running = true;
        debug!("Started a run");
        Ok(rx)
    }

    pub fn finish(&mut self) {
        self.running = false;
    }
}

pub enum Poll {
    Running,
    Finished(Option<RunSummary>),
}

/// Renders everything queued so far, without blocking.
pub fn drain_once<W: Write>(rx: &Receiver<Message>, view: &mut LogView<W>) -> Result<Poll> {
    loop {
        match rx.try_recv() {
            Ok(Message::Log(line, severity)) => view.log(&line, severity)?,
            Ok(Message::Done(summary)) => return Ok(Poll::Finished(summary)),
            Err(TryRecvError::Empty) => return Ok(Poll::Running),
            // The worker died without saying goodbye
            Err(TryRecvError::Disconnected) => {
                warn!("The worker thread stopped without finishing");
                return Ok(Poll::Finished(None));
            }
        }
    }
}

pub fn drain_until_done<W: Write>(
    rx: &Receiver<Message>,
    view: &mut LogView<W>,
) -> Result<Option<RunSummary>> {
    loop {
        if let Poll::Finished(summary) = drain_once(rx, view)? {
            return Ok(summary);
        }
        std::thread::sleep(DRAIN_INTERVAL);
    }
}

/// The log panel. Remembers what it shows, so it can be cleared.
pub struct LogView<W: Write> {
    out: W,
    color: bool,
    lines: Vec<(String, Severity)>,
}

impl LogView<std::io::Stdout> {
    /// Colored when stdout is a terminal.
    pub fn stdout() -> LogView<std::io::Stdout> {
        let out = std::io::stdout();
        let color = is_tty(&out);
        LogView {
            out,
            color,
            lines: Vec::new(),
        }
    }
}

impl<W: Write> LogView<W> {
    pub fn plain(out: W) -> LogView<W> {
        LogView {
            out,
            color: false,
            lines: Vec::new(),
        }
    }

    pub fn log(&mut self, message: &str, severity: Severity) -> Result<()> {
        if self.color {
            writeln!(self.out, "{}", paint(message, severity))?;
        } else {
            writeln!(self.out, "[{}] {}", severity, message)?;
        }
        self.out.flush()?;
        self.lines.push((message.to_string(), severity));
        Ok(())
    }

    pub fn clear(&mut self) -> Result<()> {
        self.lines.clear();
        if self.color {
            clear_screen(&mut self.out)?;
        }
        Ok(())
    }

    pub fn lines(&self) -> &[(String, Severity)] {
        &self.lines
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(unix)]
fn is_tty(out: &std::io::Stdout) -> bool {
    termion::is_tty(out)
}

#[cfg(not(unix))]
fn is_tty(_: &std::io::Stdout) -> bool {
    false
}

#[cfg(unix)]
fn paint(message: &str, severity: Severity) -> String {
    use termion::color::{Fg, Reset, Rgb};

    let rgb = match severity {
        Severity::Info => Rgb(0x9c, 0xdc, 0xfe),
        Severity::Error => Rgb(0xf4, 0x87, 0x71),
        Severity::Success => Rgb(0x4e, 0xc9, 0xb0),
    };
    format!("{}{}{}", Fg(rgb), message, Fg(Reset))
}

#[cfg(not(unix))]
fn paint(message: &str, _: Severity) -> String {
    message.to_string()
}

#[cfg(unix)]
fn clear_screen<W: Write>(out: &mut W) -> Result<()> {
    write!(out, "{}{}", termion::clear::All, termion::cursor::Goto(1, 1))?;
    out.flush()?;
    Ok(())
}

#[cfg(not(unix))]
fn clear_screen<W: Write>(_: &mut W) -> Result<()> {
    Ok(())
}

/// Selects `input`, runs it on a worker, and renders progress until the run finishes.
pub fn run_once<T: Transport + Send + 'static, W: Write>(
    input: PathBuf,
    settings: Settings,
    transport: T,
    view: &mut LogView<W>,
) -> Result<Option<RunSummary>> {
    let mut session = Session::default();
    session.select(input);
    let rx = session.start_run(settings, transport)?;
    let summary = drain_until_done(&rx, view)?;
    session.finish();
    Ok(summary)
}
