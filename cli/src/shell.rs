use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError};

use anyhow::{bail, Result};

use mapmatch::{HttpTransport, Settings, Severity, Transport};

use crate::frontend::{
    drain_once, drain_until_done, LogView, Message, Poll, Session, DRAIN_INTERVAL,
};

#[derive(Debug, PartialEq)]
pub enum ShellCommand {
    Open(PathBuf),
    Send,
    Clear,
    Help,
    Quit,
}

impl ShellCommand {
    pub fn parse(line: &str) -> Result<ShellCommand> {
        let line = line.trim();
        let (cmd, rest) = match line.split_once(char::is_whitespace) {
            Some((cmd, rest)) => (cmd, rest.trim()),
            None => (line, ""),
        };
        Ok(match (cmd, rest) {
            ("open", "") => bail!("Which file? Try open <path>"),
            ("open", path) => ShellCommand::Open(PathBuf::from(path)),
            ("send", "") => ShellCommand::Send,
            ("clear", "") => ShellCommand::Clear,
            ("help", "") | ("?", "") => ShellCommand::Help,
            ("quit", "") | ("exit", "") => ShellCommand::Quit,
            _ => bail!("Unknown command {:?}. Try help.", line),
        })
    }
}

const HELP: &[&str] = &[
    "open <path>  choose a GeoJSON file",
    "send         send it to the API and save the result",
    "clear        clear the log",
    "quit",
];

/// Owns the session and the log, and keeps at most one run going in the background.
pub struct Shell<W: Write, F> {
    session: Session,
    view: LogView<W>,
    settings: Settings,
    make_transport: F,
    pending: Option<Receiver<Message>>,
}

impl<W, F, T> Shell<W, F>
where
    W: Write,
    F: Fn() -> Result<T>,
    T: Transport + Send + 'static,
{
    pub fn new(settings: Settings, view: LogView<W>, make_transport: F) -> Result<Shell<W, F>> {
        let mut shell = Shell {
            session: Session::default(),
            view,
            settings,
            make_transport,
            pending: None,
        };
        shell.view.log(
            "Ready (Geoapify Map Matching). Choose a file and send.",
            Severity::Info,
        )?;
        shell.view.log(
            &format!(
                "Free plan: max {} requests/s, 3000 credits/day. Batches are throttled accordingly.",
                mapmatch::FREE_PLAN_MAX_REQUESTS_PER_SECOND
            ),
            Severity::Info,
        )?;
        Ok(shell)
    }

    /// Returns false once the user wants out.
    pub fn handle_line(&mut self, line: &str) -> Result<bool> {
        if line.trim().is_empty() {
            return Ok(true);
        }
        match ShellCommand::parse(line) {
            Ok(cmd) => self.handle(cmd),
            Err(err) => {
                self.view.log(&err.to_string(), Severity::Error)?;
                Ok(true)
            }
        }
    }

    pub fn handle(&mut self, cmd: ShellCommand) -> Result<bool> {
        match cmd {
            ShellCommand::Open(path) => {
                self.view
                    .log(&format!("Selected: {}", path.display()), Severity::Info)?;
                self.session.select(path);
            }
            ShellCommand::Send => self.send()?,
            ShellCommand::Clear => self.view.clear()?,
            ShellCommand::Help => {
                for line in HELP {
                    self.view.log(line, Severity::Info)?;
                }
            }
            ShellCommand::Quit => {
                if self.session.is_running() {
                    warn!("Quitting while a run is still in progress");
                }
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn send(&mut self) -> Result<()> {
        let transport = match (self.make_transport)() {
            Ok(transport) => transport,
            Err(err) => {
                self.view.log(&err.to_string(), Severity::Error)?;
                return Ok(());
            }
        };
        match self.session.start_run(self.settings.clone(), transport) {
            Ok(rx) => {
                self.view.clear()?;
                self.pending = Some(rx);
            }
            Err(err) => self.view.log(&err.to_string(), Severity::Error)?,
        }
        Ok(())
    }

    /// Renders whatever the current run has reported so far.
    pub fn tick(&mut self) -> Result<()> {
        if let Some(ref rx) = self.pending {
            if let Poll::Finished(_) = drain_once(rx, &mut self.view)? {
                self.pending = None;
                self.session.finish();
            }
        }
        Ok(())
    }

    /// Blocks until the current run, if any, is done.
    pub fn wait(&mut self) -> Result<()> {
        if let Some(rx) = self.pending.take() {
            drain_until_done(&rx, &mut self.view)?;
            self.session.finish();
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.session.is_running()
    }

    pub fn view(&self) -> &LogView<W> {
        &self.view
    }
}

/// Reads commands from stdin until `quit` or end of input, rendering progress in between.
pub fn run(settings: Settings) -> Result<()> {
    // Reading stdin blocks, so it gets its own thread
    let (tx, lines) = channel();
    std::thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        warn!("Couldn't read stdin: {}", err);
                        break;
                    }
                }
            }
        })?;

    let mut shell = Shell::new(settings, LogView::stdout(), || -> Result<HttpTransport> {
        Ok(HttpTransport::new()?)
    })?;
    loop {
        shell.tick()?;
        match lines.recv_timeout(DRAIN_INTERVAL) {
            Ok(line) => {
                if !shell.handle_line(&line)? {
                    return Ok(());
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            // Input ran out; let the last run finish first
            Err(RecvTimeoutError::Disconnected) => {
                return shell.wait();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::tests::{test_settings, write_track, Canned};

    fn shell() -> Shell<Vec<u8>, impl Fn() -> Result<Canned>> {
        Shell::new(test_settings(), LogView::plain(Vec::new()), || Ok(Canned::new())).unwrap()
    }

    fn last_line<W: Write, F>(shell: &Shell<W, F>) -> (String, Severity) {
        shell.view.lines().last().cloned().unwrap()
    }

    #[test]
    fn parse_commands() {
        assert_eq!(
            ShellCommand::parse("open  /tmp/my track.geojson ").unwrap(),
            ShellCommand::Open(PathBuf::from("/tmp/my track.geojson"))
        );
        assert_eq!(ShellCommand::parse(" send").unwrap(), ShellCommand::Send);
        assert_eq!(ShellCommand::parse("exit").unwrap(), ShellCommand::Quit);
        assert!(ShellCommand::parse("open").is_err());
        assert!(ShellCommand::parse("send now").is_err());
        assert!(ShellCommand::parse("upload").is_err());
    }

    #[test]
    fn starts_with_a_greeting() {
        let shell = shell();
        assert_eq!(shell.view().lines().len(), 2);
        assert!(shell.view().lines()[1].0.starts_with("Free plan: max 5 requests/s"));
    }

    #[test]
    fn send_without_a_file() {
        let mut shell = shell();
        assert!(shell.handle_line("send").unwrap());
        assert!(!shell.is_running());
        assert_eq!(
            last_line(&shell),
            (
                "Please select a GeoJSON file first.".to_string(),
                Severity::Error
            )
        );
    }

    #[test]
    fn open_send_and_wait() {
        let dir = tempfile::tempdir().unwrap();
        let track = write_track(dir.path());
        let mut shell = shell();

        assert!(shell
            .handle_line(&format!("open {}", track.display()))
            .unwrap());
        assert!(last_line(&shell).0.starts_with("Selected: "));

        assert!(shell.handle_line("send").unwrap());
        assert!(shell.is_running());
        // Sending clears the log
        assert!(shell.view().lines().is_empty());

        // A second send is refused while the first one is going
        shell.handle_line("send").unwrap();
        assert_eq!(
            last_line(&shell),
            (
                "A run is already in progress".to_string(),
                Severity::Error
            )
        );

        shell.wait().unwrap();
        assert!(!shell.is_running());
        assert_eq!(last_line(&shell).1, Severity::Success);
        assert!(dir.path().join("track_response.geojson").exists());

        // And the trigger works again afterwards
        shell.handle_line("send").unwrap();
        assert!(shell.is_running());
        shell.wait().unwrap();
    }

    #[test]
    fn tick_notices_when_a_run_ends() {
        let dir = tempfile::tempdir().unwrap();
        let mut shell = shell();
        shell
            .handle(ShellCommand::Open(write_track(dir.path())))
            .unwrap();
        shell.handle(ShellCommand::Send).unwrap();

        let mut ticks = 0;
        while shell.is_running() {
            assert!(ticks < 200, "the run never finished");
            std::thread::sleep(DRAIN_INTERVAL);
            shell.tick().unwrap();
            ticks += 1;
        }
        assert!(last_line(&shell).0.starts_with("Saved: "));
    }

    #[test]
    fn clear_and_quit() {
        let mut shell = shell();
        assert!(shell.handle_line("bogus").unwrap());
        assert_eq!(last_line(&shell).1, Severity::Error);
        assert!(shell.handle_line("").unwrap());
        assert!(shell.handle_line("clear").unwrap());
        assert!(shell.view().lines().is_empty());
        assert!(!shell.handle_line("quit").unwrap());
    }
}
