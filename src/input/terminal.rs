// Interactive terminal front-end

use std::io::{self, BufRead, BufReader, Write};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};

use super::{InputStrategy, RawInput, Trigger};
use crate::context::ExecutionContext;
use crate::domain::{Protocol, RawSubmission};
use crate::errors::WorkflowError;
use crate::shutdown::ShutdownSignal;

const CANCEL: &str = "q";
const DEFAULT_WAIT: Duration = Duration::from_millis(100);

/// What a prompt got back from the operator
enum Answer {
    Line(String),
    Interrupted,
    Closed,
}

pub struct TerminalInput {
    // handed to the line reader thread on first prompt
    reader: Option<Box<dyn BufRead + Send>>,
    lines: Option<Receiver<io::Result<String>>>,
    writer: Box<dyn Write + Send>,
    shutdown: Option<ShutdownSignal>,
    wait: Duration,
    finished: bool,
}

impl Default for TerminalInput {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalInput {
    pub fn new() -> Self {
        Self::with_io(Box::new(BufReader::new(io::stdin())), Box::new(io::stdout()))
    }

    pub fn with_io(reader: Box<dyn BufRead + Send>, writer: Box<dyn Write + Send>) -> Self {
        Self {
            reader: Some(reader),
            lines: None,
            writer,
            shutdown: None,
            wait: DEFAULT_WAIT,
            finished: false,
        }
    }

    fn interrupted(&self) -> bool {
        self.shutdown.as_ref().is_some_and(ShutdownSignal::is_triggered)
    }

    fn lines(&mut self) -> Result<&Receiver<io::Result<String>>, WorkflowError> {
        if self.lines.is_none() {
            let reader = self
                .reader
                .take()
                .ok_or_else(|| WorkflowError::Device("terminal reader is gone".to_string()))?;
            let (sender, receiver) = channel();
            thread::Builder::new()
                .name("terminal-input".to_string())
                .spawn(move || read_lines(reader, sender))
                .map_err(terminal_error)?;
            self.lines = Some(receiver);
        }
        self.lines
            .as_ref()
            .ok_or_else(|| WorkflowError::Device("terminal reader is gone".to_string()))
    }

    /// Wait for the next line, giving up as soon as shutdown is requested
    fn next_answer(&mut self) -> Result<Answer, WorkflowError> {
        let wait = self.wait;
        let shutdown = self.shutdown.clone();
        let lines = self.lines()?;
        loop {
            if shutdown.as_ref().is_some_and(ShutdownSignal::is_triggered) {
                return Ok(Answer::Interrupted);
            }
            match lines.recv_timeout(wait) {
                Ok(line) => return line.map(Answer::Line).map_err(terminal_error),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return Ok(Answer::Closed),
            }
        }
    }

    /// Prompt for one line. `None` when the operator cancels, input ends or
    /// shutdown is requested.
    fn prompt(&mut self, label: &str) -> Result<Option<String>, WorkflowError> {
        if self.interrupted() {
            return Ok(None);
        }
        write!(self.writer, "{label}: ").map_err(terminal_error)?;
        self.writer.flush().map_err(terminal_error)?;

        let line = match self.next_answer()? {
            Answer::Line(line) => line,
            Answer::Interrupted => {
                info!("Interrupt received while prompting, abandoning input");
                return Ok(None);
            }
            Answer::Closed => {
                // stdin closed, nothing more will ever arrive
                self.finished = true;
                return Ok(None);
            }
        };
        let answer = line.trim();
        if answer.eq_ignore_ascii_case(CANCEL) {
            return Ok(None);
        }
        Ok(Some(answer.to_string()))
    }

    fn say(&mut self, text: &str) -> Result<(), WorkflowError> {
        writeln!(self.writer, "{text}").map_err(terminal_error)
    }
}

/// Line reader loop; dropping the sender signals end of input
fn read_lines(mut reader: Box<dyn BufRead + Send>, sender: Sender<io::Result<String>>) {
    loop {
        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {
                if sender.send(Ok(line)).is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!(error = %e, "Terminal read failed");
                let _ = sender.send(Err(e));
                break;
            }
        }
    }
    debug!("Terminal reader finished");
}

fn terminal_error(err: io::Error) -> WorkflowError {
    WorkflowError::Device(format!("terminal not responding: {err}"))
}

/// Text prompts in the order they are asked, with the raw key each fills
const FIELDS: [(&str, &str); 9] = [
    ("client", "Client"),
    ("concrete_class", "Concrete class"),
    ("sampling_date", "Sampling date (DD.MM.YYYY)"),
    ("testing_date", "Testing date (DD.MM.YYYY, empty for today)"),
    ("sampling_location", "Sampling location"),
    ("project_name", "Project name"),
    ("set_id", "Set ID"),
    ("set_size", "Set size"),
    ("should_print", "Print receipt? (y/n)"),
];

impl InputStrategy for TerminalInput {
    fn setup(&mut self, ctx: &ExecutionContext) -> Result<(), WorkflowError> {
        self.finished = false;
        self.shutdown = Some(ctx.shutdown.clone());
        self.wait = Duration::from_millis(ctx.config.input.poll_interval_ms.max(1));
        self.say("Malg-ACTA - concrete specimen testing (type 'q' to cancel)")?;
        info!("Terminal input ready");
        Ok(())
    }

    fn poll(&mut self) -> Result<Trigger, WorkflowError> {
        if self.finished {
            Ok(Trigger::Exit)
        } else {
            Ok(Trigger::Start(None))
        }
    }

    fn get_user_input(&mut self) -> Result<RawInput, WorkflowError> {
        for (index, protocol) in Protocol::ALL.iter().enumerate() {
            let line = format!("  {}. {}", index + 1, protocol.label());
            self.say(&line)?;
        }

        let mut raw = RawSubmission::new();
        let Some(choice) = self.prompt("Protocol")? else {
            return Ok(RawInput::Cancelled);
        };
        let protocol = choice
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| Protocol::ALL.get(i))
            .map(|p| p.tag().to_string())
            .unwrap_or(choice);
        raw.insert("protocol".into(), Value::from(protocol));

        for (key, label) in FIELDS {
            let Some(answer) = self.prompt(label)? else {
                return Ok(RawInput::Cancelled);
            };
            if !answer.is_empty() {
                raw.insert(key.into(), Value::from(answer));
            }
        }

        let Some(formats) = self.prompt("Output formats (PDF, Excel)")? else {
            return Ok(RawInput::Cancelled);
        };
        let formats: Vec<Value> = formats
            .split(',')
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(Value::from)
            .collect();
        if !formats.is_empty() {
            raw.insert("output_format".into(), Value::Array(formats));
        }

        debug!(fields = raw.len(), "Terminal submission collected");
        Ok(RawInput::Submitted(raw))
    }

    fn unlock_interface(&mut self) -> Result<(), WorkflowError> {
        let answer = self.prompt("Test another set? (Y/n)")?;
        let stop = match answer.as_deref().map(str::to_ascii_lowercase) {
            None => true,
            Some(a) => matches!(a.as_str(), "n" | "no" | "nu"),
        };
        if stop {
            self.finished = true;
            info!("Operator ended the terminal session");
        }
        Ok(())
    }

    fn cleanup(&mut self) {
        let _ = self.writer.flush();
        debug!("Terminal input released");
    }
}
