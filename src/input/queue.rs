// JSON-lines submission queue fed by a background reader thread
//
// The reader thread is the only producer and the façade the only consumer.
// The core never touches the channel except through poll/get_user_input.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::sync::mpsc::{sync_channel, Receiver, RecvTimeoutError, SyncSender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};

use super::{InputStrategy, RawInput, Trigger};
use crate::context::ExecutionContext;
use crate::domain::RawSubmission;
use crate::errors::WorkflowError;
use crate::shutdown::ShutdownSignal;

#[derive(Default)]
pub struct QueueInput {
    receiver: Option<Receiver<RawSubmission>>,
    worker: Option<JoinHandle<()>>,
    shutdown: Option<ShutdownSignal>,
    wait: Duration,
    in_flight: bool,
    released: bool,
}

impl QueueInput {
    pub fn new() -> Self {
        Self::default()
    }

    fn open_source(
        path: Option<&PathBuf>,
        attempts: u32,
        delay: Duration,
    ) -> Result<Box<dyn BufRead + Send>, WorkflowError> {
        let Some(path) = path else {
            return Ok(Box::new(BufReader::new(io::stdin())));
        };

        let mut last_error = None;
        for attempt in 1..=attempts {
            match File::open(path) {
                Ok(file) => {
                    debug!(path = %path.display(), attempt = attempt, "Queue source opened");
                    return Ok(Box::new(BufReader::new(file)));
                }
                Err(e) => {
                    warn!(path = %path.display(), attempt = attempt, error = %e, "Queue source unavailable");
                    last_error = Some(e);
                    if attempt < attempts {
                        thread::sleep(delay);
                    }
                }
            }
        }

        Err(WorkflowError::Device(format!(
            "queue source {} unavailable after {} attempts: {}",
            path.display(),
            attempts,
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }
}

/// Reader loop: one JSON object per line, blank lines skipped
fn pump(reader: Box<dyn BufRead + Send>, sender: SyncSender<RawSubmission>) {
    for (number, line) in reader.lines().enumerate() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "Queue source read failed, stopping reader");
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(Value::Object(submission)) => {
                if sender.send(submission).is_err() {
                    debug!("Queue consumer gone, stopping reader");
                    break;
                }
            }
            Ok(_) => warn!(line = number + 1, "Ignoring queue entry that is not a JSON object"),
            Err(e) => warn!(line = number + 1, error = %e, "Ignoring malformed queue entry"),
        }
    }
    debug!("Queue reader finished");
}

impl InputStrategy for QueueInput {
    fn setup(&mut self, ctx: &ExecutionContext) -> Result<(), WorkflowError> {
        if self.receiver.is_some() {
            debug!("Queue input already started");
            return Ok(());
        }
        if self.released {
            return Err(WorkflowError::Device(
                "queue input was already released".to_string(),
            ));
        }

        let input = &ctx.config.input;
        let reader = Self::open_source(
            input.queue_path.as_ref(),
            input.retry_count.max(1),
            Duration::from_millis(input.retry_delay_ms),
        )?;

        let (sender, receiver) = sync_channel(input.queue_capacity.max(1));
        let worker = thread::Builder::new()
            .name("queue-input".to_string())
            .spawn(move || pump(reader, sender))
            .map_err(|e| WorkflowError::Device(format!("failed to start queue reader: {e}")))?;

        self.receiver = Some(receiver);
        self.worker = Some(worker);
        self.shutdown = Some(ctx.shutdown.clone());
        self.wait = Duration::from_millis(input.poll_interval_ms.max(1));
        info!(
            source = %input
                .queue_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "stdin".to_string()),
            capacity = input.queue_capacity,
            "Queue input started"
        );
        Ok(())
    }

    fn poll(&mut self) -> Result<Trigger, WorkflowError> {
        let Some(receiver) = &self.receiver else {
            return Ok(Trigger::Exit);
        };
        match receiver.try_recv() {
            Ok(submission) => {
                self.in_flight = true;
                Ok(Trigger::Start(Some(submission)))
            }
            Err(TryRecvError::Empty) => Ok(Trigger::Wait),
            Err(TryRecvError::Disconnected) => Ok(Trigger::Exit),
        }
    }

    fn get_user_input(&mut self) -> Result<RawInput, WorkflowError> {
        let receiver = self
            .receiver
            .as_ref()
            .ok_or_else(|| WorkflowError::Device("queue input is not started".to_string()))?;
        loop {
            if self.shutdown.as_ref().is_some_and(ShutdownSignal::is_triggered) {
                info!("Interrupt received while waiting for a submission");
                return Ok(RawInput::Cancelled);
            }
            match receiver.recv_timeout(self.wait) {
                Ok(submission) => {
                    self.in_flight = true;
                    return Ok(RawInput::Submitted(submission));
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return Ok(RawInput::Cancelled),
            }
        }
    }

    fn unlock_interface(&mut self) -> Result<(), WorkflowError> {
        if self.in_flight {
            self.in_flight = false;
            debug!("Queue input ready for the next submission");
        }
        Ok(())
    }

    fn cleanup(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        // dropping the receiver makes the reader stop at its next send
        self.receiver = None;
        if let Some(worker) = self.worker.take() {
            if worker.is_finished() {
                if worker.join().is_err() {
                    warn!("Queue reader thread panicked");
                }
            } else {
                debug!("Queue reader still blocked on its source, detaching");
            }
        }
        info!("Queue input released");
    }
}

impl Drop for QueueInput {
    fn drop(&mut self) {
        self.cleanup();
    }
}
