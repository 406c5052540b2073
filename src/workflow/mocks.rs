// Mock implementations for testing - no side effects

use std::collections::VecDeque;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::acquisition::{MeasurementSource, LOADED_AREA_MM2};
use crate::config::{AppConfig, OutputConfig};
use crate::context::{ExecutionContext, LogLevel, Logger, UserSink};
use crate::domain::{OutputFormat, PressReading, RawSubmission, ScaleReading, TestSession};
use crate::errors::WorkflowError;
use crate::input::{InputInterface, InputStrategy, RawInput, SharedInput, Trigger};
use crate::output::{OutputInterface, OutputStrategy, SharedOutput};
use crate::shutdown::ShutdownSignal;
use crate::workflow::states::{DeviceType, Reconnector};

/// User sink that keeps every delivered message
#[derive(Debug, Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<(LogLevel, String)>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .map(|(_, message)| message.clone())
            .collect()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.messages().iter().any(|m| m.contains(needle))
    }

    pub fn count_at(&self, level: LogLevel) -> usize {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, _)| *l == level)
            .count()
    }
}

impl UserSink for RecordingSink {
    fn deliver(&self, level: LogLevel, message: &str) -> io::Result<()> {
        self.messages.lock().unwrap().push((level, message.to_string()));
        Ok(())
    }
}

#[derive(Default)]
struct InputScript {
    triggers: VecDeque<Trigger>,
    submissions: VecDeque<Result<RawInput, WorkflowError>>,
    unlock_failure: Option<WorkflowError>,
    setups: usize,
    unlocks: usize,
    cleanups: usize,
}

/// Input strategy replaying scripted triggers and submissions.
/// Clones share the script, so a test can keep one to inspect calls.
#[derive(Clone, Default)]
pub struct ScriptedInput {
    script: Arc<Mutex<InputScript>>,
}

impl ScriptedInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_trigger(self, trigger: Trigger) -> Self {
        self.script.lock().unwrap().triggers.push_back(trigger);
        self
    }

    pub fn with_submission(self, raw: RawSubmission) -> Self {
        self.script
            .lock()
            .unwrap()
            .submissions
            .push_back(Ok(RawInput::Submitted(raw)));
        self
    }

    pub fn with_collect_failure(self, error: WorkflowError) -> Self {
        self.script.lock().unwrap().submissions.push_back(Err(error));
        self
    }

    pub fn with_unlock_failure(self, error: WorkflowError) -> Self {
        self.script.lock().unwrap().unlock_failure = Some(error);
        self
    }

    pub fn setup_count(&self) -> usize {
        self.script.lock().unwrap().setups
    }

    pub fn unlock_count(&self) -> usize {
        self.script.lock().unwrap().unlocks
    }

    pub fn cleanup_count(&self) -> usize {
        self.script.lock().unwrap().cleanups
    }
}

impl InputStrategy for ScriptedInput {
    fn setup(&mut self, _ctx: &ExecutionContext) -> Result<(), WorkflowError> {
        self.script.lock().unwrap().setups += 1;
        Ok(())
    }

    /// Exit once the scripted triggers run out
    fn poll(&mut self) -> Result<Trigger, WorkflowError> {
        Ok(self
            .script
            .lock()
            .unwrap()
            .triggers
            .pop_front()
            .unwrap_or(Trigger::Exit))
    }

    /// Cancelled once the scripted submissions run out
    fn get_user_input(&mut self) -> Result<RawInput, WorkflowError> {
        self.script
            .lock()
            .unwrap()
            .submissions
            .pop_front()
            .unwrap_or(Ok(RawInput::Cancelled))
    }

    fn unlock_interface(&mut self) -> Result<(), WorkflowError> {
        let mut script = self.script.lock().unwrap();
        script.unlocks += 1;
        match script.unlock_failure.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn cleanup(&mut self) {
        self.script.lock().unwrap().cleanups += 1;
    }
}

#[derive(Default)]
struct OutputLog {
    generated: Vec<(String, OutputFormat)>,
    failure: Option<WorkflowError>,
    cleanups: usize,
}

/// Output strategy that records requests instead of writing files
#[derive(Clone, Default)]
pub struct RecordingOutput {
    log: Arc<Mutex<OutputLog>>,
}

impl RecordingOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(error: WorkflowError) -> Self {
        let output = Self::default();
        output.log.lock().unwrap().failure = Some(error);
        output
    }

    pub fn generated(&self) -> Vec<(String, OutputFormat)> {
        self.log.lock().unwrap().generated.clone()
    }

    pub fn cleanup_count(&self) -> usize {
        self.log.lock().unwrap().cleanups
    }
}

impl OutputStrategy for RecordingOutput {
    fn setup(&mut self, _ctx: &ExecutionContext, _config: &OutputConfig) -> Result<(), WorkflowError> {
        Ok(())
    }

    fn generate_receipt(
        &mut self,
        session: &TestSession,
        format: OutputFormat,
    ) -> Result<PathBuf, WorkflowError> {
        let mut log = self.log.lock().unwrap();
        if let Some(error) = &log.failure {
            return Err(error.clone());
        }
        let set_id = session.parameters.set_id.clone();
        let extension = match format {
            OutputFormat::Pdf => "txt",
            OutputFormat::Excel => "csv",
        };
        let path = PathBuf::from(format!("{set_id}.{extension}"));
        log.generated.push((set_id, format));
        Ok(path)
    }

    fn cleanup(&mut self) {
        self.log.lock().unwrap().cleanups += 1;
    }
}

/// Instruments with scripted strengths and an optional failing press read
#[derive(Debug, Default)]
pub struct ScriptedInstruments {
    strengths: Mutex<VecDeque<f64>>,
    press_failure: Option<(usize, WorkflowError)>,
    press_reads: AtomicUsize,
    scale_reads: AtomicUsize,
}

impl ScriptedInstruments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_strengths(strengths: Vec<f64>) -> Self {
        Self {
            strengths: Mutex::new(strengths.into()),
            ..Self::default()
        }
    }

    /// The n-th press read (1-based) fails with a device error
    pub fn failing_on_press(n: usize) -> Self {
        Self::failing_on_press_with(n, WorkflowError::Device("press not responding".to_string()))
    }

    pub fn failing_on_press_with(n: usize, error: WorkflowError) -> Self {
        Self {
            press_failure: Some((n, error)),
            ..Self::default()
        }
    }

    pub fn press_reads(&self) -> usize {
        self.press_reads.load(Ordering::SeqCst)
    }

    pub fn scale_reads(&self) -> usize {
        self.scale_reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MeasurementSource for ScriptedInstruments {
    async fn read_scale(&self) -> Result<ScaleReading, WorkflowError> {
        self.scale_reads.fetch_add(1, Ordering::SeqCst);
        Ok(ScaleReading { mass_kg: 7.2 })
    }

    async fn read_press(&self) -> Result<PressReading, WorkflowError> {
        let read = self.press_reads.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((n, error)) = &self.press_failure {
            if *n == read {
                return Err(error.clone());
            }
        }
        let strength_mpa = self.strengths.lock().unwrap().pop_front().unwrap_or(40.0);
        Ok(PressReading {
            load_n: strength_mpa * LOADED_AREA_MM2,
            strength_mpa,
        })
    }
}

/// Reconnector with a fixed outcome
#[derive(Debug)]
pub struct ScriptedReconnector {
    outcome: Result<bool, WorkflowError>,
    calls: AtomicUsize,
}

impl ScriptedReconnector {
    pub fn succeeding() -> Self {
        Self {
            outcome: Ok(true),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn refusing() -> Self {
        Self {
            outcome: Ok(false),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            outcome: Err(WorkflowError::Device("reconnection crashed".to_string())),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Reconnector for ScriptedReconnector {
    async fn reconnect(&self, _device: DeviceType) -> Result<bool, WorkflowError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcome.clone()
    }
}

/// Context with fast polling and no simulated delays
pub fn test_context(sink: Arc<RecordingSink>) -> ExecutionContext {
    let mut config = AppConfig::with_defaults();
    config.input.poll_interval_ms = 1;
    config.acquisition.reading_delay_ms = 0;
    config.acquisition.reconnect_delay_ms = 0;
    config.logging.path = None;
    ExecutionContext::new(config, Logger::new(sink), ShutdownSignal::new())
}

pub fn shared_input(ctx: &ExecutionContext, input: &ScriptedInput) -> SharedInput {
    InputInterface::with_strategy(ctx, "scripted", Box::new(input.clone()))
        .expect("scripted input setup never fails")
        .shared()
}

pub fn shared_output(ctx: &ExecutionContext, output: &RecordingOutput) -> SharedOutput {
    OutputInterface::with_strategy(ctx, "recording", Box::new(output.clone()))
        .expect("recording output setup never fails")
        .shared()
}

/// A valid raw submission as a front-end would push it
pub fn submission(protocol: &str, set_id: &str, set_size: u32) -> RawSubmission {
    let value: Value = json!({
        "protocol": protocol,
        "client": "AGREMIN SRL",
        "concrete_class": "C 25/30",
        "sampling_date": "01.02.2024",
        "testing_date": "29.02.2024",
        "set_id": set_id,
        "set_size": set_size,
        "should_print": false,
        "output_format": ["PDF", "Excel"]
    });
    match value {
        Value::Object(map) => map,
        _ => RawSubmission::new(),
    }
}
