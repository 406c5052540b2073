// Session parameters and the raw-submission transform

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use super::protocol::Protocol;
use crate::errors::WorkflowError;

/// Unvalidated key/value mapping produced by a front-end
pub type RawSubmission = Map<String, Value>;

pub const DATE_FORMAT: &str = "%d.%m.%Y";
pub const MAX_SET_SIZE: u32 = 100;
pub const REQUIRED_FIELDS: [&str; 4] = ["client", "concrete_class", "sampling_date", "set_id"];

const DEFAULT_SAMPLING_LOCATION: &str = "sampling location";
const DEFAULT_PROJECT_NAME: &str = "project name";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputFormat {
    #[serde(rename = "PDF")]
    Pdf,
    #[serde(rename = "Excel")]
    Excel,
}

impl OutputFormat {
    pub fn name(&self) -> &'static str {
        match self {
            OutputFormat::Pdf => "PDF",
            OutputFormat::Excel => "Excel",
        }
    }

    pub fn parse(value: &str) -> Option<OutputFormat> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pdf" => Some(OutputFormat::Pdf),
            "excel" | "xlsx" => Some(OutputFormat::Excel),
            _ => None,
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Validated parameters of one testing session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionParameters {
    pub protocol: Protocol,
    pub client: String,
    pub concrete_class: String,
    pub sampling_date: NaiveDate,
    pub testing_date: NaiveDate,
    pub sampling_location: String,
    pub project_name: String,
    pub set_id: String,
    pub set_size: u32,
    pub should_print: bool,
    /// Never empty, no duplicates, first occurrence wins
    pub output_formats: Vec<OutputFormat>,
}

impl SessionParameters {
    /// Transform a raw submission into validated parameters.
    ///
    /// Accepts protocol tags or front-end labels, trims every text field,
    /// defaults the testing date to `today` and normalizes output formats.
    /// Applying it to the output of [`SessionParameters::to_raw`] yields the
    /// same parameters.
    pub fn from_raw(raw: &RawSubmission, today: NaiveDate) -> Result<Self, WorkflowError> {
        let missing: Vec<&str> = REQUIRED_FIELDS
            .iter()
            .copied()
            .filter(|field| text_field(raw, field).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(WorkflowError::Validation(format!(
                "Missing required fields: {}",
                missing.join(", ")
            )));
        }

        let protocol_value = text_field(raw, "protocol").unwrap_or_default();
        let protocol = Protocol::from_label(&protocol_value).ok_or_else(|| {
            WorkflowError::Validation(format!("Unknown protocol: '{protocol_value}'"))
        })?;

        let client = bounded(raw, "client", 200)?;
        let concrete_class = bounded(raw, "concrete_class", 100)?;
        let set_id = bounded(raw, "set_id", 100)?;
        let sampling_location = text_field(raw, "sampling_location")
            .unwrap_or_else(|| DEFAULT_SAMPLING_LOCATION.to_string());
        let project_name = text_field(raw, "project_name")
            .or_else(|| text_field(raw, "project_title"))
            .unwrap_or_else(|| DEFAULT_PROJECT_NAME.to_string());

        let sampling_date = parse_date("sampling_date", &text_field(raw, "sampling_date").unwrap_or_default())?;
        let testing_date = match text_field(raw, "testing_date") {
            Some(value) => parse_date("testing_date", &value)?,
            None => today,
        };

        let set_size = parse_set_size(raw.get("set_size"))?;
        let should_print = parse_flag(raw.get("should_print"));
        let output_formats = parse_output_formats(raw.get("output_format"))?;

        Ok(Self {
            protocol,
            client,
            concrete_class,
            sampling_date,
            testing_date,
            sampling_location,
            project_name,
            set_id,
            set_size,
            should_print,
            output_formats,
        })
    }

    /// Render back to the canonical raw form
    pub fn to_raw(&self) -> RawSubmission {
        let mut raw = Map::new();
        raw.insert("protocol".into(), Value::from(self.protocol.tag()));
        raw.insert("client".into(), Value::from(self.client.clone()));
        raw.insert("concrete_class".into(), Value::from(self.concrete_class.clone()));
        raw.insert(
            "sampling_date".into(),
            Value::from(self.sampling_date.format(DATE_FORMAT).to_string()),
        );
        raw.insert(
            "testing_date".into(),
            Value::from(self.testing_date.format(DATE_FORMAT).to_string()),
        );
        raw.insert("sampling_location".into(), Value::from(self.sampling_location.clone()));
        raw.insert("project_name".into(), Value::from(self.project_name.clone()));
        raw.insert("set_id".into(), Value::from(self.set_id.clone()));
        raw.insert("set_size".into(), Value::from(self.set_size));
        raw.insert("should_print".into(), Value::from(self.should_print));
        raw.insert(
            "output_format".into(),
            Value::Array(
                self.output_formats
                    .iter()
                    .map(|format| Value::from(format.name()))
                    .collect(),
            ),
        );
        raw
    }

    /// Specimen-count ceiling of the selected protocol
    pub fn check_protocol_limits(&self) -> Result<(), WorkflowError> {
        let max = self.protocol.max_set_size();
        if self.set_size > max {
            let name = match self.protocol {
                Protocol::CubeCompression => "Cube compression",
                Protocol::CubeFrost => "Cube frost",
                Protocol::BeamCompression => "Beam compression",
                Protocol::BeamFlexural => "Beam flexural",
            };
            return Err(WorkflowError::Validation(format!(
                "{name}: maximum {max} specimens per set"
            )));
        }
        Ok(())
    }

    /// Whole days between sampling and testing
    pub fn sample_age_days(&self) -> i64 {
        (self.testing_date - self.sampling_date).num_days()
    }
}

fn text_field(raw: &RawSubmission, key: &str) -> Option<String> {
    let text = match raw.get(key)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn bounded(raw: &RawSubmission, key: &str, max_len: usize) -> Result<String, WorkflowError> {
    let value = text_field(raw, key)
        .ok_or_else(|| WorkflowError::Validation(format!("{key} cannot be empty")))?;
    if value.chars().count() > max_len {
        return Err(WorkflowError::Validation(format!(
            "{key} must be at most {max_len} characters"
        )));
    }
    Ok(value)
}

fn parse_date(key: &str, value: &str) -> Result<NaiveDate, WorkflowError> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|_| WorkflowError::Validation(format!("{key} must be in DD.MM.YYYY format")))
}

fn parse_set_size(value: Option<&Value>) -> Result<u32, WorkflowError> {
    let size = match value {
        None | Some(Value::Null) => 1,
        Some(Value::Number(n)) => n.as_i64().ok_or_else(|| {
            WorkflowError::Validation("set_size must be a whole number".to_string())
        })?,
        Some(Value::String(s)) => s.trim().parse::<i64>().map_err(|_| {
            WorkflowError::Validation("set_size must be a whole number".to_string())
        })?,
        Some(_) => {
            return Err(WorkflowError::Validation(
                "set_size must be a whole number".to_string(),
            ))
        }
    };
    if !(1..=i64::from(MAX_SET_SIZE)).contains(&size) {
        return Err(WorkflowError::Validation(format!(
            "set_size must be between 1 and {MAX_SET_SIZE}"
        )));
    }
    // in range, cannot truncate
    Ok(size as u32)
}

fn parse_flag(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "true" | "yes" | "y" | "da" | "1"
        ),
        Some(Value::Number(n)) => n.as_i64().is_some_and(|n| n != 0),
        _ => false,
    }
}

/// Accepts a single name, a list of names, or a `{pdf, excel}` checkbox object
fn parse_output_formats(value: Option<&Value>) -> Result<Vec<OutputFormat>, WorkflowError> {
    let requested: Vec<OutputFormat> = match value {
        None | Some(Value::Null) => vec![OutputFormat::Pdf],
        Some(Value::String(name)) => vec![parse_format_name(name)?],
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(name) => parse_format_name(name),
                other => Err(WorkflowError::Validation(format!(
                    "Unsupported output format: {other}"
                ))),
            })
            .collect::<Result<_, _>>()?,
        Some(Value::Object(flags)) => {
            let checked = |key: &str| flags.get(key).and_then(Value::as_bool).unwrap_or(false);
            let mut formats = Vec::new();
            if checked("pdf") {
                formats.push(OutputFormat::Pdf);
            }
            if checked("excel") {
                formats.push(OutputFormat::Excel);
            }
            if formats.is_empty() {
                formats.push(OutputFormat::Pdf);
            }
            formats
        }
        Some(other) => {
            return Err(WorkflowError::Validation(format!(
                "Unsupported output format: {other}"
            )))
        }
    };

    let mut unique = Vec::with_capacity(requested.len());
    for format in requested {
        if !unique.contains(&format) {
            unique.push(format);
        }
    }
    if unique.is_empty() {
        return Err(WorkflowError::Validation(
            "At least one output format must be selected".to_string(),
        ));
    }
    Ok(unique)
}

fn parse_format_name(name: &str) -> Result<OutputFormat, WorkflowError> {
    OutputFormat::parse(name)
        .ok_or_else(|| WorkflowError::Validation(format!("Unsupported output format: {name}")))
}
