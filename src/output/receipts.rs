// Receipt generator: plain-text receipts for PDF requests, CSV sheets for Excel

use std::fmt::{self, Write as _};
use std::fs;
use std::path::PathBuf;
use std::sync::LazyLock;

use chrono::Local;
use regex::Regex;
use tracing::{debug, info};

use super::OutputStrategy;
use crate::config::OutputConfig;
use crate::context::ExecutionContext;
use crate::domain::{OutputFormat, SessionReport, Spread, TestSession, DATE_FORMAT};
use crate::errors::WorkflowError;

static UNSAFE_FILE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_-]+").expect("file name regex is valid"));

#[derive(Default)]
pub struct ReceiptGenerator {
    reports_dir: Option<PathBuf>,
    generated: usize,
}

impl ReceiptGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    fn file_stem(session: &TestSession) -> String {
        let set_id = UNSAFE_FILE_CHARS.replace_all(&session.parameters.set_id, "_");
        format!("{}_{}", set_id, Local::now().format("%Y%m%d_%H%M%S"))
    }

    fn render_text(session: &TestSession, report: &SessionReport) -> Result<String, fmt::Error> {
        let p = &session.parameters;
        let mut text = String::new();
        writeln!(text, "MALG-ACTA TESTING RECEIPT")?;
        writeln!(text, "Protocol:        {}", p.protocol.label())?;
        writeln!(text, "Client:          {}", p.client)?;
        writeln!(text, "Project:         {}", p.project_name)?;
        writeln!(text, "Location:        {}", p.sampling_location)?;
        writeln!(text, "Concrete class:  {}", p.concrete_class)?;
        writeln!(text, "Set:             {} ({} specimens)", p.set_id, p.set_size)?;
        writeln!(text, "Sampling date:   {}", p.sampling_date.format(DATE_FORMAT))?;
        writeln!(text, "Testing date:    {}", p.testing_date.format(DATE_FORMAT))?;
        writeln!(text, "Sample age:      {} days", report.sample_age_days)?;
        writeln!(text)?;

        for specimen in session.specimens() {
            write!(text, "#{:<3}", specimen.index)?;
            if let Some(scale) = specimen.scale {
                write!(text, " mass {:>8}", scale.formatted())?;
            }
            if let Some(press) = specimen.press {
                write!(
                    text,
                    " load {:>10} strength {:>12}",
                    press.formatted_load(),
                    press.formatted_strength()
                )?;
            }
            writeln!(text)?;
        }

        writeln!(text)?;
        write_spread(&mut text, "Strength (N/mm²)", report.strength, 2)?;
        write_spread(&mut text, "Mass (kg)", report.mass, 2)?;
        write_spread(&mut text, "Density (kg/m³)", report.density, 0)?;
        Ok(text)
    }

    fn render_csv(session: &TestSession) -> Result<String, fmt::Error> {
        let mut csv = String::from("specimen,mass_kg,load_n,strength_n_mm2\n");
        for specimen in session.specimens() {
            let mass = specimen
                .scale
                .map(|s| format!("{:.2}", s.mass_kg))
                .unwrap_or_default();
            let (load, strength) = specimen
                .press
                .map(|p| (format!("{:.0}", p.load_n), format!("{:.2}", p.strength_mpa)))
                .unwrap_or_default();
            writeln!(csv, "{},{},{},{}", specimen.index, mass, load, strength)?;
        }
        Ok(csv)
    }
}

fn write_spread(
    text: &mut String,
    label: &str,
    spread: Option<Spread>,
    decimals: usize,
) -> fmt::Result {
    match spread {
        Some(s) => writeln!(
            text,
            "{label}: min {:.d$} / avg {:.d$} / max {:.d$} over {}",
            s.min,
            s.avg,
            s.max,
            s.count,
            d = decimals
        ),
        None => Ok(()),
    }
}

impl OutputStrategy for ReceiptGenerator {
    fn setup(&mut self, _ctx: &ExecutionContext, config: &OutputConfig) -> Result<(), WorkflowError> {
        fs::create_dir_all(&config.reports_dir).map_err(|e| {
            WorkflowError::Configuration(format!(
                "cannot create reports directory {}: {e}",
                config.reports_dir.display()
            ))
        })?;
        self.reports_dir = Some(config.reports_dir.clone());
        info!(reports_dir = %config.reports_dir.display(), "Receipt generator ready");
        Ok(())
    }

    fn generate_receipt(
        &mut self,
        session: &TestSession,
        format: OutputFormat,
    ) -> Result<PathBuf, WorkflowError> {
        let dir = self
            .reports_dir
            .as_ref()
            .ok_or_else(|| WorkflowError::Output("receipt generator is not set up".to_string()))?;

        let stem = Self::file_stem(session);
        let (path, rendered) = match format {
            OutputFormat::Pdf => (
                dir.join(format!("{stem}.txt")),
                Self::render_text(session, &SessionReport::compute(session)),
            ),
            OutputFormat::Excel => (dir.join(format!("{stem}.csv")), Self::render_csv(session)),
        };
        let contents = rendered
            .map_err(|e| WorkflowError::Output(format!("failed to render {format} receipt: {e}")))?;

        fs::write(&path, contents).map_err(|e| {
            WorkflowError::Output(format!("failed to write {} receipt {}: {e}", format, path.display()))
        })?;
        self.generated += 1;
        debug!(path = %path.display(), "Receipt written");
        Ok(path)
    }

    fn cleanup(&mut self) {
        info!(generated = self.generated, "Receipt generator released");
        self.reports_dir = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::context::Logger;
    use crate::domain::{PressReading, Protocol, ScaleReading, SessionParameters, SpecimenMeasurement};
    use crate::shutdown::ShutdownSignal;
    use chrono::NaiveDate;

    fn session() -> TestSession {
        let mut session = TestSession::new(SessionParameters {
            protocol: Protocol::CubeCompression,
            client: "AGREMIN SRL".into(),
            concrete_class: "C 25/30".into(),
            sampling_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            testing_date: NaiveDate::from_ymd_opt(2024, 1, 29).unwrap(),
            sampling_location: "plant".into(),
            project_name: "tower".into(),
            set_id: "S 1/A".into(),
            set_size: 1,
            should_print: false,
            output_formats: vec![OutputFormat::Pdf, OutputFormat::Excel],
        });
        session
            .push_specimen(SpecimenMeasurement {
                index: 1,
                scale: Some(ScaleReading { mass_kg: 7.9 }),
                press: Some(PressReading {
                    load_n: 900_000.0,
                    strength_mpa: 40.0,
                }),
            })
            .unwrap();
        session
    }

    #[test]
    fn test_writes_text_and_csv() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::with_defaults();
        config.output.reports_dir = dir.path().join("reports");
        let ctx = ExecutionContext::new(config, Logger::console(), ShutdownSignal::new());

        let mut generator = ReceiptGenerator::new();
        generator.setup(&ctx, &ctx.config.output).unwrap();

        let text = generator.generate_receipt(&session(), OutputFormat::Pdf).unwrap();
        let csv = generator.generate_receipt(&session(), OutputFormat::Excel).unwrap();
        assert_eq!(text.extension().unwrap(), "txt");
        assert_eq!(csv.extension().unwrap(), "csv");
        assert!(text.file_name().unwrap().to_string_lossy().starts_with("S_1_A_"));

        let body = fs::read_to_string(&text).unwrap();
        assert!(body.contains("Sample age:      28 days"));
        assert!(body.contains("40.00 N/mm²"));
        assert!(body
            .lines()
            .any(|line| line.starts_with("#1   mass") && line.contains(" strength ")));
        let sheet = fs::read_to_string(&csv).unwrap();
        assert!(sheet.contains("1,7.90,900000,40.00"));
    }

    #[test]
    fn test_requires_setup() {
        let mut generator = ReceiptGenerator::new();
        let err = generator
            .generate_receipt(&session(), OutputFormat::Pdf)
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Output(_)));
    }
}
