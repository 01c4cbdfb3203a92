use std::path::Path;

use csv::{QuoteStyle, Terminator, WriterBuilder};
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::models::Incident;

pub const EXPORT_FILE_NAME: &str = "incident_reports.csv";
const HEADER: &str = "ID,Date,Type,Status,Reported By,Target Student,Description\n";

/// Renders the loaded incidents as CSV. Every field is quoted; embedded quotes are doubled.
pub fn incidents_to_csv(incidents: &[Incident]) -> AppResult<String> {
    if incidents.is_empty() {
        return Err(AppError::NoData);
    }

    let mut buffer = HEADER.as_bytes().to_vec();
    {
        let mut writer = WriterBuilder::new()
            .quote_style(QuoteStyle::Always)
            .terminator(Terminator::Any(b'\n'))
            .from_writer(&mut buffer);

        for incident in incidents {
            let date = incident.created_at.format("%Y-%m-%d %H:%M:%S").to_string();
            writer.write_record([
                incident.id.to_string().as_str(),
                date.as_str(),
                incident.incident_type.as_str(),
                incident.status.as_str(),
                incident.reporter_name.as_str(),
                incident.target_student_name.as_deref().unwrap_or("N/A"),
                incident.transcript.as_str(),
            ])?;
        }
        writer.flush()?;
    }

    String::from_utf8(buffer)
        .map_err(|err| AppError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, err)))
}

/// Writes the export into `dir` under the standard download name.
pub fn write_export(dir: &Path, incidents: &[Incident]) -> AppResult<std::path::PathBuf> {
    let csv = incidents_to_csv(incidents)?;
    let path = dir.join(EXPORT_FILE_NAME);
    std::fs::write(&path, csv)?;
    info!(rows = incidents.len(), path = %path.display(), "incidents exported");
    Ok(path)
}
