use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use examguard_core::monitoring::domain::violation::{Violation, ViolationSummary};

pub const REPORT_FILE_NAME: &str = "report.json";

#[derive(Serialize)]
struct Report<'a> {
    generated_at: DateTime<Utc>,
    match_threshold: f64,
    summary: &'a ViolationSummary,
    violations: Vec<ReportEntry<'a>>,
}

#[derive(Serialize)]
struct ReportEntry<'a> {
    #[serde(flatten)]
    violation: &'a Violation,
    /// Evidence image next to the report, if the frame could be encoded.
    evidence_file: Option<String>,
}

/// Writes `report.json` plus one JPEG per violation with evidence into
/// `dir`, creating it if needed. Returns the report path.
pub fn write_report(
    dir: &Path,
    violations: &[Violation],
    summary: &ViolationSummary,
    match_threshold: f64,
    generated_at: DateTime<Utc>,
) -> Result<PathBuf, Box<dyn std::error::Error>> {
    fs::create_dir_all(dir)?;

    let mut entries = Vec::with_capacity(violations.len());
    for (index, violation) in violations.iter().enumerate() {
        let evidence_file = if violation.evidence.is_empty() {
            None
        } else {
            let name = evidence_file_name(index + 1, violation);
            fs::write(dir.join(&name), &violation.evidence.bytes)?;
            Some(name)
        };
        entries.push(ReportEntry {
            violation,
            evidence_file,
        });
    }

    let report = Report {
        generated_at,
        match_threshold,
        summary,
        violations: entries,
    };
    let path = dir.join(REPORT_FILE_NAME);
    fs::write(&path, serde_json::to_string_pretty(&report)?)?;
    Ok(path)
}

fn evidence_file_name(number: usize, violation: &Violation) -> String {
    format!("violation-{number:03}-{}.jpg", violation.kind.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use examguard_core::evidence::domain::snapshot_encoder::Evidence;
    use examguard_core::monitoring::domain::violation::ViolationType;
    use tempfile::TempDir;

    fn violation(kind: ViolationType, evidence: Evidence) -> Violation {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap();
        Violation::new(at, 0, kind, None, evidence).unwrap()
    }

    fn jpeg_evidence() -> Evidence {
        Evidence {
            mime_type: "image/jpeg",
            width: 640,
            height: 480,
            bytes: vec![0xFF, 0xD8, 0xFF, 0xD9],
        }
    }

    #[test]
    fn test_writes_report_and_evidence_files() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("session-1");
        let violations = vec![
            violation(ViolationType::NoFace, jpeg_evidence()),
            violation(ViolationType::MultipleFaces, Evidence::empty()),
        ];
        let summary = ViolationSummary {
            total: 2,
            no_face: 1,
            multiple_faces: 1,
            ..Default::default()
        };

        let path = write_report(&out, &violations, &summary, 1.0, Utc::now()).unwrap();
        assert_eq!(path, out.join("report.json"));

        let evidence = out.join("violation-001-no_face.jpg");
        assert_eq!(fs::read(&evidence).unwrap(), vec![0xFF, 0xD8, 0xFF, 0xD9]);
        assert!(!out.join("violation-002-multiple_faces.jpg").exists());

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["summary"]["total"], 2);
        assert_eq!(json["match_threshold"], 1.0);
        let entries = json["violations"].as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["kind"], "no_face");
        assert_eq!(entries[0]["evidence_file"], "violation-001-no_face.jpg");
        assert_eq!(entries[0]["evidence"]["mime_type"], "image/jpeg");
        assert!(entries[1]["evidence_file"].is_null());
    }

    #[test]
    fn test_empty_session_still_writes_report() {
        let tmp = TempDir::new().unwrap();
        let path = write_report(
            tmp.path(),
            &[],
            &ViolationSummary::default(),
            1.0,
            Utc::now(),
        )
        .unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(json["summary"]["total"], 0);
        assert!(json["violations"].as_array().unwrap().is_empty());
    }
}
