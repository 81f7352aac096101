//! Verification report rendering.
//!
//! [`PdfReportGenerator`] writes a plain text PDF (Helvetica, letter size)
//! listing the task details and every feedback answer. Missing values render
//! as "N/A".

use std::fmt::Write as _;

use uuid::Uuid;

use crate::blob::{BlobError, BlobStore};
use crate::task::{Task, NOT_APPLICABLE};

pub const REPORT_FOLDER: &str = "reports";

pub trait ReportGenerator: Send + Sync {
    fn generate(&self, task: &Task) -> Vec<u8>;
}

/// Render the report for `task` and store it. Returns the report URL.
///
/// Every render gets its own name, so a render whose transition later
/// loses never replaces the report a committed task points at.
pub async fn publish_report(
    generator: &dyn ReportGenerator,
    blobs: &dyn BlobStore,
    task: &Task,
) -> Result<String, BlobError> {
    let bytes = generator.generate(task);
    let name = format!("report-{}-{}.pdf", task.id, Uuid::new_v4());
    blobs.put(REPORT_FOLDER, &name, "application/pdf", bytes).await
}

const LINES_PER_PAGE: usize = 50;
const WRAP_AT: usize = 95;

#[derive(Debug, Clone, Copy, Default)]
pub struct PdfReportGenerator;

impl PdfReportGenerator {
    fn lines(task: &Task) -> Vec<String> {
        let mut lines = vec![
            "Address Verification Report".to_string(),
            String::new(),
        ];
        let mut field = |label: &str, value: &str| {
            let value = value.trim();
            let value = if value.is_empty() { NOT_APPLICABLE } else { value };
            lines.extend(wrap(&format!("{}: {}", label, value)));
        };

        field("Activity ID", &task.activity_id);
        field("Customer Name", &task.customer_name);
        field("Verification Address", &task.verification_address);
        field("State", task.state.as_deref().unwrap_or(""));
        field("City", task.city.as_deref().unwrap_or(""));
        field("Status", task.status.as_str());
        field("Assigned Date", &date(task.assigned_date));
        field("Visit Date", &date(task.visit_date));

        let Some(feedback) = &task.feedback else {
            field("Feedback", "");
            return lines;
        };
        let view = feedback.view();
        field("Address Exists", view.address_existence);
        field("Residential Address", view.address_residential);
        field("Customer Resides at Address", view.customer_resident);
        field("Customer Known", view.customer_known);
        field("Met With", view.met_with);
        field("Name of Person Met", view.name_of_person_met);
        field("Relationship with Customer", view.relationship_with_customer);
        field(
            "Customer Relationship with Address",
            view.customer_relationship_with_address,
        );
        field("Ease of Location", view.ease_of_location);
        field("Building Colour", view.building_color);
        field("Building Type", view.building_type);
        field("Area Profile", view.area_profile);
        field("Landmark", view.land_mark);
        field("Person Met Others", view.person_met_others);
        field("Received Date", &date(view.received_date));
        let geo = view
            .geo_mapping
            .map(|g| format!("{:.6}, {:.6}", g.lat, g.lng))
            .unwrap_or_default();
        field("Geolocation", &geo);
        field("Visit Feedback", view.visit_feedback);
        field("Comments", view.comments);
        field("Additional Comments", view.additional_comments);
        field("Recorded Audio", view.recorded_audio.unwrap_or(""));
        field("Recorded Video", view.recorded_video.unwrap_or(""));
        if view.geotagged_images.is_empty() {
            field("Images", "");
        } else {
            for (i, url) in view.geotagged_images.iter().enumerate() {
                field(&format!("Image {}", i + 1), url);
            }
        }
        lines
    }
}

impl ReportGenerator for PdfReportGenerator {
    fn generate(&self, task: &Task) -> Vec<u8> {
        let lines = Self::lines(task);
        let pages: Vec<&[String]> = lines.chunks(LINES_PER_PAGE).collect();
        write_pdf(&pages)
    }
}

fn date(value: Option<chrono::DateTime<chrono::Utc>>) -> String {
    value
        .map(|d| d.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_default()
}

fn wrap(line: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    for word in line.split_whitespace() {
        if !current.is_empty() && current.len() + 1 + word.len() > WRAP_AT {
            out.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    out.push(current);
    out
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '(' | ')' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            c if c.is_ascii() && !c.is_ascii_control() => out.push(c),
            _ => out.push('?'),
        }
    }
    out
}

fn write_pdf(pages: &[&[String]]) -> Vec<u8> {
    let mut objects: Vec<String> = Vec::new();
    objects.push("<< /Type /Catalog /Pages 2 0 R >>".to_string());
    let kids: Vec<String> = (0..pages.len())
        .map(|i| format!("{} 0 R", 4 + 2 * i))
        .collect();
    objects.push(format!(
        "<< /Type /Pages /Kids [{}] /Count {} >>",
        kids.join(" "),
        pages.len()
    ));
    objects.push("<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string());

    for (i, page) in pages.iter().enumerate() {
        let mut content = String::from("BT /F1 10 Tf 14 TL 50 750 Td\n");
        for line in page.iter() {
            let _ = writeln!(content, "({}) Tj T*", escape(line));
        }
        content.push_str("ET");

        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
             /Resources << /Font << /F1 3 0 R >> >> /Contents {} 0 R >>",
            5 + 2 * i
        ));
        objects.push(format!(
            "<< /Length {} >>\nstream\n{}\nendstream",
            content.len(),
            content
        ));
    }

    let mut pdf = String::from("%PDF-1.4\n");
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        let _ = write!(pdf, "{} 0 obj\n{}\nendobj\n", i + 1, body);
    }

    let xref_at = pdf.len();
    let _ = write!(pdf, "xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
    for offset in offsets {
        let _ = write!(pdf, "{:010} 00000 n \n", offset);
    }
    let _ = write!(
        pdf,
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
        objects.len() + 1,
        xref_at
    );
    pdf.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::ClientId;
    use crate::task::{Feedback, NewTask, RejectedFeedback};
    use chrono::Utc;

    fn task() -> Task {
        Task::new(
            ClientId::new(),
            NewTask {
                activity_id: "A-100".to_string(),
                customer_name: "Ada (Jr)".to_string(),
                verification_address: "12 Marina Road".to_string(),
                state: None,
                city: None,
            },
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn test_pdf_structure() {
        let pdf = PdfReportGenerator.generate(&task());
        let text = String::from_utf8(pdf).unwrap();
        assert!(text.starts_with("%PDF-1.4\n"));
        assert!(text.ends_with("%%EOF\n"));
        assert!(text.contains("(Activity ID: A-100) Tj"));
        assert!(text.contains("(Customer Name: Ada \\(Jr\\)) Tj"));
        assert!(text.contains("(State: N/A) Tj"));
    }

    #[test]
    fn test_rejection_renders_placeholders() {
        let mut task = task();
        task.feedback = Some(Feedback::Rejected(RejectedFeedback {
            comments: "Premises demolished".to_string(),
            report_url: None,
        }));
        let text = String::from_utf8(PdfReportGenerator.generate(&task)).unwrap();
        assert!(text.contains("(Address Exists: No) Tj"));
        assert!(text.contains("(Customer Known: N/A) Tj"));
        assert!(text.contains("(Comments: Premises demolished) Tj"));
    }

    #[test]
    fn test_long_reports_paginate() {
        let lines: Vec<String> = (0..120).map(|i| format!("line {}", i)).collect();
        let pages: Vec<&[String]> = lines.chunks(LINES_PER_PAGE).collect();
        let text = String::from_utf8(write_pdf(&pages)).unwrap();
        assert!(text.contains("/Count 3"));
    }

    #[tokio::test]
    async fn test_each_render_gets_its_own_blob() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = crate::blob::LocalBlobStore::new(
            dir.path().to_path_buf(),
            &url::Url::parse("http://localhost:3000/files").unwrap(),
        );
        let task = task();
        let first = publish_report(&PdfReportGenerator, &blobs, &task).await.unwrap();
        let second = publish_report(&PdfReportGenerator, &blobs, &task).await.unwrap();
        assert_ne!(first, second);
        assert!(first.contains(&format!("/reports/report-{}-", task.id)));

        let kept = blobs.fetch(&first).await.unwrap();
        assert!(kept.starts_with(b"%PDF-1.4"));
    }

    #[test]
    fn test_wrap_long_values() {
        let long = "word ".repeat(60);
        let wrapped = wrap(&long);
        assert!(wrapped.len() > 1);
        assert!(wrapped.iter().all(|l| l.len() <= WRAP_AT));
    }
}
