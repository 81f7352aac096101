//! Assignment sheet export.

use crate::task::{Task, NOT_APPLICABLE};

const HEADER: [&str; 6] = [
    "Activity ID",
    "Customer Name",
    "Verification Address",
    "State",
    "Assigned Date",
    "Status",
];

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// CSV listing of freshly assigned tasks, one row per task.
pub fn assignment_sheet_csv(tasks: &[Task]) -> String {
    let mut out = HEADER.join(",");
    out.push_str("\r\n");
    for task in tasks {
        let assigned = task
            .assigned_date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        let row = [
            csv_field(&task.activity_id),
            csv_field(&task.customer_name),
            csv_field(&task.verification_address),
            csv_field(task.state.as_deref().unwrap_or(NOT_APPLICABLE)),
            assigned,
            "Assigned".to_string(),
        ];
        out.push_str(&row.join(","));
        out.push_str("\r\n");
    }
    out
}
