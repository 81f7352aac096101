//! Feedback reports filed against a task.
//!
//! A task carries one of two report shapes: the full report an agent files
//! after a visit, or a rejection that only records the reason. Consumers that
//! need the legacy flat layout (report rendering, result push) go through
//! [`FeedbackView`], which renders a rejection as the all-"N/A" report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Placeholder used for answers that do not apply.
pub const NOT_APPLICABLE: &str = "N/A";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Answer {
    Yes,
    No,
}

impl Answer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Yes => "Yes",
            Self::No => "No",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AreaProfile {
    Low,
    Medium,
    High,
    Major,
    #[serde(rename = "N/A")]
    NotApplicable,
}

impl AreaProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Major => "major",
            Self::NotApplicable => NOT_APPLICABLE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// References to media already placed in the blob store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaRefs {
    pub images: Vec<String>,
    pub audio: Option<String>,
    pub video: Option<String>,
}

/// Full report filed by an agent after visiting the address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedFeedback {
    pub address_existence: Answer,
    pub address_residential: Answer,
    pub customer_resident: Answer,
    pub customer_known: Answer,
    pub met_with: String,
    pub name_of_person_met: String,
    pub ease_of_location: String,
    #[serde(default)]
    pub comments: String,
    #[serde(default)]
    pub additional_comments: String,
    #[serde(default)]
    pub relationship_with_customer: String,
    #[serde(default)]
    pub customer_relationship_with_address: String,
    #[serde(default)]
    pub building_color: String,
    #[serde(default)]
    pub building_type: String,
    #[serde(default)]
    pub area_profile: Option<AreaProfile>,
    #[serde(default)]
    pub land_mark: String,
    pub received_date: DateTime<Utc>,
    #[serde(default)]
    pub person_met_others: String,
    pub visit_feedback: String,
    pub geo_mapping: GeoPoint,
    #[serde(default)]
    pub geotagged_images: Vec<String>,
    #[serde(default)]
    pub recorded_audio: Option<String>,
    #[serde(default)]
    pub recorded_video: Option<String>,
    #[serde(default)]
    pub report_url: Option<String>,
}

/// Report written when a task is rejected instead of visited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedFeedback {
    pub comments: String,
    #[serde(default)]
    pub report_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Feedback {
    Submitted(SubmittedFeedback),
    Rejected(RejectedFeedback),
}

impl Feedback {
    pub fn report_url(&self) -> Option<&str> {
        match self {
            Self::Submitted(f) => f.report_url.as_deref(),
            Self::Rejected(f) => f.report_url.as_deref(),
        }
    }

    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    /// Flat view of the report in the layout clients and reports expect.
    pub fn view(&self) -> FeedbackView<'_> {
        match self {
            Self::Submitted(f) => FeedbackView {
                address_existence: f.address_existence.as_str(),
                address_residential: f.address_residential.as_str(),
                customer_resident: f.customer_resident.as_str(),
                customer_known: f.customer_known.as_str(),
                met_with: &f.met_with,
                name_of_person_met: &f.name_of_person_met,
                ease_of_location: &f.ease_of_location,
                comments: &f.comments,
                additional_comments: &f.additional_comments,
                relationship_with_customer: &f.relationship_with_customer,
                customer_relationship_with_address: &f.customer_relationship_with_address,
                building_color: &f.building_color,
                building_type: &f.building_type,
                area_profile: f.area_profile.map_or("", |p| p.as_str()),
                land_mark: &f.land_mark,
                received_date: Some(f.received_date),
                person_met_others: &f.person_met_others,
                visit_feedback: &f.visit_feedback,
                geo_mapping: Some(f.geo_mapping),
                geotagged_images: &f.geotagged_images,
                recorded_audio: f.recorded_audio.as_deref(),
                recorded_video: f.recorded_video.as_deref(),
                report_url: f.report_url.as_deref(),
            },
            Self::Rejected(f) => FeedbackView {
                address_existence: Answer::No.as_str(),
                address_residential: NOT_APPLICABLE,
                customer_resident: Answer::No.as_str(),
                customer_known: NOT_APPLICABLE,
                met_with: NOT_APPLICABLE,
                name_of_person_met: NOT_APPLICABLE,
                ease_of_location: NOT_APPLICABLE,
                comments: &f.comments,
                additional_comments: NOT_APPLICABLE,
                relationship_with_customer: NOT_APPLICABLE,
                customer_relationship_with_address: NOT_APPLICABLE,
                building_color: NOT_APPLICABLE,
                building_type: NOT_APPLICABLE,
                area_profile: NOT_APPLICABLE,
                land_mark: NOT_APPLICABLE,
                received_date: None,
                person_met_others: NOT_APPLICABLE,
                visit_feedback: NOT_APPLICABLE,
                geo_mapping: None,
                geotagged_images: &[],
                recorded_audio: None,
                recorded_video: None,
                report_url: f.report_url.as_deref(),
            },
        }
    }
}

/// Borrowed flat layout of a feedback report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeedbackView<'a> {
    pub address_existence: &'a str,
    pub address_residential: &'a str,
    pub customer_resident: &'a str,
    pub customer_known: &'a str,
    pub met_with: &'a str,
    pub name_of_person_met: &'a str,
    pub ease_of_location: &'a str,
    pub comments: &'a str,
    pub additional_comments: &'a str,
    pub relationship_with_customer: &'a str,
    pub customer_relationship_with_address: &'a str,
    pub building_color: &'a str,
    pub building_type: &'a str,
    pub area_profile: &'a str,
    pub land_mark: &'a str,
    pub received_date: Option<DateTime<Utc>>,
    pub person_met_others: &'a str,
    pub visit_feedback: &'a str,
    pub geo_mapping: Option<GeoPoint>,
    pub geotagged_images: &'a [String],
    pub recorded_audio: Option<&'a str>,
    pub recorded_video: Option<&'a str>,
    pub report_url: Option<&'a str>,
}

/// Feedback payload an agent submits for a visit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackForm {
    pub address_existence: Answer,
    pub address_residential: Answer,
    pub customer_resident: Answer,
    pub customer_known: Answer,
    pub met_with: String,
    pub name_of_person_met: String,
    pub ease_of_location: String,
    #[serde(default)]
    pub comments: String,
    #[serde(default)]
    pub additional_comments: String,
    #[serde(default)]
    pub received_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub person_met_others: String,
    // Older mobile builds send the misspelled key.
    #[serde(default, alias = "relatioshipWithCustomer")]
    pub relationship_with_customer: String,
    #[serde(default)]
    pub customer_relationship_with_address: String,
    #[serde(default)]
    pub building_color: String,
    #[serde(default)]
    pub building_type: String,
    #[serde(default)]
    pub area_profile: Option<AreaProfile>,
    #[serde(default)]
    pub land_mark: String,
    pub visit_feedback: String,
    pub lat: f64,
    pub lng: f64,
    pub visit_date: DateTime<Utc>,
}

impl FeedbackForm {
    /// Check required fields and coordinate ranges, reporting every problem.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut problems = Vec::new();

        let required = [
            ("metWith", &self.met_with),
            ("nameOfPersonMet", &self.name_of_person_met),
            ("easeOfLocation", &self.ease_of_location),
            ("visitFeedback", &self.visit_feedback),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                problems.push(format!("{} is required", name));
            }
        }

        if self.received_date.is_none() {
            problems.push("receivedDate is required".to_string());
        }
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            problems.push(format!("lat {} is out of range", self.lat));
        }
        if !self.lng.is_finite() || !(-180.0..=180.0).contains(&self.lng) {
            problems.push(format!("lng {} is out of range", self.lng));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems)
        }
    }

    /// Build the stored report. Call [`FeedbackForm::validate`] first.
    pub fn into_feedback(self, media: MediaRefs) -> (SubmittedFeedback, DateTime<Utc>) {
        let received_date = self.received_date.unwrap_or(self.visit_date);
        let feedback = SubmittedFeedback {
            address_existence: self.address_existence,
            address_residential: self.address_residential,
            customer_resident: self.customer_resident,
            customer_known: self.customer_known,
            met_with: self.met_with,
            name_of_person_met: self.name_of_person_met,
            ease_of_location: self.ease_of_location,
            comments: self.comments,
            additional_comments: self.additional_comments,
            relationship_with_customer: self.relationship_with_customer,
            customer_relationship_with_address: self.customer_relationship_with_address,
            building_color: self.building_color,
            building_type: self.building_type,
            area_profile: self.area_profile,
            land_mark: self.land_mark,
            received_date,
            person_met_others: self.person_met_others,
            visit_feedback: self.visit_feedback,
            geo_mapping: GeoPoint {
                lat: self.lat,
                lng: self.lng,
            },
            geotagged_images: media.images,
            recorded_audio: media.audio,
            recorded_video: media.video,
            report_url: None,
        };
        (feedback, self.visit_date)
    }
}
