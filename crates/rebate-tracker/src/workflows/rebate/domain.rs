use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::status::ApplicationStatus;

macro_rules! record_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(raw: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(raw.trim()).map(Self)
            }
        }
    };
}

record_id!(ApplicationId, "Identity of a rebate application.");
record_id!(StatusChangeId, "Identity of a status audit row.");
record_id!(DocumentId, "Identity of an uploaded document.");
record_id!(DocumentRequestId, "Identity of an admin document request.");
record_id!(NotificationId, "Identity of a notification.");
record_id!(ContractorId, "Identity of a contractor record.");

/// Authenticated subject (customer, contractor, or admin).
///
/// Identities reach us in more than one encoding: bare strings from the
/// auth provider, and `ObjectId("...")` wrappers or upper-cased hex from
/// older records. Everything passes through [`SubjectId::canonical`] so
/// equality is plain string equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct SubjectId(String);

impl SubjectId {
    pub fn canonical(raw: &str) -> Self {
        let mut value = raw.trim();
        if let Some(inner) = value
            .strip_prefix("ObjectId(")
            .and_then(|rest| rest.strip_suffix(')'))
        {
            value = inner.trim();
        }
        let value = value.trim_matches(|c| c == '"' || c == '\'').trim();

        if value.len() == 24 && value.chars().all(|c| c.is_ascii_hexdigit()) {
            Self(value.to_ascii_lowercase())
        } else {
            Self(value.to_string())
        }
    }

    /// Canonical form, or `None` for blank input.
    pub fn parse(raw: &str) -> Option<Self> {
        let subject = Self::canonical(raw);
        (!subject.0.is_empty()).then_some(subject)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SubjectId {
    fn from(value: String) -> Self {
        Self::canonical(&value)
    }
}

impl From<SubjectId> for String {
    fn from(value: SubjectId) -> Self {
        value.0
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Intake payload posted by a homeowner. Required fields are optional here so
/// the service can report every missing one at once.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSubmission {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub property_address: Option<String>,
    pub property_type: Option<String>,
    pub hvac_type: Option<String>,
    pub home_size_sq_ft: Option<u32>,
    pub system_age_years: Option<u32>,
    pub service_area: Option<String>,
    pub requested_amount: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicantContact {
    pub name: String,
    pub phone: String,
    pub email: String,
}

/// Home and HVAC system descriptors captured at intake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDetails {
    pub address: String,
    pub property_type: Option<String>,
    pub hvac_type: Option<String>,
    pub home_size_sq_ft: Option<u32>,
    pub system_age_years: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub id: ApplicationId,
    pub application_number: String,
    pub customer_id: SubjectId,
    pub status: ApplicationStatus,
    /// 0.0 means the application has not been assessed yet.
    pub eligibility_score: f64,
    pub requested_amount: Option<f64>,
    pub service_area: Option<String>,
    pub applicant: ApplicantContact,
    pub property: PropertyDetails,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

pub fn format_application_number(sequence: u64) -> String {
    format!("APP-{sequence:03}")
}

/// Fields written together when an application changes status.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusUpdate {
    pub status: ApplicationStatus,
    pub updated_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl StatusUpdate {
    pub fn entering(status: ApplicationStatus, at: DateTime<Utc>) -> Self {
        Self {
            status,
            updated_at: at,
            approved_at: (status == ApplicationStatus::Approved).then_some(at),
            rejected_at: (status == ApplicationStatus::Rejected).then_some(at),
            completed_at: (status == ApplicationStatus::Completed).then_some(at),
        }
    }

    pub fn apply(&self, application: &mut Application) {
        application.status = self.status;
        application.updated_at = self.updated_at;
        if let Some(at) = self.approved_at {
            application.approved_at = Some(at);
        }
        if let Some(at) = self.rejected_at {
            application.rejected_at = Some(at);
        }
        if let Some(at) = self.completed_at {
            application.completed_at = Some(at);
        }
    }
}

/// Append-only audit row, one per transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub id: StatusChangeId,
    pub application_id: ApplicationId,
    pub from_status: ApplicationStatus,
    pub to_status: ApplicationStatus,
    pub changed_by: SubjectId,
    pub reason: Option<String>,
    pub changed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentType {
    TaxReturn,
    ProofOfOwnership,
    UtilityBill,
    ContractorInvoice,
    EquipmentSpecification,
    InstallationPhoto,
    PhotoId,
    Other,
}

impl DocumentType {
    pub const ALL: [DocumentType; 8] = [
        DocumentType::TaxReturn,
        DocumentType::ProofOfOwnership,
        DocumentType::UtilityBill,
        DocumentType::ContractorInvoice,
        DocumentType::EquipmentSpecification,
        DocumentType::InstallationPhoto,
        DocumentType::PhotoId,
        DocumentType::Other,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            DocumentType::TaxReturn => "tax-return",
            DocumentType::ProofOfOwnership => "proof-of-ownership",
            DocumentType::UtilityBill => "utility-bill",
            DocumentType::ContractorInvoice => "contractor-invoice",
            DocumentType::EquipmentSpecification => "equipment-specification",
            DocumentType::InstallationPhoto => "installation-photo",
            DocumentType::PhotoId => "photo-id",
            DocumentType::Other => "other",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            DocumentType::TaxReturn => "Tax Return",
            DocumentType::ProofOfOwnership => "Proof of Ownership",
            DocumentType::UtilityBill => "Utility Bill",
            DocumentType::ContractorInvoice => "Contractor Invoice",
            DocumentType::EquipmentSpecification => "Equipment Specification",
            DocumentType::InstallationPhoto => "Installation Photo",
            DocumentType::PhotoId => "Photo ID",
            DocumentType::Other => "Other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown document type '{0}'")]
pub struct UnknownDocumentType(pub String);

impl FromStr for DocumentType {
    type Err = UnknownDocumentType;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase().replace(['_', ' '], "-");
        DocumentType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| UnknownDocumentType(raw.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Uploaded,
    Verified,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: DocumentId,
    pub application_id: ApplicationId,
    pub owner_id: SubjectId,
    pub file_name: String,
    pub storage_locator: String,
    pub document_type: DocumentType,
    pub status: DocumentStatus,
    pub size_bytes: u64,
    pub mime_type: String,
    pub uploaded_at: DateTime<Utc>,
    pub verified_at: Option<DateTime<Utc>>,
    pub verified_by: Option<SubjectId>,
    pub rejection_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentRequestStatus {
    Pending,
    Fulfilled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRequest {
    pub id: DocumentRequestId,
    pub application_id: ApplicationId,
    pub customer_id: SubjectId,
    pub requested_by: SubjectId,
    pub required_documents: Vec<DocumentType>,
    pub due_date: NaiveDate,
    pub status: DocumentRequestStatus,
    pub created_at: DateTime<Utc>,
    pub fulfilled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationType {
    DocumentRequest,
    DocumentReceived,
    StatusUpdate,
    Approval,
    Rejection,
    Info,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: NotificationId,
    pub recipient_id: SubjectId,
    pub application_id: ApplicationId,
    pub kind: NotificationType,
    pub subject: String,
    pub body: String,
    pub read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub email_sent: bool,
    pub email_sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractorStatus {
    Pending,
    Approved,
    Suspended,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contractor {
    pub id: ContractorId,
    pub company_name: String,
    pub contact_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub service_areas: Vec<String>,
    pub approved: bool,
    pub status: ContractorStatus,
    pub completed_projects: u32,
    pub onboarded_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub filing_fees_owed: f64,
    pub referral_fees_owed: f64,
    pub approval_fee_paid: bool,
    pub referral_fee_tier: Option<String>,
}

impl Contractor {
    pub fn is_matchable(&self) -> bool {
        self.approved && self.status == ContractorStatus::Approved
    }
}

/// Self-onboarding payload submitted by a contractor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractorOnboarding {
    pub company_name: Option<String>,
    pub contact_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    #[serde(default)]
    pub service_areas: Vec<String>,
    #[serde(default)]
    pub completed_projects: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_ids_collapse_equivalent_encodings() {
        let raw = SubjectId::canonical("65F1A2B3C4D5E6F708192A3B");
        let wrapped = SubjectId::canonical("ObjectId(\"65f1a2b3c4d5e6f708192a3b\")");
        let padded = SubjectId::canonical("  65f1a2b3c4d5e6f708192a3b ");
        assert_eq!(raw, wrapped);
        assert_eq!(raw, padded);
        assert_eq!(raw.as_str(), "65f1a2b3c4d5e6f708192a3b");
    }

    #[test]
    fn subject_ids_keep_provider_case() {
        let subject = SubjectId::canonical("user_2NxAbC");
        assert_eq!(subject.as_str(), "user_2NxAbC");
        assert_ne!(subject, SubjectId::canonical("user_2nxabc"));
        assert!(SubjectId::parse("   ").is_none());
    }

    #[test]
    fn subject_ids_canonicalise_on_deserialize() {
        let subject: SubjectId =
            serde_json::from_str("\"ObjectId('65F1A2B3C4D5E6F708192A3B')\"").expect("parse");
        assert_eq!(subject.as_str(), "65f1a2b3c4d5e6f708192a3b");
    }

    #[test]
    fn application_numbers_are_zero_padded() {
        assert_eq!(format_application_number(1), "APP-001");
        assert_eq!(format_application_number(42), "APP-042");
        assert_eq!(format_application_number(1234), "APP-1234");
    }

    #[test]
    fn status_update_stamps_terminal_timestamps() {
        let at = Utc::now();
        let approved = StatusUpdate::entering(ApplicationStatus::Approved, at);
        assert_eq!(approved.approved_at, Some(at));
        assert!(approved.rejected_at.is_none());

        let received = StatusUpdate::entering(ApplicationStatus::DocumentsReceived, at);
        assert!(received.approved_at.is_none());
        assert!(received.completed_at.is_none());
    }

    #[test]
    fn document_types_parse_loose_forms() {
        assert_eq!(
            "tax_return".parse::<DocumentType>(),
            Ok(DocumentType::TaxReturn)
        );
        assert_eq!(
            "Utility Bill".parse::<DocumentType>(),
            Ok(DocumentType::UtilityBill)
        );
        assert!("passport".parse::<DocumentType>().is_err());
    }
}
