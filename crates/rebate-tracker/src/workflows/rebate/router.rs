use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::{JsonRejection, QueryRejection},
        DefaultBodyLimit, Multipart, Path, Query, State,
    },
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use chrono::NaiveDate;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde::Deserialize;
use serde_json::{json, Value};

use super::documents::{ReviewDecision, UploadedFile};
use super::domain::{
    Application, ApplicationId, ApplicationSubmission, Contractor, ContractorId,
    ContractorOnboarding, Document, DocumentId, DocumentRequest, DocumentType, Notification,
    NotificationId, StatusChange, SubjectId,
};
use super::error::WorkflowError;
use super::fees::{calculate_project_fees, referral_tier, ContractorBalance};
use super::matching::MatchOutcome;
use super::notifier::Mailer;
use super::platform::RebatePlatform;
use super::repository::RebateStore;
use super::service::{DashboardStats, TransitionRequest};
use super::storage::FileStorage;

/// Header carrying the subject id issued by the authentication provider.
pub const SUBJECT_HEADER: &str = "x-user-id";

const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

type Platform<R, S, M> = State<Arc<RebatePlatform<R, S, M>>>;

/// Router builder exposing the rebate intake, document, and contractor endpoints.
///
/// Subject ids (`x-user-id`, `userId`, `adminId`) are taken as issued by the
/// authentication layer in front of this router, which must strip or overwrite
/// client-supplied values. Nothing here authenticates callers. A request whose
/// `userId` equals the configured admin subject is treated as the admin.
pub fn rebate_router<R, S, M>(platform: Arc<RebatePlatform<R, S, M>>) -> Router
where
    R: RebateStore + 'static,
    S: FileStorage + 'static,
    M: Mailer + 'static,
{
    let upload_limit = platform
        .documents
        .settings()
        .max_upload_bytes
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    Router::new()
        .route(
            "/applications",
            post(submit_handler::<R, S, M>).get(customer_applications_handler::<R, S, M>),
        )
        .route("/applications/{id}", get(application_handler::<R, S, M>))
        .route(
            "/applications/{id}/status",
            patch(status_change_handler::<R, S, M>),
        )
        .route(
            "/applications/{id}/eligibility",
            patch(eligibility_handler::<R, S, M>),
        )
        .route(
            "/applications/{id}/status-history",
            get(status_history_handler::<R, S, M>),
        )
        .route(
            "/applications/{id}/documents",
            post(upload_handler::<R, S, M>)
                .get(list_documents_handler::<R, S, M>)
                .layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route(
            "/applications/{id}/document-requests",
            post(document_request_handler::<R, S, M>)
                .get(list_document_requests_handler::<R, S, M>),
        )
        .route("/documents/{id}/verify", patch(verify_handler::<R, S, M>))
        .route(
            "/documents/download/{id}",
            get(download_handler::<R, S, M>),
        )
        .route("/notifications", get(inbox_handler::<R, S, M>))
        .route(
            "/notifications/{id}/read",
            patch(mark_read_handler::<R, S, M>),
        )
        .route("/contractors", post(onboard_handler::<R, S, M>))
        .route(
            "/contractors/match",
            post(match_contractors_handler::<R, S, M>),
        )
        .route(
            "/contractors/{id}/approve",
            patch(approve_contractor_handler::<R, S, M>),
        )
        .route(
            "/contractors/{id}/balance",
            get(contractor_balance_handler::<R, S, M>),
        )
        .route("/fees", get(fee_quote_handler))
        .route(
            "/admin/dashboard-stats",
            get(dashboard_handler::<R, S, M>),
        )
        .with_state(platform)
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct SubjectQuery {
    #[serde(rename = "userId")]
    pub(crate) user_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StatusChangeBody {
    pub(crate) new_status: Option<String>,
    pub(crate) reason: Option<String>,
    pub(crate) admin_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct EligibilityBody {
    pub(crate) score: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ReviewBody {
    pub(crate) action: Option<String>,
    /// Older clients send `status: verified|rejected` instead of `action`.
    pub(crate) status: Option<String>,
    pub(crate) verified_by: Option<String>,
    pub(crate) rejection_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DocumentRequestBody {
    #[serde(default)]
    pub(crate) required_documents: Vec<String>,
    pub(crate) due_date: Option<String>,
    pub(crate) admin_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SubjectBody {
    pub(crate) user_id: Option<String>,
    pub(crate) admin_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MatchBody {
    pub(crate) customer_location: Option<String>,
    pub(crate) max_results: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct FeeQuery {
    pub(crate) cost: Option<f64>,
}

pub(crate) async fn submit_handler<R, S, M>(
    State(platform): Platform<R, S, M>,
    headers: HeaderMap,
    payload: Result<Json<ApplicationSubmission>, JsonRejection>,
) -> Result<Json<Value>, WorkflowError>
where
    R: RebateStore + 'static,
    S: FileStorage + 'static,
    M: Mailer + 'static,
{
    let customer = headers
        .get(SUBJECT_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(SubjectId::parse);
    let customer = customer.ok_or(WorkflowError::Unauthenticated)?;
    let submission = json_body(payload)?;

    let application = platform.applications.submit(Some(customer), submission)?;
    Ok(Json(json!({
        "id": application.id,
        "applicationNumber": application.application_number,
        "status": application.status,
    })))
}

pub(crate) async fn customer_applications_handler<R, S, M>(
    State(platform): Platform<R, S, M>,
    query: Result<Query<SubjectQuery>, QueryRejection>,
) -> Result<Json<Vec<Application>>, WorkflowError>
where
    R: RebateStore + 'static,
    S: FileStorage + 'static,
    M: Mailer + 'static,
{
    let customer = required_subject(query_params(query)?.user_id, "userId")?;
    Ok(Json(platform.applications.list_for_customer(&customer)?))
}

pub(crate) async fn application_handler<R, S, M>(
    State(platform): Platform<R, S, M>,
    Path(id): Path<String>,
) -> Result<Json<Application>, WorkflowError>
where
    R: RebateStore + 'static,
    S: FileStorage + 'static,
    M: Mailer + 'static,
{
    let id: ApplicationId = parse_id(&id, "application")?;
    Ok(Json(platform.applications.get(&id)?))
}

pub(crate) async fn status_change_handler<R, S, M>(
    State(platform): Platform<R, S, M>,
    Path(id): Path<String>,
    payload: Result<Json<StatusChangeBody>, JsonRejection>,
) -> Result<Json<Value>, WorkflowError>
where
    R: RebateStore + 'static,
    S: FileStorage + 'static,
    M: Mailer + 'static,
{
    let id: ApplicationId = parse_id(&id, "application")?;
    let body = json_body(payload)?;

    let (Some(new_status), Some(admin_id)) = (
        body.new_status.filter(|value| !value.trim().is_empty()),
        body.admin_id.as_deref().and_then(SubjectId::parse),
    ) else {
        return Err(WorkflowError::validation(
            "missing_fields",
            "newStatus and adminId are required",
        ));
    };
    let new_status = new_status
        .parse()
        .map_err(|err: super::status::UnknownStatus| {
            WorkflowError::validation("invalid_status", err.to_string())
        })?;

    let outcome = platform.applications.transition(
        &id,
        TransitionRequest {
            new_status,
            reason: body.reason,
            actor: admin_id,
        },
    )?;

    Ok(Json(json!({
        "application": outcome.application,
        "previousStatus": outcome.previous_status,
        "newStatus": outcome.change.to_status,
        "message": format!(
            "Status updated from {} to {}",
            outcome.previous_status, outcome.change.to_status
        ),
    })))
}

pub(crate) async fn eligibility_handler<R, S, M>(
    State(platform): Platform<R, S, M>,
    Path(id): Path<String>,
    payload: Result<Json<EligibilityBody>, JsonRejection>,
) -> Result<Json<Application>, WorkflowError>
where
    R: RebateStore + 'static,
    S: FileStorage + 'static,
    M: Mailer + 'static,
{
    let id: ApplicationId = parse_id(&id, "application")?;
    let score = json_body(payload)?
        .score
        .ok_or_else(|| WorkflowError::validation("missing_fields", "score is required"))?;
    Ok(Json(platform.applications.record_eligibility(&id, score)?))
}

pub(crate) async fn status_history_handler<R, S, M>(
    State(platform): Platform<R, S, M>,
    Path(id): Path<String>,
) -> Result<Json<Vec<StatusChange>>, WorkflowError>
where
    R: RebateStore + 'static,
    S: FileStorage + 'static,
    M: Mailer + 'static,
{
    let id: ApplicationId = parse_id(&id, "application")?;
    Ok(Json(platform.applications.status_history(&id)?))
}

pub(crate) async fn upload_handler<R, S, M>(
    State(platform): Platform<R, S, M>,
    Path(id): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Document>, WorkflowError>
where
    R: RebateStore + 'static,
    S: FileStorage + 'static,
    M: Mailer + 'static,
{
    let id: ApplicationId = parse_id(&id, "application")?;
    let mut multipart = multipart
        .map_err(|rejection| WorkflowError::validation("invalid_multipart", rejection.body_text()))?;

    let mut file = None;
    let mut document_type = None;
    let mut user_id = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field
                    .content_type()
                    .map(str::to_string)
                    .unwrap_or_else(|| {
                        mime_guess::from_path(&file_name)
                            .first_or_octet_stream()
                            .essence_str()
                            .to_string()
                    });
                let bytes = field.bytes().await.map_err(multipart_error)?;
                file = Some(UploadedFile {
                    file_name,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            }
            "documentType" => document_type = Some(field.text().await.map_err(multipart_error)?),
            "userId" => user_id = Some(field.text().await.map_err(multipart_error)?),
            _ => {}
        }
    }

    let owner = user_id.as_deref().and_then(SubjectId::parse);
    let document_type = document_type.filter(|value| !value.trim().is_empty());
    let (Some(file), Some(document_type), Some(owner)) = (file, document_type, owner) else {
        return Err(WorkflowError::validation(
            "missing_fields",
            "file, documentType and userId are required",
        ));
    };
    let document_type: DocumentType = document_type
        .parse()
        .map_err(|err: super::domain::UnknownDocumentType| {
            WorkflowError::validation("invalid_document_type", err.to_string())
        })?;

    Ok(Json(
        platform
            .documents
            .upload(&id, owner, file, document_type)?,
    ))
}

pub(crate) async fn list_documents_handler<R, S, M>(
    State(platform): Platform<R, S, M>,
    Path(id): Path<String>,
    query: Result<Query<SubjectQuery>, QueryRejection>,
) -> Result<Json<Vec<Document>>, WorkflowError>
where
    R: RebateStore + 'static,
    S: FileStorage + 'static,
    M: Mailer + 'static,
{
    let id: ApplicationId = parse_id(&id, "application")?;
    let subject = required_subject(query_params(query)?.user_id, "userId")?;

    let documents = if &subject == platform.notifications.admin() {
        platform.documents.list_for_application(&id)?
    } else {
        platform.documents.list_for_owner(&id, &subject)?
    };
    Ok(Json(documents))
}

pub(crate) async fn verify_handler<R, S, M>(
    State(platform): Platform<R, S, M>,
    Path(id): Path<String>,
    payload: Result<Json<ReviewBody>, JsonRejection>,
) -> Result<Json<Document>, WorkflowError>
where
    R: RebateStore + 'static,
    S: FileStorage + 'static,
    M: Mailer + 'static,
{
    let id: DocumentId = parse_id(&id, "document")?;
    let body = json_body(payload)?;

    let action = body
        .action
        .as_deref()
        .or(body.status.as_deref())
        .map(|value| value.trim().to_ascii_lowercase());
    let decision = match action.as_deref() {
        Some("verify" | "verified") => ReviewDecision::Verify,
        Some("reject" | "rejected") => ReviewDecision::Reject {
            reason: body.rejection_reason,
        },
        _ => {
            return Err(WorkflowError::validation(
                "invalid_action",
                "action must be 'verify' or 'reject'",
            ))
        }
    };
    let actor = body.verified_by.as_deref().and_then(SubjectId::parse);

    Ok(Json(platform.documents.update_status(&id, decision, actor)?))
}

pub(crate) async fn download_handler<R, S, M>(
    State(platform): Platform<R, S, M>,
    Path(id): Path<String>,
    query: Result<Query<SubjectQuery>, QueryRejection>,
) -> Result<Response, WorkflowError>
where
    R: RebateStore + 'static,
    S: FileStorage + 'static,
    M: Mailer + 'static,
{
    let id: DocumentId = parse_id(&id, "document")?;
    let owner = required_subject(query_params(query)?.user_id, "userId")?;

    let file = platform.documents.download(&id, &owner)?;
    let disposition = content_disposition(&file.document.file_name);

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, file.document.mime_type.clone()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        file.bytes,
    )
        .into_response())
}

pub(crate) async fn document_request_handler<R, S, M>(
    State(platform): Platform<R, S, M>,
    Path(id): Path<String>,
    payload: Result<Json<DocumentRequestBody>, JsonRejection>,
) -> Result<Json<DocumentRequest>, WorkflowError>
where
    R: RebateStore + 'static,
    S: FileStorage + 'static,
    M: Mailer + 'static,
{
    let id: ApplicationId = parse_id(&id, "application")?;
    let body = json_body(payload)?;

    if body.required_documents.is_empty() {
        return Err(WorkflowError::validation(
            "missing_document_types",
            "requiredDocuments must list at least one document type",
        ));
    }
    let required = body
        .required_documents
        .iter()
        .map(|raw| raw.parse::<DocumentType>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| WorkflowError::validation("invalid_document_type", err.to_string()))?;
    let due_date = body
        .due_date
        .as_deref()
        .ok_or_else(|| WorkflowError::validation("missing_fields", "dueDate is required"))
        .and_then(|raw| {
            parse_date(raw).map_err(|message| WorkflowError::validation("invalid_due_date", message))
        })?;
    let admin = required_subject(body.admin_id, "adminId")?;

    Ok(Json(
        platform
            .documents
            .request_documents(&id, required, due_date, admin)?,
    ))
}

pub(crate) async fn list_document_requests_handler<R, S, M>(
    State(platform): Platform<R, S, M>,
    Path(id): Path<String>,
) -> Result<Json<Vec<DocumentRequest>>, WorkflowError>
where
    R: RebateStore + 'static,
    S: FileStorage + 'static,
    M: Mailer + 'static,
{
    let id: ApplicationId = parse_id(&id, "application")?;
    Ok(Json(platform.documents.document_requests(&id)?))
}

pub(crate) async fn inbox_handler<R, S, M>(
    State(platform): Platform<R, S, M>,
    query: Result<Query<SubjectQuery>, QueryRejection>,
) -> Result<Json<Vec<Notification>>, WorkflowError>
where
    R: RebateStore + 'static,
    S: FileStorage + 'static,
    M: Mailer + 'static,
{
    let subject = required_subject(query_params(query)?.user_id, "userId")?;
    Ok(Json(platform.notifications.inbox(&subject)?))
}

pub(crate) async fn mark_read_handler<R, S, M>(
    State(platform): Platform<R, S, M>,
    Path(id): Path<String>,
    payload: Result<Json<SubjectBody>, JsonRejection>,
) -> Result<Json<Notification>, WorkflowError>
where
    R: RebateStore + 'static,
    S: FileStorage + 'static,
    M: Mailer + 'static,
{
    let id: NotificationId = parse_id(&id, "notification")?;
    let reader = required_subject(json_body(payload)?.user_id, "userId")?;
    Ok(Json(platform.notifications.mark_read(&id, &reader)?))
}

pub(crate) async fn onboard_handler<R, S, M>(
    State(platform): Platform<R, S, M>,
    payload: Result<Json<ContractorOnboarding>, JsonRejection>,
) -> Result<Json<Contractor>, WorkflowError>
where
    R: RebateStore + 'static,
    S: FileStorage + 'static,
    M: Mailer + 'static,
{
    Ok(Json(platform.contractors.onboard(json_body(payload)?)?))
}

pub(crate) async fn approve_contractor_handler<R, S, M>(
    State(platform): Platform<R, S, M>,
    Path(id): Path<String>,
    payload: Result<Json<SubjectBody>, JsonRejection>,
) -> Result<Json<Contractor>, WorkflowError>
where
    R: RebateStore + 'static,
    S: FileStorage + 'static,
    M: Mailer + 'static,
{
    let id: ContractorId = parse_id(&id, "contractor")?;
    let admin = required_subject(json_body(payload)?.admin_id, "adminId")?;
    Ok(Json(platform.contractors.approve(&id, &admin)?))
}

pub(crate) async fn contractor_balance_handler<R, S, M>(
    State(platform): Platform<R, S, M>,
    Path(id): Path<String>,
) -> Result<Json<ContractorBalance>, WorkflowError>
where
    R: RebateStore + 'static,
    S: FileStorage + 'static,
    M: Mailer + 'static,
{
    let id: ContractorId = parse_id(&id, "contractor")?;
    Ok(Json(platform.contractors.balance(&id)?))
}

pub(crate) async fn match_contractors_handler<R, S, M>(
    State(platform): Platform<R, S, M>,
    payload: Result<Json<MatchBody>, JsonRejection>,
) -> Result<Json<MatchOutcome>, WorkflowError>
where
    R: RebateStore + 'static,
    S: FileStorage + 'static,
    M: Mailer + 'static,
{
    let body = json_body(payload)?;
    let location = body.customer_location.unwrap_or_default();
    Ok(Json(
        platform
            .contractors
            .match_location(&location, body.max_results)?,
    ))
}

pub(crate) async fn fee_quote_handler(
    query: Result<Query<FeeQuery>, QueryRejection>,
) -> Result<Json<Value>, WorkflowError> {
    let cost = query_params(query)?
        .cost
        .filter(|cost| cost.is_finite() && *cost >= 0.0)
        .ok_or_else(|| {
            WorkflowError::validation("invalid_cost", "cost must be a non-negative number")
        })?;

    Ok(Json(json!({
        "cost": cost,
        "tier": referral_tier(cost),
        "fees": calculate_project_fees(cost),
    })))
}

pub(crate) async fn dashboard_handler<R, S, M>(
    State(platform): Platform<R, S, M>,
) -> Result<Json<DashboardStats>, WorkflowError>
where
    R: RebateStore + 'static,
    S: FileStorage + 'static,
    M: Mailer + 'static,
{
    Ok(Json(platform.applications.dashboard_stats()?))
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, WorkflowError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| WorkflowError::validation("invalid_body", rejection.body_text()))
}

fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, WorkflowError> {
    query
        .map(|Query(value)| value)
        .map_err(|rejection| WorkflowError::validation("invalid_query", rejection.body_text()))
}

fn multipart_error(err: MultipartError) -> WorkflowError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        WorkflowError::validation("file_too_large", err.body_text())
    } else {
        WorkflowError::validation("invalid_multipart", err.body_text())
    }
}

fn parse_id<T: FromStr>(raw: &str, entity: &'static str) -> Result<T, WorkflowError> {
    raw.parse()
        .map_err(|_| WorkflowError::validation("invalid_id", format!("malformed {entity} id '{raw}'")))
}

fn required_subject(raw: Option<String>, field: &str) -> Result<SubjectId, WorkflowError> {
    raw.as_deref()
        .and_then(SubjectId::parse)
        .ok_or_else(|| WorkflowError::validation("missing_fields", format!("{field} is required")))
}

/// ASCII `filename` for old clients plus the exact name as RFC 5987 `filename*`.
fn content_disposition(file_name: &str) -> String {
    let fallback = ascii_file_name(file_name);
    if fallback == file_name {
        return format!("attachment; filename=\"{fallback}\"");
    }
    format!(
        "attachment; filename=\"{fallback}\"; filename*=UTF-8''{}",
        utf8_percent_encode(file_name, NON_ALPHANUMERIC)
    )
}

fn ascii_file_name(file_name: &str) -> String {
    file_name
        .chars()
        .map(|c| {
            if c.is_ascii_graphic() && c != '"' && c != '\\' || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}
