use std::cmp::Ordering;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::info;

use super::domain::{Contractor, ContractorId, ContractorOnboarding, ContractorStatus, SubjectId};
use super::error::WorkflowError;
use super::fees::{calculate_contractor_balance, ContractorBalance};
use super::repository::ContractorRepository;

pub const DEFAULT_MATCH_LIMIT: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchOutcome {
    pub contractors: Vec<Contractor>,
    pub count: usize,
    pub searched_location: String,
    pub exact_match: bool,
}

/// Up to two trailing comma-separated fragments of a free-text location,
/// e.g. `"12 Elm St, Ames, Story County, IA"` -> `["Story County", "IA"]`.
pub fn region_tokens(location: &str) -> Vec<String> {
    let fragments: Vec<&str> = location
        .split(',')
        .map(str::trim)
        .filter(|fragment| !fragment.is_empty())
        .collect();
    let start = fragments.len().saturating_sub(2);
    fragments[start..]
        .iter()
        .map(|fragment| fragment.to_lowercase())
        .collect()
}

/// Case-insensitive: the service area must contain the token, so an area of
/// `"Story County, IA"` matches `"ia"` but an area of `"IA"` never matches
/// `"california"`.
pub fn serves_region(contractor: &Contractor, tokens: &[String]) -> bool {
    contractor.service_areas.iter().any(|area| {
        let area = area.trim().to_lowercase();
        !area.is_empty()
            && tokens.iter().any(|token| area.contains(token.as_str()))
    })
}

/// Most completed projects first, then most recently onboarded.
pub fn rank(contractors: &mut [Contractor]) {
    contractors.sort_by(|a, b| match b.completed_projects.cmp(&a.completed_projects) {
        Ordering::Equal => b.onboarded_at.cmp(&a.onboarded_at),
        other => other,
    });
}

pub struct ContractorDirectory<R> {
    store: Arc<R>,
    default_limit: usize,
}

impl<R> ContractorDirectory<R>
where
    R: ContractorRepository + 'static,
{
    pub fn new(store: Arc<R>, default_limit: usize) -> Self {
        Self {
            store,
            default_limit: default_limit.max(1),
        }
    }

    /// Best-effort match by service area text; no geocoding.
    pub fn match_location(
        &self,
        location: &str,
        max_results: Option<usize>,
    ) -> Result<MatchOutcome, WorkflowError> {
        let location = location.trim();
        if location.is_empty() {
            return Err(WorkflowError::validation(
                "missing_location",
                "customerLocation is required",
            ));
        }
        let limit = max_results
            .filter(|limit| *limit > 0)
            .unwrap_or(self.default_limit);

        let mut pool: Vec<Contractor> = self
            .store
            .contractors()?
            .into_iter()
            .filter(Contractor::is_matchable)
            .collect();

        let tokens = region_tokens(location);
        let mut matched: Vec<Contractor> = pool
            .iter()
            .filter(|contractor| serves_region(contractor, &tokens))
            .cloned()
            .collect();

        let exact_match = !matched.is_empty();
        let mut contractors = if exact_match {
            rank(&mut matched);
            matched
        } else {
            rank(&mut pool);
            pool
        };
        contractors.truncate(limit);

        info!(
            location,
            exact_match,
            count = contractors.len(),
            "contractor match"
        );

        Ok(MatchOutcome {
            count: contractors.len(),
            contractors,
            searched_location: location.to_string(),
            exact_match,
        })
    }

    /// Self-onboarding: new contractors start pending and unapproved.
    pub fn onboard(&self, onboarding: ContractorOnboarding) -> Result<Contractor, WorkflowError> {
        let company_name = trimmed(onboarding.company_name);
        let contact_name = trimmed(onboarding.contact_name);
        let email = trimmed(onboarding.email);
        let service_areas: Vec<String> = onboarding
            .service_areas
            .into_iter()
            .map(|area| area.trim().to_string())
            .filter(|area| !area.is_empty())
            .collect();

        let (Some(company_name), Some(contact_name), Some(email)) =
            (company_name, contact_name, email)
        else {
            return Err(WorkflowError::validation(
                "missing_fields",
                "companyName, contactName and email are required",
            ));
        };
        if service_areas.is_empty() {
            return Err(WorkflowError::validation(
                "missing_service_areas",
                "at least one service area is required",
            ));
        }

        let contractor = Contractor {
            id: ContractorId::generate(),
            company_name,
            contact_name,
            email,
            phone: trimmed(onboarding.phone),
            service_areas,
            approved: false,
            status: ContractorStatus::Pending,
            completed_projects: onboarding.completed_projects,
            onboarded_at: Utc::now(),
            approved_at: None,
            filing_fees_owed: 0.0,
            referral_fees_owed: 0.0,
            approval_fee_paid: false,
            referral_fee_tier: None,
        };
        let contractor = self.store.insert_contractor(contractor)?;
        info!(contractor_id = %contractor.id, "contractor onboarded");
        Ok(contractor)
    }

    pub fn approve(&self, id: &ContractorId, admin: &SubjectId) -> Result<Contractor, WorkflowError> {
        let mut contractor = self.get(id)?;
        if contractor.is_matchable() {
            return Ok(contractor);
        }
        contractor.approved = true;
        contractor.status = ContractorStatus::Approved;
        contractor.approved_at = Some(Utc::now());
        self.store.update_contractor(contractor.clone())?;
        info!(contractor_id = %contractor.id, admin = %admin, "contractor approved");
        Ok(contractor)
    }

    pub fn get(&self, id: &ContractorId) -> Result<Contractor, WorkflowError> {
        self.store
            .fetch_contractor(id)?
            .ok_or_else(|| WorkflowError::not_found("contractor", id))
    }

    pub fn balance(&self, id: &ContractorId) -> Result<ContractorBalance, WorkflowError> {
        let contractor = self.get(id)?;
        Ok(calculate_contractor_balance(
            contractor.filing_fees_owed,
            contractor.referral_fees_owed,
            contractor.approval_fee_paid,
        ))
    }
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_tokens_take_last_two_fragments() {
        assert_eq!(
            region_tokens("12 Elm St, Ames, Story County, IA"),
            vec!["story county".to_string(), "ia".to_string()]
        );
        assert_eq!(region_tokens("Des Moines"), vec!["des moines".to_string()]);
        assert!(region_tokens(" , ,").is_empty());
    }
}
