use super::common::*;
use crate::workflows::rebate::domain::{ContractorOnboarding, ContractorStatus};
use crate::workflows::rebate::repository::ContractorRepository;

#[test]
fn exact_matches_are_ranked_by_completed_projects() {
    let harness = harness();
    seed_contractor(&harness.store, "Prairie Air", &["Story County", "Boone County"], 12);
    seed_contractor(&harness.store, "Cyclone HVAC", &["story county"], 40);
    seed_contractor(&harness.store, "Metro Comfort", &["Polk County"], 90);

    let outcome = harness
        .platform
        .contractors
        .match_location("418 Maple Ave, Ames, Story County", None)
        .expect("match runs");

    assert!(outcome.exact_match);
    assert_eq!(outcome.count, 2);
    let names: Vec<&str> = outcome
        .contractors
        .iter()
        .map(|contractor| contractor.company_name.as_str())
        .collect();
    assert_eq!(names, vec!["Cyclone HVAC", "Prairie Air"]);
    assert_eq!(outcome.searched_location, "418 Maple Ave, Ames, Story County");
}

#[test]
fn unmatched_location_falls_back_to_all_approved() {
    let harness = harness();
    seed_contractor(&harness.store, "Prairie Air", &["Story County"], 12);
    seed_contractor(&harness.store, "Metro Comfort", &["Polk County"], 90);

    let outcome = harness
        .platform
        .contractors
        .match_location("Sioux City, Woodbury County", Some(1))
        .expect("match runs");

    assert!(!outcome.exact_match);
    assert_eq!(outcome.count, 1);
    assert_eq!(outcome.contractors[0].company_name, "Metro Comfort");
}

#[test]
fn short_area_codes_do_not_match_longer_place_names() {
    let harness = harness();
    seed_contractor(&harness.store, "Hawkeye Heating", &["IA"], 25);

    let outcome = harness
        .platform
        .contractors
        .match_location("123 Main St, Fresno, California", None)
        .expect("match runs");

    assert!(!outcome.exact_match);
    assert_eq!(outcome.count, 1);

    let outcome = harness
        .platform
        .contractors
        .match_location("12 Elm St, Ames, IA", None)
        .expect("match runs");
    assert!(outcome.exact_match);
}

#[test]
fn unapproved_contractors_are_never_matched() {
    let harness = harness();
    let mut suspended = seed_contractor(&harness.store, "Prairie Air", &["Story County"], 12);
    suspended.status = ContractorStatus::Suspended;
    harness
        .store
        .update_contractor(suspended)
        .expect("contractor updated");

    let outcome = harness
        .platform
        .contractors
        .match_location("Ames, Story County", None)
        .expect("match runs");
    assert!(!outcome.exact_match);
    assert_eq!(outcome.count, 0);
}

#[test]
fn blank_location_is_rejected() {
    let harness = harness();
    let err = harness
        .platform
        .contractors
        .match_location("   ", None)
        .expect_err("blank location rejected");
    assert_eq!(err.reason(), "missing_location");
}

#[test]
fn onboarded_contractors_need_approval_before_matching() {
    let harness = harness();
    let directory = &harness.platform.contractors;

    let contractor = directory
        .onboard(ContractorOnboarding {
            company_name: Some("Prairie Air".to_string()),
            contact_name: Some("Sam Ortiz".to_string()),
            email: Some("sam@prairieair.test".to_string()),
            phone: None,
            service_areas: vec![" Story County ".to_string(), "".to_string()],
            completed_projects: 3,
        })
        .expect("onboarding accepted");
    assert_eq!(contractor.status, ContractorStatus::Pending);
    assert_eq!(contractor.service_areas, vec!["Story County".to_string()]);
    assert_eq!(
        directory
            .match_location("Ames, Story County", None)
            .expect("match runs")
            .count,
        0
    );

    let approved = directory
        .approve(&contractor.id, &admin())
        .expect("approval recorded");
    assert!(approved.approved);
    assert!(approved.approved_at.is_some());
    assert!(
        directory
            .match_location("Ames, Story County", None)
            .expect("match runs")
            .exact_match
    );
}

#[test]
fn onboarding_requires_service_areas() {
    let harness = harness();
    let err = harness
        .platform
        .contractors
        .onboard(ContractorOnboarding {
            company_name: Some("Prairie Air".to_string()),
            contact_name: Some("Sam Ortiz".to_string()),
            email: Some("sam@prairieair.test".to_string()),
            ..ContractorOnboarding::default()
        })
        .expect_err("service areas required");
    assert_eq!(err.reason(), "missing_service_areas");
}

#[test]
fn balance_reflects_outstanding_fees() {
    let harness = harness();
    let mut contractor = seed_contractor(&harness.store, "Prairie Air", &["Story County"], 12);
    contractor.filing_fees_owed = 50.0;
    contractor.referral_fees_owed = 150.0;
    harness
        .store
        .update_contractor(contractor.clone())
        .expect("contractor updated");

    let balance = harness
        .platform
        .contractors
        .balance(&contractor.id)
        .expect("balance computed");
    assert_eq!(balance.filing_fees_owed, 50.0);
    assert_eq!(balance.referral_fees_owed, 150.0);
    assert!(!balance.approval_fee_paid);
    assert_eq!(balance.total_owed, 200.0);
}
