use crate::infra::parse_amount;
use clap::Args;
use rebate_tracker::error::AppError;
use rebate_tracker::workflows::rebate::{
    calculate_contractor_balance, calculate_project_fees, referral_tier,
};
use serde_json::json;

#[derive(Args, Debug)]
pub(crate) struct FeeQuoteArgs {
    /// Total project cost in dollars
    #[arg(long, value_parser = parse_amount)]
    pub(crate) cost: f64,
    /// Print the quote as JSON
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Args, Debug)]
pub(crate) struct FeeBalanceArgs {
    /// Filing fees currently owed
    #[arg(long, value_parser = parse_amount)]
    pub(crate) filing_owed: f64,
    /// Referral fees currently owed
    #[arg(long, value_parser = parse_amount)]
    pub(crate) referral_owed: f64,
    /// Whether the one-time approval fee has been paid
    #[arg(long)]
    pub(crate) approval_paid: bool,
    /// Print the balance as JSON
    #[arg(long)]
    pub(crate) json: bool,
}

pub(crate) fn run_fee_quote(args: FeeQuoteArgs) -> Result<(), AppError> {
    println!("{}", render_fee_quote(args.cost, args.json)?);
    Ok(())
}

pub(crate) fn run_fee_balance(args: FeeBalanceArgs) -> Result<(), AppError> {
    let balance =
        calculate_contractor_balance(args.filing_owed, args.referral_owed, args.approval_paid);
    if args.json {
        println!("{}", to_pretty_json(&balance)?);
        return Ok(());
    }

    println!("Contractor balance");
    println!("  Filing fees owed:   ${:>10.2}", balance.filing_fees_owed);
    println!("  Referral fees owed: ${:>10.2}", balance.referral_fees_owed);
    println!(
        "  Approval fee:       {}",
        if balance.approval_fee_paid { "paid" } else { "outstanding" }
    );
    println!("  Total owed:         ${:>10.2}", balance.total_owed);
    Ok(())
}

pub(crate) fn render_fee_quote(cost: f64, as_json: bool) -> Result<String, AppError> {
    let tier = referral_tier(cost);
    let fees = calculate_project_fees(cost);

    if as_json {
        return to_pretty_json(&json!({ "cost": cost, "tier": tier, "fees": fees }));
    }

    Ok([
        format!("Fee quote for a ${cost:.2} project"),
        format!("  Referral tier:  {}", tier.label),
        format!("  Referral fee:   ${:>9.2}", fees.referral_fee),
        format!("  Filing fee:     ${:>9.2}", fees.filing_fee),
        format!("  Total fees:     ${:>9.2}", fees.total_fees),
        format!("  Share of cost:  {:>9.2}%", fees.fee_percentage),
    ]
    .join("\n"))
}

fn to_pretty_json<T: serde::Serialize>(value: &T) -> Result<String, AppError> {
    Ok(serde_json::to_string_pretty(value)?)
}
