//! Plain-text rendering of portal records.

use budgetdesk_platform_access::{UserProfile, jwt};
use budgetdesk_portal_api::{BudgetRequest, CatalogEntry, ImportSummary};
use chrono::{DateTime, Utc};

/// One line per request: id, status, amount, title.
#[must_use]
pub fn request_line(request: &BudgetRequest) -> String {
    format!(
        "{:>6}  {:<9}  {:>12}  {}",
        request.id.to_string(),
        request.status.as_str(),
        amount(request),
        request.title
    )
}

/// Every known field of a request, one per line.
#[must_use]
pub fn request_details(request: &BudgetRequest) -> String {
    let mut lines = vec![
        format!("Request:     {}", request.id),
        format!("Title:       {}", request.title),
        format!("Status:      {}", request.status),
        format!("Amount:      {}", amount(request)),
    ];
    if let Some(description) = &request.description {
        lines.push(format!("Description: {description}"));
    }
    if let Some(department) = request.department_id {
        lines.push(format!("Department:  {department}"));
    }
    if let Some(supplier) = request.supplier_id {
        lines.push(format!("Supplier:    {supplier}"));
    }
    if let Some(category) = request.expense_category_id {
        lines.push(format!("Category:    {category}"));
    }
    if let Some(employee) = &request.employee_number {
        lines.push(format!("Requester:   {employee}"));
    }
    if let Some(created) = request.created_at {
        lines.push(format!("Created:     {}", created.format("%Y-%m-%d %H:%M UTC")));
    }
    if let Some(comment) = &request.review_comment {
        lines.push(format!("Comment:     {comment}"));
    }
    lines.join("\n")
}

fn amount(request: &BudgetRequest) -> String {
    match &request.currency {
        Some(currency) => format!("{:.2} {currency}", request.amount),
        None => format!("{:.2}", request.amount),
    }
}

/// One line per catalog entry.
#[must_use]
pub fn catalog_line(entry: &CatalogEntry) -> String {
    let code = entry.code.as_deref().unwrap_or("-");
    let inactive = if entry.active { "" } else { "  (inactive)" };
    format!("{:>6}  {:<10}  {}{inactive}", entry.id, code, entry.name)
}

/// Summary of a CSV import.
#[must_use]
pub fn import_summary(summary: &ImportSummary) -> String {
    let mut lines = vec![format!(
        "imported {}, updated {}, skipped {}",
        summary.imported, summary.updated, summary.skipped
    )];
    lines.extend(summary.errors.iter().map(|error| format!("  {error}")));
    lines.join("\n")
}

/// The signed-in user and when the access token expires.
#[must_use]
pub fn profile(profile: &UserProfile, access_token: Option<&str>, now: DateTime<Utc>) -> String {
    let mut lines = Vec::new();
    if let Some(name) = profile.name() {
        lines.push(format!("Name:     {name}"));
    }
    if let Some(email) = profile.email() {
        lines.push(format!("Email:    {email}"));
    }
    if let Some(employee) = profile.employee_number() {
        lines.push(format!("Employee: {employee}"));
    }
    let roles = profile.roles();
    lines.push(format!(
        "Roles:    {}",
        if roles.is_empty() {
            "(none)".to_string()
        } else {
            roles.describe()
        }
    ));
    if let Some(expires) = access_token.and_then(jwt::expires_at) {
        let remaining = expires - now;
        let state = if remaining.num_seconds() > 0 {
            format!("in {} min", remaining.num_minutes())
        } else {
            "expired".to_string()
        };
        lines.push(format!(
            "Session:  expires {} ({state})",
            expires.format("%Y-%m-%d %H:%M UTC")
        ));
    }
    lines.join("\n")
}
