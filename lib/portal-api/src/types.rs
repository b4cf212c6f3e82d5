//! Wire types of the portal REST API.
//!
//! The backend reports some fields under Spanish names; those are accepted
//! as aliases on read. Request bodies and query parameters use the English
//! camelCase names.

use std::fmt;
use std::str::FromStr;

use budgetdesk_core::{BudgetRequestId, DepartmentId, ExpenseCategoryId, SupplierId};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Review state of a budget request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    #[serde(alias = "PENDIENTE")]
    Pending,
    #[serde(alias = "APROBADA", alias = "APROBADO")]
    Approved,
    #[serde(alias = "RECHAZADA", alias = "RECHAZADO")]
    Rejected,
    /// A state this client does not know about.
    #[serde(other)]
    Unknown,
}

impl RequestStatus {
    /// Returns the wire name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" | "PENDIENTE" => Ok(Self::Pending),
            "APPROVED" | "APROBADA" | "APROBADO" => Ok(Self::Approved),
            "REJECTED" | "RECHAZADA" | "RECHAZADO" => Ok(Self::Rejected),
            other => Err(format!("unknown request status: {other}")),
        }
    }
}

/// A budget request as returned by the portal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetRequest {
    pub id: BudgetRequestId,
    #[serde(alias = "titulo")]
    pub title: String,
    #[serde(default, alias = "descripcion")]
    pub description: Option<String>,
    #[serde(alias = "monto")]
    pub amount: f64,
    #[serde(default, alias = "moneda")]
    pub currency: Option<String>,
    #[serde(default, alias = "departamentoId")]
    pub department_id: Option<DepartmentId>,
    #[serde(default, alias = "proveedorId")]
    pub supplier_id: Option<SupplierId>,
    #[serde(default, alias = "categoriaGastoId")]
    pub expense_category_id: Option<ExpenseCategoryId>,
    #[serde(alias = "estado")]
    pub status: RequestStatus,
    /// Employee number of the requester.
    #[serde(default, alias = "numeroEmpleado")]
    pub employee_number: Option<String>,
    #[serde(default, alias = "comentario")]
    pub review_comment: Option<String>,
    #[serde(default, alias = "fechaCreacion", deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    /// Fields this client does not model.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Body of a new budget request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBudgetRequest {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub amount: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    pub department_id: DepartmentId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supplier_id: Option<SupplierId>,
    pub expense_category_id: ExpenseCategoryId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub employee_number: Option<String>,
}

/// Partial update of a budget request; unset fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetRequestUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department_id: Option<DepartmentId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supplier_id: Option<SupplierId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expense_category_id: Option<ExpenseCategoryId>,
}

impl BudgetRequestUpdate {
    /// Returns true if the update changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Filter for listing budget requests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestFilter {
    pub status: Option<RequestStatus>,
    pub department_id: Option<DepartmentId>,
    pub employee_number: Option<String>,
}

impl RequestFilter {
    /// Returns the filter as query parameters.
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(status) = self.status {
            pairs.push(("status", status.to_string()));
        }
        if let Some(department) = self.department_id {
            pairs.push(("departmentId", department.to_string()));
        }
        if let Some(employee) = &self.employee_number {
            pairs.push(("employeeNumber", employee.clone()));
        }
        pairs
    }
}

/// An administrator's verdict on a budget request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewDecision {
    Approve,
    Reject,
}

impl ReviewDecision {
    /// Status the request moves to.
    #[must_use]
    pub fn status(self) -> RequestStatus {
        match self {
            Self::Approve => RequestStatus::Approved,
            Self::Reject => RequestStatus::Rejected,
        }
    }
}

/// Body of the review endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct ReviewBody<'a> {
    pub(crate) status: RequestStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) comment: Option<&'a str>,
}

/// Reference catalogs maintained by administrators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CatalogKind {
    Departments,
    Suppliers,
    ExpenseCategories,
}

impl CatalogKind {
    /// All catalogs.
    pub const ALL: [Self; 3] = [Self::Departments, Self::Suppliers, Self::ExpenseCategories];

    /// Path segment of the catalog's endpoints.
    #[must_use]
    pub fn path_segment(self) -> &'static str {
        match self {
            Self::Departments => "departamentos",
            Self::Suppliers => "proveedores",
            Self::ExpenseCategories => "categorias-gasto",
        }
    }

    /// Name used on the command line and in messages.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Departments => "departments",
            Self::Suppliers => "suppliers",
            Self::ExpenseCategories => "expense-categories",
        }
    }
}

impl fmt::Display for CatalogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CatalogKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == s || kind.path_segment() == s)
            .ok_or_else(|| {
                format!("unknown catalog '{s}', expected departments, suppliers or expense-categories")
            })
    }
}

/// One entry of a reference catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub id: i64,
    #[serde(alias = "nombre")]
    pub name: String,
    #[serde(default, alias = "codigo")]
    pub code: Option<String>,
    #[serde(default = "default_active", alias = "activo")]
    pub active: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_active() -> bool {
    true
}

/// Outcome of a CSV catalog import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    #[serde(default, alias = "importados", alias = "created")]
    pub imported: u32,
    #[serde(default, alias = "actualizados")]
    pub updated: u32,
    #[serde(default, alias = "omitidos", alias = "rejected")]
    pub skipped: u32,
    #[serde(default, alias = "errores")]
    pub errors: Vec<String>,
}

impl ImportSummary {
    /// Returns true if no row was rejected.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.skipped == 0 && self.errors.is_empty()
    }
}

/// A notification email sent through the portal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailMessage {
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget_request_id: Option<BudgetRequestId>,
}

/// List responses come either bare or wrapped in a page object.
#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum Listing<T> {
    Plain(Vec<T>),
    Page { content: Vec<T> },
}

impl<T> Listing<T> {
    pub(crate) fn into_vec(self) -> Vec<T> {
        match self {
            Self::Plain(items) | Self::Page { content: items } => items,
        }
    }
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    if let Ok(parsed) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(Some(parsed.with_timezone(&Utc)));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(Some(naive.and_utc()));
    }
    Ok(NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc()))
}
