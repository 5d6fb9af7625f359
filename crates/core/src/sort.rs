//! Sort specification for job history queries.
//!
//! Sort input arrives as a flat token list, e.g. `["status", "asc",
//! "createdAt", "desc"]`. Tokens are read left to right: each token names a
//! field, and the token after it is consumed as a direction only when it is
//! `asc` or `desc` (case-insensitive). Otherwise the field sorts ascending and
//! the next token starts a new field.
//!
//! Only whitelisted fields survive; unknown names are dropped silently. If
//! nothing survives, the default is `createdAt DESC`.

use core::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::job::AlignJob;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    fn parse(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "asc" => Some(SortDirection::Asc),
            "desc" => Some(SortDirection::Desc),
            _ => None,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Whitelisted sortable fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortField {
    #[serde(rename = "createdAt")]
    CreatedAt,
    #[serde(rename = "updatedAt")]
    UpdatedAt,
    #[serde(rename = "status")]
    Status,
    #[serde(rename = "alignTool")]
    AlignTool,
    #[serde(rename = "taskId")]
    TaskId,
    #[serde(rename = "userId")]
    UserId,
}

impl SortField {
    /// Accepts camelCase or snake_case spellings, case-insensitively.
    pub fn parse(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "createdat" | "created_at" => Some(SortField::CreatedAt),
            "updatedat" | "updated_at" => Some(SortField::UpdatedAt),
            "status" => Some(SortField::Status),
            "aligntool" | "align_tool" => Some(SortField::AlignTool),
            "taskid" | "task_id" => Some(SortField::TaskId),
            "userid" | "user_id" => Some(SortField::UserId),
            _ => None,
        }
    }

    /// Canonical (camelCase) name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SortField::CreatedAt => "createdAt",
            SortField::UpdatedAt => "updatedAt",
            SortField::Status => "status",
            SortField::AlignTool => "alignTool",
            SortField::TaskId => "taskId",
            SortField::UserId => "userId",
        }
    }

    /// Column name in the `align_jobs` table.
    pub fn column(&self) -> &'static str {
        match self {
            SortField::CreatedAt => "created_at",
            SortField::UpdatedAt => "updated_at",
            SortField::Status => "status",
            SortField::AlignTool => "align_tool",
            SortField::TaskId => "task_id",
            SortField::UserId => "user_id",
        }
    }

    fn compare(&self, a: &AlignJob, b: &AlignJob) -> Ordering {
        match self {
            SortField::CreatedAt => a.created_at.cmp(&b.created_at),
            SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
            SortField::Status => a.status.as_str().cmp(b.status.as_str()),
            SortField::AlignTool => a.align_tool.as_str().cmp(b.align_tool.as_str()),
            SortField::TaskId => a.task_id.cmp(&b.task_id),
            SortField::UserId => a.user_id.cmp(&b.user_id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortOrder {
    pub field: SortField,
    pub direction: SortDirection,
}

impl SortOrder {
    pub fn new(field: SortField, direction: SortDirection) -> Self {
        Self { field, direction }
    }

    pub fn asc(field: SortField) -> Self {
        Self::new(field, SortDirection::Asc)
    }

    pub fn desc(field: SortField) -> Self {
        Self::new(field, SortDirection::Desc)
    }
}

/// Validated, ordered list of sort keys. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec(Vec<SortOrder>);

impl Default for SortSpec {
    fn default() -> Self {
        Self(vec![SortOrder::desc(SortField::CreatedAt)])
    }
}

impl SortSpec {
    pub fn parse<S: AsRef<str>>(tokens: &[S]) -> Self {
        let mut orders: Vec<SortOrder> = Vec::new();
        let mut i = 0;

        while i < tokens.len() {
            let candidate = tokens[i].as_ref();
            let direction = tokens.get(i + 1).and_then(|t| SortDirection::parse(t.as_ref()));

            i += if direction.is_some() { 2 } else { 1 };

            if let Some(field) = SortField::parse(candidate) {
                orders.push(SortOrder::new(field, direction.unwrap_or(SortDirection::Asc)));
            }
        }

        if orders.is_empty() {
            Self::default()
        } else {
            Self(orders)
        }
    }

    pub fn orders(&self) -> &[SortOrder] {
        &self.0
    }

    /// Compare two jobs by these sort keys (for in-memory listing).
    pub fn compare(&self, a: &AlignJob, b: &AlignJob) -> Ordering {
        self.0
            .iter()
            .map(|o| {
                let ord = o.field.compare(a, b);
                match o.direction {
                    SortDirection::Asc => ord,
                    SortDirection::Desc => ord.reverse(),
                }
            })
            .find(|ord| ord.is_ne())
            .unwrap_or(Ordering::Equal)
    }

    /// `ORDER BY` body built only from whitelisted column names.
    pub fn to_sql(&self) -> String {
        self.0
            .iter()
            .map(|o| format!("{} {}", o.field.column(), o.direction.as_sql()))
            .collect::<Vec<_>>()
            .join(", ")
    }
}
