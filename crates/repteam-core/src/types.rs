use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RepError;

/// Lifecycle status of a rep application.
///
/// The pending-to-approved transition happens out of band (CRM side); only
/// approved reps are visible on the dashboard and leaderboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepStatus {
    Pending,
    Approved,
    Rejected,
}

impl RepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Result<Self, RepError> {
        match value {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(RepError::Store(format!("unknown rep status '{other}'"))),
        }
    }
}

/// Prior sales experience declared on the application form.
///
/// Wire values match the form options ("No", "A little", "Yes"); anything
/// unrecognized is treated as no experience.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Experience {
    #[default]
    #[serde(rename = "No")]
    None,
    #[serde(rename = "A little")]
    Some,
    #[serde(rename = "Yes")]
    Yes,
}

impl Experience {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "No",
            Self::Some => "A little",
            Self::Yes => "Yes",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "Yes" => Self::Yes,
            "A little" => Self::Some,
            _ => Self::None,
        }
    }
}

impl<'de> Deserialize<'de> for Experience {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Ok(Self::parse(&value))
    }
}

/// A sales-rep applicant. The normalized handle is the unique identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rep {
    pub id: Uuid,
    #[serde(rename = "ig_handle")]
    pub handle: String,
    pub full_name: String,
    pub phone: String,
    pub university: Option<String>,
    pub promo_plan: String,
    pub prev_experience: Experience,
    pub status: RepStatus,
    pub applied_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub crm_contact_id: Option<String>,
}

/// Insert shape for a new application. Status is always pending on insert.
#[derive(Debug, Clone)]
pub struct NewRep {
    pub handle: String,
    pub full_name: String,
    pub phone: String,
    pub university: Option<String>,
    pub promo_plan: String,
    pub prev_experience: Experience,
}

/// Kind of recorded unit sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaleKind {
    Shirt,
    Ticket,
}

impl SaleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Shirt => "shirt",
            Self::Ticket => "ticket",
        }
    }

    pub fn parse(value: &str) -> Result<Self, RepError> {
        match value {
            "shirt" => Ok(Self::Shirt),
            "ticket" => Ok(Self::Ticket),
            other => Err(RepError::Store(format!("unknown sale kind '{other}'"))),
        }
    }
}

/// One recorded sale, attributed to a rep by handle (weak back reference).
///
/// Sales are written by an external ingestion path; this system only reads
/// them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sale {
    pub id: Uuid,
    #[serde(rename = "rep_ig_handle")]
    pub rep_handle: String,
    #[serde(rename = "sale_type")]
    pub kind: SaleKind,
    pub quantity: u32,
    pub amount: Option<i64>,
    pub source: Option<String>,
    pub external_order_id: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Derived leaderboard row. Never stored; recomputed on every read.
#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardRow {
    pub rank: usize,
    #[serde(rename = "ig_handle")]
    pub handle: String,
    pub full_name: String,
    pub shirts_sold: u64,
    pub tickets_sold: u64,
    pub total_units: u64,
    pub total_points: u64,
    pub total_commission: i64,
    #[serde(skip)]
    pub applied_at: DateTime<Utc>,
}

/// Derived per-rep dashboard payload for an approved rep.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    #[serde(rename = "ig_handle")]
    pub handle: String,
    pub full_name: String,
    pub shirts_sold: u64,
    pub tickets_sold: u64,
    pub total_units: u64,
    pub total_points: u64,
    pub total_commission: i64,
    pub rank: usize,
    pub rep_count: usize,
    pub bonus_tiers: Vec<crate::scoring::TierProgress>,
    pub referral_link: String,
    pub recent_sales: Vec<Sale>,
}
