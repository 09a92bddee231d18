use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::db;

pub use crate::db::ticket::{Id, Status};

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: Id,
    pub full_name: String,
    pub date_of_birth: String,
    pub email: String,
    pub phone_number: String,
    pub ticket_number: String,
    pub violation_date: String,
    pub license_plate: String,
    pub city: String,
    /// Raw status text as stored; may be absent or non-canonical.
    pub status: Option<String>,
    /// Display label derived from `status`, see [`Badge`].
    pub badge: String,
    pub file_url: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<db::Ticket> for Ticket {
    fn from(ticket: db::Ticket) -> Self {
        let badge =
            Badge::from_status(ticket.status.as_deref()).label().to_owned();
        Self {
            id: ticket.id,
            full_name: ticket.full_name,
            date_of_birth: ticket.date_of_birth,
            email: ticket.email,
            phone_number: ticket.phone_number,
            ticket_number: ticket.ticket_number,
            violation_date: ticket.violation_date,
            license_plate: ticket.license_plate,
            city: ticket.city,
            status: ticket.status,
            badge,
            file_url: ticket.file_url,
            created_at: ticket.created_at,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct List {
    pub tickets: Vec<Ticket>,
}

/// Display badge for a stored status value.
///
/// Statuses are free-form text in storage, so the mapping is
/// case-insensitive over the canonical values and degrades to a verbatim
/// badge for anything unrecognized.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Badge {
    Pending,
    InReview,
    Completed,
    /// Unrecognized status, shown verbatim.
    Other(String),
    /// Status absent or blank.
    Unknown,
}

impl Badge {
    pub fn from_status(status: Option<&str>) -> Self {
        let Some(status) = status.map(str::trim).filter(|s| !s.is_empty())
        else {
            return Self::Unknown;
        };

        // "In Progress" is a historical spelling of the review state.
        match status.to_lowercase().as_str() {
            "pending" => Self::Pending,
            "in review" | "in progress" => Self::InReview,
            "completed" => Self::Completed,
            _ => Self::Other(status.to_owned()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Pending => Status::Pending.as_str(),
            Self::InReview => Status::InReview.as_str(),
            Self::Completed => Status::Completed.as_str(),
            Self::Other(status) => status,
            Self::Unknown => "Unknown",
        }
    }
}
