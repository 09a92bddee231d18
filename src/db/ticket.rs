use std::error::Error as StdError;

use derive_more::Display;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio_postgres::{
    types::{
        accepts, private::BytesMut, to_sql_checked, FromSql, IsNull, ToSql,
        Type,
    },
    Error, Row,
};

use super::Client;

/// One citation-resolution request, as stored in the `tickets` table.
///
/// Date fields are kept as verbatim text: the store is the source of truth
/// and no transformation is applied on read.
#[derive(Clone, Debug, PartialEq)]
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
    pub status: Option<String>,
    pub notified_email: bool,
    pub notified_sms: bool,
    pub file_url: String,
    pub created_at: OffsetDateTime,
}

/// Fields of a ticket not yet assigned an `id` and `created_at` by the store.
#[derive(Clone, Debug)]
pub struct NewTicket {
    pub full_name: String,
    pub date_of_birth: String,
    pub email: String,
    pub phone_number: String,
    pub ticket_number: String,
    pub violation_date: String,
    pub license_plate: String,
    pub city: String,
    pub status: Option<String>,
    pub notified_email: bool,
    pub notified_sms: bool,
    pub file_url: String,
}

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Deserialize,
    Display,
    Eq,
    Hash,
    PartialEq,
    Serialize,
)]
pub struct Id(i64);

impl From<i64> for Id {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl FromSql<'_> for Id {
    accepts!(INT8);

    fn from_sql(
        ty: &Type,
        raw: &[u8],
    ) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        i64::from_sql(ty, raw).map(Self)
    }
}

impl ToSql for Id {
    accepts!(INT8);

    to_sql_checked!();

    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        self.0.to_sql(ty, out)
    }
}

/// Canonical ticket statuses.
///
/// Storage keeps the status as free-form text, so foreign values can appear
/// in rows; this enum is the closed set a transition may write.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Status {
    /// Submitted and awaiting review by the legal team.
    Pending,

    /// Being worked on by the legal team.
    #[serde(rename = "In Review")]
    InReview,

    /// Resolved; the submitter is notified and the ticket leaves
    /// the admin list.
    Completed,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::InReview => "In Review",
            Self::Completed => "Completed",
        }
    }
}

fn from_row(row: &Row) -> Ticket {
    Ticket {
        id: row.get("id"),
        full_name: row.get("full_name"),
        date_of_birth: row.get("date_of_birth"),
        email: row.get("email"),
        phone_number: row.get("phone_number"),
        ticket_number: row.get("ticket_number"),
        violation_date: row.get("violation_date"),
        license_plate: row.get("license_plate"),
        city: row.get("city"),
        status: row.get("status"),
        notified_email: row.get("notified_email"),
        notified_sms: row.get("notified_sms"),
        file_url: row.get("file_url"),
        created_at: row.get("created_at"),
    }
}

impl Client {
    pub async fn insert_ticket(
        &self,
        new: NewTicket,
    ) -> Result<Ticket, Error> {
        const SQL: &str = "\
            INSERT INTO tickets (full_name, date_of_birth, email, \
                                 phone_number, ticket_number, violation_date, \
                                 license_plate, city, status, \
                                 notified_email, notified_sms, file_url) \
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
            RETURNING id, created_at";

        let row = self
            .0
            .query_one(
                SQL,
                &[
                    &new.full_name,
                    &new.date_of_birth,
                    &new.email,
                    &new.phone_number,
                    &new.ticket_number,
                    &new.violation_date,
                    &new.license_plate,
                    &new.city,
                    &new.status,
                    &new.notified_email,
                    &new.notified_sms,
                    &new.file_url,
                ],
            )
            .await?;

        Ok(Ticket {
            id: row.get("id"),
            full_name: new.full_name,
            date_of_birth: new.date_of_birth,
            email: new.email,
            phone_number: new.phone_number,
            ticket_number: new.ticket_number,
            violation_date: new.violation_date,
            license_plate: new.license_plate,
            city: new.city,
            status: new.status,
            notified_email: new.notified_email,
            notified_sms: new.notified_sms,
            file_url: new.file_url,
            created_at: row.get("created_at"),
        })
    }

    pub async fn get_ticket_by_id(
        &self,
        id: Id,
    ) -> Result<Option<Ticket>, Error> {
        const SQL: &str = "\
            SELECT id, full_name, date_of_birth, email, phone_number, \
                   ticket_number, violation_date, license_plate, city, \
                   status, notified_email, notified_sms, file_url, \
                   created_at \
            FROM tickets \
            WHERE id = $1";
        Ok(self
            .0
            .query_opt(SQL, &[&id])
            .await?
            .map(|row| from_row(&row)))
    }

    pub async fn get_tickets_by_email(
        &self,
        email: &str,
    ) -> Result<Vec<Ticket>, Error> {
        const SQL: &str = "\
            SELECT id, full_name, date_of_birth, email, phone_number, \
                   ticket_number, violation_date, license_plate, city, \
                   status, notified_email, notified_sms, file_url, \
                   created_at \
            FROM tickets \
            WHERE email = $1 \
            ORDER BY created_at DESC, \
                     id DESC";
        Ok(self
            .0
            .query(SQL, &[&email])
            .await?
            .iter()
            .map(from_row)
            .collect())
    }

    /// Lists every ticket still in flight, newest first.
    ///
    /// Rows with a `NULL` status are in flight too, so the comparison has
    /// to be null-aware rather than a plain `<>`.
    pub async fn get_open_tickets(&self) -> Result<Vec<Ticket>, Error> {
        const SQL: &str = "\
            SELECT id, full_name, date_of_birth, email, phone_number, \
                   ticket_number, violation_date, license_plate, city, \
                   status, notified_email, notified_sms, file_url, \
                   created_at \
            FROM tickets \
            WHERE status IS DISTINCT FROM 'Completed' \
            ORDER BY created_at DESC, \
                     id DESC";
        Ok(self
            .0
            .query(SQL, &[])
            .await?
            .iter()
            .map(from_row)
            .collect())
    }

    /// Returns `false` when no row with the given `id` exists.
    pub async fn set_ticket_status(
        &self,
        id: Id,
        status: &str,
    ) -> Result<bool, Error> {
        const SQL: &str = "UPDATE tickets SET status = $2 WHERE id = $1";
        Ok(self.0.execute(SQL, &[&id, &status]).await? > 0)
    }

    /// Returns `false` when no row with the given `id` exists.
    pub async fn delete_ticket(&self, id: Id) -> Result<bool, Error> {
        const SQL: &str = "DELETE FROM tickets WHERE id = $1";
        Ok(self.0.execute(SQL, &[&id]).await? > 0)
    }
}
