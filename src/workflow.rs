//! Ticket lifecycle workflow.
//!
//! The multi-step sequences of the system (insert + notify + pay on
//! submission, update + notify on completion) live behind the functions
//! here, so each step's outcome is reported precisely instead of being
//! scattered across callers. True atomicity across the store, the mail
//! service and the payment processor is not attempted: a ticket can be
//! persisted while its payment session or notification failed, and the
//! [`Submission`] report says exactly which.

use async_trait::async_trait;
use derive_more::From;
use futures::future::OptionFuture;
use tracing::warn;

use crate::{
    db::{
        self,
        ticket::{NewTicket, Status},
    },
    mail, payment, storage,
};

/// Status label of the notification sent right after submission.
pub const RECEIVED_STATUS: &str = "Received";

/// Persistence seam over the ticket table.
#[async_trait]
pub trait TicketStore {
    async fn insert_ticket(
        &self,
        new: NewTicket,
    ) -> Result<db::Ticket, db::Error>;

    async fn ticket_by_id(
        &self,
        id: db::ticket::Id,
    ) -> Result<Option<db::Ticket>, db::Error>;

    async fn tickets_by_email(
        &self,
        email: &str,
    ) -> Result<Vec<db::Ticket>, db::Error>;

    async fn open_tickets(&self) -> Result<Vec<db::Ticket>, db::Error>;

    async fn set_ticket_status(
        &self,
        id: db::ticket::Id,
        status: &str,
    ) -> Result<bool, db::Error>;

    async fn delete_ticket(
        &self,
        id: db::ticket::Id,
    ) -> Result<bool, db::Error>;
}

#[async_trait]
impl TicketStore for db::Client {
    async fn insert_ticket(
        &self,
        new: NewTicket,
    ) -> Result<db::Ticket, db::Error> {
        db::Client::insert_ticket(self, new).await
    }

    async fn ticket_by_id(
        &self,
        id: db::ticket::Id,
    ) -> Result<Option<db::Ticket>, db::Error> {
        self.get_ticket_by_id(id).await
    }

    async fn tickets_by_email(
        &self,
        email: &str,
    ) -> Result<Vec<db::Ticket>, db::Error> {
        self.get_tickets_by_email(email).await
    }

    async fn open_tickets(&self) -> Result<Vec<db::Ticket>, db::Error> {
        self.get_open_tickets().await
    }

    async fn set_ticket_status(
        &self,
        id: db::ticket::Id,
        status: &str,
    ) -> Result<bool, db::Error> {
        db::Client::set_ticket_status(self, id, status).await
    }

    async fn delete_ticket(
        &self,
        id: db::ticket::Id,
    ) -> Result<bool, db::Error> {
        db::Client::delete_ticket(self, id).await
    }
}

/// Fire-and-forget status-update notifications.
#[async_trait]
pub trait Notifier {
    async fn send_status_update(
        &self,
        to: &str,
        status: &str,
    ) -> Result<(), mail::Error>;
}

/// One-shot checkout sessions for the fixed service fee.
#[async_trait]
pub trait PaymentGateway {
    async fn create_checkout_session(
        &self,
        email: Option<&str>,
    ) -> Result<String, payment::Error>;
}

/// Blob storage for uploaded ticket files.
#[async_trait]
pub trait ObjectStore {
    /// Stores the bytes and returns the public URL.
    async fn put_upload(
        &self,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<String, storage::Error>;
}

/// User-entered submission form.
#[derive(Debug, Default)]
pub struct SubmitInput {
    pub full_name: String,
    pub date_of_birth: String,
    pub email: String,
    pub phone_number: String,
    pub ticket_number: String,
    pub violation_date: String,
    pub license_plate: String,
    pub city: String,
    pub file: Option<UploadedFile>,
}

#[derive(Debug)]
pub struct UploadedFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl SubmitInput {
    /// Checks the form before any side effect happens.
    fn validate(&self) -> Result<(), SubmitError> {
        use SubmitError as E;

        let required = [
            (&self.full_name, "fullName"),
            (&self.date_of_birth, "dateOfBirth"),
            (&self.email, "email"),
            (&self.ticket_number, "ticketNumber"),
            (&self.violation_date, "violationDate"),
            (&self.license_plate, "licensePlate"),
            (&self.city, "city"),
        ];
        for (value, name) in required {
            if value.trim().is_empty() {
                return Err(E::MissingField(name));
            }
        }

        if let Some(file) = &self.file {
            if !storage::has_allowed_extension(&file.name) {
                return Err(E::UnsupportedFileType);
            }
        }

        Ok(())
    }
}

/// Outcome of a submission, step by step.
///
/// The ticket is always persisted when this is returned; `notified` and
/// `checkout_url` report the best-effort steps that followed.
#[derive(Debug)]
pub struct Submission {
    pub ticket: db::Ticket,
    pub notified: bool,
    pub checkout_url: Option<String>,
}

#[derive(Debug, From)]
pub enum SubmitError {
    /// Name of the required form field that was left blank.
    MissingField(&'static str),
    UnsupportedFileType,
    #[from]
    Upload(storage::Error),
    #[from]
    Store(db::Error),
}

/// Runs the submission workflow: validate, upload, insert, notify, pay.
///
/// Validation failures abort before any side effect. The "Received"
/// notification and the checkout session are best-effort: their failures
/// are logged and reported in the [`Submission`], the persisted ticket is
/// never rolled back.
pub async fn submit<S, U, N, P>(
    store: &S,
    uploads: &U,
    notifier: &N,
    payments: &P,
    input: SubmitInput,
) -> Result<Submission, SubmitError>
where
    S: TicketStore + Sync,
    U: ObjectStore + Sync,
    N: Notifier + Sync,
    P: PaymentGateway + Sync,
{
    input.validate()?;

    let file_url = match &input.file {
        Some(file) => uploads.put_upload(&file.name, &file.bytes).await?,
        None => String::new(),
    };

    let ticket = store
        .insert_ticket(NewTicket {
            full_name: input.full_name,
            date_of_birth: input.date_of_birth,
            email: input.email,
            phone_number: input.phone_number,
            ticket_number: input.ticket_number,
            violation_date: input.violation_date,
            license_plate: input.license_plate,
            city: input.city,
            status: Some(Status::Pending.as_str().to_owned()),
            notified_email: false,
            notified_sms: false,
            file_url,
        })
        .await?;

    let notified = match notifier
        .send_status_update(&ticket.email, RECEIVED_STATUS)
        .await
    {
        Ok(()) => true,
        Err(e) => {
            warn!("received-notification failed for ticket {}: {e:?}", ticket.id);
            false
        }
    };

    let checkout_url = match payments
        .create_checkout_session(Some(&ticket.email))
        .await
    {
        Ok(url) => Some(url),
        Err(e) => {
            warn!("checkout session failed for ticket {}: {e:?}", ticket.id);
            None
        }
    };

    Ok(Submission {
        ticket,
        notified,
        checkout_url,
    })
}

#[derive(Debug, From)]
pub enum TransitionError {
    #[from]
    Store(db::Error),
    TicketNotFound,
}

/// Sets a ticket's status to one of the canonical values.
///
/// A transition to `Completed` notifies the submitter. Every call sends
/// its own notification: repeated completion clicks produce repeated
/// emails, there is no deduplication.
pub async fn transition<S, N>(
    store: &S,
    notifier: &N,
    id: db::ticket::Id,
    status: Status,
) -> Result<db::Ticket, TransitionError>
where
    S: TicketStore + Sync,
    N: Notifier + Sync,
{
    use TransitionError as E;

    let ticket = store
        .ticket_by_id(id)
        .await?
        .ok_or(E::TicketNotFound)?;
    if !store.set_ticket_status(id, status.as_str()).await? {
        return Err(E::TicketNotFound);
    }

    let notify = (status == Status::Completed && !ticket.email.is_empty())
        .then(|| notifier.send_status_update(&ticket.email, status.as_str()));
    if let Some(Err(e)) = OptionFuture::from(notify).await {
        warn!("completion notification failed for ticket {id}: {e:?}");
    }

    Ok(db::Ticket {
        status: Some(status.as_str().to_owned()),
        ..ticket
    })
}

/// Case-insensitive substring match over the fields the admin console
/// searches by. A pure view transform over an already fetched list.
pub fn matches_search(ticket: &db::Ticket, search: &str) -> bool {
    let search = search.to_lowercase();
    [
        &ticket.email,
        &ticket.ticket_number,
        &ticket.license_plate,
        &ticket.city,
        &ticket.full_name,
    ]
    .into_iter()
    .any(|field| field.to_lowercase().contains(&search))
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;

    use super::{matches_search, SubmitError, SubmitInput, UploadedFile};
    use crate::db;

    fn filled_input() -> SubmitInput {
        SubmitInput {
            full_name: "Jane Roe".to_owned(),
            date_of_birth: "1990-05-01".to_owned(),
            email: "jane@example.com".to_owned(),
            phone_number: String::new(),
            ticket_number: "T-100".to_owned(),
            violation_date: "2024-01-01".to_owned(),
            license_plate: "ABC123".to_owned(),
            city: "Miami".to_owned(),
            file: None,
        }
    }

    fn ticket(city: &str, email: &str) -> db::Ticket {
        db::Ticket {
            id: db::ticket::Id::from(1),
            full_name: "Jane Roe".to_owned(),
            date_of_birth: "1990-05-01".to_owned(),
            email: email.to_owned(),
            phone_number: String::new(),
            ticket_number: "T-100".to_owned(),
            violation_date: "2024-01-01".to_owned(),
            license_plate: "ABC123".to_owned(),
            city: city.to_owned(),
            status: Some("Pending".to_owned()),
            notified_email: false,
            notified_sms: false,
            file_url: String::new(),
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn accepts_a_filled_form() {
        assert!(filled_input().validate().is_ok());
    }

    #[test]
    fn phone_number_is_optional() {
        let mut input = filled_input();
        input.phone_number = String::new();
        assert!(input.validate().is_ok());
    }

    #[test]
    fn rejects_blank_required_fields() {
        let mut input = filled_input();
        input.city = "   ".to_owned();
        assert!(matches!(
            input.validate(),
            Err(SubmitError::MissingField("city")),
        ));

        let mut input = filled_input();
        input.email = String::new();
        assert!(matches!(
            input.validate(),
            Err(SubmitError::MissingField("email")),
        ));
    }

    #[test]
    fn rejects_disallowed_attachments() {
        let mut input = filled_input();
        input.file = Some(UploadedFile {
            name: "ticket.exe".to_owned(),
            bytes: vec![0x4d, 0x5a],
        });
        assert!(matches!(
            input.validate(),
            Err(SubmitError::UnsupportedFileType),
        ));
    }

    #[test]
    fn search_matches_substrings_case_insensitively() {
        let miami = ticket("Miami", "a@x.com");
        let orlando = ticket("Orlando", "b@x.com");

        assert!(matches_search(&miami, "mia"));
        assert!(!matches_search(&orlando, "mia"));
        assert!(matches_search(&orlando, "ORLA"));
        assert!(matches_search(&miami, "t-100"));
        assert!(matches_search(&miami, "jane roe"));
    }
}
