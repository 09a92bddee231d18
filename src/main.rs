use std::{error::Error, sync::Arc, time::Duration};

use async_trait::async_trait;
use axum::{
    extract::{
        multipart::MultipartError, DefaultBodyLimit, FromRequestParts,
        Multipart, Path, Query, State,
    },
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        request, HeaderValue, Method, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, RequestPartsExt as _, Router,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use derive_more::From;
use jsonwebtoken::{
    decode, encode, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::{fs, net, task};
use tower_http::{cors::CorsLayer, services::ServeDir};
use tracing_subscriber::{
    layer::SubscriberExt as _, util::SubscriberInitExt as _,
};

use ticket_solver::{api, db, mail, payment, storage, workflow, Config};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = fs::read_to_string("config.toml").await?;
    let config = toml::from_str::<Config>(&config)?;

    let (db_client, db_connection) = db::connect(config.db).await?;

    task::spawn(async move {
        if let Err(e) = db_connection.await {
            panic!("database connection failed: {e}");
        }
    });

    let mut cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]);
    for origin in &config.http.cors.allowed_origins {
        cors = cors.allow_origin(origin.parse::<HeaderValue>()?);
    }

    let uploads_dir = config.storage.dir.clone();

    let app = Router::new()
        .route("/auth", post(auth))
        .route("/ticket", get(lookup_tickets).post(submit_ticket))
        .route("/ticket/:id", patch(edit_ticket).delete(delete_ticket))
        .route("/admin/ticket", get(list_tickets))
        .route("/checkout", post(create_checkout))
        .route("/notify", post(notify))
        .nest_service("/uploads", ServeDir::new(uploads_dir))
        .layer(cors)
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024))
        .with_state(Arc::new(AppState {
            db_client,
            mailer: mail::Client::new(config.mail),
            payments: payment::Client::new(config.payment),
            uploads: storage::Store::new(config.storage),
            admin_password: config.admin.password,
            jwt_expiration_time: config.jwt.expiration_time,
            jwt_decoding_key: DecodingKey::from_secret(
                config.jwt.secret.as_bytes(),
            ),
            jwt_encoding_key: EncodingKey::from_secret(
                config.jwt.secret.as_bytes(),
            ),
        }));

    let listener = net::TcpListener::bind(config.http.server.addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[derive(Deserialize)]
struct AuthInput {
    password: String,
}

/// Admin gate. The password is verified here, server-side; the client
/// only ever holds the resulting token.
async fn auth(
    State(state): State<SharedAppState>,
    Json(AuthInput { password }): Json<AuthInput>,
) -> Result<String, AuthError> {
    use AuthError as E;

    if password != state.admin_password {
        return Err(E::WrongPassword);
    }

    let expires_at = OffsetDateTime::now_utc() + state.jwt_expiration_time;
    encode(
        &Header::default(),
        &AuthClaims {
            exp: expires_at.unix_timestamp(),
        },
        &state.jwt_encoding_key,
    )
    .map_err(|_| E::InvalidToken)
}

#[derive(Debug)]
pub enum AuthError {
    InvalidToken,
    WrongPassword,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::InvalidToken => {
                (StatusCode::UNAUTHORIZED, "invalid token")
            }
            Self::WrongPassword => {
                (StatusCode::FORBIDDEN, "wrong password")
            }
        };
        (
            status,
            Json(api::Error {
                error: message.to_owned(),
            }),
        )
            .into_response()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitTicketOutput {
    id: api::ticket::Id,
    url: String,
}

async fn submit_ticket(
    State(state): State<SharedAppState>,
    mut multipart: Multipart,
) -> Result<Json<SubmitTicketOutput>, SubmitTicketError> {
    use SubmitTicketError as E;

    let mut input = workflow::SubmitInput::default();
    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.name().map(str::to_owned) else {
            continue;
        };
        match name.as_str() {
            "fullName" => input.full_name = field.text().await?,
            "dateOfBirth" => input.date_of_birth = field.text().await?,
            "email" => input.email = field.text().await?,
            "phoneNumber" => input.phone_number = field.text().await?,
            "ticketNumber" => input.ticket_number = field.text().await?,
            "violationDate" => input.violation_date = field.text().await?,
            "licensePlate" => input.license_plate = field.text().await?,
            "city" => input.city = field.text().await?,
            "file" => {
                let file_name =
                    field.file_name().unwrap_or("ticket").to_owned();
                let bytes = field.bytes().await?;
                if !bytes.is_empty() {
                    input.file = Some(workflow::UploadedFile {
                        name: file_name,
                        bytes: bytes.to_vec(),
                    });
                }
            }
            _ => {}
        }
    }

    let submission = workflow::submit(
        &state.db_client,
        &state.uploads,
        &state.mailer,
        &state.payments,
        input,
    )
    .await?;

    // The ticket is persisted either way; without a session URL there is
    // nowhere to redirect the submitter to.
    let url = submission.checkout_url.ok_or(E::PaymentSessionFailed)?;

    Ok(Json(SubmitTicketOutput {
        id: submission.ticket.id,
        url,
    }))
}

#[derive(Debug, From)]
pub enum SubmitTicketError {
    #[from]
    Multipart(MultipartError),
    #[from]
    Workflow(workflow::SubmitError),
    PaymentSessionFailed,
}

impl IntoResponse for SubmitTicketError {
    fn into_response(self) -> Response {
        use workflow::SubmitError as W;

        let (status, message) = match self {
            Self::Multipart(_) => {
                (StatusCode::BAD_REQUEST, "malformed form data".to_owned())
            }
            Self::Workflow(W::MissingField(field)) => (
                StatusCode::BAD_REQUEST,
                format!("missing required field: {field}"),
            ),
            Self::Workflow(W::UnsupportedFileType) => (
                StatusCode::BAD_REQUEST,
                "unsupported file type".to_owned(),
            ),
            Self::Workflow(W::Upload(_) | W::Store(_)) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "submission failed".to_owned(),
            ),
            Self::PaymentSessionFailed => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "payment session creation failed".to_owned(),
            ),
        };
        (status, Json(api::Error { error: message })).into_response()
    }
}

#[derive(Deserialize)]
struct LookupTicketsInput {
    email: String,
}

/// Status lookup: every ticket submitted under the given email, with a
/// display badge per row. Read-only, no pagination at this scale.
async fn lookup_tickets(
    State(state): State<SharedAppState>,
    Query(LookupTicketsInput { email }): Query<LookupTicketsInput>,
) -> Result<Json<api::ticket::List>, LookupTicketsError> {
    let tickets = state.db_client.get_tickets_by_email(&email).await?;

    Ok(Json(api::ticket::List {
        tickets: tickets.into_iter().map(Into::into).collect(),
    }))
}

#[derive(Debug, From)]
pub enum LookupTicketsError {
    #[from]
    DbError(db::Error),
}

impl IntoResponse for LookupTicketsError {
    fn into_response(self) -> Response {
        let Self::DbError(_) = self;
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(api::Error {
                error: "failed to load tickets".to_owned(),
            }),
        )
            .into_response()
    }
}

#[derive(Deserialize)]
struct ListTicketsInput {
    search: Option<String>,
}

/// Admin list: every non-`Completed` ticket, newest first, optionally
/// narrowed by a free-text search.
async fn list_tickets(
    State(state): State<SharedAppState>,
    _: AuthClaims,
    Query(ListTicketsInput { search }): Query<ListTicketsInput>,
) -> Result<Json<api::ticket::List>, ListTicketsError> {
    let mut tickets = state.db_client.get_open_tickets().await?;

    if let Some(search) = search.filter(|s| !s.trim().is_empty()) {
        tickets.retain(|t| workflow::matches_search(t, &search));
    }

    Ok(Json(api::ticket::List {
        tickets: tickets.into_iter().map(Into::into).collect(),
    }))
}

#[derive(Debug, From)]
pub enum ListTicketsError {
    #[from]
    DbError(db::Error),
}

impl IntoResponse for ListTicketsError {
    fn into_response(self) -> Response {
        let Self::DbError(_) = self;
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(api::Error {
                error: "failed to load tickets".to_owned(),
            }),
        )
            .into_response()
    }
}

#[derive(Deserialize)]
struct EditTicketInput {
    status: api::ticket::Status,
}

async fn edit_ticket(
    State(state): State<SharedAppState>,
    _: AuthClaims,
    Path(id): Path<api::ticket::Id>,
    Json(EditTicketInput { status }): Json<EditTicketInput>,
) -> Result<Json<api::Success>, EditTicketError> {
    workflow::transition(&state.db_client, &state.mailer, id, status)
        .await?;

    Ok(Json(api::Success { success: true }))
}

#[derive(Debug, From)]
pub enum EditTicketError {
    #[from]
    Workflow(workflow::TransitionError),
}

impl IntoResponse for EditTicketError {
    fn into_response(self) -> Response {
        use workflow::TransitionError as W;

        let (status, message) = match self {
            Self::Workflow(W::TicketNotFound) => {
                (StatusCode::NOT_FOUND, "ticket not found")
            }
            Self::Workflow(W::Store(_)) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "failed to update status",
            ),
        };
        (
            status,
            Json(api::Error {
                error: message.to_owned(),
            }),
        )
            .into_response()
    }
}

async fn delete_ticket(
    State(state): State<SharedAppState>,
    _: AuthClaims,
    Path(id): Path<api::ticket::Id>,
) -> Result<Json<api::Success>, DeleteTicketError> {
    use DeleteTicketError as E;

    if !state.db_client.delete_ticket(id).await? {
        return Err(E::TicketNotFound);
    }

    Ok(Json(api::Success { success: true }))
}

#[derive(Debug, From)]
pub enum DeleteTicketError {
    #[from]
    DbError(db::Error),
    TicketNotFound,
}

impl IntoResponse for DeleteTicketError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::TicketNotFound => {
                (StatusCode::NOT_FOUND, "ticket not found")
            }
            Self::DbError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "failed to delete ticket",
            ),
        };
        (
            status,
            Json(api::Error {
                error: message.to_owned(),
            }),
        )
            .into_response()
    }
}

#[derive(Deserialize)]
struct CheckoutInput {
    email: Option<String>,
}

#[derive(Serialize)]
struct CheckoutOutput {
    url: String,
}

async fn create_checkout(
    State(state): State<SharedAppState>,
    Json(CheckoutInput { email }): Json<CheckoutInput>,
) -> Result<Json<CheckoutOutput>, CheckoutError> {
    let url = state
        .payments
        .create_checkout_session(email.as_deref())
        .await?;

    Ok(Json(CheckoutOutput { url }))
}

#[derive(Debug, From)]
pub enum CheckoutError {
    #[from]
    Payment(payment::Error),
}

impl IntoResponse for CheckoutError {
    fn into_response(self) -> Response {
        let Self::Payment(_) = self;
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(api::Error {
                error: "payment session creation failed".to_owned(),
            }),
        )
            .into_response()
    }
}

#[derive(Deserialize)]
struct NotifyInput {
    email: Option<String>,
    status: Option<String>,
}

async fn notify(
    State(state): State<SharedAppState>,
    Json(NotifyInput { email, status }): Json<NotifyInput>,
) -> Result<Json<api::Success>, NotifyError> {
    use NotifyError as E;

    let email = email.filter(|e| !e.is_empty()).ok_or(E::MissingEmail)?;
    let status = status.filter(|s| !s.is_empty()).ok_or(E::MissingStatus)?;

    state.mailer.send_status_update(&email, &status).await?;

    Ok(Json(api::Success { success: true }))
}

#[derive(Debug, From)]
pub enum NotifyError {
    #[from]
    Mail(mail::Error),
    MissingEmail,
    MissingStatus,
}

impl IntoResponse for NotifyError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::MissingEmail => {
                (StatusCode::BAD_REQUEST, "missing email")
            }
            Self::MissingStatus => {
                (StatusCode::BAD_REQUEST, "missing status")
            }
            Self::Mail(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "failed to send email",
            ),
        };
        (
            status,
            Json(api::Error {
                error: message.to_owned(),
            }),
        )
            .into_response()
    }
}

type SharedAppState = Arc<AppState>;

struct AppState {
    db_client: db::Client,

    mailer: mail::Client,

    payments: payment::Client,

    uploads: storage::Store,

    admin_password: String,

    jwt_expiration_time: Duration,

    jwt_decoding_key: DecodingKey,

    jwt_encoding_key: EncodingKey,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct AuthClaims {
    exp: i64,
}

#[async_trait]
impl FromRequestParts<SharedAppState> for AuthClaims {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut request::Parts,
        state: &SharedAppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| AuthError::InvalidToken)?;
        let token_data = decode::<Self>(
            bearer.token(),
            &state.jwt_decoding_key,
            &Validation::default(),
        )
        .map_err(|_| AuthError::InvalidToken)?;

        Ok(token_data.claims)
    }
}
