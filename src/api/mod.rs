pub mod ticket;

use serde::{Deserialize, Serialize};

pub use self::ticket::Ticket;

/// Generic error body: `{ "error": "..." }`.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Error {
    pub error: String,
}

/// Generic acknowledgement body: `{ "success": true }`.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct Success {
    pub success: bool,
}
