//! Transactional-email client for ticket status notifications.

use async_trait::async_trait;
use derive_more::From;
use serde_json::json;

use crate::{config, workflow};

const API_URL: &str = "https://api.resend.com/emails";

const SUBJECT: &str = "Your Ticket Status Has Been Updated";

pub struct Client {
    http: reqwest::Client,
    api_key: String,
    from: String,
}

impl Client {
    pub fn new(config: config::Mail) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: config.api_key,
            from: config.from,
        }
    }

    pub async fn send_status_update(
        &self,
        to: &str,
        status: &str,
    ) -> Result<(), Error> {
        let res = self
            .http
            .post(API_URL)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "from": self.from,
                "to": [to],
                "subject": SUBJECT,
                "html": status_update_html(status),
            }))
            .send()
            .await?;

        if !res.status().is_success() {
            return Err(Error::Api {
                status: res.status().as_u16(),
            });
        }

        Ok(())
    }
}

#[async_trait]
impl workflow::Notifier for Client {
    async fn send_status_update(
        &self,
        to: &str,
        status: &str,
    ) -> Result<(), Error> {
        Client::send_status_update(self, to, status).await
    }
}

#[derive(Debug, From)]
pub enum Error {
    #[from]
    Http(reqwest::Error),
    Api {
        status: u16,
    },
}

/// Status values come from admin input and from the store, so they are
/// escaped before being embedded into the HTML body.
fn status_update_html(status: &str) -> String {
    let status = escape_html(status);
    format!(
        "<html>\
           <body style=\"font-family: sans-serif; color: #333;\">\
             <p>Hello,</p>\
             <p>Your parking ticket status has been updated to: \
                <strong>{status}</strong>.</p>\
             <p>If you have any questions, feel free to reply to \
                this email.</p>\
             <p>Thank you,<br/>The TicketSolver Team</p>\
           </body>\
         </html>"
    )
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
