use std::io::Cursor;
use std::path::Path;

use futures::future::BoxFuture;
use futures::FutureExt;
use google_gmail1::api::{Label, Message, Scope};
use google_gmail1::{hyper, hyper_rustls, oauth2, Gmail};
use log::{debug, info};

use crate::error::{ImportError, RemoteError};
use crate::remote::{
    ConnectionProvider, LabelApi, LabelPage, LabelVisibility, MessageImporter, RemoteFuture,
    RemoteLabel,
};

type HttpsConnector = hyper_rustls::HttpsConnector<hyper::client::HttpConnector>;

/// Scopes granted to the service account through domain-wide delegation
const SCOPES: [&str; 2] = [
    "https://www.googleapis.com/auth/gmail.insert",
    "https://www.googleapis.com/auth/gmail.labels",
];

/// Opens Gmail connections impersonating each user with a service account key.
pub struct GmailConnector {
    key: oauth2::ServiceAccountKey,
}

impl GmailConnector {
    pub async fn from_credentials(path: &Path) -> Result<Self, ImportError> {
        info!("Reading service account key from {}", path.display());

        let key = oauth2::read_service_account_key(path).await.map_err(|e| {
            ImportError::Config(format!(
                "unable to read service account key {}: {}",
                path.display(),
                e
            ))
        })?;

        Ok(GmailConnector { key })
    }

    async fn open(&self, user: &str) -> Result<GmailClient, ImportError> {
        let auth_error = |reason: String| ImportError::Auth {
            user: user.to_string(),
            reason,
        };

        let auth = oauth2::ServiceAccountAuthenticator::builder(self.key.clone())
            .subject(user)
            .build()
            .await
            .map_err(|e| auth_error(format!("unable to create authenticator: {}", e)))?;

        // Fetch a token up front so bad credentials fail the user before any import
        auth.token(&SCOPES)
            .await
            .map_err(|e| auth_error(e.to_string()))?;

        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .map_err(|e| auth_error(format!("unable to load root certificates: {}", e)))?
            .https_or_http()
            .enable_http1()
            .build();

        let client = hyper::Client::builder().build(connector);
        let hub = Gmail::new(client, auth);

        info!("✅ Gmail API connection established for {}", user);

        Ok(GmailClient {
            hub,
            user_id: user.to_string(),
        })
    }
}

impl ConnectionProvider for GmailConnector {
    type Connection = GmailClient;

    fn connect<'a>(&'a self, user: &'a str) -> BoxFuture<'a, Result<GmailClient, ImportError>> {
        self.open(user).boxed()
    }
}

/// Gmail hub acting on behalf of one user.
pub struct GmailClient {
    hub: Gmail<HttpsConnector>,
    user_id: String,
}

impl GmailClient {
    async fn fetch_labels(&self, page_token: Option<&str>) -> Result<LabelPage, RemoteError> {
        // Gmail returns every label in a single response
        if let Some(token) = page_token {
            debug!("Ignoring label page token {}", token);
        }

        let (_, response) = self
            .hub
            .users()
            .labels_list(&self.user_id)
            .add_scope(Scope::Label)
            .doit()
            .await
            .map_err(remote_error)?;

        let labels = response
            .labels
            .unwrap_or_default()
            .into_iter()
            .filter_map(|label| {
                Some(RemoteLabel {
                    id: label.id?,
                    name: label.name?,
                })
            })
            .collect();

        Ok(LabelPage {
            labels,
            next_page_token: None,
        })
    }

    async fn insert_label(
        &self,
        name: &str,
        visibility: &LabelVisibility,
    ) -> Result<RemoteLabel, RemoteError> {
        let request = Label {
            name: Some(name.to_string()),
            message_list_visibility: Some(visibility.message_list.to_string()),
            label_list_visibility: Some(visibility.label_list.to_string()),
            ..Default::default()
        };

        let (_, label) = self
            .hub
            .users()
            .labels_create(request, &self.user_id)
            .add_scope(Scope::Label)
            .doit()
            .await
            .map_err(remote_error)?;

        let id = label
            .id
            .ok_or_else(|| RemoteError::new("label created without an id", None))?;

        Ok(RemoteLabel {
            id,
            name: label.name.unwrap_or_else(|| name.to_string()),
        })
    }

    async fn upload_message(&self, raw: &[u8], label_ids: &[String]) -> Result<String, RemoteError> {
        let request = Message {
            label_ids: Some(label_ids.to_vec()),
            ..Default::default()
        };
        let mime_type: mime::Mime = "message/rfc822"
            .parse()
            .map_err(|e: mime::FromStrError| RemoteError::new(e.to_string(), None))?;

        let (_, message) = self
            .hub
            .users()
            .messages_import(request, &self.user_id)
            .internal_date_source("dateHeader")
            .never_mark_spam(true)
            .add_scope(Scope::Insert)
            .upload(Cursor::new(raw.to_vec()), mime_type)
            .await
            .map_err(remote_error)?;

        Ok(message.id.unwrap_or_default())
    }
}

impl LabelApi for GmailClient {
    fn list_labels<'a>(&'a self, page_token: Option<&'a str>) -> RemoteFuture<'a, LabelPage> {
        self.fetch_labels(page_token).boxed()
    }

    fn create_label<'a>(
        &'a self,
        name: &'a str,
        visibility: &'a LabelVisibility,
    ) -> RemoteFuture<'a, RemoteLabel> {
        self.insert_label(name, visibility).boxed()
    }
}

impl MessageImporter for GmailClient {
    fn import_message<'a>(
        &'a self,
        raw: &'a [u8],
        label_ids: &'a [String],
    ) -> RemoteFuture<'a, String> {
        self.upload_message(raw, label_ids).boxed()
    }
}

/// Keep the service's status code and message when there is one.
fn remote_error(err: google_gmail1::Error) -> RemoteError {
    match err {
        google_gmail1::Error::BadRequest(value) => {
            let status = value["error"]["code"].as_u64().map(|code| code as u16);
            let message = value["error"]["message"]
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| value.to_string());
            RemoteError::new(message, status)
        }
        google_gmail1::Error::Failure(response) => {
            let status = response.status();
            RemoteError::new(format!("HTTP {}", status), Some(status.as_u16()))
        }
        other => RemoteError::new(other.to_string(), None),
    }
}
