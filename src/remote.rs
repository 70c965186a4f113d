//! Narrow interfaces over the remote mailbox service.
//!
//! Each capability is its own trait so tests can substitute in-memory fakes
//! for the Gmail hub.

use futures::future::BoxFuture;

use crate::error::{ImportError, RemoteError};

pub type RemoteFuture<'a, T> = BoxFuture<'a, Result<T, RemoteError>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLabel {
    pub id: String,
    pub name: String,
}

/// One page of a label listing
#[derive(Debug, Clone, Default)]
pub struct LabelPage {
    pub labels: Vec<RemoteLabel>,
    pub next_page_token: Option<String>,
}

/// Visibility settings sent along with a label creation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelVisibility {
    pub message_list: &'static str,
    pub label_list: &'static str,
}

impl LabelVisibility {
    /// Shown in the message list and in the label list.
    pub const SHOWN: LabelVisibility = LabelVisibility {
        message_list: "show",
        label_list: "labelShow",
    };
}

pub trait LabelApi: Send + Sync {
    fn list_labels<'a>(&'a self, page_token: Option<&'a str>) -> RemoteFuture<'a, LabelPage>;

    fn create_label<'a>(
        &'a self,
        name: &'a str,
        visibility: &'a LabelVisibility,
    ) -> RemoteFuture<'a, RemoteLabel>;
}

pub trait MessageImporter: Send + Sync {
    /// Import one raw RFC 5322 message, returning the id assigned by the service
    fn import_message<'a>(
        &'a self,
        raw: &'a [u8],
        label_ids: &'a [String],
    ) -> RemoteFuture<'a, String>;
}

/// Opens a connection acting on behalf of one user.
pub trait ConnectionProvider: Send + Sync {
    type Connection: LabelApi + MessageImporter;

    fn connect<'a>(&'a self, user: &'a str) -> BoxFuture<'a, Result<Self::Connection, ImportError>>;
}
