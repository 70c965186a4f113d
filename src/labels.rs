//! Per-user label cache, seeded from the service and filled by creations.

use std::collections::HashMap;

use log::{debug, error, info, warn};

use crate::error::RemoteError;
use crate::remote::{LabelApi, LabelVisibility, RemoteLabel};
use crate::retry::{CallKind, RetryPolicy};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelOutcome {
    /// Already present on the service
    Found(String),
    Created(String),
    /// Name refused by the service
    Skipped,
    Failed,
}

impl LabelOutcome {
    pub fn label_id(&self) -> Option<&str> {
        match self {
            LabelOutcome::Found(id) | LabelOutcome::Created(id) => Some(id),
            LabelOutcome::Skipped | LabelOutcome::Failed => None,
        }
    }
}

/// Label ids keyed by lower-cased label name
#[derive(Debug, Clone, Default)]
pub struct LabelCache {
    /// Owner of the labels, empty for a cache not loaded from the service
    user: String,
    ids: HashMap<String, String>,
}

impl LabelCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch every page of the user's labels.
    pub async fn load<A: LabelApi + ?Sized>(
        api: &A,
        retry: &RetryPolicy,
        user: &str,
    ) -> Result<Self, RemoteError> {
        let mut cache = LabelCache {
            user: user.to_string(),
            ..LabelCache::default()
        };
        let mut page_token: Option<String> = None;

        loop {
            let token = page_token.as_deref();
            let page = retry
                .execute(CallKind::ListLabels, user, move || api.list_labels(token))
                .await?;
            cache.extend(page.labels);

            match page.next_page_token {
                Some(next) if !next.is_empty() => page_token = Some(next),
                _ => break,
            }
        }

        debug!("Loaded {} existing label(s) for {}", cache.len(), user);
        Ok(cache)
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.ids.get(&name.to_lowercase()).map(String::as_str)
    }

    pub fn insert(&mut self, name: &str, id: &str) {
        self.ids.insert(name.to_lowercase(), id.to_string());
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Find the label id for `name`, creating the label on a cache miss.
    pub async fn resolve<A: LabelApi + ?Sized>(
        &mut self,
        api: &A,
        retry: &RetryPolicy,
        name: &str,
    ) -> LabelOutcome {
        if let Some(id) = self.get(name) {
            debug!("Label '{}' already exists ({})", name, id);
            return LabelOutcome::Found(id.to_string());
        }

        let visibility = &LabelVisibility::SHOWN;
        let result = retry
            .execute(CallKind::CreateLabel, name, move || {
                api.create_label(name, visibility)
            })
            .await;

        match result {
            Ok(label) => {
                info!("✅ Created label '{}' ({})", name, label.id);
                self.insert(name, &label.id);
                self.insert(&label.name, &label.id);
                LabelOutcome::Created(label.id)
            }
            Err(err) if err.is_rejected_label_name() => {
                warn!("⚠️  Skipping label '{}': {}", name, err);
                LabelOutcome::Skipped
            }
            Err(err) if err.is_conflict() => self.recover_conflict(api, retry, name, &err).await,
            Err(err) => {
                error!("❌ Can't create label '{}': {}", name, err);
                LabelOutcome::Failed
            }
        }
    }

    /// The label exists remotely but was not listed when the cache was seeded.
    async fn recover_conflict<A: LabelApi + ?Sized>(
        &mut self,
        api: &A,
        retry: &RetryPolicy,
        name: &str,
        err: &RemoteError,
    ) -> LabelOutcome {
        debug!(
            "Label '{}' conflicts with an existing one, reloading labels of {}",
            name, self.user
        );

        let user = self.user.clone();
        match LabelCache::load(api, retry, &user).await {
            Ok(fresh) => *self = fresh,
            Err(reload_err) => {
                error!("❌ Can't create label '{}': {} (reload failed: {})", name, err, reload_err);
                return LabelOutcome::Failed;
            }
        }

        match self.get(name) {
            Some(id) => LabelOutcome::Found(id.to_string()),
            None => {
                error!("❌ Can't create label '{}': {}", name, err);
                LabelOutcome::Failed
            }
        }
    }
}

impl Extend<RemoteLabel> for LabelCache {
    fn extend<I: IntoIterator<Item = RemoteLabel>>(&mut self, labels: I) {
        for label in labels {
            self.insert(&label.name, &label.id);
        }
    }
}

impl FromIterator<RemoteLabel> for LabelCache {
    fn from_iter<I: IntoIterator<Item = RemoteLabel>>(labels: I) -> Self {
        let mut cache = LabelCache::new();
        cache.extend(labels);
        cache
    }
}
