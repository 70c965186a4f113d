use log::{debug, error, info};

use crate::archive::{list_archives, ArchiveDescriptor, MessageRecord};
use crate::config::RunConfig;
use crate::error::ImportError;
use crate::labels::LabelCache;
use crate::remote::{ConnectionProvider, LabelApi, MessageImporter};
use crate::retry::{CallKind, RetryPolicy};
use crate::users::{list_users, UserEntry};

use super::summary::{RunSummary, UserSummary};

/// State held while one user's archives are imported.
///
/// The connection belongs to this context only and is dropped with it.
pub struct UserContext<C> {
    pub user: UserEntry,
    connection: C,
    labels: LabelCache,
}

impl<C: LabelApi + MessageImporter> UserContext<C> {
    /// Seed the label cache from the user's existing labels.
    pub async fn open(user: UserEntry, connection: C, retry: &RetryPolicy) -> Result<Self, ImportError> {
        let labels = LabelCache::load(&connection, retry, &user.id).await?;

        Ok(UserContext {
            user,
            connection,
            labels,
        })
    }
}

/// Drives the import of every user found under the root directory.
pub struct MailboxImporter<P: ConnectionProvider> {
    config: RunConfig,
    provider: P,
    retry: RetryPolicy,
}

impl<P: ConnectionProvider> MailboxImporter<P> {
    pub fn new(config: RunConfig, provider: P) -> Self {
        let retry = RetryPolicy::new(config.num_retries);
        MailboxImporter {
            config,
            provider,
            retry,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Import every user, one at a time. A failing user is counted and the
    /// next one proceeds.
    pub async fn run(&self) -> Result<RunSummary, ImportError> {
        let users = list_users(&self.config.root_dir)
            .map_err(|e| ImportError::Config(e.to_string()))?;

        info!(
            "Found {} user directory(ies) in {}",
            users.len(),
            self.config.root_dir.display()
        );

        let mut run = RunSummary::new();

        for user in &users {
            info!("📬 Processing user {}", user.id);

            match self.process_user(user).await {
                Ok(summary) => {
                    info!("✅ Done importing user {}. {}", user.id, summary);
                    run.record_user(&summary);
                }
                Err(e) => {
                    error!("❌ Could not process user {}: {}", user.id, e);
                    run.record_failed_user(&user.id);
                }
            }
        }

        run.log();
        Ok(run)
    }

    /// Import all archives of one user.
    pub async fn process_user(&self, user: &UserEntry) -> Result<UserSummary, ImportError> {
        let connection = self.provider.connect(&user.id).await?;
        let mut context = UserContext::open(user.clone(), connection, &self.retry).await?;

        let archives = list_archives(&user.path)?;
        if archives.is_empty() {
            info!("No archive found for user {}", user.id);
        }

        let mut summary = UserSummary::new();
        for archive in &archives {
            self.process_archive(&mut context, archive, &mut summary).await;
        }

        debug!("Closing connection for user {}", context.user.id);
        Ok(summary)
    }

    async fn process_archive(
        &self,
        context: &mut UserContext<P::Connection>,
        archive: &ArchiveDescriptor,
        summary: &mut UserSummary,
    ) {
        info!(
            "Processing archive {} as label '{}'",
            archive.path.display(),
            archive.label_name
        );

        let outcome = context
            .labels
            .resolve(&context.connection, &self.retry, &archive.label_name)
            .await;
        summary.record_label(&outcome);

        // No label, no import
        let Some(label_id) = outcome.label_id() else {
            return;
        };
        let label_ids = vec![label_id.to_string()];

        let records = match archive.messages() {
            Ok(records) => records,
            Err(e) => {
                error!("❌ {}", e);
                summary.archive_failed();
                return;
            }
        };

        self.import_records(&context.connection, archive, records, &label_ids, summary)
            .await;
    }

    /// Import records in order until the sequence ends or fails to read.
    async fn import_records<C, I>(
        &self,
        connection: &C,
        archive: &ArchiveDescriptor,
        records: I,
        label_ids: &[String],
        summary: &mut UserSummary,
    ) where
        C: MessageImporter + ?Sized,
        I: IntoIterator<Item = Result<MessageRecord, ImportError>>,
    {
        let options = self.config.normalize_options();
        let mut skipped = 0;

        for record in records {
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    error!("❌ {}", e);
                    summary.archive_failed();
                    break;
                }
            };

            if record.index < self.config.from_message {
                skipped += 1;
                continue;
            }

            let record = record.normalized(options);
            self.import_record(connection, archive, &record, label_ids, summary)
                .await;
        }

        if skipped > 0 {
            debug!(
                "Skipped the first {} message(s) of {}",
                skipped,
                archive.path.display()
            );
        }
    }

    async fn import_record<C: MessageImporter + ?Sized>(
        &self,
        connection: &C,
        archive: &ArchiveDescriptor,
        record: &MessageRecord,
        label_ids: &[String],
        summary: &mut UserSummary,
    ) {
        let description = record.describe();
        let raw = record.raw();

        let result = self
            .retry
            .execute(CallKind::ImportMessage, &description, move || {
                connection.import_message(raw, label_ids)
            })
            .await;

        match result {
            Ok(message_id) => {
                debug!("Imported message {} as {}", description, message_id);
                summary.message_imported();
            }
            Err(e) => {
                error!(
                    "❌ Failed to import message {} from {}: {}",
                    description,
                    archive.path.display(),
                    e
                );
                summary.message_failed();
            }
        }
    }
}
