//! Counters for one user and for a whole run
use std::fmt;

use chrono::{DateTime, Local};
use log::{info, warn};

use crate::labels::LabelOutcome;

/// Result of importing one user's archives
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserSummary {
    pub labels_created: usize,
    pub labels_skipped: usize,
    pub labels_failed: usize,
    pub messages_imported: usize,
    pub messages_failed: usize,
    /// Archives that could not be parsed
    pub archives_failed: usize,
}

impl UserSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_label(&mut self, outcome: &LabelOutcome) {
        match outcome {
            LabelOutcome::Found(_) => {}
            LabelOutcome::Created(_) => self.labels_created += 1,
            LabelOutcome::Skipped => self.labels_skipped += 1,
            LabelOutcome::Failed => self.labels_failed += 1,
        }
    }

    pub fn message_imported(&mut self) {
        self.messages_imported += 1;
    }

    pub fn message_failed(&mut self) {
        self.messages_failed += 1;
    }

    pub fn archive_failed(&mut self) {
        self.archives_failed += 1;
    }

    pub fn messages_attempted(&self) -> usize {
        self.messages_imported + self.messages_failed
    }

    pub fn add(&mut self, other: &UserSummary) {
        self.labels_created += other.labels_created;
        self.labels_skipped += other.labels_skipped;
        self.labels_failed += other.labels_failed;
        self.messages_imported += other.messages_imported;
        self.messages_failed += other.messages_failed;
        self.archives_failed += other.archives_failed;
    }
}

impl fmt::Display for UserSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Labels: {} created, {} skipped, {} failed. Messages: {} imported, {} failed.",
            self.labels_created,
            self.labels_skipped,
            self.labels_failed,
            self.messages_imported,
            self.messages_failed
        )?;
        if self.archives_failed > 0 {
            write!(f, " Unreadable archives: {}.", self.archives_failed)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub started_at: DateTime<Local>,
    pub users_processed: usize,
    pub users_failed: usize,
    pub failed_users: Vec<String>,
    pub totals: UserSummary,
}

impl RunSummary {
    pub fn new() -> Self {
        RunSummary {
            started_at: Local::now(),
            users_processed: 0,
            users_failed: 0,
            failed_users: Vec::new(),
            totals: UserSummary::new(),
        }
    }

    pub fn record_user(&mut self, summary: &UserSummary) {
        self.users_processed += 1;
        self.totals.add(summary);
    }

    pub fn record_failed_user(&mut self, user: &str) {
        self.users_failed += 1;
        self.failed_users.push(user.to_string());
    }

    pub fn has_failures(&self) -> bool {
        self.users_failed > 0
    }

    pub fn log(&self) {
        let elapsed = Local::now() - self.started_at;
        info!(
            "🏁 Import finished in {}s: {} user(s) processed. {}",
            elapsed.num_seconds(),
            self.users_processed,
            self.totals
        );

        if self.has_failures() {
            warn!(
                "{} user(s) failed: {}",
                self.users_failed,
                self.failed_users.join(", ")
            );
        } else {
            info!("0 users failed");
        }
    }
}

impl Default for RunSummary {
    fn default() -> Self {
        Self::new()
    }
}
