use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tempfile::TempDir;
use tokio_test::assert_ok;

use mailbox_import::remote::{
    ConnectionProvider, LabelApi, LabelPage, LabelVisibility, MessageImporter, RemoteFuture,
    RemoteLabel,
};
use mailbox_import::retry::RetryPolicy;
use mailbox_import::{ImportError, MailboxImporter, RemoteError, RunConfig, UserSummary};

const USER: &str = "testuser@example.com";

const TWO_MESSAGES: &str = "From alice@example.com Thu Jan  1 10:00:00 2015\n\
From: Alice <alice@example.com>\n\
Subject: First\n\
Message-ID: first@example.com\n\
Content-Type: text/quoted-printable\n\
\n\
Caf=C3=A9\n\
\n\
From bob@example.com Fri Jan  2 11:30:00 2015\n\
From: Bob <bob@example.com>\n\
Subject: Second\n\
Message-ID: <second@example.com>\n\
\n\
Hello\n";

/// In-memory stand-in for the Gmail service, shared by every connection.
#[derive(Default)]
struct ServiceState {
    existing_labels: Vec<RemoteLabel>,
    create_error: Option<RemoteError>,
    /// Number of import attempts that fail before imports start succeeding
    failing_imports: usize,
    import_always_fails: bool,
    unauthorized_users: Vec<String>,
    /// Users whose label listing always fails
    unlistable_users: Vec<String>,

    connections: Vec<String>,
    list_attempts: usize,
    create_attempts: usize,
    created: Vec<String>,
    import_attempts: usize,
    imported: Vec<(String, Vec<String>)>,
}

#[derive(Clone, Default)]
struct FakeGmail {
    state: Arc<Mutex<ServiceState>>,
}

impl FakeGmail {
    fn with(configure: impl FnOnce(&mut ServiceState)) -> Self {
        let fake = FakeGmail::default();
        configure(&mut fake.state.lock().unwrap());
        fake
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ServiceState> {
        self.state.lock().unwrap()
    }
}

struct FakeConnection {
    user: String,
    state: Arc<Mutex<ServiceState>>,
}

impl ConnectionProvider for FakeGmail {
    type Connection = FakeConnection;

    fn connect<'a>(&'a self, user: &'a str) -> BoxFuture<'a, Result<FakeConnection, ImportError>> {
        let mut state = self.state.lock().unwrap();
        state.connections.push(user.to_string());
        let result = if state.unauthorized_users.iter().any(|u| u == user) {
            Err(ImportError::Auth {
                user: user.to_string(),
                reason: "invalid_grant".to_string(),
            })
        } else {
            Ok(FakeConnection {
                user: user.to_string(),
                state: self.state.clone(),
            })
        };
        async move { result }.boxed()
    }
}

impl LabelApi for FakeConnection {
    fn list_labels<'a>(&'a self, _page_token: Option<&'a str>) -> RemoteFuture<'a, LabelPage> {
        let mut state = self.state.lock().unwrap();
        state.list_attempts += 1;
        let result = if state.unlistable_users.contains(&self.user) {
            Err(RemoteError::new("Backend Error", Some(500)))
        } else {
            Ok(LabelPage {
                labels: state.existing_labels.clone(),
                next_page_token: None,
            })
        };
        async move { result }.boxed()
    }

    fn create_label<'a>(
        &'a self,
        name: &'a str,
        visibility: &'a LabelVisibility,
    ) -> RemoteFuture<'a, RemoteLabel> {
        assert_eq!(visibility, &LabelVisibility::SHOWN);
        let mut state = self.state.lock().unwrap();
        state.create_attempts += 1;
        let result = match &state.create_error {
            Some(err) => Err(err.clone()),
            None => {
                state.created.push(name.to_string());
                Ok(RemoteLabel {
                    id: format!("Label_{}", state.created.len()),
                    name: name.to_string(),
                })
            }
        };
        async move { result }.boxed()
    }
}

impl MessageImporter for FakeConnection {
    fn import_message<'a>(
        &'a self,
        raw: &'a [u8],
        label_ids: &'a [String],
    ) -> RemoteFuture<'a, String> {
        let mut state = self.state.lock().unwrap();
        state.import_attempts += 1;
        let result = if state.import_always_fails || state.failing_imports > 0 {
            state.failing_imports = state.failing_imports.saturating_sub(1);
            Err(RemoteError::new("Backend Error", Some(503)))
        } else {
            state
                .imported
                .push((String::from_utf8_lossy(raw).into_owned(), label_ids.to_vec()));
            Ok(format!("msg-{}", state.imported.len()))
        };
        async move { result }.boxed()
    }
}

struct Fixture {
    root: TempDir,
}

impl Fixture {
    fn new() -> Self {
        Fixture {
            root: tempfile::tempdir().unwrap(),
        }
    }

    fn user_dir(&self, user: &str) -> PathBuf {
        let dir = self.root.path().join(user);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn archive(&self, user: &str, name: &str, content: &str) -> PathBuf {
        let path = self.user_dir(user).join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn config(&self) -> RunConfig {
        RunConfig::new(self.root.path(), self.root.path().join("credentials.json"))
    }
}

fn importer(config: RunConfig, fake: &FakeGmail, attempts: u32) -> MailboxImporter<FakeGmail> {
    MailboxImporter::new(config, fake.clone()).with_retry_policy(
        RetryPolicy::new(attempts)
            .with_initial_delay(Duration::ZERO)
            .with_jitter(false),
    )
}

async fn import_user(config: RunConfig, fake: &FakeGmail, attempts: u32) -> UserSummary {
    let run = assert_ok!(importer(config, fake, attempts).run().await);
    assert_eq!(run.users_failed, 0);
    assert_eq!(run.users_processed, 1);
    run.totals
}

fn subjects(fake: &FakeGmail) -> Vec<String> {
    fake.state()
        .imported
        .iter()
        .filter_map(|(raw, _)| {
            raw.lines()
                .find_map(|line| line.strip_prefix("Subject: ").map(str::to_string))
        })
        .collect()
}

#[tokio::test]
async fn test_new_label_and_two_messages() {
    let fixture = Fixture::new();
    fixture.archive(USER, "Test Import.mbox", TWO_MESSAGES);
    let fake = FakeGmail::default();

    let summary = import_user(fixture.config(), &fake, 3).await;

    assert_eq!(summary.labels_created, 1);
    assert_eq!(summary.messages_imported, 2);
    assert_eq!(summary.messages_failed, 0);

    let state = fake.state();
    assert_eq!(state.connections, vec![USER.to_string()]);
    assert_eq!(state.created, vec!["Test Import".to_string()]);
    assert_eq!(state.imported.len(), 2);
    assert!(state
        .imported
        .iter()
        .all(|(_, labels)| labels == &vec!["Label_1".to_string()]));
}

#[tokio::test]
async fn test_label_creation_always_fails() {
    let fixture = Fixture::new();
    fixture.archive(USER, "Test Import.mbox", TWO_MESSAGES);
    let fake = FakeGmail::with(|s| s.create_error = Some(RemoteError::new("Backend Error", Some(500))));

    let summary = import_user(fixture.config(), &fake, 3).await;

    assert_eq!(summary.labels_created, 0);
    assert_eq!(summary.labels_failed, 1);
    assert_eq!(summary.messages_imported, 0);
    assert_eq!(summary.messages_failed, 0);

    let state = fake.state();
    assert_eq!(state.create_attempts, 3);
    assert_eq!(state.import_attempts, 0);
}

#[tokio::test]
async fn test_message_import_always_fails() {
    let fixture = Fixture::new();
    fixture.archive(USER, "Test Import.mbox", TWO_MESSAGES);
    let fake = FakeGmail::with(|s| s.import_always_fails = true);

    let summary = import_user(fixture.config(), &fake, 2).await;

    assert_eq!(summary.labels_created, 1);
    assert_eq!(summary.messages_imported, 0);
    assert_eq!(summary.messages_failed, 2);
    assert_eq!(fake.state().import_attempts, 4);
}

#[tokio::test]
async fn test_from_message_skips_earlier_messages() {
    let fixture = Fixture::new();
    fixture.archive(USER, "Test Import.mbox", TWO_MESSAGES);
    let fake = FakeGmail::default();
    let mut config = fixture.config();
    config.from_message = 1;

    let summary = import_user(config, &fake, 3).await;

    assert_eq!(summary.messages_imported, 1);
    assert_eq!(summary.messages_failed, 0);
    assert_eq!(fake.state().import_attempts, 1);
    assert_eq!(subjects(&fake), vec!["Second".to_string()]);
}

#[tokio::test]
async fn test_from_message_past_the_end() {
    let fixture = Fixture::new();
    fixture.archive(USER, "Test Import.mbox", TWO_MESSAGES);
    let fake = FakeGmail::default();
    let mut config = fixture.config();
    config.from_message = 10;

    let summary = import_user(config, &fake, 3).await;

    assert_eq!(summary.labels_created, 1);
    assert_eq!(summary.messages_attempted(), 0);
}

#[tokio::test]
async fn test_existing_label_matches_case_insensitively() {
    let fixture = Fixture::new();
    fixture.archive(USER, "Test Import.mbox", TWO_MESSAGES);
    let fake = FakeGmail::with(|s| {
        s.existing_labels = vec![RemoteLabel {
            id: "Label_42".to_string(),
            name: "test import".to_string(),
        }]
    });

    let summary = import_user(fixture.config(), &fake, 3).await;

    assert_eq!(summary.labels_created, 0);
    assert_eq!(summary.messages_imported, 2);

    let state = fake.state();
    assert_eq!(state.create_attempts, 0);
    assert!(state
        .imported
        .iter()
        .all(|(_, labels)| labels == &vec!["Label_42".to_string()]));
}

#[tokio::test]
async fn test_rejected_label_is_skipped() {
    let fixture = Fixture::new();
    fixture.archive(USER, "INBOX.mbox", TWO_MESSAGES);
    let fake = FakeGmail::with(|s| s.create_error = Some(RemoteError::new("Invalid label name", Some(400))));

    let summary = import_user(fixture.config(), &fake, 1).await;

    assert_eq!(summary.labels_skipped, 1);
    assert_eq!(summary.labels_failed, 0);
    assert_eq!(summary.messages_imported, 0);
    assert_eq!(summary.messages_failed, 0);
    assert_eq!(fake.state().import_attempts, 0);
}

#[tokio::test]
async fn test_same_label_from_two_archives_created_once() {
    let fixture = Fixture::new();
    fixture.archive(USER, "Work.mbox", TWO_MESSAGES);
    let bundle = fixture.user_dir(USER).join("WORK.mbox");
    fs::create_dir(&bundle).unwrap();
    fs::write(bundle.join("mbox"), TWO_MESSAGES).unwrap();
    let fake = FakeGmail::default();

    let summary = import_user(fixture.config(), &fake, 1).await;

    assert_eq!(summary.labels_created, 1);
    assert_eq!(summary.messages_imported, 4);
    assert_eq!(fake.state().created.len(), 1);
}

#[tokio::test]
async fn test_normalization_enabled() {
    let fixture = Fixture::new();
    fixture.archive(USER, "Test Import.mbox", TWO_MESSAGES);
    let fake = FakeGmail::default();
    let mut config = fixture.config();
    config.fix_msgid = true;
    config.replace_quoted_printable = true;

    import_user(config, &fake, 1).await;

    let state = fake.state();
    let first = &state.imported[0].0;
    assert!(first.contains("Message-ID: <first@example.com>\n"));
    assert!(first.contains("Content-Type: text/plain\n"));
    assert!(first.contains("Caf=C3=A9"));
    let second = &state.imported[1].0;
    assert!(second.contains("Message-ID: <second@example.com>\n"));
}

#[tokio::test]
async fn test_normalization_disabled() {
    let fixture = Fixture::new();
    fixture.archive(USER, "Test Import.mbox", TWO_MESSAGES);
    let fake = FakeGmail::default();

    import_user(fixture.config(), &fake, 1).await;

    let state = fake.state();
    let first = &state.imported[0].0;
    assert!(first.contains("Message-ID: first@example.com\n"));
    assert!(first.contains("Content-Type: text/quoted-printable\n"));
}

#[tokio::test]
async fn test_transient_import_errors_are_retried() {
    let fixture = Fixture::new();
    fixture.archive(USER, "Test Import.mbox", TWO_MESSAGES);
    let fake = FakeGmail::with(|s| s.failing_imports = 2);

    let summary = import_user(fixture.config(), &fake, 3).await;

    assert_eq!(summary.messages_imported, 2);
    assert_eq!(summary.messages_failed, 0);
    assert_eq!(fake.state().import_attempts, 4);
    assert_eq!(subjects(&fake), vec!["First".to_string(), "Second".to_string()]);
}

#[tokio::test]
async fn test_failed_user_does_not_stop_the_run() {
    let fixture = Fixture::new();
    fixture.archive("a-broken@example.com", "Inbox.mbox", TWO_MESSAGES);
    fixture.archive("b-good@example.com", "Inbox.mbox", TWO_MESSAGES);
    let fake = FakeGmail::with(|s| s.unauthorized_users = vec!["a-broken@example.com".to_string()]);

    let run = assert_ok!(importer(fixture.config(), &fake, 1).run().await);

    assert_eq!(run.users_failed, 1);
    assert_eq!(run.failed_users, vec!["a-broken@example.com".to_string()]);
    assert_eq!(run.users_processed, 1);
    assert_eq!(run.totals.messages_imported, 2);
    assert_eq!(
        fake.state().connections,
        vec!["a-broken@example.com".to_string(), "b-good@example.com".to_string()]
    );
}

#[tokio::test]
async fn test_label_listing_failure_fails_the_user() {
    let fixture = Fixture::new();
    fixture.archive(USER, "Test Import.mbox", TWO_MESSAGES);
    let fake = FakeGmail::with(|s| s.unlistable_users = vec![USER.to_string()]);

    let run = assert_ok!(importer(fixture.config(), &fake, 3).run().await);

    assert_eq!(run.users_failed, 1);
    assert_eq!(run.users_processed, 0);
    assert_eq!(run.totals, UserSummary::default());

    let state = fake.state();
    assert_eq!(state.list_attempts, 3);
    assert_eq!(state.create_attempts, 0);
    assert_eq!(state.import_attempts, 0);
}

#[tokio::test]
async fn test_label_listing_failure_does_not_stop_the_run() {
    let fixture = Fixture::new();
    fixture.archive("a-unlistable@example.com", "Inbox.mbox", TWO_MESSAGES);
    fixture.archive("b-good@example.com", "Inbox.mbox", TWO_MESSAGES);
    let fake = FakeGmail::with(|s| s.unlistable_users = vec!["a-unlistable@example.com".to_string()]);

    let run = assert_ok!(importer(fixture.config(), &fake, 2).run().await);

    assert_eq!(run.users_failed, 1);
    assert_eq!(run.failed_users, vec!["a-unlistable@example.com".to_string()]);
    assert_eq!(run.users_processed, 1);
    assert_eq!(run.totals.labels_created, 1);
    assert_eq!(run.totals.messages_imported, 2);

    // two attempts for the failing user, one for the next
    let state = fake.state();
    assert_eq!(state.list_attempts, 3);
    assert_eq!(state.create_attempts, 1);
    assert_eq!(state.import_attempts, 2);
}

#[tokio::test]
async fn test_unparsable_archive_is_counted_and_skipped() {
    let fixture = Fixture::new();
    fixture.archive(USER, "Broken.mbox", "this is not\nan mbox file\n");
    fixture.archive(USER, "Good.mbox", TWO_MESSAGES);
    let fake = FakeGmail::default();

    let summary = import_user(fixture.config(), &fake, 1).await;

    assert_eq!(summary.archives_failed, 1);
    assert_eq!(summary.messages_imported, 2);
    assert_eq!(summary.messages_failed, 0);
}

#[tokio::test]
async fn test_user_without_archives() {
    let fixture = Fixture::new();
    fixture.user_dir(USER);
    fixture.archive(USER, "readme.txt", "nothing to see");
    let fake = FakeGmail::default();

    let summary = import_user(fixture.config(), &fake, 1).await;

    assert_eq!(summary, UserSummary::default());
}

#[tokio::test]
async fn test_empty_root() {
    let fixture = Fixture::new();
    let fake = FakeGmail::default();

    let run = assert_ok!(importer(fixture.config(), &fake, 1).run().await);

    assert_eq!(run.users_processed, 0);
    assert_eq!(run.users_failed, 0);
    assert!(fake.state().connections.is_empty());
}

#[tokio::test]
async fn test_sample_archive_fixture() {
    let fixture = Fixture::new();
    let sample = fs::read_to_string(Path::new("data_test/sample.mbox"))
        .expect("Failed to read test archive data_test/sample.mbox");
    fixture.archive(USER, "Reports.mbox", &sample);
    let fake = FakeGmail::default();
    let mut config = fixture.config();
    config.fix_msgid = true;
    config.replace_quoted_printable = true;

    let summary = import_user(config, &fake, 1).await;

    assert_eq!(summary.labels_created, 1);
    assert_eq!(summary.messages_imported, 2);

    let state = fake.state();
    assert_eq!(state.created, vec!["Reports".to_string()]);
    assert!(state.imported[0].0.contains("Message-ID: <report-2015-01@example.com>"));
    assert!(state.imported[0].0.contains("Content-Type: text/plain; charset=\"utf-8\""));
    assert!(state.imported[1].0.contains("From now on, lunch is at noon."));
}
