//! Profile capture gate — the one-time, first-run-only profile form.
//!
//! Engaged only for a freshly generated identity. The form is an injected
//! capability ([`ProfileForm`]) that resolves to a single submission of
//! named field values. On submit the `age`, `gender` and `country` fields
//! are copied onto the record and the record is persisted before launch.
//!
//! No field is required: a blank or missing field is stored as `""`.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bootstrap::{BootState, Bootstrap};
use crate::console::prompt;
use crate::error::AppError;
use crate::record::IdentityRecord;
use crate::store::IdentityStore;

pub const AGE_FIELD: &str = "age";
pub const GENDER_FIELD: &str = "gender";
pub const COUNTRY_FIELD: &str = "country";

// ── FormData / ProfileFields ─────────────────────────────────────────────────

/// Named field values captured at submit time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormData {
    fields: HashMap<String, String>,
}

impl FormData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Value of `name`, or `""` when the field was never filled.
    pub fn field(&self, name: &str) -> &str {
        self.fields.get(name).map(String::as_str).unwrap_or_default()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FormData {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut data = Self::new();
        for (k, v) in iter {
            data.insert(k, v);
        }
        data
    }
}

/// The supplementary profile fields collected by the form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileFields {
    pub age: String,
    pub gender: String,
    pub country: String,
}

impl ProfileFields {
    pub fn from_form(data: &FormData) -> Self {
        Self {
            age: data.field(AGE_FIELD).to_string(),
            gender: data.field(GENDER_FIELD).to_string(),
            country: data.field(COUNTRY_FIELD).to_string(),
        }
    }

    pub fn apply(self, record: &mut IdentityRecord) {
        record.age = Some(self.age);
        record.gender = Some(self.gender);
        record.country = Some(self.country);
    }
}

// ── ProfileForm ──────────────────────────────────────────────────────────────

pub type FormFuture<'a> = Pin<Box<dyn Future<Output = Option<FormData>> + Send + 'a>>;

/// A form that can be submitted once.
///
/// `submission` resolves when the user submits, or to `None` if the form
/// can no longer be submitted (closed input, dropped handle, second call).
pub trait ProfileForm: Send {
    fn id(&self) -> &str;

    fn submission(&mut self) -> FormFuture<'_>;
}

/// Form fed by a [`FormHandle`], the submit handler of an external UI.
pub struct ChannelForm {
    id: String,
    rx: Option<oneshot::Receiver<FormData>>,
}

/// Submit side of a [`ChannelForm`]. Consumed by [`FormHandle::submit`], so
/// it fires at most once.
pub struct FormHandle {
    tx: oneshot::Sender<FormData>,
}

impl FormHandle {
    /// Returns `false` if the form is no longer listening.
    pub fn submit(self, data: FormData) -> bool {
        self.tx.send(data).is_ok()
    }
}

pub fn channel_form(id: impl Into<String>) -> (ChannelForm, FormHandle) {
    let (tx, rx) = oneshot::channel();
    (ChannelForm { id: id.into(), rx: Some(rx) }, FormHandle { tx })
}

impl ProfileForm for ChannelForm {
    fn id(&self) -> &str {
        &self.id
    }

    fn submission(&mut self) -> FormFuture<'_> {
        let rx = self.rx.take();
        Box::pin(async move {
            match rx {
                Some(rx) => rx.await.ok(),
                None => None,
            }
        })
    }
}

/// Line-oriented form: prompts each field and reads one line per answer.
/// Answers are stored exactly as typed, minus the line terminator.
///
/// Used by the binary on stdin. Hand the reader on with
/// [`TerminalForm::into_lines`] once the form is done.
pub struct TerminalForm<R> {
    lines: Lines<R>,
}

impl<R: AsyncBufRead + Unpin + Send> TerminalForm<R> {
    pub fn new(reader: R) -> Self {
        Self { lines: reader.lines() }
    }

    pub fn into_lines(self) -> Lines<R> {
        self.lines
    }

    async fn ask(&mut self, label: &str) -> Option<String> {
        prompt(&format!("{label}: "));

        match self.lines.next_line().await {
            Ok(Some(line)) => Some(line),
            Ok(None) => {
                info!("form input closed");
                None
            }
            Err(e) => {
                warn!("form read error: {e}");
                None
            }
        }
    }
}

impl<R: AsyncBufRead + Unpin + Send> ProfileForm for TerminalForm<R> {
    fn id(&self) -> &str {
        "terminal"
    }

    fn submission(&mut self) -> FormFuture<'_> {
        Box::pin(async move {
            println!("─────────────────────────────────");
            println!(" New player — tell us about you");
            println!(" (press Enter to skip a field)");
            println!("─────────────────────────────────");
            let mut data = FormData::new();
            for (field, label) in [(AGE_FIELD, "Age"), (GENDER_FIELD, "Gender"), (COUNTRY_FIELD, "Country")] {
                let value = self.ask(label).await?;
                data.insert(field, value);
            }
            Some(data)
        })
    }
}

// ── capture ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    /// Launch the application with this record.
    Launch(IdentityRecord),
    /// The form was closed or shutdown was requested before submission.
    Abandoned,
}

/// Run the gate for a resolved identity.
///
/// - `Ready` records skip the form entirely.
/// - Fresh records wait for `form` to be submitted, then persist.
/// - With no form available the fresh record launches unpersisted; the
///   application's first write-back stores it.
///
/// A failed save is logged and does not block launch.
pub async fn capture(
    bootstrap: Bootstrap,
    form: Option<&mut dyn ProfileForm>,
    store: &IdentityStore,
    shutdown: &CancellationToken,
) -> Result<GateOutcome, AppError> {
    let mut record = match bootstrap {
        Bootstrap::Ready(record) => {
            debug!("existing identity, profile form skipped");
            return Ok(GateOutcome::Launch(record));
        }
        Bootstrap::AwaitingProfile(record) => record,
    };

    let Some(form) = form else {
        warn!(player_id = %record.player_id, "profile form unavailable, launching with unsaved identity");
        return Ok(GateOutcome::Launch(record));
    };

    debug!(state = %BootState::AwaitingProfile, form = %form.id(), "waiting for profile form");

    let submitted = tokio::select! {
        biased;

        _ = shutdown.cancelled() => {
            info!("shutdown before profile form was submitted");
            None
        }

        data = form.submission() => data,
    };

    let Some(data) = submitted else {
        return Ok(GateOutcome::Abandoned);
    };

    ProfileFields::from_form(&data).apply(&mut record);
    match store.save(&record.to_json()?) {
        Ok(()) => info!(player_id = %record.player_id, "profile captured"),
        Err(e) => warn!(player_id = %record.player_id, "profile captured but not saved: {e}"),
    }

    Ok(GateOutcome::Launch(record))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::store::{KvStore, MemoryKvStore};

    fn fresh() -> Bootstrap {
        Bootstrap::AwaitingProfile(IdentityRecord::new("1-2-3-4", "Guest 3F2"))
    }

    fn store() -> (Arc<MemoryKvStore>, IdentityStore) {
        let kv = Arc::new(MemoryKvStore::new());
        (kv.clone(), IdentityStore::new(kv, "user"))
    }

    #[test]
    fn missing_fields_read_as_empty() {
        let data = FormData::new().with(AGE_FIELD, "29");
        let fields = ProfileFields::from_form(&data);
        assert_eq!(fields.age, "29");
        assert_eq!(fields.gender, "");
        assert_eq!(fields.country, "");
    }

    #[tokio::test]
    async fn submit_persists_profile() {
        let (kv, store) = store();
        let (mut form, handle) = channel_form("form");
        assert!(handle.submit(
            [(AGE_FIELD, "29"), (GENDER_FIELD, "F"), (COUNTRY_FIELD, "NZ")].into_iter().collect()
        ));

        let outcome = capture(fresh(), Some(&mut form), &store, &CancellationToken::new())
            .await
            .unwrap();

        let GateOutcome::Launch(record) = outcome else { panic!("expected launch") };
        assert_eq!(record.age.as_deref(), Some("29"));
        assert_eq!(record.gender.as_deref(), Some("F"));
        assert_eq!(record.country.as_deref(), Some("NZ"));
        let saved = IdentityRecord::parse(&kv.get("user").unwrap().unwrap()).unwrap();
        assert_eq!(saved, record);
    }

    #[tokio::test]
    async fn empty_submission_is_accepted() {
        let (kv, store) = store();
        let (mut form, handle) = channel_form("form");
        handle.submit(FormData::new());
        let outcome = capture(fresh(), Some(&mut form), &store, &CancellationToken::new())
            .await
            .unwrap();
        let GateOutcome::Launch(record) = outcome else { panic!("expected launch") };
        assert_eq!(record.age.as_deref(), Some(""));
        assert!(kv.get("user").unwrap().is_some());
    }

    #[tokio::test]
    async fn ready_identity_skips_form() {
        let (kv, store) = store();
        let (mut form, _handle) = channel_form("form");
        let record = IdentityRecord::new("a-b-c-d", "Guest 3F2");
        let outcome = capture(Bootstrap::Ready(record.clone()), Some(&mut form), &store, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, GateOutcome::Launch(record));
        assert_eq!(kv.get("user").unwrap(), None);
    }

    #[tokio::test]
    async fn missing_form_launches_unsaved() {
        let (kv, store) = store();
        let outcome = capture(fresh(), None, &store, &CancellationToken::new()).await.unwrap();
        assert!(matches!(outcome, GateOutcome::Launch(_)));
        assert_eq!(kv.get("user").unwrap(), None);
    }

    #[tokio::test]
    async fn dropped_handle_abandons() {
        let (kv, store) = store();
        let (mut form, handle) = channel_form("form");
        drop(handle);
        let outcome = capture(fresh(), Some(&mut form), &store, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, GateOutcome::Abandoned);
        assert_eq!(kv.get("user").unwrap(), None);
    }

    #[tokio::test]
    async fn shutdown_abandons_pending_form() {
        let (_, store) = store();
        let (mut form, _handle) = channel_form("form");
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let outcome = capture(fresh(), Some(&mut form), &store, &shutdown).await.unwrap();
        assert_eq!(outcome, GateOutcome::Abandoned);
    }

    #[tokio::test]
    async fn channel_form_submits_once() {
        let (mut form, handle) = channel_form("form");
        handle.submit(FormData::new().with(AGE_FIELD, "40"));
        assert!(form.submission().await.is_some());
        assert!(form.submission().await.is_none());
    }

    #[tokio::test]
    async fn terminal_form_keeps_answers_as_typed() {
        let input: &[u8] = b"29\r\n\n New Zealand \nname Kiwi\n";
        let mut form = TerminalForm::new(input);
        let data = form.submission().await.unwrap();
        assert_eq!(data.field(AGE_FIELD), "29");
        assert_eq!(data.field(GENDER_FIELD), "");
        assert_eq!(data.field(COUNTRY_FIELD), " New Zealand ");

        let mut rest = form.into_lines();
        assert_eq!(rest.next_line().await.unwrap().as_deref(), Some("name Kiwi"));
    }

    #[tokio::test]
    async fn terminal_form_closed_input_abandons() {
        let input: &[u8] = b"29\n";
        let mut form = TerminalForm::new(input);
        assert!(form.submission().await.is_none());
    }
}
