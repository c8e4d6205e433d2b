//! One polling cycle: fetch → parse → mark processed → notify → reply → notify.
//!
//! **Core invariant: at most one reply per message id.** An id is recorded
//! in the processed store as soon as the message parses, before the reply is
//! attempted, so a crash between parse and send drops that reply rather than
//! sending it twice after restart.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDate};
use tracing::{debug, error, info, warn};

use crate::channels::{MailboxClient, MailboxSession, Mailer, RawMessage, parse_message};
use crate::llm::ReplyGenerator;
use crate::notify::{NotificationEvent, NotificationSink};
use crate::store::ProcessedStore;

/// Characters of body shown in debug logs.
const BODY_PREVIEW_CHARS: usize = 100;

/// Where the loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Fetching,
    ProcessingBatch,
    Sleeping,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
            Self::ProcessingBatch => "processing_batch",
            Self::Sleeping => "sleeping",
        };
        f.write_str(s)
    }
}

/// Per-cycle counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub fetched: usize,
    pub already_processed: usize,
    pub parse_failed: usize,
    pub reply_failed: usize,
    pub send_failed: usize,
    pub replied: usize,
    /// The cycle was abandoned at connect or fetch.
    pub aborted: bool,
}

/// Everything the pipeline touches, passed explicitly.
pub struct PipelineContext {
    pub mailbox: Arc<dyn MailboxClient>,
    pub generator: Arc<dyn ReplyGenerator>,
    pub mailer: Arc<dyn Mailer>,
    pub notifier: Arc<dyn NotificationSink>,
    pub store: ProcessedStore,
    pub poll_interval: Duration,
    state: PipelineState,
}

impl PipelineContext {
    pub fn new(
        mailbox: Arc<dyn MailboxClient>,
        generator: Arc<dyn ReplyGenerator>,
        mailer: Arc<dyn Mailer>,
        notifier: Arc<dyn NotificationSink>,
        store: ProcessedStore,
        poll_interval: Duration,
    ) -> Self {
        Self {
            mailbox,
            generator,
            mailer,
            notifier,
            store,
            poll_interval,
            state: PipelineState::Idle,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: PipelineState) {
        debug!(from = %self.state, to = %state, "Pipeline state change");
        self.state = state;
    }

    /// Run one cycle against messages received today.
    pub async fn run_cycle(&mut self) -> CycleReport {
        self.run_cycle_since(Local::now().date_naive()).await
    }

    /// Run one cycle: fetch unseen messages since `since`, process each, flush.
    ///
    /// Never fails; every error is logged and counted in the report.
    pub async fn run_cycle_since(&mut self, since: NaiveDate) -> CycleReport {
        let mut report = CycleReport::default();
        self.set_state(PipelineState::Fetching);

        let mut session = match self.mailbox.connect().await {
            Ok(session) => session,
            Err(e) => {
                error!(stage = "connect", error = %e, "Mailbox connection failed, skipping cycle");
                report.aborted = true;
                self.set_state(PipelineState::Idle);
                return report;
            }
        };

        let batch = match session.fetch_unseen_since(since).await {
            Ok(batch) => batch,
            Err(e) => {
                error!(stage = "fetch", error = %e, "Fetching unseen messages failed, skipping cycle");
                session.close().await;
                report.aborted = true;
                self.set_state(PipelineState::Idle);
                return report;
            }
        };

        info!(count = batch.len(), since = %since, "Found unseen messages");
        report.fetched = batch.len();

        self.set_state(PipelineState::ProcessingBatch);
        for raw in batch {
            self.process_message(session.as_mut(), raw, &mut report).await;
        }
        session.close().await;

        if let Err(e) = self.store.flush() {
            error!(stage = "flush", path = %self.store.path().display(), error = %e, "Failed to persist processed ids");
        }

        if report.fetched > report.already_processed {
            info!(
                replied = report.replied,
                parse_failed = report.parse_failed,
                reply_failed = report.reply_failed,
                send_failed = report.send_failed,
                "Batch complete"
            );
        }

        self.set_state(PipelineState::Idle);
        report
    }

    async fn process_message(
        &mut self,
        session: &mut dyn MailboxSession,
        raw: RawMessage,
        report: &mut CycleReport,
    ) {
        if self.store.contains(&raw.id) {
            debug!(id = %raw.id, "Already processed, skipping");
            report.already_processed += 1;
            return;
        }

        let record = match parse_message(&raw) {
            Ok(record) => record,
            Err(e) => {
                warn!(id = %raw.id, stage = "parse", error = %e, "Skipping unparseable message");
                report.parse_failed += 1;
                return;
            }
        };

        info!(id = %record.id, from = %record.from, subject = %record.subject, "New email");
        debug!(id = %record.id, body = %record.body_preview(BODY_PREVIEW_CHARS), "Body preview");

        self.store.add(record.id.clone());
        self.notifier.notify(NotificationEvent::NewEmail(record.clone()));

        let reply = match self.generator.generate(&record).await {
            Ok(reply) => reply,
            Err(e) => {
                error!(id = %record.id, stage = "generate", error = %e, "Reply failed");
                report.reply_failed += 1;
                return;
            }
        };

        if let Err(e) = self
            .mailer
            .send(&record.from, &record.reply_subject(), &reply)
            .await
        {
            error!(id = %record.id, stage = "send", to = %record.from, error = %e, "Failed to send reply");
            report.send_failed += 1;
            return;
        }

        info!(id = %record.id, to = %record.from, "Replied");
        report.replied += 1;

        if let Err(e) = session.mark_seen(&record.id).await {
            warn!(id = %record.id, stage = "mark_seen", error = %e, "Could not mark message as seen");
        }

        self.notifier.notify(NotificationEvent::RemovedEmail(record.id));
    }
}
