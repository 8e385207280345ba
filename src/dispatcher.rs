//! Inbound event dispatch.
//!
//! Every event is checked against the operator registry first. Commands and
//! button presses map onto store, registry and duty operations; plain text is
//! routed to the requester's pending flow, if any. The dispatcher is the only
//! writer of the flow table.

use std::path::PathBuf;
use std::sync::Arc;

use chrono_tz::Tz;

use crate::auth::AdminRegistry;
use crate::callback::{AdminsAction, BackupAction, CallbackAction, CallbackError, MenuTarget};
use crate::channels::traits::{InboundEvent, InboundPayload, OutboundMessage, Transport};
use crate::clock::Clock;
use crate::command::{Command, CommandError};
use crate::error::BotError;
use crate::export::write_export;
use crate::flow::{AdminAction, FlowTable, PendingFlow, Rejection, Transition, advance};
use crate::render;
use crate::scheduler::DutyScheduler;
use crate::store::sqlite::{LIST_ACTIVE_LIMIT, LIST_EXPIRED_LIMIT};
use crate::store::{NewSubscription, SubscriptionStore};

/// Routes inbound events to actions and replies.
pub struct Dispatcher {
    store: Arc<SubscriptionStore>,
    admins: AdminRegistry,
    flows: FlowTable,
    transport: Arc<dyn Transport>,
    duties: Arc<DutyScheduler>,
    clock: Arc<dyn Clock>,
    tz: Tz,
    export_dir: PathBuf,
}

impl Dispatcher {
    pub fn new(
        store: Arc<SubscriptionStore>,
        duties: Arc<DutyScheduler>,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
        export_dir: PathBuf,
    ) -> Self {
        let tz = store.tz();
        Self {
            admins: AdminRegistry::new(Arc::clone(&store)),
            store,
            flows: FlowTable::new(),
            transport,
            duties,
            clock,
            tz,
            export_dir,
        }
    }

    pub fn admins(&self) -> &AdminRegistry {
        &self.admins
    }

    pub fn flows(&self) -> &FlowTable {
        &self.flows
    }

    /// Handle one inbound event to completion.
    pub async fn handle(&self, event: InboundEvent) {
        let requester = event.requester_id;
        let chat = event.conversation_id;
        let authorized = self
            .admins
            .is_authorized(requester, event.conversation_kind);

        match event.payload {
            InboundPayload::Command { name, args } => {
                if !authorized {
                    if name == "start" {
                        tracing::debug!(requester, "ignoring /start from unauthorized requester");
                    } else {
                        tracing::info!(requester, command = %name, "denied");
                        self.reply_text(chat, render::DENIED).await;
                    }
                    return;
                }
                match Command::parse(&name, &args) {
                    Ok(command) => self.run_command(requester, chat, command).await,
                    Err(CommandError::Unknown(name)) => {
                        tracing::debug!(requester, command = %name, "unknown command");
                        self.reply_text(chat, "Unsupported command.").await;
                    }
                    Err(CommandError::Usage(usage)) => self.reply_text(chat, usage).await,
                }
            }
            InboundPayload::Button(token) => {
                if !authorized {
                    tracing::info!(requester, token = %token, "denied");
                    self.reply_text(chat, render::DENIED).await;
                    return;
                }
                match CallbackAction::parse(&token) {
                    Ok(action) => self.run_callback(requester, chat, action).await,
                    Err(CallbackError::Unsupported) => {
                        tracing::debug!(requester, token = %token, "unsupported button");
                        self.reply_text(chat, render::UNSUPPORTED).await;
                    }
                    Err(CallbackError::Invalid) => {
                        self.reply_text(chat, render::INVALID_ARGUMENT).await;
                    }
                }
            }
            InboundPayload::Text(text) => {
                if !authorized {
                    tracing::info!(requester, "denied text");
                    self.reply_text(chat, render::DENIED).await;
                    return;
                }
                match self.flows.take(requester) {
                    Some(state) => self.on_flow_text(requester, chat, state, &text).await,
                    None => tracing::debug!(requester, "text without pending flow ignored"),
                }
            }
        }
    }

    async fn run_command(&self, requester: i64, chat: i64, command: Command) {
        match command {
            Command::Start => self.reply(chat, render::main_menu()).await,
            Command::Add => self.begin_record_flow(requester, chat).await,
            Command::Cancel => {
                let text = if self.flows.cancel(requester) {
                    render::CANCELLED
                } else {
                    render::NOTHING_TO_CANCEL
                };
                self.reply_text(chat, text).await;
            }
            Command::List => self.send_active(chat).await,
            Command::Expired => self.send_expired(chat).await,
            Command::Renew { id, days } => self.renew(chat, id, days).await,
            Command::Finish { id } => self.finish(chat, id).await,
            Command::Find { query } => self.find(chat, &query).await,
            Command::SetDefaultDays { days: Some(days) } => self.set_default_days(chat, days).await,
            Command::SetDefaultDays { days: None } => match self.store.default_duration_days() {
                Ok(current) => self.reply(chat, render::set_days_menu(current)).await,
                Err(e) => self.reply_error(chat, &e).await,
            },
            Command::Export => self.export(chat).await,
        }
    }

    async fn run_callback(&self, requester: i64, chat: i64, action: CallbackAction) {
        match action {
            CallbackAction::Menu(MenuTarget::Home) => {
                self.flows.cancel(requester);
                self.reply(chat, render::main_menu()).await;
            }
            CallbackAction::Menu(MenuTarget::Add) => self.begin_record_flow(requester, chat).await,
            CallbackAction::Menu(MenuTarget::List) => self.send_active(chat).await,
            CallbackAction::Menu(MenuTarget::Expired) => self.send_expired(chat).await,
            CallbackAction::Menu(MenuTarget::Export) => self.export(chat).await,
            CallbackAction::Menu(MenuTarget::Admins) => {
                self.flows.cancel(requester);
                match self.admins.list() {
                    Ok(ids) => self.reply(chat, render::admins_menu(&ids)).await,
                    Err(e) => self.reply_error(chat, &e).await,
                }
            }
            CallbackAction::Menu(MenuTarget::Backup) => {
                let status = self
                    .store
                    .backup_enabled()
                    .and_then(|enabled| Ok((enabled, self.store.backup_interval_hours()?)));
                match status {
                    Ok((enabled, hours)) => self.reply(chat, render::backup_menu(enabled, hours)).await,
                    Err(e) => self.reply_error(chat, &e).await,
                }
            }
            CallbackAction::Admins(AdminsAction::List) => match self.admins.list() {
                Ok(ids) => self.reply_text(chat, &render::admins_list(&ids)).await,
                Err(e) => self.reply_error(chat, &e).await,
            },
            CallbackAction::Admins(AdminsAction::Add) => {
                self.flows
                    .begin(requester, PendingFlow::AwaitingOperatorId(AdminAction::Add));
                self.reply_text(chat, render::PROMPT_OPERATOR_ADD).await;
            }
            CallbackAction::Admins(AdminsAction::Remove) => {
                self.flows
                    .begin(requester, PendingFlow::AwaitingOperatorId(AdminAction::Remove));
                self.reply_text(chat, render::PROMPT_OPERATOR_REMOVE).await;
            }
            CallbackAction::Backup(BackupAction::Now) => {
                self.reply_text(chat, "Creating backup…").await;
                if let Err(e) = self.duties.backup_now().await {
                    tracing::warn!(requester, error = %e, "manual backup failed");
                    self.reply_text(chat, "Backup failed.").await;
                }
            }
            CallbackAction::Backup(BackupAction::On { hours }) => {
                match self.duties.enable_backup(hours) {
                    Ok(()) => {
                        let grace = self.duties.grace().as_secs() / 60;
                        self.reply_text(chat, &render::backup_enabled(hours, grace))
                            .await;
                    }
                    Err(BotError::Scheduler(_)) => {
                        self.reply_text(chat, "Automatic backup is unavailable right now.")
                            .await;
                    }
                    Err(e) => self.reply_error(chat, &e).await,
                }
            }
            CallbackAction::Backup(BackupAction::Off) => match self.duties.disable_backup() {
                Ok(()) => self.reply_text(chat, "Automatic backup turned off.").await,
                Err(e) => self.reply_error(chat, &e).await,
            },
            CallbackAction::Renew { id } => self.renew(chat, id, None).await,
            CallbackAction::Finish { id } => self.finish(chat, id).await,
            CallbackAction::SetDays { days } => self.set_default_days(chat, days).await,
        }
    }

    async fn on_flow_text(&self, requester: i64, chat: i64, state: PendingFlow, text: &str) {
        match advance(state, text) {
            Transition::Reprompt(state, rejection) => {
                self.flows.begin(requester, state);
                let prompt = match rejection {
                    Rejection::EmptyDescription => render::REPROMPT_DESCRIPTION,
                    Rejection::BadDate => render::REPROMPT_DATE,
                    Rejection::BadOperatorId => render::REPROMPT_OPERATOR_ID,
                };
                self.reply_text(chat, prompt).await;
            }
            Transition::Next(state) => {
                self.flows.begin(requester, state);
                self.reply_text(chat, render::PROMPT_DATE).await;
            }
            Transition::CreateRecord {
                description,
                purchase_date,
            } => {
                let created = self.store.default_duration_days().and_then(|days| {
                    let id = self.store.insert(&NewSubscription {
                        description: description.clone(),
                        buyer_ref: None,
                        purchase_date,
                        duration_days: days,
                    })?;
                    self.store.get(id)
                });
                match created {
                    Ok(record) => {
                        tracing::info!(requester, record_id = record.id, "record created");
                        self.reply_text(chat, &render::created(&record, self.tz)).await;
                    }
                    Err(e) => {
                        // Keep the description so the operator can resend the date.
                        self.flows
                            .begin(requester, PendingFlow::AwaitingDate { description });
                        self.reply_error(chat, &e).await;
                    }
                }
            }
            Transition::ApplyAdmin {
                action,
                operator_id,
            } => {
                let result = match action {
                    AdminAction::Add => self.admins.add(operator_id).map(|added| {
                        if added {
                            format!("Operator {operator_id} added.")
                        } else {
                            format!("Operator {operator_id} is already registered.")
                        }
                    }),
                    AdminAction::Remove => self.admins.remove(operator_id).map(|removed| {
                        if removed {
                            format!("Operator {operator_id} removed.")
                        } else {
                            format!("Operator {operator_id} not found.")
                        }
                    }),
                };
                match result {
                    Ok(text) => self.reply_text(chat, &text).await,
                    Err(e) => self.reply_error(chat, &e).await,
                }
            }
        }
    }

    async fn begin_record_flow(&self, requester: i64, chat: i64) {
        self.flows.begin(requester, PendingFlow::AwaitingDescription);
        self.reply_text(chat, render::PROMPT_DESCRIPTION).await;
    }

    async fn send_active(&self, chat: i64) {
        match self.store.list_active(LIST_ACTIVE_LIMIT) {
            Ok(records) if records.is_empty() => self.reply_text(chat, render::NO_ACTIVE).await,
            Ok(records) => {
                for record in &records {
                    self.reply(chat, render::record_card(record, self.tz)).await;
                }
            }
            Err(e) => self.reply_error(chat, &e).await,
        }
    }

    async fn send_expired(&self, chat: i64) {
        match self.store.list_expired(self.clock.now(), LIST_EXPIRED_LIMIT) {
            Ok(records) if records.is_empty() => self.reply_text(chat, render::NO_EXPIRED).await,
            Ok(records) => {
                for record in &records {
                    self.reply(chat, render::record_card(record, self.tz)).await;
                }
            }
            Err(e) => self.reply_error(chat, &e).await,
        }
    }

    async fn renew(&self, chat: i64, id: i64, days: Option<u32>) {
        let result = match days {
            Some(days) => Ok(days),
            None => self.store.default_duration_days(),
        }
        .and_then(|days| Ok((days, self.store.renew(id, days)?)));
        match result {
            Ok((days, expires_at)) => {
                tracing::info!(record_id = id, days, "record renewed");
                self.reply_text(chat, &render::renewed(id, days, expires_at, self.tz))
                    .await;
            }
            Err(e) => self.reply_error(chat, &e).await,
        }
    }

    async fn finish(&self, chat: i64, id: i64) {
        match self.store.finish(id) {
            Ok(changed) => {
                tracing::info!(record_id = id, changed, "record finished");
                self.reply_text(chat, &render::finished(id, changed)).await;
            }
            Err(e) => self.reply_error(chat, &e).await,
        }
    }

    async fn find(&self, chat: i64, query: &str) {
        match self.store.search(query) {
            Ok(records) if records.is_empty() => self.reply_text(chat, render::NO_MATCHES).await,
            Ok(records) => {
                self.reply_text(chat, &render::find_header(query, records.len()))
                    .await;
                for record in &records {
                    self.reply(chat, render::record_card(record, self.tz)).await;
                }
            }
            Err(e) => self.reply_error(chat, &e).await,
        }
    }

    async fn set_default_days(&self, chat: i64, days: u32) {
        match self.store.set_default_duration_days(days) {
            Ok(()) => {
                tracing::info!(days, "default duration changed");
                self.reply_text(chat, &render::default_days_set(days)).await;
            }
            Err(e) => self.reply_error(chat, &e).await,
        }
    }

    async fn export(&self, chat: i64) {
        let written = self
            .store
            .list_all()
            .and_then(|records| {
                let path = write_export(&self.export_dir, &records, self.clock.now())?;
                Ok((path, records.len()))
            });
        let (path, rows) = match written {
            Ok(v) => v,
            Err(e) => {
                self.reply_error(chat, &e).await;
                return;
            }
        };
        let caption = format!("Export: {rows} record(s)");
        if let Err(e) = self
            .transport
            .send_document(chat, &path, Some(&caption))
            .await
        {
            tracing::warn!(chat, error = %e, "export delivery failed");
        }
    }

    async fn reply(&self, chat: i64, message: OutboundMessage) {
        if let Err(e) = self.transport.send_message(chat, message).await {
            tracing::warn!(chat, error = %e, "reply failed");
        }
    }

    async fn reply_text(&self, chat: i64, text: &str) {
        self.reply(chat, OutboundMessage::text(text)).await;
    }

    async fn reply_error(&self, chat: i64, err: &BotError) {
        let text = match err {
            BotError::NotFound(id) => render::not_found(*id),
            BotError::Validation(msg) => format!("Invalid input: {msg}"),
            other => {
                tracing::error!(error = %other, "request failed");
                render::INTERNAL_ERROR.to_owned()
            }
        };
        self.reply_text(chat, &text).await;
    }
}
