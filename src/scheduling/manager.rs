use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use tokio::sync::mpsc;

use crate::{
    clock::Clock,
    error::{ReminderError, ReminderResult},
    reminder::{OwnerId, Reminder, ReminderDueTime, ReminderId},
    storage::{ReminderMap, ReminderStore},
};

use super::{
    common::{
        CoordinatorMessage, CoordinatorSender, EditReminder, NewReminder, WeakCoordinatorSender,
    },
    delivery::{ReminderDeliveryChannel, ReminderMessageType, ReminderNotification},
    recovery::{self, RecoveryReport},
    scheduler::{ReminderKey, TimerEngine, TimerError, TimerHandle},
};

#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    /// Send `Scheduled`/`Updated`/`Cancelled` notifications on mutations.
    pub send_confirmations: bool,
    pub mailbox_size: usize,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            send_confirmations: true,
            mailbox_size: 64,
        }
    }
}

/// Handle to the task that owns every reminder and timer.
#[derive(Clone)]
pub struct ReminderCoordinator {
    sender: CoordinatorSender,
}

impl ReminderCoordinator {
    /// Loads the store, re-arms every persisted reminder and starts processing requests.
    pub async fn start(
        store: Arc<dyn ReminderStore>,
        channel: Arc<dyn ReminderDeliveryChannel>,
        clock: Arc<dyn Clock>,
        options: CoordinatorOptions,
    ) -> (Self, RecoveryReport) {
        let (channel_sender, receiver) = mpsc::channel(options.mailbox_size.max(1));
        let sender = CoordinatorSender::new(channel_sender);

        let mut state = CoordinatorState {
            reminders: BTreeMap::new(),
            last_ids: HashMap::new(),
            timers: TimerEngine::new(Arc::clone(&clock)),
            store,
            channel,
            clock,
            sender: sender.downgrade(),
            options,
        };

        let persisted = state.store.load().await;
        let report = recovery::restore(&mut state, persisted);

        tokio::spawn(async move {
            state.handle_messages(receiver).await;
        });

        (Self { sender }, report)
    }

    pub async fn create(
        &self,
        owner: impl Into<OwnerId>,
        request: NewReminder,
    ) -> ReminderResult<Reminder> {
        let owner = owner.into();
        self.sender
            .request(|reply| CoordinatorMessage::Create {
                owner,
                request,
                reply,
            })
            .await?
    }

    pub async fn edit(
        &self,
        owner: impl Into<OwnerId>,
        id: ReminderId,
        request: EditReminder,
    ) -> ReminderResult<Reminder> {
        let owner = owner.into();
        self.sender
            .request(|reply| CoordinatorMessage::Edit {
                owner,
                id,
                request,
                reply,
            })
            .await?
    }

    pub async fn delete(
        &self,
        owner: impl Into<OwnerId>,
        id: ReminderId,
    ) -> ReminderResult<Reminder> {
        let owner = owner.into();
        self.sender
            .request(|reply| CoordinatorMessage::Delete { owner, id, reply })
            .await?
    }

    /// Pending reminders of `owner`, earliest first.
    pub async fn list(&self, owner: impl Into<OwnerId>) -> ReminderResult<Vec<Reminder>> {
        let owner = owner.into();
        self.sender
            .request(|reply| CoordinatorMessage::List { owner, reply })
            .await
    }

    pub async fn get(&self, owner: impl Into<OwnerId>, id: ReminderId) -> ReminderResult<Reminder> {
        let owner = owner.into();
        let key_owner = owner.clone();
        self.sender
            .request(|reply| CoordinatorMessage::Get { owner, id, reply })
            .await?
            .ok_or(ReminderError::NotFound {
                owner: key_owner,
                id,
            })
    }

    /// Cancels pending timers and writes the final state. Later calls fail with
    /// `CoordinatorStopped`.
    pub async fn shutdown(&self) -> ReminderResult<()> {
        self.sender
            .request(|reply| CoordinatorMessage::Shutdown { reply })
            .await?
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum SlotState {
    Pending(TimerHandle),
    /// Timer fired and delivery is in flight. Still persisted, no longer addressable.
    Firing(TimerHandle),
}

#[derive(Debug, Clone)]
pub(super) struct ReminderSlot {
    pub reminder: Reminder,
    pub state: SlotState,
}

pub(super) struct CoordinatorState {
    pub reminders: BTreeMap<OwnerId, Vec<ReminderSlot>>,
    /// Highest id handed out per owner. Ids are never reused.
    pub last_ids: HashMap<OwnerId, ReminderId>,
    pub timers: TimerEngine,
    pub store: Arc<dyn ReminderStore>,
    pub channel: Arc<dyn ReminderDeliveryChannel>,
    pub clock: Arc<dyn Clock>,
    /// Weak, so dropping every `ReminderCoordinator` ends the message loop.
    pub sender: WeakCoordinatorSender,
    pub options: CoordinatorOptions,
}

impl CoordinatorState {
    async fn handle_messages(mut self, mut receiver: mpsc::Receiver<CoordinatorMessage>) {
        while let Some(msg) = receiver.recv().await {
            match msg {
                CoordinatorMessage::Create {
                    owner,
                    request,
                    reply,
                } => {
                    let result = self.create(owner, request).await;
                    let _ = reply.send(result);
                }
                CoordinatorMessage::Edit {
                    owner,
                    id,
                    request,
                    reply,
                } => {
                    let result = self.edit(owner, id, request).await;
                    let _ = reply.send(result);
                }
                CoordinatorMessage::Delete { owner, id, reply } => {
                    let result = self.delete(owner, id).await;
                    let _ = reply.send(result);
                }
                CoordinatorMessage::List { owner, reply } => {
                    let _ = reply.send(self.list(&owner));
                }
                CoordinatorMessage::Get { owner, id, reply } => {
                    let reminder = self.find_pending(&owner, id).map(|slot| slot.reminder.clone());
                    let _ = reply.send(reminder);
                }
                CoordinatorMessage::Fire(handle) => self.fire(handle),
                CoordinatorMessage::Delivered(handle) => self.finish_delivery(handle).await,
                CoordinatorMessage::Shutdown { reply } => {
                    let result = self.shutdown().await;
                    let _ = reply.send(result);
                    break;
                }
            }
        }

        log::info!("Reminder coordinator stopped");
        self.timers.shutdown();
    }

    async fn create(&mut self, owner: OwnerId, request: NewReminder) -> ReminderResult<Reminder> {
        let text = self.validate(&request.due_at, &request.text)?;

        let id = self.allocate_id(&owner)?;
        let reminder = Reminder {
            id,
            owner: owner.clone(),
            due_at: request.due_at,
            text,
            category: request.category,
        };

        let handle = self.arm(&reminder)?;
        self.reminders.entry(owner).or_default().push(ReminderSlot {
            reminder: reminder.clone(),
            state: SlotState::Pending(handle),
        });

        log::info!(
            "Created reminder. [owner = {}, id = {}, due_at = {}]",
            reminder.owner,
            reminder.id,
            reminder.due_at
        );

        self.persist().await;
        self.confirm(ReminderMessageType::Scheduled, &reminder);

        Ok(reminder)
    }

    async fn edit(
        &mut self,
        owner: OwnerId,
        id: ReminderId,
        request: EditReminder,
    ) -> ReminderResult<Reminder> {
        let Some((old_handle, mut updated)) = self.pending_entry(&owner, id) else {
            return Err(ReminderError::NotFound { owner, id });
        };

        // Validate before touching the old timer so a rejected edit leaves it intact.
        updated.text = self.validate(&request.due_at, &request.text)?;
        updated.due_at = request.due_at;
        if let Some(category) = request.category {
            updated.category = category;
        }

        self.timers.cancel(&old_handle);
        let handle = self.arm(&updated)?;
        if let Some(slot) = self.find_pending_mut(&owner, id) {
            slot.reminder = updated.clone();
            slot.state = SlotState::Pending(handle);
        }

        log::info!(
            "Edited reminder. [owner = {}, id = {}, due_at = {}]",
            owner,
            id,
            updated.due_at
        );

        self.persist().await;
        self.confirm(ReminderMessageType::Updated, &updated);

        Ok(updated)
    }

    async fn delete(&mut self, owner: OwnerId, id: ReminderId) -> ReminderResult<Reminder> {
        let Some((handle, _)) = self.pending_entry(&owner, id) else {
            return Err(ReminderError::NotFound { owner, id });
        };

        self.timers.cancel(&handle);
        let Some(removed) = self.remove_slot(&owner, id).map(|slot| slot.reminder) else {
            return Err(ReminderError::NotFound { owner, id });
        };

        log::info!("Deleted reminder. [owner = {}, id = {}]", owner, id);

        self.persist().await;
        self.confirm(ReminderMessageType::Cancelled, &removed);

        Ok(removed)
    }

    fn list(&self, owner: &OwnerId) -> Vec<Reminder> {
        let mut reminders: Vec<Reminder> = self
            .reminders
            .get(owner)
            .into_iter()
            .flatten()
            .filter(|slot| matches!(slot.state, SlotState::Pending(_)))
            .map(|slot| slot.reminder.clone())
            .collect();

        reminders.sort_by(|a, b| a.due_at.cmp(&b.due_at).then(a.id.cmp(&b.id)));
        reminders
    }

    fn fire(&mut self, handle: TimerHandle) {
        let key = handle.key.clone();
        let channel = Arc::clone(&self.channel);
        let sender = self.sender.clone();

        let Some(slot) = self.find_pending_mut(&key.owner, key.id) else {
            log::debug!("Ignoring fire of removed reminder {}", key);
            return;
        };
        if slot.state != SlotState::Pending(handle.clone()) {
            log::debug!("Ignoring stale fire of reminder {}", key);
            return;
        }

        slot.state = SlotState::Firing(handle.clone());
        let notification = ReminderNotification::new(ReminderMessageType::Fired, slot.reminder.clone());
        self.timers.complete(&handle);

        log::info!("[FIRE] Delivering reminder {}", key);

        tokio::spawn(async move {
            let owner = key.owner.clone();
            let delivery =
                tokio::spawn(async move { channel.deliver(&owner, &notification).await });

            match delivery.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => log::warn!(
                    "Could not deliver reminder, dropping it. [reminder = {}, error = {:#}]",
                    key,
                    e
                ),
                Err(e) => log::error!(
                    "Delivery of reminder {} crashed, dropping it. error = {}",
                    key,
                    e
                ),
            }
            sender.notify_delivered(handle).await;
        });
    }

    async fn finish_delivery(&mut self, handle: TimerHandle) {
        let key = &handle.key;
        let is_current_delivery = self
            .reminders
            .get(&key.owner)
            .and_then(|slots| slots.iter().find(|slot| slot.reminder.id == key.id))
            .is_some_and(|slot| slot.state == SlotState::Firing(handle.clone()));

        if !is_current_delivery {
            log::warn!("Delivery finished for unknown reminder {}", key);
            return;
        }

        self.remove_slot(&key.owner, key.id);
        log::info!("Reminder {} delivered and removed", key);
        self.persist().await;
    }

    async fn shutdown(&mut self) -> ReminderResult<()> {
        log::info!("Shutting down reminder coordinator");
        self.timers.shutdown();
        self.store.save(&self.snapshot()).await?;
        Ok(())
    }

    fn validate(&self, due_at: &ReminderDueTime, text: &str) -> ReminderResult<String> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ReminderError::Validation(
                "reminder text must not be empty".to_string(),
            ));
        }

        let due_instant = self
            .clock
            .resolve(due_at.datetime())
            .map_err(|e| ReminderError::Validation(e.to_string()))?;
        if due_instant <= self.clock.now_utc() {
            return Err(ReminderError::PastDue(*due_at));
        }

        Ok(text.to_string())
    }

    fn allocate_id(&mut self, owner: &OwnerId) -> ReminderResult<ReminderId> {
        let last_id = self.last_ids.entry(owner.clone()).or_insert(0);
        let id = last_id.checked_add(1).ok_or_else(|| {
            ReminderError::Validation(format!("no reminder ids left for owner {}", owner))
        })?;
        *last_id = id;
        Ok(id)
    }

    pub(super) fn arm(&mut self, reminder: &Reminder) -> Result<TimerHandle, TimerError> {
        let key = ReminderKey::new(reminder.owner.clone(), reminder.id);
        let sender = self.sender.clone();

        self.timers.arm(key, &reminder.due_at, move |handle| async move {
            sender.notify_fired(handle).await
        })
    }

    fn pending_entry(&self, owner: &OwnerId, id: ReminderId) -> Option<(TimerHandle, Reminder)> {
        match self.find_pending(owner, id)? {
            ReminderSlot {
                reminder,
                state: SlotState::Pending(handle),
            } => Some((handle.clone(), reminder.clone())),
            _ => None,
        }
    }

    fn find_pending(&self, owner: &OwnerId, id: ReminderId) -> Option<&ReminderSlot> {
        self.reminders.get(owner).and_then(|slots| {
            slots
                .iter()
                .find(|slot| slot.reminder.id == id && matches!(slot.state, SlotState::Pending(_)))
        })
    }

    fn find_pending_mut(&mut self, owner: &OwnerId, id: ReminderId) -> Option<&mut ReminderSlot> {
        self.reminders.get_mut(owner).and_then(|slots| {
            slots
                .iter_mut()
                .find(|slot| slot.reminder.id == id && matches!(slot.state, SlotState::Pending(_)))
        })
    }

    fn remove_slot(&mut self, owner: &OwnerId, id: ReminderId) -> Option<ReminderSlot> {
        let slots = self.reminders.get_mut(owner)?;
        let position = slots.iter().position(|slot| slot.reminder.id == id)?;
        let slot = slots.remove(position);

        if slots.is_empty() {
            self.reminders.remove(owner);
        }

        Some(slot)
    }

    fn snapshot(&self) -> ReminderMap {
        self.reminders
            .iter()
            .map(|(owner, slots)| {
                (
                    owner.clone(),
                    slots.iter().map(|slot| slot.reminder.clone()).collect(),
                )
            })
            .collect()
    }

    async fn persist(&self) {
        if let Err(e) = self.store.save(&self.snapshot()).await {
            log::error!("Could not save reminders. error = {}", e);
        }
    }

    fn confirm(&self, kind: ReminderMessageType, reminder: &Reminder) {
        if !self.options.send_confirmations {
            return;
        }

        let channel = Arc::clone(&self.channel);
        let notification = ReminderNotification::new(kind, reminder.clone());
        tokio::spawn(async move {
            let owner = notification.reminder.owner.clone();
            if let Err(e) = channel.deliver(&owner, &notification).await {
                log::warn!(
                    "Could not send {:?} confirmation. [owner = {}, error = {:#}]",
                    notification.kind,
                    owner,
                    e
                );
            }
        });
    }
}
