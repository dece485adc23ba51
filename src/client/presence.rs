use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::Result;
use crate::model::{Profile, Status};
use crate::platform::{ChangeKind, Filter, Interrupted, Platform, Record, Subscription, Table, Tables};

/// Tracks which users are online: one baseline fetch, then profile update
/// events applied in receipt order. Dropping the tracker unsubscribes.
pub struct PresenceTracker {
    online: watch::Receiver<HashSet<Uuid>>,
    task: JoinHandle<()>,
}

impl PresenceTracker {
    pub async fn start(platform: &Platform) -> Result<Self> {
        // subscribe before the baseline fetch so no update falls in between
        let subscription = platform
            .realtime
            .subscribe("online-users", Filter::table(Table::Profiles).kind(ChangeKind::Update));
        let baseline = fetch_baseline(platform.tables.as_ref()).await?;
        debug!(online = baseline.len(), "presence baseline");

        let (tx, online) = watch::channel(baseline);
        let task = tokio::spawn(track(platform.tables.clone(), subscription, tx));
        Ok(PresenceTracker { online, task })
    }

    pub fn online(&self) -> HashSet<Uuid> {
        self.online.borrow().clone()
    }

    pub fn is_online(&self, user_id: Uuid) -> bool {
        self.online.borrow().contains(&user_id)
    }

    /// Read-only view that changes whenever the set does.
    pub fn watch(&self) -> watch::Receiver<HashSet<Uuid>> {
        self.online.clone()
    }

    pub fn stop(self) {
        self.task.abort();
        debug!("presence tracking stopped");
    }
}

impl Drop for PresenceTracker {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn fetch_baseline(tables: &dyn Tables) -> Result<HashSet<Uuid>> {
    Ok(tables.online_profile_ids().await?.into_iter().collect())
}

/// Applies one profile update. Returns whether the set changed.
pub fn apply(online: &mut HashSet<Uuid>, profile: &Profile) -> bool {
    match profile.status {
        Status::Online => online.insert(profile.id),
        Status::Offline => online.remove(&profile.id),
    }
}

async fn track(tables: Arc<dyn Tables>, mut subscription: Subscription, tx: watch::Sender<HashSet<Uuid>>) {
    loop {
        match subscription.recv().await {
            Ok(change) => {
                if let Record::Profile(profile) = change.record {
                    tx.send_if_modified(|online| apply(online, &profile));
                }
            }
            Err(Interrupted::Lagged(_)) => match fetch_baseline(tables.as_ref()).await {
                Ok(baseline) => {
                    debug!(online = baseline.len(), "presence baseline refetched");
                    tx.send_replace(baseline);
                }
                Err(e) => warn!(error = %e, "presence refetch failed"),
            },
            Err(Interrupted::Closed) => break,
        }
    }
}
