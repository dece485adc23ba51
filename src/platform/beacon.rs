use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::model::Status;

use super::Tables;

/// Fire-and-forget status writes for when the caller is going away.
///
/// `send` queues the write and returns at once; the write happens on a
/// background task after the caller may already be gone. Delivery is lossy:
/// there is no confirmation and failures are only logged.
#[derive(Clone)]
pub struct Beacon {
    tx: mpsc::Sender<(Uuid, Status)>,
}

impl Beacon {
    pub(crate) fn spawn(tables: Arc<dyn Tables>, queue: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<(Uuid, Status)>(queue);
        tokio::spawn(async move {
            while let Some((user_id, status)) = rx.recv().await {
                match tables.update_status(user_id, status).await {
                    Ok(_) => debug!(%user_id, status = status.as_str(), "beacon delivered"),
                    Err(e) => warn!(%user_id, error = %e, "beacon lost"),
                }
            }
        });
        Beacon { tx }
    }

    /// Returns false when the beacon could not be queued (queue full or
    /// worker gone); the caller decides whether to write directly instead.
    pub fn send(&self, user_id: Uuid, status: Status) -> bool {
        self.tx.try_send((user_id, status)).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::platform::{NewProfile, Platform};

    #[tokio::test]
    async fn beacon_writes_eventually() {
        let platform = Platform::in_memory().await;
        let id = Uuid::now_v7();
        platform
            .tables
            .insert_profile(NewProfile { id, username: "nep".into(), avatar_url: None, status: Status::Online })
            .await
            .unwrap();

        assert!(platform.beacon.send(id, Status::Offline));

        let mut status = Status::Online;
        for _ in 0..50 {
            status = platform.tables.profile(id).await.unwrap().unwrap().status;
            if status == Status::Offline {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(status, Status::Offline);
    }
}
