// ABOUTME: Routes platform events to per-user lanes processed by the relay orchestrator
// ABOUTME: Keeps each user's events in order while different users proceed concurrently

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anonchat_core::traits::{ChatId, EventStream, IncomingEvent, RelayTransport, UserId};
use anonchat_core::RelayOrchestrator;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// How long an idle lane worker lingers before exiting
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Finished lanes are pruned every this many dispatched events
const PRUNE_INTERVAL: u64 = 256;

/// Ordering domain for events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LaneKey {
    User(UserId),
    /// Events without an acting user
    Chat(ChatId),
}

impl LaneKey {
    pub fn for_event(event: &IncomingEvent) -> Self {
        match event {
            IncomingEvent::GetId { chat } => LaneKey::Chat(*chat),
            other => match other.user_id() {
                Some(uid) => LaneKey::User(uid),
                None => LaneKey::Chat(ChatId(0)),
            },
        }
    }
}

struct Lane {
    tx: mpsc::UnboundedSender<IncomingEvent>,
    worker: JoinHandle<()>,
}

/// Fans events out to one worker task per active user.
///
/// Lanes are unbounded, so handing off an event never waits on a busy user.
/// A lane worker handles its events one at a time and exits after sitting
/// idle. The next event for that user starts a fresh lane, which waits for
/// the previous worker to finish so ordering holds across the handover.
pub struct Dispatcher<T: RelayTransport + 'static> {
    orchestrator: Arc<RelayOrchestrator<T>>,
    lanes: HashMap<LaneKey, Lane>,
    idle_timeout: Duration,
    dispatched: u64,
}

impl<T: RelayTransport + 'static> Dispatcher<T> {
    pub fn new(orchestrator: Arc<RelayOrchestrator<T>>) -> Self {
        Self {
            orchestrator,
            lanes: HashMap::new(),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            dispatched: 0,
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Number of lanes whose worker is still running
    pub fn active_lanes(&self) -> usize {
        self.lanes
            .values()
            .filter(|lane| !lane.worker.is_finished())
            .count()
    }

    /// Hand an event to its lane, starting a new lane if needed.
    pub fn dispatch(&mut self, event: IncomingEvent) {
        let key = LaneKey::for_event(&event);
        let mut event = event;

        self.dispatched += 1;
        if self.dispatched % PRUNE_INTERVAL == 0 {
            self.prune();
        }

        loop {
            if let Some(lane) = self.lanes.get(&key) {
                match lane.tx.send(event) {
                    Ok(()) => return,
                    // Worker went idle and closed its lane; hand over to a new one
                    Err(mpsc::error::SendError(returned)) => event = returned,
                }
            }

            let previous = self.lanes.remove(&key).map(|lane| lane.worker);
            let lane = self.spawn_lane(key, previous);
            self.lanes.insert(key, lane);
        }
    }

    /// Consume the event stream until it ends, then wait for in-flight lanes.
    pub async fn run(mut self, mut events: EventStream) {
        tracing::info!("Dispatcher started");
        while let Some(event) = events.next().await {
            tracing::debug!(kind = event.kind(), "Dispatching event");
            self.dispatch(event);
        }
        tracing::info!("Event stream ended, draining lanes");
        self.drain().await;
    }

    /// Close every lane and wait for the workers to finish their queued events
    pub async fn drain(&mut self) {
        let workers: Vec<JoinHandle<()>> = self.lanes.drain().map(|(_, lane)| lane.worker).collect();
        for worker in workers {
            if let Err(e) = worker.await {
                tracing::error!(error = %e, "Lane worker panicked");
            }
        }
    }

    fn prune(&mut self) {
        let before = self.lanes.len();
        self.lanes.retain(|_, lane| !lane.worker.is_finished());
        tracing::trace!(pruned = before - self.lanes.len(), "Pruned idle lanes");
    }

    fn spawn_lane(&self, key: LaneKey, previous: Option<JoinHandle<()>>) -> Lane {
        let (tx, rx) = mpsc::unbounded_channel();
        let orchestrator = Arc::clone(&self.orchestrator);
        let idle_timeout = self.idle_timeout;

        let worker = tokio::spawn(async move {
            if let Some(previous) = previous {
                let _ = previous.await;
            }
            run_lane(key, orchestrator, rx, idle_timeout).await;
        });

        Lane { tx, worker }
    }
}

async fn run_lane<T: RelayTransport>(
    key: LaneKey,
    orchestrator: Arc<RelayOrchestrator<T>>,
    mut rx: mpsc::UnboundedReceiver<IncomingEvent>,
    idle_timeout: Duration,
) {
    loop {
        match tokio::time::timeout(idle_timeout, rx.recv()).await {
            Ok(Some(event)) => orchestrator.handle_event(event).await,
            Ok(None) => return,
            Err(_) => {
                // Refuse new events, then finish whatever raced in before the close
                rx.close();
                while let Ok(event) = rx.try_recv() {
                    orchestrator.handle_event(event).await;
                }
                tracing::trace!(lane = ?key, "Lane idle, closing");
                return;
            }
        }
    }
}
