use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::device::DeviceState;
use crate::error::{AdbError, AdbResult};
use crate::framer::Framer;

/// A connection-state change for one device, derived by diffing two
/// successive `track-devices` snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEvent {
    pub serial: String,
    pub old_state: DeviceState,
    pub new_state: DeviceState,
}

/// How many pending events the watcher will buffer before blocking the
/// producer. The watcher never drops events; a full channel simply makes
/// the next snapshot's diff computation wait for the consumer to catch up.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Handle to a long-lived `host:track-devices` subscription.
///
/// Owns exactly one transport for its lifetime and is the sole reader of
/// that stream; consumers interact only through [`DeviceWatcher::events`]
/// and [`DeviceWatcher::cancel`].
pub struct DeviceWatcher {
    receiver: mpsc::Receiver<DeviceEvent>,
    cancel: CancellationToken,
    error: Arc<Mutex<Option<AdbError>>>,
    task: tokio::task::JoinHandle<()>,
}

impl DeviceWatcher {
    /// Start watching. `framer` must already have completed the
    /// `host:track-devices` handshake (request sent, OKAY read).
    pub(crate) fn spawn(framer: Framer) -> Self {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();
        let error = Arc::new(Mutex::new(None));

        let task_cancel = cancel.clone();
        let task_error = error.clone();
        let task = tokio::spawn(run_watch_loop(framer, tx, task_cancel, task_error));

        Self {
            receiver: rx,
            cancel,
            error,
            task,
        }
    }

    /// The event stream. Read from this in a loop; it closes when the
    /// watcher stops (cancelled or errored).
    pub fn events(&mut self) -> &mut mpsc::Receiver<DeviceEvent> {
        &mut self.receiver
    }

    /// Request shutdown. Closes the transport, which causes the watcher's
    /// read to fail; this is distinguished from an unexpected disconnect, so
    /// `take_error()` returns `None` after a clean cancel.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// The terminal error, if the watcher stopped unexpectedly (as opposed
    /// to a requested cancel). `None` while still running or after a clean
    /// shutdown.
    pub fn take_error(&self) -> Option<AdbError> {
        self.error.lock().unwrap().take()
    }

    /// Wait for the background task to finish (e.g. after calling `cancel`).
    pub async fn join(self) {
        let _ = self.task.await;
    }
}

impl Drop for DeviceWatcher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_watch_loop(
    mut framer: Framer,
    tx: mpsc::Sender<DeviceEvent>,
    cancel: CancellationToken,
    error_slot: Arc<Mutex<Option<AdbError>>>,
) {
    let mut snapshot: BTreeMap<String, DeviceState> = BTreeMap::new();

    loop {
        let message = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("device watcher cancelled");
                return;
            }
            result = framer.read_message() => result,
        };

        let payload = match message {
            Ok(bytes) => bytes,
            Err(e) => {
                if cancel.is_cancelled() {
                    // Cancellation raced the read and lost; still an
                    // expected shutdown, not a reported error.
                    return;
                }
                warn!("device watcher read failed: {e}");
                let reported = if matches!(e, AdbError::ConnectionReset(_)) {
                    e
                } else {
                    AdbError::ConnectionReset(format!("track-devices: {e}"))
                };
                *error_slot.lock().unwrap() = Some(reported);
                return;
            }
        };

        let text = String::from_utf8_lossy(&payload);
        let new_snapshot = parse_snapshot(&text);
        let events = diff_snapshots(&snapshot, &new_snapshot);
        snapshot = new_snapshot;

        for event in events {
            if tx.send(event).await.is_err() {
                // Consumer dropped the receiver; stop watching.
                return;
            }
        }
    }
}

fn parse_snapshot(text: &str) -> BTreeMap<String, DeviceState> {
    text.lines()
        .filter(|l| !l.is_empty())
        .filter_map(|line| {
            let mut parts = line.split('\t');
            let serial = parts.next()?.to_string();
            let state = DeviceState::parse(parts.next()?);
            Some((serial, state))
        })
        .collect()
}

/// Diff two snapshots, producing events in serial-lexicographic order.
/// `apply(events, old) == new` for every consecutive pair.
fn diff_snapshots(
    old: &BTreeMap<String, DeviceState>,
    new: &BTreeMap<String, DeviceState>,
) -> Vec<DeviceEvent> {
    let mut events = Vec::new();
    let mut serials: Vec<&String> = old.keys().chain(new.keys()).collect();
    serials.sort();
    serials.dedup();

    for serial in serials {
        let old_state = old.get(serial);
        let new_state = new.get(serial);
        match (old_state, new_state) {
            (Some(o), Some(n)) if o != n => events.push(DeviceEvent {
                serial: serial.clone(),
                old_state: o.clone(),
                new_state: n.clone(),
            }),
            (Some(_), Some(_)) => {}
            (None, Some(n)) => events.push(DeviceEvent {
                serial: serial.clone(),
                old_state: DeviceState::Disconnected,
                new_state: n.clone(),
            }),
            (Some(o), None) => events.push(DeviceEvent {
                serial: serial.clone(),
                old_state: o.clone(),
                new_state: DeviceState::Disconnected,
            }),
            (None, None) => unreachable!("serial came from one of the two maps"),
        }
    }
    events
}

#[allow(dead_code)]
fn apply(events: &[DeviceEvent], old: &BTreeMap<String, DeviceState>) -> BTreeMap<String, DeviceState> {
    let mut result = old.clone();
    for event in events {
        if event.new_state == DeviceState::Disconnected {
            result.remove(&event.serial);
        } else {
            result.insert(event.serial.clone(), event.new_state.clone());
        }
    }
    result
}
