//! Container-backed session tracking.
//!
//! A [`Session`] is the unit of lifecycle management for container-backed
//! terminals: it owns the container handle and the activity bookkeeping
//! the idle sweeper evicts on. PTY and plain-process connections are not
//! sessions in this sense; they live entirely inside their connection
//! handler and need no central tracking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::distributions::Alphanumeric;
use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::backend::container::ContainerHandle;
use crate::backend::image::ImageSpec;

pub mod registry;

pub use registry::{SessionRegistry, SessionSummary};

/// One live, container-backed terminal session.
pub struct Session {
    /// Unique session identifier.
    id: String,

    /// Image keyword the client requested (after allow-list resolution).
    image_key: &'static str,

    /// Full image reference the container runs.
    image: &'static str,

    /// The backing container. Kill/remove only ever happens through
    /// [`Session::destroy`]; the relay loop holds a clone solely for
    /// resizes and tool probes.
    container: ContainerHandle,

    /// Creation time, unix milliseconds.
    created_at_ms: u64,

    /// Last inbound client activity, unix milliseconds. Updated on every
    /// message; read by the idle sweeper.
    last_activity_ms: AtomicU64,

    /// Fires once when the session is torn down, so the connection relay
    /// can close the socket.
    cancelled: CancellationToken,
}

impl Session {
    /// Create a session wrapping a freshly started container.
    pub fn new(id: String, image: &'static ImageSpec, container: ContainerHandle) -> Self {
        let now = now_millis();
        Self {
            id,
            image_key: image.key,
            image: image.reference,
            container,
            created_at_ms: now,
            last_activity_ms: AtomicU64::new(now),
            cancelled: CancellationToken::new(),
        }
    }

    /// Returns the session ID.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the requested image keyword.
    pub fn image_key(&self) -> &'static str {
        self.image_key
    }

    /// Returns the full image reference.
    pub fn image(&self) -> &'static str {
        self.image
    }

    /// Returns the creation time in unix milliseconds.
    pub fn created_at_ms(&self) -> u64 {
        self.created_at_ms
    }

    /// Returns the last-activity time in unix milliseconds.
    pub fn last_activity_ms(&self) -> u64 {
        self.last_activity_ms.load(Ordering::Relaxed)
    }

    /// Record client activity, pushing the idle deadline forward.
    ///
    /// This is the cancel-and-reschedule half of idle eviction: the
    /// sweeper computes the deadline from the latest activity timestamp,
    /// so storing a new timestamp replaces the previous deadline.
    pub fn touch(&self) {
        self.last_activity_ms.store(now_millis(), Ordering::Relaxed);
    }

    /// How long the session has been without client activity.
    pub fn idle_for(&self) -> Duration {
        Duration::from_millis(now_millis().saturating_sub(self.last_activity_ms()))
    }

    /// Token that fires when the session is torn down.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancelled.clone()
    }

    /// Tear the session down: signal the relay loop and dispose of the
    /// container. Safe to call more than once.
    pub(crate) async fn destroy(&self) {
        self.cancelled.cancel();
        self.container.kill_and_remove().await;
    }
}

/// Generate a session id: creation time plus an unguessable suffix.
pub fn generate_session_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(char::from)
        .collect();

    format!(
        "s-{}-{}",
        to_base36(now_millis()),
        suffix.to_lowercase()
    )
}

/// Current unix time in milliseconds.
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Lowercase base-36 rendering of an integer.
fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    if value == 0 {
        return "0".to_string();
    }

    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).expect("base36 digits are ASCII")
}
