//! Single-room state machine: capacity, queue, pick, countdowns.
//!
//! A room tracks four disjoint occupancy states per client: active (holding a
//! slot), picked (promoted, awaiting confirmation), queued (waiting), and
//! merely announced-in-room. Picked clients count against capacity so a slot
//! can never be double-granted while a promotion is outstanding.
//!
//! Countdowns are deadline records evaluated against `now` on each tick; a
//! countdown is cancelled by removing its entry, so a timer can never fire
//! for a client that already left.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::time::Duration;

use turnstile_proto::{ClientProfile, ConnectionId, RoomId, RoomSettings, RoomSnapshot};

/// Which deadline a countdown tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Acceptance window after promotion from the queue.
    Picked,
    /// Session duration of an active occupant.
    Session,
}

/// A pending deadline for one client.
#[derive(Debug, Clone)]
struct Countdown<I> {
    kind: TimerKind,
    started_at: I,
    duration: Duration,
    /// Only notify when remaining time is within this window. `None` means
    /// notify for the whole countdown.
    notify_within: Option<Duration>,
    /// Whole elapsed seconds already reported, for per-second emission.
    seconds_notified: u64,
}

/// One countdown observation produced by [`Room::tick`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountdownFire {
    /// Client the countdown belongs to.
    pub conn_id: ConnectionId,
    /// Which deadline fired.
    pub kind: TimerKind,
    /// Remaining time in ms, `0` when expired.
    pub remaining_ms: u64,
    /// Whether the deadline elapsed (terminal) or this is a progress notice.
    pub expired: bool,
}

/// Result of a join request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The client now holds a slot.
    Admitted {
        /// True when this admission confirmed an outstanding promotion.
        confirmed_pick: bool,
    },
    /// The client was placed in the waiting queue.
    Queued {
        /// Zero-based queue position.
        position: usize,
    },
    /// The client already holds a slot.
    AlreadyActive,
    /// The client is already waiting in the queue.
    AlreadyQueued,
}

/// What a departing client was, returned by [`Room::leave`].
#[derive(Debug, Clone, PartialEq)]
pub struct LeaveReport {
    /// The client's profile, if it was a member at all.
    pub profile: Option<ClientProfile>,
    /// It held a slot.
    pub was_active: bool,
    /// It was waiting in the queue.
    pub was_queued: bool,
    /// It had an outstanding promotion.
    pub was_picked: bool,
}

impl LeaveReport {
    /// The client was a member in any state.
    pub fn was_member(&self) -> bool {
        self.profile.is_some()
    }

    /// The departure released a capacity slot (active or reserved-by-pick).
    pub fn freed_slot(&self) -> bool {
        self.was_active || self.was_picked
    }
}

/// State of one room.
#[derive(Debug, Clone)]
pub struct Room<I> {
    id: RoomId,
    name: String,
    settings: RoomSettings,
    app: Option<ConnectionId>,
    /// Everyone who asked to join and has not fully left.
    clients: BTreeMap<ConnectionId, ClientProfile>,
    /// Clients currently holding a slot.
    active: BTreeSet<ConnectionId>,
    /// FIFO waiting line, head first.
    queue: VecDeque<ConnectionId>,
    /// Promoted clients awaiting join confirmation, in promotion order.
    picked: Vec<ConnectionId>,
    /// At most one countdown per client: picked XOR session.
    countdowns: BTreeMap<ConnectionId, Countdown<I>>,
}

impl<I> Room<I>
where
    I: Copy + Ord + std::ops::Sub<Output = Duration>,
{
    /// Create an empty room.
    pub fn new(id: RoomId, name: String, settings: RoomSettings) -> Self {
        Self {
            id,
            name,
            settings,
            app: None,
            clients: BTreeMap::new(),
            active: BTreeSet::new(),
            queue: VecDeque::new(),
            picked: Vec::new(),
            countdowns: BTreeMap::new(),
        }
    }

    /// Stable room id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Room tunables.
    pub fn settings(&self) -> &RoomSettings {
        &self.settings
    }

    /// Controlling app connection, if announced.
    pub fn app(&self) -> Option<ConnectionId> {
        self.app
    }

    /// Attach the controlling app.
    pub fn set_app(&mut self, conn_id: ConnectionId) {
        self.app = Some(conn_id);
    }

    /// Whether a connection is a member in any state.
    pub fn is_member(&self, conn_id: ConnectionId) -> bool {
        self.clients.contains_key(&conn_id)
    }

    /// Whether a connection currently holds a slot.
    pub fn is_active(&self, conn_id: ConnectionId) -> bool {
        self.active.contains(&conn_id)
    }

    /// Profile of a member.
    pub fn client_profile(&self, conn_id: ConnectionId) -> Option<&ClientProfile> {
        self.clients.get(&conn_id)
    }

    /// All member connections, including the queue.
    pub fn member_ids(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.clients.keys().copied()
    }

    /// Connections currently holding a slot.
    pub fn active_ids(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.active.iter().copied()
    }

    /// Number of waiting clients.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// A slot is available, counting outstanding promotions as occupied.
    pub fn has_free_slot(&self) -> bool {
        let max = self.settings.max_clients as usize;
        max == 0 || self.active.len() + self.picked.len() < max
    }

    /// Handle a join request.
    ///
    /// A join from a promoted client confirms the promotion and admits it.
    /// Otherwise the client is admitted directly only when a slot is free and
    /// nobody is ahead of it (empty queue, no outstanding promotion); anything
    /// else queues it at the tail.
    pub fn join(&mut self, conn_id: ConnectionId, profile: ClientProfile, now: I) -> JoinOutcome {
        if let Some(pos) = self.picked.iter().position(|&c| c == conn_id) {
            self.picked.remove(pos);
            self.countdowns.remove(&conn_id);
            self.clients.insert(conn_id, profile);
            self.admit(conn_id, now);
            return JoinOutcome::Admitted { confirmed_pick: true };
        }
        if self.active.contains(&conn_id) {
            return JoinOutcome::AlreadyActive;
        }
        if self.queue.contains(&conn_id) {
            return JoinOutcome::AlreadyQueued;
        }

        self.clients.insert(conn_id, profile);
        if self.has_free_slot() && self.picked.is_empty() && self.queue.is_empty() {
            self.admit(conn_id, now);
            JoinOutcome::Admitted { confirmed_pick: false }
        } else {
            self.queue.push_back(conn_id);
            JoinOutcome::Queued { position: self.queue.len() - 1 }
        }
    }

    fn admit(&mut self, conn_id: ConnectionId, now: I) {
        self.active.insert(conn_id);
        // Zero and -1 both mean the occupant holds its slot indefinitely
        if self.settings.session_duration > 0 {
            self.countdowns.insert(conn_id, Countdown {
                kind: TimerKind::Session,
                started_at: now,
                duration: Duration::from_millis(self.settings.session_duration as u64),
                notify_within: Some(Duration::from_millis(
                    self.settings.end_session_notification_timeout,
                )),
                seconds_notified: 0,
            });
        }
    }

    /// Remove a client from every occupancy state.
    ///
    /// Idempotent: leaving a room one is not in reports `was_member = false`
    /// and changes nothing. Cancelling the countdown here is what guarantees
    /// no timer ever fires for a departed client.
    pub fn leave(&mut self, conn_id: ConnectionId) -> LeaveReport {
        let profile = self.clients.remove(&conn_id);
        let was_active = self.active.remove(&conn_id);
        let before = self.queue.len();
        self.queue.retain(|&c| c != conn_id);
        let was_queued = self.queue.len() != before;
        let was_picked = match self.picked.iter().position(|&c| c == conn_id) {
            Some(pos) => {
                self.picked.remove(pos);
                true
            },
            None => false,
        };
        self.countdowns.remove(&conn_id);
        LeaveReport { profile, was_active, was_queued, was_picked }
    }

    /// Promote the next live queued client, if a slot is free.
    ///
    /// Clients whose connection died without a disconnect sweep (stale queue
    /// entries) are skipped and dropped; the scan is bounded by the queue
    /// length. Returns the promoted connection, which gets a picked countdown.
    pub fn pick_next(
        &mut self,
        now: I,
        alive: impl Fn(ConnectionId) -> bool,
    ) -> Option<ConnectionId> {
        if !self.has_free_slot() {
            return None;
        }
        for _ in 0..self.queue.len() {
            let conn_id = self.queue.pop_front()?;
            if !alive(conn_id) {
                self.clients.remove(&conn_id);
                continue;
            }
            self.picked.push(conn_id);
            self.countdowns.insert(conn_id, Countdown {
                kind: TimerKind::Picked,
                started_at: now,
                duration: Duration::from_millis(self.settings.picked_timeout),
                notify_within: None,
                seconds_notified: 0,
            });
            return Some(conn_id);
        }
        None
    }

    /// Evaluate all countdowns against `now`.
    ///
    /// Emits one progress fire per countdown per elapsed whole second (picked
    /// countdowns for their whole duration, session countdowns only inside
    /// the end-of-session notification window) and a terminal expired fire
    /// once the deadline passes. Expired countdowns are removed; the caller
    /// decides what expiry means (missed turn or session end).
    pub fn tick(&mut self, now: I) -> Vec<CountdownFire> {
        let mut fires = Vec::new();
        let mut done = Vec::new();

        for (&conn_id, countdown) in &mut self.countdowns {
            let elapsed = now - countdown.started_at;
            if elapsed >= countdown.duration {
                fires.push(CountdownFire {
                    conn_id,
                    kind: countdown.kind,
                    remaining_ms: 0,
                    expired: true,
                });
                done.push(conn_id);
                continue;
            }

            let remaining = countdown.duration - elapsed;
            let in_window = countdown.notify_within.is_none_or(|w| remaining <= w);
            let whole_seconds = elapsed.as_secs();
            if in_window && whole_seconds > countdown.seconds_notified {
                countdown.seconds_notified = whole_seconds;
                fires.push(CountdownFire {
                    conn_id,
                    kind: countdown.kind,
                    remaining_ms: remaining.as_millis() as u64,
                    expired: false,
                });
            }
        }

        for conn_id in done {
            self.countdowns.remove(&conn_id);
        }
        fires
    }

    /// Build the externally-visible view of this room.
    pub fn snapshot(&self) -> RoomSnapshot {
        let active_clients = self
            .active
            .iter()
            .filter_map(|id| self.clients.get(id).map(|p| (*id, p.clone())))
            .collect();
        RoomSnapshot {
            id: self.id.clone(),
            name: self.name.clone(),
            max_clients: self.settings.max_clients,
            picked_timeout: self.settings.picked_timeout,
            session_duration: self.settings.session_duration,
            end_session_notification_timeout: self.settings.end_session_notification_timeout,
            average_session_duration: self.settings.average_session_duration,
            app: self.app,
            clients: self.clients.clone(),
            active_clients,
            queue: self.queue.iter().copied().collect(),
            picked_clients: self.picked.clone(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::Map;

    use super::*;
    use crate::testing::SimInstant;

    fn settings(max_clients: u32) -> RoomSettings {
        RoomSettings { max_clients, ..RoomSettings::default() }
    }

    fn room(max_clients: u32) -> Room<SimInstant> {
        Room::new("demo".to_string(), "Demo".to_string(), settings(max_clients))
    }

    fn profile(id: ConnectionId) -> ClientProfile {
        ClientProfile::new(id, Map::new())
    }

    fn at(ms: u64) -> SimInstant {
        SimInstant::from_millis(ms)
    }

    #[test]
    fn direct_admission_when_slot_free() {
        let mut room = room(2);
        assert_eq!(
            room.join(1, profile(1), at(0)),
            JoinOutcome::Admitted { confirmed_pick: false }
        );
        assert!(room.is_active(1));
        assert_eq!(room.queue_len(), 0);
    }

    #[test]
    fn full_room_queues_in_fifo_order() {
        let mut room = room(1);
        room.join(1, profile(1), at(0));
        assert_eq!(room.join(2, profile(2), at(0)), JoinOutcome::Queued { position: 0 });
        assert_eq!(room.join(3, profile(3), at(0)), JoinOutcome::Queued { position: 1 });
        assert_eq!(room.snapshot().queue, vec![2, 3]);
    }

    #[test]
    fn double_join_reports_current_state() {
        let mut room = room(1);
        room.join(1, profile(1), at(0));
        assert_eq!(room.join(1, profile(1), at(0)), JoinOutcome::AlreadyActive);

        room.join(2, profile(2), at(0));
        assert_eq!(room.join(2, profile(2), at(0)), JoinOutcome::AlreadyQueued);
    }

    #[test]
    fn leave_frees_slot_and_pick_promotes_head() {
        let mut room = room(1);
        room.join(1, profile(1), at(0));
        room.join(2, profile(2), at(0));
        room.join(3, profile(3), at(0));

        let report = room.leave(1);
        assert!(report.was_active);
        assert!(report.freed_slot());

        let picked = room.pick_next(at(1_000), |_| true);
        assert_eq!(picked, Some(2));
        assert_eq!(room.snapshot().picked_clients, vec![2]);
        // Promotion reserves the slot
        assert!(!room.has_free_slot());
        assert_eq!(room.pick_next(at(1_000), |_| true), None);
    }

    #[test]
    fn confirming_a_pick_admits_and_cancels_countdown() {
        let mut room = room(1);
        room.join(1, profile(1), at(0));
        room.join(2, profile(2), at(0));
        room.leave(1);
        room.pick_next(at(0), |_| true);

        assert_eq!(
            room.join(2, profile(2), at(1_000)),
            JoinOutcome::Admitted { confirmed_pick: true }
        );
        assert!(room.is_active(2));
        // Far past the picked window: the cancelled countdown must not fire
        let fires: Vec<_> =
            room.tick(at(60_000)).into_iter().filter(|f| f.kind == TimerKind::Picked).collect();
        assert!(fires.is_empty());
    }

    #[test]
    fn pick_skips_dead_queue_entries() {
        let mut room = room(1);
        room.join(1, profile(1), at(0));
        room.join(2, profile(2), at(0));
        room.join(3, profile(3), at(0));
        room.leave(1);

        let picked = room.pick_next(at(0), |conn| conn != 2);
        assert_eq!(picked, Some(3));
        // The stale entry is gone entirely
        assert!(!room.is_member(2));
        assert_eq!(room.queue_len(), 0);
    }

    #[test]
    fn picked_countdown_notifies_per_second_then_expires() {
        let mut room = room(1);
        room.join(1, profile(1), at(0));
        room.join(2, profile(2), at(0));
        room.leave(1);
        room.pick_next(at(0), |_| true);

        // Sub-second tick: nothing yet
        assert!(room.tick(at(500)).is_empty());

        let fires = room.tick(at(1_100));
        assert_eq!(fires.len(), 1);
        assert_eq!(fires[0].kind, TimerKind::Picked);
        assert!(!fires[0].expired);
        assert_eq!(fires[0].remaining_ms, 8_900);

        // Same second again: no duplicate
        assert!(room.tick(at(1_900)).is_empty());

        let fires = room.tick(at(10_000));
        assert_eq!(fires.len(), 1);
        assert!(fires[0].expired);
        // Expired countdown is removed
        assert!(room.tick(at(11_000)).is_empty());
    }

    #[test]
    fn session_countdown_only_notifies_inside_end_window() {
        // 10s session, notifications in the last 5s
        let mut room = room(1);
        room.join(1, profile(1), at(0));

        // 2s elapsed, 8s remaining: outside the window
        assert!(room.tick(at(2_000)).is_empty());

        // 6s elapsed, 4s remaining: inside
        let fires = room.tick(at(6_000));
        assert_eq!(fires.len(), 1);
        assert_eq!(fires[0].kind, TimerKind::Session);
        assert_eq!(fires[0].remaining_ms, 4_000);

        let fires = room.tick(at(10_500));
        assert_eq!(fires.len(), 1);
        assert!(fires[0].expired);
    }

    #[test]
    fn unbounded_session_never_counts_down() {
        let mut room: Room<SimInstant> = Room::new(
            "demo".to_string(),
            "Demo".to_string(),
            RoomSettings { max_clients: 1, session_duration: -1, ..RoomSettings::default() },
        );
        room.join(1, profile(1), at(0));
        assert!(room.tick(at(3_600_000)).is_empty());
        assert!(room.is_active(1));
    }

    #[test]
    fn leave_is_idempotent() {
        let mut room = room(1);
        let report = room.leave(99);
        assert!(!report.was_member());
        assert!(!report.freed_slot());
    }

    #[test]
    fn unlimited_capacity_admits_everyone() {
        let mut room = room(0);
        for conn in 1..=50 {
            assert_eq!(
                room.join(conn, profile(conn), at(0)),
                JoinOutcome::Admitted { confirmed_pick: false }
            );
        }
        assert_eq!(room.queue_len(), 0);
    }

    #[test]
    fn snapshot_reflects_every_occupancy_state() {
        let mut room = room(1);
        room.join(1, profile(1), at(0));
        room.join(2, profile(2), at(0));
        room.set_app(9);

        let snapshot = room.snapshot();
        assert_eq!(snapshot.app, Some(9));
        assert_eq!(snapshot.clients.len(), 2);
        assert_eq!(snapshot.active_clients.keys().copied().collect::<Vec<_>>(), vec![1]);
        assert_eq!(snapshot.queue, vec![2]);
        assert!(snapshot.picked_clients.is_empty());
    }
}
