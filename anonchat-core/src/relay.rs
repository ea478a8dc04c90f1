// ABOUTME: In-memory pairing queue and active-pair relay table
// ABOUTME: Pure state transitions; callers perform notifications based on the returned outcome

use std::collections::{HashMap, HashSet, VecDeque};

use crate::traits::UserId;

/// Result of a partner request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairOutcome {
    Banned,
    AlreadyWaiting,
    /// Requester already has a partner; nothing changes
    AlreadyPaired { partner: UserId },
    /// Matched with the oldest waiting user
    Paired { partner: UserId },
    /// Nobody was waiting; requester joined the queue
    Queued,
}

/// Where a relayed message should go
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayTarget {
    Banned,
    NoPartner,
    Partner(UserId),
}

/// Result of ending a chat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndOutcome {
    Banned,
    NotChatting,
    Ended { partner: UserId },
}

/// Waiting queue, active pairs, bans, and seen users.
///
/// Invariants kept by every operation:
/// - a user is never both waiting and paired
/// - pairs are symmetric
/// - the waiting queue holds no duplicates
///
/// Bans are checked lazily: banning a user leaves an existing pair alone, and
/// a banned waiter stays queued until the next match skips over them.
#[derive(Debug, Default)]
pub struct RelayTable {
    waiting: VecDeque<UserId>,
    pairs: HashMap<UserId, UserId>,
    banned: HashSet<UserId>,
    seen: HashSet<UserId>,
}

impl RelayTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Match the requester with the oldest waiting user, or queue them.
    pub fn request_partner(&mut self, uid: UserId) -> PairOutcome {
        if self.banned.contains(&uid) {
            return PairOutcome::Banned;
        }
        if self.waiting.contains(&uid) {
            return PairOutcome::AlreadyWaiting;
        }
        if let Some(&partner) = self.pairs.get(&uid) {
            return PairOutcome::AlreadyPaired { partner };
        }

        match self.pop_eligible_waiter() {
            Some(partner) => {
                self.pairs.insert(uid, partner);
                self.pairs.insert(partner, uid);
                PairOutcome::Paired { partner }
            }
            None => {
                self.waiting.push_back(uid);
                PairOutcome::Queued
            }
        }
    }

    /// Pop the oldest waiter who is not banned. Banned waiters found on the
    /// way are dropped from the queue.
    fn pop_eligible_waiter(&mut self) -> Option<UserId> {
        while let Some(candidate) = self.waiting.pop_front() {
            if !self.banned.contains(&candidate) {
                return Some(candidate);
            }
            tracing::debug!(user_id = %candidate, "Dropping banned user from waiting queue");
        }
        None
    }

    /// Resolve the partner a message from `uid` should be relayed to
    pub fn partner_of(&self, uid: UserId) -> RelayTarget {
        if self.banned.contains(&uid) {
            return RelayTarget::Banned;
        }
        match self.pairs.get(&uid) {
            Some(&partner) => RelayTarget::Partner(partner),
            None => RelayTarget::NoPartner,
        }
    }

    /// Dissolve the pair containing `uid`, removing both sides together.
    pub fn end_chat(&mut self, uid: UserId) -> EndOutcome {
        if self.banned.contains(&uid) {
            return EndOutcome::Banned;
        }
        match self.pairs.remove(&uid) {
            Some(partner) => {
                self.pairs.remove(&partner);
                EndOutcome::Ended { partner }
            }
            None => EndOutcome::NotChatting,
        }
    }

    /// Record a user as seen. Returns true only the first time.
    pub fn first_contact(&mut self, uid: UserId) -> bool {
        self.seen.insert(uid)
    }

    /// Ban a user. Returns false if they were already banned.
    pub fn ban(&mut self, uid: UserId) -> bool {
        self.banned.insert(uid)
    }

    pub fn is_banned(&self, uid: UserId) -> bool {
        self.banned.contains(&uid)
    }

    pub fn is_waiting(&self, uid: UserId) -> bool {
        self.waiting.contains(&uid)
    }

    pub fn waiting_len(&self) -> usize {
        self.waiting.len()
    }

    /// Number of active pairs (each pair counted once)
    pub fn pair_count(&self) -> usize {
        self.pairs.len() / 2
    }

    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    /// Check the structural invariants, returning a description of the first violation
    pub fn check_invariants(&self) -> Result<(), String> {
        let mut queued = HashSet::new();
        for uid in &self.waiting {
            if !queued.insert(*uid) {
                return Err(format!("user {} queued twice", uid));
            }
            if self.pairs.contains_key(uid) {
                return Err(format!("user {} both waiting and paired", uid));
            }
        }
        for (a, b) in &self.pairs {
            if a == b {
                return Err(format!("user {} paired with themselves", a));
            }
            if self.pairs.get(b) != Some(a) {
                return Err(format!("pair {} -> {} is not symmetric", a, b));
            }
        }
        Ok(())
    }
}
