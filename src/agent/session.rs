//! Agent-side sliding-window sender with TCP-Reno-style congestion control.
//!
//! Kept as a synchronous state machine driven by an explicit `Instant`
//! rather than calling the clock itself, so the whole control flow — slow
//! start, congestion avoidance, fast retransmit, fast recovery, the
//! timeout collapse, and the per-chunk retransmit cap — is unit-testable
//! without real sleeps or sockets. The async driver in `agent::mod` is a
//! thin loop around these methods.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::config::TunnelConfig;

struct InFlight {
    data: Vec<u8>,
    submitted_at: Instant,
}

/// Result of a [`AgentSession::sweep_timeouts`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutSweep {
    /// At least one in-flight chunk aged past the timeout.
    pub any_timed_out: bool,
    /// A congestion collapse was applied as a result (cwnd reset to 1).
    pub collapsed: bool,
}

/// Outcome of delivering one ACK value to [`AgentSession::on_ack`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// Case B: new cumulative ACK, window advanced.
    Advanced { new_base: u64 },
    /// Case C: a duplicate of `last_ack`, with the current dup count.
    Duplicate { dup_ack_count: u32 },
    /// Case C, `dup_ack_count >= drop threshold`: chunk force-dropped.
    ForcedDrop { dropped_seq: u64 },
    /// Case C, `dup_ack_count == fast-retransmit threshold`: chunk
    /// requeued for immediate resend.
    FastRetransmit { seq: u64 },
    /// Case C, fast-retransmit chunk itself exhausted its retry budget.
    FastRetransmitDrop { dropped_seq: u64 },
    /// Case D: a stale ACK, restarting the duplicate-ACK count at 1.
    Stale,
}

pub struct AgentSession {
    chunks: Vec<Vec<u8>>,
    cwnd: u32,
    ssthresh: u32,
    base: u64,
    next_seq: u64,
    in_flight: HashMap<u64, InFlight>,
    last_ack: i64,
    dup_ack_count: u32,
    in_fast_recovery: bool,
    retransmit_count: HashMap<u64, u32>,
    timeout: Duration,
    max_retransmit_per_chunk: u32,
    dup_ack_threshold: u32,
    dup_ack_drop_threshold: u32,
}

impl AgentSession {
    pub fn new(chunks: Vec<Vec<u8>>, config: &TunnelConfig) -> Self {
        AgentSession {
            chunks,
            cwnd: config.cwnd_initial,
            ssthresh: config.ssthresh_initial,
            base: 0,
            next_seq: 0,
            in_flight: HashMap::new(),
            last_ack: -1,
            dup_ack_count: 0,
            in_fast_recovery: false,
            retransmit_count: HashMap::new(),
            timeout: config.timeout,
            max_retransmit_per_chunk: config.max_retransmit_per_chunk,
            dup_ack_threshold: config.dup_ack_threshold,
            dup_ack_drop_threshold: config.dup_ack_drop_threshold,
        }
    }

    pub fn total_chunks(&self) -> u64 {
        self.chunks.len() as u64
    }

    pub fn is_complete(&self) -> bool {
        self.base >= self.total_chunks()
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn cwnd(&self) -> u32 {
        self.cwnd
    }

    /// The chunk the next probe should be sent for.
    pub fn probe_chunk(&self) -> &[u8] {
        &self.chunks[self.base as usize]
    }

    /// Step 1 — enroll every sequence up to `base + cwnd` (and within
    /// `total_chunks`) that is not already in flight.
    pub fn schedule(&mut self, now: Instant) {
        while self.next_seq < self.base + self.cwnd as u64 && self.next_seq < self.total_chunks() {
            let seq = self.next_seq;
            self.in_flight.insert(
                seq,
                InFlight {
                    data: self.chunks[seq as usize].clone(),
                    submitted_at: now,
                },
            );
            self.next_seq += 1;
        }
    }

    /// Step 2 — timeout sweep and, if warranted, congestion collapse.
    pub fn sweep_timeouts(&mut self, now: Instant) -> TimeoutSweep {
        let timed_out: Vec<u64> = self
            .in_flight
            .iter()
            .filter(|(_, entry)| now.duration_since(entry.submitted_at) > self.timeout)
            .map(|(seq, _)| *seq)
            .collect();

        if timed_out.is_empty() {
            return TimeoutSweep { any_timed_out: false, collapsed: false };
        }

        log::warn!("timeout for chunks: {timed_out:?}");
        for seq in &timed_out {
            let count = self.retransmit_count.entry(*seq).or_insert(0);
            *count += 1;
            if *count > self.max_retransmit_per_chunk {
                log::warn!("chunk {seq} dropped after {} timeouts", self.max_retransmit_per_chunk);
                self.in_flight.remove(seq);
                if self.base == *seq {
                    self.drop_base_chunk();
                }
                continue;
            }
            if let Some(entry) = self.in_flight.get_mut(seq) {
                entry.submitted_at = now;
            }
        }

        self.ssthresh = (self.cwnd / 2).max(1);
        self.cwnd = 1;
        self.next_seq = self.base;
        self.dup_ack_count = 0;
        self.in_fast_recovery = false;

        TimeoutSweep { any_timed_out: true, collapsed: true }
    }

    /// Step 4 — apply one ACK value received for the current probe.
    pub fn on_ack(&mut self, ack_seq: u64, now: Instant) -> AckOutcome {
        if ack_seq > self.base {
            for seq in self.base..ack_seq {
                self.in_flight.remove(&seq);
            }
            self.base = ack_seq;
            self.dup_ack_count = 0;
            self.last_ack = ack_seq as i64;

            if self.in_fast_recovery {
                self.cwnd = self.ssthresh;
                self.in_fast_recovery = false;
                log::info!("exiting fast recovery: cwnd = {}", self.cwnd);
            } else if self.cwnd < self.ssthresh {
                self.cwnd *= 2;
                log::info!("slow start -> cwnd = {}", self.cwnd);
            } else {
                self.cwnd += 1;
                log::info!("congestion avoidance -> cwnd = {}", self.cwnd);
            }
            return AckOutcome::Advanced { new_base: self.base };
        }

        if self.last_ack >= 0 && ack_seq == self.last_ack as u64 {
            self.dup_ack_count += 1;
            log::info!("duplicate ack for {ack_seq} ({})", self.dup_ack_count);

            if self.dup_ack_count >= self.dup_ack_drop_threshold {
                let count = self.retransmit_count.entry(ack_seq).or_insert(0);
                *count += 1;
                if *count > self.max_retransmit_per_chunk {
                    self.in_flight.remove(&ack_seq);
                    if self.base == ack_seq {
                        self.drop_base_chunk();
                    }
                    return AckOutcome::ForcedDrop { dropped_seq: ack_seq };
                }
            }

            if self.dup_ack_count == self.dup_ack_threshold && !self.in_fast_recovery {
                let count = self.retransmit_count.entry(ack_seq).or_insert(0);
                *count += 1;
                if *count > self.max_retransmit_per_chunk {
                    self.in_flight.remove(&ack_seq);
                    self.base = ack_seq + 1;
                    self.next_seq = self.base;
                    self.dup_ack_count = 0;
                    self.in_fast_recovery = false;
                    return AckOutcome::FastRetransmitDrop { dropped_seq: ack_seq };
                }

                log::info!("fast retransmit: resending chunk {ack_seq}");
                self.dup_ack_count = 0;
                if (ack_seq as usize) < self.chunks.len() {
                    self.in_flight.insert(
                        ack_seq,
                        InFlight { data: self.chunks[ack_seq as usize].clone(), submitted_at: now },
                    );
                    self.ssthresh = (self.cwnd / 2).max(1);
                    self.cwnd = self.ssthresh + 3;
                    self.in_fast_recovery = true;
                }
                return AckOutcome::FastRetransmit { seq: ack_seq };
            }

            return AckOutcome::Duplicate { dup_ack_count: self.dup_ack_count };
        }

        // Case D: stale ACK below last_ack (or no prior ack observed yet).
        self.dup_ack_count = 1;
        self.last_ack = ack_seq as i64;
        AckOutcome::Stale
    }

    /// Shared by the timeout-drop and the dup-ack-drop-threshold paths:
    /// advance `base`/`next_seq` past the chunk at `base` and reset the
    /// duplicate-ACK bookkeeping so the new base starts from a clean
    /// slate. A deliberate unification: the two drop paths reset the same
    /// three fields together rather than diverging in what they reset,
    /// so the duplicate counter always starts clean after a forward-progress
    /// event regardless of which path triggered it.
    fn drop_base_chunk(&mut self) {
        self.base += 1;
        self.next_seq = self.base;
        self.last_ack = self.base as i64;
        self.dup_ack_count = 0;
        self.in_fast_recovery = false;
    }
}
