//! The coordinator process: a TCP star-topology hub that broadcasts mining
//! rounds to every connected miner and runs the 51%-quorum voting engine
//! (spec §4.1, §4.5, §4.9). Grounded in the reference implementation's
//! `InterfaceDaemon`: a receiver thread per connection feeding a single
//! round engine guarded by a lock and condition variable, replacing that
//! source's `idle`/`voting_started`/`voting_over` events with explicit
//! `RoundState` transitions.

use std::collections::{HashMap, VecDeque};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

use chain_core::{target_for, Block, Chain, Transaction};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::wire::Message;

pub type ConnId = u64;

const BUFSIZE: usize = 1024 * 1024;

/// The coordinator's view of an in-progress mining round.
#[derive(Debug, Default)]
enum RoundState {
    #[default]
    Idle,
    Mining {
        target: String,
        queue: VecDeque<(ConnId, Block)>,
        voting: Option<Voting>,
    },
}

#[derive(Debug)]
struct Voting {
    pollable: usize,
    consensus: Vec<u8>,
}

/// Whether a vote tally has reached a decision, mirroring
/// `InterfaceDaemon.voting_finished` (spec §4.9): unanimous, or at least
/// 51% of the pollable miners voted yes.
#[must_use]
pub fn voting_finished(consensus: &[u8], pollable: usize) -> bool {
    if pollable == 0 {
        return true;
    }
    consensus.len() == pollable
        || f64::from(consensus.iter().map(|&v| u32::from(v)).sum::<u32>()) >= 0.51 * pollable as f64
}

/// Whether a finished tally accepted the candidate block.
#[must_use]
pub fn accepted(consensus: &[u8], pollable: usize) -> bool {
    if pollable == 0 {
        // E1: a lone miner has nobody to poll; auto-accept.
        return true;
    }
    f64::from(consensus.iter().map(|&v| u32::from(v)).sum::<u32>()) >= 0.51 * pollable as f64
}

struct Connection {
    writer: TcpStream,
}

struct Inner {
    chain: Mutex<Chain>,
    connections: Mutex<HashMap<ConnId, Connection>>,
    pool: Mutex<Vec<Transaction>>,
    round: Mutex<RoundState>,
    round_cv: Condvar,
    next_id: AtomicU64,
    base_difficulty: u8,
    // Reported key material, keyed by connection id (spec §4.12). Populated
    // on a miner's unsolicited `keys` response; nothing in this binary
    // requests it, since the consumer is a UI this simulator doesn't have.
    keys: Mutex<HashMap<ConnId, (String, String)>>,
}

/// Runs the star-topology network: accepts miner connections and drives
/// mining rounds against them.
pub struct Coordinator {
    listener: TcpListener,
    inner: Arc<Inner>,
}

impl Coordinator {
    pub fn bind(host: &str, port: u16, base_difficulty: u8) -> Result<Self> {
        let listener = TcpListener::bind((host, port))?;
        Ok(Self {
            listener,
            inner: Arc::new(Inner {
                chain: Mutex::new(Chain::new()),
                connections: Mutex::new(HashMap::new()),
                pool: Mutex::new(Vec::new()),
                round: Mutex::new(RoundState::Idle),
                round_cv: Condvar::new(),
                next_id: AtomicU64::new(0),
                base_difficulty,
                keys: Mutex::new(HashMap::new()),
            }),
        })
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.inner.connections.lock().unwrap().len()
    }

    /// Accepts connections forever, spawning one reader thread per miner.
    /// Each reader thread dispatches parsed messages back into shared state.
    /// A non-empty chain is sent to the new miner immediately (spec §4.11),
    /// before the connection is registered for broadcasts.
    pub fn accept_loop(&self) -> Result<()> {
        loop {
            let (stream, addr) = self.listener.accept()?;
            info!(%addr, "miner connected");
            let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
            let mut writer = stream.try_clone()?;

            let blocks = self.inner.chain.lock().unwrap().blocks().to_vec();
            if !blocks.is_empty() {
                let payload = serde_json::to_vec(&Message::Chain { blockchain: blocks })
                    .expect("message is serializable");
                if let Err(err) = writer.write_all(&payload) {
                    warn!(%id, %err, "failed to seed chain for new miner");
                }
            }

            self.inner
                .connections
                .lock()
                .unwrap()
                .insert(id, Connection { writer });

            let inner = Arc::clone(&self.inner);
            thread::spawn(move || handle_connection(inner, id, stream));
        }
    }

    /// Broadcasts a transaction to every connected miner (spec §4.2).
    pub fn submit_transaction(&self, transaction: Transaction) {
        self.broadcast(&Message::Transaction { transaction });
    }

    /// Runs one full mining round: broadcast `mine`, collect solutions,
    /// poll votes on each in turn, and settle on a verdict (spec §4.9).
    pub fn run_round(&self) {
        let node_count = self.node_count();
        let target = target_for(node_count, self.inner.base_difficulty);

        {
            let mut round = self.inner.round.lock().unwrap();
            *round = RoundState::Mining {
                target: target.clone(),
                queue: VecDeque::new(),
                voting: None,
            };
        }
        self.broadcast(&Message::Mine {
            difficulty: target.clone(),
        });

        loop {
            let next = {
                let mut round = self.inner.round.lock().unwrap();
                loop {
                    let RoundState::Mining { queue, voting, .. } = &mut *round else {
                        return;
                    };
                    if voting.is_none() {
                        if let Some((origin, block)) = queue.pop_front() {
                            let pollable = self
                                .inner
                                .connections
                                .lock()
                                .unwrap()
                                .keys()
                                .filter(|&&id| id != origin)
                                .count();
                            *voting = Some(Voting {
                                pollable,
                                consensus: Vec::new(),
                            });
                            break Some((origin, block, pollable, target.clone()));
                        }
                    }
                    round = self.inner.round_cv.wait(round).unwrap();
                }
            };

            let Some((origin, block, pollable, target)) = next else {
                break;
            };

            if pollable > 0 {
                self.broadcast_except(
                    origin,
                    &Message::verify_request(block.clone(), target.clone()),
                );
            }

            let verdict = {
                let mut round = self.inner.round.lock().unwrap();
                loop {
                    let RoundState::Mining { voting, .. } = &*round else {
                        return;
                    };
                    let Some(v) = voting else { break None };
                    if voting_finished(&v.consensus, v.pollable) {
                        break Some(accepted(&v.consensus, v.pollable));
                    }
                    round = self.inner.round_cv.wait(round).unwrap();
                }
            };

            let Some(accept) = verdict else { continue };

            if accept {
                self.finish_round(Some(block));
                return;
            }

            let exhausted = {
                let mut round = self.inner.round.lock().unwrap();
                let RoundState::Mining { queue, voting, .. } = &mut *round else {
                    return;
                };
                *voting = None;
                queue.is_empty()
            };

            if exhausted {
                self.finish_round(None);
                return;
            }
            self.broadcast(&Message::veredict_final(false));
        }
    }

    fn finish_round(&self, accepted_block: Option<Block>) {
        match accepted_block {
            Some(block) => {
                let target = {
                    let round = self.inner.round.lock().unwrap();
                    match &*round {
                        RoundState::Mining { target, .. } => target.clone(),
                        RoundState::Idle => String::new(),
                    }
                };
                if let Err(err) = self.inner.chain.lock().unwrap().add_block(block.clone(), &target) {
                    warn!(%err, "accepted block failed local validation");
                }
                self.inner.pool.lock().unwrap().clear();
                self.broadcast(&Message::veredict_accept(block));
            }
            None => {
                self.broadcast(&Message::veredict_final(true));
            }
        }
        *self.inner.round.lock().unwrap() = RoundState::Idle;
    }

    fn broadcast(&self, message: &Message) {
        let mut connections = self.inner.connections.lock().unwrap();
        let payload = serde_json::to_vec(message).expect("message is serializable");
        connections.retain(|id, conn| match conn.writer.write_all(&payload) {
            Ok(()) => true,
            Err(err) => {
                warn!(%id, %err, "failed to send to miner, dropping connection");
                false
            }
        });
    }

    fn broadcast_except(&self, except: ConnId, message: &Message) {
        let mut connections = self.inner.connections.lock().unwrap();
        let payload = serde_json::to_vec(message).expect("message is serializable");
        connections.retain(|id, conn| {
            if *id == except {
                return true;
            }
            match conn.writer.write_all(&payload) {
                Ok(()) => true,
                Err(err) => {
                    warn!(%id, %err, "failed to send to miner, dropping connection");
                    false
                }
            }
        });
    }
}

fn handle_connection(inner: Arc<Inner>, id: ConnId, mut stream: TcpStream) {
    let mut buf = vec![0u8; BUFSIZE];
    loop {
        let n = match stream.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        let Ok(message) = serde_json::from_slice::<Message>(&buf[..n]) else {
            debug!(%id, "received malformed or unrecognized message, ignoring");
            continue;
        };

        match message {
            Message::Solution { block } => {
                let mut round = inner.round.lock().unwrap();
                if let RoundState::Mining { queue, voting, .. } = &mut *round {
                    if voting.is_none() {
                        queue.push_back((id, block));
                        inner.round_cv.notify_all();
                    }
                }
            }
            Message::Verify {
                vote: Some(vote), ..
            } => {
                let mut round = inner.round.lock().unwrap();
                if let RoundState::Mining { voting: Some(v), .. } = &mut *round {
                    v.consensus.push(vote);
                    inner.round_cv.notify_all();
                }
            }
            Message::Chain { blockchain } => {
                let mut candidate = Chain::new();
                let mut ok = true;
                for block in blockchain {
                    let target = block.header.target.clone();
                    if candidate.add_block(block, &target).is_err() {
                        ok = false;
                        break;
                    }
                }
                if ok {
                    let mut chain = inner.chain.lock().unwrap();
                    match chain.reconcile(candidate) {
                        Ok(true) => info!(%id, "adopted longer chain from miner"),
                        Ok(false) => {}
                        Err(err) => warn!(%id, %err, "offered chain failed reconciliation"),
                    }
                }
            }
            Message::Transaction { transaction } => {
                let accepted = inner.chain.lock().unwrap().validate_transaction(&transaction).is_ok();
                if accepted {
                    inner.pool.lock().unwrap().push(transaction.clone());
                    let payload = serde_json::to_vec(&Message::Transaction { transaction })
                        .expect("message is serializable");
                    let mut connections = inner.connections.lock().unwrap();
                    connections.retain(|peer, conn| {
                        if *peer == id {
                            return true;
                        }
                        match conn.writer.write_all(&payload) {
                            Ok(()) => true,
                            Err(err) => {
                                warn!(%peer, %err, "failed to send to miner, dropping connection");
                                false
                            }
                        }
                    });
                } else {
                    debug!(%id, "rejecting invalid transaction from miner");
                }
            }
            Message::Keys {
                priv_key: Some(priv_key),
                pub_key: Some(pub_key),
            } => {
                inner.keys.lock().unwrap().insert(id, (priv_key, pub_key));
            }
            Message::Keys { .. } | Message::CloseConnection => {
                debug!(%id, "ignoring message not expected inbound from a miner");
            }
            Message::Verify { vote: None, .. } | Message::Mine { .. } | Message::Veredict { .. } => {
                debug!(%id, "ignoring message the coordinator only ever sends");
            }
        }
    }

    inner.connections.lock().unwrap().remove(&id);
    info!(%id, "miner disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;

    // P5: 51% quorum over the live node count, not the vote count.
    #[test]
    fn three_of_four_yes_votes_accepts_before_everyone_has_voted() {
        assert!(!voting_finished(&[1, 1], 4));
        assert!(voting_finished(&[1, 1, 1], 4));
        assert!(accepted(&[1, 1, 1], 4));
    }

    #[test]
    fn exact_51_percent_boundary_is_inclusive() {
        // 0.51 * 100 = 51.0 exactly; 51 yes votes must accept.
        let consensus = vec![1u8; 51];
        assert!(accepted(&consensus, 100));
    }

    #[test]
    fn fifty_percent_is_not_enough() {
        let consensus = vec![1u8; 50];
        assert!(!accepted(&consensus, 100));
    }

    // E1: lone miner has no pollable voters, auto-accepts.
    #[test]
    fn zero_pollable_voters_auto_accepts() {
        assert!(voting_finished(&[], 0));
        assert!(accepted(&[], 0));
    }

    // E2: two miners, one rejects, round ends in final:true and resets.
    #[test]
    fn unanimous_reject_is_not_accepted() {
        assert!(voting_finished(&[0], 1));
        assert!(!accepted(&[0], 1));
    }

    #[test]
    fn voting_not_finished_until_threshold_or_unanimous() {
        assert!(!voting_finished(&[1], 4));
        assert!(!voting_finished(&[1, 0], 4));
    }
}
