//! The miner process: connects to the coordinator, maintains a transaction
//! pool, and alternates between mining and voting on other miners' blocks
//! (spec §4.1, §4.7, §9). Grounded in the reference implementation's
//! `PoWNode`.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use chain_core::{mine_block, CancelToken, Chain, Transaction};
use shared::{Amount, KeyPair};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::wire::Message;

const BUFSIZE: usize = 1024 * 1024;

/// The miner's place in its local state machine (spec §9): `Mining` runs
/// the nonce search, `Paused` holds after finding or receiving a solution
/// while a vote is pending, `Idle` sits out a round that found no winner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Mining,
    Paused,
}

struct Shared {
    keypair: KeyPair,
    chain: Mutex<Chain>,
    pool: Mutex<Vec<Transaction>>,
    state: Mutex<State>,
    solution_found: AtomicBool,
    cancel: CancelToken,
}

/// A connected miner node, driving its own reader/writer loop against the
/// coordinator's socket.
pub struct Miner {
    shared: Arc<Shared>,
    stream: TcpStream,
}

impl Miner {
    pub fn connect(host: &str, port: u16) -> Result<Self> {
        let stream = TcpStream::connect((host, port))?;
        let keypair = KeyPair::generate()?;
        Ok(Self {
            shared: Arc::new(Shared {
                keypair,
                chain: Mutex::new(Chain::new()),
                pool: Mutex::new(Vec::new()),
                state: Mutex::new(State::Idle),
                solution_found: AtomicBool::new(false),
                cancel: CancelToken::new(),
            }),
            stream,
        })
    }

    fn keyhash(&self) -> String {
        self.shared
            .keypair
            .public
            .hash()
            .expect("key material was generated locally and is well-formed")
    }

    fn send(&self, message: &Message) {
        let payload = serde_json::to_vec(message).expect("message is serializable");
        if let Err(err) = (&self.stream).write_all(&payload) {
            warn!(%err, "failed to send to coordinator");
        }
    }

    /// Main receive loop: reads one message per `recv`, exactly mirroring
    /// the reference implementation's assumption that the simulator's
    /// localhost sockets never fragment a send across reads.
    pub fn run(mut self) -> Result<()> {
        let mut buf = vec![0u8; BUFSIZE];
        loop {
            let n = self.stream.read(&mut buf)?;
            if n == 0 {
                info!("coordinator closed the connection");
                return Ok(());
            }
            let Ok(message) = serde_json::from_slice::<Message>(&buf[..n]) else {
                debug!("received malformed or unrecognized message, ignoring");
                continue;
            };
            if matches!(message, Message::CloseConnection) {
                return Ok(());
            }
            self.handle(message);
        }
    }

    fn handle(&mut self, message: Message) {
        match message {
            Message::Transaction { transaction } => self.add_transaction(transaction),
            Message::Mine { difficulty } => self.start_mining(difficulty),
            Message::Verify {
                block: Some(block),
                difficulty: Some(difficulty),
                ..
            } => self.vote_on(&block, &difficulty),
            Message::Veredict { block, r#final } => self.handle_veredict(block, r#final),
            Message::Chain { blockchain } => self.handle_chain_offer(blockchain),
            Message::Keys { .. } => self.send(&Message::Keys {
                priv_key: Some(
                    self.shared
                        .keypair
                        .private
                        .dump()
                        .expect("key material was generated locally and is well-formed"),
                ),
                pub_key: Some(
                    self.shared
                        .keypair
                        .public
                        .dump()
                        .expect("key material was generated locally and is well-formed"),
                ),
            }),
            Message::Solution { .. } | Message::Verify { vote: Some(_), .. } | Message::CloseConnection => {
                debug!("ignoring message the miner only ever sends");
            }
            Message::Verify { .. } => {
                debug!("ignoring malformed verify request missing block or difficulty");
            }
        }
    }

    /// Validates an incoming transaction against the local chain and, if
    /// it passes, appends it to the mining pool (spec §4.4, §9).
    fn add_transaction(&self, transaction: Transaction) {
        let fee = match self.shared.chain.lock().unwrap().validate_transaction(&transaction) {
            Ok(fee) => fee,
            Err(err) => {
                debug!(%err, "rejecting invalid transaction");
                return;
            }
        };
        debug!(%fee, "adding transaction to pool");
        self.shared.pool.lock().unwrap().push(transaction);
    }

    /// Spawns the mining thread for this round (spec §4.7). Only legal from
    /// `Idle`; a stray `mine` arriving mid-round (e.g. a re-sent broadcast)
    /// is ignored rather than restarting the search.
    fn start_mining(&self, difficulty: String) {
        {
            let mut state = self.shared.state.lock().unwrap();
            if *state != State::Idle {
                debug!(?state, "ignoring mine while not idle");
                return;
            }
            *state = State::Mining;
        }
        self.shared.solution_found.store(false, Ordering::SeqCst);
        self.shared.cancel.reset();

        let shared = Arc::clone(&self.shared);
        let stream = self.stream.try_clone().expect("socket clone should not fail");
        let keyhash = self.keyhash();

        thread::spawn(move || {
            let pool = shared.pool.lock().unwrap().clone();
            let fee_total = pool
                .iter()
                .filter_map(|tx| tx.outputs.iter().filter_map(chain_core::TxOutput::amount).next())
                .fold(Amount::ZERO, |acc, a| acc + a);
            let parent = shared.chain.lock().unwrap().last_hash();

            let result = mine_block(
                parent,
                pool,
                fee_total,
                keyhash,
                &difficulty,
                chrono::Utc::now().timestamp(),
                &shared.cancel,
            );

            match result {
                Ok(Some(found)) => {
                    let mut state = shared.state.lock().unwrap();
                    // A verify request may have paused us and claimed
                    // solution_found between the target check and this lock.
                    if *state != State::Mining || shared.solution_found.swap(true, Ordering::SeqCst) {
                        return;
                    }
                    *state = State::Paused;
                    drop(state);
                    let payload = serde_json::to_vec(&Message::Solution { block: found.block })
                        .expect("message is serializable");
                    let _ = (&stream).write_all(&payload);
                }
                Ok(None) => {
                    // Cancelled: another miner's solution preempted the search.
                }
                Err(err) => warn!(%err, "mining attempt failed"),
            }
        });
    }

    /// Votes on a candidate block (spec §9 `Paused --verify--> Voting`, or
    /// a pause out of `Mining` for the same reason). Ignored while `Idle`:
    /// no round is in progress to vote on.
    fn vote_on(&mut self, block: &chain_core::Block, difficulty: &str) {
        {
            let mut state = self.shared.state.lock().unwrap();
            if *state == State::Idle {
                debug!("ignoring verify request while idle");
                return;
            }
            *state = State::Paused;
        }
        self.shared.solution_found.store(true, Ordering::SeqCst);
        self.shared.cancel.cancel();

        let valid = self.shared.chain.lock().unwrap().validate_block(block, difficulty).is_ok();
        self.send(&Message::verify_vote(valid));
    }

    /// Applies a round verdict. Only legal from `Paused`; a veredict with
    /// no pending vote (e.g. a duplicate broadcast) is ignored.
    fn handle_veredict(&mut self, block: Option<chain_core::Block>, is_final: bool) {
        {
            let state = self.shared.state.lock().unwrap();
            if *state != State::Paused {
                debug!(?state, "ignoring veredict while not paused");
                return;
            }
        }
        match block {
            Some(block) => {
                let target = block.header.target.clone();
                if let Err(err) = self.shared.chain.lock().unwrap().add_block(block, &target) {
                    warn!(%err, "accepted block failed local validation");
                }
                self.shared.pool.lock().unwrap().clear();
                *self.shared.state.lock().unwrap() = State::Idle;
            }
            None if is_final => {
                self.shared.solution_found.store(false, Ordering::SeqCst);
                *self.shared.state.lock().unwrap() = State::Idle;
            }
            None => {
                // final:false — stay paused, awaiting the next candidate.
            }
        }
    }

    fn handle_chain_offer(&mut self, blocks: Vec<chain_core::Block>) {
        let mut candidate = Chain::new();
        for block in blocks {
            let target = block.header.target.clone();
            if candidate.add_block(block, &target).is_err() {
                debug!("offered chain failed to revalidate, ignoring");
                return;
            }
        }
        let mut chain = self.shared.chain.lock().unwrap();
        match chain.reconcile(candidate) {
            Ok(true) => info!("adopted a longer chain from the coordinator"),
            Ok(false) => {}
            Err(err) => warn!(%err, "offered chain failed reconciliation"),
        }
    }
}

