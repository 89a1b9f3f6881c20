use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::error;

use crate::error::StrategyFault;
use crate::strategy::{FallbackStrategy, Opponent, Sensing, Strategy, StrategyFactory};
use crate::types::{Attack, CritterId, Direction};

#[derive(Clone, Debug)]
pub enum Request {
    Move(Sensing),
    Attack(Opponent),
    Eat,
    Appearance,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    Ready,
    Move(Direction),
    Attack(Attack),
    Eat(bool),
    Appearance { symbol: char, color: String },
}

struct Envelope {
    seq: u64,
    request: Request,
}

struct Response {
    seq: u64,
    result: Result<Reply, String>,
}

/// Handle for a request that has been sent to a worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ticket(u64);

const CREATE_SEQ: u64 = 0;

/// Runs one critter's strategy on its own thread. Every call is bounded by a
/// time budget; a worker still busy past its budget answers `Busy` until it
/// catches up, and its late reply is discarded.
pub struct StrategyHost {
    critter: CritterId,
    requests: Option<Sender<Envelope>>,
    replies: Receiver<Response>,
    next_seq: u64,
    outstanding: Option<u64>,
    budget: Duration,
}

impl std::fmt::Debug for StrategyHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyHost")
            .field("critter", &self.critter)
            .field("outstanding", &self.outstanding)
            .field("budget", &self.budget)
            .finish()
    }
}

impl StrategyHost {
    /// Starts the worker, which builds its strategy from `factory(seed)`.
    /// Construction counts as the first request; see [`StrategyHost::await_ready`].
    pub fn spawn(critter: CritterId, factory: StrategyFactory, seed: u64, budget: Duration) -> Self {
        let (request_tx, request_rx) = mpsc::channel::<Envelope>();
        let (reply_tx, reply_rx) = mpsc::channel::<Response>();

        let spawned = thread::Builder::new()
            .name(format!("{critter}"))
            .spawn(move || run_worker(factory, seed, request_rx, reply_tx));

        let requests = match spawned {
            Ok(_) => Some(request_tx),
            Err(err) => {
                error!(critter = %critter, error = %err, "failed to spawn strategy worker");
                None
            }
        };

        Self {
            critter,
            requests,
            replies: reply_rx,
            next_seq: CREATE_SEQ + 1,
            outstanding: Some(CREATE_SEQ),
            budget,
        }
    }

    pub fn critter(&self) -> CritterId {
        self.critter
    }

    /// Waits for construction to finish. A panicking constructor leaves the
    /// worker running a [`FallbackStrategy`].
    pub fn await_ready(&mut self, deadline: Instant) -> Result<(), StrategyFault> {
        match self.collect(Ticket(CREATE_SEQ), deadline)? {
            Reply::Ready => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    pub fn dispatch(&mut self, request: Request) -> Result<Ticket, StrategyFault> {
        self.drain_late_replies()?;
        if self.outstanding.is_some() {
            return Err(StrategyFault::Busy);
        }
        let Some(requests) = &self.requests else {
            return Err(StrategyFault::Disconnected);
        };
        let seq = self.next_seq;
        self.next_seq += 1;
        if requests.send(Envelope { seq, request }).is_err() {
            self.requests = None;
            return Err(StrategyFault::Disconnected);
        }
        self.outstanding = Some(seq);
        Ok(Ticket(seq))
    }

    pub fn collect(&mut self, ticket: Ticket, deadline: Instant) -> Result<Reply, StrategyFault> {
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.replies.recv_timeout(remaining) {
                Ok(response) if response.seq == ticket.0 => {
                    self.outstanding = None;
                    return response.result.map_err(StrategyFault::Panicked);
                }
                Ok(_) => continue,
                Err(RecvTimeoutError::Timeout) => return Err(StrategyFault::TimedOut),
                Err(RecvTimeoutError::Disconnected) => {
                    self.outstanding = None;
                    self.requests = None;
                    return Err(StrategyFault::Disconnected);
                }
            }
        }
    }

    pub fn call(&mut self, request: Request) -> Result<Reply, StrategyFault> {
        let ticket = self.dispatch(request)?;
        self.collect(ticket, Instant::now() + self.budget)
    }

    pub fn decide_move(&mut self, sensing: Sensing) -> Result<Direction, StrategyFault> {
        match self.call(Request::Move(sensing))? {
            Reply::Move(dir) => Ok(dir),
            other => Err(unexpected(other)),
        }
    }

    pub fn decide_attack(&mut self, opponent: Opponent) -> Result<Attack, StrategyFault> {
        match self.call(Request::Attack(opponent))? {
            Reply::Attack(attack) => Ok(attack),
            other => Err(unexpected(other)),
        }
    }

    pub fn decide_eat(&mut self) -> Result<bool, StrategyFault> {
        match self.call(Request::Eat)? {
            Reply::Eat(eat) => Ok(eat),
            other => Err(unexpected(other)),
        }
    }

    /// Symbol and color, unvalidated.
    pub fn appearance(&mut self) -> Result<(char, String), StrategyFault> {
        match self.call(Request::Appearance)? {
            Reply::Appearance { symbol, color } => Ok((symbol, color)),
            other => Err(unexpected(other)),
        }
    }

    fn drain_late_replies(&mut self) -> Result<(), StrategyFault> {
        while let Some(pending) = self.outstanding {
            match self.replies.try_recv() {
                Ok(response) if response.seq == pending => self.outstanding = None,
                Ok(_) => continue,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.outstanding = None;
                    self.requests = None;
                    return Err(StrategyFault::Disconnected);
                }
            }
        }
        Ok(())
    }
}

pub fn expect_move(reply: Result<Reply, StrategyFault>) -> Result<Direction, StrategyFault> {
    match reply? {
        Reply::Move(dir) => Ok(dir),
        other => Err(unexpected(other)),
    }
}

fn unexpected(reply: Reply) -> StrategyFault {
    StrategyFault::InvalidReply(format!("unexpected reply {reply:?}"))
}

fn run_worker(
    factory: StrategyFactory,
    seed: u64,
    requests: Receiver<Envelope>,
    replies: Sender<Response>,
) {
    let (mut strategy, created): (Box<dyn Strategy>, _) =
        match catch_unwind(AssertUnwindSafe(|| factory(seed))) {
            Ok(strategy) => (strategy, Ok(Reply::Ready)),
            Err(payload) => (
                Box::new(FallbackStrategy) as Box<dyn Strategy>,
                Err(panic_message(payload.as_ref())),
            ),
        };
    if replies
        .send(Response {
            seq: CREATE_SEQ,
            result: created,
        })
        .is_err()
    {
        return;
    }

    while let Ok(Envelope { seq, request }) = requests.recv() {
        let result = catch_unwind(AssertUnwindSafe(|| serve(strategy.as_mut(), request)))
            .map_err(|payload| panic_message(payload.as_ref()));
        if replies.send(Response { seq, result }).is_err() {
            break;
        }
    }
}

fn serve(strategy: &mut dyn Strategy, request: Request) -> Reply {
    match request {
        Request::Move(sensing) => Reply::Move(strategy.decide_move(&sensing)),
        Request::Attack(opponent) => Reply::Attack(strategy.decide_attack(&opponent)),
        Request::Eat => Reply::Eat(strategy.decide_eat()),
        Request::Appearance => Reply::Appearance {
            symbol: strategy.display_symbol(),
            color: strategy.display_color(),
        },
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
