//! Star shaped collectives between the coordinator (rank `0`) and its peers.
//!
//! The coordinator holds one channel per peer, every peer holds a single channel to the
//! coordinator. Receiving a collective is a barrier for the peer: it returns only once the
//! coordinator's data arrived.

use std::{num::NonZeroUsize, time::Duration};

use comms::{
    FrameReceiver, FrameSender,
    msg::{Command, Msg, Payload},
    specs::{training::TrainingSpec, worker::WorkerSpec},
};
use futures::future::try_join_all;
use log::{debug, info, warn};
use tokio::{
    io::{self, AsyncRead, AsyncWrite, DuplexStream, ReadHalf, WriteHalf},
    net::{
        TcpListener, TcpStream, ToSocketAddrs,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
};

use crate::{
    OrchestraErr, Result,
    data::DatasetMatrix,
    gather::Partial,
    partition::PartitionPlan,
};

/// Bytes buffered by each in-process pipe.
const LOCAL_PIPE_SIZE: usize = 64 * 1024;

/// An in-process communicator, see [`local_world`].
pub type LocalCommunicator = Communicator<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>;
/// A communicator over TCP, see [`accept`] and [`connect`].
pub type TcpCommunicator = Communicator<OwnedReadHalf, OwnedWriteHalf>;

/// One end of a channel plus the aligned buffer its messages are received into.
struct Link<R: AsyncRead + Unpin, W: AsyncWrite + Unpin> {
    rx: FrameReceiver<R>,
    tx: FrameSender<W>,
    buf: Vec<u32>,
}

impl<R, W> Link<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    fn new(rx: FrameReceiver<R>, tx: FrameSender<W>) -> Self {
        Self {
            rx,
            tx,
            buf: Vec::new(),
        }
    }

    async fn send(&mut self, msg: &Msg<'_>) -> Result<()> {
        self.tx.send(msg).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<Msg<'_>> {
        let Self { rx, buf, .. } = self;
        let msg = rx.recv_into(buf).await?;
        Ok(msg)
    }

    async fn recv_row_count(&mut self) -> Result<usize> {
        match self.recv().await? {
            Msg::Control(Command::RowCount(rows)) => Ok(rows),
            Msg::Err(reason) => Err(OrchestraErr::Aborted(reason.into_owned())),
            other => Err(OrchestraErr::protocol("a row count", other)),
        }
    }

    async fn recv_training(&mut self) -> Result<TrainingSpec> {
        match self.recv().await? {
            Msg::Control(Command::Training(spec)) => Ok(spec),
            Msg::Err(reason) => Err(OrchestraErr::Aborted(reason.into_owned())),
            other => Err(OrchestraErr::protocol("the training settings", other)),
        }
    }

    async fn recv_rows(&mut self) -> Result<&[f32]> {
        match self.recv().await? {
            Msg::Data(Payload::Rows(rows)) => Ok(rows),
            Msg::Err(reason) => Err(OrchestraErr::Aborted(reason.into_owned())),
            other => Err(OrchestraErr::protocol("rows", other)),
        }
    }

    async fn recv_partial(&mut self) -> Result<Partial> {
        match self.recv().await? {
            Msg::Data(Payload::Labels { offset, labels }) => {
                let labels = labels
                    .iter()
                    .map(|&label| u8::try_from(label))
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(|_| OrchestraErr::Protocol("label out of range".into()))?;

                Ok(Partial {
                    offset: offset as usize,
                    labels,
                })
            }
            Msg::Err(reason) => Err(OrchestraErr::Aborted(reason.into_owned())),
            other => Err(OrchestraErr::protocol("labels", other)),
        }
    }
}

enum Role<R: AsyncRead + Unpin, W: AsyncWrite + Unpin> {
    Coordinator { peers: Vec<Link<R, W>> },
    Peer { link: Link<R, W> },
}

/// A worker's handle on the group.
///
/// Every worker must call the same collectives in the same order.
pub struct Communicator<R: AsyncRead + Unpin, W: AsyncWrite + Unpin> {
    rank: usize,
    world: NonZeroUsize,
    role: Role<R, W>,
}

impl<R, W> Communicator<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// The coordinator of a group made of itself and `peers`, peer `i` having rank `i + 1`.
    pub fn coordinator<I>(peers: I) -> Self
    where
        I: IntoIterator<Item = (FrameReceiver<R>, FrameSender<W>)>,
    {
        let peers: Vec<_> = peers
            .into_iter()
            .map(|(rx, tx)| Link::new(rx, tx))
            .collect();

        Self {
            rank: 0,
            world: NonZeroUsize::MIN.saturating_add(peers.len()),
            role: Role::Coordinator { peers },
        }
    }

    /// Peer `rank` of a group of `world` workers.
    pub fn peer(spec: WorkerSpec, rx: FrameReceiver<R>, tx: FrameSender<W>) -> Result<Self> {
        let world = NonZeroUsize::new(spec.world)
            .filter(|world| spec.rank > 0 && spec.rank < world.get())
            .ok_or_else(|| {
                OrchestraErr::Protocol(format!(
                    "rank {} is not a peer rank in a world of {}",
                    spec.rank, spec.world
                ))
            })?;

        Ok(Self {
            rank: spec.rank,
            world,
            role: Role::Peer {
                link: Link::new(rx, tx),
            },
        })
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn world(&self) -> NonZeroUsize {
        self.world
    }

    pub fn is_coordinator(&self) -> bool {
        matches!(self.role, Role::Coordinator { .. })
    }

    /// Agrees on how the run trains. The coordinator's `spec` wins, peers ignore theirs.
    pub async fn broadcast_training(&mut self, spec: TrainingSpec) -> Result<TrainingSpec> {
        match &mut self.role {
            Role::Coordinator { peers } => {
                let msg = Msg::Control(Command::Training(spec));
                try_join_all(peers.iter_mut().map(|link| link.send(&msg))).await?;
                debug!(epochs = spec.epochs, batch_size = spec.batch_size; "broadcast training settings");
                Ok(spec)
            }
            Role::Peer { link } => {
                let spec = link.recv_training().await?;
                debug!(rank = self.rank; "received training settings");
                Ok(spec)
            }
        }
    }

    /// Agrees on a row count. The coordinator's `rows` wins, peers ignore theirs.
    pub async fn broadcast_len(&mut self, rows: usize) -> Result<usize> {
        match &mut self.role {
            Role::Coordinator { peers } => {
                let msg = Msg::Control(Command::RowCount(rows));
                try_join_all(peers.iter_mut().map(|link| link.send(&msg))).await?;
                info!(rows = rows; "broadcast row count");
                Ok(rows)
            }
            Role::Peer { link } => {
                let rows = link.recv_row_count().await?;
                debug!(rank = self.rank, rows = rows; "received row count");
                Ok(rows)
            }
        }
    }

    /// Makes every worker's `matrix` a copy of the coordinator's.
    ///
    /// Only the `rows` populated rows travel, `rows` being the count agreed on with
    /// [`Self::broadcast_len`].
    pub async fn broadcast_rows(&mut self, matrix: &mut DatasetMatrix, rows: usize) -> Result<()> {
        match &mut self.role {
            Role::Coordinator { peers } => {
                let raw = matrix.raw_rows(0..rows).ok_or_else(|| {
                    OrchestraErr::Protocol(format!(
                        "can't broadcast {rows} rows out of {}",
                        matrix.len()
                    ))
                })?;

                let msg = Msg::Data(Payload::Rows(raw));
                try_join_all(peers.iter_mut().map(|link| link.send(&msg))).await?;
                debug!(rows = rows; "broadcast rows");
            }
            Role::Peer { link } => {
                let raw = link.recv_rows().await?;
                matrix.fill_from_raw(raw)?;
                check_rows(self.rank, matrix.len(), rows)?;
            }
        }

        Ok(())
    }

    /// Hands every worker its own partition of the coordinator's `full` matrix, in `local`.
    ///
    /// Peers never read `full`.
    pub async fn scatter_rows(
        &mut self,
        full: &DatasetMatrix,
        plan: &PartitionPlan,
        local: &mut DatasetMatrix,
    ) -> Result<()> {
        let rank = self.rank;
        let slice = |rank: usize| {
            let range = plan.range(rank);
            full.raw_rows(range.clone()).ok_or_else(|| {
                OrchestraErr::Protocol(format!(
                    "partition {range:?} of rank {rank} is past the {} loaded rows",
                    full.len()
                ))
            })
        };

        match &mut self.role {
            Role::Coordinator { peers } => {
                let msgs = (1..=peers.len())
                    .map(|rank| slice(rank).map(|raw| Msg::Data(Payload::Rows(raw))))
                    .collect::<Result<Vec<_>>>()?;

                try_join_all(peers.iter_mut().zip(&msgs).map(|(link, msg)| link.send(msg))).await?;
                local.fill_from_raw(slice(0)?)?;
            }
            Role::Peer { link } => {
                let raw = link.recv_rows().await?;
                local.fill_from_raw(raw)?;
                check_rows(rank, local.len(), plan.range(rank).len())?;
            }
        }

        debug!(rank = rank, rows = local.len(); "received partition");
        Ok(())
    }

    /// Collects every worker's partial result on the coordinator.
    ///
    /// # Returns
    /// On the coordinator, all partial results in rank order. `None` on peers.
    pub async fn gather(&mut self, partial: Partial) -> Result<Option<Vec<Partial>>> {
        match &mut self.role {
            Role::Coordinator { peers } => {
                let others = try_join_all(peers.iter_mut().map(|link| link.recv_partial())).await?;

                let mut partials = Vec::with_capacity(others.len() + 1);
                partials.push(partial);
                partials.extend(others);
                Ok(Some(partials))
            }
            Role::Peer { link } => {
                let offset = u32::try_from(partial.offset).map_err(|_| {
                    OrchestraErr::Protocol(format!("offset {} doesn't fit the wire", partial.offset))
                })?;
                let labels: Vec<u32> = partial.labels.iter().map(|&l| u32::from(l)).collect();

                link.send(&Msg::Data(Payload::Labels {
                    offset,
                    labels: &labels,
                }))
                .await?;
                Ok(None)
            }
        }
    }

    /// Tells the rest of the group the run can't go on.
    ///
    /// The coordinator notifies every peer, a peer notifies the coordinator. Whoever is waiting
    /// on a collective then returns [`OrchestraErr::Aborted`] instead of blocking forever.
    pub async fn abort(&mut self, reason: &str) -> Result<()> {
        warn!(rank = self.rank; "aborting: {reason}");
        let msg = Msg::Err(reason.into());

        match &mut self.role {
            Role::Coordinator { peers } => {
                try_join_all(peers.iter_mut().map(|link| link.send(&msg))).await?;
            }
            Role::Peer { link } => link.send(&msg).await?,
        }

        Ok(())
    }

    /// Ends the run. Peers wait here until the coordinator says goodbye.
    pub async fn close(&mut self) -> Result<()> {
        match &mut self.role {
            Role::Coordinator { peers } => {
                let msg = Msg::Control(Command::Disconnect);
                try_join_all(peers.iter_mut().map(|link| link.send(&msg))).await?;
            }
            Role::Peer { link } => match link.recv().await? {
                Msg::Control(Command::Disconnect) => {}
                Msg::Err(reason) => return Err(OrchestraErr::Aborted(reason.into_owned())),
                other => return Err(OrchestraErr::protocol("a disconnect", other)),
            },
        }

        debug!(rank = self.rank; "closed");
        Ok(())
    }
}

fn check_rows(rank: usize, got: usize, expected: usize) -> Result<()> {
    if got != expected {
        return Err(OrchestraErr::Protocol(format!(
            "rank {rank} received {got} rows, expected {expected}"
        )));
    }

    Ok(())
}

/// Builds a group of `world` workers wired through in-process pipes.
///
/// # Returns
/// One communicator per rank, the coordinator first.
pub fn local_world(world: NonZeroUsize) -> Vec<LocalCommunicator> {
    let mut coordinator_ends = Vec::with_capacity(world.get() - 1);
    let mut peers = Vec::with_capacity(world.get() - 1);

    for rank in 1..world.get() {
        let (near, far) = io::duplex(LOCAL_PIPE_SIZE);
        let (rx, tx) = io::split(near);
        coordinator_ends.push(comms::channel(rx, tx));

        let (rx, tx) = io::split(far);
        let (rx, tx) = comms::channel(rx, tx);
        peers.push(Communicator {
            rank,
            world,
            role: Role::Peer {
                link: Link::new(rx, tx),
            },
        });
        debug!(rank = rank, world = world.get(); "wired local peer");
    }

    let mut group = Vec::with_capacity(world.get());
    group.push(Communicator::coordinator(coordinator_ends));
    group.extend(peers);
    group
}

/// Waits for `world - 1` peers on `listener` and becomes their coordinator.
///
/// Peers are ranked in connection order and told their rank with a `Welcome`.
pub async fn accept(listener: &TcpListener, world: NonZeroUsize) -> Result<TcpCommunicator> {
    let mut peers = Vec::with_capacity(world.get() - 1);

    for rank in 1..world.get() {
        let (stream, addr) = listener.accept().await?;
        let (rx, tx) = stream.into_split();
        let (rx, mut tx) = comms::channel(rx, tx);

        let spec = WorkerSpec {
            rank,
            world: world.get(),
        };
        tx.send(&Msg::Control(Command::Welcome(spec))).await?;
        info!(rank = rank; "peer connected from {addr}");
        peers.push((rx, tx));
    }

    Ok(Communicator::coordinator(peers))
}

/// Connects to a coordinator and waits for a rank.
///
/// A refused connection is retried up to `attempts` times, the coordinator may not be listening
/// yet.
pub async fn connect<A>(addr: A, attempts: NonZeroUsize) -> Result<TcpCommunicator>
where
    A: ToSocketAddrs + Clone,
{
    let mut attempt = 1;
    let stream = loop {
        match TcpStream::connect(addr.clone()).await {
            Ok(stream) => break stream,
            Err(e) if attempt < attempts.get() => {
                warn!(attempt = attempt; "failed to connect to the coordinator: {e}, retrying");
                attempt += 1;
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
            Err(e) => return Err(e.into()),
        }
    };

    let (rx, tx) = stream.into_split();
    let (mut rx, tx) = comms::channel(rx, tx);

    let mut buf: Vec<u32> = Vec::new();
    let msg: Msg = rx.recv_into(&mut buf).await?;
    let spec = match msg {
        Msg::Control(Command::Welcome(spec)) => spec,
        Msg::Err(reason) => return Err(OrchestraErr::Aborted(reason.into_owned())),
        other => return Err(OrchestraErr::protocol("a welcome", other)),
    };

    info!(rank = spec.rank, world = spec.world; "joined the group");
    Communicator::peer(spec, rx, tx)
}
