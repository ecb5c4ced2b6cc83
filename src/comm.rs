// src/comm.rs
//
// Rank-to-rank message passing used by the decomposed domain.
//
// Messages are `f64` slices tagged with a `u16`. Sends never block; receives
// block until the matching (source, tag) message has arrived. Messages that
// arrive out of order are buffered per (source, tag).

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::sync::mpsc::{self, Receiver, Sender};

use crate::error::MgError;

// Tags reserved for the all-reduce.
const REDUCE_TAG: u16 = u16::MAX - 1;
const BCAST_TAG: u16 = u16::MAX;

/// Blocking point-to-point messaging plus the one collective the solver needs.
pub trait Communicator: Send {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    fn send(&self, peer: usize, tag: u16, buf: &[f64]) -> Result<(), MgError>;

    /// Receive exactly `buf.len()` values from `peer`.
    fn recv(&self, peer: usize, tag: u16, buf: &mut [f64]) -> Result<(), MgError>;

    /// Sum of `x` over all ranks, identical on every rank.
    ///
    /// Contributions are gathered on rank 0 and added in rank order, so the
    /// result does not depend on message arrival order.
    fn all_reduce_sum(&self, x: f64) -> Result<f64, MgError> {
        let n = self.size();
        if n == 1 {
            return Ok(x);
        }
        let mut cell = [0.0];
        if self.rank() == 0 {
            let mut total = x;
            for src in 1..n {
                self.recv(src, REDUCE_TAG, &mut cell)?;
                total += cell[0];
            }
            for dst in 1..n {
                self.send(dst, BCAST_TAG, &[total])?;
            }
            Ok(total)
        } else {
            self.send(0, REDUCE_TAG, &[x])?;
            self.recv(0, BCAST_TAG, &mut cell)?;
            Ok(cell[0])
        }
    }
}

/// Single-rank communicator. Every neighbour of a serial subdomain is itself,
/// so point-to-point traffic never reaches it.
#[derive(Clone, Debug, Default)]
pub struct SerialComm;

impl Communicator for SerialComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn send(&self, peer: usize, _tag: u16, _buf: &[f64]) -> Result<(), MgError> {
        Err(MgError::Comm(format!("serial communicator cannot send to rank {peer}")))
    }

    fn recv(&self, peer: usize, _tag: u16, _buf: &mut [f64]) -> Result<(), MgError> {
        Err(MgError::Comm(format!("serial communicator cannot receive from rank {peer}")))
    }
}

#[derive(Debug)]
struct Envelope {
    src: usize,
    tag: u16,
    data: Vec<f64>,
}

/// In-process communicator: one endpoint per rank, backed by channels.
/// Intended for running several ranks on threads of one process.
#[derive(Debug)]
pub struct LocalComm {
    rank: usize,
    peers: Vec<Sender<Envelope>>,
    inbox: Receiver<Envelope>,
    pending: RefCell<HashMap<(usize, u16), VecDeque<Vec<f64>>>>,
}

impl LocalComm {
    /// Create `n` connected endpoints; endpoint `i` is rank `i`.
    pub fn world(n: usize) -> Vec<LocalComm> {
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..n).map(|_| mpsc::channel()).unzip();
        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| LocalComm {
                rank,
                peers: senders.clone(),
                inbox,
                pending: RefCell::new(HashMap::new()),
            })
            .collect()
    }

    fn take_pending(&self, key: (usize, u16)) -> Option<Vec<f64>> {
        self.pending.borrow_mut().get_mut(&key).and_then(|q| q.pop_front())
    }
}

impl Communicator for LocalComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.peers.len()
    }

    fn send(&self, peer: usize, tag: u16, buf: &[f64]) -> Result<(), MgError> {
        let tx = self
            .peers
            .get(peer)
            .ok_or_else(|| MgError::Comm(format!("rank {peer} does not exist")))?;
        tx.send(Envelope {
            src: self.rank,
            tag,
            data: buf.to_vec(),
        })
        .map_err(|_| MgError::Comm(format!("rank {peer} hung up")))
    }

    fn recv(&self, peer: usize, tag: u16, buf: &mut [f64]) -> Result<(), MgError> {
        let key = (peer, tag);
        let data = match self.take_pending(key) {
            Some(d) => d,
            None => loop {
                let msg = self.inbox.recv().map_err(|_| {
                    MgError::Comm(format!(
                        "rank {}: all peers hung up while waiting for rank {peer} (tag {tag})",
                        self.rank
                    ))
                })?;
                if (msg.src, msg.tag) == key {
                    break msg.data;
                }
                self.pending
                    .borrow_mut()
                    .entry((msg.src, msg.tag))
                    .or_default()
                    .push_back(msg.data);
            },
        };
        if data.len() != buf.len() {
            return Err(MgError::Comm(format!(
                "rank {}: message from rank {peer} (tag {tag}) has {} values, expected {}",
                self.rank,
                data.len(),
                buf.len()
            )));
        }
        buf.copy_from_slice(&data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_order_messages_are_buffered() {
        let mut world = LocalComm::world(2);
        let b = world.pop().unwrap();
        let a = world.pop().unwrap();
        a.send(1, 7, &[1.0, 2.0]).unwrap();
        a.send(1, 3, &[5.0]).unwrap();

        let mut one = [0.0];
        b.recv(0, 3, &mut one).unwrap();
        assert_eq!(one, [5.0]);
        let mut two = [0.0; 2];
        b.recv(0, 7, &mut two).unwrap();
        assert_eq!(two, [1.0, 2.0]);
    }

    #[test]
    fn size_mismatch_is_an_error() {
        let world = LocalComm::world(1);
        world[0].send(0, 1, &[1.0, 2.0, 3.0]).unwrap();
        let mut buf = [0.0; 2];
        assert!(matches!(world[0].recv(0, 1, &mut buf), Err(MgError::Comm(_))));
    }

    #[test]
    fn all_reduce_sums_over_threads() {
        let world = LocalComm::world(4);
        let sums: Vec<f64> = std::thread::scope(|s| {
            let handles: Vec<_> = world
                .into_iter()
                .map(|c| s.spawn(move || c.all_reduce_sum(c.rank() as f64 + 0.5).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert!(sums.iter().all(|&x| x == 8.0), "sums: {sums:?}");
    }

    #[test]
    fn serial_comm_reduces_to_identity() {
        assert_eq!(SerialComm.all_reduce_sum(3.25).unwrap(), 3.25);
        assert!(SerialComm.send(0, 0, &[1.0]).is_err());
    }
}
