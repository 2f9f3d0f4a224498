//! Local nameserver answering every A query with one address, for tests.

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

const HEADER_LEN: usize = 12;
const TYPE_A: u16 = 1;
const TTL_SECS: u32 = 60;

/// UDP nameserver on `127.0.0.1` resolving every name to one IPv4 address.
///
/// Other query types get an empty answer. The server stops when dropped.
#[derive(Debug)]
pub struct StubNameserver {
    addr: SocketAddr,
    queries: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl StubNameserver {
    /// Start answering with `ip` on an ephemeral loopback port.
    pub async fn answering(ip: Ipv4Addr) -> io::Result<Self> {
        let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await?;
        let addr = socket.local_addr()?;
        let queries = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&queries);

        let task = tokio::spawn(async move {
            let mut buf = [0u8; 512];
            while let Ok((len, peer)) = socket.recv_from(&mut buf).await {
                let Some(reply) = answer(&buf[..len], ip) else {
                    continue;
                };
                counter.fetch_add(1, Ordering::SeqCst);
                let _ = socket.send_to(&reply, peer).await;
            }
        });

        Ok(Self {
            addr,
            queries,
            task,
        })
    }

    /// Address to send queries to.
    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Number of queries answered so far.
    #[must_use]
    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

impl Drop for StubNameserver {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Build the reply to a single-question `query`, or `None` if it does not
/// parse.
fn answer(query: &[u8], ip: Ipv4Addr) -> Option<Vec<u8>> {
    if query.len() < HEADER_LEN {
        return None;
    }
    let mut pos = HEADER_LEN;
    loop {
        let label = usize::from(*query.get(pos)?);
        if label == 0 {
            break;
        }
        pos += label + 1;
    }
    let qtype = u16::from_be_bytes([*query.get(pos + 1)?, *query.get(pos + 2)?]);
    let question_end = pos + 5;
    if query.len() < question_end {
        return None;
    }
    let answers = u16::from(qtype == TYPE_A);

    let mut reply = Vec::with_capacity(question_end + 16);
    reply.extend_from_slice(&query[..2]);
    // QR + AA, recursion desired echoed; recursion available, NOERROR
    reply.extend_from_slice(&[0x84 | (query[2] & 0x01), 0x80]);
    reply.extend_from_slice(&1u16.to_be_bytes());
    reply.extend_from_slice(&answers.to_be_bytes());
    reply.extend_from_slice(&[0, 0, 0, 0]);
    reply.extend_from_slice(&query[HEADER_LEN..question_end]);
    if answers > 0 {
        // Name is a pointer back to the question.
        reply.extend_from_slice(&[0xC0, 0x0C]);
        reply.extend_from_slice(&TYPE_A.to_be_bytes());
        reply.extend_from_slice(&1u16.to_be_bytes());
        reply.extend_from_slice(&TTL_SECS.to_be_bytes());
        reply.extend_from_slice(&4u16.to_be_bytes());
        reply.extend_from_slice(&ip.octets());
    }
    Some(reply)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn query(name: &str, qtype: u16) -> Vec<u8> {
        let mut query = vec![0x12, 0x34, 0x01, 0x00, 0, 1, 0, 0, 0, 0, 0, 0];
        for label in name.split('.') {
            query.push(u8::try_from(label.len()).unwrap());
            query.extend_from_slice(label.as_bytes());
        }
        query.push(0);
        query.extend_from_slice(&qtype.to_be_bytes());
        query.extend_from_slice(&1u16.to_be_bytes());
        query
    }

    #[test]
    fn test_answers_a_query() {
        let query = query("store.test", TYPE_A);
        let reply = answer(&query, Ipv4Addr::new(10, 1, 2, 3)).unwrap();
        assert_eq!(&reply[..2], &[0x12, 0x34]);
        assert_eq!(&reply[6..8], &[0, 1], "one answer");
        assert_eq!(&reply[HEADER_LEN..query.len()], &query[HEADER_LEN..]);
        assert_eq!(&reply[reply.len() - 4..], &[10, 1, 2, 3]);
    }

    #[test]
    fn test_other_types_get_no_answer() {
        let reply = answer(&query("store.test", 28), Ipv4Addr::LOCALHOST).unwrap();
        assert_eq!(&reply[6..8], &[0, 0]);
    }

    #[test]
    fn test_truncated_query_is_ignored() {
        let query = query("store.test", TYPE_A);
        assert!(answer(&query[..query.len() - 3], Ipv4Addr::LOCALHOST).is_none());
        assert!(answer(&query[..5], Ipv4Addr::LOCALHOST).is_none());
    }
}
