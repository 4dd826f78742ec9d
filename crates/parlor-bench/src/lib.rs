//! Fixtures shared by the Parlor benchmarks.

use parlor_core::{ConnectionId, EventReceiver, Relay};
use parlor_protocol::ClientEvent;

/// A connection joined to a room, with its outbound queue.
pub struct Member {
    pub id: ConnectionId,
    pub outbox: EventReceiver,
}

impl Member {
    /// Discard everything queued for this connection.
    pub fn drain(&mut self) -> usize {
        let mut count = 0;
        while self.outbox.try_recv().is_ok() {
            count += 1;
        }
        count
    }
}

/// Join `size` connections to `room` and clear the join traffic.
pub fn populate(relay: &Relay, room: &str, size: usize) -> Vec<Member> {
    let mut members: Vec<Member> = (0..size)
        .map(|i| {
            let id = ConnectionId::new(format!("{room}-{i}"));
            let outbox = relay.connect(&id);
            let _ = relay.handle(&id, ClientEvent::join_room(format!("user-{i}"), room));
            Member { id, outbox }
        })
        .collect();

    for member in &mut members {
        member.drain();
    }
    members
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_populate() {
        let relay = Relay::new();
        let mut members = populate(&relay, "bench", 3);

        assert_eq!(relay.list_room("bench").len(), 3);
        assert!(members.iter_mut().all(|m| m.drain() == 0));
    }
}
