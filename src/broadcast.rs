use crate::session::Session;
use crate::user_pipe::MAX_USERS;

/// Write `message` to every live session, swallowing individual write
/// failures — a dead peer is reaped on its own next EOF, not here (spec
/// §4.6: "best effort, no synchronous failure handling").
pub fn broadcast(sessions: &mut [Option<Session>; MAX_USERS], message: &str) {
    for session in sessions.iter_mut().flatten() {
        session.write_line(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{TcpListener, TcpStream};

    fn connected_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    #[test]
    fn broadcast_reaches_every_live_slot() {
        let mut sessions: [Option<Session>; MAX_USERS] = std::array::from_fn(|_| None);
        let (mut client, server) = connected_pair();
        sessions[0] = Some(Session::new(0, server, "127.0.0.1/1".to_string()));

        broadcast(&mut sessions, "hi\n");

        let mut buf = [0u8; 16];
        use std::io::Read;
        let n = client.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"hi\n");
    }
}
