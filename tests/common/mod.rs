use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::process::{Child, Command};
use std::time::Duration;

/// Ask the OS for an unused port by binding to `:0` and immediately
/// releasing it. Small race window before the server binds it back, same
/// tradeoff every "spawn a real server on an ephemeral port" test makes.
pub fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

pub struct ServerProcess {
    pub child: Child,
    pub port: u16,
}

impl Drop for ServerProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

pub fn spawn_server() -> ServerProcess {
    let port = free_port();
    let child = Command::new(env!("CARGO_BIN_EXE_npshelld"))
        .arg(port.to_string())
        .spawn()
        .expect("spawn npshelld");
    ServerProcess { child, port }
}

/// Connect to a just-spawned server, retrying briefly while it finishes
/// binding the listening socket.
pub fn connect(port: u16) -> TcpStream {
    for _ in 0..100 {
        if let Ok(stream) = TcpStream::connect(("127.0.0.1", port)) {
            return stream;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    panic!("could not connect to npshelld on port {port}");
}

pub fn send_line(stream: &mut TcpStream, line: &str) {
    writeln!(stream, "{line}\r").expect("write line");
}

/// Read whatever arrives within `settle`, then stop. Good enough for
/// asserting on substrings of a shell's output without knowing its exact
/// framing ahead of time.
pub fn read_settled(stream: &mut TcpStream, settle: Duration) -> String {
    stream.set_read_timeout(Some(settle)).unwrap();
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                break;
            }
            Err(_) => break,
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}
