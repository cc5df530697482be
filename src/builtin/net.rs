use super::{BuiltinCommand, Invocation};
use crate::command::ExecutionError;
use anyhow::{Context, anyhow};
use argh::FromArgs;
use std::io::ErrorKind;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

const REPETITIONS: u32 = 4;
const DEFAULT_PORT: u16 = 80;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(FromArgs)]
/// Measure TCP connect round trips to a host.
pub struct Ping {
    #[argh(positional, greedy)]
    /// host to reach, as `host` or `host:port` (port 80 by default).
    pub target: Vec<String>,
}

fn split_port(target: &str) -> (&str, u16) {
    match target.rsplit_once(':') {
        Some((host, port)) => match port.parse() {
            Ok(port) => (host, port),
            Err(_) => (target, DEFAULT_PORT),
        },
        None => (target, DEFAULT_PORT),
    }
}

fn unreachable(err: impl std::fmt::Display) -> ExecutionError {
    anyhow!("{err}, possible reasons are Internet connectivity problem or host unreachability").into()
}

impl BuiltinCommand for Ping {
    fn name() -> &'static str {
        "ping"
    }

    fn run(self, io: &mut Invocation<'_>) -> Result<(), ExecutionError> {
        let [target] = self.target.as_slice() else {
            return Err(anyhow!("One argument is needed").into());
        };
        let (host, port) = split_port(target);

        io.print(&format!("Pinging {host}"))?;
        let addr: SocketAddr = match (host, port)
            .to_socket_addrs()
            .with_context(|| format!("cannot resolve {host}"))
            .map(|mut addrs| addrs.next())
        {
            Ok(Some(addr)) => addr,
            Ok(None) => {
                io.print("\n")?;
                return Err(unreachable(format!("no address for {host}")));
            }
            Err(e) => {
                io.print("\n")?;
                return Err(unreachable(format!("{e:#}")));
            }
        };
        io.print(&format!(" [{addr}]\n"))?;

        let mut times = Vec::new();
        for _ in 0..REPETITIONS {
            io.check()?;
            let start = Instant::now();
            match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
                Ok(_) => {
                    let elapsed = start.elapsed();
                    io.print(&format!("Reply from {addr}: time = {elapsed:?}\n"))?;
                    times.push(elapsed);
                }
                Err(e) if e.kind() == ErrorKind::TimedOut => io.print("Request timed out.\n")?,
                Err(e) => return Err(unreachable(e)),
            }
        }
        statistics(io, addr, &times)
    }
}

fn statistics(io: &mut Invocation<'_>, addr: SocketAddr, times: &[Duration]) -> Result<(), ExecutionError> {
    let received = times.len() as u32;
    let lost = REPETITIONS - received;
    io.print(&format!(
        "Ping statistics for {addr}:\n    Packets: Sent = {REPETITIONS}, Received = {received}, Lost = {lost} ({}% loss)\n",
        lost * 100 / REPETITIONS
    ))?;

    let (Some(min), Some(max)) = (times.iter().min(), times.iter().max()) else {
        return Ok(());
    };
    let average = times.iter().sum::<Duration>() / received;
    io.print(&format!(
        "Approximate round trip times:\n    Minimum = {min:?}, Maximum = {max:?}, Average = {average:?}\n"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::tests::run;
    use std::net::TcpListener;

    #[test]
    fn test_split_port_defaults_to_80() {
        assert_eq!(split_port("example.com"), ("example.com", 80));
        assert_eq!(split_port("localhost:8080"), ("localhost", 8080));
        assert_eq!(split_port("odd:name"), ("odd:name", 80));
    }

    #[test]
    fn test_ping_local_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let ping = Ping {
            target: vec![format!("127.0.0.1:{port}")],
        };
        let (res, out, _) = run(ping, "/", b"");
        assert!(res.is_ok(), "{res:?}");
        assert!(out.starts_with(&format!("Pinging 127.0.0.1 [127.0.0.1:{port}]\n")));
        assert_eq!(out.matches("Reply from").count(), 4);
        assert!(out.contains("Received = 4, Lost = 0 (0% loss)"));
    }

    #[test]
    fn test_ping_requires_exactly_one_target() {
        let (res, out, _) = run(Ping { target: Vec::new() }, "/", b"");
        assert_eq!(res.unwrap_err().to_string(), "One argument is needed");
        assert_eq!(out, "");
    }

    #[test]
    fn test_ping_refused_connection_is_an_error() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let ping = Ping {
            target: vec![format!("127.0.0.1:{port}")],
        };
        let (res, _, _) = run(ping, "/", b"");
        assert!(res.unwrap_err().to_string().contains("possible reasons"));
    }
}
