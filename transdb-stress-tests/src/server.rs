use std::net::{SocketAddr, TcpStream};
use std::path::PathBuf;
use std::process::{Child, Command};
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;

pub struct ServerProcess {
    child: Child,
    pub addr: SocketAddr,
}

impl Drop for ServerProcess {
    fn drop(&mut self) {
        self.child.kill().ok();
    }
}

pub struct Cluster {
    pub nodes: Vec<ServerProcess>,
    pub node_addrs: Vec<String>,
    // Kept alive so the topology file remains on disk until every process exits.
    _tmpfile: NamedTempFile,
}

/// Reserve `count` free TCP ports by binding to port 0 for each, then
/// releasing them all at once.  Holding all listeners alive until the ports
/// are collected prevents the same port from being issued twice and reduces
/// the TOCTOU window between releasing and the caller binding.
pub fn pick_free_ports(count: usize) -> Vec<u16> {
    let listeners: Vec<std::net::TcpListener> = (0..count)
        .map(|_| std::net::TcpListener::bind("127.0.0.1:0").unwrap())
        .collect();
    let ports = listeners.iter().map(|l| l.local_addr().unwrap().port()).collect();
    drop(listeners);
    ports
}

/// Return the path to the `transdb-server` binary that sits alongside this
/// executable in `target/debug/` (or `target/debug/deps/` when run as a test).
fn server_binary_path() -> PathBuf {
    let mut path = std::env::current_exe().expect("cannot determine own executable path");
    path.pop(); // remove own filename
    if path.file_name().map(|n| n == "deps").unwrap_or(false) {
        path.pop(); // step out of target/debug/deps → target/debug/
    }
    path.push("transdb-server");
    path
}

const READY_TIMEOUT: Duration = Duration::from_secs(30);

/// The on-disk topology shape `transdb-server --topology` expects: just the
/// node list. `local_node` is supplied separately via `--node-id` per process.
#[derive(serde::Serialize)]
struct RawTopology<'a> {
    nodes: &'a [String],
}

impl Cluster {
    /// Build the `transdb-server` binary, spawn `node_count` nodes sharing one
    /// topology file, wait until every one is ready to serve HTTP, and return
    /// the live `Cluster`.
    ///
    /// Returns `Err` if the build fails, a process cannot be spawned, or the
    /// readiness deadline elapses. The caller should map this error to exit
    /// code 3 as documented in the CLI spec.
    pub fn build_and_spawn(node_count: usize) -> Result<Self, String> {
        let status = Command::new("cargo")
            .args(["build", "-p", "transdb-server"])
            .status()
            .map_err(|e| format!("Failed to invoke cargo build: {e}"))?;
        if !status.success() {
            return Err(format!("cargo build -p transdb-server failed: {status}"));
        }

        let ports = pick_free_ports(node_count);
        let node_addrs: Vec<String> =
            ports.iter().map(|p| format!("127.0.0.1:{p}").parse::<SocketAddr>().unwrap().to_string()).collect();

        let tmpfile =
            NamedTempFile::new().map_err(|e| format!("Failed to create topology tmpfile: {e}"))?;
        serde_json::to_writer(&tmpfile, &RawTopology { nodes: &node_addrs })
            .map_err(|e| format!("Failed to write topology JSON: {e}"))?;

        let server_bin = server_binary_path();
        let topo_path = tmpfile.path().to_str().unwrap().to_string();

        let mut nodes = Vec::with_capacity(node_count);
        for addr in &node_addrs {
            let child = Command::new(&server_bin)
                .args(["--node-id", addr, "--topology", &topo_path])
                .spawn()
                .map_err(|e| format!("Failed to spawn node {addr}: {e}"))?;
            nodes.push(ServerProcess { child, addr: addr.parse().unwrap() });
        }

        // If any readiness poll fails, `nodes` drops here, killing every
        // process spawned so far.
        let deadline = Instant::now() + READY_TIMEOUT;
        let handles: Vec<_> =
            nodes.iter().map(|n| std::thread::spawn({
                let addr = n.addr;
                move || poll_until_ready(addr, deadline)
            })).collect();
        for h in handles {
            h.join()
                .map_err(|_| "Readiness thread panicked".to_string())?
                .map_err(|e| format!("Node not ready within timeout: {e}"))?;
        }

        Ok(Cluster { nodes, node_addrs, _tmpfile: tmpfile })
    }
}

/// Poll `addr` with a TCP connect attempt until the connection succeeds
/// (server is accepting connections) or `deadline` is reached.
///
/// A successful TCP connection is sufficient to confirm the HTTP server is
/// ready: our axum-based server starts accepting the moment it binds, so
/// a successful `connect` implies it will also answer HTTP requests.
fn poll_until_ready(addr: SocketAddr, deadline: Instant) -> Result<(), String> {
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(format!("timed out waiting for {addr}"));
        }
        let probe = Duration::min(remaining, Duration::from_millis(200));
        if TcpStream::connect_timeout(&addr, probe).is_ok() {
            return Ok(());
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}
