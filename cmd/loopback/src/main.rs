//! Loopback connect/accept demo
//!
//! One fiber listens on a loopback port and hands every accepted
//! connection to a fiber of its own. Client fibers sleep, then connect.
//! The listener closes after it has accepted one connection per client,
//! and the process exits once the loop has nothing left to do.
//!
//! Usage:
//!     cargo run -p strand-loopback [port] [clients]
//!
//! # Environment Variables
//!
//! - `STRAND_LOG_LEVEL=debug` - Show scheduler and reactor activity
//! - `STRAND_LOOPBACK_DELAY_MS=<ms>` - Client delay before connecting (default 1000)

use std::cell::Cell;
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::Duration;

use strand::{env_get, kerror, kinfo, Scheduler, SchedulerConfig, SchedResult, TcpHandle};

fn serve(s: &Scheduler, addr: SocketAddr, clients: usize, bound: Rc<Cell<Option<SocketAddr>>>) {
    let listener = match s.listen(addr) {
        Ok(l) => l,
        Err(e) => {
            kerror!("listen on {} failed: {}", addr, e);
            return;
        }
    };
    match listener.local_addr() {
        Ok(local) => {
            kinfo!("listening on {}", local);
            bound.set(Some(local));
        }
        Err(e) => kerror!("local_addr failed: {}", e),
    }

    for n in 1..=clients {
        match listener.accept() {
            Ok(conn) => {
                if let Err(e) = s.create_fiber(move |s| handle_connection(s, n, conn)) {
                    kerror!("no fiber for connection {}: {}", n, e);
                }
            }
            Err(e) => kerror!("accept failed: {}", e),
        }
    }

    if let Err(e) = listener.close() {
        kerror!("closing listener failed: {}", e);
    }
    kinfo!("listener closed after {} connection(s)", clients);
}

fn handle_connection(s: &Scheduler, n: usize, conn: TcpHandle) {
    match s.reactor().peer_addr(conn) {
        Ok(peer) => kinfo!("connection {} from {}", n, peer),
        Err(e) => kerror!("connection {}: peer_addr failed: {}", n, e),
    }
    if let Err(e) = s.close(conn) {
        kerror!("connection {}: close failed: {}", n, e);
    }
}

fn client(s: &Scheduler, n: usize, delay: Duration, bound: Rc<Cell<Option<SocketAddr>>>) {
    s.sleep(delay);
    let Some(addr) = bound.get() else {
        kerror!("client {}: nothing to connect to", n);
        return;
    };
    match s.connect(addr) {
        Ok(conn) => {
            kinfo!("client {} connected to {}", n, addr);
            if let Err(e) = s.close(conn) {
                kerror!("client {}: close failed: {}", n, e);
            }
        }
        Err(e) => kerror!("client {}: connect to {} failed: {}", n, addr, e),
    }
}

fn run(addr: SocketAddr, clients: usize, delay: Duration) -> SchedResult<()> {
    let sched = Scheduler::new(SchedulerConfig::from_env())?;
    let bound = Rc::new(Cell::new(None));

    let b = bound.clone();
    sched.create_fiber(move |s| serve(s, addr, clients, b))?;
    for n in 1..=clients {
        let b = bound.clone();
        sched.create_fiber(move |s| client(s, n, delay, b))?;
    }

    sched.run()?;
    let stats = sched.stats();
    println!(
        "fibers={} switches={} wakeups={}",
        stats.created, stats.switches, stats.wakeups
    );
    Ok(())
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let port: u16 = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(0);
    let clients: usize = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(2);
    let delay = Duration::from_millis(env_get("STRAND_LOOPBACK_DELAY_MS", 1000u64));

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    if let Err(e) = run(addr, clients, delay) {
        eprintln!("loopback: {}", e);
        std::process::exit(1);
    }
}
