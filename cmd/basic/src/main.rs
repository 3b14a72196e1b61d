//! Basic strand example
//!
//! Three fibers take turns through the run queue, then a nested fiber runs
//! to completion while its parent sleeps.
//!
//! # Environment Variables
//!
//! - `STRAND_FLUSH_EPRINT=1` - Flush debug output immediately (useful for crash debugging)
//! - `STRAND_LOG_LEVEL=debug` - Set log level (off, error, warn, info, debug, trace)
//! - `STRAND_STACK_SIZE=<bytes>` - Fiber stack size

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use strand::{kdebug, kinfo, Scheduler, SchedulerConfig};

// STRAND_LOG_LEVEL=debug STRAND_FLUSH_EPRINT=1 cargo run -p strand-basic
fn main() {
    println!("=== strand basic example ===\n");

    let config = SchedulerConfig::from_env();
    config.print();

    let sched = match Scheduler::new(config) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("failed to create scheduler: {}", e);
            std::process::exit(1);
        }
    };

    let completed = Rc::new(Cell::new(0usize));

    for i in 1..=3 {
        let c = completed.clone();
        let id = sched.create_fiber(move |s| {
            kdebug!("[fiber {}] started", i);
            for j in 0..3 {
                kdebug!("[fiber {}] iteration {}", i, j);
                s.yield_now();
            }
            kdebug!("[fiber {}] finished", i);
            c.set(c.get() + 1);
        });
        match id {
            Ok(id) => println!("created round-robin fiber {} (ID={})", i, id),
            Err(e) => eprintln!("create failed: {}", e),
        }
    }

    let c = completed.clone();
    let parent = sched.create_fiber(move |s| {
        let child_done = c.clone();
        if let Err(e) = s.create_fiber(move |s| {
            kinfo!("child {} runs while its parent sleeps", s.current_id());
            child_done.set(child_done.get() + 1);
        }) {
            eprintln!("create failed: {}", e);
        }

        let start = Instant::now();
        s.sleep(Duration::from_millis(50));
        kinfo!("parent woke after {:?}, {} fiber(s) alive", start.elapsed(), s.live_fibers());
        c.set(c.get() + 1);
    });
    if let Err(e) = parent {
        eprintln!("create failed: {}", e);
    }

    println!("\nrunning...\n");
    if let Err(e) = sched.run() {
        eprintln!("scheduler stopped: {}", e);
    }

    let stats = sched.stats();
    kinfo!("{} fiber(s) completed", completed.get());
    println!(
        "created={} finished={} switches={} yields={} wakeups={}",
        stats.created, stats.finished, stats.switches, stats.yields, stats.wakeups
    );
    println!("\n=== example complete ===");
}
