//! # CLI - LSM Key-Value Shell
//!
//! A REPL-style command-line interface for the storage engine. Reads
//! commands from stdin, executes them against the engine, and prints results
//! to stdout. Works interactively or with commands piped in.
//!
//! ## Commands
//!
//! ```text
//! PUT key value      Insert or update a key (u64) with a value
//! GET key            Look up a key (prints value or "(nil)")
//! DEL key            Delete a key
//! SCAN lo hi         Live pairs with lo <= key <= hi
//! GC bytes           Reclaim at least `bytes` from the value-log tail
//! FLUSH              Force the memtable out as a level-0 run
//! RESET              Drop every key and all files
//! STATS              Print engine debug info
//! BENCH n            Throughput test: n puts, n gets, one scan, n deletes
//! EXIT / QUIT        Shut down gracefully
//! ```
//!
//! ## Configuration
//!
//! Engine settings come from `LSMKV_*` environment variables (see
//! [`config::EngineConfig::from_env`]). Log output goes to stderr and is
//! filtered with `RUST_LOG`.

use anyhow::{Context, Result};
use config::EngineConfig;
use engine::Engine;
use std::io::{self, BufRead, Write};
use std::time::Instant;

fn parse_key(token: Option<&str>) -> Result<u64> {
    let token = token.context("missing key")?;
    token
        .parse()
        .with_context(|| format!("invalid key {:?}: expected an unsigned integer", token))
}

fn level_summary(engine: &Engine) -> String {
    let counts: Vec<String> = (0..engine.level_count())
        .map(|l| format!("L{}={}", l, engine.level_run_count(l)))
        .collect();
    if counts.is_empty() {
        "no runs".to_string()
    } else {
        counts.join(", ")
    }
}

/// Runs the standard throughput workload on `engine` and prints ops/sec
/// for each phase.
fn bench(engine: &mut Engine, n: u64) -> Result<()> {
    fn report(phase: &str, ops: u64, started: Instant) {
        let secs = started.elapsed().as_secs_f64();
        println!(
            "{}: {} ops in {:.3}s ({:.0} ops/s)",
            phase,
            ops,
            secs,
            ops as f64 / secs.max(f64::EPSILON)
        );
    }

    let started = Instant::now();
    for i in 0..n {
        engine.put(i, vec![b's'; i as usize + 1])?;
    }
    report("PUT", n, started);

    // Half the lookups hit, half miss.
    let started = Instant::now();
    for i in 0..n {
        engine.get(2 * i)?;
    }
    report("GET", n, started);

    let started = Instant::now();
    let found = if n >= 2 { engine.scan(0, n / 2 - 1)?.len() } else { 0 };
    report("SCAN", 1, started);
    println!("SCAN returned {} entries", found);

    let started = Instant::now();
    for i in 0..n {
        engine.del(2 * i)?;
    }
    report("DEL", n, started);
    Ok(())
}

fn execute(engine: &mut Engine, cmd: &str, mut parts: std::str::SplitWhitespace<'_>) -> Result<bool> {
    match cmd.to_uppercase().as_str() {
        "PUT" => {
            let key = parse_key(parts.next())?;
            let value = parts.collect::<Vec<&str>>().join(" ");
            anyhow::ensure!(!value.is_empty(), "usage: PUT key value");
            engine.put(key, value.into_bytes())?;
            println!("OK");
        }
        "GET" => {
            let key = parse_key(parts.next())?;
            match engine.get(key)? {
                Some(v) => println!("{}", String::from_utf8_lossy(&v)),
                None => println!("(nil)"),
            }
        }
        "DEL" => {
            let key = parse_key(parts.next())?;
            if engine.del(key)? {
                println!("OK");
            } else {
                println!("(not found)");
            }
        }
        "SCAN" => {
            let lo = parse_key(parts.next())?;
            let hi = parse_key(parts.next())?;
            let results = engine.merge_scan(lo, hi)?;
            if results.is_empty() {
                println!("(empty)");
            } else {
                for (k, v) in &results {
                    println!("{} -> {}", k, String::from_utf8_lossy(v));
                }
                println!("({} entries)", results.len());
            }
        }
        "GC" => {
            let bytes = parse_key(parts.next())?;
            let stats = engine.gc(bytes)?;
            println!(
                "OK (reclaimed {} bytes, {} records scanned, {} relocated)",
                stats.reclaimed, stats.scanned_records, stats.relocated
            );
        }
        "FLUSH" => {
            engine.force_flush()?;
            println!("OK ({})", level_summary(engine));
        }
        "RESET" => {
            engine.reset()?;
            println!("OK");
        }
        "STATS" => {
            println!("{:?}", engine);
        }
        "BENCH" => {
            let n = parse_key(parts.next())?;
            bench(engine, n)?;
            println!("OK ({})", level_summary(engine));
        }
        "EXIT" | "QUIT" => {
            println!("bye");
            return Ok(false);
        }
        other => {
            println!("unknown command: {}", other);
        }
    }
    Ok(true)
}

fn main() -> Result<()> {
    env_logger::init();

    let config = EngineConfig::from_env();
    let mut engine = Engine::open(config.clone())?;

    println!(
        "lsmkv started (dir={}, vlog={}, page={}B, l0_trigger={}, {})",
        config.dir.display(),
        config.vlog_path.display(),
        config.page_size,
        config.l0_trigger,
        level_summary(&engine)
    );
    println!("Commands: PUT key value | GET key | DEL key | SCAN lo hi | GC bytes");
    println!("          FLUSH | RESET | STATS | BENCH n | EXIT");
    print!("> ");
    io::stdout().flush().ok();

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let mut parts = line.split_whitespace();
        if let Some(cmd) = parts.next() {
            match execute(&mut engine, cmd, parts) {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => println!("ERR {:#}", e),
            }
        }
        print!("> ");
        io::stdout().flush().ok();
    }

    Ok(())
}
