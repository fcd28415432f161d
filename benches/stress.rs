use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use chrono::{Days, NaiveDate};

use innkeep::engine::{Engine, EngineError, RequestContext, ReservationRequest};
use innkeep::model::{GuestDetails, RoomId};
use innkeep::notify::NotifyHub;
use innkeep::store::MemoryStore;

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.3}ms, p50={:.3}ms, p95={:.3}ms, p99={:.3}ms, max={:.3}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies.last().unwrap().as_secs_f64() * 1000.0,
    );
}

fn guest(i: usize) -> GuestDetails {
    GuestDetails {
        first_name: format!("Guest{i}"),
        last_name: "Bench".into(),
        email: format!("guest{i}@bench.test"),
        phone: String::new(),
    }
}

fn night(base: NaiveDate, offset: u64) -> (NaiveDate, NaiveDate) {
    let start = base + Days::new(offset);
    (start, start + Days::new(1))
}

async fn setup(n_rooms: usize, journal: Option<&std::path::Path>) -> (Arc<Engine>, Arc<MemoryStore>) {
    let notify = Arc::new(NotifyHub::new());
    let store = match journal {
        Some(path) => {
            let _ = std::fs::remove_file(path);
            MemoryStore::open(path, notify.clone()).expect("open journal")
        }
        None => MemoryStore::new(notify.clone()),
    };
    let store = Arc::new(store);
    for i in 0..n_rooms {
        store.add_room(format!("Room {i}")).await.unwrap();
    }
    (Arc::new(Engine::new(store.clone(), notify)), store)
}

async fn phase1_sequential(base: NaiveDate, journal: &std::path::Path) {
    let (engine, _) = setup(1, Some(journal)).await;
    let ctx = RequestContext::new();

    let n = 2000;
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();

    for i in 0..n {
        let (s, e) = night(base, i as u64);
        let t = Instant::now();
        engine
            .make_reservation(&ctx, ReservationRequest { room_id: RoomId(1), start: s, end: e, guest: guest(i) })
            .await
            .unwrap();
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} reservations in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("commit latency", &mut latencies);
}

async fn phase2_concurrent(base: NaiveDate, journal: &std::path::Path) {
    let n_tasks = 10;
    let n_per_task = 200;
    let (engine, _) = setup(n_tasks, Some(journal)).await;

    let start = Instant::now();
    let mut handles = Vec::new();
    for t in 0..n_tasks {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            let ctx = RequestContext::new();
            let room_id = RoomId(t as u32 + 1);
            for j in 0..n_per_task {
                let (s, e) = night(base, j as u64);
                engine
                    .make_reservation(&ctx, ReservationRequest { room_id, start: s, end: e, guest: guest(j) })
                    .await
                    .unwrap();
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    let elapsed = start.elapsed();
    let total = n_tasks * n_per_task;
    let ops = total as f64 / elapsed.as_secs_f64();
    println!(
        "  {n_tasks} tasks x {n_per_task} reservations = {total} total in {:.2}s = {ops:.0} ops/sec",
        elapsed.as_secs_f64()
    );
}

/// Many tasks race for the same nights of one room; exactly one wins each night.
async fn phase3_contention(base: NaiveDate) {
    let n_tasks = 16;
    let nights = 100;
    let (engine, store) = setup(1, None).await;
    let won = Arc::new(AtomicUsize::new(0));
    let lost = Arc::new(AtomicUsize::new(0));

    let start = Instant::now();
    let mut handles = Vec::new();
    for t in 0..n_tasks {
        let engine = engine.clone();
        let won = won.clone();
        let lost = lost.clone();
        handles.push(tokio::spawn(async move {
            let ctx = RequestContext::new();
            for n in 0..nights {
                let (s, e) = night(base, n);
                match engine
                    .make_reservation(&ctx, ReservationRequest { room_id: RoomId(1), start: s, end: e, guest: guest(t) })
                    .await
                {
                    Ok(_) => won.fetch_add(1, Ordering::Relaxed),
                    Err(EngineError::Conflict { .. }) => lost.fetch_add(1, Ordering::Relaxed),
                    Err(e) => panic!("unexpected error: {e}"),
                };
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    let won = won.load(Ordering::Relaxed);
    assert_eq!(won, nights as usize, "double booking detected");
    assert_eq!(store.room_count(), 1);
    println!(
        "  {n_tasks} tasks racing for {nights} nights: {won} won, {} conflicts in {:.2}s",
        lost.load(Ordering::Relaxed),
        start.elapsed().as_secs_f64()
    );
}

async fn phase4_read_under_load(base: NaiveDate) {
    let (engine, _) = setup(20, None).await;
    let stop = Arc::new(AtomicBool::new(false));

    let mut writers = Vec::new();
    for w in 0..5u32 {
        let engine = engine.clone();
        let stop = stop.clone();
        writers.push(tokio::spawn(async move {
            let ctx = RequestContext::new();
            let mut i = 0u64;
            while !stop.load(Ordering::Relaxed) && i < 5000 {
                let (s, e) = night(base, i);
                let _ = engine
                    .make_reservation(&ctx, ReservationRequest { room_id: RoomId(w + 1), start: s, end: e, guest: guest(0) })
                    .await;
                i += 1;
            }
        }));
    }

    let n_readers = 10;
    let reads_per_reader = 500;
    let mut readers = Vec::new();
    for _ in 0..n_readers {
        let engine = engine.clone();
        readers.push(tokio::spawn(async move {
            let ctx = RequestContext::new();
            let mut latencies = Vec::with_capacity(reads_per_reader);
            for _ in 0..reads_per_reader {
                let t = Instant::now();
                engine.available_rooms(&ctx, base, base + Days::new(7)).await.unwrap();
                latencies.push(t.elapsed());
            }
            latencies
        }));
    }

    let mut all = Vec::new();
    for h in readers {
        all.extend(h.await.unwrap());
    }
    stop.store(true, Ordering::Relaxed);
    for h in writers {
        let _ = h.await;
    }
    print_latency("available_rooms", &mut all);
}

#[tokio::main]
async fn main() {
    let base = NaiveDate::from_ymd_opt(2050, 1, 1).unwrap();
    let dir = std::env::temp_dir().join("innkeep_bench");
    std::fs::create_dir_all(&dir).unwrap();

    println!("=== innkeep stress benchmark ===\n");

    println!("[phase 1] sequential commit throughput (journaled)");
    phase1_sequential(base, &dir.join("phase1.wal")).await;

    println!("\n[phase 2] concurrent commit throughput (journaled, one room per task)");
    phase2_concurrent(base, &dir.join("phase2.wal")).await;

    println!("\n[phase 3] contention on one room");
    phase3_contention(base).await;

    println!("\n[phase 4] search latency under write load");
    phase4_read_under_load(base).await;

    println!("\n=== done ===");
}
