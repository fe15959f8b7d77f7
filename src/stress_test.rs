use async_stream::stream;
use futures::stream::Stream;
use futures::stream::StreamExt;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use redline_core::Lattice;
use redline_sdk::{Author, Document, EditChange, EditTransaction, TextSelection};
use redline_text::RGAText;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Statistics collected during stress testing
#[derive(Clone, Debug)]
pub struct StressTestStats {
    pub name: &'static str,
    pub num_replicas: usize,
    pub operations_per_replica: usize,
    pub total_syncs: usize,
    pub total_time: Duration,
    pub avg_sync_time: Duration,
    pub ops_per_second: f64,
    pub final_length: usize,
    pub tracked_changes: usize,
    pub converged: bool,
}

impl StressTestStats {
    pub fn print(&self) {
        println!("\n╔════════════════════════════════════════════════════════════╗");
        println!("║  {:<58}║", self.name);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║  Number of Replicas:        {:>30} ║", self.num_replicas);
        println!("║  Operations per Replica:    {:>30} ║", self.operations_per_replica);
        println!("║  Total Sync Operations:     {:>30} ║", self.total_syncs);
        println!("║  Total Time:                {:>29}s ║", format!("{:.3}", self.total_time.as_secs_f64()));
        println!("║  Average Sync Time:         {:>28}µs ║", self.avg_sync_time.as_micros());
        println!("║  Operations/Second:         {:>30.0} ║", self.ops_per_second);
        println!("║  Final Length (chars):      {:>30} ║", self.final_length);
        println!("║  Open Tracked Changes:      {:>30} ║", self.tracked_changes);
        println!("║  Converged:                 {:>30} ║", self.converged);
        println!("╚════════════════════════════════════════════════════════════╝");
    }
}

/// Generator that yields replica index pairs to synchronize
fn replica_sync_generator(
    num_replicas: usize,
    num_syncs: usize,
    seed: u64,
) -> impl Stream<Item = (usize, usize)> {
    stream! {
        let mut rng = StdRng::seed_from_u64(seed);
        for _ in 0..num_syncs {
            let replica_a = rng.gen_range(0..num_replicas);
            let replica_b = rng.gen_range(0..num_replicas);
            yield (replica_a, replica_b);
        }
    }
}

/// A random local edit against a text of `len` characters.
fn random_edit(rng: &mut StdRng, len: usize) -> (EditTransaction, Option<TextSelection>) {
    const WORDS: [&str; 6] = ["lorem ", "ipsum ", "dolor ", "sit ", "amet ", "\n"];

    if len < 4 || rng.gen_bool(0.6) {
        let at = rng.gen_range(0..=len);
        let word = WORDS[rng.gen_range(0..WORDS.len())];
        return (EditTransaction::single(EditChange::insert(at, word)), None);
    }

    let from = rng.gen_range(0..len - 1);
    let to = (from + rng.gen_range(1..4)).min(len);
    // Backspace or forward delete, depending on where the caret sat.
    let caret = if rng.gen_bool(0.5) { from } else { to };
    (
        EditTransaction::single(EditChange::delete(from, to)),
        Some(TextSelection::caret(caret)),
    )
}

/// Exchange full state between two replicas
async fn sync_documents(
    replicas: &[Arc<Mutex<Document>>],
    a: usize,
    b: usize,
) -> Option<Duration> {
    if a == b {
        return None;
    }
    let start = Instant::now();

    let (mut doc_a, mut doc_b) = tokio::join!(replicas[a].lock(), replicas[b].lock());
    let state_a = doc_a.encode_state().ok()?;
    let state_b = doc_b.encode_state().ok()?;
    if let Err(e) = doc_b.apply_remote(&state_a) {
        tracing::warn!(error = %e, "sync failed");
    }
    if let Err(e) = doc_a.apply_remote(&state_b) {
        tracing::warn!(error = %e, "sync failed");
    }

    Some(start.elapsed())
}

/// Concurrent tracked editing on document handles, synchronized by full
/// state exchange between random pairs.
pub async fn stress_test_documents(
    num_replicas: usize,
    ops_per_replica: usize,
    num_syncs: usize,
) -> StressTestStats {
    println!("\n[documents] replicas: {} | ops/replica: {} | syncs: {}",
             num_replicas, ops_per_replica, num_syncs);

    let start = Instant::now();
    let seed_doc = Document::with_text(
        "stress",
        "seed",
        Author::new("seed", "Seed"),
        false,
        "The quick brown fox jumps over the lazy dog.",
    );
    let snapshot = match seed_doc.encode_state() {
        Ok(snapshot) => snapshot,
        Err(e) => {
            tracing::error!(error = %e, "failed to encode seed");
            Vec::new()
        }
    };

    let mut replicas: Vec<Arc<Mutex<Document>>> = Vec::with_capacity(num_replicas);
    for idx in 0..num_replicas {
        let author = Author::new(format!("user-{}", idx), format!("User {}", idx));
        let doc = Document::from_snapshot("stress", format!("replica-{}", idx), author, true, &snapshot)
            .unwrap_or_else(|_| {
                Document::new("stress", format!("replica-{}", idx), Author::new("x", "X"), true)
            });
        replicas.push(Arc::new(Mutex::new(doc)));
    }

    println!("[Phase 1/3] Editing with track changes on...");
    let mut handles = vec![];
    for (idx, replica) in replicas.iter().enumerate() {
        let replica = Arc::clone(replica);
        handles.push(tokio::spawn(async move {
            let mut rng = StdRng::seed_from_u64(idx as u64);
            for i in 0..ops_per_replica {
                let mut doc = replica.lock().await;
                let (tx, selection) = random_edit(&mut rng, doc.len());
                if let Some(selection) = selection {
                    doc.set_selection(selection);
                }
                doc.transact(tx);
                drop(doc);

                tokio::task::yield_now().await;
                replica.lock().await.run_deferred();

                if i % 50 == 0 {
                    tokio::task::yield_now().await;
                }
            }
        }));
    }
    for handle in handles {
        let _ = handle.await;
    }

    println!("[Phase 2/3] Random pairwise sync...");
    let mut sync_times = vec![];
    let mut pairs = Box::pin(replica_sync_generator(num_replicas, num_syncs, 42));
    while let Some((a, b)) = pairs.next().await {
        if let Some(elapsed) = sync_documents(&replicas, a, b).await {
            sync_times.push(elapsed);
            if sync_times.len() % 100 == 0 {
                println!("  Syncs completed: {}/{}", sync_times.len(), num_syncs);
            }
        }
    }

    println!("[Phase 3/3] Final ring sync and convergence check...");
    for round in 0..2 {
        for i in 0..num_replicas {
            let next = (i + 1) % num_replicas;
            if let Some(elapsed) = sync_documents(&replicas, i, next).await {
                sync_times.push(elapsed);
            }
        }
        tracing::debug!(round, "ring sync round done");
    }

    let mut contents = Vec::with_capacity(num_replicas);
    for replica in &replicas {
        contents.push(replica.lock().await.content());
    }
    let converged = contents.windows(2).all(|w| w[0] == w[1]);
    let tracked_changes = replicas[0].lock().await.tracked_changes().len();

    finish(
        "Tracked Document Stress Test",
        num_replicas,
        ops_per_replica,
        start,
        sync_times,
        contents.first().map(|c| c.chars().count()).unwrap_or(0),
        tracked_changes,
        converged,
    )
}

/// Raw text replicas merged through the lattice join.
pub async fn stress_test_text_join(
    num_replicas: usize,
    ops_per_replica: usize,
    num_syncs: usize,
) -> StressTestStats {
    println!("\n[text join] replicas: {} | ops/replica: {} | syncs: {}",
             num_replicas, ops_per_replica, num_syncs);

    let start = Instant::now();
    let mut replicas: Vec<RGAText> = (0..num_replicas)
        .map(|i| RGAText::new(format!("replica-{}", i)))
        .collect();

    let mut rng = StdRng::seed_from_u64(7);
    for (idx, text) in replicas.iter_mut().enumerate() {
        for i in 0..ops_per_replica {
            let len = text.len();
            let result = if len > 0 && rng.gen_bool(0.3) {
                text.delete(rng.gen_range(0..len), 1)
            } else {
                let ch = char::from(b'a' + ((idx + i) % 26) as u8);
                text.insert(rng.gen_range(0..=len), &ch.to_string())
            };
            if let Err(e) = result {
                tracing::warn!(error = %e, "edit failed");
            }
        }
    }

    let mut sync_times = vec![];
    let mut pairs = Box::pin(replica_sync_generator(num_replicas, num_syncs, 99));
    while let Some((a, b)) = pairs.next().await {
        if a == b {
            continue;
        }
        let sync_start = Instant::now();
        let merged = replicas[a].join(&replicas[b]);
        replicas[b].join_assign(&merged);
        replicas[a] = merged;
        sync_times.push(sync_start.elapsed());
    }

    // Merge order must not matter.
    let forward = replicas.iter().fold(RGAText::bottom(), |acc, t| acc.join(t));
    let backward = replicas.iter().rev().fold(RGAText::bottom(), |acc, t| acc.join(t));
    let converged = forward.to_string() == backward.to_string();

    finish(
        "RGA Text Join Stress Test",
        num_replicas,
        ops_per_replica,
        start,
        sync_times,
        forward.len(),
        0,
        converged,
    )
}

#[allow(clippy::too_many_arguments)]
fn finish(
    name: &'static str,
    num_replicas: usize,
    ops_per_replica: usize,
    start: Instant,
    sync_times: Vec<Duration>,
    final_length: usize,
    tracked_changes: usize,
    converged: bool,
) -> StressTestStats {
    let total_time = start.elapsed();
    let avg_sync_time = if !sync_times.is_empty() {
        sync_times.iter().sum::<Duration>() / sync_times.len() as u32
    } else {
        Duration::ZERO
    };
    let total_operations = num_replicas * ops_per_replica + sync_times.len();
    let ops_per_second = total_operations as f64 / total_time.as_secs_f64().max(f64::EPSILON);

    StressTestStats {
        name,
        num_replicas,
        operations_per_replica: ops_per_replica,
        total_syncs: sync_times.len(),
        total_time,
        avg_sync_time,
        ops_per_second,
        final_length,
        tracked_changes,
        converged,
    }
}
