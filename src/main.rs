use stress_test::{stress_test_documents, stress_test_text_join};
use tracing_subscriber::EnvFilter;
pub mod stress_test;

fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async_main());
    Ok(())
}

async fn async_main() {
    println!("\n╔════════════════════════════════════════════════════════════╗");
    println!("║            REDLINE STRESS TESTS                            ║");
    println!("╚════════════════════════════════════════════════════════════╝");

    let mut all_converged = true;

    // Small scale
    let stats = stress_test_text_join(4, 100, 200).await;
    all_converged &= stats.converged;
    stats.print();

    let stats = stress_test_documents(4, 100, 200).await;
    all_converged &= stats.converged;
    stats.print();

    // Medium scale
    let stats = stress_test_text_join(10, 300, 1000).await;
    all_converged &= stats.converged;
    stats.print();

    let stats = stress_test_documents(10, 300, 1000).await;
    all_converged &= stats.converged;
    stats.print();

    if all_converged {
        println!("\n✓ All stress tests converged");
    } else {
        println!("\n✗ Some replicas diverged");
        std::process::exit(1);
    }
}
