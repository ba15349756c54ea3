//! Runs the illustrative demo query end to end and prints what the sink
//! collected. Not a production entry point - source/sink implementations
//! with real I/O are out of scope for this core (spec §1 Non-goals).

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut qm = nes::default_query_manager();
    let source = nes::VecSource::new(vec![1, 2, 3, 4, 5]);
    match nes::run_demo_query(&qm, source) {
        Ok(mut values) => {
            values.sort_unstable();
            println!("collected {} doubled values: {values:?}", values.len());
        }
        Err(err) => eprintln!("demo query failed: {err}"),
    }
    qm.shutdown();
}
