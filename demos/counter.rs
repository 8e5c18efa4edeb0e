//! Counter view backed by a batched keyed store

use keyed_store::{key_state, runtime::Runtime, watch_key, KeyedStore, Listener, StoreOptions};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Keyed Store Example: Counter ===\n");

    let runtime = Runtime::new();
    let store = KeyedStore::with_options(
        [("count", 0), ("step", 1)],
        StoreOptions::new()
            .batch_updates(true)
            .runtime(runtime.clone()),
    );

    println!("1. Logging changes to 'count'");
    let log = store.subscribe(
        "count",
        Listener::new(|count: &i32| println!("   [count] {}", count)),
    );

    println!("\n2. Mounting a view on 'count' and 'step'");
    let (count, set_count) = key_state(Some(&store), "count");
    let step = watch_key(Some(&store), "step")
        .on_render(|| println!("   [view] step re-rendered"));

    println!("\n3. Three increments in one tick");
    for _ in 0..3 {
        let amount = step.get().unwrap_or(1);
        set_count.update(move |c| c + amount);
    }
    println!("   staged value: {:?}", store.get(&"count"));
    println!("   view before tick: {:?}", count.get());

    let ran = runtime.run_pending().unwrap_or_else(|e| {
        eprintln!("   tick failed: {e}");
        0
    });
    println!(
        "   tick ran {} task(s), view after tick: {:?}",
        ran,
        count.get()
    );

    println!("\n4. Changing the step to 5 and incrementing");
    store.set_value("step", 5);
    runtime.run_pending().ok();
    let step_value = step.get().unwrap_or(1);
    set_count.update(move |c| c + step_value);
    runtime.run_pending().ok();
    println!(
        "   view: {:?} (renders of count: {})",
        count.get(),
        count.version()
    );

    println!("\n5. Unmounting the view");
    drop(count);
    drop(step);
    log.unsubscribe();
    println!(
        "   listeners left: count={}, step={}",
        store.listener_count(&"count"),
        store.listener_count(&"step")
    );
}
