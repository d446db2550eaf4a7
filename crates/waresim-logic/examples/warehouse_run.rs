//! Warehouse walkthrough: a small fleet delivering boxes to the dock.
//!
//! Builds the standard layout from the default config, stocks the source
//! cells, submits three deliveries, and steps the clock manually, printing
//! fleet and storage snapshots as the AGVs work.
//!
//! Run with: `cargo run -p waresim-logic --example warehouse_run`

use waresim_core::config::SimConfig;
use waresim_core::query::{fleet_snapshot, storage_snapshot};
use waresim_core::storage::{BeveragesBox, BoxKind};
use waresim_logic::SimContext;

fn main() {
    let config = SimConfig::default();
    let ctx = SimContext::new(config).expect("default config is valid");

    // --- Step 1: stock the source cells ---

    let cola = BeveragesBox::new(BoxKind::Ambient, "cola", 2, 2, 2, 12);
    let kvass = BeveragesBox::new(BoxKind::Refrigerated, "kvass", 2, 2, 2, 12);
    let keg = BeveragesBox::new(BoxKind::Bulk, "keg", 4, 4, 4, 1);
    ctx.storage().add_box("A1", cola.clone()).expect("A1 exists");
    ctx.storage().add_box("B1", kvass.clone()).expect("B1 exists");
    ctx.storage().add_box("C1", keg.clone()).expect("C1 exists");

    // --- Step 2: submit one delivery per box kind ---

    for item in [cola, kvass, keg] {
        match ctx.submit_delivery(item.clone()) {
            Some(id) => println!("submitted {:?} as task {:?}", item.name(), id),
            None => println!("fleet saturated, {:?} not submitted", item.name()),
        }
    }

    // --- Step 3: step the clock until the fleet goes quiet ---

    for _ in 0..80 {
        ctx.step();
        let fleet = ctx.fleet().read().expect("fleet lock poisoned");
        let snapshots = fleet_snapshot(&fleet);
        let busy = snapshots
            .iter()
            .filter(|s| s.state != waresim_core::agv::AgvState::Idle)
            .count();
        if ctx.current_tick() % 10 == 0 {
            println!("tick {:>3}: {busy} AGV(s) working", ctx.current_tick());
            for snapshot in &snapshots {
                println!(
                    "  {:?} at {} battery {:.0} ({:?})",
                    snapshot.id, snapshot.position, snapshot.battery, snapshot.state
                );
            }
        }
        if busy == 0 && ctx.dispatcher().active_count() == 0 {
            break;
        }
    }

    // --- Step 4: final storage report ---

    println!("\nfinal storage after {} ticks:", ctx.current_tick());
    for cell in storage_snapshot(ctx.storage()) {
        if cell.box_count > 0 {
            println!(
                "  {}: {} box(es), {} volume used",
                cell.notation, cell.box_count, cell.used_volume
            );
        }
    }

    ctx.shutdown();
}
