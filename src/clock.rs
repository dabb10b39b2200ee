/*!
Tick clock: the heartbeat every other component paces to.

A single worker sleeps one tick period, then increments `current_tick`
under the world lock while the simulation is running. Ticks are the only
authoritative time unit; wall-clock delays elsewhere are cosmetic.
*/

use std::io;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::world::SharedWorld;

pub fn spawn(world: SharedWorld, tick_ms: u64) -> io::Result<JoinHandle<()>> {
    thread::Builder::new().name("tick".into()).spawn(move || {
        loop {
            let running = {
                let mut w = world.lock();
                if w.simulation_running {
                    w.current_tick += 1;
                }
                w.simulation_running
            };
            if !running {
                break;
            }
            thread::sleep(Duration::from_millis(tick_ms));
        }
    })
}
