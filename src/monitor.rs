/*
 *  monitor.rs
 *
 *  qnaplcd - front panel, no fuss
 *  (c) 2020-26 Stuart Hunter
 *
 *  Shows the host's addresses on the panel, Up/Down to cycle,
 *  goes dark after a spell without button presses
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::MonitorConfig;
use crate::display::{Button, Lcd, Line};

/// Standby watcher period.
const WATCH_TICK: Duration = Duration::from_secs(1);

/// Second line when there is nothing to show.
const NO_ADDRESS: &str = "-";

/// Produces the addresses to show, in display order.
pub type AddressSource = Box<dyn Fn() -> Vec<String> + Send + Sync>;

/// Non-loopback IPv4 and IPv6 addresses of the host's interfaces.
pub fn list_addresses() -> Vec<String> {
    match local_ip_address::list_afinet_netifas() {
        Ok(netifas) => netifas
            .into_iter()
            .filter(|(_, ip)| !ip.is_loopback())
            .map(|(_, ip)| ip.to_string())
            .collect(),
        Err(e) => {
            warn!("unable to list network interfaces: {}", e);
            Vec::new()
        }
    }
}

/// Cursor over the address list, wrapping both ways.
#[derive(Debug, Default)]
pub struct AddressCycle {
    addresses: Vec<String>,
    current: Option<usize>,
}

impl AddressCycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swap in a fresh list; the cursor is kept and re-wrapped on the next step.
    pub fn replace(&mut self, addresses: Vec<String>) {
        self.addresses = addresses;
    }

    /// Move by `direction` and return what to show.
    ///
    /// From no selection a zero step lands on the last address, matching a
    /// cursor that starts one before the first entry.
    pub fn step(&mut self, direction: isize) -> &str {
        let count = self.addresses.len() as isize;
        if count == 0 {
            self.current = None;
            return NO_ADDRESS;
        }

        let from = self.current.map_or(-1, |i| i as isize);
        let mut next = from + direction;
        if next < 0 {
            next = count - 1;
        } else if next >= count {
            next = 0;
        }
        self.current = Some(next as usize);
        &self.addresses[next as usize]
    }

    pub fn current(&self) -> Option<&str> {
        self.current.and_then(|i| self.addresses.get(i)).map(String::as_str)
    }
}

/// What the controller tracks between events
struct Panel {
    cycle: AddressCycle,
    standby: bool,
    standby_at: Instant,
    refresh_at: Instant,
}

/// Drives the panel: address display, button navigation, standby.
pub struct Monitor<L: Lcd> {
    lcd: Arc<L>,
    standby_after: Duration,
    refresh_every: Duration,
    watch_every: Duration,
    source: AddressSource,
}

impl<L: Lcd> Monitor<L> {
    pub fn new(lcd: Arc<L>, cfg: &MonitorConfig) -> Self {
        Self {
            lcd,
            standby_after: cfg.standby(),
            refresh_every: cfg.refresh(),
            watch_every: WATCH_TICK,
            source: Box::new(list_addresses),
        }
    }

    /// Use `source` instead of the host's interfaces.
    pub fn with_source<S>(mut self, source: S) -> Self
    where
        S: Fn() -> Vec<String> + Send + Sync + 'static,
    {
        self.source = Box::new(source);
        self
    }

    pub fn lcd(&self) -> &Arc<L> {
        &self.lcd
    }

    /// Listen for buttons and drive the panel until listening stops.
    ///
    /// Button events are handed from the listener to the controller over a
    /// channel; the controller ends once the listener drops its end.
    pub async fn run(&self) {
        let (events, queue) = mpsc::unbounded_channel::<(Button, bool)>();
        let listener = self
            .lcd
            .listen(move |button, released| events.send((button, released)).is_ok());

        tokio::join!(listener, self.control(queue));
        info!("monitor stopped");
    }

    async fn control(&self, mut queue: mpsc::UnboundedReceiver<(Button, bool)>) {
        let now = Instant::now();
        let mut panel = Panel {
            cycle: AddressCycle::new(),
            standby: true,
            standby_at: now + self.standby_after,
            refresh_at: now + self.refresh_every,
        };
        self.wake(&mut panel).await;

        let mut watch = tokio::time::interval(self.watch_every);
        watch.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                event = queue.recv() => match event {
                    Some((button, released)) => self.on_button(&mut panel, button, released).await,
                    None => break,
                },
                _ = watch.tick() => self.on_tick(&mut panel).await,
            }
        }
    }

    async fn on_button(&self, panel: &mut Panel, button: Button, released: bool) {
        if released {
            if panel.standby {
                // first press only wakes the panel
                self.wake(panel).await;
            } else {
                match button {
                    Button::Up => self.show_step(panel, 1).await,
                    Button::Down => self.show_step(panel, -1).await,
                    Button::Both | Button::None => self.sleep(panel).await,
                }
            }
        }
        panel.standby_at = Instant::now() + self.standby_after;
    }

    async fn on_tick(&self, panel: &mut Panel) {
        if panel.standby {
            return;
        }
        let now = Instant::now();
        if now >= panel.standby_at {
            self.sleep(panel).await;
        } else if now >= panel.refresh_at {
            self.refresh(panel).await;
        }
    }

    async fn wake(&self, panel: &mut Panel) {
        if !panel.standby {
            return;
        }
        panel.standby = false;
        panel.standby_at = Instant::now() + self.standby_after;
        debug!("panel waking");

        if let Err(e) = self.lcd.enable(true).await {
            warn!("unable to switch the panel on: {}", e);
        }
        self.refresh(panel).await;
    }

    async fn sleep(&self, panel: &mut Panel) {
        if panel.standby {
            return;
        }
        panel.standby = true;
        debug!("panel entering standby");

        if let Err(e) = self.lcd.enable(false).await {
            warn!("unable to switch the panel off: {}", e);
        }
    }

    async fn refresh(&self, panel: &mut Panel) {
        panel.cycle.replace((self.source)());
        panel.refresh_at = Instant::now() + self.refresh_every;
        self.show_step(panel, 0).await;
    }

    async fn show_step(&self, panel: &mut Panel, direction: isize) {
        let address = panel.cycle.step(direction).to_string();
        self.show(&address).await;
    }

    async fn show(&self, address: &str) {
        if let Err(e) = self.lcd.write(Line::First, "IP:").await {
            warn!("panel write failed: {}", e);
            return;
        }
        if let Err(e) = self.lcd.write(Line::Second, address).await {
            warn!("panel write failed: {}", e);
        }
    }
}
