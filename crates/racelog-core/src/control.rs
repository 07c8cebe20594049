//! Control Loop
//!
//! Central 20 Hz loop: debounced logging button, row cadence and the
//! operator status line.

use std::fmt;
use std::io::Write;
use std::time::{Duration, Instant};

use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::hardware::DigitalInputReader;
use crate::relay::CommandRelay;
use crate::session::{lock_session, SharedSession, Transition};
use crate::shutdown::ShutdownSignal;
use crate::store::{Domain, Snapshot, TelemetryStore};

/// Default loop period (20 Hz)
pub const DEFAULT_TICK: Duration = Duration::from_millis(50);

/// Default minimum spacing between accepted button presses
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Accepts a press only if enough time passed since the last accepted one
#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    last_accepted: Option<Instant>,
}

impl Debouncer {
    /// Create a debouncer with the given window
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_accepted: None,
        }
    }

    /// Feed one input sample; returns true if it counts as a press
    pub fn accept(&mut self, pressed: bool, now: Instant) -> bool {
        if !pressed {
            return false;
        }
        let ready = self
            .last_accepted
            .map_or(true, |last| now.saturating_duration_since(last) >= self.window);
        if ready {
            self.last_accepted = Some(now);
        }
        ready
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}

/// One rendered console status line
#[derive(Debug, Clone, PartialEq)]
pub struct StatusLine {
    /// Engine speed
    pub rpm: f64,
    /// Vehicle speed, km/h
    pub vss_kmh: f64,
    /// GPS reports a valid fix
    pub gps_fix: bool,
    /// Logging session active
    pub logging: bool,
    /// Last lap count relayed to the bus
    pub last_lap: Option<i64>,
}

impl StatusLine {
    /// Build from the latest snapshot
    pub fn from_snapshot(snapshot: &Snapshot, logging: bool, last_lap: Option<i64>) -> Self {
        let number = |key: &str| {
            snapshot
                .get(Domain::Can, key)
                .and_then(|v| v.as_number())
                .unwrap_or(0.0)
        };
        Self {
            rpm: number("RPM"),
            vss_kmh: number("VSS_kmh"),
            gps_fix: snapshot
                .get(Domain::Gps, "gps_fix")
                .is_some_and(|v| v.is_truthy()),
            logging,
            last_lap,
        }
    }
}

impl fmt::Display for StatusLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RPM:{:>5} | VSS:{:>5.1}km/h | GPS:{} | Logging:{} | Lap Sent:",
            self.rpm.round() as i64,
            self.vss_kmh,
            if self.gps_fix { "OK" } else { "No Fix" },
            if self.logging { "ON" } else { "OFF" },
        )?;
        match self.last_lap {
            Some(lap) => write!(f, "{}", lap),
            None => f.write_str("-"),
        }
    }
}

/// What one iteration did
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    /// Session transition caused by an accepted press
    pub transition: Option<Transition>,
    /// A row was appended
    pub row_written: bool,
}

/// Coordinator loop owning the button and the console
pub struct ControlLoop {
    store: TelemetryStore,
    session: SharedSession,
    button: Box<dyn DigitalInputReader>,
    debouncer: Debouncer,
    relay: Option<CommandRelay>,
    console: Option<Box<dyn Write + Send>>,
    tick: Duration,
}

impl ControlLoop {
    /// Create a loop with default cadence and debounce, no relay and no console
    pub fn new(
        store: TelemetryStore,
        session: SharedSession,
        button: Box<dyn DigitalInputReader>,
    ) -> Self {
        Self {
            store,
            session,
            button,
            debouncer: Debouncer::default(),
            relay: None,
            console: None,
            tick: DEFAULT_TICK,
        }
    }

    /// Loop period
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Button debounce window
    pub fn with_debounce(mut self, window: Duration) -> Self {
        self.debouncer = Debouncer::new(window);
        self
    }

    /// Relay whose last lap is shown in the status line
    pub fn with_relay(mut self, relay: CommandRelay) -> Self {
        self.relay = Some(relay);
        self
    }

    /// Console the status line is rendered to
    pub fn with_console(mut self, console: Box<dyn Write + Send>) -> Self {
        self.console = Some(console);
        self
    }

    /// Run one iteration at `now`
    pub fn step(&mut self, now: Instant) -> StepOutcome {
        let mut outcome = StepOutcome::default();
        let pressed = self.button.read_pressed();

        let logging = {
            let mut session = lock_session(&self.session);
            if self.debouncer.accept(pressed, now) {
                // Open failures are reported by the session itself.
                outcome.transition = session.toggle(now).ok();
            }
            if session.is_active() {
                outcome.row_written = session.tick(now, &self.store);
            }
            session.is_active()
        };

        if let Some(console) = self.console.as_mut() {
            let last_lap = self.relay.as_ref().and_then(CommandRelay::last_relayed);
            let line = StatusLine::from_snapshot(&self.store.snapshot(), logging, last_lap);
            if let Err(e) = write!(console, "\r{}    ", line).and_then(|_| console.flush()) {
                debug!("Status line not rendered: {}", e);
            }
        }

        outcome
    }

    /// Iterate every tick until `signal` is raised
    pub async fn run(mut self, signal: ShutdownSignal) {
        info!(tick_ms = self.tick.as_millis() as u64, "Control loop started");

        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = signal.triggered() => break,
                _ = ticker.tick() => {
                    self.step(Instant::now());
                }
            }
        }

        if let Some(console) = self.console.as_mut() {
            let _ = writeln!(console);
        }
        info!("Control loop stopped");
    }
}
