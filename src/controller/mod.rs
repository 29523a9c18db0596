#![allow(dead_code)]
pub mod command_queue;
pub mod coordination;

use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use tokio::time::{interval, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::domain::ats::AtsState;
use crate::domain::bms::BmsState;
use crate::domain::inverter::InverterState;
use crate::domain::mcu::{FirmwareVersion, McuState};
use crate::domain::profile::{ProfileDefaults, ProfileKey, ProfileState, ProfileValue};
use crate::domain::psu::PsuState;
use crate::domain::supervised::SystemEvent;
use crate::hardware::{
    AtsMonitor, BmsClient, ButtonDebouncer, ButtonEvent, DigitalInput, InverterClient, McuMonitor,
    PsuClient, PsuCurrentMux, Tachometer,
};

use command_queue::{Command, CommandQueue, CommandSender};

/// Pulses per revolution for both fans (spec.md §4.12); the same sensor
/// part is used on the inverter and PSU boards.
const FAN_PULSES_PER_REVOLUTION: u32 = 2;
const FAN_SAMPLE_PERIOD: Duration = Duration::from_millis(100);
const FAN_RPM_WINDOW: Duration = Duration::from_secs(1);
const BUTTON_SAMPLE_PERIOD: Duration = Duration::from_millis(10);

/// Shared runtime: every supervised domain state plus the broadcast fabric
/// they publish events on. One task per peripheral owns its state's
/// read-modify-write cycle; everything else reaches it through `Arc<Mutex<_>>`
/// or through fabric events (spec.md §2, §9).
pub struct System {
    pub config: AppConfig,
    pub fabric: broadcast::Sender<SystemEvent>,
    pub bms: Arc<Mutex<BmsState>>,
    pub inverter: Arc<Mutex<InverterState>>,
    pub psu: Arc<Mutex<PsuState>>,
    pub ats: Arc<Mutex<AtsState>>,
    pub mcu: Arc<Mutex<McuState>>,
    pub profile: Arc<Mutex<ProfileState>>,
    pub shutdown: CancellationToken,
}

struct BmsDraw {
    bms: Arc<Mutex<BmsState>>,
}

impl crate::domain::mcu::DrawSource for BmsDraw {
    // try_lock throughout: the MCU tick is best-effort and must never block
    // behind a BMS poll in flight.
    fn is_discharging(&self) -> bool {
        self.bms
            .try_lock()
            .ok()
            .map(|b| b.latest().is_discharging())
            .unwrap_or(false)
    }

    fn pack_voltage_v(&self) -> f32 {
        self.bms
            .try_lock()
            .ok()
            .map(|b| b.latest().pack_voltage_v())
            .unwrap_or(0.0)
    }

    fn is_active(&self) -> bool {
        self.bms.try_lock().ok().map(|b| b.base.active).unwrap_or(false)
    }
}

impl System {
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        let (fabric, _) = broadcast::channel(256);

        let mut bms = BmsState::new(config.bms.min_cell_v, config.bms.max_cell_v);
        bms.base.attach_fabric(fabric.clone());

        let mut inverter = InverterState::new();
        inverter.base.attach_fabric(fabric.clone());

        let mut psu = PsuState::new();
        psu.base.attach_fabric(fabric.clone());

        let mut ats = AtsState::new();
        ats.base.attach_fabric(fabric.clone());

        let (major, minor, patch) = config.mcu.parse_version()?;
        let mut mcu = McuState::new(
            FirmwareVersion { major, minor, patch },
            Duration::from_millis(config.mcu.tick_ms),
            config.mcu.mcu_power_w,
            config.mcu.usb_power_w,
            config.mcu.bms_power_w,
        );
        mcu.base.attach_fabric(fabric.clone());

        let defaults = ProfileDefaults {
            min_cell_v: config.bms.min_cell_v,
            max_cell_v: config.bms.max_cell_v,
            model: "powerbox".to_string(),
        };
        let mut profile = ProfileState::load(config.profile.path.clone(), &defaults).await;
        profile.base.attach_fabric(fabric.clone());

        // The persisted value, if any, wins over the static config default
        // so a user's last wireless ats.set_enabled write survives a reboot.
        let ats_enabled = profile
            .get(ProfileKey::AtsEnabled)
            .and_then(|v| v.as_bool())
            .unwrap_or(config.ats.enabled_by_default);
        ats.set_enabled(ats_enabled);

        Ok(Self {
            config,
            fabric,
            bms: Arc::new(Mutex::new(bms)),
            inverter: Arc::new(Mutex::new(inverter)),
            psu: Arc::new(Mutex::new(psu)),
            ats: Arc::new(Mutex::new(ats)),
            mcu: Arc::new(Mutex::new(mcu)),
            profile: Arc::new(Mutex::new(profile)),
            shutdown: CancellationToken::new(),
        })
    }

    /// Spawn one task per peripheral plus the coordination fabric and
    /// command queue consumer. Returns their join handles so the caller
    /// can await a clean shutdown.
    #[allow(clippy::too_many_arguments)]
    pub fn spawn_all(
        self: &Arc<Self>,
        bms_client: Arc<BmsClient>,
        inverter_client: Arc<InverterClient>,
        psu_client: Arc<PsuClient>,
        ats_monitor: Arc<AtsMonitor>,
        psu_current_mux: Arc<PsuCurrentMux>,
        inverter_fan_pin: Arc<dyn DigitalInput>,
        psu_fan_pin: Arc<dyn DigitalInput>,
        power_button_pin: Arc<dyn DigitalInput>,
        command_sender: CommandSender,
        commands: CommandQueue,
    ) -> Vec<tokio::task::JoinHandle<()>> {
        let mut handles = Vec::new();

        handles.push(tokio::spawn(bms_loop(
            self.clone(),
            bms_client,
            Duration::from_secs(self.config.bms.poll_seconds),
        )));
        handles.push(tokio::spawn(inverter_loop(
            self.clone(),
            inverter_client,
            Duration::from_secs(self.config.inverter.poll_seconds),
        )));
        handles.push(tokio::spawn(psu_loop(
            self.clone(),
            psu_client,
            Duration::from_secs(self.config.psu.poll_seconds),
        )));
        handles.push(tokio::spawn(ats_loop(self.clone(), ats_monitor)));
        handles.push(tokio::spawn(mcu_loop(self.clone())));
        handles.push(tokio::spawn(coordination::run(
            self.fabric.subscribe(),
            self.bms.clone(),
            self.psu.clone(),
            self.inverter.clone(),
            self.ats.clone(),
            self.config.psu.reduce_current_voltage,
        )));
        handles.push(tokio::spawn(command_loop(
            self.clone(),
            commands,
            psu_current_mux,
        )));
        handles.push(tokio::spawn(inverter_fan_loop(self.clone(), inverter_fan_pin)));
        handles.push(tokio::spawn(psu_fan_loop(self.clone(), psu_fan_pin)));
        handles.push(tokio::spawn(button_loop(
            self.clone(),
            power_button_pin,
            command_sender,
        )));

        handles
    }

    /// Requests every spawned loop to stop at its next tick. Callers should
    /// still join the handles returned by [`System::spawn_all`] afterward.
    pub fn request_shutdown(&self) {
        self.shutdown.cancel();
    }
}

async fn bms_loop(system: Arc<System>, client: Arc<BmsClient>, period: Duration) {
    let mut ticker = interval(period);
    loop {
        tokio::select! {
            _ = system.shutdown.cancelled() => return,
            _ = ticker.tick() => {}
        }
        let mut bms = system.bms.lock().await;
        match client.poll().await {
            Ok(reading) => {
                bms.base.reset_error(crate::domain::supervised::ErrorBit::NoResponse);
                bms.apply(reading);
            }
            Err(err) => {
                warn!(%err, "bms poll failed");
                bms.wipe();
            }
        }
        if bms.base.snapshot() {
            bms.trigger_change();
        }
    }
}

async fn inverter_loop(system: Arc<System>, client: Arc<InverterClient>, period: Duration) {
    let mut ticker = interval(period);
    loop {
        tokio::select! {
            _ = system.shutdown.cancelled() => return,
            _ = ticker.tick() => {}
        }
        let mut inverter = system.inverter.lock().await;
        inverter.tick_bootstrap();
        if !inverter.should_poll() {
            continue;
        }
        match client.poll().await {
            Ok(reading) => inverter.apply(reading),
            Err(err) => {
                warn!(%err, "inverter poll failed");
                inverter.base.fail(err.to_string());
            }
        }
        if inverter.base.snapshot() {
            inverter.trigger_change();
        }
    }
}

async fn psu_loop(system: Arc<System>, client: Arc<PsuClient>, period: Duration) {
    let mut ticker = interval(period);
    loop {
        tokio::select! {
            _ = system.shutdown.cancelled() => return,
            _ = ticker.tick() => {}
        }
        let mut psu = system.psu.lock().await;
        match client.poll().await {
            Ok(reading) => psu.apply(reading),
            Err(err) => {
                warn!(%err, "psu poll failed");
                psu.base.fail(err.to_string());
            }
        }
        if psu.base.snapshot() {
            psu.trigger_change();
        }
    }
}

async fn ats_loop(system: Arc<System>, monitor: Arc<AtsMonitor>) {
    let mut ticker = interval(Duration::from_millis(100));
    loop {
        tokio::select! {
            _ = system.shutdown.cancelled() => return,
            _ = ticker.tick() => {}
        }
        let mut ats = system.ats.lock().await;
        monitor.poll(&mut ats);
    }
}

async fn mcu_loop(system: Arc<System>) {
    let period = system.mcu.lock().await.tick_period();
    let draw = BmsDraw { bms: system.bms.clone() };
    let monitor = McuMonitor::new(draw);
    let mut ticker = interval(period);
    loop {
        tokio::select! {
            _ = system.shutdown.cancelled() => return,
            _ = ticker.tick() => {}
        }
        let mut mcu = system.mcu.lock().await;
        monitor.poll(&mut mcu);
    }
}

async fn command_loop(
    system: Arc<System>,
    mut commands: CommandQueue,
    psu_current_mux: Arc<PsuCurrentMux>,
) {
    loop {
        let command = tokio::select! {
            _ = system.shutdown.cancelled() => return,
            command = commands.recv() => match command {
                Some(c) => c,
                None => return,
            },
        };
        match command {
            Command::ProfileSetBytes { key, raw } => {
                let mut profile = system.profile.lock().await;
                if let Err(err) = profile.set_bytes(key, &raw) {
                    error!(%err, "failed to apply profile command");
                } else if let Err(err) = profile.flush().await {
                    error!(%err, "failed to persist profile");
                }
            }
            Command::AtsSetEnabled(enabled) => {
                system.ats.lock().await.set_enabled(enabled);
                let mut profile = system.profile.lock().await;
                profile.set_native(ProfileKey::AtsEnabled, ProfileValue::Bool(enabled));
                if let Err(err) = profile.flush().await {
                    error!(%err, "failed to persist profile");
                }
            }
            Command::RequestFullSnapshot => {
                info!("full snapshot requested");
            }
            Command::PullHistory(target) => {
                info!(?target, "history pull requested");
            }
            Command::PsuOn => {
                system.psu.lock().await.on();
            }
            Command::PsuOff => {
                system.psu.lock().await.off();
            }
            Command::PsuSetCurrent(channel) => {
                let mut psu = system.psu.lock().await;
                psu.set_current_channel(channel);
                psu_current_mux.apply(psu.current_channel());
            }
            Command::InverterOn => {
                system.inverter.lock().await.on();
            }
            Command::InverterOff => {
                system.inverter.lock().await.off();
            }
            Command::OtaUpdate => {
                info!("ota update requested");
            }
            Command::SetLogForwarding(enabled) => {
                info!(enabled, "log forwarding toggled");
            }
            Command::Reboot => {
                warn!("reboot requested, cancelling supervisor");
                system.request_shutdown();
            }
        }
    }
}

async fn inverter_fan_loop(system: Arc<System>, pin: Arc<dyn DigitalInput>) {
    let mut tach = Tachometer::new(FAN_PULSES_PER_REVOLUTION);
    let mut ticker = interval(FAN_SAMPLE_PERIOD);
    let mut window_deadline = tokio::time::Instant::now() + FAN_RPM_WINDOW;
    loop {
        tokio::select! {
            _ = system.shutdown.cancelled() => return,
            _ = ticker.tick() => {}
        }
        tach.sample(pin.read());
        let now = tokio::time::Instant::now();
        if now >= window_deadline {
            let rpm = tach.take_rpm(now.into_std());
            system.inverter.lock().await.set_fan_rpm(rpm);
            window_deadline = now + FAN_RPM_WINDOW;
        }
    }
}

async fn psu_fan_loop(system: Arc<System>, pin: Arc<dyn DigitalInput>) {
    let mut tach = Tachometer::new(FAN_PULSES_PER_REVOLUTION);
    let mut ticker = interval(FAN_SAMPLE_PERIOD);
    let mut window_deadline = tokio::time::Instant::now() + FAN_RPM_WINDOW;
    loop {
        tokio::select! {
            _ = system.shutdown.cancelled() => return,
            _ = ticker.tick() => {}
        }
        tach.sample(pin.read());
        let now = tokio::time::Instant::now();
        if now >= window_deadline {
            let rpm = tach.take_rpm(now.into_std());
            system.psu.lock().await.set_fan_rpm(rpm);
            window_deadline = now + FAN_RPM_WINDOW;
        }
    }
}

/// Short press toggles the ATS auto-switch on/off; long press requests a
/// full wireless snapshot. Both funnel through the command queue rather
/// than mutating state directly, same as a wireless write (spec.md §4.2).
async fn button_loop(system: Arc<System>, pin: Arc<dyn DigitalInput>, commands: CommandSender) {
    let mut debouncer = ButtonDebouncer::new();
    let mut ticker = interval(BUTTON_SAMPLE_PERIOD);
    loop {
        tokio::select! {
            _ = system.shutdown.cancelled() => return,
            _ = ticker.tick() => {}
        }
        let now = tokio::time::Instant::now().into_std();
        if let Some(event) = debouncer.sample(pin.read(), now) {
            match event {
                ButtonEvent::Short => {
                    let enabled = !system.ats.lock().await.enabled();
                    commands.send(Command::AtsSetEnabled(enabled)).await;
                }
                ButtonEvent::Long => {
                    commands.send(Command::RequestFullSnapshot).await;
                }
            }
        }
    }
}

