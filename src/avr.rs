use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::commands::{self, Code, CommandDescriptor, DeviceCode, ZoneCode, CORE_QUERIES};
use crate::config::EngineTimings;
use crate::error::{AnthemError, Result};
use crate::model::{Dialect, Identification, ModelProfile};
use crate::protocol::{self, DeviceError, Framer, InputMessage};
use crate::store::{AttributeStore, InputDirectory};
use crate::subscription::{StateReceiver, StateUpdate, Topic};
use crate::types::{AvrSnapshot, InputSlot, ZoneNumber, EMPTY_MAC};
use crate::zone::{Zone, ZoneState};

/// Called with the raw message text whenever a message changed state
pub type UpdateCallback = Arc<dyn Fn(&str) + Send + Sync>;

pub(crate) type ConnectionLostHook = Arc<dyn Fn() + Send + Sync>;

const UPDATE_CHANNEL_CAPACITY: usize = 100;

/// Live mirror of an Anthem receiver's state
///
/// Cloning an `Avr` is cheap; all clones share the same state.
#[derive(Clone)]
pub struct Avr {
    shared: Arc<Shared>,
}

pub(crate) struct Shared {
    pub(crate) state: Mutex<EngineState>,
    timings: EngineTimings,
    update_callback: Option<UpdateCallback>,
    updates: broadcast::Sender<StateUpdate>,
    /// Set once model and hardware address are both known
    initialised: watch::Sender<bool>,
    connection_lost: Mutex<Option<ConnectionLostHook>>,
}

/// Everything the dispatcher mutates
pub(crate) struct EngineState {
    framer: Framer,
    pub(crate) device: AttributeStore<DeviceCode>,
    pub(crate) zones: BTreeMap<ZoneNumber, ZoneState>,
    pub(crate) inputs: InputDirectory,
    /// Per-input room correction state (x40)
    pub(crate) input_arc: BTreeMap<InputSlot, String>,
    pub(crate) profile: Option<ModelProfile>,
    /// At least one zone is on
    powered: bool,
    poweron_refresh_successful: bool,
    force_refresh_until: Option<Instant>,
    last_command: Option<String>,
    transport: Option<mpsc::UnboundedSender<String>>,
    session: u64,
    poweron_task: Option<JoinHandle<()>>,
}

/// Work that has to happen after the state lock is released
#[derive(Default)]
struct Effects {
    updates: Vec<StateUpdate>,
    power_on: bool,
    initialised: bool,
}

impl EngineState {
    fn new() -> Self {
        let mut zones = BTreeMap::new();
        zones.insert(1, ZoneState::default());

        Self {
            framer: Framer::new(),
            device: AttributeStore::new(),
            zones,
            inputs: InputDirectory::new(),
            input_arc: BTreeMap::new(),
            profile: None,
            powered: false,
            poweron_refresh_successful: false,
            force_refresh_until: None,
            last_command: None,
            transport: None,
            session: 0,
            poweron_task: None,
        }
    }

    /// Active dialect; legacy until the model is known
    pub(crate) fn dialect(&self) -> Dialect {
        self.profile.as_ref().map_or(Dialect::X20, |p| p.dialect)
    }

    fn is_ignored(&self, code: DeviceCode) -> bool {
        self.profile.as_ref().is_some_and(|p| p.is_ignored(code))
    }

    pub(crate) fn mac_address(&self) -> &str {
        [
            DeviceCode::MacAddress,
            DeviceCode::EthernetMac,
            DeviceCode::WifiMac,
        ]
        .into_iter()
        .map(|code| self.device.get(code))
        .find(|mac| !mac.is_empty() && *mac != EMPTY_MAC)
        .unwrap_or(EMPTY_MAC)
    }

    fn is_initialised(&self) -> bool {
        self.profile.is_some() && self.mac_address() != EMPTY_MAC
    }

    // ========== Outbound ==========

    fn send(&mut self, payload: String) -> bool {
        let Some(tx) = &self.transport else {
            tracing::warn!("No transport found, unable to send {}", payload);
            return false;
        };
        tracing::debug!("> {}", payload);
        if tx.send(payload).is_err() {
            tracing::warn!("Transport closed, dropping outbound message");
            return false;
        }
        true
    }

    /// A query supersedes any unacknowledged command
    fn query(&mut self, code: &str) -> bool {
        self.last_command = None;
        self.send(protocol::query(code))
    }

    fn command(&mut self, body: &str) -> bool {
        let sent = self.send(protocol::command(body));
        if sent {
            self.last_command = Some(body.to_string());
        }
        sent
    }

    pub(crate) fn send_query(&mut self, code: &str) -> Result<()> {
        self.query(code).then_some(()).ok_or(AnthemError::NotConnected)
    }

    pub(crate) fn send_command(&mut self, body: &str) -> Result<()> {
        self.command(body).then_some(()).ok_or(AnthemError::NotConnected)
    }

    // ========== Dispatch ==========

    fn receive(&mut self, data: &[u8], now: Instant, timings: &EngineTimings) -> Effects {
        let mut effects = Effects::default();

        for message in self.framer.push(data) {
            if message.is_empty() {
                // A bare delimiter acknowledges the last command without echoing it
                match self.last_command.take() {
                    Some(command) => {
                        tracing::debug!("Empty response, replaying {}", command);
                        self.dispatch(&command, now, timings, &mut effects);
                    }
                    None => tracing::debug!("Ignoring empty response"),
                }
            } else {
                tracing::debug!("assembled message {}", message);
                if self.last_command.as_deref() == Some(message.as_str()) {
                    // Echoed, so there is nothing left to acknowledge
                    self.last_command = None;
                }
                self.dispatch(&message, now, timings, &mut effects);
            }
        }

        effects
    }

    fn dispatch(
        &mut self,
        message: &str,
        now: Instant,
        timings: &EngineTimings,
        effects: &mut Effects,
    ) {
        if let Some((error, command)) = DeviceError::parse(message) {
            error.log(command);
            return;
        }

        let mut recognized = false;
        let mut update = None;

        let device_match = commands::match_prefix::<DeviceCode>(message);
        if let Some((code, value)) = device_match {
            recognized = true;
            if self.apply_device(code, value, now, timings, effects) {
                update = Some(StateUpdate::Device(message.to_string()));
            }
        } else if let Some((zone, rest)) = protocol::split_zone_prefix(message) {
            if let Some((code, value)) = commands::match_prefix::<ZoneCode>(rest) {
                if self.zones.contains_key(&zone) {
                    recognized = true;
                    if self.apply_zone(zone, code, value, now, timings, effects) {
                        update = Some(StateUpdate::Zone {
                            zone,
                            message: message.to_string(),
                        });
                    }
                } else {
                    tracing::debug!("Message for zone {} which is not present: {}", zone, message);
                }
            }
        }

        if let Some((DeviceCode::InputCount, value)) = device_match {
            self.poweron_refresh_successful = true;
            match value.trim().parse::<u32>() {
                Ok(count) => self.populate_inputs(count),
                Err(_) => tracing::warn!("Invalid input count: {}", value),
            }
        }

        if let Some(input) = InputMessage::parse(message) {
            recognized = true;
            self.poweron_refresh_successful = true;
            let (slot, changed) = match input {
                InputMessage::Name { slot, name } => {
                    let changed = self.inputs.insert(slot, name);
                    if changed {
                        tracing::debug!("New Value: Input {} is called {}", slot, name);
                    }
                    (slot, changed)
                }
                InputMessage::Arc { slot, value } => {
                    let old = self.input_arc.insert(slot, value.to_string());
                    (slot, old.as_deref() != Some(value))
                }
            };
            if changed && update.is_none() {
                update = Some(StateUpdate::Input {
                    slot,
                    message: message.to_string(),
                });
            }
        }

        match update {
            Some(update) => effects.updates.push(update),
            None => tracing::debug!("no new data encountered"),
        }

        if !recognized {
            tracing::debug!("Unrecognized response: {}", message);
        }
    }

    fn apply_device(
        &mut self,
        code: DeviceCode,
        value: &str,
        now: Instant,
        timings: &EngineTimings,
        effects: &mut Effects,
    ) -> bool {
        let old = self.device.set(code, value);
        let changed = old != value;
        log_change(code.descriptor(), code.as_str(), value, changed);

        if code == DeviceCode::Model && changed {
            self.apply_model(value);
        }

        if (code == DeviceCode::Model || code.is_hardware_address()) && self.is_initialised() {
            effects.initialised = true;
        }

        if code == DeviceCode::TxStatus
            && value == "0"
            && self.dialect().tx_status_code() == Some(DeviceCode::TxStatus)
        {
            tracing::info!("Tx status reported off, switching it back on");
            self.command("ECH1");
        }

        if code.implies_power() && !self.powered {
            self.force_power_refresh(1, now, timings);
        }

        changed
    }

    fn apply_model(&mut self, model: &str) {
        let profile = ModelProfile::resolve(model);
        tracing::debug!(
            "Set command set to model {} ({} zones)",
            profile.dialect,
            profile.zone_count
        );

        for zone in 1..=profile.zone_count {
            self.zones.entry(zone).or_default();
        }

        for step in profile.dialect.identification() {
            match *step {
                Identification::Query(code) => {
                    self.query(code);
                }
                Identification::Command(body) => {
                    self.command(body);
                }
            }
        }

        let zone_count = profile.zone_count;
        self.profile = Some(profile);

        for zone in 1..=zone_count {
            self.query(&ZoneCode::Power.for_zone(zone));
        }
    }

    fn apply_zone(
        &mut self,
        zone: ZoneNumber,
        code: ZoneCode,
        value: &str,
        now: Instant,
        timings: &EngineTimings,
        effects: &mut Effects,
    ) -> bool {
        let Some(state) = self.zones.get_mut(&zone) else {
            return false;
        };
        let was_on = state.power();
        let old = state.values.set(code, value);
        let changed = old != value;
        let is_on = state.power();
        log_change(code.descriptor(), &code.for_zone(zone), value, changed);

        if code != ZoneCode::Power {
            if !self.powered {
                self.force_power_refresh(zone, now, timings);
            }
            return changed;
        }

        if is_on && !was_on {
            tracing::debug!("Zone {} powered on, refreshing", zone);
            self.refresh_zone(zone);
            if !self.powered {
                tracing::info!("Device powered on");
                self.powered = true;
                self.poweron_refresh_successful = false;
                effects.power_on = true;
            }
        } else if !is_on && self.powered && self.zones.values().all(|z| !z.power()) {
            tracing::info!("All zones off, device powered off");
            self.powered = false;
        }

        changed
    }

    fn force_power_refresh(&mut self, zone: ZoneNumber, now: Instant, timings: &EngineTimings) {
        if self.force_refresh_until.is_some_and(|until| now < until) {
            return;
        }
        // The receiver does not always announce power on
        self.force_refresh_until = Some(now + timings.force_refresh_cooldown);
        tracing::debug!("Force refresh power state of zone {}", zone);
        self.query(&ZoneCode::Power.for_zone(zone));
    }

    fn refresh_zone(&mut self, zone: ZoneNumber) {
        let dialect = self.dialect();
        for code in ZoneCode::ALL.iter().copied() {
            if code != ZoneCode::Power && dialect.supports_zone_code(code, zone) {
                self.query(&code.for_zone(zone));
            }
        }
    }

    fn populate_inputs(&mut self, count: u32) {
        let dialect = self.dialect();
        let slots = match &self.profile {
            Some(profile) => profile.input_slots_up_to(count),
            None => (1..=count).collect(),
        };
        for slot in slots {
            self.query(&dialect.input_name_query(slot));
        }
    }

    /// Every query a full refresh sweep issues
    fn refresh_queries(&self) -> Vec<String> {
        let dialect = self.dialect();

        let mut queries: Vec<String> = DeviceCode::ALL
            .iter()
            .filter(|code| !self.is_ignored(**code))
            .map(|code| code.as_str().to_string())
            .collect();

        for &zone in self.zones.keys() {
            queries.extend(
                ZoneCode::ALL
                    .iter()
                    .filter(|code| dialect.supports_zone_code(**code, zone))
                    .map(|code| code.for_zone(zone)),
            );
        }

        if dialect == Dialect::X40 {
            if let Some(slot) = self.zones.get(&1).and_then(ZoneState::input_number) {
                queries.push(format!("IS{}ARC", slot));
            }
        }

        queries
    }
}

fn log_change<C>(descriptor: &CommandDescriptor<C>, code: &str, value: &str, changed: bool) {
    let indicator = if changed { "New Value" } else { "Unchanged" };
    match descriptor.text(value) {
        Some(text) => tracing::debug!(
            "{}: {} ({}) -> {} ({})",
            indicator,
            descriptor.description,
            code,
            text,
            value
        ),
        None => tracing::debug!("{}: {} ({}) -> {}", indicator, descriptor.description, code, value),
    }
}

impl Avr {
    /// Create an engine with default timings
    ///
    /// The engine does nothing on its own until a transport is attached;
    /// use [`crate::Connection`] to dial a receiver.
    pub fn new(update_callback: Option<UpdateCallback>) -> Self {
        Self::with_timings(EngineTimings::default(), update_callback)
    }

    /// Create an engine with custom timings
    pub fn with_timings(timings: EngineTimings, update_callback: Option<UpdateCallback>) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        let (initialised, _) = watch::channel(false);

        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(EngineState::new()),
                timings,
                update_callback,
                updates,
                initialised,
                connection_lost: Mutex::new(None),
            }),
        }
    }

    pub(crate) fn set_connection_lost_hook(&self, hook: ConnectionLostHook) {
        *self.shared.connection_lost.lock() = Some(hook);
    }

    // ========== Transport Events ==========

    /// Route outbound traffic to a new transport, returning its session id
    pub(crate) fn attach_transport(&self, tx: mpsc::UnboundedSender<String>) -> u64 {
        let mut state = self.shared.state.lock();
        state.session += 1;
        state.transport = Some(tx);
        state.framer.clear();
        state.last_command = None;
        state.session
    }

    pub(crate) fn connection_made(&self, tx: mpsc::UnboundedSender<String>) -> u64 {
        let session = self.attach_transport(tx);
        tracing::info!("Connection established (session {})", session);

        let avr = self.clone();
        tokio::spawn(async move {
            avr.refresh_core().await;
        });

        session
    }

    pub(crate) fn data_received(&self, data: &[u8]) {
        let effects = {
            let mut state = self.shared.state.lock();
            state.receive(data, Instant::now(), &self.shared.timings)
        };
        self.apply_effects(effects);
    }

    /// Tear down bookkeeping for a closed transport
    ///
    /// Notifications from a session that has already been replaced are
    /// ignored.
    pub(crate) fn connection_lost(&self, session: u64) {
        let task = {
            let mut state = self.shared.state.lock();
            if state.session != session {
                tracing::debug!("Ignoring loss of stale session {}", session);
                return;
            }
            state.transport = None;
            state.framer.clear();
            state.poweron_task.take()
        };

        if let Some(task) = task {
            task.abort();
        }

        tracing::warn!("Lost connection to receiver");

        let hook = self.shared.connection_lost.lock().clone();
        if let Some(hook) = hook {
            hook();
        }
    }

    fn apply_effects(&self, effects: Effects) {
        if effects.initialised {
            self.shared
                .initialised
                .send_if_modified(|ready| !std::mem::replace(ready, true));
        }

        if effects.power_on {
            self.schedule_poweron_refresh();
        }

        for update in effects.updates {
            if let Some(callback) = &self.shared.update_callback {
                callback(update.message());
            }
            // No subscribers is fine
            let _ = self.shared.updates.send(update);
        }
    }

    /// Keep sweeping until the device answers input enumeration
    fn schedule_poweron_refresh(&self) {
        let shared = Arc::downgrade(&self.shared);
        let timings = self.shared.timings;

        let task = tokio::spawn(async move {
            tokio::time::sleep(timings.poweron_delay).await;
            loop {
                let Some(shared) = shared.upgrade() else {
                    return;
                };
                let avr = Avr { shared };

                let done = {
                    let state = avr.shared.state.lock();
                    state.poweron_refresh_successful || state.transport.is_none()
                };
                if done {
                    tracing::debug!("Power on refresh finished");
                    return;
                }

                tracing::debug!("Refreshing all attributes after power on");
                avr.refresh_all().await;
                drop(avr);

                tokio::time::sleep(timings.poweron_interval).await;
            }
        });

        let previous = self.shared.state.lock().poweron_task.replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    // ========== Refresh ==========

    /// Query every attribute valid for the current model
    pub async fn refresh_all(&self) {
        let queries = self.shared.state.lock().refresh_queries();
        self.send_paced(queries).await;
    }

    /// Query the attributes the device answers even in standby
    pub async fn refresh_core(&self) {
        let queries = CORE_QUERIES.iter().map(|code| code.to_string()).collect();
        self.send_paced(queries).await;
    }

    async fn send_paced(&self, queries: Vec<String>) {
        for code in queries {
            let sent = self.shared.state.lock().query(&code);
            if !sent {
                tracing::debug!("Transport gone, abandoning refresh");
                return;
            }
            tokio::time::sleep(self.shared.timings.query_pacing).await;
        }
    }

    /// Send a raw query (`<code>?;`)
    pub fn query(&self, code: &str) -> Result<()> {
        self.shared.state.lock().send_query(code)
    }

    /// Send a raw command (`<body>;`)
    pub fn command(&self, body: &str) -> Result<()> {
        self.shared.state.lock().send_command(body)
    }

    // ========== Zones & Status ==========

    /// Subscribe to state updates
    pub fn subscribe(&self) -> StateReceiver {
        StateReceiver::new(self.shared.updates.subscribe(), None)
    }

    /// Subscribe to updates about one part of the device only
    pub fn subscribe_to(&self, topic: Topic) -> StateReceiver {
        StateReceiver::new(self.shared.updates.subscribe(), Some(topic))
    }

    /// Handle for a zone, `None` if the model has no such zone
    pub fn zone(&self, number: ZoneNumber) -> Option<Zone> {
        let exists = self.shared.state.lock().zones.contains_key(&number);
        exists.then(|| Zone::new(&self.shared, number))
    }

    /// Every zone present on this model, ordered by number
    pub fn zones(&self) -> Vec<Zone> {
        let numbers: Vec<ZoneNumber> = self.shared.state.lock().zones.keys().copied().collect();
        numbers
            .into_iter()
            .map(|number| Zone::new(&self.shared, number))
            .collect()
    }

    /// Handle for zone 1
    pub fn main_zone(&self) -> Zone {
        Zone::new(&self.shared, 1)
    }

    /// Number of zones created for the model
    pub fn zone_count(&self) -> usize {
        self.shared.state.lock().zones.len()
    }

    /// Active dialect, `None` until the model is reported
    pub fn dialect(&self) -> Option<Dialect> {
        self.shared.state.lock().profile.as_ref().map(|p| p.dialect)
    }

    /// Whether a transport is attached
    pub fn is_connected(&self) -> bool {
        self.shared.state.lock().transport.is_some()
    }

    /// Whether at least one zone is on
    pub fn is_powered(&self) -> bool {
        self.shared.state.lock().powered
    }

    /// Whether model and hardware address are both known
    pub fn is_initialised(&self) -> bool {
        *self.shared.initialised.borrow()
    }

    /// Wait until model and hardware address are known
    pub async fn wait_for_device_initialised(&self, timeout: Duration) -> Result<()> {
        let mut rx = self.shared.initialised.subscribe();
        let ready = tokio::time::timeout(timeout, async move {
            rx.wait_for(|ready| *ready).await.map(|_| ())
        })
        .await;
        match ready {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(AnthemError::ConnectionClosed),
            Err(_) => Err(AnthemError::DeviceNotReady(timeout)),
        }
    }

    // ========== Device Attributes ==========

    fn raw(&self, code: DeviceCode) -> String {
        self.shared.state.lock().device.get(code).to_string()
    }

    fn raw_or(&self, code: DeviceCode, default: &str) -> String {
        let value = self.raw(code);
        if value.is_empty() {
            default.to_string()
        } else {
            value
        }
    }

    fn integer(&self, code: DeviceCode) -> Option<i64> {
        self.shared.state.lock().device.integer(code)
    }

    fn text(&self, code: DeviceCode) -> String {
        let raw = self.raw(code);
        code.descriptor()
            .text(&raw)
            .map(str::to_string)
            .unwrap_or(raw)
    }

    /// Fail if the current model has no use for `code`
    fn require(&self, code: DeviceCode, feature: &'static str) -> Result<()> {
        let state = self.shared.state.lock();
        if state.is_ignored(code) {
            return Err(AnthemError::Unsupported {
                feature,
                dialect: state.dialect(),
            });
        }
        Ok(())
    }

    /// Raw value last reported for a device attribute
    pub fn raw_attribute(&self, code: DeviceCode) -> String {
        self.raw(code)
    }

    /// Model string as reported by the device
    pub fn model(&self) -> String {
        self.raw_or(DeviceCode::Model, "Unknown Model")
    }

    /// Firmware version
    pub fn software_version(&self) -> String {
        self.raw_or(DeviceCode::SoftwareVersion, "Unknown Version")
    }

    /// Hardware revision
    pub fn hardware_version(&self) -> String {
        self.raw_or(DeviceCode::HardwareVersion, "Unknown Version")
    }

    /// Region the unit was built for
    pub fn region(&self) -> String {
        self.raw_or(DeviceCode::Region, "Unknown Region")
    }

    /// Firmware build date
    pub fn build_date(&self) -> String {
        self.raw_or(DeviceCode::BuildDate, "Unknown Build Date")
    }

    /// Hardware address, `00:00:00:00:00:00` until reported
    pub fn mac_address(&self) -> String {
        self.shared.state.lock().mac_address().to_string()
    }

    /// Video input resolution code
    pub fn video_input_resolution(&self) -> Option<i64> {
        self.integer(DeviceCode::VideoInputResolution)
    }

    /// Video input resolution, e.g. `1080p60`
    pub fn video_input_resolution_text(&self) -> String {
        self.text(DeviceCode::VideoInputResolution)
    }

    /// Horizontal video input resolution in pixels
    pub fn horizontal_resolution(&self) -> Option<i64> {
        self.integer(DeviceCode::HorizontalResolution)
    }

    /// Vertical video input resolution in pixels
    pub fn vertical_resolution(&self) -> Option<i64> {
        self.integer(DeviceCode::VerticalResolution)
    }

    /// Audio input channel layout code
    pub fn audio_input_channels(&self) -> Option<i64> {
        self.integer(DeviceCode::AudioInputChannels)
    }

    /// Audio input channel layout, e.g. `5.1`
    pub fn audio_input_channels_text(&self) -> String {
        self.text(DeviceCode::AudioInputChannels)
    }

    /// Audio input format code
    pub fn audio_input_format(&self) -> Option<i64> {
        self.integer(DeviceCode::AudioInputFormat)
    }

    /// Audio input format, e.g. `Dolby`
    pub fn audio_input_format_text(&self) -> String {
        self.text(DeviceCode::AudioInputFormat)
    }

    /// Bitrate in kbps
    pub fn audio_input_bitrate(&self) -> Option<i64> {
        self.integer(DeviceCode::AudioInputBitrate)
    }

    /// Sample rate in kHz
    pub fn audio_input_samplerate(&self) -> Option<i64> {
        self.integer(DeviceCode::AudioInputSampleRate)
    }

    /// Name of the decoded audio format
    pub fn audio_input_name(&self) -> String {
        self.raw_or(DeviceCode::AudioInputName, "Unknown")
    }

    /// Sample rate of the audio input as text
    pub fn audio_input_rate_name(&self) -> String {
        self.raw_or(DeviceCode::AudioInputRateName, "Unknown")
    }

    /// Dialog normalization in dB
    pub fn dialog_normalization(&self) -> Option<i64> {
        self.integer(DeviceCode::DialogNormalization)
    }

    // ========== Device Settings ==========

    /// Dynamic range setting: 0 normal, 1 reduced, 2 late night
    pub fn dolby_dynamic_range(&self) -> Option<i64> {
        self.integer(DeviceCode::DynamicRange)
    }

    /// Dynamic range setting as text
    pub fn dolby_dynamic_range_text(&self) -> String {
        self.text(DeviceCode::DynamicRange)
    }

    /// Set dynamic range: 0 normal, 1 reduced, 2 late night
    pub fn set_dolby_dynamic_range(&self, value: u8) -> Result<()> {
        if value > 2 {
            return Err(AnthemError::invalid("dynamic range", value));
        }
        self.require(DeviceCode::DynamicRange, "Dynamic range")?;
        self.command(&format!("{}{}", DeviceCode::DynamicRange.as_str(), value))
    }

    fn panel_brightness_code(&self) -> Result<DeviceCode> {
        let dialect = self.shared.state.lock().dialect();
        dialect
            .panel_brightness_code()
            .ok_or(AnthemError::Unsupported {
                feature: "Panel brightness",
                dialect,
            })
    }

    /// Front panel brightness, `None` where unsupported
    pub fn panel_brightness(&self) -> Option<i64> {
        self.panel_brightness_code()
            .ok()
            .and_then(|code| self.integer(code))
    }

    /// Front panel brightness as text
    pub fn panel_brightness_text(&self) -> String {
        self.panel_brightness_code()
            .map(|code| self.text(code))
            .unwrap_or_default()
    }

    /// Set front panel brightness, 0 (off) to 3 (high)
    pub fn set_panel_brightness(&self, value: u8) -> Result<()> {
        if value > 3 {
            return Err(AnthemError::invalid("panel brightness", value));
        }
        let code = self.panel_brightness_code()?;
        self.command(&format!("{}{}", code.as_str(), value))
    }

    /// Whether unsolicited status reports are enabled
    pub fn tx_status(&self) -> bool {
        let dialect = self.shared.state.lock().dialect();
        dialect.tx_status_code().is_some_and(|code| {
            self.integer(code).is_some_and(|v| v != 0)
        })
    }

    /// Enable or disable unsolicited status reports
    pub fn set_tx_status(&self, enabled: bool) -> Result<()> {
        let dialect = self.shared.state.lock().dialect();
        let code = dialect.tx_status_code().ok_or(AnthemError::Unsupported {
            feature: "Tx status",
            dialect,
        })?;
        self.command(&format!("{}{}", code.as_str(), enabled as u8))
    }

    /// Whether IP control stays available in standby
    pub fn standby_control(&self) -> bool {
        self.integer(DeviceCode::StandbyControl)
            .is_some_and(|v| v != 0)
    }

    /// Keep IP control available in standby
    pub fn set_standby_control(&self, enabled: bool) -> Result<()> {
        self.require(DeviceCode::StandbyControl, "Standby IP control")?;
        self.command(&format!(
            "{}{}",
            DeviceCode::StandbyControl.as_str(),
            enabled as u8
        ))
    }

    // ========== Listening Mode ==========

    /// Listening mode number in the model's numbering
    pub fn audio_listening_mode(&self) -> Option<i64> {
        self.integer(DeviceCode::ListeningMode)
    }

    /// Name of the current listening mode in the model's numbering
    pub fn audio_listening_mode_text(&self) -> String {
        let Some(mode) = self.audio_listening_mode() else {
            return "Unknown".to_string();
        };
        let state = self.shared.state.lock();
        let modes = state
            .profile
            .as_ref()
            .map_or(Dialect::X20.listening_modes(), |p| p.listening_modes);
        modes
            .iter()
            .find(|(number, _)| i64::from(*number) == mode)
            .map_or_else(|| "Unknown".to_string(), |(_, name)| name.to_string())
    }

    /// Listening modes the current model accepts
    pub fn audio_listening_mode_list(&self) -> Vec<String> {
        let state = self.shared.state.lock();
        let modes = state
            .profile
            .as_ref()
            .map_or(Dialect::X20.listening_modes(), |p| p.listening_modes);
        modes.iter().map(|(_, name)| name.to_string()).collect()
    }

    /// Select a listening mode by number
    pub fn set_audio_listening_mode(&self, mode: u8) -> Result<()> {
        if mode > 16 {
            return Err(AnthemError::invalid("listening mode", mode));
        }
        self.require(DeviceCode::ListeningMode, "Listening mode")?;
        self.command(&format!("{}{:02}", DeviceCode::ListeningMode.as_str(), mode))
    }

    /// Select a listening mode by name
    pub fn set_audio_listening_mode_text(&self, name: &str) -> Result<()> {
        let mode = {
            let state = self.shared.state.lock();
            let modes = state
                .profile
                .as_ref()
                .map_or(Dialect::X20.listening_modes(), |p| p.listening_modes);
            modes
                .iter()
                .find(|(_, mode_name)| *mode_name == name)
                .map(|(number, _)| *number)
        };
        let mode = mode.ok_or_else(|| AnthemError::invalid("listening mode", name))?;
        self.set_audio_listening_mode(mode)
    }

    // ========== Inputs ==========

    /// Input names ordered by slot
    pub fn input_list(&self) -> Vec<String> {
        self.shared.state.lock().inputs.names()
    }

    /// Number of named inputs
    pub fn input_count(&self) -> usize {
        self.shared.state.lock().inputs.len()
    }

    // ========== Main Zone ==========

    /// Main zone power
    pub fn power(&self) -> bool {
        self.main_zone().power()
    }

    /// Switch the main zone on or off
    pub fn set_power(&self, on: bool) -> Result<()> {
        self.main_zone().set_power(on)
    }

    /// Main zone volume, 0 to 100
    pub fn volume(&self) -> u8 {
        self.main_zone().volume()
    }

    /// Set the main zone volume, 0 to 100
    pub fn set_volume(&self, volume: u8) -> Result<()> {
        self.main_zone().set_volume(volume)
    }

    /// Main zone attenuation in dB
    pub fn attenuation(&self) -> i32 {
        self.main_zone().attenuation()
    }

    /// Set the main zone attenuation in dB
    pub fn set_attenuation(&self, attenuation: i32) -> Result<()> {
        self.main_zone().set_attenuation(attenuation)
    }

    /// Main zone mute
    pub fn mute(&self) -> bool {
        self.main_zone().mute()
    }

    /// Mute or unmute the main zone
    pub fn set_mute(&self, mute: bool) -> Result<()> {
        self.main_zone().set_mute(mute)
    }

    /// Input slot selected in the main zone
    pub fn input_number(&self) -> Option<InputSlot> {
        self.main_zone().input_number()
    }

    /// Select an input slot in the main zone
    pub fn set_input_number(&self, slot: InputSlot) -> Result<()> {
        self.main_zone().set_input_number(slot)
    }

    /// Name of the input selected in the main zone
    pub fn input_name(&self) -> String {
        self.main_zone().input_name()
    }

    /// Select an input by name in the main zone
    pub fn set_input_name(&self, name: &str) -> Result<()> {
        self.main_zone().set_input_name(name)
    }

    // ========== Diagnostics ==========

    /// Serializable copy of the whole device state
    pub fn snapshot(&self) -> AvrSnapshot {
        let initialised = self.is_initialised();
        let state = self.shared.state.lock();
        let dialect = state.dialect();

        AvrSnapshot {
            model: state.device.get(DeviceCode::Model).to_string(),
            dialect: state.profile.as_ref().map(|p| p.dialect),
            mac_address: state.mac_address().to_string(),
            connected: state.transport.is_some(),
            powered: state.powered,
            initialised,
            inputs: state
                .inputs
                .entries()
                .map(|(slot, name)| (slot, name.to_string()))
                .collect(),
            zones: state
                .zones
                .iter()
                .map(|(number, zone)| zone.snapshot(*number, dialect, &state.inputs))
                .collect(),
            raw: state
                .device
                .iter()
                .map(|(code, value)| (code.as_str().to_string(), value.to_string()))
                .collect(),
        }
    }

    /// Everything known about the receiver as pretty JSON
    pub fn dump_state(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.snapshot())?)
    }
}
