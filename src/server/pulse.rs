//! Real PulseAudio backend over libpulse-binding.
//!
//! A threaded mainloop runs the client; every request locks the mainloop,
//! fires an introspection call whose callback completes a oneshot channel,
//! and unlocks again. A small monitor thread watches the context state:
//! it installs the subscription and announces `Connected` when the context
//! becomes ready, and tears down and reconnects after a failure. All
//! topology state lives in the engine; this module only moves payloads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use libpulse_binding::callbacks::ListResult;
use libpulse_binding::context::subscribe::{Facility as PaFacility, InterestMaskSet, Operation};
use libpulse_binding::context::{Context, FlagSet as ContextFlagSet, State as ContextState};
use libpulse_binding::def::PortAvailable as PaPortAvailable;
use libpulse_binding::mainloop::threaded::Mainloop;
use libpulse_binding::proplist::{properties, Proplist};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use super::{
    CardInfo, DeviceProps, EventKind, Facility, ModuleInfo, PortAvailable, PortInfo, ServerApi,
    ServerEvent, SinkInfo, SourceInfo,
};
use crate::{RouteError, SessionConfig};

/// Server-side marker for "no such object" indices.
const INVALID_INDEX: u32 = u32::MAX;

/// How often the monitor thread samples the context state.
const STATE_POLL_INTERVAL: Duration = Duration::from_millis(25);

struct PulseInner {
    mainloop: Mainloop,
    context: Context,
}

// The threaded mainloop is designed for cross-thread use via its lock; the
// Mutex serializes access to the context handle itself.
unsafe impl Send for PulseInner {}

type Subscribers = Arc<Mutex<Vec<mpsc::UnboundedSender<ServerEvent>>>>;

/// [`ServerApi`] implementation backed by a live PulseAudio connection.
pub struct PulseServer {
    inner: Arc<Mutex<PulseInner>>,
    subscribers: Subscribers,
    shutdown: Arc<AtomicBool>,
}

impl PulseServer {
    /// Connects to the server and starts the state monitor.
    ///
    /// The connection itself is non-failing (`NOFAIL`): the context keeps
    /// trying until the server appears, and `Connected` is announced on
    /// the event channel once it is ready.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::Backend`] when the mainloop or context cannot
    /// be allocated or the connection attempt cannot even be started.
    pub fn spawn(config: SessionConfig) -> Result<Self, RouteError> {
        let mut mainloop = Mainloop::new()
            .ok_or_else(|| RouteError::Backend("mainloop creation failed".into()))?;

        let mut context = new_context(&mainloop, &config)?;
        connect_context(&mut context, &config)?;

        mainloop
            .start()
            .map_err(|e| RouteError::Backend(format!("mainloop start: {e}")))?;

        let inner = Arc::new(Mutex::new(PulseInner { mainloop, context }));
        let subscribers: Subscribers = Arc::new(Mutex::new(Vec::new()));
        let shutdown = Arc::new(AtomicBool::new(false));

        {
            let inner = Arc::clone(&inner);
            let subscribers = Arc::clone(&subscribers);
            let shutdown = Arc::clone(&shutdown);
            thread::Builder::new()
                .name("pulse-monitor".into())
                .spawn(move || monitor_loop(&inner, &subscribers, &shutdown, &config))
                .map_err(|e| RouteError::Backend(format!("monitor thread: {e}")))?;
        }

        Ok(Self {
            inner,
            subscribers,
            shutdown,
        })
    }

    fn lock_inner(&self) -> MutexGuard<'_, PulseInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Issues a mutation whose success callback completes the chain.
    async fn mutation<F>(&self, request: String, f: F) -> Result<(), RouteError>
    where
        F: FnOnce(
            &mut libpulse_binding::context::introspect::Introspector,
            Box<dyn FnMut(bool) + 'static>,
        ),
    {
        let (tx, rx) = oneshot::channel();
        {
            let mut inner = self.lock_inner();
            inner.mainloop.lock();
            let mut introspect = inner.context.introspect();
            let mut tx = Some(tx);
            f(
                &mut introspect,
                Box::new(move |success| {
                    if let Some(tx) = tx.take() {
                        let _ = tx.send(success);
                    }
                }),
            );
            inner.mainloop.unlock();
        }
        match rx.await {
            Ok(true) => Ok(()),
            Ok(false) => Err(RouteError::request_failed(request)),
            // A dropped sender means the context was torn down mid-request.
            Err(_) => Err(RouteError::Disconnected),
        }
    }
}

impl Drop for PulseServer {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        let mut inner = self.lock_inner();
        inner.mainloop.lock();
        inner.context.disconnect();
        inner.mainloop.unlock();
        inner.mainloop.stop();
    }
}

fn new_context(mainloop: &Mainloop, config: &SessionConfig) -> Result<Context, RouteError> {
    let mut proplist =
        Proplist::new().ok_or_else(|| RouteError::Backend("proplist creation failed".into()))?;
    let _ = proplist.set_str(properties::APPLICATION_NAME, &config.application_name);
    let _ = proplist.set_str(properties::APPLICATION_ID, &config.application_id);

    Context::new_with_proplist(mainloop, &config.application_name, &proplist)
        .ok_or_else(|| RouteError::Backend("context creation failed".into()))
}

fn connect_context(context: &mut Context, config: &SessionConfig) -> Result<(), RouteError> {
    context
        .connect(config.server.as_deref(), ContextFlagSet::NOFAIL, None)
        .map_err(|e| RouteError::Backend(format!("connect: {e}")))
}

fn broadcast(subscribers: &Subscribers, event: &ServerEvent) {
    let subscribers = subscribers.lock().unwrap_or_else(|e| e.into_inner());
    for tx in subscribers.iter() {
        let _ = tx.send(event.clone());
    }
}

/// Completes a pending oneshot at most once.
fn complete<T>(tx: &mut Option<oneshot::Sender<T>>, value: T) {
    if let Some(tx) = tx.take() {
        let _ = tx.send(value);
    }
}

/// Polls the context state, announcing readiness and driving reconnects.
fn monitor_loop(
    inner: &Arc<Mutex<PulseInner>>,
    subscribers: &Subscribers,
    shutdown: &Arc<AtomicBool>,
    config: &SessionConfig,
) {
    let mut announced_ready = false;

    while !shutdown.load(Ordering::SeqCst) {
        let state = {
            let mut inner = inner.lock().unwrap_or_else(|e| e.into_inner());
            inner.mainloop.lock();
            let state = inner.context.get_state();
            inner.mainloop.unlock();
            state
        };

        match state {
            // The original daemon installs its subscription on Terminated
            // exactly like on Ready, so both count as "ready" here.
            ContextState::Ready | ContextState::Terminated if !announced_ready => {
                install_subscription(inner, subscribers);
                debug!("context ready, announcing connection");
                broadcast(subscribers, &ServerEvent::Connected);
                announced_ready = true;
            }
            ContextState::Failed => {
                error!("context failed, scheduling reconnect");
                if announced_ready {
                    broadcast(subscribers, &ServerEvent::Disconnected);
                }
                announced_ready = false;

                {
                    let mut guard = inner.lock().unwrap_or_else(|e| e.into_inner());
                    guard.mainloop.lock();
                    guard.context.disconnect();
                    guard.mainloop.unlock();
                }
                thread::sleep(config.reconnect_delay);
                if shutdown.load(Ordering::SeqCst) {
                    break;
                }

                let mut guard = inner.lock().unwrap_or_else(|e| e.into_inner());
                let pulse = &mut *guard;
                pulse.mainloop.lock();
                let recreated = new_context(&pulse.mainloop, config).and_then(|mut context| {
                    connect_context(&mut context, config)?;
                    Ok(context)
                });
                match recreated {
                    Ok(context) => pulse.context = context,
                    Err(err) => warn!(%err, "reconnect attempt failed"),
                }
                pulse.mainloop.unlock();
            }
            _ => {}
        }

        thread::sleep(STATE_POLL_INTERVAL);
    }
}

fn install_subscription(inner: &Arc<Mutex<PulseInner>>, subscribers: &Subscribers) {
    let mut guard = inner.lock().unwrap_or_else(|e| e.into_inner());
    let pulse = &mut *guard;
    pulse.mainloop.lock();

    let forward = Arc::clone(subscribers);
    pulse
        .context
        .set_subscribe_callback(Some(Box::new(move |facility, operation, index| {
            if let Some(event) = subscription_event(facility, operation, index) {
                broadcast(&forward, &event);
            }
        })));
    pulse.context.subscribe(
        InterestMaskSet::SINK | InterestMaskSet::SOURCE | InterestMaskSet::CARD,
        |_| {},
    );

    pulse.mainloop.unlock();
}

fn subscription_event(
    facility: Option<PaFacility>,
    operation: Option<Operation>,
    index: u32,
) -> Option<ServerEvent> {
    let facility = match facility? {
        PaFacility::Sink => Facility::Sink,
        PaFacility::Source => Facility::Source,
        PaFacility::Card => Facility::Card,
        _ => return None,
    };
    let kind = match operation? {
        Operation::New => EventKind::New,
        Operation::Changed => EventKind::Change,
        Operation::Removed => EventKind::Remove,
    };
    Some(ServerEvent::Object {
        facility,
        kind,
        index,
    })
}

// ---- Payload conversion ------------------------------------------------

fn props_from(proplist: &Proplist) -> DeviceProps {
    DeviceProps {
        bus_path: proplist.get_str(properties::DEVICE_BUS_PATH),
        form_factor: proplist.get_str(properties::DEVICE_FORM_FACTOR),
        class: proplist.get_str(properties::DEVICE_CLASS),
        api: proplist.get_str(properties::DEVICE_API),
    }
}

fn available_from(available: PaPortAvailable) -> PortAvailable {
    match available {
        PaPortAvailable::Unknown => PortAvailable::Unknown,
        PaPortAvailable::Yes => PortAvailable::Yes,
        PaPortAvailable::No => PortAvailable::No,
    }
}

fn card_index_from(raw: Option<u32>) -> Option<u32> {
    raw.filter(|&index| index != INVALID_INDEX)
}

fn card_from(info: &libpulse_binding::context::introspect::CardInfo<'_>) -> CardInfo {
    CardInfo {
        index: info.index,
        name: info.name.as_deref().unwrap_or_default().to_string(),
        profiles: info
            .profiles
            .iter()
            .filter_map(|p| p.name.as_deref().map(str::to_string))
            .collect(),
        active_profile: info
            .active_profile
            .as_ref()
            .and_then(|p| p.name.as_deref().map(str::to_string)),
        props: props_from(&info.proplist),
    }
}

fn module_from(info: &libpulse_binding::context::introspect::ModuleInfo<'_>) -> ModuleInfo {
    ModuleInfo {
        index: info.index,
        name: info.name.as_deref().unwrap_or_default().to_string(),
    }
}

fn sink_from(info: &libpulse_binding::context::introspect::SinkInfo<'_>) -> SinkInfo {
    SinkInfo {
        index: info.index,
        name: info.name.as_deref().unwrap_or_default().to_string(),
        card: card_index_from(info.card),
        ports: info
            .ports
            .iter()
            .map(|p| PortInfo {
                name: p.name.as_deref().unwrap_or_default().to_string(),
                priority: p.priority,
                available: available_from(p.available),
            })
            .collect(),
        active_port: info
            .active_port
            .as_ref()
            .and_then(|p| p.name.as_deref().map(str::to_string)),
        props: props_from(&info.proplist),
    }
}

fn source_from(info: &libpulse_binding::context::introspect::SourceInfo<'_>) -> SourceInfo {
    SourceInfo {
        index: info.index,
        name: info.name.as_deref().unwrap_or_default().to_string(),
        card: card_index_from(info.card),
        ports: info
            .ports
            .iter()
            .map(|p| PortInfo {
                name: p.name.as_deref().unwrap_or_default().to_string(),
                priority: p.priority,
                available: available_from(p.available),
            })
            .collect(),
        active_port: info
            .active_port
            .as_ref()
            .and_then(|p| p.name.as_deref().map(str::to_string)),
        mute: info.mute,
        props: props_from(&info.proplist),
    }
}

#[async_trait]
impl ServerApi for PulseServer {
    async fn list_cards(&self) -> Result<Vec<CardInfo>, RouteError> {
        let (tx, rx) = oneshot::channel();
        {
            let mut inner = self.lock_inner();
            inner.mainloop.lock();
            let introspect = inner.context.introspect();
            let mut acc = Vec::new();
            let mut tx = Some(tx);
            introspect.get_card_info_list(move |result| match result {
                ListResult::Item(info) => acc.push(card_from(info)),
                ListResult::End => complete(&mut tx, Ok(std::mem::take(&mut acc))),
                ListResult::Error => {
                    complete(&mut tx, Err(RouteError::request_failed("list cards")));
                }
            });
            inner.mainloop.unlock();
        }
        rx.await.map_err(|_| RouteError::Disconnected)?
    }

    async fn list_modules(&self) -> Result<Vec<ModuleInfo>, RouteError> {
        let (tx, rx) = oneshot::channel();
        {
            let mut inner = self.lock_inner();
            inner.mainloop.lock();
            let introspect = inner.context.introspect();
            let mut acc = Vec::new();
            let mut tx = Some(tx);
            introspect.get_module_info_list(move |result| match result {
                ListResult::Item(info) => acc.push(module_from(info)),
                ListResult::End => complete(&mut tx, Ok(std::mem::take(&mut acc))),
                ListResult::Error => {
                    complete(&mut tx, Err(RouteError::request_failed("list modules")));
                }
            });
            inner.mainloop.unlock();
        }
        rx.await.map_err(|_| RouteError::Disconnected)?
    }

    async fn list_sinks(&self) -> Result<Vec<SinkInfo>, RouteError> {
        let (tx, rx) = oneshot::channel();
        {
            let mut inner = self.lock_inner();
            inner.mainloop.lock();
            let introspect = inner.context.introspect();
            let mut acc = Vec::new();
            let mut tx = Some(tx);
            introspect.get_sink_info_list(move |result| match result {
                ListResult::Item(info) => acc.push(sink_from(info)),
                ListResult::End => complete(&mut tx, Ok(std::mem::take(&mut acc))),
                ListResult::Error => {
                    complete(&mut tx, Err(RouteError::request_failed("list sinks")));
                }
            });
            inner.mainloop.unlock();
        }
        rx.await.map_err(|_| RouteError::Disconnected)?
    }

    async fn list_sources(&self) -> Result<Vec<SourceInfo>, RouteError> {
        let (tx, rx) = oneshot::channel();
        {
            let mut inner = self.lock_inner();
            inner.mainloop.lock();
            let introspect = inner.context.introspect();
            let mut acc = Vec::new();
            let mut tx = Some(tx);
            introspect.get_source_info_list(move |result| match result {
                ListResult::Item(info) => acc.push(source_from(info)),
                ListResult::End => complete(&mut tx, Ok(std::mem::take(&mut acc))),
                ListResult::Error => {
                    complete(&mut tx, Err(RouteError::request_failed("list sources")));
                }
            });
            inner.mainloop.unlock();
        }
        rx.await.map_err(|_| RouteError::Disconnected)?
    }

    async fn card_by_index(&self, index: u32) -> Result<CardInfo, RouteError> {
        let (tx, rx) = oneshot::channel();
        {
            let mut inner = self.lock_inner();
            inner.mainloop.lock();
            let introspect = inner.context.introspect();
            let mut found = None;
            let mut tx = Some(tx);
            introspect.get_card_info_by_index(index, move |result| match result {
                ListResult::Item(info) => found = Some(card_from(info)),
                ListResult::End => {
                    let result = found.take().ok_or_else(|| {
                        error!("server returned no card info");
                        RouteError::EmptyInfo { object: "card" }
                    });
                    complete(&mut tx, result);
                }
                ListResult::Error => {
                    complete(&mut tx, Err(RouteError::request_failed("get card")));
                }
            });
            inner.mainloop.unlock();
        }
        rx.await.map_err(|_| RouteError::Disconnected)?
    }

    async fn sink_by_index(&self, index: u32) -> Result<SinkInfo, RouteError> {
        let (tx, rx) = oneshot::channel();
        {
            let mut inner = self.lock_inner();
            inner.mainloop.lock();
            let introspect = inner.context.introspect();
            let mut found = None;
            let mut tx = Some(tx);
            introspect.get_sink_info_by_index(index, move |result| match result {
                ListResult::Item(info) => found = Some(sink_from(info)),
                ListResult::End => {
                    let result = found.take().ok_or_else(|| {
                        error!("server returned no sink info");
                        RouteError::EmptyInfo { object: "sink" }
                    });
                    complete(&mut tx, result);
                }
                ListResult::Error => {
                    complete(&mut tx, Err(RouteError::request_failed("get sink")));
                }
            });
            inner.mainloop.unlock();
        }
        rx.await.map_err(|_| RouteError::Disconnected)?
    }

    async fn source_by_index(&self, index: u32) -> Result<SourceInfo, RouteError> {
        let (tx, rx) = oneshot::channel();
        {
            let mut inner = self.lock_inner();
            inner.mainloop.lock();
            let introspect = inner.context.introspect();
            let mut found = None;
            let mut tx = Some(tx);
            introspect.get_source_info_by_index(index, move |result| match result {
                ListResult::Item(info) => found = Some(source_from(info)),
                ListResult::End => {
                    let result = found.take().ok_or_else(|| {
                        error!("server returned no source info");
                        RouteError::EmptyInfo { object: "source" }
                    });
                    complete(&mut tx, result);
                }
                ListResult::Error => {
                    complete(&mut tx, Err(RouteError::request_failed("get source")));
                }
            });
            inner.mainloop.unlock();
        }
        rx.await.map_err(|_| RouteError::Disconnected)?
    }

    async fn set_card_profile(&self, index: u32, profile: &str) -> Result<(), RouteError> {
        let profile = profile.to_string();
        self.mutation(
            format!("set card profile '{profile}'"),
            move |introspect, cb| {
                introspect.set_card_profile_by_index(index, &profile, Some(cb));
            },
        )
        .await
    }

    async fn set_sink_port(&self, index: u32, port: &str) -> Result<(), RouteError> {
        let port = port.to_string();
        self.mutation(format!("set sink port '{port}'"), move |introspect, cb| {
            introspect.set_sink_port_by_index(index, &port, Some(cb));
        })
        .await
    }

    async fn set_source_port(&self, index: u32, port: &str) -> Result<(), RouteError> {
        let port = port.to_string();
        self.mutation(format!("set source port '{port}'"), move |introspect, cb| {
            introspect.set_source_port_by_index(index, &port, Some(cb));
        })
        .await
    }

    async fn set_source_mute(&self, index: u32, mute: bool) -> Result<(), RouteError> {
        self.mutation(format!("set source mute {mute}"), move |introspect, cb| {
            introspect.set_source_mute_by_index(index, mute, Some(cb));
        })
        .await
    }

    async fn unload_module(&self, index: u32) -> Result<(), RouteError> {
        self.mutation(format!("unload module {index}"), move |introspect, cb| {
            introspect.unload_module(index, cb);
        })
        .await
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<ServerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(tx);
        rx
    }
}
