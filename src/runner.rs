//! Builds every configured device, wires it to the bus and starts its loop.

use std::sync::Arc;
use std::time::Duration;

use rand::{SeedableRng, rngs::StdRng};
use tokio::task::JoinHandle;
use tracing::{info, info_span, warn};

use crate::bus::handlers::{
    BatteryControlHandler, PowerReadingHandler, RecloserControlHandler, RecloserStatusHandler,
};
use crate::bus::router::Router;
use crate::bus::{LocalBus, MessageBus, class_topic, device_topic};
use crate::config::{OutputConfig, SimulatorConfig, TopicConfig};
use crate::curve::DailyCurve;
use crate::devices::battery::BatteryMachine;
use crate::devices::recloser::RecloserMachine;
use crate::devices::solar::{OutputSimulator, SignConvention};
use crate::devices::types::PowerObserver;
use crate::error::StartupError;
use crate::io::curve_file::load_day;
use crate::io::publisher::{
    BatteryControlPublisher, BatteryPublisher, ProfilePublisher, RecloserPublisher,
    ResourcePublisher, SolarPublisher,
};
use crate::profile::ProfileKind;
use crate::profile::codec::{JsonMarshaller, Marshaller};
use crate::sim::clock::Clock;
use crate::sim::controller::BalanceController;
use crate::sim::power_balance::PowerClass;

/// Handles to everything [`start`] brought up.
pub struct Simulation {
    pub battery: Option<Arc<BatteryMachine>>,
    pub recloser: Option<Arc<RecloserMachine>>,
    pub solar: Option<Arc<OutputSimulator>>,
    pub load: Option<Arc<OutputSimulator>>,
    pub balancer: Option<Arc<BalanceController>>,
    /// Subscription and timer tasks. They run until aborted or the runtime stops.
    pub tasks: Vec<JoinHandle<()>>,
}

impl Simulation {
    /// Stops every task.
    pub fn abort(&self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Routes feeding all three contributor classes to one observer.
fn power_routes(
    router: Router,
    topics: &TopicConfig,
    observer: Arc<dyn PowerObserver>,
    codec: &Arc<dyn Marshaller>,
) -> Router {
    [
        (ProfileKind::BatteryReading, PowerClass::Battery),
        (ProfileKind::SolarReading, PowerClass::Solar),
        (ProfileKind::ResourceReading, PowerClass::Load),
    ]
    .into_iter()
    .fold(router, |router, (kind, class)| {
        router.route(
            class_topic(topics.base(kind)),
            Arc::new(PowerReadingHandler::new(class, observer.clone(), codec.clone())),
        )
    })
}

fn read_curve(section: &str, cfg: &OutputConfig) -> Result<Arc<dyn DailyCurve>, StartupError> {
    let day = load_day(&cfg.data_file)?;
    info!(
        section,
        path = %cfg.data_file.display(),
        samples = day.samples().len(),
        peak = day.peak(),
        "curve loaded"
    );
    Ok(Arc::new(day))
}

/// Validates `config`, builds every configured device and starts it.
///
/// Subscriptions are registered before any timer loop starts. Must be called
/// from within a tokio runtime.
///
/// # Errors
///
/// Returns a `StartupError` if the configuration is invalid or a curve data
/// file cannot be loaded. Nothing is started in that case.
pub fn start(
    config: &SimulatorConfig,
    bus: Arc<LocalBus>,
    clock: Arc<dyn Clock>,
) -> Result<Simulation, StartupError> {
    let errors = config.validate();
    if !errors.is_empty() {
        return Err(StartupError::Config(errors));
    }

    let solar_curve = config.solar.as_ref().map(|c| read_curve("solar", c)).transpose()?;
    let load_curve = config.load.as_ref().map(|c| read_curve("load", c)).transpose()?;

    let seed = config.simulation.seed;
    let topics = &config.topics;
    let codec: Arc<dyn Marshaller> = Arc::new(JsonMarshaller);
    let dyn_bus: Arc<dyn MessageBus> = bus.clone();
    let publisher_for = |device| ProfilePublisher::new(device, dyn_bus.clone(), codec.clone(), clock.clone());

    let mut router = Router::new();
    let mut timers: Vec<Box<dyn FnOnce() -> JoinHandle<()>>> = Vec::new();

    let battery = config.battery.as_ref().map(|cfg| {
        let span = info_span!("battery", id = %cfg.device.logical_device_id);
        let machine = Arc::new(BatteryMachine::new(
            cfg.spec(),
            cfg.initial_soc,
            Arc::new(BatteryPublisher::new(publisher_for(cfg.device.clone()), topics)),
            clock.clone(),
            StdRng::seed_from_u64(seed.wrapping_add(1)),
            span,
        ));
        let interval = Duration::from_millis(cfg.interval_ms);
        let looped = machine.clone();
        timers.push(Box::new(move || tokio::spawn(looped.run(interval))));
        machine
    });
    if let (Some(machine), Some(cfg)) = (&battery, &config.battery) {
        let id = &cfg.device.logical_device_id;
        router = router.route(
            device_topic(topics.base(ProfileKind::BatteryControl), id),
            Arc::new(BatteryControlHandler::new(machine.clone(), id.clone(), codec.clone())),
        );
    }

    let recloser = config.recloser.as_ref().map(|cfg| {
        let span = info_span!("recloser", id = %cfg.device.logical_device_id);
        let machine = Arc::new(RecloserMachine::new(
            cfg.spec(),
            Arc::new(RecloserPublisher::new(publisher_for(cfg.device.clone()), topics)),
            StdRng::seed_from_u64(seed.wrapping_add(2)),
            span,
        ));
        let interval = Duration::from_millis(cfg.interval_ms);
        let looped = machine.clone();
        timers.push(Box::new(move || tokio::spawn(looped.run(interval))));
        machine
    });
    if let (Some(machine), Some(cfg)) = (&recloser, &config.recloser) {
        let id = &cfg.device.logical_device_id;
        router = router.route(
            device_topic(topics.base(ProfileKind::RecloserControl), id),
            Arc::new(RecloserControlHandler::new(machine.clone(), id.clone(), codec.clone())),
        );
        router = power_routes(router, topics, machine.clone(), &codec);
    }

    let solar = config.solar.as_ref().zip(solar_curve).map(|(cfg, curve)| {
        let span = info_span!("solar", id = %cfg.device.logical_device_id);
        let sim = Arc::new(OutputSimulator::new(
            cfg.params(SignConvention::Direct),
            curve,
            Arc::new(SolarPublisher::new(publisher_for(cfg.device.clone()), topics)),
            clock.clone(),
            StdRng::seed_from_u64(seed.wrapping_add(3)),
            span,
        ));
        let interval = Duration::from_millis(cfg.interval_ms);
        let looped = sim.clone();
        timers.push(Box::new(move || tokio::spawn(looped.run(interval))));
        sim
    });

    let load = config.load.as_ref().zip(load_curve).map(|(cfg, curve)| {
        let span = info_span!("load", id = %cfg.device.logical_device_id);
        let sim = Arc::new(OutputSimulator::new(
            cfg.params(SignConvention::Negated),
            curve,
            Arc::new(ResourcePublisher::new(publisher_for(cfg.device.clone()), topics)),
            clock.clone(),
            StdRng::seed_from_u64(seed.wrapping_add(4)),
            span,
        ));
        let interval = Duration::from_millis(cfg.interval_ms);
        let looped = sim.clone();
        timers.push(Box::new(move || tokio::spawn(looped.run(interval))));
        sim
    });

    let balancer = config.balancer.as_ref().map(|cfg| {
        let span = info_span!("balancer", recloser = %cfg.recloser_logical_device_id);
        let issuer = BatteryControlPublisher::new(publisher_for(cfg.device.clone()), topics);
        let controller = Arc::new(BalanceController::new(Box::new(issuer), cfg.deadband_kw, span));
        router = std::mem::take(&mut router).route(
            device_topic(
                topics.base(ProfileKind::RecloserEvent),
                &cfg.recloser_logical_device_id,
            ),
            Arc::new(RecloserStatusHandler::new(
                cfg.recloser_logical_device_id.clone(),
                controller.clone(),
                codec.clone(),
            )),
        );
        router = power_routes(std::mem::take(&mut router), topics, controller.clone(), &codec);
        controller
    });

    let route_count = router.len();
    if router.is_empty() {
        warn!("no devices configured; nothing subscribes to the bus");
    }
    let mut tasks = router.spawn(&bus, info_span!("router"));
    tasks.extend(timers.into_iter().map(|spawn| spawn()));

    info!(
        routes = route_count,
        battery = battery.is_some(),
        recloser = recloser.is_some(),
        solar = solar.is_some(),
        load = load.is_some(),
        balancer = balancer.is_some(),
        "simulator started"
    );

    Ok(Simulation {
        battery,
        recloser,
        solar,
        load,
        balancer,
        tasks,
    })
}
