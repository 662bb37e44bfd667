//! Device publishers: translate state updates into profiles on the bus.
//!
//! Publishers hold no device state. Each one stamps the device identity and
//! the current time, encodes, and hands the bytes to the bus.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::bus::{MessageBus, device_topic};
use crate::config::TopicConfig;
use crate::devices::battery::{BatteryMode, BatteryObserver};
use crate::devices::recloser::RecloserObserver;
use crate::devices::solar::OutputObserver;
use crate::devices::types::DeviceId;
use crate::error::PublishError;
use crate::profile::codec::Marshaller;
use crate::profile::{Profile, ProfileKind, model};
use crate::sim::clock::Clock;
use crate::sim::controller::BatteryControlIssuer;

/// Shared publishing path for one device identity.
#[derive(Clone)]
pub struct ProfilePublisher {
    device: DeviceId,
    bus: Arc<dyn MessageBus>,
    codec: Arc<dyn Marshaller>,
    clock: Arc<dyn Clock>,
}

impl ProfilePublisher {
    pub fn new(
        device: DeviceId,
        bus: Arc<dyn MessageBus>,
        codec: Arc<dyn Marshaller>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            device,
            bus,
            codec,
            clock,
        }
    }

    /// `<base for kind>/<this device's logical id>`.
    pub fn topic(&self, topics: &TopicConfig, kind: ProfileKind) -> String {
        device_topic(topics.base(kind), &self.device.logical_device_id)
    }

    /// Builds a profile with this identity and the current time, then publishes it.
    pub fn publish(
        &self,
        topic: &str,
        build: impl FnOnce(&DeviceId, DateTime<Utc>) -> Profile,
    ) -> Result<(), PublishError> {
        let profile = build(&self.device, self.clock.now());
        let payload = self.codec.encode(&profile)?;
        self.bus.publish(topic, payload)
    }
}

/// Battery readings and events.
pub struct BatteryPublisher {
    inner: ProfilePublisher,
    read_topic: String,
    event_topic: String,
}

impl BatteryPublisher {
    pub fn new(inner: ProfilePublisher, topics: &TopicConfig) -> Self {
        Self {
            read_topic: inner.topic(topics, ProfileKind::BatteryReading),
            event_topic: inner.topic(topics, ProfileKind::BatteryEvent),
            inner,
        }
    }
}

impl BatteryObserver for BatteryPublisher {
    fn battery_read_update(&self, power_kw: f64, volts: f64, hertz: f64) -> Result<(), PublishError> {
        self.inner.publish(&self.read_topic, |id, at| {
            model::battery_reading(id, at, power_kw, volts, hertz)
        })
    }

    fn battery_event_update(
        &self,
        is_connected: bool,
        is_charging: bool,
        mode: BatteryMode,
        soc_percent: f64,
    ) -> Result<(), PublishError> {
        self.inner.publish(&self.event_topic, |id, at| {
            model::battery_event(id, at, is_connected, is_charging, mode, soc_percent)
        })
    }
}

/// Recloser readings and events.
pub struct RecloserPublisher {
    inner: ProfilePublisher,
    read_topic: String,
    event_topic: String,
}

impl RecloserPublisher {
    pub fn new(inner: ProfilePublisher, topics: &TopicConfig) -> Self {
        Self {
            read_topic: inner.topic(topics, ProfileKind::RecloserReading),
            event_topic: inner.topic(topics, ProfileKind::RecloserEvent),
            inner,
        }
    }
}

impl RecloserObserver for RecloserPublisher {
    /// Reactive power is not carried on the wire.
    fn read_update(&self, power_kw: f64, volts: f64, hertz: f64, _kvars: f64) -> Result<(), PublishError> {
        self.inner.publish(&self.read_topic, |id, at| {
            model::recloser_reading(id, at, power_kw, volts, hertz)
        })
    }

    fn event_update(&self, is_closed: bool, is_blocked: bool) -> Result<(), PublishError> {
        self.inner.publish(&self.event_topic, |id, at| {
            model::recloser_event(id, at, is_closed, is_blocked)
        })
    }
}

/// Solar inverter readings and connected events.
pub struct SolarPublisher {
    inner: ProfilePublisher,
    read_topic: String,
    event_topic: String,
}

impl SolarPublisher {
    pub fn new(inner: ProfilePublisher, topics: &TopicConfig) -> Self {
        Self {
            read_topic: inner.topic(topics, ProfileKind::SolarReading),
            event_topic: inner.topic(topics, ProfileKind::SolarEvent),
            inner,
        }
    }
}

impl OutputObserver for SolarPublisher {
    fn read_update(&self, value_kw: f64) -> Result<(), PublishError> {
        self.inner
            .publish(&self.read_topic, |id, at| model::solar_reading(id, at, value_kw))
    }

    fn event_update(&self) -> Result<(), PublishError> {
        self.inner.publish(&self.event_topic, model::solar_event)
    }
}

/// Load meter readings. Meters publish no event profile.
pub struct ResourcePublisher {
    inner: ProfilePublisher,
    read_topic: String,
}

impl ResourcePublisher {
    pub fn new(inner: ProfilePublisher, topics: &TopicConfig) -> Self {
        Self {
            read_topic: inner.topic(topics, ProfileKind::ResourceReading),
            inner,
        }
    }
}

impl OutputObserver for ResourcePublisher {
    fn read_update(&self, value_kw: f64) -> Result<(), PublishError> {
        self.inner
            .publish(&self.read_topic, |id, at| model::resource_reading(id, at, value_kw))
    }
}

/// Battery control commands issued by the balance controller.
///
/// Profiles carry the controller's identity, whose logical id must be the
/// battery's: the battery only accepts controls addressed to itself.
pub struct BatteryControlPublisher {
    inner: ProfilePublisher,
    topic: String,
}

impl BatteryControlPublisher {
    pub fn new(inner: ProfilePublisher, topics: &TopicConfig) -> Self {
        Self {
            topic: inner.topic(topics, ProfileKind::BatteryControl),
            inner,
        }
    }
}

impl BatteryControlIssuer for BatteryControlPublisher {
    fn set_islanded(&self) -> Result<(), PublishError> {
        self.inner.publish(&self.topic, model::battery_islanded_control)
    }

    fn set_power_setpoint(&self, power_kw: f64) -> Result<(), PublishError> {
        self.inner.publish(&self.topic, |id, at| {
            model::battery_power_control(id, at, power_kw)
        })
    }

    fn leave_islanded(&self) -> Result<(), PublishError> {
        self.inner.publish(&self.topic, |id, at| {
            model::battery_mode_control(id, at, BatteryMode::LeavingIslanded)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::LocalBus;
    use crate::profile::codec::JsonMarshaller;
    use crate::profile::{ControlType, SwitchStatus};
    use crate::sim::clock::ManualClock;

    fn publisher(bus: Arc<LocalBus>, logical: &str) -> ProfilePublisher {
        ProfilePublisher::new(
            DeviceId::new(logical, "mrid", "name", "desc"),
            bus,
            Arc::new(JsonMarshaller),
            Arc::new(ManualClock::new(1_700_000_000_000)),
        )
    }

    fn decode(payload: &[u8]) -> Profile {
        JsonMarshaller.decode(payload).unwrap()
    }

    #[tokio::test]
    async fn battery_publisher_uses_device_topics() {
        let bus = Arc::new(LocalBus::new());
        let mut reads = bus.subscribe("BatteryReadingProfile/bat-1");
        let mut events = bus.subscribe("BatteryEventProfile/bat-1");
        let p = BatteryPublisher::new(publisher(bus.clone(), "bat-1"), &TopicConfig::default());

        p.battery_read_update(-5.0, 480.0, 60.0).unwrap();
        p.battery_event_update(true, true, BatteryMode::Islanded, 42.0).unwrap();

        let Profile::BatteryReading(r) = decode(&reads.recv().await.unwrap().payload) else {
            panic!("expected battery reading");
        };
        assert_eq!(r.power_values_kw().collect::<Vec<_>>(), vec![-5.0]);
        assert_eq!(r.header.timestamp.timestamp_millis(), 1_700_000_000_000);

        let Profile::BatteryEvent(e) = decode(&events.recv().await.unwrap().payload) else {
            panic!("expected battery event");
        };
        assert!(e.is_charging);
        assert_eq!(e.mode, "Islanded");
        assert_eq!(e.state_of_charge, 42.0);
    }

    #[tokio::test]
    async fn recloser_publisher_maps_status() {
        let bus = Arc::new(LocalBus::new());
        let mut events = bus.subscribe("RecloserEventProfile/#");
        let p = RecloserPublisher::new(publisher(bus.clone(), "rec-1"), &TopicConfig::default());
        p.event_update(false, false).unwrap();
        let msg = events.recv().await.unwrap();
        assert_eq!(msg.topic, "RecloserEventProfile/rec-1");
        let Profile::RecloserEvent(e) = decode(&msg.payload) else {
            panic!("expected recloser event");
        };
        assert_eq!(e.status, SwitchStatus::Open);
    }

    #[tokio::test]
    async fn resource_publisher_sends_only_readings() {
        let bus = Arc::new(LocalBus::new());
        let mut all = bus.subscribe("#");
        let p = ResourcePublisher::new(publisher(bus.clone(), "load-1"), &TopicConfig::default());
        p.read_update(-12.0).unwrap();
        p.event_update().unwrap();
        assert_eq!(all.recv().await.unwrap().topic, "ResourceReadingProfile/load-1");
        assert!(all.try_recv().is_err());
    }

    #[tokio::test]
    async fn control_publisher_encodes_commands() {
        let bus = Arc::new(LocalBus::new());
        let mut controls = bus.subscribe("BatteryControlProfile/bat-1");
        let p = BatteryControlPublisher::new(publisher(bus.clone(), "bat-1"), &TopicConfig::default());

        p.set_islanded().unwrap();
        p.set_power_setpoint(7.5).unwrap();
        p.leave_islanded().unwrap();

        let mut decoded = Vec::new();
        for _ in 0..3 {
            let Profile::BatteryControl(c) = decode(&controls.recv().await.unwrap().payload) else {
                panic!("expected battery control");
            };
            decoded.push(c);
        }
        assert!(decoded[0].is_islanded && decoded[0].set_points.is_empty());
        assert_eq!(decoded[1].set_points[0].control_type, ControlType::SetRealPower);
        assert_eq!(decoded[1].set_points[0].value, 7.5);
        assert_eq!(decoded[2].set_points[0].control_type, ControlType::SetMode);
        assert_eq!(decoded[2].set_points[0].value, 14.0);
    }

    #[test]
    fn closed_bus_surfaces_publish_error() {
        let bus = Arc::new(LocalBus::new());
        bus.close();
        let p = SolarPublisher::new(publisher(bus, "pv-1"), &TopicConfig::default());
        assert!(matches!(
            p.read_update(1.0),
            Err(PublishError::ChannelClosed { .. })
        ));
    }
}
