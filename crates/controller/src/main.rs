mod calib;
mod config;
mod db;
mod decision;
mod mqtt;
mod notify;
mod orchestrator;
mod pump;
mod relay;
mod sensor;
mod state;
mod telemetry;
mod threshold;
mod web;

use anyhow::{Context, Result};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::{env, sync::Arc, time::Duration, time::Instant};
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio::sync::RwLock;
use tokio::time::{interval, sleep, timeout, MissedTickBehavior};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use db::Db;
use mqtt::{alert_topic, command_subscription, extract_command_verb, parse_command, telemetry_topic};
use orchestrator::Controller;
use relay::PumpRelay;
use sensor::SensorBus;
use state::{LiveReading, SharedState, SystemState};

#[cfg(feature = "sim")]
use sensor::SimSensor;

#[cfg(not(feature = "sim"))]
compile_error!("no sensor backend: build with the `sim` feature or wire a hardware SensorBus");

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // ── Env config ──────────────────────────────────────────────────
    let broker = env::var("MQTT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let mqtt_port: u16 = env::var("MQTT_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(1883);
    let web_port: u16 = env::var("WEB_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(8080);
    let db_url =
        env::var("DB_URL").unwrap_or_else(|_| "sqlite:controller.db?mode=rwc".to_string());
    let controller_id = env::var("CONTROLLER_ID").unwrap_or_else(|_| "garden-1".to_string());

    // ── Config file ─────────────────────────────────────────────────
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    let cfg = if std::path::Path::new(&config_path).exists() {
        config::load(&config_path)?
    } else {
        warn!(path = %config_path, "config file not found, using defaults");
        let cfg = config::Config::default();
        cfg.validate()?;
        cfg
    };

    // ── Database ────────────────────────────────────────────────────
    let db = Db::connect(&db_url).await?;
    db.init().await?;
    let restored_mode = db.load_mode().await?;
    if let Some(mode) = restored_mode {
        info!(?mode, "restored mode from previous run");
    }

    // ── Actuator & sensor ───────────────────────────────────────────
    let relay_pin = u8::try_from(cfg.pump.relay_gpio_pin).context("relay GPIO pin out of range")?;
    let mut relay = PumpRelay::new(relay_pin, cfg.pump.relay_active_low)?;
    relay.set(false);

    #[cfg(feature = "sim")]
    let mut bus = SimSensor::new(
        cfg.calibration.soil_min_raw as f64,
        cfg.calibration.soil_max_raw as f64,
    );

    let mut controller = Controller::new(&cfg, Instant::now(), restored_mode);

    // ── Shared state (ephemeral, for the web API) ───────────────────
    let shared: SharedState = Arc::new(RwLock::new(SystemState::new(cfg.system.maintenance_mode)));
    {
        let mut st = shared.write().await;
        st.record_system("controller started".to_string());
    }

    // ── Command channel ─────────────────────────────────────────────
    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<orchestrator::Command>();

    // ── Web server ──────────────────────────────────────────────────
    let web_state = Arc::clone(&shared);
    let web_tx = cmd_tx.clone();
    tokio::spawn(async move {
        if let Err(e) = web::serve(web_port, web_state, web_tx).await {
            error!("web server error: {e}");
        }
    });

    // ── MQTT ────────────────────────────────────────────────────────
    let client_id = format!("irrigation-controller-{controller_id}");
    let mut mqttoptions = MqttOptions::new(client_id, broker, mqtt_port);
    mqttoptions.set_keep_alive(Duration::from_secs(30));

    let (client, mut eventloop) = AsyncClient::new(mqttoptions, 20);
    client
        .subscribe(command_subscription(&controller_id), QoS::AtLeastOnce)
        .await?;
    info!(id = %controller_id, "subscribed to command topics");

    // Event loop task: inbound commands + connection bookkeeping.
    let mqtt_state = Arc::clone(&shared);
    let mqtt_tx = cmd_tx;
    let mqtt_id = controller_id.clone();
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::Publish(p))) => {
                    let Some(verb) = extract_command_verb(&p.topic, &mqtt_id) else {
                        warn!(topic = %p.topic, "unhandled topic");
                        continue;
                    };
                    match parse_command(verb, &p.payload) {
                        Ok(cmd) => {
                            let mut st = mqtt_state.write().await;
                            st.record_command(format!("mqtt: {verb}"));
                            drop(st);
                            // Receiver outlives us except during shutdown.
                            let _ = mqtt_tx.send(cmd);
                        }
                        Err(msg) => {
                            warn!("{msg}");
                            let mut st = mqtt_state.write().await;
                            st.record_error(msg);
                        }
                    }
                }
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!("mqtt connected");
                    let mut st = mqtt_state.write().await;
                    st.mqtt_connected = true;
                    st.record_system("mqtt connected".to_string());
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    warn!("mqtt disconnected");
                    let mut st = mqtt_state.write().await;
                    st.mqtt_connected = false;
                    st.record_system("mqtt disconnected".to_string());
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("mqtt error: {e}. reconnecting...");
                    let mut st = mqtt_state.write().await;
                    st.mqtt_connected = false;
                    drop(st);
                    sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });

    // ── Control loop ────────────────────────────────────────────────
    let mut tick = interval(cfg.intervals.sensor_read());
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let publish_timeout = cfg.intervals.http_timeout();

    loop {
        tick.tick().await;
        let now = Instant::now();

        // Apply queued commands atomically before the tick.
        let mode_before = controller.mode();
        while let Ok(cmd) = cmd_rx.try_recv() {
            controller.apply(cmd, now);
        }
        if controller.mode() != mode_before {
            if let Err(e) = db.save_mode(controller.mode()).await {
                warn!("db: save_mode failed: {e}");
            }
        }

        // Sample. A failed read becomes a sensor-fault tick, not a crash.
        let sample = match bus.sample() {
            Ok(s) => Some(s),
            Err(e) => {
                warn!("sensor read failed: {e}");
                None
            }
        };

        let out = controller.tick(now, sample);

        // Drive the relay; the simulator closes the loop.
        relay.set(out.relay_on);
        #[cfg(feature = "sim")]
        bus.set_watering(out.relay_on);

        // Mirror into the shared state for the web API.
        {
            let live = match (out.reading, sample) {
                (Some(r), Some(s)) => Some(LiveReading {
                    moisture_raw: s.moisture_raw,
                    moisture_pct: r.moisture_pct,
                    temperature_c: r.temperature_c,
                    humidity_pct: r.humidity_pct,
                    taken_at: OffsetDateTime::now_utc(),
                }),
                _ => None,
            };
            let mut st = shared.write().await;
            st.record_tick(
                controller.mode(),
                out.pump_state,
                out.relay_on,
                out.sensor_fault,
                live,
                &out.thresholds,
            );
            for n in &out.notifications {
                st.record_alert(format!("{}: {}", n.kind.as_str(), n.message));
            }
        }

        // Alerts (best-effort, bounded).
        for n in &out.notifications {
            let topic = alert_topic(&controller_id, n.kind);
            let payload = serde_json::to_vec(n)?;
            match timeout(
                publish_timeout,
                client.publish(&topic, QoS::AtLeastOnce, false, payload),
            )
            .await
            {
                Ok(Ok(())) => info!(topic = %topic, "alert published"),
                Ok(Err(e)) => warn!("alert publish failed: {e}"),
                Err(_) => warn!(topic = %topic, "alert publish timed out"),
            }
        }

        // Telemetry flush, if due. The interval restarts only on success;
        // a failure is retried on the next tick.
        if let Some(snap) = out.telemetry {
            let topic = telemetry_topic(&controller_id);
            let payload = serde_json::to_vec(&snap)?;
            match timeout(
                publish_timeout,
                client.publish(&topic, QoS::AtLeastOnce, false, payload),
            )
            .await
            {
                Ok(Ok(())) => {
                    controller.confirm_telemetry_sent(now);
                    if let Err(e) = db.insert_snapshot(&snap).await {
                        warn!("db: insert_snapshot failed: {e}");
                    }
                }
                Ok(Err(e)) => warn!("telemetry publish failed: {e}"),
                Err(_) => warn!("telemetry publish timed out"),
            }
        }
    }
}
