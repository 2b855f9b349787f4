use std::time::{Duration, Instant};

use clap::Parser;
use shared::{
    eta::{format_clock, EtaResponse},
    playback::{FrameScheduler, PlaybackEngine, RenderSink},
};
use tokio::{sync::mpsc, task::JoinHandle, time::MissedTickBehavior};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wayline_server::{
    config::ServerConfig,
    models::{Coordinate, Route},
    osrm::OsrmClient,
};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Fetch a route from OSRM and replay the simulated vehicle in the terminal"
)]
struct Args {
    /// Start point as `lat,lon`
    #[arg(long, value_parser = parse_coordinate, allow_hyphen_values = true)]
    start: Coordinate,

    /// End point as `lat,lon`
    #[arg(long, value_parser = parse_coordinate, allow_hyphen_values = true)]
    end: Coordinate,

    /// Vehicle speed used for the ETA, in km/h
    #[arg(long, default_value_t = 40.0)]
    speed_kmh: f64,

    /// Playback speed multiplier
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u32).range(1..))]
    multiplier: u32,

    /// Frames per second
    #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u32).range(1..=240))]
    fps: u32,

    /// Base URL of the OSRM service (defaults to OSRM_URL)
    #[arg(long)]
    osrm_url: Option<String>,
}

fn parse_coordinate(value: &str) -> Result<Coordinate, String> {
    let (lat, lon) = value
        .split_once(',')
        .ok_or_else(|| format!("expected `lat,lon`, got {value:?}"))?;
    let coord = Coordinate {
        lat: lat.trim().parse().map_err(|_| format!("invalid latitude {lat:?}"))?,
        lon: lon.trim().parse().map_err(|_| format!("invalid longitude {lon:?}"))?,
    };
    if !coord.is_valid() {
        return Err(format!("{value:?} is out of range"));
    }
    Ok(coord)
}

/// Frame subscription backed by a tokio task; dropping it stops the ticks.
struct FrameTask(JoinHandle<()>);

impl Drop for FrameTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

struct IntervalFrames {
    period: Duration,
    frames: mpsc::Sender<()>,
}

impl FrameScheduler for IntervalFrames {
    type Handle = FrameTask;

    fn schedule(&mut self) -> FrameTask {
        let frames = self.frames.clone();
        let period = self.period;
        FrameTask(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if frames.send(()).await.is_err() {
                    break;
                }
            }
        }))
    }
}

/// Logs every whole percent of progress; positions go to debug level.
#[derive(Default)]
struct LogSink {
    last_percent: Option<u8>,
}

impl RenderSink for LogSink {
    fn on_frame(&mut self, lat: f64, lon: f64, heading_degrees: f64) {
        tracing::debug!("vehicle at {lat:.6},{lon:.6} heading {heading_degrees:.0}°");
    }

    fn on_progress(&mut self, percent: u8, elapsed_seconds: u64) {
        if self.last_percent != Some(percent) {
            self.last_percent = Some(percent);
            tracing::info!("{percent:>3}% after {}", format_clock(elapsed_seconds));
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = ServerConfig::from_env()?;
    let osrm_url = args.osrm_url.clone().unwrap_or(config.osrm_url);
    let osrm = OsrmClient::new(osrm_url.trim_end_matches('/'), config.osrm_profile)?;

    tracing::info!("requesting route {:?} -> {:?} from {osrm_url}", args.start, args.end);
    let route = osrm.route(args.start, args.end).await?;
    let eta = EtaResponse::from_distance(route.distance_m, args.speed_kmh)
        .ok_or("route has no length or the speed is not positive")?;
    tracing::info!(
        "{:.2} km, {} points, ETA {} at {} km/h, replaying at {}x",
        route.distance_m / 1000.0,
        route.path.len(),
        eta.formatted,
        args.speed_kmh,
        args.multiplier
    );

    let started = Instant::now();
    let mut engine = PlaybackEngine::new(move || started.elapsed().as_secs_f64() * 1000.0);
    let mut sink = LogSink::default();
    engine.set_route(Route::new(route.path, eta.seconds)?, &mut sink);
    engine.set_speed_multiplier(args.multiplier);

    let (frames, mut ticks) = mpsc::channel(1);
    let mut scheduler = IntervalFrames {
        period: Duration::from_secs_f64(1.0 / f64::from(args.fps)),
        frames,
    };
    engine.play(&mut scheduler);

    while engine.is_scheduled() {
        tokio::select! {
            tick = ticks.recv() => {
                if tick.is_none() {
                    break;
                }
                engine.tick(&mut sink);
            }
            _ = tokio::signal::ctrl_c() => {
                engine.pause();
                tracing::info!(
                    "paused at {:.1}% after {}",
                    engine.progress_percent(),
                    format_clock(engine.elapsed_seconds())
                );
                return Ok(());
            }
        }
    }

    tracing::info!(
        "arrived after {} of playback",
        format_clock(engine.elapsed_seconds())
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_lat_lon_pairs() {
        let coord = parse_coordinate("23.8103, 90.4125").unwrap();
        assert_eq!(coord, Coordinate { lat: 23.8103, lon: 90.4125 });
        assert!(parse_coordinate("-33.9,18.4").is_ok());
    }

    #[test]
    fn rejects_bad_pairs() {
        assert!(parse_coordinate("23.81").is_err());
        assert!(parse_coordinate("north,east").is_err());
        assert!(parse_coordinate("123.0,10.0").is_err());
    }
}
