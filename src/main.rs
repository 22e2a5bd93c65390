use std::f64::consts::PI;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use linux_embedded_hal::I2cdev;

use tilt_tracker_rs::bus::DEFAULT_ADDRESS;
use tilt_tracker_rs::calibration::{CalibrationProcedure, DEFAULT_SAMPLE_COUNT};
use tilt_tracker_rs::device::ACCEL_COUNTS_PER_G;
use tilt_tracker_rs::filters::tilt;
use tilt_tracker_rs::offsets::DEFAULT_OFFSETS_FILE;
use tilt_tracker_rs::{
    AttitudeEstimator, AttitudeOutput, Axes, EstimatorConfig, FilterParameters, GyroRange,
    I2cRegisterBus, OffsetLoad, OffsetSet, OffsetStore, RawSample, RawSampleReader, RegisterBus,
    SimulatedBus,
};

#[derive(Parser, Debug)]
#[command(name = "tilt_tracker")]
#[command(about = "Kalman-filtered roll/pitch from an MPU-6050 over I2C", long_about = None)]
struct Cli {
    /// I2C bus device
    #[arg(long, default_value = "/dev/i2c-1", global = true)]
    bus: PathBuf,

    /// 7-bit device address (decimal or 0x-prefixed hex)
    #[arg(long, value_parser = parse_address, default_value = "0x68", global = true)]
    address: u8,

    /// Calibration offsets file
    #[arg(long, default_value = DEFAULT_OFFSETS_FILE, global = true)]
    offsets: PathBuf,

    /// Use an in-memory sensor instead of hardware
    #[arg(long, global = true)]
    simulate: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print filtered roll/pitch continuously
    Run(LoopArgs),
    /// Print offset-corrected counts and accelerometer-only tilt
    Raw(LoopArgs),
    /// Measure static bias and save it to the offsets file
    Calibrate(CalibrateArgs),
}

#[derive(Args, Debug)]
struct LoopArgs {
    /// Cycle period in milliseconds
    #[arg(long, default_value = "10")]
    period_ms: u64,

    /// Stop after this many cycles (0 = until Ctrl-C)
    #[arg(long, default_value = "0")]
    cycles: u64,

    /// Gyro full-scale range in °/s (250, 500, 1000, 2000)
    #[arg(long, value_parser = parse_gyro_range, default_value = "250")]
    gyro_range: GyroRange,

    #[arg(long, default_value_t = FilterParameters::default().q_angle)]
    q_angle: f64,

    #[arg(long, default_value_t = FilterParameters::default().q_bias)]
    q_bias: f64,

    #[arg(long, default_value_t = FilterParameters::default().r_measure)]
    r_measure: f64,
}

impl LoopArgs {
    fn estimator_config(&self) -> EstimatorConfig {
        EstimatorConfig::default()
            .with_gyro_range(self.gyro_range)
            .with_filter(FilterParameters {
                q_angle: self.q_angle,
                q_bias: self.q_bias,
                r_measure: self.r_measure,
            })
    }

    fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

#[derive(Args, Debug)]
struct CalibrateArgs {
    /// Number of samples to average
    #[arg(long, default_value_t = DEFAULT_SAMPLE_COUNT)]
    samples: u32,

    /// Skip the "place the sensor level" prompt
    #[arg(long, short = 'y')]
    yes: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {} - {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();

    let cli = Cli::parse();

    // Ctrl-C at this prompt terminates the process; the handler is not installed yet
    if let Command::Calibrate(args) = &cli.command {
        if !args.yes {
            println!("Place the sensor on a level surface and keep it still, then press Enter.");
            let mut line = String::new();
            io::stdin().lock().read_line(&mut line)?;
        }
    }

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    })
    .context("Error setting Ctrl-C handler")?;

    if cli.simulate {
        log::info!("Using simulated sensor");
        let bus = match cli.command {
            Command::Calibrate(_) => SimulatedBus::level(),
            _ => wobbling_bus(),
        };
        dispatch(&cli, bus, &running)
    } else {
        let i2c = I2cdev::new(&cli.bus)
            .with_context(|| format!("Failed to open I2C bus {}", cli.bus.display()))?;
        log::info!(
            "Opened {} (device 0x{:02X})",
            cli.bus.display(),
            cli.address
        );
        dispatch(&cli, I2cRegisterBus::new(i2c, cli.address), &running)
    }
}

fn dispatch<B: RegisterBus>(cli: &Cli, bus: B, running: &AtomicBool) -> Result<()> {
    let store = OffsetStore::new(&cli.offsets);
    match &cli.command {
        Command::Run(args) => run_filtered(bus, &store, args, cli.simulate, running),
        Command::Raw(args) => run_raw(bus, &store, args, running),
        Command::Calibrate(args) => calibrate(bus, &store, args, running),
    }
}

fn run_filtered<B: RegisterBus>(
    bus: B,
    store: &OffsetStore,
    args: &LoopArgs,
    simulate: bool,
    running: &AtomicBool,
) -> Result<()> {
    let offsets = run_offsets(store, simulate)?;
    let mut estimator = AttitudeEstimator::new(bus, offsets, args.estimator_config())
        .context("Failed to initialize IMU")?;
    println!(
        "[{}] Tracking tilt every {} ms (Ctrl-C to stop)",
        ts_now(),
        args.period_ms
    );

    let mut pacer = Pacer::new(args.period());
    let mut cycles = 0u64;
    while running.load(Ordering::Relaxed) && (args.cycles == 0 || cycles < args.cycles) {
        let out = estimator.step().context("Sensor read failed")?;
        print!(
            "\rroll {:+8.2}°  pitch {:+8.2}°  (bias {:+6.2} / {:+6.2} °/s)   ",
            out.roll_deg,
            out.pitch_deg,
            estimator.roll_filter().bias(),
            estimator.pitch_filter().bias()
        );
        io::stdout().flush()?;
        cycles += 1;
        pacer.wait();
    }
    println!();
    println!("[{}] Stopped after {} cycles", ts_now(), cycles);
    Ok(())
}

/// Offsets for `run`. A missing file is fatal on hardware; the simulated
/// sensor has no bias, so it runs with zeros.
fn run_offsets(store: &OffsetStore, simulate: bool) -> Result<OffsetSet> {
    match store.load()? {
        OffsetLoad::Loaded(offsets) => Ok(offsets),
        OffsetLoad::Absent if simulate => {
            log::info!(
                "No offsets at {}; simulating with zero offsets",
                store.path().display()
            );
            Ok(OffsetSet::zero())
        }
        OffsetLoad::Absent => bail!(
            "No calibration found at {}. Place the sensor level and run `tilt_tracker calibrate` first.",
            store.path().display()
        ),
    }
}

fn run_raw<B: RegisterBus>(
    bus: B,
    store: &OffsetStore,
    args: &LoopArgs,
    running: &AtomicBool,
) -> Result<()> {
    let load = store.load()?;
    if load.is_absent() {
        log::warn!(
            "No offsets at {}; showing uncorrected counts",
            store.path().display()
        );
    }
    let offsets = load.into_offsets();
    let config = args.estimator_config();
    config.validate()?;
    let mut reader =
        RawSampleReader::initialize(bus, &config.device).context("Failed to initialize IMU")?;

    let mut previous = AttitudeOutput::default();
    let mut pacer = Pacer::new(args.period());
    let mut cycles = 0u64;
    while running.load(Ordering::Relaxed) && (args.cycles == 0 || cycles < args.cycles) {
        let sample = reader.read(&offsets).context("Sensor read failed")?;
        previous = tilt::estimate(sample.accel, config.scales.accel_counts_per_g, previous);
        println!(
            "accel {:>6} {:>6} {:>6}  gyro {:>6} {:>6} {:>6}  roll {:+7.2}°  pitch {:+7.2}°",
            sample.accel.x,
            sample.accel.y,
            sample.accel.z,
            sample.gyro.x,
            sample.gyro.y,
            sample.gyro.z,
            previous.roll_deg,
            previous.pitch_deg
        );
        cycles += 1;
        pacer.wait();
    }
    Ok(())
}

fn calibrate<B: RegisterBus>(
    bus: B,
    store: &OffsetStore,
    args: &CalibrateArgs,
    running: &AtomicBool,
) -> Result<()> {
    let mut reader = RawSampleReader::initialize(bus, &EstimatorConfig::default().device)
        .context("Failed to initialize IMU")?;

    println!(
        "[{}] Calibrating over {} samples...",
        ts_now(),
        args.samples
    );
    let procedure = CalibrationProcedure::new(args.samples);
    let spinner = ['|', '/', '-', '\\'];
    let offsets = procedure
        .run_until_cancelled(&mut reader, running, |done, total| {
            if done % 250 == 0 || done == total {
                let frame = spinner[(done / 250) as usize % spinner.len()];
                print!("\r{frame} {:3}%", u64::from(done) * 100 / u64::from(total));
                io::stdout().flush().ok();
            }
        })
        .context("Calibration failed")?;
    println!();

    store
        .save_replacing_corrupt(&offsets)
        .with_context(|| format!("Failed to save offsets to {}", store.path().display()))?;
    print_offsets(&offsets);
    println!("[{}] Saved to {}", ts_now(), store.path().display());
    Ok(())
}

fn print_offsets(offsets: &OffsetSet) {
    println!("=== Calibration Offsets ===");
    for (key, value) in offsets.entries() {
        println!("  {key:<24} {value:>6}");
    }
}

/// Fixed-rate loop timing; falls back to "now" after an overrun
struct Pacer {
    period: Duration,
    next: Instant,
}

impl Pacer {
    fn new(period: Duration) -> Self {
        Self {
            period,
            next: Instant::now() + period,
        }
    }

    fn wait(&mut self) {
        let now = Instant::now();
        if self.next > now {
            thread::sleep(self.next - now);
            self.next += self.period;
        } else {
            self.next = now + self.period;
        }
    }
}

/// Simulated sensor rocking ±20° in roll at 0.5 Hz, sampled every 10 ms
fn wobbling_bus() -> SimulatedBus {
    const STEPS: usize = 200;
    const AMPLITUDE_DEG: f64 = 20.0;
    const FREQ_HZ: f64 = 0.5;
    let gyro_counts_per_dps = GyroRange::default().counts_per_dps();

    let samples = (0..STEPS)
        .map(|i| {
            let t = i as f64 * 0.01;
            let phase = 2.0 * PI * FREQ_HZ * t;
            let angle = (AMPLITUDE_DEG * phase.sin()).to_radians();
            let rate_dps = AMPLITUDE_DEG * 2.0 * PI * FREQ_HZ * phase.cos();
            RawSample {
                accel: Axes::new(
                    0,
                    (ACCEL_COUNTS_PER_G * angle.sin()).round() as i32,
                    (ACCEL_COUNTS_PER_G * angle.cos()).round() as i32,
                ),
                gyro: Axes::new((rate_dps * gyro_counts_per_dps).round() as i32, 0, 0),
            }
        })
        .collect();

    let bus = SimulatedBus::new();
    bus.set_sequence(samples);
    bus
}

fn parse_address(s: &str) -> Result<u8, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse::<u8>(),
    };
    match parsed {
        Ok(address) if address <= 0x7F => Ok(address),
        Ok(address) => Err(format!("0x{address:02X} is not a 7-bit address")),
        Err(e) => Err(format!("invalid address '{s}': {e} (default 0x{DEFAULT_ADDRESS:02X})")),
    }
}

fn parse_gyro_range(s: &str) -> Result<GyroRange, String> {
    s.parse::<u16>()
        .ok()
        .and_then(GyroRange::from_dps)
        .ok_or_else(|| format!("unsupported gyro range '{s}' (expected 250, 500, 1000 or 2000)"))
}

fn ts_now() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}
