mod ticks;
pub mod config;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::scene::{LoopTicks, Scene};
use crate::sync::WorkerPool;
use config::RuntimeConfig;
use ticks::*;

//o------------ User Trait ---------------o

/// Application-level hooks around the built-in phase walks. All methods
/// default to no-ops; per-object behavior belongs in callback tables, this
/// trait is for whole-loop concerns (stepping cameras, kicking renders,
/// loading content).
pub trait User: Send + Sync + Default + 'static {
    fn init(self: Arc<Self>, shared: Arc<SharedAppData>, scene: &mut Scene) {
        let _ = (shared, scene);
    }

    fn cleanup(self: Arc<Self>, shared: Arc<SharedAppData>, scene: &mut Scene) {
        let _ = (shared, scene);
    }

    /// Runs on the simulation thread at the end of every fixed tick.
    fn fixed_step(self: Arc<Self>, shared: Arc<SharedAppData>, scene: &mut Scene) {
        let _ = (shared, scene);
    }

    /// Runs on the presentation thread every frame, between the frame
    /// walks. Render/serialize walks are dispatched from here with the
    /// user's own context.
    fn vary_step(self: Arc<Self>, shared: Arc<SharedAppData>, scene: &mut Scene) {
        let _ = (shared, scene);
    }
}

/// User for headless setups that only need the built-in walks.
#[derive(Default)]
pub struct HeadlessUser;

impl User for HeadlessUser {}

//o------------ App Data ---------------o

pub struct SharedAppData {
    pub end_program: AtomicBool,
    pub ticks: Arc<LoopTicks>,
    pub pool: WorkerPool,
    pub config: RuntimeConfig,
    pub(crate) start: Instant,
    pub(crate) fixed_delta_time: AtomicU64,
    pub(crate) vary_delta_time: AtomicU64,
    pub(crate) fixed_tick_stamp: AtomicU64,
}

impl SharedAppData {
    /// Cooperative stop; every loop observes the flag between ticks.
    pub fn end(&self) {
        self.end_program.store(true, Ordering::Relaxed);
    }

    pub fn ending(&self) -> bool {
        self.end_program.load(Ordering::Relaxed)
    }

    /// Measured (capped) duration of the last fixed tick.
    pub fn fixed_delta_time(&self) -> Duration {
        Duration::from_nanos(self.fixed_delta_time.load(Ordering::Relaxed))
    }

    /// Measured duration of the last presentation frame.
    pub fn vary_delta_time(&self) -> Duration {
        Duration::from_nanos(self.vary_delta_time.load(Ordering::Relaxed))
    }

    pub(crate) fn now_ns(&self) -> u64 {
        self.start.elapsed().as_nanos() as u64
    }

    /// Fraction of the current fixed tick that has elapsed, for
    /// presentation-side interpolation.
    pub fn fixed_tick_alpha(&self) -> f32 {
        let stamp = self.fixed_tick_stamp.load(Ordering::Relaxed);
        let elapsed = self.now_ns().saturating_sub(stamp) as f32;
        (elapsed / self.config.fixed_delta_ns as f32).clamp(0.0, 1.0)
    }
}

//o------------ Application ---------------o

/// Owns the scene and the three loops: a fixed-cadence simulation loop, a
/// free-running presentation loop and a low-priority reclamation loop.
/// No global lock spans a whole loop iteration; the loops coordinate
/// through handles, transform queues and published cells, and take the
/// scene lock only around their walk sections.
pub struct Application<T: User> {
    shared: Arc<SharedAppData>,
    scene: Arc<RwLock<Scene>>,
    user: Arc<T>,
    fixed_step_signal: (
        crossbeam_channel::Sender<FixedStepSignal>,
        crossbeam_channel::Receiver<FixedStepSignal>,
    ),
    loop_threads: Vec<JoinHandle<()>>,
}

impl<T: User> Application<T> {
    pub fn new(config: RuntimeConfig) -> Self {
        let _ = env_logger::try_init();
        let ticks = Arc::new(LoopTicks::new());
        let grace_ticks = config.grace_ticks;
        let worker_threads = config.worker_threads;
        let fixed_delta_ns = config.fixed_delta_ns;
        let shared = Arc::new(SharedAppData {
            end_program: AtomicBool::new(false),
            ticks: ticks.clone(),
            pool: WorkerPool::new(worker_threads),
            config,
            start: Instant::now(),
            fixed_delta_time: AtomicU64::from(fixed_delta_ns),
            vary_delta_time: AtomicU64::from(0),
            fixed_tick_stamp: AtomicU64::from(0),
        });
        Self {
            shared,
            scene: Arc::new(RwLock::new(Scene::new(ticks, grace_ticks))),
            user: Arc::new(T::default()),
            fixed_step_signal: crossbeam_channel::bounded(2),
            loop_threads: Vec::new(),
        }
    }

    pub fn shared(&self) -> Arc<SharedAppData> {
        self.shared.clone()
    }

    pub fn scene(&self) -> Arc<RwLock<Scene>> {
        self.scene.clone()
    }

    /// Spawns the notify, fixed, vary and reclaim threads. The user init
    /// hook runs first, on the calling thread.
    pub fn start(&mut self) {
        assert!(self.loop_threads.is_empty(), "application already started");
        profiling::register_thread!("main thread");
        self.user
            .clone()
            .init(self.shared.clone(), &mut self.scene.write());

        let shared = self.shared.clone();
        let signal_snd = self.fixed_step_signal.0.clone();
        self.loop_threads.push(
            std::thread::Builder::new()
                .name("fixed step notify thread".into())
                .spawn(|| fixed_step_notify(shared, signal_snd))
                .unwrap(),
        );

        let signal_rcv = self.fixed_step_signal.1.clone();
        let shared = self.shared.clone();
        let scene = self.scene.clone();
        let user = self.user.clone();
        self.loop_threads.push(
            std::thread::Builder::new()
                .name("fixed step thread".into())
                .spawn(|| fixed_loop(signal_rcv, shared, scene, user))
                .unwrap(),
        );

        let shared = self.shared.clone();
        let scene = self.scene.clone();
        let user = self.user.clone();
        self.loop_threads.push(
            std::thread::Builder::new()
                .name("vary step thread".into())
                .spawn(|| vary_loop(shared, scene, user))
                .unwrap(),
        );

        let shared = self.shared.clone();
        let scene = self.scene.clone();
        self.loop_threads.push(
            std::thread::Builder::new()
                .name("reclaim thread".into())
                .spawn(|| reclaim_loop(shared, scene))
                .unwrap(),
        );
    }

    /// Stops the loops, joins them, runs the user cleanup hook and tears
    /// the scene down. Only here, with every loop joined, is the forced
    /// live-to-destroyed path allowed.
    pub fn stop(&mut self) {
        if self.loop_threads.is_empty() {
            return;
        }
        self.shared.end();
        let _ = self.fixed_step_signal.0.try_send(FixedStepSignal);
        while let Some(join_handle) = self.loop_threads.pop() {
            join_handle.join().unwrap();
        }
        self.user
            .clone()
            .cleanup(self.shared.clone(), &mut self.scene.write());
        self.scene.write().teardown();
        self.shared.pool.stop();
    }
}

impl<T: User> Drop for Application<T> {
    fn drop(&mut self) {
        self.stop();
    }
}
