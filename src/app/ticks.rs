use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use super::{SharedAppData, User};
use crate::scene::{LoopKind, Phase, Scene};

pub(crate) struct FixedStepSignal;

/// Paces the fixed loop: sleeps one fixed delta, then pokes the signal
/// channel. The channel is bounded at 2 so a stalled simulation can catch
/// up by at most one tick instead of spiraling.
pub(crate) fn fixed_step_notify(
    shared: Arc<SharedAppData>,
    signal_snd: crossbeam_channel::Sender<FixedStepSignal>,
) {
    profiling::register_thread!("fixed step notify thread");
    while !shared.ending() {
        spin_sleep::sleep(shared.config.fixed_delta());
        if signal_snd.len() < 2 {
            let _ = signal_snd.try_send(FixedStepSignal);
        }
    }
}

pub(crate) fn fixed_loop<T: User>(
    signal: crossbeam_channel::Receiver<FixedStepSignal>,
    shared: Arc<SharedAppData>,
    scene: Arc<RwLock<Scene>>,
    user: Arc<T>,
) {
    profiling::register_thread!("fixed step thread");
    let mut last_tick_start = Instant::now();
    loop {
        let _ = signal.recv();
        if shared.ending() {
            break;
        }
        profiling::scope!("fixed tick");
        let elapsed = last_tick_start.elapsed().min(shared.config.fixed_delta_cap());
        shared
            .fixed_delta_time
            .store(elapsed.as_nanos() as u64, std::sync::atomic::Ordering::Relaxed);
        last_tick_start = Instant::now();
        shared
            .fixed_tick_stamp
            .store(shared.now_ns(), std::sync::atomic::Ordering::Relaxed);
        {
            let scene = &mut *scene.write();
            scene.dispatch(Phase::Input, &mut ());
            scene.dispatch(Phase::PhysicsStart, &mut ());
            scene.dispatch(Phase::PhysicsUpdate, &mut ());
            // the tick being produced; the completed counter advances
            // only after the whole iteration is done
            let tick = shared.ticks.completed(LoopKind::Fixed) + 1;
            scene.consume_transforms(tick);
            scene.dispatch(Phase::PhysicsEnd, &mut ());
            user.clone().fixed_step(shared.clone(), scene);
        }
        shared.ticks.advance(LoopKind::Fixed);
    }
    log::info!("fixed loop ended");
}

pub(crate) fn vary_loop<T: User>(
    shared: Arc<SharedAppData>,
    scene: Arc<RwLock<Scene>>,
    user: Arc<T>,
) {
    profiling::register_thread!("vary step thread");
    let mut last_frame_end = Instant::now();
    while !shared.ending() {
        {
            profiling::scope!("vary tick");
            let scene = &mut *scene.write();
            scene.sync_transform_views(shared.fixed_tick_alpha());
            scene.dispatch(Phase::FrameStart, &mut ());
            scene.dispatch(Phase::FrameUpdate, &mut ());
            user.clone().vary_step(shared.clone(), scene);
            scene.dispatch(Phase::FrameEnd, &mut ());
        }
        shared.ticks.advance(LoopKind::Vary);

        let min_delta = shared.config.min_vary_delta();
        let clamped_time_taken = last_frame_end.elapsed().clamp(Duration::ZERO, min_delta);
        spin_sleep::sleep(min_delta - clamped_time_taken);
        shared
            .vary_delta_time
            .store(
                last_frame_end.elapsed().as_nanos() as u64,
                std::sync::atomic::Ordering::Relaxed,
            );
        last_frame_end = Instant::now();
    }
    log::info!("vary loop ended");
}

pub(crate) fn reclaim_loop(shared: Arc<SharedAppData>, scene: Arc<RwLock<Scene>>) {
    profiling::register_thread!("reclaim thread");
    while !shared.ending() {
        spin_sleep::sleep(shared.config.reclaim_interval());
        if shared.ending() {
            break;
        }
        {
            profiling::scope!("reclaim tick");
            let released = scene
                .write()
                .collect(Some(&shared.pool), shared.config.parallel_chunk_size);
            if released > 0 {
                log::debug!("reclaimed {} slots", released);
            }
        }
        shared.ticks.advance(LoopKind::Reclaim);
    }
    log::info!("reclaim loop ended");
}
